// src/main.rs
use anyhow::Context as _;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::info;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use ashare_valuation::config::Settings;
use ashare_valuation::handlers::report::Report;
use ashare_valuation::handlers::{cape, dcf, project, risk, Context};
use ashare_valuation::models::Ticker;
use ashare_valuation::services::eastmoney::{DataSource, EastmoneyClient};

#[derive(Parser)]
#[command(name = "ashare-valuation", about = "Valuation and risk reports for A-share tickers")]
struct Cli {
    /// Comma-separated tickers, e.g. sz000598,sh600008. Overrides VALUATION_TICKERS.
    #[arg(long, value_delimiter = ',')]
    tickers: Vec<String>,

    /// Cache directory. Overrides VALUATION_DATA_DIR.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Also write every report as `<name>.csv` into this directory.
    #[arg(long)]
    csv_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// NPV, IRR, payback and ROI of a ratio-sized R&D + CapEx programme
    Project,
    /// Two-stage DCF with equity bridge and market-cap ratio
    Dcf,
    /// CAPE ranking, cheapest first
    Cape,
    /// Weekly historical VaR and MA20 technical risk
    Risk {
        /// Write each ticker's VaR and technical series as CSV here.
        #[arg(long)]
        series_dir: Option<PathBuf>,
    },
    /// Every report in turn
    All,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();
    info!("Logger initialized.");

    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;
    if !cli.tickers.is_empty() {
        settings.tickers = cli
            .tickers
            .iter()
            .map(|t| t.parse::<Ticker>())
            .collect::<Result<Vec<_>, _>>()?;
    }
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }
    info!(
        "Running for {} tickers with cache at {}",
        settings.tickers.len(),
        settings.data_dir.display()
    );

    let source: Arc<dyn DataSource> = Arc::new(EastmoneyClient::new(settings.http_timeout)?);
    let ctx = Arc::new(Context::new(settings, source));

    let reports: Vec<(&str, Report)> = match cli.command {
        Command::Project => vec![("project", project::run(ctx).await)],
        Command::Dcf => vec![("dcf", dcf::run(ctx).await)],
        Command::Cape => vec![("cape", cape::run(ctx).await)],
        Command::Risk { series_dir } => {
            let confidence = ctx.settings.risk.confidence;
            let outcomes = risk::evaluate_all(ctx).await;
            if let Some(dir) = series_dir {
                let written = risk::write_series(&dir, &outcomes)?;
                info!("Wrote {} risk series to {}", written, dir.display());
            }
            vec![("risk", risk::build_report(&outcomes, confidence))]
        }
        Command::All => vec![
            ("project", project::run(ctx.clone()).await),
            ("dcf", dcf::run(ctx.clone()).await),
            ("cape", cape::run(ctx.clone()).await),
            ("risk", risk::run(ctx).await),
        ],
    };

    for (name, report) in &reports {
        println!("{}", report);
        if let Some(dir) = &cli.csv_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
            let path = dir.join(format!("{}.csv", name));
            let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            report.write_csv(file)?;
            info!("Wrote {} report to {}", name, path.display());
        }
    }

    Ok(())
}
