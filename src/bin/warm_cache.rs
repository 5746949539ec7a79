// src/bin/warm_cache.rs
use dotenv::dotenv;
use log::{info, warn};
use std::sync::Arc;

use ashare_valuation::config::Settings;
use ashare_valuation::handlers::{warm_cache, Context};
use ashare_valuation::services::eastmoney::{DataSource, EastmoneyClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let settings = Settings::from_env()?;
    let source: Arc<dyn DataSource> = Arc::new(EastmoneyClient::new(settings.http_timeout)?);
    let ctx = Arc::new(Context::new(settings, source));

    let mut failed = 0;
    for (ticker, outcome) in warm_cache(ctx.clone()).await {
        match outcome {
            Ok(rows) => println!("{:<10} {:>6} rows cached", ticker.to_string(), rows),
            Err(e) => {
                warn!("{}: {}", ticker, e);
                println!("{:<10} failed: {}", ticker.to_string(), e);
                failed += 1;
            }
        }
    }

    info!(
        "Cache at {} warmed, {} of {} tickers failed",
        ctx.settings.data_dir.display(),
        failed,
        ctx.settings.tickers.len()
    );
    Ok(())
}
