// src/handlers/cape.rs
use log::info;
use std::sync::Arc;

use crate::error::Result;
use crate::handlers::report::{self, rank_ascending, Report};
use crate::handlers::{run_batch, Context};
use crate::models::{CapeResult, StatementKind, Ticker};
use crate::services::cape::cape_from_tables;

pub async fn evaluate_ticker(ctx: Arc<Context>, ticker: Ticker) -> Result<CapeResult> {
    let income = ctx.load(&ticker, StatementKind::Income).await?;
    let daily = ctx.load(&ticker, StatementKind::DailyPrice).await?;
    let result = cape_from_tables(&income, &daily)?;
    info!("{}: close={} avg_eps={:.4} cape={:?}", ticker, result.latest_close, result.average_eps, result.cape);
    Ok(result)
}

/// Cheapest first. Undefined CAPE and failed tickers sink to the bottom.
pub fn build_report(mut outcomes: Vec<(Ticker, Result<CapeResult>)>) -> Report {
    rank_ascending(&mut outcomes, |(_, outcome)| {
        outcome.as_ref().ok().and_then(|r| r.cape)
    });

    let mut table = Report::new(
        "CAPE ranking (ascending)",
        &["close", "avg_eps", "years", "cape"],
    );
    for (ticker, outcome) in &outcomes {
        table.push_outcome(ticker, outcome, |r| {
            vec![
                report::number(r.latest_close, 2),
                report::number(r.average_eps, 4),
                r.years_used.to_string(),
                report::optional(r.cape, 2),
            ]
        });
    }
    table
}

pub async fn run(ctx: Arc<Context>) -> Report {
    build_report(run_batch(ctx, evaluate_ticker).await)
}
