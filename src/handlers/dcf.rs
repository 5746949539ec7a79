// src/handlers/dcf.rs
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{Result, ValuationError};
use crate::handlers::report::{self, Report};
use crate::handlers::{run_batch, Context};
use crate::models::{CashFlowSeries, DcfResult, StatementKind, Ticker};
use crate::services::dcf::{forecast, historical_fcf, market_cap, net_debt, value};
use crate::services::table::Table;

#[derive(Debug, Clone, Serialize)]
pub struct DcfOutcome {
    pub last_fcf: f64,
    pub forecast: CashFlowSeries,
    pub result: DcfResult,
}

/// Two-stage DCF from the latest historical free cash flow, bridged to equity
/// with the latest net debt and compared against market cap when the spot
/// snapshot has one.
pub async fn value_ticker(ctx: &Context, ticker: &Ticker, spot: Option<&Table>) -> Result<DcfOutcome> {
    let cash_flow = ctx.load(ticker, StatementKind::CashFlow).await?;
    let balance = ctx.load(ticker, StatementKind::Balance).await?;

    let history = historical_fcf(&cash_flow)?;
    let (as_of, last_fcf) = history
        .last()
        .copied()
        .ok_or_else(|| ValuationError::missing(ticker.to_string(), "NETCASH_OPERATE"))?;

    let settings = &ctx.settings.dcf;
    let series = forecast(last_fcf, &settings.phases);
    let debt = net_debt(&balance)?;
    let cap = spot.and_then(|s| market_cap(s, ticker));
    if cap.is_none() {
        warn!("{}: no market cap, valuation ratio undefined", ticker);
    }

    let result = value(&series, settings.wacc, settings.perpetual_growth, debt, cap)?;
    info!(
        "{}: fcf({})={:.0} ev={:.0} equity={:.0}",
        ticker, as_of, last_fcf, result.enterprise_value, result.equity_value
    );

    Ok(DcfOutcome {
        last_fcf,
        forecast: series,
        result,
    })
}

pub fn build_report(outcomes: &[(Ticker, Result<DcfOutcome>)]) -> Report {
    let mut table = Report::new(
        "Two-stage DCF",
        &["last_fcf", "ev", "net_debt", "equity", "market_cap", "equity/mcap"],
    );
    for (ticker, outcome) in outcomes {
        table.push_outcome(ticker, outcome, |o| {
            vec![
                report::number(o.last_fcf, 0),
                report::number(o.result.enterprise_value, 0),
                report::number(o.result.net_debt, 0),
                report::number(o.result.equity_value, 0),
                report::optional(o.result.market_cap, 0),
                report::optional(o.result.valuation_ratio, 4),
            ]
        });
    }
    table
}

pub async fn run(ctx: Arc<Context>) -> Report {
    let spot = match ctx.load_spot().await {
        Ok(table) => Some(table),
        Err(e) => {
            warn!("Spot snapshot unavailable, market ratios undefined: {}", e);
            None
        }
    };
    let spot = Arc::new(spot);

    let outcomes = run_batch(ctx, move |ctx, ticker| {
        let spot = spot.clone();
        async move { value_ticker(&ctx, &ticker, (*spot).as_ref()).await }
    })
    .await;
    build_report(&outcomes)
}
