// src/handlers/risk.rs
use log::info;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, ValuationError};
use crate::handlers::report::{self, Report};
use crate::handlers::{run_batch, Context};
use crate::models::{RiskSeries, StatementKind, Ticker};
use crate::services::risk::{closes, risk_series, trailing_var};
use crate::services::table::Table;

#[derive(Debug, Clone)]
pub struct RiskOutcome {
    /// Scalar VaR over the configured trailing window.
    pub trailing_var: Option<f64>,
    pub latest_var: Option<f64>,
    pub latest_technical: Option<f64>,
    pub latest_trend: Option<f64>,
    pub series: RiskSeries,
}

pub async fn evaluate_ticker(ctx: Arc<Context>, ticker: Ticker) -> Result<RiskOutcome> {
    let daily = ctx.load(&ticker, StatementKind::DailyPrice).await?;
    let prices = closes(&daily)?;
    if prices.len() < 2 {
        return Err(ValuationError::malformed(
            ticker.to_string(),
            format!("{} closes, need at least 2", prices.len()),
        ));
    }

    let settings = &ctx.settings.risk;
    let series = risk_series(&prices, settings.confidence, settings.ma_window)?;

    let outcome = RiskOutcome {
        trailing_var: trailing_var(&series.weekly, settings.confidence, settings.window_weeks),
        latest_var: series.var.last().map(|v| v.value),
        latest_technical: series.technical.last().map(|v| v.value),
        latest_trend: series.technical_trend.last().map(|v| v.value),
        series,
    };
    info!(
        "{}: {} weeks, var={:?} trend={:?}",
        ticker,
        outcome.series.weekly.len(),
        outcome.latest_var,
        outcome.latest_trend
    );
    Ok(outcome)
}

pub fn build_report(outcomes: &[(Ticker, Result<RiskOutcome>)], confidence: f64) -> Report {
    let title = format!("Risk (weekly historical VaR at {:.0}%, MA20 technical)", confidence * 100.0);
    let mut table = Report::new(title, &["var", "trailing_var", "technical", "trend"]);
    for (ticker, outcome) in outcomes {
        table.push_outcome(ticker, outcome, |o| {
            vec![
                report::percent(o.latest_var),
                report::percent(o.trailing_var),
                report::percent(o.latest_technical),
                report::percent(o.latest_trend),
            ]
        });
    }
    table
}

/// Long-format time series (`series,date,value`) for charting elsewhere.
pub fn series_table(ticker: &Ticker, series: &RiskSeries) -> Table {
    let named = [
        ("var", &series.var),
        ("technical", &series.technical),
        ("technical_trend", &series.technical_trend),
    ];
    let rows = named
        .iter()
        .flat_map(|(name, points)| {
            points
                .iter()
                .map(move |p| vec![name.to_string(), p.date.to_string(), p.value.to_string()])
        })
        .collect();
    Table::new(
        ticker.to_string(),
        vec!["series".to_string(), "date".to_string(), "value".to_string()],
        rows,
    )
}

/// Writes `{dir}/{ticker}_risk.csv` for every ticker that succeeded.
pub fn write_series(dir: &Path, outcomes: &[(Ticker, Result<RiskOutcome>)]) -> Result<usize> {
    std::fs::create_dir_all(dir).map_err(|source| ValuationError::Cache {
        path: dir.display().to_string(),
        source,
    })?;
    let mut written = 0;
    for (ticker, outcome) in outcomes {
        if let Ok(o) = outcome {
            let path = dir.join(format!("{}_risk.csv", ticker));
            let file = std::fs::File::create(&path).map_err(|source| ValuationError::Cache {
                path: path.display().to_string(),
                source,
            })?;
            series_table(ticker, &o.series).write_to(file)?;
            written += 1;
        }
    }
    Ok(written)
}

pub async fn evaluate_all(ctx: Arc<Context>) -> Vec<(Ticker, Result<RiskOutcome>)> {
    run_batch(ctx, evaluate_ticker).await
}

pub async fn run(ctx: Arc<Context>) -> Report {
    let confidence = ctx.settings.risk.confidence;
    build_report(&evaluate_all(ctx).await, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{context, StubSource};
    use chrono::{Datelike, Duration, NaiveDate};

    /// Weekday closes from 2024-01-01 (a Monday), alternating up and down.
    fn daily_csv(days: usize) -> String {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut csv = String::from("date,open,close,high,low,volume\n");
        let mut date = start;
        let mut written = 0;
        while written < days {
            if date.weekday().number_from_monday() <= 5 {
                let close = if written % 2 == 0 { 10.0 } else { 10.5 };
                csv.push_str(&format!("{},1,{},1,1,1\n", date, close));
                written += 1;
            }
            date += Duration::days(1);
        }
        csv
    }

    #[tokio::test]
    async fn reports_latest_values_and_series() {
        let dir = tempfile::tempdir().unwrap();
        let source = StubSource::default().with("sz000598", StatementKind::DailyPrice, &daily_csv(60));
        let (ctx, _) = context(dir.path(), &["sz000598"], source);

        let outcomes = evaluate_all(ctx).await;
        let outcome = outcomes[0].1.as_ref().unwrap();
        assert_eq!(outcome.series.var.len(), 12);
        assert_eq!(outcome.series.technical.len(), 41);
        assert_eq!(outcome.series.technical_trend.len(), 22);
        assert_eq!(outcome.series.weekly.len(), 12);
        assert_eq!(outcome.trailing_var, outcome.latest_var);
        assert!(outcome.latest_var.unwrap() >= 0.0);

        let out = dir.path().join("series");
        assert_eq!(write_series(&out, &outcomes).unwrap(), 1);
        let written = std::fs::read_to_string(out.join("sz000598_risk.csv")).unwrap();
        assert!(written.starts_with("series,date,value\nvar,2024-01-05,"));
        assert_eq!(written.lines().count(), 1 + 12 + 41 + 22);
    }

    #[tokio::test]
    async fn single_close_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let source = StubSource::default().with("sz000598", StatementKind::DailyPrice, &daily_csv(1));
        let (ctx, _) = context(dir.path(), &["sz000598"], source);

        let report = run(ctx).await;
        let status = report.rows()[0].last().unwrap();
        assert!(status.starts_with("failed: "));
        assert!(status.contains("need at least 2"));
    }
}
