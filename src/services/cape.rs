// src/services/cape.rs
use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use std::collections::BTreeMap;

use crate::error::{Result, ValuationError};
use crate::models::CapeResult;
use crate::services::table::{Table, REPORT_DATE};

/// Calendar years averaged into the cyclically adjusted earnings.
pub const CAPE_YEARS: usize = 10;

/// Basic EPS per reported period, oldest first.
pub fn eps_history(income: &Table) -> Result<Vec<(NaiveDate, f64)>> {
    income
        .rows_by_date(REPORT_DATE)?
        .into_iter()
        .map(|(date, row)| row.number("BASIC_EPS").map(|eps| (date, eps)))
        .collect()
}

/// Close of the most recent trading day in a daily price table.
pub fn latest_close(daily: &Table) -> Result<f64> {
    daily.latest_by_date("date")?.number("close")
}

/// Mean EPS per calendar year, in year order.
pub fn yearly_average_eps(history: &[(NaiveDate, f64)]) -> Vec<(i32, f64)> {
    let mut by_year: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for (date, eps) in history {
        let entry = by_year.entry(date.year()).or_insert((0.0, 0));
        entry.0 += eps;
        entry.1 += 1;
    }
    by_year
        .into_iter()
        .map(|(year, (sum, count))| (year, sum / count as f64))
        .collect()
}

/// Price over the average of up to the last [`CAPE_YEARS`] yearly EPS means.
/// Shorter histories use every year available. Undefined when that average
/// is zero or there is no history at all.
pub fn cape(history: &[(NaiveDate, f64)], latest_close: f64) -> CapeResult {
    let yearly = yearly_average_eps(history);
    let window = &yearly[yearly.len().saturating_sub(CAPE_YEARS)..];

    let average_eps = if window.is_empty() {
        0.0
    } else {
        window.iter().map(|(_, eps)| eps).sum::<f64>() / window.len() as f64
    };

    let cape = if average_eps == 0.0 {
        warn!("Average EPS over {} years is zero, CAPE undefined", window.len());
        None
    } else {
        Some(latest_close / average_eps)
    };
    debug!("CAPE over {} years: avg_eps={} cape={:?}", window.len(), average_eps, cape);

    CapeResult {
        latest_close,
        average_eps,
        years_used: window.len(),
        cape,
    }
}

/// Pulls EPS and the latest close out of the raw tables and computes CAPE.
pub fn cape_from_tables(income: &Table, daily: &Table) -> Result<CapeResult> {
    let history = eps_history(income)?;
    if history.is_empty() {
        return Err(ValuationError::missing(income.label(), "BASIC_EPS"));
    }
    let close = latest_close(daily)?;
    Ok(cape(&history, close))
}
