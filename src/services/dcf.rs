// src/services/dcf.rs
use chrono::NaiveDate;
use log::{debug, warn};

use crate::error::{Result, ValuationError};
use crate::models::{CashFlowSeries, DcfResult, GrowthPhase, Ticker};
use crate::services::table::{Table, REPORT_DATE};

/// Operating cash flow less construction spend for every reported period,
/// oldest first.
pub fn historical_fcf(cash_flow: &Table) -> Result<Vec<(NaiveDate, f64)>> {
    let history = cash_flow
        .rows_by_date(REPORT_DATE)?
        .into_iter()
        .map(|(date, row)| -> Result<(NaiveDate, f64)> {
            let operating = row.number("NETCASH_OPERATE")?;
            let capex = row.number_or_zero("CONSTRUCT_LONG_ASSET")?;
            Ok((date, operating - capex))
        })
        .collect::<Result<Vec<_>>>()?;

    if history.is_empty() {
        return Err(ValuationError::missing(cash_flow.label(), "NETCASH_OPERATE"));
    }
    Ok(history)
}

/// Compounds `last_fcf` through each phase in turn, one value per year.
pub fn forecast(last_fcf: f64, phases: &[GrowthPhase]) -> CashFlowSeries {
    let mut current = last_fcf;
    let mut values = Vec::new();
    for phase in phases {
        for _ in 0..phase.years {
            current *= 1.0 + phase.growth;
            values.push(current);
        }
    }
    CashFlowSeries::new(values)
}

/// Gordon growth value of everything after the final forecast year, as of
/// that year.
pub fn terminal_value(final_fcf: f64, wacc: f64, perpetual_growth: f64) -> Result<f64> {
    if wacc <= perpetual_growth {
        return Err(ValuationError::Domain(format!(
            "WACC {} must exceed perpetual growth {}",
            wacc, perpetual_growth
        )));
    }
    Ok(final_fcf * (1.0 + perpetual_growth) / (wacc - perpetual_growth))
}

/// Discounted forecast plus the terminal value discounted from the end of the
/// horizon.
pub fn enterprise_value(forecast: &CashFlowSeries, wacc: f64, perpetual_growth: f64) -> Result<f64> {
    let final_fcf = forecast
        .last()
        .ok_or_else(|| ValuationError::Domain("forecast horizon is empty".to_string()))?;
    let base = 1.0 + wacc;
    if base <= 0.0 {
        return Err(ValuationError::Domain(format!("WACC {} is not a usable discount rate", wacc)));
    }

    let pv: f64 = forecast
        .values()
        .iter()
        .enumerate()
        .map(|(i, cf)| cf / base.powi(i as i32 + 1))
        .sum();
    let tv = terminal_value(final_fcf, wacc, perpetual_growth)?;
    let pv_terminal = tv / base.powi(forecast.len() as i32);

    debug!("DCF: pv_forecast={:.0} tv={:.0} pv_terminal={:.0}", pv, tv, pv_terminal);
    Ok(pv + pv_terminal)
}

/// Total liabilities less cash from the latest balance sheet.
pub fn net_debt(balance: &Table) -> Result<f64> {
    let latest = balance.latest_by_date(REPORT_DATE)?;
    Ok(latest.number("TOTAL_LIABILITIES")? - latest.number("MONETARYFUNDS")?)
}

/// Total market cap for `ticker` in the spot snapshot. Codes are compared
/// numerically so `000598` matches a cache that stored `598`.
pub fn market_cap(spot: &Table, ticker: &Ticker) -> Option<f64> {
    let wanted: u64 = ticker.code().parse().ok()?;
    let row = spot
        .rows()
        .find(|row| row.get("code").and_then(|c| c.parse::<u64>().ok()) == Some(wanted))?;
    match row.number("total_market_cap") {
        Ok(cap) if cap > 0.0 => Some(cap),
        Ok(_) => {
            warn!("{}: market cap is not positive", ticker);
            None
        }
        Err(e) => {
            warn!("{}: no usable market cap: {}", ticker, e);
            None
        }
    }
}

pub fn value(
    forecast: &CashFlowSeries,
    wacc: f64,
    perpetual_growth: f64,
    net_debt: f64,
    market_cap: Option<f64>,
) -> Result<DcfResult> {
    let enterprise_value = enterprise_value(forecast, wacc, perpetual_growth)?;
    let equity_value = enterprise_value - net_debt;
    Ok(DcfResult {
        enterprise_value,
        net_debt,
        equity_value,
        market_cap,
        valuation_ratio: market_cap.map(|cap| equity_value / cap),
    })
}
