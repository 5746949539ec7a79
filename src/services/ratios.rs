// src/services/ratios.rs
use log::{debug, warn};
use serde::Serialize;

use crate::error::Result;
use crate::models::{ProjectAssumptions, Schedule};
use crate::services::table::{Table, REPORT_DATE};

/// Spend intensities relative to revenue, taken from the latest report period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Intensities {
    pub rd: f64,
    pub capex: f64,
    pub working_capital: f64,
}

/// Reads revenue and R&D from the income statement, construction spend from the
/// cash-flow statement and the working-capital components from the balance
/// sheet. R&D, CapEx and every balance item except cash are optional.
pub fn extract_intensities(income: &Table, cash_flow: &Table, balance: &Table) -> Result<Intensities> {
    let last_income = income.latest_by_date(REPORT_DATE)?;
    let last_cash = cash_flow.latest_by_date(REPORT_DATE)?;
    let last_balance = balance.latest_by_date(REPORT_DATE)?;

    let revenue = last_income.number("TOTAL_OPERATE_INCOME")?;
    let rd = last_income.number_or_zero("RESEARCH_EXPENSE")?;
    let capex = last_cash.number_or_zero("CONSTRUCT_LONG_ASSET")?;

    let current_assets = last_balance.number("MONETARYFUNDS")?
        + last_balance.number_or_zero("INVENTORY")?
        + last_balance.number_or_zero("ACCOUNTS_RECE")?;
    let current_liabilities = last_balance.number_or_zero("ACCOUNTS_PAYABLE")?
        + last_balance.number_or_zero("ADVANCE_RECEIVABLES")?;

    if revenue == 0.0 {
        warn!("{}: latest revenue is zero, intensities default to 0", income.label());
        return Ok(Intensities {
            rd: 0.0,
            capex: 0.0,
            working_capital: 0.0,
        });
    }

    let intensities = Intensities {
        rd: rd / revenue,
        capex: capex / revenue,
        working_capital: (current_assets - current_liabilities) / revenue,
    };
    debug!("{}: {:?}", income.label(), intensities);
    Ok(intensities)
}

/// Hypothetical three-year R&D and CapEx programme sized by the company's own
/// intensities, with a fixed five-year revenue growth path.
pub fn project_assumptions(intensities: &Intensities) -> ProjectAssumptions {
    ProjectAssumptions {
        rd_schedule: Schedule::new()
            .with(1, intensities.rd * 100e6)
            .with(2, intensities.rd * 120e6)
            .with(3, intensities.rd * 80e6),
        capex_schedule: Schedule::new()
            .with(1, intensities.capex * 100e6)
            .with(2, intensities.capex * 80e6)
            .with(3, intensities.capex * 60e6),
        wc_ratio: intensities.working_capital,
        revenue_growth: Schedule::new()
            .with(1, 0.10)
            .with(2, 0.12)
            .with(3, 0.08)
            .with(4, 0.06)
            .with(5, 0.04),
        margin: 0.30,
        tax_rate: 0.25,
    }
}
