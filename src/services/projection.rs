// src/services/projection.rs
use log::debug;

use crate::models::{CashFlowSeries, ProjectAssumptions};

/// Revenue the projection starts from when none is given: 100 million yuan.
pub const BASE_REVENUE: f64 = 100e6;

/// Free cash flow for forecast years `1..=horizon`.
///
/// Each year grows revenue by that year's growth rate, applies the EBITDA
/// margin, then subtracts CapEx, R&D and the change in working capital.
/// Tax is charged on the positive remainder only; a loss year carries no
/// tax shield.
pub fn project_cash_flows(
    assumptions: &ProjectAssumptions,
    horizon: u32,
    base_revenue: f64,
) -> CashFlowSeries {
    let mut revenue = base_revenue;
    let mut wc_prev = base_revenue * assumptions.wc_ratio;
    let mut fcfs = Vec::with_capacity(horizon as usize);

    for year in 1..=horizon {
        let growth = assumptions.revenue_growth.resolve(year);
        revenue *= 1.0 + growth;

        let ebitda = revenue * assumptions.margin;
        let capex = assumptions.capex_schedule.resolve(year);
        let rd = assumptions.rd_schedule.resolve(year);

        let wc = revenue * assumptions.wc_ratio;
        let delta_wc = wc - wc_prev;
        wc_prev = wc;

        let pre_tax = ebitda - capex - rd - delta_wc;
        let tax = pre_tax.max(0.0) * assumptions.tax_rate;
        let fcf = pre_tax - tax;

        debug!(
            "year {}: revenue={:.0} ebitda={:.0} capex={:.0} rd={:.0} dwc={:.0} tax={:.0} fcf={:.0}",
            year, revenue, ebitda, capex, rd, delta_wc, tax, fcf
        );
        fcfs.push(fcf);
    }

    CashFlowSeries::new(fcfs)
}
