// src/services/valuation.rs
use log::{debug, warn};

use crate::error::{Result, ValuationError};
use crate::models::ValuationResult;

/// Root bracket searched for the internal rate of return.
pub const IRR_BRACKET: (f64, f64) = (-0.9, 1.0);
pub const IRR_TOLERANCE: f64 = 1e-6;
const IRR_MAX_ITER: u32 = 200;

/// Present value of `cashflows` (first element at t = 1) less the up-front
/// investment. A rate of exactly -100% has no discount factor.
pub fn npv(cashflows: &[f64], rate: f64, initial_investment: f64) -> Result<f64> {
    let base = 1.0 + rate;
    if base == 0.0 {
        return Err(ValuationError::Domain(format!(
            "discount rate {} makes the discount factor undefined",
            rate
        )));
    }
    let pv: f64 = cashflows
        .iter()
        .enumerate()
        .map(|(i, cf)| cf / base.powi(i as i32 + 1))
        .sum();
    Ok(pv - initial_investment)
}

/// Rate at which the NPV is zero, found by bisection over [`IRR_BRACKET`].
/// `None` when the bracket holds no sign change or the search does not settle.
pub fn irr(cashflows: &[f64], initial_investment: f64) -> Option<f64> {
    let f = |r: f64| npv(cashflows, r, initial_investment).ok();

    let (mut lo, mut hi) = IRR_BRACKET;
    let mut f_lo = f(lo)?;
    let f_hi = f(hi)?;

    if f_lo == 0.0 {
        return Some(lo);
    }
    if f_hi == 0.0 {
        return Some(hi);
    }
    if f_lo.signum() == f_hi.signum() {
        debug!("No IRR sign change in [{}, {}]: npv {} / {}", lo, hi, f_lo, f_hi);
        return None;
    }

    for _ in 0..IRR_MAX_ITER {
        let mid = (lo + hi) / 2.0;
        let f_mid = f(mid)?;
        if f_mid == 0.0 || (hi - lo) / 2.0 < IRR_TOLERANCE {
            return Some(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    warn!("IRR bisection did not converge within {} iterations", IRR_MAX_ITER);
    None
}

/// First year whose cumulative cash flow reaches the investment.
pub fn payback_period(cashflows: &[f64], initial_investment: f64) -> Option<usize> {
    let mut cumulative = 0.0_f64;
    for (i, cf) in cashflows.iter().enumerate() {
        cumulative += *cf;
        if cumulative >= initial_investment {
            return Some(i + 1);
        }
    }
    None
}

/// Total forecast cash flow over the investment.
pub fn roi(cashflows: &[f64], initial_investment: f64) -> Option<f64> {
    if initial_investment == 0.0 {
        return None;
    }
    Some(cashflows.iter().sum::<f64>() / initial_investment)
}

pub fn evaluate(cashflows: &[f64], discount_rate: f64, initial_investment: f64) -> Result<ValuationResult> {
    Ok(ValuationResult {
        npv: npv(cashflows, discount_rate, initial_investment)?,
        irr: irr(cashflows, initial_investment),
        payback_years: payback_period(cashflows, initial_investment),
        roi: roi(cashflows, initial_investment),
    })
}
