// src/services/risk.rs
use chrono::{Datelike, Duration, NaiveDate};
use log::debug;

use crate::error::{Result, ValuationError};
use crate::models::{DatedValue, PricePoint, RiskSeries};
use crate::services::table::Table;

/// Daily closes ordered by trading date.
pub fn closes(daily: &Table) -> Result<Vec<PricePoint>> {
    daily
        .rows_by_date("date")?
        .into_iter()
        .map(|(date, row)| row.number("close").map(|close| PricePoint { date, close }))
        .collect()
}

/// `ln(close_t) - ln(close_t-1)`, dated at t. The first close has no return.
pub fn log_returns(prices: &[PricePoint]) -> Result<Vec<DatedValue>> {
    if let Some(bad) = prices.iter().find(|p| p.close <= 0.0) {
        return Err(ValuationError::Domain(format!(
            "non-positive close {} on {}",
            bad.close, bad.date
        )));
    }
    Ok(prices
        .windows(2)
        .map(|pair| DatedValue {
            date: pair[1].date,
            value: pair[1].close.ln() - pair[0].close.ln(),
        })
        .collect())
}

/// The Friday closing the week `date` falls in. Saturday and Sunday roll
/// forward into the following week.
pub fn week_ending_friday(date: NaiveDate) -> NaiveDate {
    let weekday = date.weekday().num_days_from_monday() as i64;
    let offset = (4 - weekday).rem_euclid(7);
    date + Duration::days(offset)
}

/// Sums daily log returns into non-overlapping Friday-ending weeks. A week
/// with no trading day inside the covered range (a holiday closure) is kept
/// as a zero return.
pub fn weekly_log_returns(daily_returns: &[DatedValue]) -> Vec<DatedValue> {
    let mut weekly: Vec<DatedValue> = Vec::new();
    for r in daily_returns {
        let week = week_ending_friday(r.date);
        if let Some(last) = weekly.last_mut() {
            if last.date == week {
                last.value += r.value;
                continue;
            }
            let mut gap = last.date + Duration::weeks(1);
            while gap < week {
                weekly.push(DatedValue { date: gap, value: 0.0 });
                gap += Duration::weeks(1);
            }
        }
        weekly.push(DatedValue { date: week, value: r.value });
    }
    weekly
}

/// Percentile with linear interpolation between closest ranks. `pct` is in
/// `[0, 100]`.
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Historical-simulation VaR: the loss at the `(1 - confidence)` quantile,
/// reported as a positive number.
pub fn historical_var(returns: &[f64], confidence: f64) -> Option<f64> {
    percentile(returns, (1.0 - confidence) * 100.0).map(|q| -q)
}

/// VaR over the last `window` weeks, or the whole history when `window` is
/// `None` or longer than the history.
pub fn trailing_var(weekly: &[DatedValue], confidence: f64, window: Option<usize>) -> Option<f64> {
    let start = window
        .map(|w| weekly.len().saturating_sub(w))
        .unwrap_or(0);
    let values: Vec<f64> = weekly[start..].iter().map(|r| r.value).collect();
    historical_var(&values, confidence)
}

/// VaR recomputed at every week over all weeks up to and including it.
pub fn expanding_var(weekly: &[DatedValue], confidence: f64) -> Vec<DatedValue> {
    let mut seen = Vec::with_capacity(weekly.len());
    weekly
        .iter()
        .filter_map(|r| {
            seen.push(r.value);
            historical_var(&seen, confidence).map(|value| DatedValue { date: r.date, value })
        })
        .collect()
}

/// Simple moving average of closes; `None` until `window` closes are available.
pub fn moving_average(prices: &[PricePoint], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; prices.len()];
    }
    let mut sum = 0.0;
    prices
        .iter()
        .enumerate()
        .map(|(i, p)| {
            sum += p.close;
            if i >= window {
                sum -= prices[i - window].close;
            }
            if i + 1 >= window {
                Some(sum / window as f64)
            } else {
                None
            }
        })
        .collect()
}

/// Deviation of each close from its moving average, as a fraction of the
/// average. Starts at the first date with a full window.
pub fn technical_risk(prices: &[PricePoint], window: usize) -> Vec<DatedValue> {
    moving_average(prices, window)
        .into_iter()
        .zip(prices)
        .filter_map(|(ma, p)| {
            ma.filter(|m| *m != 0.0).map(|m| DatedValue {
                date: p.date,
                value: (p.close - m) / m,
            })
        })
        .collect()
}

/// Expanding mean over the valid observations seen so far, emitted once at
/// least `min_periods` of them have accrued.
pub fn running_mean(values: &[DatedValue], min_periods: usize) -> Vec<DatedValue> {
    let mut total = 0.0;
    values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| {
            total += v.value;
            if i + 1 < min_periods {
                return None;
            }
            Some(DatedValue {
                date: v.date,
                value: total / (i + 1) as f64,
            })
        })
        .collect()
}

pub fn risk_series(prices: &[PricePoint], confidence: f64, ma_window: usize) -> Result<RiskSeries> {
    let daily = log_returns(prices)?;
    let weekly = weekly_log_returns(&daily);
    debug!("{} closes -> {} daily / {} weekly returns", prices.len(), daily.len(), weekly.len());

    let technical = technical_risk(prices, ma_window);
    let technical_trend = running_mean(&technical, ma_window);
    Ok(RiskSeries {
        var: expanding_var(&weekly, confidence),
        weekly,
        technical,
        technical_trend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn prices(start: NaiveDate, closes: &[f64]) -> Vec<PricePoint> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| PricePoint { date: start + Duration::days(i as i64), close: *c })
            .collect()
    }

    #[test]
    fn weeks_end_on_friday() {
        // 2024-01-01 is a Monday.
        assert_eq!(week_ending_friday(d(2024, 1, 1)), d(2024, 1, 5));
        assert_eq!(week_ending_friday(d(2024, 1, 5)), d(2024, 1, 5));
        assert_eq!(week_ending_friday(d(2024, 1, 6)), d(2024, 1, 12));
        assert_eq!(week_ending_friday(d(2024, 1, 7)), d(2024, 1, 12));
    }

    #[test]
    fn daily_returns_sum_into_weeks() {
        let p = vec![
            PricePoint { date: d(2024, 1, 1), close: 10.0 },
            PricePoint { date: d(2024, 1, 2), close: 11.0 },
            PricePoint { date: d(2024, 1, 3), close: 12.0 },
            PricePoint { date: d(2024, 1, 4), close: 11.0 },
            PricePoint { date: d(2024, 1, 5), close: 12.0 },
            PricePoint { date: d(2024, 1, 8), close: 13.0 },
        ];
        let weekly = weekly_log_returns(&log_returns(&p).unwrap());
        assert_eq!(weekly.len(), 2);
        assert_eq!(weekly[0].date, d(2024, 1, 5));
        assert!((weekly[0].value - (12.0f64 / 10.0).ln()).abs() < 1e-12);
        assert_eq!(weekly[1].date, d(2024, 1, 12));
        assert!((weekly[1].value - (13.0f64 / 12.0).ln()).abs() < 1e-12);
    }

    #[test]
    fn closed_week_counts_as_zero_return() {
        // 2024-01-08..12 has no trading day.
        let mut p = prices(d(2024, 1, 1), &[10.0, 10.5, 11.0, 10.5, 11.0]);
        p.extend(prices(d(2024, 1, 15), &[12.0, 11.5, 12.5, 12.0, 13.0]));
        let weekly = weekly_log_returns(&log_returns(&p).unwrap());

        let dates: Vec<NaiveDate> = weekly.iter().map(|w| w.date).collect();
        assert_eq!(dates, vec![d(2024, 1, 5), d(2024, 1, 12), d(2024, 1, 19)]);
        assert_eq!(weekly[1].value, 0.0);
        assert!((weekly[2].value - (13.0f64 / 11.0).ln()).abs() < 1e-12);
        assert_eq!(expanding_var(&weekly, 0.95).len(), 3);
    }

    #[test]
    fn multi_week_closure_fills_every_friday() {
        let p = vec![
            PricePoint { date: d(2024, 1, 31), close: 10.0 },
            PricePoint { date: d(2024, 2, 1), close: 10.2 },
            PricePoint { date: d(2024, 2, 26), close: 9.8 },
        ];
        let weekly = weekly_log_returns(&log_returns(&p).unwrap());
        let dates: Vec<NaiveDate> = weekly.iter().map(|w| w.date).collect();
        assert_eq!(
            dates,
            vec![d(2024, 2, 2), d(2024, 2, 9), d(2024, 2, 16), d(2024, 2, 23), d(2024, 3, 1)]
        );
        assert!(weekly[1..4].iter().all(|w| w.value == 0.0));
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        assert!((percentile(&[4.0, 1.0, 3.0, 2.0], 5.0).unwrap() - 1.15).abs() < 1e-12);
        assert_eq!(percentile(&[7.0], 5.0), Some(7.0));
        assert_eq!(percentile(&[], 5.0), None);
        assert_eq!(percentile(&[1.0, 2.0, 3.0], 50.0), Some(2.0));
    }

    #[test]
    fn var_matches_known_fifth_percentile() {
        // -0.050, -0.049, ..., 0.050: the 5th percentile sits exactly on -0.045.
        let returns: Vec<f64> = (0..=100).map(|i| i as f64 / 1000.0 - 0.05).collect();
        let var = historical_var(&returns, 0.95).unwrap();
        assert!((var - 0.045).abs() < 1e-12);
    }

    #[test]
    fn trailing_window_limits_history() {
        let weekly: Vec<DatedValue> = [-0.5, 0.01, 0.02, -0.01]
            .iter()
            .enumerate()
            .map(|(i, v)| DatedValue { date: d(2024, 1, 5) + Duration::weeks(i as i64), value: *v })
            .collect();
        let full = trailing_var(&weekly, 0.95, None).unwrap();
        let recent = trailing_var(&weekly, 0.95, Some(3)).unwrap();
        assert!(full > recent);
        assert_eq!(trailing_var(&weekly, 0.95, Some(100)), Some(full));
    }

    #[test]
    fn expanding_var_starts_with_one_observation() {
        let weekly: Vec<DatedValue> = [-0.02, 0.03, -0.05]
            .iter()
            .enumerate()
            .map(|(i, v)| DatedValue { date: d(2024, 1, 5) + Duration::weeks(i as i64), value: *v })
            .collect();
        let series = expanding_var(&weekly, 0.95);
        assert_eq!(series.len(), 3);
        assert!((series[0].value - 0.02).abs() < 1e-12);
        assert!((series[2].value - historical_var(&[-0.02, 0.03, -0.05], 0.95).unwrap()).abs() < 1e-12);
    }

    #[test]
    fn technical_risk_needs_a_full_window() {
        let closes: Vec<f64> = (1..=25).map(|i| i as f64).collect();
        let p = prices(d(2024, 1, 1), &closes);
        let tech = technical_risk(&p, 20);
        assert_eq!(tech.len(), 6);
        assert_eq!(tech[0].date, p[19].date);
        // MA of 1..=20 is 10.5
        assert!((tech[0].value - (20.0 - 10.5) / 10.5).abs() < 1e-12);
    }

    #[test]
    fn running_mean_divides_by_valid_count() {
        let values = vec![
            DatedValue { date: d(2024, 1, 1), value: 0.1 },
            DatedValue { date: d(2024, 1, 2), value: 0.3 },
            DatedValue { date: d(2024, 1, 3), value: 0.5 },
        ];
        let trend = running_mean(&values, 1);
        assert!((trend[0].value - 0.1).abs() < 1e-12);
        assert!((trend[1].value - 0.2).abs() < 1e-12);

        let gated = running_mean(&values, 2);
        assert_eq!(gated.len(), 2);
        assert_eq!(gated[0].date, d(2024, 1, 2));
        assert!((gated[1].value - 0.3).abs() < 1e-12);
    }

    #[test]
    fn trend_waits_for_a_full_window_of_technical_values() {
        let closes: Vec<f64> = (1..=25).map(|i| i as f64).collect();
        let p = prices(d(2024, 1, 1), &closes);
        let series = risk_series(&p, 0.95, 20).unwrap();
        assert_eq!(series.technical.len(), 6);
        assert!(series.technical_trend.is_empty());

        let closes: Vec<f64> = (1..=40).map(|i| i as f64).collect();
        let p = prices(d(2024, 1, 1), &closes);
        let series = risk_series(&p, 0.95, 20).unwrap();
        // 20th technical value sits at close index 38.
        assert_eq!(series.technical_trend.len(), 2);
        assert_eq!(series.technical_trend[0].date, p[38].date);
    }

    #[test]
    fn flat_prices_have_no_risk() {
        let p = prices(d(2024, 1, 1), &[5.0; 40]);
        let series = risk_series(&p, 0.95, 20).unwrap();
        assert!(series.var.iter().all(|v| v.value.abs() < 1e-12));
        assert!(series.technical.iter().all(|v| v.value.abs() < 1e-12));
        assert_eq!(series.technical.len(), 21);
        assert_eq!(series.technical_trend.len(), 2);
        assert_eq!(series.var.len(), series.weekly.len());
    }

    #[test]
    fn non_positive_close_is_rejected() {
        let p = prices(d(2024, 1, 1), &[1.0, 0.0]);
        assert!(log_returns(&p).is_err());
    }
}
