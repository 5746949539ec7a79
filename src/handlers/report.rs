// src/handlers/report.rs
use std::cmp::Ordering;
use std::fmt;
use std::io::Write;

use crate::error::{Result, ValuationError};
use crate::models::Ticker;
use crate::services::table::Table;

/// Marker for a metric that has no defined value.
pub const UNDEFINED: &str = "NaN";
/// Cell filler for metrics of a ticker whose pipeline failed.
pub const MISSING: &str = "-";

/// One row per ticker. The first column is always the ticker and the last
/// is always the status.
#[derive(Debug, Clone)]
pub struct Report {
    title: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Report {
    pub fn new(title: impl Into<String>, metrics: &[&str]) -> Self {
        let mut headers = vec!["ticker".to_string()];
        headers.extend(metrics.iter().map(|m| m.to_string()));
        headers.push("status".to_string());
        Report {
            title: title.into(),
            headers,
            rows: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn push_outcome<T, F>(&mut self, ticker: &Ticker, outcome: &Result<T>, cells: F)
    where
        F: Fn(&T) -> Vec<String>,
    {
        let metric_count = self.headers.len() - 2;
        let mut row = vec![ticker.to_string()];
        match outcome {
            Ok(value) => row.extend(cells(value)),
            Err(_) => row.extend(std::iter::repeat(MISSING.to_string()).take(metric_count)),
        }
        row.resize(metric_count + 1, MISSING.to_string());
        row.push(status(outcome));
        self.rows.push(row);
    }

    pub fn to_table(&self) -> Table {
        Table::new(self.title.clone(), self.headers.clone(), self.rows.clone())
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        self.to_table().write_to(writer)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let line = |cells: &[String]| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", line(&self.headers))?;
        let total: usize = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
        writeln!(f, "{}", "-".repeat(total))?;
        for row in &self.rows {
            writeln!(f, "{}", line(row))?;
        }
        Ok(())
    }
}

/// `ok`, `undefined: ..` for numeric-domain problems, `failed: ..` otherwise.
pub fn status<T>(outcome: &Result<T>) -> String {
    match outcome {
        Ok(_) => "ok".to_string(),
        Err(ValuationError::Domain(msg)) => format!("undefined: {}", msg),
        Err(e) => format!("failed: {}", e),
    }
}

pub fn number(value: f64, decimals: usize) -> String {
    if value.is_finite() {
        format!("{:.*}", decimals, value)
    } else {
        UNDEFINED.to_string()
    }
}

pub fn optional(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => number(v, decimals),
        None => UNDEFINED.to_string(),
    }
}

pub fn percent(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(v) => format!("{:.2}%", v * 100.0),
        None => UNDEFINED.to_string(),
    }
}

pub fn count(value: Option<usize>) -> String {
    value.map_or_else(|| UNDEFINED.to_string(), |v| v.to_string())
}

/// Stable ascending sort on `key`. Items whose key is undefined or not
/// finite go after every ranked item, never before.
pub fn rank_ascending<T, K>(items: &mut [T], key: K)
where
    K: Fn(&T) -> Option<f64>,
{
    items.sort_by(|a, b| {
        let ka = key(a).filter(|v| v.is_finite());
        let kb = key(b).filter(|v| v.is_finite());
        match (ka, kb) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}
