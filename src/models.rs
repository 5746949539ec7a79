// src/models.rs
use serde::{Serialize, Deserialize};
use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ValuationError;

/// The fifteen A-share tickers every report runs over unless overridden.
pub const DEFAULT_TICKERS: [&str; 15] = [
    "sz000598", "sz000605", "sz000685", "sz003039",
    "sh600008", "sh600168", "sh600187", "sh600283",
    "sh600461", "sh600769", "sh601158", "sh601199",
    "sh601368", "sh603291", "sh603759",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    Shenzhen,
    Shanghai,
}

impl Exchange {
    pub fn suffix(&self) -> &'static str {
        match self {
            Exchange::Shenzhen => "SZ",
            Exchange::Shanghai => "SH",
        }
    }

    /// Market id used by the quote endpoints (`0.000598`, `1.600008`).
    pub fn market_id(&self) -> u8 {
        match self {
            Exchange::Shenzhen => 0,
            Exchange::Shanghai => 1,
        }
    }
}

/// Lower-case exchange prefix followed by the six digit code, e.g. `sz000598`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticker {
    exchange: Exchange,
    code: String,
}

impl Ticker {
    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// `000598.SZ`
    pub fn secucode(&self) -> String {
        format!("{}.{}", self.code, self.exchange.suffix())
    }

    /// `0.000598`
    pub fn secid(&self) -> String {
        format!("{}.{}", self.exchange.market_id(), self.code)
    }
}

impl FromStr for Ticker {
    type Err = ValuationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = Regex::new(r"^(sz|sh)(\d{6})$").map_err(|e| ValuationError::Malformed {
            ticker: s.to_string(),
            detail: e.to_string(),
        })?;
        let normalized = s.trim().to_lowercase();
        let caps = re.captures(&normalized).ok_or_else(|| ValuationError::Malformed {
            ticker: s.to_string(),
            detail: "expected sz/sh prefix followed by six digits".to_string(),
        })?;
        let exchange = match &caps[1] {
            "sz" => Exchange::Shenzhen,
            _ => Exchange::Shanghai,
        };
        Ok(Ticker {
            exchange,
            code: caps[2].to_string(),
        })
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let prefix = match self.exchange {
            Exchange::Shenzhen => "sz",
            Exchange::Shanghai => "sh",
        };
        write!(f, "{}{}", prefix, self.code)
    }
}

/// Upstream tables kept per ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Income,
    CashFlow,
    Balance,
    DailyPrice,
}

impl StatementKind {
    /// Suffix of the cache file name.
    pub fn file_stem(&self) -> &'static str {
        match self {
            StatementKind::Income => "income",
            StatementKind::CashFlow => "cashflow",
            StatementKind::Balance => "balance",
            StatementKind::DailyPrice => "daily",
        }
    }
}

/// Sparse year-indexed schedule. Years past (or between) the explicit keys
/// resolve to the value stored under the largest key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    entries: BTreeMap<u32, f64>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, year: u32, value: f64) -> Self {
        self.entries.insert(year, value);
        self
    }

    pub fn insert(&mut self, year: u32, value: f64) {
        self.entries.insert(year, value);
    }

    /// Carry-forward lookup. An empty schedule resolves to zero.
    pub fn resolve(&self, year: u32) -> f64 {
        if let Some(value) = self.entries.get(&year) {
            return *value;
        }
        self.entries
            .values()
            .next_back()
            .copied()
            .unwrap_or(0.0)
    }

    /// Sum of the explicitly authored values.
    pub fn total(&self) -> f64 {
        self.entries.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(u32, f64)> for Schedule {
    fn from_iter<I: IntoIterator<Item = (u32, f64)>>(iter: I) -> Self {
        Schedule {
            entries: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectAssumptions {
    pub rd_schedule: Schedule,
    pub capex_schedule: Schedule,
    pub wc_ratio: f64,
    pub revenue_growth: Schedule,
    pub margin: f64,
    pub tax_rate: f64,
}

impl ProjectAssumptions {
    /// Up-front spend the project has to recover.
    pub fn initial_investment(&self) -> f64 {
        self.rd_schedule.total() + self.capex_schedule.total()
    }
}

/// Free cash flow per forecast year, year 1 first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashFlowSeries(Vec<f64>);

impl CashFlowSeries {
    pub fn new(values: Vec<f64>) -> Self {
        CashFlowSeries(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn last(&self) -> Option<f64> {
        self.0.last().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationResult {
    pub npv: f64,
    pub irr: Option<f64>,
    pub payback_years: Option<usize>,
    pub roi: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthPhase {
    pub years: u32,
    pub growth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DcfResult {
    pub enterprise_value: f64,
    pub net_debt: f64,
    pub equity_value: f64,
    pub market_cap: Option<f64>,
    pub valuation_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapeResult {
    pub latest_close: f64,
    pub average_eps: f64,
    pub years_used: usize,
    pub cape: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatedValue {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSeries {
    /// Summed log returns per week-ending Friday; closed weeks are zero.
    pub weekly: Vec<DatedValue>,
    /// Expanding-window VaR, one point per week-ending Friday.
    pub var: Vec<DatedValue>,
    /// `(close - MA20) / MA20`, starting at the twentieth close.
    pub technical: Vec<DatedValue>,
    /// Running mean of `technical` over the valid observations so far, from
    /// the twentieth valid observation on.
    pub technical_trend: Vec<DatedValue>,
}
