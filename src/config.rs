// src/config.rs
use log::{info, warn};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, ValuationError};
use crate::models::{GrowthPhase, Ticker, DEFAULT_TICKERS};

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub tickers: Vec<Ticker>,
    pub project: ProjectSettings,
    pub dcf: DcfSettings,
    pub risk: RiskSettings,
    pub http_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ProjectSettings {
    pub wacc: f64,
    pub horizon: u32,
    pub base_revenue: f64,
}

#[derive(Debug, Clone)]
pub struct DcfSettings {
    pub wacc: f64,
    pub perpetual_growth: f64,
    pub phases: Vec<GrowthPhase>,
}

#[derive(Debug, Clone)]
pub struct RiskSettings {
    pub confidence: f64,
    /// Trailing weeks for the scalar VaR; `None` uses the full history.
    pub window_weeks: Option<usize>,
    pub ma_window: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: PathBuf::from("data"),
            tickers: default_tickers(),
            project: ProjectSettings {
                wacc: 0.10,
                horizon: 5,
                base_revenue: 100e6,
            },
            dcf: DcfSettings {
                wacc: 0.08,
                perpetual_growth: 0.03,
                phases: vec![
                    GrowthPhase { years: 5, growth: 0.12 },
                    GrowthPhase { years: 3, growth: 0.06 },
                ],
            },
            risk: RiskSettings {
                confidence: 0.95,
                window_weeks: None,
                ma_window: 20,
            },
            http_timeout: Duration::from_secs(30),
        }
    }
}

fn default_tickers() -> Vec<Ticker> {
    DEFAULT_TICKERS
        .iter()
        .filter_map(|t| t.parse().ok())
        .collect()
}

impl Settings {
    /// Reads overrides from the process environment. Call `dotenv().ok()` first
    /// if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(dir) = lookup("VALUATION_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }

        if let Some(list) = lookup("VALUATION_TICKERS") {
            let tickers = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<Ticker>())
                .collect::<Result<Vec<_>>>()?;
            if tickers.is_empty() {
                warn!("VALUATION_TICKERS is empty, keeping the default list");
            } else {
                settings.tickers = tickers;
            }
        }

        parse_finite(&lookup, "PROJECT_WACC", &mut settings.project.wacc)?;
        parse_into(&lookup, "PROJECT_HORIZON", &mut settings.project.horizon)?;
        parse_finite(&lookup, "PROJECT_BASE_REVENUE", &mut settings.project.base_revenue)?;
        parse_finite(&lookup, "DCF_WACC", &mut settings.dcf.wacc)?;
        parse_finite(&lookup, "DCF_PERPETUAL_GROWTH", &mut settings.dcf.perpetual_growth)?;
        parse_finite(&lookup, "VAR_CONFIDENCE", &mut settings.risk.confidence)?;

        if let Some(raw) = lookup("VAR_WINDOW_WEEKS") {
            let weeks: usize = parse_value("VAR_WINDOW_WEEKS", &raw)?;
            if weeks == 0 {
                return Err(ValuationError::Config(
                    "VAR_WINDOW_WEEKS must be at least 1".to_string(),
                ));
            }
            settings.risk.window_weeks = Some(weeks);
        }

        let mut timeout_secs = settings.http_timeout.as_secs();
        parse_into(&lookup, "EASTMONEY_TIMEOUT_SECS", &mut timeout_secs)?;
        settings.http_timeout = Duration::from_secs(timeout_secs);

        if !(0.0..1.0).contains(&settings.risk.confidence) {
            return Err(ValuationError::Config(format!(
                "VAR_CONFIDENCE must be in [0, 1), got {}",
                settings.risk.confidence
            )));
        }

        info!(
            "Settings loaded: data_dir={}, {} tickers",
            settings.data_dir.display(),
            settings.tickers.len()
        );
        Ok(settings)
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ValuationError::Config(format!("{} has invalid value '{}'", key, raw)))
}

fn parse_into<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *target = parse_value(key, &raw)?;
    }
    Ok(())
}

/// Like `parse_into` for rates and amounts; NaN and infinities are rejected.
fn parse_finite<F>(lookup: &F, key: &str, target: &mut f64) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        let value: f64 = parse_value(key, &raw)?;
        if !value.is_finite() {
            return Err(ValuationError::Config(format!("{} must be finite, got '{}'", key, raw)));
        }
        *target = value;
    }
    Ok(())
}
