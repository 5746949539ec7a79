// src/error.rs
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ValuationError>;

#[derive(Debug, Error)]
pub enum ValuationError {
    /// Upstream provider could not deliver the table.
    #[error("data unavailable for {ticker}: {message}")]
    DataUnavailable { ticker: String, message: String },

    #[error("{ticker}: missing field '{field}'")]
    MissingField { ticker: String, field: String },

    #[error("{ticker}: malformed data: {detail}")]
    Malformed { ticker: String, detail: String },

    /// Numeric input outside the domain of the formula.
    #[error("domain error: {0}")]
    Domain(String),

    #[error("cache error at {path}: {source}")]
    Cache {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("worker task failed: {0}")]
    Task(String),
}

impl ValuationError {
    pub fn unavailable(ticker: impl Into<String>, message: impl Into<String>) -> Self {
        ValuationError::DataUnavailable {
            ticker: ticker.into(),
            message: message.into(),
        }
    }

    pub fn missing(ticker: impl Into<String>, field: impl Into<String>) -> Self {
        ValuationError::MissingField {
            ticker: ticker.into(),
            field: field.into(),
        }
    }

    pub fn malformed(ticker: impl Into<String>, detail: impl Into<String>) -> Self {
        ValuationError::Malformed {
            ticker: ticker.into(),
            detail: detail.into(),
        }
    }
}
