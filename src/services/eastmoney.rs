// src/services/eastmoney.rs
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::{Result, ValuationError};
use crate::models::{StatementKind, Ticker};
use crate::services::table::{Table, REPORT_DATE};

const DATACENTER_URL: &str = "https://datacenter.eastmoney.com/securities/api/data/get";
const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
const SPOT_URL: &str = "https://82.push2.eastmoney.com/api/qt/clist/get";

/// Shenzhen main board, ChiNext, Shanghai main board and STAR market.
const SPOT_MARKETS: &str = "m:0 t:6,m:0 t:80,m:1 t:2,m:1 t:23";

pub const SPOT_LABEL: &str = "spot";

/// Upstream provider of raw statement, price and market-cap tables.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_table(&self, ticker: &Ticker, kind: StatementKind) -> Result<Table>;

    /// Snapshot of every listed share: `code`, `name`, `total_market_cap`.
    async fn fetch_spot(&self) -> Result<Table>;
}

#[derive(Debug, Deserialize)]
struct DatacenterResponse {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    result: Option<DatacenterResult>,
}

#[derive(Debug, Deserialize)]
struct DatacenterResult {
    #[serde(default)]
    data: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct KlineResponse {
    #[serde(default)]
    rc: i64,
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SpotResponse {
    data: Option<SpotData>,
}

#[derive(Debug, Deserialize)]
struct SpotData {
    #[serde(default)]
    diff: Vec<Map<String, Value>>,
}

pub struct EastmoneyClient {
    client: Client,
}

impl EastmoneyClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .timeout(timeout)
            .build()
            .map_err(|e| ValuationError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(EastmoneyClient { client })
    }

    async fn get_text(&self, label: &str, url: &str, query: &[(&str, String)]) -> Result<String> {
        info!("Fetching {} from {}", label, url);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ValuationError::unavailable(label, e.to_string()))?;

        if !response.status().is_success() {
            return Err(ValuationError::unavailable(
                label,
                format!("HTTP {}", response.status()),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| ValuationError::unavailable(label, e.to_string()))
    }

    async fn fetch_statement(&self, ticker: &Ticker, report: &str, style: &str) -> Result<Table> {
        let label = ticker.to_string();
        let query = [
            ("type", report.to_string()),
            ("sty", style.to_string()),
            ("filter", format!("(SECUCODE=\"{}\")", ticker.secucode())),
            ("p", "1".to_string()),
            ("ps", "200".to_string()),
            ("sr", "-1".to_string()),
            ("st", REPORT_DATE.to_string()),
            ("source", "HSF10".to_string()),
            ("client", "PC".to_string()),
        ];
        let body = self.get_text(&label, DATACENTER_URL, &query).await?;
        statement_table_from_json(&label, &body)
    }

    async fn fetch_daily(&self, ticker: &Ticker) -> Result<Table> {
        let label = ticker.to_string();
        let query = [
            ("secid", ticker.secid()),
            ("klt", "101".to_string()),
            ("fqt", "0".to_string()),
            ("beg", "0".to_string()),
            ("end", "20500101".to_string()),
            ("fields1", "f1,f2,f3".to_string()),
            ("fields2", "f51,f52,f53,f54,f55,f56".to_string()),
        ];
        let body = self.get_text(&label, KLINE_URL, &query).await?;
        daily_table_from_json(&label, &body)
    }
}

#[async_trait]
impl DataSource for EastmoneyClient {
    async fn fetch_table(&self, ticker: &Ticker, kind: StatementKind) -> Result<Table> {
        match kind {
            StatementKind::Income => {
                self.fetch_statement(ticker, "RPT_F10_FINANCE_GINCOME", "APP_F10_GINCOME").await
            }
            StatementKind::CashFlow => {
                self.fetch_statement(ticker, "RPT_F10_FINANCE_GCASHFLOW", "APP_F10_GCASHFLOW").await
            }
            StatementKind::Balance => {
                self.fetch_statement(ticker, "RPT_F10_FINANCE_GBALANCE", "F10_FINANCE_GBALANCE").await
            }
            StatementKind::DailyPrice => self.fetch_daily(ticker).await,
        }
    }

    async fn fetch_spot(&self) -> Result<Table> {
        let query = [
            ("pn", "1".to_string()),
            ("pz", "6000".to_string()),
            ("po", "1".to_string()),
            ("np", "1".to_string()),
            ("fltt", "2".to_string()),
            ("invt", "2".to_string()),
            ("fid", "f3".to_string()),
            ("fs", SPOT_MARKETS.to_string()),
            ("fields", "f12,f14,f20".to_string()),
        ];
        let body = self.get_text(SPOT_LABEL, SPOT_URL, &query).await?;
        spot_table_from_json(&body)
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        // Gaps are stored as zero, matching how the cache files have always been written.
        Value::Null => "0".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// One row per report period, columns in name order with `REPORT_DATE` first.
pub fn statement_table_from_json(label: &str, body: &str) -> Result<Table> {
    let response: DatacenterResponse = serde_json::from_str(body)
        .map_err(|e| ValuationError::malformed(label, format!("statement payload: {}", e)))?;

    let records = match response.result {
        Some(result) if !result.data.is_empty() => result.data,
        _ => {
            let reason = response.message.unwrap_or_else(|| "no report periods".to_string());
            warn!("Statement request for {} returned nothing (success={}): {}", label, response.success, reason);
            return Err(ValuationError::unavailable(label, reason));
        }
    };

    let mut columns: BTreeSet<&str> = BTreeSet::new();
    for record in &records {
        columns.extend(record.keys().map(String::as_str));
    }
    let mut headers: Vec<String> = Vec::with_capacity(columns.len());
    if columns.remove(REPORT_DATE) {
        headers.push(REPORT_DATE.to_string());
    }
    headers.extend(columns.into_iter().map(str::to_string));

    let rows = records
        .iter()
        .map(|record| {
            headers
                .iter()
                .map(|h| record.get(h).map(cell_text).unwrap_or_else(|| "0".to_string()))
                .collect()
        })
        .collect();

    Ok(Table::new(label, headers, rows))
}

/// Kline lines look like `2024-01-02,10.50,10.80,10.90,10.40,123456`.
pub fn daily_table_from_json(label: &str, body: &str) -> Result<Table> {
    let response: KlineResponse = serde_json::from_str(body)
        .map_err(|e| ValuationError::malformed(label, format!("kline payload: {}", e)))?;

    if response.rc != 0 {
        return Err(ValuationError::unavailable(label, format!("kline rc={}", response.rc)));
    }
    let klines = response.data.map(|d| d.klines).unwrap_or_default();
    if klines.is_empty() {
        return Err(ValuationError::unavailable(label, "no price history"));
    }

    let headers = ["date", "open", "close", "high", "low", "volume"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();

    let mut rows: Vec<Vec<String>> = Vec::with_capacity(klines.len());
    for line in &klines {
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() < headers.len() {
            warn!("Skipping short kline for {}: {}", label, line);
            continue;
        }
        rows.push(parts[..headers.len()].iter().map(|p| p.trim().to_string()).collect());
    }

    Ok(Table::new(label, headers, rows))
}

pub fn spot_table_from_json(body: &str) -> Result<Table> {
    let response: SpotResponse = serde_json::from_str(body)
        .map_err(|e| ValuationError::malformed(SPOT_LABEL, format!("spot payload: {}", e)))?;

    let diff = response.data.map(|d| d.diff).unwrap_or_default();
    if diff.is_empty() {
        return Err(ValuationError::unavailable(SPOT_LABEL, "empty spot snapshot"));
    }

    let headers = vec![
        "code".to_string(),
        "name".to_string(),
        "total_market_cap".to_string(),
    ];
    let rows = diff
        .iter()
        .map(|item| {
            ["f12", "f14", "f20"]
                .iter()
                .map(|field| match item.get(*field) {
                    // Suspended shares report "-" for market cap.
                    Some(Value::String(s)) if s == "-" => String::new(),
                    Some(value) => cell_text(value),
                    None => String::new(),
                })
                .collect()
        })
        .collect();

    Ok(Table::new(SPOT_LABEL, headers, rows))
}
