// src/handlers/mod.rs
use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{Result, ValuationError};
use crate::models::{StatementKind, Ticker};
use crate::services::cache::TableCache;
use crate::services::eastmoney::{DataSource, SPOT_LABEL};
use crate::services::table::Table;

pub mod cape;
pub mod dcf;
pub mod project;
pub mod report;
pub mod risk;

/// Everything a per-ticker pipeline needs: settings, the on-disk cache and
/// the upstream provider behind it.
pub struct Context {
    pub settings: Settings,
    pub cache: TableCache,
    pub source: Arc<dyn DataSource>,
}

impl Context {
    pub fn new(settings: Settings, source: Arc<dyn DataSource>) -> Self {
        let cache = TableCache::new(settings.data_dir.clone());
        Context {
            settings,
            cache,
            source,
        }
    }

    pub async fn load(&self, ticker: &Ticker, kind: StatementKind) -> Result<Table> {
        let key = TableCache::statement_key(ticker, kind);
        let label = ticker.to_string();
        self.cache
            .get_or_fetch(&key, &label, || self.source.fetch_table(ticker, kind))
            .await
    }

    pub async fn load_spot(&self) -> Result<Table> {
        self.cache
            .get_or_fetch(SPOT_LABEL, SPOT_LABEL, || self.source.fetch_spot())
            .await
    }
}

/// Runs `job` for every configured ticker, one task each, and returns the
/// outcomes in ticker order. A failing ticker never stops the others.
pub async fn run_batch<T, F, Fut>(ctx: Arc<Context>, job: F) -> Vec<(Ticker, Result<T>)>
where
    T: Send + 'static,
    F: Fn(Arc<Context>, Ticker) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let handles: Vec<_> = ctx
        .settings
        .tickers
        .iter()
        .map(|ticker| (ticker.clone(), tokio::spawn(job(ctx.clone(), ticker.clone()))))
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (ticker, handle) in handles {
        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("{}: worker task aborted: {}", ticker, e);
                Err(ValuationError::Task(e.to_string()))
            }
        };
        match &outcome {
            Ok(_) => info!("{}: done", ticker),
            Err(e) => warn!("{}: {}", ticker, e),
        }
        outcomes.push((ticker, outcome));
    }
    outcomes
}

/// Statement, price and snapshot fetches for every ticker, so later reports
/// run from the cache alone.
pub async fn warm_cache(ctx: Arc<Context>) -> Vec<(Ticker, Result<usize>)> {
    if let Err(e) = ctx.load_spot().await {
        warn!("Spot snapshot unavailable: {}", e);
    }
    run_batch(ctx, warm_ticker).await
}

async fn warm_ticker(ctx: Arc<Context>, ticker: Ticker) -> Result<usize> {
    let mut rows = 0;
    for kind in [
        StatementKind::Income,
        StatementKind::CashFlow,
        StatementKind::Balance,
        StatementKind::DailyPrice,
    ] {
        rows += ctx.load(&ticker, kind).await?.len();
    }
    Ok(rows)
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::Context;
    use crate::config::Settings;
    use crate::error::{Result, ValuationError};
    use crate::models::{StatementKind, Ticker};
    use crate::services::eastmoney::{DataSource, SPOT_LABEL};
    use crate::services::table::Table;

    /// In-memory provider keyed by ticker and statement kind.
    #[derive(Default)]
    pub struct StubSource {
        tables: HashMap<(String, StatementKind), String>,
        spot: Option<String>,
        pub calls: AtomicUsize,
    }

    impl StubSource {
        pub fn with(mut self, ticker: &str, kind: StatementKind, csv: &str) -> Self {
            self.tables.insert((ticker.to_string(), kind), csv.to_string());
            self
        }

        pub fn with_spot(mut self, csv: &str) -> Self {
            self.spot = Some(csv.to_string());
            self
        }
    }

    #[async_trait]
    impl DataSource for StubSource {
        async fn fetch_table(&self, ticker: &Ticker, kind: StatementKind) -> Result<Table> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let label = ticker.to_string();
            match self.tables.get(&(label.clone(), kind)) {
                Some(csv) => Table::from_reader(label, csv.as_bytes()),
                None => Err(ValuationError::unavailable(label, "stub has no table")),
            }
        }

        async fn fetch_spot(&self) -> Result<Table> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.spot {
                Some(csv) => Table::from_reader(SPOT_LABEL, csv.as_bytes()),
                None => Err(ValuationError::unavailable(SPOT_LABEL, "stub has no spot")),
            }
        }
    }

    pub fn context(dir: &Path, tickers: &[&str], source: StubSource) -> (Arc<Context>, Arc<StubSource>) {
        let mut settings = Settings::default();
        settings.data_dir = dir.to_path_buf();
        settings.tickers = tickers.iter().map(|t| t.parse().unwrap()).collect();
        let source = Arc::new(source);
        let ctx = Arc::new(Context::new(settings, source.clone()));
        (ctx, source)
    }
}
