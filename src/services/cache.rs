// src/services/cache.rs
use log::{debug, info, warn};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process;
use tokio::fs;

use crate::error::{Result, ValuationError};
use crate::models::{StatementKind, Ticker};
use crate::services::table::Table;

/// Read-if-present, else fetch-and-store cache of upstream tables, one CSV
/// file per key under `dir`.
#[derive(Debug, Clone)]
pub struct TableCache {
    dir: PathBuf,
}

impl TableCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        TableCache { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn statement_key(ticker: &Ticker, kind: StatementKind) -> String {
        format!("{}_{}", ticker, kind.file_stem())
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", key))
    }

    /// Returns the cached table for `key`, or runs `fetch` and persists its
    /// result. A cache file that fails to parse is treated as a miss.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, label: &str, fetch: F) -> Result<Table>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Table>>,
    {
        let path = self.path_for(key);

        match fs::read(&path).await {
            Ok(bytes) => match Table::from_reader(label, bytes.as_slice()) {
                Ok(table) => {
                    debug!("Cache hit for {} ({} rows)", path.display(), table.len());
                    return Ok(table);
                }
                Err(e) => warn!("Discarding unreadable cache file {}: {}", path.display(), e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Cache miss for {}", path.display());
            }
            Err(e) => {
                return Err(ValuationError::Cache {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        }

        let table = fetch().await?;
        self.store(&path, &table).await?;
        info!("Cached {} rows for {} at {}", table.len(), label, path.display());
        Ok(table)
    }

    /// Writes to a sibling temp file and renames it into place so a reader
    /// never observes a partially written table.
    async fn store(&self, path: &Path, table: &Table) -> Result<()> {
        let cache_err = |source: std::io::Error| ValuationError::Cache {
            path: path.display().to_string(),
            source,
        };

        fs::create_dir_all(&self.dir).await.map_err(cache_err)?;

        let mut buf = Vec::new();
        table.write_to(&mut buf)?;

        let tmp = path.with_extension(format!("csv.tmp{}", process::id()));
        fs::write(&tmp, &buf).await.map_err(cache_err)?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(cache_err(e));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sample(label: &str) -> Table {
        Table::new(
            label,
            vec!["REPORT_DATE".into(), "BASIC_EPS".into()],
            vec![vec!["2024-12-31".into(), "1.25".into()]],
        )
    }

    #[tokio::test]
    async fn second_read_is_served_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TableCache::new(dir.path());
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let table = cache
                .get_or_fetch("sz000598_income", "sz000598", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(sample("sz000598"))
                })
                .await
                .unwrap();
            assert_eq!(table, sample("sz000598"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("sz000598_income.csv").exists());
    }

    #[tokio::test]
    async fn failed_fetch_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TableCache::new(dir.path());

        let result = cache
            .get_or_fetch("sh600008_daily", "sh600008", || async {
                Err(ValuationError::unavailable("sh600008", "timeout"))
            })
            .await;

        assert!(matches!(result, Err(ValuationError::DataUnavailable { .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("data");
        let cache = TableCache::new(&nested);

        cache
            .get_or_fetch("spot", "spot", || async { Ok(sample("spot")) })
            .await
            .unwrap();

        assert!(nested.join("spot.csv").exists());
        let leftovers: Vec<_> = std::fs::read_dir(&nested)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn statement_key_uses_ticker_and_kind() {
        let ticker: Ticker = "sh601158".parse().unwrap();
        assert_eq!(
            TableCache::statement_key(&ticker, StatementKind::Balance),
            "sh601158_balance"
        );
    }
}
