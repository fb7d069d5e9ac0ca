//! JSON file cache for per-symbol history.
//!
//! Layout: `{cache_dir}/{CODE}_{days}.json`, one entry per `(code, days)`:
//!
//! ```json
//! { "code": "HK.00700", "days": 365, "updated_at": "...", "rows": [...] }
//! ```
//!
//! An entry older than the TTL is stale and triggers an online re-fetch.
//! Unreadable entries are treated as missing rather than failing the call.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::yahoo::{HistoryProvider, HistoryRow};
use crate::error::AppError;

/// Default freshness window for cached history.
pub const DEFAULT_TTL_HOURS: i64 = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub code: String,
    pub days: u32,
    pub updated_at: DateTime<Utc>,
    pub rows: Vec<HistoryRow>,
}

/// Result of a cache lookup at a given instant.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Fresh(CacheEntry),
    Stale(CacheEntry),
    Missing,
}

/// Where the returned rows came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOrigin {
    Cache,
    Online,
}

pub struct HistoryCache {
    dir: PathBuf,
    ttl: Duration,
}

impl HistoryCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, code: &str, days: u32) -> PathBuf {
        let safe: String = code
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        self.dir.join(format!("{safe}_{days}.json"))
    }

    pub fn lookup(&self, code: &str, days: u32, now: DateTime<Utc>) -> CacheLookup {
        let path = self.entry_path(code, days);
        let Ok(content) = fs::read_to_string(&path) else {
            return CacheLookup::Missing;
        };
        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) if now - entry.updated_at > self.ttl => CacheLookup::Stale(entry),
            Ok(entry) => CacheLookup::Fresh(entry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable cache entry");
                CacheLookup::Missing
            }
        }
    }

    /// Overwrite the entry for `(code, days)`.
    pub fn store(&self, code: &str, days: u32, rows: &[HistoryRow], now: DateTime<Utc>) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::runtime(format!("Failed to create cache dir '{}': {e}", self.dir.display()))
        })?;

        let entry = CacheEntry {
            code: code.to_string(),
            days,
            updated_at: now,
            rows: rows.to_vec(),
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| AppError::runtime(format!("Failed to serialize cache entry: {e}")))?;

        let path = self.entry_path(code, days);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .map_err(|e| AppError::runtime(format!("Failed to write cache entry: {e}")))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            AppError::runtime(format!("Failed to move cache entry into place: {e}"))
        })?;
        Ok(path)
    }
}

/// Serve history from the cache when fresh, otherwise fetch and refill it.
pub fn load_history(
    provider: &dyn HistoryProvider,
    cache: &HistoryCache,
    code: &str,
    days: u32,
    refresh: bool,
    now: DateTime<Utc>,
) -> Result<(Vec<HistoryRow>, HistoryOrigin), AppError> {
    if !refresh {
        match cache.lookup(code, days, now) {
            CacheLookup::Fresh(entry) => {
                debug!(code, days, rows = entry.rows.len(), "history cache hit");
                return Ok((entry.rows, HistoryOrigin::Cache));
            }
            CacheLookup::Stale(entry) => {
                info!(code, days, updated_at = %entry.updated_at, "history cache stale; refetching");
            }
            CacheLookup::Missing => {}
        }
    }

    let rows = provider.fetch_history(code, days)?;
    cache.store(code, days, &rows, now)?;
    Ok((rows, HistoryOrigin::Online))
}
