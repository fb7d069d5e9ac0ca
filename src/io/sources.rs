//! Source list parsing.
//!
//! The source list maps short codes to fetch locations, one per line:
//!
//! ```text
//! # factors feed (reserved code)
//! FACTORS,https://example.com/factors.csv
//! 0700,https://example.com/0700.csv
//! ```
//!
//! Blank lines, `#` comments and lines without a comma are skipped. Codes are
//! trimmed and uppercased; a repeated code keeps its last location.

use std::path::Path;

use tracing::warn;

use crate::error::AppError;

/// Code that identifies the factors feed rather than a per-symbol price feed.
pub const FACTORS_CODE: &str = "FACTORS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub code: String,
    pub location: String,
}

/// Parsed source list, split by role, in declared order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceList {
    pub factors: Option<SourceEntry>,
    pub symbols: Vec<SourceEntry>,
}

impl SourceList {
    pub fn is_empty(&self) -> bool {
        self.factors.is_none() && self.symbols.is_empty()
    }
}

/// Load a source list; a missing file is a configuration error.
pub fn load_sources(path: &Path) -> Result<SourceList, AppError> {
    if !path.exists() {
        return Err(AppError::config(format!("missing {}", path.display())));
    }
    let text = std::fs::read_to_string(path).map_err(|e| {
        AppError::config(format!("Failed to read source list '{}': {e}", path.display()))
    })?;
    Ok(parse_sources(&text))
}

pub fn parse_sources(text: &str) -> SourceList {
    let mut list = SourceList::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((code, location)) = line.split_once(',') else {
            continue;
        };
        let entry = SourceEntry {
            code: code.trim().to_uppercase(),
            location: location.trim().to_string(),
        };

        if entry.code == FACTORS_CODE {
            if list.factors.is_some() {
                warn!("source list declares {FACTORS_CODE} more than once; using the last entry");
            }
            list.factors = Some(entry);
        } else if let Some(existing) = list.symbols.iter_mut().find(|e| e.code == entry.code) {
            warn!(code = %entry.code, "duplicate source code; using the last location");
            existing.location = entry.location;
        } else {
            list.symbols.push(entry);
        }
    }

    list
}
