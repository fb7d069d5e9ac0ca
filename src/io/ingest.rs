//! CSV ingest and calendar normalization.
//!
//! This module turns heterogeneous upstream CSV text into date-sorted numeric
//! columns that are safe to normalize.
//!
//! Design goals:
//! - **Tolerant rows**: a row whose date cannot be resolved is dropped, a
//!   field that is not numeric becomes undefined; neither aborts the run
//! - **Deterministic calendar**: rows are sorted ascending and a repeated
//!   date keeps the last row seen (last-write-wins)
//! - **Separation of concerns**: no fetching or scoring logic here

use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use tracing::debug;

use crate::domain::{Factor, Observation, Series, WideTable};
use crate::error::AppError;

/// Ingest output: one calendar plus one aligned column per value header.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedTable {
    /// Value column headers (the date column excluded), as written upstream.
    pub headers: Vec<String>,
    pub dates: Vec<NaiveDate>,
    /// `columns[c][r]` is the value of header `c` on `dates[r]`.
    pub columns: Vec<Vec<Option<f64>>>,
    pub rows_read: usize,
    pub rows_dropped: usize,
}

impl IngestedTable {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Case-insensitive header lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name.trim()))
    }

    /// The named column as a `Series`, if the header exists.
    pub fn series(&self, name: &str) -> Option<Series> {
        let idx = self.column_index(name)?;
        Some(self.series_at(idx, name))
    }

    /// A factor column; an absent header yields an all-undefined series.
    pub fn factor_series(&self, factor: Factor) -> Series {
        match self.column_index(factor.code()) {
            Some(idx) => self.series_at(idx, factor.code()),
            None => Series::new(
                factor.code(),
                self.dates
                    .iter()
                    .map(|d| Observation {
                        date: *d,
                        value: None,
                    })
                    .collect(),
            ),
        }
    }

    /// Closing prices for a per-symbol feed, named after `code`.
    ///
    /// Uses the `Close` column when present, else the first value column.
    pub fn close_series(&self, code: &str) -> Option<Series> {
        let idx = self.column_index("close").or(if self.headers.is_empty() {
            None
        } else {
            Some(0)
        })?;
        Some(self.series_at(idx, code))
    }

    /// Every value column as a `WideTable`, headers kept as written.
    pub fn to_wide(&self) -> WideTable {
        let mut table = WideTable::new(self.dates.clone());
        for (h, values) in self.headers.iter().zip(&self.columns) {
            table.push_column(h.clone(), values.clone());
        }
        table
    }

    fn series_at(&self, idx: usize, name: &str) -> Series {
        let observations = self
            .dates
            .iter()
            .zip(&self.columns[idx])
            .map(|(date, value)| Observation {
                date: *date,
                value: *value,
            })
            .collect();
        Series::new(name, observations)
    }
}

/// Read and ingest a local CSV file.
pub fn read_table_file(path: &Path) -> Result<IngestedTable, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::config(format!("Failed to read CSV '{}': {e}", path.display())))?;
    parse_table(&text)
}

/// Parse CSV text whose date column is `Date` (any case) or the first column.
pub fn parse_table(text: &str) -> Result<IngestedTable, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::no_data(format!("Failed to read CSV headers: {e}")))?
        .iter()
        .map(normalize_header_name)
        .collect();

    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(AppError::no_data("CSV has no header row."));
    }

    let date_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("date"))
        .unwrap_or(0);
    let value_idx: Vec<usize> = (0..headers.len()).filter(|&i| i != date_idx).collect();

    let mut rows: Vec<(NaiveDate, Vec<Option<f64>>)> = Vec::new();
    let mut rows_read = 0usize;
    let mut rows_dropped = 0usize;

    for (idx, result) in reader.records().enumerate() {
        rows_read += 1;
        let line = idx + 2;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                debug!(line, error = %e, "dropping unreadable CSV row");
                rows_dropped += 1;
                continue;
            }
        };

        let Some(date) = record.get(date_idx).and_then(parse_calendar_date) else {
            debug!(line, raw = record.get(date_idx).unwrap_or(""), "dropping row with unresolvable date");
            rows_dropped += 1;
            continue;
        };

        let values = value_idx
            .iter()
            .map(|&i| record.get(i).and_then(parse_value))
            .collect();
        rows.push((date, values));
    }

    // Stable sort keeps file order within a date, so the last row wins below.
    rows.sort_by_key(|(date, _)| *date);
    let mut deduped: Vec<(NaiveDate, Vec<Option<f64>>)> = Vec::with_capacity(rows.len());
    for row in rows {
        match deduped.last_mut() {
            Some(last) if last.0 == row.0 => *last = row,
            _ => deduped.push(row),
        }
    }

    let mut columns = vec![Vec::with_capacity(deduped.len()); value_idx.len()];
    let mut dates = Vec::with_capacity(deduped.len());
    for (date, values) in deduped {
        dates.push(date);
        for (col, v) in columns.iter_mut().zip(values) {
            col.push(v);
        }
    }

    Ok(IngestedTable {
        headers: value_idx.iter().map(|&i| headers[i].clone()).collect(),
        dates,
        columns,
        rows_read,
        rows_dropped,
    })
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    name.trim().trim_start_matches('\u{feff}').trim().to_string()
}

fn ymd_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})\D+(\d{1,2})\D+(\d{1,2})").expect("valid date regex"))
}

/// Resolve a date-like string to a calendar day.
///
/// First tries a year / month / day digit pattern with arbitrary separators
/// (covers `2024-01-05`, `2024/1/5`, `2024年1月5日`, ISO timestamps), then a
/// small set of common formats. Returns `None` when nothing matches.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(caps) = ymd_pattern().captures(s) {
        let y = caps[1].parse::<i32>().ok();
        let m = caps[2].parse::<u32>().ok();
        let d = caps[3].parse::<u32>().ok();
        if let (Some(y), Some(m), Some(d)) = (y, m, d) {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                return Some(date);
            }
        }
    }

    parse_date_fallback(s)
}

fn parse_date_fallback(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive());
    }

    // Slash dates are read month-first, as most upstream market exports write them.
    const FMTS: [&str; 5] = ["%Y%m%d", "%m/%d/%Y", "%d %b %Y", "%b %d, %Y", "%d-%b-%Y"];
    FMTS.iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Coerce a field to a finite number; anything else is undefined.
pub fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let v = trimmed.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn digit_pattern_handles_localized_and_padded_dates() {
        assert_eq!(parse_calendar_date("2024-01-05"), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_calendar_date("2024/1/5"), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_calendar_date("2024年1月5日"), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_calendar_date(" 2024.12.31 "), Some(ymd(2024, 12, 31)));
        assert_eq!(parse_calendar_date("2024-03-08T16:00:00+08:00"), Some(ymd(2024, 3, 8)));
    }

    #[test]
    fn fallback_formats() {
        assert_eq!(parse_calendar_date("20240105"), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_calendar_date("01/05/2024"), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_calendar_date("5 Jan 2024"), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_calendar_date("Jan 05, 2024"), Some(ymd(2024, 1, 5)));
    }

    #[test]
    fn unresolvable_dates() {
        assert_eq!(parse_calendar_date(""), None);
        assert_eq!(parse_calendar_date("not a date"), None);
        assert_eq!(parse_calendar_date("2024-13-45"), None);
    }

    #[test]
    fn values_coerce_to_undefined() {
        assert_eq!(parse_value(" 1.5 "), Some(1.5));
        assert_eq!(parse_value("n/a"), None);
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("NaN"), None);
        assert_eq!(parse_value("inf"), None);
    }

    #[test]
    fn table_sorts_drops_and_keeps_last_duplicate() {
        let text = "\u{feff}Date,HSI,BTC\n\
                    2024-01-03,3,x\n\
                    garbage,9,9\n\
                    2024-01-01,1,10\n\
                    2024-01-03,33,30\n\
                    2024/01/02,2,\n";
        let table = parse_table(text).unwrap();
        assert_eq!(table.headers, vec!["HSI", "BTC"]);
        assert_eq!(table.rows_read, 5);
        assert_eq!(table.rows_dropped, 1);
        assert_eq!(table.dates, vec![ymd(2024, 1, 1), ymd(2024, 1, 2), ymd(2024, 1, 3)]);
        assert_eq!(table.columns[0], vec![Some(1.0), Some(2.0), Some(33.0)]);
        assert_eq!(table.columns[1], vec![Some(10.0), None, Some(30.0)]);
    }

    #[test]
    fn first_column_is_date_when_no_date_header() {
        let text = "日期,Open,Close\n2024年1月2日,1,2\n2024年1月3日,3,4\n";
        let table = parse_table(text).unwrap();
        let close = table.close_series("0700").unwrap();
        assert_eq!(close.name, "0700");
        assert_eq!(close.values(), vec![Some(2.0), Some(4.0)]);
    }

    #[test]
    fn close_falls_back_to_first_value_column() {
        let text = "Date,Price,Volume\n2024-01-02,10.5,100\n";
        let table = parse_table(text).unwrap();
        assert_eq!(table.close_series("X").unwrap().values(), vec![Some(10.5)]);
    }

    #[test]
    fn missing_factor_column_is_all_undefined() {
        let text = "date,hsi\n2024-01-02,1\n2024-01-03,2\n";
        let table = parse_table(text).unwrap();
        assert_eq!(table.factor_series(Factor::Hsi).values(), vec![Some(1.0), Some(2.0)]);
        assert_eq!(table.factor_series(Factor::Btc).values(), vec![None, None]);
    }
}
