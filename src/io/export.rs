//! Export wide tables to CSV.
//!
//! Output format:
//! - header `Date,<column>...`
//! - dates as `YYYY-MM-DD`
//! - numbers with 6 fractional digits
//! - undefined values as empty fields (never `0`)

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::domain::WideTable;
use crate::error::AppError;

/// Somewhere the pipeline can hand named tables to.
pub trait TableSink {
    /// Store `table` under `name`, returning where it landed.
    fn write_table(&self, name: &str, table: &WideTable) -> Result<PathBuf, AppError>;
}

/// Writes `<root>/<name>.csv`, creating `root` when needed.
///
/// Fails if `root` exists but is not a directory, or if the target file path
/// is taken by a directory. Each table is written to a temporary file and
/// renamed into place, so a failed run never leaves a half-written table.
#[derive(Debug, Clone)]
pub struct DirSink {
    root: PathBuf,
}

impl DirSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_root(&self) -> Result<(), AppError> {
        if self.root.exists() {
            if !self.root.is_dir() {
                return Err(AppError::runtime(format!(
                    "Output path '{}' exists and is not a directory.",
                    self.root.display()
                )));
            }
            return Ok(());
        }
        fs::create_dir_all(&self.root).map_err(|e| {
            AppError::runtime(format!(
                "Failed to create output directory '{}': {e}",
                self.root.display()
            ))
        })
    }
}

impl TableSink for DirSink {
    fn write_table(&self, name: &str, table: &WideTable) -> Result<PathBuf, AppError> {
        self.ensure_root()?;

        let path = self.root.join(format!("{name}.csv"));
        if path.is_dir() {
            return Err(AppError::runtime(format!(
                "Output file '{}' is a directory.",
                path.display()
            )));
        }

        let tmp_path = path.with_extension("csv.tmp");
        let file = fs::File::create(&tmp_path).map_err(|e| {
            AppError::runtime(format!("Failed to create '{}': {e}", tmp_path.display()))
        })?;
        write_wide_csv(file, table)?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            AppError::runtime(format!("Failed to move table into '{}': {e}", path.display()))
        })?;

        info!(path = %path.display(), rows = table.len(), columns = table.columns.len(), "wrote table");
        Ok(path)
    }
}

/// Serialize a table as CSV to any writer.
pub fn write_wide_csv<W: Write>(writer: W, table: &WideTable) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = Vec::with_capacity(table.columns.len() + 1);
    header.push("Date");
    header.extend(table.column_names());
    wtr.write_record(&header)
        .map_err(|e| AppError::runtime(format!("Failed to write CSV header: {e}")))?;

    for (r, date) in table.dates.iter().enumerate() {
        let mut row = Vec::with_capacity(table.columns.len() + 1);
        row.push(date.format("%Y-%m-%d").to_string());
        for col in &table.columns {
            row.push(format_value(col.values[r]));
        }
        wtr.write_record(&row)
            .map_err(|e| AppError::runtime(format!("Failed to write CSV row: {e}")))?;
    }

    wtr.flush()
        .map_err(|e| AppError::runtime(format!("Failed to flush CSV: {e}")))?;
    Ok(())
}

/// Render a table as a CSV string.
pub fn render_wide_csv(table: &WideTable) -> Result<String, AppError> {
    let mut buf = Vec::new();
    write_wide_csv(&mut buf, table)?;
    String::from_utf8(buf).map_err(|e| AppError::runtime(format!("CSV output is not UTF-8: {e}")))
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.6}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn table() -> WideTable {
        let mut t = WideTable::new(vec![
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        ]);
        t.push_column("HSI", vec![Some(16788.55), None]);
        t.push_column("HSI_norm", vec![None, Some(-0.2)]);
        t
    }

    #[test]
    fn csv_golden() {
        let txt = render_wide_csv(&table()).unwrap();
        let expected = concat!(
            "Date,HSI,HSI_norm\n",
            "2024-01-02,16788.550000,\n",
            "2024-01-03,,-0.200000\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn dir_sink_creates_root_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirSink::new(dir.path().join("data"));
        let path = sink.write_table("factors", &table()).unwrap();
        assert!(path.ends_with("factors.csv"));

        let mut smaller = table();
        smaller.columns.truncate(1);
        sink.write_table("factors", &smaller).unwrap();
        let txt = fs::read_to_string(&path).unwrap();
        assert!(txt.starts_with("Date,HSI\n"));
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn dir_sink_rejects_file_in_place_of_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        fs::write(&root, "not a directory").unwrap();
        let err = DirSink::new(&root).write_table("factors", &table()).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_RUNTIME);
    }

    #[test]
    fn dir_sink_rejects_directory_in_place_of_table() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("hk20.csv")).unwrap();
        let err = DirSink::new(dir.path()).write_table("hk20", &table()).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_RUNTIME);
    }
}
