//! Formatted terminal output for runs and lookups.
//!
//! Everything here returns a `String`; callers decide whether it goes to
//! stdout or stderr.

use chrono::NaiveDate;

use crate::app::pipeline::{FactorRun, PriceRun, RunOutput};
use crate::data::{HistoryOrigin, HistoryRow};
use crate::domain::{PipelineConfig, WideTable};
use crate::report::FactorReading;

/// Format the full run summary (price merge, factor coverage, latest composites).
pub fn format_run_summary(output: &RunOutput, config: &PipelineConfig) -> String {
    let mut out = String::new();

    out.push_str("=== hk20 - HK sentiment build ===\n");
    out.push_str(&format!(
        "Window: {} | sources: {} | out: {}\n",
        config.window,
        config.sources_path.display(),
        config.out_dir.display()
    ));

    out.push('\n');
    match &output.prices {
        Some(prices) => out.push_str(&format_prices(prices)),
        None => out.push_str("Prices: not written\n"),
    }

    out.push('\n');
    match &output.factors {
        Some(factors) => out.push_str(&format_factors(factors)),
        None => out.push_str("Factors: not written\n"),
    }

    if !output.failures.is_empty() {
        out.push_str("\nFailures:\n");
        for f in &output.failures {
            out.push_str(&format!("- [exit {}] {}\n", f.exit_code(), f.message()));
        }
    }

    out
}

fn format_prices(prices: &PriceRun) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Prices: symbols={} failed={} | rows={} | {}\n",
        prices.succeeded.len(),
        prices.failed.len(),
        prices.table.len(),
        fmt_range(&prices.table)
    ));
    for (code, reason) in &prices.failed {
        out.push_str(&format!("  (skipped {code}) {reason}\n"));
    }
    out
}

fn format_factors(factors: &FactorRun) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Factors: rows={} (read {}, dropped {}) | {}\n",
        factors.table.len(),
        factors.rows_read,
        factors.rows_dropped,
        fmt_range(&factors.table)
    ));
    if !factors.missing_columns.is_empty() {
        let names: Vec<&str> = factors.missing_columns.iter().map(|f| f.code()).collect();
        out.push_str(&format!("  missing columns: {}\n", names.join(", ")));
    }

    out.push_str("\nNormalized coverage:\n");
    for n in &factors.normalized {
        out.push_str(&format!(
            "  {:<12} defined={}/{}\n",
            n.factor.norm_column(),
            n.defined_count(),
            n.scores.len()
        ));
    }

    out.push_str("\nComposites (latest):\n");
    for c in &factors.composites {
        match c.latest() {
            Some((date, v)) => out.push_str(&format!("  {:<12} {date} {v:>9.6}\n", c.name)),
            None => out.push_str(&format!("  {:<12} n/a\n", c.name)),
        }
    }

    out
}

/// Format the per-factor latest readings table.
pub fn format_readings(readings: &[FactorReading]) -> String {
    let mut out = String::new();
    out.push_str("Latest readings (strongest first):\n");
    out.push_str(format!("{:<8} {:<10} {:>14} {:>9}", "factor", "date", "raw", "score").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<8} {:-<10} {:-<14} {:-<9}", "", "", "", "").trim_end());
    out.push('\n');
    for r in readings {
        let raw = r.raw.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<8} {:<10} {:>14} {:>9.6}\n",
            r.factor.code(),
            r.date,
            raw,
            r.score
        ));
    }
    out
}

/// `date,close` CSV for one symbol's history, preceded by nothing else.
pub fn format_history(rows: &[HistoryRow]) -> String {
    let mut out = String::from("date,close\n");
    for r in rows {
        out.push_str(&format!("{},{:.6}\n", r.date.format("%Y-%m-%d"), r.close));
    }
    out
}

/// One-line provenance note for a history lookup (for stderr).
pub fn format_history_origin(code: &str, days: u32, rows: usize, origin: HistoryOrigin) -> String {
    let source = match origin {
        HistoryOrigin::Cache => "cache",
        HistoryOrigin::Online => "online",
    };
    format!("{code}: {rows} row(s) over {days}d from {source}")
}

fn fmt_range(table: &WideTable) -> String {
    match (table.dates.first(), table.dates.last()) {
        (Some(a), Some(b)) => format!("{}..{}", fmt_date(*a), fmt_date(*b)),
        _ => "empty".to_string(),
    }
}

fn fmt_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CompositeSeries, Factor, NormalizedSeries, RetryPolicy};
    use crate::error::AppError;
    use std::path::PathBuf;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            sources_path: PathBuf::from("scripts/sources.txt"),
            out_dir: PathBuf::from("data"),
            window: 252,
            composites: PipelineConfig::default_composites(),
            retry: RetryPolicy::default(),
        }
    }

    #[test]
    fn summary_golden() {
        let mut prices = WideTable::new(vec![d(2), d(3)]);
        prices.push_column("HK.00700", vec![Some(1.0), Some(2.0)]);

        let mut table = WideTable::new(vec![d(2), d(3)]);
        table.push_column("HSI", vec![Some(1.0), Some(2.0)]);

        let output = RunOutput {
            prices: Some(PriceRun {
                table: prices,
                succeeded: vec!["HK.00700".into()],
                failed: vec![("HK.00005".into(), "HTTP 404".into())],
            }),
            factors: Some(FactorRun {
                table,
                normalized: vec![NormalizedSeries {
                    factor: Factor::Hsi,
                    dates: vec![d(2), d(3)],
                    scores: vec![None, Some(0.5)],
                }],
                composites: vec![
                    CompositeSeries {
                        name: "Fused_macro".into(),
                        dates: vec![d(2), d(3)],
                        scores: vec![None, Some(0.25)],
                    },
                    CompositeSeries {
                        name: "Fused_equal".into(),
                        dates: vec![d(2), d(3)],
                        scores: vec![None, None],
                    },
                ],
                missing_columns: vec![Factor::Btc],
                rows_read: 3,
                rows_dropped: 1,
            }),
            failures: vec![AppError::runtime("boom")],
        };

        let expected = "\
=== hk20 - HK sentiment build ===
Window: 252 | sources: scripts/sources.txt | out: data

Prices: symbols=1 failed=1 | rows=2 | 2024-01-02..2024-01-03
  (skipped HK.00005) HTTP 404

Factors: rows=2 (read 3, dropped 1) | 2024-01-02..2024-01-03
  missing columns: BTC

Normalized coverage:
  HSI_norm     defined=1/2

Composites (latest):
  Fused_macro  2024-01-03  0.250000
  Fused_equal  n/a

Failures:
- [exit 4] boom
";
        assert_eq!(format_run_summary(&output, &config()), expected);
    }

    #[test]
    fn summary_notes_missing_outputs() {
        let s = format_run_summary(&RunOutput::default(), &config());
        assert!(s.contains("Prices: not written\n"));
        assert!(s.contains("Factors: not written\n"));
        assert!(!s.contains("Failures"));
    }

    #[test]
    fn readings_table() {
        let s = format_readings(&[FactorReading {
            factor: Factor::Vhsi,
            date: d(3),
            raw: None,
            score: -1.0,
        }]);
        let lines: Vec<&str> = s.lines().collect();
        assert_eq!(lines[1], "factor   date                  raw     score");
        assert_eq!(lines[3], "VHSI     2024-01-03              - -1.000000");
    }

    #[test]
    fn history_csv() {
        let rows = vec![HistoryRow { date: d(2), close: 290.5 }];
        assert_eq!(format_history(&rows), "date,close\n2024-01-02,290.500000\n");
        assert_eq!(
            format_history_origin("HK.00700", 30, 1, HistoryOrigin::Cache),
            "HK.00700: 1 row(s) over 30d from cache"
        );
    }
}
