//! Reporting utilities: latest factor readings and formatted terminal output.

pub mod format;

pub use format::{format_history, format_history_origin, format_readings, format_run_summary};

use chrono::NaiveDate;

use crate::app::pipeline::FactorRun;
use crate::domain::Factor;

/// Most recent defined score of one factor, with the raw value behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorReading {
    pub factor: Factor,
    pub date: NaiveDate,
    pub raw: Option<f64>,
    pub score: f64,
}

/// Latest defined reading per factor, strongest (most risk-on) first.
///
/// Factors that never produced a defined score are left out.
pub fn latest_readings(run: &FactorRun) -> Vec<FactorReading> {
    let mut out = Vec::new();
    for n in &run.normalized {
        let Some(i) = n.scores.iter().rposition(Option::is_some) else {
            continue;
        };
        let Some(score) = n.scores[i] else { continue };
        let raw = run
            .table
            .column(n.factor.code())
            .and_then(|c| c.values.get(i).copied().flatten());
        out.push(FactorReading {
            factor: n.factor,
            date: n.dates[i],
            raw,
            score,
        });
    }
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    out
}
