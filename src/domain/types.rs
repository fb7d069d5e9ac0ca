//! Shared domain types.
//!
//! These types are kept small and owned so they can be:
//!
//! - built once per run from ingested CSV text
//! - passed by reference through normalization and fusion
//! - written back out as wide CSV tables

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Default trailing window for the rolling quantile (about one trading year).
pub const DEFAULT_WINDOW: usize = 252;

/// One of the five macro/market signals feeding the composite scores.
///
/// Declaration order is the column order of the factor table and the
/// summation order inside the fusion aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Factor {
    Hsi,
    Hstech,
    Usdcnh,
    Vhsi,
    Btc,
}

impl Factor {
    pub const ALL: [Factor; 5] = [
        Factor::Hsi,
        Factor::Hstech,
        Factor::Usdcnh,
        Factor::Vhsi,
        Factor::Btc,
    ];

    /// Column name in the upstream factors feed and the output table.
    pub fn code(self) -> &'static str {
        match self {
            Factor::Hsi => "HSI",
            Factor::Hstech => "HSTECH",
            Factor::Usdcnh => "USDCNH",
            Factor::Vhsi => "VHSI",
            Factor::Btc => "BTC",
        }
    }

    /// Output column holding the normalized score.
    pub fn norm_column(self) -> String {
        format!("{}_norm", self.code())
    }

    /// Lower raw value reads as a more favorable signal (currency, volatility).
    pub fn is_reverse(self) -> bool {
        matches!(self, Factor::Usdcnh | Factor::Vhsi)
    }

    pub fn from_code(code: &str) -> Option<Factor> {
        let code = code.trim();
        Factor::ALL
            .into_iter()
            .find(|f| f.code().eq_ignore_ascii_case(code))
    }
}

impl std::fmt::Display for Factor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A single dated value; `None` means undefined (missing or non-numeric).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// Observations for one named series, ascending by date with unique dates.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub observations: Vec<Observation>,
}

impl Series {
    pub fn new(name: impl Into<String>, observations: Vec<Observation>) -> Self {
        Self {
            name: name.into(),
            observations,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.observations.iter().map(|o| o.date).collect()
    }

    pub fn values(&self) -> Vec<Option<f64>> {
        self.observations.iter().map(|o| o.value).collect()
    }
}

/// Per-date scores in `[-1, 1]` derived from one `Series`, same alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSeries {
    pub factor: Factor,
    pub dates: Vec<NaiveDate>,
    pub scores: Vec<Option<f64>>,
}

impl NormalizedSeries {
    pub fn defined_count(&self) -> usize {
        self.scores.iter().filter(|s| s.is_some()).count()
    }
}

/// One fused score per calendar date.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSeries {
    pub name: String,
    pub dates: Vec<NaiveDate>,
    pub scores: Vec<Option<f64>>,
}

impl CompositeSeries {
    /// Most recent date with a defined composite score.
    pub fn latest(&self) -> Option<(NaiveDate, f64)> {
        self.dates
            .iter()
            .zip(&self.scores)
            .rev()
            .find_map(|(d, s)| s.map(|v| (*d, v)))
    }
}

/// Configured (not yet normalized) weights per factor.
///
/// An absent factor is "missing"; a zero weight excludes the factor the
/// same way. Parsed from `HSI=28,HSTECH=22,...`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightSet {
    weights: BTreeMap<Factor, f64>,
}

impl WeightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, factor: Factor, weight: f64) -> Self {
        self.weights.insert(factor, weight);
        self
    }

    pub fn get(&self, factor: Factor) -> Option<f64> {
        self.weights.get(&factor).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Factor, f64)> + '_ {
        self.weights.iter().map(|(f, w)| (*f, *w))
    }

    /// Macro view: equity-heavy, with currency and volatility as brakes.
    pub fn macro_default() -> Self {
        Self::new()
            .with(Factor::Hsi, 28.0)
            .with(Factor::Hstech, 22.0)
            .with(Factor::Usdcnh, 20.0)
            .with(Factor::Vhsi, 15.0)
            .with(Factor::Btc, 15.0)
    }

    pub fn equal_default() -> Self {
        Factor::ALL
            .into_iter()
            .fold(Self::new(), |set, f| set.with(f, 20.0))
    }
}

impl FromStr for WeightSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = WeightSet::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (code, raw) = part
                .split_once('=')
                .ok_or_else(|| format!("Invalid weight entry '{part}'. Expected CODE=weight."))?;
            let factor = Factor::from_code(code).ok_or_else(|| {
                format!("Unknown factor '{}'. Expected one of HSI, HSTECH, USDCNH, VHSI, BTC.", code.trim())
            })?;
            let weight: f64 = raw
                .trim()
                .parse()
                .map_err(|_| format!("Invalid weight '{}' for {factor}.", raw.trim()))?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(format!("Weight for {factor} must be finite and >= 0 (got {weight})."));
            }
            set.weights.insert(factor, weight);
        }
        Ok(set)
    }
}

/// One composite output: the column it lands in and the weights it uses.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSpec {
    pub column: String,
    pub weights: WeightSet,
}

/// A named column of optional values.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Date-indexed table with one optional value per (date, column).
///
/// Both output tables (factors and per-symbol prices) use this shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideTable {
    pub dates: Vec<NaiveDate>,
    pub columns: Vec<Column>,
}

impl WideTable {
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Append a column; it must be aligned with `dates`.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) {
        debug_assert_eq!(values.len(), self.dates.len());
        self.columns.push(Column {
            name: name.into(),
            values,
        });
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Bounded retry with linearly increasing delay for upstream fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Sleep after failed attempt `k` (0-based) is `base_delay * (k + 1)`.
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * (attempt + 1)
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// Derived from CLI flags (plus env and defaults) and never mutated after.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sources_path: PathBuf,
    pub out_dir: PathBuf,
    /// Configured trailing window for the rolling quantile.
    pub window: usize,
    pub composites: Vec<CompositeSpec>,
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    /// The two composites the factor table carries.
    pub fn default_composites() -> Vec<CompositeSpec> {
        vec![
            CompositeSpec {
                column: "Fused_macro".to_string(),
                weights: WeightSet::macro_default(),
            },
            CompositeSpec {
                column: "Fused_equal".to_string(),
                weights: WeightSet::equal_default(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_spec_parses_case_insensitive_codes() {
        let set: WeightSet = "hsi=28, HSTECH=22,btc=0".parse().unwrap();
        assert_eq!(set.get(Factor::Hsi), Some(28.0));
        assert_eq!(set.get(Factor::Hstech), Some(22.0));
        assert_eq!(set.get(Factor::Btc), Some(0.0));
        assert_eq!(set.get(Factor::Vhsi), None);
    }

    #[test]
    fn weight_spec_rejects_unknown_and_negative() {
        assert!("SPX=1".parse::<WeightSet>().is_err());
        assert!("HSI=-1".parse::<WeightSet>().is_err());
        assert!("HSI".parse::<WeightSet>().is_err());
        assert!("HSI=abc".parse::<WeightSet>().is_err());
    }

    #[test]
    fn reverse_factors_are_currency_and_volatility() {
        let reversed: Vec<Factor> = Factor::ALL.into_iter().filter(|f| f.is_reverse()).collect();
        assert_eq!(reversed, vec![Factor::Usdcnh, Factor::Vhsi]);
    }

    #[test]
    fn retry_delay_grows_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(0), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(6));
    }
}
