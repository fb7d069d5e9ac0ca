//! Shared batch pipeline used by every front-end.
//!
//! Two independent outputs come out of one run:
//!
//! - price table: per-symbol feeds -> ingest -> outer-join -> `hk20.csv`
//! - factor table: `FACTORS` feed -> ingest -> rolling quantile -> fusion -> `factors.csv`
//!
//! A failure in one output never prevents the other from being written; the
//! failures are collected on `RunOutput` and the caller decides the exit code.

use rayon::prelude::*;
use tracing::{info, warn};

use crate::data::fetch::{CsvSource, HttpCsvSource, fetch_csv};
use crate::domain::{CompositeSeries, Factor, NormalizedSeries, PipelineConfig, Series, WideTable};
use crate::error::AppError;
use crate::fusion::fuse;
use crate::io::export::{DirSink, TableSink};
use crate::io::ingest::{IngestedTable, parse_table};
use crate::io::merge::merge_wide;
use crate::io::sources::{SourceEntry, load_sources};
use crate::math::rank::normalize_series;

pub const FACTORS_TABLE: &str = "factors";
pub const PRICES_TABLE: &str = "hk20";

/// Factor table plus the intermediate series it was built from.
#[derive(Debug, Clone)]
pub struct FactorRun {
    pub table: WideTable,
    pub normalized: Vec<NormalizedSeries>,
    pub composites: Vec<CompositeSeries>,
    pub missing_columns: Vec<Factor>,
    pub rows_read: usize,
    pub rows_dropped: usize,
}

/// Merged price table and per-source outcome.
#[derive(Debug, Clone)]
pub struct PriceRun {
    pub table: WideTable,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// All computed outputs of a single `hk20 build` run.
#[derive(Debug, Default)]
pub struct RunOutput {
    pub prices: Option<PriceRun>,
    pub factors: Option<FactorRun>,
    pub failures: Vec<AppError>,
}

impl RunOutput {
    pub fn first_failure(&self) -> Option<&AppError> {
        self.failures.first()
    }
}

/// Execute the full pipeline against the network and the output directory.
pub fn run_build(config: &PipelineConfig) -> Result<RunOutput, AppError> {
    let source = HttpCsvSource::new(&config.retry)?;
    let sink = DirSink::new(&config.out_dir);
    run_build_with(&source, &sink, config)
}

/// Execute the pipeline with explicit collaborators.
///
/// Only a missing or unreadable source list is returned as `Err`; every
/// other failure lands in `RunOutput::failures`.
pub fn run_build_with(
    source: &dyn CsvSource,
    sink: &dyn TableSink,
    config: &PipelineConfig,
) -> Result<RunOutput, AppError> {
    let sources = load_sources(&config.sources_path)?;
    let mut output = RunOutput::default();

    // 1) Per-symbol prices.
    if sources.symbols.is_empty() {
        info!("no stock sources in {}", config.sources_path.display());
    } else {
        match build_price_table(source, &sources.symbols, config) {
            Ok(run) => {
                if let Err(e) = sink.write_table(PRICES_TABLE, &run.table) {
                    output.failures.push(e);
                }
                output.prices = Some(run);
            }
            Err(e) => output.failures.push(e),
        }
    }

    // 2) Factors + fusion.
    match &sources.factors {
        None => output.failures.push(AppError::no_data(format!(
            "No FACTORS source in {}",
            config.sources_path.display()
        ))),
        Some(entry) => match fetch_factor_table(source, entry, config) {
            Ok(run) => {
                if let Err(e) = sink.write_table(FACTORS_TABLE, &run.table) {
                    output.failures.push(e);
                }
                output.factors = Some(run);
            }
            Err(e) => output.failures.push(e),
        },
    }

    Ok(output)
}

/// Fetch every symbol feed (in parallel) and outer-join their closes.
///
/// Individual failures are logged and skipped; the call fails only when no
/// symbol produced a series.
pub fn build_price_table(
    source: &dyn CsvSource,
    entries: &[SourceEntry],
    config: &PipelineConfig,
) -> Result<PriceRun, AppError> {
    let results: Vec<(String, Result<Series, AppError>)> = entries
        .par_iter()
        .map(|entry| (entry.code.clone(), fetch_symbol(source, entry, config)))
        .collect();

    let mut series = Vec::new();
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for (code, result) in results {
        match result {
            Ok(s) => {
                succeeded.push(code);
                series.push(s);
            }
            Err(e) => {
                warn!(code = %code, error = %e, "skipping price source");
                failed.push((code, e.to_string()));
            }
        }
    }

    if series.is_empty() {
        return Err(AppError::no_data(format!(
            "All {} price source(s) failed.",
            entries.len()
        )));
    }

    let table = merge_wide(&series);
    info!(rows = table.len(), symbols = table.columns.len(), failed = failed.len(), "merged price table");
    Ok(PriceRun {
        table,
        succeeded,
        failed,
    })
}

fn fetch_symbol(source: &dyn CsvSource, entry: &SourceEntry, config: &PipelineConfig) -> Result<Series, AppError> {
    let text = fetch_csv(source, &entry.location, &config.retry)?;
    let ingested = parse_table(&text)?;
    ingested
        .close_series(&entry.code)
        .ok_or_else(|| AppError::no_data(format!("Source {} has no value columns.", entry.code)))
}

fn fetch_factor_table(
    source: &dyn CsvSource,
    entry: &SourceEntry,
    config: &PipelineConfig,
) -> Result<FactorRun, AppError> {
    let text = fetch_csv(source, &entry.location, &config.retry)?;
    let ingested = parse_table(&text)?;
    build_factor_table(&ingested, config)
}

/// Normalize and fuse an ingested factors table into the output layout:
///
/// `Date, <raw factors>, <factor>_norm..., <composite columns>...`
pub fn build_factor_table(ingested: &IngestedTable, config: &PipelineConfig) -> Result<FactorRun, AppError> {
    if ingested.is_empty() {
        return Err(AppError::no_data("Factors feed has no rows with a resolvable date."));
    }

    let mut missing_columns = Vec::new();
    let raw: Vec<(Factor, Series)> = Factor::ALL
        .into_iter()
        .map(|f| {
            if ingested.column_index(f.code()).is_none() {
                warn!(factor = %f, "factor column missing from feed; treating as undefined");
                missing_columns.push(f);
            }
            (f, ingested.factor_series(f))
        })
        .collect();

    let normalized: Vec<NormalizedSeries> = raw
        .iter()
        .map(|(f, s)| normalize_series(*f, s, config.window))
        .collect();

    let composites: Vec<CompositeSeries> = config
        .composites
        .iter()
        .map(|c| fuse(&c.column, &normalized, &c.weights))
        .collect();

    let mut table = WideTable::new(ingested.dates.clone());
    for (f, s) in &raw {
        table.push_column(f.code(), s.values());
    }
    for n in &normalized {
        table.push_column(n.factor.norm_column(), n.scores.clone());
    }
    for c in &composites {
        debug_assert_eq!(c.dates, table.dates);
        table.push_column(c.name.clone(), c.scores.clone());
    }

    info!(
        rows = table.len(),
        dropped = ingested.rows_dropped,
        window = config.window,
        "built factor table"
    );

    Ok(FactorRun {
        table,
        normalized,
        composites,
        missing_columns,
        rows_read: ingested.rows_read,
        rows_dropped: ingested.rows_dropped,
    })
}
