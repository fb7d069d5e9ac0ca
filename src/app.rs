//! Top-level application orchestration.
//!
//! `src/main.rs` only loads `.env` and sets up logging; this module is the "real main" that:
//! - parses CLI arguments
//! - turns flags into an immutable `PipelineConfig`
//! - runs the pipeline or one of the auxiliary commands
//! - prints summaries, tables and plots

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use crate::cli::{BuildArgs, Command, HistoryArgs, NormalizeArgs, PlotArgs, ScoringArgs};
use crate::data::{HistoryCache, YahooHistory, load_history};
use crate::domain::{CompositeSpec, PipelineConfig, RetryPolicy};
use crate::error::AppError;
use crate::io::export::render_wide_csv;
use crate::io::ingest::read_table_file;
use crate::math::rank::MIN_HISTORY;
use crate::report::{format_history, format_history_origin, format_readings, format_run_summary, latest_readings};

pub mod pipeline;

/// Entry point for the `hk20` binary.
pub fn run() -> Result<(), AppError> {
    // `hk20` and `hk20 --window 60` behave like `hk20 build ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Build(args) => handle_build(args),
        Command::Normalize(args) => handle_normalize(args),
        Command::History(args) => handle_history(args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_build(args: BuildArgs) -> Result<(), AppError> {
    let config = build_config_from_args(&args)?;
    let output = pipeline::run_build(&config)?;

    if !args.quiet {
        println!("{}", format_run_summary(&output, &config));
        if let Some(factors) = &output.factors {
            println!("{}", format_readings(&latest_readings(factors)));
        }
    }

    match output.failures.into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn handle_normalize(args: NormalizeArgs) -> Result<(), AppError> {
    let config = PipelineConfig {
        sources_path: args.input.clone(),
        out_dir: PathBuf::from("."),
        window: validated_window(&args.scoring)?,
        composites: composites_from_args(&args.scoring),
        retry: RetryPolicy::default(),
    };

    let ingested = read_table_file(&args.input)?;
    let run = pipeline::build_factor_table(&ingested, &config)?;
    let csv = render_wide_csv(&run.table)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, csv)
                .map_err(|e| AppError::runtime(format!("Failed to write '{}': {e}", path.display())))?;
            info!(path = %path.display(), rows = run.table.len(), "wrote factor table");
        }
        None => print!("{csv}"),
    }

    if args.readings {
        eprintln!("{}", format_readings(&latest_readings(&run)));
    }
    Ok(())
}

fn handle_history(args: HistoryArgs) -> Result<(), AppError> {
    if args.days == 0 {
        return Err(AppError::config("--days must be > 0."));
    }
    if args.ttl_hours <= 0 {
        return Err(AppError::config("--ttl-hours must be > 0."));
    }

    let provider = YahooHistory::new(RetryPolicy::default())?;
    let cache = HistoryCache::new(args.cache_dir.clone(), chrono::Duration::hours(args.ttl_hours));
    let (rows, origin) = load_history(&provider, &cache, &args.code, args.days, args.refresh, chrono::Utc::now())?;

    if rows.is_empty() {
        return Err(AppError::no_data(format!("No history for {}.", args.code)));
    }
    info!("{}", format_history_origin(&args.code, args.days, rows.len(), origin));
    print!("{}", format_history(&rows));
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let table = read_table_file(&args.table)?.to_wide();
    let plot = crate::plot::render_column_plot(&table, &args.column, args.width, args.height)?;
    println!("{plot}");
    Ok(())
}

pub fn build_config_from_args(args: &BuildArgs) -> Result<PipelineConfig, AppError> {
    if args.retries == 0 {
        return Err(AppError::config("--retries must be >= 1."));
    }
    Ok(PipelineConfig {
        sources_path: args.sources.clone(),
        out_dir: args.out_dir.clone(),
        window: validated_window(&args.scoring)?,
        composites: composites_from_args(&args.scoring),
        retry: RetryPolicy {
            attempts: args.retries,
            base_delay: Duration::from_millis(args.retry_delay_ms),
            timeout: Duration::from_secs(args.timeout_secs),
        },
    })
}

fn validated_window(args: &ScoringArgs) -> Result<usize, AppError> {
    if args.window < MIN_HISTORY {
        return Err(AppError::config(format!(
            "--window must be >= {MIN_HISTORY} (got {}).",
            args.window
        )));
    }
    Ok(args.window)
}

fn composites_from_args(args: &ScoringArgs) -> Vec<CompositeSpec> {
    vec![
        CompositeSpec {
            column: "Fused_macro".to_string(),
            weights: args.macro_weights.clone(),
        },
        CompositeSpec {
            column: "Fused_equal".to_string(),
            weights: args.equal_weights.clone(),
        },
    ]
}

/// Rewrite argv so `hk20` defaults to `hk20 build`.
///
/// Rules:
/// - `hk20`                      -> `hk20 build`
/// - `hk20 --window 60 ...`      -> `hk20 build --window 60 ...`
/// - `hk20 --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("build".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    if arg1.starts_with('-') {
        argv.insert(1, "build".to_string());
    }
    argv
}
