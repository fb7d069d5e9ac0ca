//! Command-line parsing for the HK sentiment pipeline.
//!
//! Argument parsing stays here; `app` maps parsed args onto a
//! `PipelineConfig` and dispatches. Every flag can also come from an
//! `HK20_*` environment variable (or a `.env` file).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{DEFAULT_WINDOW, WeightSet};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "hk20", version, about = "HK market sentiment factors and composites")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every source, then write `hk20.csv` and `factors.csv`.
    Build(BuildArgs),
    /// Score and fuse a local factors CSV without touching the network.
    Normalize(NormalizeArgs),
    /// Daily close history for one symbol, served from a local cache when fresh.
    History(HistoryArgs),
    /// Plot one column of a written table in the terminal.
    Plot(PlotArgs),
}

/// Rolling-window and composite weighting options.
#[derive(Debug, Args, Clone)]
pub struct ScoringArgs {
    /// Trailing window (observations) for the rolling quantile; at least 5.
    #[arg(long, env = "HK20_WINDOW", default_value_t = DEFAULT_WINDOW)]
    pub window: usize,

    /// Weights for the `Fused_macro` composite (`CODE=w,...`).
    #[arg(
        long,
        env = "HK20_MACRO_WEIGHTS",
        default_value = "HSI=28,HSTECH=22,USDCNH=20,VHSI=15,BTC=15"
    )]
    pub macro_weights: WeightSet,

    /// Weights for the `Fused_equal` composite (`CODE=w,...`).
    #[arg(
        long,
        env = "HK20_EQUAL_WEIGHTS",
        default_value = "HSI=20,HSTECH=20,USDCNH=20,VHSI=20,BTC=20"
    )]
    pub equal_weights: WeightSet,
}

/// Options for a full build.
#[derive(Debug, Args, Clone)]
pub struct BuildArgs {
    /// Source list: one `CODE,location` per line; `FACTORS` names the factor feed.
    #[arg(long, env = "HK20_SOURCES", default_value = "scripts/sources.txt")]
    pub sources: PathBuf,

    /// Directory receiving `hk20.csv` and `factors.csv`.
    #[arg(long, env = "HK20_OUT_DIR", default_value = "data")]
    pub out_dir: PathBuf,

    #[command(flatten)]
    pub scoring: ScoringArgs,

    /// Attempts per source before giving up on it.
    #[arg(long, env = "HK20_RETRIES", default_value_t = 3)]
    pub retries: u32,

    /// Base delay between attempts; attempt k waits `delay * (k + 1)`.
    #[arg(long, env = "HK20_RETRY_DELAY_MS", default_value_t = 2000)]
    pub retry_delay_ms: u64,

    /// Per-request timeout.
    #[arg(long, env = "HK20_TIMEOUT_SECS", default_value_t = 20)]
    pub timeout_secs: u64,

    /// Do not print the run summary.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Options for an offline normalize run.
#[derive(Debug, Args, Clone)]
pub struct NormalizeArgs {
    /// Factors CSV (`Date,HSI,HSTECH,USDCNH,VHSI,BTC`).
    #[arg(long, value_name = "CSV")]
    pub input: PathBuf,

    /// Write the factor table here instead of stdout.
    #[arg(long, value_name = "CSV")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub scoring: ScoringArgs,

    /// Also print the latest per-factor readings (to stderr).
    #[arg(long)]
    pub readings: bool,
}

/// Options for a history lookup.
#[derive(Debug, Args, Clone)]
pub struct HistoryArgs {
    /// Symbol in broker notation, e.g. `HK.00700`.
    #[arg(long)]
    pub code: String,

    /// Calendar days of history.
    #[arg(long, default_value_t = 365)]
    pub days: u32,

    /// Cache directory.
    #[arg(long, env = "HK20_CACHE_DIR", default_value = ".cache")]
    pub cache_dir: PathBuf,

    /// Cached entries older than this are refetched.
    #[arg(long, env = "HK20_TTL_HOURS", default_value_t = 12)]
    pub ttl_hours: i64,

    /// Ignore any cached entry.
    #[arg(long)]
    pub refresh: bool,
}

/// Options for plotting a written table.
#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    /// Table written by `hk20 build` or `hk20 normalize`.
    #[arg(long, value_name = "CSV", default_value = "data/factors.csv")]
    pub table: PathBuf,

    /// Column to plot.
    #[arg(long, default_value = "Fused_macro")]
    pub column: String,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Factor;

    #[test]
    fn build_defaults() {
        let cli = Cli::try_parse_from(["hk20", "build"]).unwrap();
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.sources, PathBuf::from("scripts/sources.txt"));
        assert_eq!(args.out_dir, PathBuf::from("data"));
        assert_eq!(args.scoring.window, 252);
        assert_eq!(args.scoring.macro_weights.get(Factor::Hsi), Some(28.0));
        assert_eq!(args.scoring.equal_weights.get(Factor::Btc), Some(20.0));
        assert_eq!(args.retries, 3);
        assert!(!args.quiet);
    }

    #[test]
    fn bad_weight_spec_is_rejected() {
        assert!(Cli::try_parse_from(["hk20", "build", "--macro-weights", "SPX=10"]).is_err());
    }

    #[test]
    fn normalize_requires_input() {
        assert!(Cli::try_parse_from(["hk20", "normalize"]).is_err());
        let cli = Cli::try_parse_from(["hk20", "normalize", "--input", "f.csv", "--window", "30"]).unwrap();
        let Command::Normalize(args) = cli.command else {
            panic!("expected normalize");
        };
        assert_eq!(args.scoring.window, 30);
        assert!(args.output.is_none());
    }
}
