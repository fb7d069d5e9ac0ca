//! Adaptive rolling quantile normalizer.
//!
//! Each observation is mapped to its standing inside a trailing window of its
//! own history:
//!
//! ```text
//! rank  = #{ w in window : w <= x_i } / #window
//! score = 2 * rank - 1            (negated for reverse factors)
//! ```
//!
//! The window only ever looks backwards (index `i` and earlier), so a score
//! never depends on data published after its date.
//!
//! Window length adapts during warm-up:
//! - fewer than `MIN_HISTORY` points seen: undefined
//! - fewer than `WARMUP_SPAN` points seen: use everything seen so far
//! - otherwise: the configured window, capped at what is available
//!
//! Undefined entries inside the window are discarded; if fewer than
//! `MIN_HISTORY` defined values remain, the score is undefined.

use crate::domain::{Factor, NormalizedSeries, Series};

/// Minimum number of points (seen, and defined within the window).
pub const MIN_HISTORY: usize = 5;

/// Below this many points seen, the window spans the full history.
pub const WARMUP_SPAN: usize = 30;

/// Parameters for one normalization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankParams {
    pub window: usize,
    pub reverse: bool,
}

impl RankParams {
    pub fn for_factor(factor: Factor, window: usize) -> Self {
        Self {
            window,
            reverse: factor.is_reverse(),
        }
    }
}

/// Effective trailing window length once `avail` points have been seen.
pub fn effective_window(avail: usize, window: usize) -> usize {
    if avail < WARMUP_SPAN {
        avail
    } else {
        window.min(avail)
    }
}

/// Score for index `i` of `values`, or `None` when undefined.
pub fn rank_score(values: &[Option<f64>], i: usize, params: RankParams) -> Option<f64> {
    let current = (*values.get(i)?)?;

    let avail = i + 1;
    if avail < MIN_HISTORY {
        return None;
    }

    let eff = effective_window(avail, params.window);
    if eff == 0 {
        return None;
    }
    let start = avail - eff;

    let mut defined = 0usize;
    let mut at_or_below = 0usize;
    for v in values[start..=i].iter().flatten() {
        defined += 1;
        if *v <= current {
            at_or_below += 1;
        }
    }

    if defined < MIN_HISTORY {
        return None;
    }

    let rank = at_or_below as f64 / defined as f64;
    let score = 2.0 * rank - 1.0;
    Some(if params.reverse { -score } else { score })
}

/// Normalize every index of `values`; output has the same length.
pub fn rolling_quantile(values: &[Option<f64>], params: RankParams) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| rank_score(values, i, params))
        .collect()
}

/// Normalize a factor series with the factor's own reverse flag.
pub fn normalize_series(factor: Factor, series: &Series, window: usize) -> NormalizedSeries {
    let params = RankParams::for_factor(factor, window);
    NormalizedSeries {
        factor,
        dates: series.dates(),
        scores: rolling_quantile(&series.values(), params),
    }
}
