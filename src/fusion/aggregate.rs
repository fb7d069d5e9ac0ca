//! NaN-aware weighted fusion of normalized factor scores.
//!
//! For each date the composite is the sum of `score * weight` over the
//! included factors that are defined on that date. A date where every
//! included factor is undefined has an undefined composite, never zero.
//! Missing terms are skipped, not renormalized: with `{A: 0.5, B: 0.5}` and
//! only `A = 1.0` defined, the composite is `0.5`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::warn;

use crate::domain::{CompositeSeries, NormalizedSeries, WeightSet};
use crate::fusion::weights::normalize_weights;

/// Fuse `series` with one weight configuration.
///
/// The output calendar is the union of the input calendars, ascending.
/// Pure with respect to its inputs: call once per composite definition.
pub fn fuse(name: &str, series: &[NormalizedSeries], weights: &WeightSet) -> CompositeSeries {
    let mut acc: BTreeMap<NaiveDate, Option<f64>> = BTreeMap::new();
    for s in series {
        for date in &s.dates {
            acc.entry(*date).or_insert(None);
        }
    }

    match normalize_weights(weights) {
        Some(normalized) => {
            for s in series {
                let Some(w) = normalized.get(s.factor) else {
                    continue;
                };
                for (date, score) in s.dates.iter().zip(&s.scores) {
                    if let Some(score) = score {
                        let slot = acc.entry(*date).or_insert(None);
                        *slot = Some(slot.unwrap_or(0.0) + score * w);
                    }
                }
            }
        }
        None => {
            warn!(composite = name, "no factor has a nonzero weight; composite is undefined");
        }
    }

    let (dates, scores): (Vec<NaiveDate>, Vec<Option<f64>>) = acc.into_iter().unzip();
    CompositeSeries {
        name: name.to_string(),
        dates,
        scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Factor;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn norm(factor: Factor, scores: Vec<Option<f64>>) -> NormalizedSeries {
        NormalizedSeries {
            factor,
            dates: (1..=scores.len() as u32).map(day).collect(),
            scores,
        }
    }

    #[test]
    fn missing_term_is_skipped_not_renormalized() {
        let series = vec![
            norm(Factor::Hsi, vec![Some(1.0)]),
            norm(Factor::Btc, vec![None]),
        ];
        let weights = WeightSet::new().with(Factor::Hsi, 0.5).with(Factor::Btc, 0.5);
        let out = fuse("Fused", &series, &weights);
        assert_eq!(out.scores, vec![Some(0.5)]);
    }

    #[test]
    fn all_undefined_date_stays_undefined() {
        let series = vec![
            norm(Factor::Hsi, vec![None, Some(0.2)]),
            norm(Factor::Btc, vec![None, Some(-0.4)]),
        ];
        let weights = WeightSet::new().with(Factor::Hsi, 1.0).with(Factor::Btc, 1.0);
        let out = fuse("Fused", &series, &weights);
        assert_eq!(out.scores[0], None);
        assert!((out.scores[1].unwrap() - (-0.1)).abs() < 1e-12);
    }

    #[test]
    fn excluded_factor_never_contributes() {
        let series = vec![
            norm(Factor::Hsi, vec![None]),
            norm(Factor::Vhsi, vec![Some(1.0)]),
        ];
        let weights = WeightSet::new().with(Factor::Hsi, 1.0).with(Factor::Vhsi, 0.0);
        let out = fuse("Fused", &series, &weights);
        assert_eq!(out.scores, vec![None]);
    }

    #[test]
    fn degenerate_weights_give_undefined_calendar() {
        let series = vec![norm(Factor::Hsi, vec![Some(1.0), Some(0.0)])];
        let out = fuse("Fused", &series, &WeightSet::new());
        assert_eq!(out.dates.len(), 2);
        assert!(out.scores.iter().all(Option::is_none));
    }

    #[test]
    fn same_scores_two_weightings() {
        let series = vec![
            norm(Factor::Hsi, vec![Some(1.0)]),
            norm(Factor::Hstech, vec![Some(1.0)]),
            norm(Factor::Usdcnh, vec![Some(-1.0)]),
            norm(Factor::Vhsi, vec![Some(-1.0)]),
            norm(Factor::Btc, vec![Some(1.0)]),
        ];
        let macro_ = fuse("Fused_macro", &series, &WeightSet::macro_default());
        let equal = fuse("Fused_equal", &series, &WeightSet::equal_default());
        // 0.28 + 0.22 - 0.20 - 0.15 + 0.15
        assert!((macro_.scores[0].unwrap() - 0.30).abs() < 1e-12);
        // 3/5 - 2/5
        assert!((equal.scores[0].unwrap() - 0.20).abs() < 1e-12);
    }
}
