//! Weight normalization.
//!
//! Turns a sparse, possibly unbalanced `WeightSet` into a convex combination
//! over the factors that actually take part in fusion.

use std::collections::BTreeMap;

use crate::domain::{Factor, WeightSet};

/// Weights restricted to included factors, summing to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedWeights {
    weights: BTreeMap<Factor, f64>,
}

impl NormalizedWeights {
    pub fn get(&self, factor: Factor) -> Option<f64> {
        self.weights.get(&factor).copied()
    }

    pub fn factors(&self) -> impl Iterator<Item = Factor> + '_ {
        self.weights.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }
}

/// Normalize configured weights.
///
/// Factors with a zero or non-finite weight are excluded entirely. Returns
/// `None` when nothing remains; callers treat that composite as undefined on
/// every date. If the remaining weights sum to zero, they share equally.
pub fn normalize_weights(set: &WeightSet) -> Option<NormalizedWeights> {
    let included: Vec<(Factor, f64)> = set
        .iter()
        .filter(|(_, w)| w.is_finite() && *w != 0.0)
        .collect();

    if included.is_empty() {
        return None;
    }

    let total: f64 = included.iter().map(|(_, w)| w).sum();
    let weights = if total == 0.0 {
        let equal = 1.0 / included.len() as f64;
        included.into_iter().map(|(f, _)| (f, equal)).collect()
    } else {
        included.into_iter().map(|(f, w)| (f, w / total)).collect()
    };

    Some(NormalizedWeights { weights })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macro_weights_normalize_to_percentages() {
        let w = normalize_weights(&WeightSet::macro_default()).unwrap();
        assert_eq!(w.len(), 5);
        assert!((w.get(Factor::Hsi).unwrap() - 0.28).abs() < 1e-12);
        assert!((w.get(Factor::Btc).unwrap() - 0.15).abs() < 1e-12);
        assert!((w.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_weights_are_excluded() {
        let set = WeightSet::new()
            .with(Factor::Hsi, 3.0)
            .with(Factor::Vhsi, 0.0)
            .with(Factor::Btc, 1.0);
        let w = normalize_weights(&set).unwrap();
        assert_eq!(w.factors().collect::<Vec<_>>(), vec![Factor::Hsi, Factor::Btc]);
        assert_eq!(w.get(Factor::Vhsi), None);
        assert!((w.get(Factor::Hsi).unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn all_zero_or_empty_is_degenerate() {
        assert_eq!(normalize_weights(&WeightSet::new()), None);
        let zeros = WeightSet::new().with(Factor::Hsi, 0.0).with(Factor::Btc, 0.0);
        assert_eq!(normalize_weights(&zeros), None);
    }

    #[test]
    fn cancelling_weights_fall_back_to_equal() {
        let set = WeightSet::new().with(Factor::Hsi, 1.0).with(Factor::Btc, -1.0);
        let w = normalize_weights(&set).unwrap();
        assert_eq!(w.get(Factor::Hsi), Some(0.5));
        assert_eq!(w.get(Factor::Btc), Some(0.5));
    }
}
