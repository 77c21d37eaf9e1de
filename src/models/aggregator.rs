//! Probability averaging and majority voting for the model ensemble

use crate::types::{ClassLabel, CLASS_COUNT};
use std::collections::BTreeMap;

/// Per-class probability vector indexed by class id
pub type Distribution = [f64; CLASS_COUNT];

/// Combined decision of all contributing models.
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    /// Majority-vote class
    pub class: ClassLabel,
    /// Votes cast for `class`
    pub votes: usize,
    /// Models that contributed a distribution
    pub contributors: usize,
    /// `votes / contributors`; unrelated to the averaged probability of `class`
    pub agreement: f64,
    /// Arithmetic mean of the contributing distributions
    pub probabilities: Distribution,
}

/// Combines per-model distributions into one consensus.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsembleAggregator;

impl EnsembleAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Aggregate model name -> distribution.
    ///
    /// Returns `None` when no model contributed.
    pub fn aggregate(&self, distributions: &BTreeMap<String, Distribution>) -> Option<Consensus> {
        let contributors = distributions.len();
        if contributors == 0 {
            return None;
        }

        let probabilities = Self::average(distributions.values());
        let votes: Vec<ClassLabel> = distributions.values().map(top_class).collect();
        let (class, count) = Self::majority_vote(&votes)?;

        Some(Consensus {
            class,
            votes: count,
            contributors,
            agreement: count as f64 / contributors as f64,
            probabilities,
        })
    }

    /// Mean probability of every class across the given distributions.
    pub fn average<'a, I>(distributions: I) -> Distribution
    where
        I: IntoIterator<Item = &'a Distribution>,
    {
        let mut sum = [0.0; CLASS_COUNT];
        let mut count = 0usize;

        for distribution in distributions {
            for (total, p) in sum.iter_mut().zip(distribution) {
                *total += p;
            }
            count += 1;
        }

        if count > 0 {
            for total in &mut sum {
                *total /= count as f64;
            }
        }
        sum
    }

    /// Most frequent class and its vote count.
    ///
    /// Ties go to the lowest class id, independent of vote order.
    pub fn majority_vote(votes: &[ClassLabel]) -> Option<(ClassLabel, usize)> {
        if votes.is_empty() {
            return None;
        }

        let mut counts = [0usize; CLASS_COUNT];
        for vote in votes {
            counts[vote.id()] += 1;
        }

        let mut best = 0;
        for id in 1..CLASS_COUNT {
            if counts[id] > counts[best] {
                best = id;
            }
        }

        ClassLabel::from_id(best).map(|class| (class, counts[best]))
    }
}

/// Argmax of a distribution; ties resolve to the lowest class id.
pub fn argmax(distribution: &[f64]) -> usize {
    let mut best = 0;
    for (i, &p) in distribution.iter().enumerate().skip(1) {
        if p > distribution[best] {
            best = i;
        }
    }
    best
}

fn top_class(distribution: &Distribution) -> ClassLabel {
    // argmax of a CLASS_COUNT array is always a valid id
    ClassLabel::ALL[argmax(distribution)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(class_id: usize, peak: f64) -> Distribution {
        let rest = (1.0 - peak) / (CLASS_COUNT - 1) as f64;
        let mut d = [rest; CLASS_COUNT];
        d[class_id] = peak;
        d
    }

    fn named(distributions: Vec<Distribution>) -> BTreeMap<String, Distribution> {
        distributions
            .into_iter()
            .enumerate()
            .map(|(i, d)| (format!("model{}", i), d))
            .collect()
    }

    #[test]
    fn test_average_is_mean_not_sum() {
        let aggregator = EnsembleAggregator::new();
        let distributions = named(vec![one_hot(4, 0.8), one_hot(4, 0.6), one_hot(5, 0.5)]);

        let consensus = aggregator.aggregate(&distributions).unwrap();

        let expected_mel = (0.8 + 0.6 + 0.5 / 6.0) / 3.0;
        assert!((consensus.probabilities[4] - expected_mel).abs() < 1e-12);
        let total: f64 = consensus.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_average_sums_to_one_for_many_models() {
        let distributions: Vec<Distribution> = (0..25)
            .map(|i| {
                let raw: Vec<f64> = (0..CLASS_COUNT)
                    .map(|c| ((i * 7 + c * 3) % 11) as f64 + 0.1)
                    .collect();
                let norm: f64 = raw.iter().sum();
                let mut d = [0.0; CLASS_COUNT];
                for (slot, v) in d.iter_mut().zip(&raw) {
                    *slot = v / norm;
                }
                d
            })
            .collect();

        let averaged = EnsembleAggregator::average(distributions.iter());
        let total: f64 = averaged.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_tie_breaks_to_lowest_class_id() {
        let votes = [ClassLabel::Bkl, ClassLabel::Nv, ClassLabel::Bkl, ClassLabel::Nv];
        assert_eq!(
            EnsembleAggregator::majority_vote(&votes),
            Some((ClassLabel::Bkl, 2))
        );

        // independent of vote order
        let votes = [ClassLabel::Nv, ClassLabel::Nv, ClassLabel::Bkl, ClassLabel::Bkl];
        assert_eq!(
            EnsembleAggregator::majority_vote(&votes),
            Some((ClassLabel::Bkl, 2))
        );
    }

    #[test]
    fn test_tie_break_ignores_model_names() {
        let aggregator = EnsembleAggregator::new();
        let mut distributions = BTreeMap::new();
        distributions.insert("a".to_string(), one_hot(5, 0.9));
        distributions.insert("b".to_string(), one_hot(2, 0.4));
        distributions.insert("c".to_string(), one_hot(5, 0.9));
        distributions.insert("d".to_string(), one_hot(2, 0.4));

        let consensus = aggregator.aggregate(&distributions).unwrap();
        assert_eq!(consensus.class, ClassLabel::Bkl);
        assert_eq!(consensus.agreement, 0.5);
        // the vote disagrees with the averaged distribution here
        assert_eq!(argmax(&consensus.probabilities), 5);
    }

    #[test]
    fn test_agreement_is_vote_ratio() {
        let aggregator = EnsembleAggregator::new();
        // mel barely wins twice, nv wins strongly once
        let distributions = named(vec![one_hot(4, 0.3), one_hot(4, 0.3), one_hot(5, 0.99)]);

        let consensus = aggregator.aggregate(&distributions).unwrap();

        assert_eq!(consensus.class, ClassLabel::Mel);
        assert_eq!(consensus.votes, 2);
        assert_eq!(consensus.contributors, 3);
        assert!((consensus.agreement - 2.0 / 3.0).abs() < 1e-12);
        assert!((consensus.agreement - consensus.probabilities[4]).abs() > 1e-3);
    }

    #[test]
    fn test_single_model_is_unanimous() {
        let aggregator = EnsembleAggregator::new();
        let only = [0.1, 0.05, 0.05, 0.1, 0.2, 0.45, 0.05];
        let distributions = named(vec![only]);

        let consensus = aggregator.aggregate(&distributions).unwrap();

        assert_eq!(consensus.agreement, 1.0);
        assert_eq!(consensus.class, ClassLabel::Nv);
        assert_eq!(consensus.probabilities, only);
    }

    #[test]
    fn test_empty_input() {
        let aggregator = EnsembleAggregator::new();
        assert!(aggregator.aggregate(&BTreeMap::new()).is_none());
        assert!(EnsembleAggregator::majority_vote(&[]).is_none());
    }

    #[test]
    fn test_argmax_prefers_first_maximum() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
        assert_eq!(argmax(&[0.5]), 0);
    }
}
