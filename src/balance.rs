//! Class balancing by synthetic minority oversampling
//!
//! Minority classes are grown to a fixed per-class target by interpolating
//! between a sample and one of its nearest same-class neighbours in the scaled
//! feature space. Balancing only runs when every risk label is present.

use crate::schema::{FeatureVector, FEATURE_COUNT};
use crate::types::{ClassCounts, RiskLabel};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default number of rows per class after balancing
pub const DEFAULT_TARGET_PER_CLASS: usize = 400;

/// Default neighbourhood size for interpolation
pub const DEFAULT_K_NEIGHBORS: usize = 5;

/// What the balancing step did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BalancingOutcome {
    /// Every class now holds exactly `target_per_class` rows.
    ///
    /// `downsampled` counts the real rows dropped from classes that started
    /// above the target.
    Balanced {
        target_per_class: usize,
        #[serde(default)]
        downsampled: ClassCounts,
    },
    /// A label had no rows; the data was left untouched
    Degraded { missing: Vec<RiskLabel> },
}

impl BalancingOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, BalancingOutcome::Degraded { .. })
    }

    /// Real rows discarded to meet the target; zero when nothing was dropped
    pub fn rows_dropped(&self) -> usize {
        match self {
            BalancingOutcome::Balanced { downsampled, .. } => downsampled.total(),
            BalancingOutcome::Degraded { .. } => 0,
        }
    }
}

/// Synthetic minority oversampler
#[derive(Debug, Clone)]
pub struct Smote {
    target_per_class: usize,
    k_neighbors: usize,
    seed: u64,
}

impl Smote {
    pub fn new(target_per_class: usize, k_neighbors: usize, seed: u64) -> Self {
        Self {
            target_per_class,
            k_neighbors,
            seed,
        }
    }

    /// Resample so every class code in `0..n_classes` has exactly the target count.
    ///
    /// Original rows come first (in input order), synthetic rows follow class by class.
    /// Classes above the target are down-sampled without replacement.
    pub fn fit_resample(
        &self,
        features: &[FeatureVector],
        classes: &[usize],
        n_classes: usize,
    ) -> (Vec<FeatureVector>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut keep = vec![true; features.len()];
        let mut synthetic_x = Vec::new();
        let mut synthetic_y = Vec::new();

        for class in 0..n_classes {
            let members: Vec<usize> = classes
                .iter()
                .enumerate()
                .filter_map(|(i, c)| (*c == class).then_some(i))
                .collect();
            let n = members.len();
            if n == 0 {
                continue;
            }

            if n > self.target_per_class {
                let chosen = index::sample(&mut rng, n, self.target_per_class);
                let mut retained = vec![false; n];
                for i in chosen.iter() {
                    retained[i] = true;
                }
                for (member, retained) in members.iter().zip(retained) {
                    keep[*member] = retained;
                }
                debug!(class, from = n, to = self.target_per_class, "Down-sampled class");
                continue;
            }

            let needed = self.target_per_class - n;
            if needed == 0 {
                continue;
            }

            let k = self.k_neighbors.min(n - 1);
            let neighbours = nearest_neighbours(features, &members, k);

            for _ in 0..needed {
                let pick = rng.gen_range(0..n);
                let base = &features[members[pick]];
                let sample = if k == 0 {
                    *base
                } else {
                    let other = &features[neighbours[pick][rng.gen_range(0..k)]];
                    let gap: f64 = rng.gen();
                    interpolate(base, other, gap)
                };
                synthetic_x.push(sample);
                synthetic_y.push(class);
            }
            debug!(class, original = n, synthetic = needed, k, "Oversampled class");
        }

        let mut out_x: Vec<FeatureVector> = features
            .iter()
            .zip(keep.iter())
            .filter_map(|(row, keep)| keep.then_some(*row))
            .collect();
        let mut out_y: Vec<usize> = classes
            .iter()
            .zip(keep.iter())
            .filter_map(|(c, keep)| keep.then_some(*c))
            .collect();
        out_x.extend(synthetic_x);
        out_y.extend(synthetic_y);

        (out_x, out_y)
    }
}

/// Balance the data if every risk label is present; otherwise return it unchanged.
pub fn balance_classes(
    features: Vec<FeatureVector>,
    classes: Vec<usize>,
    n_classes: usize,
    counts: &ClassCounts,
    smote: &Smote,
) -> (Vec<FeatureVector>, Vec<usize>, BalancingOutcome) {
    let missing = counts.missing();
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(RiskLabel::as_str).collect();
        warn!(
            missing = %names.join(", "),
            "Risk classes missing after deduplication; skipping balancing and training on imbalanced data"
        );
        return (features, classes, BalancingOutcome::Degraded { missing });
    }

    let downsampled = counts.excess_over(smote.target_per_class);
    if downsampled.total() > 0 {
        warn!(
            target = smote.target_per_class,
            dropped = %downsampled,
            "Classes above the balancing target; dropping real rows to reach it"
        );
    }

    let (x, y) = smote.fit_resample(&features, &classes, n_classes);
    (
        x,
        y,
        BalancingOutcome::Balanced {
            target_per_class: smote.target_per_class,
            downsampled,
        },
    )
}

fn interpolate(base: &FeatureVector, other: &FeatureVector, gap: f64) -> FeatureVector {
    let mut out = [0.0; FEATURE_COUNT];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = base[i] + gap * (other[i] - base[i]);
    }
    out
}

fn squared_distance(a: &FeatureVector, b: &FeatureVector) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// For each member, the dataset indices of its `k` nearest other members
fn nearest_neighbours(features: &[FeatureVector], members: &[usize], k: usize) -> Vec<Vec<usize>> {
    members
        .iter()
        .map(|&i| {
            let mut by_distance: Vec<(f64, usize)> = members
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| (squared_distance(&features[i], &features[j]), j))
                .collect();
            // ties resolve by index so resampling stays deterministic
            by_distance.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            by_distance.into_iter().take(k).map(|(_, j)| j).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered(n_per_class: &[usize]) -> (Vec<FeatureVector>, Vec<usize>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for (class, &n) in n_per_class.iter().enumerate() {
            for i in 0..n {
                let mut row = [class as f64 * 10.0; FEATURE_COUNT];
                row[0] += i as f64 * 0.1;
                x.push(row);
                y.push(class);
            }
        }
        (x, y)
    }

    fn count(y: &[usize], class: usize) -> usize {
        y.iter().filter(|c| **c == class).count()
    }

    #[test]
    fn test_every_class_reaches_target() {
        let (x, y) = clustered(&[30, 12, 50]);
        let (bx, by) = Smote::new(40, 5, 42).fit_resample(&x, &y, 3);
        assert_eq!(bx.len(), 120);
        for class in 0..3 {
            assert_eq!(count(&by, class), 40);
        }
    }

    #[test]
    fn test_synthetic_rows_stay_inside_class_hull() {
        let (x, y) = clustered(&[10, 10, 10]);
        let (bx, by) = Smote::new(25, 3, 7).fit_resample(&x, &y, 3);
        for (row, class) in bx.iter().zip(by.iter()) {
            let base = *class as f64 * 10.0;
            assert!(row[0] >= base && row[0] <= base + 0.9 + 1e-9);
            assert_eq!(row[1], base);
        }
    }

    #[test]
    fn test_single_member_class_is_replicated() {
        let (x, y) = clustered(&[1, 5, 5]);
        let (bx, by) = Smote::new(5, 5, 1).fit_resample(&x, &y, 3);
        let class0: Vec<&FeatureVector> = bx
            .iter()
            .zip(by.iter())
            .filter_map(|(r, c)| (*c == 0).then_some(r))
            .collect();
        assert_eq!(class0.len(), 5);
        assert!(class0.iter().all(|r| **r == x[0]));
    }

    #[test]
    fn test_resampling_is_deterministic() {
        let (x, y) = clustered(&[20, 8, 15]);
        let smote = Smote::new(30, 5, 42);
        assert_eq!(smote.fit_resample(&x, &y, 3), smote.fit_resample(&x, &y, 3));
    }

    #[test]
    fn test_missing_class_leaves_data_unchanged() {
        let (x, y) = clustered(&[20, 8]);
        let counts = ClassCounts {
            low: 20,
            moderate: 8,
            high: 0,
        };
        let (bx, by, outcome) =
            balance_classes(x.clone(), y.clone(), 2, &counts, &Smote::new(400, 5, 42));
        assert_eq!(bx, x);
        assert_eq!(by, y);
        assert_eq!(
            outcome,
            BalancingOutcome::Degraded {
                missing: vec![RiskLabel::High]
            }
        );
        assert!(outcome.is_degraded());
        assert_eq!(outcome.rows_dropped(), 0);
    }

    #[test]
    fn test_oversized_class_is_reported() {
        let (x, y) = clustered(&[30, 12, 50]);
        let counts = ClassCounts {
            low: 30,
            moderate: 12,
            high: 50,
        };
        let (bx, by, outcome) = balance_classes(x, y, 3, &counts, &Smote::new(40, 5, 42));
        assert_eq!(bx.len(), 120);
        assert_eq!(count(&by, 2), 40);
        assert_eq!(
            outcome,
            BalancingOutcome::Balanced {
                target_per_class: 40,
                downsampled: ClassCounts {
                    low: 0,
                    moderate: 0,
                    high: 10,
                },
            }
        );
        assert_eq!(outcome.rows_dropped(), 10);
    }
}
