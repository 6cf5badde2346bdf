//! Classification metrics on the held-out split

use serde::{Deserialize, Serialize};

/// Precision, recall, F1 and support of one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Averaged precision, recall and F1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class metrics plus accuracy and macro/weighted averages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
}

/// Rows are true classes, columns predicted classes (model class order)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(labels: Vec<String>, actual: &[usize], predicted: &[usize]) -> Self {
        let k = labels.len();
        let mut counts = vec![vec![0; k]; k];
        for (&a, &p) in actual.iter().zip(predicted.iter()) {
            if a < k && p < k {
                counts[a][p] += 1;
            }
        }
        Self { labels, counts }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.labels.len()).map(|i| self.counts[i][i]).sum()
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ClassificationReport {
    pub fn from_confusion(matrix: &ConfusionMatrix) -> Self {
        let k = matrix.labels.len();
        let total = matrix.total();

        let classes: Vec<ClassMetrics> = (0..k)
            .map(|c| {
                let tp = matrix.counts[c][c];
                let predicted: usize = (0..k).map(|r| matrix.counts[r][c]).sum();
                let support: usize = matrix.counts[c].iter().sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label: matrix.labels[c].clone(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        let macro_avg = average(&classes, |_| 1.0, total);
        let weighted_avg = average(&classes, |m| m.support as f64, total);

        Self {
            accuracy: ratio(matrix.correct(), total),
            classes,
            macro_avg,
            weighted_avg,
        }
    }
}

fn average(
    classes: &[ClassMetrics],
    weight: impl Fn(&ClassMetrics) -> f64,
    support: usize,
) -> AveragedMetrics {
    let total_weight: f64 = classes.iter().map(&weight).sum();
    let mean = |value: fn(&ClassMetrics) -> f64| {
        if total_weight > 0.0 {
            classes.iter().map(|m| weight(m) * value(m)).sum::<f64>() / total_weight
        } else {
            0.0
        }
    };
    AveragedMetrics {
        precision: mean(|m| m.precision),
        recall: mean(|m| m.recall),
        f1: mean(|m| m.f1),
        support,
    }
}
