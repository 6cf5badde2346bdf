//! Evaluation report
//!
//! Summarizes one training run: what was loaded and removed, how labels were
//! derived and balanced, and how the fitted forest scored on the held-out
//! split. Serializes to JSON and renders as plain text.

use crate::balance::BalancingOutcome;
use crate::metrics::{ClassificationReport, ConfusionMatrix};
use crate::schema::FeatureSchema;
use crate::types::{ClassCounts, CutPoints, RiskLabel};
use crate::{PRODUCER_NAME, VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Producer metadata stamped on every report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub run_id: String,
}

impl ReportProducer {
    pub fn new() -> Self {
        Self {
            name: PRODUCER_NAME.to_string(),
            version: VERSION.to_string(),
            run_id: Uuid::new_v4().to_string(),
        }
    }
}

impl Default for ReportProducer {
    fn default() -> Self {
        Self::new()
    }
}

/// Dataset shape and label derivation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub path: String,
    pub rows_loaded: usize,
    pub duplicates_removed: usize,
    pub rows_after_dedup: usize,
    pub cut_points: CutPoints,
    /// Label distribution over every loaded row
    pub raw_label_counts: ClassCounts,
    /// Label distribution after deduplication
    pub label_counts: ClassCounts,
}

/// Balancing and split sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub balancing: BalancingOutcome,
    pub counts_before_balancing: ClassCounts,
    pub counts_after_balancing: ClassCounts,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Risk labels in model class order
    pub class_order: Vec<String>,
}

/// One feature's share of the forest's impurity decrease
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Rank feature importances (schema order in, descending out)
///
/// Ties keep schema order.
pub fn rank_importances(importances: &[f64]) -> Vec<FeatureImportance> {
    let mut ranked: Vec<FeatureImportance> = FeatureSchema::FEATURES
        .iter()
        .zip(importances.iter())
        .map(|(feature, importance)| FeatureImportance {
            feature: feature.column().to_string(),
            importance: *importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked
}

/// Full report of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    pub dataset: DatasetSummary,
    pub training: TrainingSummary,
    pub classification: ClassificationReport,
    pub confusion_matrix: ConfusionMatrix,
    pub feature_importances: Vec<FeatureImportance>,
    pub warnings: Vec<String>,
    /// Bundle files and plots written by the run
    pub artifacts: Vec<String>,
}

impl EvaluationReport {
    pub fn new(
        dataset: DatasetSummary,
        training: TrainingSummary,
        confusion_matrix: ConfusionMatrix,
        importances: &[f64],
    ) -> Self {
        let mut warnings = Vec::new();
        match &training.balancing {
            BalancingOutcome::Degraded { missing } => {
                let names: Vec<&str> = missing.iter().map(|l| l.as_str()).collect();
                warnings.push(format!(
                    "class balancing skipped: no rows labeled {}; model trained on imbalanced data",
                    names.join(", ")
                ));
            }
            BalancingOutcome::Balanced {
                target_per_class,
                downsampled,
            } => {
                for label in RiskLabel::ALL {
                    let dropped = downsampled.get(label);
                    if dropped > 0 {
                        warnings.push(format!(
                            "class {} had {} rows, above the balancing target of {}; {} real rows were dropped",
                            label,
                            training.counts_before_balancing.get(label),
                            target_per_class,
                            dropped
                        ));
                    }
                }
            }
        }

        Self {
            producer: ReportProducer::new(),
            computed_at_utc: Utc::now().to_rfc3339(),
            dataset,
            training,
            classification: ClassificationReport::from_confusion(&confusion_matrix),
            confusion_matrix,
            feature_importances: rank_importances(importances),
            warnings,
            artifacts: Vec::new(),
        }
    }

    pub fn accuracy(&self) -> f64 {
        self.classification.accuracy
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.dataset;
        let t = &self.training;

        writeln!(f, "Training report ({} {})", self.producer.name, self.producer.version)?;
        writeln!(f, "Run:       {}", self.producer.run_id)?;
        writeln!(f, "Computed:  {}", self.computed_at_utc)?;
        writeln!(f)?;
        writeln!(f, "Dataset:   {}", d.path)?;
        writeln!(
            f,
            "Rows:      {} loaded, {} duplicates removed, {} used",
            d.rows_loaded, d.duplicates_removed, d.rows_after_dedup
        )?;
        writeln!(
            f,
            "Cut points (total app usage hours): {:.4} / {:.4}",
            d.cut_points.lower, d.cut_points.upper
        )?;
        writeln!(f, "Labels (raw):          {}", d.raw_label_counts)?;
        writeln!(f, "Labels (deduplicated): {}", d.label_counts)?;
        match &t.balancing {
            BalancingOutcome::Balanced {
                target_per_class,
                downsampled,
            } => writeln!(
                f,
                "Balancing: {} rows per class ({} real rows dropped)",
                target_per_class,
                downsampled.total()
            )?,
            BalancingOutcome::Degraded { .. } => writeln!(f, "Balancing: skipped")?,
        }
        writeln!(f, "After balancing:       {}", t.counts_after_balancing)?;
        writeln!(f, "Split:     {} train / {} test", t.train_rows, t.test_rows)?;
        writeln!(f, "Class order: {}", t.class_order.join(", "))?;
        writeln!(f)?;

        writeln!(f, "Accuracy: {:.4}", self.classification.accuracy)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for class in &self.classification.classes {
            writeln!(
                f,
                "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                class.label, class.precision, class.recall, class.f1, class.support
            )?;
        }
        for (name, avg) in [
            ("macro avg", &self.classification.macro_avg),
            ("weighted avg", &self.classification.weighted_avg),
        ] {
            writeln!(
                f,
                "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name, avg.precision, avg.recall, avg.f1, avg.support
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Confusion matrix (rows = actual, columns = predicted):")?;
        write!(f, "{:>12}", "")?;
        for label in &self.confusion_matrix.labels {
            write!(f, " {:>10}", label)?;
        }
        writeln!(f)?;
        for (label, row) in self
            .confusion_matrix
            .labels
            .iter()
            .zip(self.confusion_matrix.counts.iter())
        {
            write!(f, "{:>12}", label)?;
            for count in row {
                write!(f, " {:>10}", count)?;
            }
            writeln!(f)?;
        }
        writeln!(f)?;

        writeln!(f, "Feature importances:")?;
        for fi in &self.feature_importances {
            writeln!(f, "  {:<30} {:.4}", fi.feature, fi.importance)?;
        }

        if !self.warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, "Warnings:")?;
            for w in &self.warnings {
                writeln!(f, "  - {}", w)?;
            }
        }

        if !self.artifacts.is_empty() {
            writeln!(f)?;
            writeln!(f, "Artifacts:")?;
            for a in &self.artifacts {
                writeln!(f, "  {}", a)?;
            }
        }

        Ok(())
    }
}
