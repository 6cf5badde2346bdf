//! Random forest classifier
//!
//! An ensemble of CART trees, each grown on a bootstrap sample of the training
//! rows with a random subset of features considered at every split. Class
//! probabilities are the mean of the per-tree leaf distributions.

mod tree;

pub use tree::{DecisionTree, Node, TreeParams};

use crate::error::TrainError;
use crate::schema::{FeatureVector, FEATURE_COUNT};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Features tried per split; `None` means floor(sqrt(feature count))
    pub max_features: Option<usize>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 10,
            min_samples_split: 5,
            max_features: None,
        }
    }
}

impl ForestParams {
    fn tree_params(&self) -> TreeParams {
        let max_features = self
            .max_features
            .unwrap_or_else(|| (FEATURE_COUNT as f64).sqrt().floor() as usize)
            .clamp(1, FEATURE_COUNT);
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            max_features,
        }
    }
}

/// A fitted random forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_classes: usize,
    trees: Vec<DecisionTree>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    /// Fit a forest on class codes `0..n_classes`
    pub fn fit(
        features: &[FeatureVector],
        classes: &[usize],
        n_classes: usize,
        params: &ForestParams,
        seed: u64,
    ) -> Result<Self, TrainError> {
        if features.is_empty() {
            return Err(TrainError::Fit("no training rows".to_string()));
        }
        if features.len() != classes.len() {
            return Err(TrainError::Fit(format!(
                "{} feature rows but {} labels",
                features.len(),
                classes.len()
            )));
        }
        if let Some(bad) = classes.iter().find(|c| **c >= n_classes) {
            return Err(TrainError::Fit(format!(
                "class code {} outside 0..{}",
                bad, n_classes
            )));
        }
        if params.n_trees == 0 {
            return Err(TrainError::Fit("forest needs at least one tree".to_string()));
        }
        if features.iter().flatten().any(|v| !v.is_finite()) {
            return Err(TrainError::Fit(
                "training features contain non-finite values".to_string(),
            ));
        }

        let tree_params = params.tree_params();
        let n = features.len();
        let mut trees = Vec::with_capacity(params.n_trees);
        let mut importances = [0.0; FEATURE_COUNT];

        for t in 0..params.n_trees {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();

            let mut tree_importances = [0.0; FEATURE_COUNT];
            let tree = DecisionTree::fit(
                features,
                classes,
                bootstrap,
                n_classes,
                tree_params,
                &mut rng,
                &mut tree_importances,
            );

            normalize(&mut tree_importances);
            for (total, v) in importances.iter_mut().zip(tree_importances.iter()) {
                *total += v;
            }
            debug!(tree = t, nodes = tree.nodes().len(), depth = tree.depth(), "Grew tree");
            trees.push(tree);
        }

        normalize(&mut importances);

        Ok(Self {
            n_classes,
            trees,
            feature_importances: importances.to_vec(),
        })
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean decrease in impurity per feature, summing to 1 (schema order)
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Class probabilities in model class order
    pub fn predict_proba(&self, row: &FeatureVector) -> Vec<f64> {
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, v) in proba.iter_mut().zip(tree.predict_distribution(row)) {
                *p += v;
            }
        }
        let n_trees = self.trees.len().max(1) as f64;
        for p in proba.iter_mut() {
            *p /= n_trees;
        }
        proba
    }

    /// Winning class and the full probability vector, in one pass
    pub fn predict_with_proba(&self, row: &FeatureVector) -> (usize, Vec<f64>) {
        let proba = self.predict_proba(row);
        (argmax(&proba), proba)
    }

    pub fn predict(&self, row: &FeatureVector) -> usize {
        self.predict_with_proba(row).0
    }

    /// Structural check used when loading a persisted forest
    pub fn validate(&self) -> Result<(), String> {
        if self.n_classes == 0 {
            return Err("forest has no classes".to_string());
        }
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        if self.feature_importances.len() != FEATURE_COUNT {
            return Err(format!(
                "forest has {} feature importances, expected {}",
                self.feature_importances.len(),
                FEATURE_COUNT
            ));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_classes)
                .map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }
}

/// Index of the first maximum
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

fn normalize(values: &mut [f64; FEATURE_COUNT]) {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}
