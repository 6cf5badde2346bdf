//! Training pipeline orchestration
//!
//! Runs the batch job end to end and hands back the fitted bundle together
//! with its evaluation report. Any stage failure aborts the run; nothing is
//! written to the output directory until every fit has succeeded.
//!
//! Stages:
//! 1. load the dataset and derive risk labels from the full distribution
//! 2. drop exact duplicates
//! 3. fit the gender, location and risk encoders
//! 4. fit the scaler over the encoded feature matrix
//! 5. balance classes (skipped when a label is absent)
//! 6. stratified train/test split
//! 7. fit the forest
//! 8. evaluate on the held-out split
//! 9. render plots and persist the bundle

use crate::balance::{balance_classes, BalancingOutcome, Smote};
use crate::bundle::{ArtifactBundle, RiskClassMap};
use crate::dataset::{self, LabeledRow};
use crate::encoder::LabelEncoder;
use crate::error::{InferenceError, TrainError};
use crate::forest::RandomForest;
use crate::labeling;
use crate::metrics::ConfusionMatrix;
use crate::plots::{self, EdaSummary, EDA_PLOTS_FILE, FEATURE_IMPORTANCE_FILE};
use crate::report::{DatasetSummary, EvaluationReport, TrainingSummary};
use crate::scaler::StandardScaler;
use crate::schema::{DatasetRow, Feature, FeatureSchema, FeatureVector, LABEL_COLUMN};
use crate::split::stratified_split;
use crate::types::{ClassCounts, RiskLabel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub use crate::forest::ForestParams;

/// Tunables of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub dataset_path: PathBuf,
    pub output_dir: PathBuf,
    pub lower_quantile: f64,
    pub upper_quantile: f64,
    pub balance_target_per_class: usize,
    pub smote_k_neighbors: usize,
    pub test_fraction: f64,
    pub seed: u64,
    pub forest: ForestParams,
    pub render_plots: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("mobile_usage_behavioral_analysis.csv"),
            output_dir: PathBuf::from("artifacts"),
            lower_quantile: 0.33,
            upper_quantile: 0.66,
            balance_target_per_class: crate::balance::DEFAULT_TARGET_PER_CLASS,
            smote_k_neighbors: crate::balance::DEFAULT_K_NEIGHBORS,
            test_fraction: 0.2,
            seed: 42,
            forest: ForestParams::default(),
            render_plots: true,
        }
    }
}

impl TrainConfig {
    /// Load a config from JSON; absent fields keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self, TrainError> {
        let json = fs::read_to_string(path)
            .map_err(|e| TrainError::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&json)
            .map_err(|e| TrainError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<(), TrainError> {
        let in_unit = |q: f64| q > 0.0 && q < 1.0;
        if !in_unit(self.lower_quantile) || !in_unit(self.upper_quantile) {
            return Err(TrainError::Config(format!(
                "quantiles must lie in (0, 1), got {} and {}",
                self.lower_quantile, self.upper_quantile
            )));
        }
        if self.lower_quantile >= self.upper_quantile {
            return Err(TrainError::Config(format!(
                "lower quantile {} must be below upper quantile {}",
                self.lower_quantile, self.upper_quantile
            )));
        }
        if !in_unit(self.test_fraction) {
            return Err(TrainError::Config(format!(
                "test fraction must lie in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.balance_target_per_class == 0 {
            return Err(TrainError::Config(
                "balance target per class must be positive".to_string(),
            ));
        }
        if self.forest.n_trees == 0 {
            return Err(TrainError::Config("forest needs at least one tree".to_string()));
        }
        if self.forest.max_depth == 0 {
            return Err(TrainError::Config("max depth must be positive".to_string()));
        }
        if self.forest.min_samples_split < 2 {
            return Err(TrainError::Config(
                "min samples split must be at least 2".to_string(),
            ));
        }
        if self.forest.max_features == Some(0) {
            return Err(TrainError::Config("max features must be positive".to_string()));
        }
        Ok(())
    }
}

/// A successful training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub bundle: ArtifactBundle,
    pub report: EvaluationReport,
    /// Aggregates behind `eda_plots.svg`; absent when plots are disabled
    pub eda: Option<EdaSummary>,
}

/// Load the configured dataset and run the whole pipeline
pub fn train(config: &TrainConfig) -> Result<TrainingOutcome, TrainError> {
    config.validate()?;
    let rows = dataset::load_csv(&config.dataset_path)?;
    info!(
        path = %config.dataset_path.display(),
        rows = rows.len(),
        "Loaded dataset"
    );
    train_on_rows(config, rows)
}

/// Run the pipeline on rows already in memory
pub fn train_on_rows(
    config: &TrainConfig,
    rows: Vec<DatasetRow>,
) -> Result<TrainingOutcome, TrainError> {
    config.validate()?;
    if rows.is_empty() {
        return Err(TrainError::Dataset("dataset contains no rows".to_string()));
    }
    let rows_loaded = rows.len();

    // labels come from the raw distribution, before deduplication
    let (cut_points, labeled) =
        labeling::label_rows(rows, config.lower_quantile, config.upper_quantile)?;
    let raw_label_counts = ClassCounts::from_labels(labeled.iter().map(|r| &r.label));
    info!(
        lower = cut_points.lower,
        upper = cut_points.upper,
        counts = %raw_label_counts,
        "Derived risk labels"
    );

    // exploratory plots describe every loaded row, duplicates included
    let eda = config.render_plots.then(|| EdaSummary::from_rows(&labeled));

    let (unique, duplicates_removed) = dataset::deduplicate(labeled);
    let label_counts = ClassCounts::from_labels(unique.iter().map(|r| &r.label));
    info!(
        removed = duplicates_removed,
        remaining = unique.len(),
        counts = %label_counts,
        "Removed duplicate rows"
    );

    let encoders = fit_encoders(&unique);
    let class_map = RiskClassMap::from_encoder(&encoders.risk).map_err(TrainError::Fit)?;
    let (mut features, classes) = encode(&unique, &encoders, &class_map)?;

    let columns = FeatureSchema::columns();
    let scaler = StandardScaler::fit(columns.clone(), &features)?;
    scaler
        .transform_all(&columns, &mut features)
        .map_err(transform_error)?;
    info!(rows = features.len(), columns = columns.len(), "Scaled feature matrix");

    let smote = Smote::new(
        config.balance_target_per_class,
        config.smote_k_neighbors,
        config.seed,
    );
    let (features, classes, balancing) =
        balance_classes(features, classes, class_map.len(), &label_counts, &smote);
    let balanced_labels: Vec<RiskLabel> = classes
        .iter()
        .filter_map(|c| class_map.label(*c))
        .collect();
    let counts_after_balancing = ClassCounts::from_labels(balanced_labels.iter());
    match &balancing {
        BalancingOutcome::Balanced {
            target_per_class,
            downsampled,
        } => info!(
            per_class = target_per_class,
            dropped = downsampled.total(),
            rows = features.len(),
            "Balanced classes"
        ),
        BalancingOutcome::Degraded { missing } => warn!(
            missing = ?missing,
            rows = features.len(),
            "Training without class balancing"
        ),
    }

    let (train_split, test_split) =
        stratified_split(&features, &classes, config.test_fraction, config.seed);
    info!(
        train = train_split.len(),
        test = test_split.len(),
        "Split data"
    );

    let model = RandomForest::fit(
        &train_split.features,
        &train_split.classes,
        class_map.len(),
        &config.forest,
        config.seed,
    )?;
    info!(trees = model.n_trees(), "Fitted random forest");

    let predicted: Vec<usize> = test_split
        .features
        .iter()
        .map(|row| model.predict(row))
        .collect();
    let confusion = ConfusionMatrix::new(
        class_map.labels().iter().map(|l| l.to_string()).collect(),
        &test_split.classes,
        &predicted,
    );
    let importances = model.feature_importances().to_vec();

    let training = TrainingSummary {
        balancing,
        counts_before_balancing: label_counts,
        counts_after_balancing,
        train_rows: train_split.len(),
        test_rows: test_split.len(),
        class_order: class_map.labels().iter().map(|l| l.to_string()).collect(),
    };
    let dataset = DatasetSummary {
        path: config.dataset_path.display().to_string(),
        rows_loaded,
        duplicates_removed,
        rows_after_dedup: unique.len(),
        cut_points,
        raw_label_counts,
        label_counts,
    };
    let mut report = EvaluationReport::new(dataset, training, confusion, &importances);
    info!(accuracy = report.accuracy(), "Evaluated on held-out split");

    let bundle = ArtifactBundle::new(
        model,
        encoders.gender,
        encoders.location,
        encoders.risk,
        scaler,
    )
    .map_err(TrainError::Fit)?;

    fs::create_dir_all(&config.output_dir)
        .map_err(|e| TrainError::Serialization(format!("{}: {}", config.output_dir.display(), e)))?;

    if let Some(eda) = &eda {
        let eda_path = config.output_dir.join(EDA_PLOTS_FILE);
        plots::render_eda(&eda_path, eda)
            .map_err(|e| TrainError::Report(format!("{}: {}", EDA_PLOTS_FILE, e)))?;
        let importance_path = config.output_dir.join(FEATURE_IMPORTANCE_FILE);
        plots::render_feature_importance(&importance_path, &report.feature_importances)
            .map_err(|e| TrainError::Report(format!("{}: {}", FEATURE_IMPORTANCE_FILE, e)))?;
        report.artifacts.push(eda_path.display().to_string());
        report.artifacts.push(importance_path.display().to_string());
        info!(dir = %config.output_dir.display(), "Rendered report plots");
    }

    let saved = bundle.save(&config.output_dir)?;
    report
        .artifacts
        .extend(saved.iter().map(|p| p.display().to_string()));

    Ok(TrainingOutcome {
        bundle,
        report,
        eda,
    })
}

struct Encoders {
    gender: LabelEncoder,
    location: LabelEncoder,
    risk: LabelEncoder,
}

fn fit_encoders(rows: &[LabeledRow]) -> Encoders {
    Encoders {
        gender: LabelEncoder::fit(
            Feature::Gender.column(),
            rows.iter().map(|r| r.row.record.gender.as_str()),
        ),
        location: LabelEncoder::fit(
            Feature::Location.column(),
            rows.iter().map(|r| r.row.record.location.as_str()),
        ),
        risk: LabelEncoder::fit(LABEL_COLUMN, rows.iter().map(|r| r.label.as_str())),
    }
}

/// Encoded feature rows and risk class codes
fn encode(
    rows: &[LabeledRow],
    encoders: &Encoders,
    class_map: &RiskClassMap,
) -> Result<(Vec<FeatureVector>, Vec<usize>), TrainError> {
    let mut features = Vec::with_capacity(rows.len());
    let mut classes = Vec::with_capacity(rows.len());
    for labeled in rows {
        let record = &labeled.row.record;
        let gender = encoders.gender.transform(&record.gender).map_err(transform_error)?;
        let location = encoders
            .location
            .transform(&record.location)
            .map_err(transform_error)?;
        features.push(FeatureSchema::assemble(record, gender, location));
        let class = class_map.class_of(labeled.label).ok_or_else(|| {
            TrainError::Fit(format!("risk encoder has no class for {}", labeled.label))
        })?;
        classes.push(class);
    }
    Ok((features, classes))
}

/// A training row the freshly fitted transformers could not handle
fn transform_error(e: InferenceError) -> TrainError {
    TrainError::Fit(e.to_string())
}
