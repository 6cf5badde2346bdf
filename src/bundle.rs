//! Artifact bundle
//!
//! The fitted forest, the three label encoders and the scaler, persisted as
//! five independently loadable JSON files. Saving is all-or-nothing: files are
//! staged in a scratch directory and only moved into place once every one of
//! them has been written. Loading fails if any file is missing.

use crate::encoder::LabelEncoder;
use crate::error::{InferenceError, TrainError};
use crate::forest::RandomForest;
use crate::scaler::StandardScaler;
use crate::schema::{Feature, FeatureSchema, LABEL_COLUMN};
use crate::types::RiskLabel;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const MODEL_FILE: &str = "model.json";
pub const GENDER_ENCODER_FILE: &str = "label_encoder_gender.json";
pub const LOCATION_ENCODER_FILE: &str = "label_encoder_location.json";
pub const RISK_ENCODER_FILE: &str = "label_encoder_risk.json";
pub const SCALER_FILE: &str = "scaler.json";

/// Where `save` parks a previous bundle while the new one moves in
const BACKUP_DIR: &str = ".previous";

/// Every file of a bundle, in save order
pub const BUNDLE_FILES: [&str; 5] = [
    MODEL_FILE,
    GENDER_ENCODER_FILE,
    LOCATION_ENCODER_FILE,
    RISK_ENCODER_FILE,
    SCALER_FILE,
];

/// Total mapping between the model's class indices and risk labels
///
/// Built once from the risk-label encoder; index `i` is the label the encoder
/// assigned code `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskClassMap {
    labels: Vec<RiskLabel>,
}

impl RiskClassMap {
    pub fn from_encoder(encoder: &LabelEncoder) -> Result<Self, String> {
        let labels = encoder
            .classes()
            .iter()
            .map(|c| c.parse::<RiskLabel>())
            .collect::<Result<Vec<_>, _>>()?;
        if labels.is_empty() {
            return Err("risk encoder has no classes".to_string());
        }
        Ok(Self { labels })
    }

    /// Label of a model class index
    pub fn label(&self, class: usize) -> Option<RiskLabel> {
        self.labels.get(class).copied()
    }

    /// Model class index of a label, if the model was trained on it
    pub fn class_of(&self, label: RiskLabel) -> Option<usize> {
        self.labels.iter().position(|l| *l == label)
    }

    /// Labels in model class order
    pub fn labels(&self) -> &[RiskLabel] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Everything the inference adapter needs, loaded once and shared read-only
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    model: RandomForest,
    gender_encoder: LabelEncoder,
    location_encoder: LabelEncoder,
    risk_encoder: LabelEncoder,
    scaler: StandardScaler,
    class_map: RiskClassMap,
}

impl ArtifactBundle {
    /// Assemble a bundle from freshly fitted parts, checking they agree
    pub fn new(
        model: RandomForest,
        gender_encoder: LabelEncoder,
        location_encoder: LabelEncoder,
        risk_encoder: LabelEncoder,
        scaler: StandardScaler,
    ) -> Result<Self, String> {
        let class_map = RiskClassMap::from_encoder(&risk_encoder)?;
        let bundle = Self {
            model,
            gender_encoder,
            location_encoder,
            risk_encoder,
            scaler,
            class_map,
        };
        bundle.check()?;
        Ok(bundle)
    }

    pub fn model(&self) -> &RandomForest {
        &self.model
    }

    pub fn gender_encoder(&self) -> &LabelEncoder {
        &self.gender_encoder
    }

    pub fn location_encoder(&self) -> &LabelEncoder {
        &self.location_encoder
    }

    pub fn risk_encoder(&self) -> &LabelEncoder {
        &self.risk_encoder
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn class_map(&self) -> &RiskClassMap {
        &self.class_map
    }

    /// Risk labels in the order the encoder assigned their class indices
    pub fn class_order(&self) -> &[RiskLabel] {
        self.class_map.labels()
    }

    fn check(&self) -> Result<(), String> {
        self.model.validate()?;
        self.scaler.validate()?;
        for (encoder, field) in [
            (&self.gender_encoder, Feature::Gender.column()),
            (&self.location_encoder, Feature::Location.column()),
            (&self.risk_encoder, LABEL_COLUMN),
        ] {
            encoder.validate()?;
            if encoder.field() != field {
                return Err(format!(
                    "encoder for {} found where {} was expected",
                    encoder.field(),
                    field
                ));
            }
        }
        if self.model.n_classes() != self.class_map.len() {
            return Err(format!(
                "model predicts {} classes but the risk encoder knows {}",
                self.model.n_classes(),
                self.class_map.len()
            ));
        }
        if self.scaler.columns() != FeatureSchema::columns().as_slice() {
            return Err(format!(
                "scaler columns [{}] do not match the feature schema",
                self.scaler.columns().join(", ")
            ));
        }
        Ok(())
    }

    /// Write the bundle into `dir`, replacing any previous bundle there.
    ///
    /// Returns the paths of the five files. On error no file of the new bundle
    /// is left in `dir` and a previous bundle is restored.
    pub fn save(&self, dir: &Path) -> Result<Vec<PathBuf>, TrainError> {
        self.save_with(dir, |from: &Path, to: &Path| fs::rename(from, to))
    }

    /// [`save`](Self::save) with the file move supplied by the caller
    fn save_with<R>(&self, dir: &Path, mut rename: R) -> Result<Vec<PathBuf>, TrainError>
    where
        R: FnMut(&Path, &Path) -> io::Result<()>,
    {
        let ser = |e: io::Error| TrainError::Serialization(e.to_string());

        fs::create_dir_all(dir).map_err(ser)?;
        let staging = dir.join(format!(".staging-{}", Uuid::new_v4()));
        fs::create_dir(&staging).map_err(ser)?;

        let staged = self.write_all(&staging);
        let result = staged.and_then(|_| promote(&staging, dir, &mut rename));

        // a failed rollback leaves previous files in the backup; keep them
        let stranded = result.is_err()
            && fs::read_dir(staging.join(BACKUP_DIR))
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false);
        if !stranded {
            if let Err(e) = fs::remove_dir_all(&staging) {
                warn!(path = %staging.display(), error = %e, "Could not remove staging directory");
            }
        }
        result?;

        info!(dir = %dir.display(), "Saved artifact bundle");
        Ok(BUNDLE_FILES.iter().map(|f| dir.join(f)).collect())
    }

    fn write_all(&self, dir: &Path) -> Result<(), TrainError> {
        write_json(dir, MODEL_FILE, &self.model)?;
        write_json(dir, GENDER_ENCODER_FILE, &self.gender_encoder)?;
        write_json(dir, LOCATION_ENCODER_FILE, &self.location_encoder)?;
        write_json(dir, RISK_ENCODER_FILE, &self.risk_encoder)?;
        write_json(dir, SCALER_FILE, &self.scaler)?;
        Ok(())
    }

    /// Load a bundle, failing if any of the five files is missing or invalid
    pub fn load(dir: &Path) -> Result<Self, InferenceError> {
        let missing: Vec<&str> = BUNDLE_FILES
            .iter()
            .copied()
            .filter(|f| !dir.join(f).is_file())
            .collect();
        if !missing.is_empty() {
            return Err(InferenceError::BundleIncomplete {
                missing: missing.join(", "),
            });
        }

        let model: RandomForest = read_json(dir, MODEL_FILE)?;
        let gender_encoder: LabelEncoder = read_json(dir, GENDER_ENCODER_FILE)?;
        let location_encoder: LabelEncoder = read_json(dir, LOCATION_ENCODER_FILE)?;
        let risk_encoder: LabelEncoder = read_json(dir, RISK_ENCODER_FILE)?;
        let scaler: StandardScaler = read_json(dir, SCALER_FILE)?;

        let bundle = Self::new(model, gender_encoder, location_encoder, risk_encoder, scaler)
            .map_err(InferenceError::BundleCorrupt)?;

        debug!(
            dir = %dir.display(),
            classes = ?bundle.class_order(),
            trees = bundle.model.n_trees(),
            "Loaded artifact bundle"
        );
        Ok(bundle)
    }
}

/// Outcome of checking one bundle file on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileCheck {
    pub file: &'static str,
    pub present: bool,
    pub error: Option<String>,
}

/// Check each bundle file independently (presence and parse)
pub fn inspect(dir: &Path) -> Vec<FileCheck> {
    BUNDLE_FILES
        .iter()
        .map(|&file| {
            let present = dir.join(file).is_file();
            let error = if !present {
                None
            } else {
                let parsed = match file {
                    MODEL_FILE => read_json::<RandomForest>(dir, file)
                        .and_then(|m| m.validate().map_err(InferenceError::BundleCorrupt)),
                    SCALER_FILE => read_json::<StandardScaler>(dir, file)
                        .and_then(|s| s.validate().map_err(InferenceError::BundleCorrupt)),
                    _ => read_json::<LabelEncoder>(dir, file)
                        .and_then(|e| e.validate().map_err(InferenceError::BundleCorrupt)),
                };
                parsed.err().map(|e| e.to_string())
            };
            FileCheck {
                file,
                present,
                error,
            }
        })
        .collect()
}

fn write_json<T: Serialize>(dir: &Path, file: &str, value: &T) -> Result<(), TrainError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| TrainError::Serialization(format!("{}: {}", file, e)))?;
    fs::write(dir.join(file), bytes)
        .map_err(|e| TrainError::Serialization(format!("{}: {}", file, e)))
}

fn read_json<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<T, InferenceError> {
    let bytes = fs::read(dir.join(file)).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => InferenceError::BundleIncomplete {
            missing: file.to_string(),
        },
        _ => InferenceError::BundleCorrupt(format!("{}: {}", file, e)),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| InferenceError::BundleCorrupt(format!("{}: {}", file, e)))
}

/// Move staged files into `dir`; on failure put the previous files back
///
/// The error says whether the previous bundle was restored. Files that could
/// not be restored stay in the backup directory, which the error names.
fn promote<R>(staging: &Path, dir: &Path, rename: &mut R) -> Result<(), TrainError>
where
    R: FnMut(&Path, &Path) -> io::Result<()>,
{
    let backup = staging.join(BACKUP_DIR);
    fs::create_dir(&backup).map_err(|e| TrainError::Serialization(e.to_string()))?;

    let mut moved_aside = Vec::new();
    let mut promoted = Vec::new();

    let outcome = (|| -> io::Result<()> {
        for file in BUNDLE_FILES {
            let target = dir.join(file);
            if target.exists() {
                rename(&target, &backup.join(file))?;
                moved_aside.push(file);
            }
        }
        for file in BUNDLE_FILES {
            rename(&staging.join(file), &dir.join(file))?;
            promoted.push(file);
        }
        Ok(())
    })();

    let e = match outcome {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    let mut failures = Vec::new();
    for file in &promoted {
        if let Err(err) = fs::remove_file(dir.join(file)) {
            failures.push(format!("remove new {}: {}", file, err));
        }
    }
    for file in &moved_aside {
        if let Err(err) = rename(&backup.join(file), &dir.join(file)) {
            failures.push(format!("restore previous {}: {}", file, err));
        }
    }

    let mut message = format!("could not move bundle into {}: {}", dir.display(), e);
    if failures.is_empty() {
        if !moved_aside.is_empty() {
            message.push_str("; previous bundle restored");
        }
    } else {
        warn!(
            dir = %dir.display(),
            failures = failures.len(),
            "Bundle rollback incomplete"
        );
        message.push_str(&format!(
            "; rollback incomplete ({}); previous files kept in {}",
            failures.join("; "),
            backup.display()
        ));
    }
    Err(TrainError::Serialization(message))
}

#[cfg(test)]
pub(crate) mod testing {
    //! A small fitted bundle shared by unit tests

    use super::*;
    use crate::forest::ForestParams;
    use crate::schema::{FeatureVector, UsageRecord};

    pub(crate) const GENDERS: [&str; 2] = ["Female", "Male"];
    pub(crate) const LOCATIONS: [&str; 3] = ["Chicago", "Houston", "Phoenix"];

    pub(crate) fn record(i: usize) -> UsageRecord {
        let total = 1.0 + (i % 30) as f64 * 0.3;
        UsageRecord {
            age: 18.0 + (i % 40) as f64,
            gender: GENDERS[i % 2].to_string(),
            total_app_usage_hours: total,
            daily_screen_time_hours: total + 1.5,
            number_of_apps_used: 5.0 + (i % 15) as f64,
            social_media_usage_hours: total * 0.4,
            productivity_app_usage_hours: total * 0.3,
            gaming_app_usage_hours: total * 0.2,
            location: LOCATIONS[i % 3].to_string(),
        }
    }

    pub(crate) fn label_of(record: &UsageRecord) -> RiskLabel {
        if record.total_app_usage_hours <= 4.0 {
            RiskLabel::Low
        } else if record.total_app_usage_hours <= 7.0 {
            RiskLabel::Moderate
        } else {
            RiskLabel::High
        }
    }

    pub(crate) fn sample_bundle() -> ArtifactBundle {
        let records: Vec<UsageRecord> = (0..90).map(record).collect();
        let gender = LabelEncoder::fit("Gender", records.iter().map(|r| r.gender.as_str()));
        let location = LabelEncoder::fit("Location", records.iter().map(|r| r.location.as_str()));
        let risk = LabelEncoder::fit(LABEL_COLUMN, records.iter().map(|r| label_of(r).as_str()));

        let mut x: Vec<FeatureVector> = records
            .iter()
            .map(|r| {
                FeatureSchema::assemble(
                    r,
                    gender.transform(&r.gender).unwrap(),
                    location.transform(&r.location).unwrap(),
                )
            })
            .collect();
        let y: Vec<usize> = records
            .iter()
            .map(|r| risk.transform(label_of(r).as_str()).unwrap())
            .collect();

        let columns = FeatureSchema::columns();
        let scaler = StandardScaler::fit(columns.clone(), &x).unwrap();
        scaler.transform_all(&columns, &mut x).unwrap();

        let params = ForestParams {
            n_trees: 10,
            ..ForestParams::default()
        };
        let model = RandomForest::fit(&x, &y, risk.len(), &params, 42).unwrap();
        ArtifactBundle::new(model, gender, location, risk, scaler).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::sample_bundle;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_class_order_follows_encoder() {
        let bundle = sample_bundle();
        assert_eq!(
            bundle.class_order(),
            &[RiskLabel::High, RiskLabel::Low, RiskLabel::Moderate]
        );
        assert_eq!(bundle.class_map().class_of(RiskLabel::Low), Some(1));
        assert_eq!(bundle.class_map().label(2), Some(RiskLabel::Moderate));
        assert_eq!(bundle.class_map().label(3), None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = sample_bundle();
        let paths = bundle.save(dir.path()).unwrap();
        assert_eq!(paths.len(), 5);
        assert!(paths.iter().all(|p| p.is_file()));

        // no staging leftovers
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 5);

        let loaded = ArtifactBundle::load(dir.path()).unwrap();
        assert_eq!(loaded.class_order(), bundle.class_order());
        assert_eq!(loaded.gender_encoder(), bundle.gender_encoder());
        assert_eq!(loaded.model().n_trees(), 10);
    }

    #[test]
    fn test_save_overwrites_previous_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = sample_bundle();
        bundle.save(dir.path()).unwrap();
        let first = fs::read(dir.path().join(MODEL_FILE)).unwrap();
        bundle.save(dir.path()).unwrap();
        assert_eq!(fs::read(dir.path().join(MODEL_FILE)).unwrap(), first);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 5);
    }

    /// True for moves out of a staging directory into the bundle directory
    fn is_promotion(from: &Path) -> bool {
        from.parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with(".staging-"))
    }

    fn write_previous(dir: &Path) {
        for file in BUNDLE_FILES {
            fs::write(dir.join(file), format!("previous {}", file)).unwrap();
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn refused() -> io::Error {
        io::Error::new(io::ErrorKind::PermissionDenied, "rename refused")
    }

    #[test]
    fn test_failed_promotion_restores_previous_bundle() {
        let dir = tempfile::tempdir().unwrap();
        write_previous(dir.path());

        // the first four files move in, then the scaler fails
        let err = sample_bundle()
            .save_with(dir.path(), |from: &Path, to: &Path| {
                if is_promotion(from) && from.ends_with(SCALER_FILE) {
                    return Err(refused());
                }
                fs::rename(from, to)
            })
            .unwrap_err();

        match err {
            TrainError::Serialization(msg) => {
                assert!(msg.contains("rename refused"), "{}", msg);
                assert!(msg.contains("previous bundle restored"), "{}", msg);
            }
            other => panic!("expected a serialization error, got {}", other),
        }

        let mut expected: Vec<String> = BUNDLE_FILES.iter().map(|f| f.to_string()).collect();
        expected.sort();
        assert_eq!(entries(dir.path()), expected);
        for file in BUNDLE_FILES {
            assert_eq!(
                fs::read_to_string(dir.path().join(file)).unwrap(),
                format!("previous {}", file)
            );
        }
    }

    #[test]
    fn test_failed_first_save_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let result = sample_bundle().save_with(dir.path(), |from: &Path, to: &Path| {
            if is_promotion(from) && from.ends_with(RISK_ENCODER_FILE) {
                return Err(refused());
            }
            fs::rename(from, to)
        });
        assert!(matches!(result, Err(TrainError::Serialization(_))));
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn test_incomplete_rollback_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_previous(dir.path());

        let err = sample_bundle()
            .save_with(dir.path(), |from: &Path, to: &Path| {
                let restoring = from
                    .parent()
                    .map_or(false, |p| p.ends_with(BACKUP_DIR));
                if (is_promotion(from) && from.ends_with(SCALER_FILE))
                    || (restoring && from.ends_with(MODEL_FILE))
                {
                    return Err(refused());
                }
                fs::rename(from, to)
            })
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("rollback incomplete"), "{}", msg);
        assert!(msg.contains(&format!("restore previous {}", MODEL_FILE)), "{}", msg);
        assert!(!msg.contains("previous bundle restored"), "{}", msg);

        // the unrestored file survives in the kept backup
        let staging = entries(dir.path())
            .into_iter()
            .find(|n| n.starts_with(".staging-"))
            .unwrap();
        let kept = dir.path().join(staging).join(BACKUP_DIR).join(MODEL_FILE);
        assert_eq!(
            fs::read_to_string(kept).unwrap(),
            format!("previous {}", MODEL_FILE)
        );
        assert!(!dir.path().join(MODEL_FILE).exists());
        assert_eq!(
            fs::read_to_string(dir.path().join(SCALER_FILE)).unwrap(),
            format!("previous {}", SCALER_FILE)
        );
    }

    #[test]
    fn test_missing_file_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        sample_bundle().save(dir.path()).unwrap();
        fs::remove_file(dir.path().join(SCALER_FILE)).unwrap();

        match ArtifactBundle::load(dir.path()) {
            Err(InferenceError::BundleIncomplete { missing }) => assert_eq!(missing, SCALER_FILE),
            other => panic!("expected BundleIncomplete, got {:?}", other),
        }

        let checks = inspect(dir.path());
        let scaler = checks.iter().find(|c| c.file == SCALER_FILE).unwrap();
        assert!(!scaler.present);
        assert!(checks.iter().filter(|c| c.file != SCALER_FILE).all(|c| c.present && c.error.is_none()));
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        sample_bundle().save(dir.path()).unwrap();
        fs::write(dir.path().join(RISK_ENCODER_FILE), b"{ not json").unwrap();

        assert!(matches!(
            ArtifactBundle::load(dir.path()),
            Err(InferenceError::BundleCorrupt(_))
        ));
        let checks = inspect(dir.path());
        assert!(checks.iter().any(|c| c.file == RISK_ENCODER_FILE && c.error.is_some()));
    }

    #[test]
    fn test_class_count_mismatch_is_rejected() {
        let bundle = sample_bundle();
        let two_class = LabelEncoder::fit(LABEL_COLUMN, ["Low", "High"]);
        let result = ArtifactBundle::new(
            bundle.model().clone(),
            bundle.gender_encoder().clone(),
            bundle.location_encoder().clone(),
            two_class,
            bundle.scaler().clone(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_swapped_encoders_are_rejected() {
        let bundle = sample_bundle();
        let result = ArtifactBundle::new(
            bundle.model().clone(),
            bundle.location_encoder().clone(),
            bundle.gender_encoder().clone(),
            bundle.risk_encoder().clone(),
            bundle.scaler().clone(),
        );
        assert!(result.is_err());
    }
}
