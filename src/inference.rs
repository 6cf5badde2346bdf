//! Inference adapter
//!
//! Reproduces the training-time transformation for a single record (encode
//! the categorical fields, assemble the schema-ordered row, scale) and runs the
//! forest once for both the winning class and the probability distribution.

use crate::bundle::ArtifactBundle;
use crate::error::InferenceError;
use crate::forest::argmax;
use crate::schema::{FeatureSchema, UsageAdvisory, UsageRecord};
use crate::types::{RiskDistribution, RiskLabel};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Result of one inference call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: RiskLabel,
    /// Probability of every risk label; labels the model never saw get 0
    pub probabilities: RiskDistribution,
    /// Encoded, unscaled feature row in schema order
    pub transformed: Vec<(String, f64)>,
    /// Advisory inconsistencies found in the input record
    pub advisories: Vec<UsageAdvisory>,
}

impl Prediction {
    /// Probability of the predicted label
    pub fn confidence(&self) -> f64 {
        self.probabilities.get(self.label)
    }

    /// Probabilities keyed by label string
    pub fn probability_map(&self) -> BTreeMap<String, f64> {
        self.probabilities
            .iter()
            .map(|(label, p)| (label.to_string(), p))
            .collect()
    }
}

/// Predict the risk label of one usage record.
///
/// Unknown gender or location values fail with
/// [`InferenceError::UnknownCategory`]; they are never mapped to a default.
pub fn predict(bundle: &ArtifactBundle, record: &UsageRecord) -> Result<Prediction, InferenceError> {
    let gender_code = bundle.gender_encoder().transform(&record.gender)?;
    let location_code = bundle.location_encoder().transform(&record.location)?;

    let encoded = FeatureSchema::assemble(record, gender_code, location_code);
    let scaled = bundle
        .scaler()
        .transform(&FeatureSchema::columns(), &encoded)?;

    let (class, proba) = bundle.model().predict_with_proba(&scaled);
    let class_map = bundle.class_map();
    if proba.len() != class_map.len() {
        return Err(InferenceError::Transform(format!(
            "model returned {} probabilities for {} classes",
            proba.len(),
            class_map.len()
        )));
    }

    let label = class_map.label(class).ok_or_else(|| {
        InferenceError::Transform(format!("model predicted unknown class index {}", class))
    })?;

    let mut probabilities = RiskDistribution::default();
    for (index, p) in proba.iter().enumerate() {
        if let Some(l) = class_map.label(index) {
            probabilities.set(l, *p);
        }
    }
    debug_assert_eq!(class, argmax(&proba));

    let advisories = record.advisories();
    for advisory in &advisories {
        warn!(advisory = %advisory.message(), "Usage record is inconsistent");
    }

    debug!(label = %label, confidence = probabilities.get(label), "Predicted risk");

    Ok(Prediction {
        label,
        probabilities,
        transformed: FeatureSchema::named(&encoded),
        advisories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::testing::{record, sample_bundle, GENDERS, LOCATIONS};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_probabilities_sum_to_one() {
        let bundle = sample_bundle();
        for i in 0..60 {
            let p = predict(&bundle, &record(i)).unwrap();
            assert_abs_diff_eq!(p.probabilities.sum(), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_label_is_argmax() {
        let bundle = sample_bundle();
        for i in 0..60 {
            let p = predict(&bundle, &record(i)).unwrap();
            let best = p
                .probabilities
                .iter()
                .fold(f64::MIN, |acc, (_, v)| acc.max(v));
            assert_eq!(p.confidence(), best);
        }
    }

    #[test]
    fn test_probability_map_has_label_keys() {
        let bundle = sample_bundle();
        let p = predict(&bundle, &record(3)).unwrap();
        let keys: Vec<String> = p.probability_map().into_keys().collect();
        assert_eq!(keys, vec!["High", "Low", "Moderate"]);
    }

    #[test]
    fn test_unknown_gender_is_rejected() {
        let bundle = sample_bundle();
        let mut r = record(0);
        r.gender = "Other".to_string();
        match predict(&bundle, &r) {
            Err(InferenceError::UnknownCategory { field, value }) => {
                assert_eq!(field, "Gender");
                assert_eq!(value, "Other");
            }
            other => panic!("expected UnknownCategory, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_location_is_rejected() {
        let bundle = sample_bundle();
        let mut r = record(0);
        r.location = "Atlantis".to_string();
        let err = predict(&bundle, &r).unwrap_err();
        assert!(err.is_input_error());
        assert!(err.to_string().contains("Atlantis"));
    }

    #[test]
    fn test_transformed_record_is_encoded_not_scaled() {
        let bundle = sample_bundle();
        let r = record(4);
        let p = predict(&bundle, &r).unwrap();
        assert_eq!(p.transformed.len(), 9);
        assert_eq!(p.transformed[0], ("Age".to_string(), r.age));
        let gender_code = GENDERS.iter().position(|g| *g == r.gender).unwrap() as f64;
        assert_eq!(p.transformed[1], ("Gender".to_string(), gender_code));
        let location_code = LOCATIONS.iter().position(|l| *l == r.location).unwrap() as f64;
        assert_eq!(p.transformed[8], ("Location".to_string(), location_code));
    }

    #[test]
    fn test_advisories_do_not_block_prediction() {
        let bundle = sample_bundle();
        let mut r = record(5);
        r.social_media_usage_hours = r.total_app_usage_hours + 5.0;
        let p = predict(&bundle, &r).unwrap();
        assert_eq!(p.advisories.len(), 1);
        assert!(matches!(
            p.advisories[0],
            UsageAdvisory::CategoryHoursExceedTotal { .. }
        ));
    }

    #[test]
    fn test_prediction_is_pure() {
        let bundle = sample_bundle();
        let r = record(11);
        assert_eq!(predict(&bundle, &r).unwrap(), predict(&bundle, &r).unwrap());
    }
}
