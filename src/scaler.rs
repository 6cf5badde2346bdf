//! Feature standardization
//!
//! Every feature column, including the label-encoded categorical ones, is
//! shifted by its training mean and divided by its (population) standard
//! deviation. Zero-variance columns are divided by 1.

use crate::error::{InferenceError, TrainError};
use crate::schema::{FeatureVector, FEATURE_COUNT};
use serde::{Deserialize, Serialize};

/// Fitted per-column standardization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    columns: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit column means and standard deviations
    pub fn fit(columns: Vec<String>, rows: &[FeatureVector]) -> Result<Self, TrainError> {
        if columns.len() != FEATURE_COUNT {
            return Err(TrainError::Fit(format!(
                "scaler expects {} columns, got {}",
                FEATURE_COUNT,
                columns.len()
            )));
        }
        if rows.is_empty() {
            return Err(TrainError::Fit(
                "cannot fit a scaler on zero rows".to_string(),
            ));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; FEATURE_COUNT];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.iter()) {
                *m += v;
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut variance = vec![0.0; FEATURE_COUNT];
        for row in rows {
            for ((var, v), m) in variance.iter_mut().zip(row.iter()).zip(mean.iter()) {
                *var += (v - m).powi(2);
            }
        }
        let scale = variance
            .into_iter()
            .map(|var| {
                let std = (var / n).sqrt();
                if std > f64::EPSILON {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Self {
            columns,
            mean,
            scale,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Standardize one row whose columns are named by `columns`
    pub fn transform(
        &self,
        columns: &[String],
        row: &FeatureVector,
    ) -> Result<FeatureVector, InferenceError> {
        if columns != self.columns.as_slice() {
            return Err(InferenceError::Transform(format!(
                "input columns [{}] do not match fitted columns [{}]",
                columns.join(", "),
                self.columns.join(", ")
            )));
        }

        let mut out = [0.0; FEATURE_COUNT];
        for (i, value) in row.iter().enumerate() {
            if !value.is_finite() {
                return Err(InferenceError::Transform(format!(
                    "non-finite value for column {}",
                    self.columns[i]
                )));
            }
            out[i] = (value - self.mean[i]) / self.scale[i];
        }
        Ok(out)
    }

    /// Standardize many rows in place
    pub fn transform_all(
        &self,
        columns: &[String],
        rows: &mut [FeatureVector],
    ) -> Result<(), InferenceError> {
        for row in rows.iter_mut() {
            *row = self.transform(columns, row)?;
        }
        Ok(())
    }

    /// Structural check used when loading a persisted scaler
    pub fn validate(&self) -> Result<(), String> {
        if self.columns.len() != FEATURE_COUNT
            || self.mean.len() != FEATURE_COUNT
            || self.scale.len() != FEATURE_COUNT
        {
            return Err(format!(
                "scaler shape mismatch: {} columns, {} means, {} scales (expected {})",
                self.columns.len(),
                self.mean.len(),
                self.scale.len(),
                FEATURE_COUNT
            ));
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err("scaler has a non-positive scale".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureSchema;
    use approx::assert_abs_diff_eq;

    fn rows() -> Vec<FeatureVector> {
        vec![
            [20.0, 0.0, 1.0, 2.0, 5.0, 0.5, 0.5, 0.0, 0.0],
            [30.0, 1.0, 3.0, 4.0, 10.0, 1.5, 0.5, 1.0, 1.0],
            [40.0, 0.0, 5.0, 6.0, 15.0, 2.5, 0.5, 2.0, 2.0],
        ]
    }

    #[test]
    fn test_fit_population_statistics() {
        let scaler = StandardScaler::fit(FeatureSchema::columns(), &rows()).unwrap();
        assert_abs_diff_eq!(scaler.mean()[0], 30.0);
        // population std of 20, 30, 40
        assert_abs_diff_eq!(scaler.scale()[0], (200.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        // constant column keeps unit scale
        assert_abs_diff_eq!(scaler.scale()[6], 1.0);
    }

    #[test]
    fn test_fit_failures_are_training_errors() {
        assert!(matches!(
            StandardScaler::fit(FeatureSchema::columns(), &[]),
            Err(TrainError::Fit(_))
        ));
        assert!(matches!(
            StandardScaler::fit(vec!["Age".to_string()], &rows()),
            Err(TrainError::Fit(_))
        ));
    }

    #[test]
    fn test_transformed_columns_are_standardized() {
        let columns = FeatureSchema::columns();
        let scaler = StandardScaler::fit(columns.clone(), &rows()).unwrap();
        let mut data = rows();
        scaler.transform_all(&columns, &mut data).unwrap();

        for col in 0..FEATURE_COUNT {
            let mean: f64 = data.iter().map(|r| r[col]).sum::<f64>() / 3.0;
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(data[0][6], 0.0);
    }

    #[test]
    fn test_column_mismatch_is_transform_error() {
        let scaler = StandardScaler::fit(FeatureSchema::columns(), &rows()).unwrap();
        let mut reordered = FeatureSchema::columns();
        reordered.swap(0, 1);
        assert!(matches!(
            scaler.transform(&reordered, &rows()[0]),
            Err(InferenceError::Transform(_))
        ));
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let scaler = StandardScaler::fit(FeatureSchema::columns(), &rows()).unwrap();
        let mut row = rows()[0];
        row[3] = f64::INFINITY;
        let err = scaler.transform(&FeatureSchema::columns(), &row).unwrap_err();
        assert!(err.to_string().contains("Daily_Screen_Time_Hours"));
    }

    #[test]
    fn test_validate_catches_truncated_scaler() {
        let json = r#"{"columns":["Age"],"mean":[1.0],"scale":[1.0]}"#;
        let scaler: StandardScaler = serde_json::from_str(json).unwrap();
        assert!(scaler.validate().is_err());
    }
}
