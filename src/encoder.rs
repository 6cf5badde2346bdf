//! Categorical label encoding
//!
//! A fitted [`LabelEncoder`] is a bijection between the category strings seen
//! during training and the codes `0..k`, assigned in sorted order.

use crate::error::InferenceError;
use serde::{Deserialize, Serialize};

/// Fitted encoder for one categorical column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    /// Column this encoder belongs to, used in error messages
    field: String,
    /// Known categories; a category's code is its index
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit an encoder on the observed values of a column
    pub fn fit<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classes: Vec<String> = values.into_iter().map(|v| v.as_ref().to_string()).collect();
        classes.sort();
        classes.dedup();

        Self {
            field: field.into(),
            classes,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Known categories in code order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    fn code_of(&self, value: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .ok()
    }

    /// Encode a category; unseen categories are an error, never a default code
    pub fn transform(&self, value: &str) -> Result<usize, InferenceError> {
        self.code_of(value)
            .ok_or_else(|| InferenceError::UnknownCategory {
                field: self.field.clone(),
                value: value.to_string(),
            })
    }

    /// Decode a code back to its category
    pub fn inverse_transform(&self, code: usize) -> Result<&str, InferenceError> {
        self.classes.get(code).map(String::as_str).ok_or_else(|| {
            InferenceError::Transform(format!(
                "code {} out of range for {} encoder with {} classes",
                code,
                self.field,
                self.classes.len()
            ))
        })
    }

    /// Structural check used when loading a persisted encoder
    pub fn validate(&self) -> Result<(), String> {
        if self.classes.is_empty() {
            return Err(format!("{} encoder has no classes", self.field));
        }
        if self.classes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(format!(
                "{} encoder classes are not sorted and unique",
                self.field
            ));
        }
        Ok(())
    }
}
