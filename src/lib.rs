//! Usage Risk - mobile addiction risk classifier
//!
//! Trains a random forest that predicts an addiction risk label (Low, Moderate,
//! High) from smartphone usage statistics, and serves single-record predictions
//! from the persisted artifacts.
//!
//! ## Components
//!
//! - **Training pipeline** ([`pipeline::train`]): label derivation → deduplication
//!   → categorical encoding → scaling → class balancing → stratified split →
//!   forest fit → evaluation → artifact bundle
//! - **Inference adapter** ([`inference::predict`]): encode → assemble → scale →
//!   predict, against an [`ArtifactBundle`] loaded once and passed explicitly
//!
//! The two share nothing but the on-disk bundle and the [`FeatureSchema`]
//! column order.

pub mod balance;
pub mod bundle;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod forest;
pub mod inference;
pub mod labeling;
pub mod metrics;
pub mod pipeline;
pub mod plots;
pub mod report;
pub mod scaler;
pub mod schema;
pub mod split;
pub mod types;

pub use bundle::ArtifactBundle;
pub use error::{InferenceError, TrainError};
pub use inference::{predict, Prediction};
pub use pipeline::{train, TrainConfig, TrainingOutcome};
pub use report::EvaluationReport;
pub use schema::{FeatureSchema, UsageAdvisory, UsageRecord};
pub use types::{RiskDistribution, RiskLabel};

/// Crate version recorded in evaluation reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name recorded in evaluation reports
pub const PRODUCER_NAME: &str = "usage-risk";
