//! Feature columns and their fixed order
//!
//! Training and inference both assemble feature vectors through
//! [`FeatureSchema`], so the column order cannot drift between them.

use crate::schema::record::UsageRecord;
use serde::{Deserialize, Serialize};

/// Name of the row identifier column (never a feature)
pub const ID_COLUMN: &str = "User_ID";

/// Name of the derived label column
pub const LABEL_COLUMN: &str = "Addiction_Risk";

/// Number of model features
pub const FEATURE_COUNT: usize = 9;

/// One feature row in schema order
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Model feature columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    Age,
    Gender,
    TotalAppUsageHours,
    DailyScreenTimeHours,
    NumberOfAppsUsed,
    SocialMediaUsageHours,
    ProductivityAppUsageHours,
    GamingAppUsageHours,
    Location,
}

impl Feature {
    /// Dataset column name
    pub fn column(&self) -> &'static str {
        match self {
            Feature::Age => "Age",
            Feature::Gender => "Gender",
            Feature::TotalAppUsageHours => "Total_App_Usage_Hours",
            Feature::DailyScreenTimeHours => "Daily_Screen_Time_Hours",
            Feature::NumberOfAppsUsed => "Number_of_Apps_Used",
            Feature::SocialMediaUsageHours => "Social_Media_Usage_Hours",
            Feature::ProductivityAppUsageHours => "Productivity_App_Usage_Hours",
            Feature::GamingAppUsageHours => "Gaming_App_Usage_Hours",
            Feature::Location => "Location",
        }
    }

    /// Categorical columns are label-encoded before scaling
    pub fn is_categorical(&self) -> bool {
        matches!(self, Feature::Gender | Feature::Location)
    }

    /// Position of this feature in a [`FeatureVector`]
    pub fn index(&self) -> usize {
        FeatureSchema::FEATURES
            .iter()
            .position(|f| f == self)
            .unwrap_or(FEATURE_COUNT)
    }
}

/// The fixed feature order
pub struct FeatureSchema;

impl FeatureSchema {
    pub const FEATURES: [Feature; FEATURE_COUNT] = [
        Feature::Age,
        Feature::Gender,
        Feature::TotalAppUsageHours,
        Feature::DailyScreenTimeHours,
        Feature::NumberOfAppsUsed,
        Feature::SocialMediaUsageHours,
        Feature::ProductivityAppUsageHours,
        Feature::GamingAppUsageHours,
        Feature::Location,
    ];

    /// Feature column names in order
    pub fn columns() -> Vec<String> {
        Self::FEATURES
            .iter()
            .map(|f| f.column().to_string())
            .collect()
    }

    /// Columns a training dataset must provide
    pub fn required_dataset_columns() -> Vec<&'static str> {
        std::iter::once(ID_COLUMN)
            .chain(Self::FEATURES.iter().map(|f| f.column()))
            .collect()
    }

    /// Build the encoded (unscaled) feature row for a record
    pub fn assemble(record: &UsageRecord, gender_code: usize, location_code: usize) -> FeatureVector {
        let mut row = [0.0; FEATURE_COUNT];
        for (slot, feature) in row.iter_mut().zip(Self::FEATURES.iter()) {
            *slot = match feature {
                Feature::Age => record.age,
                Feature::Gender => gender_code as f64,
                Feature::TotalAppUsageHours => record.total_app_usage_hours,
                Feature::DailyScreenTimeHours => record.daily_screen_time_hours,
                Feature::NumberOfAppsUsed => record.number_of_apps_used,
                Feature::SocialMediaUsageHours => record.social_media_usage_hours,
                Feature::ProductivityAppUsageHours => record.productivity_app_usage_hours,
                Feature::GamingAppUsageHours => record.gaming_app_usage_hours,
                Feature::Location => location_code as f64,
            };
        }
        row
    }

    /// Pair each value of a row with its column name
    pub fn named(row: &FeatureVector) -> Vec<(String, f64)> {
        Self::FEATURES
            .iter()
            .zip(row.iter())
            .map(|(f, v)| (f.column().to_string(), *v))
            .collect()
    }
}
