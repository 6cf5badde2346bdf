//! Usage records and advisory checks

use serde::{Deserialize, Serialize};

/// One subject's observed smartphone usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Age in years
    pub age: f64,
    /// Gender category (e.g. "Male", "Female")
    pub gender: String,
    /// Total hours per day actively using apps
    pub total_app_usage_hours: f64,
    /// Hours per day looking at the screen
    pub daily_screen_time_hours: f64,
    /// Number of distinct apps used regularly
    pub number_of_apps_used: f64,
    pub social_media_usage_hours: f64,
    pub productivity_app_usage_hours: f64,
    pub gaming_app_usage_hours: f64,
    /// Location category (e.g. "Chicago")
    pub location: String,
}

/// Advisory inconsistency in a usage record
///
/// Advisories never block a prediction; callers decide what to do with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UsageAdvisory {
    /// Social media + productivity + gaming hours exceed total app usage
    CategoryHoursExceedTotal { total: f64, category_sum: f64 },
    /// Total app usage exceeds daily screen time (multitasking or background use)
    TotalExceedsScreenTime { total: f64, screen_time: f64 },
}

impl UsageAdvisory {
    pub fn message(&self) -> String {
        match self {
            UsageAdvisory::CategoryHoursExceedTotal {
                total,
                category_sum,
            } => format!(
                "total app usage ({:.1}h) is below the sum of app categories ({:.1}h)",
                total, category_sum
            ),
            UsageAdvisory::TotalExceedsScreenTime { total, screen_time } => format!(
                "total app usage ({:.1}h) is higher than daily screen time ({:.1}h)",
                total, screen_time
            ),
        }
    }
}

/// Daily usage split by app category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageBreakdown {
    pub social_media: f64,
    pub productivity: f64,
    pub gaming: f64,
    /// Usage not attributed to a tracked category (never negative)
    pub other: f64,
}

impl UsageRecord {
    /// Sum of the three tracked app categories
    pub fn category_hours(&self) -> f64 {
        self.social_media_usage_hours + self.productivity_app_usage_hours + self.gaming_app_usage_hours
    }

    /// Check the record for advisory inconsistencies
    pub fn advisories(&self) -> Vec<UsageAdvisory> {
        let mut advisories = Vec::new();
        let category_sum = self.category_hours();

        if self.total_app_usage_hours < category_sum {
            advisories.push(UsageAdvisory::CategoryHoursExceedTotal {
                total: self.total_app_usage_hours,
                category_sum,
            });
        } else if self.total_app_usage_hours > self.daily_screen_time_hours {
            advisories.push(UsageAdvisory::TotalExceedsScreenTime {
                total: self.total_app_usage_hours,
                screen_time: self.daily_screen_time_hours,
            });
        }

        advisories
    }

    pub fn usage_breakdown(&self) -> UsageBreakdown {
        UsageBreakdown {
            social_media: self.social_media_usage_hours,
            productivity: self.productivity_app_usage_hours,
            gaming: self.gaming_app_usage_hours,
            other: (self.total_app_usage_hours - self.category_hours()).max(0.0),
        }
    }
}

/// A dataset row: a usage record plus its row identifier
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    pub user_id: String,
    pub record: UsageRecord,
}
