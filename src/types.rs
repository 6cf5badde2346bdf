//! Core types shared by the training pipeline and the inference adapter
//!
//! The risk label domain is ordered (Low < Moderate < High). Its mapping to the
//! model's integer classes is not fixed here; it is whatever the risk-label
//! encoder assigned at training time (see [`crate::bundle::RiskClassMap`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Addiction risk label derived from total app usage hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLabel {
    Low,
    Moderate,
    High,
}

impl RiskLabel {
    /// All labels in ascending risk order
    pub const ALL: [RiskLabel; 3] = [RiskLabel::Low, RiskLabel::Moderate, RiskLabel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Low => "Low",
            RiskLabel::Moderate => "Moderate",
            RiskLabel::High => "High",
        }
    }

    /// Position in ascending risk order (Low = 0)
    pub fn ordinal(&self) -> usize {
        match self {
            RiskLabel::Low => 0,
            RiskLabel::Moderate => 1,
            RiskLabel::High => 2,
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(RiskLabel::Low),
            "Moderate" => Ok(RiskLabel::Moderate),
            "High" => Ok(RiskLabel::High),
            other => Err(format!("unknown risk label {:?}", other)),
        }
    }
}

/// Quantile cut points of total app usage hours
///
/// Bins are (-inf, lower], (lower, upper], (upper, +inf).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutPoints {
    pub lower: f64,
    pub upper: f64,
}

impl CutPoints {
    /// Assign a label; values on a boundary fall into the lower bin
    pub fn label_for(&self, total_usage_hours: f64) -> RiskLabel {
        if total_usage_hours <= self.lower {
            RiskLabel::Low
        } else if total_usage_hours <= self.upper {
            RiskLabel::Moderate
        } else {
            RiskLabel::High
        }
    }
}

/// Per-label row counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    #[serde(rename = "Low")]
    pub low: usize,
    #[serde(rename = "Moderate")]
    pub moderate: usize,
    #[serde(rename = "High")]
    pub high: usize,
}

impl ClassCounts {
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a RiskLabel>) -> Self {
        let mut counts = Self::default();
        for label in labels {
            *counts.get_mut(*label) += 1;
        }
        counts
    }

    pub fn get(&self, label: RiskLabel) -> usize {
        match label {
            RiskLabel::Low => self.low,
            RiskLabel::Moderate => self.moderate,
            RiskLabel::High => self.high,
        }
    }

    fn get_mut(&mut self, label: RiskLabel) -> &mut usize {
        match label {
            RiskLabel::Low => &mut self.low,
            RiskLabel::Moderate => &mut self.moderate,
            RiskLabel::High => &mut self.high,
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.moderate + self.high
    }

    /// Rows each label holds beyond `target`
    pub fn excess_over(&self, target: usize) -> Self {
        Self {
            low: self.low.saturating_sub(target),
            moderate: self.moderate.saturating_sub(target),
            high: self.high.saturating_sub(target),
        }
    }

    /// Labels with no rows at all
    pub fn missing(&self) -> Vec<RiskLabel> {
        RiskLabel::ALL
            .into_iter()
            .filter(|label| self.get(*label) == 0)
            .collect()
    }
}

impl fmt::Display for ClassCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Low={} Moderate={} High={}",
            self.low, self.moderate, self.high
        )
    }
}

/// Probability of each risk label, keyed by the literal label strings when serialized
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskDistribution {
    #[serde(rename = "Low")]
    pub low: f64,
    #[serde(rename = "Moderate")]
    pub moderate: f64,
    #[serde(rename = "High")]
    pub high: f64,
}

impl RiskDistribution {
    pub fn get(&self, label: RiskLabel) -> f64 {
        match label {
            RiskLabel::Low => self.low,
            RiskLabel::Moderate => self.moderate,
            RiskLabel::High => self.high,
        }
    }

    pub fn set(&mut self, label: RiskLabel, probability: f64) {
        match label {
            RiskLabel::Low => self.low = probability,
            RiskLabel::Moderate => self.moderate = probability,
            RiskLabel::High => self.high = probability,
        }
    }

    /// (label, probability) pairs in ascending risk order
    pub fn iter(&self) -> impl Iterator<Item = (RiskLabel, f64)> + '_ {
        RiskLabel::ALL.into_iter().map(move |label| (label, self.get(label)))
    }

    pub fn sum(&self) -> f64 {
        self.low + self.moderate + self.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_round_trip_through_str() {
        for label in RiskLabel::ALL {
            assert_eq!(label.as_str().parse::<RiskLabel>().unwrap(), label);
        }
        assert!("Severe".parse::<RiskLabel>().is_err());
    }

    #[test]
    fn test_cut_points_lowest_inclusive() {
        let cuts = CutPoints {
            lower: 3.2,
            upper: 6.8,
        };
        assert_eq!(cuts.label_for(2.61), RiskLabel::Low);
        assert_eq!(cuts.label_for(3.2), RiskLabel::Low);
        assert_eq!(cuts.label_for(3.21), RiskLabel::Moderate);
        assert_eq!(cuts.label_for(6.8), RiskLabel::Moderate);
        assert_eq!(cuts.label_for(6.81), RiskLabel::High);
    }

    #[test]
    fn test_cut_points_monotonic() {
        let cuts = CutPoints {
            lower: 3.2,
            upper: 6.8,
        };
        let mut previous = RiskLabel::Low;
        for step in 0..200 {
            let hours = step as f64 * 0.05;
            let label = cuts.label_for(hours);
            assert!(label >= previous, "{} hours went from {} to {}", hours, previous, label);
            previous = label;
        }
    }

    #[test]
    fn test_class_counts_missing() {
        let labels = [RiskLabel::Low, RiskLabel::High, RiskLabel::Low];
        let counts = ClassCounts::from_labels(labels.iter());
        assert_eq!(counts.low, 2);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.missing(), vec![RiskLabel::Moderate]);
    }

    #[test]
    fn test_distribution_serializes_with_label_keys() {
        let dist = RiskDistribution {
            low: 0.5,
            moderate: 0.3,
            high: 0.2,
        };
        let value = serde_json::to_value(dist).unwrap();
        assert_eq!(value["Low"], 0.5);
        assert_eq!(value["Moderate"], 0.3);
        assert_eq!(value["High"], 0.2);
    }
}
