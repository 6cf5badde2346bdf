//! Dataset ingestion
//!
//! Reads the usage CSV, checks that every required column is present and
//! removes exact duplicate rows.

use crate::error::TrainError;
use crate::schema::{DatasetRow, FeatureSchema, UsageRecord};
use crate::types::RiskLabel;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// CSV row layout; extra columns in the file are ignored
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "User_ID")]
    user_id: String,
    #[serde(rename = "Age")]
    age: f64,
    #[serde(rename = "Gender")]
    gender: String,
    #[serde(rename = "Total_App_Usage_Hours")]
    total_app_usage_hours: f64,
    #[serde(rename = "Daily_Screen_Time_Hours")]
    daily_screen_time_hours: f64,
    #[serde(rename = "Number_of_Apps_Used")]
    number_of_apps_used: f64,
    #[serde(rename = "Social_Media_Usage_Hours")]
    social_media_usage_hours: f64,
    #[serde(rename = "Productivity_App_Usage_Hours")]
    productivity_app_usage_hours: f64,
    #[serde(rename = "Gaming_App_Usage_Hours")]
    gaming_app_usage_hours: f64,
    #[serde(rename = "Location")]
    location: String,
}

impl From<CsvRow> for DatasetRow {
    fn from(row: CsvRow) -> Self {
        DatasetRow {
            user_id: row.user_id,
            record: UsageRecord {
                age: row.age,
                gender: row.gender,
                total_app_usage_hours: row.total_app_usage_hours,
                daily_screen_time_hours: row.daily_screen_time_hours,
                number_of_apps_used: row.number_of_apps_used,
                social_media_usage_hours: row.social_media_usage_hours,
                productivity_app_usage_hours: row.productivity_app_usage_hours,
                gaming_app_usage_hours: row.gaming_app_usage_hours,
                location: row.location,
            },
        }
    }
}

/// Load a usage dataset from a CSV file
pub fn load_csv(path: &Path) -> Result<Vec<DatasetRow>, TrainError> {
    if !path.exists() {
        return Err(TrainError::Dataset(format!(
            "dataset not found at {}",
            path.display()
        )));
    }
    let file = File::open(path).map_err(|e| {
        TrainError::Dataset(format!("cannot open {}: {}", path.display(), e))
    })?;
    read_csv(file)
}

/// Parse a usage dataset from any CSV reader
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<DatasetRow>, TrainError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let missing: Vec<&str> = FeatureSchema::required_dataset_columns()
        .into_iter()
        .filter(|required| !headers.iter().any(|h| h == *required))
        .collect();
    if !missing.is_empty() {
        return Err(TrainError::Dataset(format!(
            "missing required columns: {}",
            missing.join(", ")
        )));
    }

    let mut rows = Vec::new();
    for (line, result) in csv_reader.deserialize::<CsvRow>().enumerate() {
        let row = result.map_err(|e| {
            TrainError::Dataset(format!("malformed row {}: {}", line + 1, e))
        })?;
        rows.push(DatasetRow::from(row));
    }

    if rows.is_empty() {
        return Err(TrainError::Dataset("dataset contains no rows".to_string()));
    }

    Ok(rows)
}

/// A dataset row with its derived risk label
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRow {
    pub row: DatasetRow,
    pub label: RiskLabel,
}

/// Exact identity of a labeled row, floats compared bitwise
#[derive(Debug, PartialEq, Eq, Hash)]
struct RowKey<'a> {
    user_id: &'a str,
    gender: &'a str,
    location: &'a str,
    numeric: [u64; 7],
    label: RiskLabel,
}

impl<'a> RowKey<'a> {
    fn of(labeled: &'a LabeledRow) -> Self {
        let r = &labeled.row.record;
        RowKey {
            user_id: &labeled.row.user_id,
            gender: &r.gender,
            location: &r.location,
            numeric: [
                r.age.to_bits(),
                r.total_app_usage_hours.to_bits(),
                r.daily_screen_time_hours.to_bits(),
                r.number_of_apps_used.to_bits(),
                r.social_media_usage_hours.to_bits(),
                r.productivity_app_usage_hours.to_bits(),
                r.gaming_app_usage_hours.to_bits(),
            ],
            label: labeled.label,
        }
    }
}

/// Drop exact duplicate rows, keeping the first occurrence.
///
/// Returns the deduplicated rows and the number of rows removed.
pub fn deduplicate(rows: Vec<LabeledRow>) -> (Vec<LabeledRow>, usize) {
    let keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(rows.len());
        rows.iter().map(|row| seen.insert(RowKey::of(row))).collect()
    };

    let before = rows.len();
    let unique: Vec<LabeledRow> = rows
        .into_iter()
        .zip(keep)
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect();
    let removed = before - unique.len();

    (unique, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "User_ID,Age,Gender,Total_App_Usage_Hours,Daily_Screen_Time_Hours,Number_of_Apps_Used,Social_Media_Usage_Hours,Productivity_App_Usage_Hours,Gaming_App_Usage_Hours,Location";

    #[test]
    fn test_read_csv_parses_rows() {
        let data = format!(
            "{}\nU1,25,Male,5.5,7.0,12,2.0,1.5,1.0,Chicago\nU2,31,Female,2.1,3.0,8,0.5,1.0,0.2,Phoenix\n",
            HEADER
        );
        let rows = read_csv(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user_id, "U1");
        assert_eq!(rows[1].record.location, "Phoenix");
        assert_eq!(rows[1].record.total_app_usage_hours, 2.1);
    }

    #[test]
    fn test_read_csv_ignores_extra_columns() {
        let data = format!("{},Extra\nU1,25,Male,5.5,7.0,12,2.0,1.5,1.0,Chicago,x\n", HEADER);
        let rows = read_csv(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_missing_column_is_dataset_error() {
        let data = "User_ID,Age,Gender\nU1,25,Male\n";
        let err = read_csv(data.as_bytes()).unwrap_err();
        match err {
            TrainError::Dataset(msg) => {
                assert!(msg.contains("Total_App_Usage_Hours"));
                assert!(msg.contains("Location"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_numeric_value_is_dataset_error() {
        let data = format!("{}\nU1,abc,Male,5.5,7.0,12,2.0,1.5,1.0,Chicago\n", HEADER);
        assert!(matches!(
            read_csv(data.as_bytes()),
            Err(TrainError::Dataset(_))
        ));
    }

    #[test]
    fn test_empty_dataset_is_dataset_error() {
        let data = format!("{}\n", HEADER);
        assert!(matches!(
            read_csv(data.as_bytes()),
            Err(TrainError::Dataset(_))
        ));
    }

    #[test]
    fn test_load_csv_missing_file() {
        let err = load_csv(Path::new("/nonexistent/usage.csv")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_load_csv_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        writeln!(file, "U1,25,Male,5.5,7.0,12,2.0,1.5,1.0,New York").unwrap();
        drop(file);

        let rows = load_csv(&path).unwrap();
        assert_eq!(rows[0].record.location, "New York");
    }

    fn labeled(id: &str, hours: f64, label: RiskLabel) -> LabeledRow {
        LabeledRow {
            row: DatasetRow {
                user_id: id.to_string(),
                record: UsageRecord {
                    age: 30.0,
                    gender: "Male".to_string(),
                    total_app_usage_hours: hours,
                    daily_screen_time_hours: 8.0,
                    number_of_apps_used: 10.0,
                    social_media_usage_hours: 1.0,
                    productivity_app_usage_hours: 1.0,
                    gaming_app_usage_hours: 1.0,
                    location: "Houston".to_string(),
                },
            },
            label,
        }
    }

    #[test]
    fn test_deduplicate_removes_exact_copies_only() {
        let rows = vec![
            labeled("U1", 2.0, RiskLabel::Low),
            labeled("U2", 5.0, RiskLabel::Moderate),
            labeled("U1", 2.0, RiskLabel::Low),
            labeled("U3", 9.0, RiskLabel::High),
            labeled("U2", 5.0, RiskLabel::Moderate),
            // same values under a different id is not a duplicate
            labeled("U4", 2.0, RiskLabel::Low),
        ];
        let (unique, removed) = deduplicate(rows);
        assert_eq!(removed, 2);
        assert_eq!(unique.len(), 4);
        let ids: Vec<&str> = unique.iter().map(|r| r.row.user_id.as_str()).collect();
        assert_eq!(ids, vec!["U1", "U2", "U3", "U4"]);
    }
}
