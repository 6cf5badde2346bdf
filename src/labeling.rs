//! Risk label derivation
//!
//! Labels are cut from the training distribution of total app usage hours, so
//! the numeric boundaries move whenever the dataset changes.

use crate::dataset::LabeledRow;
use crate::error::TrainError;
use crate::schema::DatasetRow;
use crate::types::CutPoints;

/// Quantile of `values` using linear interpolation between order statistics
pub fn quantile(values: &[f64], q: f64) -> Result<f64, TrainError> {
    if values.is_empty() {
        return Err(TrainError::Labeling(
            "cannot compute a quantile of an empty column".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&q) {
        return Err(TrainError::Labeling(format!(
            "quantile {} outside [0, 1]",
            q
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(TrainError::Labeling(
            "total app usage hours contain non-finite values".to_string(),
        ));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let position = q * (sorted.len() - 1) as f64;
    let below = position.floor() as usize;
    let above = position.ceil() as usize;
    let fraction = position - below as f64;

    Ok(sorted[below] + (sorted[above] - sorted[below]) * fraction)
}

/// Compute the two cut points of the usage distribution
pub fn derive_cut_points(
    total_usage_hours: &[f64],
    lower_quantile: f64,
    upper_quantile: f64,
) -> Result<CutPoints, TrainError> {
    let lower = quantile(total_usage_hours, lower_quantile)?;
    let upper = quantile(total_usage_hours, upper_quantile)?;

    // three usable bins need strictly increasing edges
    if lower >= upper {
        return Err(TrainError::Labeling(format!(
            "degenerate usage distribution: cut points {:.4} and {:.4} do not increase",
            lower, upper
        )));
    }

    Ok(CutPoints { lower, upper })
}

/// Derive cut points from the raw rows and label every row
pub fn label_rows(
    rows: Vec<DatasetRow>,
    lower_quantile: f64,
    upper_quantile: f64,
) -> Result<(CutPoints, Vec<LabeledRow>), TrainError> {
    let hours: Vec<f64> = rows
        .iter()
        .map(|r| r.record.total_app_usage_hours)
        .collect();
    let cuts = derive_cut_points(&hours, lower_quantile, upper_quantile)?;

    let labeled = rows
        .into_iter()
        .map(|row| {
            let label = cuts.label_for(row.record.total_app_usage_hours);
            LabeledRow { row, label }
        })
        .collect();

    Ok((cuts, labeled))
}
