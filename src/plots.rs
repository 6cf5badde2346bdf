//! SVG report plots
//!
//! `eda_plots.svg` holds six exploratory panels over every labeled row
//! (duplicates included); `feature_importance.svg` ranks the forest's feature
//! importances.

use crate::dataset::LabeledRow;
use crate::report::FeatureImportance;
use crate::schema::{Feature, FeatureSchema};
use crate::types::RiskLabel;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::ops::Range;
use std::path::Path;

/// File name of the exploratory plots
pub const EDA_PLOTS_FILE: &str = "eda_plots.svg";

/// File name of the feature-importance plot
pub const FEATURE_IMPORTANCE_FILE: &str = "feature_importance.svg";

type PlotResult = Result<(), Box<dyn Error>>;

/// Aggregates behind the exploratory plots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdaSummary {
    /// Row count per risk label
    pub risk_distribution: Vec<(String, f64)>,
    /// Mean daily screen time per gender (sorted by gender)
    pub screen_time_by_gender: Vec<(String, f64)>,
    /// Mean social media hours per risk label
    pub social_media_by_risk: Vec<(String, f64)>,
    /// Mean hours per tracked app category
    pub usage_by_category: Vec<(String, f64)>,
    /// (label, age, gaming hours) per row
    pub gaming_vs_age: Vec<(RiskLabel, f64, f64)>,
    /// Pearson correlation over the numeric columns
    pub correlation: CorrelationMatrix,
}

/// Square correlation matrix with its column names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    /// Correlate the non-categorical feature columns of `rows`
    pub fn from_rows(rows: &[LabeledRow]) -> Self {
        let numeric: Vec<Feature> = FeatureSchema::FEATURES
            .iter()
            .copied()
            .filter(|f| !f.is_categorical())
            .collect();
        let series: Vec<Vec<f64>> = numeric
            .iter()
            .map(|f| {
                rows.iter()
                    .map(|r| FeatureSchema::assemble(&r.row.record, 0, 0)[f.index()])
                    .collect()
            })
            .collect();

        Self {
            columns: numeric.iter().map(|f| f.column().to_string()).collect(),
            values: series
                .iter()
                .map(|x| series.iter().map(|y| pearson(x, y)).collect())
                .collect(),
        }
    }
}

/// Pearson correlation; 0 when either series is constant
fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let n = xs.len() as f64;
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys.iter()) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        0.0
    } else {
        (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
    }
}

fn mean(sum: f64, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

impl EdaSummary {
    pub fn from_rows(rows: &[LabeledRow]) -> Self {
        let mut by_gender: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        let mut by_risk = [(0.0, 0usize); 3];
        let mut categories = [0.0; 3];

        for labeled in rows {
            let r = &labeled.row.record;
            let entry = by_gender.entry(r.gender.as_str()).or_insert((0.0, 0));
            entry.0 += r.daily_screen_time_hours;
            entry.1 += 1;

            let slot = &mut by_risk[labeled.label.ordinal()];
            slot.0 += r.social_media_usage_hours;
            slot.1 += 1;

            categories[0] += r.social_media_usage_hours;
            categories[1] += r.productivity_app_usage_hours;
            categories[2] += r.gaming_app_usage_hours;
        }

        let n = rows.len();
        Self {
            risk_distribution: RiskLabel::ALL
                .iter()
                .map(|l| (l.to_string(), by_risk[l.ordinal()].1 as f64))
                .collect(),
            screen_time_by_gender: by_gender
                .into_iter()
                .map(|(g, (sum, count))| (g.to_string(), mean(sum, count)))
                .collect(),
            social_media_by_risk: RiskLabel::ALL
                .iter()
                .map(|l| {
                    let (sum, count) = by_risk[l.ordinal()];
                    (l.to_string(), mean(sum, count))
                })
                .collect(),
            usage_by_category: ["Social Media", "Productivity", "Gaming"]
                .iter()
                .zip(categories.iter())
                .map(|(name, sum)| (name.to_string(), mean(*sum, n)))
                .collect(),
            gaming_vs_age: rows
                .iter()
                .map(|r| (r.label, r.row.record.age, r.row.record.gaming_app_usage_hours))
                .collect(),
            correlation: CorrelationMatrix::from_rows(rows),
        }
    }
}

/// Render the six exploratory panels into one SVG
pub fn render_eda(path: &Path, summary: &EdaSummary) -> PlotResult {
    let root = SVGBackend::new(path, (1650, 1000)).into_drawing_area();
    root.fill(&WHITE)?;

    let panels = root.split_evenly((2, 3));
    draw_bars(
        &panels[0],
        "Risk distribution",
        "Rows",
        &summary.risk_distribution,
        &BLUE,
    )?;
    draw_bars(
        &panels[1],
        "Daily screen time by gender",
        "Mean hours",
        &summary.screen_time_by_gender,
        &GREEN,
    )?;
    draw_correlation(&panels[2], &summary.correlation)?;
    draw_bars(
        &panels[3],
        "Social media usage by risk",
        "Mean hours",
        &summary.social_media_by_risk,
        &RED,
    )?;
    draw_scatter(&panels[4], &summary.gaming_vs_age)?;
    draw_bars(
        &panels[5],
        "Average usage by app category",
        "Mean hours",
        &summary.usage_by_category,
        &MAGENTA,
    )?;

    root.present()?;
    Ok(())
}

/// Render feature importances as horizontal bars, largest on top
pub fn render_feature_importance(path: &Path, ranked: &[FeatureImportance]) -> PlotResult {
    let root = SVGBackend::new(path, (900, 540)).into_drawing_area();
    root.fill(&WHITE)?;

    let n = ranked.len() as u32;
    let x_max = axis_max(ranked.iter().map(|fi| fi.importance));
    // first-ranked feature sits on the top segment
    let label_of = |i: u32| -> String {
        ranked
            .get((n - 1 - i) as usize)
            .map(|fi| fi.feature.clone())
            .unwrap_or_default()
    };

    let mut chart = ChartBuilder::on(&root)
        .caption("Feature importance", ("sans-serif", 20).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(220)
        .build_cartesian_2d(0f64..x_max, (0u32..n).into_segmented())?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(ranked.len())
        .y_label_formatter(&|y| match y {
            SegmentValue::CenterOf(i) if *i < n => label_of(*i),
            _ => String::new(),
        })
        .x_desc("Mean decrease in impurity")
        .draw()?;

    chart.draw_series(
        Histogram::horizontal(&chart)
            .style(BLUE.mix(0.7).filled())
            .margin(4)
            .data(
                ranked
                    .iter()
                    .enumerate()
                    .map(|(rank, fi)| (n - 1 - rank as u32, fi.importance)),
            ),
    )?;

    root.present()?;
    Ok(())
}

fn draw_bars(
    area: &DrawingArea<SVGBackend<'_>, Shift>,
    title: &str,
    y_desc: &str,
    bars: &[(String, f64)],
    color: &RGBColor,
) -> PlotResult {
    let n = bars.len() as u32;
    let y_max = axis_max(bars.iter().map(|(_, v)| *v));

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 18).into_font())
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(50)
        .build_cartesian_2d((0u32..n).into_segmented(), 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(bars.len())
        .x_label_formatter(&|x| match x {
            SegmentValue::CenterOf(i) => bars
                .get(*i as usize)
                .map(|(name, _)| name.clone())
                .unwrap_or_default(),
            _ => String::new(),
        })
        .y_desc(y_desc)
        .draw()?;

    chart.draw_series(
        Histogram::vertical(&chart)
            .style(color.mix(0.7).filled())
            .margin(10)
            .data(bars.iter().enumerate().map(|(i, (_, v))| (i as u32, *v))),
    )?;

    Ok(())
}

fn draw_correlation(area: &DrawingArea<SVGBackend<'_>, Shift>, matrix: &CorrelationMatrix) -> PlotResult {
    let n = matrix.columns.len() as u32;
    // short names keep the axis readable
    let short = |i: u32| -> String {
        matrix
            .columns
            .get(i as usize)
            .map(|c| c.split('_').next().unwrap_or_default().to_string())
            .unwrap_or_default()
    };

    let mut chart = ChartBuilder::on(area)
        .caption("Correlation heatmap", ("sans-serif", 18).into_font())
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(80)
        .build_cartesian_2d((0u32..n).into_segmented(), (0u32..n).into_segmented())?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n as usize)
        .y_labels(n as usize)
        .x_label_formatter(&|x| match x {
            SegmentValue::CenterOf(i) => short(*i),
            _ => String::new(),
        })
        .y_label_formatter(&|y| match y {
            SegmentValue::CenterOf(i) => short(*i),
            _ => String::new(),
        })
        .draw()?;

    let cells: Vec<(u32, u32, f64)> = matrix
        .values
        .iter()
        .enumerate()
        .flat_map(|(i, row)| {
            row.iter()
                .enumerate()
                .map(move |(j, v)| (i as u32, j as u32, *v))
        })
        .collect();

    chart.draw_series(cells.iter().map(|&(i, j, v)| {
        Rectangle::new(
            [
                (SegmentValue::Exact(i), SegmentValue::Exact(j)),
                (SegmentValue::Exact(i + 1), SegmentValue::Exact(j + 1)),
            ],
            diverging(v).filled(),
        )
    }))?;

    let annotation = ("sans-serif", 11)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Center));
    chart.draw_series(cells.iter().map(|&(i, j, v)| {
        Text::new(
            format!("{:.2}", v),
            (SegmentValue::CenterOf(i), SegmentValue::CenterOf(j)),
            annotation.clone(),
        )
    }))?;

    Ok(())
}

fn draw_scatter(area: &DrawingArea<SVGBackend<'_>, Shift>, points: &[(RiskLabel, f64, f64)]) -> PlotResult {
    let mut chart = ChartBuilder::on(area)
        .caption("Gaming usage vs. age", ("sans-serif", 18).into_font())
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(50)
        .build_cartesian_2d(
            padded_range(points.iter().map(|p| p.1)),
            padded_range(points.iter().map(|p| p.2)),
        )?;

    chart
        .configure_mesh()
        .x_desc("Age")
        .y_desc("Gaming hours")
        .draw()?;

    for label in RiskLabel::ALL {
        let color = label_color(label);
        chart
            .draw_series(
                points
                    .iter()
                    .filter(|p| p.0 == label)
                    .map(|p| Circle::new((p.1, p.2), 3, color.mix(0.7).filled())),
            )?
            .label(label.as_str())
            .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    Ok(())
}

fn label_color(label: RiskLabel) -> RGBColor {
    match label {
        RiskLabel::Low => RGBColor(44, 160, 44),
        RiskLabel::Moderate => RGBColor(255, 127, 14),
        RiskLabel::High => RGBColor(214, 39, 40),
    }
}

/// Blue for -1, white for 0, red for +1
fn diverging(r: f64) -> RGBColor {
    let t = r.clamp(-1.0, 1.0);
    let fade = (255.0 * (1.0 - t.abs())).round() as u8;
    if t >= 0.0 {
        RGBColor(255, fade, fade)
    } else {
        RGBColor(fade, fade, 255)
    }
}

/// Data range with a margin on both sides; never empty
fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return 0.0..1.0;
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 1.0 };
    (lo - pad)..(hi + pad)
}

/// Upper axis bound with some headroom; never an empty range
fn axis_max(values: impl Iterator<Item = f64>) -> f64 {
    let max = values.fold(0.0_f64, f64::max);
    if max > 0.0 {
        max * 1.1
    } else {
        1.0
    }
}
