//! riskctl - command-line interface for the usage risk classifier
//!
//! Commands:
//! - train: Run the training pipeline and write the artifact bundle
//! - predict: Predict the risk label of one usage record
//! - doctor: Check an artifact bundle file by file

use clap::{Parser, Subcommand};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use usage_risk::bundle::{self, ArtifactBundle};
use usage_risk::pipeline::{self, TrainConfig};
use usage_risk::{InferenceError, RiskLabel, TrainError, UsageAdvisory, UsageRecord};
use usage_risk::{PRODUCER_NAME, VERSION};

/// Train and query a mobile addiction risk classifier
#[derive(Parser)]
#[command(name = "riskctl")]
#[command(version = VERSION)]
#[command(about = "Train and query a mobile addiction risk classifier", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the training pipeline
    Train {
        /// JSON config file (absent fields use defaults)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dataset CSV path
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Directory for the artifact bundle and plots
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Random seed for balancing, splitting and fitting
        #[arg(long)]
        seed: Option<u64>,

        /// Number of trees in the forest
        #[arg(long)]
        trees: Option<usize>,

        /// Rows per class after balancing
        #[arg(long)]
        target_per_class: Option<usize>,

        /// Skip rendering the SVG plots
        #[arg(long)]
        no_plots: bool,

        /// Also write the evaluation report as JSON
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// Predict the risk label of one usage record
    Predict {
        /// Artifact bundle directory
        #[arg(short, long, default_value = "artifacts", env = "RISK_BUNDLE_DIR")]
        bundle: PathBuf,

        #[arg(long)]
        age: f64,

        #[arg(long)]
        gender: String,

        #[arg(long)]
        total_app_usage_hours: f64,

        #[arg(long)]
        daily_screen_time_hours: f64,

        #[arg(long)]
        number_of_apps_used: f64,

        #[arg(long)]
        social_media_usage_hours: f64,

        #[arg(long)]
        productivity_app_usage_hours: f64,

        #[arg(long)]
        gaming_app_usage_hours: f64,

        #[arg(long)]
        location: String,

        /// Refuse to predict when category hours exceed total usage
        #[arg(long)]
        strict: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check an artifact bundle
    Doctor {
        /// Artifact bundle directory
        #[arg(short, long, default_value = "artifacts", env = "RISK_BUNDLE_DIR")]
        bundle: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // 2 tells scripts the record itself was rejected
            let code = if e.is_input_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            };
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            code
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    // stdout carries command output; logs go to stderr
    if json {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(io::stderr)).init();
    }
}

fn run(cli: Cli) -> Result<(), RiskCliError> {
    match cli.command {
        Commands::Train {
            config,
            dataset,
            output_dir,
            seed,
            trees,
            target_per_class,
            no_plots,
            report_json,
        } => {
            let mut train_config = match config {
                Some(path) => TrainConfig::from_json_file(&path)?,
                None => TrainConfig::default(),
            };
            if let Some(dataset) = dataset {
                train_config.dataset_path = dataset;
            }
            if let Some(output_dir) = output_dir {
                train_config.output_dir = output_dir;
            }
            if let Some(seed) = seed {
                train_config.seed = seed;
            }
            if let Some(trees) = trees {
                train_config.forest.n_trees = trees;
            }
            if let Some(target) = target_per_class {
                train_config.balance_target_per_class = target;
            }
            if no_plots {
                train_config.render_plots = false;
            }
            cmd_train(&train_config, report_json.as_deref())
        }

        Commands::Predict {
            bundle,
            age,
            gender,
            total_app_usage_hours,
            daily_screen_time_hours,
            number_of_apps_used,
            social_media_usage_hours,
            productivity_app_usage_hours,
            gaming_app_usage_hours,
            location,
            strict,
            json,
        } => {
            let record = UsageRecord {
                age,
                gender,
                total_app_usage_hours,
                daily_screen_time_hours,
                number_of_apps_used,
                social_media_usage_hours,
                productivity_app_usage_hours,
                gaming_app_usage_hours,
                location,
            };
            cmd_predict(&bundle, &record, strict, json)
        }

        Commands::Doctor { bundle, json } => cmd_doctor(&bundle, json),
    }
}

fn cmd_train(config: &TrainConfig, report_json: Option<&Path>) -> Result<(), RiskCliError> {
    let outcome = pipeline::train(config)?;

    if let Some(path) = report_json {
        fs::write(path, outcome.report.to_json()?)?;
    }
    print!("{}", outcome.report);

    Ok(())
}

fn cmd_predict(
    bundle_dir: &Path,
    record: &UsageRecord,
    strict: bool,
    json: bool,
) -> Result<(), RiskCliError> {
    if strict {
        if let Some(advisory) = record
            .advisories()
            .into_iter()
            .find(|a| matches!(a, UsageAdvisory::CategoryHoursExceedTotal { .. }))
        {
            return Err(RiskCliError::StrictRejected(advisory.message()));
        }
    }

    let bundle = ArtifactBundle::load(bundle_dir)?;
    let prediction = usage_risk::predict(&bundle, record)?;

    if json {
        let output = serde_json::json!({
            "label": prediction.label,
            "confidence": prediction.confidence(),
            "probabilities": prediction.probability_map(),
            "transformed": prediction
                .transformed
                .iter()
                .map(|(column, value)| serde_json::json!({ "column": column, "value": value }))
                .collect::<Vec<_>>(),
            "advisories": prediction
                .advisories
                .iter()
                .map(|a| serde_json::json!({ "advisory": a, "message": a.message() }))
                .collect::<Vec<_>>(),
            "usage_breakdown": record.usage_breakdown(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "Predicted risk: {} (confidence {:.1}%)",
        prediction.label,
        prediction.confidence() * 100.0
    );
    println!();
    println!("Probabilities:");
    for (label, p) in prediction.probabilities.iter() {
        println!("  {:<9} {:.4}", label.as_str(), p);
    }

    let breakdown = record.usage_breakdown();
    println!();
    println!("Usage breakdown (hours/day):");
    println!("  Social media  {:.2}", breakdown.social_media);
    println!("  Productivity  {:.2}", breakdown.productivity);
    println!("  Gaming        {:.2}", breakdown.gaming);
    println!("  Other         {:.2}", breakdown.other);

    if !prediction.advisories.is_empty() {
        println!();
        for advisory in &prediction.advisories {
            println!("Note: {}", advisory.message());
        }
    }

    Ok(())
}

fn cmd_doctor(bundle_dir: &Path, json: bool) -> Result<(), RiskCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} {}", PRODUCER_NAME, VERSION),
    });

    if !bundle_dir.is_dir() {
        checks.push(DoctorCheck {
            name: "bundle_dir".to_string(),
            status: CheckStatus::Error,
            message: format!("{} is not a directory", bundle_dir.display()),
        });
    } else {
        for file in bundle::inspect(bundle_dir) {
            let (status, message) = match (file.present, file.error) {
                (false, _) => (CheckStatus::Error, "missing".to_string()),
                (true, Some(e)) => (CheckStatus::Error, e),
                (true, None) => (CheckStatus::Ok, "valid".to_string()),
            };
            checks.push(DoctorCheck {
                name: file.file.to_string(),
                status,
                message,
            });
        }

        // files can be individually valid yet disagree with each other
        match ArtifactBundle::load(bundle_dir) {
            Ok(bundle) => {
                let order: Vec<&str> = bundle.class_order().iter().map(|l| l.as_str()).collect();
                checks.push(DoctorCheck {
                    name: "bundle".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "{} trees; class order: {}",
                        bundle.model().n_trees(),
                        order.join(", ")
                    ),
                });
                if order.len() < RiskLabel::ALL.len() {
                    checks.push(DoctorCheck {
                        name: "classes".to_string(),
                        status: CheckStatus::Warning,
                        message: "model was trained without every risk label".to_string(),
                    });
                }
                checks.push(DoctorCheck {
                    name: "vocabulary".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "genders: {}; locations: {}",
                        bundle.gender_encoder().classes().join(", "),
                        bundle.location_encoder().classes().join(", ")
                    ),
                });
            }
            Err(e) => checks.push(DoctorCheck {
                name: "bundle".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }),
        }
    }

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        bundle: bundle_dir.display().to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("riskctl doctor");
        println!("==============");
        println!("Bundle: {}", report.bundle);
        println!("\nChecks:");
        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(RiskCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum RiskCliError {
    Io(io::Error),
    Json(serde_json::Error),
    Train(TrainError),
    Inference(InferenceError),
    StrictRejected(String),
    DoctorFailed,
}

impl RiskCliError {
    fn is_input_error(&self) -> bool {
        match self {
            RiskCliError::Inference(e) => e.is_input_error(),
            RiskCliError::StrictRejected(_) => true,
            _ => false,
        }
    }
}

impl From<io::Error> for RiskCliError {
    fn from(e: io::Error) -> Self {
        RiskCliError::Io(e)
    }
}

impl From<serde_json::Error> for RiskCliError {
    fn from(e: serde_json::Error) -> Self {
        RiskCliError::Json(e)
    }
}

impl From<TrainError> for RiskCliError {
    fn from(e: TrainError) -> Self {
        RiskCliError::Train(e)
    }
}

impl From<InferenceError> for RiskCliError {
    fn from(e: InferenceError) -> Self {
        RiskCliError::Inference(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(code: &str, message: String, hint: &str) -> Self {
        CliError {
            code: code.to_string(),
            message,
            hint: Some(hint.to_string()),
        }
    }
}

impl From<RiskCliError> for CliError {
    fn from(e: RiskCliError) -> Self {
        let message = match &e {
            RiskCliError::Io(e) => e.to_string(),
            RiskCliError::Json(e) => e.to_string(),
            RiskCliError::Train(e) => e.to_string(),
            RiskCliError::Inference(e) => e.to_string(),
            RiskCliError::StrictRejected(msg) => msg.clone(),
            RiskCliError::DoctorFailed => "One or more bundle checks failed".to_string(),
        };
        match e {
            RiskCliError::Io(_) => CliError::new("IO_ERROR", message, "Check file paths and permissions"),
            RiskCliError::Json(_) => CliError::new("JSON_ERROR", message, "Check JSON syntax"),
            RiskCliError::Train(TrainError::Config(_)) => {
                CliError::new("CONFIG_ERROR", message, "Fix the training config and retry")
            }
            RiskCliError::Train(TrainError::Dataset(_)) => CliError::new(
                "DATASET_ERROR",
                message,
                "Check the dataset path and its required columns",
            ),
            RiskCliError::Train(TrainError::Labeling(_)) => CliError::new(
                "LABELING_ERROR",
                message,
                "Total_App_Usage_Hours needs enough spread for three risk bins",
            ),
            RiskCliError::Train(TrainError::Fit(_)) => {
                CliError::new("FIT_ERROR", message, "Check the dataset for invalid values")
            }
            RiskCliError::Train(TrainError::Serialization(_)) => CliError::new(
                "SERIALIZATION_ERROR",
                message,
                "Check that the output directory is writable",
            ),
            RiskCliError::Train(TrainError::Report(_)) => CliError::new(
                "REPORT_ERROR",
                message,
                "Retry with --no-plots to skip plot rendering",
            ),
            RiskCliError::Inference(InferenceError::UnknownCategory { .. }) => CliError::new(
                "UNKNOWN_CATEGORY",
                message,
                "Use a gender and location seen during training (see 'riskctl doctor')",
            ),
            RiskCliError::Inference(InferenceError::Transform(_)) => {
                CliError::new("TRANSFORM_ERROR", message, "Retrain the bundle with this version")
            }
            RiskCliError::Inference(InferenceError::BundleIncomplete { .. }) => {
                CliError::new("BUNDLE_INCOMPLETE", message, "Run 'riskctl train' first")
            }
            RiskCliError::Inference(InferenceError::BundleCorrupt(_)) => {
                CliError::new("BUNDLE_CORRUPT", message, "Run 'riskctl doctor' and retrain")
            }
            RiskCliError::StrictRejected(_) => CliError::new(
                "INCONSISTENT_USAGE",
                message,
                "Total app usage must be at least the sum of the app categories",
            ),
            RiskCliError::DoctorFailed => {
                CliError::new("DOCTOR_FAILED", message, "Review the doctor report for details")
            }
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    bundle: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
