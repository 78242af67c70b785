use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use aqi_guardian::{
    predict::factor_breakdown, FeatureRecord, FeatureSchema, GuardianConfig, GuardianPipeline,
    InsightsEngine, InsightsInput, ModelTelemetry, Predictor, Trainer,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;
use shared_logging::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "aqi", version, about = "Smart AQI Guardian model operations")]
struct Cli {
    /// TOML configuration; built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trains a forest and writes the artifact pair.
    Train {
        /// Training CSV; defaults to `paths.training_data`.
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Predicts AQI for a JSON record (or array of records).
    Predict {
        /// JSON input file, `-` for stdin.
        #[arg(long, default_value = "-")]
        input: PathBuf,
        /// Forecast horizon label in hours.
        #[arg(long, default_value_t = 1)]
        horizon: u32,
        /// Attach recommendations to each prediction.
        #[arg(long)]
        recommend: bool,
        /// Location label used with `--recommend`.
        #[arg(long)]
        location: Option<String>,
    },
    /// Generates recommendations from an insights input JSON document.
    Recommend {
        /// JSON input file, `-` for stdin.
        #[arg(long, default_value = "-")]
        input: PathBuf,
    },
    /// Describes the persisted artifact pair.
    Inspect {
        /// Number of features listed.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordInput {
    One(FeatureRecord),
    Many(Vec<FeatureRecord>),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Train { data } => handle_train(&config, data),
        Commands::Predict {
            input,
            horizon,
            recommend,
            location,
        } => handle_predict(&config, &input, horizon, recommend, location.as_deref()),
        Commands::Recommend { input } => {
            let raw = read_input(&input)?;
            let insights: InsightsInput =
                serde_json::from_str(&raw).context("parsing insights input")?;
            let telemetry = ModelTelemetry::from_settings("insights", &config.logging)?;
            let bundle = InsightsEngine::new()
                .with_telemetry(telemetry)
                .generate(&insights);
            println!("{}", serde_json::to_string_pretty(&bundle)?);
            Ok(())
        }
        Commands::Inspect { top } => handle_inspect(&config, top),
    }
}

fn load_config(path: Option<&Path>) -> Result<GuardianConfig> {
    match path {
        Some(path) => GuardianConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(GuardianConfig::default()),
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .context("reading stdin")?;
        Ok(raw)
    } else {
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }
}

fn handle_train(config: &GuardianConfig, data: Option<PathBuf>) -> Result<()> {
    let data = data.unwrap_or_else(|| config.paths.training_data.clone());
    anyhow::ensure!(data.exists(), "training data {} not found", data.display());
    let telemetry = ModelTelemetry::from_settings("trainer", &config.logging)?;
    let trainer =
        Trainer::new(config.clone(), FeatureSchema::standard()).with_telemetry(telemetry.clone());
    match trainer.train_csv(&data) {
        Ok(outcome) => {
            eprintln!("{}", outcome.report.summary());
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "report": outcome.report,
                    "model": config.model_path(),
                    "scaler": config.scaler_path(),
                }))?
            );
            Ok(())
        }
        Err(err) => {
            let _ = telemetry.log(
                LogLevel::Error,
                "cli.train_failed",
                json!({
                    "data": data,
                    "error": err.to_string(),
                    "data_error": err.is_data_error(),
                }),
            );
            Err(err).with_context(|| format!("training on {}", data.display()))
        }
    }
}

fn handle_predict(
    config: &GuardianConfig,
    input: &Path,
    horizon: u32,
    recommend: bool,
    location: Option<&str>,
) -> Result<()> {
    let raw = read_input(input)?;
    let parsed: RecordInput = serde_json::from_str(&raw).context("parsing feature record")?;
    let records = match parsed {
        RecordInput::One(record) => vec![record],
        RecordInput::Many(records) => records,
    };
    let schema = FeatureSchema::standard();
    let output = if recommend {
        let pipeline = GuardianPipeline::load(config, &schema)?;
        let at = Utc::now();
        let assessments = records
            .iter()
            .map(|record| pipeline.assess_at(record, horizon, location, at))
            .collect::<Result<Vec<_>, _>>()?;
        serde_json::to_value(assessments)?
    } else {
        let telemetry = ModelTelemetry::from_settings("predictor", &config.logging)?;
        let predictor = Predictor::load_with(config, &schema, Some(telemetry))?;
        serde_json::to_value(predictor.batch_predict(&records, horizon)?)?
    };
    let output = match output {
        serde_json::Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn handle_inspect(config: &GuardianConfig, top: usize) -> Result<()> {
    let predictor = Predictor::load(config, &FeatureSchema::standard())?;
    let artifact = predictor.artifact();
    let importances = artifact.importances();
    let factors = factor_breakdown(&importances);
    let mut ranked: Vec<(String, f64)> = importances.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(top);
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "artifact_id": artifact.artifact_id(),
            "created_at": artifact.created_at(),
            "schema_version": artifact.schema().version(),
            "features": artifact.schema().len(),
            "trees": artifact.forest().trees().len(),
            "forest": artifact.forest().config(),
            "top_features": ranked,
            "factors": factors,
        }))?
    );
    Ok(())
}
