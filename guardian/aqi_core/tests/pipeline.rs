use std::{fmt::Write as _, fs, path::Path, sync::Arc};

use aqi_guardian::{
    AqiError, FeatureRecord, FeatureSchema, FeatureSpec, ForestConfig, GuardianConfig,
    GuardianPipeline, InsightsEngine, InsightsInput, ModelTelemetry, Predictor, Priority,
    RiskLevel, Trainer, TrainingReport,
};
use chrono::{Duration, TimeZone, Utc};
use shared_logging::{LogLevel, MemoryLogSink};
use tempfile::{tempdir, TempDir};

const ROWS: usize = 80;

fn label(pm25: f64, emission: f64, traffic: f64) -> f64 {
    0.9 * pm25 + 0.4 * emission + traffic / 400.0
}

fn write_history(dir: &Path) -> (std::path::PathBuf, f64, f64) {
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let seasons = ["Winter", "spring", "SUMMER", "Autumn", "Monsoon"];
    let mut csv = String::from(
        "timestamp,pm25,pm10,co,no2,temperature,humidity,wind_speed,daily_vehicle_count,emission_levels,season_type,aqi\n",
    );
    let (mut low, mut high) = (f64::MAX, f64::MIN);
    for i in 0..ROWS {
        let at = start + Duration::hours(i as i64 * 7);
        let pm25 = 8.0 + ((i * 37) % 190) as f64;
        let emission = 20.0 + ((i * 11) % 70) as f64;
        let traffic = 2000.0 + ((i * 613) % 9000) as f64;
        let aqi = label(pm25, emission, traffic);
        low = low.min(aqi);
        high = high.max(aqi);
        writeln!(
            csv,
            "{},{pm25},{},{},{},{},{},{},{traffic},{emission},{},{aqi:.2}",
            at.format("%Y-%m-%d %H:%M:%S"),
            pm25 * 1.5,
            1.0 + (i % 9) as f64,
            15.0 + (i % 23) as f64,
            10.0 + (i % 25) as f64,
            40.0 + (i % 41) as f64,
            2.0 + (i % 13) as f64,
            seasons[i % seasons.len()],
        )
        .unwrap();
    }
    let path = dir.join("aqi_data.csv");
    fs::write(&path, csv).unwrap();
    (path, low, high)
}

fn config(dir: &Path) -> GuardianConfig {
    let mut config = GuardianConfig::default();
    config.paths.model_dir = dir.join("model");
    config.forest = ForestConfig {
        n_estimators: 24,
        max_depth: 10,
        min_samples_split: 4,
        min_samples_leaf: 2,
        n_jobs: 0,
    };
    config
}

struct Trained {
    _tmp: TempDir,
    config: GuardianConfig,
    report: TrainingReport,
    sink: Arc<MemoryLogSink>,
    low: f64,
    high: f64,
}

fn train() -> Trained {
    let tmp = tempdir().unwrap();
    let (csv, low, high) = write_history(tmp.path());
    let config = config(tmp.path());
    let sink = Arc::new(MemoryLogSink::new());
    let telemetry = ModelTelemetry::builder("trainer")
        .sink(sink.clone())
        .build()
        .unwrap();
    let outcome = Trainer::new(config.clone(), FeatureSchema::standard())
        .with_telemetry(telemetry)
        .train_csv(&csv)
        .unwrap();
    Trained {
        _tmp: tmp,
        config,
        report: outcome.report,
        sink,
        low,
        high,
    }
}

fn scenario_record() -> FeatureRecord {
    FeatureRecord::new()
        .with("pm25", 50.0)
        .with("pm10", 75.0)
        .with("co", 5.0)
        .with("no2", 30.0)
        .with("temperature", 25.0)
        .with("humidity", 60.0)
        .with("wind_speed", 10.0)
}

#[test]
fn end_to_end_prediction_matches_trained_range() {
    let trained = train();
    assert_eq!(trained.report.target_column, "aqi");
    assert_eq!(trained.report.test_rows, 16);

    let predictor = Predictor::load(&trained.config, &FeatureSchema::standard()).unwrap();
    let result = predictor.predict(&scenario_record(), 1).unwrap();
    assert!(result.aqi >= trained.low.floor() as i64);
    assert!(result.aqi <= trained.high.ceil() as i64);
    assert_eq!(result.risk_level, RiskLevel::from_aqi(result.aqi));
    assert_eq!(result.prediction_for, "next 1 hour(s)");
    assert!((0.0..=1.0).contains(&result.confidence));

    let groups: Vec<&str> = result.factors.keys().map(String::as_str).collect();
    assert_eq!(
        groups,
        vec!["air_pollutants", "weather_conditions", "industrial_impact", "urban_factors"]
    );
    assert!(result.factors.values().all(|v| (0.0..=1.0).contains(v)));
    let total: f64 = result.factors.values().sum();
    assert!((total - 1.0).abs() <= 0.01);
}

#[test]
fn absent_training_column_is_defaulted_and_logged() {
    let trained = train();
    let warnings: Vec<_> = trained
        .sink
        .with_message("preprocess.default_substituted")
        .into_iter()
        .filter(|record| record.metadata["column"] == "industrial_activity_index")
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].level, LogLevel::Warn);
    assert_eq!(warnings[0].metadata["default"], 45.0);
    assert_eq!(warnings[0].metadata["rows"], ROWS);
    assert_eq!(trained.sink.with_message("training.metrics").len(), 1);
    assert_eq!(trained.sink.with_message("artifact.saved").len(), 1);
    assert!(trained.sink.with_message("preprocess.timestamp_missing").is_empty());
}

#[test]
fn repeated_predictions_are_identical() {
    let trained = train();
    let predictor = Predictor::load(&trained.config, &FeatureSchema::standard()).unwrap();
    let at = Utc.with_ymd_and_hms(2025, 4, 10, 11, 0, 0).unwrap();
    let record = scenario_record().with("emission_levels", 64.0).with("city", "Pune");
    let first = predictor.predict_at(&record, 3, at).unwrap();
    let second = predictor.predict_at(&record, 3, at).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.raw_aqi.to_bits(), second.raw_aqi.to_bits());

    let batch = predictor
        .batch_predict(&[record.clone(), FeatureRecord::new()], 3)
        .unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].aqi, first.aqi);
}

#[test]
fn missing_features_only_lower_confidence() {
    let trained = train();
    let schema = FeatureSchema::standard();
    let predictor = Predictor::load(&trained.config, &schema).unwrap();
    let full: FeatureRecord = schema.names().map(|name| (name, 10.0)).collect();
    let full_confidence = predictor.predict(&full, 1).unwrap().confidence;
    assert_eq!(full_confidence, 1.0);

    let names: Vec<&str> = schema.names().collect();
    for stride in [1, 2, 3, 5, 7, 11] {
        let partial: FeatureRecord = names
            .iter()
            .enumerate()
            .filter(|(index, _)| index % stride != 0)
            .map(|(_, name)| (*name, 10.0))
            .collect();
        let result = predictor.predict(&partial, 1).unwrap();
        assert!(result.confidence <= full_confidence);
    }
    let empty = predictor.predict(&FeatureRecord::new(), 1).unwrap();
    assert_eq!(empty.confidence, 0.0);
    assert_eq!(empty.risk_level, RiskLevel::from_aqi(empty.aqi));
}

#[test]
fn mismatched_schema_refuses_to_load() {
    let trained = train();
    let mut specs = FeatureSchema::standard().features().to_vec();
    specs.pop();
    specs.push(FeatureSpec::new(
        "ozone",
        0.0,
        "µg/m³",
        aqi_guardian::FeatureKind::Numeric,
    ));
    let other = FeatureSchema::new("aqi-features/v2", specs);
    match Predictor::load(&trained.config, &other).unwrap_err() {
        AqiError::ArtifactLoad { reason, .. } => {
            assert!(reason.contains("ozone"));
            assert!(reason.contains("wind_speed_rolling_mean_6h"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn non_numeric_feature_aborts_training() {
    let tmp = tempdir().unwrap();
    let mut csv = String::from("pm25,pm10,aqi\n");
    for i in 0..20 {
        let pm10 = if i == 4 { "heavy".to_string() } else { format!("{}", 40 + i) };
        writeln!(csv, "{},{pm10},{}", 10 + i, 30 + i).unwrap();
    }
    let path = tmp.path().join("bad.csv");
    fs::write(&path, csv).unwrap();
    let config = config(tmp.path());
    let err = Trainer::new(config.clone(), FeatureSchema::standard())
        .train_csv(&path)
        .unwrap_err();
    match err {
        AqiError::SchemaViolation { column, values } => {
            assert_eq!(column, "pm10");
            assert_eq!(values, vec!["heavy".to_string()]);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!config.model_path().exists());
}

#[test]
fn save_failure_fails_the_run() {
    let tmp = tempdir().unwrap();
    let (csv, _, _) = write_history(tmp.path());
    let mut config = config(tmp.path());
    let blocker = tmp.path().join("not_a_dir");
    fs::write(&blocker, b"occupied").unwrap();
    config.paths.model_dir = blocker.join("model");
    let err = Trainer::new(config.clone(), FeatureSchema::standard())
        .train_csv(&csv)
        .unwrap_err();
    assert!(matches!(err, AqiError::ArtifactSave { .. }));
    assert!(matches!(
        Predictor::load(&config, &FeatureSchema::standard()),
        Err(AqiError::ArtifactLoad { .. })
    ));
}

#[test]
fn severe_context_yields_urgent_recommendations() {
    let input = InsightsInput {
        aqi: 160.0,
        daily_vehicle_count: 8000.0,
        industrial_activity_index: 80.0,
        emission_levels: 85.0,
        ..InsightsInput::default()
    };
    let bundle = InsightsEngine::new().generate(&input);
    let recs = &bundle.recommendations;
    assert!(recs.individual.iter().any(|item| item.priority <= Priority::High));
    assert!(recs.government.iter().any(|item| item.priority == Priority::Critical));
    assert!(recs.industrial.iter().any(|item| item.priority == Priority::Critical));
    assert_eq!(bundle.status.category, RiskLevel::Unhealthy);
}

#[test]
fn pipeline_feeds_prediction_into_insights() {
    let trained = train();
    let pipeline = GuardianPipeline::load(&trained.config, &FeatureSchema::standard()).unwrap();
    let record = scenario_record()
        .with("daily_vehicle_count", 9000.0)
        .with("predicted_spike", true);
    let assessment = pipeline.assess(&record, 2, Some("Bengaluru")).unwrap();
    let status = &assessment.recommendations.status;
    assert_eq!(status.aqi, assessment.prediction.aqi as f64);
    assert_eq!(status.category, assessment.prediction.risk_level);
    assert_eq!(assessment.recommendations.metadata.location, "Bengaluru");
    let triggers: Vec<&str> = assessment
        .recommendations
        .recommendations
        .individual
        .iter()
        .map(|item| item.trigger.as_str())
        .collect();
    assert!(triggers.contains(&"Heavy Traffic Conditions"));
    assert!(triggers.contains(&"AQI Spike Expected"));
}
