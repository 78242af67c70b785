//! Offline training: split, fit, evaluate, cross-validate, persist.

/// CSV loading and label resolution.
pub mod dataset;
/// Regression trees and the bagged forest.
pub mod forest;
/// Regression metrics.
pub mod metrics;
/// Training summary.
pub mod report;
/// Train/test and k-fold index splitting.
pub mod split;

use std::path::Path;

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Axis};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    artifact::{ArtifactPaths, ModelArtifact},
    config::GuardianConfig,
    error::Result,
    preprocess::Preprocessor,
    schema::FeatureSchema,
    telemetry::{emit, ModelTelemetry},
};
use dataset::TrainingData;
use forest::RandomForestRegressor;
use metrics::{mae, mean_std, r2, rmse};
use report::TrainingReport;
use split::{train_test_split, KFold};

/// Artifact plus its evaluation, before or after persistence.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// Fitted artifact.
    pub artifact: ModelArtifact,
    /// Held-out and cross-validated metrics.
    pub report: TrainingReport,
}

/// Fits the forest from labeled history and persists the artifact pair.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: GuardianConfig,
    schema: FeatureSchema,
    reference_time: Option<DateTime<Utc>>,
    telemetry: Option<ModelTelemetry>,
}

impl Trainer {
    /// Creates a trainer for `schema` using the `[training]` and `[forest]` settings.
    #[must_use]
    pub fn new(config: GuardianConfig, schema: FeatureSchema) -> Self {
        Self {
            config,
            schema,
            reference_time: None,
            telemetry: None,
        }
    }

    /// Fixes the time used for rows without timestamps; defaults to the start of each run.
    #[must_use]
    pub fn with_reference_time(mut self, at: DateTime<Utc>) -> Self {
        self.reference_time = Some(at);
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: ModelTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &GuardianConfig {
        &self.config
    }

    /// Artifact locations derived from `[paths]`.
    #[must_use]
    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(self.config.model_path(), self.config.scaler_path())
    }

    /// Loads the CSV at `path`, trains, and saves to the configured model directory.
    pub fn train_csv(&self, path: impl AsRef<Path>) -> Result<TrainingOutcome> {
        let data = TrainingData::from_csv_path(path.as_ref())?;
        emit(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "training.dataset_loaded",
            json!({ "path": path.as_ref(), "rows": data.len(), "columns": data.columns }),
        );
        self.train_and_save(&data)
    }

    /// Trains and persists; a save failure fails the whole run.
    pub fn train_and_save(&self, data: &TrainingData) -> Result<TrainingOutcome> {
        let outcome = self.train(data)?;
        outcome
            .artifact
            .save(&self.artifact_paths(), self.telemetry.as_ref())?;
        Ok(outcome)
    }

    /// Fits and evaluates without touching the filesystem.
    ///
    /// Every data problem (missing label, non-numeric feature, too few rows)
    /// surfaces here, before any tree is grown.
    pub fn train(&self, data: &TrainingData) -> Result<TrainingOutcome> {
        let telemetry = self.telemetry.as_ref();
        let settings = &self.config.training;
        let target = data.resolve_target(&settings.target_column, &settings.fallback_targets)?;
        let (records, labels) = data.split_label(target)?;

        let split = train_test_split(records.len(), settings.test_size, settings.random_state)?;
        let folds = KFold::new(settings.cv_folds, settings.random_state).split(records.len())?;

        emit(
            telemetry,
            LogLevel::Info,
            "training.start",
            json!({
                "target": target,
                "rows": records.len(),
                "features": self.schema.len(),
                "schema_version": self.schema.version(),
                "forest": self.config.forest,
            }),
        );

        let mut preprocessor = Preprocessor::new(self.schema.clone())
            .with_reference_time(self.reference_time.unwrap_or_else(Utc::now));
        if let Some(tel) = telemetry {
            preprocessor = preprocessor.with_telemetry(tel.scoped("preprocess"));
        }
        let batch = preprocessor.fit_transform(&records)?;

        let (x_train, y_train) = select_rows(&batch.features, &labels, &split.train);
        let (x_test, y_test) = select_rows(&batch.features, &labels, &split.test);
        let forest = RandomForestRegressor::fit(
            x_train.view(),
            y_train.view(),
            self.config.forest,
            settings.random_state,
        )?;
        let predicted = forest.predict(x_test.view())?;
        let (test_rmse, test_mae, test_r2) = (
            rmse(y_test.view(), predicted.view()),
            mae(y_test.view(), predicted.view()),
            r2(y_test.view(), predicted.view()),
        );

        let mut fold_scores = Vec::with_capacity(folds.len());
        for fold in &folds {
            let (x_fit, y_fit) = select_rows(&batch.features, &labels, &fold.train);
            let (x_val, y_val) = select_rows(&batch.features, &labels, &fold.test);
            let fold_forest = RandomForestRegressor::fit(
                x_fit.view(),
                y_fit.view(),
                self.config.forest,
                settings.random_state,
            )?;
            let fold_predicted = fold_forest.predict(x_val.view())?;
            fold_scores.push(rmse(y_val.view(), fold_predicted.view()));
        }
        let (cv_rmse, cv_std) = mean_std(&fold_scores);

        emit(
            telemetry,
            LogLevel::Info,
            "training.metrics",
            json!({
                "rmse": test_rmse,
                "mae": test_mae,
                "r2": test_r2,
                "cv_rmse": cv_rmse,
                "cv_std": cv_std,
                "fold_rmse": fold_scores,
            }),
        );

        let artifact = ModelArtifact::new(self.schema.clone(), forest, batch.scaler)?;
        let report = TrainingReport {
            artifact_id: artifact.artifact_id(),
            target_column: target.to_string(),
            train_rows: split.train.len(),
            test_rows: split.test.len(),
            rmse: test_rmse,
            mae: test_mae,
            r2: test_r2,
            cv_rmse,
            cv_std,
            importance: artifact.importances(),
        };
        emit(
            telemetry,
            LogLevel::Info,
            "training.feature_importances",
            json!({ "artifact_id": report.artifact_id, "top": report.top_features(10) }),
        );
        Ok(TrainingOutcome { artifact, report })
    }
}

fn select_rows(x: &Array2<f64>, y: &Array1<f64>, rows: &[usize]) -> (Array2<f64>, Array1<f64>) {
    (x.select(Axis(0), rows), y.select(Axis(0), rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ForestConfig, error::AqiError, record::FeatureRecord};
    use tempfile::tempdir;

    fn quick_config(model_dir: &Path) -> GuardianConfig {
        let mut config = GuardianConfig::default();
        config.paths.model_dir = model_dir.to_path_buf();
        config.forest = ForestConfig {
            n_estimators: 8,
            max_depth: 6,
            min_samples_split: 2,
            min_samples_leaf: 1,
            n_jobs: 0,
        };
        config
    }

    fn history(rows: usize) -> TrainingData {
        TrainingData::from_records(
            (0..rows)
                .map(|i| {
                    let pm25 = 10.0 + (i * 13 % 170) as f64;
                    FeatureRecord::new()
                        .with("pm25", pm25)
                        .with("pm10", pm25 * 1.6)
                        .with("co", 1.0 + (i % 7) as f64)
                        .with("no2", 20.0 + (i % 11) as f64)
                        .with("aqi", pm25 * 1.8 + 5.0)
                })
                .collect(),
        )
    }

    #[test]
    fn trains_and_persists_artifact_pair() {
        let tmp = tempdir().unwrap();
        let trainer = Trainer::new(quick_config(tmp.path()), FeatureSchema::standard());
        let outcome = trainer.train_and_save(&history(40)).unwrap();
        assert_eq!(outcome.report.test_rows, 8);
        assert_eq!(outcome.report.train_rows, 32);
        assert!(outcome.report.r2 > 0.5);
        let total: f64 = outcome.report.importance.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(trainer.artifact_paths().model.exists());
        assert!(trainer.artifact_paths().scaler.exists());
    }

    #[test]
    fn fixed_seed_reproduces_metrics() {
        let tmp = tempdir().unwrap();
        let trainer = Trainer::new(quick_config(tmp.path()), FeatureSchema::standard());
        let first = trainer.train(&history(30)).unwrap().report;
        let second = trainer.train(&history(30)).unwrap().report;
        assert_eq!(first.rmse, second.rmse);
        assert_eq!(first.cv_rmse, second.cv_rmse);
        assert_eq!(first.importance, second.importance);
    }

    #[test]
    fn missing_target_aborts_before_fitting() {
        let tmp = tempdir().unwrap();
        let trainer = Trainer::new(quick_config(tmp.path()), FeatureSchema::standard());
        let data = TrainingData::from_records(
            (0..10)
                .map(|i| FeatureRecord::new().with("pm25", i as f64))
                .collect(),
        );
        assert!(matches!(trainer.train_and_save(&data), Err(AqiError::DatasetShape(_))));
        assert!(!trainer.artifact_paths().model.exists());
    }

    #[test]
    fn too_few_rows_for_folds() {
        let tmp = tempdir().unwrap();
        let trainer = Trainer::new(quick_config(tmp.path()), FeatureSchema::standard());
        assert!(matches!(trainer.train(&history(4)), Err(AqiError::DatasetShape(_))));
    }
}
