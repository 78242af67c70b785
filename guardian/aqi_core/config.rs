use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{AqiError, Result};

/// Top-level configuration document for training and inference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardianConfig {
    /// Artifact and dataset locations.
    #[serde(default)]
    pub paths: PathSettings,
    /// Split, seed, and label settings.
    #[serde(default)]
    pub training: TrainingSettings,
    /// Ensemble hyperparameters.
    #[serde(default)]
    pub forest: ForestConfig,
    /// Structured logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl GuardianConfig {
    /// Loads configuration from a TOML file, resolving relative paths against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let mut config = Self::from_toml(&raw)?;
        let source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.paths.resolve_against(&source_dir);
        if let Some(log_path) = config.logging.log_path.as_mut() {
            if log_path.is_relative() {
                *log_path = source_dir.join(&*log_path);
            }
        }
        Ok(config)
    }

    /// Parses and validates a TOML document without touching the filesystem.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|err| AqiError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        let training = &self.training;
        if !(training.test_size > 0.0 && training.test_size < 1.0) {
            return Err(AqiError::Config(format!(
                "test_size must be in (0, 1), got {}",
                training.test_size
            )));
        }
        if training.cv_folds < 2 {
            return Err(AqiError::Config("cv_folds must be at least 2".into()));
        }
        if training.target_column.trim().is_empty() {
            return Err(AqiError::Config("target_column must not be empty".into()));
        }
        self.forest.validate()
    }

    /// Path of the persisted model file.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.paths.model_dir.join(&self.paths.model_file)
    }

    /// Path of the persisted scaler file.
    #[must_use]
    pub fn scaler_path(&self) -> PathBuf {
        self.paths.model_dir.join(&self.paths.scaler_file)
    }
}

/// File locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Directory holding the artifact pair.
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    /// Model file name inside `model_dir`.
    #[serde(default = "default_model_file")]
    pub model_file: String,
    /// Scaler file name inside `model_dir`.
    #[serde(default = "default_scaler_file")]
    pub scaler_file: String,
    /// Default training CSV.
    #[serde(default = "default_training_data")]
    pub training_data: PathBuf,
}

impl PathSettings {
    fn resolve_against(&mut self, base: &Path) {
        for path in [&mut self.model_dir, &mut self.training_data] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            model_file: default_model_file(),
            scaler_file: default_scaler_file(),
            training_data: default_training_data(),
        }
    }
}

/// Label, split, and cross-validation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Preferred label column.
    #[serde(default = "default_target_column")]
    pub target_column: String,
    /// Label columns tried, in order, when `target_column` is absent.
    #[serde(default = "default_fallback_targets")]
    pub fallback_targets: Vec<String>,
    /// Held-out fraction.
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    /// Seed for splitting, folds, and bootstrap sampling.
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    /// Number of cross-validation folds.
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            target_column: default_target_column(),
            fallback_targets: default_fallback_targets(),
            test_size: default_test_size(),
            random_state: default_random_state(),
            cv_folds: default_cv_folds(),
        }
    }
}

/// Fixed ensemble hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees.
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// Maximum tree depth.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Minimum samples required to split a node.
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    /// Minimum samples in each leaf.
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// Worker threads for tree construction; 0 uses every core.
    #[serde(default)]
    pub n_jobs: usize,
}

impl ForestConfig {
    /// Checks hyperparameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(AqiError::Config("n_estimators must be at least 1".into()));
        }
        if self.max_depth == 0 {
            return Err(AqiError::Config("max_depth must be at least 1".into()));
        }
        if self.min_samples_split < 2 {
            return Err(AqiError::Config(
                "min_samples_split must be at least 2".into(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(AqiError::Config("min_samples_leaf must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            n_jobs: 0,
        }
    }
}

/// Structured logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// JSON-lines log file; logging is disabled when absent.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// Minimum level written (`DEBUG`, `INFO`, `WARN`, `ERROR`).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_path: None,
            level: default_log_level(),
        }
    }
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("model")
}

fn default_model_file() -> String {
    "aqi_model.json".into()
}

fn default_scaler_file() -> String {
    "scaler.json".into()
}

fn default_training_data() -> PathBuf {
    PathBuf::from("data/processed/aqi_data.csv")
}

fn default_target_column() -> String {
    "aqi".into()
}

fn default_fallback_targets() -> Vec<String> {
    vec!["future_aqi".into()]
}

const fn default_test_size() -> f64 {
    0.2
}

const fn default_random_state() -> u64 {
    42
}

const fn default_cv_folds() -> usize {
    5
}

const fn default_n_estimators() -> usize {
    150
}

const fn default_max_depth() -> usize {
    15
}

const fn default_min_samples_split() -> usize {
    4
}

const fn default_min_samples_leaf() -> usize {
    2
}

fn default_log_level() -> String {
    "INFO".into()
}
