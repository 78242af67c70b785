use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the prediction pipeline.
pub type Result<T, E = AqiError> = std::result::Result<T, E>;

/// Errors raised by preprocessing, training, persistence, and inference.
#[derive(Debug, Error)]
pub enum AqiError {
    /// A feature column is not uniformly numeric after preprocessing.
    #[error("column `{column}` must be numeric; offending values: {values:?}")]
    SchemaViolation {
        /// Offending column.
        column: String,
        /// Distinct non-numeric values found in the column.
        values: Vec<String>,
    },
    /// Model or scaler could not be read, or does not match the requested schema.
    #[error("failed to load artifact {path:?}: {reason}")]
    ArtifactLoad {
        /// File that failed to load.
        path: PathBuf,
        /// Human-readable cause.
        reason: String,
    },
    /// Persisting the trained artifact pair failed.
    #[error("failed to save artifact {path:?}: {source}")]
    ArtifactSave {
        /// File being written.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The dataset cannot be trained on (missing target, too few rows).
    #[error("dataset shape error: {0}")]
    DatasetShape(String),
    /// A matrix does not have the column count the schema requires.
    #[error("matrix has {found} columns but the schema expects {expected}")]
    DimensionMismatch {
        /// Schema length.
        expected: usize,
        /// Columns received.
        found: usize,
    },
    /// Invalid configuration document.
    #[error("config error: {0}")]
    Config(String),
    /// I/O error (filesystem).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// CSV parsing failure.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// JSON parsing failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AqiError {
    pub(crate) fn artifact_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ArtifactLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for the errors that require operator correction of input data.
    #[must_use]
    pub const fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::SchemaViolation { .. } | Self::DatasetShape(_) | Self::Csv(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_violation_names_column_and_values() {
        let err = AqiError::SchemaViolation {
            column: "pm25".into(),
            values: vec!["n/a".into(), "high".into()],
        };
        let message = err.to_string();
        assert!(message.contains("pm25"));
        assert!(message.contains("n/a"));
        assert!(err.is_data_error());
    }

    #[test]
    fn load_failures_are_not_data_errors() {
        let err = AqiError::artifact_load("model/aqi_model.json", "missing");
        assert!(!err.is_data_error());
        assert!(err.to_string().contains("aqi_model.json"));
    }
}
