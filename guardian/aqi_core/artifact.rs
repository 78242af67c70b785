use std::{
    borrow::Cow,
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use uuid::Uuid;

use crate::{
    error::{AqiError, Result},
    preprocess::scaler::StandardScaler,
    schema::FeatureSchema,
    telemetry::{emit, ModelTelemetry},
    training::forest::RandomForestRegressor,
};

/// Trained forest, fitted scaler, and the schema both were fit against.
///
/// Immutable once built; retraining produces a new artifact with a new id.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    artifact_id: Uuid,
    created_at: DateTime<Utc>,
    schema: FeatureSchema,
    forest: RandomForestRegressor,
    scaler: StandardScaler,
}

#[derive(Serialize, Deserialize)]
struct ModelFile<'a> {
    artifact_id: Uuid,
    created_at: DateTime<Utc>,
    schema: Cow<'a, FeatureSchema>,
    forest: Cow<'a, RandomForestRegressor>,
    importances: IndexMap<String, f64>,
}

#[derive(Serialize, Deserialize)]
struct ScalerFile<'a> {
    artifact_id: Uuid,
    schema: Cow<'a, FeatureSchema>,
    scaler: Cow<'a, StandardScaler>,
}

/// Locations of the two files making up one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Model file.
    pub model: PathBuf,
    /// Scaler file.
    pub scaler: PathBuf,
}

impl ArtifactPaths {
    /// Pairs the two paths.
    pub fn new(model: impl Into<PathBuf>, scaler: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            scaler: scaler.into(),
        }
    }

    fn staging(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        path.with_file_name(name)
    }
}

impl ModelArtifact {
    /// Bundles freshly fitted components under a new id.
    pub fn new(
        schema: FeatureSchema,
        forest: RandomForestRegressor,
        scaler: StandardScaler,
    ) -> Result<Self> {
        if scaler.n_features() != schema.len() || forest.n_features() != schema.len() {
            return Err(AqiError::DimensionMismatch {
                expected: schema.len(),
                found: scaler.n_features().max(forest.n_features()),
            });
        }
        Ok(Self {
            artifact_id: Uuid::new_v4(),
            created_at: Utc::now(),
            schema,
            forest,
            scaler,
        })
    }

    /// Identifier shared by both persisted files.
    #[must_use]
    pub const fn artifact_id(&self) -> Uuid {
        self.artifact_id
    }

    /// Training completion time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Schema the artifact was fit against.
    #[must_use]
    pub const fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Fitted ensemble.
    #[must_use]
    pub const fn forest(&self) -> &RandomForestRegressor {
        &self.forest
    }

    /// Fitted normalizer.
    #[must_use]
    pub const fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Feature importances keyed by schema name, in schema order.
    #[must_use]
    pub fn importances(&self) -> IndexMap<String, f64> {
        self.schema
            .names()
            .map(str::to_string)
            .zip(self.forest.feature_importances().iter().copied())
            .collect()
    }

    /// Writes both files to staging siblings, then renames them into place.
    ///
    /// On failure the staging files are removed and nothing new is left loadable.
    pub fn save(&self, paths: &ArtifactPaths, telemetry: Option<&ModelTelemetry>) -> Result<()> {
        let model = ModelFile {
            artifact_id: self.artifact_id,
            created_at: self.created_at,
            schema: Cow::Borrowed(&self.schema),
            forest: Cow::Borrowed(&self.forest),
            importances: self.importances(),
        };
        let scaler = ScalerFile {
            artifact_id: self.artifact_id,
            schema: Cow::Borrowed(&self.schema),
            scaler: Cow::Borrowed(&self.scaler),
        };
        let staged = [
            (ArtifactPaths::staging(&paths.model), &paths.model),
            (ArtifactPaths::staging(&paths.scaler), &paths.scaler),
        ];

        let outcome = write_json(&staged[0].0, &model)
            .and_then(|()| write_json(&staged[1].0, &scaler))
            .and_then(|()| {
                staged.iter().try_for_each(|(tmp, target)| {
                    fs::rename(tmp, target).map_err(|source| AqiError::ArtifactSave {
                        path: (*target).clone(),
                        source,
                    })
                })
            });

        match outcome {
            Ok(()) => {
                emit(
                    telemetry,
                    LogLevel::Info,
                    "artifact.saved",
                    json!({
                        "artifact_id": self.artifact_id,
                        "model": paths.model,
                        "scaler": paths.scaler,
                    }),
                );
                Ok(())
            }
            Err(err) => {
                for (tmp, _) in &staged {
                    let _ = fs::remove_file(tmp);
                }
                emit(
                    telemetry,
                    LogLevel::Error,
                    "artifact.save_failed",
                    json!({ "artifact_id": self.artifact_id, "error": err.to_string() }),
                );
                Err(err)
            }
        }
    }

    /// Loads an artifact pair and checks it against `expected`.
    pub fn load(
        paths: &ArtifactPaths,
        expected: &FeatureSchema,
        telemetry: Option<&ModelTelemetry>,
    ) -> Result<Self> {
        match Self::load_checked(paths, expected) {
            Ok(artifact) => {
                emit(
                    telemetry,
                    LogLevel::Info,
                    "artifact.loaded",
                    json!({
                        "artifact_id": artifact.artifact_id,
                        "schema_version": artifact.schema.version(),
                        "features": artifact.schema.len(),
                        "trees": artifact.forest.trees().len(),
                    }),
                );
                Ok(artifact)
            }
            Err(err) => {
                emit(
                    telemetry,
                    LogLevel::Error,
                    "artifact.load_failed",
                    json!({ "error": err.to_string() }),
                );
                Err(err)
            }
        }
    }

    fn load_checked(paths: &ArtifactPaths, expected: &FeatureSchema) -> Result<Self> {
        let model: ModelFile<'static> = read_json(&paths.model)?;
        let scaler: ScalerFile<'static> = read_json(&paths.scaler)?;

        if model.artifact_id != scaler.artifact_id {
            return Err(AqiError::artifact_load(
                &paths.scaler,
                format!(
                    "scaler belongs to artifact {} but model is {}",
                    scaler.artifact_id, model.artifact_id
                ),
            ));
        }
        check_schema(&paths.model, expected, &model.schema)?;
        check_schema(&paths.scaler, expected, &scaler.schema)?;
        if scaler.scaler.n_features() != expected.len() {
            return Err(AqiError::artifact_load(
                &paths.scaler,
                format!(
                    "scaler has {} parameters but the schema has {} features",
                    scaler.scaler.n_features(),
                    expected.len()
                ),
            ));
        }
        if model.forest.n_features() != expected.len() {
            return Err(AqiError::artifact_load(
                &paths.model,
                format!(
                    "forest expects {} features but the schema has {}",
                    model.forest.n_features(),
                    expected.len()
                ),
            ));
        }

        Ok(Self {
            artifact_id: model.artifact_id,
            created_at: model.created_at,
            schema: model.schema.into_owned(),
            forest: model.forest.into_owned(),
            scaler: scaler.scaler.into_owned(),
        })
    }
}

fn check_schema(path: &Path, expected: &FeatureSchema, stored: &FeatureSchema) -> Result<()> {
    if expected.is_compatible(stored) {
        return Ok(());
    }
    let diff = expected.diff(stored);
    let reason = if diff.missing.is_empty() && diff.extra.is_empty() {
        if expected.version() == stored.version() {
            "stored feature order differs from the requested schema".to_string()
        } else {
            format!(
                "schema version {} does not match requested {}",
                stored.version(),
                expected.version()
            )
        }
    } else {
        format!(
            "stored schema {} differs from requested {}: missing {:?}, extra {:?}",
            stored.version(),
            expected.version(),
            diff.missing,
            diff.extra
        )
    };
    Err(AqiError::artifact_load(path, reason))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let save_err = |source| AqiError::ArtifactSave {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(save_err)?;
    }
    let bytes = serde_json::to_vec(value)
        .map_err(|err| save_err(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))?;
    fs::write(path, bytes).map_err(save_err)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path).map_err(|err| AqiError::artifact_load(path, err))?;
    serde_json::from_slice(&raw).map_err(|err| AqiError::artifact_load(path, err))
}
