#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Smart AQI Guardian core: feature schema, preprocessing, forest training,
//! inference, and audience-specific recommendations.

/// Error taxonomy.
#[path = "../error.rs"]
pub mod error;

/// Loosely typed input records.
#[path = "../record.rs"]
pub mod record;

/// Ordered feature contract.
#[path = "../schema.rs"]
pub mod schema;

/// TOML configuration.
#[path = "../config.rs"]
pub mod config;

/// Telemetry helpers.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Feature derivation, encoding, imputation, and scaling.
#[path = "../preprocess/main.rs"]
pub mod preprocess;

/// Dataset loading, forest fitting, and evaluation.
#[path = "../training/main.rs"]
pub mod training;

/// Artifact pair persistence.
#[path = "../artifact.rs"]
pub mod artifact;

/// Inference, risk bands, confidence, and factor attribution.
#[path = "../predict.rs"]
pub mod predict;

/// Rule-based recommendation engine.
#[path = "../insights.rs"]
pub mod insights;

/// Predictor plus insights in one call.
#[path = "../pipeline.rs"]
pub mod pipeline;

pub use artifact::{ArtifactPaths, ModelArtifact};
pub use config::{ForestConfig, GuardianConfig, LoggingSettings, PathSettings, TrainingSettings};
pub use error::{AqiError, Result};
pub use insights::{
    AudienceDetail, ConfidenceInput, InsightsEngine, InsightsInput, Priority, RecommendationBundle,
    RecommendationItem,
};
pub use pipeline::{Assessment, GuardianPipeline};
pub use predict::{PredictionResult, Predictor, RiskLevel};
pub use preprocess::{
    scaler::StandardScaler, CoercionPolicy, ImputeStrategy, PreprocessSummary, Preprocessor,
};
pub use record::{FeatureRecord, FeatureValue};
pub use schema::{
    FeatureGroup, FeatureKind, FeatureSchema, FeatureSpec, SchemaAlignment, KEY_FEATURES,
};
pub use telemetry::{ModelTelemetry, ModelTelemetryBuilder};
pub use training::{
    dataset::TrainingData, forest::RandomForestRegressor, report::TrainingReport, Trainer,
    TrainingOutcome,
};
