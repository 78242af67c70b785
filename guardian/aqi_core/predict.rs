use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    artifact::{ArtifactPaths, ModelArtifact},
    config::GuardianConfig,
    error::Result,
    preprocess::Preprocessor,
    record::FeatureRecord,
    schema::{FeatureGroup, FeatureSchema, KEY_FEATURES},
    telemetry::{emit, ModelTelemetry},
};

/// AQI severity band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    /// 0-50.
    #[serde(rename = "Good")]
    Good,
    /// 51-100.
    #[serde(rename = "Moderate")]
    Moderate,
    /// 101-150.
    #[serde(rename = "Unhealthy for Sensitive Groups")]
    UnhealthyForSensitiveGroups,
    /// 151-200.
    #[serde(rename = "Unhealthy")]
    Unhealthy,
    /// 201-300.
    #[serde(rename = "Very Unhealthy")]
    VeryUnhealthy,
    /// Above 300.
    #[serde(rename = "Hazardous")]
    Hazardous,
}

impl RiskLevel {
    /// Band for an AQI value; upper bounds are inclusive.
    #[must_use]
    pub const fn from_aqi(aqi: i64) -> Self {
        match aqi {
            i64::MIN..=50 => Self::Good,
            51..=100 => Self::Moderate,
            101..=150 => Self::UnhealthyForSensitiveGroups,
            151..=200 => Self::Unhealthy,
            201..=300 => Self::VeryUnhealthy,
            _ => Self::Hazardous,
        }
    }

    /// Band for an unrounded value, using the same inclusive upper bounds.
    #[must_use]
    pub fn from_value(aqi: f64) -> Self {
        match aqi {
            v if v <= 50.0 => Self::Good,
            v if v <= 100.0 => Self::Moderate,
            v if v <= 150.0 => Self::UnhealthyForSensitiveGroups,
            v if v <= 200.0 => Self::Unhealthy,
            v if v <= 300.0 => Self::VeryUnhealthy,
            _ => Self::Hazardous,
        }
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            Self::Unhealthy => "Unhealthy",
            Self::VeryUnhealthy => "Very Unhealthy",
            Self::Hazardous => "Hazardous",
        }
    }

    /// Display color.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Good => "green",
            Self::Moderate => "yellow",
            Self::UnhealthyForSensitiveGroups => "orange",
            Self::Unhealthy => "red",
            Self::VeryUnhealthy => "purple",
            Self::Hazardous => "maroon",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Output of one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Estimate rounded half away from zero.
    pub aqi: i64,
    /// Band of the rounded estimate.
    pub risk_level: RiskLevel,
    /// Descriptive horizon label, e.g. `next 1 hour(s)`.
    pub prediction_for: String,
    /// Data-completeness score in `[0, 1]`, two decimals.
    pub confidence: f64,
    /// Importance share per factor group; empty when the model has no importance.
    pub factors: IndexMap<String, f64>,
    /// When the prediction was made.
    pub timestamp: DateTime<Utc>,
    /// Unrounded ensemble output.
    #[serde(skip)]
    pub raw_aqi: f64,
}

/// Rounds to two decimals.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `0.7 * key features present + 0.3 * schema features present`, two decimals.
///
/// Presence is judged on the caller's record before any derivation or filling.
#[must_use]
pub fn confidence_score(record: &FeatureRecord, schema: &FeatureSchema) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let fraction = |present: usize, total: usize| {
        if total == 0 {
            0.0
        } else {
            present as f64 / total as f64
        }
    };
    let key_present = KEY_FEATURES
        .iter()
        .filter(|name| record.is_present(name))
        .count();
    let schema_present = schema.names().filter(|name| record.is_present(name)).count();
    round2(
        0.7 * fraction(key_present, KEY_FEATURES.len())
            + 0.3 * fraction(schema_present, schema.len()),
    )
}

/// Sums importances per [`FeatureGroup`] and normalizes the sums.
///
/// Shares are reported in hundredths using largest-remainder rounding, so
/// the reported values always add up to exactly one hundred hundredths.
/// Returns an empty map when the grouped importance is zero.
#[must_use]
pub fn factor_breakdown(importances: &IndexMap<String, f64>) -> IndexMap<String, f64> {
    let sums: Vec<(FeatureGroup, f64)> = FeatureGroup::ALL
        .iter()
        .map(|group| {
            let sum = group
                .members()
                .iter()
                .filter_map(|name| importances.get(*name))
                .sum::<f64>();
            (*group, sum)
        })
        .collect();
    let total: f64 = sums.iter().map(|(_, sum)| sum).sum();
    if total <= 0.0 || !total.is_finite() {
        return IndexMap::new();
    }
    let shares: Vec<f64> = sums.iter().map(|(_, sum)| sum / total * 100.0).collect();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut hundredths: Vec<u32> = shares.iter().map(|share| share.floor() as u32).collect();
    let leftover = 100_u32.saturating_sub(hundredths.iter().sum());
    let mut by_remainder: Vec<usize> = (0..shares.len()).collect();
    // stable: ties go to the earlier group
    by_remainder.sort_by(|&a, &b| {
        (shares[b] - shares[b].floor()).total_cmp(&(shares[a] - shares[a].floor()))
    });
    for &index in by_remainder.iter().take(leftover as usize) {
        hundredths[index] += 1;
    }
    sums.iter()
        .zip(hundredths)
        .map(|((group, _), share)| (group.key().to_string(), f64::from(share) / 100.0))
        .collect()
}

/// Rounds a raw estimate to the reported integer AQI, halves to even.
#[allow(clippy::cast_possible_truncation)]
fn round_aqi(raw: f64) -> i64 {
    raw.round_ties_even() as i64
}

/// Serves predictions from one loaded artifact.
///
/// The artifact is never mutated after load, so a predictor can be shared across threads.
#[derive(Debug, Clone)]
pub struct Predictor {
    artifact: ModelArtifact,
    preprocessor: Preprocessor,
    factors: IndexMap<String, f64>,
    telemetry: Option<ModelTelemetry>,
}

impl Predictor {
    /// Loads the artifact pair named by `[paths]`, checked against `schema`.
    pub fn load(config: &GuardianConfig, schema: &FeatureSchema) -> Result<Self> {
        Self::load_with(config, schema, None)
    }

    /// Like [`Predictor::load`], reporting through `telemetry`.
    pub fn load_with(
        config: &GuardianConfig,
        schema: &FeatureSchema,
        telemetry: Option<ModelTelemetry>,
    ) -> Result<Self> {
        let paths = ArtifactPaths::new(config.model_path(), config.scaler_path());
        let artifact = ModelArtifact::load(&paths, schema, telemetry.as_ref())?;
        let mut predictor = Self::from_artifact(artifact);
        predictor.telemetry = telemetry;
        Ok(predictor)
    }

    /// Wraps an in-memory artifact.
    #[must_use]
    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        let preprocessor = Preprocessor::new(artifact.schema().clone());
        let factors = factor_breakdown(&artifact.importances());
        Self {
            artifact,
            preprocessor,
            factors,
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: ModelTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Loaded artifact.
    #[must_use]
    pub const fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Predicts with the current time as timestamp.
    pub fn predict(&self, record: &FeatureRecord, horizon: u32) -> Result<PredictionResult> {
        self.predict_at(record, horizon, Utc::now())
    }

    /// Predicts with an explicit timestamp; identical inputs give identical results.
    ///
    /// Missing or non-numeric features are zero-filled and only lower the confidence.
    pub fn predict_at(
        &self,
        record: &FeatureRecord,
        horizon: u32,
        at: DateTime<Utc>,
    ) -> Result<PredictionResult> {
        let schema = self.artifact.schema();
        let scaled = self
            .preprocessor
            .transform_record(record, self.artifact.scaler())?;
        let raw_aqi = self.artifact.forest().predict_row(scaled.row(0));
        let aqi = round_aqi(raw_aqi);
        let confidence = confidence_score(record, schema);

        let alignment = schema.align(record);
        emit(
            self.telemetry.as_ref(),
            LogLevel::Debug,
            "predictor.predicted",
            json!({
                "aqi": aqi,
                "raw_aqi": raw_aqi,
                "confidence": confidence,
                "present": alignment.present.len(),
                "missing": alignment.missing,
                "extra": alignment.extra,
            }),
        );

        Ok(PredictionResult {
            aqi,
            risk_level: RiskLevel::from_aqi(aqi),
            prediction_for: format!("next {horizon} hour(s)"),
            confidence,
            factors: self.factors.clone(),
            timestamp: at,
            raw_aqi,
        })
    }

    /// Predicts each record independently, preserving order.
    pub fn batch_predict(
        &self,
        records: &[FeatureRecord],
        horizon: u32,
    ) -> Result<Vec<PredictionResult>> {
        let at = Utc::now();
        records
            .iter()
            .map(|record| self.predict_at(record, horizon, at))
            .collect()
    }
}
