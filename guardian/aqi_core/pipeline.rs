use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    config::GuardianConfig,
    error::Result,
    insights::{InsightsEngine, InsightsInput, RecommendationBundle},
    predict::{PredictionResult, Predictor},
    record::FeatureRecord,
    schema::FeatureSchema,
    telemetry::{emit, ModelTelemetry},
};

/// Prediction and the recommendations derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Model output.
    pub prediction: PredictionResult,
    /// Rule engine output for the predicted AQI.
    pub recommendations: RecommendationBundle,
}

/// Record in, assessment out: predictor followed by the insights engine.
#[derive(Debug, Clone)]
pub struct GuardianPipeline {
    predictor: Predictor,
    insights: InsightsEngine,
    telemetry: Option<ModelTelemetry>,
}

impl GuardianPipeline {
    /// Loads the configured artifact pair and wires telemetry from `[logging]`.
    pub fn load(config: &GuardianConfig, schema: &FeatureSchema) -> anyhow::Result<Self> {
        let telemetry = ModelTelemetry::from_settings("guardian", &config.logging)?;
        let predictor =
            Predictor::load_with(config, schema, Some(telemetry.scoped("predictor")))?;
        Ok(Self::new(predictor).with_telemetry(telemetry))
    }

    /// Wraps an already loaded predictor.
    #[must_use]
    pub fn new(predictor: Predictor) -> Self {
        Self {
            predictor,
            insights: InsightsEngine::new(),
            telemetry: None,
        }
    }

    /// Attaches telemetry to the pipeline and its insights engine.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: ModelTelemetry) -> Self {
        self.insights = InsightsEngine::new().with_telemetry(telemetry.scoped("insights"));
        self.telemetry = Some(telemetry);
        self
    }

    /// Underlying predictor.
    #[must_use]
    pub const fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    /// Rule engine.
    #[must_use]
    pub const fn insights(&self) -> &InsightsEngine {
        &self.insights
    }

    /// Predicts and recommends at the current time.
    pub fn assess(
        &self,
        record: &FeatureRecord,
        horizon: u32,
        location: Option<&str>,
    ) -> Result<Assessment> {
        self.assess_at(record, horizon, location, Utc::now())
    }

    /// Predicts and recommends with a fixed timestamp.
    pub fn assess_at(
        &self,
        record: &FeatureRecord,
        horizon: u32,
        location: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Assessment> {
        let prediction = self.predictor.predict_at(record, horizon, at)?;
        let input = InsightsInput::from_prediction(&prediction, record, location);
        let recommendations = self.insights.generate_at(&input, at);
        emit(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "guardian.assessed",
            json!({
                "aqi": prediction.aqi,
                "risk_level": prediction.risk_level,
                "confidence": prediction.confidence,
                "recommendations": recommendations.items().count(),
            }),
        );
        Ok(Assessment {
            prediction,
            recommendations,
        })
    }
}
