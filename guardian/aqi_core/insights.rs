//! Rule-based recommendations for individuals, authorities, and industry.
//!
//! Every rule is evaluated in table order and appends independently; no rule
//! suppresses a later one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    predict::{PredictionResult, RiskLevel},
    record::{FeatureRecord, FeatureValue},
    telemetry::{emit, ModelTelemetry},
};

/// Traffic volume above which congestion rules fire.
pub const HEAVY_TRAFFIC_VEHICLES: f64 = 7000.0;

/// Label used when no location is supplied.
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Refresh cadence advertised in bundle metadata.
pub const UPDATE_FREQUENCY: &str = "5 minutes";

/// Confidence as supplied by the caller: a score or an already-worded label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfidenceInput {
    /// Numeric confidence in `[0, 1]`.
    Score(f64),
    /// Free-form label passed through unchanged.
    Label(String),
}

impl ConfidenceInput {
    /// `High` from 0.8, `Medium` from 0.5, otherwise `Low`.
    #[must_use]
    pub fn descriptor(&self) -> String {
        match self {
            Self::Score(score) if *score >= 0.8 => "High".into(),
            Self::Score(score) if *score >= 0.5 => "Medium".into(),
            Self::Score(_) => "Low".into(),
            Self::Label(label) => label.clone(),
        }
    }
}

/// Prediction plus the contextual signals the rules look at.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightsInput {
    /// Predicted or observed AQI.
    pub aqi: f64,
    /// Vehicles per day.
    pub daily_vehicle_count: f64,
    /// Externally forecast spike.
    pub predicted_spike: bool,
    /// Industrial activity index.
    pub industrial_activity_index: f64,
    /// Emission level index.
    pub emission_levels: f64,
    /// Location label.
    pub location: Option<String>,
    /// Confidence score or label.
    pub confidence: Option<ConfidenceInput>,
}

impl InsightsInput {
    /// Builds the input from a prediction and the record it was made from.
    #[must_use]
    pub fn from_prediction(
        prediction: &PredictionResult,
        record: &FeatureRecord,
        location: Option<&str>,
    ) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let aqi = prediction.aqi as f64;
        let predicted_spike = match record.get("predicted_spike") {
            Some(FeatureValue::Flag(flag)) => *flag,
            Some(FeatureValue::Text(text)) => {
                matches!(text.trim().to_lowercase().as_str(), "true" | "yes" | "1")
            }
            Some(value) => value.as_f64().is_some_and(|v| v != 0.0),
            None => false,
        };
        Self {
            aqi,
            daily_vehicle_count: record.number("daily_vehicle_count").unwrap_or(0.0),
            predicted_spike,
            industrial_activity_index: record.number("industrial_activity_index").unwrap_or(0.0),
            emission_levels: record.number("emission_levels").unwrap_or(0.0),
            location: location.map(str::to_string),
            confidence: Some(ConfidenceInput::Score(prediction.confidence)),
        }
    }
}

/// Urgency of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    /// Act immediately.
    Critical,
    /// Act soon.
    High,
    /// Advisory.
    Medium,
    /// Informational.
    Low,
}

/// Audience-specific field attached to each item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudienceDetail {
    /// Individuals: display icon.
    Icon(String),
    /// Government: responsible department.
    Department(String),
    /// Industry: compliance impact.
    ComplianceImpact(String),
}

/// One triggered recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    /// What fired the rule.
    pub trigger: String,
    /// Recommended action.
    pub action: String,
    /// Urgency.
    pub priority: Priority,
    /// Audience-specific extra field.
    #[serde(flatten)]
    pub detail: AudienceDetail,
    /// Generation time.
    pub timestamp: DateTime<Utc>,
}

/// Current AQI band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqiStatus {
    /// AQI as supplied.
    pub aqi: f64,
    /// Band label.
    pub category: RiskLevel,
    /// Band color.
    pub color_code: String,
    /// Generation time.
    pub timestamp: DateTime<Utc>,
}

/// Per-audience recommendation lists, each in rule order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AudienceRecommendations {
    /// Residents.
    pub individual: Vec<RecommendationItem>,
    /// City authorities.
    pub government: Vec<RecommendationItem>,
    /// Industrial operators.
    pub industrial: Vec<RecommendationItem>,
}

/// Bundle metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetadata {
    /// Location label, `Unknown` when absent.
    pub location: String,
    /// Confidence descriptor.
    pub data_confidence: String,
    /// Refresh cadence.
    pub update_frequency: String,
}

/// Full engine output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationBundle {
    /// AQI band.
    pub status: AqiStatus,
    /// Recommendations per audience.
    pub recommendations: AudienceRecommendations,
    /// Location, confidence, and cadence.
    pub metadata: BundleMetadata,
}

impl RecommendationBundle {
    /// All items across audiences.
    pub fn items(&self) -> impl Iterator<Item = &RecommendationItem> {
        self.recommendations
            .individual
            .iter()
            .chain(&self.recommendations.government)
            .chain(&self.recommendations.industrial)
    }
}

struct Rule {
    applies: fn(&InsightsInput) -> bool,
    trigger: &'static str,
    action: &'static str,
    priority: Priority,
    detail: &'static str,
}

const INDIVIDUAL_RULES: [Rule; 4] = [
    Rule {
        applies: |input: &InsightsInput| input.aqi > 150.0,
        trigger: "Unhealthy Air Quality",
        action: "Stay indoors, keep windows closed, use air purifiers if available",
        priority: Priority::High,
        detail: "🏠",
    },
    Rule {
        applies: |input: &InsightsInput| input.aqi > 100.0 && input.aqi <= 150.0,
        trigger: "Moderate Air Quality",
        action: "Wear masks outdoors, especially during peak hours",
        priority: Priority::Medium,
        detail: "😷",
    },
    Rule {
        applies: |input: &InsightsInput| input.daily_vehicle_count > HEAVY_TRAFFIC_VEHICLES,
        trigger: "Heavy Traffic Conditions",
        action: "Consider using public transport or alternative routes",
        priority: Priority::Medium,
        detail: "🚌",
    },
    Rule {
        applies: |input: &InsightsInput| input.predicted_spike,
        trigger: "AQI Spike Expected",
        action: "Plan outdoor activities for earlier/later time slots",
        priority: Priority::High,
        detail: "⚠️",
    },
];

const GOVERNMENT_RULES: [Rule; 3] = [
    Rule {
        applies: |input: &InsightsInput| {
            input.daily_vehicle_count > HEAVY_TRAFFIC_VEHICLES && input.aqi > 120.0
        },
        trigger: "Traffic-induced AQI Spike",
        action: "Activate smart traffic management system, reroute heavy vehicles",
        priority: Priority::High,
        detail: "Traffic Control",
    },
    Rule {
        applies: |input: &InsightsInput| input.industrial_activity_index > 75.0,
        trigger: "High Industrial Activity",
        action: "Dispatch inspection team to industrial zones",
        priority: Priority::High,
        detail: "Environmental Protection",
    },
    Rule {
        applies: |input: &InsightsInput| input.aqi > 150.0,
        trigger: "Sustained High AQI",
        action: "Consider implementing temporary vehicle restrictions",
        priority: Priority::Critical,
        detail: "City Administration",
    },
];

const INDUSTRIAL_RULES: [Rule; 3] = [
    Rule {
        applies: |input: &InsightsInput| input.emission_levels > 80.0,
        trigger: "Critical Emission Levels",
        action: "Immediately reduce production output or activate additional filters",
        priority: Priority::Critical,
        detail: "High",
    },
    Rule {
        applies: |input: &InsightsInput| {
            input.emission_levels > 60.0 && input.emission_levels <= 80.0
        },
        trigger: "Elevated Emissions",
        action: "Review filter efficiency and maintenance schedule",
        priority: Priority::High,
        detail: "Medium",
    },
    Rule {
        applies: |input: &InsightsInput| input.aqi > 150.0,
        trigger: "High AQI in Industrial Zone",
        action: "Implement emission control measures, check equipment",
        priority: Priority::High,
        detail: "Medium",
    },
];

fn evaluate(
    rules: &[Rule],
    input: &InsightsInput,
    at: DateTime<Utc>,
    detail: fn(String) -> AudienceDetail,
) -> Vec<RecommendationItem> {
    rules
        .iter()
        .filter(|rule| (rule.applies)(input))
        .map(|rule| RecommendationItem {
            trigger: rule.trigger.to_string(),
            action: rule.action.to_string(),
            priority: rule.priority,
            detail: detail(rule.detail.to_string()),
            timestamp: at,
        })
        .collect()
}

/// Stateless rule engine.
#[derive(Debug, Clone, Default)]
pub struct InsightsEngine {
    telemetry: Option<ModelTelemetry>,
}

impl InsightsEngine {
    /// Creates the engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: ModelTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Generates a bundle stamped with the current time.
    #[must_use]
    pub fn generate(&self, input: &InsightsInput) -> RecommendationBundle {
        self.generate_at(input, Utc::now())
    }

    /// Generates a bundle stamped with `at`.
    #[must_use]
    pub fn generate_at(&self, input: &InsightsInput, at: DateTime<Utc>) -> RecommendationBundle {
        let category = RiskLevel::from_value(input.aqi);
        let bundle = RecommendationBundle {
            status: AqiStatus {
                aqi: input.aqi,
                category,
                color_code: category.color().to_string(),
                timestamp: at,
            },
            recommendations: AudienceRecommendations {
                individual: evaluate(&INDIVIDUAL_RULES, input, at, AudienceDetail::Icon),
                government: evaluate(&GOVERNMENT_RULES, input, at, AudienceDetail::Department),
                industrial: evaluate(
                    &INDUSTRIAL_RULES,
                    input,
                    at,
                    AudienceDetail::ComplianceImpact,
                ),
            },
            metadata: BundleMetadata {
                location: input
                    .location
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
                data_confidence: input
                    .confidence
                    .as_ref()
                    .map_or_else(|| "Medium".to_string(), ConfidenceInput::descriptor),
                update_frequency: UPDATE_FREQUENCY.to_string(),
            },
        };
        emit(
            self.telemetry.as_ref(),
            LogLevel::Debug,
            "insights.generated",
            json!({
                "aqi": input.aqi,
                "category": category,
                "individual": bundle.recommendations.individual.len(),
                "government": bundle.recommendations.government.len(),
                "industrial": bundle.recommendations.industrial.len(),
            }),
        );
        bundle
    }
}
