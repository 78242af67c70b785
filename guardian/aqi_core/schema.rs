//! Ordered feature contract shared by training and inference.
//!
//! Column order is load-bearing: the fitted scaler and forest index features
//! by position, so every artifact pair stores the schema it was fit against.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::record::FeatureRecord;

/// Version tag of [`FeatureSchema::standard`]. Bump whenever the list changes.
pub const STANDARD_SCHEMA_VERSION: &str = "aqi-features/v1";

/// How a feature is interpreted before scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Plain floating-point reading.
    Numeric,
    /// Small-integer encoded category.
    Categorical,
    /// Computed by the preprocessor from other features.
    Derived,
}

/// One schema column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Column name (case-sensitive).
    pub name: String,
    /// Fallback used when a training record omits the feature.
    pub default: f64,
    /// Unit tag, used for logging only.
    pub unit: String,
    /// Interpretation.
    pub kind: FeatureKind,
}

impl FeatureSpec {
    /// Creates a spec.
    #[must_use]
    pub fn new(name: &str, default: f64, unit: &str, kind: FeatureKind) -> Self {
        Self {
            name: name.to_string(),
            default,
            unit: unit.to_string(),
            kind,
        }
    }
}

/// Ordered, versioned feature list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    version: String,
    features: Vec<FeatureSpec>,
}

/// Result of comparing a record (or another schema) against a schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaAlignment {
    /// Schema features supplied with a non-missing value.
    pub present: Vec<String>,
    /// Schema features absent or null.
    pub missing: Vec<String>,
    /// Keys not in the schema; ignored downstream.
    pub extra: Vec<String>,
}

impl SchemaAlignment {
    /// True when nothing is missing and nothing extra was supplied.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

impl FeatureSchema {
    /// Builds a schema from ordered specs.
    #[must_use]
    pub fn new(version: impl Into<String>, features: Vec<FeatureSpec>) -> Self {
        Self {
            version: version.into(),
            features,
        }
    }

    /// The production feature list with the default table used during training.
    #[must_use]
    pub fn standard() -> Self {
        use FeatureKind::{Categorical, Derived, Numeric};
        let specs = [
            ("pm25", 50.0, "µg/m³", Numeric),
            ("pm10", 100.0, "µg/m³", Numeric),
            ("emission_levels", 50.0, "index", Numeric),
            ("co", 4.4, "mg/m³", Numeric),
            ("no2", 40.0, "µg/m³", Numeric),
            ("daily_vehicle_count", 5000.0, "vehicles/day", Numeric),
            ("temperature", 25.0, "°C", Numeric),
            ("humidity", 60.0, "%", Numeric),
            ("industrial_activity_index", 45.0, "index", Numeric),
            ("industrial_consumption", 55.0, "MW", Numeric),
            ("power_demand", 75.0, "MW", Numeric),
            ("production_index", 65.0, "index", Numeric),
            ("energy_price_index", 80.0, "index", Numeric),
            ("green_cover_percentage", 25.0, "%", Numeric),
            ("urban_density", 60.0, "%", Numeric),
            ("peak_hour_density", 70.0, "%", Numeric),
            ("severity_index", 40.0, "index", Numeric),
            ("compliance_score", 85.0, "score", Numeric),
            ("violation_index", 15.0, "index", Numeric),
            ("pollen_level", 30.0, "index", Numeric),
            ("wind_speed", 10.0, "m/s", Numeric),
            ("season_type", 2.0, "category", Categorical),
            ("day_of_week", 0.0, "weekday", Categorical),
            ("month", 1.0, "month", Categorical),
            ("gas_pollutant_index", 22.2, "index", Derived),
            ("pm_ratio", 0.5, "ratio", Derived),
            ("temp_humidity", 1500.0, "°C·%", Derived),
            ("temperature_rolling_mean_3h", 25.0, "°C", Derived),
            ("temperature_rolling_mean_6h", 25.0, "°C", Derived),
            ("humidity_rolling_mean_3h", 60.0, "%", Derived),
            ("humidity_rolling_mean_6h", 60.0, "%", Derived),
            ("wind_speed_rolling_mean_3h", 10.0, "m/s", Derived),
            ("wind_speed_rolling_mean_6h", 10.0, "m/s", Derived),
        ];
        Self::new(
            STANDARD_SCHEMA_VERSION,
            specs
                .into_iter()
                .map(|(name, default, unit, kind)| FeatureSpec::new(name, default, unit, kind))
                .collect(),
        )
    }

    /// Schema version tag.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Ordered specs.
    #[must_use]
    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    /// Ordered names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|spec| spec.name.as_str())
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// True when the schema has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Column position of `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|spec| spec.name == name)
    }

    /// Spec lookup by name.
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|spec| spec.name == name)
    }

    /// Default fallback for `name`.
    #[must_use]
    pub fn default_for(&self, name: &str) -> Option<f64> {
        self.spec(name).map(|spec| spec.default)
    }

    /// Classifies the keys of `record` against the schema.
    #[must_use]
    pub fn align(&self, record: &FeatureRecord) -> SchemaAlignment {
        let mut alignment = SchemaAlignment::default();
        for name in self.names() {
            if record.is_present(name) {
                alignment.present.push(name.to_string());
            } else {
                alignment.missing.push(name.to_string());
            }
        }
        alignment.extra = record
            .keys()
            .filter(|key| self.index_of(key).is_none())
            .map(str::to_string)
            .collect();
        alignment
    }

    /// Compares two schemas; `missing` lists names only `self` has, `extra` names only `other` has.
    #[must_use]
    pub fn diff(&self, other: &Self) -> SchemaAlignment {
        let theirs: BTreeSet<&str> = other.names().collect();
        let ours: BTreeSet<&str> = self.names().collect();
        SchemaAlignment {
            present: self
                .names()
                .filter(|name| theirs.contains(name))
                .map(str::to_string)
                .collect(),
            missing: self
                .names()
                .filter(|name| !theirs.contains(name))
                .map(str::to_string)
                .collect(),
            extra: other
                .names()
                .filter(|name| !ours.contains(name))
                .map(str::to_string)
                .collect(),
        }
    }

    /// True when both schemas share version and exact column order.
    #[must_use]
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.version == other.version && self.names().eq(other.names())
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::standard()
    }
}

/// Semantic groups used to attribute model importance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureGroup {
    /// Particulate and gaseous pollutants.
    AirPollutants,
    /// Meteorological readings.
    WeatherConditions,
    /// Industrial output and emissions.
    IndustrialImpact,
    /// Traffic and urbanisation.
    UrbanFactors,
}

impl FeatureGroup {
    /// Fixed reporting order.
    pub const ALL: [Self; 4] = [
        Self::AirPollutants,
        Self::WeatherConditions,
        Self::IndustrialImpact,
        Self::UrbanFactors,
    ];

    /// Key used in serialized factor maps.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::AirPollutants => "air_pollutants",
            Self::WeatherConditions => "weather_conditions",
            Self::IndustrialImpact => "industrial_impact",
            Self::UrbanFactors => "urban_factors",
        }
    }

    /// Features whose importance is summed into this group.
    #[must_use]
    pub const fn members(self) -> &'static [&'static str] {
        match self {
            Self::AirPollutants => &["pm25", "pm10", "no2", "co"],
            Self::WeatherConditions => &["temperature", "humidity", "wind_speed"],
            Self::IndustrialImpact => &["industrial_activity_index", "emission_levels"],
            Self::UrbanFactors => &["daily_vehicle_count", "urban_density"],
        }
    }
}

/// Features weighted most heavily by the confidence score.
pub const KEY_FEATURES: [&str; 5] = ["pm25", "pm10", "emission_levels", "co", "no2"];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FeatureValue;

    #[test]
    fn standard_schema_is_unique_and_ordered() {
        let schema = FeatureSchema::standard();
        let names: Vec<&str> = schema.names().collect();
        let unique: BTreeSet<&str> = names.iter().copied().collect();
        assert_eq!(unique.len(), names.len());
        assert_eq!(names[0], "pm25");
        assert_eq!(schema.index_of("season_type"), Some(21));
        assert_eq!(schema.default_for("co"), Some(4.4));
        assert_eq!(schema.default_for("industrial_activity_index"), Some(45.0));
    }

    #[test]
    fn group_members_and_key_features_are_in_schema() {
        let schema = FeatureSchema::standard();
        for group in FeatureGroup::ALL {
            for member in group.members() {
                assert!(schema.index_of(member).is_some(), "{member} missing");
            }
        }
        for key in KEY_FEATURES {
            assert!(schema.index_of(key).is_some());
        }
    }

    #[test]
    fn align_reports_missing_and_extra() {
        let schema = FeatureSchema::standard();
        let record = FeatureRecord::new()
            .with("pm25", 50.0)
            .with("co", FeatureValue::Null)
            .with("city", "Delhi");
        let alignment = schema.align(&record);
        assert_eq!(alignment.present, vec!["pm25".to_string()]);
        assert!(alignment.missing.contains(&"co".to_string()));
        assert_eq!(alignment.extra, vec!["city".to_string()]);
        assert!(!alignment.is_exact());
    }

    #[test]
    fn reordered_schema_is_incompatible() {
        let schema = FeatureSchema::standard();
        let mut specs = schema.features().to_vec();
        specs.swap(0, 1);
        let reordered = FeatureSchema::new(schema.version(), specs);
        assert!(!schema.is_compatible(&reordered));
        assert!(schema.diff(&reordered).missing.is_empty());
        assert!(schema.is_compatible(&FeatureSchema::standard()));
    }
}
