use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Loosely typed value carried by a [`FeatureRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Numeric reading.
    Number(f64),
    /// Boolean flag, coerced to 0/1.
    Flag(bool),
    /// Free text (categorical label, timestamp, or an unparsed number).
    Text(String),
    /// Explicit missing value.
    Null,
}

impl FeatureValue {
    /// Parses a raw cell: blank becomes `Null`, numeric text becomes `Number`.
    #[must_use]
    pub fn parse_cell(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            return Self::Null;
        }
        trimmed
            .parse::<f64>()
            .map_or_else(|_| Self::Text(trimmed.to_string()), Self::Number)
    }

    /// Returns the floating-point interpretation, if one exists.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) if value.is_finite() => Some(*value),
            Self::Flag(flag) => Some(if *flag { 1.0 } else { 0.0 }),
            Self::Text(text) => text.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Self::Number(_) | Self::Null => None,
        }
    }

    /// Returns the text payload for text values.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// True for `Null` and non-finite numbers.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Number(value) => !value.is_finite(),
            _ => false,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Flag(flag) => write!(f, "{flag}"),
            Self::Text(text) => f.write_str(text),
            Self::Null => f.write_str("null"),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FeatureValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Mapping from feature name to value; key order follows insertion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRecord {
    values: IndexMap<String, FeatureValue>,
}

impl FeatureRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FeatureValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Raw value lookup.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    /// True when the key exists, even if its value is `Null`.
    #[must_use]
    pub fn contains_key(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// True when the key exists with a non-missing value.
    #[must_use]
    pub fn is_present(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|value| !value.is_missing())
    }

    /// Numeric lookup; missing or non-coercible values yield `None`.
    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(FeatureValue::as_f64)
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Iterates over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the record holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for FeatureRecord
where
    K: Into<String>,
    V: Into<FeatureValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cells() {
        assert_eq!(FeatureValue::parse_cell(" 12.5 "), FeatureValue::Number(12.5));
        assert_eq!(FeatureValue::parse_cell(""), FeatureValue::Null);
        assert_eq!(FeatureValue::parse_cell("NaN"), FeatureValue::Null);
        assert_eq!(
            FeatureValue::parse_cell("Summer"),
            FeatureValue::Text("Summer".into())
        );
    }

    #[test]
    fn coerces_numbers_from_text_and_flags() {
        assert_eq!(FeatureValue::from("42").as_f64(), Some(42.0));
        assert_eq!(FeatureValue::from(true).as_f64(), Some(1.0));
        assert_eq!(FeatureValue::from("high").as_f64(), None);
        assert_eq!(FeatureValue::Number(f64::NAN).as_f64(), None);
    }

    #[test]
    fn deserializes_mixed_json_payload() {
        let record: FeatureRecord = serde_json::from_str(
            r#"{"pm25": 50, "season_type": "Summer", "co": null, "predicted_spike": true}"#,
        )
        .unwrap();
        assert_eq!(record.number("pm25"), Some(50.0));
        assert_eq!(record.get("season_type").and_then(FeatureValue::as_text), Some("Summer"));
        assert!(record.contains_key("co"));
        assert!(!record.is_present("co"));
        assert_eq!(record.number("predicted_spike"), Some(1.0));
    }

    #[test]
    fn preserves_insertion_order() {
        let record = FeatureRecord::new().with("b", 1.0).with("a", 2.0);
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["b", "a"]);
    }
}
