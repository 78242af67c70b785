use serde::{Deserialize, Serialize};

use crate::record::FeatureValue;

/// Code used for unrecognised or missing season labels (summer).
pub const DEFAULT_SEASON_CODE: u8 = 2;

/// Meteorological season with its model encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    /// Encoded as 0.
    Winter,
    /// Encoded as 1.
    Spring,
    /// Encoded as 2.
    Summer,
    /// Encoded as 3; "autumn" is accepted as an alias.
    Fall,
}

impl Season {
    /// Case-insensitive label lookup.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "winter" => Some(Self::Winter),
            "spring" => Some(Self::Spring),
            "summer" => Some(Self::Summer),
            "fall" | "autumn" => Some(Self::Fall),
            _ => None,
        }
    }

    /// Integer code fed to the model.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Winter => 0,
            Self::Spring => 1,
            Self::Summer => 2,
            Self::Fall => 3,
        }
    }
}

/// Outcome of encoding one season value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonEncoding {
    /// Recognised label or an already numeric code.
    Encoded(u8),
    /// Unknown label or null replaced by [`DEFAULT_SEASON_CODE`].
    Defaulted,
}

impl SeasonEncoding {
    /// The code that ends up in the record.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Encoded(code) => code,
            Self::Defaulted => DEFAULT_SEASON_CODE,
        }
    }
}

/// Maps a raw season value to its model code. Numeric values pass through unchanged.
#[must_use]
pub fn encode_season(value: &FeatureValue) -> SeasonEncoding {
    match value {
        FeatureValue::Text(label) => Season::from_label(label).map_or_else(
            || {
                label
                    .trim()
                    .parse::<u8>()
                    .ok()
                    .filter(|code| *code <= 3)
                    .map_or(SeasonEncoding::Defaulted, SeasonEncoding::Encoded)
            },
            |season| SeasonEncoding::Encoded(season.code()),
        ),
        FeatureValue::Number(code) if code.is_finite() && (0.0..=3.0).contains(code) => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let code = code.round() as u8;
            SeasonEncoding::Encoded(code)
        }
        _ => SeasonEncoding::Defaulted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_case_insensitive() {
        assert_eq!(encode_season(&"Summer".into()).code(), 2);
        assert_eq!(encode_season(&"summer".into()).code(), 2);
        assert_eq!(encode_season(&" WINTER ".into()).code(), 0);
        assert_eq!(encode_season(&"Autumn".into()).code(), 3);
        assert_eq!(encode_season(&"fall".into()).code(), 3);
    }

    #[test]
    fn unknown_labels_fall_back_to_default() {
        assert_eq!(encode_season(&"Monsoon".into()), SeasonEncoding::Defaulted);
        assert_eq!(encode_season(&"Monsoon".into()).code(), DEFAULT_SEASON_CODE);
        assert_eq!(encode_season(&FeatureValue::Null), SeasonEncoding::Defaulted);
        assert_eq!(encode_season(&FeatureValue::Number(9.0)), SeasonEncoding::Defaulted);
    }

    #[test]
    fn numeric_codes_pass_through() {
        assert_eq!(encode_season(&FeatureValue::Number(1.0)), SeasonEncoding::Encoded(1));
        assert_eq!(encode_season(&"3".into()), SeasonEncoding::Encoded(3));
    }
}
