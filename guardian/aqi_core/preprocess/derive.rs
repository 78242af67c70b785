use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

use crate::record::{FeatureRecord, FeatureValue};

/// Rolling-mean windows, in observations (hourly readings).
pub const ROLLING_WINDOWS: [usize; 2] = [3, 6];

/// Readings that get rolling means.
pub const ROLLING_BASES: [&str; 3] = ["temperature", "humidity", "wind_speed"];

/// Longest history a rolling mean can use, excluding the current record.
pub const MAX_HISTORY: usize = 5;

/// Column carrying the observation time.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Name of a rolling-mean feature.
#[must_use]
pub fn rolling_name(base: &str, window: usize) -> String {
    format!("{base}_rolling_mean_{window}h")
}

/// PM2.5/PM10 ratio; a zero or non-finite denominator yields 0.
#[must_use]
pub fn pm_ratio(pm25: f64, pm10: f64) -> f64 {
    if pm10 == 0.0 || !pm10.is_finite() {
        return 0.0;
    }
    let ratio = pm25 / pm10;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// Parses RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, or `YYYY-MM-DD`.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Writes `day_of_week` (Monday = 0) and `month` (1-12) from `at`.
pub fn insert_time_features(record: &mut FeatureRecord, at: DateTime<Utc>) {
    record.insert("day_of_week", f64::from(at.weekday().num_days_from_monday()));
    record.insert("month", f64::from(at.month()));
}

/// Adds computed features to a copy of `record`.
///
/// Keys the caller already supplied are never overwritten, except the time
/// features, which a parseable `timestamp` always refreshes. `history` holds the
/// preceding raw observations, oldest first.
#[must_use]
pub fn derive_features(record: &FeatureRecord, history: &[&FeatureRecord]) -> FeatureRecord {
    let mut derived = record.clone();

    if let Some(at) = record
        .get(TIMESTAMP_COLUMN)
        .and_then(FeatureValue::as_text)
        .and_then(parse_timestamp)
    {
        insert_time_features(&mut derived, at);
    }

    if !derived.contains_key("gas_pollutant_index") {
        if let (Some(co), Some(no2)) = (record.number("co"), record.number("no2")) {
            derived.insert("gas_pollutant_index", (co + no2) / 2.0);
        }
    }

    if !derived.contains_key("pm_ratio") {
        if let (Some(pm25), Some(pm10)) = (record.number("pm25"), record.number("pm10")) {
            derived.insert("pm_ratio", pm_ratio(pm25, pm10));
        }
    }

    if !derived.contains_key("temp_humidity") {
        if let (Some(temperature), Some(humidity)) =
            (record.number("temperature"), record.number("humidity"))
        {
            derived.insert("temp_humidity", temperature * humidity);
        }
    }

    for base in ROLLING_BASES {
        let Some(current) = record.number(base) else {
            continue;
        };
        for window in ROLLING_WINDOWS {
            let name = rolling_name(base, window);
            if derived.contains_key(&name) {
                continue;
            }
            let start = history.len().saturating_sub(window - 1);
            let (sum, count) = history[start..]
                .iter()
                .filter_map(|past| past.number(base))
                .fold((current, 1_u32), |(sum, count), value| (sum + value, count + 1));
            derived.insert(name, sum / f64::from(count));
        }
    }

    derived
}
