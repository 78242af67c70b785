use std::{collections::BTreeSet, io::Read, path::Path};

use ndarray::Array1;

use crate::{
    error::{AqiError, Result},
    record::{FeatureRecord, FeatureValue},
};

/// Labeled historical observations in file order.
#[derive(Debug, Clone, Default)]
pub struct TrainingData {
    /// Header names as they appeared in the source.
    pub columns: Vec<String>,
    /// One record per row, keyed by header name.
    pub rows: Vec<FeatureRecord>,
}

impl TrainingData {
    /// Wraps already materialised records; columns are the union of their keys.
    #[must_use]
    pub fn from_records(rows: Vec<FeatureRecord>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|existing| existing == key) {
                    columns.push(key.to_string());
                }
            }
        }
        Self { columns, rows }
    }

    /// Reads a headed CSV file; blank and `nan` cells become nulls.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_csv_reader(file)
    }

    /// Reads headed CSV from any reader.
    pub fn from_csv_reader(reader: impl Read) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let columns: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect();
        let mut rows = Vec::new();
        for row in csv_reader.records() {
            let row = row?;
            rows.push(
                columns
                    .iter()
                    .zip(row.iter())
                    .map(|(name, cell)| (name.clone(), FeatureValue::parse_cell(cell)))
                    .collect(),
            );
        }
        Ok(Self { columns, rows })
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether any row carries `name`.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column == name)
    }

    /// Picks `primary`, else the first fallback present.
    pub fn resolve_target<'a>(&self, primary: &'a str, fallbacks: &'a [String]) -> Result<&'a str> {
        if self.has_column(primary) {
            return Ok(primary);
        }
        fallbacks
            .iter()
            .map(String::as_str)
            .find(|candidate| self.has_column(candidate))
            .ok_or_else(|| {
                AqiError::DatasetShape(format!(
                    "target column '{primary}' not found and no fallback ({}) present",
                    fallbacks.join(", ")
                ))
            })
    }

    /// Splits off the label column. Missing or non-numeric labels abort.
    pub fn split_label(&self, target: &str) -> Result<(Vec<FeatureRecord>, Array1<f64>)> {
        let mut offending = BTreeSet::new();
        let mut labels = Vec::with_capacity(self.rows.len());
        let mut features = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            match row.get(target).map(|value| (value, value.as_f64())) {
                Some((_, Some(label))) => labels.push(label),
                Some((value, None)) => {
                    offending.insert(value.to_string());
                }
                None => {
                    offending.insert(FeatureValue::Null.to_string());
                }
            }
            features.push(
                row.iter()
                    .filter(|(name, _)| *name != target)
                    .map(|(name, value)| (name.to_string(), value.clone()))
                    .collect(),
            );
        }
        if !offending.is_empty() {
            return Err(AqiError::SchemaViolation {
                column: target.to_string(),
                values: offending.into_iter().collect(),
            });
        }
        Ok((features, Array1::from(labels)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "pm25,pm10,season_type,future_aqi\n40,80,Summer,95\n, 60 ,winter,70\n";

    #[test]
    fn parses_cells_and_nulls() {
        let data = TrainingData::from_csv_reader(CSV.as_bytes()).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.rows[0].number("pm25"), Some(40.0));
        assert_eq!(data.rows[1].get("pm25"), Some(&FeatureValue::Null));
        assert_eq!(data.rows[1].number("pm10"), Some(60.0));
        assert_eq!(data.rows[0].get("season_type"), Some(&"Summer".into()));
    }

    #[test]
    fn falls_back_to_alternate_target() {
        let data = TrainingData::from_csv_reader(CSV.as_bytes()).unwrap();
        let fallbacks = vec!["future_aqi".to_string()];
        assert_eq!(data.resolve_target("aqi", &fallbacks).unwrap(), "future_aqi");
        assert!(matches!(
            data.resolve_target("aqi", &[]),
            Err(AqiError::DatasetShape(_))
        ));
    }

    #[test]
    fn label_is_removed_from_features() {
        let data = TrainingData::from_csv_reader(CSV.as_bytes()).unwrap();
        let (features, labels) = data.split_label("future_aqi").unwrap();
        assert_eq!(labels.to_vec(), vec![95.0, 70.0]);
        assert!(!features[0].contains_key("future_aqi"));
        assert!(features[0].contains_key("pm25"));
    }

    #[test]
    fn bad_labels_are_reported() {
        let data = TrainingData::from_records(vec![
            FeatureRecord::new().with("pm25", 1.0).with("aqi", 40.0),
            FeatureRecord::new().with("pm25", 2.0).with("aqi", "n/a"),
            FeatureRecord::new().with("pm25", 3.0),
        ]);
        match data.split_label("aqi").unwrap_err() {
            AqiError::SchemaViolation { column, values } => {
                assert_eq!(column, "aqi");
                assert_eq!(values, vec!["n/a".to_string(), "null".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
