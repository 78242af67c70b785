//! Record-to-matrix preprocessing shared by training and inference.

/// Computed features (composites, ratios, rolling means, time features).
pub mod derive;
/// Affine feature normalizer.
pub mod scaler;
/// Season label encoding.
pub mod season;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    error::{AqiError, Result},
    record::{FeatureRecord, FeatureValue},
    schema::FeatureSchema,
    telemetry::{emit, ModelTelemetry},
};
use derive::{derive_features, insert_time_features, parse_timestamp, MAX_HISTORY, TIMESTAMP_COLUMN};
use scaler::StandardScaler;
use season::{encode_season, SeasonEncoding};

const SEASON_COLUMN: &str = "season_type";

/// How missing cells are filled once defaults have been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    /// Column mean over the current batch; a single-row batch degrades to zero-fill.
    BatchMean,
    /// Every missing cell becomes 0.
    ZeroFill,
}

/// How non-numeric cells in numeric columns are treated during assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoercionPolicy {
    /// Abort with [`AqiError::SchemaViolation`].
    Strict,
    /// Treat the cell as missing.
    Lenient,
}

/// Columns touched by defaulting and imputation during one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreprocessSummary {
    /// Rows that received the schema default, per column.
    pub defaults_substituted: IndexMap<String, usize>,
    /// Cells imputed, per column.
    pub imputed: IndexMap<String, usize>,
    /// Season labels that were not recognised.
    pub unknown_seasons: usize,
    /// Rows whose time features came from the reference time.
    pub time_fallbacks: usize,
}

/// Scaled training matrix plus the fitted normalizer.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    /// Scaled feature matrix in schema column order.
    pub features: Array2<f64>,
    /// Normalizer fitted on the unscaled matrix.
    pub scaler: StandardScaler,
    /// What defaulting and imputation did.
    pub summary: PreprocessSummary,
}

/// Turns feature records into schema-ordered numeric matrices.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    schema: FeatureSchema,
    reference_time: Option<DateTime<Utc>>,
    telemetry: Option<ModelTelemetry>,
}

impl Preprocessor {
    /// Creates a preprocessor bound to `schema`.
    #[must_use]
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            reference_time: None,
            telemetry: None,
        }
    }

    /// Time used for `day_of_week`/`month` when a record carries neither them nor a timestamp.
    #[must_use]
    pub fn with_reference_time(mut self, at: DateTime<Utc>) -> Self {
        self.reference_time = Some(at);
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: ModelTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Bound schema.
    #[must_use]
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Adds computed features; see [`derive::derive_features`].
    #[must_use]
    pub fn derive(&self, record: &FeatureRecord, history: &[&FeatureRecord]) -> FeatureRecord {
        derive_features(record, history)
    }

    /// Encodes the season label in place. Returns false when the label was unrecognised.
    pub fn encode_categoricals(&self, record: &mut FeatureRecord) -> bool {
        let Some(value) = record.get(SEASON_COLUMN) else {
            return true;
        };
        let encoding = encode_season(value);
        let recognised = !matches!(encoding, SeasonEncoding::Defaulted) || value.is_missing();
        record.insert(SEASON_COLUMN, f64::from(encoding.code()));
        recognised
    }

    /// Inserts the schema default for every absent schema feature; returns the names filled.
    pub fn fill_defaults(&self, record: &mut FeatureRecord) -> Vec<String> {
        let mut filled = Vec::new();
        for spec in self.schema.features() {
            if !record.contains_key(&spec.name) {
                record.insert(spec.name.clone(), spec.default);
                filled.push(spec.name.clone());
            }
        }
        filled
    }

    /// Builds the schema-ordered matrix; missing cells become NaN.
    ///
    /// Under [`CoercionPolicy::Strict`] the first column (in schema order) holding
    /// non-numeric text aborts with its distinct offending values.
    pub fn assemble(
        &self,
        records: &[FeatureRecord],
        policy: CoercionPolicy,
    ) -> Result<Array2<f64>> {
        let mut matrix = Array2::from_elem((records.len(), self.schema.len()), f64::NAN);
        for (col, name) in self.schema.names().enumerate() {
            let mut offending = BTreeSet::new();
            for (row, record) in records.iter().enumerate() {
                match record.get(name) {
                    None | Some(FeatureValue::Null) => {}
                    Some(value) => match value.as_f64() {
                        Some(number) => matrix[[row, col]] = number,
                        None if !value.is_missing() => {
                            offending.insert(value.to_string());
                        }
                        None => {}
                    },
                }
            }
            if policy == CoercionPolicy::Strict && !offending.is_empty() {
                let values: Vec<String> = offending.into_iter().collect();
                emit(
                    self.telemetry.as_ref(),
                    LogLevel::Error,
                    "preprocess.non_numeric_column",
                    json!({ "column": name, "values": values }),
                );
                return Err(AqiError::SchemaViolation {
                    column: name.to_string(),
                    values,
                });
            }
        }
        Ok(matrix)
    }

    /// Fills NaN cells according to `strategy`; returns imputed counts per column.
    pub fn impute(
        &self,
        matrix: &mut Array2<f64>,
        strategy: ImputeStrategy,
    ) -> IndexMap<String, usize> {
        let mut imputed = IndexMap::new();
        let single_row = matrix.nrows() <= 1;
        for (col, name) in self.schema.names().enumerate() {
            let mut column = matrix.column_mut(col);
            let missing = column.iter().filter(|value| value.is_nan()).count();
            if missing == 0 {
                continue;
            }
            let fill = match strategy {
                ImputeStrategy::ZeroFill => 0.0,
                ImputeStrategy::BatchMean if single_row => 0.0,
                ImputeStrategy::BatchMean => {
                    let observed: Vec<f64> =
                        column.iter().copied().filter(|value| !value.is_nan()).collect();
                    if observed.is_empty() {
                        0.0
                    } else {
                        #[allow(clippy::cast_precision_loss)]
                        let count = observed.len() as f64;
                        observed.iter().sum::<f64>() / count
                    }
                }
            };
            column.mapv_inplace(|value| if value.is_nan() { fill } else { value });
            imputed.insert(name.to_string(), missing);
        }
        imputed
    }

    /// Unscaled training matrix: derive, encode, default, validate, batch-mean impute.
    pub fn prepare_training(
        &self,
        records: &[FeatureRecord],
    ) -> Result<(Array2<f64>, PreprocessSummary)> {
        check_timestamps(records)?;
        let mut summary = PreprocessSummary::default();
        let mut prepared = Vec::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            let history: Vec<&FeatureRecord> =
                records[row.saturating_sub(MAX_HISTORY)..row].iter().collect();
            let mut derived = self.derive(record, &history);
            if let Some(at) = self.reference_time {
                if !derived.contains_key("day_of_week") && !derived.contains_key("month") {
                    insert_time_features(&mut derived, at);
                    summary.time_fallbacks += 1;
                }
            }
            if !self.encode_categoricals(&mut derived) {
                summary.unknown_seasons += 1;
            }
            for name in self.fill_defaults(&mut derived) {
                *summary.defaults_substituted.entry(name).or_insert(0) += 1;
            }
            prepared.push(derived);
        }
        self.report_training_fills(&summary);

        let mut matrix = self.assemble(&prepared, CoercionPolicy::Strict)?;
        summary.imputed = self.impute(&mut matrix, ImputeStrategy::BatchMean);
        for (column, cells) in &summary.imputed {
            emit(
                self.telemetry.as_ref(),
                LogLevel::Debug,
                "preprocess.mean_imputed",
                json!({ "column": column, "cells": cells }),
            );
        }
        Ok((matrix, summary))
    }

    /// Training path: prepares the batch, fits a new scaler, and scales the matrix.
    pub fn fit_transform(&self, records: &[FeatureRecord]) -> Result<PreparedBatch> {
        let (matrix, summary) = self.prepare_training(records)?;
        let (scaler, features) = StandardScaler::fit_transform(&matrix)?;
        emit(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "preprocess.completed",
            json!({ "rows": features.nrows(), "features": features.ncols() }),
        );
        Ok(PreparedBatch {
            features,
            scaler,
            summary,
        })
    }

    /// Unscaled one-row matrix for inference: absent and non-numeric cells become 0.
    pub fn prepare_inference(&self, record: &FeatureRecord) -> Result<Array2<f64>> {
        let mut derived = self.derive(record, &[]);
        self.encode_categoricals(&mut derived);
        let mut matrix = self.assemble(std::slice::from_ref(&derived), CoercionPolicy::Lenient)?;
        self.impute(&mut matrix, ImputeStrategy::ZeroFill);
        Ok(matrix)
    }

    /// Inference path: reuses a persisted scaler without refitting.
    pub fn transform_record(
        &self,
        record: &FeatureRecord,
        scaler: &StandardScaler,
    ) -> Result<Array2<f64>> {
        let matrix = self.prepare_inference(record)?;
        scaler.transform(&matrix)
    }

    fn report_training_fills(&self, summary: &PreprocessSummary) {
        let telemetry = self.telemetry.as_ref();
        for (column, rows) in &summary.defaults_substituted {
            let (default, unit) = self
                .schema
                .spec(column)
                .map_or((0.0, ""), |spec| (spec.default, spec.unit.as_str()));
            emit(
                telemetry,
                LogLevel::Warn,
                "preprocess.default_substituted",
                json!({ "column": column, "default": default, "unit": unit, "rows": rows }),
            );
        }
        if summary.time_fallbacks > 0 {
            emit(
                telemetry,
                LogLevel::Warn,
                "preprocess.timestamp_missing",
                json!({ "rows": summary.time_fallbacks, "reference_time": self.reference_time }),
            );
        }
        if summary.unknown_seasons > 0 {
            emit(
                telemetry,
                LogLevel::Warn,
                "preprocess.unknown_season",
                json!({ "rows": summary.unknown_seasons }),
            );
        }
    }
}

fn check_timestamps(records: &[FeatureRecord]) -> Result<()> {
    let bad: BTreeSet<String> = records
        .iter()
        .filter_map(|record| record.get(TIMESTAMP_COLUMN))
        .filter(|value| !value.is_missing())
        .filter(|value| value.as_text().and_then(parse_timestamp).is_none())
        .map(ToString::to_string)
        .collect();
    if bad.is_empty() {
        Ok(())
    } else {
        Err(AqiError::SchemaViolation {
            column: TIMESTAMP_COLUMN.into(),
            values: bad.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    use shared_logging::MemoryLogSink;

    fn tiny_schema() -> FeatureSchema {
        use crate::schema::{FeatureKind, FeatureSpec};
        FeatureSchema::new(
            "test/v1",
            vec![
                FeatureSpec::new("pm25", 50.0, "µg/m³", FeatureKind::Numeric),
                FeatureSpec::new("pm10", 100.0, "µg/m³", FeatureKind::Numeric),
                FeatureSpec::new("season_type", 2.0, "category", FeatureKind::Categorical),
                FeatureSpec::new("pm_ratio", 0.5, "ratio", FeatureKind::Derived),
            ],
        )
    }

    #[test]
    fn training_uses_batch_mean_for_nulls_and_defaults_for_absent_columns() {
        let pre = Preprocessor::new(tiny_schema());
        let records = vec![
            FeatureRecord::new().with("pm25", 10.0).with("season_type", "Winter"),
            FeatureRecord::new().with("pm25", FeatureValue::Null).with("season_type", "summer"),
            FeatureRecord::new().with("pm25", 30.0).with("season_type", "Monsoon"),
        ];
        let (matrix, summary) = pre.prepare_training(&records).unwrap();
        assert_eq!(matrix[[1, 0]], 20.0);
        assert_eq!(matrix[[0, 1]], 100.0);
        assert_eq!(matrix.column(2).to_vec(), vec![0.0, 2.0, 2.0]);
        assert_eq!(summary.defaults_substituted["pm10"], 3);
        assert_eq!(summary.imputed["pm25"], 1);
        assert_eq!(summary.unknown_seasons, 1);
    }

    #[test]
    fn single_row_batch_mean_degrades_to_zero_fill() {
        let pre = Preprocessor::new(tiny_schema());
        let mut matrix = Array2::from_elem((1, 4), f64::NAN);
        matrix[[0, 1]] = 80.0;
        pre.impute(&mut matrix, ImputeStrategy::BatchMean);
        assert_eq!(matrix.row(0).to_vec(), vec![0.0, 80.0, 0.0, 0.0]);
    }

    #[test]
    fn inference_zero_fills_instead_of_defaulting() {
        let pre = Preprocessor::new(tiny_schema());
        let record = FeatureRecord::new()
            .with("pm25", 40.0)
            .with("pm10", "not-a-number")
            .with("city", "Delhi");
        let matrix = pre.prepare_inference(&record).unwrap();
        assert_eq!(matrix.row(0).to_vec(), vec![40.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn strict_assembly_names_offending_column() {
        let pre = Preprocessor::new(tiny_schema());
        let records = vec![
            FeatureRecord::new().with("pm25", 10.0).with("pm10", "high"),
            FeatureRecord::new().with("pm25", 12.0).with("pm10", "low"),
            FeatureRecord::new().with("pm25", 11.0).with("pm10", "high"),
        ];
        match pre.prepare_training(&records).unwrap_err() {
            AqiError::SchemaViolation { column, values } => {
                assert_eq!(column, "pm10");
                assert_eq!(values, vec!["high".to_string(), "low".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unparseable_timestamp_is_rejected() {
        let pre = Preprocessor::new(tiny_schema());
        let records = vec![FeatureRecord::new().with("timestamp", "last tuesday")];
        assert!(matches!(
            pre.prepare_training(&records),
            Err(AqiError::SchemaViolation { column, .. }) if column == "timestamp"
        ));
    }

    #[test]
    fn defaults_and_time_fallback_are_logged() {
        let sink = Arc::new(MemoryLogSink::new());
        let telemetry = ModelTelemetry::builder("preprocess")
            .sink(sink.clone())
            .build()
            .unwrap();
        let at = Utc.with_ymd_and_hms(2025, 4, 10, 11, 0, 0).unwrap();
        let pre = Preprocessor::new(FeatureSchema::standard())
            .with_reference_time(at)
            .with_telemetry(telemetry);
        let records = vec![
            FeatureRecord::new().with("pm25", 40.0),
            FeatureRecord::new().with("pm25", 60.0),
        ];
        let batch = pre.fit_transform(&records).unwrap();
        assert_eq!(batch.features.ncols(), FeatureSchema::standard().len());
        assert_eq!(batch.summary.time_fallbacks, 2);
        let month = FeatureSchema::standard().index_of("month").unwrap();
        assert_eq!(batch.scaler.mean()[month], 4.0);
        let warnings = sink.with_message("preprocess.default_substituted");
        assert!(warnings
            .iter()
            .any(|record| record.metadata["column"] == "industrial_activity_index"));
        assert_eq!(sink.with_message("preprocess.timestamp_missing").len(), 1);
    }
}
