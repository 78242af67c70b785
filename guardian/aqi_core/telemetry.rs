use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};

use crate::config::LoggingSettings;

/// Builder for model telemetry sinks.
pub struct ModelTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
    sink: Option<Arc<dyn LogSink>>,
}

impl ModelTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            min_level: LogLevel::Debug,
            sink: None,
        }
    }

    /// Sets the JSON-lines log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Sets the minimum level for the file logger.
    #[must_use]
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Uses an existing sink instead of a file logger.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<ModelTelemetry> {
        let sink = match (self.sink, self.log_path) {
            (Some(sink), _) => Some(sink),
            (None, Some(path)) => Some(
                Arc::new(JsonLogger::new(path)?.with_min_level(self.min_level)) as Arc<dyn LogSink>,
            ),
            (None, None) => None,
        };
        Ok(ModelTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                sink,
            }),
        })
    }
}

/// Telemetry handle shared across pipeline components.
#[derive(Clone)]
pub struct ModelTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for ModelTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelTelemetry")
            .field("module", &self.inner.module)
            .field("enabled", &self.inner.sink.is_some())
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    sink: Option<Arc<dyn LogSink>>,
}

impl ModelTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> ModelTelemetryBuilder {
        ModelTelemetryBuilder::new(module)
    }

    /// Builds telemetry from the `[logging]` config section.
    pub fn from_settings(module: impl Into<String>, settings: &LoggingSettings) -> Result<Self> {
        let mut builder = Self::builder(module).min_level(settings.level.parse()?);
        if let Some(path) = &settings.log_path {
            builder = builder.log_path(path);
        }
        builder.build()
    }

    /// Handle that discards everything.
    #[must_use]
    pub fn disabled(module: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                module: module.into(),
                sink: None,
            }),
        }
    }

    /// Copy of this handle reporting under another module name.
    #[must_use]
    pub fn scoped(&self, module: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                module: module.into(),
                sink: self.inner.sink.clone(),
            }),
        }
    }

    /// Logs structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(sink) = &self.inner.sink {
            if sink.enabled(level) {
                let record =
                    LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
                sink.log(&record)?;
            }
        }
        Ok(())
    }
}

/// Logs through optional telemetry, ignoring sink failures.
pub(crate) fn emit(
    telemetry: Option<&ModelTelemetry>,
    level: LogLevel,
    message: &str,
    metadata: Value,
) {
    if let Some(tel) = telemetry {
        let _ = tel.log(level, message, metadata);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_logging::MemoryLogSink;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("model.log");
        let telemetry = ModelTelemetry::builder("trainer")
            .log_path(&path)
            .min_level(LogLevel::Info)
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Debug, "trainer.noise", json!({}))
            .unwrap();
        telemetry
            .log(LogLevel::Info, "trainer.start", json!({ "rows": 3 }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("trainer.start"));
        assert!(!content.contains("trainer.noise"));
    }

    #[test]
    fn scoped_handle_shares_sink() {
        let sink = Arc::new(MemoryLogSink::new());
        let telemetry = ModelTelemetry::builder("guardian")
            .sink(sink.clone())
            .build()
            .unwrap();
        telemetry
            .scoped("predictor")
            .log(LogLevel::Warn, "predictor.loaded", json!({ "features": 33 }))
            .unwrap();
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].module, "predictor");
    }

    #[test]
    fn disabled_handle_is_silent() {
        let telemetry = ModelTelemetry::disabled("guardian");
        assert!(telemetry.log(LogLevel::Error, "ignored", json!({})).is_ok());
        assert!(format!("{telemetry:?}").contains("enabled: false"));
    }
}
