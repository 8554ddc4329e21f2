//! Per-attempt metrics rows.
//!
//! Each processing attempt produces one [`TelemetryRecord`]. Sinks append
//! records and never rewrite earlier ones.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from metrics sinks.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to write telemetry to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode telemetry record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One processing attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    #[serde(with = "rfc3339_seconds")]
    pub timestamp: DateTime<Utc>,
    /// Which pathway handled the attempt (e.g. the extraction method).
    pub pathway: String,
    pub latency_ms: Option<u64>,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
    pub cost_usd: Option<f64>,
    pub error: Option<String>,
}

impl TelemetryRecord {
    /// A record stamped with the current time and no usage figures.
    pub fn new(pathway: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            pathway: pathway.into(),
            latency_ms: None,
            tokens_in: None,
            tokens_out: None,
            cost_usd: None,
            error: None,
        }
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_tokens(mut self, tokens_in: u64, tokens_out: u64) -> Self {
        self.tokens_in = Some(tokens_in);
        self.tokens_out = Some(tokens_out);
        self
    }

    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = Some(cost_usd);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

mod rfc3339_seconds {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Destination for telemetry rows.
pub trait MetricsSink: Send + Sync {
    fn record(&self, record: &TelemetryRecord) -> Result<(), TelemetryError>;
}

/// Appends one JSON object per line to a file.
pub struct JsonlMetricsSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlMetricsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> TelemetryError {
        TelemetryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl MetricsSink for JsonlMetricsSink {
    fn record(&self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        // Poisoning only means another writer panicked mid-append
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| self.io_error(e))
    }
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn record(&self, _record: &TelemetryRecord) -> Result<(), TelemetryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_records(path: &Path) -> Vec<TelemetryRecord> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_jsonl_sink_appends_rows() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("telemetry.jsonl");
        let sink = JsonlMetricsSink::new(&path);

        sink.record(&TelemetryRecord::new("embedded-only").with_latency_ms(12))
            .unwrap();
        sink.record(
            &TelemetryRecord::new("hybrid-recognition")
                .with_latency_ms(480)
                .with_error("validation: too long"),
        )
        .unwrap();

        let records = read_records(&path);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].pathway, "embedded-only");
        assert_eq!(records[0].latency_ms, Some(12));
        assert_eq!(records[0].tokens_in, None);
        assert_eq!(records[1].error.as_deref(), Some("validation: too long"));
    }

    #[test]
    fn test_timestamp_is_rfc3339_seconds() {
        let record = TelemetryRecord::new("empty");
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        let stamp = json["timestamp"].as_str().unwrap();
        assert!(stamp.ends_with('Z'));
        assert!(!stamp.contains('.'));
        assert!(DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[test]
    fn test_usage_fields_serialize() {
        let record = TelemetryRecord::new("empty").with_tokens(10, 20).with_cost(0.5);
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["tokens_in"], 10);
        assert_eq!(json["tokens_out"], 20);
        assert_eq!(json["cost_usd"], 0.5);
        assert!(json["error"].is_null());
        assert!(json["latency_ms"].is_null());
    }

    #[test]
    fn test_null_sink() {
        assert!(NullMetricsSink.record(&TelemetryRecord::new("empty")).is_ok());
    }
}
