//! Collaborators that sit around extraction: input validation and telemetry.

pub mod telemetry;
pub mod validation;

pub use telemetry::{
    JsonlMetricsSink, MetricsSink, NullMetricsSink, TelemetryError, TelemetryRecord,
};
pub use validation::{validate_input, ValidationConfig, ValidationError, DEFAULT_MAX_CHARS};
