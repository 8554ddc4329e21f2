//! Extract command.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use console::style;
use serde::Serialize;
use tracing::warn;

use scanlayer::services::{
    validate_input, JsonlMetricsSink, MetricsSink, NullMetricsSink, TelemetryRecord,
};
use scanlayer::{DocumentResult, HybridExtractor, Settings};

use crate::cli::icons::{dim_arrow, error, success};

#[derive(Serialize)]
struct ExtractOutput<'a> {
    file: String,
    method: &'a str,
    latency_ms: u64,
    text: &'a str,
}

fn metrics_sink(settings: &Settings) -> Box<dyn MetricsSink> {
    if settings.telemetry.enabled {
        Box::new(JsonlMetricsSink::new(&settings.telemetry.path))
    } else {
        Box::new(NullMetricsSink)
    }
}

fn record(sink: &dyn MetricsSink, row: TelemetryRecord) {
    if let Err(e) = sink.record(&row) {
        warn!("Failed to record telemetry: {}", e);
    }
}

/// Extract text from a document and print it.
pub async fn cmd_extract(
    settings: &Settings,
    file: &Path,
    json: bool,
    timeout: Option<u64>,
    no_validate: bool,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let extractor = HybridExtractor::from_settings(settings)?;
    let sink = metrics_sink(settings);

    let start = Instant::now();
    let outcome = match timeout {
        Some(secs) => {
            extractor
                .extract_with_timeout(&bytes, Duration::from_secs(secs))
                .await
        }
        None => extractor.extract(&bytes).await,
    };
    let latency_ms = start.elapsed().as_millis() as u64;

    let result: DocumentResult = match outcome {
        Ok(result) => result,
        Err(e) => {
            record(
                sink.as_ref(),
                TelemetryRecord::new("failed")
                    .with_latency_ms(latency_ms)
                    .with_error(e.to_string()),
            );
            return Err(e).with_context(|| format!("Failed to extract {}", file.display()));
        }
    };

    let validation = if no_validate {
        Ok(())
    } else {
        validate_input(&result.full_text, &settings.validation)
    };

    let mut row = TelemetryRecord::new(result.method.as_str()).with_latency_ms(latency_ms);
    if let Err(e) = &validation {
        row = row.with_error(e.to_string());
    }
    record(sink.as_ref(), row);

    if let Err(e) = validation {
        eprintln!("{} {}", error(), e);
        anyhow::bail!("Extracted text from {} was rejected", file.display());
    }

    if json {
        let output = ExtractOutput {
            file: file.display().to_string(),
            method: result.method.as_str(),
            latency_ms,
            text: &result.full_text,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", result.full_text);
        eprintln!(
            "{} Extracted {} chars from {}",
            success(),
            result.full_text.chars().count(),
            style(file.display()).bold()
        );
        eprintln!("  {} Method: {}", dim_arrow(), result.method);
        eprintln!("  {} Took {}ms", dim_arrow(), latency_ms);
    }

    Ok(())
}
