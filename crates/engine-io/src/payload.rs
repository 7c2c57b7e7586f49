//! Message payload templating.
//!
//! A template is JSON text with `{name}` placeholders for the reading's
//! fields. Rendering substitutes the values and re-parses the result, so
//! every payload leaving the process is compact, valid JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use engine_core::sink::PublishError;
use engine_core::{tags, DutyPhase, Reading};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_TEMPLATE: &str = r#"[{"timestamp":"{timestamp}","temperature":{temperature},"oil_pressure":{oil_pressure},"revolution":{revolution}}]"#;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("template is missing placeholder {0}")]
    MissingPlaceholder(&'static str),
    #[error("timestamp {0}us cannot be represented")]
    Timestamp(u64),
    #[error("rendered payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl From<PayloadError> for PublishError {
    fn from(err: PayloadError) -> Self {
        PublishError::Fatal(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct PayloadTemplate {
    text: String,
}

impl PayloadTemplate {
    /// Checks that every required placeholder is present and that a sample
    /// reading renders to valid JSON.
    pub fn new(text: impl Into<String>) -> Result<Self, PayloadError> {
        let text = text.into();
        for tag in tags::REQUIRED_PLACEHOLDERS {
            if !text.contains(tag.placeholder) {
                return Err(PayloadError::MissingPlaceholder(tag.placeholder));
            }
        }
        let template = Self { text };
        template.render(&sample_reading())?;
        Ok(template)
    }

    pub fn from_file(path: &Path) -> Result<Self, PayloadError> {
        let text = std::fs::read_to_string(path).map_err(|source| PayloadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(text)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn render(&self, reading: &Reading) -> Result<serde_json::Value, PayloadError> {
        let timestamp = format_timestamp(reading.timestamp_us)
            .ok_or(PayloadError::Timestamp(reading.timestamp_us))?;

        let rendered = self
            .text
            .replace(tags::TIMESTAMP.placeholder, &timestamp)
            .replace(tags::TEMPERATURE_C.placeholder, &reading.temperature.to_string())
            .replace(tags::OIL_PRESSURE_BAR.placeholder, &reading.pressure.to_string())
            .replace(tags::REVOLUTION_RPM.placeholder, &reading.revolution.to_string())
            .replace(tags::TICK.placeholder, &reading.tick.to_string())
            .replace(tags::DUTY_PHASE.placeholder, reading.phase.as_str());

        Ok(serde_json::from_str(&rendered)?)
    }

    /// Rendered payload as a single compact JSON line.
    pub fn render_line(&self, reading: &Reading) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(&self.render(reading)?)?)
    }
}

impl Default for PayloadTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// RFC 3339 UTC timestamp with millisecond precision.
pub fn format_timestamp(unix_us: u64) -> Option<String> {
    let micros = i64::try_from(unix_us).ok()?;
    DateTime::<Utc>::from_timestamp_micros(micros)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn sample_reading() -> Reading {
    Reading {
        tick: 0,
        timestamp_us: 0,
        phase: DutyPhase::WarmupIdle,
        revolution: 0.0,
        pressure: 0.0,
        temperature: 30.0,
    }
}
