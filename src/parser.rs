use crate::error::{AppError, Result};
use crate::models::SensorUpdate;
use serde_json::Value;
use tracing::warn;

/// Default failure threshold - fail if more than 10% of lines fail to parse
const DEFAULT_FAILURE_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Default)]
pub struct ParseStats {
    pub total_lines: usize,
    pub parsed_successfully: usize,
    pub parse_failures: usize,
    /// Blank lines, comments and null payloads
    pub skipped_lines: usize,
    pub failure_rate: f64,
}

impl ParseStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finalize(&mut self) {
        let considered = self.total_lines - self.skipped_lines;
        self.failure_rate = if considered > 0 {
            self.parse_failures as f64 / considered as f64
        } else {
            0.0
        };
    }

    pub fn exceeds_threshold(&self, threshold: f64) -> bool {
        self.failure_rate > threshold
    }
}

pub struct Parser;

impl Parser {
    /// Interpret one feed payload.
    ///
    /// A bare number is a soil-moisture reading, an object is a partial
    /// sample and null means "nothing to report".
    pub fn parse_feed_value(value: &Value) -> Result<Option<SensorUpdate>> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_f64()
                .map(|v| Some(SensorUpdate::soil_moisture(v)))
                .ok_or_else(|| AppError::Parse(format!("Unrepresentable reading: {}", n))),
            Value::Object(_) => {
                let update: SensorUpdate = serde_json::from_value(value.clone())?;
                Ok(Some(update))
            }
            other => Err(AppError::Parse(format!(
                "Unsupported feed payload type: {}",
                other
            ))),
        }
    }

    /// Parse a raw feed payload as received over the wire
    pub fn parse_feed_payload(raw: &str) -> Result<Option<SensorUpdate>> {
        let value: Value = serde_json::from_str(raw.trim())?;
        Self::parse_feed_value(&value)
    }

    /// Parse a recorded feed (one payload per line) and return the updates
    /// with parse statistics
    pub fn parse_replay(content: &str) -> Result<(Vec<SensorUpdate>, ParseStats)> {
        Self::parse_replay_with_threshold(content, DEFAULT_FAILURE_THRESHOLD)
    }

    /// Parse a recorded feed with a custom failure threshold
    pub fn parse_replay_with_threshold(
        content: &str,
        failure_threshold: f64,
    ) -> Result<(Vec<SensorUpdate>, ParseStats)> {
        let mut updates = Vec::new();
        let mut stats = ParseStats::new();

        for (line_num, line) in content.lines().enumerate() {
            stats.total_lines += 1;

            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                stats.skipped_lines += 1;
                continue;
            }

            match Self::parse_feed_payload(line) {
                Ok(Some(update)) => {
                    updates.push(update);
                    stats.parsed_successfully += 1;
                }
                Ok(None) => {
                    stats.skipped_lines += 1;
                }
                Err(e) => {
                    stats.parse_failures += 1;
                    warn!(
                        "Failed to parse line {} (failure {}/{}): {} - {}",
                        line_num + 1,
                        stats.parse_failures,
                        stats.total_lines - stats.skipped_lines,
                        e,
                        line
                    );
                }
            }
        }

        stats.finalize();

        if stats.exceeds_threshold(failure_threshold) {
            return Err(AppError::Parse(format!(
                "Parse failure rate {:.1}% exceeds threshold {:.1}%: {} failures out of {} payload lines",
                stats.failure_rate * 100.0,
                failure_threshold * 100.0,
                stats.parse_failures,
                stats.total_lines - stats.skipped_lines
            )));
        }

        Ok((updates, stats))
    }
}
