//! Duration parsing utilities.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

use crate::error::{Error, Result};

/// Parse a duration string like "1h", "30m", "300s", "500ms" or "300".
/// Supports:
/// - Plain numbers (interpreted as seconds): "300"
/// - Milliseconds suffix: "500ms"
/// - Seconds suffix: "300s"
/// - Minutes suffix: "30m"
/// - Hours suffix: "1h"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidConfig("empty duration string".to_string()));
    }

    let parse = |num_str: &str, unit: &str| -> Result<u64> {
        num_str
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("invalid {unit} value: {num_str}")))
    };
    let scaled = |num_str: &str, unit: &str, factor: u64| -> Result<u64> {
        parse(num_str, unit)?
            .checked_mul(factor)
            .ok_or_else(|| Error::InvalidConfig(format!("duration out of range: {s}")))
    };

    // "ms" must be checked before "m" and "s"
    if let Some(num_str) = s.strip_suffix("ms") {
        return Ok(Duration::from_millis(parse(num_str, "milliseconds")?));
    }
    if let Some(num_str) = s.strip_suffix('h') {
        return Ok(Duration::from_secs(scaled(num_str, "hours", 3600)?));
    }
    if let Some(num_str) = s.strip_suffix('m') {
        return Ok(Duration::from_secs(scaled(num_str, "minutes", 60)?));
    }
    if let Some(num_str) = s.strip_suffix('s') {
        return Ok(Duration::from_secs(parse(num_str, "seconds")?));
    }

    // No suffix - treat as seconds
    Ok(Duration::from_secs(parse(s, "duration")?))
}

/// Renders a duration in the most compact form `parse_duration` accepts.
pub fn format_duration(d: Duration) -> String {
    if d.subsec_millis() != 0 || d.as_secs() == 0 {
        return format!("{}ms", d.as_millis());
    }
    let secs = d.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// `#[serde(with = "crate::duration")]` support for human-readable durations.
pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_duration(*d))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
