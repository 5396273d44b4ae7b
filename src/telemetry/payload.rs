//! Wire format of `POST /api/data/ingest`.
//!
//! Field names follow the device firmware. Status flags arrive as `0`/`1`,
//! booleans or their string forms; timestamps as RFC 3339, a naive
//! `YYYY-MM-DD HH:MM:SS` (read as UTC) or Unix seconds.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer};
use utoipa::ToSchema;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct IngestPayload {
    pub device_id: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub soil1: Option<f64>,
    pub soil2: Option<f64>,
    pub soil3: Option<f64>,
    #[serde(rename = "lowLevel", default, deserialize_with = "flag")]
    pub low_level: bool,
    #[serde(rename = "highLevel", default, deserialize_with = "flag")]
    pub high_level: bool,
    #[serde(default, deserialize_with = "flag")]
    pub valve: bool,
    #[serde(default, deserialize_with = "flag")]
    pub pump: bool,
    #[schema(value_type = Option<String>)]
    pub timestamp: Option<TimestampInput>,
    #[serde(default)]
    pub resource_consumption: Vec<ResourcePayload>,
    /// Five-minute rollup computed on the device. Accepted, not stored.
    #[schema(value_type = Option<Object>)]
    pub total_resources_last_5min: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ResourcePayload {
    /// `0` means nothing was consumed and the entry is skipped.
    pub resource_id: i64,
    pub device_id: Option<String>,
    #[schema(value_type = Option<String>)]
    pub timestamp: Option<TimestampInput>,
    #[serde(default)]
    pub pump_runtime_sec: i64,
    #[serde(default)]
    pub valve_runtime_sec: i64,
    #[serde(default)]
    pub water_consumed_liters: f64,
    #[serde(default)]
    pub energy_consumed_kwh: f64,
    #[serde(default, deserialize_with = "flag")]
    pub pump_state: bool,
    #[serde(default, deserialize_with = "flag")]
    pub valve_state: bool,
}

/// The three soil channels and temperature, once checked to be present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequiredFields {
    pub temperature: f64,
    pub soil: [f64; 3],
}

impl IngestPayload {
    pub fn required(&self) -> Result<RequiredFields> {
        let missing: Vec<&str> = [
            ("temperature", self.temperature),
            ("soil1", self.soil1),
            ("soil2", self.soil2),
            ("soil3", self.soil3),
        ]
        .iter()
        .filter(|(_, v)| v.is_none())
        .map(|(name, _)| *name)
        .collect();

        match (self.temperature, self.soil1, self.soil2, self.soil3) {
            (Some(temperature), Some(s1), Some(s2), Some(s3)) => Ok(RequiredFields {
                temperature,
                soil: [s1, s2, s3],
            }),
            _ => Err(Error::invalid(format!(
                "missing required fields: {}",
                missing.join(", ")
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TimestampInput {
    Unix(i64),
    Text(String),
}

impl TimestampInput {
    pub fn parse(&self) -> Result<DateTime<Utc>> {
        match self {
            TimestampInput::Unix(secs) => DateTime::from_timestamp(*secs, 0)
                .ok_or_else(|| Error::invalid(format!("timestamp out of range: {secs}"))),
            TimestampInput::Text(s) => DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .or_else(|_| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|n| n.and_utc())
                })
                .map_err(|_| Error::invalid(format!("unrecognised timestamp: {s:?}"))),
        }
    }
}

fn flag<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(d)? {
        Raw::Bool(b) => Ok(b),
        Raw::Int(i) => Ok(i != 0),
        Raw::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" => Ok(true),
            "0" | "false" | "off" | "" => Ok(false),
            other => Err(de::Error::custom(format!("invalid flag: {other:?}"))),
        },
    }
}
