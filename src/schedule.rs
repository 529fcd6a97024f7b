//! Hourly control schedule as published by porssari.fi.
//!
//! Example body:
//!
//! ```json
//! {
//!   "Metadata": { "Mac": "A1B2C3D4E5F6", "Channels": "1", "Date": "2023-12-16",
//!                 "Time": "21:26:00", "Timestamp": "1702754760",
//!                 "Timestamp_offset": "7200", "Hours_count": 24 },
//!   "Channel1": { "21": "1", "22": "1", "23": "1", "0": "0", "1": "1" }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{AppError, Result};

/// Channel that drives the spa heater
pub const CONTROL_CHANNEL: &str = "Channel1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Low,
    High,
}

impl Command {
    fn parse(raw: &Value) -> Option<Self> {
        match raw {
            Value::String(s) if s == "0" => Some(Command::Low),
            Value::String(s) if s == "1" => Some(Command::High),
            Value::Number(n) if n.as_u64() == Some(0) => Some(Command::Low),
            Value::Number(n) if n.as_u64() == Some(1) => Some(Command::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Low => "0",
            Command::High => "1",
        }
    }
}

/// Hour of day (0-23) to command
pub type HourMap = BTreeMap<u8, Command>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScheduleMetadata {
    #[serde(rename = "Mac", default)]
    pub mac: Option<String>,
    #[serde(rename = "Date", default)]
    pub date: Option<String>,
    #[serde(rename = "Time", default)]
    pub time: Option<String>,
    #[serde(rename = "Fetch_url", default)]
    pub fetch_url: Option<String>,
    #[serde(rename = "Channels", default, deserialize_with = "flexible_i64")]
    pub channels: Option<i64>,
    #[serde(rename = "Timestamp", default, deserialize_with = "flexible_i64")]
    pub timestamp: Option<i64>,
    #[serde(rename = "Timestamp_offset", default, deserialize_with = "flexible_i64")]
    pub timestamp_offset: Option<i64>,
    #[serde(rename = "Hours_count", default, deserialize_with = "flexible_i64")]
    pub hours_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub metadata: ScheduleMetadata,
    pub channels: BTreeMap<String, HourMap>,
    pub fetched_at: DateTime<Utc>,
}

impl Schedule {
    /// Parse a provider response body. Surrounding whitespace is ignored since the
    /// provider sometimes prepends a stray newline.
    pub fn parse(body: &str, fetched_at: DateTime<Utc>) -> Result<Self> {
        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::Parse("empty schedule body".to_string()));
        }

        let root: Map<String, Value> = match serde_json::from_str::<Value>(body)? {
            Value::Object(map) => map,
            other => {
                return Err(AppError::Parse(format!(
                    "schedule body is not an object: {}",
                    truncate(&other.to_string())
                )))
            }
        };

        let metadata = match root.get("Metadata") {
            Some(value) => ScheduleMetadata::deserialize(value)?,
            None => ScheduleMetadata::default(),
        };

        let mut channels = BTreeMap::new();
        for (key, value) in &root {
            if !key.starts_with("Channel") {
                continue;
            }
            channels.insert(key.clone(), parse_hour_map(key, value)?);
        }

        Ok(Self {
            metadata,
            channels,
            fetched_at,
        })
    }

    /// Command for `hour` on `channel`; hours the provider did not send are low
    pub fn command(&self, channel: &str, hour: u32) -> Command {
        u8::try_from(hour)
            .ok()
            .and_then(|h| self.channels.get(channel)?.get(&h).copied())
            .unwrap_or(Command::Low)
    }

    pub fn hour_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, |hours| hours.len())
    }
}

fn parse_hour_map(channel: &str, value: &Value) -> Result<HourMap> {
    let hours = value
        .as_object()
        .ok_or_else(|| AppError::Parse(format!("{} is not an object", channel)))?;

    let mut map = HourMap::new();
    for (hour, command) in hours {
        let h = hour
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|h| *h < 24)
            .ok_or_else(|| AppError::Parse(format!("{}: invalid hour '{}'", channel, hour)))?;
        let c = Command::parse(command).ok_or_else(|| {
            AppError::Parse(format!(
                "{}: invalid command {} for hour {}",
                channel, command, hour
            ))
        })?;
        map.insert(h, c);
    }
    Ok(map)
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(80) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    String(String),
}

fn flexible_i64<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected a number, got '{}'", s))),
    }
}
