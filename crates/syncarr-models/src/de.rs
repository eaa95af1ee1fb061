//! Lenient decoders for catalog payloads.
//!
//! The catalog is inconsistent about scalar shapes: keys arrive as strings or
//! integers, ratings as numbers, strings or arrays of rating objects, guids as a
//! bare string, a single object or an array. Everything here goes through
//! `serde_json::Value` first and picks the shape apart by hand.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub(crate) fn rating_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(items) => items.first().and_then(rating_from_value),
        Value::Object(map) => map.get("value").and_then(rating_from_value),
        _ => None,
    }
}

/// `rating`, `audienceRating` and `userRating`.
pub fn flexible_rating<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(rating_from_value))
}

pub fn flexible_guids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let mut guids = Vec::new();
    if let Some(value) = value {
        collect_guids(&value, &mut guids);
    }
    Ok(guids)
}

fn collect_guids(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.is_empty() => out.push(s.clone()),
        Value::Object(map) => {
            if let Some(id) = map.get("id").and_then(|v| v.as_str()) {
                out.push(id.to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_guids(item, out)),
        _ => {}
    }
}

/// Unix seconds to a UTC timestamp. Zero and missing values mean "never".
pub fn unix_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let secs = match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    Ok(secs
        .filter(|secs| *secs > 0)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single()))
}

/// Integers that sometimes arrive quoted.
pub fn flexible_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

pub fn flexible_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

pub fn flexible_opt_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().and_then(|n| i32::try_from(n).ok()).filter(|y| *y != 0),
        Some(Value::String(s)) => s.trim().parse().ok().filter(|y: &i32| *y != 0),
        _ => None,
    })
}

/// Strings that may be absent or null.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}
