//! Tolerant field readers for records that come back from the local cache or
//! the remote tables. Older edit forms stored numbers as strings and some
//! snapshots carried half-filled objects, so every reader here accepts the
//! shapes that were written in practice and falls back to a default instead
//! of failing the whole record.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

pub fn int_value(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => {
            let t = s.trim();
            t.parse::<i64>().ok().or_else(|| {
                t.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

/// Leading integer of a text cell, as spreadsheet exports write it:
/// `"85.5"` and `"85 marks"` read as 85, text without leading digits as
/// `None`. Digit runs beyond the i64 range saturate.
pub fn leading_int(s: &str) -> Option<i64> {
    let t = s.trim_start();
    let digits_from = usize::from(t.starts_with(['-', '+']));
    let end = t[digits_from..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(t.len(), |i| i + digits_from);
    if end == digits_from {
        return None;
    }
    // Only an overflowing digit run fails to parse here.
    Some(t[..end].parse().unwrap_or(if t.starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    }))
}

pub fn string<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

pub fn int<'de, D>(d: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(int_value(&Value::deserialize(d)?).unwrap_or(0))
}

pub fn opt_int<'de, D>(d: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(int_value(&Value::deserialize(d)?))
}

/// Unknown or missing status strings read as the type's default.
pub fn status<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
{
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s.trim().to_ascii_lowercase().parse().unwrap_or_default(),
        _ => T::default(),
    })
}

/// Arrays of objects; anything else reads as empty. Elements that are not
/// objects are not records and are skipped.
pub fn seq<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter(|v| v.is_object())
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        _ => Vec::new(),
    })
}

pub fn opt_object<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(d)? {
        v @ Value::Object(_) => serde_json::from_value(v).ok(),
        _ => None,
    })
}
