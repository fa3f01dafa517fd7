//! Dynamic attribute map and its total extractors.
//!
//! Reconstruction code reads attributes only through the `get_*` methods
//! here. Each takes a key and a default and returns the default when the key
//! is missing or holds a value of another type; none of them panic.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered map of attribute name to dynamic value.
///
/// Values are `serde_json::Value`: string, integer, float, boolean, nested
/// map, list or null. Keys iterate in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Map<String, Value>);

impl Attributes {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert, used by typed records when flattening themselves.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// Borrowed string, or `default` on absence or mismatch.
    pub fn get_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.0.get(key).and_then(Value::as_str).unwrap_or(default)
    }

    /// Owned string, or `default` on absence or mismatch.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get_str(key, default).to_string()
    }

    /// Integer value. Floats with no fractional part are accepted, since
    /// some JSON encoders write `3.0` for `3`.
    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| f as i64)
                })
                .unwrap_or(default),
            _ => default,
        }
    }

    /// Float value; integers widen.
    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.0.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    /// Boolean value. Integers `0`/`1` are accepted because storage layers
    /// without a boolean column kind persist them that way.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => match n.as_i64() {
                Some(0) => false,
                Some(1) => true,
                _ => default,
            },
            _ => default,
        }
    }

    /// Nested map, or an empty map.
    pub fn get_map(&self, key: &str) -> Attributes {
        match self.0.get(key) {
            Some(Value::Object(m)) => Attributes(m.clone()),
            _ => Attributes::new(),
        }
    }

    /// List of values, or an empty list.
    pub fn get_list(&self, key: &str) -> Vec<Value> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// List of strings. Accepts either a JSON array (non-string items are
    /// skipped) or a single string split on `delimiter`, which is how older
    /// records stored lists. Blank pieces are dropped.
    pub fn get_string_list(&self, key: &str, delimiter: char) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) => s
                .split(delimiter)
                .map(str::trim)
                .filter(|piece| !piece.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Timestamp stored as RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC), or
    /// integer epoch seconds. Returns `default` when none of those parse.
    pub fn get_time(&self, key: &str, default: DateTime<Utc>) -> DateTime<Utc> {
        match self.0.get(key) {
            Some(Value::String(s)) => parse_timestamp(s).unwrap_or(default),
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .unwrap_or(default),
            _ => default,
        }
    }
}

impl From<Map<String, Value>> for Attributes {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parse the timestamp formats found in producer data.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    s.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}
