//! Loosely structured remote records.
//!
//! Remote payloads are JSON objects whose shape varies by uploader. A
//! [`Record`] keeps the (projected) object as-is and adds the parsed
//! ordering key so it can live in a [`BoundedCache`](nightlight_cache::BoundedCache).

use nightlight_cache::Timestamped;
use nightlight_client::ShareGlucose;
use serde_json::{Map, Value};

use crate::time::parse_timestamp;

/// A remote record with its ordering key in epoch milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    timestamp: i64,
    fields: Map<String, Value>,
}

impl Record {
    /// Wrap a field map with an already known ordering key.
    pub fn new(timestamp: i64, fields: Map<String, Value>) -> Self {
        Self { timestamp, fields }
    }

    /// Build a record from a JSON object.
    ///
    /// `keep` projects the object down to the listed fields. Returns `None`
    /// when the value is not an object or `ordering_key` is missing or
    /// unparseable.
    pub fn from_json(value: Value, ordering_key: &str, keep: Option<&[&str]>) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        let timestamp = parse_timestamp(fields.get(ordering_key)?)?;
        if let Some(keep) = keep {
            fields.retain(|k, _| keep.contains(&k.as_str()));
        }
        Some(Self { timestamp, fields })
    }

    /// Normalize a vendor glucose reading into the Nightscout SGV shape.
    pub fn from_share(glucose: ShareGlucose) -> Self {
        let mut fields = Map::new();
        fields.insert("date".into(), Value::from(glucose.date));
        fields.insert("sgv".into(), Value::from(glucose.sgv));
        fields.insert("trend".into(), glucose.trend);
        Self {
            timestamp: glucose.date,
            fields,
        }
    }

    /// Ordering key in epoch milliseconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    /// A numeric field, accepting numeric strings.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(number_value)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// A timestamp-valued field in epoch milliseconds.
    pub fn time(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(parse_timestamp)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl Timestamped for Record {
    fn timestamp_ms(&self) -> i64 {
        self.timestamp
    }
}

/// Interpret a JSON value as a finite number.
pub fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

/// Project a page of raw records, dropping any without a usable ordering key.
pub fn project(values: Vec<Value>, ordering_key: &str, keep: Option<&[&str]>) -> Vec<Record> {
    let total = values.len();
    let records: Vec<Record> = values
        .into_iter()
        .filter_map(|v| Record::from_json(v, ordering_key, keep))
        .collect();
    if records.len() < total {
        tracing::debug!(
            dropped = total - records.len(),
            ordering_key,
            "Dropped records without an ordering key"
        );
    }
    records
}
