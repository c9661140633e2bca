//! Feature extraction from telemetry records
//!
//! Turns a loosely-structured sensor record into the fixed four-value vector
//! the isolation forest is trained on. This is the only place that decides
//! what counts as usable sensor data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{MlError, Result};

/// A keyed telemetry record as delivered by a gateway.
pub type Record = serde_json::Map<String, Value>;

/// Feature names, in vector order
pub const FEATURE_NAMES: &[&str] = &["latitude", "longitude", "temperature", "humidity"];

/// Number of features extracted
pub const NUM_FEATURES: usize = 4;

/// Extracted feature vector. All values are finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    values: [f64; NUM_FEATURES],
}

impl FeatureVector {
    /// Create a vector, rejecting non-finite values
    pub fn new(values: [f64; NUM_FEATURES]) -> Result<Self> {
        for (name, value) in FEATURE_NAMES.iter().zip(values.iter()) {
            if !value.is_finite() {
                return Err(MlError::InvalidFeatureVector {
                    field: *name,
                    reason: "is not finite",
                });
            }
        }
        Ok(Self { values })
    }

    /// Get feature by name
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|&n| n == name)
            .map(|idx| self.values[idx])
    }

    /// Get feature by axis index
    pub fn axis(&self, idx: usize) -> f64 {
        self.values[idx]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

/// Typed view of the telemetry record schema.
///
/// Only the four environmental fields feed the model; the rest are carried
/// for the benefit of whoever logs or forwards the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub node_id: String,
    pub node_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub temperature: f64,
    pub humidity: f64,
    #[serde(default)]
    pub gas_level: Option<f64>,
    #[serde(default)]
    pub battery_voltage: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl SensorReading {
    /// Convert into the untyped record form the extractor consumes
    pub fn into_record(self) -> Record {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Record::new(),
        }
    }
}

/// Builds feature vectors from records
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the feature vector from a record.
    ///
    /// Fails on the first required field (in `FEATURE_NAMES` order) that is
    /// absent, null, non-numeric or non-finite. Extra fields are ignored.
    pub fn build(&self, record: &Record) -> Result<FeatureVector> {
        let mut values = [0.0; NUM_FEATURES];
        for (slot, &name) in values.iter_mut().zip(FEATURE_NAMES.iter()) {
            *slot = field_value(record, name)?;
        }
        FeatureVector::new(values)
    }

    /// Extract vectors from many records, dropping the invalid ones.
    ///
    /// Returns the valid vectors in input order and the number rejected.
    pub fn build_all(&self, records: &[Record]) -> (Vec<FeatureVector>, usize) {
        let mut vectors = Vec::with_capacity(records.len());
        let mut rejected = 0;
        for record in records {
            match self.build(record) {
                Ok(v) => vectors.push(v),
                Err(_) => rejected += 1,
            }
        }
        (vectors, rejected)
    }
}

fn field_value(record: &Record, name: &'static str) -> Result<f64> {
    let value = match record.get(name) {
        None | Some(Value::Null) => {
            return Err(MlError::InvalidFeatureVector {
                field: name,
                reason: "is missing",
            })
        }
        Some(Value::Number(n)) => n.as_f64(),
        // Some gateways stringify numbers
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(_) => Err(MlError::InvalidFeatureVector {
            field: name,
            reason: "is not finite",
        }),
        None => Err(MlError::InvalidFeatureVector {
            field: name,
            reason: "is not numeric",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_build_complete_record() {
        let rec = record(json!({
            "node_id": "node_001",
            "node_type": "collar",
            "latitude": 27.51,
            "longitude": 90.02,
            "temperature": 22.5,
            "humidity": 61.0,
            "gas_level": null,
            "battery_voltage": 3.9,
            "timestamp": "2024-01-01T00:00:00Z"
        }));

        let v = FeatureExtractor::new().build(&rec).unwrap();
        assert_eq!(v.as_slice(), &[27.51, 90.02, 22.5, 61.0]);
        assert_eq!(v.get("temperature"), Some(22.5));
        assert_eq!(v.get("gas_level"), None);
    }

    #[test]
    fn test_missing_field_is_invalid() {
        let rec = record(json!({"latitude": 1.0, "longitude": 2.0, "temperature": 3.0}));
        match FeatureExtractor::new().build(&rec) {
            Err(MlError::InvalidFeatureVector { field, reason }) => {
                assert_eq!(field, "humidity");
                assert_eq!(reason, "is missing");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_null_and_non_numeric_are_invalid() {
        let extractor = FeatureExtractor::new();
        let rec = record(json!({
            "latitude": null, "longitude": 2.0, "temperature": 3.0, "humidity": 4.0
        }));
        assert!(extractor.build(&rec).is_err());

        let rec = record(json!({
            "latitude": 1.0, "longitude": true, "temperature": 3.0, "humidity": 4.0
        }));
        assert!(extractor.build(&rec).is_err());
    }

    #[test]
    fn test_numeric_strings_accepted_but_not_nan() {
        let extractor = FeatureExtractor::new();
        let rec = record(json!({
            "latitude": "10.5", "longitude": 70.5, "temperature": 25, "humidity": 50
        }));
        assert_eq!(extractor.build(&rec).unwrap().get("latitude"), Some(10.5));

        let rec = record(json!({
            "latitude": "NaN", "longitude": 70.5, "temperature": 25, "humidity": 50
        }));
        match extractor.build(&rec) {
            Err(MlError::InvalidFeatureVector { reason, .. }) => {
                assert_eq!(reason, "is not finite")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_vector_rejects_non_finite() {
        assert!(FeatureVector::new([1.0, f64::INFINITY, 0.0, 0.0]).is_err());
        assert!(FeatureVector::new([1.0, 2.0, 3.0, 4.0]).is_ok());
    }

    #[test]
    fn test_build_all_counts_rejected() {
        let records = vec![
            record(json!({"latitude": 1, "longitude": 2, "temperature": 3, "humidity": 4})),
            record(json!({"latitude": 1})),
            record(json!({"latitude": 5, "longitude": 6, "temperature": 7, "humidity": 8})),
        ];
        let (vectors, rejected) = FeatureExtractor::new().build_all(&records);
        assert_eq!(vectors.len(), 2);
        assert_eq!(rejected, 1);
        assert_eq!(vectors[1].axis(3), 8.0);
    }

    #[test]
    fn test_sensor_reading_into_record() {
        let reading = SensorReading {
            node_id: "node_002".to_string(),
            node_type: "weather_station".to_string(),
            latitude: 27.5,
            longitude: 90.0,
            temperature: 18.0,
            humidity: 75.0,
            gas_level: None,
            battery_voltage: Some(4.1),
            timestamp: None,
        };
        let rec = reading.into_record();
        assert_eq!(rec.get("node_id"), Some(&json!("node_002")));
        assert_eq!(rec.get("gas_level"), Some(&Value::Null));
        assert!(FeatureExtractor::new().build(&rec).is_ok());
    }
}
