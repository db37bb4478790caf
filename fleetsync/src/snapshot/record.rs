//! Raw records as delivered by the push and pull sources.
//!
//! Sources are transport-agnostic: anything that can produce a [`RawRecord`]
//! (JSON over a websocket, a polled REST response, a test fixture) can feed
//! the repository. Validation happens once, in [`RawRecord::into_snapshot`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{AttributeValue, Position, UnitId, UnitSnapshot};
use crate::error::RecordError;

/// Unvalidated position/attribute record for one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, alias = "id")]
    pub unit_id: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub source_time: Option<DateTime<Utc>>,
}

impl RawRecord {
    /// Start a record for a unit at a source time.
    pub fn new(unit_id: impl Into<String>, source_time: DateTime<Utc>) -> Self {
        Self {
            unit_id: Some(unit_id.into()),
            source_time: Some(source_time),
            ..Default::default()
        }
    }

    /// Set latitude and longitude.
    pub fn at(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Set the speed.
    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Set the heading.
    pub fn heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    /// Add an attribute.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Decode a single record from JSON.
    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decode a JSON array of records.
    ///
    /// Each element is decoded on its own, so one malformed element does not
    /// poison the rest of the batch. Fails only if the input is not an array.
    pub fn batch_from_json(json: &str) -> Result<Vec<Result<Self, RecordError>>, RecordError> {
        let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
        Ok(values
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(RecordError::from))
            .collect())
    }

    /// Validate the record and build a snapshot received at `received_at`.
    ///
    /// Non-finite heading or speed values are treated as unreported rather
    /// than rejecting the whole record.
    pub fn into_snapshot(self, received_at: DateTime<Utc>) -> Result<UnitSnapshot, RecordError> {
        let unit_id = match self.unit_id {
            Some(id) if !id.trim().is_empty() => UnitId::new(id.trim()),
            _ => return Err(RecordError::MissingId),
        };

        let Some(source_time) = self.source_time else {
            return Err(RecordError::MissingTimestamp { unit: unit_id });
        };

        let position = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => {
                let mut position = Position::new(lat, lon);
                position.altitude = self.altitude.filter(|a| a.is_finite());
                if !position.is_valid() {
                    return Err(RecordError::InvalidPosition {
                        unit: unit_id,
                        lat,
                        lon,
                    });
                }
                Some(position)
            }
            (None, None) => None,
            _ => return Err(RecordError::IncompletePosition { unit: unit_id }),
        };

        Ok(UnitSnapshot {
            unit_id,
            position,
            heading: self
                .heading
                .filter(|h| h.is_finite())
                .map(|h| h.rem_euclid(360.0)),
            speed: self.speed.filter(|s| s.is_finite()),
            attributes: self.attributes,
            source_time,
            received_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_valid_record_converts() {
        let snap = RawRecord::new("42", t0())
            .at(53.55, 9.99)
            .speed(12.0)
            .heading(370.0)
            .attribute("ignition", true)
            .into_snapshot(t0())
            .unwrap();

        assert_eq!(snap.unit_id, UnitId::from(42u64));
        assert_eq!(snap.position, Some(Position::new(53.55, 9.99)));
        assert_eq!(snap.heading, Some(10.0));
        assert_eq!(snap.speed, Some(12.0));
        assert_eq!(snap.received_at, t0());
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let mut record = RawRecord::new("x", t0());
        record.unit_id = None;
        assert_eq!(record.into_snapshot(t0()), Err(RecordError::MissingId));

        let record = RawRecord::new("   ", t0());
        assert_eq!(record.into_snapshot(t0()), Err(RecordError::MissingId));
    }

    #[test]
    fn test_missing_timestamp_is_rejected() {
        let mut record = RawRecord::new("7", t0());
        record.source_time = None;
        assert!(matches!(
            record.into_snapshot(t0()),
            Err(RecordError::MissingTimestamp { .. })
        ));
    }

    #[test]
    fn test_out_of_range_position_is_rejected() {
        let record = RawRecord::new("7", t0()).at(123.0, 0.0);
        assert!(matches!(
            record.into_snapshot(t0()),
            Err(RecordError::InvalidPosition { .. })
        ));
    }

    #[test]
    fn test_half_position_is_rejected() {
        let mut record = RawRecord::new("7", t0());
        record.latitude = Some(10.0);
        assert!(matches!(
            record.into_snapshot(t0()),
            Err(RecordError::IncompletePosition { .. })
        ));
    }

    #[test]
    fn test_attribute_only_record_is_valid() {
        let snap = RawRecord::new("7", t0())
            .attribute("battery", 0.8)
            .into_snapshot(t0())
            .unwrap();
        assert!(snap.position.is_none());
        assert_eq!(snap.attributes.len(), 1);
    }

    #[test]
    fn test_non_finite_speed_is_dropped() {
        let snap = RawRecord::new("7", t0())
            .speed(f64::NAN)
            .into_snapshot(t0())
            .unwrap();
        assert!(snap.speed.is_none());
    }

    #[test]
    fn test_from_json_with_id_alias() {
        let record = RawRecord::from_json(
            r#"{"id":"9","latitude":1.5,"longitude":2.5,"source_time":"2025-06-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(record.unit_id.as_deref(), Some("9"));

        let snap = record.into_snapshot(t0()).unwrap();
        assert_eq!(snap.source_time, t0());
    }

    #[test]
    fn test_batch_isolates_bad_elements() {
        let json = r#"[
            {"unit_id":"1","source_time":"2025-06-01T12:00:00Z"},
            {"unit_id":"2","latitude":"north"},
            {"unit_id":"3","source_time":"2025-06-01T12:00:01Z"}
        ]"#;
        let batch = RawRecord::batch_from_json(json).unwrap();

        assert_eq!(batch.len(), 3);
        assert!(batch[0].is_ok());
        assert!(batch[1].is_err());
        assert!(batch[2].is_ok());
    }

    #[test]
    fn test_batch_requires_array() {
        assert!(RawRecord::batch_from_json(r#"{"unit_id":"1"}"#).is_err());
    }
}
