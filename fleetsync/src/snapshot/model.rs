//! Snapshot data types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a tracked unit.
///
/// Sources use both numeric and textual ids, so the id is kept as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    /// Create a unit id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UnitId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for UnitId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// WGS84 position with optional altitude in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in meters, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl Position {
    /// Create a position without altitude.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
        }
    }

    /// Set the altitude.
    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    /// Check that the coordinates are finite and within WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Value of a named unit attribute (ignition, battery level, driver...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Number(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

/// Immutable state of one unit at one point in source time.
///
/// Optional fields are "not reported" rather than "cleared": a partial record
/// (say, an attribute-only push) leaves the other fields to whatever the
/// cached snapshot already holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    /// Unit this snapshot describes.
    pub unit_id: UnitId,
    /// Last known position.
    pub position: Option<Position>,
    /// Heading in degrees, normalized to `[0, 360)`.
    pub heading: Option<f64>,
    /// Speed in source units (usually knots).
    pub speed: Option<f64>,
    /// Named attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Time the source produced this state. Drives merge ordering.
    pub source_time: DateTime<Utc>,
    /// Time this process received it.
    pub received_at: DateTime<Utc>,
}

impl UnitSnapshot {
    /// Create an empty snapshot for a unit at the given source time.
    ///
    /// The receipt timestamp is set to now.
    pub fn new(unit_id: impl Into<UnitId>, source_time: DateTime<Utc>) -> Self {
        Self {
            unit_id: unit_id.into(),
            position: None,
            heading: None,
            speed: None,
            attributes: BTreeMap::new(),
            source_time,
            received_at: Utc::now(),
        }
    }

    /// Set the position.
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Set the heading (normalized to `[0, 360)`).
    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading.rem_euclid(360.0));
        self
    }

    /// Set the speed.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Add or replace an attribute.
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the local receipt timestamp.
    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    /// Field-wise equality ignoring the receipt timestamp.
    ///
    /// Two deliveries of the same source state (for example once via push and
    /// once via the poll fallback) compare equal here even though they were
    /// received at different times.
    pub fn same_state(&self, other: &UnitSnapshot) -> bool {
        self.unit_id == other.unit_id
            && self.position == other.position
            && self.heading == other.heading
            && self.speed == other.speed
            && self.attributes == other.attributes
            && self.source_time == other.source_time
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
    fn test_unit_id_conversions() {
        assert_eq!(UnitId::from(42u64).as_str(), "42");
        assert_eq!(UnitId::from("truck-1").to_string(), "truck-1");
        assert_eq!(UnitId::new(String::from("a")), UnitId::from("a"));
    }

    #[test]
    fn test_position_validity() {
        assert!(Position::new(53.5, 9.9).is_valid());
        assert!(Position::new(-90.0, 180.0).is_valid());
        assert!(!Position::new(90.5, 0.0).is_valid());
        assert!(!Position::new(0.0, -180.1).is_valid());
        assert!(!Position::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_heading_is_normalized() {
        let snap = UnitSnapshot::new("u", t0()).with_heading(-90.0);
        assert_eq!(snap.heading, Some(270.0));

        let snap = UnitSnapshot::new("u", t0()).with_heading(720.0);
        assert_eq!(snap.heading, Some(0.0));
    }

    #[test]
    fn test_same_state_ignores_receipt_time() {
        let a = UnitSnapshot::new("u", t0())
            .with_speed(10.0)
            .with_received_at(t0());
        let b = a
            .clone()
            .with_received_at(t0() + chrono::Duration::seconds(5));

        assert_ne!(a, b);
        assert!(a.same_state(&b));
    }

    #[test]
    fn test_same_state_detects_field_change() {
        let a = UnitSnapshot::new("u", t0()).with_speed(10.0);
        let b = a.clone().with_speed(11.0);
        assert!(!a.same_state(&b));

        let c = a.clone().with_attribute("ignition", true);
        assert!(!a.same_state(&c));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snap = UnitSnapshot::new(7u64, t0())
            .with_position(Position::new(1.0, 2.0))
            .with_attribute("driver", "kim");
        let json = serde_json::to_value(&snap).unwrap();

        assert_eq!(json["unit_id"], "7");
        assert_eq!(json["position"]["latitude"], 1.0);
        assert!(json["position"].get("altitude").is_none());
        assert_eq!(json["attributes"]["driver"], "kim");

        let back: UnitSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snap);
    }
}
