// Location domain model
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LocationError {
    #[error("missing {0}")]
    MissingCoordinate(&'static str),
    #[error("{field} is not a number: {value:?}")]
    NotANumber { field: &'static str, value: String },
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// A single vehicle position sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawLocation")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_broadcasting: Option<bool>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub demo: bool,
}

impl Location {
    pub fn new(
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, LocationError> {
        check_range("latitude", latitude, 90.0)?;
        check_range("longitude", longitude, 180.0)?;
        Ok(Self {
            latitude,
            longitude,
            timestamp,
            accuracy: None,
            is_broadcasting: None,
            demo: false,
        })
    }

    /// Parse coordinates typed by an operator (or replayed from a saved form).
    pub fn from_text(
        latitude: &str,
        longitude: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, LocationError> {
        let latitude = parse_coordinate("latitude", latitude)?;
        let longitude = parse_coordinate("longitude", longitude)?;
        Self::new(latitude, longitude, timestamp)
    }

    pub fn simulated(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
            accuracy: None,
            is_broadcasting: None,
            demo: true,
        }
    }

    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.accuracy = Some(meters);
        self
    }

    pub fn with_broadcasting(mut self, broadcasting: bool) -> Self {
        self.is_broadcasting = Some(broadcasting);
        self
    }

    pub fn is_valid(&self) -> bool {
        check_range("latitude", self.latitude, 90.0).is_ok()
            && check_range("longitude", self.longitude, 180.0).is_ok()
    }
}

fn check_range(field: &'static str, value: f64, limit: f64) -> Result<(), LocationError> {
    if !value.is_finite() || value.abs() > limit {
        return Err(LocationError::OutOfRange { field, value });
    }
    Ok(())
}

fn parse_coordinate(field: &'static str, text: &str) -> Result<f64, LocationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(LocationError::MissingCoordinate(field));
    }
    trimmed.parse::<f64>().map_err(|_| LocationError::NotANumber {
        field,
        value: text.to_string(),
    })
}

/// Timestamps arrive either as epoch milliseconds or as RFC 3339 text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(i64),
    Fractional(f64),
    Text(String),
}

impl WireTimestamp {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            WireTimestamp::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            WireTimestamp::Fractional(ms) if ms.is_finite() => {
                Utc.timestamp_millis_opt(*ms as i64).single()
            }
            WireTimestamp::Fractional(_) => None,
            WireTimestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

/// Location payload as it appears on the wire, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<WireTimestamp>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub is_broadcasting: Option<bool>,
    #[serde(default)]
    pub demo: bool,
}

impl RawLocation {
    /// A missing or unreadable timestamp is replaced by `arrival`.
    pub fn into_location(self, arrival: DateTime<Utc>) -> Result<Location, LocationError> {
        let latitude = self.latitude.ok_or(LocationError::MissingCoordinate("latitude"))?;
        let longitude = self.longitude.ok_or(LocationError::MissingCoordinate("longitude"))?;
        let timestamp = self
            .timestamp
            .as_ref()
            .and_then(WireTimestamp::to_datetime)
            .unwrap_or(arrival);

        let mut location = Location::new(latitude, longitude, timestamp)?;
        location.accuracy = self.accuracy;
        location.is_broadcasting = self.is_broadcasting;
        location.demo = self.demo;
        Ok(location)
    }
}

impl TryFrom<RawLocation> for Location {
    type Error = LocationError;

    fn try_from(raw: RawLocation) -> Result<Self, Self::Error> {
        raw.into_location(Utc::now())
    }
}
