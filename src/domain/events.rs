// Events exchanged with the location server
use super::location::Location;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const LOCATION_EVENT: &str = "location";
pub const UPDATE_LOCATION_EVENT: &str = "updateLocation";
pub const BROADCAST_STATUS_EVENT: &str = "broadcastStatus";

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Location(Location),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    UpdateLocation(Location),
    BroadcastStatus { is_active: bool },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateLocationPayload {
    latitude: f64,
    longitude: f64,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_broadcasting: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastStatusPayload {
    is_active: bool,
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::UpdateLocation(_) => UPDATE_LOCATION_EVENT,
            OutboundEvent::BroadcastStatus { .. } => BROADCAST_STATUS_EVENT,
        }
    }

    pub fn payload(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            OutboundEvent::UpdateLocation(location) => serde_json::to_value(UpdateLocationPayload {
                latitude: location.latitude,
                longitude: location.longitude,
                timestamp: location.timestamp,
                is_broadcasting: location.is_broadcasting,
            }),
            OutboundEvent::BroadcastStatus { is_active } => {
                serde_json::to_value(BroadcastStatusPayload { is_active: *is_active })
            }
        }
    }
}
