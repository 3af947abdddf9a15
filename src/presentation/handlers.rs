// HTTP request handlers
use crate::application::location_channel::Subscription;
use crate::domain::connection::ConnectionState;
use crate::domain::location::Location;
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use chrono::Utc;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub state: ConnectionState,
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub subscribers: usize,
    pub broadcasting: bool,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub sent: bool,
}

/// Coordinates arrive as numbers from scripts and as text from form fields.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Coordinate {
    Number(f64),
    Text(String),
}

impl Coordinate {
    fn text(&self) -> String {
        match self {
            Coordinate::Number(value) => value.to_string(),
            Coordinate::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ManualFix {
    pub latitude: Coordinate,
    pub longitude: Coordinate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    pub is_active: bool,
}

/// Unsubscribes when the SSE stream is dropped.
struct SubscriptionGuard(Subscription);

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn connection_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        state: state.channel.connection_state(),
        connected: state.channel.connection_status(),
        reconnect_attempts: state.channel.reconnect_attempts(),
        subscribers: state.channel.subscriber_count(),
        broadcasting: state.operator_service.state().broadcasting,
    })
}

pub async fn current_location(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Location>, StatusCode> {
    state.channel.current_location().map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Stream every location sample as a server-sent event
pub async fn stream_locations(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Location>();
    let subscription = state.channel.subscribe(move |location| {
        let _ = tx.send(location.clone());
    });
    tracing::debug!(subscriber = ?subscription.id(), "location stream opened");

    let stream = async_stream::stream! {
        let _guard = SubscriptionGuard(subscription);
        while let Some(location) = rx.recv().await {
            yield Event::default().event("location").json_data(&location);
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn publish_location(
    State(state): State<Arc<AppState>>,
    Json(fix): Json<ManualFix>,
) -> Response {
    let parsed = Location::from_text(&fix.latitude.text(), &fix.longitude.text(), Utc::now());
    let location = match parsed {
        Ok(location) => location,
        Err(err) => {
            tracing::warn!("rejected operator location: {}", err);
            let body = serde_json::json!({ "error": err.to_string() });
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();
        }
    };

    send_outcome(state.operator_service.publish(location))
}

pub async fn set_broadcast(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BroadcastRequest>,
) -> Response {
    send_outcome(state.operator_service.set_broadcasting(request.is_active))
}

fn send_outcome(sent: bool) -> Response {
    let status = if sent {
        StatusCode::ACCEPTED
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(SendResponse { sent })).into_response()
}
