// Operator service - Use case for publishing the vehicle's own position
use crate::application::location_channel::LocationChannel;
use crate::domain::location::Location;
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperatorState {
    pub broadcasting: bool,
    pub last_fix: Option<Location>,
}

#[derive(Clone)]
pub struct OperatorService {
    channel: LocationChannel,
    state: Arc<Mutex<OperatorState>>,
}

impl OperatorService {
    pub fn new(channel: LocationChannel) -> Self {
        Self {
            channel,
            state: Arc::new(Mutex::new(OperatorState::default())),
        }
    }

    pub fn state(&self) -> OperatorState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Publish a manually entered fix, tagged with the current broadcasting flag.
    /// The fix is remembered even when the channel is offline so it can be republished.
    pub fn publish(&self, location: Location) -> bool {
        let location = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let location = location.with_broadcasting(state.broadcasting);
            state.last_fix = Some(location.clone());
            location
        };
        let sent = self.channel.send_location(&location);
        tracing::info!(
            latitude = location.latitude,
            longitude = location.longitude,
            sent,
            "operator location published"
        );
        sent
    }

    pub fn set_broadcasting(&self, active: bool) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).broadcasting = active;
        let sent = self.channel.send_broadcast_status(active);
        tracing::info!(active, sent, "operator broadcasting toggled");
        sent
    }

    /// Resend the last fix with a fresh timestamp. Returns false when there is
    /// nothing to send, broadcasting is off, or the channel is offline.
    pub fn republish(&self) -> bool {
        let fix = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.broadcasting {
                return false;
            }
            match &state.last_fix {
                Some(fix) => Location {
                    timestamp: Utc::now(),
                    ..fix.clone()
                },
                None => return false,
            }
        };
        self.channel.send_location(&fix)
    }

    pub async fn run_auto_publish(self, every: Duration) {
        tracing::info!(interval_secs = every.as_secs(), "automatic republishing enabled");
        let mut ticker = tokio::time::interval(every);
        // the first tick fires immediately; nothing has been entered yet
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if self.republish() {
                tracing::debug!("operator location republished");
            }
        }
    }
}
