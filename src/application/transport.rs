// Transport trait for the reconnecting connection to the location server
use crate::domain::connection::DisconnectReason;
use crate::domain::events::{InboundEvent, OutboundEvent};
use crate::infrastructure::config::ReconnectSettings;
use tokio::sync::mpsc;

/// Lifecycle and inbound traffic reported by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    ConnectError(String),
    Disconnected(DisconnectReason),
    ReconnectAttempt(u32),
    Reconnected(u32),
    ReconnectFailed,
    Inbound(InboundEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkCommand {
    Emit(OutboundEvent),
    /// Dial again after a server-initiated disconnect or an exhausted retry budget.
    Connect,
    Close,
}

/// Channel-facing half of an open transport.
#[derive(Debug)]
pub struct TransportLink {
    pub commands: mpsc::UnboundedSender<LinkCommand>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Transport-facing half of a link.
#[derive(Debug)]
pub struct LinkEnds {
    pub commands: mpsc::UnboundedReceiver<LinkCommand>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportLink {
    pub fn pair() -> (TransportLink, LinkEnds) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            TransportLink {
                commands: command_tx,
                events: event_rx,
            },
            LinkEnds {
                commands: command_rx,
                events: event_tx,
            },
        )
    }
}

impl LinkEnds {
    /// Returns false once the channel side has gone away.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

pub trait Transport: Send + Sync {
    /// Start connecting to `endpoint` in the background. Must be called inside a tokio runtime.
    fn open(&self, endpoint: &str, policy: &ReconnectSettings) -> TransportLink;
}
