// Connection state domain model
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    SimulatedConnected,
}

impl ConnectionState {
    /// Simulated connections count as live so consumers don't show an offline banner.
    pub fn is_live(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::SimulatedConnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::SimulatedConnected => "simulated",
        };
        f.write_str(name)
    }
}

/// Why an established transport connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the session; the transport will not retry on its own.
    ServerInitiated,
    ClientInitiated,
    TransportClose,
    TransportError(String),
    PingTimeout,
}

impl DisconnectReason {
    pub fn is_server_initiated(&self) -> bool {
        matches!(self, DisconnectReason::ServerInitiated)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ServerInitiated => f.write_str("io server disconnect"),
            DisconnectReason::ClientInitiated => f.write_str("io client disconnect"),
            DisconnectReason::TransportClose => f.write_str("transport close"),
            DisconnectReason::TransportError(e) => write!(f, "transport error: {}", e),
            DisconnectReason::PingTimeout => f.write_str("ping timeout"),
        }
    }
}
