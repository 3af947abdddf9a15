// Socket.IO over WebSocket transport with automatic reconnection
use crate::application::transport::{
    LinkCommand, LinkEnds, Transport, TransportEvent, TransportLink,
};
use crate::domain::connection::DisconnectReason;
use crate::infrastructure::config::ReconnectSettings;
use crate::infrastructure::socketio_codec::{self as codec, CodecError, Handshake, Packet};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("protocol error: {0}")]
    Codec(#[from] CodecError),
    #[error("server rejected connection: {0}")]
    Rejected(String),
    #[error("connection closed during handshake")]
    HandshakeClosed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SocketIoTransport;

impl Transport for SocketIoTransport {
    fn open(&self, endpoint: &str, policy: &ReconnectSettings) -> TransportLink {
        let (link, ends) = TransportLink::pair();
        let url = socket_url(endpoint);
        tracing::debug!(%url, "opening socket.io transport");
        tokio::spawn(run_link(url, policy.clone(), ends));
        link
    }
}

/// Turn a server address into an Engine.IO websocket URL.
pub fn socket_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    let url = if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        endpoint.to_string()
    } else {
        format!("ws://{}", endpoint)
    };

    if url.contains("/socket.io") {
        if url.contains("EIO=") {
            return url;
        }
        let separator = if url.contains('?') { '&' } else { '?' };
        return format!("{}{}EIO=4&transport=websocket", url, separator);
    }
    format!("{}/socket.io/?EIO=4&transport=websocket", url.trim_end_matches('/'))
}

enum SessionEnd {
    Closed,
    ServerDisconnect,
    Lost(DisconnectReason),
}

async fn run_link(url: String, policy: ReconnectSettings, mut ends: LinkEnds) {
    let mut attempt: u32 = 0;

    loop {
        let outcome = tokio::select! {
            result = tokio::time::timeout(policy.timeout(), dial(&url)) => result,
            _ = closed(&mut ends) => return,
        };

        match outcome {
            Ok(Ok((socket, handshake))) => {
                tracing::debug!(sid = %handshake.sid, "socket.io session open");
                if attempt > 0 {
                    ends.emit(TransportEvent::Reconnected(attempt));
                }
                attempt = 0;
                if !ends.emit(TransportEvent::Connected) {
                    return;
                }

                match drive(socket, &handshake, &mut ends).await {
                    SessionEnd::Closed => return,
                    SessionEnd::ServerDisconnect => {
                        ends.emit(TransportEvent::Disconnected(DisconnectReason::ServerInitiated));
                        if !wait_for_connect(&mut ends).await {
                            return;
                        }
                        continue;
                    }
                    SessionEnd::Lost(reason) => {
                        if !ends.emit(TransportEvent::Disconnected(reason)) {
                            return;
                        }
                    }
                }
            }
            Ok(Err(err)) => {
                if !ends.emit(TransportEvent::ConnectError(err.to_string())) {
                    return;
                }
            }
            Err(_) => {
                let err = TransportError::Timeout(policy.timeout());
                if !ends.emit(TransportEvent::ConnectError(err.to_string())) {
                    return;
                }
            }
        }

        if !policy.enabled || attempt >= policy.max_attempts {
            ends.emit(TransportEvent::ReconnectFailed);
            if !wait_for_connect(&mut ends).await {
                return;
            }
            attempt = 0;
            continue;
        }

        let delay = policy.backoff_delay(attempt, rand::random::<f64>());
        attempt += 1;
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        ends.emit(TransportEvent::ReconnectAttempt(attempt));

        let resumed = tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = closed(&mut ends) => false,
        };
        if !resumed {
            return;
        }
    }
}

async fn dial(url: &str) -> Result<(Socket, Handshake), TransportError> {
    let (mut socket, _response) = connect_async(url).await?;

    let handshake = loop {
        match read_packet(&mut socket).await? {
            Packet::Open(handshake) => break handshake,
            other => tracing::trace!(?other, "ignoring frame before open"),
        }
    };

    socket.send(Message::Text(codec::encode_connect().into())).await?;
    loop {
        match read_packet(&mut socket).await? {
            Packet::Connected => return Ok((socket, handshake)),
            Packet::ConnectError(message) => return Err(TransportError::Rejected(message)),
            Packet::Ping => socket.send(Message::Text(codec::encode_pong().into())).await?,
            other => tracing::trace!(?other, "ignoring frame before connect"),
        }
    }
}

async fn read_packet(socket: &mut Socket) -> Result<Packet, TransportError> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return Ok(codec::decode(&text)?),
            Some(Ok(Message::Close(_))) | None => return Err(TransportError::HandshakeClosed),
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err(err.into()),
        }
    }
}

async fn drive(socket: Socket, handshake: &Handshake, ends: &mut LinkEnds) -> SessionEnd {
    let liveness = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = tokio::time::timeout(liveness, stream.next()) => {
                let message = match frame {
                    Err(_) => return SessionEnd::Lost(DisconnectReason::PingTimeout),
                    Ok(None) => return SessionEnd::Lost(DisconnectReason::TransportClose),
                    Ok(Some(Err(err))) => {
                        return SessionEnd::Lost(DisconnectReason::TransportError(err.to_string()));
                    }
                    Ok(Some(Ok(message))) => message,
                };
                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => return SessionEnd::Lost(DisconnectReason::TransportClose),
                    _ => continue,
                };

                match codec::decode(&text) {
                    Ok(Packet::Ping) => {
                        let pong = Message::Text(codec::encode_pong().into());
                        if let Err(err) = sink.send(pong).await {
                            let reason = DisconnectReason::TransportError(err.to_string());
                            return SessionEnd::Lost(reason);
                        }
                    }
                    Ok(Packet::Event { name, data }) => {
                        match codec::inbound_event(&name, data, Utc::now()) {
                            Ok(Some(event)) => {
                                if !ends.emit(TransportEvent::Inbound(event)) {
                                    return SessionEnd::Closed;
                                }
                            }
                            Ok(None) => {
                                tracing::trace!(event = %name, "ignoring unhandled event")
                            }
                            Err(err) => {
                                tracing::warn!(event = %name, "discarding malformed event: {}", err)
                            }
                        }
                    }
                    Ok(Packet::Disconnect) => return SessionEnd::ServerDisconnect,
                    Ok(Packet::Close) => return SessionEnd::Lost(DisconnectReason::TransportClose),
                    Ok(other) => tracing::trace!(?other, "ignoring frame"),
                    Err(err) => tracing::warn!(frame = %text, "undecodable frame: {}", err),
                }
            }
            command = ends.commands.recv() => match command {
                Some(LinkCommand::Emit(event)) => {
                    let frame = match codec::encode_event(&event) {
                        Ok(frame) => frame,
                        Err(err) => {
                            tracing::warn!(event = event.name(), "failed to encode event: {}", err);
                            continue;
                        }
                    };
                    if let Err(err) = sink.send(Message::Text(frame)).await {
                        return SessionEnd::Lost(DisconnectReason::TransportError(err.to_string()));
                    }
                }
                Some(LinkCommand::Connect) => {}
                Some(LinkCommand::Close) | None => {
                    let _ = sink.send(Message::Text(codec::encode_disconnect().into())).await;
                    let _ = sink.close().await;
                    ends.emit(TransportEvent::Disconnected(DisconnectReason::ClientInitiated));
                    return SessionEnd::Closed;
                }
            }
        }
    }
}

/// Resolves once the channel asks to close or goes away.
async fn closed(ends: &mut LinkEnds) {
    loop {
        match ends.commands.recv().await {
            Some(LinkCommand::Close) | None => return,
            Some(LinkCommand::Emit(event)) => {
                tracing::debug!(event = event.name(), "offline, dropping event");
            }
            Some(LinkCommand::Connect) => {}
        }
    }
}

/// Idle until the channel asks to dial again. Returns false on close.
async fn wait_for_connect(ends: &mut LinkEnds) -> bool {
    loop {
        match ends.commands.recv().await {
            Some(LinkCommand::Connect) => return true,
            Some(LinkCommand::Close) | None => return false,
            Some(LinkCommand::Emit(event)) => {
                tracing::debug!(event = event.name(), "offline, dropping event");
            }
        }
    }
}
