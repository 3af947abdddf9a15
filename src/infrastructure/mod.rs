// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod socket_transport;
pub mod socketio_codec;
