// Application layer - Channel state machine and operator use cases
pub mod location_channel;
pub mod operator_service;
pub mod simulator;
pub mod subscribers;
pub mod transport;
