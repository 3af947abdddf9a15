// Presentation layer - HTTP surface for map and operator clients
pub mod app_state;
pub mod handlers;
