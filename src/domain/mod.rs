// Domain layer - Value types shared by every other layer
pub mod connection;
pub mod events;
pub mod location;
