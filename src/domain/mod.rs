//! Domain layer: entities, value objects and the ports the application layer
//! depends on.

pub mod account;
pub mod advance;
pub mod ports;
pub mod transaction;
