//! Data Transfer Objects
//!
//! Wire shapes exchanged between the relay server, its HTTP clients and the
//! observers connected over WebSocket.

pub mod observer;
pub mod pipeline;
pub mod project;
pub mod trigger;
