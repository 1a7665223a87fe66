//! Real-time room chat relay.
//!
//! Connections join a named room, get join/leave notices and a member list,
//! and broadcast text to everyone else in the same room. Each module focuses
//! on one responsibility:
//!
//! - [`registry`] owns the table of joined connections.
//! - [`relay`] reacts to join, message and disconnect events and fans the
//!   results out to the room.
//! - [`transport`] is the room-scoped pub/sub layer the relay emits through;
//!   [`transport::Hub`] is the in-process implementation.
//! - [`clock`] formats message timestamps with a configurable UTC offset.
//! - [`message`] defines the JSON events plus newline framing helpers.
//! - [`server`] exposes the relay over TCP and over WebSocket.
//! - [`cli`] and [`client`] provide the command line and a terminal client.

pub mod cli;
pub mod client;
pub mod clock;
pub mod error;
pub mod message;
pub mod registry;
pub mod relay;
pub mod server;
pub mod transport;
