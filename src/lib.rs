//! # wirechat
//!
//! Dual-protocol (plain-text and WebSocket) chat server core. A single
//! global broadcast room, three commands (`NICK`, `MSG`, `QUIT`), and nothing
//! else — no channels, no auth, no TLS. See `SPEC_FULL.md` for the full
//! design.

pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod logsink;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod sha1;
pub mod websocket;

pub use config::Config;
pub use error::{Error, Result};
pub use server::Server;

/// Opaque 128-bit connection identifier.
pub type ConnId = u128;
