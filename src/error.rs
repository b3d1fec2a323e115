//! # Error taxonomy
//!
//! Mirrors the propagation policy: `Transport` and `Handshake` are fatal to a
//! connection and bubble out of the read loop. Everything else is
//! constructed, logged, and contained at the scope that detected it — it
//! never reaches this type.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("handshake error: {0}")]
    Handshake(String),

    #[error("frame error: {0}")]
    Frame(String),

    #[error("log error: {0}")]
    Log(String),
}

pub type Result<T> = std::result::Result<T, Error>;
