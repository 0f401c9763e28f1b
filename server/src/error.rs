use shared::{ImageError, ProtocolError, WorldError};
use std::io;
use thiserror::Error;

/// Startup failures. These are the only errors that end the process.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot load {what}: {source}")]
    Asset {
        what: &'static str,
        #[source]
        source: ImageError,
    },
}

/// Failures confined to a single client session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error("server is full")]
    ServerFull,

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("peer closed the connection during the handshake")]
    ClosedDuringHandshake,
}
