use shared::{ImageError, ProtocolError, TexturePurpose};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("cannot load vehicle texture: {0}")]
    Texture(#[from] ImageError),

    #[error("expected {expected}, got a {got:?} texture packet")]
    UnexpectedTexture {
        expected: &'static str,
        got: TexturePurpose,
    },

    #[error("server sent no image for the {0}")]
    MissingImage(&'static str),

    #[error("server closed the connection")]
    ServerClosed,

    #[error("datagram socket failed: {0}")]
    Datagram(#[source] io::Error),
}
