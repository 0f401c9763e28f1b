//! Error types shared by the codec, the framing helpers and the world model.

use crate::packet::PacketType;
use std::io;
use thiserror::Error;

/// Failures while moving packets across either transport.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The bytes do not form a valid packet: bad tag, size mismatch or bad payload.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// A well-formed packet arrived where the exchange expected something else.
    #[error("protocol violation: expected {expected}, got {got:?}")]
    ProtocolViolation {
        expected: &'static str,
        got: PacketType,
    },

    #[error("packet of {size} bytes exceeds the {max} byte ceiling")]
    Oversize { size: usize, max: usize },

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

impl ProtocolError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        ProtocolError::MalformedPacket(reason.into())
    }

    pub fn violation(expected: &'static str, got: PacketType) -> Self {
        ProtocolError::ProtocolViolation { expected, got }
    }
}

/// Contract violations reported by [`crate::World`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WorldError {
    #[error("vehicle {0} is already part of the world")]
    DuplicateId(u32),

    #[error("vehicle {0} is not part of the world")]
    UnknownVehicle(u32),
}
