//! Typed packets and their binary encoding.
//!
//! Every packet is a five byte header (type tag, little-endian payload size)
//! followed by exactly that many payload bytes. Payloads are fixed binary
//! layouts produced by bincode with fixed-width integers; the same encoding
//! is used on the reliable and the datagram channel.

use crate::error::ProtocolError;
use crate::image::Image;
use crate::{HEADER_LEN, MAX_RELIABLE_PAYLOAD};
use bincode::Options;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    IdentityRequest = 1,
    IdentityAssign = 2,
    TextureRequest = 3,
    VehicleUpdate = 4,
    WorldUpdate = 5,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(PacketType::IdentityRequest),
            2 => Ok(PacketType::IdentityAssign),
            3 => Ok(PacketType::TextureRequest),
            4 => Ok(PacketType::VehicleUpdate),
            5 => Ok(PacketType::WorldUpdate),
            other => Err(ProtocolError::malformed(format!(
                "unknown type tag {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    pub payload_size: u32,
}

impl PacketHeader {
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0] = self.packet_type as u8;
        bytes[1..].copy_from_slice(&self.payload_size.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::malformed(format!(
                "header needs {} bytes, got {}",
                HEADER_LEN,
                bytes.len()
            )));
        }

        let packet_type = PacketType::try_from(bytes[0])?;
        let mut size = [0u8; 4];
        size.copy_from_slice(&bytes[1..HEADER_LEN]);

        Ok(Self {
            packet_type,
            payload_size: u32::from_le_bytes(size),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TexturePurpose {
    /// Client asks for (or, during the handshake, offers) a vehicle texture.
    RequestVehicleTexture,
    PostElevation,
    PostTexture,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TexturePacket {
    pub purpose: TexturePurpose,
    /// Vehicle the texture belongs to, 0 when not applicable.
    pub target_id: u32,
    /// `None` means "use the server default".
    pub image: Option<Image>,
}

impl TexturePacket {
    /// Number of payload bytes this packet occupies once encoded
    ///
    /// Used to refuse images up front that the reliable channel would
    /// reject on the receiving side.
    pub fn payload_size(&self) -> u64 {
        encode_options().serialized_size(self).unwrap_or(u64::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleUpdate {
    pub vehicle_id: u32,
    pub rotational_force: f32,
    pub translational_force: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub heading: f32,
}

/// A complete snapshot; the length prefix of `updates` is the vehicle count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldUpdate {
    pub updates: Vec<VehicleState>,
}

impl WorldUpdate {
    pub fn vehicle_count(&self) -> usize {
        self.updates.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    IdentityRequest,
    IdentityAssign { id: u32 },
    Texture(TexturePacket),
    VehicleUpdate(VehicleUpdate),
    WorldUpdate(WorldUpdate),
}

#[derive(Serialize, Deserialize)]
struct IdentityPayload {
    id: u32,
}

fn encode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

fn decode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_RELIABLE_PAYLOAD as u64)
        .reject_trailing_bytes()
}

fn decode_payload<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> Result<T, ProtocolError> {
    decode_options()
        .deserialize(payload)
        .map_err(|e| ProtocolError::malformed(e.to_string()))
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::IdentityRequest => PacketType::IdentityRequest,
            Packet::IdentityAssign { .. } => PacketType::IdentityAssign,
            Packet::Texture(_) => PacketType::TextureRequest,
            Packet::VehicleUpdate(_) => PacketType::VehicleUpdate,
            Packet::WorldUpdate(_) => PacketType::WorldUpdate,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let options = encode_options();
        let payload = match self {
            Packet::IdentityRequest => Ok(Vec::new()),
            Packet::IdentityAssign { id } => options.serialize(&IdentityPayload { id: *id }),
            Packet::Texture(texture) => options.serialize(texture),
            Packet::VehicleUpdate(update) => options.serialize(update),
            Packet::WorldUpdate(update) => options.serialize(update),
        }
        .map_err(|e| ProtocolError::malformed(e.to_string()))?;

        let payload_size = u32::try_from(payload.len()).map_err(|_| ProtocolError::Oversize {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;

        let header = PacketHeader {
            packet_type: self.packet_type(),
            payload_size,
        };

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&header.to_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decodes one whole packet; `bytes` must hold the header and nothing but its payload.
    pub fn decode(bytes: &[u8]) -> Result<Packet, ProtocolError> {
        let header = PacketHeader::from_bytes(bytes)?;
        let payload = &bytes[HEADER_LEN..];

        if header.payload_size as usize != payload.len() {
            return Err(ProtocolError::malformed(format!(
                "header declares {} payload bytes, buffer holds {}",
                header.payload_size,
                payload.len()
            )));
        }

        match header.packet_type {
            PacketType::IdentityRequest => {
                if payload.is_empty() {
                    Ok(Packet::IdentityRequest)
                } else {
                    Err(ProtocolError::malformed("identity request carries a payload"))
                }
            }
            PacketType::IdentityAssign => {
                let identity: IdentityPayload = decode_payload(payload)?;
                Ok(Packet::IdentityAssign { id: identity.id })
            }
            PacketType::TextureRequest => Ok(Packet::Texture(decode_payload(payload)?)),
            PacketType::VehicleUpdate => Ok(Packet::VehicleUpdate(decode_payload(payload)?)),
            PacketType::WorldUpdate => Ok(Packet::WorldUpdate(decode_payload(payload)?)),
        }
    }
}
