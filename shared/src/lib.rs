pub mod error;
pub mod framing;
pub mod image;
pub mod packet;
pub mod vehicle;
pub mod world;

pub use error::{ProtocolError, WorldError};
pub use framing::{decode_datagram, encode_datagram, ReliableChannel};
pub use image::{Image, ImageError};
pub use packet::{
    Packet, PacketHeader, PacketType, TexturePacket, TexturePurpose, VehicleState, VehicleUpdate,
    WorldUpdate,
};
pub use vehicle::{ControlInput, Vehicle};
pub use world::{Surface, World};

pub const DEFAULT_TCP_PORT: u16 = 4000;
pub const DEFAULT_UDP_PORT: u16 = 3000;

/// Bytes in a packet header: one type tag plus a little-endian `u32` payload size.
pub const HEADER_LEN: usize = 5;
/// Largest datagram either side will send or accept.
pub const MAX_DATAGRAM_SIZE: usize = 8192;
/// Largest payload accepted on the reliable channel (textures travel here).
pub const MAX_RELIABLE_PAYLOAD: usize = 4 * 1024 * 1024;
/// Most vehicles a `WorldUpdate` can describe and still fit in one datagram:
/// header, `u64` count, then 16 bytes per vehicle.
pub const MAX_SNAPSHOT_VEHICLES: usize = (MAX_DATAGRAM_SIZE - HEADER_LEN - 8) / 16;

// Surface sampling steps, in world units per pixel.
pub const SURFACE_X_STEP: f32 = 0.5;
pub const SURFACE_Y_STEP: f32 = 0.5;

pub const TRANSLATIONAL_ACCEL: f32 = 8.0;
pub const TRANSLATIONAL_DAMPING: f32 = 0.5;
pub const MAX_TRANSLATIONAL_SPEED: f32 = 10.0;
pub const ROTATIONAL_ACCEL: f32 = 6.0;
pub const ROTATIONAL_DAMPING: f32 = 2.0;
pub const MAX_ROTATIONAL_SPEED: f32 = std::f32::consts::PI;
