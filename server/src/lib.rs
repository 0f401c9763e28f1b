//! # Vehicle Sync Server Library
//!
//! This library provides the authoritative server for the shared vehicle
//! world. It owns the canonical world, admits clients through a reliable
//! handshake, applies their driving inputs and sends the resulting world
//! snapshots back over datagrams.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server runs the only real copy of the world. Clients send control
//! forces, never positions, and render whatever the snapshots say.
//!
//! ### Client Admission
//! Every client connects over the reliable channel first:
//! - It asks for an identity and is assigned a fresh id
//! - It asks for a vehicle texture, optionally providing its own
//! - It receives the surface elevation, the surface texture and its vehicle texture
//!
//! Only then does its vehicle appear in the world. The connection stays open
//! for the lifetime of the vehicle; closing it removes the vehicle.
//!
//! ### Realtime Sync
//! Each `VehicleUpdate` datagram applies one vehicle's input, ticks the whole
//! world once and broadcasts the snapshot to every client whose datagram
//! address is known.
//!
//! ## Architecture Design
//!
//! ### Task Per Connection
//! Each reliable connection is served by its own tokio task, so a slow or
//! stalled peer never holds up anyone else. Handshakes are capped and bounded
//! by a timeout.
//!
//! ### One Lock Around The World
//! Connection tasks and the datagram loop reach the world only through
//! [`game::SharedWorld`], which serializes every mutation.
//!
//! ## Module Organization
//!
//! ### Assets Module (`assets`)
//! Surface and default vehicle images loaded once at startup.
//!
//! ### Client Manager Module (`client_manager`)
//! Identity assignment, capacity and per-client datagram addresses.
//!
//! ### Game Module (`game`)
//! The shared handle to the authoritative world.
//!
//! ### Session Module (`session`)
//! The reliable-channel state machine: handshake, texture service and cleanup.
//!
//! ### Realtime Module (`realtime`)
//! The datagram loop: decode, tick, broadcast.
//!
//! ### Network Module (`network`)
//! Socket setup and the accept loop tying the rest together.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::assets::ServerAssets;
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reliable channel on 4000, datagrams on 3000
//!     let server = Server::bind(ServerConfig::default(), ServerAssets::generated()).await?;
//!
//!     // Accepts clients and runs the realtime loop until it fails
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod client_manager;
pub mod config;
pub mod error;
pub mod game;
pub mod network;
pub mod realtime;
pub mod session;
