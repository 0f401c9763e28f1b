//! # Vehicle Sync Client Library
//!
//! This library provides a headless client for the shared vehicle world. It
//! joins the server over the reliable channel, drives its own vehicle with a
//! stream of control inputs and keeps a local copy of the world in step with
//! the server's snapshots.
//!
//! ## Architecture Overview
//!
//! ### Handshake
//! The client asks for an identity, optionally offers its own vehicle
//! texture and then receives, in this order, the surface elevation, the
//! surface texture and its vehicle texture. Those three images are enough to
//! build the local world.
//!
//! ### Authoritative Snapshots
//! The client never simulates. Every `WorldUpdate` is a full snapshot and
//! simply overwrites the local poses. Vehicles that appear are added after
//! their texture has been fetched over the reliable channel; vehicles that
//! disappear are removed.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The local world and the snapshot diff:
//! - Set-based join/depart/update classification
//! - Applying a diff with fetched textures
//!
//! ### Input Module (`input`)
//! The control forces sent with each `VehicleUpdate`, either constant or a
//! random walk.
//!
//! ### Network Module (`network`)
//! The handshake, texture fetching and the send/receive loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::{InputManager, InputMode};
//! use client::network::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let input_manager = InputManager::new(InputMode::Constant, 0.2, 1.0);
//!     let mut client = Client::connect(&ClientConfig::default(), None, input_manager).await?;
//!
//!     // Runs until the server goes away
//!     client.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod game;
pub mod input;
pub mod network;
