//! Per-connection session: handshake, then the connection lifecycle
//!
//! A session walks through
//! `AwaitingIdRequest -> IdAssigned -> AwaitingTextureChoice -> AssetsSent -> Joined -> Closed`.
//! The vehicle is only inserted into the world once every asset has been
//! sent, and whatever ends the session, [`Session::close`] removes both the
//! vehicle and the registry entry again.
//!
//! After joining, the session keeps reading the reliable channel. It answers
//! vehicle texture requests and treats a clean end-of-stream as the client
//! leaving.

use crate::assets::ServerAssets;
use crate::client_manager::ClientManager;
use crate::error::SessionError;
use crate::game::SharedWorld;
use log::{debug, info, warn};
use shared::{Image, Packet, ProtocolError, ReliableChannel, TexturePacket, TexturePurpose};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{OwnedSemaphorePermit, RwLock};
use tokio::time::timeout;

/// Everything a session needs from the rest of the server
#[derive(Clone)]
pub struct SessionContext {
    pub world: SharedWorld,
    pub clients: Arc<RwLock<ClientManager>>,
    pub assets: Arc<ServerAssets>,
    pub handshake_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingIdRequest,
    IdAssigned,
    AwaitingTextureChoice,
    AssetsSent,
    Joined,
    Closed,
}

pub struct Session<S> {
    channel: ReliableChannel<S>,
    peer: SocketAddr,
    state: SessionState,
    id: Option<u32>,
    ctx: SessionContext,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: SocketAddr, ctx: SessionContext) -> Self {
        Self {
            channel: ReliableChannel::new(stream),
            peer,
            state: SessionState::AwaitingIdRequest,
            id: None,
            ctx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn id(&self) -> Option<u32> {
        self.id
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {}: {:?} -> {:?}", self.peer, self.state, next);
        self.state = next;
    }

    async fn next_handshake_packet(&mut self) -> Result<Packet, SessionError> {
        self.channel
            .recv()
            .await?
            .ok_or(SessionError::ClosedDuringHandshake)
    }

    async fn send_texture(
        &mut self,
        purpose: TexturePurpose,
        target_id: u32,
        image: &Image,
    ) -> Result<(), SessionError> {
        let packet = Packet::Texture(TexturePacket {
            purpose,
            target_id,
            image: Some(image.clone()),
        });
        self.channel.send(&packet).await?;
        Ok(())
    }

    /// Runs the handshake, bounded by the configured timeout
    pub async fn join(&mut self) -> Result<u32, SessionError> {
        let limit = self.ctx.handshake_timeout;
        match timeout(limit, self.handshake()).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::HandshakeTimeout),
        }
    }

    /// Assigns an identity, negotiates the vehicle texture, pushes the world
    /// assets and finally inserts the client's vehicle
    pub async fn handshake(&mut self) -> Result<u32, SessionError> {
        match self.next_handshake_packet().await? {
            Packet::IdentityRequest => {}
            other => {
                return Err(ProtocolError::violation("identity request", other.packet_type()).into())
            }
        }

        let id = self
            .ctx
            .clients
            .write()
            .await
            .add_client(self.peer)
            .ok_or(SessionError::ServerFull)?;
        self.id = Some(id);

        self.channel.send(&Packet::IdentityAssign { id }).await?;
        self.transition(SessionState::IdAssigned);
        self.transition(SessionState::AwaitingTextureChoice);

        let choice = match self.next_handshake_packet().await? {
            Packet::Texture(TexturePacket {
                purpose: TexturePurpose::RequestVehicleTexture,
                image,
                ..
            }) => image,
            other => {
                return Err(
                    ProtocolError::violation("vehicle texture choice", other.packet_type()).into(),
                )
            }
        };

        // A client-chosen texture only ever applies to this client's vehicle.
        let texture = match choice {
            Some(image) => {
                info!(
                    "Client {} brought its own {}x{} vehicle texture",
                    id, image.width, image.height
                );
                Arc::new(image)
            }
            None => Arc::clone(&self.ctx.assets.default_vehicle),
        };

        let assets = Arc::clone(&self.ctx.assets);
        debug!("Sending surface elevation to client {}", id);
        self.send_texture(TexturePurpose::PostElevation, 0, &assets.elevation)
            .await?;
        debug!("Sending surface texture to client {}", id);
        self.send_texture(TexturePurpose::PostTexture, 0, &assets.ground)
            .await?;
        debug!("Sending vehicle texture to client {}", id);
        self.send_texture(TexturePurpose::PostTexture, id, &texture)
            .await?;
        self.transition(SessionState::AssetsSent);

        self.ctx.world.spawn_vehicle(id, texture).await?;
        self.transition(SessionState::Joined);

        Ok(id)
    }

    /// Serves texture requests until the client disconnects
    ///
    /// Returns Ok when the peer closed the stream cleanly.
    pub async fn serve(&mut self) -> Result<(), SessionError> {
        while let Some(packet) = self.channel.recv().await? {
            match packet {
                Packet::Texture(TexturePacket {
                    purpose: TexturePurpose::RequestVehicleTexture,
                    target_id,
                    ..
                }) => {
                    let texture = match self.ctx.world.vehicle_texture(target_id).await {
                        Some(texture) => texture,
                        None => {
                            debug!(
                                "Texture requested for unknown vehicle {}, sending default",
                                target_id
                            );
                            Arc::clone(&self.ctx.assets.default_vehicle)
                        }
                    };
                    self.send_texture(TexturePurpose::PostTexture, target_id, &texture)
                        .await?;
                }
                other => {
                    return Err(ProtocolError::violation(
                        "vehicle texture request",
                        other.packet_type(),
                    )
                    .into())
                }
            }
        }
        Ok(())
    }

    /// Removes every trace of the session from the world and the registry
    pub async fn close(&mut self) {
        if let Some(id) = self.id {
            self.ctx.world.remove_vehicle(id).await;
            self.ctx.clients.write().await.remove_client(&id);
        }
        self.transition(SessionState::Closed);
    }
}

/// Drives one accepted connection from handshake to disconnect
///
/// The handshake permit is released as soon as the handshake finishes, so
/// long-lived sessions do not count against the handshake cap.
pub async fn run_session<S>(
    stream: S,
    peer: SocketAddr,
    ctx: SessionContext,
    handshake_permit: OwnedSemaphorePermit,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session::new(stream, peer, ctx);
    let joined = session.join().await;
    drop(handshake_permit);

    let id = match joined {
        Ok(id) => {
            info!("Client {} from {} joined the game", id, peer);
            id
        }
        Err(e) => {
            warn!("Handshake with {} failed: {}", peer, e);
            session.close().await;
            return;
        }
    };

    match session.serve().await {
        Ok(()) => info!("Client {} closed the game", id),
        Err(e) => warn!("Session of client {} ended: {}", id, e),
    }
    session.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::VehicleUpdate;
    use tokio::sync::Semaphore;
    use tokio_test::io::Builder;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn context(max_clients: usize) -> SessionContext {
        let assets = Arc::new(ServerAssets::new(
            Image::filled(4, 4, [1, 1, 1]),
            Image::filled(4, 4, [2, 2, 2]),
            Image::filled(2, 2, [3, 3, 3]),
        ));
        SessionContext {
            world: SharedWorld::new(assets.surface()),
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            assets,
            handshake_timeout: Duration::from_secs(1),
        }
    }

    fn frame(packet: Packet) -> Vec<u8> {
        packet.encode().unwrap()
    }

    fn texture(purpose: TexturePurpose, target_id: u32, image: Option<Image>) -> Vec<u8> {
        frame(Packet::Texture(TexturePacket {
            purpose,
            target_id,
            image,
        }))
    }

    /// Mock traffic for a complete handshake of client `id`
    fn handshake_traffic(
        builder: &mut Builder,
        ctx: &SessionContext,
        id: u32,
        chosen: Option<Image>,
    ) {
        let vehicle = chosen
            .clone()
            .unwrap_or_else(|| (*ctx.assets.default_vehicle).clone());
        builder
            .read(&frame(Packet::IdentityRequest))
            .write(&frame(Packet::IdentityAssign { id }))
            .read(&texture(TexturePurpose::RequestVehicleTexture, id, chosen))
            .write(&texture(
                TexturePurpose::PostElevation,
                0,
                Some((*ctx.assets.elevation).clone()),
            ))
            .write(&texture(
                TexturePurpose::PostTexture,
                0,
                Some((*ctx.assets.ground).clone()),
            ))
            .write(&texture(TexturePurpose::PostTexture, id, Some(vehicle)));
    }

    #[tokio::test]
    async fn test_handshake_joins_world() {
        let ctx = context(4);
        let mut builder = Builder::new();
        handshake_traffic(&mut builder, &ctx, 1, None);

        let mut session = Session::new(builder.build(), peer(), ctx.clone());
        let id = session.join().await.unwrap();

        assert_eq!(id, 1);
        assert_eq!(session.state(), SessionState::Joined);
        assert_eq!(ctx.world.len().await, 1);

        let state = ctx.world.vehicle_state(1).await.unwrap();
        assert_eq!((state.x, state.y), (1.0, 1.0));
        assert!(ctx.clients.read().await.contains(&1));
    }

    #[tokio::test]
    async fn test_client_texture_is_scoped_to_client() {
        let ctx = context(4);
        let custom = Image::filled(3, 3, [7, 8, 9]);
        let mut builder = Builder::new();
        handshake_traffic(&mut builder, &ctx, 1, Some(custom.clone()));

        let mut session = Session::new(builder.build(), peer(), ctx.clone());
        session.join().await.unwrap();

        let texture = ctx.world.vehicle_texture(1).await.unwrap();
        assert_eq!(*texture, custom);
        assert_eq!(*ctx.assets.default_vehicle, Image::filled(2, 2, [3, 3, 3]));
    }

    #[tokio::test]
    async fn test_wrong_first_packet_is_violation() {
        let ctx = context(4);
        let mock = Builder::new()
            .read(&frame(Packet::VehicleUpdate(VehicleUpdate {
                vehicle_id: 1,
                rotational_force: 0.0,
                translational_force: 0.0,
            })))
            .build();

        let mut session = Session::new(mock, peer(), ctx.clone());
        let result = session.join().await;

        assert!(matches!(
            result,
            Err(SessionError::Protocol(ProtocolError::ProtocolViolation { .. }))
        ));
        assert!(session.id().is_none());
        assert!(ctx.clients.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_request_aborts() {
        let ctx = context(4);
        // Identity request claiming a two byte payload it does not carry.
        let mock = Builder::new().read(&[1, 2, 0, 0, 0, 9, 9]).build();

        let mut session = Session::new(mock, peer(), ctx.clone());
        assert!(matches!(
            session.join().await,
            Err(SessionError::Protocol(ProtocolError::MalformedPacket(_)))
        ));
        assert_eq!(ctx.world.len().await, 0);
    }

    #[tokio::test]
    async fn test_texture_choice_must_request_vehicle_texture() {
        let ctx = context(4);
        let mock = Builder::new()
            .read(&frame(Packet::IdentityRequest))
            .write(&frame(Packet::IdentityAssign { id: 1 }))
            .read(&texture(TexturePurpose::PostElevation, 0, None))
            .build();

        let mut session = Session::new(mock, peer(), ctx.clone());
        assert!(matches!(
            session.join().await,
            Err(SessionError::Protocol(ProtocolError::ProtocolViolation { .. }))
        ));

        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert!(ctx.clients.read().await.is_empty());
        assert_eq!(ctx.world.len().await, 0);
    }

    #[tokio::test]
    async fn test_peer_closing_mid_handshake() {
        let ctx = context(4);
        let mock = Builder::new()
            .read(&frame(Packet::IdentityRequest))
            .write(&frame(Packet::IdentityAssign { id: 1 }))
            .build();

        let mut session = Session::new(mock, peer(), ctx.clone());
        assert!(matches!(
            session.join().await,
            Err(SessionError::ClosedDuringHandshake)
        ));
        assert_eq!(ctx.world.len().await, 0);
    }

    #[tokio::test]
    async fn test_server_full() {
        let ctx = context(0);
        let mock = Builder::new().read(&frame(Packet::IdentityRequest)).build();

        let mut session = Session::new(mock, peer(), ctx.clone());
        assert!(matches!(session.join().await, Err(SessionError::ServerFull)));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let mut ctx = context(4);
        ctx.handshake_timeout = Duration::from_millis(50);
        let (_peer_end, server_end) = tokio::io::duplex(1024);

        let mut session = Session::new(server_end, peer(), ctx.clone());
        assert!(matches!(
            session.join().await,
            Err(SessionError::HandshakeTimeout)
        ));
    }

    #[tokio::test]
    async fn test_run_session_serves_textures_and_cleans_up() {
        let ctx = context(4);
        let mut builder = Builder::new();
        handshake_traffic(&mut builder, &ctx, 1, None);
        builder
            .read(&texture(TexturePurpose::RequestVehicleTexture, 1, None))
            .write(&texture(
                TexturePurpose::PostTexture,
                1,
                Some((*ctx.assets.default_vehicle).clone()),
            ))
            .read(&texture(TexturePurpose::RequestVehicleTexture, 99, None))
            .write(&texture(
                TexturePurpose::PostTexture,
                99,
                Some((*ctx.assets.default_vehicle).clone()),
            ));

        let permit = Arc::new(Semaphore::new(1)).acquire_owned().await.unwrap();
        run_session(builder.build(), peer(), ctx.clone(), permit).await;

        assert_eq!(ctx.world.len().await, 0);
        assert!(ctx.clients.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_unexpected_packet_after_join_ends_session() {
        let ctx = context(4);
        let mut builder = Builder::new();
        handshake_traffic(&mut builder, &ctx, 1, None);
        builder.read(&frame(Packet::IdentityRequest));

        let mut session = Session::new(builder.build(), peer(), ctx.clone());
        session.join().await.unwrap();
        assert_eq!(ctx.world.len().await, 1);

        assert!(matches!(
            session.serve().await,
            Err(SessionError::Protocol(ProtocolError::ProtocolViolation { .. }))
        ));
        session.close().await;
        assert_eq!(ctx.world.len().await, 0);
    }
}
