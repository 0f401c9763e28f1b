//! Client network layer: the handshake over the reliable channel and the
//! datagram loop that follows it

use crate::error::ClientError;
use crate::game::{ClientGameState, ReconcileReport};
use crate::input::InputManager;
use log::{debug, info, warn};
use shared::{
    decode_datagram, encode_datagram, Image, Packet, ProtocolError, ReliableChannel, Surface,
    TexturePacket, TexturePurpose, VehicleUpdate, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT,
    MAX_DATAGRAM_SIZE,
};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{interval, MissedTickBehavior};

/// Everything the server hands over during the handshake
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedWorld {
    pub id: u32,
    pub elevation: Image,
    pub ground: Image,
    pub vehicle_texture: Image,
}

impl JoinedWorld {
    pub fn into_game_state(self) -> ClientGameState {
        let surface = Surface::new(Arc::new(self.elevation), Arc::new(self.ground));
        ClientGameState::new(surface, self.id, Arc::new(self.vehicle_texture))
    }
}

async fn next_packet<S>(channel: &mut ReliableChannel<S>) -> Result<Packet, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    channel.recv().await?.ok_or(ClientError::ServerClosed)
}

/// Waits for a texture packet with the given purpose and returns its image
async fn expect_texture<S>(
    channel: &mut ReliableChannel<S>,
    purpose: TexturePurpose,
    what: &'static str,
) -> Result<(u32, Image), ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match next_packet(channel).await? {
        Packet::Texture(texture) if texture.purpose == purpose => {
            let image = texture.image.ok_or(ClientError::MissingImage(what))?;
            debug!("Received {} ({}x{})", what, image.width, image.height);
            Ok((texture.target_id, image))
        }
        Packet::Texture(texture) => Err(ClientError::UnexpectedTexture {
            expected: what,
            got: texture.purpose,
        }),
        other => Err(ProtocolError::violation(what, other.packet_type()).into()),
    }
}

/// Runs the client side of the handshake
///
/// `texture` is offered as this client's vehicle texture; `None` asks for the
/// server default.
pub async fn handshake<S>(
    channel: &mut ReliableChannel<S>,
    texture: Option<Image>,
) -> Result<JoinedWorld, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    channel.send(&Packet::IdentityRequest).await?;

    let id = match next_packet(channel).await? {
        Packet::IdentityAssign { id } => id,
        other => return Err(ProtocolError::violation("identity", other.packet_type()).into()),
    };
    info!("Connected! Client ID: {}", id);

    channel
        .send(&Packet::Texture(TexturePacket {
            purpose: TexturePurpose::RequestVehicleTexture,
            target_id: id,
            image: texture,
        }))
        .await?;

    let (_, elevation) =
        expect_texture(channel, TexturePurpose::PostElevation, "surface elevation").await?;
    let (_, ground) = expect_texture(channel, TexturePurpose::PostTexture, "surface texture").await?;
    let (_, vehicle_texture) =
        expect_texture(channel, TexturePurpose::PostTexture, "vehicle texture").await?;

    Ok(JoinedWorld {
        id,
        elevation,
        ground,
        vehicle_texture,
    })
}

/// Asks the server for another vehicle's texture
pub async fn fetch_vehicle_texture<S>(
    channel: &mut ReliableChannel<S>,
    vehicle_id: u32,
) -> Result<Image, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    channel
        .send(&Packet::Texture(TexturePacket {
            purpose: TexturePurpose::RequestVehicleTexture,
            target_id: vehicle_id,
            image: None,
        }))
        .await?;

    let (target_id, image) =
        expect_texture(channel, TexturePurpose::PostTexture, "vehicle texture").await?;
    if target_id != vehicle_id {
        return Err(ProtocolError::malformed(format!(
            "asked for the texture of vehicle {}, got vehicle {}",
            vehicle_id, target_id
        ))
        .into());
    }
    Ok(image)
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub tcp_port: u16,
    pub udp_port: u16,
    /// How often a `VehicleUpdate` is sent
    pub send_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            send_interval: Duration::from_millis(16),
        }
    }
}

impl ClientConfig {
    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.host, self.tcp_port)
    }

    pub fn udp_addr(&self) -> String {
        format!("{}:{}", self.host, self.udp_port)
    }
}

enum Event {
    Send,
    Datagram(io::Result<usize>),
    Reliable(io::Result<usize>),
}

pub struct Client {
    channel: ReliableChannel<TcpStream>,
    socket: UdpSocket,
    game_state: ClientGameState,
    input_manager: InputManager,
    send_interval: Duration,
}

impl Client {
    /// Connects, completes the handshake and opens the datagram socket
    pub async fn connect(
        config: &ClientConfig,
        texture: Option<Image>,
        input_manager: InputManager,
    ) -> Result<Self, ClientError> {
        let tcp_addr = config.tcp_addr();
        info!("Connecting to {}...", tcp_addr);
        let stream = TcpStream::connect(&tcp_addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: tcp_addr.clone(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Cannot disable Nagle: {}", e);
        }

        let mut channel = ReliableChannel::new(stream);
        let joined = handshake(&mut channel, texture).await?;
        let game_state = joined.into_game_state();

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(ClientError::Datagram)?;
        let udp_addr = config.udp_addr();
        socket
            .connect(&udp_addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: udp_addr,
                source,
            })?;

        Ok(Client {
            channel,
            socket,
            game_state,
            input_manager,
            send_interval: config.send_interval,
        })
    }

    pub fn id(&self) -> u32 {
        self.game_state.own_id()
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    /// Sends the next control input for this client's vehicle
    pub async fn send_input(&mut self) -> Result<(), ClientError> {
        let input = self.input_manager.next_input();
        let packet = Packet::VehicleUpdate(VehicleUpdate {
            vehicle_id: self.game_state.own_id(),
            rotational_force: input.rotational_force,
            translational_force: input.translational_force,
        });
        let data = encode_datagram(&packet)?;
        self.socket.send(&data).await.map_err(ClientError::Datagram)?;
        Ok(())
    }

    /// Reconciles one received datagram. Undecodable datagrams are dropped;
    /// only a failing texture fetch is an error.
    pub async fn handle_datagram(
        &mut self,
        bytes: &[u8],
    ) -> Result<Option<ReconcileReport>, ClientError> {
        let snapshot = match decode_datagram(bytes) {
            Ok(Packet::WorldUpdate(snapshot)) => snapshot,
            Ok(other) => {
                warn!("Unexpected {:?} datagram", other.packet_type());
                return Ok(None);
            }
            Err(e) => {
                warn!("Dropping datagram: {}", e);
                return Ok(None);
            }
        };

        let diff = self.game_state.diff(&snapshot);
        let mut textures = HashMap::with_capacity(diff.joined.len());
        for state in &diff.joined {
            let image = fetch_vehicle_texture(&mut self.channel, state.id).await?;
            textures.insert(state.id, Arc::new(image));
        }

        Ok(Some(self.game_state.apply(diff, textures)))
    }

    /// Sends inputs and applies snapshots until the reliable channel fails
    pub async fn run(&mut self) -> Result<(), ClientError> {
        let mut send_timer = interval(self.send_interval);
        send_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        let mut peek_buf = [0u8; 1];

        info!("Client {} started", self.id());

        loop {
            // The server never speaks unprompted on the reliable channel, so
            // readiness there means it closed or misbehaved.
            let event = tokio::select! {
                _ = send_timer.tick() => Event::Send,
                received = self.socket.recv(&mut buffer) => Event::Datagram(received),
                peeked = self.channel.get_ref().peek(&mut peek_buf) => Event::Reliable(peeked),
            };

            match event {
                Event::Send => self.send_input().await?,
                Event::Datagram(Ok(len)) => {
                    self.handle_datagram(&buffer[..len]).await?;
                }
                Event::Datagram(Err(e)) => {
                    // Usually ICMP port unreachable while the server restarts.
                    debug!("Datagram receive failed: {}", e);
                }
                Event::Reliable(Ok(0)) => return Err(ClientError::ServerClosed),
                Event::Reliable(Ok(_)) => {
                    let packet = next_packet(&mut self.channel).await?;
                    return Err(ProtocolError::violation("nothing", packet.packet_type()).into());
                }
                Event::Reliable(Err(e)) => return Err(ProtocolError::Transport(e).into()),
            }
        }
    }
}
