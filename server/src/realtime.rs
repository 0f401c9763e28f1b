//! Datagram loop: one vehicle input in, one world tick, one snapshot out
//!
//! There is no wall-clock timer. Every accepted `VehicleUpdate` advances the
//! world by one tick, so the tick cadence follows inbound traffic. The
//! resulting snapshot is broadcast to every session whose datagram address
//! is known, the sender included.

use crate::client_manager::ClientManager;
use crate::config::TickMode;
use crate::game::SharedWorld;
use log::{debug, error, info, warn};
use shared::{
    decode_datagram, encode_datagram, ControlInput, Packet, WorldError, WorldUpdate,
    MAX_DATAGRAM_SIZE,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;

/// Decides how much simulated time each tick covers
#[derive(Debug)]
pub struct TickClock {
    mode: TickMode,
    last_tick: Instant,
}

impl TickClock {
    pub fn new(mode: TickMode) -> Self {
        Self {
            mode,
            last_tick: Instant::now(),
        }
    }

    /// Duration of a tick happening at `now`, in seconds
    pub fn delta(&self, now: Instant) -> f32 {
        match self.mode {
            TickMode::Fixed(step) => step.as_secs_f32(),
            TickMode::Elapsed { max } => now
                .saturating_duration_since(self.last_tick)
                .min(max)
                .as_secs_f32(),
        }
    }

    /// Marks a tick as having happened at `now`
    pub fn advance(&mut self, now: Instant) {
        self.last_tick = now;
    }
}

pub struct RealtimeLoop {
    socket: Arc<UdpSocket>,
    world: SharedWorld,
    clients: Arc<RwLock<ClientManager>>,
    clock: TickClock,
}

impl RealtimeLoop {
    pub fn new(
        socket: Arc<UdpSocket>,
        world: SharedWorld,
        clients: Arc<RwLock<ClientManager>>,
        tick: TickMode,
    ) -> Self {
        Self {
            socket,
            world,
            clients,
            clock: TickClock::new(tick),
        }
    }

    /// Services the datagram socket until the task is dropped
    pub async fn run(mut self) {
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE + 1];

        if let Ok(addr) = self.socket.local_addr() {
            info!("Realtime loop listening on {}", addr);
        }

        loop {
            match self.socket.recv_from(&mut buffer).await {
                Ok((len, addr)) => {
                    if let Some(snapshot) = self.handle_datagram(&buffer[..len], addr).await {
                        self.broadcast(snapshot).await;
                    }
                }
                Err(e) => {
                    error!("Error receiving datagram: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    /// Applies one datagram to the world and returns the snapshot to send,
    /// or None when the datagram is dropped
    pub async fn handle_datagram(&mut self, bytes: &[u8], addr: SocketAddr) -> Option<WorldUpdate> {
        let update = match decode_datagram(bytes) {
            Ok(Packet::VehicleUpdate(update)) => update,
            Ok(other) => {
                warn!(
                    "Dropping unexpected {:?} datagram from {}",
                    other.packet_type(),
                    addr
                );
                return None;
            }
            Err(e) => {
                warn!("Dropping datagram from {}: {}", addr, e);
                return None;
            }
        };

        let now = Instant::now();
        let input = ControlInput::new(update.rotational_force, update.translational_force);
        let dt = self.clock.delta(now);

        match self.world.step(update.vehicle_id, input, dt).await {
            Ok(snapshot) => {
                self.clock.advance(now);
                self.clients
                    .write()
                    .await
                    .note_datagram(update.vehicle_id, addr);
                Some(snapshot)
            }
            // The vehicle may have left while this datagram was in flight.
            Err(WorldError::UnknownVehicle(id)) => {
                debug!("Ignoring update for unknown vehicle {} from {}", id, addr);
                None
            }
            Err(e) => {
                warn!("Rejected update from {}: {}", addr, e);
                None
            }
        }
    }

    async fn broadcast(&self, snapshot: WorldUpdate) {
        let vehicle_count = snapshot.vehicle_count();
        let data = match encode_datagram(&Packet::WorldUpdate(snapshot)) {
            Ok(data) => data,
            Err(e) => {
                warn!("Cannot send snapshot of {} vehicles: {}", vehicle_count, e);
                return;
            }
        };

        let client_addrs = {
            let clients = self.clients.read().await;
            clients.get_client_addrs()
        };

        for (client_id, addr) in client_addrs {
            if let Err(e) = self.socket.send_to(&data, addr).await {
                error!("Failed to send snapshot to client {}: {}", client_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Image, Surface, VehicleUpdate};

    fn texture() -> Arc<Image> {
        Arc::new(Image::filled(1, 1, [1, 2, 3]))
    }

    async fn realtime_loop(tick: TickMode) -> RealtimeLoop {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let world = SharedWorld::new(Surface::new(
            Arc::new(Image::filled(100, 100, [0, 0, 0])),
            Arc::new(Image::filled(100, 100, [0, 0, 0])),
        ));
        let clients = Arc::new(RwLock::new(ClientManager::new(8)));
        RealtimeLoop::new(socket, world, clients, tick)
    }

    fn update_datagram(vehicle_id: u32, rotational: f32, translational: f32) -> Vec<u8> {
        encode_datagram(&Packet::VehicleUpdate(VehicleUpdate {
            vehicle_id,
            rotational_force: rotational,
            translational_force: translational,
        }))
        .unwrap()
    }

    fn client_addr() -> SocketAddr {
        "127.0.0.1:45000".parse().unwrap()
    }

    #[test]
    fn test_fixed_tick_clock() {
        let mut clock = TickClock::new(TickMode::Fixed(Duration::from_millis(20)));
        let later = Instant::now() + Duration::from_secs(3);
        assert_eq!(clock.delta(later), 0.02);
        clock.advance(later);
        assert_eq!(clock.delta(later), 0.02);
    }

    #[test]
    fn test_elapsed_tick_clock_is_capped() {
        let mut clock = TickClock::new(TickMode::Elapsed {
            max: Duration::from_millis(50),
        });
        let start = Instant::now();
        clock.advance(start);

        assert_eq!(clock.delta(start), 0.0);
        assert_eq!(clock.delta(start + Duration::from_millis(10)), 0.01);
        assert_eq!(clock.delta(start + Duration::from_secs(10)), 0.05);
    }

    #[tokio::test]
    async fn test_unknown_vehicle_is_dropped() {
        let mut realtime = realtime_loop(TickMode::Fixed(Duration::from_millis(16))).await;

        let reply = realtime
            .handle_datagram(&update_datagram(7, 0.0, 1.0), client_addr())
            .await;

        assert!(reply.is_none());
        assert!(realtime.clients.read().await.get_client_addrs().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_datagram_is_dropped() {
        let mut realtime = realtime_loop(TickMode::Fixed(Duration::from_millis(16))).await;
        realtime.world.spawn_vehicle(1, texture()).await.unwrap();

        let mut bytes = update_datagram(1, 0.0, 1.0);
        bytes.pop();

        assert!(realtime.handle_datagram(&bytes, client_addr()).await.is_none());
        let state = realtime.world.vehicle_state(1).await.unwrap();
        assert_eq!((state.x, state.y), (25.0, 25.0));
    }

    #[tokio::test]
    async fn test_non_update_datagram_is_dropped() {
        let mut realtime = realtime_loop(TickMode::Fixed(Duration::from_millis(16))).await;
        let bytes = encode_datagram(&Packet::IdentityRequest).unwrap();
        assert!(realtime.handle_datagram(&bytes, client_addr()).await.is_none());
    }

    #[tokio::test]
    async fn test_update_ticks_world_and_learns_address() {
        let mut realtime = realtime_loop(TickMode::Fixed(Duration::from_millis(100))).await;
        let id = realtime
            .clients
            .write()
            .await
            .add_client("127.0.0.1:40000".parse().unwrap())
            .unwrap();
        realtime.world.spawn_vehicle(id, texture()).await.unwrap();

        let snapshot = realtime
            .handle_datagram(&update_datagram(id, 0.2, 1.0), client_addr())
            .await
            .unwrap();

        assert_eq!(snapshot.vehicle_count(), 1);
        assert!(snapshot.updates[0].x > 25.0);
        assert!(snapshot.updates[0].heading > 0.0);
        assert_eq!(
            realtime.clients.read().await.get_client_addrs(),
            vec![(id, client_addr())]
        );
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_known_client() {
        let mut realtime = realtime_loop(TickMode::Fixed(Duration::from_millis(16))).await;
        let first = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let second = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        for socket in [&first, &second] {
            let id = realtime
                .clients
                .write()
                .await
                .add_client("127.0.0.1:40000".parse().unwrap())
                .unwrap();
            realtime.world.spawn_vehicle(id, texture()).await.unwrap();
            realtime
                .handle_datagram(&update_datagram(id, 0.0, 0.0), socket.local_addr().unwrap())
                .await
                .unwrap();
        }

        let snapshot = realtime
            .handle_datagram(&update_datagram(1, 0.0, 1.0), first.local_addr().unwrap())
            .await
            .unwrap();
        realtime.broadcast(snapshot.clone()).await;

        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        for socket in [&first, &second] {
            let len = tokio::time::timeout(Duration::from_secs(1), socket.recv(&mut buffer))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(
                decode_datagram(&buffer[..len]).unwrap(),
                Packet::WorldUpdate(snapshot.clone())
            );
        }
    }
}
