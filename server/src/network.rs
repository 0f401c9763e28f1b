//! Server network layer: the reliable listener, the datagram socket and the
//! tasks that serve them

use crate::assets::ServerAssets;
use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::game::SharedWorld;
use crate::realtime::RealtimeLoop;
use crate::session::{run_session, SessionContext};
use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{RwLock, Semaphore};

/// Main server: owns both sockets and the shared state every task works on
pub struct Server {
    listener: TcpListener,
    socket: Arc<UdpSocket>,
    world: SharedWorld,
    clients: Arc<RwLock<ClientManager>>,
    assets: Arc<ServerAssets>,
    handshakes: Arc<Semaphore>,
    config: ServerConfig,
}

impl Server {
    /// Binds both sockets. An invalid configuration or either bind failing
    /// is fatal.
    pub async fn bind(config: ServerConfig, assets: ServerAssets) -> Result<Self, ServerError> {
        config.validate()?;

        let tcp_addr = config.tcp_addr();
        let listener = TcpListener::bind(&tcp_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: tcp_addr.clone(),
                source,
            })?;

        let udp_addr = config.udp_addr();
        let socket = UdpSocket::bind(&udp_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: udp_addr.clone(),
                source,
            })?;

        info!(
            "Server listening on {} (reliable) and {} (datagram)",
            tcp_addr, udp_addr
        );

        Ok(Server {
            listener,
            socket: Arc::new(socket),
            world: SharedWorld::new(assets.surface()),
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            assets: Arc::new(assets),
            handshakes: Arc::new(Semaphore::new(config.max_handshakes)),
            config,
        })
    }

    /// Bound address of the reliable listener
    pub fn tcp_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|source| ServerError::Bind {
                addr: self.config.tcp_addr(),
                source,
            })
    }

    /// Bound address of the datagram socket
    pub fn udp_addr(&self) -> Result<SocketAddr, ServerError> {
        self.socket.local_addr().map_err(|source| ServerError::Bind {
            addr: self.config.udp_addr(),
            source,
        })
    }

    pub fn world(&self) -> SharedWorld {
        self.world.clone()
    }

    pub fn clients(&self) -> Arc<RwLock<ClientManager>> {
        Arc::clone(&self.clients)
    }

    fn session_context(&self) -> SessionContext {
        SessionContext {
            world: self.world.clone(),
            clients: Arc::clone(&self.clients),
            assets: Arc::clone(&self.assets),
            handshake_timeout: self.config.handshake_timeout,
        }
    }

    /// Hands an accepted connection to its own task
    ///
    /// The task first waits for a handshake permit, so at most
    /// `max_handshakes` handshakes are in flight while the accept loop keeps
    /// running.
    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Cannot disable Nagle for {}: {}", peer, e);
        }

        let handshakes = Arc::clone(&self.handshakes);
        let ctx = self.session_context();

        tokio::spawn(async move {
            let permit = match handshakes.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Dropping connection from {}: {}", peer, e);
                    return;
                }
            };
            run_session(stream, peer, ctx, permit).await;
        });
    }

    /// Accepts connections and runs the realtime loop until either fails
    pub async fn run(self) -> Result<(), ServerError> {
        let realtime = RealtimeLoop::new(
            Arc::clone(&self.socket),
            self.world.clone(),
            Arc::clone(&self.clients),
            self.config.tick,
        );
        let mut realtime_task = tokio::spawn(realtime.run());

        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("Accepted connection from {}", peer);
                            self.spawn_session(stream, peer);
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }
                result = &mut realtime_task => {
                    if let Err(e) = result {
                        error!("Realtime loop panicked: {}", e);
                    }
                    return Ok(());
                }
            }
        }
    }
}
