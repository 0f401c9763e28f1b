use crate::error::ServerError;
use shared::{DEFAULT_TCP_PORT, DEFAULT_UDP_PORT, MAX_SNAPSHOT_VEHICLES};
use std::time::Duration;

/// Runtime settings for [`crate::network::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface both listeners bind to
    pub host: String,
    /// Reliable channel port used for handshakes and texture transfer
    pub tcp_port: u16,
    /// Datagram port used for vehicle and world updates
    pub udp_port: u16,
    /// Sessions allowed at once; further handshakes are refused. At most
    /// [`MAX_SNAPSHOT_VEHICLES`], so every snapshot fits in one datagram.
    pub max_clients: usize,
    /// Handshakes allowed in flight at once; further connections wait to be served
    pub max_handshakes: usize,
    /// Upper bound on the whole handshake exchange
    pub handshake_timeout: Duration,
    /// How long each tick lasts
    pub tick: TickMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            max_clients: 64,
            max_handshakes: 16,
            handshake_timeout: Duration::from_secs(5),
            tick: TickMode::Elapsed {
                max: Duration::from_millis(50),
            },
        }
    }
}

impl ServerConfig {
    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.host, self.tcp_port)
    }

    pub fn udp_addr(&self) -> String {
        format!("{}:{}", self.host, self.udp_port)
    }

    /// Rejects settings the server could not honour
    ///
    /// Every vehicle appears in every snapshot, so more clients than a
    /// datagram can describe would silence the realtime loop for everyone.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_clients == 0 || self.max_clients > MAX_SNAPSHOT_VEHICLES {
            return Err(ServerError::Config(format!(
                "max clients must be between 1 and {}, got {}",
                MAX_SNAPSHOT_VEHICLES, self.max_clients
            )));
        }
        if self.max_handshakes == 0 {
            return Err(ServerError::Config(
                "at least one handshake must be allowed at a time".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ticks are driven by inbound datagrams; this decides the duration of each one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickMode {
    /// Wall time since the previous tick, capped at `max`.
    Elapsed { max: Duration },
    /// Every tick lasts exactly this long.
    Fixed(Duration),
}
