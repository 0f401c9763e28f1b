//! Registry of live client sessions
//!
//! This module tracks every client between its identity request and its
//! disconnect:
//! - Identity assignment from a monotonically increasing counter
//! - Capacity enforcement
//! - The reliable-channel peer of each session
//! - The datagram return address, learned from the client's own updates
//!
//! The realtime loop reads the datagram addresses from here when it
//! broadcasts world snapshots.

use log::{info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

/// A client that has been issued an identity
#[derive(Debug)]
pub struct Client {
    /// Identity assigned by the server, also the id of the client's vehicle
    pub id: u32,
    /// Peer address of the reliable connection
    pub tcp_addr: SocketAddr,
    /// Where world snapshots go, once the client has sent a datagram
    pub udp_addr: Option<SocketAddr>,
    /// Last time a datagram for this client's vehicle arrived
    pub last_datagram: Option<Instant>,
}

impl Client {
    pub fn new(id: u32, tcp_addr: SocketAddr) -> Self {
        Self {
            id,
            tcp_addr,
            udp_addr: None,
            last_datagram: None,
        }
    }

    /// Records the address a datagram for this client's vehicle came from
    ///
    /// The latest address wins, so a client whose NAT mapping changes keeps
    /// receiving snapshots.
    pub fn note_datagram(&mut self, addr: SocketAddr) {
        self.udp_addr = Some(addr);
        self.last_datagram = Some(Instant::now());
    }
}

/// Manages all sessions and hands out identities
///
/// Identities are never reused: a client that reconnects is treated as a new
/// one and receives a fresh id.
pub struct ClientManager {
    /// Sessions indexed by their id
    clients: HashMap<u32, Client>,
    /// Next identity to hand out, None once every u32 has been issued
    next_client_id: Option<u32>,
    /// Maximum number of concurrent sessions
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty registry; ids start from 1
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: Some(1),
            max_clients,
        }
    }

    /// Issues a new identity for a connection from `tcp_addr`
    ///
    /// Returns None if the server is at capacity, or once the id space is
    /// exhausted. Ids are never wrapped around, so an exhausted server
    /// refuses every later handshake.
    pub fn add_client(&mut self, tcp_addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = match self.next_client_id {
            Some(id) => id,
            None => {
                warn!("Refusing client at {}: no identities left", tcp_addr);
                return None;
            }
        };
        self.next_client_id = client_id.checked_add(1);

        info!("Assigned id {} to client at {}", client_id, tcp_addr);
        self.clients.insert(client_id, Client::new(client_id, tcp_addr));

        Some(client_id)
    }

    /// Removes a session, returning false if it was already gone
    ///
    /// The id is not returned to the pool.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        self.clients.remove(client_id).is_some()
    }

    /// Checks whether a session currently holds `client_id`
    ///
    /// Ids that were issued and later removed report false.
    pub fn contains(&self, client_id: &u32) -> bool {
        self.clients.contains_key(client_id)
    }

    /// Looks up a live session by id
    ///
    /// The returned client carries the reliable peer address and, once the
    /// client has sent a datagram, its snapshot address.
    pub fn get(&self, client_id: &u32) -> Option<&Client> {
        self.clients.get(client_id)
    }

    /// Learns the datagram address of a session. Unknown ids are ignored.
    pub fn note_datagram(&mut self, client_id: u32, addr: SocketAddr) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.note_datagram(addr);
            true
        } else {
            false
        }
    }

    /// Every session whose datagram address is known
    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .values()
            .filter_map(|client| client.udp_addr.map(|addr| (client.id, addr)))
            .collect()
    }

    /// Number of live sessions
    ///
    /// Compared against `max_clients` when a new identity is requested.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// True when no session is live
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
