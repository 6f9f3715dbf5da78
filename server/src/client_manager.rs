//! Client connection management and input queuing for the server
//!
//! This module handles the server-side bookkeeping for every connection:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - Input buffering and chronological ordering for deterministic simulation
//! - Acknowledgement of the highest applied input sequence for reconciliation
//! - Capacity limits and address tracking
//!
//! The client manager never touches players itself. It only decides which
//! inputs reach the authoritative simulation and in what order.

use log::{debug, info, warn};
use shared::{ConnectionId, InputState, PlayerId, MAX_CLIENTS};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Connections silent for longer than this are dropped
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on buffered inputs per connection between two ticks
pub const MAX_PENDING_INPUTS: usize = 256;

/// An input waiting for the next tick, with the player it claims to drive
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInput {
    pub player_id: PlayerId,
    pub input: InputState,
}

/// Represents a connected client and their input state
///
/// Each client maintains:
/// - Connection metadata (ID, address, last activity)
/// - Input acknowledgement tracking for reconciliation
/// - Buffered inputs waiting for the next tick, in sequence order
#[derive(Debug)]
pub struct Client {
    /// Unique connection identifier assigned by the server
    pub id: ConnectionId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Highest input sequence number we've processed
    pub last_processed_input: u32,
    /// Buffered inputs waiting to be processed
    pub pending_inputs: Vec<PendingInput>,
}

impl Client {
    /// Creates a new client with the given ID and network address
    ///
    /// The client starts out as recently active, with no processed inputs
    /// and an empty input buffer.
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_processed_input: 0,
            pending_inputs: Vec::new(),
        }
    }

    /// Buffers an input in sequence order
    ///
    /// Refreshes the client's activity time, then ignores inputs that were
    /// already processed or already buffered, and inputs past the buffer
    /// limit. Kept inputs are sorted by sequence so out-of-order delivery
    /// still replays in the order the client predicted. Returns whether the
    /// input was kept.
    pub fn add_input(&mut self, player_id: PlayerId, input: InputState) -> bool {
        self.last_seen = Instant::now();

        if input.sequence <= self.last_processed_input
            || self.pending_inputs.len() >= MAX_PENDING_INPUTS
            || self
                .pending_inputs
                .iter()
                .any(|p| p.input.sequence == input.sequence)
        {
            return false;
        }

        self.pending_inputs.push(PendingInput { player_id, input });
        // Out-of-order delivery
        self.pending_inputs.sort_by_key(|p| p.input.sequence);
        true
    }

    /// Marks the client as active without buffering anything
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within `timeout`, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients and their input processing
///
/// Enforces the capacity limit and hands out inputs across all clients in
/// timestamp order so the authoritative simulation is deterministic.
pub struct ClientManager {
    /// Connected clients indexed by their connection ID
    clients: HashMap<ConnectionId, Client>,
    /// Next available connection ID
    next_client_id: ConnectionId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// The limit is clamped to [`MAX_CLIENTS`], the most players a single
    /// snapshot datagram can describe. Connection IDs start from 1 and
    /// increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        if max_clients > MAX_CLIENTS {
            warn!(
                "Requested {} clients, limiting to {} so snapshots fit in one datagram",
                max_clients, MAX_CLIENTS
            );
        }

        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients: max_clients.min(MAX_CLIENTS),
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if the server is at
    /// capacity. Each client is associated with its network address for
    /// response routing.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client from the server
    ///
    /// Returns true if the client was found and removed, false if it was
    /// already gone. Used for explicit disconnects, reconnects from the
    /// same address and timeout cleanup.
    pub fn remove_client(&mut self, client_id: &ConnectionId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds a connection ID by network address
    ///
    /// Used to associate incoming packets with existing connections.
    /// Returns None if no client is connected from `addr`.
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Adds an input to a specific client's pending queue
    ///
    /// Returns false if the client is unknown or the input was ignored
    /// (already processed, duplicated, or over the buffer limit).
    pub fn add_input(&mut self, client_id: ConnectionId, player_id: PlayerId, input: InputState) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                let sequence = input.sequence;
                let kept = client.add_input(player_id, input);
                if !kept {
                    debug!("Ignored input {} from client {}", sequence, client_id);
                }
                kept
            }
            None => false,
        }
    }

    /// Refreshes liveness for packets that carry no input
    pub fn touch(&mut self, client_id: ConnectionId) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
        }
    }

    /// Gets all unprocessed inputs sorted chronologically
    ///
    /// Collects inputs from all clients that haven't been processed yet and
    /// sorts them by timestamp, breaking ties by connection and sequence, so
    /// the processing order is deterministic.
    pub fn get_chronological_inputs(&self) -> Vec<(ConnectionId, PendingInput)> {
        let mut all_inputs: Vec<(ConnectionId, PendingInput)> = Vec::new();

        for (client_id, client) in &self.clients {
            for pending in &client.pending_inputs {
                if pending.input.sequence > client.last_processed_input {
                    all_inputs.push((*client_id, pending.clone()));
                }
            }
        }

        all_inputs.sort_by_key(|(client_id, pending)| {
            (pending.input.timestamp, *client_id, pending.input.sequence)
        });
        all_inputs
    }

    /// Marks an input sequence as processed for a specific client
    ///
    /// The value is echoed in every snapshot so the client can drop
    /// acknowledged inputs from its prediction history.
    pub fn mark_input_processed(&mut self, client_id: ConnectionId, sequence: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_processed_input = client.last_processed_input.max(sequence);
        }
    }

    /// Removes inputs that have been processed from all client buffers
    pub fn cleanup_processed_inputs(&mut self) {
        for client in self.clients.values_mut() {
            let last = client.last_processed_input;
            client.pending_inputs.retain(|p| p.input.sequence > last);
        }
    }

    /// Highest processed input sequence per client, sent with every snapshot
    pub fn get_last_processed_inputs(&self) -> HashMap<ConnectionId, u32> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.last_processed_input))
            .collect()
    }

    /// Removes clients silent for longer than [`CLIENT_TIMEOUT`]
    ///
    /// Returns the removed IDs so the server can despawn their players.
    pub fn check_timeouts(&mut self) -> Vec<ConnectionId> {
        let timed_out: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(CLIENT_TIMEOUT))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Addresses of all connected clients, for broadcasting
    pub fn get_client_addrs(&self) -> Vec<(ConnectionId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    /// Returns the number of connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn input(sequence: u32, timestamp: u64) -> InputState {
        InputState {
            sequence,
            timestamp,
            ..InputState::default()
        }
    }

    #[test]
    fn test_client_creation() {
        let addr = test_addr();
        let client = Client::new(1, addr);

        assert_eq!(client.id, 1);
        assert_eq!(client.addr, addr);
        assert_eq!(client.last_processed_input, 0);
        assert!(client.pending_inputs.is_empty());
    }

    #[test]
    fn test_client_add_input_sorted() {
        let mut client = Client::new(1, test_addr());

        assert!(client.add_input(7, input(2, 100)));
        assert!(client.add_input(7, input(1, 50)));

        assert_eq!(client.pending_inputs.len(), 2);
        assert_eq!(client.pending_inputs[0].input.sequence, 1);
        assert_eq!(client.pending_inputs[1].input.sequence, 2);
        assert_eq!(client.pending_inputs[0].player_id, 7);
    }

    #[test]
    fn test_client_ignores_duplicate_and_processed_inputs() {
        let mut client = Client::new(1, test_addr());
        client.last_processed_input = 5;

        assert!(!client.add_input(7, input(5, 10)));
        assert!(client.add_input(7, input(6, 20)));
        assert!(!client.add_input(7, input(6, 20)));
        assert_eq!(client.pending_inputs.len(), 1);
    }

    #[test]
    fn test_client_input_buffer_bounded() {
        let mut client = Client::new(1, test_addr());
        for sequence in 1..=(MAX_PENDING_INPUTS as u32 + 10) {
            client.add_input(7, input(sequence, sequence as u64));
        }
        assert_eq!(client.pending_inputs.len(), MAX_PENDING_INPUTS);
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, test_addr());

        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(client.is_timed_out(Duration::from_secs(1)));

        client.touch();
        assert!(!client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert_eq!(manager.add_client(test_addr()), Some(1));
        assert_eq!(manager.add_client(test_addr2()), None);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_capacity_clamped_to_snapshot_limit() {
        let mut manager = ClientManager::new(10_000);

        for port in 0..MAX_CLIENTS as u16 {
            let addr = SocketAddr::from(([127, 0, 0, 1], 20_000 + port));
            assert!(manager.add_client(addr).is_some());
        }

        let one_more = SocketAddr::from(([127, 0, 0, 1], 30_000));
        assert_eq!(manager.add_client(one_more), None);
        assert_eq!(manager.len(), MAX_CLIENTS);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr()).unwrap();

        assert!(manager.remove_client(&client_id));
        assert!(manager.is_empty());
        assert!(!manager.remove_client(&999));
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);
        let client_id1 = manager.add_client(test_addr()).unwrap();
        manager.add_client(test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(client_id1));

        let unknown_addr: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown_addr), None);
    }

    #[test]
    fn test_add_input_to_nonexistent_client() {
        let mut manager = ClientManager::new(2);
        assert!(!manager.add_input(999, 1, input(1, 100)));
    }

    #[test]
    fn test_get_chronological_inputs() {
        let mut manager = ClientManager::new(3);
        let client_id1 = manager.add_client(test_addr()).unwrap();
        let client_id2 = manager.add_client(test_addr2()).unwrap();

        manager.add_input(client_id1, 1, input(1, 100));
        manager.add_input(client_id2, 2, input(1, 50));
        manager.add_input(client_id1, 1, input(2, 200));

        let inputs = manager.get_chronological_inputs();

        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[0].1.input.timestamp, 50);
        assert_eq!(inputs[0].1.player_id, 2);
        assert_eq!(inputs[1].1.input.timestamp, 100);
        assert_eq!(inputs[2].1.input.timestamp, 200);
    }

    #[test]
    fn test_mark_processed_and_cleanup() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr()).unwrap();
        for sequence in 1..=3 {
            manager.add_input(client_id, 1, input(sequence, sequence as u64));
        }

        manager.mark_input_processed(client_id, 2);
        manager.mark_input_processed(client_id, 1);
        manager.cleanup_processed_inputs();

        assert_eq!(manager.get_last_processed_inputs()[&client_id], 2);
        let remaining = manager.get_chronological_inputs();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].1.input.sequence, 3);
    }
}
