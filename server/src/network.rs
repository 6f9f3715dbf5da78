//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::damage::DamageAuthority;
use crate::game::GameState;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{
    get_timestamp, ActionError, ConnectionId, ErrorKind, GameConfig, Packet, PlayerId,
    MAX_PACKET_SIZE, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Longest wall-clock step fed to timers after a stalled tick
const MAX_TICK_DT: f32 = 0.1;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: ConnectionId },
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<ConnectionId>,
    },
}

/// Action requests held until the tick's movement inputs are applied
///
/// An attack whose triggering input is applied this tick runs right after
/// that input; everything else runs once all inputs are in.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    Attack {
        player_id: PlayerId,
        activation: u32,
        input_sequence: u32,
    },
    HitReport {
        player_id: PlayerId,
        activation: u32,
        targets: Vec<PlayerId>,
    },
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    damage: DamageAuthority,
    pending_actions: Vec<(ConnectionId, SocketAddr, ActionRequest)>,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        config: GameConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            game_state: GameState::new(config),
            damage: DamageAuthority::new(config.combat),
            pending_actions: Vec::new(),
            tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    /// Address the socket is bound to, useful when binding port 0
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<ConnectionId>) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket { packet, exclude }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    async fn client_for(&self, addr: SocketAddr) -> Option<ConnectionId> {
        let clients = self.clients.read().await;
        clients.find_client_by_addr(addr)
    }

    async fn drop_client(&mut self, client_id: ConnectionId) {
        {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id);
        }
        self.game_state.despawn_owned_by(client_id);
        self.pending_actions.retain(|(owner, _, _)| *owner != client_id);
    }

    /// Processes incoming packets and updates game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Rejecting {}: protocol version {} (expected {})",
                        addr, client_version, PROTOCOL_VERSION
                    );
                    let response = Packet::Disconnected {
                        reason: "Protocol version mismatch".to_string(),
                    };
                    self.send_packet(response, addr);
                    return;
                }

                // Remove existing connection if present
                if let Some(existing_id) = self.client_for(addr).await {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.drop_client(existing_id).await;
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                match client_id {
                    Some(client_id) => {
                        let player_id = self.game_state.spawn_player(client_id);
                        let response = Packet::Connected {
                            client_id,
                            player_id,
                            config: *self.game_state.config(),
                        };
                        self.send_packet(response, addr);
                    }
                    None => {
                        let response = Packet::Disconnected {
                            reason: "Server full".to_string(),
                        };
                        self.send_packet(response, addr);
                    }
                }
            }

            Packet::Input { player_id, input } => {
                if let Some(client_id) = self.client_for(addr).await {
                    let mut clients = self.clients.write().await;
                    clients.add_input(client_id, player_id, input);
                }
            }

            Packet::AttackRequest {
                player_id,
                activation,
                input_sequence,
            } => {
                self.queue_action(addr, ActionRequest::Attack {
                    player_id,
                    activation,
                    input_sequence,
                })
                .await;
            }

            Packet::HitReport {
                player_id,
                activation,
                targets,
            } => {
                self.queue_action(addr, ActionRequest::HitReport {
                    player_id,
                    activation,
                    targets,
                })
                .await;
            }

            Packet::Disconnect => {
                if let Some(client_id) = self.client_for(addr).await {
                    self.drop_client(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn queue_action(&mut self, addr: SocketAddr, request: ActionRequest) {
        match self.client_for(addr).await {
            Some(client_id) => {
                self.clients.write().await.touch(client_id);
                self.pending_actions.push((client_id, addr, request));
            }
            None => warn!("Action request from unknown address {}", addr),
        }
    }

    /// Applies queued inputs in timestamp order, one fixed step each
    ///
    /// An attack triggered by an input starts right after that input, so
    /// later inputs in the same tick already see the movement lock, as they
    /// did in the client's prediction.
    async fn process_inputs(&mut self) {
        let all_inputs = {
            let clients = self.clients.read().await;
            clients.get_chronological_inputs()
        };

        if all_inputs.is_empty() {
            return;
        }

        let clients = Arc::clone(&self.clients);
        let mut clients = clients.write().await;
        for (client_id, pending) in all_inputs {
            if let Err(e) =
                self.game_state
                    .apply_input(client_id, pending.player_id, &pending.input)
            {
                log_rejection(client_id, "input", &e);
            }
            // Acknowledged even when rejected so the client's history drains
            clients.mark_input_processed(client_id, pending.input.sequence);
            self.process_triggered_attacks(client_id, pending.input.sequence);
        }
        clients.cleanup_processed_inputs();
    }

    /// Starts the attacks `client_id` triggered with input `sequence`
    fn process_triggered_attacks(&mut self, client_id: ConnectionId, sequence: u32) {
        let (triggered, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_actions)
            .into_iter()
            .partition(|(owner, _, request)| {
                *owner == client_id
                    && matches!(
                        request,
                        ActionRequest::Attack { input_sequence, .. } if *input_sequence == sequence
                    )
            });
        self.pending_actions = rest;

        for (client_id, addr, request) in triggered {
            self.dispatch_action(client_id, addr, request);
        }
    }

    /// Handles attack requests and hit reports queued since the last tick
    fn process_actions(&mut self) {
        let actions = std::mem::take(&mut self.pending_actions);

        for (client_id, addr, request) in actions {
            self.dispatch_action(client_id, addr, request);
        }
    }

    fn dispatch_action(&mut self, client_id: ConnectionId, addr: SocketAddr, request: ActionRequest) {
        match request {
            ActionRequest::Attack {
                player_id,
                activation,
                ..
            } => self.handle_attack(client_id, addr, player_id, activation),
            ActionRequest::HitReport {
                player_id,
                activation,
                targets,
            } => self.handle_hit_report(client_id, player_id, activation, &targets),
        }
    }

    fn handle_attack(
        &mut self,
        client_id: ConnectionId,
        addr: SocketAddr,
        player_id: PlayerId,
        activation: u32,
    ) {
        let result = self
            .game_state
            .request_attack(client_id, player_id, activation);

        let accepted = result.is_ok();
        let stamina = match result {
            Ok(stamina) => {
                debug!(
                    "Player {} attack {} accepted, stamina {:.1}",
                    player_id, activation, stamina
                );
                stamina
            }
            Err(e) => {
                log_rejection(client_id, "attack", &e);
                self.game_state
                    .players
                    .get(&player_id)
                    .map(|p| p.stamina.current())
                    .unwrap_or(0.0)
            }
        };

        self.send_packet(
            Packet::ActionAck {
                player_id,
                activation,
                accepted,
                stamina,
            },
            addr,
        );
    }

    fn handle_hit_report(
        &mut self,
        client_id: ConnectionId,
        player_id: PlayerId,
        activation: u32,
        targets: &[PlayerId],
    ) {
        match self.damage.apply_hit_report(
            &mut self.game_state,
            client_id,
            player_id,
            activation,
            targets,
        ) {
            Ok(report) => {
                for dropped in &report.dropped {
                    log_rejection(client_id, "hit target", dropped);
                }
                for hit in report.applied {
                    self.broadcast_packet(
                        Packet::DamageApplied {
                            event: hit.event,
                            remaining_health: hit.remaining_health,
                        },
                        None,
                    );
                }
            }
            Err(e) => log_rejection(client_id, "hit report", &e),
        }
    }

    /// Broadcasts current game state to all connected clients
    async fn broadcast_game_state(&mut self) {
        let last_processed_input = {
            let clients = self.clients.read().await;
            if clients.is_empty() {
                return;
            }
            clients.get_last_processed_inputs()
        };

        let packet = Packet::GameState {
            tick: self.game_state.tick,
            timestamp: get_timestamp(),
            last_processed_input,
            players: self.game_state.snapshots(),
        };

        self.broadcast_packet(packet, None);
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.game_state.despawn_owned_by(client_id);
                            self.pending_actions.retain(|(owner, _, _)| *owner != client_id);
                        },
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32().min(MAX_TICK_DT);
                    last_tick = now;

                    self.process_inputs().await;
                    self.process_actions();
                    self.game_state.update(dt);
                    self.game_state.tick += 1;
                    self.broadcast_game_state().await;

                    if self.game_state.tick % 60 == 0 {
                        let client_count = self.clients.read().await.len();
                        if client_count > 0 {
                            debug!("Tick {}: {} clients, {} players, {:.1}Hz",
                                   self.game_state.tick, client_count,
                                   self.game_state.players.len(), 1.0 / dt.max(f32::EPSILON));
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

/// Logs a rejected request at the level its kind deserves
fn log_rejection(client_id: ConnectionId, context: &str, error: &ActionError) {
    match error.kind() {
        ErrorKind::InputRejected | ErrorKind::StaleTarget => {
            debug!("Client {} {} ignored: {}", client_id, context, error)
        }
        ErrorKind::UntrustedClient | ErrorKind::Connectivity => {
            warn!("Client {} {} rejected: {}", client_id, context, error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::InputState;
    use std::net::{IpAddr, Ipv4Addr};

    async fn test_server() -> Server {
        Server::new(
            "127.0.0.1:0",
            Duration::from_millis(16),
            4,
            GameConfig::default(),
        )
        .await
        .unwrap()
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    fn drain(server: &mut Server) -> Vec<GameMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = server.game_rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Connects a client from `port` and returns (client_id, player_id)
    async fn connect(server: &mut Server, port: u16) -> (ConnectionId, PlayerId) {
        server
            .handle_packet(Packet::Connect { client_version: PROTOCOL_VERSION }, addr(port))
            .await;
        let messages = drain(server);
        match messages.last() {
            Some(GameMessage::SendPacket {
                packet: Packet::Connected { client_id, player_id, .. },
                ..
            }) => (*client_id, *player_id),
            other => panic!("Expected Connected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = test_server().await;
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_connect_spawns_player_and_sends_config() {
        let mut server = test_server().await;
        let (client_id, player_id) = connect(&mut server, 9000).await;

        assert_eq!(client_id, 1);
        assert_eq!(server.game_state.player_for_owner(client_id), Some(player_id));
    }

    #[tokio::test]
    async fn test_version_mismatch_rejected() {
        let mut server = test_server().await;
        server
            .handle_packet(Packet::Connect { client_version: 999 }, addr(9000))
            .await;

        match drain(&mut server).pop() {
            Some(GameMessage::SendPacket {
                packet: Packet::Disconnected { reason },
                ..
            }) => assert_eq!(reason, "Protocol version mismatch"),
            other => panic!("Expected Disconnected, got {:?}", other),
        }
        assert!(server.game_state.players.is_empty());
    }

    #[tokio::test]
    async fn test_server_full() {
        let mut server = Server::new("127.0.0.1:0", Duration::from_millis(16), 1, GameConfig::default())
            .await
            .unwrap();
        connect(&mut server, 9000).await;

        server
            .handle_packet(Packet::Connect { client_version: PROTOCOL_VERSION }, addr(9001))
            .await;
        assert!(matches!(
            drain(&mut server).pop(),
            Some(GameMessage::SendPacket { packet: Packet::Disconnected { .. }, .. })
        ));
        assert_eq!(server.game_state.players.len(), 1);
    }

    #[tokio::test]
    async fn test_attack_acknowledged_after_tick() {
        let mut server = test_server().await;
        let (_, player_id) = connect(&mut server, 9000).await;

        server
            .handle_packet(Packet::AttackRequest { player_id, activation: 1, input_sequence: 0 }, addr(9000))
            .await;
        // Duplicate datagram
        server
            .handle_packet(Packet::AttackRequest { player_id, activation: 1, input_sequence: 0 }, addr(9000))
            .await;
        assert!(drain(&mut server).is_empty());

        server.process_inputs().await;
        server.process_actions();

        let acks: Vec<(bool, f32)> = drain(&mut server)
            .into_iter()
            .filter_map(|m| match m {
                GameMessage::SendPacket {
                    packet: Packet::ActionAck { accepted, stamina, .. },
                    ..
                } => Some((accepted, stamina)),
                _ => None,
            })
            .collect();
        assert_eq!(acks, vec![(true, 75.0), (true, 75.0)]);
        assert_eq!(server.game_state.players[&player_id].stamina.current(), 75.0);
    }

    #[tokio::test]
    async fn test_attack_on_foreign_player_rejected() {
        let mut server = test_server().await;
        let (_, victim) = connect(&mut server, 9000).await;
        connect(&mut server, 9001).await;

        server
            .handle_packet(Packet::AttackRequest { player_id: victim, activation: 1, input_sequence: 0 }, addr(9001))
            .await;
        server.process_actions();

        assert!(matches!(
            drain(&mut server).pop(),
            Some(GameMessage::SendPacket {
                packet: Packet::ActionAck { accepted: false, .. },
                ..
            })
        ));
        assert_eq!(server.game_state.players[&victim].stamina.current(), 100.0);
    }

    #[tokio::test]
    async fn test_inputs_applied_in_order_and_acknowledged() {
        let mut server = test_server().await;
        let (client_id, player_id) = connect(&mut server, 9000).await;
        let start = server.game_state.players[&player_id].position();

        for sequence in 1..=3 {
            let input = InputState {
                sequence,
                timestamp: sequence as u64,
                move_y: 1.0,
                ..InputState::default()
            };
            server
                .handle_packet(Packet::Input { player_id, input }, addr(9000))
                .await;
        }
        server.process_inputs().await;

        let last = server.clients.read().await.get_last_processed_inputs();
        assert_eq!(last[&client_id], 3);
        assert_ne!(server.game_state.players[&player_id].position(), start);
    }

    #[tokio::test]
    async fn test_attack_starts_after_its_triggering_input() {
        let mut server = test_server().await;
        let (_, player_id) = connect(&mut server, 9000).await;
        let start = server.game_state.players[&player_id].position();

        // Two client steps land in one tick; the first one attacked
        for sequence in 1..=2 {
            let input = InputState {
                sequence,
                timestamp: sequence as u64,
                move_y: 1.0,
                attack: sequence == 1,
                ..InputState::default()
            };
            server
                .handle_packet(Packet::Input { player_id, input }, addr(9000))
                .await;
        }
        server
            .handle_packet(
                Packet::AttackRequest { player_id, activation: 1, input_sequence: 1 },
                addr(9000),
            )
            .await;

        server.process_inputs().await;
        assert!(server.pending_actions.is_empty());
        server.process_actions();

        let player = &server.game_state.players[&player_id];
        let moved = player.position() - start;
        let one_step = player.locomotion.config().move_speed * shared::FIXED_DT;
        assert!((moved.length() - one_step).abs() < 1e-4, "moved {}", moved.length());
        assert!(player.gate.is_attacking());
    }

    #[tokio::test]
    async fn test_disconnect_despawns() {
        let mut server = test_server().await;
        let (_, player_id) = connect(&mut server, 9000).await;

        server.handle_packet(Packet::Disconnect, addr(9000)).await;

        assert!(server.game_state.players.get(&player_id).is_none());
        assert!(server.clients.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_from_same_address_replaces_client() {
        let mut server = test_server().await;
        let (first_client, first_player) = connect(&mut server, 9000).await;
        let (second_client, second_player) = connect(&mut server, 9000).await;

        assert_ne!(first_client, second_client);
        assert!(server.game_state.players.get(&first_player).is_none());
        assert!(server.game_state.players.contains_key(&second_player));
        assert_eq!(server.clients.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_hit_report_broadcasts_damage() {
        let mut server = test_server().await;
        let (_, attacker) = connect(&mut server, 9000).await;
        let (_, target) = connect(&mut server, 9001).await;
        if let Some(p) = server.game_state.players.get_mut(&attacker) {
            p.motor.teleport(glam::Vec3::ZERO, true);
            p.locomotion.set_yaw(0.0);
        }
        if let Some(p) = server.game_state.players.get_mut(&target) {
            p.motor.teleport(glam::Vec3::new(0.0, 0.0, 1.0), true);
        }

        server
            .handle_packet(Packet::AttackRequest { player_id: attacker, activation: 1, input_sequence: 0 }, addr(9000))
            .await;
        server
            .handle_packet(
                Packet::HitReport { player_id: attacker, activation: 1, targets: vec![target] },
                addr(9000),
            )
            .await;
        server.process_actions();

        let damage: Vec<f32> = drain(&mut server)
            .into_iter()
            .filter_map(|m| match m {
                GameMessage::BroadcastPacket {
                    packet: Packet::DamageApplied { remaining_health, .. },
                    ..
                } => Some(remaining_health),
                _ => None,
            })
            .collect();
        assert_eq!(damage, vec![80.0]);
    }

    #[tokio::test]
    async fn test_action_from_unknown_address_ignored() {
        let mut server = test_server().await;
        server
            .handle_packet(Packet::AttackRequest { player_id: 1, activation: 1, input_sequence: 0 }, addr(9000))
            .await;
        assert!(server.pending_actions.is_empty());
    }
}
