use crate::animation::LogAnimator;
use crate::game::ClientGameState;
use crate::input::{ControlSource, InputManager};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{get_timestamp, Packet, FIXED_DT, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep, MissedTickBehavior};

/// How long to wait for `Connected` before asking again
const CONNECT_RETRY: Duration = Duration::from_secs(1);

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    connected: bool,
    last_connect_attempt: Option<Instant>,

    game_state: ClientGameState,
    input_manager: InputManager,
    controls: Box<dyn ControlSource>,
    animator: LogAnimator,

    ping_ms: u64,
    fake_ping_ms: u64,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        fake_ping_ms: u64,
        controls: Box<dyn ControlSource>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            connected: false,
            last_connect_attempt: None,
            game_state: ClientGameState::new(),
            input_manager: InputManager::new(),
            controls,
            animator: LogAnimator::default(),
            ping_ms: 0,
            fake_ping_ms,
        })
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server {}...", self.server_addr);
        self.last_connect_attempt = Some(Instant::now());

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected {
                client_id,
                player_id,
                config,
            } => {
                info!("Connected! Client ID: {}, player {}", client_id, player_id);
                self.connected = true;
                self.game_state.on_connected(client_id, player_id, config);
            }

            Packet::GameState {
                tick,
                timestamp,
                last_processed_input,
                players,
            } => {
                if timestamp > 0 {
                    self.ping_ms = get_timestamp().saturating_sub(timestamp);
                }
                self.game_state
                    .apply_server_state(tick, players, &last_processed_input);
            }

            Packet::ActionAck {
                activation,
                accepted,
                stamina,
                ..
            } => {
                self.game_state.handle_ack(activation, accepted, stamina);
            }

            Packet::DamageApplied {
                event,
                remaining_health,
            } => {
                self.game_state.handle_damage(&event, remaining_health);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    /// Samples controls, predicts one fixed step and sends what it produced
    async fn step(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.connected {
            let retry = self
                .last_connect_attempt
                .map_or(true, |t| t.elapsed() >= CONNECT_RETRY);
            if retry {
                self.connect().await?;
            }
            return Ok(());
        }

        if self.game_state.predicted.is_some() {
            let input = self.input_manager.update(self.controls.sample());
            self.game_state.predict(input, &mut self.animator);
        }
        self.game_state.update(FIXED_DT);

        for packet in self.game_state.take_outbox() {
            self.send_packet(&packet).await?;
        }
        Ok(())
    }

    /// Runs until `duration` has elapsed, or forever when it is None
    pub async fn run(&mut self, duration: Option<Duration>) -> Result<(), Box<dyn std::error::Error>> {
        let started = Instant::now();
        let mut step_interval = interval(Duration::from_secs_f32(FIXED_DT));
        step_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats_interval = interval(Duration::from_secs(5));

        let mut buffer = [0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) => self.handle_packet(packet),
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = step_interval.tick() => {
                    if let Err(e) = self.step().await {
                        error!("Error sending packets: {}", e);
                    }
                    if duration.is_some_and(|d| started.elapsed() >= d) {
                        break;
                    }
                },

                _ = stats_interval.tick() => {
                    if let Some(player) = &self.game_state.predicted {
                        debug!(
                            "Ping {}ms, position {:.2}, stamina {:.1}, health {:.1}, {} unacked inputs",
                            self.ping_ms,
                            player.position(),
                            player.stamina.current(),
                            player.health.current(),
                            self.game_state.input_history.len()
                        );
                    }
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}
