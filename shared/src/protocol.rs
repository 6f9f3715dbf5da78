//! Wire protocol between the owning clients and the authoritative server.
//!
//! Packets are serialized with bincode and sent as single UDP datagrams.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::action::ActionState;
use crate::combat::{CapsuleCollider, HitEvent, LayerMask};
use crate::config::{GameConfig, PLAYER_HEIGHT, PLAYER_RADIUS};
use crate::locomotion::CameraBasis;
use crate::{ConnectionId, PlayerId};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // Client -> server
    Connect {
        client_version: u32,
    },
    Input {
        player_id: PlayerId,
        input: InputState,
    },
    /// Asks the server to consume attack stamina for one activation
    ///
    /// `input_sequence` names the input whose step started the attack, so
    /// the server begins it at the same point in the input stream.
    AttackRequest {
        player_id: PlayerId,
        activation: u32,
        input_sequence: u32,
    },
    /// Untrusted hit candidates found at the hit window of an activation
    HitReport {
        player_id: PlayerId,
        activation: u32,
        targets: Vec<PlayerId>,
    },
    Disconnect,

    // Server -> client
    Connected {
        client_id: ConnectionId,
        player_id: PlayerId,
        config: GameConfig,
    },
    GameState {
        tick: u32,
        timestamp: u64,
        last_processed_input: HashMap<ConnectionId, u32>,
        players: Vec<PlayerSnapshot>,
    },
    /// Authoritative outcome of an attack request, sent to the owner only
    ActionAck {
        player_id: PlayerId,
        activation: u32,
        accepted: bool,
        stamina: f32,
    },
    DamageApplied {
        event: HitEvent,
        remaining_health: f32,
    },
    Disconnected {
        reason: String,
    },
}

/// Input snapshot for one fixed simulation step
///
/// `jump` and `attack` are edge-triggered: true only on the step the
/// button went down.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    pub sequence: u32,
    pub timestamp: u64,
    pub move_x: f32,
    pub move_y: f32,
    pub jump: bool,
    pub attack: bool,
    /// Camera yaw in radians, 0 looks down +Z
    pub camera_yaw: f32,
}

impl InputState {
    /// Movement axes with non-finite components zeroed and magnitude at most 1
    pub fn move_axis(&self) -> Vec2 {
        let axis = Vec2::new(finite_or_zero(self.move_x), finite_or_zero(self.move_y));
        axis.clamp_length_max(1.0)
    }

    pub fn camera(&self) -> CameraBasis {
        CameraBasis::from_yaw(finite_or_zero(self.camera_yaw))
    }
}

/// Replicated view of one player, broadcast every server tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub owner: ConnectionId,
    pub position: Vec3,
    pub yaw: f32,
    pub vertical_velocity: f32,
    pub grounded: bool,
    pub stamina: f32,
    pub max_stamina: f32,
    pub health: f32,
    pub max_health: f32,
    pub action_state: ActionState,
    pub horizontal_speed: f32,
}

impl PlayerSnapshot {
    /// Collider a client builds for this player from its replicated view
    pub fn collider(&self) -> CapsuleCollider {
        CapsuleCollider {
            entity: Some(self.id),
            base: self.position,
            radius: PLAYER_RADIUS,
            height: PLAYER_HEIGHT,
            layer: LayerMask::PLAYER,
            damageable: self.health > 0.0,
        }
    }
}

/// Current wall-clock time in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_serialization_input() {
        let packet = Packet::Input {
            player_id: 7,
            input: InputState {
                sequence: 123,
                timestamp: 456789,
                move_x: 0.5,
                move_y: -1.0,
                jump: true,
                attack: false,
                camera_yaw: 1.25,
            },
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Input { player_id, input } => {
                assert_eq!(player_id, 7);
                assert_eq!(input.sequence, 123);
                assert_eq!(input.timestamp, 456789);
                assert_eq!(input.move_y, -1.0);
                assert!(input.jump);
                assert!(!input.attack);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_connected_carries_config() {
        let mut config = GameConfig::default();
        config.combat.damage_amount = 33.0;

        let packet = Packet::Connected {
            client_id: 1,
            player_id: 4,
            config,
        };
        let serialized = bincode::serialize(&packet).unwrap();

        match bincode::deserialize::<Packet>(&serialized).unwrap() {
            Packet::Connected {
                client_id,
                player_id,
                config: received,
            } => {
                assert_eq!(client_id, 1);
                assert_eq!(player_id, 4);
                assert_eq!(received, config);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_move_axis_sanitized() {
        let input = InputState {
            move_x: f32::NAN,
            move_y: 3.0,
            ..InputState::default()
        };
        assert_eq!(input.move_axis(), Vec2::new(0.0, 1.0));
    }

    #[test]
    fn test_malformed_packet_rejected() {
        let data = bincode::serialize(&Packet::Connect { client_version: 1 }).unwrap();
        let truncated = &data[..data.len() / 2];
        assert!(bincode::deserialize::<Packet>(truncated).is_err());
        assert!(bincode::deserialize::<Packet>(&[]).is_err());
    }

    #[test]
    fn test_snapshot_collider_damageable_while_alive() {
        let mut snapshot = PlayerSnapshot {
            id: 3,
            owner: 1,
            position: Vec3::new(1.0, 0.0, 2.0),
            yaw: 0.0,
            vertical_velocity: 0.0,
            grounded: true,
            stamina: 100.0,
            max_stamina: 100.0,
            health: 5.0,
            max_health: 100.0,
            action_state: ActionState::Idle,
            horizontal_speed: 0.0,
        };

        let collider = snapshot.collider();
        assert_eq!(collider.entity, Some(3));
        assert_eq!(collider.base, snapshot.position);
        assert!(collider.damageable);

        snapshot.health = 0.0;
        assert!(!snapshot.collider().damageable);
    }

    #[test]
    fn test_full_snapshot_fits_receive_buffer() {
        use crate::config::{MAX_CLIENTS, MAX_PACKET_SIZE};

        let players: Vec<PlayerSnapshot> = (0..MAX_CLIENTS as u32)
            .map(|id| PlayerSnapshot {
                id,
                owner: id,
                position: Vec3::new(f32::MAX, f32::MIN, 1.0),
                yaw: 3.0,
                vertical_velocity: -9.0,
                grounded: false,
                stamina: 100.0,
                max_stamina: 100.0,
                health: 100.0,
                max_health: 100.0,
                action_state: ActionState::Attacking,
                horizontal_speed: 1.0,
            })
            .collect();
        let packet = Packet::GameState {
            tick: u32::MAX,
            timestamp: u64::MAX,
            last_processed_input: (0..MAX_CLIENTS as u32).map(|id| (id, u32::MAX)).collect(),
            players,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        assert!(serialized.len() <= MAX_PACKET_SIZE, "{} bytes", serialized.len());
    }

    #[test]
    fn test_get_timestamp_advances() {
        let first = get_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(get_timestamp() > first);
    }
}
