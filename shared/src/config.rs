//! Tunables shared by the server simulation and client prediction.
//!
//! The server is the source of truth for every value here: it sends its
//! [`GameConfig`] in the `Connected` packet and the client predicts with
//! exactly those numbers.

use serde::{Deserialize, Serialize};

use crate::combat::LayerMask;

/// Version checked during the connection handshake
pub const PROTOCOL_VERSION: u32 = 1;

/// Receive buffer size on both ends; every packet must serialize within it
pub const MAX_PACKET_SIZE: usize = 4096;

/// Most connections a server accepts, so a full snapshot fits in one packet
pub const MAX_CLIENTS: usize = 64;

/// Simulation step represented by one input snapshot (60 Hz)
pub const FIXED_DT: f32 = 1.0 / 60.0;

pub const GRAVITY: f32 = -9.81;
pub const MOVE_SPEED: f32 = 5.0;
pub const JUMP_HEIGHT: f32 = 1.0;
pub const ROTATION_SPEED: f32 = 10.0;
pub const JUMP_STAMINA_COST: f32 = 10.0;

/// Vertical velocity applied while grounded to keep the capsule snapped down
pub const GROUND_SNAP_VELOCITY: f32 = -2.0;
/// Below this input magnitude the heading is left alone
pub const MOVE_INPUT_EPSILON: f32 = 0.01;

pub const ATTACK_STAMINA_COST: f32 = 25.0;
pub const ATTACK_RANGE: f32 = 1.5;
pub const ATTACK_DAMAGE: f32 = 20.0;
pub const ATTACK_LOCKOUT_SECS: f32 = 0.8;
pub const HIT_FRAME_SECS: f32 = 0.35;

pub const MAX_STAMINA: f32 = 100.0;
pub const STAMINA_REGEN_PER_SEC: f32 = 15.0;
pub const STAMINA_REGEN_DELAY_SECS: f32 = 1.0;
pub const MAX_HEALTH: f32 = 100.0;

pub const PLAYER_RADIUS: f32 = 0.5;
pub const PLAYER_HEIGHT: f32 = 1.8;
/// Players are kept inside a square arena of this half extent
pub const ARENA_HALF_EXTENT: f32 = 50.0;

/// Locomotion parameters for one character
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementConfig {
    pub move_speed: f32,
    pub gravity: f32,
    pub jump_height: f32,
    pub rotation_speed: f32,
    pub jump_stamina_cost: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            move_speed: MOVE_SPEED,
            gravity: GRAVITY,
            jump_height: JUMP_HEIGHT,
            rotation_speed: ROTATION_SPEED,
            jump_stamina_cost: JUMP_STAMINA_COST,
        }
    }
}

/// Melee attack parameters, including the bounds the server uses to
/// re-validate client hit reports
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatConfig {
    pub attack_stamina_cost: f32,
    pub attack_range: f32,
    /// Fixed damage applied by the server per confirmed hit
    pub damage_amount: f32,
    pub attack_lockout_secs: f32,
    /// Offset of the authored hit frame from the start of the attack clip
    pub hit_frame_secs: f32,
    /// Attack origin distance in front of the character
    pub attack_origin_offset: f32,
    /// Attack origin height above the character's feet
    pub attack_origin_height: f32,
    pub target_layers: LayerMask,
    /// Extra reach granted on the server for latency between views
    pub reach_tolerance: f32,
    pub max_hit_targets: usize,
    /// How long after the lockout a hit report is still accepted
    pub hit_report_grace_secs: f32,
    /// Server lockout is this much shorter than the client one
    pub server_lockout_slack_secs: f32,
    /// Client gives up on an attack request after this long
    pub ack_timeout_secs: f32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            attack_stamina_cost: ATTACK_STAMINA_COST,
            attack_range: ATTACK_RANGE,
            damage_amount: ATTACK_DAMAGE,
            attack_lockout_secs: ATTACK_LOCKOUT_SECS,
            hit_frame_secs: HIT_FRAME_SECS,
            attack_origin_offset: 1.0,
            attack_origin_height: 1.0,
            target_layers: LayerMask::PLAYER | LayerMask::ENEMY,
            reach_tolerance: 0.5,
            max_hit_targets: 8,
            hit_report_grace_secs: 0.5,
            server_lockout_slack_secs: 0.1,
            ack_timeout_secs: 0.5,
        }
    }
}

impl CombatConfig {
    /// Lockout the authoritative copy runs with
    pub fn server_lockout_secs(&self) -> f32 {
        (self.attack_lockout_secs - self.server_lockout_slack_secs).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaminaConfig {
    pub max: f32,
    pub regen_per_sec: f32,
    pub regen_delay_secs: f32,
}

impl Default for StaminaConfig {
    fn default() -> Self {
        Self {
            max: MAX_STAMINA,
            regen_per_sec: STAMINA_REGEN_PER_SEC,
            regen_delay_secs: STAMINA_REGEN_DELAY_SECS,
        }
    }
}

/// Everything a player simulation needs, sent to clients on connect
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct GameConfig {
    pub movement: MovementConfig,
    pub combat: CombatConfig,
    pub stamina: StaminaConfig,
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    pub max: f32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { max: MAX_HEALTH }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_constants() {
        let config = GameConfig::default();
        assert_eq!(config.movement.gravity, GRAVITY);
        assert_eq!(config.combat.attack_stamina_cost, 25.0);
        assert_eq!(config.combat.attack_lockout_secs, 0.8);
        assert_eq!(config.stamina.max, 100.0);
        assert_eq!(config.health.max, 100.0);
    }

    #[test]
    fn test_server_lockout_never_negative() {
        let mut combat = CombatConfig::default();
        assert!(combat.server_lockout_secs() < combat.attack_lockout_secs);

        combat.server_lockout_slack_secs = 5.0;
        assert_eq!(combat.server_lockout_secs(), 0.0);
    }

    #[test]
    fn test_regen_delay_outlasts_lockout() {
        let config = GameConfig::default();
        assert!(config.stamina.regen_delay_secs > config.combat.attack_lockout_secs);
    }
}
