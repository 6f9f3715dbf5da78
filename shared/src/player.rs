//! The player aggregate: motor, controller, gate and pools built together.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::action::ActionGate;
use crate::combat::{CapsuleCollider, LayerMask};
use crate::config::{CombatConfig, GameConfig};
use crate::error::ActionError;
use crate::locomotion::{
    CapsuleMotor, CharacterMotor, LocomotionController, ReplicatedStamina, StepOutcome,
};
use crate::protocol::{InputState, PlayerSnapshot};
use crate::resource::ResourcePool;
use crate::{ConnectionId, PlayerId};

/// Which copy of a player this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// The server's copy: its stamina and health are the truth
    Server,
    /// The owning client's predicted copy: pools are read-only replicas
    Client,
}

/// Server bookkeeping for the latest accepted attack of a player
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackRecord {
    pub activation: u32,
    /// Server simulation time the attack was accepted at
    pub started_at: f64,
    pub hit_resolved: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub owner: ConnectionId,
    pub role: Role,
    pub motor: CapsuleMotor,
    pub locomotion: LocomotionController,
    pub gate: ActionGate,
    pub stamina: ResourcePool,
    pub health: ResourcePool,
    pub last_attack: Option<AttackRecord>,
    combat: CombatConfig,
}

impl Player {
    pub fn new(id: PlayerId, owner: ConnectionId, spawn: Vec3, config: &GameConfig, role: Role) -> Self {
        let lockout = match role {
            Role::Server => config.combat.server_lockout_secs(),
            Role::Client => config.combat.attack_lockout_secs,
        };

        Self {
            id,
            owner,
            role,
            motor: CapsuleMotor::new(spawn),
            locomotion: LocomotionController::new(config.movement),
            gate: ActionGate::new(lockout),
            stamina: ResourcePool::new(config.stamina.max)
                .with_regen(config.stamina.regen_per_sec, config.stamina.regen_delay_secs),
            health: ResourcePool::new(config.health.max),
            last_attack: None,
            combat: config.combat,
        }
    }

    /// Builds a client-side copy from the first snapshot the server sent
    pub fn from_snapshot(snapshot: &PlayerSnapshot, config: &GameConfig) -> Self {
        let mut player = Self::new(snapshot.id, snapshot.owner, snapshot.position, config, Role::Client);
        player.apply_snapshot(snapshot);
        player
    }

    pub fn combat(&self) -> &CombatConfig {
        &self.combat
    }

    pub fn position(&self) -> Vec3 {
        self.motor.position()
    }

    pub fn is_alive(&self) -> bool {
        !self.health.is_depleted()
    }

    /// Runs one locomotion step; dead players only fall
    pub fn apply_input(&mut self, input: &InputState, dt: f32) -> StepOutcome {
        let neutral;
        let input = if self.is_alive() {
            input
        } else {
            neutral = InputState::default();
            &neutral
        };

        match self.role {
            Role::Server => self
                .locomotion
                .tick(&mut self.motor, &mut self.stamina, input, dt),
            Role::Client => {
                let mut replica = ReplicatedStamina {
                    current: self.stamina.current(),
                };
                self.locomotion.tick(&mut self.motor, &mut replica, input, dt)
            }
        }
    }

    /// Starts an attack and locks movement
    ///
    /// The server copy spends the stamina here; the client copy only checks
    /// its replica and leaves the decrement to the server.
    pub fn begin_attack(&mut self, activation: u32) -> Result<(), ActionError> {
        if !self.is_alive() {
            return Err(ActionError::Incapacitated(self.id));
        }

        let cost = self.combat.attack_stamina_cost;
        self.gate.try_begin(activation, self.stamina.current(), cost)?;

        if self.role == Role::Server {
            if let Err(e) = self.stamina.try_consume(cost) {
                self.gate.release();
                return Err(e);
            }
        }

        self.locomotion.set_can_move(false);
        Ok(())
    }

    /// Ends the current attack early and unlocks movement
    pub fn cancel_attack(&mut self) -> bool {
        let released = self.gate.release();
        if released {
            self.locomotion.set_can_move(true);
        }
        released
    }

    /// Advances timers. Returns true when the attack lockout ended this step.
    pub fn update(&mut self, dt: f32) -> bool {
        let released = self.gate.tick(dt);
        if released {
            self.locomotion.set_can_move(true);
        }
        if self.role == Role::Server {
            self.stamina.regenerate(dt);
        }
        released
    }

    /// Center of the attack overlap sphere
    pub fn attack_origin(&self) -> Vec3 {
        self.position()
            + Vec3::Y * self.combat.attack_origin_height
            + self.locomotion.forward() * self.combat.attack_origin_offset
    }

    pub fn collider(&self) -> CapsuleCollider {
        CapsuleCollider {
            entity: Some(self.id),
            base: self.position(),
            radius: self.motor.radius(),
            height: self.motor.height(),
            layer: LayerMask::PLAYER,
            damageable: self.is_alive(),
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            owner: self.owner,
            position: self.position(),
            yaw: self.locomotion.yaw(),
            vertical_velocity: self.locomotion.vertical_velocity(),
            grounded: self.motor.is_grounded(),
            stamina: self.stamina.current(),
            max_stamina: self.stamina.max(),
            health: self.health.current(),
            max_health: self.health.max(),
            action_state: self.gate.state(),
            horizontal_speed: self.locomotion.horizontal_speed(),
        }
    }

    /// Takes kinematics and pools from the server's copy
    ///
    /// The action gate is left alone: on the owning client it runs its own
    /// optimistic lockout.
    pub fn apply_snapshot(&mut self, snapshot: &PlayerSnapshot) {
        self.motor.teleport(snapshot.position, snapshot.grounded);
        self.locomotion.set_vertical_velocity(snapshot.vertical_velocity);
        self.locomotion.set_yaw(snapshot.yaw);
        self.stamina.sync(snapshot.stamina, snapshot.max_stamina);
        self.health.sync(snapshot.health, snapshot.max_health);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionState;
    use crate::config::FIXED_DT;

    fn server_player() -> Player {
        Player::new(1, 10, Vec3::ZERO, &GameConfig::default(), Role::Server)
    }

    fn client_player() -> Player {
        Player::new(1, 10, Vec3::ZERO, &GameConfig::default(), Role::Client)
    }

    #[test]
    fn test_server_attack_consumes_stamina_once() {
        let mut player = server_player();

        assert!(player.begin_attack(1).is_ok());
        assert_eq!(player.stamina.current(), 75.0);
        assert!(!player.locomotion.can_move());

        // Repeated input in the same tick
        assert_eq!(player.begin_attack(2), Err(ActionError::AlreadyAttacking));
        assert_eq!(player.begin_attack(1), Err(ActionError::AlreadyAttacking));
        assert_eq!(player.stamina.current(), 75.0);
    }

    #[test]
    fn test_client_attack_never_decrements_replica() {
        let mut player = client_player();

        assert!(player.begin_attack(1).is_ok());
        assert_eq!(player.stamina.current(), 100.0);
        assert_eq!(player.gate.state(), ActionState::Attacking);
        assert!(!player.locomotion.can_move());
    }

    #[test]
    fn test_attack_below_cost_is_noop() {
        let mut player = server_player();
        player.stamina = player.stamina.clone().with_current(24.0);

        let result = player.begin_attack(1);

        assert!(matches!(result, Err(ActionError::InsufficientStamina { .. })));
        assert_eq!(player.stamina.current(), 24.0);
        assert_eq!(player.gate.state(), ActionState::Idle);
        assert!(player.locomotion.can_move());
    }

    #[test]
    fn test_dead_player_cannot_attack_or_move() {
        let mut player = server_player();
        player.health.apply_damage(1000.0);

        assert_eq!(player.begin_attack(1), Err(ActionError::Incapacitated(1)));

        let input = InputState {
            move_y: 1.0,
            ..InputState::default()
        };
        let outcome = player.apply_input(&input, FIXED_DT);
        assert_eq!(outcome.horizontal_speed, 0.0);
        assert_eq!(player.position(), Vec3::ZERO);
    }

    #[test]
    fn test_lockout_release_restores_movement() {
        let mut player = client_player();
        player.begin_attack(1).unwrap();

        let mut released = false;
        for _ in 0..60 {
            released |= player.update(FIXED_DT);
        }

        assert!(released);
        assert!(player.locomotion.can_move());
        assert_eq!(player.gate.state(), ActionState::Idle);
    }

    #[test]
    fn test_cancel_attack() {
        let mut player = client_player();
        assert!(!player.cancel_attack());

        player.begin_attack(1).unwrap();
        assert!(player.cancel_attack());
        assert!(player.locomotion.can_move());
    }

    #[test]
    fn test_server_lockout_is_shorter() {
        let config = GameConfig::default();
        let mut server = server_player();
        let mut client = client_player();
        server.begin_attack(1).unwrap();
        client.begin_attack(1).unwrap();

        assert_eq!(server.gate.lockout_remaining(), config.combat.server_lockout_secs());
        assert_eq!(client.gate.lockout_remaining(), config.combat.attack_lockout_secs);
    }

    #[test]
    fn test_attack_origin_in_front() {
        let player = server_player();
        let origin = player.attack_origin();
        assert_eq!(origin, Vec3::new(0.0, 1.0, 1.0));
    }

    #[test]
    fn test_snapshot_roundtrip_into_client_copy() {
        let mut server = server_player();
        server.begin_attack(1).unwrap();
        server.health.apply_damage(30.0);
        let input = InputState {
            move_x: 1.0,
            ..InputState::default()
        };
        server.apply_input(&input, FIXED_DT);

        let snapshot = server.snapshot();
        let client = Player::from_snapshot(&snapshot, &GameConfig::default());

        assert_eq!(client.role, Role::Client);
        assert_eq!(client.position(), server.position());
        assert_eq!(client.stamina.current(), 75.0);
        assert_eq!(client.health.current(), 70.0);
        assert_eq!(snapshot.action_state, ActionState::Attacking);
    }
}
