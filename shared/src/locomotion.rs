//! Character locomotion: camera-relative movement, heading, gravity and jump.
//!
//! The controller does not know whether it runs on the server or on the
//! owning client. Authority is injected through [`StaminaAuthority`]: the
//! server passes the player's real [`ResourcePool`], the client passes a
//! [`ReplicatedStamina`] view that can only say yes or no.

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::{
    MovementConfig, ARENA_HALF_EXTENT, GROUND_SNAP_VELOCITY, MOVE_INPUT_EPSILON, PLAYER_HEIGHT,
    PLAYER_RADIUS,
};
use crate::protocol::InputState;
use crate::resource::ResourcePool;

/// Initial vertical velocity that reaches `jump_height` under constant `gravity`
pub fn jump_velocity(jump_height: f32, gravity: f32) -> f32 {
    (jump_height * -2.0 * gravity).sqrt()
}

/// The character-collision primitive the controller drives
pub trait CharacterMotor {
    /// Moves by `delta`, resolving against the world
    fn move_by(&mut self, delta: Vec3);
    fn is_grounded(&self) -> bool;
    fn position(&self) -> Vec3;
}

/// Grants or refuses stamina for an ability
pub trait StaminaAuthority {
    /// Returns true if `cost` may be spent. Authoritative implementations
    /// also perform the decrement.
    fn request(&mut self, cost: f32) -> bool;
}

impl StaminaAuthority for ResourcePool {
    fn request(&mut self, cost: f32) -> bool {
        self.try_consume(cost).is_ok()
    }
}

/// Client-side view of the replicated stamina value
///
/// Used for prediction only: it checks the last value the server sent and
/// never decrements it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplicatedStamina {
    pub current: f32,
}

impl StaminaAuthority for ReplicatedStamina {
    fn request(&mut self, cost: f32) -> bool {
        self.current >= cost
    }
}

/// Vertical capsule standing on a flat ground plane inside the arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapsuleMotor {
    position: Vec3,
    radius: f32,
    height: f32,
    ground_height: f32,
    grounded: bool,
}

impl CapsuleMotor {
    pub fn new(position: Vec3) -> Self {
        let ground_height = 0.0;
        let position = Vec3::new(position.x, position.y.max(ground_height), position.z);
        Self {
            position,
            radius: PLAYER_RADIUS,
            height: PLAYER_HEIGHT,
            ground_height,
            grounded: position.y <= ground_height,
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Places the capsule without resolving movement (snapshot sync)
    pub fn teleport(&mut self, position: Vec3, grounded: bool) {
        self.position = position;
        self.grounded = grounded;
    }
}

impl CharacterMotor for CapsuleMotor {
    fn move_by(&mut self, delta: Vec3) {
        let limit = ARENA_HALF_EXTENT - self.radius;
        let mut next = self.position + delta;
        next.x = next.x.clamp(-limit, limit);
        next.z = next.z.clamp(-limit, limit);

        if next.y <= self.ground_height {
            next.y = self.ground_height;
            self.grounded = true;
        } else if delta.y != 0.0 {
            self.grounded = false;
        }

        self.position = next;
    }

    fn is_grounded(&self) -> bool {
        self.grounded
    }

    fn position(&self) -> Vec3 {
        self.position
    }
}

/// Camera forward/right projected onto the horizontal plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraBasis {
    pub forward: Vec3,
    pub right: Vec3,
}

impl CameraBasis {
    pub fn new(forward: Vec3, right: Vec3) -> Self {
        Self {
            forward: Vec3::new(forward.x, 0.0, forward.z).normalize_or_zero(),
            right: Vec3::new(right.x, 0.0, right.z).normalize_or_zero(),
        }
    }

    /// Camera orbiting around the vertical axis; yaw 0 looks down +Z
    pub fn from_yaw(yaw: f32) -> Self {
        let forward = Quat::from_rotation_y(yaw) * Vec3::Z;
        Self::new(forward, Vec3::Y.cross(forward))
    }

    /// World-space horizontal direction for a 2-axis input, magnitude at most 1
    pub fn planar_direction(&self, axis: Vec2) -> Vec3 {
        (self.right * axis.x + self.forward * axis.y).clamp_length_max(1.0)
    }
}

/// What one controller step did, for animation driving
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepOutcome {
    pub jumped: bool,
    /// Horizontal intent in `[0, 1]`; vertical motion never contributes
    pub horizontal_speed: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocomotionController {
    config: MovementConfig,
    vertical_velocity: f32,
    rotation: Quat,
    can_move: bool,
    horizontal_speed: f32,
}

impl LocomotionController {
    pub fn new(config: MovementConfig) -> Self {
        Self {
            config,
            vertical_velocity: 0.0,
            rotation: Quat::IDENTITY,
            can_move: true,
            horizontal_speed: 0.0,
        }
    }

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    pub fn can_move(&self) -> bool {
        self.can_move
    }

    /// External movement lock, used by the action gate during attacks
    pub fn set_can_move(&mut self, can_move: bool) {
        self.can_move = can_move;
    }

    pub fn vertical_velocity(&self) -> f32 {
        self.vertical_velocity
    }

    pub fn set_vertical_velocity(&mut self, velocity: f32) {
        self.vertical_velocity = velocity;
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    pub fn yaw(&self) -> f32 {
        let forward = self.forward();
        forward.x.atan2(forward.z)
    }

    pub fn set_yaw(&mut self, yaw: f32) {
        self.rotation = Quat::from_rotation_y(yaw);
    }

    /// Last published horizontal speed, for the animation blend tree
    pub fn horizontal_speed(&self) -> f32 {
        self.horizontal_speed
    }

    /// Runs one simulation step for the owning player
    pub fn tick<M, A>(
        &mut self,
        motor: &mut M,
        stamina: &mut A,
        input: &InputState,
        dt: f32,
    ) -> StepOutcome
    where
        M: CharacterMotor,
        A: StaminaAuthority,
    {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let grounded = motor.is_grounded();

        if grounded && self.vertical_velocity < 0.0 {
            self.vertical_velocity = GROUND_SNAP_VELOCITY;
        }

        let direction = if self.can_move {
            input.camera().planar_direction(input.move_axis())
        } else {
            Vec3::ZERO
        };
        motor.move_by(direction * self.config.move_speed * dt);

        let intent = direction.length();
        if intent > MOVE_INPUT_EPSILON {
            let heading = Quat::from_rotation_y(direction.x.atan2(direction.z));
            let t = (self.config.rotation_speed * dt).min(1.0);
            self.rotation = self.rotation.slerp(heading, t).normalize();
        }
        self.horizontal_speed = intent;

        let mut jumped = false;
        if input.jump
            && grounded
            && self.can_move
            && stamina.request(self.config.jump_stamina_cost)
        {
            self.vertical_velocity = jump_velocity(self.config.jump_height, self.config.gravity);
            jumped = true;
        }

        self.vertical_velocity += self.config.gravity * dt;
        motor.move_by(Vec3::Y * self.vertical_velocity * dt);

        StepOutcome {
            jumped,
            horizontal_speed: intent,
        }
    }
}
