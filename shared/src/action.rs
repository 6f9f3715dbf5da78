//! Attack gate: Idle/Attacking with a fixed, time-based lockout.
//!
//! The lockout ends when its timer runs out, not when the attack animation
//! reports completion. This keeps a deterministic minimum action duration
//! even though it can drift from the real clip length.

use serde::{Deserialize, Serialize};

use crate::error::ActionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ActionState {
    #[default]
    Idle,
    Attacking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionGate {
    state: ActionState,
    lockout_secs: f32,
    lockout_remaining: f32,
    activation: Option<u32>,
}

impl ActionGate {
    pub fn new(lockout_secs: f32) -> Self {
        Self {
            state: ActionState::Idle,
            lockout_secs: lockout_secs.max(0.0),
            lockout_remaining: 0.0,
            activation: None,
        }
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn is_attacking(&self) -> bool {
        self.state == ActionState::Attacking
    }

    /// Activation id of the attack in progress
    pub fn activation(&self) -> Option<u32> {
        self.activation
    }

    pub fn lockout_remaining(&self) -> f32 {
        self.lockout_remaining
    }

    /// Idle -> Attacking if no attack is running and `available` covers `cost`
    pub fn try_begin(&mut self, activation: u32, available: f32, cost: f32) -> Result<(), ActionError> {
        if self.is_attacking() {
            return Err(ActionError::AlreadyAttacking);
        }
        if available.is_nan() || available < cost {
            return Err(ActionError::InsufficientStamina {
                required: cost,
                available,
            });
        }

        self.state = ActionState::Attacking;
        self.lockout_remaining = self.lockout_secs;
        self.activation = Some(activation);
        Ok(())
    }

    /// Counts the lockout down. Returns true on the tick the gate reopens.
    pub fn tick(&mut self, dt: f32) -> bool {
        if !self.is_attacking() {
            return false;
        }

        self.lockout_remaining -= if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        if self.lockout_remaining <= 0.0 {
            self.reset();
            return true;
        }
        false
    }

    /// Ends the lockout early. Returns true if an attack was in progress.
    pub fn release(&mut self) -> bool {
        let was_attacking = self.is_attacking();
        self.reset();
        was_attacking
    }

    fn reset(&mut self) {
        self.state = ActionState::Idle;
        self.lockout_remaining = 0.0;
        self.activation = None;
    }
}
