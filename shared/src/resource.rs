//! Depletable, regenerating gauges (stamina and health).

use serde::{Deserialize, Serialize};

use crate::error::ActionError;

/// A numeric resource kept within `[0, max]`
///
/// The server owns the authoritative pool for every player. Clients hold a
/// replica that is overwritten from snapshots via [`ResourcePool::sync`] and
/// never decremented locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePool {
    current: f32,
    max: f32,
    regen_per_sec: f32,
    regen_delay_secs: f32,
    /// Seconds left before regeneration resumes
    regen_cooldown: f32,
}

impl ResourcePool {
    /// Creates a full pool that does not regenerate
    pub fn new(max: f32) -> Self {
        let max = sanitize(max);
        Self {
            current: max,
            max,
            regen_per_sec: 0.0,
            regen_delay_secs: 0.0,
            regen_cooldown: 0.0,
        }
    }

    /// Regenerates `per_sec` units once `delay_secs` have passed since the last spend
    pub fn with_regen(mut self, per_sec: f32, delay_secs: f32) -> Self {
        self.regen_per_sec = sanitize(per_sec);
        self.regen_delay_secs = sanitize(delay_secs);
        self
    }

    /// Sets the current value, clamped to `[0, max]`
    pub fn with_current(mut self, current: f32) -> Self {
        self.current = sanitize(current).min(self.max);
        self
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Fill ratio in `[0, 1]`
    pub fn fraction(&self) -> f32 {
        if self.max > 0.0 {
            self.current / self.max
        } else {
            0.0
        }
    }

    pub fn is_depleted(&self) -> bool {
        self.current <= 0.0
    }

    /// Spends `cost`, or leaves the pool untouched if it cannot be afforded
    ///
    /// Returns the remaining amount.
    pub fn try_consume(&mut self, cost: f32) -> Result<f32, ActionError> {
        let cost = sanitize(cost);
        if self.current < cost {
            return Err(ActionError::InsufficientStamina {
                required: cost,
                available: self.current,
            });
        }

        self.current = (self.current - cost).max(0.0);
        if cost > 0.0 {
            self.regen_cooldown = self.regen_delay_secs;
        }
        Ok(self.current)
    }

    /// Removes up to `amount`, stopping at zero. Returns how much was removed.
    pub fn apply_damage(&mut self, amount: f32) -> f32 {
        let amount = sanitize(amount);
        let before = self.current;
        self.current = (self.current - amount).max(0.0);
        before - self.current
    }

    /// Advances regeneration by `dt` seconds
    pub fn regenerate(&mut self, dt: f32) {
        let mut dt = sanitize(dt);
        if self.regen_cooldown > 0.0 {
            let waited = dt.min(self.regen_cooldown);
            self.regen_cooldown -= waited;
            dt -= waited;
        }
        if dt > 0.0 && self.regen_per_sec > 0.0 {
            self.current = (self.current + self.regen_per_sec * dt).min(self.max);
        }
    }

    /// Overwrites the replica with authoritative values from a snapshot
    pub fn sync(&mut self, current: f32, max: f32) {
        self.max = sanitize(max);
        self.current = sanitize(current).min(self.max);
    }
}

/// Negative and non-finite amounts count as zero
fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}
