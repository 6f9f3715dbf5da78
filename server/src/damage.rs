//! Server-side validation of hit reports
//!
//! A hit report is the attacking client's claim about who its swing touched.
//! Nothing in it is trusted: ownership, the activation, timing and every
//! target's reach are re-checked against server state, and the damage amount
//! always comes from the server's configuration.

use crate::game::GameState;
use log::info;
use shared::{
    get_timestamp, ActionError, AttackRecord, CombatConfig, ConnectionId, HitEvent, PlayerId,
};
use std::collections::BTreeSet;

/// One applied hit together with the target's health afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedHit {
    pub event: HitEvent,
    pub remaining_health: f32,
}

/// Outcome of an accepted report: hits applied and targets dropped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DamageReport {
    pub applied: Vec<AppliedHit>,
    pub dropped: Vec<ActionError>,
}

#[derive(Debug, Clone, Copy)]
pub struct DamageAuthority {
    config: CombatConfig,
}

impl DamageAuthority {
    pub fn new(config: CombatConfig) -> Self {
        Self { config }
    }

    /// Furthest a target capsule may be from the attack origin
    pub fn reach(&self) -> f32 {
        self.config.attack_range + self.config.reach_tolerance
    }

    /// Validates a report for `activation` and applies damage to each
    /// target that passes
    ///
    /// Report-level problems reject the whole report. Target-level problems
    /// only drop that target.
    pub fn apply_hit_report(
        &self,
        game: &mut GameState,
        connection: ConnectionId,
        attacker_id: PlayerId,
        activation: u32,
        targets: &[PlayerId],
    ) -> Result<DamageReport, ActionError> {
        let now = game.time;
        let attacker = game.authorize(connection, attacker_id)?;

        if !attacker.is_alive() {
            return Err(ActionError::Incapacitated(attacker_id));
        }

        let record = attacker
            .last_attack
            .filter(|r| r.activation == activation)
            .ok_or(ActionError::StaleActivation(activation))?;
        if record.hit_resolved {
            return Err(ActionError::DuplicateHitReport(activation));
        }

        let window = (self.config.attack_lockout_secs + self.config.hit_report_grace_secs) as f64;
        if now - record.started_at > window {
            return Err(ActionError::StaleActivation(activation));
        }

        if targets.len() > self.config.max_hit_targets {
            return Err(ActionError::TooManyTargets {
                count: targets.len(),
                limit: self.config.max_hit_targets,
            });
        }

        attacker.last_attack = Some(AttackRecord {
            hit_resolved: true,
            ..record
        });
        let origin = attacker.attack_origin();
        let reach = self.reach();

        let mut report = DamageReport::default();
        let unique: BTreeSet<PlayerId> = targets.iter().copied().collect();

        for target_id in unique {
            if target_id == attacker_id {
                report.dropped.push(ActionError::SelfTarget(target_id));
                continue;
            }

            let Some(target) = game.players.get_mut(&target_id) else {
                report.dropped.push(ActionError::StaleTarget(target_id));
                continue;
            };
            if !target.is_alive() {
                report.dropped.push(ActionError::StaleTarget(target_id));
                continue;
            }

            let distance = target.collider().distance_to(origin).max(0.0);
            if distance > reach {
                report.dropped.push(ActionError::OutOfReach {
                    target: target_id,
                    distance,
                    reach,
                });
                continue;
            }

            let applied = target.health.apply_damage(self.config.damage_amount);
            let event = HitEvent {
                attacker_id,
                target_id,
                damage_amount: applied,
                timestamp: get_timestamp(),
            };
            info!(
                "Player {} hit player {} for {:.1} ({:.1} health left)",
                attacker_id,
                target_id,
                event.damage_amount,
                target.health.current()
            );

            report.applied.push(AppliedHit {
                event,
                remaining_health: target.health.current(),
            });
        }

        Ok(report)
    }
}
