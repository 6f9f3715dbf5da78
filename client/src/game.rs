use crate::animation::{AnimationDriver, AnimationTimeline, HitWindowHandler};
use log::{debug, info, warn};
use shared::{
    ActionError, ColliderSet, ConnectionId, GameConfig, HitEvent, HitResolver, InputState,
    Packet, Player, PlayerId, PlayerSnapshot, StepOutcome, FIXED_DT,
};
use std::collections::HashMap;

/// Predicted and confirmed positions further apart than this trigger a replay
pub const RECONCILE_THRESHOLD: f32 = 0.05;

/// Unacknowledged inputs kept for replay; older ones are dropped
const MAX_INPUT_HISTORY: usize = 600;

/// A predicted input kept until the server acknowledges it
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedInput {
    pub input: InputState,
    /// Movement lock in force when the input was predicted
    pub can_move: bool,
}

/// An attack request still waiting for the server's answer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingAttack {
    pub activation: u32,
    /// Client clock time after which the request counts as lost
    pub deadline: f64,
}

pub struct ClientGameState {
    pub config: GameConfig,
    pub client_id: Option<ConnectionId>,
    pub player_id: Option<PlayerId>,
    /// Locally predicted copy of our own player
    pub predicted: Option<Player>,
    /// Last server view of every player
    pub confirmed: HashMap<PlayerId, PlayerSnapshot>,
    pub input_history: Vec<PredictedInput>,
    pub last_confirmed_tick: u32,
    pub timeline: AnimationTimeline,
    pending_attack: Option<PendingAttack>,
    next_activation: u32,
    hit_resolver: HitResolver,
    clock: f64,
    outbox: Vec<Packet>,
}

impl ClientGameState {
    pub fn new() -> Self {
        let config = GameConfig::default();
        Self {
            config,
            client_id: None,
            player_id: None,
            predicted: None,
            confirmed: HashMap::new(),
            input_history: Vec::new(),
            last_confirmed_tick: 0,
            timeline: AnimationTimeline::new(),
            pending_attack: None,
            next_activation: 0,
            hit_resolver: HitResolver::from_config(&config.combat),
            clock: 0.0,
            outbox: Vec::new(),
        }
    }

    /// Adopts the server's identity assignment and tunables
    pub fn on_connected(&mut self, client_id: ConnectionId, player_id: PlayerId, config: GameConfig) {
        self.config = config;
        self.client_id = Some(client_id);
        self.player_id = Some(player_id);
        self.hit_resolver = HitResolver::from_config(&config.combat);
        self.predicted = None;
        self.confirmed.clear();
        self.input_history.clear();
        self.pending_attack = None;
        self.timeline.cancel();
    }

    pub fn pending_attack(&self) -> Option<PendingAttack> {
        self.pending_attack
    }

    /// Packets produced since the last call, in order
    pub fn take_outbox(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outbox)
    }

    pub fn apply_server_state(
        &mut self,
        tick: u32,
        players: Vec<PlayerSnapshot>,
        last_processed_input: &HashMap<ConnectionId, u32>,
    ) {
        if tick < self.last_confirmed_tick {
            debug!("Dropping out-of-order snapshot for tick {}", tick);
            return;
        }
        self.last_confirmed_tick = tick;

        self.confirmed = players.into_iter().map(|p| (p.id, p)).collect();

        let Some(player_id) = self.player_id else {
            return;
        };
        let Some(confirmed) = self.confirmed.get(&player_id) else {
            return;
        };

        match self.predicted.as_mut() {
            None => {
                self.predicted = Some(Player::from_snapshot(confirmed, &self.config));
            }
            Some(predicted) => {
                predicted.stamina.sync(confirmed.stamina, confirmed.max_stamina);
                predicted.health.sync(confirmed.health, confirmed.max_health);
            }
        }

        if let Some(last_processed) = self
            .client_id
            .and_then(|id| last_processed_input.get(&id))
        {
            self.input_history
                .retain(|entry| entry.input.sequence > *last_processed);
        }

        self.reconcile(player_id);
    }

    /// Replays unacknowledged inputs on top of the confirmed state when
    /// the prediction has drifted
    fn reconcile(&mut self, player_id: PlayerId) {
        let (Some(predicted), Some(confirmed)) =
            (self.predicted.as_mut(), self.confirmed.get(&player_id))
        else {
            return;
        };

        // The server position only reflects acknowledged inputs, so compare
        // against a replay rather than the raw prediction. Each input replays
        // under the movement lock it was predicted with; the attack may have
        // started partway through the history.
        let mut replayed = predicted.clone();
        replayed.apply_snapshot(confirmed);
        for entry in &self.input_history {
            replayed.locomotion.set_can_move(entry.can_move);
            replayed.apply_input(&entry.input, FIXED_DT);
        }
        replayed
            .locomotion
            .set_can_move(predicted.locomotion.can_move());

        let error = replayed.position().distance(predicted.position());
        if error > RECONCILE_THRESHOLD {
            debug!("Reconciling player {}: error {:.3}m", player_id, error);
            *predicted = replayed;
        }
    }

    /// Applies one input locally and runs the owner's fixed-step logic
    pub fn predict<D: AnimationDriver>(&mut self, input: InputState, driver: &mut D) -> StepOutcome {
        let Some(predicted) = self.predicted.as_mut() else {
            return StepOutcome::default();
        };

        let can_move = predicted.locomotion.can_move();
        let outcome = predicted.apply_input(&input, FIXED_DT);
        driver.set_horizontal_speed(outcome.horizontal_speed);
        if outcome.jumped {
            driver.set_trigger("Jump");
        }

        if let Some(player_id) = self.player_id {
            self.outbox.push(Packet::Input {
                player_id,
                input: input.clone(),
            });
        }

        if input.attack {
            if let Err(e) = self.try_attack(input.sequence, driver) {
                debug!("Attack ignored: {}", e);
            }
        }

        self.input_history.push(PredictedInput { input, can_move });
        if self.input_history.len() > MAX_INPUT_HISTORY {
            let excess = self.input_history.len() - MAX_INPUT_HISTORY;
            self.input_history.drain(..excess);
        }

        outcome
    }

    /// Starts an attack locally and asks the server to spend the stamina
    ///
    /// The lockout starts right away. It is released again if the server
    /// rejects the request or does not answer in time. `input_sequence` is
    /// the input whose step triggered the attack.
    pub fn try_attack<D: AnimationDriver>(
        &mut self,
        input_sequence: u32,
        driver: &mut D,
    ) -> Result<u32, ActionError> {
        let player = self
            .predicted
            .as_mut()
            .ok_or(ActionError::UnknownPlayer(self.player_id.unwrap_or_default()))?;

        let activation = self.next_activation + 1;
        player.begin_attack(activation)?;
        self.next_activation = activation;

        driver.set_trigger("Attack");
        self.timeline.play_attack(
            activation,
            self.config.combat.hit_frame_secs,
            self.config.combat.attack_lockout_secs,
        );
        self.pending_attack = Some(PendingAttack {
            activation,
            deadline: self.clock + self.config.combat.ack_timeout_secs as f64,
        });
        self.outbox.push(Packet::AttackRequest {
            player_id: player.id,
            activation,
            input_sequence,
        });

        Ok(activation)
    }

    /// Applies the server's answer to an attack request
    pub fn handle_ack(&mut self, activation: u32, accepted: bool, stamina: f32) {
        if let Some(player) = self.predicted.as_mut() {
            let max = player.stamina.max();
            player.stamina.sync(stamina, max);
        }

        match self.pending_attack {
            Some(pending) if pending.activation == activation => {
                self.pending_attack = None;
                if !accepted {
                    debug!("Attack {} rejected by server", activation);
                    self.abort_attack(activation);
                }
            }
            _ => debug!("Late ack for attack {} ignored", activation),
        }
    }

    pub fn handle_damage(&mut self, event: &HitEvent, remaining_health: f32) {
        info!(
            "Player {} took {:.1} damage from player {}",
            event.target_id, event.damage_amount, event.attacker_id
        );

        if let Some(snapshot) = self.confirmed.get_mut(&event.target_id) {
            snapshot.health = remaining_health;
        }
        if Some(event.target_id) == self.player_id {
            if let Some(player) = self.predicted.as_mut() {
                let max = player.health.max();
                player.health.sync(remaining_health, max);
            }
        }
    }

    /// Advances lockout, animation and request deadlines by one step
    pub fn update(&mut self, dt: f32) {
        self.clock += dt as f64;

        if let Some(player) = self.predicted.as_mut() {
            player.update(dt);
        }

        let mut timeline = std::mem::take(&mut self.timeline);
        timeline.advance(dt, self);
        self.timeline = timeline;

        if let Some(pending) = self.pending_attack {
            if self.clock >= pending.deadline {
                let error = ActionError::Timeout(pending.activation);
                warn!("{}; releasing lockout", error);
                self.pending_attack = None;
                self.abort_attack(pending.activation);
            }
        }
    }

    fn abort_attack(&mut self, activation: u32) {
        if let Some(player) = self.predicted.as_mut() {
            if player.gate.activation() == Some(activation) {
                player.cancel_attack();
            }
        }
        if self.timeline.activation() == Some(activation) {
            self.timeline.cancel();
        }
    }

    /// Collision view of the world for hit queries
    fn world(&self) -> ColliderSet {
        let own = self.predicted.as_ref().map(Player::collider);
        self.confirmed
            .values()
            .filter(|s| Some(s.id) != self.player_id)
            .map(PlayerSnapshot::collider)
            .chain(own)
            .collect()
    }
}

impl HitWindowHandler for ClientGameState {
    /// Reports the hit candidates of our swing; nothing is applied locally
    fn resolve_hit_window(&mut self, activation: u32) {
        let Some(player) = self.predicted.as_ref() else {
            return;
        };
        if player.gate.activation() != Some(activation) {
            return;
        }

        let targets = self
            .hit_resolver
            .resolve(player.id, player.attack_origin(), &self.world());
        if targets.is_empty() {
            return;
        }

        debug!("Attack {} hit candidates: {:?}", activation, targets);
        self.outbox.push(Packet::HitReport {
            player_id: player.id,
            activation,
            targets,
        });
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}
