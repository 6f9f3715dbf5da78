use glam::Vec3;
use log::info;
use shared::{
    ActionError, AttackRecord, ColliderSet, ConnectionId, GameConfig, InputState, Player,
    PlayerId, PlayerSnapshot, Role, StepOutcome, FIXED_DT,
};
use std::collections::HashMap;
use std::f32::consts::TAU;

/// Players spawn on a ring around the arena center
const SPAWN_RING_RADIUS: f32 = 3.0;
const SPAWN_SLOTS: u32 = 8;

#[derive(Debug, Clone)]
pub struct GameState {
    pub tick: u32,
    /// Seconds of simulation since the server started
    pub time: f64,
    pub players: HashMap<PlayerId, Player>,
    next_player_id: PlayerId,
    config: GameConfig,
}

impl GameState {
    pub fn new(config: GameConfig) -> Self {
        Self {
            tick: 0,
            time: 0.0,
            players: HashMap::new(),
            next_player_id: 1,
            config,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn spawn_player(&mut self, owner: ConnectionId) -> PlayerId {
        let id = self.next_player_id;
        self.next_player_id += 1;

        let angle = (id % SPAWN_SLOTS) as f32 * TAU / SPAWN_SLOTS as f32;
        let spawn = Vec3::new(angle.sin(), 0.0, angle.cos()) * SPAWN_RING_RADIUS;
        let player = Player::new(id, owner, spawn, &self.config, Role::Server);

        info!("Spawned player {} for client {} at {}", id, owner, spawn);
        self.players.insert(id, player);
        id
    }

    /// Removes every player owned by `owner`
    pub fn despawn_owned_by(&mut self, owner: ConnectionId) -> Vec<PlayerId> {
        let owned: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| p.owner == owner)
            .map(|p| p.id)
            .collect();

        for id in &owned {
            self.players.remove(id);
            info!("Removed player {}", id);
        }
        owned
    }

    pub fn player_for_owner(&self, owner: ConnectionId) -> Option<PlayerId> {
        self.players
            .values()
            .find(|p| p.owner == owner)
            .map(|p| p.id)
    }

    /// Looks up `player_id` on behalf of `connection`, failing unless the
    /// connection owns it
    pub fn authorize(
        &mut self,
        connection: ConnectionId,
        player_id: PlayerId,
    ) -> Result<&mut Player, ActionError> {
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(ActionError::UnknownPlayer(player_id))?;

        if player.owner != connection {
            return Err(ActionError::NotOwner {
                connection,
                player: player_id,
            });
        }
        Ok(player)
    }

    /// Runs one fixed locomotion step for an owned player
    ///
    /// The `attack` flag is ignored here; attacks arrive as their own
    /// request so they can be acknowledged.
    pub fn apply_input(
        &mut self,
        connection: ConnectionId,
        player_id: PlayerId,
        input: &InputState,
    ) -> Result<StepOutcome, ActionError> {
        let player = self.authorize(connection, player_id)?;
        Ok(player.apply_input(input, FIXED_DT))
    }

    /// Begins an attack and spends its stamina. Returns the stamina left.
    ///
    /// Re-sending the current activation replays the acceptance without a
    /// second decrement; older activations are refused.
    pub fn request_attack(
        &mut self,
        connection: ConnectionId,
        player_id: PlayerId,
        activation: u32,
    ) -> Result<f32, ActionError> {
        let now = self.time;
        let player = self.authorize(connection, player_id)?;

        if let Some(record) = player.last_attack {
            if activation == record.activation {
                return Ok(player.stamina.current());
            }
            if activation < record.activation {
                return Err(ActionError::DuplicateActivation(activation));
            }
        }

        player.begin_attack(activation)?;
        player.last_attack = Some(AttackRecord {
            activation,
            started_at: now,
            hit_resolved: false,
        });

        Ok(player.stamina.current())
    }

    /// Advances lockouts and stamina regeneration
    pub fn update(&mut self, dt: f32) {
        self.time += dt as f64;
        for player in self.players.values_mut() {
            player.update(dt);
        }
    }

    pub fn snapshots(&self) -> Vec<PlayerSnapshot> {
        let mut snapshots: Vec<PlayerSnapshot> =
            self.players.values().map(Player::snapshot).collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    pub fn colliders(&self) -> ColliderSet {
        self.players.values().map(Player::collider).collect()
    }
}
