//! Simulation core shared by the authoritative server and the predicting client.

pub mod action;
pub mod combat;
pub mod config;
pub mod error;
pub mod locomotion;
pub mod player;
pub mod protocol;
pub mod resource;

pub type PlayerId = u32;
pub type ConnectionId = u32;

pub use action::{ActionGate, ActionState};
pub use combat::{CapsuleCollider, ColliderSet, HitEvent, HitResolver, LayerMask, SpatialQuery};
pub use config::{
    CombatConfig, GameConfig, MovementConfig, StaminaConfig, FIXED_DT, MAX_CLIENTS, MAX_PACKET_SIZE,
    PROTOCOL_VERSION,
};
pub use error::{ActionError, ErrorKind};
pub use locomotion::{
    CameraBasis, CapsuleMotor, CharacterMotor, LocomotionController, ReplicatedStamina,
    StaminaAuthority, StepOutcome,
};
pub use player::{AttackRecord, Player, Role};
pub use protocol::{get_timestamp, InputState, Packet, PlayerSnapshot};
pub use resource::ResourcePool;
