//! Why an action had no effect.
//!
//! None of these are fatal to a session. Every rejection degrades to "the
//! action did nothing"; [`ErrorKind`] only decides how loudly it is logged.

use thiserror::Error;

use crate::{ConnectionId, PlayerId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("insufficient stamina: need {required:.1}, have {available:.1}")]
    InsufficientStamina { required: f32, available: f32 },

    #[error("an attack is already in progress")]
    AlreadyAttacking,

    #[error("player {0} cannot act")]
    Incapacitated(PlayerId),

    #[error("activation {0} was already processed")]
    DuplicateActivation(u32),

    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("target {0} no longer exists")]
    StaleTarget(PlayerId),

    #[error("connection {connection} does not own player {player}")]
    NotOwner {
        connection: ConnectionId,
        player: PlayerId,
    },

    #[error("activation {0} is not the current attack")]
    StaleActivation(u32),

    #[error("hit already reported for activation {0}")]
    DuplicateHitReport(u32),

    #[error("hit report names {count} targets, limit is {limit}")]
    TooManyTargets { count: usize, limit: usize },

    #[error("player {0} reported itself as a target")]
    SelfTarget(PlayerId),

    #[error("target {target} is {distance:.2}m away, reach is {reach:.2}m")]
    OutOfReach {
        target: PlayerId,
        distance: f32,
        reach: f32,
    },

    #[error("no answer for activation {0}")]
    Timeout(u32),
}

/// Coarse classification used for logging and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Local gate said no; not worth surfacing
    InputRejected,
    /// Target vanished between the client's view and the server's
    StaleTarget,
    /// The request could only come from a modified or confused client
    UntrustedClient,
    /// The request or its answer got lost
    Connectivity,
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::InsufficientStamina { .. }
            | ActionError::AlreadyAttacking
            | ActionError::Incapacitated(_)
            | ActionError::DuplicateActivation(_) => ErrorKind::InputRejected,
            ActionError::UnknownPlayer(_) | ActionError::StaleTarget(_) => ErrorKind::StaleTarget,
            ActionError::NotOwner { .. }
            | ActionError::StaleActivation(_)
            | ActionError::DuplicateHitReport(_)
            | ActionError::TooManyTargets { .. }
            | ActionError::SelfTarget(_)
            | ActionError::OutOfReach { .. } => ErrorKind::UntrustedClient,
            ActionError::Timeout(_) => ErrorKind::Connectivity,
        }
    }
}
