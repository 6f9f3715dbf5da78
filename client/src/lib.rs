//! # Melee Client Library
//!
//! The owning-client half of the melee action system. It samples controls
//! once per fixed step, predicts its own player with the same locomotion
//! code the server runs, and reconciles whenever a snapshot shows the
//! prediction drifted.
//!
//! ## Actions
//!
//! Attacks start optimistically: the local gate locks movement, the
//! `"Attack"` trigger fires and a stamina request goes to the server. The
//! client never decrements stamina itself. If the server rejects the request
//! or stays silent past the ack timeout, the lockout is released early.
//!
//! At the authored hit frame the [`animation::AnimationTimeline`] calls back
//! into the game state, which queries the replicated world and reports hit
//! candidates. Damage only ever arrives from the server.
//!
//! ## Module Organization
//!
//! - `animation`: driver and hit-window traits, the attack timeline
//! - `game`: prediction, reconciliation, attack bookkeeping
//! - `input`: sequenced edge-triggered inputs and the scripted bot
//! - `network`: UDP connection and the fixed-step client loop

pub mod animation;
pub mod game;
pub mod input;
pub mod network;
