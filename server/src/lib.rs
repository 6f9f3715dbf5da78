//! # Melee Server Library
//!
//! The authoritative half of the melee action system. The server owns the
//! canonical player state, applies each client's fixed-step inputs, decides
//! whether attacks may start, and re-validates every hit a client reports
//! before any health changes.
//!
//! ## Authority
//!
//! Clients predict movement and lock themselves out optimistically, but only
//! the server spends stamina and applies damage. Every request names the
//! player it wants to drive and is checked against the connection that sent
//! it ([`game::GameState::authorize`]).
//!
//! ## Module Organization
//!
//! - `client_manager`: connection tracking, input buffering and timeouts
//! - `game`: players, spawning, attack requests, timers and snapshots
//! - `damage`: [`damage::DamageAuthority`], hit report validation
//! - `network`: UDP tasks and the single-threaded tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::GameConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(16),
//!         32,
//!         GameConfig::default(),
//!     )
//!     .await?;
//!
//!     // Receives packets, applies inputs in timestamp order, resolves
//!     // attacks and hit reports, then broadcasts a snapshot every tick
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod damage;
pub mod game;
pub mod network;
