//! `pmove_server`
//!
//! Server-side systems:
//! - Fixed timestep simulation running the movement kernel per command
//! - Player bookkeeping (command queues, health, spawn points)
//! - Receives `UserCmds`
//! - Sends per-client `Snapshot`s and replicates tuning changes
//!
//! Networking model:
//! - TCP: handshake/control plane
//! - UDP: gameplay plane (commands/snapshots)

pub mod server;
pub mod sim;

pub use server::GameServer;
pub use sim::{FixedStep, Simulation, TickReport};
