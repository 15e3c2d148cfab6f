//! `pmove_client`
//!
//! Client-side systems:
//! - Connection management (reliable + unreliable channels)
//! - Input capture, scripted input tracks, and command generation
//! - Movement prediction and reconciliation against server snapshots
//! - Interpolation for remote player states

pub mod client;
pub mod input;
pub mod interp;
pub mod predict;

pub use client::GameClient;
pub use predict::{Predictor, Reconcile};
