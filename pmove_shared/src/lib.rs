//! `pmove_shared`
//!
//! Code shared by client and server: the player movement kernel and the
//! pieces both ends need to agree on.
//!
//! Design goals:
//! - The kernel is deterministic: same context, tuning and traces in, same
//!   bits out, on either end of the wire.
//! - Geometry stays behind the [`pmove::MoveTrace`] trait.
//! - Harness code (config, console, world loading, sockets) reports failures
//!   through `anyhow`; the kernel never fails.
//! - No `unsafe`.

pub mod config;
pub mod console;
pub mod math;
pub mod net;
pub mod pmove;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::pmove::{
        player_move, Buttons, Hull, MoveMode, MoveOutcome, MoveTrace, MoveTuning, PlayerFlags,
        PlayerMove,
    };
    pub use crate::world::BrushWorld;
}
