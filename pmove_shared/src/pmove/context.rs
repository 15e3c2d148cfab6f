//! Movement context: the per-player state the kernel advances in place.

use serde::{Deserialize, Serialize};

use super::{
    defs::{Blocked, Buttons, Contents, Hull, PlayerFlags, WaterLevel},
    trace::HitId,
};
use crate::math::Vec3;

/// All state one movement tick reads and writes.
///
/// One context per controlled player, built once and mutated every tick for
/// the lifetime of that player's session. The caller fills the intent and
/// timing fields before each call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMove {
    pub origin: Vec3,
    pub velocity: Vec3,
    /// Externally imposed push (conveyors). Consumed by the tick.
    pub base_velocity: Vec3,
    /// Pitch, yaw, roll in degrees.
    pub view_angles: Vec3,
    /// Transient view kick, e.g. from a hard landing.
    pub punch_angle: Vec3,

    pub forward_move: f32,
    pub side_move: f32,
    pub up_move: f32,
    pub buttons: Buttons,
    pub old_buttons: Buttons,

    pub frame_time: f32,
    pub max_speed: f32,

    pub flags: PlayerFlags,
    pub old_flags: PlayerFlags,
    pub on_ground: Option<HitId>,
    pub water_level: WaterLevel,
    pub water_type: Contents,
    pub dead: bool,
    pub use_hull: Hull,

    /// Remaining duck transition time in seconds.
    pub duck_time: f32,
    pub in_duck: bool,

    /// Peak downward speed since ground was last touched.
    pub fall_velocity: f32,

    pub on_ladder: bool,
    pub ladder_normal: Vec3,

    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

impl Default for PlayerMove {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            velocity: Vec3::ZERO,
            base_velocity: Vec3::ZERO,
            view_angles: Vec3::ZERO,
            punch_angle: Vec3::ZERO,
            forward_move: 0.0,
            side_move: 0.0,
            up_move: 0.0,
            buttons: Buttons::empty(),
            old_buttons: Buttons::empty(),
            frame_time: 0.0,
            max_speed: 320.0,
            flags: PlayerFlags::CLIENT,
            old_flags: PlayerFlags::CLIENT,
            on_ground: None,
            water_level: WaterLevel::None,
            water_type: Contents::Empty,
            dead: false,
            use_hull: Hull::Standing,
            duck_time: 0.0,
            in_duck: false,
            fall_velocity: 0.0,
            on_ladder: false,
            ladder_normal: Vec3::ZERO,
            forward: Vec3::ZERO,
            right: Vec3::ZERO,
            up: Vec3::ZERO,
        }
    }
}

impl PlayerMove {
    /// A standing player at `origin`.
    pub fn spawn(origin: Vec3, max_speed: f32) -> Self {
        Self {
            origin,
            max_speed,
            ..Default::default()
        }
    }

    pub fn mins(&self) -> Vec3 {
        self.use_hull.mins()
    }

    pub fn maxs(&self) -> Vec3 {
        self.use_hull.maxs()
    }

    pub fn is_on_ground(&self) -> bool {
        self.flags.contains(PlayerFlags::ON_GROUND)
    }

    pub fn is_ducking(&self) -> bool {
        self.flags.contains(PlayerFlags::DUCKING)
    }

    /// Eye position.
    pub fn view_origin(&self) -> Vec3 {
        self.origin + Vec3::new(0.0, 0.0, self.use_hull.view_height())
    }

    /// Horizontal speed.
    pub fn speed_2d(&self) -> f32 {
        self.velocity.length_2d()
    }

    pub(crate) fn set_ground(&mut self, ground: Option<HitId>) {
        self.on_ground = ground;
        self.flags.set(PlayerFlags::ON_GROUND, ground.is_some());
    }
}

/// Which mode ran this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MoveMode {
    #[default]
    Frozen,
    Dead,
    Ladder,
    Water,
    Walk,
    Jump,
    Air,
}

/// A landing hard enough to hurt. The kernel reports it; gameplay applies it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallImpact {
    pub fall_velocity: f32,
    pub damage: f32,
}

/// Out-of-band result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub mode: MoveMode,
    pub blocked: Blocked,
    pub fall: Option<FallImpact>,
}

impl MoveOutcome {
    /// The sweep started and ended inside solid this tick.
    pub fn stuck(&self) -> bool {
        self.blocked.contains(Blocked::STUCK)
    }
}
