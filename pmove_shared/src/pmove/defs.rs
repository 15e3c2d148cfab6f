//! Movement constants, flag sets, hull table, and small enums.

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

bitflags::bitflags! {
    /// Player state flags. Bit positions match the legacy `FL_*` layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PlayerFlags: u32 {
        const ON_GROUND   = 1 << 0;
        const DUCKING     = 1 << 1;
        const WATER_JUMP  = 1 << 2;
        const ON_TRAIN    = 1 << 3;
        const FROZEN      = 1 << 5;
        const CLIENT      = 1 << 7;
        const FAKE_CLIENT = 1 << 8;
        const IN_WATER    = 1 << 9;
        const ON_LADDER   = 1 << 10;
    }
}

bitflags::bitflags! {
    /// Held actions for one command. Bit positions match the legacy `IN_*` layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Buttons: u16 {
        const ATTACK     = 1 << 0;
        const JUMP       = 1 << 1;
        const DUCK       = 1 << 2;
        const FORWARD    = 1 << 3;
        const BACK       = 1 << 4;
        const USE        = 1 << 5;
        const MOVE_LEFT  = 1 << 6;
        const MOVE_RIGHT = 1 << 7;
        const ATTACK2    = 1 << 8;
        const RELOAD     = 1 << 9;
        /// Walk modifier.
        const SPEED      = 1 << 10;
        const SCORE      = 1 << 11;
    }
}

impl Buttons {
    /// Buttons that went down this command: `self & !old`.
    pub fn pressed(self, old: Buttons) -> Buttons {
        self & !old
    }

    /// Buttons that went up this command.
    pub fn released(self, old: Buttons) -> Buttons {
        old & !self
    }
}

/// Collision volume selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Hull {
    #[default]
    Standing,
    Ducked,
    Point,
    Large,
}

const STANDING_MINS: Vec3 = Vec3::new(-16.0, -16.0, -36.0);
const STANDING_MAXS: Vec3 = Vec3::new(16.0, 16.0, 36.0);
const DUCKED_MINS: Vec3 = Vec3::new(-16.0, -16.0, -18.0);
const DUCKED_MAXS: Vec3 = Vec3::new(16.0, 16.0, 18.0);

impl Hull {
    pub const fn mins(self) -> Vec3 {
        match self {
            Hull::Standing | Hull::Large => STANDING_MINS,
            Hull::Ducked => DUCKED_MINS,
            Hull::Point => Vec3::ZERO,
        }
    }

    pub const fn maxs(self) -> Vec3 {
        match self {
            Hull::Standing | Hull::Large => STANDING_MAXS,
            Hull::Ducked => DUCKED_MAXS,
            Hull::Point => Vec3::ZERO,
        }
    }

    /// Eye height above the hull origin.
    pub const fn view_height(self) -> f32 {
        match self {
            Hull::Standing | Hull::Large => STANDING_VIEW_HEIGHT,
            Hull::Ducked => DUCKED_VIEW_HEIGHT,
            Hull::Point => 0.0,
        }
    }
}

/// Difference between the standing and ducked half-heights.
pub const HULL_HEIGHT_DELTA: f32 = STANDING_MAXS.z - DUCKED_MAXS.z;

pub const STANDING_VIEW_HEIGHT: f32 = 28.0;
pub const DUCKED_VIEW_HEIGHT: f32 = 12.0;

/// How deep the player is submerged.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum WaterLevel {
    #[default]
    None = 0,
    Feet = 1,
    Waist = 2,
    Head = 3,
}

/// Contents of a point or brush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Contents {
    #[default]
    Empty,
    Solid,
    Water,
    Slime,
    Lava,
    Ladder,
}

impl Contents {
    pub fn is_liquid(self) -> bool {
        matches!(self, Contents::Water | Contents::Slime | Contents::Lava)
    }

    /// Precedence when several volumes overlap a point.
    pub(crate) fn strength(self) -> u8 {
        match self {
            Contents::Empty => 0,
            Contents::Water => 1,
            Contents::Slime => 2,
            Contents::Lava => 3,
            Contents::Ladder => 4,
            Contents::Solid => 5,
        }
    }
}

bitflags::bitflags! {
    /// Which kinds of surface stopped a slide move.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct Blocked: u8 {
        const FLOOR = 1 << 0;
        const WALL  = 1 << 1;
        const STUCK = 1 << 2;
    }
}

/// Seconds for a full duck transition.
pub const DUCK_TIME: f32 = 0.4;

pub const MAX_CLIP_PLANES: usize = 5;
pub const MAX_BUMPS: usize = 4;

/// How far below the hull the ground probe reaches.
pub const GROUND_CHECK_DIST: f32 = 2.0;

/// Numerical floor for tiny velocity components and directions.
pub const STOP_EPSILON: f32 = 0.1;

/// Ground speed under which the player is considered stopped.
pub const MIN_MOVE_SPEED: f32 = 1.0;

/// Planes steeper than this (by normal z) are walls, not floors.
pub const MAX_FLOOR_NORMAL: f32 = 0.7;

/// Upward speed above which ground contact is ignored.
pub const MAX_GROUNDED_UP_SPEED: f32 = 180.0;

pub const FALL_PUNCH_THRESHOLD: f32 = 350.0;
pub const FALL_DAMAGE_THRESHOLD: f32 = 580.0;
pub const FATAL_FALL_SPEED: f32 = 1024.0;
pub const DAMAGE_FOR_FALL_SPEED: f32 = 100.0 / (FATAL_FALL_SPEED - FALL_DAMAGE_THRESHOLD);
pub const FALL_PUNCH_SCALE: f32 = 0.013;
pub const MAX_FALL_PUNCH: f32 = 8.0;

pub const DEAD_MAX_SPEED: f32 = 1.0;

pub const WALK_SPEED_MULTIPLIER: f32 = 0.52;
pub const WATER_SPEED_MULTIPLIER: f32 = 0.8;

pub const LADDER_SPEED: f32 = 200.0;
/// Horizontal reach of the ladder probe beyond the hull face.
pub const LADDER_REACH: f32 = 2.0;

/// Edge-friction probe: look this far ahead of the feet...
pub const EDGE_PROBE_AHEAD: f32 = 16.0;
/// ...and this far down.
pub const EDGE_PROBE_DEPTH: f32 = 34.0;
