//! Collision adapter.
//!
//! The kernel knows nothing about geometry. Every sweep goes through a
//! [`MoveTrace`] supplied by the caller, which must be synchronous, free of
//! side effects, and honor the hull it is asked to sweep.

use serde::{Deserialize, Serialize};

use super::{
    context::PlayerMove,
    defs::{Contents, Hull},
};
use crate::math::Vec3;

/// Opaque identifier of whatever a sweep hit. `HitId::WORLD` is static geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HitId(pub u32);

impl HitId {
    pub const WORLD: HitId = HitId(0);
}

/// A hit plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
}

/// Result of sweeping a hull from a start point to an end point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceResult {
    /// The whole sweep was inside solid.
    pub all_solid: bool,
    /// The sweep started inside solid.
    pub start_solid: bool,
    /// Portion of the sweep completed, in `[0, 1]`.
    pub fraction: f32,
    pub end_pos: Vec3,
    pub plane: Plane,
    pub hit: Option<HitId>,
}

impl TraceResult {
    /// A sweep that reached `end` untouched.
    pub fn clear(end: Vec3) -> Self {
        Self {
            all_solid: false,
            start_solid: false,
            fraction: 1.0,
            end_pos: end,
            plane: Plane::default(),
            hit: None,
        }
    }

    /// A sweep that never left `start` because it is embedded.
    pub fn embedded(start: Vec3) -> Self {
        Self {
            all_solid: true,
            start_solid: true,
            fraction: 0.0,
            end_pos: start,
            plane: Plane::default(),
            hit: Some(HitId::WORLD),
        }
    }

    pub fn hit_something(&self) -> bool {
        self.fraction < 1.0
    }

    /// The hit plane is walkable ground.
    pub fn is_floor(&self) -> bool {
        self.plane.normal.z > super::defs::MAX_FLOOR_NORMAL
    }
}

/// Geometry queries the kernel needs from the embedding application.
pub trait MoveTrace {
    /// Sweeps `hull` from `start` to `end`.
    fn trace(&self, pm: &PlayerMove, start: Vec3, end: Vec3, hull: Hull) -> TraceResult;

    /// Contents at a point. Worlds without liquids or ladders can keep the default.
    fn point_contents(&self, _point: Vec3) -> Contents {
        Contents::Empty
    }
}

/// Plain closures work as tracers.
impl<F> MoveTrace for F
where
    F: Fn(&PlayerMove, Vec3, Vec3, Hull) -> TraceResult,
{
    fn trace(&self, pm: &PlayerMove, start: Vec3, end: Vec3, hull: Hull) -> TraceResult {
        self(pm, start, end, hull)
    }
}

/// No geometry at all: every sweep completes. Only useful for isolated tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTrace;

impl MoveTrace for NullTrace {
    fn trace(&self, _pm: &PlayerMove, _start: Vec3, end: Vec3, _hull: Hull) -> TraceResult {
        TraceResult::clear(end)
    }
}
