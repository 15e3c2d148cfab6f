//! Player movement kernel.
//!
//! One call to [`player_move`] advances one [`PlayerMove`] by one tick. The
//! kernel is synchronous, never fails, and touches nothing but the context it
//! is handed and the [`MoveTrace`] it queries, so a server tick loop and a
//! predicting client that feed it the same inputs get the same bits back.
//!
//! Tick order:
//! 1. basis vectors from the view angles
//! 2. ground and water categorization
//! 3. frozen / dead early outs
//! 4. duck transition
//! 5. exactly one of ladder, water, jump, walk or air movement
//! 6. re-categorize, fall accounting, velocity clamp, edge-detection bookkeeping

mod accel;
mod air;
mod context;
mod defs;
mod duck;
mod ground;
mod ladder;
mod slide;
mod state;
mod trace;
mod tuning;
mod water;

pub use accel::{accelerate, air_accelerate, friction};
pub use context::{FallImpact, MoveMode, MoveOutcome, PlayerMove};
pub use defs::*;
pub use slide::clip_velocity;
pub use state::check_velocity;
pub use trace::{HitId, MoveTrace, NullTrace, Plane, TraceResult};
pub use tuning::MoveTuning;

use crate::math::{angle_vectors, Vec3};

/// Runs one movement tick.
///
/// The caller fills the intent and timing fields of `pm` beforehand. The
/// context is advanced in place; the returned outcome carries what the tick
/// did that is not visible in the context itself.
pub fn player_move(pm: &mut PlayerMove, tuning: &MoveTuning, tracer: &dyn MoveTrace) -> MoveOutcome {
    let mut mover = Mover {
        pm,
        tuning,
        tracer,
        blocked: Blocked::empty(),
        fall: None,
    };
    let mode = mover.run();
    MoveOutcome {
        mode,
        blocked: mover.blocked,
        fall: mover.fall,
    }
}

/// Smallest intent magnitude that still produces a wish direction.
const WISH_EPSILON: f32 = 1e-6;

/// Per-tick working state. Mode implementations live in the sibling modules
/// as further `impl Mover` blocks.
pub(crate) struct Mover<'a> {
    pub(crate) pm: &'a mut PlayerMove,
    pub(crate) tuning: &'a MoveTuning,
    pub(crate) tracer: &'a dyn MoveTrace,
    pub(crate) blocked: Blocked,
    pub(crate) fall: Option<FallImpact>,
}

impl Mover<'_> {
    fn run(&mut self) -> MoveMode {
        self.sanitize_inputs();

        let basis = angle_vectors(self.pm.view_angles);
        self.pm.forward = basis.forward;
        self.pm.right = basis.right;
        self.pm.up = basis.up;

        self.categorize_position();

        if self.pm.flags.contains(PlayerFlags::FROZEN) {
            return MoveMode::Frozen;
        }

        if self.pm.dead {
            self.pm.max_speed = DEAD_MAX_SPEED;
            return MoveMode::Dead;
        }

        self.duck();

        let mode = if self.check_ladder() {
            self.ladder_move();
            MoveMode::Ladder
        } else if self.pm.water_level >= WaterLevel::Waist {
            self.water_move();
            MoveMode::Water
        } else if self.pm.is_on_ground() {
            if !self.pm.buttons.contains(Buttons::JUMP) {
                self.pm.flags.remove(PlayerFlags::WATER_JUMP);
            }
            if self.jump() {
                MoveMode::Jump
            } else {
                self.walk_move();
                MoveMode::Walk
            }
        } else {
            self.air_move();
            MoveMode::Air
        };

        self.categorize_position();
        self.check_falling();
        check_velocity(&mut self.pm.velocity, self.tuning.max_velocity);
        self.pm.base_velocity = Vec3::ZERO;

        self.pm.old_buttons = self.pm.buttons;
        self.pm.old_flags = self.pm.flags;

        if self.blocked.contains(Blocked::STUCK) {
            tracing::trace!(origin = ?self.pm.origin, ?mode, "player stuck in solid");
        }
        mode
    }

    /// Caller contract: finite, non-negative frame time and finite intent.
    /// Debug builds fail fast; release builds clamp to the nearest valid value.
    fn sanitize_inputs(&mut self) {
        let pm = &mut *self.pm;
        debug_assert!(
            pm.frame_time.is_finite() && pm.frame_time >= 0.0,
            "invalid frame time {}",
            pm.frame_time
        );
        if !pm.frame_time.is_finite() || pm.frame_time < 0.0 {
            pm.frame_time = 0.0;
        }

        for axis in [&mut pm.forward_move, &mut pm.side_move, &mut pm.up_move] {
            debug_assert!(axis.is_finite(), "non-finite movement intent");
            *axis = if axis.is_finite() {
                axis.clamp(-1.0, 1.0)
            } else {
                0.0
            };
        }
    }

    /// Sweeps the current hull.
    pub(crate) fn trace(&self, start: Vec3, end: Vec3) -> TraceResult {
        self.tracer.trace(&*self.pm, start, end, self.pm.use_hull)
    }

    pub(crate) fn trace_hull(&self, start: Vec3, end: Vec3, hull: Hull) -> TraceResult {
        self.tracer.trace(&*self.pm, start, end, hull)
    }

    /// Max speed after the server cap.
    pub(crate) fn max_speed(&self) -> f32 {
        self.pm.max_speed.min(self.tuning.max_speed)
    }

    /// Horizontal forward/right from the stored basis, renormalized.
    pub(crate) fn flat_basis(&self) -> (Vec3, Vec3) {
        let (forward, _) = self.pm.forward.flat().normalize_or_zero(STOP_EPSILON);
        let (right, _) = self.pm.right.flat().normalize_or_zero(STOP_EPSILON);
        (forward, right)
    }

    /// Splits a wish vector into direction and speed, capped at `cap`.
    ///
    /// `wish_vel` is built from intents in `[-1, 1]`, so any nonzero intent
    /// yields a proportional wish speed.
    pub(crate) fn wish(wish_vel: Vec3, max_speed: f32, cap: f32) -> (Vec3, f32) {
        let (dir, len) = wish_vel.normalize_or_zero(WISH_EPSILON);
        let speed = len * max_speed;
        (dir, speed.min(cap))
    }

    pub(crate) fn note_plane(&mut self, normal: Vec3) {
        if normal.z > MAX_FLOOR_NORMAL {
            self.blocked |= Blocked::FLOOR;
        }
        if normal.z == 0.0 {
            self.blocked |= Blocked::WALL;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Tracers shared by the kernel's unit tests.

    use super::*;

    /// Infinite floor at `z = height`, nothing else.
    pub(crate) fn floor_at(height: f32) -> impl Fn(&PlayerMove, Vec3, Vec3, Hull) -> TraceResult {
        move |_pm: &PlayerMove, start: Vec3, end: Vec3, hull: Hull| {
            let bottom_start = start.z + hull.mins().z;
            let bottom_end = end.z + hull.mins().z;
            if bottom_start < height - 1e-3 {
                return TraceResult::embedded(start);
            }
            if bottom_end >= height {
                return TraceResult::clear(end);
            }
            let fraction = ((bottom_start - height) / (bottom_start - bottom_end)).max(0.0);
            let mut end_pos = start.lerp(end, fraction);
            end_pos.z = height - hull.mins().z;
            TraceResult {
                fraction,
                end_pos,
                plane: Plane {
                    normal: Vec3::UP,
                    dist: height,
                },
                hit: Some(HitId::WORLD),
                ..TraceResult::clear(end)
            }
        }
    }

    /// Every sweep starts and ends inside solid.
    pub(crate) fn solid_everywhere(_pm: &PlayerMove, start: Vec3, _end: Vec3, _hull: Hull) -> TraceResult {
        TraceResult::embedded(start)
    }

    /// A standing player resting on the floor at z = 0, at 128 Hz.
    pub(crate) fn grounded() -> PlayerMove {
        let mut pm = PlayerMove::spawn(Vec3::new(0.0, 0.0, 36.0), 320.0);
        pm.frame_time = 1.0 / 128.0;
        pm
    }
}
