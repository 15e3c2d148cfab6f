//! Sweeping with plane clipping, and stair stepping.

use super::{
    defs::{Blocked, MAX_BUMPS, MAX_CLIP_PLANES, STOP_EPSILON},
    trace::TraceResult,
    Mover,
};
use crate::math::Vec3;

/// Removes the part of `velocity` going into the plane with unit `normal`.
///
/// `overbounce` above 1 pushes slightly away from the plane. Components
/// smaller than [`STOP_EPSILON`] are flushed to zero.
pub fn clip_velocity(velocity: Vec3, normal: Vec3, overbounce: f32) -> Vec3 {
    let backoff = velocity.dot(normal) * overbounce;
    let mut out = velocity - normal * backoff;
    for i in 0..3 {
        if out[i].abs() < STOP_EPSILON {
            out[i] = 0.0;
        }
    }
    out
}

const _: () = assert!(MAX_BUMPS < MAX_CLIP_PLANES);

impl Mover<'_> {
    /// Moves along `velocity` for the frame, sliding along whatever is hit.
    pub(crate) fn fly_move(&mut self) {
        let mut planes = [Vec3::ZERO; MAX_CLIP_PLANES];
        let mut num_planes = 0;

        let original_velocity = self.pm.velocity;
        let primal_velocity = self.pm.velocity;
        let mut time_left = self.pm.frame_time;

        for _ in 0..MAX_BUMPS {
            if self.pm.velocity == Vec3::ZERO {
                break;
            }

            let end = self.pm.origin + self.pm.velocity * time_left;
            let trace = self.trace(self.pm.origin, end);

            if trace.all_solid {
                self.pm.velocity = Vec3::ZERO;
                self.blocked |= Blocked::STUCK;
                return;
            }

            if trace.fraction > 0.0 {
                self.pm.origin = trace.end_pos;
                num_planes = 0;
            }

            if trace.fraction == 1.0 {
                break;
            }

            time_left -= time_left * trace.fraction;
            self.note_plane(trace.plane.normal);

            // Unreachable while MAX_BUMPS < MAX_CLIP_PLANES: at most one plane is
            // added per bump. Kept as the bound for the plane buffer.
            if num_planes >= MAX_CLIP_PLANES {
                tracing::trace!(origin = ?self.pm.origin, "clip plane limit reached");
                self.pm.velocity = Vec3::ZERO;
                break;
            }
            planes[num_planes] = trace.plane.normal;
            num_planes += 1;

            let clipped = clip_velocity(original_velocity, planes[num_planes - 1], 1.0);
            self.pm.velocity = clipped;

            if planes[..num_planes].iter().all(|p| clipped.dot(*p) >= 0.0) {
                break;
            }

            // Clipped back into an earlier plane. Never turn around.
            if clipped.dot(primal_velocity) <= 0.0 {
                self.pm.velocity = Vec3::ZERO;
                break;
            }
        }
    }

    /// Resolves a blocked ground move by trying to climb a step first.
    ///
    /// `dest` is where the straight move wanted to go and `blocked` is the
    /// sweep that stopped short of it.
    pub(crate) fn step_move(&mut self, dest: Vec3, blocked: TraceResult) {
        let start = self.pm.origin;
        let velocity = self.pm.velocity;
        let step = self.tuning.step_size;

        let up = self.trace(start, start + Vec3::new(0.0, 0.0, step));
        if up.all_solid {
            self.slide_to(blocked, velocity);
            return;
        }

        let across = self.trace(up.end_pos, Vec3::new(dest.x, dest.y, up.end_pos.z));
        let down = self.trace(across.end_pos, Vec3::new(across.end_pos.x, across.end_pos.y, start.z));

        let landed = !down.start_solid && !down.all_solid && down.hit_something() && down.is_floor();
        let stepped_dist = (down.end_pos - start).length_2d();
        let slid_dist = (blocked.end_pos - start).length_2d();

        if landed && stepped_dist > slid_dist {
            self.pm.origin = down.end_pos;
            if across.hit_something() {
                self.note_plane(across.plane.normal);
                self.pm.velocity = clip_velocity(velocity, across.plane.normal, 1.0);
            }
            return;
        }

        self.slide_to(blocked, velocity);
    }

    /// Commits the collision point of `trace` and slides along its plane.
    fn slide_to(&mut self, trace: TraceResult, velocity: Vec3) {
        self.pm.origin = trace.end_pos;
        self.note_plane(trace.plane.normal);
        self.pm.velocity = clip_velocity(velocity, trace.plane.normal, 1.0);
    }
}
