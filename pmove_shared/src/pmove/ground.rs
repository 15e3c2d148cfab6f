//! Walking on the ground.

use super::{
    accel::{accelerate, friction},
    defs::{
        Buttons, Hull, EDGE_PROBE_AHEAD, EDGE_PROBE_DEPTH, MIN_MOVE_SPEED, STOP_EPSILON,
        WALK_SPEED_MULTIPLIER,
    },
    state::check_velocity,
    Mover,
};
use crate::math::Vec3;

impl Mover<'_> {
    pub(crate) fn walk_move(&mut self) {
        let (forward, right) = self.flat_basis();
        let wish_vel = forward * self.pm.forward_move + right * self.pm.side_move;

        let max_speed = self.max_speed();
        let (wish_dir, mut wish_speed) = Self::wish(wish_vel, max_speed, max_speed);
        if self.pm.buttons.contains(Buttons::SPEED) {
            wish_speed *= WALK_SPEED_MULTIPLIER;
        }
        if self.pm.is_ducking() {
            wish_speed *= self.tuning.duck_speed_multiplier;
        }

        self.pm.velocity.z = 0.0;
        self.ground_friction();
        self.pm.velocity = accelerate(
            self.pm.velocity,
            wish_dir,
            wish_speed,
            self.tuning.accelerate,
            self.pm.frame_time,
        );
        check_velocity(&mut self.pm.velocity, self.tuning.max_velocity);

        let push = self.pm.base_velocity.flat();
        self.pm.velocity += push;

        if self.pm.velocity.length() < MIN_MOVE_SPEED {
            self.pm.velocity = Vec3::ZERO;
            return;
        }

        let dest = self.pm.origin + self.pm.velocity * self.pm.frame_time;
        let trace = self.trace(self.pm.origin, dest);
        if trace.fraction == 1.0 {
            self.pm.origin = dest;
        } else {
            self.step_move(dest, trace);
        }

        self.pm.velocity -= push;
    }

    /// Ground friction, doubled up near a drop-off.
    fn ground_friction(&mut self) {
        let speed = self.pm.velocity.length();
        if speed < STOP_EPSILON {
            return;
        }

        let mut rate = self.tuning.friction;
        if self.at_edge(speed) {
            rate *= self.tuning.edge_friction;
        }
        self.pm.velocity = friction(
            self.pm.velocity,
            self.tuning.stop_speed,
            rate,
            self.pm.frame_time,
        );
    }

    /// Probes the floor a little ahead of the feet along the current velocity.
    fn at_edge(&self, speed: f32) -> bool {
        let ahead = self.pm.velocity * (EDGE_PROBE_AHEAD / speed);
        let start = Vec3::new(
            self.pm.origin.x + ahead.x,
            self.pm.origin.y + ahead.y,
            self.pm.origin.z + self.pm.mins().z,
        );
        let stop = start - Vec3::new(0.0, 0.0, EDGE_PROBE_DEPTH);
        let probe = self.trace_hull(start, stop, Hull::Point);
        probe.fraction == 1.0
    }
}
