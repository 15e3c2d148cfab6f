//! Ladder detection and climbing.

use super::{
    defs::{Buttons, Contents, Hull, PlayerFlags, LADDER_REACH, LADDER_SPEED, STOP_EPSILON},
    Mover,
};
use crate::math::Vec3;

/// Speed of the push away from a ladder when jumping off it.
const LADDER_JUMP_SPEED: f32 = 270.0;

impl Mover<'_> {
    /// Looks for ladder contents inside the hull or just ahead of it.
    ///
    /// On contact, records the ladder's facing in `ladder_normal`.
    pub(crate) fn check_ladder(&mut self) -> bool {
        let (forward, _) = self.flat_basis();
        let origin = self.pm.origin;
        let reach = self.pm.maxs().x + LADDER_REACH;
        let ahead = origin + forward * reach;

        let touching = self.tracer.point_contents(origin) == Contents::Ladder
            || self.tracer.point_contents(ahead) == Contents::Ladder;

        self.pm.on_ladder = touching;
        self.pm.flags.set(PlayerFlags::ON_LADDER, touching);
        if !touching {
            self.pm.ladder_normal = Vec3::ZERO;
            return false;
        }

        // The climbable face is whatever solid backs the ladder.
        let probe = self.trace_hull(origin, ahead, Hull::Point);
        self.pm.ladder_normal = if probe.hit_something() && probe.plane.normal != Vec3::ZERO {
            probe.plane.normal
        } else {
            -forward
        };
        true
    }

    /// Climb velocity replaces the player's velocity outright.
    pub(crate) fn ladder_move(&mut self) {
        self.pm.fall_velocity = 0.0;

        let normal = self.pm.ladder_normal;
        if self.pm.buttons.pressed(self.pm.old_buttons).contains(Buttons::JUMP) {
            self.pm.velocity = normal * LADDER_JUMP_SPEED;
            self.fly_move();
            return;
        }

        let mut speed = LADDER_SPEED;
        if self.pm.buttons.contains(Buttons::SPEED) {
            speed *= 0.5;
        }

        // Any held forward or side amount moves at full ladder speed.
        let mut velocity = Vec3::ZERO;
        if self.pm.forward_move != 0.0 {
            let climb = if self.pm.view_angles.x < 0.0 {
                self.pm.forward_move.signum()
            } else {
                -self.pm.forward_move.signum()
            };
            velocity.z += climb * speed;
        }
        velocity.z += self.pm.up_move * speed;

        if self.pm.side_move != 0.0 {
            let (mut tangent, _) = normal.cross(Vec3::UP).flat().normalize_or_zero(STOP_EPSILON);
            let (_, right) = self.flat_basis();
            if tangent.dot(right) < 0.0 {
                tangent = -tangent;
            }
            velocity += tangent * (self.pm.side_move.signum() * speed);
        }

        velocity.z = velocity.z.clamp(-speed, speed);
        self.pm.velocity = velocity;
        self.fly_move();
    }
}
