//! Position categorization, jumping, fall accounting and the velocity clamp.

use tracing::{debug, warn};

use super::{
    context::FallImpact,
    defs::{
        Buttons, Contents, PlayerFlags, WaterLevel, DAMAGE_FOR_FALL_SPEED, FALL_DAMAGE_THRESHOLD,
        FALL_PUNCH_SCALE, FALL_PUNCH_THRESHOLD, GROUND_CHECK_DIST, MAX_FALL_PUNCH,
        MAX_FLOOR_NORMAL, MAX_GROUNDED_UP_SPEED,
    },
    Mover,
};
use crate::math::Vec3;

/// Clamps every component to `[-max_velocity, max_velocity]`.
///
/// Non-finite components are reset to zero first. Clamping an already clamped
/// velocity changes nothing.
pub fn check_velocity(velocity: &mut Vec3, max_velocity: f32) {
    for i in 0..3 {
        if !velocity[i].is_finite() {
            warn!(axis = i, value = velocity[i], "non-finite velocity component reset");
            velocity[i] = 0.0;
        }
        velocity[i] = velocity[i].clamp(-max_velocity, max_velocity);
    }
}

impl Mover<'_> {
    /// Refreshes water level and ground contact from the current origin.
    pub(crate) fn categorize_position(&mut self) {
        self.check_water();

        let origin = self.pm.origin;
        let point = origin - Vec3::new(0.0, 0.0, GROUND_CHECK_DIST);
        let trace = self.trace(origin, point);

        let airborne = !trace.hit_something()
            || trace.plane.normal.z < MAX_FLOOR_NORMAL
            || self.pm.velocity.z > MAX_GROUNDED_UP_SPEED;
        if airborne {
            self.pm.set_ground(None);
            return;
        }

        // A sweep that reports a floor always names what it hit; fall back to
        // static geometry for tracers that leave it out.
        self.pm.set_ground(Some(trace.hit.unwrap_or(super::HitId::WORLD)));
        if trace.fraction > 0.0 && trace.fraction < 1.0 && !trace.start_solid {
            self.pm.origin = trace.end_pos;
        }
    }

    /// Samples contents at the feet, waist and eyes.
    fn check_water(&mut self) {
        let origin = self.pm.origin;
        let feet = Vec3::new(origin.x, origin.y, origin.z + self.pm.mins().z + 1.0);

        let mut level = WaterLevel::None;
        let mut kind = Contents::Empty;

        let contents = self.tracer.point_contents(feet);
        if contents.is_liquid() {
            kind = contents;
            level = WaterLevel::Feet;

            if self.tracer.point_contents(origin).is_liquid() {
                level = WaterLevel::Waist;

                if self.tracer.point_contents(self.pm.view_origin()).is_liquid() {
                    level = WaterLevel::Head;
                }
            }
        }

        self.pm.water_level = level;
        self.pm.water_type = kind;
        self.pm.flags.set(PlayerFlags::IN_WATER, level > WaterLevel::None);
    }

    /// Launches off the ground on a fresh jump press. Returns whether it fired.
    pub(crate) fn jump(&mut self) -> bool {
        if !self.pm.buttons.contains(Buttons::JUMP)
            || self.pm.old_buttons.contains(Buttons::JUMP)
            || !self.pm.is_on_ground()
        {
            return false;
        }

        self.pm.set_ground(None);
        self.pm.velocity.z = self.tuning.jump_speed();
        if self.pm.base_velocity.z > 0.0 {
            self.pm.velocity.z += self.pm.base_velocity.z;
            self.pm.base_velocity.z = 0.0;
        }
        self.pm.fall_velocity = 0.0;
        true
    }

    /// Tracks peak fall speed in the air and settles it on landing.
    pub(crate) fn check_falling(&mut self) {
        if !self.pm.is_on_ground() {
            let falling = -self.pm.velocity.z;
            if falling > self.pm.fall_velocity {
                self.pm.fall_velocity = falling;
            }
            return;
        }

        let fall = self.pm.fall_velocity;
        if fall >= FALL_PUNCH_THRESHOLD {
            self.pm.punch_angle.x = (fall * FALL_PUNCH_SCALE).min(MAX_FALL_PUNCH);
        }
        if fall >= FALL_DAMAGE_THRESHOLD {
            let damage = (fall - FALL_DAMAGE_THRESHOLD) * DAMAGE_FOR_FALL_SPEED;
            debug!(fall_velocity = fall, damage, "hard landing");
            self.fall = Some(FallImpact {
                fall_velocity: fall,
                damage,
            });
        }
        self.pm.fall_velocity = 0.0;
    }
}
