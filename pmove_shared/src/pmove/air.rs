//! Airborne movement.

use super::{accel::air_accelerate, Mover};

impl Mover<'_> {
    pub(crate) fn air_move(&mut self) {
        let (forward, right) = self.flat_basis();
        let wish_vel = forward * self.pm.forward_move + right * self.pm.side_move;

        let max_speed = self.max_speed();
        let (wish_dir, wish_speed) = Self::wish(wish_vel, max_speed, max_speed);

        self.pm.velocity = air_accelerate(
            self.pm.velocity,
            wish_dir,
            wish_speed,
            self.tuning.air_speed_cap,
            self.tuning.air_accelerate,
            self.pm.frame_time,
        );
        self.add_gravity();

        let push = self.pm.base_velocity.flat();
        self.pm.velocity += push;
        self.fly_move();
        self.pm.velocity -= push;
    }

    /// Gravity plus any pending vertical push, which is consumed.
    pub(crate) fn add_gravity(&mut self) {
        let dt = self.pm.frame_time;
        self.pm.velocity.z -= self.tuning.effective_gravity() * dt;
        self.pm.velocity.z += self.pm.base_velocity.z * dt;
        self.pm.base_velocity.z = 0.0;
    }
}
