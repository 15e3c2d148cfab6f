//! Crouch transition: standing, ducking (timed), ducked.

use super::{
    defs::{Buttons, Hull, PlayerFlags, DUCK_TIME, HULL_HEIGHT_DELTA},
    Mover,
};
use crate::math::Vec3;

impl Mover<'_> {
    pub(crate) fn duck(&mut self) {
        let held = self.pm.buttons.contains(Buttons::DUCK);

        if held {
            if !self.pm.is_ducking() && !self.pm.in_duck {
                self.pm.in_duck = true;
                self.pm.duck_time = DUCK_TIME;
            }
        } else if self.pm.is_ducking() || self.pm.in_duck {
            self.try_unduck();
        }

        if self.pm.in_duck {
            self.pm.duck_time = (self.pm.duck_time - self.pm.frame_time).max(0.0);
            if self.pm.duck_time <= 0.0 || !self.pm.is_on_ground() {
                self.finish_duck();
            }
        }
    }

    /// Stands up if the standing hull fits.
    fn try_unduck(&mut self) {
        let mut standing = self.pm.origin;
        // Only a fully ducked hull changes height; mid-transition the player
        // still occupies the standing hull.
        if self.pm.is_ducking() && self.pm.is_on_ground() {
            standing.z += HULL_HEIGHT_DELTA;
        }

        let fit = self.trace_hull(standing, standing, Hull::Standing);
        if fit.start_solid {
            return;
        }

        self.pm.flags.remove(PlayerFlags::DUCKING);
        self.pm.use_hull = Hull::Standing;
        self.pm.in_duck = false;
        self.pm.duck_time = 0.0;
        self.pm.origin = standing;
    }

    fn finish_duck(&mut self) {
        if self.pm.is_on_ground() {
            self.pm.origin -= Vec3::new(0.0, 0.0, HULL_HEIGHT_DELTA);
        }
        self.pm.flags.insert(PlayerFlags::DUCKING);
        self.pm.use_hull = Hull::Ducked;
        self.pm.in_duck = false;
        self.pm.duck_time = 0.0;
    }
}
