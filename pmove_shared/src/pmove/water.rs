//! Swimming.

use super::{
    accel::{accelerate, water_friction},
    defs::WATER_SPEED_MULTIPLIER,
    Mover,
};

impl Mover<'_> {
    /// Full 3-D wish vector, no gravity, drag instead of ground friction.
    pub(crate) fn water_move(&mut self) {
        let mut wish_vel = self.pm.forward * self.pm.forward_move + self.pm.right * self.pm.side_move;
        wish_vel.z += self.pm.up_move;

        let max_speed = self.max_speed();
        let (wish_dir, wish_speed) =
            Self::wish(wish_vel, max_speed, max_speed * WATER_SPEED_MULTIPLIER);

        self.pm.velocity = water_friction(
            self.pm.velocity,
            self.tuning.water_friction,
            self.pm.frame_time,
        );
        self.pm.velocity = accelerate(
            self.pm.velocity,
            wish_dir,
            wish_speed,
            self.tuning.water_accelerate,
            self.pm.frame_time,
        );

        let push = self.pm.base_velocity;
        self.pm.velocity += push;
        self.fly_move();
        self.pm.velocity -= push;
    }
}

#[cfg(test)]
mod tests {
    use crate::math::Vec3;
    use crate::pmove::{
        player_move, Contents, Hull, MoveMode, MoveTrace, MoveTuning, PlayerFlags, PlayerMove,
        TraceResult, WaterLevel,
    };

    /// Open water everywhere below `surface`.
    struct Pool {
        surface: f32,
    }

    impl MoveTrace for Pool {
        fn trace(&self, _pm: &PlayerMove, _start: Vec3, end: Vec3, _hull: Hull) -> TraceResult {
            TraceResult::clear(end)
        }

        fn point_contents(&self, point: Vec3) -> Contents {
            if point.z < self.surface {
                Contents::Water
            } else {
                Contents::Empty
            }
        }
    }

    fn swimmer() -> PlayerMove {
        let mut pm = PlayerMove::spawn(Vec3::new(0.0, 0.0, -200.0), 320.0);
        pm.frame_time = 1.0 / 128.0;
        pm
    }

    #[test]
    fn submerged_player_swims_without_gravity() {
        let tuning = MoveTuning::default();
        let pool = Pool { surface: 0.0 };
        let mut pm = swimmer();

        let outcome = player_move(&mut pm, &tuning, &pool);

        assert_eq!(outcome.mode, MoveMode::Water);
        assert_eq!(pm.water_level, WaterLevel::Head);
        assert_eq!(pm.water_type, Contents::Water);
        assert!(pm.flags.contains(PlayerFlags::IN_WATER));
        assert_eq!(pm.velocity, Vec3::ZERO);
    }

    #[test]
    fn swim_speed_is_capped_below_run_speed() {
        let tuning = MoveTuning::default();
        let pool = Pool { surface: 0.0 };
        let mut pm = swimmer();
        pm.forward_move = 1.0;
        pm.up_move = 1.0;

        for _ in 0..512 {
            player_move(&mut pm, &tuning, &pool);
            pm.origin = Vec3::new(0.0, 0.0, -200.0);
        }

        assert!(pm.velocity.length() <= 320.0 * 0.8 + 0.5, "{:?}", pm.velocity);
        assert!(pm.velocity.z > 0.0);
        assert!(pm.velocity.x > 0.0);
    }

    #[test]
    fn looking_down_swims_down() {
        let tuning = MoveTuning::default();
        let pool = Pool { surface: 0.0 };
        let mut pm = swimmer();
        pm.view_angles = Vec3::new(60.0, 0.0, 0.0);
        pm.forward_move = 1.0;

        player_move(&mut pm, &tuning, &pool);

        assert!(pm.velocity.z < 0.0);
    }

    #[test]
    fn drag_slows_an_idle_swimmer() {
        let tuning = MoveTuning::default();
        let pool = Pool { surface: 0.0 };
        let mut pm = swimmer();
        pm.velocity = Vec3::new(200.0, 0.0, 0.0);

        player_move(&mut pm, &tuning, &pool);

        assert!(pm.velocity.x < 200.0 && pm.velocity.x > 190.0);
    }

    #[test]
    fn ankle_deep_water_is_feet_level() {
        let tuning = MoveTuning::default();
        // Surface just above the feet.
        let pool = Pool { surface: -200.0 + 1.0 - 36.0 + 10.0 };
        let mut pm = swimmer();

        player_move(&mut pm, &tuning, &pool);

        assert_eq!(pm.water_level, WaterLevel::Feet);
    }
}
