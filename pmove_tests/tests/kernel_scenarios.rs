//! The movement kernel on real brush geometry.
//!
//! Every scenario runs on [`BrushWorld::test_course`] or [`BrushWorld::flat_ground`]
//! with default tuning at 128 Hz, driving the kernel the same way the server
//! does: input state → user command → `player_move`.

use pmove_client::input::{build_command, InputState};
use pmove_shared::math::Vec3;
use pmove_shared::pmove::{
    player_move, Blocked, FallImpact, Hull, MoveMode, MoveOutcome, MoveTuning, PlayerMove,
    WaterLevel,
};
use pmove_shared::world::BrushWorld;

const FRAME: f32 = 1.0 / 128.0;

struct Runner {
    world: BrushWorld,
    tuning: MoveTuning,
    pm: PlayerMove,
    sequence: u32,
}

impl Runner {
    fn new(world: BrushWorld, origin: Vec3) -> Self {
        let tuning = MoveTuning::default();
        Self {
            world,
            pm: PlayerMove::spawn(origin, tuning.max_speed),
            tuning,
            sequence: 0,
        }
    }

    fn course(origin: Vec3) -> Self {
        Self::new(BrushWorld::test_course(), origin)
    }

    fn tick(&mut self, input: InputState) -> MoveOutcome {
        self.sequence += 1;
        build_command(self.sequence, input).apply(&mut self.pm, FRAME);
        player_move(&mut self.pm, &self.tuning, &self.world)
    }

    fn hold(&mut self, ticks: u32, input: InputState) -> Vec<MoveOutcome> {
        (0..ticks).map(|_| self.tick(input)).collect()
    }
}

fn run(yaw: f32) -> InputState {
    InputState {
        forward: 1.0,
        yaw,
        ..Default::default()
    }
}

#[test]
fn standing_still_on_the_floor_goes_nowhere() {
    let mut r = Runner::course(Vec3::new(0.0, 0.0, 36.0));
    let outcomes = r.hold(128, InputState::default());

    assert!(outcomes.iter().all(|o| o.mode == MoveMode::Walk));
    assert_eq!(r.pm.origin, Vec3::new(0.0, 0.0, 36.0));
    assert_eq!(r.pm.velocity, Vec3::ZERO);
    assert!(r.pm.is_on_ground());
}

#[test]
fn running_climbs_the_stairs_and_stops_at_the_wall() {
    let mut r = Runner::course(Vec3::new(0.0, 0.0, 36.0));

    let mut top = f32::MIN;
    let mut blocked = Blocked::empty();
    for _ in 0..384 {
        let outcome = r.tick(run(0.0));
        top = top.max(r.pm.origin.z);
        blocked |= outcome.blocked;
        assert!(!outcome.stuck(), "stuck at {:?}", r.pm.origin);
    }

    // Highest step is 64 units tall.
    assert!((99.0..101.0).contains(&top), "top of stairs at z = {top}");
    assert!(blocked.contains(Blocked::WALL));

    // Back on the floor, flush against the wall face at x = 512.
    assert!(r.pm.is_on_ground());
    assert!((r.pm.origin.z - 36.0).abs() < 0.1, "{:?}", r.pm.origin);
    let gap = 512.0 - Hull::Standing.maxs().x - r.pm.origin.x;
    assert!((0.0..0.5).contains(&gap), "gap to wall {gap}");
    assert!(r.pm.velocity.x.abs() < 1e-3);
}

#[test]
fn running_into_the_wall_at_an_angle_slides_along_it() {
    let mut r = Runner::course(Vec3::new(400.0, 0.0, 36.0));
    r.hold(96, run(45.0));

    let gap = 512.0 - Hull::Standing.maxs().x - r.pm.origin.x;
    assert!((0.0..0.5).contains(&gap), "gap to wall {gap}");
    assert!(r.pm.origin.y > 64.0, "did not slide: {:?}", r.pm.origin);
    assert!(r.pm.velocity.y > 0.0);
    assert!(r.pm.velocity.x.abs() < 1e-3);
}

#[test]
fn a_jump_peaks_near_jump_height_and_lands() {
    let mut r = Runner::new(BrushWorld::flat_ground(), Vec3::new(0.0, 0.0, 36.0));
    r.tick(InputState::default());

    let first = r.tick(InputState {
        jump: true,
        ..Default::default()
    });
    assert_eq!(first.mode, MoveMode::Jump);
    assert!(!r.pm.is_on_ground());

    // Holding jump does not bounce again on landing.
    let mut apex = r.pm.origin.z;
    let mut outcomes = Vec::new();
    for _ in 0..128 {
        outcomes.push(r.tick(InputState {
            jump: true,
            ..Default::default()
        }));
        apex = apex.max(r.pm.origin.z);
    }

    let rise = apex - 36.0;
    assert!((42.0..=45.5).contains(&rise), "jump rose {rise}");
    assert_eq!(outcomes.iter().filter(|o| o.mode == MoveMode::Jump).count(), 0);
    assert!(r.pm.is_on_ground());
    assert!(outcomes.iter().all(|o| o.fall.is_none()));
}

#[test]
fn long_fall_reports_damage_once() {
    let mut r = Runner::new(BrushWorld::flat_ground(), Vec3::new(0.0, 0.0, 636.0));

    let mut impacts: Vec<FallImpact> = Vec::new();
    for _ in 0..512 {
        if let Some(fall) = r.tick(InputState::default()).fall {
            impacts.push(fall);
        }
        if r.pm.is_on_ground() && !impacts.is_empty() {
            break;
        }
    }

    assert_eq!(impacts.len(), 1, "{impacts:?}");
    let impact = impacts[0];
    // sqrt(2 * 800 * 600) is about 980 u/s.
    assert!((940.0..1000.0).contains(&impact.fall_velocity), "{impact:?}");
    assert!((60.0..100.0).contains(&impact.damage), "{impact:?}");
    assert_eq!(r.pm.fall_velocity, 0.0);
    assert!(r.pm.punch_angle.x > 0.0);

    // Standing around afterwards reports nothing more.
    assert!(r.hold(32, InputState::default()).iter().all(|o| o.fall.is_none()));
}

#[test]
fn ducking_shrinks_the_hull_and_slows_the_player() {
    let mut r = Runner::new(BrushWorld::flat_ground(), Vec3::new(0.0, 0.0, 36.0));
    let duck = InputState {
        duck: true,
        ..run(0.0)
    };
    r.hold(128, duck);

    assert_eq!(r.pm.use_hull, Hull::Ducked);
    assert!(r.pm.is_ducking());
    assert_eq!(r.pm.origin.z, 18.0);
    let cap = 320.0 * r.tuning.duck_speed_multiplier;
    assert!(r.pm.speed_2d() <= cap + 0.5, "ducked speed {}", r.pm.speed_2d());

    r.tick(run(0.0));
    assert_eq!(r.pm.use_hull, Hull::Standing);
    assert_eq!(r.pm.origin.z, 36.0);
}

#[test]
fn the_pool_is_swum_through_without_gravity() {
    let mut r = Runner::course(Vec3::new(-384.0, -384.0, 40.0));

    let first = r.tick(InputState::default());
    assert_eq!(first.mode, MoveMode::Water);
    assert_eq!(r.pm.water_level, WaterLevel::Head);
    assert_eq!(r.pm.velocity, Vec3::ZERO);
    assert_eq!(r.pm.origin.z, 40.0);

    // Look almost straight up and swim to the surface.
    let up = InputState {
        pitch: -80.0,
        ..run(0.0)
    };
    let mut top = r.pm.origin.z;
    let mut surfaced = false;
    for _ in 0..128 {
        let outcome = r.tick(up);
        top = top.max(r.pm.origin.z);
        // Once out of the water gravity takes over and falling back in is fast.
        surfaced |= outcome.mode != MoveMode::Water;
        if !surfaced {
            assert!(r.pm.velocity.length() <= 320.0 * 0.8 + 1.0, "{:?}", r.pm.velocity);
        }
    }
    assert!(top > 80.0, "only reached z = {top}");
}

#[test]
fn the_ladder_is_climbed_by_looking_up() {
    let mut r = Runner::course(Vec3::new(0.0, 450.0, 36.0));
    let climb = InputState {
        pitch: -45.0,
        ..run(90.0)
    };

    let outcomes = r.hold(64, climb);

    assert!(outcomes.iter().all(|o| o.mode == MoveMode::Ladder));
    assert!(r.pm.on_ladder);
    let facing = r.pm.ladder_normal - Vec3::new(0.0, -1.0, 0.0);
    assert!(facing.length() < 1e-4, "{:?}", r.pm.ladder_normal);
    assert!(r.pm.origin.z > 120.0, "{:?}", r.pm.origin);
    assert_eq!(r.pm.fall_velocity, 0.0);

    // Letting go hangs in place.
    let z = r.pm.origin.z;
    r.tick(InputState {
        yaw: 90.0,
        ..Default::default()
    });
    assert_eq!(r.pm.origin.z, z);
}

#[test]
fn a_map_loaded_from_disk_moves_the_same() -> anyhow::Result<()> {
    let course = BrushWorld::test_course();
    let path = std::env::temp_dir().join(format!("pmove-course-{}.json", std::process::id()));
    std::fs::write(&path, serde_json::to_string(&course.to_map())?)?;
    let loaded = BrushWorld::load(&path)?;
    std::fs::remove_file(&path)?;

    let mut a = Runner::new(course, Vec3::new(0.0, 0.0, 36.0));
    let mut b = Runner::new(loaded, Vec3::new(0.0, 0.0, 36.0));
    for yaw in [0.0, 30.0, 90.0, 180.0] {
        a.hold(64, run(yaw));
        b.hold(64, run(yaw));
    }
    assert_eq!(a.pm, b.pm);
    Ok(())
}
