//! Acceleration and friction primitives.
//!
//! Pure functions over a velocity so they can be checked in isolation; the
//! mode code feeds them the context's velocity and tuning.

use super::defs::STOP_EPSILON;
use crate::math::Vec3;

/// Accelerates `velocity` toward `wish_speed` along the unit `wish_dir`.
///
/// Only the component along `wish_dir` grows, and never past `wish_speed`.
/// Speed already beyond it is left alone.
pub fn accelerate(velocity: Vec3, wish_dir: Vec3, wish_speed: f32, rate: f32, frame_time: f32) -> Vec3 {
    let current = velocity.dot(wish_dir);
    let add = wish_speed - current;
    if add <= 0.0 {
        return velocity;
    }

    let accel_speed = (rate * frame_time * wish_speed).min(add);
    velocity + wish_dir * accel_speed
}

/// Air acceleration: [`accelerate`] with the wish speed first capped to `cap`.
///
/// With a small cap and a wish direction perpendicular to the current
/// velocity, the projected speed stays near zero, so nearly the whole capped
/// amount is added every tick no matter how fast the player already moves.
pub fn air_accelerate(
    velocity: Vec3,
    wish_dir: Vec3,
    wish_speed: f32,
    cap: f32,
    rate: f32,
    frame_time: f32,
) -> Vec3 {
    accelerate(velocity, wish_dir, wish_speed.min(cap), rate, frame_time)
}

/// Ground friction: a linear drop of `max(speed, stop_speed) * rate * dt`.
///
/// Never increases speed and never reverses direction.
pub fn friction(velocity: Vec3, stop_speed: f32, rate: f32, frame_time: f32) -> Vec3 {
    let speed = velocity.length();
    if speed < STOP_EPSILON {
        return velocity;
    }

    let control = speed.max(stop_speed);
    let drop = control * rate * frame_time;
    let new_speed = (speed - drop).max(0.0);
    if new_speed == speed {
        return velocity;
    }
    velocity * (new_speed / speed)
}

/// Water drag: `speed * (1 - dt * rate)`, floored at zero.
pub(crate) fn water_friction(velocity: Vec3, rate: f32, frame_time: f32) -> Vec3 {
    let speed = velocity.length();
    if speed <= 0.0 {
        return velocity;
    }
    let new_speed = (speed - frame_time * speed * rate).max(0.0);
    velocity * (new_speed / speed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DT: f32 = 1.0 / 128.0;

    fn vec3() -> impl Strategy<Value = Vec3> {
        (-2000.0f32..2000.0, -2000.0f32..2000.0, -2000.0f32..2000.0)
            .prop_map(|(x, y, z)| Vec3::new(x, y, z))
    }

    fn unit_dir() -> impl Strategy<Value = Vec3> {
        (0.0f32..360.0).prop_map(|yaw| {
            let (s, c) = yaw.to_radians().sin_cos();
            Vec3::new(c, s, 0.0)
        })
    }

    #[test]
    fn accelerate_from_rest() {
        let v = accelerate(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 320.0, 10.0, DT);
        assert_eq!(v, Vec3::new(25.0, 0.0, 0.0));
    }

    #[test]
    fn accelerate_never_overshoots_wish_speed() {
        let v = accelerate(Vec3::new(310.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 320.0, 10.0, DT);
        assert_eq!(v.x, 320.0);
    }

    #[test]
    fn zero_frame_time_is_a_no_op() {
        let v = Vec3::new(40.0, -3.0, 0.0);
        assert_eq!(accelerate(v, Vec3::new(0.0, 1.0, 0.0), 320.0, 10.0, 0.0), v);
        assert_eq!(friction(v, 100.0, 4.0, 0.0), v);
    }

    #[test]
    fn friction_stops_slow_movers() {
        // control = stop_speed, so a slow player stops within a couple of ticks.
        let mut v = Vec3::new(2.0, 0.0, 0.0);
        v = friction(v, 100.0, 4.0, DT);
        assert_eq!(v, Vec3::ZERO);
    }

    #[test]
    fn water_friction_decays_proportionally() {
        let v = water_friction(Vec3::new(100.0, 0.0, 0.0), 1.0, 0.5);
        assert!((v.x - 50.0).abs() < 1e-4);
        assert_eq!(water_friction(Vec3::new(100.0, 0.0, 0.0), 1.0, 2.0), Vec3::ZERO);
    }

    proptest! {
        #[test]
        fn acceleration_never_reduces_speed_along_wish(
            v in vec3(),
            dir in unit_dir(),
            wish in 0.0f32..400.0,
            dt in 0.0001f32..0.1,
        ) {
            let out = accelerate(v, dir, wish, 10.0, dt);
            let before = v.dot(dir);
            let after = out.dot(dir);
            prop_assert!(after >= before - 1e-3);
            if before < wish {
                prop_assert!(after <= wish + 1e-2);
            }

            // The orthogonal part is untouched.
            let ortho_before = v - dir * before;
            let ortho_after = out - dir * after;
            prop_assert!((ortho_before - ortho_after).length() < 1e-2);
        }

        #[test]
        fn perpendicular_air_strafe_gains_speed(
            speed in 50.0f32..1500.0,
            yaw in 0.0f32..360.0,
            wish in 0.0f32..400.0,
        ) {
            let (s, c) = yaw.to_radians().sin_cos();
            let v = Vec3::new(c * speed, s * speed, 0.0);
            let dir = Vec3::new(-s, c, 0.0);
            let out = air_accelerate(v, dir, wish, 30.0, 10.0, DT);

            let gain = 10.0 * DT * wish.min(30.0);
            let expected = (speed * speed + gain * gain).sqrt();
            prop_assert!((out.length_2d() - expected).abs() < expected * 1e-5 + 1e-3);
        }

        #[test]
        fn friction_is_monotonic(
            v in vec3(),
            stop in 0.0f32..200.0,
            rate in 0.0f32..10.0,
            dt in 0.0f32..0.1,
        ) {
            let out = friction(v, stop, rate, dt);
            let speed = v.length();
            prop_assert!(out.length() <= speed + 1e-3);
            // Same direction or stopped.
            prop_assert!(out.dot(v) >= 0.0);

            if speed >= STOP_EPSILON {
                let expected = (speed - speed.max(stop) * rate * dt).max(0.0);
                prop_assert!((out.length() - expected).abs() < 1e-2);
            }
        }
    }
}
