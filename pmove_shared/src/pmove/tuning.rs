//! Server-controlled movement variables.
//!
//! These define the feel of player movement; `air_accelerate` and
//! `air_speed_cap` in particular decide how much speed air-strafing can build.
//! A tuning value is shared read-only by every tick in flight and is only
//! swapped between ticks.

use serde::{Deserialize, Serialize};

/// Movement tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveTuning {
    pub gravity: f32,
    pub stop_speed: f32,
    pub max_speed: f32,
    pub accelerate: f32,
    pub air_accelerate: f32,
    pub water_accelerate: f32,
    pub friction: f32,
    /// Friction multiplier near a ledge.
    pub edge_friction: f32,
    pub water_friction: f32,
    /// Per-entity gravity scale; 0 is treated as 1.
    pub ent_gravity: f32,
    pub step_size: f32,
    pub max_velocity: f32,
    pub jump_height: f32,
    /// Wish-speed cap applied to air acceleration.
    pub air_speed_cap: f32,
    /// Ground wish-speed scale while fully ducked.
    pub duck_speed_multiplier: f32,
}

impl Default for MoveTuning {
    fn default() -> Self {
        Self {
            gravity: 800.0,
            stop_speed: 100.0,
            max_speed: 320.0,
            accelerate: 10.0,
            air_accelerate: 10.0,
            water_accelerate: 10.0,
            friction: 4.0,
            edge_friction: 2.0,
            water_friction: 1.0,
            ent_gravity: 1.0,
            step_size: 18.0,
            max_velocity: 2000.0,
            jump_height: 45.0,
            air_speed_cap: 30.0,
            duck_speed_multiplier: 0.333,
        }
    }
}

impl MoveTuning {
    /// Launch speed that peaks at `jump_height`: `sqrt(2 * g * h)`.
    pub fn jump_speed(&self) -> f32 {
        (2.0 * self.gravity * self.jump_height).max(0.0).sqrt()
    }

    /// Gravity after the entity scale.
    pub fn effective_gravity(&self) -> f32 {
        if self.ent_gravity != 0.0 {
            self.gravity * self.ent_gravity
        } else {
            self.gravity
        }
    }
}
