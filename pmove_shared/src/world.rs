//! Brush world.
//!
//! Static map geometry made of axis-aligned boxes ("brushes"), each carrying
//! a [`Contents`] kind. Solid brushes block hull sweeps; the other kinds are
//! only visible through `point_contents` (water volumes, ladders).
//!
//! Maps are JSON:
//! ```json
//! {
//!   "name": "box",
//!   "brushes": [
//!     { "mins": { "x": -512, "y": -512, "z": -16 },
//!       "maxs": { "x": 512, "y": 512, "z": 0 },
//!       "contents": "solid" }
//!   ],
//!   "spawns": [ { "x": 0, "y": 0, "z": 36 } ]
//! }
//! ```

use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::math::Vec3;
use crate::pmove::{Contents, HitId, Hull, MoveTrace, Plane, PlayerMove, TraceResult};

/// Sweeps stop this far short of the surface they hit.
pub const DIST_EPSILON: f32 = 1.0 / 32.0;

/// One axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Brush {
    pub mins: Vec3,
    pub maxs: Vec3,
    #[serde(default = "default_contents")]
    pub contents: Contents,
}

fn default_contents() -> Contents {
    Contents::Solid
}

impl Brush {
    pub fn solid(mins: Vec3, maxs: Vec3) -> Self {
        Self {
            mins,
            maxs,
            contents: Contents::Solid,
        }
    }

    pub fn volume(mins: Vec3, maxs: Vec3, contents: Contents) -> Self {
        Self {
            mins,
            maxs,
            contents,
        }
    }

    fn contains_point(&self, p: Vec3) -> bool {
        (0..3).all(|i| p[i] >= self.mins[i] && p[i] <= self.maxs[i])
    }
}

/// Serialized map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapData {
    #[serde(default)]
    pub name: String,
    pub brushes: Vec<Brush>,
    #[serde(default)]
    pub spawns: Vec<Vec3>,
}

/// Collision world built from brushes.
#[derive(Debug, Clone, Default)]
pub struct BrushWorld {
    name: String,
    brushes: Vec<Brush>,
    spawns: Vec<Vec3>,
}

impl BrushWorld {
    /// Validates and builds a world from map data.
    pub fn from_map(map: MapData) -> anyhow::Result<Self> {
        for (i, brush) in map.brushes.iter().enumerate() {
            if !brush.mins.is_finite() || !brush.maxs.is_finite() {
                bail!("brush {i} has non-finite bounds");
            }
            if (0..3).any(|axis| brush.mins[axis] >= brush.maxs[axis]) {
                bail!(
                    "brush {i} is inverted or flat: mins {:?} maxs {:?}",
                    brush.mins,
                    brush.maxs
                );
            }
        }
        if let Some(bad) = map.spawns.iter().find(|s| !s.is_finite()) {
            bail!("non-finite spawn point {bad:?}");
        }

        Ok(Self {
            name: map.name,
            brushes: map.brushes,
            spawns: map.spawns,
        })
    }

    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let map: MapData = serde_json::from_str(s).context("parse map json")?;
        Self::from_map(map)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("read map {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("load map {}", path.display()))
    }

    /// A single large floor with its top at z = 0.
    pub fn flat_ground() -> Self {
        Self {
            name: "flat".to_string(),
            brushes: vec![Brush::solid(
                Vec3::new(-4096.0, -4096.0, -64.0),
                Vec3::new(4096.0, 4096.0, 0.0),
            )],
            spawns: vec![Vec3::new(0.0, 0.0, 36.0)],
        }
    }

    /// Small course exercising every movement mode.
    ///
    /// - floor top at z = 0
    /// - a staircase of 16-unit steps rising along +x from x = 128
    /// - a wall at x = 512
    /// - a water pool 96 deep around (-384, -384)
    /// - a ladder on the -y face of a pillar at y = 480
    pub fn test_course() -> Self {
        let mut brushes = vec![Brush::solid(
            Vec3::new(-1024.0, -1024.0, -64.0),
            Vec3::new(1024.0, 1024.0, 0.0),
        )];

        for step in 0..4 {
            let x = 128.0 + 32.0 * step as f32;
            let top = 16.0 * (step + 1) as f32;
            brushes.push(Brush::solid(
                Vec3::new(x, -64.0, 0.0),
                Vec3::new(320.0, 64.0, top),
            ));
        }

        brushes.push(Brush::solid(
            Vec3::new(512.0, -256.0, 0.0),
            Vec3::new(528.0, 256.0, 256.0),
        ));

        brushes.push(Brush::volume(
            Vec3::new(-512.0, -512.0, 0.0),
            Vec3::new(-256.0, -256.0, 96.0),
            Contents::Water,
        ));

        brushes.push(Brush::solid(
            Vec3::new(-64.0, 480.0, 0.0),
            Vec3::new(64.0, 512.0, 512.0),
        ));
        brushes.push(Brush::volume(
            Vec3::new(-64.0, 440.0, 0.0),
            Vec3::new(64.0, 480.0, 512.0),
            Contents::Ladder,
        ));

        Self {
            name: "test_course".to_string(),
            brushes,
            spawns: vec![
                Vec3::new(0.0, 0.0, 36.0),
                Vec3::new(0.0, -128.0, 36.0),
                Vec3::new(-128.0, 0.0, 36.0),
                Vec3::new(-128.0, -128.0, 36.0),
            ],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn brushes(&self) -> &[Brush] {
        &self.brushes
    }

    pub fn spawn_points(&self) -> &[Vec3] {
        &self.spawns
    }

    /// Spawn point for the `n`th player, cycling through the list.
    pub fn spawn_point(&self, n: usize) -> Vec3 {
        if self.spawns.is_empty() {
            return Vec3::new(0.0, 0.0, Hull::Standing.maxs().z);
        }
        self.spawns[n % self.spawns.len()]
    }

    pub fn to_map(&self) -> MapData {
        MapData {
            name: self.name.clone(),
            brushes: self.brushes.clone(),
            spawns: self.spawns.clone(),
        }
    }

    /// Sweeps an axis-aligned hull from `start` to `end` against solid brushes.
    pub fn trace_hull(&self, start: Vec3, end: Vec3, hull: Hull) -> TraceResult {
        let (mins, maxs) = (hull.mins(), hull.maxs());
        let mut best = TraceResult::clear(end);
        let mut best_enter = f32::INFINITY;
        let delta = end - start;
        let moving = delta != Vec3::ZERO;

        for (index, brush) in self.brushes.iter().enumerate() {
            if brush.contents != Contents::Solid {
                continue;
            }

            // Minkowski sum: sweeping the hull equals sweeping its origin
            // through the brush grown by the hull extents.
            let lo = brush.mins - maxs;
            let hi = brush.maxs - mins;

            if strictly_inside(start, lo, hi) {
                best.start_solid = true;
                if !moving || strictly_inside(end, lo, hi) {
                    best.all_solid = true;
                    best.fraction = 0.0;
                    best.end_pos = start;
                    best.hit = Some(HitId(index as u32));
                    return best;
                }
                // Leaving a brush is never blocked by it.
                continue;
            }
            if !moving {
                continue;
            }

            if let Some((enter, axis, sign)) = slab_entry(start, delta, lo, hi) {
                if enter < best_enter {
                    best_enter = enter;
                    let backoff = DIST_EPSILON / delta[axis].abs();
                    let fraction = (enter - backoff).max(0.0);
                    let mut normal = Vec3::ZERO;
                    normal[axis] = sign;
                    let plane_point = if sign > 0.0 { hi[axis] } else { lo[axis] };
                    best.fraction = fraction;
                    best.end_pos = start + delta * fraction;
                    best.plane = Plane {
                        normal,
                        dist: plane_point * sign,
                    };
                    best.hit = Some(HitId(index as u32));
                }
            }
        }

        best
    }
}

/// Entry time of a ray into a box, with the axis and outward normal sign of
/// the face it enters through. `None` when the ray misses or only touches.
fn slab_entry(start: Vec3, delta: Vec3, lo: Vec3, hi: Vec3) -> Option<(f32, usize, f32)> {
    let mut enter = f32::NEG_INFINITY;
    let mut exit = f32::INFINITY;
    let mut axis = 0;
    let mut sign = 0.0;

    for i in 0..3 {
        if delta[i] == 0.0 {
            if start[i] <= lo[i] || start[i] >= hi[i] {
                return None;
            }
            continue;
        }

        let inv = 1.0 / delta[i];
        let t_lo = (lo[i] - start[i]) * inv;
        let t_hi = (hi[i] - start[i]) * inv;
        let (near, far, face_sign) = if t_lo < t_hi {
            (t_lo, t_hi, -1.0)
        } else {
            (t_hi, t_lo, 1.0)
        };

        if near > enter {
            enter = near;
            axis = i;
            sign = face_sign;
        }
        exit = exit.min(far);
    }

    if enter >= exit || exit <= 0.0 || !(0.0..1.0).contains(&enter) {
        return None;
    }
    Some((enter, axis, sign))
}

fn strictly_inside(p: Vec3, lo: Vec3, hi: Vec3) -> bool {
    (0..3).all(|i| p[i] > lo[i] && p[i] < hi[i])
}

impl MoveTrace for BrushWorld {
    fn trace(&self, _pm: &PlayerMove, start: Vec3, end: Vec3, hull: Hull) -> TraceResult {
        self.trace_hull(start, end, hull)
    }

    fn point_contents(&self, point: Vec3) -> Contents {
        self.brushes
            .iter()
            .filter(|b| b.contains_point(point))
            .map(|b| b.contents)
            .max_by_key(|c| c.strength())
            .unwrap_or(Contents::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downward_sweep_stops_short_of_the_floor() {
        let world = BrushWorld::flat_ground();
        let start = Vec3::new(0.0, 0.0, 100.0);
        let end = Vec3::new(0.0, 0.0, 0.0);

        let tr = world.trace_hull(start, end, Hull::Standing);

        assert!(tr.hit_something());
        assert!(!tr.start_solid);
        assert_eq!(tr.plane.normal, Vec3::UP);
        assert!(tr.is_floor());
        assert!((tr.end_pos.z - (36.0 + DIST_EPSILON)).abs() < 1e-4, "{:?}", tr.end_pos);
    }

    #[test]
    fn resting_on_the_floor_is_not_solid() {
        let world = BrushWorld::flat_ground();
        let origin = Vec3::new(0.0, 0.0, 36.0);

        let stay = world.trace_hull(origin, origin, Hull::Standing);
        assert!(!stay.start_solid);
        assert!(!stay.hit_something());

        let slide = world.trace_hull(origin, origin + Vec3::new(64.0, 0.0, 0.0), Hull::Standing);
        assert!(!slide.hit_something());

        let probe = world.trace_hull(origin, origin - Vec3::new(0.0, 0.0, 2.0), Hull::Standing);
        assert_eq!(probe.fraction, 0.0);
        assert_eq!(probe.hit, Some(HitId(0)));
    }

    #[test]
    fn embedded_hull_is_all_solid() {
        let world = BrushWorld::flat_ground();
        let origin = Vec3::new(0.0, 0.0, 10.0);

        let tr = world.trace_hull(origin, origin + Vec3::new(0.0, 0.0, 1.0), Hull::Standing);
        assert!(tr.all_solid);
        assert!(tr.start_solid);
        assert_eq!(tr.end_pos, origin);

        let out = world.trace_hull(origin, Vec3::new(0.0, 0.0, 80.0), Hull::Standing);
        assert!(out.start_solid);
        assert!(!out.all_solid);
    }

    #[test]
    fn wall_normal_faces_the_mover() {
        let world = BrushWorld::test_course();
        let start = Vec3::new(400.0, 0.0, 36.0);
        let tr = world.trace_hull(start, Vec3::new(600.0, 0.0, 36.0), Hull::Standing);
        assert_eq!(tr.plane.normal, Vec3::new(-1.0, 0.0, 0.0));
        assert!((tr.end_pos.x - (512.0 - 16.0 - DIST_EPSILON)).abs() < 1e-3);
        assert!(tr.plane.normal.z == 0.0);
    }

    #[test]
    fn nearest_brush_wins() {
        let world = BrushWorld::from_map(MapData {
            name: "two walls".into(),
            brushes: vec![
                Brush::solid(Vec3::new(200.0, -8.0, -8.0), Vec3::new(210.0, 8.0, 8.0)),
                Brush::solid(Vec3::new(100.0, -8.0, -8.0), Vec3::new(110.0, 8.0, 8.0)),
            ],
            spawns: vec![],
        })
        .unwrap();

        let tr = world.trace_hull(Vec3::ZERO, Vec3::new(300.0, 0.0, 0.0), Hull::Point);
        assert_eq!(tr.hit, Some(HitId(1)));
        assert!(tr.end_pos.x < 100.0);
    }

    #[test]
    fn contents_precedence() {
        let world = BrushWorld::from_map(MapData {
            name: String::new(),
            brushes: vec![
                Brush::volume(Vec3::new(0.0, 0.0, 0.0), Vec3::new(10.0, 10.0, 10.0), Contents::Water),
                Brush::volume(Vec3::new(5.0, 0.0, 0.0), Vec3::new(10.0, 10.0, 10.0), Contents::Ladder),
            ],
            spawns: vec![],
        })
        .unwrap();

        assert_eq!(world.point_contents(Vec3::new(1.0, 1.0, 1.0)), Contents::Water);
        assert_eq!(world.point_contents(Vec3::new(7.0, 1.0, 1.0)), Contents::Ladder);
        assert_eq!(world.point_contents(Vec3::new(70.0, 1.0, 1.0)), Contents::Empty);
    }

    #[test]
    fn water_volumes_do_not_block() {
        let world = BrushWorld::test_course();
        let start = Vec3::new(-384.0, -384.0, 200.0);
        let tr = world.trace_hull(start, Vec3::new(-384.0, -384.0, 100.0), Hull::Standing);
        assert!(!tr.hit_something());
        assert_eq!(world.point_contents(Vec3::new(-384.0, -384.0, 50.0)), Contents::Water);
    }

    #[test]
    fn map_json_round_trip_and_validation() {
        let json = r#"{
            "name": "box",
            "brushes": [
                { "mins": { "x": -512, "y": -512, "z": -16 },
                  "maxs": { "x": 512, "y": 512, "z": 0 } },
                { "mins": { "x": 0, "y": 0, "z": 0 },
                  "maxs": { "x": 64, "y": 64, "z": 64 },
                  "contents": "water" }
            ],
            "spawns": [ { "x": 0, "y": 0, "z": 36 } ]
        }"#;
        let world = BrushWorld::from_json_str(json).unwrap();
        assert_eq!(world.name(), "box");
        assert_eq!(world.brushes()[0].contents, Contents::Solid);
        assert_eq!(world.brushes()[1].contents, Contents::Water);
        assert_eq!(world.spawn_point(3), Vec3::new(0.0, 0.0, 36.0));

        let inverted = r#"{ "brushes": [ { "mins": { "x": 1, "y": 0, "z": 0 },
                                          "maxs": { "x": 0, "y": 1, "z": 1 } } ] }"#;
        let err = BrushWorld::from_json_str(inverted).unwrap_err();
        assert!(err.to_string().contains("inverted"));

        assert!(BrushWorld::from_json_str("{ not json").is_err());
    }
}
