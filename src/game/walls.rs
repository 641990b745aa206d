//! Wall and destruction store - slice health, occlusion queries

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Number of independently destructible slices per wall, laid along the long axis
pub const SLICES_PER_WALL: usize = 5;

/// Full health of a single slice before material scaling of incoming damage
pub const SLICE_MAX_HEALTH: f32 = 100.0;

/// Wall materials, affecting how much damage a slice actually takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WallMaterial {
    /// Splinters quickly
    Wood,
    /// Baseline
    Brick,
    /// Hardened
    Concrete,
    /// Nearly shot-proof
    Metal,
}

impl WallMaterial {
    /// Multiplier applied to incoming base damage
    pub fn damage_multiplier(self) -> f32 {
        match self {
            WallMaterial::Wood => 1.5,
            WallMaterial::Brick => 1.0,
            WallMaterial::Concrete => 0.6,
            WallMaterial::Metal => 0.3,
        }
    }
}

/// One destructible segment of a wall
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallSlice {
    pub health: f32,
    pub destroyed: bool,
}

impl Default for WallSlice {
    fn default() -> Self {
        Self {
            health: SLICE_MAX_HEALTH,
            destroyed: false,
        }
    }
}

/// Static layout entry used to build the store at world load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallSpec {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub material: WallMaterial,
    /// Designed-in damage: slice health overrides applied before the
    /// initial snapshot is captured (maps may ship pre-damaged walls)
    #[serde(default)]
    pub initial_health: Option<[f32; SLICES_PER_WALL]>,
}

/// Axis-aligned destructible wall
#[derive(Debug, Clone)]
pub struct Wall {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub material: WallMaterial,
    pub slices: [WallSlice; SLICES_PER_WALL],
    /// Slice state captured once after world load; reset and
    /// repair-to-initial restore to this, not to full health
    initial: Option<[WallSlice; SLICES_PER_WALL]>,
}

impl Wall {
    pub fn from_spec(spec: &WallSpec) -> Self {
        let mut slices = [WallSlice::default(); SLICES_PER_WALL];
        if let Some(initial_health) = spec.initial_health {
            for (slice, &health) in slices.iter_mut().zip(initial_health.iter()) {
                slice.health = health.clamp(0.0, SLICE_MAX_HEALTH);
                slice.destroyed = slice.health <= 0.0;
            }
        }
        Self {
            id: Uuid::new_v4(),
            x: spec.x,
            y: spec.y,
            width: spec.width,
            height: spec.height,
            material: spec.material,
            slices,
            initial: None,
        }
    }

    /// Bounding rect of slice `index` (x, y, width, height).
    /// Slices run along the wall's long axis.
    pub fn slice_rect(&self, index: usize) -> (f32, f32, f32, f32) {
        let n = SLICES_PER_WALL as f32;
        if self.width >= self.height {
            let w = self.width / n;
            (self.x + w * index as f32, self.y, w, self.height)
        } else {
            let h = self.height / n;
            (self.x, self.y + h * index as f32, self.width, h)
        }
    }

    /// Center point of slice `index`
    pub fn slice_center(&self, index: usize) -> (f32, f32) {
        let (sx, sy, sw, sh) = self.slice_rect(index);
        (sx + sw / 2.0, sy + sh / 2.0)
    }

    /// Which slice covers the given point, if any
    pub fn slice_index_at(&self, px: f32, py: f32) -> Option<usize> {
        if px < self.x || px > self.x + self.width || py < self.y || py > self.y + self.height {
            return None;
        }
        let n = SLICES_PER_WALL as f32;
        let index = if self.width >= self.height {
            ((px - self.x) / (self.width / n)) as usize
        } else {
            ((py - self.y) / (self.height / n)) as usize
        };
        Some(index.min(SLICES_PER_WALL - 1))
    }

    pub fn fully_destroyed(&self) -> bool {
        self.slices.iter().all(|s| s.destroyed)
    }

    /// Iterate the rects of slices that still occlude
    pub fn intact_slice_rects(&self) -> impl Iterator<Item = (usize, (f32, f32, f32, f32))> + '_ {
        self.slices
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.destroyed)
            .map(|(i, _)| (i, self.slice_rect(i)))
    }
}

/// Result of damaging a slice
#[derive(Debug, Clone, Copy)]
pub struct SliceDamage {
    pub new_health: f32,
    pub destroyed: bool,
    /// All slices of the owning wall are now destroyed
    pub wall_destroyed: bool,
}

/// Intersection of a ray with an intact slice
#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    pub wall_id: Uuid,
    pub slice: usize,
    pub distance: f32,
    pub hit_x: f32,
    pub hit_y: f32,
}

/// Owns all wall geometry and per-slice destruction state.
///
/// Iteration order is the layout order, kept stable for determinism.
pub struct WallStore {
    walls: Vec<Wall>,
    index: HashMap<Uuid, usize>,
}

impl WallStore {
    pub fn from_layout(layout: &[WallSpec]) -> Self {
        let walls: Vec<Wall> = layout.iter().map(Wall::from_spec).collect();
        let index = walls
            .iter()
            .enumerate()
            .map(|(i, w)| (w.id, i))
            .collect();
        Self { walls, index }
    }

    /// Capture the post-load slice state as the reset/repair baseline.
    /// Called exactly once after world load.
    pub fn capture_initial(&mut self) {
        for wall in &mut self.walls {
            if wall.initial.is_none() {
                wall.initial = Some(wall.slices);
            }
        }
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn get(&self, id: &Uuid) -> Option<&Wall> {
        self.index.get(id).map(|&i| &self.walls[i])
    }

    /// Apply damage to one slice. Health clamps at zero; damaging one slice
    /// never touches its neighbors. Returns None for unknown ids or slices
    /// that are already gone.
    pub fn damage_slice(&mut self, wall_id: &Uuid, slice: usize, amount: f32) -> Option<SliceDamage> {
        let i = *self.index.get(wall_id)?;
        let wall = &mut self.walls[i];
        if slice >= SLICES_PER_WALL || wall.slices[slice].destroyed {
            return None;
        }
        let scaled = amount * wall.material.damage_multiplier();
        let s = &mut wall.slices[slice];
        s.health = (s.health - scaled).max(0.0);
        if s.health <= 0.0 {
            s.health = 0.0;
            s.destroyed = true;
        }
        Some(SliceDamage {
            new_health: wall.slices[slice].health,
            destroyed: wall.slices[slice].destroyed,
            wall_destroyed: wall.fully_destroyed(),
        })
    }

    /// Repair a wall, either to full health or to the captured initial
    /// baseline. The result never exceeds the requested ceiling.
    pub fn repair_wall(&mut self, wall_id: &Uuid, to_initial: bool) -> bool {
        let Some(&i) = self.index.get(wall_id) else {
            return false;
        };
        let wall = &mut self.walls[i];
        if to_initial {
            if let Some(initial) = wall.initial {
                wall.slices = initial;
            }
        } else {
            wall.slices = [WallSlice::default(); SLICES_PER_WALL];
        }
        true
    }

    /// World reset: every wall back to its captured baseline
    pub fn reset_all(&mut self) {
        for wall in &mut self.walls {
            if let Some(initial) = wall.initial {
                wall.slices = initial;
            }
        }
    }

    /// Nearest intact slice along a ray. Destroyed slices are transparent:
    /// a ray may pass through a hole in one wall and still stop on an
    /// intact slice of a wall further along.
    pub fn raycast(&self, ox: f32, oy: f32, dx: f32, dy: f32, max_dist: f32) -> Option<RayHit> {
        let mut nearest: Option<RayHit> = None;
        for wall in &self.walls {
            for (slice, rect) in wall.intact_slice_rects() {
                if let Some(t) = ray_aabb_entry(ox, oy, dx, dy, rect) {
                    if t >= 0.0
                        && t <= max_dist
                        && nearest.map_or(true, |h| t < h.distance)
                    {
                        nearest = Some(RayHit {
                            wall_id: wall.id,
                            slice,
                            distance: t,
                            hit_x: ox + dx * t,
                            hit_y: oy + dy * t,
                        });
                    }
                }
            }
        }
        nearest
    }

    /// True if any intact slice blocks the open segment between two points
    pub fn segment_blocked(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> bool {
        let dx = x2 - x1;
        let dy = y2 - y1;
        let len = (dx * dx + dy * dy).sqrt();
        if len <= f32::EPSILON {
            return false;
        }
        self.raycast(x1, y1, dx / len, dy / len, len - 1e-3).is_some()
    }
}

/// Entry distance of a normalized-direction ray into an AABB (slab method).
/// Returns None when the ray misses or starts past the box.
pub fn ray_aabb_entry(
    ox: f32,
    oy: f32,
    dx: f32,
    dy: f32,
    (rx, ry, rw, rh): (f32, f32, f32, f32),
) -> Option<f32> {
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;

    for (o, d, lo, hi) in [(ox, dx, rx, rx + rw), (oy, dy, ry, ry + rh)] {
        if d.abs() < 1e-9 {
            if o < lo || o > hi {
                return None;
            }
        } else {
            let inv = 1.0 / d;
            let (t1, t2) = ((lo - o) * inv, (hi - o) * inv);
            let (near, far) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
            t_min = t_min.max(near);
            t_max = t_max.min(far);
            if t_min > t_max {
                return None;
            }
        }
    }

    if t_max < 0.0 {
        return None;
    }
    // Ray starting inside the box hits at distance zero
    Some(t_min.max(0.0))
}
