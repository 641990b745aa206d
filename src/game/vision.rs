//! Visibility engine - per-player fog of war with destruction-aware occlusion

use crate::net::protocol::VisionPoint;

use super::walls::WallStore;

/// Field of view cone width
pub const FOV_RADIANS: f32 = 120.0 * std::f32::consts::PI / 180.0;
/// Maximum sight distance
pub const VIEW_DISTANCE: f32 = 600.0;

/// Largest angular gap allowed between consecutive boundary rays; wider
/// gaps get evenly spaced filler rays so open space never degenerates
/// into a straight chord
const GAP_FILL_RADIANS: f32 = 10.0 * std::f32::consts::PI / 180.0;
/// Corner rays are cast offset to either side of the corner, never dead
/// on it: a ray exactly through a corner is tangent to the silhouette and
/// its hit-or-miss outcome flips on rounding noise. The offset pair
/// brackets the depth discontinuity deterministically.
const CORNER_EPSILON: f32 = 1e-3;

/// Cached vision is kept until the player moves this far...
const MOVE_THRESHOLD: f32 = 5.0;
/// ...or rotates this much
const ROT_THRESHOLD: f32 = 10.0 * std::f32::consts::PI / 180.0;

/// Expected upper bound on boundary rays; sizing hint only
const TYPICAL_RAY_COUNT: usize = 64;

/// Per-player cached visible region.
///
/// The cache is re-derivable from the wall store and the player transform
/// alone; invalidation is position/rotation drift or nearby destruction.
#[derive(Debug, Clone, Default)]
pub struct VisionState {
    last_x: f32,
    last_y: f32,
    last_rotation: f32,
    pub points: Vec<VisionPoint>,
    pub computed_tick: u64,
    valid: bool,
}

impl VisionState {
    /// Whether the cached region is stale for the given transform
    pub fn needs_recompute(&self, x: f32, y: f32, rotation: f32) -> bool {
        if !self.valid {
            return true;
        }
        let dx = x - self.last_x;
        let dy = y - self.last_y;
        if dx * dx + dy * dy > MOVE_THRESHOLD * MOVE_THRESHOLD {
            return true;
        }
        wrap_angle(rotation - self.last_rotation).abs() > ROT_THRESHOLD
    }

    /// Destruction touched geometry; drop the cache outright
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn store(&mut self, x: f32, y: f32, rotation: f32, points: Vec<VisionPoint>, tick: u64) {
        self.last_x = x;
        self.last_y = y;
        self.last_rotation = rotation;
        self.points = points;
        self.computed_tick = tick;
        self.valid = true;
    }
}

/// Visible-region computation
pub struct VisionSystem;

impl VisionSystem {
    /// Compute the visible-region boundary for a viewer: rays at the cone
    /// edges, at every viewer-facing intact-slice corner in range (offset
    /// by a small epsilon both ways), gap-filled, each terminated at the
    /// nearest intact slice. Points come back sorted by angle.
    pub fn compute(px: f32, py: f32, rotation: f32, walls: &WallStore) -> Vec<VisionPoint> {
        let half_fov = FOV_RADIANS / 2.0;

        // Relative angles within [-half_fov, half_fov]
        let mut angles: Vec<f32> = Vec::with_capacity(TYPICAL_RAY_COUNT);
        angles.push(-half_fov);
        angles.push(half_fov);

        for wall in walls.walls() {
            for (_, rect) in wall.intact_slice_rects() {
                for (cx, cy) in facing_edge_corners(px, py, rect) {
                    let dx = cx - px;
                    let dy = cy - py;
                    if dx * dx + dy * dy > VIEW_DISTANCE * VIEW_DISTANCE {
                        continue;
                    }
                    let rel = wrap_angle(dy.atan2(dx) - rotation);
                    for offset in [-CORNER_EPSILON, CORNER_EPSILON] {
                        let a = rel + offset;
                        if a.abs() <= half_fov {
                            angles.push(a);
                        }
                    }
                }
            }
        }

        angles.sort_by(|a, b| a.total_cmp(b));

        // Fill any gap wider than the threshold with evenly spaced rays
        let mut filled: Vec<f32> = Vec::with_capacity(angles.len() * 2);
        for i in 0..angles.len() {
            filled.push(angles[i]);
            if i + 1 < angles.len() {
                let gap = angles[i + 1] - angles[i];
                if gap > GAP_FILL_RADIANS {
                    let extra = (gap / GAP_FILL_RADIANS).ceil() as usize - 1;
                    let step = gap / (extra + 1) as f32;
                    for k in 1..=extra {
                        filled.push(angles[i] + step * k as f32);
                    }
                }
            }
        }

        filled
            .into_iter()
            .map(|rel| {
                let angle = rotation + rel;
                let distance = walls
                    .raycast(px, py, angle.cos(), angle.sin(), VIEW_DISTANCE)
                    .map(|hit| hit.distance)
                    .unwrap_or(VIEW_DISTANCE);
                VisionPoint { angle, distance }
            })
            .collect()
    }

    /// Whether a viewer can see a world point: in range, inside the cone,
    /// and not occluded by intact slices
    pub fn can_see(
        px: f32,
        py: f32,
        rotation: f32,
        tx: f32,
        ty: f32,
        walls: &WallStore,
    ) -> bool {
        let dx = tx - px;
        let dy = ty - py;
        let dist_sq = dx * dx + dy * dy;
        if dist_sq > VIEW_DISTANCE * VIEW_DISTANCE {
            return false;
        }
        // Points on top of the viewer are always visible
        if dist_sq < 1.0 {
            return true;
        }
        let rel = wrap_angle(dy.atan2(dx) - rotation);
        if rel.abs() > FOV_RADIANS / 2.0 {
            return false;
        }
        !walls.segment_blocked(px, py, tx, ty)
    }
}

/// Corners of the slice edges whose outward normal faces the viewer.
/// Edges on the far side of a slice never cast shadows toward the viewer.
fn facing_edge_corners(
    px: f32,
    py: f32,
    (rx, ry, rw, rh): (f32, f32, f32, f32),
) -> Vec<(f32, f32)> {
    let mut corners = Vec::with_capacity(4);
    let mut push = |x: f32, y: f32| {
        if !corners.contains(&(x, y)) {
            corners.push((x, y));
        }
    };
    if px < rx {
        // Left edge faces the viewer
        push(rx, ry);
        push(rx, ry + rh);
    }
    if px > rx + rw {
        push(rx + rw, ry);
        push(rx + rw, ry + rh);
    }
    if py < ry {
        push(rx, ry);
        push(rx + rw, ry);
    }
    if py > ry + rh {
        push(rx, ry + rh);
        push(rx + rw, ry + rh);
    }
    corners
}

/// Wrap an angle difference into [-pi, pi]
pub fn wrap_angle(angle: f32) -> f32 {
    let mut a = angle.rem_euclid(std::f32::consts::TAU);
    if a > std::f32::consts::PI {
        a -= std::f32::consts::TAU;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::walls::{WallMaterial, WallSpec, SLICE_MAX_HEALTH};

    fn wall(x: f32, y: f32, w: f32, h: f32) -> WallSpec {
        WallSpec {
            x,
            y,
            width: w,
            height: h,
            material: WallMaterial::Brick,
            initial_health: None,
        }
    }

    fn store(specs: &[WallSpec]) -> WallStore {
        let mut s = WallStore::from_layout(specs);
        s.capture_initial();
        s
    }

    #[test]
    fn open_space_region_spans_the_cone_without_chords() {
        let walls = store(&[]);
        let points = VisionSystem::compute(500.0, 500.0, 0.0, &walls);

        // Gap filling keeps consecutive rays within the threshold
        assert!(points.len() >= (FOV_RADIANS / GAP_FILL_RADIANS) as usize);
        for pair in points.windows(2) {
            assert!(pair[1].angle - pair[0].angle <= GAP_FILL_RADIANS + 1e-4);
        }
        // Every ray reaches full view distance
        for p in &points {
            assert_eq!(p.distance, VIEW_DISTANCE);
        }
        // The cone edges are present
        let half = FOV_RADIANS / 2.0;
        assert!((points.first().unwrap().angle - (-half)).abs() < 1e-4);
        assert!((points.last().unwrap().angle - half).abs() < 1e-4);
    }

    #[test]
    fn intact_wall_shortens_rays_and_breach_restores_them() {
        let mut walls = store(&[wall(700.0, 400.0, 20.0, 200.0)]);
        let wall_id = walls.walls()[0].id;

        // Slice 2 spans y in [480, 520); viewer dead ahead at y = 500
        let points = VisionSystem::compute(500.0, 500.0, 0.0, &walls);
        let ahead: Vec<_> = points.iter().filter(|p| p.angle.abs() < 0.05).collect();
        assert!(!ahead.is_empty());
        for p in &ahead {
            assert!((p.distance - 200.0).abs() < 5.0);
        }

        while !walls.get(&wall_id).unwrap().slices[2].destroyed {
            walls.damage_slice(&wall_id, 2, SLICE_MAX_HEALTH);
        }

        // Sight now passes through the breach
        let points = VisionSystem::compute(500.0, 500.0, 0.0, &walls);
        let straight = points
            .iter()
            .filter(|p| p.angle.abs() < 0.01)
            .map(|p| p.distance)
            .fold(0.0f32, f32::max);
        assert_eq!(straight, VIEW_DISTANCE);
    }

    #[test]
    fn back_face_corners_do_not_contribute() {
        // Viewer left of the wall: only the left edge's corners face it
        let corners = facing_edge_corners(100.0, 500.0, (700.0, 400.0, 20.0, 200.0));
        assert_eq!(corners, vec![(700.0, 400.0), (700.0, 600.0)]);

        // Viewer above-left: left and top edges contribute, three corners
        let corners = facing_edge_corners(100.0, 100.0, (700.0, 400.0, 20.0, 200.0));
        assert_eq!(
            corners,
            vec![(700.0, 400.0), (700.0, 600.0), (720.0, 400.0)]
        );
    }

    #[test]
    fn mirrored_players_compute_congruent_regions() {
        // Layout mirror-symmetric about x = 500
        let walls = store(&[wall(480.0, 300.0, 40.0, 150.0)]);

        let left = VisionSystem::compute(300.0, 375.0, 0.0, &walls);
        let right = VisionSystem::compute(700.0, 375.0, std::f32::consts::PI, &walls);

        // Congruent: matching multisets of (|relative angle|, distance),
        // compared with a tolerance since the two sides round differently
        let canon = |points: &[VisionPoint], rotation: f32| {
            let mut v: Vec<(f32, f32)> = points
                .iter()
                .map(|p| (wrap_angle(p.angle - rotation).abs(), p.distance))
                .collect();
            v.sort_by(|a, b| a.partial_cmp(b).unwrap());
            v
        };
        let left = canon(&left, 0.0);
        let right = canon(&right, std::f32::consts::PI);

        assert_eq!(left.len(), right.len());
        for (l, r) in left.iter().zip(right.iter()) {
            assert!(
                (l.0 - r.0).abs() < 2.0 * CORNER_EPSILON,
                "angle mismatch: {} vs {}",
                l.0,
                r.0
            );
            assert!(
                (l.1 - r.1).abs() < 1.0,
                "distance mismatch at angle {}: {} vs {}",
                l.0,
                l.1,
                r.1
            );
        }
    }

    #[test]
    fn cache_invalidates_on_movement_rotation_or_destruction() {
        let mut state = VisionState::default();
        assert!(state.needs_recompute(0.0, 0.0, 0.0));

        state.store(100.0, 100.0, 1.0, Vec::new(), 1);
        assert!(!state.needs_recompute(101.0, 101.0, 1.05));
        assert!(state.needs_recompute(106.0, 100.0, 1.0));
        assert!(state.needs_recompute(100.0, 100.0, 1.0 + 0.2));

        state.invalidate();
        assert!(state.needs_recompute(100.0, 100.0, 1.0));
    }

    #[test]
    fn can_see_respects_range_cone_and_occlusion() {
        let walls = store(&[wall(700.0, 400.0, 20.0, 200.0)]);

        // Behind the wall
        assert!(!VisionSystem::can_see(500.0, 500.0, 0.0, 900.0, 500.0, &walls));
        // In front of the wall
        assert!(VisionSystem::can_see(500.0, 500.0, 0.0, 650.0, 500.0, &walls));
        // Outside the cone (directly behind the viewer)
        assert!(!VisionSystem::can_see(500.0, 500.0, 0.0, 400.0, 500.0, &walls));
        // Outside the range
        assert!(!VisionSystem::can_see(500.0, 500.0, 0.0, 1150.0, 500.0, &walls));
    }
}
