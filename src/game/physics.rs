//! Projectile physics - rocket and grenade motion, swept collision

use uuid::Uuid;

use crate::net::protocol::ProjectileKind;

use super::combat::{ray_circle, HitscanTarget};
use super::walls::{ray_aabb_entry, WallStore};

/// Launch speed per grenade charge level 1-5
pub const CHARGE_SPEEDS: [f32; 5] = [180.0, 260.0, 340.0, 420.0, 500.0];

/// Seconds from launch to forced detonation
pub const GRENADE_FUSE_SECS: f32 = 3.0;

/// Grenade hull radius; wall bounds are expanded by this for collision
pub const GRENADE_RADIUS: f32 = 4.0;
pub const ROCKET_RADIUS: f32 = 6.0;
pub const ROCKET_SPEED: f32 = 450.0;

/// Splash parameters on detonation
pub const GRENADE_SPLASH_RADIUS: f32 = 80.0;
pub const ROCKET_SPLASH_RADIUS: f32 = 100.0;

/// Exponential ground friction base: v *= base^dt
const GROUND_FRICTION: f32 = 0.25;
/// Velocity kept along the contact normal after a bounce
const BOUNCE_DAMPING: f32 = 0.6;
/// Velocity kept tangential to the contact after a bounce
const TANGENT_FRICTION: f32 = 0.85;
/// Separation pushed past the contact surface after a bounce
const PUSHOUT_MARGIN: f32 = 2.0;
/// Re-collision against the same wall is suppressed for this long
const SAME_WALL_COOLDOWN: f32 = 0.15;
/// Post-bounce speed below this detonates (ends micro-bounce loops)
const STUCK_SPEED: f32 = 12.0;

/// Distance past the playfield edge at which a projectile is considered
/// corrupted and force-removed without detonating
pub const WORLD_SAFETY_MARGIN: f32 = 500.0;

/// A live grenade or rocket. Hitscan shots never become entities.
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: Uuid,
    pub kind: ProjectileKind,
    pub owner_id: Uuid,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    /// Seconds until forced detonation (grenades only)
    pub fuse_remaining: f32,
    /// Wall whose collisions are temporarily suppressed, with time left
    wall_cooldown: Option<(Uuid, f32)>,
}

impl Projectile {
    pub fn grenade(owner_id: Uuid, x: f32, y: f32, direction: f32, charge_level: u8) -> Self {
        let level = charge_level.clamp(1, 5) as usize;
        let speed = CHARGE_SPEEDS[level - 1];
        Self {
            id: Uuid::new_v4(),
            kind: ProjectileKind::Grenade,
            owner_id,
            x,
            y,
            vel_x: direction.cos() * speed,
            vel_y: direction.sin() * speed,
            fuse_remaining: GRENADE_FUSE_SECS,
            wall_cooldown: None,
        }
    }

    pub fn rocket(owner_id: Uuid, x: f32, y: f32, direction: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ProjectileKind::Rocket,
            owner_id,
            x,
            y,
            vel_x: direction.cos() * ROCKET_SPEED,
            vel_y: direction.sin() * ROCKET_SPEED,
            fuse_remaining: 0.0,
            wall_cooldown: None,
        }
    }

    pub fn speed(&self) -> f32 {
        (self.vel_x * self.vel_x + self.vel_y * self.vel_y).sqrt()
    }

    pub fn splash_radius(&self) -> f32 {
        match self.kind {
            ProjectileKind::Grenade => GRENADE_SPLASH_RADIUS,
            ProjectileKind::Rocket => ROCKET_SPLASH_RADIUS,
        }
    }

    fn hull_radius(&self) -> f32 {
        match self.kind {
            ProjectileKind::Grenade => GRENADE_RADIUS,
            ProjectileKind::Rocket => ROCKET_RADIUS,
        }
    }
}

/// Result of advancing a projectile one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectileStep {
    Flying,
    Detonate { x: f32, y: f32 },
    /// Position left the safety bounds; remove without detonating
    OutOfBounds,
}

/// Swept contact between a movement segment and an expanded wall slice
#[derive(Debug, Clone, Copy)]
struct SweepContact {
    wall_id: Uuid,
    /// Segment parameter of the contact, 0..=1
    t: f32,
    normal_x: f32,
    normal_y: f32,
}

/// Projectile motion integration. Rockets and grenades are deliberately
/// separate code paths; their failure modes differ too much to share one.
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance one projectile by one tick
    pub fn step(
        projectile: &mut Projectile,
        walls: &WallStore,
        targets: &[HitscanTarget],
        world_width: f32,
        world_height: f32,
        dt: f32,
    ) -> ProjectileStep {
        let step = match projectile.kind {
            ProjectileKind::Rocket => Self::step_rocket(projectile, walls, targets, dt),
            ProjectileKind::Grenade => Self::step_grenade(projectile, walls, dt),
        };

        if step == ProjectileStep::Flying
            && !within_safety_bounds(projectile.x, projectile.y, world_width, world_height)
        {
            return ProjectileStep::OutOfBounds;
        }
        step
    }

    /// Constant-velocity straight-line travel; any contact detonates
    fn step_rocket(
        projectile: &mut Projectile,
        walls: &WallStore,
        targets: &[HitscanTarget],
        dt: f32,
    ) -> ProjectileStep {
        let (x0, y0) = (projectile.x, projectile.y);
        let x1 = x0 + projectile.vel_x * dt;
        let y1 = y0 + projectile.vel_y * dt;

        let mut contact_t: Option<f32> = None;
        if let Some(contact) = sweep_walls(x0, y0, x1, y1, projectile.hull_radius(), walls, None) {
            contact_t = Some(contact.t);
        }

        let seg_len = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        if seg_len > f32::EPSILON {
            let (dx, dy) = ((x1 - x0) / seg_len, (y1 - y0) / seg_len);
            for target in targets {
                if target.id == projectile.owner_id {
                    continue;
                }
                if let Some(dist) = ray_circle(
                    x0,
                    y0,
                    dx,
                    dy,
                    target.x,
                    target.y,
                    target.radius + projectile.hull_radius(),
                ) {
                    let t = dist / seg_len;
                    if t <= 1.0 && contact_t.map_or(true, |best| t < best) {
                        contact_t = Some(t);
                    }
                }
            }
        }

        if let Some(t) = contact_t {
            return ProjectileStep::Detonate {
                x: x0 + (x1 - x0) * t,
                y: y0 + (y1 - y0) * t,
            };
        }

        projectile.x = x1;
        projectile.y = y1;
        ProjectileStep::Flying
    }

    /// Free body with bounce: friction, swept collision, reflection
    fn step_grenade(projectile: &mut Projectile, walls: &WallStore, dt: f32) -> ProjectileStep {
        projectile.fuse_remaining -= dt;
        if projectile.fuse_remaining <= 0.0 {
            return ProjectileStep::Detonate {
                x: projectile.x,
                y: projectile.y,
            };
        }

        if let Some((wall_id, remaining)) = projectile.wall_cooldown {
            let remaining = remaining - dt;
            projectile.wall_cooldown = (remaining > 0.0).then_some((wall_id, remaining));
        }

        let friction = GROUND_FRICTION.powf(dt);
        projectile.vel_x *= friction;
        projectile.vel_y *= friction;

        let (x0, y0) = (projectile.x, projectile.y);
        let x1 = x0 + projectile.vel_x * dt;
        let y1 = y0 + projectile.vel_y * dt;

        let suppressed = projectile.wall_cooldown.map(|(id, _)| id);
        let Some(contact) = sweep_walls(x0, y0, x1, y1, GRENADE_RADIUS, walls, suppressed) else {
            projectile.x = x1;
            projectile.y = y1;
            return ProjectileStep::Flying;
        };

        // Reflect about the contact normal, then damp the rebound and
        // grind the tangential component separately
        let (nx, ny) = (contact.normal_x, contact.normal_y);
        let dot = projectile.vel_x * nx + projectile.vel_y * ny;
        let rx = projectile.vel_x - 2.0 * dot * nx;
        let ry = projectile.vel_y - 2.0 * dot * ny;
        let rn = rx * nx + ry * ny;
        let (tan_x, tan_y) = (rx - rn * nx, ry - rn * ny);
        projectile.vel_x = rn * nx * BOUNCE_DAMPING + tan_x * TANGENT_FRICTION;
        projectile.vel_y = rn * ny * BOUNCE_DAMPING + tan_y * TANGENT_FRICTION;

        // Land at the contact, then separate past the surface so the next
        // step cannot start inside the expanded bound
        let cx = x0 + (x1 - x0) * contact.t;
        let cy = y0 + (y1 - y0) * contact.t;
        projectile.x = cx + nx * PUSHOUT_MARGIN;
        projectile.y = cy + ny * PUSHOUT_MARGIN;
        projectile.wall_cooldown = Some((contact.wall_id, SAME_WALL_COOLDOWN));

        if projectile.speed() < STUCK_SPEED {
            return ProjectileStep::Detonate {
                x: projectile.x,
                y: projectile.y,
            };
        }
        ProjectileStep::Flying
    }
}

fn within_safety_bounds(x: f32, y: f32, world_width: f32, world_height: f32) -> bool {
    x >= -WORLD_SAFETY_MARGIN
        && y >= -WORLD_SAFETY_MARGIN
        && x <= world_width + WORLD_SAFETY_MARGIN
        && y <= world_height + WORLD_SAFETY_MARGIN
}

/// Earliest contact of the segment (x0,y0)->(x1,y1) against every intact
/// slice bound expanded by `radius`. Destroyed slices do not collide.
fn sweep_walls(
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    radius: f32,
    walls: &WallStore,
    suppressed_wall: Option<Uuid>,
) -> Option<SweepContact> {
    let dx = x1 - x0;
    let dy = y1 - y0;
    let len = (dx * dx + dy * dy).sqrt();
    if len <= f32::EPSILON {
        return None;
    }
    let (ux, uy) = (dx / len, dy / len);

    let mut nearest: Option<SweepContact> = None;
    for wall in walls.walls() {
        if suppressed_wall == Some(wall.id) {
            continue;
        }
        for (_, (rx, ry, rw, rh)) in wall.intact_slice_rects() {
            let expanded = (rx - radius, ry - radius, rw + 2.0 * radius, rh + 2.0 * radius);
            let Some(dist) = ray_aabb_entry(x0, y0, ux, uy, expanded) else {
                continue;
            };
            if dist > len {
                continue;
            }
            // Zero distance means the segment starts flush on (or inside)
            // the bound, as after a corner bounce pushed the body into a
            // neighboring wall's bound. Resolve it as an immediate
            // contact; skipping it would let the next step tunnel through.
            let t = dist / len;
            if nearest.map_or(true, |c| t < c.t) {
                let (nx, ny) = contact_normal(x0 + ux * dist, y0 + uy * dist, expanded);
                nearest = Some(SweepContact {
                    wall_id: wall.id,
                    t,
                    normal_x: nx,
                    normal_y: ny,
                });
            }
        }
    }
    nearest
}

/// Outward normal of the expanded-bound face closest to the contact point
fn contact_normal(px: f32, py: f32, (rx, ry, rw, rh): (f32, f32, f32, f32)) -> (f32, f32) {
    let left = (px - rx).abs();
    let right = (px - (rx + rw)).abs();
    let top = (py - ry).abs();
    let bottom = (py - (ry + rh)).abs();
    let min = left.min(right).min(top).min(bottom);
    if min == left {
        (-1.0, 0.0)
    } else if min == right {
        (1.0, 0.0)
    } else if min == top {
        (0.0, -1.0)
    } else {
        (0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::walls::{WallMaterial, WallSpec};

    const DT: f32 = 1.0 / 60.0;

    fn vertical_wall(x: f32) -> WallStore {
        let mut store = WallStore::from_layout(&[WallSpec {
            x,
            y: 35.0,
            width: 20.0,
            height: 200.0,
            material: WallMaterial::Concrete,
            initial_health: None,
        }]);
        store.capture_initial();
        store
    }

    fn step_grenade_until_bounce(
        projectile: &mut Projectile,
        walls: &WallStore,
        max_ticks: usize,
    ) -> usize {
        for tick in 0..max_ticks {
            let before = projectile.vel_x;
            let step = PhysicsSystem::step(projectile, walls, &[], 1920.0, 1080.0, DT);
            assert_eq!(step, ProjectileStep::Flying);
            if projectile.vel_x.signum() != before.signum() {
                return tick;
            }
        }
        panic!("grenade never bounced");
    }

    #[test]
    fn grenade_bounce_reflects_damps_and_separates() {
        // Charge 3 thrown due east into a wall 100 units away
        let walls = vertical_wall(340.0);
        let mut grenade = Projectile::grenade(Uuid::new_v4(), 240.0, 135.0, 0.0, 3);
        assert!((grenade.speed() - CHARGE_SPEEDS[2]).abs() < 1e-3);

        let pre_speed = grenade.speed();
        step_grenade_until_bounce(&mut grenade, &walls, 120);

        // Reflected, never faster than before the impact
        assert!(grenade.vel_x < 0.0);
        assert!(grenade.speed() <= pre_speed);

        // Separated from the expanded bound by the fixed margin
        let expanded_left = 340.0 - GRENADE_RADIUS;
        assert!(grenade.x <= expanded_left - PUSHOUT_MARGIN + 1e-3);

        // Never inside the wall itself
        assert!(grenade.x < 340.0 || grenade.x > 360.0);
    }

    #[test]
    fn same_wall_recollision_is_suppressed_within_cooldown() {
        let walls = vertical_wall(340.0);
        let mut grenade = Projectile::grenade(Uuid::new_v4(), 240.0, 135.0, 0.0, 3);
        step_grenade_until_bounce(&mut grenade, &walls, 120);

        // Within the cooldown window the wall cannot re-collide, so the
        // velocity sign must stay put for the next 150 ms of steps
        let cooldown_ticks = (SAME_WALL_COOLDOWN / DT) as usize;
        for _ in 0..cooldown_ticks {
            let step = PhysicsSystem::step(&mut grenade, &walls, &[], 1920.0, 1080.0, DT);
            if let ProjectileStep::Detonate { .. } = step {
                break; // stuck-speed detonation is legitimate
            }
            assert!(grenade.vel_x < 0.0);
        }
    }

    #[test]
    fn bounce_never_gains_energy_across_many_impacts() {
        // Corridor of two facing walls; the grenade rattles between them
        let mut walls = WallStore::from_layout(&[
            WallSpec {
                x: 100.0,
                y: 0.0,
                width: 20.0,
                height: 300.0,
                material: WallMaterial::Metal,
                initial_health: None,
            },
            WallSpec {
                x: 400.0,
                y: 0.0,
                width: 20.0,
                height: 300.0,
                material: WallMaterial::Metal,
                initial_health: None,
            },
        ]);
        walls.capture_initial();

        let mut grenade = Projectile::grenade(Uuid::new_v4(), 260.0, 150.0, 0.0, 5);
        let mut last_speed = grenade.speed();
        for _ in 0..240 {
            match PhysicsSystem::step(&mut grenade, &walls, &[], 1920.0, 1080.0, DT) {
                ProjectileStep::Flying => {
                    let speed = grenade.speed();
                    assert!(speed <= last_speed + 1e-3);
                    last_speed = speed;
                    // Never strictly inside either wall's bounds
                    assert!(!(grenade.x > 100.0 && grenade.x < 120.0));
                    assert!(!(grenade.x > 400.0 && grenade.x < 420.0));
                }
                ProjectileStep::Detonate { .. } => return,
                ProjectileStep::OutOfBounds => panic!("grenade left the world"),
            }
        }
    }

    #[test]
    fn grenade_inside_an_expanded_bound_bounces_instead_of_tunneling() {
        let walls = vertical_wall(340.0);
        // Flush inside the expanded bound, the position a corner bounce
        // off a neighboring wall can leave a grenade in, still heading
        // at the face
        let mut grenade = Projectile::grenade(Uuid::new_v4(), 338.0, 135.0, 0.0, 3);

        let step = PhysicsSystem::step(&mut grenade, &walls, &[], 1920.0, 1080.0, DT);
        assert_eq!(step, ProjectileStep::Flying);

        // Immediate contact: reflected west and clear of the bound, not
        // carried through the wall
        assert!(grenade.vel_x < 0.0);
        assert!(grenade.x <= 340.0 - GRENADE_RADIUS + 1e-3);
    }

    #[test]
    fn fuse_expiry_detonates_in_open_space() {
        let walls = WallStore::from_layout(&[]);
        let mut grenade = Projectile::grenade(Uuid::new_v4(), 500.0, 500.0, 1.0, 1);

        let mut ticks = 0;
        loop {
            match PhysicsSystem::step(&mut grenade, &walls, &[], 1920.0, 1080.0, DT) {
                ProjectileStep::Flying => ticks += 1,
                ProjectileStep::Detonate { .. } => break,
                ProjectileStep::OutOfBounds => panic!("grenade left the world"),
            }
            assert!(ticks <= (GRENADE_FUSE_SECS / DT) as u32 + 1);
        }
        let elapsed = ticks as f32 * DT;
        assert!((elapsed - GRENADE_FUSE_SECS).abs() < 2.0 * DT);
    }

    #[test]
    fn rocket_detonates_on_wall_contact() {
        let walls = vertical_wall(700.0);
        let mut rocket = Projectile::rocket(Uuid::new_v4(), 100.0, 135.0, 0.0);

        let mut result = None;
        for _ in 0..240 {
            match PhysicsSystem::step(&mut rocket, &walls, &[], 1920.0, 1080.0, DT) {
                ProjectileStep::Flying => continue,
                other => {
                    result = Some(other);
                    break;
                }
            }
        }
        match result {
            Some(ProjectileStep::Detonate { x, .. }) => {
                // Contact happens at the expanded bound, never beyond it
                assert!(x <= 700.0 - ROCKET_RADIUS + 1e-3);
                assert!(x > 690.0 - ROCKET_RADIUS);
            }
            other => panic!("expected detonation, got {:?}", other),
        }
    }

    #[test]
    fn rocket_detonates_on_player_contact() {
        let walls = WallStore::from_layout(&[]);
        let owner = Uuid::new_v4();
        let target = HitscanTarget {
            id: Uuid::new_v4(),
            x: 400.0,
            y: 135.0,
            radius: 12.0,
        };
        let mut rocket = Projectile::rocket(owner, 100.0, 135.0, 0.0);

        for _ in 0..240 {
            match PhysicsSystem::step(&mut rocket, &walls, &[target], 1920.0, 1080.0, DT) {
                ProjectileStep::Flying => continue,
                ProjectileStep::Detonate { x, .. } => {
                    assert!(x < 400.0);
                    return;
                }
                ProjectileStep::OutOfBounds => panic!("rocket left the world"),
            }
        }
        panic!("rocket never detonated");
    }

    #[test]
    fn out_of_bounds_projectile_is_force_removed() {
        let walls = WallStore::from_layout(&[]);
        // Due west, away from the playfield
        let mut rocket = Projectile::rocket(Uuid::new_v4(), 10.0, 500.0, std::f32::consts::PI);

        for _ in 0..600 {
            match PhysicsSystem::step(&mut rocket, &walls, &[], 1920.0, 1080.0, DT) {
                ProjectileStep::Flying => continue,
                ProjectileStep::OutOfBounds => return,
                ProjectileStep::Detonate { .. } => panic!("nothing to hit out there"),
            }
        }
        panic!("rocket never crossed the safety bounds");
    }
}
