//! Combat resolver - weapons, hitscan, splash damage

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::net::protocol::{FireRejectReason, GameEvent, WeaponSlot};

use super::walls::WallStore;

/// Heat level at which a weapon locks up
const HEAT_MAX: f32 = 1.0;
/// Heat must fall below this before an overheated weapon fires again
const HEAT_RESUME: f32 = 0.7;
/// Heat shed per second
const HEAT_COOL_RATE: f32 = 0.25;

/// Weapon archetypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponKind {
    /// Hitscan, heat-limited automatic
    Rifle,
    /// 8-pellet hitscan spread
    Shotgun,
    /// Hitscan sidearm
    Pistol,
    /// Charged bouncing projectile
    Grenade,
    /// Straight-line projectile
    Rocket,
}

impl WeaponKind {
    pub fn is_hitscan(self) -> bool {
        matches!(self, WeaponKind::Rifle | WeaponKind::Shotgun | WeaponKind::Pistol)
    }
}

/// Static weapon parameters
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Damage per pellet before material scaling
    pub base_damage: f32,
    /// Minimum seconds between shots
    pub fire_interval: f32,
    /// Rays cast per shot
    pub pellets: u32,
    /// Maximum angular offset per pellet (radians)
    pub spread: f32,
    /// Shots per magazine fill
    pub magazine: u32,
    /// Heat added per shot; zero disables the heat model
    pub heat_per_shot: f32,
    /// Maximum hitscan range
    pub range: f32,
}

impl WeaponStats {
    pub fn for_kind(kind: WeaponKind) -> Self {
        match kind {
            WeaponKind::Rifle => Self {
                base_damage: 22.0,
                fire_interval: 0.1,
                pellets: 1,
                spread: 0.015,
                magazine: 30,
                heat_per_shot: 0.09,
                range: 1200.0,
            },
            WeaponKind::Shotgun => Self {
                base_damage: 9.0,
                fire_interval: 0.8,
                pellets: 8,
                spread: 0.12,
                magazine: 8,
                heat_per_shot: 0.0,
                range: 500.0,
            },
            WeaponKind::Pistol => Self {
                base_damage: 16.0,
                fire_interval: 0.25,
                pellets: 1,
                spread: 0.02,
                magazine: 12,
                heat_per_shot: 0.0,
                range: 900.0,
            },
            WeaponKind::Grenade => Self {
                base_damage: 70.0,
                fire_interval: 1.5,
                pellets: 0,
                spread: 0.0,
                magazine: 4,
                heat_per_shot: 0.0,
                range: 0.0,
            },
            WeaponKind::Rocket => Self {
                base_damage: 90.0,
                fire_interval: 2.0,
                pellets: 0,
                spread: 0.0,
                magazine: 3,
                heat_per_shot: 0.0,
                range: 0.0,
            },
        }
    }
}

/// Mutable per-weapon state
#[derive(Debug, Clone, Copy)]
pub struct WeaponState {
    pub kind: WeaponKind,
    pub ammo: u32,
    /// Seconds until the next shot is allowed (0 = ready)
    pub cooldown: f32,
    pub heat: f32,
    overheated: bool,
}

impl WeaponState {
    pub fn new(kind: WeaponKind) -> Self {
        Self {
            kind,
            ammo: WeaponStats::for_kind(kind).magazine,
            cooldown: 0.0,
            heat: 0.0,
            overheated: false,
        }
    }

    /// Advance timers by one tick
    pub fn tick(&mut self, dt: f32) {
        self.cooldown = (self.cooldown - dt).max(0.0);
        self.heat = (self.heat - HEAT_COOL_RATE * dt).max(0.0);
        if self.overheated && self.heat < HEAT_RESUME {
            self.overheated = false;
        }
    }

    /// Gate a fire attempt. On success the cooldown, ammo and heat are
    /// committed. Every rejection carries an explicit reason for the caller
    /// to surface - the gate itself is never silent.
    pub fn try_fire(&mut self) -> Result<(), FireRejectReason> {
        if self.cooldown > 0.0 {
            return Err(FireRejectReason::RateLimited);
        }
        if self.overheated {
            return Err(FireRejectReason::Overheated);
        }
        if self.ammo == 0 {
            return Err(FireRejectReason::OutOfAmmo);
        }
        let stats = WeaponStats::for_kind(self.kind);
        self.cooldown = stats.fire_interval;
        self.ammo -= 1;
        if stats.heat_per_shot > 0.0 {
            self.heat += stats.heat_per_shot;
            if self.heat >= HEAT_MAX {
                self.heat = HEAT_MAX;
                self.overheated = true;
            }
        }
        Ok(())
    }

    /// World reset: refill ammo, clear accumulated cooldown and heat
    pub fn reset(&mut self) {
        self.ammo = WeaponStats::for_kind(self.kind).magazine;
        self.cooldown = 0.0;
        self.heat = 0.0;
        self.overheated = false;
    }
}

/// A player's three weapon slots
#[derive(Debug, Clone, Copy)]
pub struct Loadout {
    pub primary: WeaponState,
    pub secondary: WeaponState,
    pub support: WeaponState,
}

impl Loadout {
    pub fn standard() -> Self {
        Self {
            primary: WeaponState::new(WeaponKind::Rifle),
            secondary: WeaponState::new(WeaponKind::Pistol),
            support: WeaponState::new(WeaponKind::Grenade),
        }
    }

    pub fn slot_mut(&mut self, slot: WeaponSlot) -> &mut WeaponState {
        match slot {
            WeaponSlot::Primary => &mut self.primary,
            WeaponSlot::Secondary => &mut self.secondary,
            WeaponSlot::Support => &mut self.support,
        }
    }

    pub fn slot(&self, slot: WeaponSlot) -> &WeaponState {
        match slot {
            WeaponSlot::Primary => &self.primary,
            WeaponSlot::Secondary => &self.secondary,
            WeaponSlot::Support => &self.support,
        }
    }

    pub fn tick(&mut self, dt: f32) {
        self.primary.tick(dt);
        self.secondary.tick(dt);
        self.support.tick(dt);
    }

    pub fn reset(&mut self) {
        self.primary.reset();
        self.secondary.reset();
        self.support.reset();
    }
}

/// Potential hitscan target (a live player other than the shooter)
#[derive(Debug, Clone, Copy)]
pub struct HitscanTarget {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

/// A pellet that struck a player; damage is applied by the caller,
/// which owns player state
#[derive(Debug, Clone, Copy)]
pub struct PlayerHit {
    pub target_id: Uuid,
    pub damage: f32,
    pub x: f32,
    pub y: f32,
}

/// Outcome of one hitscan shot
#[derive(Debug, Default)]
pub struct HitscanOutcome {
    /// Wall damage events, already applied to the store
    pub events: Vec<GameEvent>,
    /// Player impacts, not yet applied
    pub player_hits: Vec<PlayerHit>,
    /// Any wall destruction occurred (invalidates cached vision)
    pub destruction: bool,
    /// At least one pellet hit nothing
    pub missed: bool,
}

/// Combat resolution: hitscan rays and splash damage
pub struct CombatSystem;

impl CombatSystem {
    /// Resolve one hitscan shot (all pellets). Each pellet takes the nearest
    /// obstruction among intact wall slices and target hulls; destroyed
    /// slices are transparent, so a pellet can pass through a breach in one
    /// wall and still stop on an intact slice further along.
    pub fn resolve_hitscan(
        origin_x: f32,
        origin_y: f32,
        direction: f32,
        stats: &WeaponStats,
        walls: &mut WallStore,
        targets: &[HitscanTarget],
        rng: &mut ChaCha8Rng,
    ) -> HitscanOutcome {
        let mut outcome = HitscanOutcome::default();

        for _ in 0..stats.pellets {
            let offset = if stats.spread > 0.0 {
                rng.gen_range(-stats.spread..=stats.spread)
            } else {
                0.0
            };
            let angle = direction + offset;
            let (dx, dy) = (angle.cos(), angle.sin());

            let wall_hit = walls.raycast(origin_x, origin_y, dx, dy, stats.range);

            let mut player_hit: Option<(f32, &HitscanTarget)> = None;
            for target in targets {
                if let Some(t) =
                    ray_circle(origin_x, origin_y, dx, dy, target.x, target.y, target.radius)
                {
                    if t <= stats.range && player_hit.map_or(true, |(best, _)| t < best) {
                        player_hit = Some((t, target));
                    }
                }
            }

            // Intact geometry in front of the target shields it
            if let (Some((pt, _)), Some(wh)) = (player_hit, wall_hit) {
                if wh.distance < pt {
                    player_hit = None;
                }
            }

            if let Some((t, target)) = player_hit {
                outcome.player_hits.push(PlayerHit {
                    target_id: target.id,
                    damage: stats.base_damage,
                    x: origin_x + dx * t,
                    y: origin_y + dy * t,
                });
                continue;
            }

            if let Some(hit) = wall_hit {
                if let Some(result) = walls.damage_slice(&hit.wall_id, hit.slice, stats.base_damage)
                {
                    outcome.events.push(GameEvent::WallDamaged {
                        wall_id: hit.wall_id,
                        slice: hit.slice as u8,
                        new_health: result.new_health,
                        destroyed: result.destroyed,
                        impact_x: hit.hit_x,
                        impact_y: hit.hit_y,
                    });
                    if result.destroyed {
                        outcome.destruction = true;
                    }
                    if result.wall_destroyed {
                        outcome.events.push(GameEvent::WallDestroyed { wall_id: hit.wall_id });
                    }
                }
                continue;
            }

            outcome.missed = true;
        }

        outcome
    }

    /// Splash damage to wall slices around an explosion origin. Damage falls
    /// off linearly with slice-center distance and is exactly zero at the
    /// radius boundary (the boundary itself is outside the blast).
    pub fn resolve_splash(
        origin_x: f32,
        origin_y: f32,
        radius: f32,
        base_damage: f32,
        walls: &mut WallStore,
    ) -> (Vec<GameEvent>, bool) {
        let mut events = Vec::new();
        let mut destruction = false;

        let mut impacts: Vec<(Uuid, usize, f32, (f32, f32))> = Vec::new();
        for wall in walls.walls() {
            for (slice, _) in wall.intact_slice_rects() {
                let (cx, cy) = wall.slice_center(slice);
                let dist = ((cx - origin_x).powi(2) + (cy - origin_y).powi(2)).sqrt();
                if let Some(damage) = Self::splash_damage(dist, radius, base_damage) {
                    impacts.push((wall.id, slice, damage, (cx, cy)));
                }
            }
        }

        for (wall_id, slice, damage, (cx, cy)) in impacts {
            if let Some(result) = walls.damage_slice(&wall_id, slice, damage) {
                events.push(GameEvent::WallDamaged {
                    wall_id,
                    slice: slice as u8,
                    new_health: result.new_health,
                    destroyed: result.destroyed,
                    impact_x: cx,
                    impact_y: cy,
                });
                if result.destroyed {
                    destruction = true;
                }
                if result.wall_destroyed {
                    events.push(GameEvent::WallDestroyed { wall_id });
                }
            }
        }

        (events, destruction)
    }

    /// Linear splash falloff. None outside the blast, including exactly at
    /// the radius.
    pub fn splash_damage(distance: f32, radius: f32, base_damage: f32) -> Option<f32> {
        if distance >= radius {
            return None;
        }
        Some(base_damage * (1.0 - distance / radius))
    }

    /// Apply damage through armor. Armor soaks half the incoming damage
    /// until depleted. Returns (new_health, new_armor, killed).
    pub fn apply_damage(health: f32, armor: f32, damage: f32) -> (f32, f32, bool) {
        let absorbed = (damage * 0.5).min(armor);
        let new_armor = armor - absorbed;
        let new_health = (health - (damage - absorbed)).max(0.0);
        (new_health, new_armor, new_health <= 0.0)
    }
}

/// Nearest positive ray parameter at which a normalized-direction ray
/// enters a circle, or None
pub fn ray_circle(ox: f32, oy: f32, dx: f32, dy: f32, cx: f32, cy: f32, r: f32) -> Option<f32> {
    let fx = ox - cx;
    let fy = oy - cy;
    let b = 2.0 * (fx * dx + fy * dy);
    let c = fx * fx + fy * fy - r * r;
    let disc = b * b - 4.0 * c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    let t1 = (-b - sqrt_disc) / 2.0;
    let t2 = (-b + sqrt_disc) / 2.0;
    if t1 >= 0.0 {
        Some(t1)
    } else if t2 >= 0.0 {
        // Origin inside the circle
        Some(0.0)
    } else {
        None
    }
}
