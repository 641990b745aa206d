//! Arena state and authoritative tick loop

use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{info, trace, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::net::protocol::{
    ClientMsg, FireRejectReason, GameEvent, InputRejectReason, MovementState, ServerMsg, Team,
    WeaponSlot,
};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::{
    tick_delta, unix_millis, Timer, SIMULATION_TPS, SNAPSHOT_TPS, TICK_DURATION_MICROS,
    VISION_CADENCE_TICKS,
};

use super::combat::{CombatSystem, HitscanTarget, Loadout, WeaponStats};
use super::physics::{PhysicsSystem, Projectile, ProjectileStep};
use super::snapshot::{wall_snapshots, SnapshotBuilder};
use super::vision::{VisionState, VisionSystem, VIEW_DISTANCE};
use super::walls::{WallSpec, WallStore};
use super::{ArenaControl, FireCommand, PlayerInput, TickInput};

/// Player hull radius for hit detection and wall separation
pub const PLAYER_RADIUS: f32 = 12.0;
/// Starting armor points
const SPAWN_ARMOR: f32 = 50.0;
/// Muzzle offset from the player center when spawning projectiles
const MUZZLE_OFFSET: f32 = PLAYER_RADIUS + 6.0;

/// Player state in an arena (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub player_id: Uuid,
    pub display_name: String,
    pub team: Team,

    // Transform; rotation is derived from the aim target each tick
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub vel_x: f32,
    pub vel_y: f32,

    // Combat
    pub health: f32,
    pub armor: f32,
    pub alive: bool,
    pub movement_state: MovementState,
    pub loadout: Loadout,

    // Input tracking
    pub last_input_seq: u32,
    pub current_input: TickInput,
    pub pending_fire: Vec<FireCommand>,

    // Fog of war
    pub vision: VisionState,
}

impl PlayerState {
    pub fn new(
        player_id: Uuid,
        display_name: String,
        team: Team,
        spawn_x: f32,
        spawn_y: f32,
    ) -> Self {
        Self {
            player_id,
            display_name,
            team,
            x: spawn_x,
            y: spawn_y,
            rotation: 0.0,
            vel_x: 0.0,
            vel_y: 0.0,
            health: 100.0,
            armor: SPAWN_ARMOR,
            alive: true,
            movement_state: MovementState::Idle,
            loadout: Loadout::standard(),
            last_input_seq: 0,
            current_input: TickInput {
                aim_x: spawn_x + 1.0,
                aim_y: spawn_y,
                ..TickInput::default()
            },
            pending_fire: Vec::new(),
            vision: VisionState::default(),
        }
    }
}

/// Arena state (owned by the arena task; no other context ever mutates it)
pub struct ArenaState {
    pub id: Uuid,
    pub seed: u64,
    pub tick: u64,
    pub players: HashMap<Uuid, PlayerState>,
    pub walls: WallStore,
    pub projectiles: Vec<Projectile>,
    pub rng: ChaCha8Rng,
    pub world_width: f32,
    pub world_height: f32,
    pub input_tolerance_ms: u64,
    reset_requested: bool,
}

impl ArenaState {
    pub fn new(id: Uuid, seed: u64, layout: &[WallSpec], config: &Config) -> Self {
        let mut walls = WallStore::from_layout(layout);
        walls.capture_initial();
        Self {
            id,
            seed,
            tick: 0,
            players: HashMap::new(),
            walls,
            projectiles: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            world_width: config.world_width,
            world_height: config.world_height,
            input_tolerance_ms: config.input_tolerance_ms,
            reset_requested: false,
        }
    }

    /// Spawn position clear of wall geometry
    fn generate_spawn_position(&mut self) -> (f32, f32) {
        let margin = 50.0;
        for _ in 0..16 {
            let x = self.rng.gen_range(margin..self.world_width - margin);
            let y = self.rng.gen_range(margin..self.world_height - margin);
            let blocked = self.walls.walls().iter().any(|w| {
                x > w.x - PLAYER_RADIUS
                    && x < w.x + w.width + PLAYER_RADIUS
                    && y > w.y - PLAYER_RADIUS
                    && y < w.y + w.height + PLAYER_RADIUS
            });
            if !blocked {
                return (x, y);
            }
        }
        (self.world_width / 2.0, self.world_height / 2.0)
    }

    /// Pick the smaller team
    fn balance_team(&self) -> Team {
        let red = self.players.values().filter(|p| p.team == Team::Red).count();
        let blue = self.players.values().filter(|p| p.team == Team::Blue).count();
        if red <= blue {
            Team::Red
        } else {
            Team::Blue
        }
    }
}

/// Handle to a running arena
#[derive(Clone)]
pub struct ArenaHandle {
    pub id: Uuid,
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub control_tx: mpsc::Sender<ArenaControl>,
}

/// Registry of all active arenas
pub struct ArenaRegistry {
    arenas: DashMap<Uuid, ArenaHandle>,
}

impl ArenaRegistry {
    pub fn new() -> Self {
        Self {
            arenas: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<ArenaHandle> {
        self.arenas.get(id).map(|a| a.value().clone())
    }

    pub fn insert(&self, handle: ArenaHandle) {
        self.arenas.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<ArenaHandle> {
        self.arenas.remove(id).map(|(_, h)| h)
    }

    pub fn active_arenas(&self) -> usize {
        self.arenas.len()
    }
}

impl Default for ArenaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative arena simulation
pub struct GameArena {
    state: ArenaState,
    input_rx: mpsc::Receiver<PlayerInput>,
    control_rx: mpsc::Receiver<ArenaControl>,
    outboxes: HashMap<Uuid, mpsc::Sender<ServerMsg>>,
    limiters: HashMap<Uuid, PlayerRateLimiter>,
    snapshot_builder: SnapshotBuilder,
    /// Events accumulated since the last broadcast; snapshots run at a
    /// lower rate than the simulation, so events from off-cadence ticks
    /// wait here instead of being lost
    pending_events: Vec<GameEvent>,
    control_closed: bool,
}

impl GameArena {
    pub fn new(id: Uuid, seed: u64, layout: &[WallSpec], config: &Config) -> (Self, ArenaHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (control_tx, control_rx) = mpsc::channel(32);

        let handle = ArenaHandle {
            id,
            input_tx,
            control_tx,
        };

        let arena = Self {
            state: ArenaState::new(id, seed, layout, config),
            input_rx,
            control_rx,
            outboxes: HashMap::new(),
            limiters: HashMap::new(),
            snapshot_builder: SnapshotBuilder::new(SIMULATION_TPS / SNAPSHOT_TPS),
            pending_events: Vec::new(),
            control_closed: false,
        };

        (arena, handle)
    }

    /// Run the authoritative tick loop
    pub async fn run(mut self) {
        info!(arena_id = %self.state.id, "Arena started");

        let mut tick_interval = interval(Duration::from_micros(TICK_DURATION_MICROS));
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;
            let timer = Timer::new();

            self.advance();

            if timer.elapsed_ms() > TICK_DURATION_MICROS / 1000 {
                warn!(
                    arena_id = %self.state.id,
                    tick = self.state.tick,
                    elapsed_ms = timer.elapsed_ms(),
                    "Tick exceeded its budget"
                );
            }

            if self.control_closed && self.state.players.is_empty() {
                info!(arena_id = %self.state.id, "All players gone, stopping arena");
                break;
            }
        }
    }

    /// One full frame: connection changes, intents, simulation, and the
    /// broadcast when the snapshot cadence comes due. Events from
    /// off-cadence ticks are held in `pending_events` so every snapshot
    /// carries everything since the previous one.
    fn advance(&mut self) {
        self.process_control();
        self.process_inputs();

        let events = self.run_tick();
        self.pending_events.extend(events);

        if self.snapshot_builder.should_send() {
            self.broadcast_snapshots();
        }
    }

    /// Apply connect/disconnect commands queued since the last tick
    fn process_control(&mut self) {
        loop {
            match self.control_rx.try_recv() {
                Ok(ArenaControl::Connect {
                    player_id,
                    display_name,
                    team,
                    outbox,
                }) => self.handle_connect(player_id, display_name, team, outbox),
                Ok(ArenaControl::Disconnect { player_id }) => {
                    self.remove_player(player_id, "disconnected");
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.control_closed = true;
                    break;
                }
            }
        }
    }

    fn handle_connect(
        &mut self,
        player_id: Uuid,
        display_name: String,
        team: Option<Team>,
        outbox: mpsc::Sender<ServerMsg>,
    ) {
        if self.state.players.contains_key(&player_id) {
            warn!(player_id = %player_id, "Player already in arena");
            return;
        }

        let team = team.unwrap_or_else(|| self.state.balance_team());
        let (spawn_x, spawn_y) = self.state.generate_spawn_position();
        let player = PlayerState::new(player_id, display_name.clone(), team, spawn_x, spawn_y);

        let _ = outbox.try_send(ServerMsg::Welcome {
            player_id,
            server_time: unix_millis(),
        });
        let _ = outbox.try_send(ServerMsg::Joined {
            arena_id: self.state.id,
            player_id,
            team,
            seed: self.state.seed,
            walls: wall_snapshots(&self.state.walls),
        });

        for (other_id, other_outbox) in &self.outboxes {
            if *other_id != player_id {
                let _ = other_outbox.try_send(ServerMsg::PlayerJoined {
                    player_id,
                    display_name: display_name.clone(),
                    team,
                });
            }
        }

        self.state.players.insert(player_id, player);
        self.outboxes.insert(player_id, outbox);
        self.limiters.insert(player_id, PlayerRateLimiter::new());

        info!(
            arena_id = %self.state.id,
            player_id = %player_id,
            player_count = self.state.players.len(),
            "Player joined arena"
        );
    }

    /// Remove a player's transform, weapons and vision in one step
    fn remove_player(&mut self, player_id: Uuid, reason: &str) {
        if self.state.players.remove(&player_id).is_none() {
            return;
        }
        self.outboxes.remove(&player_id);
        self.limiters.remove(&player_id);

        for outbox in self.outboxes.values() {
            let _ = outbox.try_send(ServerMsg::PlayerLeft {
                player_id,
                reason: reason.to_string(),
            });
        }

        info!(arena_id = %self.state.id, player_id = %player_id, reason, "Player left arena");
    }

    /// Process all pending intents. Every rejection is surfaced to the
    /// sender; silent dropping is what caused the old combat desync.
    fn process_inputs(&mut self) {
        while let Ok(input) = self.input_rx.try_recv() {
            match input.msg {
                ClientMsg::InputTick {
                    seq,
                    client_timestamp,
                    keys,
                    aim_x,
                    aim_y,
                } => {
                    self.handle_input_tick(
                        input.player_id,
                        seq,
                        client_timestamp,
                        input.received_at,
                        keys,
                        aim_x,
                        aim_y,
                    );
                }
                ClientMsg::Fire { slot, charge_level } => {
                    if let Some(player) = self.state.players.get_mut(&input.player_id) {
                        player.pending_fire.push(FireCommand {
                            slot,
                            charge_level: charge_level.unwrap_or(1),
                        });
                    }
                }
                ClientMsg::Ping { t } => {
                    if let Some(outbox) = self.outboxes.get(&input.player_id) {
                        let _ = outbox.try_send(ServerMsg::Pong { t });
                    }
                }
                ClientMsg::ResetWorld => {
                    self.state.reset_requested = true;
                }
                ClientMsg::Leave => {
                    self.remove_player(input.player_id, "left");
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_input_tick(
        &mut self,
        player_id: Uuid,
        seq: u32,
        client_timestamp: u64,
        received_at: u64,
        keys: crate::net::protocol::MovementKeys,
        aim_x: f32,
        aim_y: f32,
    ) {
        let Some(player) = self.state.players.get_mut(&player_id) else {
            return;
        };

        if let Some(limiter) = self.limiters.get(&player_id) {
            if !limiter.check_intent() {
                self.reject_input(player_id, seq, InputRejectReason::RateLimited);
                return;
            }
        }

        let drift = received_at.abs_diff(client_timestamp);
        if drift > self.state.input_tolerance_ms {
            trace!(player_id = %player_id, drift, "Stale intent timestamp");
            self.reject_input(player_id, seq, InputRejectReason::StaleTimestamp);
            return;
        }

        if seq <= player.last_input_seq {
            self.reject_input(player_id, seq, InputRejectReason::OutOfOrder);
            return;
        }

        player.last_input_seq = seq;
        player.current_input = TickInput {
            seq,
            keys,
            aim_x,
            aim_y,
        };
    }

    fn reject_input(&self, player_id: Uuid, seq: u32, reason: InputRejectReason) {
        if let Some(outbox) = self.outboxes.get(&player_id) {
            let _ = outbox.try_send(ServerMsg::InputRejected { seq, reason });
        }
    }

    /// Run a single simulation tick: movement, combat, projectiles,
    /// visibility, deferred reset - strictly in that order
    fn run_tick(&mut self) -> Vec<GameEvent> {
        self.state.tick += 1;
        let dt = tick_delta();
        let mut events = Vec::new();

        self.update_movement(dt);
        self.resolve_fire(&mut events);
        self.step_projectiles(dt, &mut events);
        self.update_vision(&events);

        if self.state.reset_requested {
            self.reset_world(&mut events);
        }

        events
    }

    /// Derive rotation from aim, integrate movement, separate from walls
    fn update_movement(&mut self, dt: f32) {
        let walls = &self.state.walls;
        let (world_w, world_h) = (self.state.world_width, self.state.world_height);

        for player in self.state.players.values_mut() {
            player.loadout.tick(dt);
            if !player.alive {
                player.movement_state = MovementState::Idle;
                player.vel_x = 0.0;
                player.vel_y = 0.0;
                continue;
            }

            let input = &player.current_input;
            let aim_dx = input.aim_x - player.x;
            let aim_dy = input.aim_y - player.y;
            if aim_dx.abs() > f32::EPSILON || aim_dy.abs() > f32::EPSILON {
                player.rotation = aim_dy.atan2(aim_dx);
            }

            let keys = input.keys;
            let dir_x = (keys.right as i8 - keys.left as i8) as f32;
            let dir_y = (keys.down as i8 - keys.up as i8) as f32;
            player.movement_state = if dir_x == 0.0 && dir_y == 0.0 {
                MovementState::Idle
            } else if keys.crouch {
                MovementState::Crouch
            } else if keys.sprint {
                MovementState::Run
            } else {
                MovementState::Walk
            };

            let speed = player.movement_state.speed();
            let len = (dir_x * dir_x + dir_y * dir_y).sqrt();
            if len > 0.0 {
                player.vel_x = dir_x / len * speed;
                player.vel_y = dir_y / len * speed;
            } else {
                player.vel_x = 0.0;
                player.vel_y = 0.0;
            }

            player.x = (player.x + player.vel_x * dt).clamp(0.0, world_w);
            player.y = (player.y + player.vel_y * dt).clamp(0.0, world_h);

            separate_from_walls(player, walls);
        }
    }

    /// Resolve queued fire commands with explicit rejection events
    fn resolve_fire(&mut self, events: &mut Vec<GameEvent>) {
        let shooter_ids: Vec<Uuid> = self.state.players.keys().copied().collect();

        for shooter_id in shooter_ids {
            let commands = match self.state.players.get_mut(&shooter_id) {
                Some(p) => std::mem::take(&mut p.pending_fire),
                None => continue,
            };

            for command in commands {
                let gate = match self.state.players.get_mut(&shooter_id) {
                    None => break,
                    Some(p) if !p.alive => Err(FireRejectReason::Dead),
                    Some(p) => match p.loadout.slot_mut(command.slot).try_fire() {
                        Ok(()) => Ok((p.loadout.slot(command.slot).kind, p.x, p.y, p.rotation)),
                        Err(reason) => Err(reason),
                    },
                };

                let (kind, x, y, rotation) = match gate {
                    Ok(fire) => fire,
                    Err(reason) => {
                        trace!(player_id = %shooter_id, slot = ?command.slot, ?reason, "Fire rejected");
                        events.push(GameEvent::FireRejected {
                            player_id: shooter_id,
                            slot: command.slot,
                            reason,
                        });
                        continue;
                    }
                };

                events.push(GameEvent::WeaponFired {
                    player_id: shooter_id,
                    slot: command.slot,
                    x,
                    y,
                    direction: rotation,
                });

                if kind.is_hitscan() {
                    self.fire_hitscan(shooter_id, command.slot, kind, x, y, rotation, events);
                } else {
                    self.launch_projectile(shooter_id, kind, x, y, rotation, command, events);
                }
            }
        }
    }

    fn fire_hitscan(
        &mut self,
        shooter_id: Uuid,
        slot: WeaponSlot,
        kind: super::combat::WeaponKind,
        x: f32,
        y: f32,
        rotation: f32,
        events: &mut Vec<GameEvent>,
    ) {
        let stats = WeaponStats::for_kind(kind);
        let targets = self.hitscan_targets(Some(shooter_id));

        let outcome = CombatSystem::resolve_hitscan(
            x,
            y,
            rotation,
            &stats,
            &mut self.state.walls,
            &targets,
            &mut self.state.rng,
        );

        events.extend(outcome.events);
        if outcome.missed {
            events.push(GameEvent::WeaponMiss {
                player_id: shooter_id,
                slot,
            });
        }

        for hit in outcome.player_hits {
            events.push(GameEvent::WeaponHit {
                shooter_id,
                target_id: hit.target_id,
                damage: hit.damage,
                x: hit.x,
                y: hit.y,
            });
            self.damage_player(hit.target_id, Some(shooter_id), hit.damage, events);
        }
    }

    fn launch_projectile(
        &mut self,
        shooter_id: Uuid,
        kind: super::combat::WeaponKind,
        x: f32,
        y: f32,
        rotation: f32,
        command: FireCommand,
        events: &mut Vec<GameEvent>,
    ) {
        let muzzle_x = x + rotation.cos() * MUZZLE_OFFSET;
        let muzzle_y = y + rotation.sin() * MUZZLE_OFFSET;

        let projectile = match kind {
            super::combat::WeaponKind::Grenade => {
                Projectile::grenade(shooter_id, muzzle_x, muzzle_y, rotation, command.charge_level)
            }
            _ => Projectile::rocket(shooter_id, muzzle_x, muzzle_y, rotation),
        };

        events.push(GameEvent::ProjectileCreated {
            id: projectile.id,
            kind: projectile.kind,
            owner_id: shooter_id,
            x: projectile.x,
            y: projectile.y,
            vel_x: projectile.vel_x,
            vel_y: projectile.vel_y,
        });
        self.state.projectiles.push(projectile);
    }

    /// Advance every projectile; detonations apply the splash contract
    fn step_projectiles(&mut self, dt: f32, events: &mut Vec<GameEvent>) {
        let targets = self.hitscan_targets(None);
        let (world_w, world_h) = (self.state.world_width, self.state.world_height);

        let mut projectiles = std::mem::take(&mut self.state.projectiles);
        let mut survivors = Vec::with_capacity(projectiles.len());

        for mut projectile in projectiles.drain(..) {
            match PhysicsSystem::step(
                &mut projectile,
                &self.state.walls,
                &targets,
                world_w,
                world_h,
                dt,
            ) {
                ProjectileStep::Flying => survivors.push(projectile),
                ProjectileStep::Detonate { x, y } => {
                    self.detonate(&projectile, x, y, events);
                }
                ProjectileStep::OutOfBounds => {
                    warn!(
                        arena_id = %self.state.id,
                        projectile_id = %projectile.id,
                        x = projectile.x,
                        y = projectile.y,
                        "Projectile left safety bounds, force-removed"
                    );
                }
            }
        }

        self.state.projectiles = survivors;
    }

    fn detonate(&mut self, projectile: &Projectile, x: f32, y: f32, events: &mut Vec<GameEvent>) {
        let radius = projectile.splash_radius();
        let base_damage = WeaponStats::for_kind(match projectile.kind {
            crate::net::protocol::ProjectileKind::Grenade => super::combat::WeaponKind::Grenade,
            crate::net::protocol::ProjectileKind::Rocket => super::combat::WeaponKind::Rocket,
        })
        .base_damage;

        events.push(GameEvent::ProjectileExploded {
            id: projectile.id,
            x,
            y,
            radius,
        });

        let (wall_events, _) =
            CombatSystem::resolve_splash(x, y, radius, base_damage, &mut self.state.walls);
        events.extend(wall_events);

        let victims: Vec<(Uuid, f32)> = self
            .state
            .players
            .values()
            .filter(|p| p.alive)
            .filter_map(|p| {
                let dist = ((p.x - x).powi(2) + (p.y - y).powi(2)).sqrt();
                CombatSystem::splash_damage(dist, radius, base_damage)
                    .map(|damage| (p.player_id, damage))
            })
            .collect();

        for (victim_id, damage) in victims {
            self.damage_player(victim_id, Some(projectile.owner_id), damage, events);
        }
    }

    fn damage_player(
        &mut self,
        target_id: Uuid,
        source_id: Option<Uuid>,
        damage: f32,
        events: &mut Vec<GameEvent>,
    ) {
        let Some(target) = self.state.players.get_mut(&target_id) else {
            return;
        };
        if !target.alive {
            return;
        }

        let (health, armor, killed) = CombatSystem::apply_damage(target.health, target.armor, damage);
        let lost = target.health - health;
        target.health = health;
        target.armor = armor;

        events.push(GameEvent::PlayerDamaged {
            target_id,
            source_id,
            damage: lost,
            health,
        });

        if killed {
            target.alive = false;
            events.push(GameEvent::PlayerKilled {
                victim_id: target_id,
                killer_id: source_id,
            });
        }
    }

    /// Recompute visible regions on the cadence, or immediately when
    /// destruction touched geometry a player could see
    fn update_vision(&mut self, events: &[GameEvent]) {
        let destroyed_points: Vec<(f32, f32)> = events
            .iter()
            .filter_map(|e| match e {
                GameEvent::WallDamaged {
                    destroyed: true,
                    impact_x,
                    impact_y,
                    ..
                } => Some((*impact_x, *impact_y)),
                _ => None,
            })
            .collect();

        if !destroyed_points.is_empty() {
            for player in self.state.players.values_mut() {
                let in_range = destroyed_points.iter().any(|(dx, dy)| {
                    let ddx = dx - player.x;
                    let ddy = dy - player.y;
                    ddx * ddx + ddy * ddy <= VIEW_DISTANCE * VIEW_DISTANCE
                });
                if in_range {
                    player.vision.invalidate();
                }
            }
        }

        let cadence_due = self.state.tick % VISION_CADENCE_TICKS == 0;
        if !cadence_due && destroyed_points.is_empty() {
            return;
        }

        let walls = &self.state.walls;
        let tick = self.state.tick;
        for player in self.state.players.values_mut() {
            if !player.alive {
                continue;
            }
            if player.vision.needs_recompute(player.x, player.y, player.rotation) {
                let points = VisionSystem::compute(player.x, player.y, player.rotation, walls);
                player.vision.store(player.x, player.y, player.rotation, points, tick);
            }
        }
    }

    /// World reset: walls to baseline, projectiles gone, weapon state
    /// clean, and every player back to full strength. Death is terminal
    /// only until this point, so the dead respawn at a fresh position.
    fn reset_world(&mut self, events: &mut Vec<GameEvent>) {
        self.state.walls.reset_all();
        self.state.projectiles.clear();

        let player_ids: Vec<Uuid> = self.state.players.keys().copied().collect();
        for player_id in player_ids {
            let dead = self
                .state
                .players
                .get(&player_id)
                .is_some_and(|p| !p.alive);
            let respawn = dead.then(|| self.state.generate_spawn_position());

            let Some(player) = self.state.players.get_mut(&player_id) else {
                continue;
            };
            player.health = 100.0;
            player.armor = SPAWN_ARMOR;
            player.loadout.reset();
            player.vision.invalidate();
            player.pending_fire.clear();
            if let Some((x, y)) = respawn {
                player.alive = true;
                player.x = x;
                player.y = y;
                player.vel_x = 0.0;
                player.vel_y = 0.0;
            }
        }

        self.state.reset_requested = false;
        events.push(GameEvent::WorldReset);
        info!(arena_id = %self.state.id, "World reset to initial layout");
    }

    fn hitscan_targets(&self, exclude: Option<Uuid>) -> Vec<HitscanTarget> {
        self.state
            .players
            .values()
            .filter(|p| p.alive && Some(p.player_id) != exclude)
            .map(|p| HitscanTarget {
                id: p.player_id,
                x: p.x,
                y: p.y,
                radius: PLAYER_RADIUS,
            })
            .collect()
    }

    /// Build and send one filtered snapshot per connected player, then
    /// drain the accumulated events.
    /// Fire-and-forget: a slow consumer drops frames, never blocks the tick.
    fn broadcast_snapshots(&mut self) {
        let server_timestamp = unix_millis();
        for (player_id, outbox) in &self.outboxes {
            let snapshot = self.snapshot_builder.build_for_player(
                self.state.tick,
                server_timestamp,
                player_id,
                &self.state.players,
                &self.state.walls,
                &self.state.projectiles,
                &self.pending_events,
            );
            if let Some(snapshot) = snapshot {
                let _ = outbox.try_send(snapshot);
            }
        }
        self.pending_events.clear();
    }
}

/// Push a player hull out of any intact slice it overlaps
fn separate_from_walls(player: &mut PlayerState, walls: &WallStore) {
    for wall in walls.walls() {
        for (_, (rx, ry, rw, rh)) in wall.intact_slice_rects() {
            let closest_x = player.x.clamp(rx, rx + rw);
            let closest_y = player.y.clamp(ry, ry + rh);
            let dx = player.x - closest_x;
            let dy = player.y - closest_y;
            let dist_sq = dx * dx + dy * dy;
            if dist_sq >= PLAYER_RADIUS * PLAYER_RADIUS {
                continue;
            }
            let dist = dist_sq.sqrt();
            if dist > 1e-4 {
                let push = PLAYER_RADIUS - dist;
                player.x += dx / dist * push;
                player.y += dy / dist * push;
            } else {
                // Center inside the slice; eject along the shallowest axis
                let left = player.x - rx;
                let right = rx + rw - player.x;
                let top = player.y - ry;
                let bottom = ry + rh - player.y;
                let min = left.min(right).min(top).min(bottom);
                if min == left {
                    player.x = rx - PLAYER_RADIUS;
                } else if min == right {
                    player.x = rx + rw + PLAYER_RADIUS;
                } else if min == top {
                    player.y = ry - PLAYER_RADIUS;
                } else {
                    player.y = ry + rh + PLAYER_RADIUS;
                }
            }
        }
    }
}
