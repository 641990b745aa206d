//! Wire protocol message definitions
//! These are the types the external transport consumes and produces;
//! the simulation core neither opens sockets nor frames messages.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::walls::{WallMaterial, SLICES_PER_WALL};

/// Team tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Red,
    Blue,
}

impl Default for Team {
    fn default() -> Self {
        Self::Red
    }
}

/// Movement states with fixed speed constants (units per second)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementState {
    Idle,
    Walk,
    Run,
    Crouch,
}

impl MovementState {
    pub fn speed(self) -> f32 {
        match self {
            MovementState::Idle => 0.0,
            MovementState::Walk => 100.0,
            MovementState::Run => 180.0,
            MovementState::Crouch => 55.0,
        }
    }
}

impl Default for MovementState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Weapon slots in a player's loadout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponSlot {
    Primary,
    Secondary,
    Support,
}

/// Held movement keys for one intent
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MovementKeys {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub sprint: bool,
    pub crouch: bool,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Movement and aim intent for the current tick
    InputTick {
        /// Monotonic sequence number
        seq: u32,
        /// Client wall-clock milliseconds, checked against server time
        client_timestamp: u64,
        keys: MovementKeys,
        /// Aim target in world coordinates; rotation is derived server-side
        aim_x: f32,
        aim_y: f32,
    },

    /// Fire the weapon in a slot
    Fire {
        slot: WeaponSlot,
        /// Grenade charge level 1-5; ignored for other weapons
        charge_level: Option<u8>,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Restore walls to their captured baseline, clear projectiles and cooldowns
    ResetWorld,

    /// Leave the arena
    Leave,
}

/// Why an input intent was rejected. Rejections are always surfaced;
/// silent dropping caused a combat desync in a predecessor of this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputRejectReason {
    /// Client timestamp outside the server tolerance window
    StaleTimestamp,
    /// Per-player intent quota exceeded
    RateLimited,
    /// Sequence number not newer than the last applied intent
    OutOfOrder,
}

/// Why a fire intent was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireRejectReason {
    /// Fire interval for the weapon has not elapsed
    RateLimited,
    OutOfAmmo,
    Overheated,
    Dead,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        player_id: Uuid,
        server_time: u64,
    },

    /// Confirmation of arena join with the full wall layout
    Joined {
        arena_id: Uuid,
        player_id: Uuid,
        team: Team,
        seed: u64,
        walls: Vec<WallSnapshot>,
    },

    /// Another player joined
    PlayerJoined {
        player_id: Uuid,
        display_name: String,
        team: Team,
    },

    /// A player left
    PlayerLeft {
        player_id: Uuid,
        reason: String,
    },

    /// Per-player filtered state snapshot (sent at the broadcast rate)
    Snapshot {
        tick: u64,
        server_timestamp: u64,
        players: Vec<PlayerSnapshot>,
        walls: Vec<WallSnapshot>,
        projectiles: Vec<ProjectileSnapshot>,
        /// Boundary of the recipient's visible region, sorted by angle
        visible_region: Vec<VisionPoint>,
        /// Events since the last snapshot, filtered to the recipient's view
        events: Vec<GameEvent>,
    },

    /// An intent was rejected before reaching the simulation
    InputRejected {
        seq: u32,
        reason: InputRejectReason,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// One boundary point of a visible region: direction and reach
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisionPoint {
    /// Absolute angle in radians
    pub angle: f32,
    /// Distance from the viewer at which sight terminates
    pub distance: f32,
}

/// Weapon state inside a player snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeaponSnapshot {
    pub slot: WeaponSlot,
    pub ammo: u32,
    /// Seconds until the weapon may fire again (0 = ready)
    pub cooldown: f32,
    /// Barrel heat 0..=1 where applicable, 0 otherwise
    pub heat: f32,
}

/// Player state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub player_id: Uuid,
    pub x: f32,
    pub y: f32,
    /// Rotation in radians, derived from the aim target
    pub rotation: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    /// Health (0-100)
    pub health: f32,
    pub armor: f32,
    pub team: Team,
    pub movement_state: MovementState,
    pub alive: bool,
    pub last_input_seq: u32,
    pub weapons: Vec<WeaponSnapshot>,
}

/// Wall state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallSnapshot {
    pub wall_id: Uuid,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub material: WallMaterial,
    pub slice_health: [f32; SLICES_PER_WALL],
    pub slice_destroyed: [bool; SLICES_PER_WALL],
}

/// Projectile kinds that persist as entities (hitscan never does)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectileKind {
    Grenade,
    Rocket,
}

/// Projectile state in a snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub id: Uuid,
    pub kind: ProjectileKind,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
}

/// Discrete simulation events. A closed set, exhaustively matched at the
/// transport boundary - never dispatched by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    /// A weapon discharged
    WeaponFired {
        player_id: Uuid,
        slot: WeaponSlot,
        x: f32,
        y: f32,
        direction: f32,
    },

    /// A hitscan ray struck a player
    WeaponHit {
        shooter_id: Uuid,
        target_id: Uuid,
        damage: f32,
        x: f32,
        y: f32,
    },

    /// A hitscan ray hit nothing within range
    WeaponMiss {
        player_id: Uuid,
        slot: WeaponSlot,
    },

    /// A fire intent was rejected; never silent
    FireRejected {
        player_id: Uuid,
        slot: WeaponSlot,
        reason: FireRejectReason,
    },

    /// A wall slice took damage
    WallDamaged {
        wall_id: Uuid,
        slice: u8,
        new_health: f32,
        destroyed: bool,
        impact_x: f32,
        impact_y: f32,
    },

    /// Every slice of a wall is destroyed
    WallDestroyed {
        wall_id: Uuid,
    },

    /// A player took damage
    PlayerDamaged {
        target_id: Uuid,
        source_id: Option<Uuid>,
        damage: f32,
        health: f32,
    },

    /// A player died
    PlayerKilled {
        victim_id: Uuid,
        killer_id: Option<Uuid>,
    },

    /// A projectile entity spawned
    ProjectileCreated {
        id: Uuid,
        kind: ProjectileKind,
        owner_id: Uuid,
        x: f32,
        y: f32,
        vel_x: f32,
        vel_y: f32,
    },

    /// A projectile detonated
    ProjectileExploded {
        id: Uuid,
        x: f32,
        y: f32,
        radius: f32,
    },

    /// The world was reset to its captured baseline
    WorldReset,
}

impl GameEvent {
    /// World position an event reveals, used for per-player event filtering.
    /// None means the event carries no positional information.
    pub fn position(&self) -> Option<(f32, f32)> {
        match self {
            GameEvent::WeaponFired { x, y, .. }
            | GameEvent::WeaponHit { x, y, .. }
            | GameEvent::ProjectileCreated { x, y, .. }
            | GameEvent::ProjectileExploded { x, y, .. } => Some((*x, *y)),
            GameEvent::WallDamaged {
                impact_x, impact_y, ..
            } => Some((*impact_x, *impact_y)),
            _ => None,
        }
    }

    /// Players directly involved in an event; they always receive it
    pub fn involves(&self, player_id: &Uuid) -> bool {
        match self {
            GameEvent::WeaponFired { player_id: p, .. }
            | GameEvent::WeaponMiss { player_id: p, .. }
            | GameEvent::FireRejected { player_id: p, .. } => p == player_id,
            GameEvent::WeaponHit {
                shooter_id,
                target_id,
                ..
            } => shooter_id == player_id || target_id == player_id,
            GameEvent::PlayerDamaged {
                target_id,
                source_id,
                ..
            } => target_id == player_id || source_id.as_ref() == Some(player_id),
            GameEvent::PlayerKilled {
                victim_id,
                killer_id,
            } => victim_id == player_id || killer_id.as_ref() == Some(player_id),
            GameEvent::ProjectileCreated { owner_id, .. } => owner_id == player_id,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_parse_from_tagged_json() {
        let raw = r#"{
            "type": "input_tick",
            "seq": 9,
            "client_timestamp": 173000,
            "keys": {"up": true, "down": false, "left": false, "right": false, "sprint": true, "crouch": false},
            "aim_x": 640.0,
            "aim_y": 360.0
        }"#;
        let msg: ClientMsg = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMsg::InputTick {
                seq, keys, aim_x, ..
            } => {
                assert_eq!(seq, 9);
                assert!(keys.up && keys.sprint);
                assert_eq!(aim_x, 640.0);
            }
            other => panic!("expected InputTick, got {:?}", other),
        }

        let raw = r#"{"type": "fire", "slot": "support", "charge_level": 3}"#;
        let msg: ClientMsg = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            msg,
            ClientMsg::Fire {
                slot: WeaponSlot::Support,
                charge_level: Some(3),
            }
        ));

        let msg: ClientMsg = serde_json::from_str(r#"{"type": "reset_world"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::ResetWorld));
    }

    #[test]
    fn server_messages_and_events_use_snake_case_tags() {
        let reject = ServerMsg::InputRejected {
            seq: 4,
            reason: InputRejectReason::StaleTimestamp,
        };
        let value = serde_json::to_value(&reject).unwrap();
        assert_eq!(value["type"], "input_rejected");
        assert_eq!(value["reason"], "stale_timestamp");

        let event = GameEvent::FireRejected {
            player_id: Uuid::new_v4(),
            slot: WeaponSlot::Primary,
            reason: FireRejectReason::Overheated,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "fire_rejected");
        assert_eq!(value["slot"], "primary");
        assert_eq!(value["reason"], "overheated");
    }

    #[test]
    fn snapshot_survives_a_wire_round_trip() {
        let msg = ServerMsg::Snapshot {
            tick: 120,
            server_timestamp: 99_000,
            players: vec![],
            walls: vec![],
            projectiles: vec![ProjectileSnapshot {
                id: Uuid::new_v4(),
                kind: ProjectileKind::Rocket,
                x: 10.0,
                y: 20.0,
                vel_x: 450.0,
                vel_y: 0.0,
            }],
            visible_region: vec![VisionPoint {
                angle: -1.0,
                distance: 600.0,
            }],
            events: vec![GameEvent::WorldReset],
        };

        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: ServerMsg = serde_json::from_str(&encoded).unwrap();
        match decoded {
            ServerMsg::Snapshot {
                tick,
                projectiles,
                visible_region,
                events,
                ..
            } => {
                assert_eq!(tick, 120);
                assert_eq!(projectiles.len(), 1);
                assert_eq!(projectiles[0].kind, ProjectileKind::Rocket);
                assert_eq!(visible_region[0].distance, 600.0);
                assert!(matches!(events[0], GameEvent::WorldReset));
            }
            other => panic!("expected Snapshot, got {:?}", other),
        }
    }
}
