//! Simulation core modules

pub mod arena;
pub mod combat;
pub mod physics;
pub mod snapshot;
pub mod vision;
pub mod walls;

pub use arena::{ArenaHandle, ArenaRegistry, GameArena, PlayerState};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::net::protocol::{ClientMsg, MovementKeys, ServerMsg, Team};

/// Player intent received from the transport layer
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub player_id: Uuid,
    pub msg: ClientMsg,
    /// Server receive time in unix milliseconds
    pub received_at: u64,
}

/// Connection lifecycle commands from the transport layer. Applied only at
/// tick boundaries so a player never appears or vanishes mid-tick.
#[derive(Debug)]
pub enum ArenaControl {
    Connect {
        player_id: Uuid,
        display_name: String,
        team: Option<Team>,
        /// Per-player channel for snapshots and direct replies
        outbox: mpsc::Sender<ServerMsg>,
    },
    Disconnect {
        player_id: Uuid,
    },
}

/// Latest applied movement/aim intent for a player
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    pub seq: u32,
    pub keys: MovementKeys,
    pub aim_x: f32,
    pub aim_y: f32,
}

/// A queued fire intent, resolved (and possibly rejected) during the
/// combat phase of the next tick
#[derive(Debug, Clone, Copy)]
pub struct FireCommand {
    pub slot: crate::net::protocol::WeaponSlot,
    pub charge_level: u8,
}
