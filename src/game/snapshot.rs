//! Per-player snapshot assembly
//!
//! Every outbound snapshot is filtered through the recipient's visible
//! region so the wire never carries state the client could not legitimately
//! render. Wall state is the exception: the layout is world knowledge and
//! ships in full so clients can draw the map.

use std::collections::HashMap;
use uuid::Uuid;

use crate::net::protocol::{
    GameEvent, PlayerSnapshot, ProjectileSnapshot, ServerMsg, WallSnapshot, WeaponSnapshot,
    WeaponSlot,
};

use super::physics::Projectile;
use super::vision::VisionSystem;
use super::walls::WallStore;
use super::PlayerState;

/// Paces outbound snapshots relative to the simulation rate
pub struct SnapshotBuilder {
    ticks_since_snapshot: u32,
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval,
        }
    }

    /// Advance the pacing counter; true when a snapshot is due this tick
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Assemble one snapshot for a single recipient
    #[allow(clippy::too_many_arguments)]
    pub fn build_for_player(
        &self,
        tick: u64,
        server_timestamp: u64,
        recipient: &Uuid,
        players: &HashMap<Uuid, PlayerState>,
        walls: &WallStore,
        projectiles: &[Projectile],
        events: &[GameEvent],
    ) -> Option<ServerMsg> {
        let viewer = players.get(recipient)?;

        let sees = |x: f32, y: f32| {
            // Dead players spectate the whole arena
            !viewer.alive
                || VisionSystem::can_see(viewer.x, viewer.y, viewer.rotation, x, y, walls)
        };

        let player_snapshots: Vec<PlayerSnapshot> = players
            .values()
            .filter(|p| p.player_id == *recipient || sees(p.x, p.y))
            .map(player_snapshot)
            .collect();

        let projectile_snapshots: Vec<ProjectileSnapshot> = projectiles
            .iter()
            .filter(|p| p.owner_id == *recipient || sees(p.x, p.y))
            .map(|p| ProjectileSnapshot {
                id: p.id,
                kind: p.kind,
                x: p.x,
                y: p.y,
                vel_x: p.vel_x,
                vel_y: p.vel_y,
            })
            .collect();

        let filtered_events: Vec<GameEvent> = events
            .iter()
            .filter(|e| {
                if e.involves(recipient) || is_world_event(e) {
                    return true;
                }
                match e.position() {
                    Some((x, y)) => sees(x, y),
                    None => false,
                }
            })
            .cloned()
            .collect();

        Some(ServerMsg::Snapshot {
            tick,
            server_timestamp,
            players: player_snapshots,
            walls: wall_snapshots(walls),
            projectiles: projectile_snapshots,
            visible_region: viewer.vision.points.clone(),
            events: filtered_events,
        })
    }
}

/// Events every recipient receives regardless of sightline. Wall state is
/// world knowledge, and a kill feed is expected by every client.
fn is_world_event(event: &GameEvent) -> bool {
    matches!(
        event,
        GameEvent::WallDamaged { .. }
            | GameEvent::WallDestroyed { .. }
            | GameEvent::PlayerKilled { .. }
            | GameEvent::WorldReset
    )
}

fn player_snapshot(player: &PlayerState) -> PlayerSnapshot {
    let weapons = [
        WeaponSlot::Primary,
        WeaponSlot::Secondary,
        WeaponSlot::Support,
    ]
    .into_iter()
    .map(|slot| {
        let w = player.loadout.slot(slot);
        WeaponSnapshot {
            slot,
            ammo: w.ammo,
            cooldown: w.cooldown,
            heat: w.heat,
        }
    })
    .collect();

    PlayerSnapshot {
        player_id: player.player_id,
        x: player.x,
        y: player.y,
        rotation: player.rotation,
        vel_x: player.vel_x,
        vel_y: player.vel_y,
        health: player.health,
        armor: player.armor,
        team: player.team,
        movement_state: player.movement_state,
        alive: player.alive,
        last_input_seq: player.last_input_seq,
        weapons,
    }
}

/// Full wall state, including per-slice health
pub fn wall_snapshots(walls: &WallStore) -> Vec<WallSnapshot> {
    walls
        .walls()
        .iter()
        .map(|w| {
            let mut slice_health = [0.0; super::walls::SLICES_PER_WALL];
            let mut slice_destroyed = [false; super::walls::SLICES_PER_WALL];
            for (i, s) in w.slices.iter().enumerate() {
                slice_health[i] = s.health;
                slice_destroyed[i] = s.destroyed;
            }
            WallSnapshot {
                wall_id: w.id,
                x: w.x,
                y: w.y,
                width: w.width,
                height: w.height,
                material: w.material,
                slice_health,
                slice_destroyed,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::walls::{WallMaterial, WallSpec};
    use crate::net::protocol::Team;

    fn store(specs: &[WallSpec]) -> WallStore {
        let mut s = WallStore::from_layout(specs);
        s.capture_initial();
        s
    }

    fn occluder() -> WallSpec {
        WallSpec {
            x: 700.0,
            y: 300.0,
            width: 20.0,
            height: 400.0,
            material: WallMaterial::Concrete,
            initial_health: None,
        }
    }

    fn players(viewer_id: Uuid, hidden_id: Uuid, visible_id: Uuid) -> HashMap<Uuid, PlayerState> {
        let mut viewer = PlayerState::new(viewer_id, "viewer".into(), Team::Red, 500.0, 500.0);
        viewer.rotation = 0.0;
        // Behind the occluder
        let hidden = PlayerState::new(hidden_id, "hidden".into(), Team::Blue, 900.0, 500.0);
        // In front of it
        let visible = PlayerState::new(visible_id, "visible".into(), Team::Blue, 650.0, 500.0);

        let mut map = HashMap::new();
        map.insert(viewer_id, viewer);
        map.insert(hidden_id, hidden);
        map.insert(visible_id, visible);
        map
    }

    #[test]
    fn snapshot_pacing_follows_the_interval() {
        let mut builder = SnapshotBuilder::new(3);
        let due: Vec<bool> = (0..6).map(|_| builder.should_send()).collect();
        assert_eq!(due, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn occluded_player_excluded_visible_and_self_included() {
        let walls = store(&[occluder()]);
        let viewer_id = Uuid::new_v4();
        let hidden_id = Uuid::new_v4();
        let visible_id = Uuid::new_v4();
        let players = players(viewer_id, hidden_id, visible_id);

        let builder = SnapshotBuilder::new(3);
        let msg = builder
            .build_for_player(10, 0, &viewer_id, &players, &walls, &[], &[])
            .unwrap();

        let ServerMsg::Snapshot { players, walls, .. } = msg else {
            panic!("expected snapshot");
        };
        let ids: Vec<Uuid> = players.iter().map(|p| p.player_id).collect();
        assert!(ids.contains(&viewer_id));
        assert!(ids.contains(&visible_id));
        assert!(!ids.contains(&hidden_id));
        // Walls always ship in full
        assert_eq!(walls.len(), 1);
    }

    #[test]
    fn dead_recipient_spectates_everything() {
        let walls = store(&[occluder()]);
        let viewer_id = Uuid::new_v4();
        let hidden_id = Uuid::new_v4();
        let visible_id = Uuid::new_v4();
        let mut players = players(viewer_id, hidden_id, visible_id);
        players.get_mut(&viewer_id).unwrap().alive = false;

        let builder = SnapshotBuilder::new(3);
        let msg = builder
            .build_for_player(10, 0, &viewer_id, &players, &walls, &[], &[])
            .unwrap();

        let ServerMsg::Snapshot { players, .. } = msg else {
            panic!("expected snapshot");
        };
        assert_eq!(players.len(), 3);
    }

    #[test]
    fn events_filter_by_involvement_sightline_and_world_scope() {
        let walls = store(&[occluder()]);
        let viewer_id = Uuid::new_v4();
        let hidden_id = Uuid::new_v4();
        let visible_id = Uuid::new_v4();
        let players = players(viewer_id, hidden_id, visible_id);

        let events = vec![
            // Positional, behind the occluder: dropped
            GameEvent::WeaponFired {
                player_id: hidden_id,
                slot: WeaponSlot::Primary,
                x: 900.0,
                y: 500.0,
                direction: 0.0,
            },
            // Positional, in view: kept
            GameEvent::WeaponFired {
                player_id: visible_id,
                slot: WeaponSlot::Primary,
                x: 650.0,
                y: 500.0,
                direction: 0.0,
            },
            // Involves the recipient even though the source is hidden: kept
            GameEvent::PlayerDamaged {
                target_id: viewer_id,
                source_id: Some(hidden_id),
                damage: 10.0,
                health: 90.0,
            },
            // World scope: kept
            GameEvent::WorldReset,
        ];

        let builder = SnapshotBuilder::new(3);
        let msg = builder
            .build_for_player(10, 0, &viewer_id, &players, &walls, &[], &events)
            .unwrap();

        let ServerMsg::Snapshot { events, .. } = msg else {
            panic!("expected snapshot");
        };
        assert_eq!(events.len(), 3);
        assert!(!events.iter().any(|e| matches!(
            e,
            GameEvent::WeaponFired { player_id, .. } if *player_id == hidden_id
        )));
    }

    #[test]
    fn own_projectile_always_included() {
        let walls = store(&[occluder()]);
        let viewer_id = Uuid::new_v4();
        let hidden_id = Uuid::new_v4();
        let visible_id = Uuid::new_v4();
        let players = players(viewer_id, hidden_id, visible_id);

        // Thrown by the viewer but already behind the occluder
        let own = Projectile::grenade(viewer_id, 900.0, 450.0, 0.0, 2);
        // Someone else's, also occluded
        let other = Projectile::grenade(hidden_id, 900.0, 550.0, 0.0, 2);

        let builder = SnapshotBuilder::new(3);
        let msg = builder
            .build_for_player(10, 0, &viewer_id, &players, &walls, &[own, other], &[])
            .unwrap();

        let ServerMsg::Snapshot { projectiles, .. } = msg else {
            panic!("expected snapshot");
        };
        assert_eq!(projectiles.len(), 1);
    }
}
