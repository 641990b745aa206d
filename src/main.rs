//! Arena Server - Authoritative top-down shooter simulation
//!
//! The binary boots one default arena and runs its fixed-step tick loop
//! until shutdown. Transport (sockets, framing) lives outside this core;
//! everything here speaks typed messages over channels.

mod config;
mod game;
mod net;
mod util;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::Config;
use crate::game::arena::{ArenaRegistry, GameArena};
use crate::game::walls::{WallMaterial, WallSpec};
use crate::util::time::{init_server_time, uptime_secs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Arena Server");

    let registry = Arc::new(ArenaRegistry::new());

    // Boot the default arena
    let arena_id = Uuid::new_v4();
    let seed = rand::random::<u64>();
    let (arena, handle) = GameArena::new(arena_id, seed, &default_layout(&config), &config);
    registry.insert(handle);

    info!(arena_id = %arena_id, seed, "Default arena created");

    let arena_task = tokio::spawn(arena.run());

    shutdown_signal().await;

    registry.remove(&arena_id);
    arena_task.abort();

    info!(uptime_secs = uptime_secs(), "Server shutdown complete");
    Ok(())
}

/// Symmetric default map: a center block flanked by two cover walls per side
fn default_layout(config: &Config) -> Vec<WallSpec> {
    let (w, h) = (config.world_width, config.world_height);
    let wall = |x: f32, y: f32, width: f32, height: f32, material: WallMaterial| WallSpec {
        x,
        y,
        width,
        height,
        material,
        initial_health: None,
    };

    vec![
        // Center block
        wall(w / 2.0 - 20.0, h / 2.0 - 125.0, 40.0, 250.0, WallMaterial::Concrete),
        // Mid-field cover
        wall(w * 0.3 - 75.0, h * 0.3, 150.0, 30.0, WallMaterial::Brick),
        wall(w * 0.7 - 75.0, h * 0.7 - 30.0, 150.0, 30.0, WallMaterial::Brick),
        // Spawn-side cover, soft enough to chew through
        wall(w * 0.15, h / 2.0 - 90.0, 30.0, 180.0, WallMaterial::Wood),
        wall(w * 0.85 - 30.0, h / 2.0 - 90.0, 30.0, 180.0, WallMaterial::Wood),
        // Hard corners
        wall(w * 0.3, h * 0.75, 120.0, 30.0, WallMaterial::Metal),
        wall(w * 0.7 - 120.0, h * 0.25 - 30.0, 120.0, 30.0, WallMaterial::Metal),
    ]
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
