//! Standalone headless client binary.
//!
//! Usage:
//!   cargo run -p horde_client -- [--addr 127.0.0.1:40000] [--config horde.json]
//!                                [--name Player] [--frames 600]
//!
//! The client connects to the feed server, subscribes to the zombie tables,
//! walks the local player in a circle and keeps a view per remote entity in a
//! scene-less registry. Status is logged once per second.

use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use horde_client::FeedClient;
use horde_shared::{config::HordeConfig, math::Vec3, scene::NullScene};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::info;

/// Radius of the local player's walk around the origin.
const WALK_RADIUS: f64 = 8.0;
/// Angular speed of the walk, radians per second.
const WALK_SPEED: f64 = 0.5;

struct Args {
    cfg: HordeConfig,
    frames: Option<u64>,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();

    // A config file is the base; flags override it.
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => HordeConfig::load(Path::new(&args[i + 1]))?,
        _ => HordeConfig::default(),
    };
    let mut frames = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--frames" if i + 1 < args.len() => {
                frames = Some(args[i + 1].parse().context("parse --frames")?);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(Args { cfg, frames })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let Args { cfg, frames } = parse_args()?;
    info!(server = %cfg.server_addr, name = %cfg.player_name, "Starting client");

    let mut client = FeedClient::connect(&cfg, NullScene)
        .await
        .context("connect")?;

    let frame_dt = Duration::from_secs_f64(1.0 / cfg.frame_hz.max(1) as f64);
    let mut ticker = time::interval(frame_dt);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last = Instant::now();
    let mut walked = 0.0_f64;
    let mut frame: u64 = 0;

    loop {
        ticker.tick().await;
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f64();
        last = now;

        client.pump();
        if !client.is_active() {
            info!("Feed connection lost");
            break;
        }

        walked += dt * WALK_SPEED;
        let local = Vec3::new(WALK_RADIUS * walked.cos(), 0.0, WALK_RADIUS * walked.sin());
        client.frame(dt, local).await?;

        frame += 1;
        if frame % u64::from(cfg.frame_hz.max(1)) == 0 {
            for line in client.status() {
                info!("{line}");
            }
        }
        if frames.is_some_and(|n| frame >= n) {
            client.disconnect("client exiting").await?;
            break;
        }
    }

    Ok(())
}
