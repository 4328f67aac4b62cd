//! Helpers shared by the integration tests.

use std::time::Duration;

use horde_client::FeedClient;
use horde_server::{server::bind_ephemeral, FeedServer};
use horde_shared::{config::HordeConfig, scene::RecordingScene};
use tokio::time::Instant;

/// Installs a test-friendly tracing subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Binds an ephemeral server and connects one client to it.
pub async fn connected_pair(
    tick_hz: u32,
) -> anyhow::Result<(FeedServer, FeedClient<RecordingScene>, HordeConfig)> {
    let (mut server, cfg) = bind_ephemeral(tick_hz).await?;
    let (accepted, client) = tokio::join!(
        server.accept_one(),
        FeedClient::connect(&cfg, RecordingScene::new())
    );
    accepted?;
    Ok((server, client?, cfg))
}

/// Alternates server steps and client pumps until `cond` holds or `timeout`
/// passes. Returns whether the condition was met.
pub async fn step_until<F>(
    server: &mut FeedServer,
    client: &mut FeedClient<RecordingScene>,
    dt: f64,
    timeout: Duration,
    cond: F,
) -> anyhow::Result<bool>
where
    F: Fn(&FeedServer, &FeedClient<RecordingScene>) -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        server.step(dt).await?;
        tokio::time::sleep(Duration::from_millis(5)).await;
        client.pump();
        if cond(server, client) {
            return Ok(true);
        }
    }
    Ok(cond(server, client))
}
