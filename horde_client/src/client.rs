//! Client implementation.
//!
//! The client maintains:
//! - A framed TCP connection to the feed server
//! - A reader task that only decodes frames and forwards them to the frame
//!   loop through a channel
//! - The change-feed listener and the entity view registry, both touched
//!   only from the frame loop
//! - Throttled local player position reports

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use horde_shared::{
    config::HordeConfig,
    math::Vec3,
    net::{ClientId, FeedMsg, FrameWriter, ReliableConn, PROTOCOL_VERSION},
    scene::SceneBackend,
};
use tokio::{
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, info};

use crate::{
    factory::ViewFactory,
    listener::{ChangeFeedListener, ConnectionState, FeedEvent},
    registry::EntityViewRegistry,
    report::PositionReporter,
};

/// How long the handshake may take before giving up.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Inbound messages buffered between frames.
const INBOUND_CAPACITY: usize = 1024;

/// High-level feed client.
pub struct FeedClient<S: SceneBackend> {
    pub client_id: ClientId,
    peer: SocketAddr,
    listener: ChangeFeedListener,
    registry: EntityViewRegistry<S>,
    reporter: PositionReporter,

    writer: FrameWriter,
    inbound: mpsc::Receiver<FeedMsg>,
    reader_task: JoinHandle<()>,

    subscription_applied: bool,
    frames: u64,
}

impl<S: SceneBackend> FeedClient<S> {
    /// Connects to the feed server, performs the handshake and subscribes to
    /// every table the view factory can render.
    pub async fn connect(cfg: &HordeConfig, scene: S) -> anyhow::Result<Self> {
        let server_addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let mut listener = ChangeFeedListener::new();
        listener.set_state(ConnectionState::Connecting);

        info!(server = %server_addr, module = %cfg.module, "Connecting to feed");
        let mut conn = ReliableConn::connect(server_addr).await?;
        conn.send(&FeedMsg::Hello {
            protocol: PROTOCOL_VERSION,
            module: cfg.module.clone(),
        })
        .await?;

        let welcome = time::timeout(HANDSHAKE_TIMEOUT, conn.recv())
            .await
            .context("handshake timed out")??;
        let client_id = match welcome {
            FeedMsg::Welcome { client_id } => client_id,
            other => anyhow::bail!("expected Welcome, got {other:?}"),
        };
        info!(client_id = ?client_id, "Connected to feed");

        let peer = conn.peer_addr();
        let (mut reader, mut writer) = conn.split();
        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let reader_task = tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Ok(msg) => {
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Feed reader stopped");
                        break;
                    }
                }
            }
        });

        listener.set_state(ConnectionState::Connected);
        writer
            .send(&FeedMsg::PlayerReady {
                name: cfg.player_name.clone(),
            })
            .await?;

        let factory = ViewFactory::with_defaults(cfg.interp_secs);
        let mut categories: Vec<_> = factory.categories().collect();
        categories.sort_by_key(|c| c.table_name());
        for category in categories {
            listener.subscribe(category)?;
        }
        writer
            .send(&FeedMsg::Subscribe {
                tables: listener.table_names(),
            })
            .await?;

        Ok(Self {
            client_id,
            peer,
            listener,
            registry: EntityViewRegistry::new(factory, scene),
            reporter: PositionReporter::from_config(cfg),
            writer,
            inbound,
            reader_task,
            subscription_applied: false,
            frames: 0,
        })
    }

    /// Network pump: handles every message received since the last call.
    ///
    /// Returns the number of feed events delivered to the registry.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            match self.inbound.try_recv() {
                Ok(msg) => {
                    if self.handle_msg(msg) {
                        delivered += 1;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.on_connection_lost("connection closed");
                    break;
                }
            }
        }
        delivered
    }

    /// Waits up to `timeout` for `cond` to hold, handling messages as they
    /// arrive. Returns whether the condition was met.
    pub async fn wait_until<F>(&mut self, timeout: Duration, cond: F) -> bool
    where
        F: Fn(&Self) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if cond(self) {
                return true;
            }
            match time::timeout_at(deadline, self.inbound.recv()).await {
                Ok(Some(msg)) => {
                    self.handle_msg(msg);
                }
                Ok(None) => {
                    self.on_connection_lost("connection closed");
                    return cond(self);
                }
                Err(_) => return cond(self),
            }
        }
    }

    /// Returns true if the message was a feed event that reached the registry.
    fn handle_msg(&mut self, msg: FeedMsg) -> bool {
        match msg {
            FeedMsg::SubscriptionApplied => {
                info!(views = self.registry.len(), "Initial data synchronization complete");
                self.subscription_applied = true;
                false
            }
            FeedMsg::Disconnect { reason } => {
                self.on_connection_lost(&reason);
                false
            }
            other => match FeedEvent::from_msg(other) {
                Some(event) => self.listener.dispatch(&event, &mut self.registry),
                None => false,
            },
        }
    }

    fn on_connection_lost(&mut self, reason: &str) {
        if self.listener.state() == ConnectionState::Disconnected {
            return;
        }
        info!(reason = %reason, "Disconnected from feed");
        self.listener.set_state(ConnectionState::Disconnected);
        self.registry.clear();
        self.subscription_applied = false;
    }

    /// Advances one rendered frame.
    ///
    /// Views glide and turn towards `local_position`; a position report goes
    /// out when the throttle allows it.
    pub async fn frame(&mut self, dt: f64, local_position: Vec3) -> anyhow::Result<()> {
        self.frames += 1;
        self.registry.tick(dt, Some(local_position));

        if !self.listener.is_active() {
            return Ok(());
        }
        if let Some(position) = self.reporter.poll(dt, local_position) {
            self.writer
                .send(&FeedMsg::PlayerUpdatePosition { position })
                .await?;
        }
        Ok(())
    }

    /// Tells the server we are leaving and drops every view.
    pub async fn disconnect(&mut self, reason: &str) -> anyhow::Result<()> {
        if self.listener.is_active() {
            self.writer
                .send(&FeedMsg::Disconnect {
                    reason: reason.to_string(),
                })
                .await?;
        }
        self.on_connection_lost(reason);
        self.reader_task.abort();
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.listener.is_active()
    }

    pub fn subscription_applied(&self) -> bool {
        self.subscription_applied
    }

    pub fn listener(&self) -> &ChangeFeedListener {
        &self.listener
    }

    pub fn registry(&self) -> &EntityViewRegistry<S> {
        &self.registry
    }

    pub fn server_peer(&self) -> SocketAddr {
        self.peer
    }

    /// Human-readable status lines.
    pub fn status(&self) -> Vec<String> {
        let stats = self.registry.stats();
        vec![
            format!("State: {:?}", self.listener.state()),
            format!("Client ID: {:?}", self.client_id),
            format!("Server: {}", self.peer),
            format!("Frames: {}", self.frames),
            format!(
                "Views: {} ({} moving)",
                self.registry.len(),
                self.registry.moving_count()
            ),
            format!(
                "Events: {} inserted, {} replaced, {} updated, {} deleted, {} stale, {} unsupported",
                stats.inserted,
                stats.replaced,
                stats.updated,
                stats.deleted,
                stats.stale,
                stats.unsupported
            ),
        ]
    }
}

impl<S: SceneBackend> Drop for FeedClient<S> {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}
