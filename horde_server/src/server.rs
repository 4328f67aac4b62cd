//! Server implementation.
//!
//! An authoritative feed server with a fixed world tick. It supports:
//! - Client handshake and per-client table subscriptions
//! - Initial row delivery followed by `SubscriptionApplied`
//! - Player rows driven by client position reports
//! - Broadcasting every row change to the clients subscribed to its table
//!
//! Each client gets a reader task that forwards decoded messages into one
//! shared channel; all state is mutated from `step` only.

use anyhow::Context;
use chrono::Utc;
use horde_shared::{
    config::HordeConfig,
    entity::{EntityCategory, EntityId},
    net::{ClientId, FeedMsg, FrameWriter, ReliableConn, ReliableListener, PROTOCOL_VERSION},
};
use rand::{rngs::StdRng, SeedableRng};
use std::{
    collections::{HashMap, HashSet},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};
use tokio::{
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::world::HordeWorld;

/// How long a new connection may take to say hello.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Something a client reader task observed.
#[derive(Debug)]
enum Inbound {
    Msg(ClientId, FeedMsg),
    Closed(ClientId),
}

/// Connected client state.
struct ClientState {
    writer: FrameWriter,
    peer: SocketAddr,
    tables: HashSet<EntityCategory>,
    player: Option<EntityId>,
    reader_task: JoinHandle<()>,
}

/// Feed server.
pub struct FeedServer {
    pub cfg: HordeConfig,
    world: HordeWorld,
    clients: HashMap<ClientId, ClientState>,

    tcp: ReliableListener,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: mpsc::Receiver<Inbound>,

    rng: StdRng,
    tick: u64,
}

impl FeedServer {
    /// Binds the listener at `cfg.server_addr`.
    pub async fn bind(cfg: HordeConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let tcp = ReliableListener::bind(addr).await?;
        Ok(Self::with_listener(cfg, tcp, StdRng::from_entropy()))
    }

    fn with_listener(cfg: HordeConfig, tcp: ReliableListener, rng: StdRng) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(1024);
        Self {
            cfg,
            world: HordeWorld::new(Utc::now()),
            clients: HashMap::new(),
            tcp,
            inbound_tx,
            inbound_rx,
            rng,
            tick: 0,
        }
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn world(&self) -> &HordeWorld {
        &self.world
    }

    /// Direct world access, e.g. for seeding rows.
    pub fn world_mut(&mut self) -> &mut HordeWorld {
        &mut self.world
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Accepts exactly one client and completes its handshake.
    pub async fn accept_one(&mut self) -> anyhow::Result<ClientId> {
        let conn = self.tcp.accept().await?;
        self.handle_new_connection(conn).await
    }

    /// Accepts a client with timeout (non-blocking).
    pub async fn try_accept(&mut self, timeout: Duration) -> anyhow::Result<Option<ClientId>> {
        match tokio::time::timeout(timeout, self.tcp.accept()).await {
            Ok(Ok(conn)) => self.handle_new_connection(conn).await.map(Some),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None), // Timeout
        }
    }

    async fn handle_new_connection(&mut self, mut conn: ReliableConn) -> anyhow::Result<ClientId> {
        let peer = conn.peer_addr();
        let hello = tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv())
            .await
            .context("handshake timed out")??;
        match hello {
            FeedMsg::Hello { protocol, module } if protocol == PROTOCOL_VERSION => {
                if module != self.cfg.module {
                    warn!(%peer, requested = %module, serving = %self.cfg.module, "Module mismatch");
                }
                let id = ClientId::new_unique();
                conn.send(&FeedMsg::Welcome { client_id: id }).await?;

                let (mut reader, writer) = conn.split();
                let tx = self.inbound_tx.clone();
                let reader_task = tokio::spawn(async move {
                    loop {
                        match reader.recv().await {
                            Ok(msg) => {
                                if tx.send(Inbound::Msg(id, msg)).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                debug!(client_id = ?id, error = %e, "Client reader stopped");
                                let _ = tx.send(Inbound::Closed(id)).await;
                                return;
                            }
                        }
                    }
                });

                self.clients.insert(
                    id,
                    ClientState {
                        writer,
                        peer,
                        tables: HashSet::new(),
                        player: None,
                        reader_task,
                    },
                );
                info!(client_id = ?id, %peer, "Client connected");
                Ok(id)
            }
            FeedMsg::Hello { protocol, .. } => {
                let reason = format!("protocol {protocol} not supported");
                conn.send(&FeedMsg::Disconnect {
                    reason: reason.clone(),
                })
                .await?;
                anyhow::bail!(reason)
            }
            other => anyhow::bail!("unexpected handshake msg: {other:?}"),
        }
    }

    /// Runs the server for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f64(1.0 / self.cfg.tick_hz.max(1) as f64);
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step(dt.as_secs_f64()).await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Serves forever: accepts clients between ticks.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f64(1.0 / self.cfg.tick_hz.max(1) as f64);
        let mut next = Instant::now() + dt;
        loop {
            let wait = next.saturating_duration_since(Instant::now());
            if let Err(e) = self.try_accept(wait).await {
                warn!(error = %e, "Rejected connection");
            }
            if Instant::now() >= next {
                next += dt;
                self.step(dt.as_secs_f64()).await?;
            }
        }
    }

    /// Executes one fixed simulation step.
    pub async fn step(&mut self, dt_sec: f64) -> anyhow::Result<()> {
        self.process_inbound().await;
        self.world.step(dt_sec, &mut self.rng);
        self.flush_changes().await;
        self.tick += 1;
        if self.tick % 100 == 0 {
            debug!(tick = self.tick, rows = self.world.len(), clients = self.clients.len(), "World tick");
        }
        Ok(())
    }

    async fn process_inbound(&mut self) {
        loop {
            match self.inbound_rx.try_recv() {
                Ok(Inbound::Msg(id, msg)) => self.handle_client_message(id, msg).await,
                Ok(Inbound::Closed(id)) => self.drop_client(id, "connection closed"),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
            // Publish before the next message so a later subscribe never
            // sees a row both in its initial set and as a pending insert.
            self.flush_changes().await;
        }
    }

    async fn handle_client_message(&mut self, id: ClientId, msg: FeedMsg) {
        match msg {
            FeedMsg::PlayerReady { name } => {
                let Some(client) = self.clients.get(&id) else {
                    return;
                };
                if client.player.is_some() {
                    debug!(client_id = ?id, "Duplicate PlayerReady");
                    return;
                }
                let player = self.world.add_player(&name);
                if let Some(client) = self.clients.get_mut(&id) {
                    client.player = Some(player);
                }
            }
            FeedMsg::Subscribe { tables } => {
                self.flush_changes().await;
                if let Err(e) = self.subscribe(id, &tables).await {
                    warn!(client_id = ?id, error = %e, "Subscription failed");
                    self.drop_client(id, "send failed");
                }
            }
            FeedMsg::PlayerUpdatePosition { position } => {
                if let Some(player) = self.clients.get(&id).and_then(|c| c.player) {
                    self.world.move_player(player, position);
                }
            }
            FeedMsg::Disconnect { reason } => self.drop_client(id, &reason),
            other => debug!(client_id = ?id, ?other, "Unexpected client message"),
        }
    }

    /// Records the client's tables and sends every existing row in them.
    async fn subscribe(&mut self, id: ClientId, tables: &[String]) -> anyhow::Result<()> {
        let Some(client) = self.clients.get_mut(&id) else {
            return Ok(());
        };
        client.tables = tables
            .iter()
            .map(|t| EntityCategory::from_table_name(t))
            .filter(|c| *c != EntityCategory::Unknown)
            .collect();

        let mut sent = 0usize;
        for row in self.world.rows_in(&client.tables) {
            client.writer.send(&FeedMsg::Insert(row.clone())).await?;
            sent += 1;
        }
        client.writer.send(&FeedMsg::SubscriptionApplied).await?;
        info!(client_id = ?id, tables = ?tables, rows = sent, "Subscription applied");
        Ok(())
    }

    /// Broadcasts pending changes to every client subscribed to their table.
    async fn flush_changes(&mut self) {
        let changes = self.world.drain_changes();
        if changes.is_empty() {
            return;
        }

        let mut failed = Vec::new();
        for (id, client) in self.clients.iter_mut() {
            for change in &changes {
                let Some(category) = change.category() else {
                    continue;
                };
                if !client.tables.contains(&category) {
                    continue;
                }
                if let Err(e) = client.writer.send(change).await {
                    warn!(client_id = ?id, peer = %client.peer, error = %e, "Send failed");
                    failed.push(*id);
                    break;
                }
            }
        }
        for id in failed {
            self.drop_client(id, "send failed");
        }
    }

    fn drop_client(&mut self, id: ClientId, reason: &str) {
        let Some(client) = self.clients.remove(&id) else {
            return;
        };
        client.reader_task.abort();
        if let Some(player) = client.player {
            self.world.remove_player(player);
        }
        info!(client_id = ?id, reason = %reason, "Client disconnected");
    }
}

impl Drop for FeedServer {
    fn drop(&mut self) {
        for client in self.clients.values() {
            client.reader_task.abort();
        }
    }
}

/// Helper for tests: bind to an ephemeral port with the spawner off and a
/// seeded random source.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(FeedServer, HordeConfig)> {
    let mut cfg = HordeConfig {
        server_addr: format!("{}:{}", IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        tick_hz,
        ..Default::default()
    };

    let tcp = ReliableListener::bind(cfg.server_addr.parse()?).await?;
    cfg.server_addr = tcp.local_addr()?.to_string();

    let mut server = FeedServer::with_listener(cfg.clone(), tcp, StdRng::seed_from_u64(0));
    server.world.set_spawning(false);
    Ok((server, cfg))
}
