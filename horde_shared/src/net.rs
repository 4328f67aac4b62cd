//! Networking primitives.
//!
//! Goals:
//! - Carry the change-feed (insert/update/delete rows) from server to client.
//! - Carry the handful of client requests (ready, subscribe, position).
//! - Keep serialization explicit and versionable.
//!
//! Frames are a big-endian `u32` length followed by a JSON payload. A
//! connection can be split into a [`FrameReader`] and a [`FrameWriter`] so
//! reads can run on their own task without ever being cancelled mid-frame.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};
use tracing::debug;

use crate::{
    entity::{EntityCategory, RemoteEntitySnapshot},
    math::Vec3,
};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Frames larger than this are rejected as corrupt.
pub const MAX_FRAME_LEN: usize = 1 << 20;

static NEXT_CLIENT_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u32);

impl ClientId {
    pub fn new_unique() -> Self {
        ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FeedMsg {
    // ─── Connection handshake ───
    Hello {
        protocol: u32,
        module: String,
    },
    Welcome {
        client_id: ClientId,
    },

    // ─── Session ───
    /// Client asks the server to create its player row.
    PlayerReady {
        name: String,
    },
    /// Client registers interest in a set of tables.
    Subscribe {
        tables: Vec<String>,
    },
    /// Every row that existed at subscribe time has been sent.
    SubscriptionApplied,

    // ─── Change-feed ───
    Insert(RemoteEntitySnapshot),
    Update {
        old: RemoteEntitySnapshot,
        new: RemoteEntitySnapshot,
    },
    Delete(RemoteEntitySnapshot),

    // ─── Gameplay ───
    /// Client -> server: local player position report.
    PlayerUpdatePosition {
        position: Vec3,
    },

    // ─── Disconnect ───
    Disconnect {
        reason: String,
    },
}

impl FeedMsg {
    /// Table the message's row belongs to, for change-feed messages.
    pub fn category(&self) -> Option<EntityCategory> {
        match self {
            FeedMsg::Insert(s) | FeedMsg::Delete(s) => Some(s.category),
            FeedMsg::Update { new, .. } => Some(new.category),
            _ => None,
        }
    }
}

/// Encodes a message into a length-prefixed frame.
pub fn encode_frame(msg: &FeedMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    Ok(buf.freeze())
}

/// Read half of a framed connection.
#[derive(Debug)]
pub struct FrameReader {
    half: OwnedReadHalf,
}

impl FrameReader {
    pub async fn recv(&mut self) -> anyhow::Result<FeedMsg> {
        let mut len_buf = [0u8; 4];
        self.half
            .read_exact(&mut len_buf)
            .await
            .context("tcp read len")?;
        let len = u32::from_be_bytes(len_buf) as usize;
        anyhow::ensure!(len <= MAX_FRAME_LEN, "frame too large: {len} bytes");
        let mut payload = vec![0u8; len];
        self.half
            .read_exact(&mut payload)
            .await
            .context("tcp read payload")?;
        decode_from_bytes(&payload)
    }
}

/// Write half of a framed connection.
#[derive(Debug)]
pub struct FrameWriter {
    half: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send(&mut self, msg: &FeedMsg) -> anyhow::Result<()> {
        let frame = encode_frame(msg)?;
        self.half.write_all(&frame).await.context("tcp write")?;
        Ok(())
    }
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    reader: FrameReader,
    writer: FrameWriter,
    peer: SocketAddr,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> anyhow::Result<Self> {
        let peer = stream.peer_addr().context("peer addr")?;
        stream.set_nodelay(true).context("set nodelay")?;
        let (read, write) = stream.into_split();
        Ok(Self {
            reader: FrameReader { half: read },
            writer: FrameWriter { half: write },
            peer,
        })
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Self::new(stream)
    }

    pub async fn send(&mut self, msg: &FeedMsg) -> anyhow::Result<()> {
        self.writer.send(msg).await
    }

    pub async fn recv(&mut self) -> anyhow::Result<FeedMsg> {
        self.reader.recv().await
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Splits into independently owned halves.
    pub fn split(self) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<ReliableConn> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        debug!(%addr, "Accepted TCP connection");
        ReliableConn::new(stream)
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Convenience codec helpers.
pub fn encode_to_bytes(msg: &FeedMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<FeedMsg> {
    serde_json::from_slice(b).context("deserialize")
}
