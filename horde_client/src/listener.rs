//! Change-feed listener.
//!
//! Turns table-specific feed traffic into one uniform callback contract.
//! The listener holds no entity state: it only knows which tables it was
//! subscribed to and whether the connection behind it is live.

use std::collections::HashSet;

use horde_shared::{
    entity::{EntityCategory, RemoteEntitySnapshot},
    net::FeedMsg,
};
use tracing::{debug, info};

use crate::error::SyncError;

/// Lifecycle of the feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// One normalized change to the remote dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Insert(RemoteEntitySnapshot),
    Update {
        old: RemoteEntitySnapshot,
        new: RemoteEntitySnapshot,
    },
    Delete(RemoteEntitySnapshot),
}

impl FeedEvent {
    /// Extracts the change-feed part of a wire message.
    pub fn from_msg(msg: FeedMsg) -> Option<Self> {
        match msg {
            FeedMsg::Insert(s) => Some(FeedEvent::Insert(s)),
            FeedMsg::Update { old, new } => Some(FeedEvent::Update { old, new }),
            FeedMsg::Delete(s) => Some(FeedEvent::Delete(s)),
            _ => None,
        }
    }

    pub fn category(&self) -> EntityCategory {
        match self {
            FeedEvent::Insert(s) | FeedEvent::Delete(s) => s.category,
            FeedEvent::Update { new, .. } => new.category,
        }
    }
}

/// Receiver of normalized feed callbacks.
pub trait FeedHandler {
    fn on_insert(&mut self, snapshot: &RemoteEntitySnapshot);
    fn on_update(&mut self, old: &RemoteEntitySnapshot, new: &RemoteEntitySnapshot);
    fn on_delete(&mut self, snapshot: &RemoteEntitySnapshot);
}

/// Subscription bookkeeping and dispatch for the change-feed.
#[derive(Debug)]
pub struct ChangeFeedListener {
    state: ConnectionState,
    subscribed: HashSet<EntityCategory>,
}

impl Default for ChangeFeedListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeedListener {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            subscribed: HashSet::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Moves the connection lifecycle. Dropping to `Disconnected` forgets
    /// every subscription; they are re-registered after reconnecting.
    pub fn set_state(&mut self, state: ConnectionState) {
        if state != self.state {
            info!(from = ?self.state, to = ?state, "Feed connection state");
        }
        if state == ConnectionState::Disconnected {
            self.subscribed.clear();
        }
        self.state = state;
    }

    /// True once the connection is established.
    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Registers interest in a category's table.
    pub fn subscribe(&mut self, category: EntityCategory) -> Result<(), SyncError> {
        if !self.is_active() {
            return Err(SyncError::TransportInactive);
        }
        if self.subscribed.insert(category) {
            debug!(table = %category, "Subscribed");
        }
        Ok(())
    }

    pub fn is_subscribed(&self, category: EntityCategory) -> bool {
        self.subscribed.contains(&category)
    }

    /// Table names for a subscribe request, in a stable order.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .subscribed
            .iter()
            .map(|c| c.table_name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Invokes the matching callback on `handler`.
    ///
    /// Returns false, without calling anything, when the connection is not
    /// active or the event's table was never subscribed. Rows from tables
    /// this build cannot name are always passed on, so the handler reports
    /// them as unsupported.
    pub fn dispatch<H: FeedHandler + ?Sized>(&self, event: &FeedEvent, handler: &mut H) -> bool {
        if !self.is_active() {
            debug!(table = %event.category(), "Dropping event, feed inactive");
            return false;
        }
        let category = event.category();
        if category != EntityCategory::Unknown && !self.is_subscribed(category) {
            debug!(table = %category, "Dropping event for unsubscribed table");
            return false;
        }
        match event {
            FeedEvent::Insert(s) => handler.on_insert(s),
            FeedEvent::Update { old, new } => handler.on_update(old, new),
            FeedEvent::Delete(s) => handler.on_delete(s),
        }
        true
    }
}
