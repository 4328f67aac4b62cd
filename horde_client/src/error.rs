//! Synchronizer anomalies.
//!
//! None of these stop the frame loop. The registry and listener recover from
//! each one locally and log it; the type exists so callers and tests can
//! name what happened.

use horde_shared::entity::{EntityCategory, EntityId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Update or delete for an id with no live view.
    #[error("no live view for entity {0}")]
    StaleReference(EntityId),
    /// Insert for an id that already has a view; the new view replaces it.
    #[error("entity {0} inserted twice")]
    DuplicateInsert(EntityId),
    /// No view construction is registered for the category.
    #[error("no view for category {0}")]
    UnsupportedCategory(EntityCategory),
    /// The feed connection is not active.
    #[error("feed transport is not active")]
    TransportInactive,
}
