//! `horde_client`
//!
//! Client-side systems:
//! - Change-feed listener (connection state, subscriptions, dispatch)
//! - Entity view registry (one view per live remote entity)
//! - View factory (per-category view construction)
//! - Motion interpolation for remote entity positions
//! - Throttled local position reports
//! - Feed connection and frame loop wiring

pub mod client;
pub mod error;
pub mod factory;
pub mod interp;
pub mod listener;
pub mod registry;
pub mod report;

pub use client::FeedClient;
pub use error::SyncError;
pub use registry::EntityViewRegistry;
