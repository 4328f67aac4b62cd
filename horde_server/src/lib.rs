//! `horde_server`
//!
//! Server-side systems:
//! - Fixed timestep world simulation (spawning, chasing, spitter attacks)
//! - One row table published as an insert/update/delete change-feed
//! - Per-client table subscriptions
//! - Player rows driven by client position reports
//!
//! Networking model:
//! - TCP with length-prefixed JSON frames for everything

pub mod server;
pub mod world;

pub use server::FeedServer;
pub use world::HordeWorld;
