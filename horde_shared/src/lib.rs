//! `horde_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - Deterministic and modular where practical.
//! - Clear separation of concerns (entity rows, net, math, scene, config).
//! - Traits for abstraction and dependency injection.
//! - No `unsafe`.

pub mod config;
pub mod entity;
pub mod math;
pub mod net;
pub mod scene;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::entity::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::scene::*;
}
