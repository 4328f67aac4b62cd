//! Entity rows carried by the change-feed.
//!
//! Every row published by the server is a [`RemoteEntitySnapshot`]: an id,
//! the table (category) it lives in, a position and a small bag of
//! category-specific attributes. Snapshots are values; nothing on the client
//! mutates one after it has been received.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Opaque entity id, unique across every table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of tables published on the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Zombie,
    SpitterZombie,
    SpitterAoe,
    Player,
    /// Any table name this build does not know about.
    #[serde(other)]
    Unknown,
}

impl EntityCategory {
    /// Every category with a published table.
    pub const TABLES: [EntityCategory; 4] = [
        EntityCategory::Zombie,
        EntityCategory::SpitterZombie,
        EntityCategory::SpitterAoe,
        EntityCategory::Player,
    ];

    /// Table name used in subscriptions.
    pub fn table_name(self) -> &'static str {
        match self {
            EntityCategory::Zombie => "zombie",
            EntityCategory::SpitterZombie => "spitter_zombie",
            EntityCategory::SpitterAoe => "spitter_aoe",
            EntityCategory::Player => "player",
            EntityCategory::Unknown => "unknown",
        }
    }

    /// Resolves a table name; unrecognised names map to `Unknown`.
    pub fn from_table_name(name: &str) -> Self {
        Self::TABLES
            .into_iter()
            .find(|c| c.table_name() == name)
            .unwrap_or(EntityCategory::Unknown)
    }

    /// True for the zombie kinds that chase players.
    pub fn is_zombie(self) -> bool {
        matches!(self, EntityCategory::Zombie | EntityCategory::SpitterZombie)
    }
}

impl std::fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Category-specific columns. Fields that do not apply to a category are
/// left at their defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityAttrs {
    /// Player row the zombie is chasing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_player: Option<u64>,
    #[serde(default)]
    pub is_attacking: bool,
    /// When an area-effect marker disappears.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Display name (players only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One row of the remote dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntitySnapshot {
    pub id: EntityId,
    pub category: EntityCategory,
    pub position: Vec3,
    #[serde(default)]
    pub attrs: EntityAttrs,
}

impl RemoteEntitySnapshot {
    pub fn new(id: u64, category: EntityCategory, position: Vec3) -> Self {
        Self {
            id: EntityId(id),
            category,
            position,
            attrs: EntityAttrs::default(),
        }
    }

    /// Returns a copy at a new position, as the next version of the row.
    pub fn moved_to(&self, position: Vec3) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_roundtrip() {
        for c in EntityCategory::TABLES {
            assert_eq!(EntityCategory::from_table_name(c.table_name()), c);
        }
        assert_eq!(
            EntityCategory::from_table_name("boss_zombie"),
            EntityCategory::Unknown
        );
    }

    #[test]
    fn unrecognised_category_deserializes_to_unknown() {
        let json = r#"{"id":7,"category":"boss_zombie","position":{"x":1.0,"y":0.0,"z":2.0}}"#;
        let snap: RemoteEntitySnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.id, EntityId(7));
        assert_eq!(snap.category, EntityCategory::Unknown);
        assert_eq!(snap.attrs, EntityAttrs::default());
    }

    #[test]
    fn moved_to_keeps_identity() {
        let snap = RemoteEntitySnapshot::new(3, EntityCategory::Zombie, Vec3::ZERO);
        let next = snap.moved_to(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(next.id, snap.id);
        assert_eq!(next.category, snap.category);
        assert_eq!(next.position.x, 1.0);
    }
}
