//! Scene abstraction.
//!
//! This crate intentionally does not depend on a rendering engine.
//! A scene implementation only has to accept nodes keyed by entity id and
//! move them around.

use std::collections::HashMap;

use crate::{entity::EntityId, math::Vec3};

/// What the scene needs to know to show a new node.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub id: EntityId,
    /// Node name, e.g. `Zombie_5`.
    pub name: String,
    /// Visual asset key.
    pub model: String,
    pub position: Vec3,
}

/// A minimal scene-graph API.
pub trait SceneBackend {
    fn attach(&mut self, node: &SceneNode);
    fn detach(&mut self, id: EntityId);
    fn set_position(&mut self, id: EntityId, position: Vec3);
    /// Yaw in radians around +Y. Scenes without orientation can ignore it.
    fn set_facing(&mut self, _id: EntityId, _yaw: f64) {}
}

/// A no-op scene useful for headless runs.
#[derive(Debug, Default)]
pub struct NullScene;

impl SceneBackend for NullScene {
    fn attach(&mut self, _node: &SceneNode) {}
    fn detach(&mut self, _id: EntityId) {}
    fn set_position(&mut self, _id: EntityId, _position: Vec3) {}
}

/// One call made against a [`RecordingScene`].
#[derive(Debug, Clone, PartialEq)]
pub enum SceneCall {
    Attach(SceneNode),
    Detach(EntityId),
    SetPosition(EntityId, Vec3),
    SetFacing(EntityId, f64),
}

/// Scene that keeps its nodes in memory and records every call.
#[derive(Debug, Default)]
pub struct RecordingScene {
    nodes: HashMap<EntityId, SceneNode>,
    calls: Vec<SceneCall>,
}

impl RecordingScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes currently attached.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: EntityId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn calls(&self) -> &[SceneCall] {
        &self.calls
    }

    /// Drops the call log, keeping the attached nodes.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl SceneBackend for RecordingScene {
    fn attach(&mut self, node: &SceneNode) {
        self.nodes.insert(node.id, node.clone());
        self.calls.push(SceneCall::Attach(node.clone()));
    }

    fn detach(&mut self, id: EntityId) {
        self.nodes.remove(&id);
        self.calls.push(SceneCall::Detach(id));
    }

    fn set_position(&mut self, id: EntityId, position: Vec3) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.position = position;
        }
        self.calls.push(SceneCall::SetPosition(id, position));
    }

    fn set_facing(&mut self, id: EntityId, yaw: f64) {
        self.calls.push(SceneCall::SetFacing(id, yaw));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_scene_tracks_nodes() {
        let mut scene = RecordingScene::new();
        let node = SceneNode {
            id: EntityId(1),
            name: "Zombie_1".into(),
            model: "zombie".into(),
            position: Vec3::ZERO,
        };
        scene.attach(&node);
        scene.set_position(EntityId(1), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(scene.node(EntityId(1)).unwrap().position.x, 2.0);

        scene.detach(EntityId(1));
        assert_eq!(scene.node_count(), 0);
        assert_eq!(scene.calls().len(), 3);
    }
}
