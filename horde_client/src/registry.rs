//! Entity view registry.
//!
//! Owns the only map from remote entity id to local view. A view exists in
//! the scene exactly while its id is in the map:
//! - insert: build via [`ViewFactory`], attach, store (replacing a duplicate)
//! - update: retarget the stored view, or ignore an unknown id
//! - delete: remove and detach, or ignore an unknown id
//!
//! Feed order across tables is not guaranteed, so unknown ids are expected
//! and never treated as errors.

use std::collections::HashMap;

use horde_shared::{
    entity::{EntityId, RemoteEntitySnapshot},
    math::{yaw_towards, Vec3},
    scene::SceneBackend,
};
use tracing::{debug, warn};

use crate::{
    error::SyncError,
    factory::{ViewFactory, ViewHandle, ViewTraits},
    listener::FeedHandler,
};

/// Running counters of how feed events were resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub inserted: u64,
    pub replaced: u64,
    pub updated: u64,
    pub deleted: u64,
    pub stale: u64,
    pub unsupported: u64,
}

/// Map of live views plus the scene they are attached to.
pub struct EntityViewRegistry<S: SceneBackend> {
    views: HashMap<EntityId, ViewHandle>,
    factory: ViewFactory,
    scene: S,
    stats: SyncStats,
}

impl<S: SceneBackend> EntityViewRegistry<S> {
    pub fn new(factory: ViewFactory, scene: S) -> Self {
        Self {
            views: HashMap::new(),
            factory,
            scene,
            stats: SyncStats::default(),
        }
    }

    /// Creates and attaches the view for a newly inserted row.
    ///
    /// The latest insert for an id always wins: an existing view is
    /// detached even when the new row cannot be rendered.
    pub fn handle_insert(&mut self, snapshot: &RemoteEntitySnapshot) {
        let created = self.factory.create(snapshot.category, snapshot);

        if let Some(old) = self.views.remove(&snapshot.id) {
            warn!(
                id = %snapshot.id,
                error = %SyncError::DuplicateInsert(snapshot.id),
                replaced = %old.category(),
                "Replacing existing view"
            );
            self.scene.detach(old.id());
            self.stats.replaced += 1;
        }

        let view = match created {
            Ok(view) => view,
            Err(e) => {
                warn!(id = %snapshot.id, error = %e, "Skipping entity");
                self.stats.unsupported += 1;
                return;
            }
        };

        self.scene.attach(&view.scene_node());
        debug!(id = %snapshot.id, name = %view.node_name(), position = %snapshot.position, "View attached");
        self.views.insert(snapshot.id, view);
        self.stats.inserted += 1;
    }

    /// Retargets the view of `old.id` towards `new`.
    pub fn handle_update(&mut self, old: &RemoteEntitySnapshot, new: &RemoteEntitySnapshot) {
        let Some(view) = self.views.get_mut(&old.id) else {
            debug!(error = %SyncError::StaleReference(old.id), "Ignoring update");
            self.stats.stale += 1;
            return;
        };

        view.apply(new);
        if view.motion().is_none() {
            self.scene.set_position(view.id(), view.current_position());
        }
        self.stats.updated += 1;
    }

    /// Removes and detaches the view of `snapshot.id`.
    pub fn handle_delete(&mut self, snapshot: &RemoteEntitySnapshot) {
        match self.views.remove(&snapshot.id) {
            Some(view) => {
                self.scene.detach(view.id());
                debug!(id = %snapshot.id, name = %view.node_name(), "View detached");
                self.stats.deleted += 1;
            }
            None => {
                debug!(error = %SyncError::StaleReference(snapshot.id), "Ignoring delete");
                self.stats.stale += 1;
            }
        }
    }

    /// Read-only access for cross-entity queries.
    pub fn lookup(&self, id: EntityId) -> Option<&ViewHandle> {
        self.views.get(&id)
    }

    /// Advances every view by one frame.
    ///
    /// Moving views push their new position to the scene. Views that face
    /// the focus turn towards it on their own horizontal plane.
    pub fn tick(&mut self, dt: f64, focus: Option<Vec3>) {
        for view in self.views.values_mut() {
            if let Some(position) = view.advance(dt) {
                self.scene.set_position(view.id(), position);
            }

            if !view.traits().contains(ViewTraits::FACES_FOCUS) {
                continue;
            }
            let Some(focus) = focus else {
                continue;
            };
            let here = view.current_position();
            if let Some(yaw) = yaw_towards(here, focus.with_y(here.y)) {
                if yaw != view.yaw() {
                    view.set_yaw(yaw);
                    self.scene.set_facing(view.id(), yaw);
                }
            }
        }
    }

    /// Detaches and drops every view.
    pub fn clear(&mut self) {
        for (id, _) in self.views.drain() {
            self.scene.detach(id);
        }
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ViewHandle> {
        self.views.values()
    }

    /// Number of views currently gliding.
    pub fn moving_count(&self) -> usize {
        self.views.values().filter(|v| v.is_moving()).count()
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }
}

impl<S: SceneBackend> FeedHandler for EntityViewRegistry<S> {
    fn on_insert(&mut self, snapshot: &RemoteEntitySnapshot) {
        self.handle_insert(snapshot);
    }

    fn on_update(&mut self, old: &RemoteEntitySnapshot, new: &RemoteEntitySnapshot) {
        self.handle_update(old, new);
    }

    fn on_delete(&mut self, snapshot: &RemoteEntitySnapshot) {
        self.handle_delete(snapshot);
    }
}
