//! View construction.
//!
//! Maps each entity category to how its view is built. Adding a category
//! means registering one more [`ViewTemplate`]; the registry never matches
//! on categories itself.

use std::collections::HashMap;

use horde_shared::{
    entity::{EntityAttrs, EntityCategory, EntityId, RemoteEntitySnapshot},
    math::Vec3,
    scene::SceneNode,
};

use crate::{error::SyncError, interp::MotionInterpolator};

bitflags::bitflags! {
    /// Behaviour switches for a view.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ViewTraits: u32 {
        const NONE = 0;
        const INTERPOLATED = 1 << 0;  // Owns a MotionInterpolator
        const FACES_FOCUS = 1 << 1;   // Turns towards the local player
    }
}

impl Default for ViewTraits {
    fn default() -> Self {
        Self::NONE
    }
}

/// Construction parameters for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewTemplate {
    /// Node names are `<prefix>_<id>`.
    pub node_prefix: String,
    /// Visual asset key handed to the scene.
    pub model: String,
    pub traits: ViewTraits,
}

impl ViewTemplate {
    pub fn new(node_prefix: &str, model: &str, traits: ViewTraits) -> Self {
        Self {
            node_prefix: node_prefix.to_string(),
            model: model.to_string(),
            traits,
        }
    }
}

/// Local, visible instance of one remote entity.
#[derive(Debug, Clone)]
pub struct ViewHandle {
    id: EntityId,
    category: EntityCategory,
    node_name: String,
    model: String,
    traits: ViewTraits,
    current_position: Vec3,
    yaw: f64,
    motion: Option<MotionInterpolator>,
    attrs: EntityAttrs,
}

impl ViewHandle {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn category(&self) -> EntityCategory {
        self.category
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn traits(&self) -> ViewTraits {
        self.traits
    }

    /// Position as last rendered.
    pub fn current_position(&self) -> Vec3 {
        self.current_position
    }

    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    pub fn motion(&self) -> Option<&MotionInterpolator> {
        self.motion.as_ref()
    }

    /// Latest category-specific columns.
    pub fn attrs(&self) -> &EntityAttrs {
        &self.attrs
    }

    pub fn is_moving(&self) -> bool {
        self.motion.as_ref().is_some_and(|m| m.is_moving())
    }

    /// Scene description for attaching this view.
    pub fn scene_node(&self) -> SceneNode {
        SceneNode {
            id: self.id,
            name: self.node_name.clone(),
            model: self.model.clone(),
            position: self.current_position,
        }
    }

    /// Points the view at a new remote state. Views without an interpolator
    /// jump straight there.
    pub(crate) fn apply(&mut self, snapshot: &RemoteEntitySnapshot) {
        match self.motion.as_mut() {
            Some(m) => m.retarget(snapshot.position),
            None => self.current_position = snapshot.position,
        }
        self.attrs = snapshot.attrs.clone();
    }

    /// Advances motion; returns the new position if the view moved.
    pub(crate) fn advance(&mut self, dt: f64) -> Option<Vec3> {
        let m = self.motion.as_mut()?;
        if !m.is_moving() {
            return None;
        }
        self.current_position = m.advance(dt);
        Some(self.current_position)
    }

    pub(crate) fn set_yaw(&mut self, yaw: f64) {
        self.yaw = yaw;
    }
}

/// Category-keyed view constructor.
#[derive(Debug, Clone)]
pub struct ViewFactory {
    templates: HashMap<EntityCategory, ViewTemplate>,
    interp_duration: f64,
}

impl ViewFactory {
    /// Creates a factory with no categories registered.
    pub fn empty(interp_duration: f64) -> Self {
        Self {
            templates: HashMap::new(),
            interp_duration,
        }
    }

    /// Creates a factory for the categories the game renders.
    pub fn with_defaults(interp_duration: f64) -> Self {
        let mut factory = Self::empty(interp_duration);
        let walker = ViewTraits::INTERPOLATED | ViewTraits::FACES_FOCUS;
        factory.register(
            EntityCategory::Zombie,
            ViewTemplate::new("Zombie", "zombie", walker),
        );
        factory.register(
            EntityCategory::SpitterZombie,
            ViewTemplate::new("SpitterZombie", "spitter_zombie", walker),
        );
        factory.register(
            EntityCategory::SpitterAoe,
            ViewTemplate::new("SpitterAoe", "spitter_aoe", ViewTraits::NONE),
        );
        factory
    }

    /// Registers or replaces the construction for a category.
    pub fn register(&mut self, category: EntityCategory, template: ViewTemplate) {
        self.templates.insert(category, template);
    }

    pub fn supports(&self, category: EntityCategory) -> bool {
        self.templates.contains_key(&category)
    }

    /// Categories with a registered construction.
    pub fn categories(&self) -> impl Iterator<Item = EntityCategory> + '_ {
        self.templates.keys().copied()
    }

    /// Builds the view for `initial` as a `category` entity, resting at the
    /// snapshot's position.
    pub fn create(
        &self,
        category: EntityCategory,
        initial: &RemoteEntitySnapshot,
    ) -> Result<ViewHandle, SyncError> {
        let template = self
            .templates
            .get(&category)
            .ok_or(SyncError::UnsupportedCategory(category))?;

        let motion = template
            .traits
            .contains(ViewTraits::INTERPOLATED)
            .then(|| MotionInterpolator::new(initial.position, self.interp_duration));

        Ok(ViewHandle {
            id: initial.id,
            category,
            node_name: format!("{}_{}", template.node_prefix, initial.id),
            model: template.model.clone(),
            traits: template.traits,
            current_position: initial.position,
            yaw: 0.0,
            motion,
            attrs: initial.attrs.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::{MotionState, DEFAULT_DURATION};

    fn snap(id: u64, category: EntityCategory) -> RemoteEntitySnapshot {
        RemoteEntitySnapshot::new(id, category, Vec3::new(1.0, 0.0, -2.0))
    }

    #[test]
    fn zombie_view_is_interpolated_and_idle() {
        let factory = ViewFactory::with_defaults(DEFAULT_DURATION);
        let view = factory
            .create(EntityCategory::Zombie, &snap(5, EntityCategory::Zombie))
            .unwrap();

        assert_eq!(view.id(), EntityId(5));
        assert_eq!(view.node_name(), "Zombie_5");
        assert_eq!(view.current_position(), Vec3::new(1.0, 0.0, -2.0));
        let motion = view.motion().unwrap();
        assert_eq!(motion.state(), MotionState::Idle);
        assert_eq!(motion.current_position(), view.current_position());
        assert!(view.traits().contains(ViewTraits::FACES_FOCUS));
    }

    #[test]
    fn aoe_marker_has_no_interpolator() {
        let factory = ViewFactory::with_defaults(DEFAULT_DURATION);
        let mut view = factory
            .create(EntityCategory::SpitterAoe, &snap(2, EntityCategory::SpitterAoe))
            .unwrap();
        assert!(view.motion().is_none());

        view.apply(&snap(2, EntityCategory::SpitterAoe).moved_to(Vec3::new(9.0, 0.0, 9.0)));
        assert_eq!(view.current_position(), Vec3::new(9.0, 0.0, 9.0));
        assert_eq!(view.advance(0.016), None);
    }

    #[test]
    fn unregistered_categories_are_unsupported() {
        let factory = ViewFactory::with_defaults(DEFAULT_DURATION);
        for category in [EntityCategory::Unknown, EntityCategory::Player] {
            let err = factory.create(category, &snap(7, category)).unwrap_err();
            assert_eq!(err, SyncError::UnsupportedCategory(category));
        }
    }

    #[test]
    fn registering_a_category_makes_it_constructible() {
        let mut factory = ViewFactory::empty(DEFAULT_DURATION);
        assert!(!factory.supports(EntityCategory::Player));
        factory.register(
            EntityCategory::Player,
            ViewTemplate::new("RemotePlayer", "player", ViewTraits::INTERPOLATED),
        );
        let view = factory
            .create(EntityCategory::Player, &snap(11, EntityCategory::Player))
            .unwrap();
        assert_eq!(view.node_name(), "RemotePlayer_11");
        assert_eq!(view.model(), "player");
        assert_eq!(factory.categories().count(), 1);
    }
}
