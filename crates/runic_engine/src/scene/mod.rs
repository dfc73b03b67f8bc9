//! Minimal scene container
//!
//! Entities live in a slot map and are iterated in spawn order. Each entity
//! carries a transform and optional renderable and light aspects. This is a
//! flat list, not an ECS.

mod camera;
mod components;

pub use camera::{Camera, PITCH_LIMIT_DEGREES};
pub use components::{LightComponent, LightType, RenderableComponent};

use slotmap::{new_key_type, SlotMap};

use crate::foundation::math::Transform;

new_key_type! {
    /// Stable identifier of a spawned entity
    pub struct EntityId;
}

/// Named object with optional aspects
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Display name
    pub name: String,
    /// Placement in the world
    pub transform: Transform,
    /// Drawn when present
    pub renderable: Option<RenderableComponent>,
    /// Contributes lighting when present
    pub light: Option<LightComponent>,
}

impl Entity {
    /// Entity at the origin with no aspects
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            renderable: None,
            light: None,
        }
    }

    /// Set the transform
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Attach a renderable
    #[must_use]
    pub fn with_renderable(mut self, renderable: RenderableComponent) -> Self {
        self.renderable = Some(renderable);
        self
    }

    /// Attach a light
    #[must_use]
    pub fn with_light(mut self, light: LightComponent) -> Self {
        self.light = Some(light);
        self
    }
}

/// Owner of every entity
///
/// `revision` counts changes to the entity set. Spawning and despawning bump
/// it. Edits through `get_mut` do not, so adding or removing an aspect that
/// way must be followed by `mark_changed`.
#[derive(Debug, Default)]
pub struct Scene {
    entities: SlotMap<EntityId, Entity>,
    order: Vec<EntityId>,
    revision: u64,
}

impl Scene {
    /// Empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity at the end of the iteration order
    pub fn spawn(&mut self, entity: Entity) -> EntityId {
        let id = self.entities.insert(entity);
        self.order.push(id);
        self.mark_changed();
        id
    }

    /// Remove an entity, returning it if it was alive
    pub fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(id)?;
        self.order.retain(|&other| other != id);
        self.mark_changed();
        Some(entity)
    }

    /// Look up an entity
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Record a change to which entities are renderable or lit
    pub fn mark_changed(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Current entity set revision
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Look up an entity mutably
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    /// Whether `id` refers to a live entity
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Live entities in spawn order
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> + '_ {
        self.order.iter().filter_map(|&id| self.entities.get(id).map(|entity| (id, entity)))
    }

    /// Number of live entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when no entity is alive
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Tracks the last scene revision a consumer has seen
#[derive(Debug, Default, Clone, Copy)]
pub struct SceneWatch {
    seen: Option<u64>,
}

impl SceneWatch {
    /// Watch that reports the first scene it sees as changed
    pub const fn new() -> Self {
        Self { seen: None }
    }

    /// True when `scene` changed since the previous call
    pub fn changed(&mut self, scene: &Scene) -> bool {
        let revision = scene.revision();
        if self.seen == Some(revision) {
            return false;
        }
        self.seen = Some(revision);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_follows_spawn_order() {
        let mut scene = Scene::new();
        let a = scene.spawn(Entity::new("a"));
        let b = scene.spawn(Entity::new("b"));
        let c = scene.spawn(Entity::new("c"));

        scene.despawn(b);
        let d = scene.spawn(Entity::new("d"));

        let ids: Vec<EntityId> = scene.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, c, d]);
        assert_eq!(scene.len(), 3);
    }

    #[test]
    fn test_despawned_id_is_stale() {
        let mut scene = Scene::new();
        let id = scene.spawn(Entity::new("temp"));
        assert!(scene.despawn(id).is_some());
        assert!(!scene.contains(id));
        assert!(scene.despawn(id).is_none());

        let reused = scene.spawn(Entity::new("next"));
        assert_ne!(id, reused);
        assert!(scene.get(id).is_none());
    }

    #[test]
    fn test_aspects_are_optional() {
        let light = LightComponent::directional(crate::foundation::math::Vec3::new(0.0, -1.0, 0.0));
        let entity = Entity::new("sun").with_light(light);
        assert!(entity.renderable.is_none());
        assert_eq!(entity.light, Some(light));
    }

    #[test]
    fn test_watch_reports_entity_set_changes_only() {
        let mut scene = Scene::new();
        let mut watch = SceneWatch::new();
        assert!(watch.changed(&scene));
        assert!(!watch.changed(&scene));

        let id = scene.spawn(Entity::new("cube"));
        assert!(watch.changed(&scene));

        scene.get_mut(id).unwrap().transform.position.x = 3.0;
        assert!(!watch.changed(&scene));

        scene.get_mut(id).unwrap().light = Some(LightComponent::point(crate::foundation::math::Vec3::zeros()));
        scene.mark_changed();
        assert!(watch.changed(&scene));

        scene.despawn(id);
        assert!(watch.changed(&scene));
        assert!(!watch.changed(&scene));
    }
}
