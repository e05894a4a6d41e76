//! Owned entity with a name and a set of components.

use std::collections::BTreeMap;

use crate::component::{Component, ComponentBag};
use crate::entity::EntityId;

/// An entity owned outside a world: its id, display name and components.
///
/// Components are keyed by [`Component::NAME`]; at most one component per
/// name. Iteration order is sorted by name.
#[derive(Debug, Clone)]
pub struct EntityObject {
    id: EntityId,
    name: String,
    components: BTreeMap<&'static str, Box<dyn ComponentBag>>,
}

impl EntityObject {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            components: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with<T: Component>(mut self, component: T) -> Self {
        self.insert(component);
        self
    }

    /// Inserts a component, replacing any existing one with the same name.
    pub fn insert<T: Component>(&mut self, component: T) {
        self.components.insert(T::NAME, Box::new(component));
    }

    /// Inserts an already type-erased component.
    pub fn insert_boxed(&mut self, component: Box<dyn ComponentBag>) {
        self.components.insert(component.component_name(), component);
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        self.components
            .get(T::NAME)
            .and_then(|c| c.as_any().downcast_ref::<T>())
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components
            .get_mut(T::NAME)
            .and_then(|c| c.as_any_mut().downcast_mut::<T>())
    }

    pub fn remove<T: Component>(&mut self) -> Option<T> {
        let boxed = self.components.remove(T::NAME)?;
        boxed.as_any().downcast_ref::<T>().cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Components in name order.
    pub fn components(&self) -> impl Iterator<Item = &dyn ComponentBag> + '_ {
        self.components.values().map(|c| c.as_ref())
    }

    /// Every entity id referenced by this entity's components.
    pub fn referenced_entities(&self) -> Vec<EntityId> {
        let mut out = Vec::new();
        for component in self.components.values() {
            component.collect_entities_boxed(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityAllocator;

    #[derive(Debug, Clone, PartialEq)]
    struct Marker(u32);

    impl Component for Marker {
        const NAME: &'static str = "Marker";
    }

    #[test]
    fn insert_replaces_by_name() {
        let id = EntityAllocator::new().allocate(1);
        let mut entity = EntityObject::new(id, "A").with(Marker(1));
        entity.insert(Marker(2));
        assert_eq!(entity.component_count(), 1);
        assert_eq!(entity.get::<Marker>(), Some(&Marker(2)));
    }

    #[test]
    fn get_mut_and_remove() {
        let mut entity = EntityObject::new(EntityId::INVALID, "A").with(Marker(1));
        entity.get_mut::<Marker>().unwrap().0 = 5;
        assert_eq!(entity.remove::<Marker>(), Some(Marker(5)));
        assert!(!entity.contains("Marker"));
        assert_eq!(entity.remove::<Marker>(), None);
    }

    #[test]
    fn clone_is_deep() {
        let original = EntityObject::new(EntityId::INVALID, "A").with(Marker(1));
        let mut copy = original.clone();
        copy.get_mut::<Marker>().unwrap().0 = 9;
        copy.set_name("B");
        assert_eq!(original.get::<Marker>(), Some(&Marker(1)));
        assert_eq!(original.name(), "A");
    }
}
