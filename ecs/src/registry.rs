//! Name-keyed component registry for deserialization.

use std::collections::HashMap;

use redlilium_dom::Dom;

use crate::component::{Component, ComponentBag};
use crate::serialize::{DeserializeContext, DeserializeError};

type DeserializeFn =
    fn(&mut DeserializeContext<'_>) -> Result<Box<dyn ComponentBag>, DeserializeError>;

struct ComponentEntry {
    deserialize_fn: DeserializeFn,
}

/// Maps component names (as stored in an entity's `Components` object) to
/// type-erased constructors.
///
/// A registry is passed explicitly to every call that turns DOM back into
/// components; there is no global one.
#[derive(Default)]
pub struct ComponentRegistry {
    entries: HashMap<&'static str, ComponentEntry>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under [`Component::NAME`]. Re-registering is a no-op.
    pub fn register<T: Component>(&mut self) {
        self.entries.entry(T::NAME).or_insert(ComponentEntry {
            deserialize_fn: |ctx| {
                let component = T::deserialize_component(ctx)?;
                Ok(Box::new(component))
            },
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Deserializes the component stored under `name` from `data`.
    pub fn deserialize(
        &self,
        name: &str,
        data: &Dom,
        ctx: &mut DeserializeContext<'_>,
    ) -> Result<Box<dyn ComponentBag>, DeserializeError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| DeserializeError::UnknownComponent {
                type_name: name.to_owned(),
            })?;
        ctx.load_data(data)?;
        (entry.deserialize_fn)(ctx)
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.names())
            .finish()
    }
}
