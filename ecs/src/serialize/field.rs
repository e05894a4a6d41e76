//! Field-level serialization and deserialization wrappers.
//!
//! Inherent methods on wrapper types for entity-holding fields take
//! precedence over blanket fallback trait impls, so `EntityId` fields are
//! written as references while every other serde type goes through
//! [`to_dom`](redlilium_dom::to_dom).
//!
//! The `#[derive(Component)]` macro generates `serialize_component` by
//! wrapping each field in `SerializeField(&self.field).serialize_field(name, ctx)`.

use std::marker::PhantomData;

use super::context::{DeserializeContext, SerializeContext};
use super::error::{DeserializeError, SerializeError};
use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// Serialize
// ---------------------------------------------------------------------------

/// Wrapper for serializing a single component field.
pub struct SerializeField<'a, T: ?Sized>(pub &'a T);

/// Fallback trait for serializing fields of types that implement
/// [`serde::Serialize`].
///
/// Rust's method resolution ensures this is only used when no inherent
/// `serialize_field` method exists.
pub trait SerializeFieldFallback {
    fn serialize_field(
        &self,
        name: &str,
        ctx: &mut SerializeContext<'_>,
    ) -> Result<(), SerializeError>;
}

impl<T: serde::Serialize + 'static> SerializeFieldFallback for SerializeField<'_, T> {
    fn serialize_field(
        &self,
        name: &str,
        ctx: &mut SerializeContext<'_>,
    ) -> Result<(), SerializeError> {
        ctx.write_serde(name, self.0)
    }
}

impl SerializeField<'_, EntityId> {
    pub fn serialize_field(
        &self,
        name: &str,
        ctx: &mut SerializeContext<'_>,
    ) -> Result<(), SerializeError> {
        ctx.write_entity(name, self.0)
    }
}

impl SerializeField<'_, Vec<EntityId>> {
    pub fn serialize_field(
        &self,
        name: &str,
        ctx: &mut SerializeContext<'_>,
    ) -> Result<(), SerializeError> {
        ctx.write_entity_list(name, self.0)
    }
}

impl SerializeField<'_, Option<EntityId>> {
    pub fn serialize_field(
        &self,
        name: &str,
        ctx: &mut SerializeContext<'_>,
    ) -> Result<(), SerializeError> {
        ctx.write_optional_entity(name, self.0)
    }
}

// ---------------------------------------------------------------------------
// Deserialize
// ---------------------------------------------------------------------------

/// Wrapper for deserializing a single component field.
pub struct DeserializeField<T>(pub PhantomData<T>);

/// Fallback trait for deserializing fields of types that implement
/// [`serde::de::DeserializeOwned`].
pub trait DeserializeFieldFallback<T> {
    fn deserialize_field(
        name: &str,
        ctx: &mut DeserializeContext<'_>,
    ) -> Result<T, DeserializeError>;
}

impl<T: serde::de::DeserializeOwned + 'static> DeserializeFieldFallback<T> for DeserializeField<T> {
    fn deserialize_field(
        name: &str,
        ctx: &mut DeserializeContext<'_>,
    ) -> Result<T, DeserializeError> {
        ctx.read_serde(name)
    }
}

impl DeserializeField<EntityId> {
    pub fn deserialize_field(
        name: &str,
        ctx: &mut DeserializeContext<'_>,
    ) -> Result<EntityId, DeserializeError> {
        ctx.read_entity(name)
    }
}

impl DeserializeField<Vec<EntityId>> {
    pub fn deserialize_field(
        name: &str,
        ctx: &mut DeserializeContext<'_>,
    ) -> Result<Vec<EntityId>, DeserializeError> {
        ctx.read_entity_list(name)
    }
}

impl DeserializeField<Option<EntityId>> {
    pub fn deserialize_field(
        name: &str,
        ctx: &mut DeserializeContext<'_>,
    ) -> Result<Option<EntityId>, DeserializeError> {
        ctx.read_optional_entity(name)
    }
}

// ---------------------------------------------------------------------------
// Entity reference collection
// ---------------------------------------------------------------------------

/// Read-only wrapper for collecting [`EntityId`] references from a field.
pub struct EntityRefs<'a, T: ?Sized>(pub &'a T);

/// Fallback for fields that hold no entity references. A no-op.
pub trait EntityRefsFallback {
    fn collect_entities(&self, _collector: &mut Vec<EntityId>) {}
}

impl<T: 'static> EntityRefsFallback for EntityRefs<'_, T> {}

impl EntityRefs<'_, EntityId> {
    pub fn collect_entities(&self, collector: &mut Vec<EntityId>) {
        collector.push(*self.0);
    }
}

impl EntityRefs<'_, Vec<EntityId>> {
    pub fn collect_entities(&self, collector: &mut Vec<EntityId>) {
        collector.extend(self.0.iter().copied());
    }
}

impl EntityRefs<'_, Option<EntityId>> {
    pub fn collect_entities(&self, collector: &mut Vec<EntityId>) {
        if let Some(e) = self.0 {
            collector.push(*e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use redlilium_dom::Dom;

    use super::*;
    use crate::entity::EntityAllocator;

    #[test]
    fn serialize_f32_via_fallback() {
        let mapper: HashMap<EntityId, String> = HashMap::new();
        let mut ctx = SerializeContext::new(&mapper);
        ctx.begin_struct("Test").unwrap();

        use super::SerializeFieldFallback as _;
        SerializeField(&1.5f32)
            .serialize_field("x", &mut ctx)
            .unwrap();

        let result = ctx.end_struct().unwrap();
        assert_eq!(result.get("x"), Some(&Dom::Float(1.5)));
    }

    #[test]
    fn serialize_entity_via_inherent() {
        let entity = EntityAllocator::new().allocate(3);
        let mapper: HashMap<EntityId, String> = [(entity, "Entity_[5]".to_string())].into();
        let mut ctx = SerializeContext::new(&mapper);
        ctx.begin_struct("Test").unwrap();

        // Inherent method takes priority - no fallback import needed
        SerializeField(&entity)
            .serialize_field("e", &mut ctx)
            .unwrap();

        let result = ctx.end_struct().unwrap();
        assert_eq!(result.get("e"), Some(&Dom::from("Entity_[5]")));
    }

    #[test]
    fn deserialize_entity_via_inherent() {
        let entity = EntityAllocator::new().allocate(3);
        let resolver: HashMap<String, EntityId> = [("Entity_[5]".to_string(), entity)].into();
        let mut ctx = DeserializeContext::new(&resolver);
        ctx.load_data(&Dom::from_iter([
            ("e", Dom::from("Entity_[5]")),
            ("n", Dom::Int(4)),
        ]))
        .unwrap();

        assert_eq!(
            DeserializeField::<EntityId>::deserialize_field("e", &mut ctx).unwrap(),
            entity
        );
        use super::DeserializeFieldFallback as _;
        assert_eq!(
            DeserializeField::<u8>::deserialize_field("n", &mut ctx).unwrap(),
            4
        );
    }

    #[test]
    fn entity_refs_collect_known_types_only() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate(1);
        let b = alloc.allocate(1);
        let mut out = Vec::new();

        use super::EntityRefsFallback as _;
        EntityRefs(&a).collect_entities(&mut out);
        EntityRefs(&vec![b, a]).collect_entities(&mut out);
        EntityRefs(&Some(b)).collect_entities(&mut out);
        EntityRefs(&5u32).collect_entities(&mut out);
        assert_eq!(out, vec![a, b, a, b]);
    }
}
