//! Translation between runtime [`EntityId`]s and their stored references.
//!
//! Components hold live `EntityId`s, but a DOM must stay valid across
//! instantiations, so entity fields are written as reference strings and
//! resolved again on load. Prefab instances provide a mapper that emits
//! alias-qualified relative paths; the map impls here cover flat cases.
//!
//! The empty string is the reserved "invalid" reference in both directions.

use std::collections::HashMap;

use crate::entity::EntityId;

/// Serialize side: live id to stored reference.
pub trait EntityIdMapper {
    /// Returns the reference string for `id`, or `""` if `id` is not
    /// reachable from the entity being serialized.
    fn entity_to_reference(&self, id: EntityId) -> String;
}

/// Deserialize side: stored reference to live id.
pub trait EntityReferenceResolver {
    /// Returns the entity a reference points at, or [`EntityId::INVALID`].
    fn reference_to_entity(&self, reference: &str) -> EntityId;
}

/// Maps every id to `""` and every reference to [`EntityId::INVALID`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEntityMapping;

impl EntityIdMapper for NoEntityMapping {
    fn entity_to_reference(&self, _id: EntityId) -> String {
        String::new()
    }
}

impl EntityReferenceResolver for NoEntityMapping {
    fn reference_to_entity(&self, _reference: &str) -> EntityId {
        EntityId::INVALID
    }
}

impl EntityIdMapper for HashMap<EntityId, String> {
    fn entity_to_reference(&self, id: EntityId) -> String {
        self.get(&id).cloned().unwrap_or_default()
    }
}

impl EntityReferenceResolver for HashMap<String, EntityId> {
    fn reference_to_entity(&self, reference: &str) -> EntityId {
        self.get(reference).copied().unwrap_or(EntityId::INVALID)
    }
}
