//! Serialization and deserialization for components and entities.
//!
//! This module provides:
//!
//! - [`SerializeContext`] / [`DeserializeContext`] — per-call contexts that
//!   carry the entity-id mapping explicitly
//! - [`SerializeField`] / [`DeserializeField`] — field-level dispatch wrappers
//!   using method-resolution priority
//! - [`EntityIdMapper`] / [`EntityReferenceResolver`] — live id ↔ stored
//!   reference translation
//! - [`serialize_entity`] / [`deserialize_entity`] — whole-entity DOM I/O
//!
//! # Derive macro integration
//!
//! `#[derive(Component)]` generates `serialize_component` and
//! `deserialize_component` by default. Use `#[skip_serialization]` to opt
//! out and write them by hand.

mod context;
mod entity_dom;
mod error;
pub mod field;
mod mapper;

pub use context::{DeserializeContext, SerializeContext};
pub use entity_dom::{
    COMPONENTS_KEY, ID_KEY, NAME_KEY, deserialize_entity, serialize_entity,
};
pub use error::{DeserializeError, SerializeError};
pub use field::{
    DeserializeField, DeserializeFieldFallback, SerializeField, SerializeFieldFallback,
};
pub use mapper::{EntityIdMapper, EntityReferenceResolver, NoEntityMapping};
