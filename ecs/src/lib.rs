//! # RedLilium ECS (prefab entity model)
//!
//! The entity-side types that prefab templates and instances are built from.
//!
//! ## Core Types
//!
//! - [`EntityId`] — spawn-tick checked entity identifier, with an `INVALID` sentinel
//! - [`EntityFactory`] / [`EntityAllocator`] — source of fresh ids
//! - [`Component`] — serializable component trait, derivable with `#[derive(Component)]`
//! - [`EntityObject`] — an owned entity: name plus type-erased components
//! - [`ComponentRegistry`] — component name → deserializer
//!
//! ## Serialization
//!
//! See [`serialize`]. Entity-valued fields are never stored as runtime ids;
//! they go through an [`EntityIdMapper`](serialize::EntityIdMapper) on the
//! way out and an [`EntityReferenceResolver`](serialize::EntityReferenceResolver)
//! on the way in.

// Lets `#[derive(Component)]` expand to `redlilium_ecs::...` paths inside this crate.
extern crate self as redlilium_ecs;

pub mod component;
mod entity;
mod entity_object;
mod registry;
pub mod serialize;

pub use component::{Component, ComponentBag};
pub use ecs_macro::Component;
pub use entity::{EntityAllocator, EntityFactory, EntityId};
pub use entity_object::EntityObject;
pub use registry::ComponentRegistry;

/// Re-exported so derived impls can name [`Dom`](redlilium_dom::Dom) without
/// a direct dependency.
pub use redlilium_dom as dom;
