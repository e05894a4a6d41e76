//! Whole-entity conversion to and from the DOM.
//!
//! An entity is stored as
//!
//! ```json
//! { "Id": "Entity_[12]", "Name": "Door", "Components": { "Follow": { "target": "Entity_[3]" } } }
//! ```
//!
//! `Id` is the entity's alias within its template, never a runtime id.

use redlilium_dom::{Dom, DomObject};

use super::context::{DeserializeContext, SerializeContext};
use super::error::{DeserializeError, SerializeError};
use super::mapper::{EntityIdMapper, EntityReferenceResolver};
use crate::entity::EntityId;
use crate::entity_object::EntityObject;
use crate::registry::ComponentRegistry;

pub const ID_KEY: &str = "Id";
pub const NAME_KEY: &str = "Name";
pub const COMPONENTS_KEY: &str = "Components";

/// Serializes `entity` under `alias`, writing entity fields through `mapper`.
pub fn serialize_entity(
    entity: &EntityObject,
    alias: &str,
    mapper: &dyn EntityIdMapper,
) -> Result<Dom, SerializeError> {
    let mut ctx = SerializeContext::new(mapper);
    let mut components = DomObject::new();
    for component in entity.components() {
        let dom = component.serialize_boxed(&mut ctx)?;
        components.insert(component.component_name().to_owned(), dom);
    }
    let mut out = DomObject::new();
    out.insert(ID_KEY.to_owned(), Dom::from(alias));
    out.insert(NAME_KEY.to_owned(), Dom::from(entity.name()));
    out.insert(COMPONENTS_KEY.to_owned(), Dom::Object(components));
    Ok(Dom::Object(out))
}

/// Rebuilds an entity with runtime id `id` from its DOM.
///
/// Every component name must be registered in `registry`. Entity fields
/// are resolved through `resolver`.
pub fn deserialize_entity(
    dom: &Dom,
    id: EntityId,
    registry: &ComponentRegistry,
    resolver: &dyn EntityReferenceResolver,
) -> Result<EntityObject, DeserializeError> {
    let Dom::Object(map) = dom else {
        return Err(DeserializeError::Malformed(format!(
            "expected entity object, found {}",
            dom.kind()
        )));
    };
    let name = match map.get(NAME_KEY) {
        None | Some(Dom::Null) => "",
        Some(Dom::String(name)) => name.as_str(),
        Some(other) => {
            return Err(DeserializeError::TypeMismatch {
                field: NAME_KEY.into(),
                expected: "string".into(),
                found: other.kind().into(),
            });
        }
    };
    let mut entity = EntityObject::new(id, name);

    match map.get(COMPONENTS_KEY) {
        None | Some(Dom::Null) => {}
        Some(Dom::Object(components)) => {
            let mut ctx = DeserializeContext::new(resolver);
            for (component_name, data) in components {
                let component = registry.deserialize(component_name, data, &mut ctx)?;
                entity.insert_boxed(component);
            }
        }
        Some(other) => {
            return Err(DeserializeError::TypeMismatch {
                field: COMPONENTS_KEY.into(),
                expected: "object".into(),
                found: other.kind().into(),
            });
        }
    }
    Ok(entity)
}
