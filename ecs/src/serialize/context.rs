//! Serialization and deserialization contexts.
//!
//! [`SerializeContext`] accumulates component fields into a DOM object and
//! turns entity fields into reference strings through an
//! [`EntityIdMapper`]. [`DeserializeContext`] hands fields back out and
//! resolves entity references through an [`EntityReferenceResolver`].

use redlilium_dom::{Dom, DomObject, from_dom, to_dom};

use super::error::{DeserializeError, SerializeError};
use super::mapper::{EntityIdMapper, EntityReferenceResolver};
use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// SerializeContext
// ---------------------------------------------------------------------------

/// Context for serializing component fields.
pub struct SerializeContext<'a> {
    mapper: &'a dyn EntityIdMapper,
    fields: DomObject,
}

impl<'a> SerializeContext<'a> {
    pub fn new(mapper: &'a dyn EntityIdMapper) -> Self {
        Self {
            mapper,
            fields: DomObject::new(),
        }
    }

    /// The mapper used for entity fields (for custom impls).
    pub fn mapper(&self) -> &dyn EntityIdMapper {
        self.mapper
    }

    /// Begin serializing a struct component.
    pub fn begin_struct(&mut self, _name: &str) -> Result<(), SerializeError> {
        self.fields.clear();
        Ok(())
    }

    /// Write a pre-built value for a field.
    pub fn write_field(&mut self, name: &str, value: Dom) -> Result<(), SerializeError> {
        self.fields.insert(name.to_owned(), value);
        Ok(())
    }

    /// Write a serde-serializable value as a field.
    pub fn write_serde<T: serde::Serialize + ?Sized>(
        &mut self,
        name: &str,
        val: &T,
    ) -> Result<(), SerializeError> {
        let value = to_dom(val).map_err(|e| SerializeError::FieldError {
            field: name.to_owned(),
            message: e.to_string(),
        })?;
        self.write_field(name, value)
    }

    /// Returns the stored reference for a single entity.
    pub fn entity_reference(&self, entity: EntityId) -> Dom {
        if entity.is_valid() {
            Dom::String(self.mapper.entity_to_reference(entity))
        } else {
            Dom::String(String::new())
        }
    }

    /// Write an entity reference field.
    pub fn write_entity(&mut self, name: &str, entity: &EntityId) -> Result<(), SerializeError> {
        let value = self.entity_reference(*entity);
        self.write_field(name, value)
    }

    /// Write a list of entity references.
    pub fn write_entity_list(
        &mut self,
        name: &str,
        entities: &[EntityId],
    ) -> Result<(), SerializeError> {
        let values = entities.iter().map(|e| self.entity_reference(*e)).collect();
        self.write_field(name, Dom::Array(values))
    }

    /// Write an optional entity reference. `None` is stored as null.
    pub fn write_optional_entity(
        &mut self,
        name: &str,
        entity: &Option<EntityId>,
    ) -> Result<(), SerializeError> {
        let value = match entity {
            Some(e) => self.entity_reference(*e),
            None => Dom::Null,
        };
        self.write_field(name, value)
    }

    /// Finish struct serialization and return the accumulated fields.
    pub fn end_struct(&mut self) -> Result<Dom, SerializeError> {
        Ok(Dom::Object(std::mem::take(&mut self.fields)))
    }
}

// ---------------------------------------------------------------------------
// DeserializeContext
// ---------------------------------------------------------------------------

/// Context for deserializing component fields.
pub struct DeserializeContext<'a> {
    resolver: &'a dyn EntityReferenceResolver,
    fields: DomObject,
    component: String,
}

impl<'a> DeserializeContext<'a> {
    pub fn new(resolver: &'a dyn EntityReferenceResolver) -> Self {
        Self {
            resolver,
            fields: DomObject::new(),
            component: String::new(),
        }
    }

    /// Load serialized component data into the context.
    ///
    /// Call this before `T::deserialize_component(ctx)`.
    pub fn load_data(&mut self, data: &Dom) -> Result<(), DeserializeError> {
        match data {
            Dom::Object(entries) => {
                self.fields = entries.clone();
                Ok(())
            }
            other => Err(DeserializeError::TypeMismatch {
                field: self.component.clone(),
                expected: "object".into(),
                found: other.kind().into(),
            }),
        }
    }

    /// Begin deserializing a struct component.
    ///
    /// Fields should already be loaded via [`load_data`](Self::load_data).
    pub fn begin_struct(&mut self, name: &str) -> Result<(), DeserializeError> {
        self.component = name.to_owned();
        Ok(())
    }

    /// Read a raw value for a field.
    pub fn read_field(&mut self, name: &str) -> Result<Dom, DeserializeError> {
        self.fields
            .remove(name)
            .ok_or_else(|| DeserializeError::MissingField {
                field: name.to_owned(),
                component: self.component.clone(),
            })
    }

    /// Read a serde-deserializable value from a field.
    pub fn read_serde<T: serde::de::DeserializeOwned>(
        &mut self,
        name: &str,
    ) -> Result<T, DeserializeError> {
        let val = self.read_field(name)?;
        let found = val.kind();
        from_dom(val).map_err(|e| DeserializeError::TypeMismatch {
            field: name.to_owned(),
            expected: std::any::type_name::<T>().to_owned(),
            found: format!("{found} ({e})"),
        })
    }

    fn resolve(&self, name: &str, value: &Dom) -> Result<EntityId, DeserializeError> {
        match value {
            Dom::String(reference) if reference.is_empty() => Ok(EntityId::INVALID),
            Dom::String(reference) => {
                let id = self.resolver.reference_to_entity(reference);
                if !id.is_valid() {
                    log::trace!("entity reference '{reference}' in field '{name}' is unresolved");
                }
                Ok(id)
            }
            Dom::Null => Ok(EntityId::INVALID),
            other => Err(DeserializeError::TypeMismatch {
                field: name.to_owned(),
                expected: "entity reference".into(),
                found: other.kind().into(),
            }),
        }
    }

    /// Read an entity reference. Unresolvable references read as
    /// [`EntityId::INVALID`].
    pub fn read_entity(&mut self, name: &str) -> Result<EntityId, DeserializeError> {
        let val = self.read_field(name)?;
        self.resolve(name, &val)
    }

    /// Read a list of entity references. Positions are kept; unresolved
    /// entries read as [`EntityId::INVALID`].
    pub fn read_entity_list(&mut self, name: &str) -> Result<Vec<EntityId>, DeserializeError> {
        let val = self.read_field(name)?;
        match &val {
            Dom::Array(items) => items.iter().map(|v| self.resolve(name, v)).collect(),
            other => Err(DeserializeError::TypeMismatch {
                field: name.to_owned(),
                expected: "array of entity references".into(),
                found: other.kind().into(),
            }),
        }
    }

    /// Read an optional entity reference. Null and unresolved references
    /// both read as `None`.
    pub fn read_optional_entity(
        &mut self,
        name: &str,
    ) -> Result<Option<EntityId>, DeserializeError> {
        let val = self.read_field(name)?;
        let id = self.resolve(name, &val)?;
        Ok(id.is_valid().then_some(id))
    }

    /// Finish struct deserialization.
    pub fn end_struct(&mut self) -> Result<(), DeserializeError> {
        self.fields.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::entity::EntityAllocator;
    use crate::serialize::NoEntityMapping;

    #[test]
    fn entity_fields_use_mapper() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate(1);
        let b = alloc.allocate(1);
        let mapper: HashMap<EntityId, String> = [(a, "Entity_[1]".to_string())].into();

        let mut ctx = SerializeContext::new(&mapper);
        ctx.begin_struct("Link").unwrap();
        ctx.write_entity("known", &a).unwrap();
        ctx.write_entity("unknown", &b).unwrap();
        ctx.write_optional_entity("none", &None).unwrap();
        ctx.write_entity_list("list", &[a, EntityId::INVALID]).unwrap();
        let dom = ctx.end_struct().unwrap();

        assert_eq!(dom.get("known"), Some(&Dom::from("Entity_[1]")));
        assert_eq!(dom.get("unknown"), Some(&Dom::from("")));
        assert_eq!(dom.get("none"), Some(&Dom::Null));
        assert_eq!(
            dom.get("list"),
            Some(&Dom::Array(vec![Dom::from("Entity_[1]"), Dom::from("")]))
        );
    }

    #[test]
    fn entity_fields_use_resolver() {
        let target = EntityAllocator::new().allocate(7);
        let resolver: HashMap<String, EntityId> = [("Entity_[1]".to_string(), target)].into();
        let data = Dom::from_iter([
            ("a", Dom::from("Entity_[1]")),
            ("b", Dom::from("../Entity_[9]")),
            ("c", Dom::from("Entity_[1]")),
            ("d", Dom::Array(vec![Dom::from(""), Dom::from("Entity_[1]")])),
        ]);

        let mut ctx = DeserializeContext::new(&resolver);
        ctx.load_data(&data).unwrap();
        ctx.begin_struct("Link").unwrap();
        assert_eq!(ctx.read_entity("a").unwrap(), target);
        assert_eq!(ctx.read_entity("b").unwrap(), EntityId::INVALID);
        assert_eq!(ctx.read_optional_entity("c").unwrap(), Some(target));
        assert_eq!(
            ctx.read_entity_list("d").unwrap(),
            vec![EntityId::INVALID, target]
        );
        ctx.end_struct().unwrap();
    }

    #[test]
    fn missing_field_names_component() {
        let mut ctx = DeserializeContext::new(&NoEntityMapping);
        ctx.load_data(&Dom::object()).unwrap();
        ctx.begin_struct("Health").unwrap();
        let err = ctx.read_serde::<f32>("value").unwrap_err();
        assert_eq!(
            err,
            DeserializeError::MissingField {
                field: "value".into(),
                component: "Health".into()
            }
        );
    }

    #[test]
    fn serde_type_mismatch() {
        let mut ctx = DeserializeContext::new(&NoEntityMapping);
        ctx.load_data(&Dom::from_iter([("value", Dom::from("text"))]))
            .unwrap();
        assert!(matches!(
            ctx.read_serde::<u32>("value"),
            Err(DeserializeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn load_data_rejects_scalar() {
        let mut ctx = DeserializeContext::new(&NoEntityMapping);
        assert!(ctx.load_data(&Dom::Int(3)).is_err());
    }
}
