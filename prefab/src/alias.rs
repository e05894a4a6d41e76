//! Entity references inside an instance tree.
//!
//! A component field holding an [`EntityId`] is stored as a path relative to
//! the instance that owns the referencing entity:
//!
//! - `Entity_[2]`: same instance
//! - `../Entity_[5]`: parent instance
//! - `Instance_[3]/Entity_[7]`: inside a nested instance
//! - `../../Instance_[x]/Entity_[y]`: up two levels, then down one
//!
//! The empty string is the invalid reference.

use std::fmt;

use redlilium_ecs::EntityId;
use redlilium_ecs::serialize::{EntityIdMapper, EntityReferenceResolver};

use crate::ids::{EntityAlias, InstanceAlias};
use crate::instance::{Instance, InstanceRef, NodeId};

/// Parsed form of a stored entity reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityReference {
    /// Ancestor instances to walk up before descending.
    pub up: usize,
    /// Nested instances to walk down, outermost first.
    pub instances: Vec<InstanceAlias>,
    pub entity: EntityAlias,
}

impl EntityReference {
    pub fn local(entity: EntityAlias) -> Self {
        Self {
            up: 0,
            instances: Vec::new(),
            entity,
        }
    }

    /// Returns `None` for the empty (invalid) reference and for malformed
    /// strings: empty segments, or `..` after a named segment.
    pub fn parse(reference: &str) -> Option<Self> {
        if reference.is_empty() {
            return None;
        }
        let mut segments: Vec<&str> = reference.split('/').collect();
        let entity = segments.pop()?;
        if entity.is_empty() || entity == ".." {
            return None;
        }

        let mut up = 0;
        let mut instances = Vec::new();
        for segment in segments {
            match segment {
                "" => return None,
                ".." if instances.is_empty() => up += 1,
                ".." => return None,
                alias => instances.push(InstanceAlias::from(alias)),
            }
        }
        Some(Self {
            up,
            instances,
            entity: EntityAlias::from(entity),
        })
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.up {
            f.write_str("../")?;
        }
        for alias in &self.instances {
            write!(f, "{alias}/")?;
        }
        f.write_str(self.entity.as_str())
    }
}

/// Resolves stored references relative to one node of an instance tree.
#[derive(Clone, Copy)]
pub struct InstanceReferenceResolver<'a> {
    from: InstanceRef<'a>,
}

impl<'a> InstanceReferenceResolver<'a> {
    pub fn new(from: InstanceRef<'a>) -> Self {
        Self { from }
    }

    pub fn resolve(&self, reference: &EntityReference) -> EntityId {
        let mut node = self.from;
        for _ in 0..reference.up {
            match node.parent() {
                Some(parent) => node = parent,
                None => return EntityId::INVALID,
            }
        }
        for alias in &reference.instances {
            match node.find_nested_instance(alias.as_str()) {
                Some(child) => node = child,
                None => return EntityId::INVALID,
            }
        }
        node.get_entity_id(reference.entity.as_str())
    }
}

impl EntityReferenceResolver for InstanceReferenceResolver<'_> {
    fn reference_to_entity(&self, reference: &str) -> EntityId {
        EntityReference::parse(reference)
            .map_or(EntityId::INVALID, |parsed| self.resolve(&parsed))
    }
}

/// Writes live ids as references relative to one node of an instance tree.
///
/// Ids not owned by the tree map to `""`.
pub struct InstanceEntityIdMapper<'a> {
    instance: &'a Instance,
    from: NodeId,
}

impl<'a> InstanceEntityIdMapper<'a> {
    pub fn new(instance: &'a Instance, from: NodeId) -> Self {
        Self { instance, from }
    }

    pub fn reference(&self, id: EntityId) -> Option<EntityReference> {
        let owner = self.instance.node(self.instance.owner_of(id)?)?;
        let entity = owner.get_entity_alias(id)?.clone();

        let mut from_chain = Vec::new();
        let mut cursor = self.instance.node(self.from);
        while let Some(node) = cursor {
            from_chain.push(node.id());
            cursor = node.parent();
        }

        // Climb from the owner until reaching a node on the referencing
        // node's ancestor chain: that is the lowest common ancestor.
        let mut down = Vec::new();
        let mut current = owner;
        let up = loop {
            if let Some(pos) = from_chain.iter().position(|n| *n == current.id()) {
                break pos;
            }
            down.push(current.alias()?.clone());
            current = current.parent()?;
        };
        down.reverse();

        Some(EntityReference {
            up,
            instances: down,
            entity,
        })
    }
}

impl EntityIdMapper for InstanceEntityIdMapper<'_> {
    fn entity_to_reference(&self, id: EntityId) -> String {
        if !id.is_valid() {
            return String::new();
        }
        self.reference(id)
            .map(|reference| reference.to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_forms() {
        assert_eq!(
            EntityReference::parse("Entity_[2]"),
            Some(EntityReference::local("Entity_[2]".into()))
        );

        let up = EntityReference::parse("../../Entity_[5]").unwrap();
        assert_eq!(up.up, 2);
        assert!(up.instances.is_empty());

        let down = EntityReference::parse("Instance_[3]/Instance_[4]/Entity_[7]").unwrap();
        assert_eq!(down.up, 0);
        assert_eq!(down.instances, vec![InstanceAlias::from("Instance_[3]"), "Instance_[4]".into()]);
        assert_eq!(down.entity.as_str(), "Entity_[7]");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_eq!(EntityReference::parse(""), None);
        assert_eq!(EntityReference::parse("a//b"), None);
        assert_eq!(EntityReference::parse("a/"), None);
        assert_eq!(EntityReference::parse("a/../b"), None);
        assert_eq!(EntityReference::parse(".."), None);
    }

    #[test]
    fn display_matches_parse() {
        for text in ["Entity_[1]", "../Entity_[1]", "../I/J/Entity_[1]", "I/Entity_[1]"] {
            assert_eq!(EntityReference::parse(text).unwrap().to_string(), text);
        }
    }
}
