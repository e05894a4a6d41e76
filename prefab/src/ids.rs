//! Identifier and alias types.
//!
//! `TemplateId`, `LinkId` and `InstanceId` are process-local handles
//! allocated from counters. `EntityAlias` and `InstanceAlias` are the stable,
//! template-scoped keys stored in template DOMs.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            pub const INVALID: $name = $name(u64::MAX);

            pub fn is_valid(self) -> bool {
                self != Self::INVALID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_id!(
    /// Handle of a registered template.
    TemplateId
);
define_id!(
    /// Handle of a link between a nested (source) and a nesting (target) template.
    LinkId
);
define_id!(
    /// Handle of a live root instance owned by a `PrefabSystem`.
    InstanceId
);

macro_rules! define_alias {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(alias: impl Into<String>) -> Self {
                Self(alias.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(alias: &str) -> Self {
                Self(alias.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(alias: String) -> Self {
                Self(alias)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_alias!(
    /// Template-scoped key of an entity (`Entity_[<n>]`).
    EntityAlias
);
define_alias!(
    /// Template-scoped key of a nested instance (`Instance_[<n>]`).
    InstanceAlias
);

/// Generates fresh aliases of the form `<prefix>_[<random u64>]`.
#[derive(Debug, Clone)]
pub struct AliasGenerator {
    entity_prefix: String,
    instance_prefix: String,
}

impl Default for AliasGenerator {
    fn default() -> Self {
        Self::new("Entity", "Instance")
    }
}

impl AliasGenerator {
    pub fn new(entity_prefix: impl Into<String>, instance_prefix: impl Into<String>) -> Self {
        Self {
            entity_prefix: entity_prefix.into(),
            instance_prefix: instance_prefix.into(),
        }
    }

    pub fn entity_alias(&self) -> EntityAlias {
        EntityAlias(format!("{}_[{}]", self.entity_prefix, rand::random::<u64>()))
    }

    pub fn instance_alias(&self) -> InstanceAlias {
        InstanceAlias(format!("{}_[{}]", self.instance_prefix, rand::random::<u64>()))
    }

    /// An entity alias for which `taken` returns false.
    pub fn unique_entity_alias(&self, taken: impl Fn(&EntityAlias) -> bool) -> EntityAlias {
        loop {
            let alias = self.entity_alias();
            if !taken(&alias) {
                return alias;
            }
        }
    }

    /// An instance alias for which `taken` returns false.
    pub fn unique_instance_alias(&self, taken: impl Fn(&InstanceAlias) -> bool) -> InstanceAlias {
        loop {
            let alias = self.instance_alias();
            if !taken(&alias) {
                return alias;
            }
        }
    }
}
