//! Error types for templates, instances, loading and settings.

use redlilium_dom::{FormatError, PatchError};
use redlilium_ecs::EntityId;
use redlilium_ecs::serialize::{DeserializeError, SerializeError};
use thiserror::Error;

use crate::ids::{InstanceId, LinkId, TemplateId};

/// Errors raised by the [`TemplateStore`](crate::TemplateStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template source path is empty")]
    EmptySourcePath,
    #[error("a template is already registered at '{0}'")]
    DuplicateSourcePath(String),
    #[error("unknown template {0}")]
    UnknownTemplate(TemplateId),
    #[error("unknown link {0}")]
    UnknownLink(LinkId),
    #[error("invalid template DOM: {0}")]
    InvalidTemplateDom(String),
    /// Nesting `source` into `target` would make a template contain itself.
    #[error("nesting '{source_path}' into '{target_path}' creates a cycle")]
    CyclicNesting {
        source_path: String,
        target_path: String,
    },
    #[error("instance alias '{alias}' is already linked in '{target_path}'")]
    AliasInUse { alias: String, target_path: String },
    #[error("invalid path {0}")]
    InvalidPath(String),
    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// Errors raised while creating, instantiating or editing prefab instances.
#[derive(Debug, Error)]
pub enum PrefabError {
    /// The template cannot produce an instance: its DOM is malformed or its
    /// whole hierarchy holds no entity.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),
    #[error("unknown instance {0}")]
    UnknownInstance(InstanceId),
    #[error("entity {0} is not owned by the instance")]
    UnknownEntity(EntityId),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error("serialization failed: {0}")]
    Serialize(#[from] SerializeError),
    #[error("deserialization failed: {0}")]
    Deserialize(#[from] DeserializeError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Errors raised by the [`PrefabLoader`](crate::PrefabLoader) and storages.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("prefab '{0}' not found")]
    NotFound(String),
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Format(#[from] FormatError),
    /// A nested instance entry in `path` has no `Source` member.
    #[error("nested instance '{alias}' in '{path}' has no source")]
    MissingSource { path: String, alias: String },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("no prefab storage configured")]
    NoStorage,
}

/// One instance that could not be brought up to date with its template.
#[derive(Debug, Error)]
#[error("failed to update {instance} of {template}: {error}")]
pub struct InstanceUpdateError {
    pub instance: InstanceId,
    pub template: TemplateId,
    #[source]
    pub error: PrefabError,
}

/// Errors raised while reading [`PrefabSettings`](crate::PrefabSettings).
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}
