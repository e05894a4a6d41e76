//! # RedLilium Prefab
//!
//! Reusable entity templates and the live instances built from them.
//!
//! ## Core Types
//!
//! - [`TemplateStore`] — registered template DOMs, keyed by source path, and
//!   the [`Link`]s that nest one template inside another
//! - [`Instance`] — a live entity tree with stable `alias <-> id` tables
//! - [`InstanceUpdateExecutor`] — re-applies template edits to live instances
//! - [`PrefabLoader`] — reads and writes templates through a
//!   [`PrefabStorage`] ([`MemoryStorage`], [`FileSystemStorage`])
//! - [`PrefabSystem`] — facade tying the above together
//!
//! ## Template DOM
//!
//! ```json
//! {
//!   "Source": "props/crate",
//!   "Entities": { "Entity_[1]": { "Id": "Entity_[1]", "Name": "Crate", "Components": {} } },
//!   "Instances": { "Instance_[2]": { "Source": "props/lid", "Patches": [] } }
//! }
//! ```
//!
//! Entity references inside components are stored as alias paths relative to
//! the referencing instance; see [`alias`]. Configuration comes from
//! [`PrefabSettings`].

pub mod alias;
mod error;
mod ids;
mod instance;
mod instance_registry;
mod link;
mod loader;
mod observer;
pub mod path;
mod settings;
mod system;
mod template;
pub mod template_dom;
mod template_store;
mod update_executor;

pub use alias::{EntityReference, InstanceEntityIdMapper, InstanceReferenceResolver};
pub use error::{InstanceUpdateError, LoadError, PrefabError, SettingsError, TemplateError};
pub use ids::{AliasGenerator, EntityAlias, InstanceAlias, InstanceId, LinkId, TemplateId};
pub use instance::{Instance, InstanceMut, InstanceRef, NodeId};
pub use instance_registry::InstanceRegistry;
pub use link::Link;
pub use loader::{FileSystemStorage, MemoryStorage, PrefabLoader, PrefabStorage};
pub use observer::PrefabObserver;
pub use settings::{PrefabSettings, SaveFormat};
pub use system::PrefabSystem;
pub use template::Template;
pub use template_store::TemplateStore;
pub use update_executor::{
    DEFAULT_MAX_PROPAGATION_PASSES, ExecutorState, InstanceUpdateExecutor, UpdateContext, UpdateReport,
};
