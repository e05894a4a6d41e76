//! Component trait and type-erased component storage.
//!
//! Use `#[derive(Component)]` from [`ecs_macro`] to auto-implement the trait.
//! The derived impl serializes every named field through
//! [`SerializeField`](crate::serialize::SerializeField), so `EntityId` fields
//! become entity references and everything else goes through serde.

use std::any::Any;

use redlilium_dom::Dom;

use crate::entity::EntityId;
use crate::serialize::{DeserializeContext, DeserializeError, SerializeContext, SerializeError};

/// Trait for serializable components.
///
/// # Deriving
///
/// ```ignore
/// #[derive(Clone, Component)]
/// struct Follow {
///     target: EntityId,
///     distance: f32,
/// }
/// ```
///
/// # Manual implementation
///
/// ```ignore
/// impl Component for Tag {
///     const NAME: &'static str = "Tag";
///     fn serialize_component(&self, ctx: &mut SerializeContext<'_>) -> Result<Dom, SerializeError> {
///         ctx.begin_struct(Self::NAME)?;
///         ctx.write_serde("label", &self.label)?;
///         ctx.end_struct()
///     }
///     fn deserialize_component(ctx: &mut DeserializeContext<'_>) -> Result<Self, DeserializeError> {
///         ctx.begin_struct(Self::NAME)?;
///         let label = ctx.read_serde("label")?;
///         ctx.end_struct()?;
///         Ok(Self { label })
///     }
/// }
/// ```
pub trait Component: Clone + Send + Sync + 'static {
    /// The struct name as a static string (e.g. `"Transform"`). This is the
    /// key of the component inside an entity's `Components` object.
    const NAME: &'static str;

    /// Serialize this component's fields into a DOM object.
    ///
    /// The default returns `NotSerializable`.
    fn serialize_component(&self, _ctx: &mut SerializeContext<'_>) -> Result<Dom, SerializeError> {
        Err(SerializeError::NotSerializable {
            component: Self::NAME,
        })
    }

    /// Deserialize a component from data loaded into `ctx`.
    fn deserialize_component(_ctx: &mut DeserializeContext<'_>) -> Result<Self, DeserializeError>
    where
        Self: Sized,
    {
        Err(DeserializeError::NotDeserializable {
            component: Self::NAME.to_string(),
        })
    }

    /// Collect all [`EntityId`] references stored in this component.
    ///
    /// The derive macro generates this from `EntityId`, `Vec<EntityId>` and
    /// `Option<EntityId>` fields. The default is a no-op.
    fn collect_entities(&self, _collector: &mut Vec<EntityId>) {}
}

// ---------------------------------------------------------------------------
// Type erasure
// ---------------------------------------------------------------------------

/// Object-safe view of a [`Component`].
///
/// Every `Component` gets this through a blanket impl, so entities can hold
/// `Box<dyn ComponentBag>` for arbitrary component types.
pub trait ComponentBag: Send + Sync {
    fn component_name(&self) -> &'static str;
    fn clone_box(&self) -> Box<dyn ComponentBag>;
    fn serialize_boxed(&self, ctx: &mut SerializeContext<'_>) -> Result<Dom, SerializeError>;
    fn collect_entities_boxed(&self, collector: &mut Vec<EntityId>);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ComponentBag for T {
    fn component_name(&self) -> &'static str {
        T::NAME
    }

    fn clone_box(&self) -> Box<dyn ComponentBag> {
        Box::new(self.clone())
    }

    fn serialize_boxed(&self, ctx: &mut SerializeContext<'_>) -> Result<Dom, SerializeError> {
        self.serialize_component(ctx)
    }

    fn collect_entities_boxed(&self, collector: &mut Vec<EntityId>) {
        self.collect_entities(collector);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Clone for Box<dyn ComponentBag> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl std::fmt::Debug for dyn ComponentBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Component({})", self.component_name())
    }
}
