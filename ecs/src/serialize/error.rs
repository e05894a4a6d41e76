//! Error types for component serialization and deserialization.

use thiserror::Error;

/// Errors that can occur during component serialization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SerializeError {
    /// A field could not be converted to a [`Dom`](redlilium_dom::Dom).
    #[error("failed to serialize field '{field}': {message}")]
    FieldError { field: String, message: String },
    /// The component does not support serialization.
    #[error("component '{component}' does not support serialization")]
    NotSerializable { component: &'static str },
}

/// Errors that can occur during component deserialization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeserializeError {
    /// A required field was missing from the serialized data.
    #[error("missing field '{field}' in component '{component}'")]
    MissingField { field: String, component: String },
    /// A field value had an unexpected type.
    #[error("type mismatch for field '{field}': expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },
    /// The component name is not registered in the [`ComponentRegistry`](crate::ComponentRegistry).
    #[error("unknown component type '{type_name}'")]
    UnknownComponent { type_name: String },
    /// The component does not support deserialization.
    #[error("component '{component}' does not support deserialization")]
    NotDeserializable { component: String },
    /// The entity DOM does not have the expected shape.
    #[error("malformed entity data: {0}")]
    Malformed(String),
}
