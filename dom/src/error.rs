//! Error types for DOM conversion, patching and text formats.

use thiserror::Error;

/// Errors raised while applying a [`Patch`](crate::Patch).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// The target path (or the parent of an `add` target) does not exist.
    /// Usually means the patch is stale for the document it is applied to.
    #[error("path not found: '{0}'")]
    PathNotFound(String),
    /// An array index token was malformed or out of bounds.
    #[error("invalid array index '{index}' at '{path}'")]
    InvalidIndex { path: String, index: String },
    /// The parent of the target path is a scalar.
    #[error("value at '{0}' is not an object or array")]
    NotAContainer(String),
    /// The pointer string could not be parsed.
    #[error("invalid JSON pointer '{0}'")]
    InvalidPointer(String),
}

/// Errors raised while converting between serde types and [`Dom`](crate::Dom).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("failed to convert value to DOM: {0}")]
    Serialize(String),
    #[error("failed to convert DOM to value: {0}")]
    Deserialize(String),
}

/// Errors raised by [`encode`](crate::encode) / [`decode`](crate::decode).
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("JSON format error: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "serialize-ron")]
    #[error("RON format error: {0}")]
    Ron(String),
    #[error("input is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("unsupported format '{0}'")]
    Unsupported(String),
}
