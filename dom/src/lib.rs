//! # RedLilium DOM
//!
//! A JSON-shaped document model used as the storage and exchange format for
//! prefab templates.
//!
//! - [`Dom`] — canonical tree value with key-sorted objects
//! - [`DomPath`] — RFC 6901 JSON Pointer
//! - [`Patch`] / [`PatchOp`] — RFC 6902-shaped edits (`add`, `remove`, `replace`)
//! - [`diff`] / [`apply`] — structural difference and its application
//! - [`encode`] / [`decode`] — JSON and RON text formats
//!
//! The central law is `apply(a, &diff(a, b)) == Ok(b)` for any two documents.

mod diff;
mod error;
mod format;
mod patch;
pub mod path;
mod value;

pub use diff::diff;
pub use error::{DomError, FormatError, PatchError};
pub use format::{Format, decode, decode_bytes, decode_patch, encode, encode_patch};
pub use patch::{Patch, PatchOp, apply, apply_in_place};
pub use path::DomPath;
pub use value::{Dom, DomObject, from_dom, to_dom};
