//! Patch operations and their application.
//!
//! A [`Patch`] is an ordered list of [`PatchOp`]s. Operations are applied
//! strictly in sequence: an earlier `add` may create the container a later
//! operation targets. The serialized form matches RFC 6902:
//!
//! ```json
//! [
//!   { "op": "add", "path": "/Entities/Entity_[1]", "value": { "Name": "A" } },
//!   { "op": "replace", "path": "/Entities/Entity_[2]/Name", "value": "B" },
//!   { "op": "remove", "path": "/Entities/Entity_[3]" }
//! ]
//! ```

use serde::{Deserialize, Serialize};

use crate::error::PatchError;
use crate::path::DomPath;
use crate::value::{Dom, parse_array_index};

/// A single structural edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert a member or array element. On an existing object member this
    /// overwrites the value. The array token `-` appends.
    Add { path: DomPath, value: Dom },
    /// Delete an existing member or array element.
    Remove { path: DomPath },
    /// Overwrite an existing value.
    Replace { path: DomPath, value: Dom },
}

impl PatchOp {
    pub fn path(&self) -> &DomPath {
        match self {
            PatchOp::Add { path, .. } | PatchOp::Remove { path } | PatchOp::Replace { path, .. } => {
                path
            }
        }
    }

    fn path_mut(&mut self) -> &mut DomPath {
        match self {
            PatchOp::Add { path, .. } | PatchOp::Remove { path } | PatchOp::Replace { path, .. } => {
                path
            }
        }
    }

    /// Short name matching the RFC 6902 `op` member.
    pub fn name(&self) -> &'static str {
        match self {
            PatchOp::Add { .. } => "add",
            PatchOp::Remove { .. } => "remove",
            PatchOp::Replace { .. } => "replace",
        }
    }
}

/// An ordered sequence of [`PatchOp`]s.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ops(ops: Vec<PatchOp>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<PatchOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn push(&mut self, op: PatchOp) {
        self.ops.push(op);
    }

    pub fn extend(&mut self, other: Patch) {
        self.ops.extend(other.ops);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PatchOp> {
        self.ops.iter()
    }

    /// Prefixes every operation path with `prefix`.
    ///
    /// Used to lift a patch computed on a nested DOM into the DOM that
    /// embeds it.
    pub fn rebase(mut self, prefix: &DomPath) -> Self {
        for op in &mut self.ops {
            let path = op.path_mut();
            *path = prefix.concat(path);
        }
        self
    }

    /// Keeps only the operations under `prefix`, with the prefix removed.
    pub fn strip_prefix(self, prefix: &DomPath) -> Self {
        self.split_prefix(prefix).0
    }

    /// Splits the patch into operations under `prefix` (with the prefix
    /// stripped) and all remaining operations. Relative order is kept in
    /// both halves.
    pub fn split_prefix(self, prefix: &DomPath) -> (Patch, Patch) {
        let mut inside = Vec::new();
        let mut outside = Vec::new();
        for mut op in self.ops {
            match op.path().strip_prefix(prefix) {
                Some(stripped) if !stripped.is_root() => {
                    *op.path_mut() = stripped;
                    inside.push(op);
                }
                _ => outside.push(op),
            }
        }
        (Patch { ops: inside }, Patch { ops: outside })
    }

    /// Applies the patch to a copy of `dom`.
    pub fn apply(&self, dom: &Dom) -> Result<Dom, PatchError> {
        apply(dom, self)
    }
}

impl IntoIterator for Patch {
    type Item = PatchOp;
    type IntoIter = std::vec::IntoIter<PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a Patch {
    type Item = &'a PatchOp;
    type IntoIter = std::slice::Iter<'a, PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

impl FromIterator<PatchOp> for Patch {
    fn from_iter<I: IntoIterator<Item = PatchOp>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

/// Applies `patch` to a copy of `dom` and returns the result.
///
/// `dom` is left untouched, including when an operation fails.
pub fn apply(dom: &Dom, patch: &Patch) -> Result<Dom, PatchError> {
    let mut out = dom.clone();
    apply_in_place(&mut out, patch)?;
    Ok(out)
}

/// Applies `patch` directly to `dom`.
///
/// On error the document may be partially patched; use [`apply`] when the
/// original must survive a failure.
pub fn apply_in_place(dom: &mut Dom, patch: &Patch) -> Result<(), PatchError> {
    for op in patch {
        apply_op(dom, op)?;
    }
    Ok(())
}

fn apply_op(dom: &mut Dom, op: &PatchOp) -> Result<(), PatchError> {
    match op {
        PatchOp::Add { path, value } => add(dom, path, value.clone()),
        PatchOp::Remove { path } => remove(dom, path),
        PatchOp::Replace { path, value } => {
            let target = dom
                .pointer_mut(path)
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
            *target = value.clone();
            Ok(())
        }
    }
}

fn add(dom: &mut Dom, path: &DomPath, value: Dom) -> Result<(), PatchError> {
    let (Some(parent), Some(token)) = (path.parent(), path.last()) else {
        *dom = value;
        return Ok(());
    };
    let container = dom
        .pointer_mut(&parent)
        .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
    match container {
        Dom::Object(map) => {
            map.insert(token.to_owned(), value);
            Ok(())
        }
        Dom::Array(items) => {
            if token == "-" {
                items.push(value);
                return Ok(());
            }
            match parse_array_index(token) {
                Some(index) if index <= items.len() => {
                    items.insert(index, value);
                    Ok(())
                }
                _ => Err(PatchError::InvalidIndex {
                    path: parent.to_string(),
                    index: token.to_owned(),
                }),
            }
        }
        _ => Err(PatchError::NotAContainer(parent.to_string())),
    }
}

fn remove(dom: &mut Dom, path: &DomPath) -> Result<(), PatchError> {
    let (Some(parent), Some(token)) = (path.parent(), path.last()) else {
        *dom = Dom::Null;
        return Ok(());
    };
    let container = dom
        .pointer_mut(&parent)
        .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
    match container {
        Dom::Object(map) => map
            .remove(token)
            .map(|_| ())
            .ok_or_else(|| PatchError::PathNotFound(path.to_string())),
        Dom::Array(items) => {
            let index = parse_array_index(token).ok_or_else(|| PatchError::InvalidIndex {
                path: parent.to_string(),
                index: token.to_owned(),
            })?;
            if index >= items.len() {
                return Err(PatchError::PathNotFound(path.to_string()));
            }
            items.remove(index);
            Ok(())
        }
        _ => Err(PatchError::NotAContainer(parent.to_string())),
    }
}
