//! Structural diff between two [`Dom`] values.

use crate::patch::{Patch, PatchOp};
use crate::path::DomPath;
use crate::value::Dom;

/// Computes a patch that turns `before` into `after`.
///
/// The result satisfies `apply(before, &diff(before, after)) == after`. Object
/// members are compared by key; arrays are compared index by index, with
/// surplus elements removed from the highest index down and missing ones
/// appended. A change of value kind at a path is emitted as a single
/// `replace` of that subtree.
pub fn diff(before: &Dom, after: &Dom) -> Patch {
    let mut patch = Patch::new();
    diff_into(&mut patch, DomPath::root(), before, after);
    patch
}

fn diff_into(patch: &mut Patch, path: DomPath, before: &Dom, after: &Dom) {
    if before == after {
        return;
    }
    match (before, after) {
        (Dom::Object(old), Dom::Object(new)) => {
            for key in old.keys().filter(|k| !new.contains_key(*k)) {
                patch.push(PatchOp::Remove {
                    path: path.join(key.as_str()),
                });
            }
            for (key, value) in new {
                match old.get(key) {
                    Some(previous) => diff_into(patch, path.join(key.as_str()), previous, value),
                    None => patch.push(PatchOp::Add {
                        path: path.join(key.as_str()),
                        value: value.clone(),
                    }),
                }
            }
        }
        (Dom::Array(old), Dom::Array(new)) => {
            let common = old.len().min(new.len());
            for i in 0..common {
                diff_into(patch, path.join(i.to_string()), &old[i], &new[i]);
            }
            for i in (common..old.len()).rev() {
                patch.push(PatchOp::Remove {
                    path: path.join(i.to_string()),
                });
            }
            for (i, value) in new.iter().enumerate().skip(common) {
                patch.push(PatchOp::Add {
                    path: path.join(i.to_string()),
                    value: value.clone(),
                });
            }
        }
        _ => patch.push(PatchOp::Replace {
            path,
            value: after.clone(),
        }),
    }
}
