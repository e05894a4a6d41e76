//! Layout helpers for template DOMs.
//!
//! ```json
//! { "Source": "a/b", "Entities": { "<alias>": { ... } }, "Instances": { "<alias>": { ... } } }
//! ```
//!
//! In memory every `Instances` member is an expanded template DOM. On disk a
//! member is stored in link form, `{ "Source": "nested/path", "Patches": [...] }`.

use redlilium_dom::{Dom, DomObject, DomPath, Patch, from_dom, to_dom};
use redlilium_ecs::serialize::{COMPONENTS_KEY, ID_KEY, NAME_KEY};

use crate::error::TemplateError;

pub const SOURCE_KEY: &str = "Source";
pub const ENTITIES_KEY: &str = "Entities";
pub const INSTANCES_KEY: &str = "Instances";
pub const PATCHES_KEY: &str = "Patches";

const TEMPLATE_MEMBERS: [&str; 4] = [SOURCE_KEY, ENTITIES_KEY, INSTANCES_KEY, PATCHES_KEY];
const ENTITY_MEMBERS: [&str; 3] = [ID_KEY, NAME_KEY, COMPONENTS_KEY];

/// An empty template DOM for `source`.
pub fn empty_template_dom(source: &str) -> Dom {
    let mut dom = DomObject::new();
    dom.insert(SOURCE_KEY.into(), Dom::from(source));
    dom.insert(ENTITIES_KEY.into(), Dom::object());
    dom.insert(INSTANCES_KEY.into(), Dom::object());
    Dom::Object(dom)
}

/// Checks that `dom` is template-shaped, recursively through `Instances`.
pub fn validate_template_dom(dom: &Dom) -> Result<(), TemplateError> {
    validate_at(dom, &DomPath::root())
}

fn validate_at(dom: &Dom, at: &DomPath) -> Result<(), TemplateError> {
    let invalid = |what: String| TemplateError::InvalidTemplateDom(format!("'{at}': {what}"));
    let Dom::Object(map) = dom else {
        return Err(invalid(format!("expected object, found {}", dom.kind())));
    };
    if let Some(key) = map.keys().find(|key| !TEMPLATE_MEMBERS.contains(&key.as_str())) {
        return Err(invalid(format!("unknown member '{key}'")));
    }
    match map.get(SOURCE_KEY) {
        None | Some(Dom::String(_)) => {}
        Some(other) => return Err(invalid(format!("Source must be a string, found {}", other.kind()))),
    }
    match map.get(ENTITIES_KEY) {
        None => {}
        Some(Dom::Object(entities)) => {
            for (alias, entity) in entities {
                if !is_valid_alias(alias) {
                    return Err(invalid(format!("bad entity alias '{alias}'")));
                }
                let Dom::Object(members) = entity else {
                    return Err(invalid(format!("entity '{alias}' is {}", entity.kind())));
                };
                if let Some(key) = members.keys().find(|key| !ENTITY_MEMBERS.contains(&key.as_str())) {
                    return Err(invalid(format!("entity '{alias}' has unknown member '{key}'")));
                }
            }
        }
        Some(other) => return Err(invalid(format!("Entities must be an object, found {}", other.kind()))),
    }
    match map.get(INSTANCES_KEY) {
        None => Ok(()),
        Some(Dom::Object(instances)) => {
            let base = at.join(INSTANCES_KEY);
            for (alias, nested) in instances {
                if !is_valid_alias(alias) {
                    return Err(invalid(format!("bad instance alias '{alias}'")));
                }
                validate_at(nested, &base.join(alias.as_str()))?;
            }
            Ok(())
        }
        Some(other) => Err(invalid(format!("Instances must be an object, found {}", other.kind()))),
    }
}

/// Aliases are path segments of entity references, so they cannot be empty,
/// `..`, or contain `/`.
pub fn is_valid_alias(alias: &str) -> bool {
    !alias.is_empty() && alias != ".." && !alias.contains('/')
}

/// Adds missing `Entities` / `Instances` members, recursively.
pub fn ensure_members(dom: &mut Dom) {
    let Dom::Object(map) = dom else {
        return;
    };
    map.entry(ENTITIES_KEY.into()).or_insert_with(Dom::object);
    let instances = map.entry(INSTANCES_KEY.into()).or_insert_with(Dom::object);
    if let Dom::Object(instances) = instances {
        for nested in instances.values_mut() {
            ensure_members(nested);
        }
    }
}

pub fn source(dom: &Dom) -> Option<&str> {
    dom.get(SOURCE_KEY).and_then(Dom::as_str)
}

pub fn set_source(dom: &mut Dom, source: &str) {
    dom.insert(SOURCE_KEY, Dom::from(source));
}

pub fn entities(dom: &Dom) -> Option<&DomObject> {
    dom.get(ENTITIES_KEY).and_then(Dom::as_object)
}

pub fn instances(dom: &Dom) -> Option<&DomObject> {
    dom.get(INSTANCES_KEY).and_then(Dom::as_object)
}

pub fn instances_mut(dom: &mut Dom) -> Option<&mut DomObject> {
    dom.get_mut(INSTANCES_KEY).and_then(Dom::as_object_mut)
}

/// `/Entities/<alias>`
pub fn entity_path(alias: &str) -> DomPath {
    DomPath::from_tokens([ENTITIES_KEY, alias])
}

/// `/Instances/<alias>`
pub fn instance_path(alias: &str) -> DomPath {
    DomPath::from_tokens([INSTANCES_KEY, alias])
}

/// Number of entities in `dom` and all of its nested instances.
pub fn hierarchy_entity_count(dom: &Dom) -> usize {
    let own = entities(dom).map_or(0, |e| e.len());
    let nested: usize = instances(dom)
        .map(|i| i.values().map(hierarchy_entity_count).sum())
        .unwrap_or(0);
    own + nested
}

/// Whether a nested instance member is stored in link form.
pub fn is_link_form(member: &Dom) -> bool {
    member.get(PATCHES_KEY).is_some()
}

/// `{ "Source": source, "Patches": patches }`
pub fn link_form_dom(source: &str, patches: &Patch) -> Result<Dom, TemplateError> {
    let patches = to_dom(patches).map_err(|e| TemplateError::InvalidTemplateDom(e.to_string()))?;
    let mut dom = DomObject::new();
    dom.insert(SOURCE_KEY.into(), Dom::from(source));
    dom.insert(PATCHES_KEY.into(), patches);
    Ok(Dom::Object(dom))
}

/// Reads the `Patches` member of a link-form entry. A missing member reads
/// as an empty patch.
pub fn link_form_patches(member: &Dom) -> Result<Patch, TemplateError> {
    match member.get(PATCHES_KEY) {
        None | Some(Dom::Null) => Ok(Patch::new()),
        Some(patches) => from_dom(patches.clone())
            .map_err(|e| TemplateError::InvalidTemplateDom(format!("bad link patches: {e}"))),
    }
}
