use redlilium_dom::{Dom, Patch, PatchError, apply};

use crate::ids::{InstanceAlias, LinkId, TemplateId};

/// Nesting of a `source` template inside a `target` template.
///
/// The target holds the source DOM, with `patches` applied, at
/// `/Instances/<alias>`.
#[derive(Debug, Clone)]
pub struct Link {
    id: LinkId,
    source: TemplateId,
    target: TemplateId,
    alias: InstanceAlias,
    patches: Patch,
}

impl Link {
    pub(crate) fn new(
        id: LinkId,
        source: TemplateId,
        target: TemplateId,
        alias: InstanceAlias,
        patches: Patch,
    ) -> Self {
        Self {
            id,
            source,
            target,
            alias,
            patches,
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    /// The nested template.
    pub fn source(&self) -> TemplateId {
        self.source
    }

    /// The nesting template.
    pub fn target(&self) -> TemplateId {
        self.target
    }

    pub fn alias(&self) -> &InstanceAlias {
        &self.alias
    }

    /// Overrides relative to the source template's root.
    pub fn patches(&self) -> &Patch {
        &self.patches
    }

    pub(crate) fn set_patches(&mut self, patches: Patch) {
        self.patches = patches;
    }

    /// The DOM embedded in the target: `source_dom` with the overrides applied.
    pub fn linked_dom(&self, source_dom: &Dom) -> Result<Dom, PatchError> {
        apply(source_dom, &self.patches)
    }
}
