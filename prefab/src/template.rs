use std::collections::BTreeSet;

use redlilium_dom::Dom;

use crate::ids::{LinkId, TemplateId};

/// A registered template: the canonical DOM shared by all of its instances.
#[derive(Debug, Clone)]
pub struct Template {
    id: TemplateId,
    dom: Dom,
    source_path: String,
    /// Links nesting other templates into this one.
    links: BTreeSet<LinkId>,
    dirty: bool,
    revision: u64,
    /// Revision and DOM that live instances were last brought up to.
    propagated_revision: u64,
    propagated_dom: Dom,
}

impl Template {
    pub(crate) fn new(id: TemplateId, dom: Dom, source_path: String) -> Self {
        Self {
            id,
            propagated_dom: dom.clone(),
            dom,
            source_path,
            links: BTreeSet::new(),
            dirty: false,
            revision: 0,
            propagated_revision: 0,
        }
    }

    pub fn id(&self) -> TemplateId {
        self.id
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    /// Links for which this template is the target.
    pub fn links(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.links.iter().copied()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Bumped on every DOM change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn propagated(&self) -> (u64, &Dom) {
        (self.propagated_revision, &self.propagated_dom)
    }

    pub(crate) fn mark_propagated(&mut self) {
        self.propagated_revision = self.revision;
        self.propagated_dom = self.dom.clone();
    }

    /// Replaces the DOM. Returns `false` (and keeps the revision) when the
    /// new DOM equals the current one.
    pub(crate) fn set_dom(&mut self, dom: Dom) -> bool {
        if dom == self.dom {
            return false;
        }
        self.dom = dom;
        self.bump_revision();
        true
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
    }

    pub(crate) fn set_source_path(&mut self, path: String) {
        self.source_path = path;
    }

    pub(crate) fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    pub(crate) fn add_link(&mut self, link: LinkId) {
        self.links.insert(link);
    }

    pub(crate) fn remove_link(&mut self, link: LinkId) -> bool {
        self.links.remove(&link)
    }
}
