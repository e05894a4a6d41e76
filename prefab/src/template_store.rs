//! Registry of templates and the links that nest them into each other.

use std::collections::{HashMap, HashSet, VecDeque};

use redlilium_dom::{Dom, Patch};

use crate::error::TemplateError;
use crate::ids::{InstanceAlias, LinkId, TemplateId};
use crate::link::Link;
use crate::path::{is_relative, normalize_source_path};
use crate::template::Template;
use crate::template_dom::{self, INSTANCES_KEY};

/// Owns every template DOM and every link.
///
/// Mutations here are not visible to live instances until the
/// [`InstanceUpdateExecutor`](crate::InstanceUpdateExecutor) runs.
#[derive(Debug, Default)]
pub struct TemplateStore {
    templates: HashMap<TemplateId, Template>,
    by_path: HashMap<String, TemplateId>,
    links: HashMap<LinkId, Link>,
    next_template_id: u64,
    next_link_id: u64,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Template ids in allocation order.
    pub fn template_ids(&self) -> Vec<TemplateId> {
        let mut ids: Vec<_> = self.templates.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Registers an already-serialized template DOM under `source_path`.
    ///
    /// The path is normalized and written into the DOM's `Source` member.
    /// Missing `Entities` / `Instances` members are added.
    pub fn add_template(&mut self, dom: Dom, source_path: &str) -> Result<TemplateId, TemplateError> {
        let path = normalize_source_path(source_path)?;
        if self.by_path.contains_key(&path) {
            return Err(TemplateError::DuplicateSourcePath(path));
        }
        template_dom::validate_template_dom(&dom)?;

        let mut dom = dom;
        template_dom::ensure_members(&mut dom);
        template_dom::set_source(&mut dom, &path);

        let id = TemplateId(self.next_template_id);
        self.next_template_id += 1;
        log::info!("Registered template '{path}' as {id}");
        self.by_path.insert(path.clone(), id);
        self.templates.insert(id, Template::new(id, dom, path));
        Ok(id)
    }

    pub fn find_template(&self, id: TemplateId) -> Result<&Template, TemplateError> {
        self.templates
            .get(&id)
            .ok_or(TemplateError::UnknownTemplate(id))
    }

    fn template_mut(&mut self, id: TemplateId) -> Result<&mut Template, TemplateError> {
        self.templates
            .get_mut(&id)
            .ok_or(TemplateError::UnknownTemplate(id))
    }

    pub fn find_template_dom(&self, id: TemplateId) -> Result<&Dom, TemplateError> {
        self.find_template(id).map(Template::dom)
    }

    pub fn template_id_for_path(&self, path: &str) -> Option<TemplateId> {
        let path = normalize_source_path(path).ok()?;
        self.by_path.get(&path).copied()
    }

    /// Applies `patch` to the stored DOM.
    ///
    /// Returns `true` if the DOM changed, in which case the template is
    /// marked dirty and its revision bumped. Links whose nested member was
    /// removed by the patch are dropped.
    pub fn update_template_dom(&mut self, id: TemplateId, patch: &Patch) -> Result<bool, TemplateError> {
        let template = self.find_template(id)?;
        if patch.is_empty() {
            return Ok(false);
        }
        let updated = patch.apply(template.dom())?;
        self.commit_dom(id, updated)
    }

    /// Replaces the whole DOM. The `Source` member is kept in sync with the
    /// registered path. Returns `true` if the DOM changed.
    pub fn replace_template_dom(&mut self, id: TemplateId, dom: Dom) -> Result<bool, TemplateError> {
        let path = self.find_template(id)?.source_path().to_owned();
        let mut dom = dom;
        template_dom::ensure_members(&mut dom);
        template_dom::set_source(&mut dom, &path);
        self.commit_dom(id, dom)
    }

    fn commit_dom(&mut self, id: TemplateId, dom: Dom) -> Result<bool, TemplateError> {
        template_dom::validate_template_dom(&dom)?;
        let template = self.template_mut(id)?;
        if !template.set_dom(dom) {
            return Ok(false);
        }
        template.set_dirty(true);
        self.prune_orphan_links(id);
        Ok(true)
    }

    /// Drops links of `target` whose `/Instances/<alias>` member is gone.
    fn prune_orphan_links(&mut self, target: TemplateId) {
        let Some(template) = self.templates.get(&target) else {
            return;
        };
        let orphans: Vec<LinkId> = template
            .links()
            .filter(|link_id| {
                self.links.get(link_id).is_some_and(|link| {
                    template_dom::instances(template.dom())
                        .is_none_or(|members| !members.contains_key(link.alias().as_str()))
                })
            })
            .collect();
        for link_id in orphans {
            if let Some(link) = self.links.remove(&link_id) {
                log::debug!("Dropping {link_id}: '{}' removed from {target}", link.alias());
            }
            if let Some(template) = self.templates.get_mut(&target) {
                template.remove_link(link_id);
            }
        }
    }

    /// Removes a template together with every link that touches it.
    ///
    /// Templates that nested the removed one lose the corresponding
    /// `/Instances/<alias>` member. Their ids are returned so the caller can
    /// propagate the change.
    pub fn remove_template(&mut self, id: TemplateId) -> Result<Vec<TemplateId>, TemplateError> {
        let template = self
            .templates
            .remove(&id)
            .ok_or(TemplateError::UnknownTemplate(id))?;
        self.by_path.remove(template.source_path());
        log::info!("Removed template '{}' ({id})", template.source_path());

        for link_id in template.links() {
            self.links.remove(&link_id);
        }

        let mut affected = Vec::new();
        for link_id in self.links_with_source(id) {
            let Some(link) = self.links.remove(&link_id) else {
                continue;
            };
            let Some(target) = self.templates.get_mut(&link.target()) else {
                continue;
            };
            target.remove_link(link_id);
            let mut dom = target.dom().clone();
            if let Some(members) = template_dom::instances_mut(&mut dom) {
                members.remove(link.alias().as_str());
            }
            if target.set_dom(dom) {
                target.set_dirty(true);
            }
            if !affected.contains(&link.target()) {
                affected.push(link.target());
            }
        }
        Ok(affected)
    }

    pub fn remove_all_templates(&mut self) {
        log::info!("Removing all {} templates", self.templates.len());
        self.templates.clear();
        self.by_path.clear();
        self.links.clear();
    }

    /// Moves a template to `new_path` and rewrites its `Source` member.
    ///
    /// `new_path` must be relative and not registered by another template.
    /// The dirty flag is left untouched.
    pub fn update_template_file_path(&mut self, id: TemplateId, new_path: &str) -> Result<(), TemplateError> {
        if !is_relative(new_path) {
            return Err(TemplateError::InvalidPath(format!("'{new_path}' is not relative")));
        }
        let path = normalize_source_path(new_path)?;
        let old_path = self.find_template(id)?.source_path().to_owned();
        if path == old_path {
            return Ok(());
        }
        if self.by_path.contains_key(&path) {
            return Err(TemplateError::DuplicateSourcePath(path));
        }

        let template = self.template_mut(id)?;
        let mut dom = template.dom().clone();
        template_dom::set_source(&mut dom, &path);
        template.set_dom(dom);
        template.set_source_path(path.clone());

        self.by_path.remove(&old_path);
        self.by_path.insert(path.clone(), id);
        log::info!("Moved template {id} from '{old_path}' to '{path}'");
        Ok(())
    }

    /// Returns `true` if the flag changed.
    pub fn set_template_dirty(&mut self, id: TemplateId, dirty: bool) -> Result<bool, TemplateError> {
        let template = self.template_mut(id)?;
        let changed = template.is_dirty() != dirty;
        template.set_dirty(dirty);
        Ok(changed)
    }

    pub fn is_template_dirty(&self, id: TemplateId) -> Result<bool, TemplateError> {
        self.find_template(id).map(Template::is_dirty)
    }

    /// Source paths of every dirty template reachable from `root` through
    /// nesting, `root` included. Each path appears once, parents first.
    pub fn dirty_template_paths(&self, root: TemplateId) -> Result<Vec<String>, TemplateError> {
        self.find_template(root)?;
        let mut visited = HashSet::new();
        let mut paths = Vec::new();
        self.collect_dirty(root, &mut visited, &mut paths);
        Ok(paths)
    }

    fn collect_dirty(&self, id: TemplateId, visited: &mut HashSet<TemplateId>, paths: &mut Vec<String>) {
        if !visited.insert(id) {
            return;
        }
        let Some(template) = self.templates.get(&id) else {
            return;
        };
        if template.is_dirty() {
            paths.push(template.source_path().to_owned());
        }
        for link_id in template.links() {
            if let Some(link) = self.links.get(&link_id) {
                self.collect_dirty(link.source(), visited, paths);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Links
    // -----------------------------------------------------------------------

    /// Nests `source` into `target` under `alias`.
    ///
    /// Writes `apply(source DOM, patches)` to `target`'s `/Instances/<alias>`
    /// and marks `target` dirty.
    pub fn create_link(
        &mut self,
        target: TemplateId,
        source: TemplateId,
        alias: InstanceAlias,
        patches: Patch,
    ) -> Result<LinkId, TemplateError> {
        let target_path = self.find_template(target)?.source_path().to_owned();
        let source_template = self.find_template(source)?;
        if source == target || self.nests(source, target) {
            return Err(TemplateError::CyclicNesting {
                source_path: source_template.source_path().to_owned(),
                target_path,
            });
        }
        if self.link_for_alias(target, alias.as_str()).is_some() {
            return Err(TemplateError::AliasInUse {
                alias: alias.into_string(),
                target_path,
            });
        }
        let linked = apply_checked(source_template.dom(), &patches)?;
        log::debug!(
            "Linking '{}' into '{target_path}' as '{alias}'",
            source_template.source_path()
        );

        let id = LinkId(self.next_link_id);
        self.next_link_id += 1;
        let target_template = self.template_mut(target)?;
        let mut dom = target_template.dom().clone();
        write_member(&mut dom, &alias, linked);
        target_template.set_dom(dom);
        target_template.set_dirty(true);
        target_template.add_link(id);
        self.links.insert(id, Link::new(id, source, target, alias, patches));
        Ok(id)
    }

    /// Removes a link and its `/Instances/<alias>` member from the target.
    pub fn remove_link(&mut self, id: LinkId) -> Result<Link, TemplateError> {
        let link = self.links.remove(&id).ok_or(TemplateError::UnknownLink(id))?;
        if let Some(target) = self.templates.get_mut(&link.target()) {
            target.remove_link(id);
            let mut dom = target.dom().clone();
            if let Some(members) = template_dom::instances_mut(&mut dom) {
                members.remove(link.alias().as_str());
            }
            target.set_dom(dom);
            target.set_dirty(true);
        }
        Ok(link)
    }

    pub fn find_link(&self, id: LinkId) -> Result<&Link, TemplateError> {
        self.links.get(&id).ok_or(TemplateError::UnknownLink(id))
    }

    /// Links that nest `source` into other templates, in creation order.
    pub fn links_with_source(&self, source: TemplateId) -> Vec<LinkId> {
        let mut ids: Vec<_> = self
            .links
            .values()
            .filter(|link| link.source() == source)
            .map(Link::id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// The link of `target` nesting a template under `alias`.
    pub fn link_for_alias(&self, target: TemplateId, alias: &str) -> Option<&Link> {
        let template = self.templates.get(&target)?;
        template
            .links()
            .filter_map(|id| self.links.get(&id))
            .find(|link| link.alias().as_str() == alias)
    }

    /// Replaces a link's override patch and rewrites the target member.
    ///
    /// Returns `true` if the target DOM changed. The target is marked dirty
    /// either way, since its stored link form changed.
    pub fn set_link_patches(&mut self, id: LinkId, patches: Patch) -> Result<bool, TemplateError> {
        let link = self.find_link(id)?;
        let source_dom = self.find_template_dom(link.source())?;
        apply_checked(source_dom, &patches)?;
        let target = link.target();

        if let Some(link) = self.links.get_mut(&id) {
            link.set_patches(patches);
        }
        let changed = self.update_link_target(id)?;
        self.template_mut(target)?.set_dirty(true);
        Ok(changed)
    }

    /// Recomputes a link's member in its target. Returns `true` if the target
    /// DOM changed. The target is not marked dirty: its stored link form is
    /// unaffected by changes of the source.
    pub fn update_link_target(&mut self, id: LinkId) -> Result<bool, TemplateError> {
        let link = self.find_link(id)?;
        let linked = apply_checked(self.find_template_dom(link.source())?, link.patches())?;
        let alias = link.alias().clone();
        let target_id = link.target();
        let target = self.template_mut(target_id)?;

        let mut dom = target.dom().clone();
        write_member(&mut dom, &alias, linked);
        Ok(target.set_dom(dom))
    }

    /// Re-targets every link whose source changed, starting from `id`.
    ///
    /// Links are processed in breadth-first batches. A target whose DOM did
    /// not change ends propagation on its branch. Returns every changed
    /// target, each after all templates it nests.
    pub fn propagate_links(&mut self, id: TemplateId) -> Result<Vec<TemplateId>, TemplateError> {
        self.find_template(id)?;
        let mut changed: Vec<TemplateId> = Vec::new();
        let mut batches: VecDeque<Vec<LinkId>> = VecDeque::new();
        batches.push_back(self.links_with_source(id));

        while let Some(batch) = batches.pop_front() {
            let mut batch_changed: Vec<TemplateId> = Vec::new();
            for link_id in batch {
                let target = self.find_link(link_id)?.target();
                match self.update_link_target(link_id) {
                    Ok(true) => {
                        log::debug!("Propagated {link_id} into {target}");
                        if !batch_changed.contains(&target) {
                            batch_changed.push(target);
                        }
                    }
                    Ok(false) => {}
                    Err(err) => {
                        log::warn!("Failed to propagate {link_id} into {target}: {err}");
                    }
                }
            }
            let next: Vec<LinkId> = batch_changed
                .iter()
                .flat_map(|target| self.links_with_source(*target))
                .collect();
            for target in batch_changed {
                changed.retain(|t| *t != target);
                changed.push(target);
            }
            if !next.is_empty() {
                batches.push_back(next);
            }
        }
        Ok(changed)
    }

    /// Whether `ancestor` nests `descendant`, directly or transitively.
    pub fn nests(&self, ancestor: TemplateId, descendant: TemplateId) -> bool {
        let mut stack = vec![ancestor];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(template) = self.templates.get(&current) else {
                continue;
            };
            for link_id in template.links() {
                if let Some(link) = self.links.get(&link_id) {
                    if link.source() == descendant {
                        return true;
                    }
                    stack.push(link.source());
                }
            }
        }
        false
    }

    /// Templates that nest `id` directly.
    pub fn link_targets(&self, id: TemplateId) -> Vec<TemplateId> {
        let mut targets = Vec::new();
        for link_id in self.links_with_source(id) {
            if let Some(link) = self.links.get(&link_id) {
                if !targets.contains(&link.target()) {
                    targets.push(link.target());
                }
            }
        }
        targets
    }

    pub(crate) fn mark_propagated(&mut self, id: TemplateId) {
        if let Some(template) = self.templates.get_mut(&id) {
            template.mark_propagated();
        }
    }
}

fn apply_checked(dom: &Dom, patches: &Patch) -> Result<Dom, TemplateError> {
    let linked = patches.apply(dom)?;
    template_dom::validate_template_dom(&linked)?;
    Ok(linked)
}

fn write_member(dom: &mut Dom, alias: &InstanceAlias, member: Dom) {
    match template_dom::instances_mut(dom) {
        Some(members) => {
            members.insert(alias.as_str().to_owned(), member);
        }
        None => {
            let mut members = Dom::object();
            members.insert(alias.as_str(), member);
            dom.insert(INSTANCES_KEY, members);
        }
    }
}
