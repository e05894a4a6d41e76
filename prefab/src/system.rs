//! The `PrefabSystem` facade.

use std::collections::{HashMap, HashSet};

use redlilium_dom::{Dom, Patch, PatchError, PatchOp, apply, diff};
use redlilium_ecs::serialize::serialize_entity;
use redlilium_ecs::{ComponentRegistry, EntityAllocator, EntityFactory, EntityId, EntityObject};

use crate::alias::InstanceEntityIdMapper;
use crate::error::{LoadError, PrefabError, TemplateError};
use crate::ids::{AliasGenerator, EntityAlias, InstanceAlias, InstanceId, LinkId, TemplateId};
use crate::instance::{Instance, NodeId};
use crate::instance_registry::InstanceRegistry;
use crate::loader::{FileSystemStorage, PrefabLoader, PrefabStorage};
use crate::observer::PrefabObserver;
use crate::path::normalize_source_path;
use crate::settings::PrefabSettings;
use crate::template::Template;
use crate::template_dom;
use crate::template_store::TemplateStore;
use crate::update_executor::{InstanceUpdateExecutor, UpdateContext, UpdateReport};

/// Owns templates, live instances and the collaborators needed to keep
/// them in sync.
///
/// Template edits made through the system are propagated through links
/// immediately and queued for instance update; call
/// [`update_template_instances_in_queue`](Self::update_template_instances_in_queue)
/// to bring live instances up to date.
pub struct PrefabSystem {
    store: TemplateStore,
    executor: InstanceUpdateExecutor,
    instances: InstanceRegistry,
    factory: Box<dyn EntityFactory>,
    components: ComponentRegistry,
    aliases: AliasGenerator,
    loader: Option<PrefabLoader>,
    observers: Vec<Box<dyn PrefabObserver>>,
}

impl PrefabSystem {
    /// A system with an [`EntityAllocator`] and no storage.
    pub fn new(components: ComponentRegistry) -> Self {
        Self {
            store: TemplateStore::new(),
            executor: InstanceUpdateExecutor::default(),
            instances: InstanceRegistry::new(),
            factory: Box::new(EntityAllocator::new()),
            components,
            aliases: AliasGenerator::default(),
            loader: None,
            observers: Vec::new(),
        }
    }

    /// A system configured from `settings`, storing templates under
    /// `settings.storage_root`.
    pub fn from_settings(settings: &PrefabSettings, components: ComponentRegistry) -> Self {
        let storage = FileSystemStorage::new(&settings.storage_root);
        let loader = PrefabLoader::new(Box::new(storage))
            .with_format(settings.save_format.to_format(), settings.pretty);
        Self {
            executor: InstanceUpdateExecutor::new(settings.max_propagation_passes),
            aliases: AliasGenerator::new(&settings.entity_alias_prefix, &settings.instance_alias_prefix),
            loader: Some(loader),
            ..Self::new(components)
        }
    }

    pub fn with_entity_factory(mut self, factory: Box<dyn EntityFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_storage(mut self, storage: Box<dyn PrefabStorage>) -> Self {
        let loader = PrefabLoader::new(storage);
        self.loader = Some(match &self.loader {
            Some(existing) => loader.with_format(existing.format(), true),
            None => loader,
        });
        self
    }

    pub fn with_loader(mut self, loader: PrefabLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn add_observer(&mut self, observer: Box<dyn PrefabObserver>) {
        self.observers.push(observer);
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    pub fn executor(&self) -> &InstanceUpdateExecutor {
        &self.executor
    }

    pub fn instances(&self) -> &InstanceRegistry {
        &self.instances
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.components
    }

    pub fn entity_factory(&self) -> &dyn EntityFactory {
        self.factory.as_ref()
    }

    pub fn loader(&self) -> Option<&PrefabLoader> {
        self.loader.as_ref()
    }

    /// A new, empty entity with a fresh id.
    pub fn create_entity(&mut self, name: impl Into<String>) -> EntityObject {
        EntityObject::new(self.factory.create_entity_id(), name)
    }

    /// Runs `f` on the store and reports every dirty flag it flipped.
    fn track_dirty<R>(&mut self, f: impl FnOnce(&mut TemplateStore) -> R) -> R {
        let before: HashMap<TemplateId, bool> = self
            .store
            .template_ids()
            .into_iter()
            .filter_map(|id| self.store.is_template_dirty(id).ok().map(|dirty| (id, dirty)))
            .collect();
        let result = f(&mut self.store);
        for id in self.store.template_ids() {
            let Ok(dirty) = self.store.is_template_dirty(id) else {
                continue;
            };
            if before.get(&id).copied().unwrap_or(false) != dirty {
                for observer in &mut self.observers {
                    observer.on_template_dirty_changed(id, dirty);
                }
            }
        }
        result
    }

    /// Queues `template` and every template its links changed.
    fn propagate(&mut self, template: TemplateId) -> Result<(), PrefabError> {
        self.executor.add_template_instances_to_queue(template);
        for changed in self.store.propagate_links(template)? {
            self.executor.add_template_instances_to_queue(changed);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Templates
    // -----------------------------------------------------------------------

    /// Creates a template from owned entities and nested instances, and
    /// returns a live instance of it that keeps the given entities.
    ///
    /// Entities get fresh aliases. Each nested instance is linked to its own
    /// template, with its current state as the link override. References to
    /// entities outside the given set are stored as invalid.
    pub fn create_prefab(
        &mut self,
        entities: Vec<EntityObject>,
        nested_instances: Vec<Instance>,
        source_path: &str,
    ) -> Result<InstanceId, PrefabError> {
        let path = normalize_source_path(source_path)?;
        if self.store.template_id_for_path(&path).is_some() {
            return Err(TemplateError::DuplicateSourcePath(path).into());
        }
        let mut seen = HashSet::new();
        if !entities.iter().all(|entity| seen.insert(entity.id())) {
            return Err(PrefabError::InvalidTemplate("an entity is listed twice".into()));
        }
        let mut nested_templates = Vec::with_capacity(nested_instances.len());
        for nested in &nested_instances {
            let template = nested
                .template_id()
                .filter(|id| self.store.find_template(*id).is_ok())
                .ok_or_else(|| {
                    PrefabError::InvalidTemplate(format!(
                        "nested instance of '{}' has no registered template",
                        nested.source_path()
                    ))
                })?;
            nested_templates.push(template);
        }
        seen.extend(nested_instances.iter().flat_map(Instance::entity_ids));
        for entity in &entities {
            for target in entity.referenced_entities() {
                if target.is_valid() && !seen.contains(&target) {
                    log::warn!(
                        "'{}' references {target} outside '{path}', it is stored as invalid",
                        entity.name()
                    );
                }
            }
        }

        let mut instance = Instance::new(None, path.clone());
        for entity in entities {
            let alias = self
                .aliases
                .unique_entity_alias(|a| instance.get_entity_id(a.as_str()).is_valid());
            instance.adopt_entity(NodeId::ROOT, alias, entity);
        }
        let mut links = Vec::with_capacity(nested_templates.len());
        for (nested, template) in nested_instances.into_iter().zip(nested_templates) {
            let alias = self
                .aliases
                .unique_instance_alias(|a| instance.find_nested_instance(a.as_str()).is_some());
            instance.graft(NodeId::ROOT, alias.clone(), nested);
            links.push((alias, template));
        }

        match self.register_prefab(&instance, &path, links) {
            Ok(template) => {
                let stored = self.store.find_template(template)?;
                instance.set_root_template(template, &path);
                instance.mark_synced(stored.revision(), stored.dom());
                Ok(self.instances.insert(instance))
            }
            Err(err) => {
                instance.release_all(self.factory.as_mut());
                Err(err)
            }
        }
    }

    fn register_prefab(
        &mut self,
        instance: &Instance,
        path: &str,
        links: Vec<(InstanceAlias, TemplateId)>,
    ) -> Result<TemplateId, PrefabError> {
        let dom = instance.to_dom()?;
        if template_dom::hierarchy_entity_count(&dom) == 0 {
            return Err(PrefabError::InvalidTemplate(format!("'{path}' holds no entities")));
        }
        self.track_dirty(|store| -> Result<TemplateId, PrefabError> {
            let template = store.add_template(dom.clone(), path)?;
            let linked = links.into_iter().try_for_each(|(alias, source)| -> Result<(), TemplateError> {
                let member = dom
                    .pointer(&template_dom::instance_path(alias.as_str()))
                    .ok_or_else(|| PatchError::PathNotFound(template_dom::instance_path(alias.as_str()).to_string()))?;
                let patches = diff(store.find_template_dom(source)?, member);
                store.create_link(template, source, alias, patches).map(|_| ())
            });
            if let Err(err) = linked {
                store.remove_template(template)?;
                return Err(err.into());
            }
            store.set_template_dirty(template, true)?;
            store.mark_propagated(template);
            Ok(template)
        })
    }

    /// Registers an already-serialized template.
    pub fn add_template(&mut self, dom: Dom, source_path: &str) -> Result<TemplateId, PrefabError> {
        Ok(self.store.add_template(dom, source_path)?)
    }

    pub fn find_template(&self, id: TemplateId) -> Result<&Template, PrefabError> {
        Ok(self.store.find_template(id)?)
    }

    pub fn find_template_dom(&self, id: TemplateId) -> Result<&Dom, PrefabError> {
        Ok(self.store.find_template_dom(id)?)
    }

    pub fn template_id_for_path(&self, path: &str) -> Option<TemplateId> {
        self.store.template_id_for_path(path)
    }

    /// Patches a template, propagates through links and queues the
    /// affected instances. Returns `true` if the template changed.
    pub fn update_template_dom(&mut self, id: TemplateId, patch: &Patch) -> Result<bool, PrefabError> {
        let changed = self.track_dirty(|store| store.update_template_dom(id, patch))?;
        if changed {
            self.propagate(id)?;
        }
        Ok(changed)
    }

    /// Replaces a template DOM when it differs from the stored one.
    pub fn update_prefab_template(&mut self, id: TemplateId, dom: Dom) -> Result<bool, PrefabError> {
        let changed = self.track_dirty(|store| store.replace_template_dom(id, dom))?;
        if changed {
            self.propagate(id)?;
        }
        Ok(changed)
    }

    /// Removes a template and detaches it from every template nesting it.
    ///
    /// Live instances of the removed template stay alive but are no longer
    /// updated.
    pub fn remove_template(&mut self, id: TemplateId) -> Result<(), PrefabError> {
        let affected = self.track_dirty(|store| store.remove_template(id))?;
        self.executor.remove_template_from_queue(id);
        for observer in &mut self.observers {
            observer.on_template_removed(id);
        }
        for target in affected {
            self.propagate(target)?;
        }
        Ok(())
    }

    pub fn remove_all_templates(&mut self) {
        self.store.remove_all_templates();
        self.executor.clear();
        for observer in &mut self.observers {
            observer.on_all_templates_removed();
        }
    }

    /// Moves a template to a new relative path. Templates nesting it are
    /// marked dirty, since their stored links name the old path.
    pub fn update_template_file_path(&mut self, id: TemplateId, new_path: &str) -> Result<(), PrefabError> {
        self.track_dirty(|store| -> Result<(), TemplateError> {
            store.update_template_file_path(id, new_path)?;
            for target in store.link_targets(id) {
                store.set_template_dirty(target, true)?;
            }
            Ok(())
        })?;
        self.propagate(id)
    }

    pub fn set_template_dirty(&mut self, id: TemplateId, dirty: bool) -> Result<(), PrefabError> {
        self.track_dirty(|store| store.set_template_dirty(id, dirty))?;
        Ok(())
    }

    pub fn is_template_dirty(&self, id: TemplateId) -> Result<bool, PrefabError> {
        Ok(self.store.is_template_dirty(id)?)
    }

    pub fn dirty_template_paths(&self, root: TemplateId) -> Result<Vec<String>, PrefabError> {
        Ok(self.store.dirty_template_paths(root)?)
    }

    // -----------------------------------------------------------------------
    // Links
    // -----------------------------------------------------------------------

    pub fn create_link(
        &mut self,
        target: TemplateId,
        source: TemplateId,
        alias: InstanceAlias,
        patches: Patch,
    ) -> Result<LinkId, PrefabError> {
        let link = self.track_dirty(|store| store.create_link(target, source, alias, patches))?;
        self.propagate(target)?;
        Ok(link)
    }

    pub fn remove_link(&mut self, id: LinkId) -> Result<(), PrefabError> {
        let link = self.track_dirty(|store| store.remove_link(id))?;
        self.propagate(link.target())
    }

    pub fn set_link_patches(&mut self, id: LinkId, patches: Patch) -> Result<(), PrefabError> {
        let target = self.store.find_link(id)?.target();
        self.track_dirty(|store| store.set_link_patches(id, patches))?;
        self.propagate(target)
    }

    // -----------------------------------------------------------------------
    // Instances
    // -----------------------------------------------------------------------

    pub fn instantiate_prefab(&mut self, template: TemplateId) -> Result<InstanceId, PrefabError> {
        let instance = Instance::instantiate(template, &self.store, &self.components, self.factory.as_mut())?;
        let id = self.instances.insert(instance);
        log::debug!("Instantiated {template} as {id}");
        Ok(id)
    }

    /// Instantiates the template at `path`, loading it first if needed.
    pub fn instantiate_prefab_from_path(&mut self, path: &str) -> Result<InstanceId, PrefabError> {
        let template = match self.store.template_id_for_path(path) {
            Some(template) => template,
            None if self.loader.is_some() => self.load_template(path)?,
            None => return Err(LoadError::NotFound(path.to_owned()).into()),
        };
        self.instantiate_prefab(template)
    }

    pub fn instance(&self, id: InstanceId) -> Result<&Instance, PrefabError> {
        self.instances.get(id).ok_or(PrefabError::UnknownInstance(id))
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Result<&mut Instance, PrefabError> {
        self.instances.get_mut(id).ok_or(PrefabError::UnknownInstance(id))
    }

    /// Moves an instance out of the system. Its entity ids stay alive.
    pub fn take_instance(&mut self, id: InstanceId) -> Result<Instance, PrefabError> {
        self.instances.remove(id).ok_or(PrefabError::UnknownInstance(id))
    }

    /// Hands a previously taken instance back to the system.
    pub fn adopt_instance(&mut self, instance: Instance) -> InstanceId {
        self.instances.insert(instance)
    }

    /// Destroys an instance and releases its entity ids.
    pub fn destroy_instance(&mut self, id: InstanceId) -> Result<(), PrefabError> {
        let mut instance = self.take_instance(id)?;
        instance.release_all(self.factory.as_mut());
        log::debug!("Destroyed {id}");
        Ok(())
    }

    pub fn destroy_all_instances(&mut self) {
        for (_, mut instance) in self.instances.drain() {
            instance.release_all(self.factory.as_mut());
        }
    }

    /// Adds an entity to a node of a live instance under a fresh alias.
    ///
    /// The template is unchanged until the entity's patch is applied with
    /// [`patch_template_from_instance`](Self::patch_template_from_instance).
    pub fn add_entity_to_instance(
        &mut self,
        instance: InstanceId,
        node: NodeId,
        entity: EntityObject,
    ) -> Result<EntityAlias, PrefabError> {
        let aliases = &self.aliases;
        let target = self.instances.get_mut(instance).ok_or(PrefabError::UnknownInstance(instance))?;
        let view = target
            .node(node)
            .ok_or_else(|| PrefabError::InvalidTemplate(format!("no node {} in {instance}", node.index())))?;
        let alias = aliases.unique_entity_alias(|a| view.get_entity_id(a.as_str()).is_valid());
        let id = entity.id();
        if !target.adopt_entity(node, alias.clone(), entity) {
            return Err(PrefabError::InvalidTemplate(format!("{id} is already owned by {instance}")));
        }
        Ok(alias)
    }

    // -----------------------------------------------------------------------
    // Propagation
    // -----------------------------------------------------------------------

    pub fn add_template_instances_to_queue(&mut self, template: TemplateId) {
        self.executor.add_template_instances_to_queue(template);
    }

    pub fn update_template_instances_in_queue(&mut self) -> UpdateReport {
        let mut ctx = UpdateContext {
            components: &self.components,
            factory: self.factory.as_mut(),
            observers: &mut self.observers,
        };
        self.executor
            .update_template_instances_in_queue(&mut self.store, &mut self.instances, &mut ctx)
    }

    /// Patch turning the template's view of `entity` into its live state.
    ///
    /// Paths are rooted at the instance's root template. An entity the
    /// template does not know yet yields a single `add`.
    pub fn generate_entity_patch(&self, instance_id: InstanceId, entity: EntityId) -> Result<Patch, PrefabError> {
        let instance = self.instance(instance_id)?;
        let template = instance
            .template_id()
            .ok_or(PrefabError::UnknownInstance(instance_id))?;
        let node = instance.owner_of(entity).ok_or(PrefabError::UnknownEntity(entity))?;
        let alias = instance
            .get_entity_alias(entity)
            .ok_or(PrefabError::UnknownEntity(entity))?;
        let object = instance.entity(entity).ok_or(PrefabError::UnknownEntity(entity))?;
        let path = instance
            .node_path(node)
            .ok_or(PrefabError::UnknownEntity(entity))?
            .concat(&template_dom::entity_path(alias.as_str()));

        let live = serialize_entity(object, alias.as_str(), &InstanceEntityIdMapper::new(instance, node))?;
        let dom = self.store.find_template_dom(template)?;
        Ok(match dom.pointer(&path) {
            Some(current) => diff(current, &live).rebase(&path),
            None => Patch::from_ops(vec![PatchOp::Add { path, value: live }]),
        })
    }

    /// Applies an instance-rooted patch to the instance's template.
    ///
    /// Operations under `/Instances/<alias>/` go into that link's override
    /// patch; the rest is applied to the template itself. The instance is
    /// then considered up to date, so propagation does not re-apply the edit
    /// to it.
    pub fn patch_template_from_instance(&mut self, instance_id: InstanceId, patch: Patch) -> Result<(), PrefabError> {
        let instance = self.instance(instance_id)?;
        let template_id = instance
            .template_id()
            .ok_or(PrefabError::UnknownInstance(instance_id))?;
        let template = self.store.find_template(template_id)?;
        let was_current = instance.synced_revision() == template.revision();

        let mut remaining = patch;
        let mut overrides = Vec::new();
        for link_id in template.links() {
            let link = self.store.find_link(link_id)?;
            let prefix = template_dom::instance_path(link.alias().as_str());
            let (inside, outside) = remaining.split_prefix(&prefix);
            remaining = outside;
            if inside.is_empty() {
                continue;
            }
            let embedded = template
                .dom()
                .pointer(&prefix)
                .ok_or_else(|| PatchError::PathNotFound(prefix.to_string()))?;
            let edited = apply(embedded, &inside)?;
            let patches = diff(self.store.find_template_dom(link.source())?, &edited);
            overrides.push((link_id, patches));
        }
        if !remaining.is_empty() {
            apply(template.dom(), &remaining)?;
        }

        let changed = self.track_dirty(|store| -> Result<bool, TemplateError> {
            let mut changed = false;
            for (link_id, patches) in overrides {
                changed |= store.set_link_patches(link_id, patches)?;
            }
            changed |= store.update_template_dom(template_id, &remaining)?;
            Ok(changed)
        })?;
        if changed {
            self.propagate(template_id)?;
        }

        if was_current {
            let template = self.store.find_template(template_id)?;
            let instance = self
                .instances
                .get_mut(instance_id)
                .ok_or(PrefabError::UnknownInstance(instance_id))?;
            instance.mark_synced(template.revision(), template.dom());
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn load_template(&mut self, path: &str) -> Result<TemplateId, PrefabError> {
        let loader = self.loader.as_ref().ok_or(LoadError::NoStorage)?;
        Ok(loader.load_template(&mut self.store, path)?)
    }

    pub fn save_template(&mut self, id: TemplateId) -> Result<(), PrefabError> {
        let Some(loader) = self.loader.as_mut() else {
            return Err(LoadError::NoStorage.into());
        };
        let store = &mut self.store;
        let observers = &mut self.observers;
        let was_dirty = store.is_template_dirty(id)?;
        loader.save_template(store, id)?;
        if was_dirty {
            for observer in observers.iter_mut() {
                observer.on_template_dirty_changed(id, false);
            }
        }
        Ok(())
    }

    pub fn save_template_to_string(&self, id: TemplateId) -> Result<String, PrefabError> {
        let loader = self.loader.as_ref().ok_or(LoadError::NoStorage)?;
        Ok(loader.save_template_to_string(&self.store, id)?)
    }
}

impl std::fmt::Debug for PrefabSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefabSystem")
            .field("templates", &self.store.len())
            .field("instances", &self.instances.len())
            .field("executor", &self.executor.state())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}
