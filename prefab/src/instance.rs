//! Live instance trees.
//!
//! An [`Instance`] is an arena of [`InstanceNode`]s. Node 0 is the root
//! instance; every other node is a nested instance owned by its parent
//! under an [`InstanceAlias`]. Each node keeps a bidirectional
//! `EntityAlias <-> EntityId` table for the entities it owns.
//!
//! Instances are built and updated by reconciling the tree against a
//! template DOM in two passes: first every alias in the whole tree gets an
//! id, then every entity is deserialized. References across nesting
//! boundaries therefore resolve regardless of declaration order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use redlilium_dom::{Dom, DomObject, DomPath, Patch, apply};
use redlilium_ecs::serialize::{deserialize_entity, serialize_entity};
use redlilium_ecs::{ComponentRegistry, EntityFactory, EntityId, EntityObject};

use crate::alias::{InstanceEntityIdMapper, InstanceReferenceResolver};
use crate::error::PrefabError;
use crate::ids::{EntityAlias, InstanceAlias, TemplateId};
use crate::template_dom::{self, ENTITIES_KEY, INSTANCES_KEY, SOURCE_KEY};
use crate::template_store::TemplateStore;

/// Index of a node inside an [`Instance`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct InstanceNode {
    template_id: Option<TemplateId>,
    source_path: String,
    alias: Option<InstanceAlias>,
    parent: Option<NodeId>,
    children: BTreeMap<InstanceAlias, NodeId>,
    entities: BTreeMap<EntityAlias, EntityObject>,
    alias_to_id: HashMap<EntityAlias, EntityId>,
    id_to_alias: HashMap<EntityId, EntityAlias>,
}

impl InstanceNode {
    fn new(
        template_id: Option<TemplateId>,
        source_path: String,
        alias: Option<InstanceAlias>,
        parent: Option<NodeId>,
    ) -> Self {
        Self {
            template_id,
            source_path,
            alias,
            parent,
            children: BTreeMap::new(),
            entities: BTreeMap::new(),
            alias_to_id: HashMap::new(),
            id_to_alias: HashMap::new(),
        }
    }
}

/// Ids handed out and given back during one reconcile.
#[derive(Default)]
struct IdTransaction {
    allocated: Vec<EntityId>,
    released: Vec<EntityId>,
}

/// A live tree of entities instantiated from a template.
#[derive(Debug, Clone)]
pub struct Instance {
    root: InstanceNode,
    /// Nested nodes. Slot 0 stays empty; it is addressed as [`NodeId::ROOT`].
    nodes: Vec<Option<InstanceNode>>,
    free: Vec<u32>,
    owners: HashMap<EntityId, NodeId>,
    synced_revision: u64,
    /// Template DOM at `synced_revision`. `None` once an update failed, so
    /// the next one rebuilds from the full template.
    synced_dom: Option<Dom>,
}

impl Instance {
    /// An instance with an empty root node.
    pub(crate) fn new(template_id: Option<TemplateId>, source_path: impl Into<String>) -> Self {
        Self {
            root: InstanceNode::new(template_id, source_path.into(), None, None),
            nodes: vec![None],
            free: Vec::new(),
            owners: HashMap::new(),
            synced_revision: 0,
            synced_dom: None,
        }
    }

    /// Instantiates `template_id` with fresh ids from `factory`.
    pub(crate) fn instantiate(
        template_id: TemplateId,
        store: &TemplateStore,
        components: &ComponentRegistry,
        factory: &mut dyn EntityFactory,
    ) -> Result<Self, PrefabError> {
        let template = store.find_template(template_id)?;
        if template_dom::hierarchy_entity_count(template.dom()) == 0 {
            return Err(PrefabError::InvalidTemplate(format!(
                "'{}' holds no entities",
                template.source_path()
            )));
        }
        let mut instance = Self::new(Some(template_id), template.source_path());
        instance.reconcile(template.dom(), store, components, factory)?;
        instance.mark_synced(template.revision(), template.dom());
        Ok(instance)
    }

    // -----------------------------------------------------------------------
    // Arena
    // -----------------------------------------------------------------------

    fn slot(&self, id: NodeId) -> Option<&InstanceNode> {
        if id == NodeId::ROOT {
            return Some(&self.root);
        }
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut InstanceNode> {
        if id == NodeId::ROOT {
            return Some(&mut self.root);
        }
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    fn take_node(&mut self, id: NodeId) -> Option<InstanceNode> {
        if id == NodeId::ROOT {
            let empty = InstanceNode::new(None, String::new(), None, None);
            return Some(std::mem::replace(&mut self.root, empty));
        }
        let node = self.nodes.get_mut(id.index()).and_then(Option::take)?;
        self.free.push(id.0);
        Some(node)
    }

    fn alloc_node(&mut self, node: InstanceNode) -> NodeId {
        if let Some(index) = self.free.pop() {
            self.nodes[index as usize] = Some(node);
            NodeId(index)
        } else {
            self.nodes.push(Some(node));
            NodeId(self.nodes.len() as u32 - 1)
        }
    }

    /// Frees nested node `id` and its descendants, collecting their entity ids.
    fn free_subtree(&mut self, id: NodeId, released: &mut Vec<EntityId>) {
        if id == NodeId::ROOT {
            return;
        }
        let Some(node) = self.take_node(id) else {
            return;
        };
        for entity in node.alias_to_id.values() {
            self.owners.remove(entity);
            released.push(*entity);
        }
        for child in node.children.values() {
            self.free_subtree(*child, released);
        }
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    pub fn root(&self) -> InstanceRef<'_> {
        InstanceRef {
            instance: self,
            id: NodeId::ROOT,
            node: &self.root,
        }
    }

    pub fn root_mut(&mut self) -> InstanceMut<'_> {
        InstanceMut {
            instance: self,
            id: NodeId::ROOT,
        }
    }

    pub fn node(&self, id: NodeId) -> Option<InstanceRef<'_>> {
        let node = self.slot(id)?;
        Some(InstanceRef {
            instance: self,
            id,
            node,
        })
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<InstanceMut<'_>> {
        self.slot(id)?;
        Some(InstanceMut { instance: self, id })
    }

    /// Number of live nodes, the root included.
    pub fn node_count(&self) -> usize {
        1 + self.nodes.iter().flatten().count()
    }

    // -----------------------------------------------------------------------
    // Root shortcuts and hierarchy-wide lookups
    // -----------------------------------------------------------------------

    /// Template of the root instance.
    pub fn template_id(&self) -> Option<TemplateId> {
        self.root().template_id()
    }

    pub fn source_path(&self) -> &str {
        self.root().source_path()
    }

    /// Template revision this instance was last brought up to.
    pub fn synced_revision(&self) -> u64 {
        self.synced_revision
    }

    /// Template DOM this instance was last brought up to, unless its last
    /// update failed.
    pub fn synced_dom(&self) -> Option<&Dom> {
        self.synced_dom.as_ref()
    }

    pub(crate) fn mark_synced(&mut self, revision: u64, dom: &Dom) {
        self.synced_revision = revision;
        self.synced_dom = Some(dom.clone());
    }

    pub(crate) fn mark_out_of_sync(&mut self) {
        self.synced_dom = None;
    }

    pub(crate) fn set_root_template(&mut self, template_id: TemplateId, source_path: &str) {
        self.root.template_id = Some(template_id);
        self.root.source_path = source_path.to_owned();
    }

    /// Id of a root entity; [`EntityId::INVALID`] for an unknown alias.
    pub fn get_entity_id(&self, alias: &str) -> EntityId {
        self.root().get_entity_id(alias)
    }

    /// Alias of any entity in the hierarchy.
    pub fn get_entity_alias(&self, id: EntityId) -> Option<&EntityAlias> {
        self.slot(self.owner_of(id)?)?.id_to_alias.get(&id)
    }

    pub fn find_entity(&self, alias: &str) -> Option<&EntityObject> {
        self.root().find_entity(alias)
    }

    pub fn find_entity_mut(&mut self, alias: &str) -> Option<&mut EntityObject> {
        self.root.entities.get_mut(alias)
    }

    pub fn find_nested_instance(&self, alias: &str) -> Option<InstanceRef<'_>> {
        self.root().find_nested_instance(alias)
    }

    pub fn get_nested_instance_aliases(&self, template_id: TemplateId) -> Vec<InstanceAlias> {
        self.root().get_nested_instance_aliases(template_id)
    }

    pub fn get_const_entities(&self, visitor: impl FnMut(&EntityObject) -> bool) -> bool {
        self.root().get_const_entities(visitor)
    }

    pub fn get_all_entities_in_hierarchy(&self, mut visitor: impl FnMut(&EntityObject) -> bool) -> bool {
        self.root().visit_hierarchy(&mut visitor)
    }

    /// Node owning `id`, anywhere in the hierarchy.
    pub fn owner_of(&self, id: EntityId) -> Option<NodeId> {
        self.owners.get(&id).copied()
    }

    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.owners.contains_key(&id)
    }

    /// Any entity in the hierarchy by runtime id.
    pub fn entity(&self, id: EntityId) -> Option<&EntityObject> {
        let node = self.slot(self.owner_of(id)?)?;
        node.entities.get(node.id_to_alias.get(&id)?)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut EntityObject> {
        let owner = self.owner_of(id)?;
        let node = self.slot_mut(owner)?;
        let alias = node.id_to_alias.get(&id)?.clone();
        node.entities.get_mut(&alias)
    }

    /// Every entity id in the hierarchy.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.owners.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Reference string of `id` as seen from the root instance
    /// (`Instance_[1]/Entity_[2]`).
    pub fn entity_alias_path(&self, id: EntityId) -> Option<String> {
        InstanceEntityIdMapper::new(self, NodeId::ROOT)
            .reference(id)
            .map(|reference| reference.to_string())
    }

    /// DOM path of `node` inside the root template DOM.
    pub fn node_path(&self, node: NodeId) -> Option<DomPath> {
        let mut aliases = Vec::new();
        let mut cursor = self.node(node)?;
        while let Some(parent) = cursor.parent() {
            aliases.push(cursor.alias()?.as_str().to_owned());
            cursor = parent;
        }
        let mut path = DomPath::root();
        for alias in aliases.into_iter().rev() {
            path.push(INSTANCES_KEY);
            path.push(alias);
        }
        Some(path)
    }

    // -----------------------------------------------------------------------
    // Ownership changes
    // -----------------------------------------------------------------------

    /// Moves an entity into `node` under `alias`, keeping its id.
    pub(crate) fn adopt_entity(&mut self, node: NodeId, alias: EntityAlias, entity: EntityObject) -> bool {
        let id = entity.id();
        if self.owners.contains_key(&id) {
            return false;
        }
        let Some(slot) = self.slot_mut(node) else {
            return false;
        };
        if slot.alias_to_id.contains_key(&alias) {
            return false;
        }
        slot.alias_to_id.insert(alias.clone(), id);
        slot.id_to_alias.insert(id, alias.clone());
        slot.entities.insert(alias, entity);
        self.owners.insert(id, node);
        true
    }

    /// Moves another instance tree under `parent` as a nested instance.
    pub(crate) fn graft(&mut self, parent: NodeId, alias: InstanceAlias, mut other: Instance) -> Option<NodeId> {
        self.slot(parent)?;
        if self.slot(parent)?.children.contains_key(&alias) {
            return None;
        }
        self.graft_node(parent, alias, &mut other, NodeId::ROOT)
    }

    fn graft_node(
        &mut self,
        parent: NodeId,
        alias: InstanceAlias,
        other: &mut Instance,
        other_id: NodeId,
    ) -> Option<NodeId> {
        let mut node = other.take_node(other_id)?;
        let children = std::mem::take(&mut node.children);
        node.parent = Some(parent);
        node.alias = Some(alias.clone());
        let ids: Vec<EntityId> = node.alias_to_id.values().copied().collect();

        let id = self.alloc_node(node);
        for entity in ids {
            self.owners.insert(entity, id);
        }
        self.slot_mut(parent)?.children.insert(alias, id);
        for (child_alias, child) in children {
            self.graft_node(id, child_alias, other, child);
        }
        Some(id)
    }

    /// Gives every entity id back to `factory`.
    pub(crate) fn release_all(&mut self, factory: &mut dyn EntityFactory) {
        for id in self.owners.keys() {
            factory.release_entity_id(*id);
        }
        self.owners.clear();
        self.nodes = vec![None];
        self.free.clear();
        self.root.children.clear();
        self.root.entities.clear();
        self.root.alias_to_id.clear();
        self.root.id_to_alias.clear();
    }

    // -----------------------------------------------------------------------
    // DOM
    // -----------------------------------------------------------------------

    /// Serializes the tree to an alias-keyed template DOM.
    pub fn to_dom(&self) -> Result<Dom, PrefabError> {
        self.node_dom(NodeId::ROOT)
    }

    fn node_dom(&self, id: NodeId) -> Result<Dom, PrefabError> {
        let Some(node) = self.slot(id) else {
            return Ok(Dom::Null);
        };
        let mapper = InstanceEntityIdMapper::new(self, id);
        let mut entities = DomObject::new();
        for (alias, entity) in &node.entities {
            entities.insert(alias.as_str().to_owned(), serialize_entity(entity, alias.as_str(), &mapper)?);
        }
        let mut instances = DomObject::new();
        for (alias, child) in &node.children {
            instances.insert(alias.as_str().to_owned(), self.node_dom(*child)?);
        }

        let mut dom = DomObject::new();
        dom.insert(SOURCE_KEY.into(), Dom::from(node.source_path.as_str()));
        dom.insert(ENTITIES_KEY.into(), Dom::Object(entities));
        dom.insert(INSTANCES_KEY.into(), Dom::Object(instances));
        Ok(Dom::Object(dom))
    }

    /// Applies a template patch to the live tree.
    pub(crate) fn apply_patch(
        &mut self,
        patch: &Patch,
        store: &TemplateStore,
        components: &ComponentRegistry,
        factory: &mut dyn EntityFactory,
    ) -> Result<(), PrefabError> {
        if patch.is_empty() {
            return Ok(());
        }
        let patched = apply(&self.to_dom()?, patch)?;
        self.reconcile(&patched, store, components, factory)
    }

    /// Brings the tree in line with `dom`.
    ///
    /// Entities and nested instances whose alias survives keep their ids.
    /// New aliases get fresh ids and removed ones are released. On error the
    /// tree is left unchanged and every fresh id is released.
    pub(crate) fn reconcile(
        &mut self,
        dom: &Dom,
        store: &TemplateStore,
        components: &ComponentRegistry,
        factory: &mut dyn EntityFactory,
    ) -> Result<(), PrefabError> {
        template_dom::validate_template_dom(dom).map_err(|e| PrefabError::InvalidTemplate(e.to_string()))?;

        let mut next = self.clone();
        let mut tx = IdTransaction::default();
        let result = next
            .sync_node(NodeId::ROOT, dom, store, factory, &mut tx)
            .and_then(|()| next.load_node(NodeId::ROOT, dom, components));

        match result {
            Ok(()) => {
                for id in tx.released {
                    factory.release_entity_id(id);
                }
                *self = next;
                Ok(())
            }
            Err(err) => {
                for id in tx.allocated {
                    factory.release_entity_id(id);
                }
                Err(err)
            }
        }
    }

    /// First pass: align aliases and nested nodes with `dom`, handing out
    /// ids for new aliases.
    fn sync_node(
        &mut self,
        id: NodeId,
        dom: &Dom,
        store: &TemplateStore,
        factory: &mut dyn EntityFactory,
        tx: &mut IdTransaction,
    ) -> Result<(), PrefabError> {
        let wanted: BTreeSet<&str> = template_dom::entities(dom)
            .map(|e| e.keys().map(String::as_str).collect())
            .unwrap_or_default();
        let empty = DomObject::new();
        let nested = template_dom::instances(dom).unwrap_or(&empty);

        let node = self.slot_mut(id).ok_or_else(|| missing_node(id))?;
        if let Some(source) = template_dom::source(dom) {
            node.source_path = source.to_owned();
        }
        let parent_template = node.template_id;
        let stale: Vec<(EntityAlias, EntityId)> = node
            .alias_to_id
            .iter()
            .filter(|(alias, _)| !wanted.contains(alias.as_str()))
            .map(|(alias, entity)| (alias.clone(), *entity))
            .collect();
        let fresh: Vec<EntityAlias> = wanted
            .iter()
            .filter(|alias| !node.alias_to_id.contains_key(**alias))
            .map(|alias| EntityAlias::from(*alias))
            .collect();
        let stale_children: Vec<(InstanceAlias, NodeId)> = node
            .children
            .iter()
            .filter(|(alias, _)| !nested.contains_key(alias.as_str()))
            .map(|(alias, child)| (alias.clone(), *child))
            .collect();

        for (alias, entity) in stale {
            if let Some(node) = self.slot_mut(id) {
                node.alias_to_id.remove(&alias);
                node.id_to_alias.remove(&entity);
                node.entities.remove(&alias);
            }
            self.owners.remove(&entity);
            tx.released.push(entity);
        }
        for alias in fresh {
            let entity = factory.create_entity_id();
            tx.allocated.push(entity);
            self.owners.insert(entity, id);
            if let Some(node) = self.slot_mut(id) {
                node.alias_to_id.insert(alias.clone(), entity);
                node.id_to_alias.insert(entity, alias);
            }
        }
        for (alias, child) in stale_children {
            self.free_subtree(child, &mut tx.released);
            if let Some(node) = self.slot_mut(id) {
                node.children.remove(&alias);
            }
        }

        for (alias, child_dom) in nested {
            let alias = InstanceAlias::from(alias.as_str());
            let template_id = resolve_nested_template(store, parent_template, &alias, child_dom);
            let existing = self.slot(id).and_then(|node| node.children.get(&alias).copied());
            let child = match existing {
                Some(child) => {
                    if let Some(node) = self.slot_mut(child) {
                        node.template_id = template_id;
                    }
                    child
                }
                None => {
                    let source = template_dom::source(child_dom).unwrap_or_default().to_owned();
                    let node = InstanceNode::new(template_id, source, Some(alias.clone()), Some(id));
                    let child = self.alloc_node(node);
                    if let Some(node) = self.slot_mut(id) {
                        node.children.insert(alias, child);
                    }
                    child
                }
            };
            self.sync_node(child, child_dom, store, factory, tx)?;
        }
        Ok(())
    }

    /// Second pass: deserialize every entity of `id` and its descendants.
    fn load_node(&mut self, id: NodeId, dom: &Dom, components: &ComponentRegistry) -> Result<(), PrefabError> {
        let mut loaded = BTreeMap::new();
        {
            let view = self.node(id).ok_or_else(|| missing_node(id))?;
            let resolver = InstanceReferenceResolver::new(view);
            if let Some(entities) = template_dom::entities(dom) {
                for (alias, entity_dom) in entities {
                    let entity_id = view.get_entity_id(alias);
                    let entity = deserialize_entity(entity_dom, entity_id, components, &resolver)?;
                    loaded.insert(EntityAlias::from(alias.as_str()), entity);
                }
            }
        }
        let node = self.slot_mut(id).ok_or_else(|| missing_node(id))?;
        node.entities = loaded;

        if let Some(instances) = template_dom::instances(dom) {
            for (alias, child_dom) in instances {
                let child = self
                    .slot(id)
                    .and_then(|node| node.children.get(alias.as_str()).copied())
                    .ok_or_else(|| PrefabError::InvalidTemplate(format!("nested instance '{alias}' missing")))?;
                self.load_node(child, child_dom, components)?;
            }
        }
        Ok(())
    }
}

fn missing_node(id: NodeId) -> PrefabError {
    PrefabError::InvalidTemplate(format!("instance node {} is gone", id.index()))
}

/// Template of a nested member: the parent template's link for `alias`,
/// else whatever template is registered at the member's `Source`.
fn resolve_nested_template(
    store: &TemplateStore,
    parent_template: Option<TemplateId>,
    alias: &InstanceAlias,
    member: &Dom,
) -> Option<TemplateId> {
    parent_template
        .and_then(|parent| store.link_for_alias(parent, alias.as_str()))
        .map(|link| link.source())
        .or_else(|| template_dom::source(member).and_then(|path| store.template_id_for_path(path)))
}

/// Read view of one node of an [`Instance`].
#[derive(Clone, Copy)]
pub struct InstanceRef<'a> {
    instance: &'a Instance,
    id: NodeId,
    node: &'a InstanceNode,
}

impl<'a> InstanceRef<'a> {
    fn data(&self) -> &'a InstanceNode {
        self.node
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn instance(&self) -> &'a Instance {
        self.instance
    }

    pub fn template_id(&self) -> Option<TemplateId> {
        self.data().template_id
    }

    pub fn source_path(&self) -> &'a str {
        &self.data().source_path
    }

    /// Alias under which the parent owns this node; `None` for the root.
    pub fn alias(&self) -> Option<&'a InstanceAlias> {
        self.data().alias.as_ref()
    }

    pub fn parent(&self) -> Option<InstanceRef<'a>> {
        self.instance.node(self.data().parent?)
    }

    pub fn get_entity_id(&self, alias: &str) -> EntityId {
        self.data()
            .alias_to_id
            .get(alias)
            .copied()
            .unwrap_or(EntityId::INVALID)
    }

    /// Alias of an entity owned by this node.
    pub fn get_entity_alias(&self, id: EntityId) -> Option<&'a EntityAlias> {
        self.data().id_to_alias.get(&id)
    }

    /// Entity aliases of this node, sorted.
    pub fn entity_aliases(&self) -> impl Iterator<Item = &'a EntityAlias> + 'a {
        self.data().entities.keys()
    }

    pub fn entity_count(&self) -> usize {
        self.data().entities.len()
    }

    pub fn find_entity(&self, alias: &str) -> Option<&'a EntityObject> {
        self.data().entities.get(alias)
    }

    pub fn find_nested_instance(&self, alias: &str) -> Option<InstanceRef<'a>> {
        self.instance.node(*self.data().children.get(alias)?)
    }

    pub fn nested_instances(&self) -> impl Iterator<Item = InstanceRef<'a>> + 'a {
        let instance = self.instance;
        self.data()
            .children
            .values()
            .filter_map(move |child| instance.node(*child))
    }

    /// Aliases of direct children instantiated from `template_id`.
    pub fn get_nested_instance_aliases(&self, template_id: TemplateId) -> Vec<InstanceAlias> {
        self.nested_instances()
            .filter(|child| child.template_id() == Some(template_id))
            .filter_map(|child| child.alias().cloned())
            .collect()
    }

    /// Visits the entities owned by this node. Returns `false` if the
    /// visitor stopped early.
    pub fn get_const_entities(&self, mut visitor: impl FnMut(&EntityObject) -> bool) -> bool {
        self.data().entities.values().all(|entity| visitor(entity))
    }

    /// Visits this node's entities, then every nested instance depth-first.
    pub fn get_all_entities_in_hierarchy(&self, mut visitor: impl FnMut(&EntityObject) -> bool) -> bool {
        self.visit_hierarchy(&mut visitor)
    }

    fn visit_hierarchy(&self, visitor: &mut dyn FnMut(&EntityObject) -> bool) -> bool {
        if !self.data().entities.values().all(|entity| visitor(entity)) {
            return false;
        }
        self.nested_instances().all(|child| child.visit_hierarchy(visitor))
    }

    pub fn to_dom(&self) -> Result<Dom, PrefabError> {
        self.instance.node_dom(self.id)
    }
}

/// Write view of one node of an [`Instance`].
pub struct InstanceMut<'a> {
    instance: &'a mut Instance,
    id: NodeId,
}

impl InstanceMut<'_> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn find_entity_mut(&mut self, alias: &str) -> Option<&mut EntityObject> {
        self.instance.slot_mut(self.id)?.entities.get_mut(alias)
    }

    pub fn find_nested_instance_mut(&mut self, alias: &str) -> Option<InstanceMut<'_>> {
        let child = *self.instance.slot(self.id)?.children.get(alias)?;
        self.instance.node_mut(child)
    }

    /// Visits the entities owned by this node mutably. Returns `false` if
    /// the visitor stopped early.
    pub fn get_entities(&mut self, mut visitor: impl FnMut(&mut EntityObject) -> bool) -> bool {
        match self.instance.slot_mut(self.id) {
            Some(node) => node.entities.values_mut().all(|entity| visitor(entity)),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use redlilium_ecs::EntityAllocator;

    use super::*;

    fn parse(text: &str) -> Dom {
        serde_json::from_str::<serde_json::Value>(text).unwrap().into()
    }

    fn store_with(dom: &str) -> (TemplateStore, TemplateId) {
        let mut store = TemplateStore::new();
        let id = store.add_template(parse(dom), "test/path").unwrap();
        (store, id)
    }

    const TWO_LEVELS: &str = r#"{
        "Entities": {"A": {"Id": "A", "Name": "Root"}},
        "Instances": {"I": {"Source": "nested", "Entities": {"B": {"Id": "B", "Name": "Child"}}}}
    }"#;

    #[test]
    fn instantiate_builds_alias_tables() {
        let (store, id) = store_with(TWO_LEVELS);
        let mut factory = EntityAllocator::new();
        let registry = ComponentRegistry::new();
        let instance = Instance::instantiate(id, &store, &registry, &mut factory).unwrap();

        assert_eq!(instance.node_count(), 2);
        let a = instance.get_entity_id("A");
        assert!(a.is_valid());
        assert_eq!(instance.get_entity_alias(a).map(EntityAlias::as_str), Some("A"));
        assert_eq!(instance.find_entity("A").map(EntityObject::name), Some("Root"));
        assert_eq!(instance.get_entity_id("missing"), EntityId::INVALID);

        let nested = instance.find_nested_instance("I").unwrap();
        let b = nested.get_entity_id("B");
        assert_eq!(nested.parent().map(|p| p.id()), Some(NodeId::ROOT));
        assert_eq!(instance.owner_of(b), Some(nested.id()));
        assert_eq!(instance.entity_alias_path(b).as_deref(), Some("I/B"));
        assert_eq!(instance.node_path(nested.id()).unwrap().to_string(), "/Instances/I");
    }

    #[test]
    fn empty_hierarchy_is_invalid() {
        let (store, id) = store_with(r#"{"Instances": {"I": {"Entities": {}}}}"#);
        let err = Instance::instantiate(id, &store, &ComponentRegistry::new(), &mut EntityAllocator::new())
            .unwrap_err();
        assert!(matches!(err, PrefabError::InvalidTemplate(_)));
    }

    #[test]
    fn unknown_component_releases_ids() {
        let (store, id) = store_with(r#"{"Entities": {"A": {"Components": {"Nope": {}}}, "B": {}}}"#);
        let mut factory = EntityAllocator::new();
        let err = Instance::instantiate(id, &store, &ComponentRegistry::new(), &mut factory).unwrap_err();
        assert!(matches!(err, PrefabError::Deserialize(_)));
        assert_eq!(factory.count(), 0);
    }

    #[test]
    fn reconcile_keeps_surviving_ids() {
        let (store, id) = store_with(TWO_LEVELS);
        let mut factory = EntityAllocator::new();
        let registry = ComponentRegistry::new();
        let mut instance = Instance::instantiate(id, &store, &registry, &mut factory).unwrap();
        let a = instance.get_entity_id("A");
        let b = instance.find_nested_instance("I").unwrap().get_entity_id("B");

        let next = parse(
            r#"{"Source": "test/path",
                "Entities": {"A": {"Id": "A", "Name": "Renamed"}, "C": {"Id": "C", "Name": "New"}},
                "Instances": {}}"#,
        );
        instance.reconcile(&next, &store, &registry, &mut factory).unwrap();

        assert_eq!(instance.get_entity_id("A"), a);
        assert_eq!(instance.find_entity("A").map(EntityObject::name), Some("Renamed"));
        assert!(instance.get_entity_id("C").is_valid());
        assert!(instance.find_nested_instance("I").is_none());
        assert!(!factory.is_alive(b));
        assert_eq!(factory.count(), 2);
        assert_eq!(instance.node_count(), 1);
    }

    #[test]
    fn failed_reconcile_changes_nothing() {
        let (store, id) = store_with(TWO_LEVELS);
        let mut factory = EntityAllocator::new();
        let registry = ComponentRegistry::new();
        let mut instance = Instance::instantiate(id, &store, &registry, &mut factory).unwrap();
        let before = instance.to_dom().unwrap();

        let bad = parse(r#"{"Entities": {"A": {}, "X": {"Components": {"Unknown": {}}}}}"#);
        assert!(instance.reconcile(&bad, &store, &registry, &mut factory).is_err());
        assert_eq!(instance.to_dom().unwrap(), before);
        assert_eq!(factory.count(), 2);
    }

    #[test]
    fn to_dom_matches_template() {
        let (store, id) = store_with(TWO_LEVELS);
        let mut factory = EntityAllocator::new();
        let registry = ComponentRegistry::new();
        let instance = Instance::instantiate(id, &store, &registry, &mut factory).unwrap();
        let dom = instance.to_dom().unwrap();
        // Entities get an empty Components object when serialized.
        let expected = parse(
            r#"{"Source": "test/path",
                "Entities": {"A": {"Id": "A", "Name": "Root", "Components": {}}},
                "Instances": {"I": {"Source": "nested", "Instances": {},
                    "Entities": {"B": {"Id": "B", "Name": "Child", "Components": {}}}}}}"#,
        );
        assert_eq!(dom, expected);
    }

    #[test]
    fn visitors_stop_early() {
        let (store, id) =
            store_with(r#"{"Entities": {"A": {}, "B": {}}, "Instances": {"I": {"Entities": {"C": {}}}}}"#);
        let instance =
            Instance::instantiate(id, &store, &ComponentRegistry::new(), &mut EntityAllocator::new()).unwrap();

        let mut seen = 0;
        assert!(instance.get_const_entities(|_| {
            seen += 1;
            true
        }));
        assert_eq!(seen, 2);

        let mut seen = 0;
        assert!(instance.get_all_entities_in_hierarchy(|_| {
            seen += 1;
            true
        }));
        assert_eq!(seen, 3);

        let mut seen = 0;
        assert!(!instance.get_all_entities_in_hierarchy(|_| {
            seen += 1;
            seen < 2
        }));
        assert_eq!(seen, 2);
    }

    #[test]
    fn graft_moves_ownership() {
        let (store, id) = store_with(TWO_LEVELS);
        let mut factory = EntityAllocator::new();
        let registry = ComponentRegistry::new();
        let child = Instance::instantiate(id, &store, &registry, &mut factory).unwrap();
        let b = child.find_nested_instance("I").unwrap().get_entity_id("B");

        let mut parent = Instance::new(None, "parent");
        let node = parent.graft(NodeId::ROOT, "Outer".into(), child).unwrap();
        assert_eq!(parent.node(node).unwrap().template_id(), Some(id));
        assert_eq!(parent.entity_alias_path(b).as_deref(), Some("Outer/I/B"));
        assert_eq!(parent.get_nested_instance_aliases(id), vec![InstanceAlias::from("Outer")]);
    }

    #[test]
    fn release_all_returns_ids() {
        let (store, id) = store_with(TWO_LEVELS);
        let mut factory = EntityAllocator::new();
        let mut instance = Instance::instantiate(id, &store, &ComponentRegistry::new(), &mut factory).unwrap();
        assert_eq!(factory.count(), 2);
        instance.release_all(&mut factory);
        assert_eq!(factory.count(), 0);
        assert!(instance.entity_ids().is_empty());
    }
}
