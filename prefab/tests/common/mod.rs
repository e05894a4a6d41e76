#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use redlilium_ecs::dom::{Dom, Patch};
use redlilium_ecs::{Component, ComponentRegistry, EntityId, EntityObject};
use redlilium_prefab::{
    InstanceId, InstanceRef, InstanceUpdateError, PrefabObserver, PrefabSystem, TemplateId,
};

#[derive(Debug, Clone, PartialEq, Component)]
pub struct Follow {
    pub target: EntityId,
}

#[derive(Debug, Clone, PartialEq, Component)]
pub struct Health {
    pub hp: u32,
}

pub fn registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    registry.register::<Follow>();
    registry.register::<Health>();
    registry
}

pub fn dom(text: &str) -> Dom {
    serde_json::from_str(text).unwrap()
}

pub fn patch(text: &str) -> Patch {
    serde_json::from_str(text).unwrap()
}

/// The entity of `node` named `name`.
pub fn named<'a>(node: InstanceRef<'a>, name: &str) -> &'a EntityObject {
    node.entity_aliases()
        .filter_map(|alias| node.find_entity(alias.as_str()))
        .find(|entity| entity.name() == name)
        .unwrap_or_else(|| panic!("no entity named {name}"))
}

pub const LEAF: &str = r#"{"Entities": {"L": {"Id": "L", "Name": "Leaf", "Components": {}}}}"#;

/// Builds `props/parent` from a `P` entity following the `L` entity of a
/// nested `props/leaf` instance. Returns the leaf and parent templates and
/// the live parent instance.
pub fn parent_with_leaf(system: &mut PrefabSystem) -> (TemplateId, TemplateId, InstanceId) {
    let leaf = system.add_template(dom(LEAF), "props/leaf").unwrap();
    let leaf_instance = system.instantiate_prefab(leaf).unwrap();
    let leaf_instance = system.take_instance(leaf_instance).unwrap();
    let l = leaf_instance.get_entity_id("L");

    let p = system.create_entity("P").with(Follow { target: l });
    let created = system
        .create_prefab(vec![p], vec![leaf_instance], "props/parent")
        .unwrap();
    let parent = system.instance(created).unwrap().template_id().unwrap();
    (leaf, parent, created)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    TemplateRemoved(TemplateId),
    AllTemplatesRemoved,
    InstanceUpdated(InstanceId, TemplateId),
    InstanceUpdateFailed(InstanceId),
    DirtyChanged(TemplateId, bool),
}

/// Observer that appends every notification to a shared log.
#[derive(Default, Clone)]
pub struct Recorder {
    pub events: Rc<RefCell<Vec<Event>>>,
}

impl Recorder {
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut self.events.borrow_mut())
    }
}

impl PrefabObserver for Recorder {
    fn on_template_removed(&mut self, template: TemplateId) {
        self.events.borrow_mut().push(Event::TemplateRemoved(template));
    }

    fn on_all_templates_removed(&mut self) {
        self.events.borrow_mut().push(Event::AllTemplatesRemoved);
    }

    fn on_instance_updated(&mut self, instance: InstanceId, template: TemplateId) {
        self.events.borrow_mut().push(Event::InstanceUpdated(instance, template));
    }

    fn on_instance_update_failed(&mut self, error: &InstanceUpdateError) {
        self.events.borrow_mut().push(Event::InstanceUpdateFailed(error.instance));
    }

    fn on_template_dirty_changed(&mut self, template: TemplateId, dirty: bool) {
        self.events.borrow_mut().push(Event::DirtyChanged(template, dirty));
    }
}
