use std::collections::BTreeMap;

use crate::ids::{InstanceId, TemplateId};
use crate::instance::Instance;

/// Root instances owned by a [`PrefabSystem`](crate::PrefabSystem).
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: BTreeMap<InstanceId, Instance>,
    next_id: u64,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instance: Instance) -> InstanceId {
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        self.instances.insert(id, instance);
        id
    }

    pub fn get(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(&id)
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        self.instances.get_mut(&id)
    }

    pub fn remove(&mut self, id: InstanceId) -> Option<Instance> {
        self.instances.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.instances.keys().copied()
    }

    /// Root instances of `template`, in creation order.
    pub fn instances_of(&self, template: TemplateId) -> Vec<InstanceId> {
        self.instances
            .iter()
            .filter(|(_, instance)| instance.template_id() == Some(template))
            .map(|(id, _)| *id)
            .collect()
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = (InstanceId, Instance)> + '_ {
        std::mem::take(&mut self.instances).into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instances_of_filters_by_template() {
        let mut registry = InstanceRegistry::new();
        let a = registry.insert(Instance::new(Some(TemplateId(1)), "a"));
        registry.insert(Instance::new(Some(TemplateId(2)), "b"));
        let c = registry.insert(Instance::new(Some(TemplateId(1)), "a"));

        assert_eq!(registry.instances_of(TemplateId(1)), vec![a, c]);
        assert!(registry.remove(a).is_some());
        assert_eq!(registry.instances_of(TemplateId(1)), vec![c]);
        assert_eq!(registry.len(), 2);
    }
}
