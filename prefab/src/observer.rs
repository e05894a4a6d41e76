use crate::error::InstanceUpdateError;
use crate::ids::{InstanceId, TemplateId};

/// Receives prefab lifecycle notifications.
///
/// Register implementations with
/// [`PrefabSystem::add_observer`](crate::PrefabSystem::add_observer). Every
/// method defaults to a no-op.
pub trait PrefabObserver {
    fn on_template_removed(&mut self, _template: TemplateId) {}

    fn on_all_templates_removed(&mut self) {}

    /// An instance was brought up to date with its template.
    fn on_instance_updated(&mut self, _instance: InstanceId, _template: TemplateId) {}

    /// An instance could not be updated and was skipped.
    fn on_instance_update_failed(&mut self, _error: &InstanceUpdateError) {}

    fn on_template_dirty_changed(&mut self, _template: TemplateId, _dirty: bool) {}
}
