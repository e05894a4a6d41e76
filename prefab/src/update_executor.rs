//! Re-applies template changes to live instances.

use std::collections::{HashMap, HashSet, VecDeque};

use redlilium_dom::diff;
use redlilium_ecs::{ComponentRegistry, EntityFactory};

use crate::error::{InstanceUpdateError, PrefabError};
use crate::ids::{InstanceId, TemplateId};
use crate::instance_registry::InstanceRegistry;
use crate::observer::PrefabObserver;
use crate::template_store::TemplateStore;

/// Default bound on upward re-queue passes per update.
pub const DEFAULT_MAX_PROPAGATION_PASSES: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Queued,
    Propagating,
}

/// Collaborators an update needs besides the store and the instances.
pub struct UpdateContext<'a> {
    pub components: &'a ComponentRegistry,
    pub factory: &'a mut dyn EntityFactory,
    pub observers: &'a mut [Box<dyn PrefabObserver>],
}

/// Outcome of one [`update_template_instances_in_queue`] call.
///
/// [`update_template_instances_in_queue`]: InstanceUpdateExecutor::update_template_instances_in_queue
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Templates processed, in order. A template re-queued by a nested change
    /// appears again only if its revision moved since it was processed.
    pub templates: Vec<TemplateId>,
    pub updated: Vec<InstanceId>,
    /// Instances already at their template's revision.
    pub skipped: Vec<InstanceId>,
    pub failures: Vec<InstanceUpdateError>,
}

impl UpdateReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Queue of templates whose instances need updating.
///
/// Each queued template is diffed once against the DOM its instances were
/// last brought up to, and the single resulting patch is applied to every
/// root instance of it. Templates nesting a processed template are queued
/// behind the current batch.
#[derive(Debug)]
pub struct InstanceUpdateExecutor {
    queue: VecDeque<TemplateId>,
    queued: HashSet<TemplateId>,
    state: ExecutorState,
    max_passes: usize,
}

impl Default for InstanceUpdateExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PROPAGATION_PASSES)
    }
}

impl InstanceUpdateExecutor {
    pub fn new(max_passes: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            state: ExecutorState::Idle,
            max_passes: max_passes.max(1),
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn queued_templates(&self) -> Vec<TemplateId> {
        self.queue.iter().copied().collect()
    }

    /// Queues `template` for instance update. Repeated calls before the next
    /// update are coalesced.
    pub fn add_template_instances_to_queue(&mut self, template: TemplateId) {
        if self.queued.insert(template) {
            self.queue.push_back(template);
        }
        self.state = ExecutorState::Queued;
    }

    pub fn remove_template_from_queue(&mut self, template: TemplateId) {
        if self.queued.remove(&template) {
            self.queue.retain(|t| *t != template);
        }
        if self.queue.is_empty() && self.state == ExecutorState::Queued {
            self.state = ExecutorState::Idle;
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.queued.clear();
        self.state = ExecutorState::Idle;
    }

    /// Drains the queue, updating every live instance of every queued
    /// template.
    ///
    /// A failure on one instance is reported and the remaining instances are
    /// still updated.
    pub fn update_template_instances_in_queue(
        &mut self,
        store: &mut TemplateStore,
        instances: &mut InstanceRegistry,
        ctx: &mut UpdateContext<'_>,
    ) -> UpdateReport {
        let mut report = UpdateReport::default();
        if self.queue.is_empty() {
            self.state = ExecutorState::Idle;
            return report;
        }
        self.state = ExecutorState::Propagating;

        // Revision each template was processed at during this call.
        let mut processed: HashMap<TemplateId, u64> = HashMap::new();
        let mut passes = 0;
        while !self.queue.is_empty() && passes < self.max_passes {
            passes += 1;
            let batch: Vec<TemplateId> = self.queue.drain(..).collect();
            self.queued.clear();
            log::debug!("Instance update pass {passes}: {} templates", batch.len());

            let mut parents = Vec::new();
            for template in batch {
                let Some(revision) = self.update_instances_of(template, store, instances, ctx, &mut report) else {
                    continue;
                };
                processed.insert(template, revision);
                for target in store.link_targets(template) {
                    if !parents.contains(&target) {
                        parents.push(target);
                    }
                }
            }
            for parent in parents {
                let current = store.find_template(parent).ok().map(|t| t.revision());
                if current.is_some() && processed.get(&parent).copied() == current {
                    continue;
                }
                if self.queued.insert(parent) {
                    self.queue.push_back(parent);
                }
            }
        }

        if self.queue.is_empty() {
            self.state = ExecutorState::Idle;
        } else {
            log::warn!(
                "Instance update stopped after {passes} passes with {} templates queued",
                self.queue.len()
            );
            self.state = ExecutorState::Queued;
        }
        report
    }

    /// Updates every instance of `template_id`. Returns the revision the
    /// instances were brought to, or `None` for an unknown template.
    fn update_instances_of(
        &mut self,
        template_id: TemplateId,
        store: &mut TemplateStore,
        instances: &mut InstanceRegistry,
        ctx: &mut UpdateContext<'_>,
        report: &mut UpdateReport,
    ) -> Option<u64> {
        let Ok(template) = store.find_template(template_id) else {
            log::warn!("Skipping unknown {template_id} in instance update queue");
            return None;
        };
        report.templates.push(template_id);
        let revision = template.revision();
        let (base_revision, base_dom) = template.propagated();
        let patch = diff(base_dom, template.dom());
        let dom = template.dom().clone();
        log::debug!(
            "Updating instances of '{}' (revision {base_revision} -> {revision}, {} ops)",
            template.source_path(),
            patch.len()
        );

        for instance_id in instances.instances_of(template_id) {
            let Some(instance) = instances.get_mut(instance_id) else {
                continue;
            };
            if instance.synced_revision() == revision {
                report.skipped.push(instance_id);
                continue;
            }
            // Instances behind or ahead of the shared baseline get a patch of
            // their own; only a previously failed one is rebuilt.
            let own_patch = match instance.synced_dom() {
                Some(baseline) if instance.synced_revision() != base_revision => Some(diff(baseline, &dom)),
                _ => None,
            };
            let result = if instance.synced_dom().is_none() {
                log::debug!("Rebuilding {instance_id} from the full template");
                instance.reconcile(&dom, store, ctx.components, &mut *ctx.factory)
            } else {
                let patch = own_patch.as_ref().unwrap_or(&patch);
                instance.apply_patch(patch, store, ctx.components, &mut *ctx.factory)
            };
            match result {
                Ok(()) => {
                    instance.mark_synced(revision, &dom);
                    report.updated.push(instance_id);
                    for observer in ctx.observers.iter_mut() {
                        observer.on_instance_updated(instance_id, template_id);
                    }
                }
                Err(error) => {
                    instance.mark_out_of_sync();
                    self.report_failure(instance_id, template_id, error, ctx, report);
                }
            }
        }
        store.mark_propagated(template_id);
        Some(revision)
    }

    fn report_failure(
        &self,
        instance: InstanceId,
        template: TemplateId,
        error: PrefabError,
        ctx: &mut UpdateContext<'_>,
        report: &mut UpdateReport,
    ) {
        let failure = InstanceUpdateError {
            instance,
            template,
            error,
        };
        log::error!("{failure}");
        for observer in ctx.observers.iter_mut() {
            observer.on_instance_update_failed(&failure);
        }
        report.failures.push(failure);
    }
}
