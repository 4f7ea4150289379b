//! Document model collaborator.
//!
//! [`DocumentModel`] is the narrow surface the submission engine needs from the
//! surrounding forms runtime. [`InMemoryDocument`] is a self-contained implementation
//! used by embedders without their own model and by the test suite.

use super::{Element, Instance, NodeRef};
use crate::error::{EngineResult, SubmissionError};
use std::collections::HashSet;

/// Bound node, instance lookup, mutation and model upkeep for one document.
///
/// All mutations happen on a caller-facing turn; units of work running on the worker
/// pool never receive a reference to the document.
pub trait DocumentModel: Send + Sync {
    /// Stable identity used to key per-document asynchronous state
    fn uuid(&self) -> &str;

    /// Whether the document is still being built (initial page load)
    fn is_initializing(&self) -> bool;

    fn instance(&self, instance_id: &str) -> Option<&Instance>;

    /// First instance of the given model
    fn default_instance(&self, model_id: &str) -> Option<&Instance>;

    fn element(&self, node: &NodeRef) -> Option<&Element> {
        self.instance(&node.instance_id)?.root.descendant(&node.path)
    }

    /// Swap the whole content of an existing instance.
    fn replace_instance(&mut self, instance: Instance) -> EngineResult<()>;

    /// Insert `element` as the preceding sibling of `target`; returns the new node.
    fn insert_before(&mut self, target: &NodeRef, element: Element) -> EngineResult<NodeRef>;

    fn delete(&mut self, target: &NodeRef) -> EngineResult<Element>;

    /// Replace the content of `target` with a text value.
    fn set_value(&mut self, target: &NodeRef, value: &str) -> EngineResult<()>;

    fn rebuild(&mut self, model_id: &str) -> EngineResult<()>;

    fn recalculate_revalidate(&mut self, model_id: &str) -> EngineResult<()>;

    /// Flag the model for rebuild/recalculate/revalidate/refresh after a replacement.
    fn mark_structural_change(&mut self, model_id: &str);

    /// Whether bound relevant upload controls still have uploads in flight
    fn has_pending_uploads(&self, instance_id: &str) -> bool;

    /// Record that a submission produced the full response for this turn.
    fn mark_submission_replace_all(&mut self);

    fn got_submission_replace_all(&self) -> bool;

    /// Effective id of the deferred full-page submission awaiting its second pass
    fn active_deferred_submission(&self) -> Option<&str>;

    fn set_active_deferred_submission(&mut self, submission_id: Option<String>);

    /// Ask the client to load `url` itself at the end of this turn.
    fn schedule_client_load(&mut self, url: String);
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryDocument {
    uuid: String,
    instances: Vec<Instance>,
    initializing: bool,
    replace_all: bool,
    active_deferred: Option<String>,
    pending_uploads: HashSet<String>,
    client_loads: Vec<String>,
    rebuilds: usize,
    recalculations: usize,
    structural_changes: usize,
}

impl InMemoryDocument {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.instances.push(instance);
        self
    }

    #[must_use]
    pub fn initializing(mut self, initializing: bool) -> Self {
        self.initializing = initializing;
        self
    }

    pub fn set_initializing(&mut self, initializing: bool) {
        self.initializing = initializing;
    }

    pub fn add_pending_upload(&mut self, instance_id: impl Into<String>) {
        self.pending_uploads.insert(instance_id.into());
    }

    pub fn clear_pending_uploads(&mut self) {
        self.pending_uploads.clear();
    }

    /// Start a new turn: forget per-turn replace-all and client loads.
    pub fn begin_turn(&mut self) {
        self.replace_all = false;
        self.client_loads.clear();
    }

    pub fn client_loads(&self) -> &[String] {
        &self.client_loads
    }

    pub fn rebuild_count(&self) -> usize {
        self.rebuilds
    }

    pub fn recalculate_count(&self) -> usize {
        self.recalculations
    }

    pub fn structural_change_count(&self) -> usize {
        self.structural_changes
    }

    fn writable_instance(&mut self, instance_id: &str) -> EngineResult<&mut Instance> {
        let instance = self
            .instances
            .iter_mut()
            .find(|instance| instance.id == instance_id)
            .ok_or_else(|| SubmissionError::target(format!("no instance with id '{instance_id}'")))?;
        if instance.read_only {
            return Err(SubmissionError::target(format!(
                "instance '{instance_id}' is read-only"
            )));
        }
        Ok(instance)
    }

    fn parent_and_index<'a>(
        &'a mut self,
        target: &NodeRef,
    ) -> EngineResult<(&'a mut Element, usize)> {
        let (index, parent_path) = target.path.split_last().ok_or_else(|| {
            SubmissionError::target("the root element of an instance has no parent")
        })?;
        let instance = self.writable_instance(&target.instance_id)?;
        let parent = instance
            .root
            .descendant_mut(parent_path)
            .ok_or_else(|| SubmissionError::target("target node does not exist"))?;
        Ok((parent, *index))
    }
}

impl DocumentModel for InMemoryDocument {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn is_initializing(&self) -> bool {
        self.initializing
    }

    fn instance(&self, instance_id: &str) -> Option<&Instance> {
        self.instances.iter().find(|instance| instance.id == instance_id)
    }

    fn default_instance(&self, model_id: &str) -> Option<&Instance> {
        self.instances
            .iter()
            .find(|instance| instance.model_id == model_id)
    }

    fn replace_instance(&mut self, instance: Instance) -> EngineResult<()> {
        let slot = self
            .instances
            .iter_mut()
            .find(|existing| existing.id == instance.id)
            .ok_or_else(|| {
                SubmissionError::target(format!("no instance with id '{}'", instance.id))
            })?;
        *slot = instance;
        Ok(())
    }

    fn insert_before(&mut self, target: &NodeRef, element: Element) -> EngineResult<NodeRef> {
        let (parent, index) = self.parent_and_index(target)?;
        if index >= parent.children.len() {
            return Err(SubmissionError::target("target node does not exist"));
        }
        parent.children.insert(index, element);
        Ok(target.clone())
    }

    fn delete(&mut self, target: &NodeRef) -> EngineResult<Element> {
        let (parent, index) = self.parent_and_index(target)?;
        if index >= parent.children.len() {
            return Err(SubmissionError::target("target node does not exist"));
        }
        Ok(parent.children.remove(index))
    }

    fn set_value(&mut self, target: &NodeRef, value: &str) -> EngineResult<()> {
        let instance = self.writable_instance(&target.instance_id)?;
        let element = instance
            .root
            .descendant_mut(&target.path)
            .ok_or_else(|| SubmissionError::target("target node does not exist"))?;
        element.children.clear();
        element.text = value.to_string();
        Ok(())
    }

    fn rebuild(&mut self, _model_id: &str) -> EngineResult<()> {
        self.rebuilds += 1;
        Ok(())
    }

    fn recalculate_revalidate(&mut self, _model_id: &str) -> EngineResult<()> {
        self.recalculations += 1;
        Ok(())
    }

    fn mark_structural_change(&mut self, _model_id: &str) {
        self.structural_changes += 1;
    }

    fn has_pending_uploads(&self, instance_id: &str) -> bool {
        self.pending_uploads.contains(instance_id)
    }

    fn mark_submission_replace_all(&mut self) {
        self.replace_all = true;
    }

    fn got_submission_replace_all(&self) -> bool {
        self.replace_all
    }

    fn active_deferred_submission(&self) -> Option<&str> {
        self.active_deferred.as_deref()
    }

    fn set_active_deferred_submission(&mut self, submission_id: Option<String>) {
        self.active_deferred = submission_id;
    }

    fn schedule_client_load(&mut self, url: String) {
        self.client_loads.push(url);
    }
}
