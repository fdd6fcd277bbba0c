use payflex_types::{OrderId, WorkflowStatus};
use std::collections::HashMap;

/// Per-request state: one per callback, checkout or sweep pass.
///
/// Caches workflow status reads and writes so that a request sees its own
/// writes without re-reading metadata, and remembers the order a callback
/// already processed.
#[derive(Debug, Default)]
pub struct RequestScope {
	workflow: HashMap<OrderId, Option<WorkflowStatus>>,
	processed: Option<OrderId>,
}

impl RequestScope {
	pub fn new() -> Self {
		Self::default()
	}

	pub(crate) fn cached_workflow(&self, id: &OrderId) -> Option<Option<WorkflowStatus>> {
		self.workflow.get(id).copied()
	}

	pub(crate) fn cache_workflow(&mut self, id: &OrderId, status: Option<WorkflowStatus>) {
		self.workflow.insert(id.clone(), status);
	}

	/// Order already reconciled within this request, if any.
	pub fn processed(&self) -> Option<&OrderId> {
		self.processed.as_ref()
	}

	pub(crate) fn mark_processed(&mut self, id: &OrderId) {
		self.processed = Some(id.clone());
	}
}
