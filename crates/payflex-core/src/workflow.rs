//! Workflow status and remote identifiers stored on local orders.
//!
//! Every gateway-owned metadata value is read through [`WorkflowState::resolve`],
//! which walks the field's alias list so orders written under legacy names
//! keep working. New writes go to the current name; remote identifiers are
//! also mirrored to the legacy names.

use crate::{CoreError, RequestScope};
use payflex_orders::OrderStore;
use payflex_types::{
	CreatedOrder, ExpectedOrder, LocalOrder, MetaField, OrderId, RemoteOrderStatus, WorkflowStatus,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// How an order came to be trusted for state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedBy {
	/// Remote token and amount matched the local order.
	RemoteMatch,
	/// Located through its secret order key.
	OrderKey,
	/// Selected by the sweeper and checked by its stored remote order id.
	StoredReference,
}

/// A local order that may be mutated by reconciliation.
///
/// Only this crate can construct one, after checking the order against the
/// provider or locating it through a trusted reference.
#[derive(Debug, Clone)]
pub struct VerifiedOrder {
	order: LocalOrder,
	remote_status: Option<RemoteOrderStatus>,
	verified_by: VerifiedBy,
}

impl VerifiedOrder {
	pub(crate) fn new(
		order: LocalOrder,
		remote_status: Option<RemoteOrderStatus>,
		verified_by: VerifiedBy,
	) -> Self {
		Self {
			order,
			remote_status,
			verified_by,
		}
	}

	pub fn id(&self) -> &OrderId {
		&self.order.id
	}

	pub fn order(&self) -> &LocalOrder {
		&self.order
	}

	pub fn remote_status(&self) -> Option<&RemoteOrderStatus> {
		self.remote_status.as_ref()
	}

	pub fn verified_by(&self) -> VerifiedBy {
		self.verified_by
	}
}

/// Reads and writes the gateway's workflow status and remote identifiers on
/// local orders.
///
/// Reads go through the request scope's cache. Transitions are checked with
/// [`WorkflowStatus::can_transition_to`]; refused ones are logged and leave the
/// order untouched.
pub struct WorkflowState {
	orders: Arc<OrderStore>,
}

impl WorkflowState {
	pub fn new(orders: Arc<OrderStore>) -> Self {
		Self { orders }
	}

	/// First non-empty value among the field's aliases.
	pub fn resolve(order: &LocalOrder, field: MetaField) -> Option<String> {
		field
			.aliases()
			.iter()
			.find_map(|name| order.meta_value(name))
			.map(str::to_string)
	}

	pub fn remote_order_id(order: &LocalOrder) -> Option<String> {
		Self::resolve(order, MetaField::OrderId)
	}

	pub fn remote_order_token(order: &LocalOrder) -> Option<String> {
		Self::resolve(order, MetaField::OrderToken)
	}

	pub fn redirect_url(order: &LocalOrder) -> Option<String> {
		Self::resolve(order, MetaField::RedirectUrl)
	}

	/// What the provider's copy of this order must match.
	pub fn expected(order: &LocalOrder) -> ExpectedOrder {
		ExpectedOrder {
			remote_order_id: Self::remote_order_id(order),
			token: Self::remote_order_token(order),
			total: order.total,
		}
	}

	pub fn workflow_status(&self, scope: &mut RequestScope, order: &LocalOrder) -> Option<WorkflowStatus> {
		if let Some(cached) = scope.cached_workflow(&order.id) {
			return cached;
		}

		let status = Self::resolve(order, MetaField::WorkflowStatus).and_then(|raw| {
			raw.parse()
				.map_err(|e| warn!(order_id = %order.id, error = %e, "Ignoring stored workflow status"))
				.ok()
		});
		scope.cache_workflow(&order.id, status);
		status
	}

	async fn write_status(
		&self,
		scope: &mut RequestScope,
		id: &OrderId,
		status: WorkflowStatus,
	) -> Result<(), CoreError> {
		self.orders
			.set_meta(id, MetaField::WorkflowStatus.current(), status.as_str())
			.await?;
		scope.cache_workflow(id, Some(status));
		debug!(order_id = %id, %status, "Workflow status updated");
		Ok(())
	}

	/// Starts a new payment attempt, restarting a failed or abandoned workflow.
	pub(crate) async fn begin_attempt(
		&self,
		scope: &mut RequestScope,
		id: &OrderId,
	) -> Result<(), CoreError> {
		self.write_status(scope, id, WorkflowStatus::Initiated).await
	}

	/// Whether the verified order may move to `next`.
	pub fn permits(&self, scope: &mut RequestScope, verified: &VerifiedOrder, next: WorkflowStatus) -> bool {
		match self.workflow_status(scope, verified.order()) {
			Some(current) => current.can_transition_to(next, verified.remote_status()),
			None => true,
		}
	}

	/// Applies a reconciliation transition. Returns whether the status changed.
	pub async fn transition(
		&self,
		scope: &mut RequestScope,
		verified: &VerifiedOrder,
		next: WorkflowStatus,
	) -> Result<bool, CoreError> {
		let current = self.workflow_status(scope, verified.order());
		if current == Some(next) {
			return Ok(false);
		}
		if !self.permits(scope, verified, next) {
			warn!(
				order_id = %verified.id(),
				current = ?current,
				next = %next,
				verified_by = ?verified.verified_by(),
				"Refusing workflow transition"
			);
			return Ok(false);
		}
		debug!(order_id = %verified.id(), verified_by = ?verified.verified_by(), "Applying workflow transition");
		self.write_status(scope, verified.id(), next).await?;
		Ok(true)
	}

	/// Stores the identifiers of a newly created remote order under current
	/// and legacy names.
	pub async fn store_remote_order(&self, id: &OrderId, created: &CreatedOrder) -> Result<(), CoreError> {
		let values = [
			(MetaField::OrderToken, created.token.as_str()),
			(MetaField::OrderId, created.remote_order_id.as_str()),
			(MetaField::RedirectUrl, created.redirect_url.as_str()),
		];
		for (field, value) in values {
			for name in field.aliases() {
				self.orders.set_meta(id, name, value).await?;
			}
		}
		Ok(())
	}
}
