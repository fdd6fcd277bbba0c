//! Reconciliation of the shopper's return from the provider.
//!
//! Query parameters are never trusted. The local order's stored token and
//! total must match the provider's copy before its status is acted on, and
//! each outcome writes its note only when the workflow was not already in
//! the target state.

use crate::{CoreError, Redirect, RequestScope, VerifiedBy, VerifiedOrder, WorkflowState};
use payflex_orders::OrderStore;
use payflex_provider::ProviderService;
use payflex_types::{OrderId, OrderStatus, RemoteOrderStatus, ReturnParams, WorkflowStatus};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

const CANCELLED_NOTE: &str = "Payment cancelled by the customer while on the Payflex checkout pages.";

/// Verifies shopper returns against the provider and applies the outcome to
/// the local order.
///
/// Every path is safe to replay: a second identical return leaves the order,
/// its workflow status and its notes as the first one did.
pub struct CallbackReconciler {
	orders: Arc<OrderStore>,
	provider: Arc<ProviderService>,
	workflow: Arc<WorkflowState>,
}

impl CallbackReconciler {
	pub fn new(
		orders: Arc<OrderStore>,
		provider: Arc<ProviderService>,
		workflow: Arc<WorkflowState>,
	) -> Self {
		Self {
			orders,
			provider,
			workflow,
		}
	}

	/// Handles a confirm return. Never fails: errors end in a failure redirect.
	#[instrument(skip_all, fields(order_id = ?params.order_id))]
	pub async fn handle_return(&self, scope: &mut RequestScope, params: &ReturnParams) -> Redirect {
		let Some(untrusted) = params.untrusted_order_id() else {
			warn!("Invalid callback data received on payment callback");
			return Redirect::Failure(None);
		};
		let lookup_id = untrusted.lookup_id();

		let has = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
		if !has(&params.status) || !has(&params.token) {
			warn!("Invalid callback data received on payment callback");
			return Redirect::Failure(Some(lookup_id));
		}

		if scope.processed() == Some(&lookup_id) {
			debug!("Order already processed in this request");
			return Redirect::Failure(Some(lookup_id));
		}

		match self.reconcile(scope, &lookup_id).await {
			Ok(redirect) => redirect,
			Err(e) => {
				error!(error = %e, "Callback reconciliation failed");
				Redirect::Failure(Some(lookup_id))
			}
		}
	}

	async fn reconcile(&self, scope: &mut RequestScope, id: &OrderId) -> Result<Redirect, CoreError> {
		let order = self.orders.load(id).await?;
		let expected = WorkflowState::expected(&order);

		let Some(remote_status) = self.provider.check_status(&expected).await else {
			warn!("Remote status unavailable or did not match the local order");
			return Ok(Redirect::Failure(Some(order.id)));
		};
		let Some(remote_order_id) = expected.remote_order_id else {
			return Ok(Redirect::Failure(Some(order.id)));
		};

		info!(%remote_order_id, %remote_status, "Processing Payflex return");
		let verified = VerifiedOrder::new(order, Some(remote_status.clone()), VerifiedBy::RemoteMatch);
		let id = verified.id().clone();
		let local_status = verified.order().status;

		match remote_status {
			RemoteOrderStatus::Approved if local_status.is_paid() => Ok(Redirect::Success(id)),
			RemoteOrderStatus::Approved => {
				if !self.workflow.permits(scope, &verified, WorkflowStatus::Completed) {
					return Ok(Redirect::Unknown(id));
				}
				if self.workflow.workflow_status(scope, verified.order()) != Some(WorkflowStatus::Completed) {
					self.orders
						.add_note(&id, &format!("Payment approved. Payflex order ID: {}", remote_order_id))
						.await?;
				}
				self.orders.payment_complete(&id, &remote_order_id).await?;
				self.workflow
					.transition(scope, &verified, WorkflowStatus::Completed)
					.await?;
				scope.mark_processed(&id);
				self.orders.empty_cart(&id).await?;
				Ok(Redirect::Success(id))
			}
			RemoteOrderStatus::Declined | RemoteOrderStatus::Abandoned
				if local_status == OrderStatus::Failed =>
			{
				Ok(Redirect::Failure(Some(id)))
			}
			RemoteOrderStatus::Declined => {
				self.fail(scope, &verified, WorkflowStatus::Failed, &format!(
					"Payflex payment declined. Order ID from Payflex: {}",
					remote_order_id
				))
				.await
			}
			RemoteOrderStatus::Abandoned => {
				self.fail(scope, &verified, WorkflowStatus::Abandoned, &format!(
					"Payflex payment abandoned. Order ID from Payflex: {}",
					remote_order_id
				))
				.await
			}
			other => {
				debug!(status = %other, "No action for remote status");
				Ok(Redirect::Unknown(id))
			}
		}
	}

	async fn fail(
		&self,
		scope: &mut RequestScope,
		verified: &VerifiedOrder,
		workflow: WorkflowStatus,
		note: &str,
	) -> Result<Redirect, CoreError> {
		let id = verified.id().clone();
		if !self.workflow.permits(scope, verified, workflow) {
			return Ok(Redirect::Unknown(id));
		}
		if self.workflow.workflow_status(scope, verified.order()) != Some(workflow) {
			self.orders.add_note(&id, note).await?;
		}
		scope.mark_processed(&id);
		self.orders.update_status(&id, OrderStatus::Failed).await?;
		self.workflow.transition(scope, verified, workflow).await?;
		Ok(Redirect::Failure(Some(id)))
	}

	/// Handles a shopper cancelling on the provider's pages.
	#[instrument(skip_all)]
	pub async fn handle_cancel(&self, scope: &mut RequestScope, params: &ReturnParams) -> Redirect {
		let Some(key) = params.key.as_deref().filter(|k| !k.is_empty()) else {
			return Redirect::Failure(params.untrusted_order_id().map(|id| id.lookup_id()));
		};

		let order = match self.orders.find_by_key(key).await {
			Ok(Some(order)) => order,
			Ok(None) => {
				warn!("Cancel return for unknown order key");
				return Redirect::Failure(None);
			}
			Err(e) => {
				error!(error = %e, "Order lookup by key failed");
				return Redirect::Failure(None);
			}
		};

		match self.cancel(scope, order).await {
			Ok(redirect) => redirect,
			Err(e) => {
				error!(error = %e, "Cancel handling failed");
				Redirect::Failure(None)
			}
		}
	}

	async fn cancel(
		&self,
		scope: &mut RequestScope,
		order: payflex_types::LocalOrder,
	) -> Result<Redirect, CoreError> {
		let remote_status = match WorkflowState::remote_order_id(&order) {
			Some(remote_order_id) => match self.provider.fetch_order(&remote_order_id).await {
				Ok(remote) => remote.order_status,
				Err(e) => {
					warn!(error = %e, "Remote order lookup failed on cancel");
					None
				}
			},
			None => None,
		};

		let verified = VerifiedOrder::new(order, remote_status, VerifiedBy::OrderKey);
		let id = verified.id().clone();
		let workflow = self.workflow.workflow_status(scope, verified.order());

		let approved = verified.remote_status() == Some(&RemoteOrderStatus::Approved);
		if approved && workflow == Some(WorkflowStatus::Abandoned) {
			return Ok(Redirect::Retry(id));
		}

		if !self.workflow.permits(scope, &verified, WorkflowStatus::Abandoned) {
			let paid = workflow == Some(WorkflowStatus::Completed) || verified.order().status.is_paid();
			info!(order_id = %id, workflow = ?workflow, paid, "Ignoring cancel return for a settled attempt");
			return Ok(if paid {
				Redirect::Success(id)
			} else {
				Redirect::Retry(id)
			});
		}

		info!(order_id = %id, "Payment cancelled by the customer on the Payflex pages");
		if workflow != Some(WorkflowStatus::Abandoned) {
			self.orders.add_note(&id, CANCELLED_NOTE).await?;
		}
		self.workflow
			.transition(scope, &verified, WorkflowStatus::Abandoned)
			.await?;
		Ok(Redirect::Cancelled(id))
	}

	/// Support tooling: asks the provider for the order's status and records it.
	pub async fn check_remote_status(&self, id: &OrderId) -> Result<Option<RemoteOrderStatus>, CoreError> {
		let order = self.orders.load(id).await?;
		let expected = WorkflowState::expected(&order);
		if expected.remote_order_id.is_none() || expected.token.is_none() {
			return Ok(None);
		}

		let Some(status) = self.provider.check_status(&expected).await else {
			return Ok(None);
		};

		let note = format!("Remote status check for order {} returned {}", id, status);
		info!("{}", note);
		self.orders.add_note(id, &note).await?;
		Ok(Some(status))
	}
}
