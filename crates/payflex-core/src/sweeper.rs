//! Scheduled recovery of orders whose outcome never came back through the
//! shopper's browser.
//!
//! The sweeper polls the provider for every recent unpaid order that carries
//! a remote order id and applies the reported outcome. The stored remote id
//! comes from trusted storage, so the remote order is fetched directly
//! without the token and amount cross-check of the callback path. Every note
//! is written at most once, which keeps repeated or overlapping passes safe.

use crate::{CoreError, RequestScope, VerifiedBy, VerifiedOrder, WorkflowState};
use chrono::{DateTime, Duration, Utc};
use payflex_config::{Config, SweeperConfig};
use payflex_orders::OrderStore;
use payflex_provider::ProviderService;
use payflex_types::{LocalOrder, OrderQuery, OrderStatus, RemoteOrderStatus, WorkflowStatus};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const STILL_PENDING_NOTE: &str = "Checked payment status with Payflex. Still pending approval.";

/// Age class of a candidate order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeBucket {
	/// Younger than `new_order_minutes`; only swept on an all-orders pass.
	New,
	/// Between `new_order_minutes` and `max_age_minutes`, inclusive.
	Scheduled,
	/// Older than `max_age_minutes`; never revisited.
	Expired,
}

impl AgeBucket {
	pub fn of(created_at: DateTime<Utc>, now: DateTime<Utc>, config: &SweeperConfig) -> Self {
		let age = now - created_at;
		if age < Duration::minutes(config.new_order_minutes) {
			Self::New
		} else if age <= Duration::minutes(config.max_age_minutes) {
			Self::Scheduled
		} else {
			Self::Expired
		}
	}
}

/// Counters for one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
	pub examined: usize,
	pub completed: usize,
	pub cancelled: usize,
	pub failed: usize,
	pub pending: usize,
	pub skipped: usize,
	pub errors: usize,
}

enum SweepAction {
	Completed,
	Cancelled,
	Failed,
	Pending,
	Skipped,
}

/// Periodic reconciliation of unpaid orders against the provider.
///
/// Picks up orders whose shopper never came back from the provider's pages
/// and settles them from the remote status.
pub struct Sweeper {
	/// Age windows and note settings.
	config: Arc<Config>,
	orders: Arc<OrderStore>,
	provider: Arc<ProviderService>,
	workflow: Arc<WorkflowState>,
}

impl Sweeper {
	pub fn new(
		config: Arc<Config>,
		orders: Arc<OrderStore>,
		provider: Arc<ProviderService>,
		workflow: Arc<WorkflowState>,
	) -> Self {
		Self {
			config,
			orders,
			provider,
			workflow,
		}
	}

	/// Local orders eligible for this pass, oldest window first.
	async fn candidates(&self, include_new: bool, now: DateTime<Utc>) -> Result<Vec<LocalOrder>, CoreError> {
		let settings = &self.config.sweeper;
		let created_before = if include_new {
			now
		} else {
			now - Duration::minutes(settings.new_order_minutes)
		};
		let query = OrderQuery {
			statuses: vec![OrderStatus::Pending, OrderStatus::Failed, OrderStatus::Cancelled],
			payment_method: self.config.gateway.payment_method.clone(),
			created_after: now - Duration::minutes(settings.max_age_minutes),
			created_before,
		};

		let mut orders = self.orders.query(&query).await?;
		orders.retain(|order| match AgeBucket::of(order.created_at, now, settings) {
			AgeBucket::New => include_new,
			AgeBucket::Scheduled => true,
			AgeBucket::Expired => false,
		});
		orders.sort_by_key(|order| order.created_at);
		Ok(orders)
	}

	#[instrument(skip(self))]
	pub async fn sweep(&self, include_new: bool) -> Result<SweepReport, CoreError> {
		let now = Utc::now();
		let candidates = self.candidates(include_new, now).await?;
		let mut scope = RequestScope::new();
		let mut report = SweepReport::default();

		for order in candidates {
			report.examined += 1;
			let id = order.id.clone();
			match self.reconcile(&mut scope, order).await {
				Ok(SweepAction::Completed) => report.completed += 1,
				Ok(SweepAction::Cancelled) => report.cancelled += 1,
				Ok(SweepAction::Failed) => report.failed += 1,
				Ok(SweepAction::Pending) => report.pending += 1,
				Ok(SweepAction::Skipped) => report.skipped += 1,
				Err(e) => {
					warn!(order_id = %id, error = %e, "Sweep failed for order");
					report.errors += 1;
				}
			}
		}

		info!(?report, "Sweep finished");
		Ok(report)
	}

	async fn reconcile(&self, scope: &mut RequestScope, order: LocalOrder) -> Result<SweepAction, CoreError> {
		let Some(remote_order_id) = WorkflowState::remote_order_id(&order) else {
			return Ok(SweepAction::Skipped);
		};

		let remote = match self.provider.fetch_order(&remote_order_id).await {
			Ok(remote) => remote,
			Err(e) => {
				debug!(order_id = %order.id, error = %e, "Remote order unavailable, retrying next pass");
				return Ok(SweepAction::Skipped);
			}
		};

		let id = order.id.clone();
		let verified = VerifiedOrder::new(order, remote.order_status.clone(), VerifiedBy::StoredReference);

		match remote.order_status {
			Some(RemoteOrderStatus::Initiated) => Ok(SweepAction::Skipped),
			Some(RemoteOrderStatus::Approved) => {
				self.orders
					.add_note_once(
						&id,
						&format!("Payment Approved via CRON. Payflex order ID: {}", remote_order_id),
					)
					.await?;
				self.orders.payment_complete(&id, &remote_order_id).await?;
				self.workflow
					.transition(scope, &verified, WorkflowStatus::Completed)
					.await?;
				info!(order_id = %id, %remote_order_id, "Approved payment recovered");
				Ok(SweepAction::Completed)
			}
			Some(RemoteOrderStatus::Created) => {
				if self.config.sweeper.enable_order_notes {
					self.orders.add_note_once(&id, STILL_PENDING_NOTE).await?;
				}
				Ok(SweepAction::Pending)
			}
			Some(status @ (RemoteOrderStatus::Abandoned | RemoteOrderStatus::Declined)) => {
				self.orders
					.add_note_once(
						&id,
						&format!(
							"Payment checked via CRON. Order {}. Payflex order ID: {}",
							status, remote_order_id
						),
					)
					.await?;
				self.orders.update_status(&id, OrderStatus::Cancelled).await?;
				Ok(SweepAction::Cancelled)
			}
			other => {
				debug!(order_id = %id, status = ?other, "Unrecognised remote status");
				self.orders
					.add_note_once(
						&id,
						&format!("Payment processed via CRON. Payflex Order ID: {}", remote_order_id),
					)
					.await?;
				self.orders.update_status(&id, OrderStatus::Failed).await?;
				Ok(SweepAction::Failed)
			}
		}
	}
}
