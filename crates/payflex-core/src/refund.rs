//! Refunds of paid orders through the provider.

use crate::{CoreError, WorkflowState};
use payflex_orders::OrderStore;
use payflex_provider::ProviderService;
use payflex_types::{format_amount, LocalOrder, OrderId, RefundOutcome};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const GENERIC_REFUND_NOTE: &str = "There was an error submitting the refund to Payflex.";
const NOT_FOUND_NOTE: &str = "Order not found on Payflex.";

/// What started the refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundPath {
	/// A merchant-entered refund of a chosen amount.
	Manual,
	/// Full refund issued when the order moved to `refunded`.
	Automatic,
}

/// Sends refunds to the provider and records the outcome as an order note.
pub struct RefundHandler {
	orders: Arc<OrderStore>,
	provider: Arc<ProviderService>,
}

impl RefundHandler {
	pub fn new(orders: Arc<OrderStore>, provider: Arc<ProviderService>) -> Self {
		Self { orders, provider }
	}

	/// Only orders paid through the provider carry a transaction reference.
	pub fn can_refund(order: &LocalOrder) -> bool {
		order
			.transaction_id
			.as_deref()
			.is_some_and(|id| !id.is_empty())
	}

	/// Sends a refund and records the outcome as an order note.
	#[instrument(skip(self))]
	pub async fn refund(
		&self,
		order_id: &OrderId,
		amount: Decimal,
		path: RefundPath,
	) -> Result<RefundOutcome, CoreError> {
		if amount <= Decimal::ZERO {
			return Err(CoreError::InvalidRequest(format!(
				"Refund amount must be positive, got {}",
				amount
			)));
		}

		let order = self.orders.load(order_id).await?;
		let Some(remote_order_id) = WorkflowState::remote_order_id(&order) else {
			warn!("No Payflex order id stored, cannot refund");
			self.orders.add_note(order_id, GENERIC_REFUND_NOTE).await?;
			return Ok(RefundOutcome::Failure {
				reason: "No Payflex order id stored on the order".to_string(),
			});
		};

		let request_id = refund_request_id(order_id);
		info!(%remote_order_id, %request_id, "Submitting refund");
		let outcome = self
			.provider
			.refund_order(&remote_order_id, amount, &request_id)
			.await;

		let note = match &outcome {
			RefundOutcome::Success => format!(
				"Refund of {} successfully sent to Payflex.",
				format_amount(amount)
			),
			RefundOutcome::BusinessError { message, .. } => message.clone(),
			RefundOutcome::NotFound => NOT_FOUND_NOTE.to_string(),
			RefundOutcome::Failure { reason } => {
				warn!(%reason, "Refund failed");
				GENERIC_REFUND_NOTE.to_string()
			}
		};
		self.orders.add_note(order_id, &note).await?;
		Ok(outcome)
	}

	/// Refunds the order total. Used when an order is marked refunded.
	pub async fn refund_in_full(&self, order_id: &OrderId) -> Result<RefundOutcome, CoreError> {
		let order = self.orders.load(order_id).await?;
		self.refund(order_id, order.total, RefundPath::Automatic).await
	}
}

/// `Order #<id>-<8 random characters>`, also used as the refund reference.
fn refund_request_id(order_id: &OrderId) -> String {
	let suffix = Uuid::new_v4().simple().to_string();
	format!("Order #{}-{}", order_id, &suffix[..8])
}
