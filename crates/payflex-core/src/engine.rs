//! The gateway engine: one explicitly constructed object wiring the
//! reconciliation components to shared backends.

use crate::{
	CallbackReconciler, CheckoutInitiator, CheckoutResult, CoreError, PaymentAvailability, Redirect,
	RefundHandler, RefundPath, RequestScope, SweepReport, Sweeper, WorkflowState,
};
use payflex_config::Config;
use payflex_orders::OrderStore;
use payflex_provider::ProviderService;
use payflex_storage::StorageService;
use payflex_types::{OrderId, OrderStatus, RefundOutcome, RemoteOrder, RemoteOrderStatus, ReturnParams};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

/// The gateway's service object: every entry point the HTTP surface and the
/// scheduler call goes through here.
pub struct GatewayEngine {
	pub(crate) config: Arc<Config>,
	pub(crate) storage: Arc<StorageService>,
	pub(crate) orders: Arc<OrderStore>,
	pub(crate) provider: Arc<ProviderService>,
	pub(crate) checkout: CheckoutInitiator,
	pub(crate) callback: CallbackReconciler,
	pub(crate) sweeper: Sweeper,
	pub(crate) refunds: RefundHandler,
	pub(crate) availability: PaymentAvailability,
}

impl GatewayEngine {
	pub(crate) fn assemble(
		config: Config,
		storage: Arc<StorageService>,
		orders: Arc<OrderStore>,
		provider: Arc<ProviderService>,
	) -> Self {
		let config = Arc::new(config);
		let workflow = Arc::new(WorkflowState::new(orders.clone()));

		Self {
			checkout: CheckoutInitiator::new(
				config.clone(),
				orders.clone(),
				provider.clone(),
				workflow.clone(),
			),
			callback: CallbackReconciler::new(orders.clone(), provider.clone(), workflow.clone()),
			sweeper: Sweeper::new(config.clone(), orders.clone(), provider.clone(), workflow),
			refunds: RefundHandler::new(orders.clone(), provider.clone()),
			availability: PaymentAvailability::new(provider.clone()),
			config,
			storage,
			orders,
			provider,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn orders(&self) -> &Arc<OrderStore> {
		&self.orders
	}

	pub fn provider(&self) -> &Arc<ProviderService> {
		&self.provider
	}

	pub fn checkout(&self) -> &CheckoutInitiator {
		&self.checkout
	}

	pub fn availability(&self) -> &PaymentAvailability {
		&self.availability
	}

	pub async fn initiate(
		&self,
		scope: &mut RequestScope,
		order_id: &OrderId,
	) -> Result<CheckoutResult, CoreError> {
		self.checkout.initiate(scope, order_id).await
	}

	pub async fn provider_redirect(&self, order_id: &OrderId) -> Result<Redirect, CoreError> {
		self.checkout.provider_redirect(order_id).await
	}

	/// Entry point for the return URL. Cancellations are handled first.
	pub async fn handle_return(&self, scope: &mut RequestScope, params: &ReturnParams) -> Redirect {
		if params.is_cancellation() {
			self.callback.handle_cancel(scope, params).await
		} else {
			self.callback.handle_return(scope, params).await
		}
	}

	pub async fn sweep(&self, include_new: bool) -> Result<SweepReport, CoreError> {
		self.sweeper.sweep(include_new).await
	}

	pub async fn refund(
		&self,
		order_id: &OrderId,
		amount: Decimal,
		path: RefundPath,
	) -> Result<RefundOutcome, CoreError> {
		self.refunds.refund(order_id, amount, path).await
	}

	pub async fn refund_in_full(&self, order_id: &OrderId) -> Result<RefundOutcome, CoreError> {
		self.refunds.refund_in_full(order_id).await
	}

	/// Changes an order's status on behalf of the merchant. Moving a paid
	/// order to `refunded` refunds its total through the provider.
	#[instrument(skip(self))]
	pub async fn set_order_status(
		&self,
		order_id: &OrderId,
		status: OrderStatus,
	) -> Result<Option<RefundOutcome>, CoreError> {
		let order = self.orders.load(order_id).await?;
		if order.status == status {
			return Ok(None);
		}
		self.orders.update_status(order_id, status).await?;

		if status == OrderStatus::Refunded && RefundHandler::can_refund(&order) {
			return self.refunds.refund_in_full(order_id).await.map(Some);
		}
		Ok(None)
	}

	pub async fn is_available(&self, cart_total: Decimal) -> bool {
		self.availability.is_available(cart_total).await
	}

	/// Raw remote order lookup for support tooling.
	pub async fn fetch_remote_order(&self, remote_order_id: &str) -> Result<RemoteOrder, CoreError> {
		Ok(self.provider.fetch_order(remote_order_id).await?)
	}

	pub async fn check_remote_status(
		&self,
		order_id: &OrderId,
	) -> Result<Option<RemoteOrderStatus>, CoreError> {
		self.callback.check_remote_status(order_id).await
	}

	/// Runs the sweeper and refreshes payment limits on a fixed interval
	/// until `shutdown` fires.
	pub async fn run_scheduled(&self, mut shutdown: broadcast::Receiver<()>) {
		let settings = &self.config.sweeper;
		let mut interval = tokio::time::interval(Duration::from_secs(settings.interval_secs));
		info!(
			interval_secs = settings.interval_secs,
			sweeper_enabled = settings.enabled,
			"Scheduled tasks started"
		);

		loop {
			tokio::select! {
				_ = interval.tick() => {
					if settings.enabled {
						if let Err(e) = self.sweep(false).await {
							error!(error = %e, "Scheduled sweep failed");
						}
					}
					self.availability.refresh().await;
				}
				_ = shutdown.recv() => {
					info!("Scheduled tasks received shutdown signal");
					break;
				}
			}
		}
	}
}
