use payflex_provider::ProviderService;
use payflex_types::PaymentLimits;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// Decides whether the payment option is offered for a cart total.
///
/// Fails closed: without known limits (no credentials, provider outage) the
/// option is hidden.
pub struct PaymentAvailability {
	provider: Arc<ProviderService>,
}

impl PaymentAvailability {
	pub fn new(provider: Arc<ProviderService>) -> Self {
		Self { provider }
	}

	pub async fn limits(&self) -> Option<PaymentLimits> {
		self.provider.fetch_configuration().await
	}

	pub async fn is_available(&self, cart_total: Decimal) -> bool {
		match self.limits().await {
			Some(limits) => limits.contains(cart_total),
			None => {
				debug!("Payment limits unknown, hiding payment option");
				false
			}
		}
	}

	/// Refreshes the cached limits from the provider.
	pub async fn refresh(&self) -> Option<PaymentLimits> {
		self.provider.refresh_configuration().await
	}
}

#[cfg(test)]
mod tests {
	use crate::test_support::harness;
	use rust_decimal::Decimal;

	#[tokio::test]
	async fn test_fails_closed_without_limits() {
		let h = harness().await;
		assert!(!h.engine.is_available(Decimal::new(25000, 2)).await);
	}

	#[tokio::test]
	async fn test_limits_bound_cart_total() {
		let h = harness().await;
		h.provider.set_limits(Decimal::new(50, 0), Decimal::new(20000, 0));

		assert!(h.engine.is_available(Decimal::new(25000, 2)).await);
		assert!(h.engine.is_available(Decimal::new(50, 0)).await);
		assert!(!h.engine.is_available(Decimal::new(4999, 2)).await);
		assert!(!h.engine.is_available(Decimal::new(20001, 0)).await);
	}

	#[tokio::test]
	async fn test_refresh_replaces_cached_limits() {
		let h = harness().await;
		h.provider.set_limits(Decimal::new(50, 0), Decimal::new(100, 0));
		assert!(!h.engine.is_available(Decimal::new(250, 0)).await);

		h.provider.set_limits(Decimal::new(50, 0), Decimal::new(1000, 0));
		assert!(!h.engine.is_available(Decimal::new(250, 0)).await);

		let limits = h.engine.availability().refresh().await.unwrap();
		assert_eq!(limits.maximum_amount, Decimal::new(1000, 0));
		assert!(h.engine.is_available(Decimal::new(250, 0)).await);
	}

	#[tokio::test]
	async fn test_denied_token_hides_option() {
		let h = harness().await;
		h.provider.set_limits(Decimal::new(50, 0), Decimal::new(20000, 0));
		h.provider.deny_tokens();
		assert!(!h.engine.is_available(Decimal::new(250, 0)).await);
	}
}
