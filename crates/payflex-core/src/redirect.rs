use payflex_config::{CheckoutConfig, Config};
use payflex_types::OrderId;

/// Where to send the shopper after a gateway step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
	/// Order received page after an approved payment.
	Success(OrderId),
	/// Payment failed or the return could not be verified.
	Failure(Option<OrderId>),
	/// The provider reported a status the gateway does not act on.
	Unknown(OrderId),
	/// Shopper cancelled on the provider's pages.
	Cancelled(OrderId),
	/// Back to the payment page for another attempt.
	Retry(OrderId),
	/// The provider's hosted payment page.
	Provider(String),
}

impl Redirect {
	pub fn to_url(&self, config: &Config) -> String {
		let checkout = &config.checkout;
		let render = |template: &str, id: Option<&OrderId>| {
			CheckoutConfig::render(template, id.map(OrderId::as_str).unwrap_or_default())
		};
		match self {
			Self::Success(id) => render(&checkout.success_url, Some(id)),
			Self::Failure(id) => render(&checkout.failure_url, id.as_ref()),
			Self::Unknown(id) => render(&checkout.unknown_url, Some(id)),
			Self::Cancelled(id) => render(&checkout.cancel_url, Some(id)),
			Self::Retry(id) => render(&checkout.retry_url, Some(id)),
			Self::Provider(url) => url.clone(),
		}
	}

	pub fn is_success(&self) -> bool {
		matches!(self, Self::Success(_))
	}
}
