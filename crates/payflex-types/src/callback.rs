//! Parameters carried on the shopper's return from the provider.
//!
//! Nothing here is trusted. An order id from the query string only becomes
//! usable for state changes after the core crate has verified the remote
//! order against the local one.

use serde::{Deserialize, Serialize};

use crate::OrderId;

/// Order identifier taken from an untrusted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntrustedOrderId(String);

impl UntrustedOrderId {
	/// Trims the raw value; blank input yields `None`.
	pub fn parse(raw: &str) -> Option<Self> {
		let trimmed = raw.trim();
		if trimmed.is_empty() {
			None
		} else {
			Some(Self(trimmed.to_string()))
		}
	}

	/// Identifier to look the order up with. Looking up is not trusting.
	pub fn lookup_id(&self) -> OrderId {
		OrderId::new(self.0.clone())
	}
}

/// Query parameters of the return URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnParams {
	#[serde(default, alias = "orderId")]
	pub order_id: Option<String>,
	#[serde(default)]
	pub status: Option<String>,
	#[serde(default)]
	pub token: Option<String>,
	/// Local order key, present on the cancel URL.
	#[serde(default)]
	pub key: Option<String>,
}

impl ReturnParams {
	pub fn untrusted_order_id(&self) -> Option<UntrustedOrderId> {
		self.order_id.as_deref().and_then(UntrustedOrderId::parse)
	}

	/// A shopper cancellation carries `status=cancelled` plus the order key and token.
	pub fn is_cancellation(&self) -> bool {
		self.status.as_deref() == Some("cancelled")
			&& self.key.as_deref().is_some_and(|k| !k.is_empty())
			&& self.token.as_deref().is_some_and(|t| !t.is_empty())
	}
}
