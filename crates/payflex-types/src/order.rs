//! Local order types owned by the host commerce platform.
//!
//! The gateway reads a bounded set of fields from a local order to build the
//! remote order payload, and writes only its status, transaction reference,
//! metadata and notes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Opaque local order identifier, stable for the order's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for OrderId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for OrderId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

impl From<String> for OrderId {
	fn from(value: String) -> Self {
		Self(value)
	}
}

/// Commerce order status as defined by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
	Pending,
	Processing,
	OnHold,
	Completed,
	Failed,
	Cancelled,
	Refunded,
}

impl OrderStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Processing => "processing",
			Self::OnHold => "on-hold",
			Self::Completed => "completed",
			Self::Failed => "failed",
			Self::Cancelled => "cancelled",
			Self::Refunded => "refunded",
		}
	}

	/// Whether payment has already been taken for an order in this status.
	pub fn is_paid(&self) -> bool {
		matches!(self, Self::Processing | Self::Completed)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
	type Err = UnknownStatus;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(Self::Pending),
			"processing" => Ok(Self::Processing),
			"on-hold" => Ok(Self::OnHold),
			"completed" => Ok(Self::Completed),
			"failed" => Ok(Self::Failed),
			"cancelled" => Ok(Self::Cancelled),
			"refunded" => Ok(Self::Refunded),
			other => Err(UnknownStatus(other.to_string())),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
	#[serde(default)]
	pub first_name: String,
	#[serde(default)]
	pub last_name: String,
	#[serde(default)]
	pub email: String,
	#[serde(default)]
	pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
	#[serde(default)]
	pub address_line1: String,
	#[serde(default)]
	pub address_line2: String,
	/// City or suburb.
	#[serde(default)]
	pub city: String,
	#[serde(default)]
	pub postcode: String,
}

/// A purchased line on the local order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
	pub name: String,
	#[serde(default)]
	pub sku: Option<String>,
	pub quantity: u32,
	/// Line subtotal before discounts, excluding tax.
	pub line_subtotal: Decimal,
}

impl LineItem {
	/// Unit price rounded to cents. A zero quantity yields the subtotal.
	pub fn unit_price(&self) -> Decimal {
		if self.quantity == 0 {
			return self.line_subtotal.round_dp(2);
		}
		(self.line_subtotal / Decimal::from(self.quantity)).round_dp(2)
	}
}

/// Immutable, timestamped audit entry on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNote {
	pub content: String,
	pub created_at: DateTime<Utc>,
}

impl OrderNote {
	pub fn new(content: impl Into<String>) -> Self {
		Self {
			content: content.into(),
			created_at: Utc::now(),
		}
	}
}

/// Local order record as exposed by the order store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalOrder {
	pub id: OrderId,
	/// Secret key embedded in the provider cancel URL.
	pub order_key: String,
	/// Display number from a sequential numbering extension, if active.
	#[serde(default)]
	pub order_number: Option<String>,
	pub status: OrderStatus,
	pub payment_method: String,
	pub currency: String,
	pub total: Decimal,
	#[serde(default)]
	pub tax_total: Decimal,
	#[serde(default)]
	pub shipping_total: Decimal,
	#[serde(default)]
	pub customer: Customer,
	#[serde(default)]
	pub billing: PostalAddress,
	#[serde(default)]
	pub shipping: PostalAddress,
	#[serde(default)]
	pub items: Vec<LineItem>,
	#[serde(default)]
	pub transaction_id: Option<String>,
	#[serde(default)]
	pub meta: HashMap<String, String>,
	#[serde(default)]
	pub notes: Vec<OrderNote>,
	pub created_at: DateTime<Utc>,
}

impl LocalOrder {
	pub fn has_status(&self, status: OrderStatus) -> bool {
		self.status == status
	}

	/// Non-empty metadata value for `key`.
	pub fn meta_value(&self, key: &str) -> Option<&str> {
		self.meta
			.get(key)
			.map(String::as_str)
			.filter(|value| !value.is_empty())
	}

	/// Whether a note with exactly `content` is already on the order.
	pub fn has_note_exact(&self, content: &str) -> bool {
		self.notes.iter().any(|note| note.content == content)
	}

	/// Merchant reference sent to the provider.
	pub fn merchant_reference(&self, use_order_number: bool) -> String {
		match (&self.order_number, use_order_number) {
			(Some(number), true) if !number.is_empty() => number.clone(),
			_ => self.id.to_string(),
		}
	}
}

/// Criteria for selecting orders from the store.
#[derive(Debug, Clone)]
pub struct OrderQuery {
	pub statuses: Vec<OrderStatus>,
	pub payment_method: String,
	/// Inclusive lower bound on creation time.
	pub created_after: DateTime<Utc>,
	/// Inclusive upper bound on creation time.
	pub created_before: DateTime<Utc>,
}

impl OrderQuery {
	pub fn matches(&self, order: &LocalOrder) -> bool {
		self.statuses.contains(&order.status)
			&& order.payment_method == self.payment_method
			&& order.created_at >= self.created_after
			&& order.created_at <= self.created_before
	}
}
