//! Types exchanged with the Payflex provider API.
//!
//! Wire types use camelCase field names. Amounts leave the gateway as
//! two-decimal strings and are accepted back as either JSON numbers or
//! strings.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a remote order as reported by the provider.
///
/// Matching is case-sensitive; unrecognised values are preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RemoteOrderStatus {
	Created,
	Initiated,
	Approved,
	Declined,
	Abandoned,
	Other(String),
}

impl RemoteOrderStatus {
	pub fn as_str(&self) -> &str {
		match self {
			Self::Created => "Created",
			Self::Initiated => "Initiated",
			Self::Approved => "Approved",
			Self::Declined => "Declined",
			Self::Abandoned => "Abandoned",
			Self::Other(other) => other,
		}
	}
}

impl From<&str> for RemoteOrderStatus {
	fn from(value: &str) -> Self {
		match value {
			"Created" => Self::Created,
			"Initiated" => Self::Initiated,
			"Approved" => Self::Approved,
			"Declined" => Self::Declined,
			"Abandoned" => Self::Abandoned,
			other => Self::Other(other.to_string()),
		}
	}
}

impl fmt::Display for RemoteOrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Serialize for RemoteOrderStatus {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for RemoteOrderStatus {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		Ok(Self::from(raw.as_str()))
	}
}

/// Deserializes an optional amount given as a JSON number or string.
fn deserialize_amount<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
	D: Deserializer<'de>,
{
	let value = Option::<serde_json::Value>::deserialize(deserializer)?;
	match value {
		None | Some(serde_json::Value::Null) => Ok(None),
		Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
		Some(serde_json::Value::String(s)) => Decimal::from_str(s.trim())
			.map(Some)
			.map_err(|e| serde::de::Error::custom(format!("Invalid amount {s}: {e}"))),
		Some(serde_json::Value::Number(n)) => Decimal::from_str(&n.to_string())
			.or_else(|_| Decimal::from_scientific(&n.to_string()))
			.map(Some)
			.map_err(|e| serde::de::Error::custom(format!("Invalid amount {n}: {e}"))),
		Some(other) => Err(serde::de::Error::custom(format!(
			"Amount must be a number or string, got {other}"
		))),
	}
}

/// Formats an amount as a two-decimal string for the provider.
pub fn format_amount(amount: Decimal) -> String {
	format!("{:.2}", amount.round_dp(2))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConsumer {
	#[serde(default)]
	pub given_names: Option<String>,
	#[serde(default)]
	pub surname: Option<String>,
	#[serde(default)]
	pub email: Option<String>,
}

/// A remote order as returned by `GET /order/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOrder {
	#[serde(default)]
	pub order_id: Option<String>,
	#[serde(default)]
	pub token: Option<String>,
	#[serde(default, deserialize_with = "deserialize_amount")]
	pub amount: Option<Decimal>,
	#[serde(default)]
	pub order_status: Option<RemoteOrderStatus>,
	#[serde(default)]
	pub merchant_reference: Option<String>,
	#[serde(default)]
	pub consumer: Option<RemoteConsumer>,
	#[serde(default)]
	pub created_date_time: Option<String>,
}

/// Identifiers returned when a remote order is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedOrder {
	pub remote_order_id: String,
	pub token: String,
	pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerPayload {
	pub phone_number: String,
	pub given_names: String,
	pub surname: String,
	pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressPayload {
	pub address_line1: String,
	pub address_line2: String,
	pub suburb: String,
	pub postcode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
	pub name: String,
	pub sku: String,
	pub quantity: u32,
	pub price: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantUrls {
	pub redirect_confirm_url: String,
	pub redirect_cancel_url: String,
}

/// Sent with snake_case field names, unlike the rest of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantSystemInformation {
	pub plugin_version: String,
	pub ecommerce_platform: String,
	pub total_plugin_modules: String,
	pub active_plugin_modules: String,
}

/// Body of `POST /order/productSelect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
	pub amount: String,
	pub consumer: ConsumerPayload,
	pub billing: AddressPayload,
	pub shipping: AddressPayload,
	pub description: String,
	pub items: Vec<ItemPayload>,
	pub merchant: MerchantUrls,
	pub merchant_reference: String,
	pub tax_amount: String,
	pub shipping_amount: String,
	pub merchant_system_information: MerchantSystemInformation,
}

/// Body of `POST /order/{id}/refund`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
	pub request_id: String,
	pub amount: String,
	pub merchant_refund_reference: String,
}

/// Raw reply to a refund call, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReply {
	pub status: u16,
	pub error_code: Option<String>,
	pub message: Option<String>,
}

/// Business error code the provider uses for a rejected refund.
pub const REFUND_REJECTED_CODE: &str = "MRM007";

/// Classified result of a refund request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefundOutcome {
	Success,
	BusinessError { code: String, message: String },
	NotFound,
	Failure { reason: String },
}

impl RefundOutcome {
	pub fn is_success(&self) -> bool {
		matches!(self, Self::Success)
	}
}

/// Minimum and maximum order totals the provider accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLimits {
	pub minimum_amount: Decimal,
	pub maximum_amount: Decimal,
}

impl PaymentLimits {
	pub fn contains(&self, total: Decimal) -> bool {
		total >= self.minimum_amount && total <= self.maximum_amount
	}
}

/// Reply of `GET /configuration`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationReply {
	#[serde(default, deserialize_with = "deserialize_amount")]
	pub minimum_amount: Option<Decimal>,
	#[serde(default, deserialize_with = "deserialize_amount")]
	pub maximum_amount: Option<Decimal>,
}

impl ConfigurationReply {
	pub fn limits(&self) -> Option<PaymentLimits> {
		Some(PaymentLimits {
			minimum_amount: self.minimum_amount?,
			maximum_amount: self.maximum_amount?,
		})
	}
}

/// Reply of the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
	#[serde(default)]
	pub access_token: Option<String>,
	#[serde(default)]
	pub expires_in: Option<i64>,
}

/// A bearer token obtained with the client-credentials grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
	pub value: String,
	pub issued_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}

impl AccessToken {
	/// Builds a token whose expiry is pulled forward by `margin`.
	///
	/// A lifetime that does not fit a timestamp yields a token that is already
	/// expired, so it is used once and never cached.
	pub fn issue(value: String, issued_at: DateTime<Utc>, expires_in_secs: i64, margin: Duration) -> Self {
		let expires_at = Duration::try_seconds(expires_in_secs)
			.and_then(|lifetime| issued_at.checked_add_signed(lifetime))
			.and_then(|expiry| expiry.checked_sub_signed(margin))
			.unwrap_or(issued_at);
		Self {
			value,
			issued_at,
			expires_at,
		}
	}

	pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
		now >= self.expires_at
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
	pub client_id: String,
	pub client_secret: String,
	pub audience: String,
}

impl Credentials {
	pub fn is_configured(&self) -> bool {
		!self.client_id.is_empty() && !self.client_secret.is_empty()
	}
}

/// Local view of an order used to verify a remote order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedOrder {
	pub remote_order_id: Option<String>,
	pub token: Option<String>,
	pub total: Decimal,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_remote_order_accepts_numeric_and_string_amounts() {
		let numeric: RemoteOrder = serde_json::from_value(json!({
			"orderId": "R1",
			"token": "tok1",
			"amount": 250.0,
			"orderStatus": "Approved"
		}))
		.unwrap();
		let text: RemoteOrder = serde_json::from_value(json!({
			"orderId": "R1",
			"amount": "250.00",
		}))
		.unwrap();

		assert_eq!(numeric.amount, Some(Decimal::new(25000, 2)));
		assert_eq!(text.amount, Some(Decimal::new(25000, 2)));
		assert_eq!(numeric.order_status, Some(RemoteOrderStatus::Approved));
		assert_eq!(text.order_status, None);
	}

	#[test]
	fn test_status_is_case_sensitive() {
		assert_eq!(RemoteOrderStatus::from("approved"), RemoteOrderStatus::Other("approved".into()));
		assert_eq!(RemoteOrderStatus::from("Declined"), RemoteOrderStatus::Declined);
	}

	#[test]
	fn test_token_expiry_margin() {
		let issued = Utc::now();
		let token = AccessToken::issue("abc".into(), issued, 300, Duration::seconds(120));
		assert!(!token.is_expired_at(issued + Duration::seconds(179)));
		assert!(token.is_expired_at(issued + Duration::seconds(180)));
	}

	#[test]
	fn test_out_of_range_lifetime_is_expired() {
		let issued = Utc::now();
		for lifetime in [i64::MAX, i64::MIN] {
			let token = AccessToken::issue("abc".into(), issued, lifetime, Duration::seconds(120));
			assert_eq!(token.expires_at, issued);
			assert!(token.is_expired_at(issued));
		}
	}

	#[test]
	fn test_format_amount() {
		assert_eq!(format_amount(Decimal::new(25, 0)), "25.00");
		assert_eq!(format_amount(Decimal::new(100005, 3)), "100.00");
	}
}
