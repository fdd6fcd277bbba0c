//! Payflex provider API client.
//!
//! `ProviderInterface` is the raw API surface (token grant, order creation,
//! order lookup, refunds, configuration). `ProviderService` layers the
//! access token cache and the gateway's fail-closed rules on top of it.

use async_trait::async_trait;
use payflex_types::{
	ConfigurationReply, CreateOrderRequest, CreatedOrder, Credentials, RefundReply, RefundRequest,
	RemoteOrder, TokenGrant,
};
use thiserror::Error;

pub mod service;
pub mod token;

pub mod implementations {
	pub mod http;
}

pub use service::ProviderService;
pub use token::TokenCache;

#[derive(Debug, Error)]
pub enum ProviderError {
	/// The request never produced an HTTP response.
	#[error("Transport error: {0}")]
	Transport(String),
	/// The response body was not the expected JSON object.
	#[error("Malformed response: {0}")]
	MalformedResponse(String),
	/// The order was not created; `message` is the provider's explanation, if any.
	#[error("Incomplete response: {}", .message.as_deref().unwrap_or("no message"))]
	IncompleteResponse { message: Option<String> },
	#[error("Unexpected HTTP status {0}")]
	Status(u16),
	/// No credentials or no bearer token available.
	#[error("Provider integration not configured")]
	NotConfigured,
}

/// Raw calls against the provider API.
#[async_trait]
pub trait ProviderInterface: Send + Sync {
	/// Client-credentials grant against the auth endpoint.
	async fn request_token(&self, credentials: &Credentials) -> Result<TokenGrant, ProviderError>;

	async fn create_order(
		&self,
		token: &str,
		request: &CreateOrderRequest,
	) -> Result<CreatedOrder, ProviderError>;

	async fn get_order(&self, token: &str, remote_order_id: &str) -> Result<RemoteOrder, ProviderError>;

	/// Sends a refund. Any HTTP response is returned as a `RefundReply`; only
	/// transport failures are errors.
	async fn refund_order(
		&self,
		token: &str,
		remote_order_id: &str,
		request: &RefundRequest,
	) -> Result<RefundReply, ProviderError>;

	async fn get_configuration(&self, token: &str) -> Result<ConfigurationReply, ProviderError>;
}
