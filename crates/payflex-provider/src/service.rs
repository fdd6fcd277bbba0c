//! Remote order operations with the gateway's fail-closed rules.

use crate::token::TokenCache;
use crate::{ProviderError, ProviderInterface};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use payflex_config::ProviderConfig;
use payflex_storage::StorageService;
use payflex_types::{
	format_amount, AccessToken, CreateOrderRequest, CreatedOrder, Credentials, ExpectedOrder,
	PaymentLimits, RefundOutcome, RefundRequest, RemoteOrder, RemoteOrderStatus,
	REFUND_REJECTED_CODE,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const CONFIG_NAMESPACE: &str = "provider";
const CONFIG_ID: &str = "configuration";

pub struct ProviderService {
	provider: Arc<dyn ProviderInterface>,
	tokens: TokenCache,
	storage: Arc<StorageService>,
	configuration_ttl: Duration,
}

impl ProviderService {
	pub fn new(
		provider: Arc<dyn ProviderInterface>,
		storage: Arc<StorageService>,
		config: &ProviderConfig,
	) -> Self {
		let credentials = Credentials {
			client_id: config.client_id.clone(),
			client_secret: config.client_secret.clone(),
			audience: config
				.active_environment()
				.map(|env| env.auth_audience.clone())
				.unwrap_or_default(),
		};
		let tokens = TokenCache::new(
			provider.clone(),
			storage.clone(),
			credentials,
			ChronoDuration::seconds(config.token_expiry_margin_secs as i64),
		);

		Self {
			provider,
			tokens,
			storage,
			configuration_ttl: Duration::from_secs(config.configuration_cache_secs),
		}
	}

	pub async fn access_token(&self) -> Option<AccessToken> {
		self.tokens.get_token(false).await
	}

	/// Discards the cached token and requests a new one.
	pub async fn reset_token(&self) -> Option<AccessToken> {
		self.tokens.get_token(true).await
	}

	pub async fn token_issued_at(&self) -> Option<DateTime<Utc>> {
		self.tokens.issued_at().await
	}

	async fn bearer(&self) -> Result<String, ProviderError> {
		self.access_token()
			.await
			.map(|token| token.value)
			.ok_or(ProviderError::NotConfigured)
	}

	#[instrument(skip_all, fields(reference = %request.merchant_reference))]
	pub async fn create_order(&self, request: &CreateOrderRequest) -> Result<CreatedOrder, ProviderError> {
		let token = self.bearer().await?;
		let created = self.provider.create_order(&token, request).await?;
		info!(remote_order_id = %created.remote_order_id, "Remote order created");
		Ok(created)
	}

	pub async fn fetch_order(&self, remote_order_id: &str) -> Result<RemoteOrder, ProviderError> {
		let token = self.bearer().await?;
		self.provider.get_order(&token, remote_order_id).await
	}

	/// Fetches the remote order and returns its status only if it matches the
	/// local order's token and total.
	#[instrument(skip_all, fields(remote_order_id = ?expected.remote_order_id))]
	pub async fn check_status(&self, expected: &ExpectedOrder) -> Option<RemoteOrderStatus> {
		let remote_order_id = expected.remote_order_id.as_deref()?;
		let Some(local_token) = expected.token.as_deref() else {
			debug!("No local token stored, status not trusted");
			return None;
		};

		let remote = match self.fetch_order(remote_order_id).await {
			Ok(remote) => remote,
			Err(e) => {
				warn!(error = %e, "Remote order lookup failed");
				return None;
			}
		};

		if remote.token.as_deref() != Some(local_token) {
			warn!("Remote order token does not match local token");
			return None;
		}

		if remote.amount != Some(expected.total) {
			warn!(
				remote_amount = ?remote.amount,
				local_total = %expected.total,
				"Remote order amount does not match local total"
			);
			return None;
		}

		remote.order_status
	}

	/// Submits a refund and classifies the provider's reply.
	#[instrument(skip(self))]
	pub async fn refund_order(
		&self,
		remote_order_id: &str,
		amount: Decimal,
		request_id: &str,
	) -> RefundOutcome {
		let token = match self.bearer().await {
			Ok(token) => token,
			Err(e) => return RefundOutcome::Failure { reason: e.to_string() },
		};

		let request = RefundRequest {
			request_id: request_id.to_string(),
			amount: format_amount(amount),
			merchant_refund_reference: request_id.to_string(),
		};

		let reply = match self
			.provider
			.refund_order(&token, remote_order_id, &request)
			.await
		{
			Ok(reply) => reply,
			Err(e) => return RefundOutcome::Failure { reason: e.to_string() },
		};

		match reply.status {
			200 | 201 => RefundOutcome::Success,
			400 if reply.error_code.as_deref() == Some(REFUND_REJECTED_CODE) => {
				RefundOutcome::BusinessError {
					code: REFUND_REJECTED_CODE.to_string(),
					message: reply.message.unwrap_or_default(),
				}
			}
			404 => RefundOutcome::NotFound,
			status => RefundOutcome::Failure {
				reason: format!("Unexpected HTTP status {}", status),
			},
		}
	}

	/// Payment limits, served from the storage cache when fresh.
	pub async fn fetch_configuration(&self) -> Option<PaymentLimits> {
		match self
			.storage
			.retrieve_optional::<PaymentLimits>(CONFIG_NAMESPACE, CONFIG_ID)
			.await
		{
			Ok(Some(limits)) => return Some(limits),
			Ok(None) => {}
			Err(e) => warn!(error = %e, "Failed to read cached configuration"),
		}
		self.refresh_configuration().await
	}

	/// Fetches payment limits from the provider, bypassing the cache.
	pub async fn refresh_configuration(&self) -> Option<PaymentLimits> {
		let token = self.bearer().await.ok()?;
		let limits = match self.provider.get_configuration(&token).await {
			Ok(reply) => reply.limits()?,
			Err(e) => {
				warn!(error = %e, "Configuration request failed");
				return None;
			}
		};

		if let Err(e) = self
			.storage
			.store_with_ttl(CONFIG_NAMESPACE, CONFIG_ID, &limits, Some(self.configuration_ttl))
			.await
		{
			warn!(error = %e, "Failed to cache configuration");
		}
		debug!(
			minimum = %limits.minimum_amount,
			maximum = %limits.maximum_amount,
			"Payment limits refreshed"
		);
		Some(limits)
	}
}
