//! Access token cache.
//!
//! One bearer token is shared by every caller and cached in the injected
//! storage under a single global key. Concurrent refreshes are not
//! coordinated; the last write wins.

use crate::ProviderInterface;
use chrono::{DateTime, Duration, Utc};
use payflex_storage::StorageService;
use payflex_types::{AccessToken, Credentials};
use std::sync::Arc;
use tracing::{debug, info, warn};

const NAMESPACE: &str = "provider";
const TOKEN_ID: &str = "access_token";

pub struct TokenCache {
	provider: Arc<dyn ProviderInterface>,
	storage: Arc<StorageService>,
	credentials: Credentials,
	/// How long before the provider's expiry the token is treated as expired.
	margin: Duration,
}

impl TokenCache {
	pub fn new(
		provider: Arc<dyn ProviderInterface>,
		storage: Arc<StorageService>,
		credentials: Credentials,
		margin: Duration,
	) -> Self {
		Self {
			provider,
			storage,
			credentials,
			margin,
		}
	}

	async fn cached(&self) -> Option<AccessToken> {
		match self.storage.retrieve_optional(NAMESPACE, TOKEN_ID).await {
			Ok(token) => token,
			Err(e) => {
				warn!(error = %e, "Failed to read cached access token");
				None
			}
		}
	}

	/// Returns a usable bearer token, requesting a new one when needed.
	///
	/// `None` means the integration is not configured or the provider did not
	/// grant a token. `force_reset` discards the cached token first.
	pub async fn get_token(&self, force_reset: bool) -> Option<AccessToken> {
		if force_reset {
			if let Err(e) = self.storage.remove(NAMESPACE, TOKEN_ID).await {
				warn!(error = %e, "Failed to clear cached access token");
			}
		} else if let Some(token) = self.cached().await {
			if !token.is_expired_at(Utc::now()) {
				return Some(token);
			}
		}

		if !self.credentials.is_configured() {
			debug!("Provider credentials not configured, no access token");
			return None;
		}

		let grant = match self.provider.request_token(&self.credentials).await {
			Ok(grant) => grant,
			Err(e) => {
				warn!(error = %e, "Access token request failed");
				return None;
			}
		};

		let Some(value) = grant.access_token.filter(|v| !v.is_empty()) else {
			warn!("Access token response had no access_token");
			return None;
		};

		let issued_at = Utc::now();
		let token = AccessToken::issue(value, issued_at, grant.expires_in.unwrap_or(0), self.margin);

		match (token.expires_at - issued_at).to_std() {
			Ok(ttl) if !ttl.is_zero() => {
				if let Err(e) = self
					.storage
					.store_with_ttl(NAMESPACE, TOKEN_ID, &token, Some(ttl))
					.await
				{
					warn!(error = %e, "Failed to cache access token");
				}
				info!(expires_at = %token.expires_at, "Obtained new access token");
			}
			_ => debug!("Token lifetime within expiry margin, not cached"),
		}

		Some(token)
	}

	/// When the currently cached token was issued.
	pub async fn issued_at(&self) -> Option<DateTime<Utc>> {
		self.cached().await.map(|token| token.issued_at)
	}
}
