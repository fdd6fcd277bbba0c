//! HTTP implementation of the provider API using `reqwest`.

use crate::{ProviderError, ProviderInterface};
use async_trait::async_trait;
use payflex_config::ProviderConfig;
use payflex_types::{
	ConfigurationReply, CreateOrderRequest, CreatedOrder, Credentials, RefundReply, RefundRequest,
	RemoteOrder, TokenGrant,
};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Serialize)]
struct TokenRequest<'a> {
	client_id: &'a str,
	client_secret: &'a str,
	audience: &'a str,
	grant_type: &'static str,
}

pub struct HttpProvider {
	client: reqwest::Client,
	api_url: String,
	auth_url: String,
	order_timeout: Duration,
}

impl HttpProvider {
	pub fn new(
		api_url: impl Into<String>,
		auth_url: impl Into<String>,
		request_timeout: Duration,
		order_timeout: Duration,
	) -> Result<Self, ProviderError> {
		let client = reqwest::Client::builder()
			.timeout(request_timeout)
			.build()
			.map_err(|e| ProviderError::Transport(format!("Failed to create HTTP client: {}", e)))?;

		Ok(Self {
			client,
			api_url: api_url.into().trim_end_matches('/').to_string(),
			auth_url: auth_url.into(),
			order_timeout,
		})
	}

	fn url(&self, path: &str) -> String {
		format!("{}/{}", self.api_url, path)
	}
}

fn transport(e: reqwest::Error) -> ProviderError {
	ProviderError::Transport(e.to_string())
}

fn string_field(body: &Value, field: &str) -> Option<String> {
	body.get(field)
		.and_then(Value::as_str)
		.filter(|s| !s.is_empty())
		.map(str::to_string)
}

/// Provider error message, either top-level or nested under `response`.
fn error_message(body: &Value) -> Option<String> {
	string_field(body, "message").or_else(|| {
		body.get("response")
			.and_then(|response| string_field(response, "message"))
	})
}

async fn json_object(response: reqwest::Response) -> Result<Value, ProviderError> {
	let text = response.text().await.map_err(transport)?;
	match serde_json::from_str::<Value>(&text) {
		Ok(value) if value.is_object() => Ok(value),
		Ok(_) => Err(ProviderError::MalformedResponse("expected a JSON object".into())),
		Err(e) => Err(ProviderError::MalformedResponse(e.to_string())),
	}
}

#[async_trait]
impl ProviderInterface for HttpProvider {
	async fn request_token(&self, credentials: &Credentials) -> Result<TokenGrant, ProviderError> {
		let response = self
			.client
			.post(&self.auth_url)
			.json(&TokenRequest {
				client_id: &credentials.client_id,
				client_secret: &credentials.client_secret,
				audience: &credentials.audience,
				grant_type: "client_credentials",
			})
			.send()
			.await
			.map_err(transport)?;

		if !response.status().is_success() {
			return Err(ProviderError::Status(response.status().as_u16()));
		}

		let body = json_object(response).await?;
		serde_json::from_value(body).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
	}

	async fn create_order(
		&self,
		token: &str,
		request: &CreateOrderRequest,
	) -> Result<CreatedOrder, ProviderError> {
		let response = self
			.client
			.post(self.url("order/productSelect"))
			.bearer_auth(token)
			.timeout(self.order_timeout)
			.json(request)
			.send()
			.await
			.map_err(transport)?;

		let status = response.status();
		let body = json_object(response).await?;

		match (
			string_field(&body, "orderId"),
			string_field(&body, "token"),
			string_field(&body, "redirectUrl"),
		) {
			(Some(remote_order_id), Some(token), Some(redirect_url)) => Ok(CreatedOrder {
				remote_order_id,
				token,
				redirect_url,
			}),
			_ => {
				warn!(status = status.as_u16(), "Order creation response missing identifiers");
				Err(ProviderError::IncompleteResponse {
					message: error_message(&body),
				})
			}
		}
	}

	async fn get_order(&self, token: &str, remote_order_id: &str) -> Result<RemoteOrder, ProviderError> {
		let response = self
			.client
			.get(self.url(&format!("order/{}", remote_order_id)))
			.bearer_auth(token)
			.send()
			.await
			.map_err(transport)?;

		if !response.status().is_success() {
			debug!(remote_order_id, status = response.status().as_u16(), "Order lookup failed");
			return Err(ProviderError::Status(response.status().as_u16()));
		}

		let body = json_object(response).await?;
		serde_json::from_value(body).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
	}

	async fn refund_order(
		&self,
		token: &str,
		remote_order_id: &str,
		request: &RefundRequest,
	) -> Result<RefundReply, ProviderError> {
		let response = self
			.client
			.post(self.url(&format!("order/{}/refund", remote_order_id)))
			.bearer_auth(token)
			.json(request)
			.send()
			.await
			.map_err(transport)?;

		let status = response.status().as_u16();
		let body = json_object(response).await.unwrap_or(Value::Null);

		Ok(RefundReply {
			status,
			error_code: string_field(&body, "errorCode"),
			message: error_message(&body),
		})
	}

	async fn get_configuration(&self, token: &str) -> Result<ConfigurationReply, ProviderError> {
		let response = self
			.client
			.get(self.url("configuration"))
			.bearer_auth(token)
			.send()
			.await
			.map_err(transport)?;

		if !response.status().is_success() {
			return Err(ProviderError::Status(response.status().as_u16()));
		}

		let body = json_object(response).await?;
		serde_json::from_value(body).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
	}
}

/// Builds the HTTP provider for the configured environment.
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn ProviderInterface>, ProviderError> {
	let environment = config
		.active_environment()
		.ok_or(ProviderError::NotConfigured)?;

	Ok(Box::new(HttpProvider::new(
		environment.api_url.clone(),
		environment.auth_url.clone(),
		Duration::from_secs(config.request_timeout_secs),
		Duration::from_secs(config.order_timeout_secs),
	)?))
}

#[cfg(test)]
mod tests {
	use super::*;
	use payflex_types::{
		AddressPayload, ConsumerPayload, MerchantSystemInformation, MerchantUrls,
	};
	use serde_json::json;
	use wiremock::matchers::{header, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn provider(server: &MockServer) -> HttpProvider {
		HttpProvider::new(
			server.uri(),
			format!("{}/oauth/token", server.uri()),
			Duration::from_secs(5),
			Duration::from_secs(5),
		)
		.unwrap()
	}

	fn order_request() -> CreateOrderRequest {
		let address = AddressPayload {
			address_line1: "1 Main Rd".into(),
			address_line2: String::new(),
			suburb: "Cape Town".into(),
			postcode: "8001".into(),
		};
		CreateOrderRequest {
			amount: "250.00".into(),
			consumer: ConsumerPayload {
				phone_number: "0210000000".into(),
				given_names: "Sam".into(),
				surname: "Doe".into(),
				email: "sam@example.test".into(),
			},
			billing: address.clone(),
			shipping: address,
			description: String::new(),
			items: vec![],
			merchant: MerchantUrls {
				redirect_confirm_url: "https://shop.test/return?order_id=1".into(),
				redirect_cancel_url: "https://shop.test/return?order_id=1&status=cancelled".into(),
			},
			merchant_reference: "1".into(),
			tax_amount: "0.00".into(),
			shipping_amount: "0.00".into(),
			merchant_system_information: MerchantSystemInformation {
				plugin_version: "0.1.0".into(),
				ecommerce_platform: "WooCommerce".into(),
				total_plugin_modules: "0".into(),
				active_plugin_modules: "0".into(),
			},
		}
	}

	#[tokio::test]
	async fn test_create_order_success() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/order/productSelect"))
			.and(header("authorization", "Bearer tok"))
			.respond_with(ResponseTemplate::new(201).set_body_json(json!({
				"orderId": "R1",
				"token": "tok1",
				"redirectUrl": "https://pay.test/R1"
			})))
			.mount(&server)
			.await;

		let created = provider(&server)
			.create_order("tok", &order_request())
			.await
			.unwrap();
		assert_eq!(created.remote_order_id, "R1");
		assert_eq!(created.token, "tok1");
		assert_eq!(created.redirect_url, "https://pay.test/R1");
	}

	#[tokio::test]
	async fn test_create_order_incomplete_uses_nested_message() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/order/productSelect"))
			.respond_with(ResponseTemplate::new(400).set_body_json(json!({
				"response": { "message": "Amount below minimum" }
			})))
			.mount(&server)
			.await;

		let err = provider(&server)
			.create_order("tok", &order_request())
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			ProviderError::IncompleteResponse { message: Some(ref m) } if m == "Amount below minimum"
		));
	}

	#[tokio::test]
	async fn test_create_order_malformed_body() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/order/productSelect"))
			.respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
			.mount(&server)
			.await;

		let err = provider(&server)
			.create_order("tok", &order_request())
			.await
			.unwrap_err();
		assert!(matches!(err, ProviderError::MalformedResponse(_)));
	}

	#[tokio::test]
	async fn test_get_order_status_error() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/order/R404"))
			.respond_with(ResponseTemplate::new(404))
			.mount(&server)
			.await;

		let err = provider(&server).get_order("tok", "R404").await.unwrap_err();
		assert!(matches!(err, ProviderError::Status(404)));
	}

	#[tokio::test]
	async fn test_refund_reply_carries_error_code() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/order/R1/refund"))
			.respond_with(ResponseTemplate::new(400).set_body_json(json!({
				"errorCode": "MRM007",
				"message": "Refund amount exceeds order balance"
			})))
			.mount(&server)
			.await;

		let reply = provider(&server)
			.refund_order(
				"tok",
				"R1",
				&RefundRequest {
					request_id: "Order #1-abcdefgh".into(),
					amount: "300.00".into(),
					merchant_refund_reference: "Order #1-abcdefgh".into(),
				},
			)
			.await
			.unwrap();
		assert_eq!(reply.status, 400);
		assert_eq!(reply.error_code.as_deref(), Some("MRM007"));
		assert_eq!(
			reply.message.as_deref(),
			Some("Refund amount exceeds order balance")
		);
	}
}
