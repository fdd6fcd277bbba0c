//! Checkout initiation: creates the remote order and hands back the
//! provider's payment page.

use crate::{CoreError, Redirect, RequestScope, WorkflowState};
use payflex_config::Config;
use payflex_orders::OrderStore;
use payflex_provider::{ProviderError, ProviderService};
use payflex_types::{
	format_amount, AddressPayload, ConsumerPayload, CreateOrderRequest, ItemPayload, LocalOrder,
	MerchantSystemInformation, MerchantUrls, OrderId, OrderStatus, PostalAddress, WorkflowStatus,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

const GENERIC_NOTICE: &str = "Sorry, there was a problem preparing your payment. Please try again later.";
const ALREADY_PAID_NOTICE: &str = "This order has already been paid.";
const TOKEN_MISSING_NOTE: &str = "Unable to generate the order token. Payment couldn't proceed.";

/// Outcome of a checkout attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutResult {
	/// Send the shopper to the provider's payment page.
	Redirect { url: String },
	/// Show `notice` and send the shopper to `redirect`.
	Failure { notice: String, redirect: String },
}

/// Starts payment attempts for local orders.
///
/// Each attempt creates a fresh remote order, stores its identifiers on the
/// local order and resets the workflow to `initiated`.
pub struct CheckoutInitiator {
	/// Checkout URLs and merchant reference settings.
	config: Arc<Config>,
	orders: Arc<OrderStore>,
	provider: Arc<ProviderService>,
	workflow: Arc<WorkflowState>,
}

impl CheckoutInitiator {
	/// Creates an initiator over the shared order store and provider service.
	pub fn new(
		config: Arc<Config>,
		orders: Arc<OrderStore>,
		provider: Arc<ProviderService>,
		workflow: Arc<WorkflowState>,
	) -> Self {
		Self {
			config,
			orders,
			provider,
			workflow,
		}
	}

	fn failure(&self, notice: String, redirect: Redirect) -> CheckoutResult {
		CheckoutResult::Failure {
			notice,
			redirect: redirect.to_url(&self.config),
		}
	}

	/// Shopper-facing text for a failed order creation.
	fn failure_notice(&self, err: &ProviderError) -> String {
		if !self.config.gateway.debug {
			return GENERIC_NOTICE.to_string();
		}
		match err {
			ProviderError::Transport(_) => {
				"There was an issue connecting to Payflex servers. Please try again later.".to_string()
			}
			ProviderError::MalformedResponse(_) => "Payflex API return is not a valid object, API might be under maintenance or there was an undefined issue with the sent data".to_string(),
			ProviderError::IncompleteResponse { message: Some(message) } => format!(
				"Payflex payment error. Successfully connected to Payflex, but did not get back expected data. API Responded with: {}",
				message
			),
			ProviderError::IncompleteResponse { message: None } => {
				"Payflex API return response is not in expected format, Payflex is possibly under maintenance".to_string()
			}
			other => other.to_string(),
		}
	}

	#[instrument(skip(self, scope))]
	pub async fn initiate(
		&self,
		scope: &mut RequestScope,
		order_id: &OrderId,
	) -> Result<CheckoutResult, CoreError> {
		let order = self.orders.load(order_id).await?;
		let workflow = self.workflow.workflow_status(scope, &order);

		if order.status.is_paid() || workflow == Some(WorkflowStatus::Completed) {
			info!("Order already paid, not creating a remote order");
			return Ok(self.failure(
				ALREADY_PAID_NOTICE.to_string(),
				Redirect::Success(order.id.clone()),
			));
		}

		if workflow == Some(WorkflowStatus::Initiated) {
			if let (Some(remote_order_id), Some(_), Some(url)) = (
				WorkflowState::remote_order_id(&order),
				WorkflowState::remote_order_token(&order),
				WorkflowState::redirect_url(&order),
			) {
				debug!(%remote_order_id, "Reusing initiated remote order");
				return Ok(CheckoutResult::Redirect { url });
			}
		}

		if self.provider.access_token().await.is_none() {
			warn!("No access token, cannot create remote order");
			self.orders.add_note(&order.id, TOKEN_MISSING_NOTE).await?;
			let notice = if self.config.gateway.debug {
				"Unable to generate the order token.".to_string()
			} else {
				GENERIC_NOTICE.to_string()
			};
			return Ok(self.failure(notice, Redirect::Retry(order.id.clone())));
		}

		let request = self.build_order_request(&order)?;
		let created = match self.provider.create_order(&request).await {
			Ok(created) => created,
			Err(e) => {
				warn!(error = %e, "Remote order creation failed");
				return Ok(self.failure(self.failure_notice(&e), Redirect::Retry(order.id.clone())));
			}
		};

		self.workflow.store_remote_order(&order.id, &created).await?;
		if workflow != Some(WorkflowStatus::Initiated) {
			self.orders
				.add_note(
					&order.id,
					&format!(
						"User attempted Payflex order. Payflex order ID: {}",
						created.remote_order_id
					),
				)
				.await?;
		}
		self.workflow.begin_attempt(scope, &order.id).await?;

		info!(remote_order_id = %created.remote_order_id, "Checkout initiated");
		Ok(CheckoutResult::Redirect {
			url: created.redirect_url,
		})
	}

	/// The receipt step: marks the order pending and returns the provider page.
	pub async fn provider_redirect(&self, order_id: &OrderId) -> Result<Redirect, CoreError> {
		let order = self.orders.load(order_id).await?;
		if order.status.is_paid() {
			return Ok(Redirect::Success(order.id));
		}

		let Some(url) = WorkflowState::redirect_url(&order) else {
			warn!(order_id = %order.id, "No provider redirect URL stored");
			return Ok(Redirect::Failure(Some(order.id)));
		};

		if order.status != OrderStatus::Pending {
			self.orders.update_status(&order.id, OrderStatus::Pending).await?;
		}
		Ok(Redirect::Provider(url))
	}

	pub fn build_order_request(&self, order: &LocalOrder) -> Result<CreateOrderRequest, CoreError> {
		let gateway = &self.config.gateway;
		let reference = order.merchant_reference(self.config.checkout.sequential_order_numbers);

		Ok(CreateOrderRequest {
			amount: format_amount(order.total),
			consumer: ConsumerPayload {
				phone_number: order.customer.phone.clone(),
				given_names: order.customer.first_name.clone(),
				surname: order.customer.last_name.clone(),
				email: order.customer.email.clone(),
			},
			billing: address(&order.billing),
			shipping: address(&order.shipping),
			description: format!("Order #{}", reference),
			items: order
				.items
				.iter()
				.map(|item| ItemPayload {
					name: item.name.clone(),
					sku: item.sku.clone().unwrap_or_default(),
					quantity: item.quantity,
					price: format_amount(item.unit_price()),
				})
				.collect(),
			merchant: MerchantUrls {
				redirect_confirm_url: self.return_url(order, "confirmed")?,
				redirect_cancel_url: self.return_url(order, "cancelled")?,
			},
			merchant_reference: reference,
			tax_amount: format_amount(order.tax_total),
			shipping_amount: format_amount(order.shipping_total),
			merchant_system_information: MerchantSystemInformation {
				plugin_version: gateway.plugin_version.clone(),
				ecommerce_platform: gateway.platform.clone(),
				total_plugin_modules: gateway.total_plugin_count.to_string(),
				active_plugin_modules: gateway.active_plugin_count.to_string(),
			},
		})
	}

	fn return_url(&self, order: &LocalOrder, status: &str) -> Result<String, CoreError> {
		let mut url = Url::parse(&self.config.checkout.callback_url)
			.map_err(|e| CoreError::Config(format!("Invalid callback URL: {}", e)))?;
		url.query_pairs_mut()
			.append_pair("key", &order.order_key)
			.append_pair("order_id", order.id.as_str())
			.append_pair("status", status);
		Ok(url.into())
	}
}

fn address(address: &PostalAddress) -> AddressPayload {
	AddressPayload {
		address_line1: address.address_line1.clone(),
		address_line2: address.address_line2.clone(),
		suburb: address.city.clone(),
		postcode: address.postcode.clone(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{harness, harness_with, sample_order};
	use payflex_types::LineItem;
	use rust_decimal::Decimal;

	#[tokio::test]
	async fn test_initiate_stores_identifiers_and_notes_once() {
		let h = harness().await;
		let id = OrderId::from("100");
		h.save(sample_order("100")).await;

		let mut scope = RequestScope::new();
		let result = h.engine.checkout().initiate(&mut scope, &id).await.unwrap();
		assert_eq!(
			result,
			CheckoutResult::Redirect {
				url: "https://pay.payflex.test/R1".into()
			}
		);

		let order = h.order("100").await;
		assert_eq!(order.meta_value("_payflex_order_id"), Some("R1"));
		assert_eq!(order.meta_value("_partpay_order_token"), Some("tok1"));
		assert_eq!(order.meta_value("_payflex_workflow_status"), Some("initiated"));
		assert_eq!(order.notes.len(), 1);
		assert_eq!(
			order.notes[0].content,
			"User attempted Payflex order. Payflex order ID: R1"
		);

		let mut scope = RequestScope::new();
		let again = h.engine.checkout().initiate(&mut scope, &id).await.unwrap();
		assert_eq!(again, result);
		assert_eq!(h.provider.created_count(), 1);
		assert_eq!(h.order("100").await.notes.len(), 1);
	}

	#[tokio::test]
	async fn test_new_attempt_after_failure_creates_new_remote_order() {
		let h = harness().await;
		let mut order = sample_order("101");
		order.status = OrderStatus::Failed;
		order.meta.insert("_payflex_workflow_status".into(), "failed".into());
		order.meta.insert("_payflex_order_id".into(), "OLD".into());
		order.meta.insert("_payflex_order_token".into(), "old-token".into());
		h.save(order).await;

		let mut scope = RequestScope::new();
		let result = h
			.engine
			.checkout()
			.initiate(&mut scope, &OrderId::from("101"))
			.await
			.unwrap();

		assert!(matches!(result, CheckoutResult::Redirect { .. }));
		let order = h.order("101").await;
		assert_eq!(order.meta_value("_payflex_order_id"), Some("R1"));
		assert_eq!(order.meta_value("_payflex_workflow_status"), Some("initiated"));
	}

	#[tokio::test]
	async fn test_paid_order_is_refused() {
		let h = harness().await;
		let mut order = sample_order("102");
		order.status = OrderStatus::Processing;
		h.save(order).await;

		let mut scope = RequestScope::new();
		let result = h
			.engine
			.checkout()
			.initiate(&mut scope, &OrderId::from("102"))
			.await
			.unwrap();

		assert!(matches!(result, CheckoutResult::Failure { .. }));
		assert_eq!(h.provider.created_count(), 0);
	}

	#[tokio::test]
	async fn test_missing_token_adds_note_and_fails() {
		let h = harness().await;
		h.provider.deny_tokens();
		h.save(sample_order("103")).await;

		let mut scope = RequestScope::new();
		let result = h
			.engine
			.checkout()
			.initiate(&mut scope, &OrderId::from("103"))
			.await
			.unwrap();

		assert_eq!(
			result,
			CheckoutResult::Failure {
				notice: GENERIC_NOTICE.into(),
				redirect: "https://shop.test/checkout/order-pay/103".into(),
			}
		);
		assert_eq!(h.order("103").await.notes[0].content, TOKEN_MISSING_NOTE);
	}

	#[tokio::test]
	async fn test_incomplete_response_detail_only_in_debug() {
		let h = harness_with(|config| config.gateway.debug = true).await;
		h.provider.fail_next_create(Some("Amount below minimum"));
		h.save(sample_order("104")).await;

		let mut scope = RequestScope::new();
		let result = h
			.engine
			.checkout()
			.initiate(&mut scope, &OrderId::from("104"))
			.await
			.unwrap();

		match result {
			CheckoutResult::Failure { notice, .. } => assert!(notice.ends_with("Amount below minimum")),
			other => panic!("unexpected result {other:?}"),
		}
		let order = h.order("104").await;
		assert_eq!(order.meta_value("_payflex_order_id"), None);
		assert_eq!(order.meta_value("_payflex_workflow_status"), None);
	}

	#[tokio::test]
	async fn test_payload_uses_structured_items_and_return_urls() {
		let h = harness_with(|config| config.checkout.sequential_order_numbers = true).await;
		let mut order = sample_order("105");
		order.order_number = Some("INV-105".into());
		order.items = vec![LineItem {
			name: "Mug".into(),
			sku: None,
			quantity: 3,
			line_subtotal: Decimal::new(10000, 2),
		}];
		order.tax_total = Decimal::new(1500, 2);

		let request = h.engine.checkout().build_order_request(&order).unwrap();
		assert_eq!(request.amount, "250.00");
		assert_eq!(request.merchant_reference, "INV-105");
		assert_eq!(request.tax_amount, "15.00");
		assert_eq!(request.items[0].name, "Mug");
		assert_eq!(request.items[0].price, "33.33");
		assert_eq!(
			request.merchant.redirect_cancel_url,
			"https://shop.test/payflex/return?key=wc_order_105&order_id=105&status=cancelled"
		);
	}

	#[tokio::test]
	async fn test_provider_redirect_marks_pending() {
		let h = harness().await;
		let mut order = sample_order("106");
		order.status = OrderStatus::Failed;
		order
			.meta
			.insert("_order_redirectURL".into(), "https://pay.payflex.test/LEGACY".into());
		h.save(order).await;

		let redirect = h
			.engine
			.checkout()
			.provider_redirect(&OrderId::from("106"))
			.await
			.unwrap();
		assert_eq!(redirect, Redirect::Provider("https://pay.payflex.test/LEGACY".into()));
		assert_eq!(h.order("106").await.status, OrderStatus::Pending);
	}
}
