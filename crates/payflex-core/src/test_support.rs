//! Shared fixtures for the engine tests: an in-process fake provider and a
//! fully built engine over memory backends.

use crate::{GatewayBuilder, GatewayEngine};
use async_trait::async_trait;
use chrono::Utc;
use payflex_config::{parse_config, Config, ConfigFormat};
use payflex_provider::{ProviderError, ProviderInterface};
use payflex_types::{
	ConfigurationReply, CreateOrderRequest, CreatedOrder, Credentials, Customer, LineItem,
	LocalOrder, OrderId, OrderStatus, PostalAddress, RefundReply, RefundRequest, RemoteOrder,
	RemoteOrderStatus, TokenGrant,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const TEST_CONFIG: &str = r#"
[gateway]
name = "payflex-test"

[provider]
environment = "sandbox"
client_id = "client"
client_secret = "secret"

[provider.environments.sandbox]
api_url = "https://api.payflex.test"
auth_url = "https://auth.payflex.test/oauth/token"
auth_audience = "https://auth-dev.payflex.test"

[checkout]
callback_url = "https://shop.test/payflex/return"
success_url = "https://shop.test/checkout/order-received/{order_id}"
failure_url = "https://shop.test/checkout/failed/{order_id}"
unknown_url = "https://shop.test/checkout/unknown/{order_id}"
cancel_url = "https://shop.test/cart?cancelled={order_id}"
retry_url = "https://shop.test/checkout/order-pay/{order_id}"
"#;

pub fn test_config() -> Config {
	parse_config(TEST_CONFIG, ConfigFormat::Toml).unwrap()
}

pub fn sample_order(id: &str) -> LocalOrder {
	LocalOrder {
		id: OrderId::from(id),
		order_key: format!("wc_order_{id}"),
		order_number: None,
		status: OrderStatus::Pending,
		payment_method: "payflex".into(),
		currency: "ZAR".into(),
		total: Decimal::new(25000, 2),
		tax_total: Decimal::ZERO,
		shipping_total: Decimal::ZERO,
		customer: Customer {
			first_name: "Sam".into(),
			last_name: "Doe".into(),
			email: "sam@example.test".into(),
			phone: "0210000000".into(),
		},
		billing: PostalAddress {
			address_line1: "1 Main Rd".into(),
			address_line2: String::new(),
			city: "Cape Town".into(),
			postcode: "8001".into(),
		},
		shipping: PostalAddress::default(),
		items: vec![LineItem {
			name: "Kettle".into(),
			sku: Some("KT-1".into()),
			quantity: 1,
			line_subtotal: Decimal::new(25000, 2),
		}],
		transaction_id: None,
		meta: HashMap::new(),
		notes: vec![],
		created_at: Utc::now(),
	}
}

#[derive(Default)]
struct FakeState {
	next_id: u32,
	created: usize,
	deny_tokens: bool,
	token_requests: usize,
	fail_next_create: Option<Option<String>>,
	orders: HashMap<String, RemoteOrder>,
	refund_reply: Option<RefundReply>,
	refunds: Vec<(String, RefundRequest)>,
	limits: Option<(Decimal, Decimal)>,
}

/// Provider double keeping remote orders in memory.
///
/// Created orders get ids `R1`, `R2`... with tokens `tok1`, `tok2`... and
/// start in `Created`.
#[derive(Clone, Default)]
pub struct FakeProvider {
	state: Arc<Mutex<FakeState>>,
}

impl FakeProvider {
	fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
		f(&mut self.state.lock().unwrap())
	}

	fn with_order(&self, remote_id: &str, f: impl FnOnce(&mut RemoteOrder)) {
		self.with_state(|state| {
			let order = state
				.orders
				.entry(remote_id.to_string())
				.or_insert_with(|| RemoteOrder {
					order_id: Some(remote_id.to_string()),
					token: None,
					amount: None,
					order_status: None,
					merchant_reference: None,
					consumer: None,
					created_date_time: None,
				});
			f(order);
		});
	}

	pub fn created_count(&self) -> usize {
		self.with_state(|state| state.created)
	}

	pub fn token_requests(&self) -> usize {
		self.with_state(|state| state.token_requests)
	}

	pub fn deny_tokens(&self) {
		self.with_state(|state| state.deny_tokens = true);
	}

	/// The next order creation answers without identifiers.
	pub fn fail_next_create(&self, message: Option<&str>) {
		self.with_state(|state| state.fail_next_create = Some(message.map(str::to_string)));
	}

	/// Adds or replaces a remote order.
	pub fn insert_order(&self, remote_id: &str, token: &str, amount: &str, status: RemoteOrderStatus) {
		self.with_order(remote_id, |order| {
			order.token = Some(token.to_string());
			order.amount = Decimal::from_str(amount).ok();
			order.order_status = Some(status);
		});
	}

	pub fn set_status(&self, remote_id: &str, status: RemoteOrderStatus) {
		self.with_order(remote_id, |order| order.order_status = Some(status));
	}

	pub fn clear_status(&self, remote_id: &str) {
		self.with_order(remote_id, |order| order.order_status = None);
	}

	pub fn set_amount(&self, remote_id: &str, amount: &str) {
		self.with_order(remote_id, |order| order.amount = Decimal::from_str(amount).ok());
	}

	pub fn set_token(&self, remote_id: &str, token: &str) {
		self.with_order(remote_id, |order| order.token = Some(token.to_string()));
	}

	pub fn set_refund_reply(&self, status: u16, error_code: Option<&str>, message: Option<&str>) {
		self.with_state(|state| {
			state.refund_reply = Some(RefundReply {
				status,
				error_code: error_code.map(str::to_string),
				message: message.map(str::to_string),
			})
		});
	}

	pub fn refunds(&self) -> Vec<(String, RefundRequest)> {
		self.with_state(|state| state.refunds.clone())
	}

	pub fn set_limits(&self, minimum: Decimal, maximum: Decimal) {
		self.with_state(|state| state.limits = Some((minimum, maximum)));
	}
}

#[async_trait]
impl ProviderInterface for FakeProvider {
	async fn request_token(&self, _credentials: &Credentials) -> Result<TokenGrant, ProviderError> {
		self.with_state(|state| {
			state.token_requests += 1;
			if state.deny_tokens {
				return Err(ProviderError::Status(401));
			}
			Ok(TokenGrant {
				access_token: Some("bearer".into()),
				expires_in: Some(3600),
			})
		})
	}

	async fn create_order(
		&self,
		_token: &str,
		request: &CreateOrderRequest,
	) -> Result<CreatedOrder, ProviderError> {
		self.with_state(|state| {
			if let Some(message) = state.fail_next_create.take() {
				return Err(ProviderError::IncompleteResponse { message });
			}
			state.next_id += 1;
			state.created += 1;
			let n = state.next_id;
			let created = CreatedOrder {
				remote_order_id: format!("R{n}"),
				token: format!("tok{n}"),
				redirect_url: format!("https://pay.payflex.test/R{n}"),
			};
			state.orders.insert(
				created.remote_order_id.clone(),
				RemoteOrder {
					order_id: Some(created.remote_order_id.clone()),
					token: Some(created.token.clone()),
					amount: Decimal::from_str(&request.amount).ok(),
					order_status: Some(RemoteOrderStatus::Created),
					merchant_reference: Some(request.merchant_reference.clone()),
					consumer: None,
					created_date_time: None,
				},
			);
			Ok(created)
		})
	}

	async fn get_order(&self, _token: &str, remote_order_id: &str) -> Result<RemoteOrder, ProviderError> {
		self.with_state(|state| {
			state
				.orders
				.get(remote_order_id)
				.cloned()
				.ok_or(ProviderError::Status(404))
		})
	}

	async fn refund_order(
		&self,
		_token: &str,
		remote_order_id: &str,
		request: &RefundRequest,
	) -> Result<RefundReply, ProviderError> {
		self.with_state(|state| {
			state
				.refunds
				.push((remote_order_id.to_string(), request.clone()));
			Ok(state.refund_reply.clone().unwrap_or(RefundReply {
				status: 201,
				error_code: None,
				message: None,
			}))
		})
	}

	async fn get_configuration(&self, _token: &str) -> Result<ConfigurationReply, ProviderError> {
		self.with_state(|state| match state.limits {
			Some((minimum, maximum)) => Ok(ConfigurationReply {
				minimum_amount: Some(minimum),
				maximum_amount: Some(maximum),
			}),
			None => Err(ProviderError::Status(503)),
		})
	}
}

pub struct Harness {
	pub engine: GatewayEngine,
	pub provider: FakeProvider,
}

impl Harness {
	pub async fn save(&self, order: LocalOrder) {
		self.engine.orders().save(&order).await.unwrap();
	}

	pub async fn order(&self, id: &str) -> LocalOrder {
		self.engine.orders().load(&OrderId::from(id)).await.unwrap()
	}

	pub async fn cart_emptied(&self, id: &str) -> bool {
		self.engine
			.orders()
			.cart_emptied(&OrderId::from(id))
			.await
			.unwrap()
	}

	pub async fn orders_update_status(&self, id: &str, status: OrderStatus) {
		self.engine
			.orders()
			.update_status(&OrderId::from(id), status)
			.await
			.unwrap();
	}
}

pub async fn harness() -> Harness {
	harness_with(|_| {}).await
}

pub async fn harness_with(configure: impl FnOnce(&mut Config)) -> Harness {
	let mut config = test_config();
	configure(&mut config);

	let provider = FakeProvider::default();
	let factory_provider = provider.clone();
	let engine = GatewayBuilder::new(config)
		.with_storage_factory("memory", payflex_storage::implementations::memory::create_storage)
		.with_order_store_factory("memory", payflex_orders::implementations::memory::create_order_store)
		.with_provider_factory(move |_| Ok(Box::new(factory_provider.clone())))
		.build()
		.unwrap();

	Harness { engine, provider }
}
