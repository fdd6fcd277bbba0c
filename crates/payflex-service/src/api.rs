//! HTTP API for the shop front end, the provider's return redirect and
//! support tooling.

use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Json, Redirect, Response},
	routing::{get, post},
	Router,
};
use chrono::{DateTime, Utc};
use payflex_core::{CheckoutResult, CoreError, GatewayEngine, RefundPath, RequestScope};
use payflex_orders::OrderStoreError;
use payflex_provider::ProviderError;
use payflex_types::{
	Customer, LineItem, LocalOrder, OrderId, OrderStatus, PostalAddress, ReturnParams,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, instrument, warn};

#[derive(Clone)]
struct AppState {
	engine: Arc<GatewayEngine>,
}

/// Error answered by a handler.
struct ApiError(CoreError);

impl From<CoreError> for ApiError {
	fn from(err: CoreError) -> Self {
		Self(err)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = match &self.0 {
			CoreError::OrderStore(OrderStoreError::NotFound(_)) => StatusCode::NOT_FOUND,
			CoreError::Provider(ProviderError::Status(404)) => StatusCode::NOT_FOUND,
			CoreError::OrderStore(OrderStoreError::Invalid(_)) | CoreError::InvalidRequest(_) => {
				StatusCode::BAD_REQUEST
			}
			CoreError::Provider(_) => StatusCode::BAD_GATEWAY,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		};
		if status.is_server_error() {
			warn!(error = %self.0, "Request failed");
		}
		(status, Json(json!({ "error": self.0.to_string() }))).into_response()
	}
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(engine: Arc<GatewayEngine>) -> Router {
	Router::new()
		.route("/health", get(health_check))
		// Shop endpoints
		.route("/orders", post(create_order))
		.route("/orders/{order_id}", get(get_order))
		.route("/orders/{order_id}/status", post(set_order_status))
		.route("/orders/{order_id}/refund", post(refund_order))
		.route("/checkout/{order_id}", post(initiate_checkout))
		.route("/checkout/{order_id}/pay", get(pay_redirect))
		.route("/payflex/return", get(handle_return))
		.route("/limits", get(get_limits))
		// Support endpoints
		.route("/support/remote/{remote_order_id}", get(get_remote_order))
		.route("/support/orders/{order_id}/check", post(check_order))
		.route("/support/sweep", post(run_sweep))
		.with_state(AppState { engine })
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive()),
		)
}

pub async fn serve(
	engine: Arc<GatewayEngine>,
	host: &str,
	port: u16,
	shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
	let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
	info!("API server listening on {}:{}", host, port);

	axum::serve(listener, router(engine))
		.with_graceful_shutdown(shutdown)
		.await?;
	Ok(())
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
	Json(json!({
		"status": "ok",
		"name": state.engine.config().gateway.name,
		"version": state.engine.config().gateway.plugin_version,
	}))
}

/// Order as submitted by the shop when the shopper places it.
#[derive(Debug, Deserialize)]
struct NewOrder {
	id: String,
	order_key: String,
	#[serde(default)]
	order_number: Option<String>,
	currency: String,
	total: Decimal,
	#[serde(default)]
	tax_total: Decimal,
	#[serde(default)]
	shipping_total: Decimal,
	#[serde(default)]
	customer: Customer,
	#[serde(default)]
	billing: PostalAddress,
	#[serde(default)]
	shipping: PostalAddress,
	#[serde(default)]
	items: Vec<LineItem>,
	#[serde(default)]
	created_at: Option<DateTime<Utc>>,
}

async fn create_order(
	State(state): State<AppState>,
	Json(new): Json<NewOrder>,
) -> ApiResult<(StatusCode, Json<LocalOrder>)> {
	let order = LocalOrder {
		id: OrderId::new(new.id),
		order_key: new.order_key,
		order_number: new.order_number,
		status: OrderStatus::Pending,
		payment_method: state.engine.config().gateway.payment_method.clone(),
		currency: new.currency,
		total: new.total,
		tax_total: new.tax_total,
		shipping_total: new.shipping_total,
		customer: new.customer,
		billing: new.billing,
		shipping: new.shipping,
		items: new.items,
		transaction_id: None,
		meta: HashMap::new(),
		notes: vec![],
		created_at: new.created_at.unwrap_or_else(Utc::now),
	};
	state
		.engine
		.orders()
		.save(&order)
		.await
		.map_err(CoreError::from)?;
	Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
) -> ApiResult<Json<LocalOrder>> {
	let order = state
		.engine
		.orders()
		.load(&OrderId::new(order_id))
		.await
		.map_err(CoreError::from)?;
	Ok(Json(order))
}

#[derive(Debug, Deserialize)]
struct StatusChange {
	status: OrderStatus,
}

async fn set_order_status(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	Json(change): Json<StatusChange>,
) -> ApiResult<Json<serde_json::Value>> {
	let refund = state
		.engine
		.set_order_status(&OrderId::new(order_id), change.status)
		.await?;
	Ok(Json(json!({ "status": change.status, "refund": refund })))
}

#[derive(Debug, Deserialize)]
struct RefundBody {
	/// Full refund when absent.
	#[serde(default)]
	amount: Option<Decimal>,
}

#[instrument(skip(state, body))]
async fn refund_order(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	Json(body): Json<RefundBody>,
) -> ApiResult<Json<serde_json::Value>> {
	let id = OrderId::new(order_id);
	let outcome = match body.amount {
		Some(amount) => state.engine.refund(&id, amount, RefundPath::Manual).await?,
		None => state.engine.refund_in_full(&id).await?,
	};
	Ok(Json(json!({ "refund": outcome })))
}

async fn initiate_checkout(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
	let mut scope = RequestScope::new();
	let result = state
		.engine
		.initiate(&mut scope, &OrderId::new(order_id))
		.await?;

	Ok(Json(match result {
		CheckoutResult::Redirect { url } => json!({ "result": "success", "redirect": url }),
		CheckoutResult::Failure { notice, redirect } => {
			json!({ "result": "failure", "notice": notice, "redirect": redirect })
		}
	}))
}

async fn pay_redirect(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
) -> ApiResult<Redirect> {
	let redirect = state
		.engine
		.provider_redirect(&OrderId::new(order_id))
		.await?;
	Ok(Redirect::to(&redirect.to_url(state.engine.config())))
}

async fn handle_return(
	State(state): State<AppState>,
	Query(params): Query<ReturnParams>,
) -> Redirect {
	let mut scope = RequestScope::new();
	let redirect = state.engine.handle_return(&mut scope, &params).await;
	Redirect::to(&redirect.to_url(state.engine.config()))
}

#[derive(Debug, Deserialize)]
struct LimitsQuery {
	#[serde(default)]
	total: Option<Decimal>,
}

async fn get_limits(
	State(state): State<AppState>,
	Query(query): Query<LimitsQuery>,
) -> Json<serde_json::Value> {
	let limits = state.engine.availability().limits().await;
	let available = match query.total {
		Some(total) => Some(state.engine.is_available(total).await),
		None => None,
	};
	Json(json!({ "limits": limits, "available": available }))
}

async fn get_remote_order(
	State(state): State<AppState>,
	Path(remote_order_id): Path<String>,
) -> ApiResult<Json<payflex_types::RemoteOrder>> {
	Ok(Json(state.engine.fetch_remote_order(&remote_order_id).await?))
}

async fn check_order(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
	let status = state
		.engine
		.check_remote_status(&OrderId::new(order_id))
		.await?;
	Ok(Json(json!({ "remote_status": status })))
}

#[derive(Debug, Deserialize)]
struct SweepQuery {
	#[serde(default)]
	all: bool,
}

async fn run_sweep(
	State(state): State<AppState>,
	Query(query): Query<SweepQuery>,
) -> ApiResult<Json<payflex_core::SweepReport>> {
	Ok(Json(state.engine.sweep(query.all).await?))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::factories::build_engine;
	use axum::body::{to_bytes, Body};
	use axum::http::{header, Request};
	use payflex_config::{parse_config, ConfigFormat};
	use tower::ServiceExt;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn engine(server_uri: &str) -> Arc<GatewayEngine> {
		let config = parse_config(
			&format!(
				r#"
[gateway]
name = "payflex-api-test"

[provider]
environment = "sandbox"
client_id = "client"
client_secret = "secret"

[provider.environments.sandbox]
api_url = "{server_uri}"
auth_url = "{server_uri}/oauth/token"
auth_audience = "https://auth-dev.payflex.test"

[checkout]
callback_url = "https://shop.test/payflex/return"
success_url = "https://shop.test/order-received/{{order_id}}"
failure_url = "https://shop.test/failed/{{order_id}}"
unknown_url = "https://shop.test/unknown/{{order_id}}"
cancel_url = "https://shop.test/cart"
retry_url = "https://shop.test/order-pay/{{order_id}}"
"#
			),
			ConfigFormat::Toml,
		)
		.unwrap();
		Arc::new(build_engine(config).unwrap())
	}

	async fn mount_token(server: &MockServer) {
		Mock::given(method("POST"))
			.and(path("/oauth/token"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"access_token": "bearer",
				"expires_in": 3600
			})))
			.mount(server)
			.await;
	}

	fn new_order_body(id: &str) -> Body {
		Body::from(
			json!({
				"id": id,
				"order_key": format!("wc_order_{id}"),
				"currency": "ZAR",
				"total": "250.00",
				"items": [{ "name": "Kettle", "quantity": 1, "line_subtotal": "250.00" }]
			})
			.to_string(),
		)
	}

	async fn body_json(response: Response) -> serde_json::Value {
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		serde_json::from_slice(&bytes).unwrap()
	}

	fn post_json(uri: &str, body: Body) -> Request<Body> {
		Request::post(uri)
			.header(header::CONTENT_TYPE, "application/json")
			.body(body)
			.unwrap()
	}

	#[tokio::test]
	async fn test_create_and_fetch_order() {
		let server = MockServer::start().await;
		let app = router(engine(&server.uri()));

		let response = app
			.clone()
			.oneshot(post_json("/orders", new_order_body("7")))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::CREATED);

		let response = app
			.clone()
			.oneshot(Request::get("/orders/7").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let order = body_json(response).await;
		assert_eq!(order["status"], "pending");
		assert_eq!(order["payment_method"], "payflex");

		let response = app
			.oneshot(Request::get("/orders/404").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn test_checkout_and_approved_return() {
		let server = MockServer::start().await;
		mount_token(&server).await;
		Mock::given(method("POST"))
			.and(path("/order/productSelect"))
			.respond_with(ResponseTemplate::new(201).set_body_json(json!({
				"orderId": "R1",
				"token": "tok1",
				"redirectUrl": "https://pay.payflex.test/R1"
			})))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/order/R1"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"orderId": "R1",
				"token": "tok1",
				"amount": 250.00,
				"orderStatus": "Approved"
			})))
			.mount(&server)
			.await;

		let app = router(engine(&server.uri()));
		app.clone()
			.oneshot(post_json("/orders", new_order_body("8")))
			.await
			.unwrap();

		let response = app
			.clone()
			.oneshot(Request::post("/checkout/8").body(Body::empty()).unwrap())
			.await
			.unwrap();
		let body = body_json(response).await;
		assert_eq!(body["result"], "success");
		assert_eq!(body["redirect"], "https://pay.payflex.test/R1");

		let response = app
			.clone()
			.oneshot(
				Request::get("/payflex/return?order_id=8&status=approved&token=tok1")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::SEE_OTHER);
		assert_eq!(
			response.headers()[header::LOCATION],
			"https://shop.test/order-received/8"
		);

		let response = app
			.oneshot(Request::get("/orders/8").body(Body::empty()).unwrap())
			.await
			.unwrap();
		let order = body_json(response).await;
		assert_eq!(order["status"], "processing");
		assert_eq!(order["transaction_id"], "R1");
	}

	#[tokio::test]
	async fn test_return_without_parameters_redirects_to_failure() {
		let server = MockServer::start().await;
		let app = router(engine(&server.uri()));

		let response = app
			.oneshot(Request::get("/payflex/return").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::SEE_OTHER);
		assert_eq!(response.headers()[header::LOCATION], "https://shop.test/failed/");
	}

	#[tokio::test]
	async fn test_limits_fail_closed_then_report_availability() {
		let server = MockServer::start().await;
		let app = router(engine(&server.uri()));

		let response = app
			.clone()
			.oneshot(Request::get("/limits?total=250.00").body(Body::empty()).unwrap())
			.await
			.unwrap();
		let body = body_json(response).await;
		assert_eq!(body["available"], false);
		assert!(body["limits"].is_null());

		mount_token(&server).await;
		Mock::given(method("GET"))
			.and(path("/configuration"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"minimumAmount": 50,
				"maximumAmount": "20000.00"
			})))
			.mount(&server)
			.await;

		let response = app
			.oneshot(Request::get("/limits?total=250.00").body(Body::empty()).unwrap())
			.await
			.unwrap();
		let body = body_json(response).await;
		assert_eq!(body["available"], true);
	}

	#[tokio::test]
	async fn test_support_sweep_reports_counts() {
		let server = MockServer::start().await;
		let app = router(engine(&server.uri()));

		let response = app
			.oneshot(Request::post("/support/sweep?all=true").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let report = body_json(response).await;
		assert_eq!(report["examined"], 0);
	}
}
