//! Configuration types for the gateway.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// Complete gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Config {
	/// Gateway identity, logging and HTTP settings
	#[validate(nested)]
	pub gateway: GatewaySettings,
	/// Provider credentials and environments
	#[validate(nested)]
	pub provider: ProviderConfig,
	/// Key/value storage used for caches
	#[serde(default)]
	pub storage: BackendConfig,
	/// Order store backend
	#[serde(default)]
	pub orders: BackendConfig,
	/// Callback and shopper-facing redirect URLs
	#[validate(nested)]
	pub checkout: CheckoutConfig,
	/// Scheduled reconciliation
	#[serde(default)]
	#[validate(nested)]
	pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct GatewaySettings {
	#[serde(default = "default_name")]
	#[validate(length(min = 1))]
	pub name: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	#[serde(default = "default_http_host")]
	pub http_host: String,
	#[serde(default = "default_http_port")]
	#[validate(range(min = 1))]
	pub http_port: u16,
	/// Show detailed provider errors to shoppers.
	#[serde(default)]
	pub debug: bool,
	/// Payment method id orders carry when paid through this gateway.
	#[serde(default = "default_payment_method")]
	#[validate(length(min = 1))]
	pub payment_method: String,
	#[serde(default = "default_plugin_version")]
	pub plugin_version: String,
	#[serde(default = "default_platform")]
	pub platform: String,
	#[serde(default)]
	pub active_plugin_count: u32,
	#[serde(default)]
	pub total_plugin_count: u32,
}

/// Provider endpoints for one deployment environment
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct EnvironmentConfig {
	#[validate(url)]
	pub api_url: String,
	#[validate(url)]
	pub auth_url: String,
	pub auth_audience: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ProviderConfig {
	/// Key into `environments`
	#[serde(default = "default_environment")]
	pub environment: String,
	#[serde(default)]
	pub client_id: String,
	#[serde(default)]
	pub client_secret: String,
	pub environments: HashMap<String, EnvironmentConfig>,
	#[serde(default = "default_request_timeout")]
	#[validate(range(min = 1))]
	pub request_timeout_secs: u64,
	#[serde(default = "default_order_timeout")]
	#[validate(range(min = 1))]
	pub order_timeout_secs: u64,
	#[serde(default = "default_token_margin")]
	pub token_expiry_margin_secs: u64,
	#[serde(default = "default_configuration_cache")]
	pub configuration_cache_secs: u64,
}

impl ProviderConfig {
	/// Endpoints of the selected environment.
	pub fn active_environment(&self) -> Option<&EnvironmentConfig> {
		self.environments.get(&self.environment)
	}
}

/// Backend selection with free-form backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
	#[serde(default = "default_backend")]
	pub backend: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

impl Default for BackendConfig {
	fn default() -> Self {
		Self {
			backend: default_backend(),
			config: empty_table(),
		}
	}
}

/// Redirect URL templates. `{order_id}` is replaced with the local order id.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CheckoutConfig {
	/// Where the provider sends the shopper back to.
	#[validate(url)]
	pub callback_url: String,
	pub success_url: String,
	pub failure_url: String,
	pub unknown_url: String,
	pub cancel_url: String,
	pub retry_url: String,
	/// Use the order number instead of the order id as merchant reference.
	#[serde(default)]
	pub sequential_order_numbers: bool,
}

impl CheckoutConfig {
	pub fn render(template: &str, order_id: &str) -> String {
		template.replace("{order_id}", order_id)
	}
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SweeperConfig {
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default = "default_sweep_interval")]
	#[validate(range(min = 1))]
	pub interval_secs: u64,
	/// Orders younger than this are only swept on an all-orders pass.
	#[serde(default = "default_new_order_minutes")]
	pub new_order_minutes: i64,
	/// Orders older than this are never swept.
	#[serde(default = "default_max_age_minutes")]
	pub max_age_minutes: i64,
	/// Record a note when a remote order is still pending approval.
	#[serde(default)]
	pub enable_order_notes: bool,
}

impl Default for SweeperConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			interval_secs: default_sweep_interval(),
			new_order_minutes: default_new_order_minutes(),
			max_age_minutes: default_max_age_minutes(),
			enable_order_notes: false,
		}
	}
}

fn default_name() -> String {
	"payflex-gateway".to_string()
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_http_host() -> String {
	"0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
	8080
}

fn default_payment_method() -> String {
	"payflex".to_string()
}

fn default_plugin_version() -> String {
	env!("CARGO_PKG_VERSION").to_string()
}

fn default_platform() -> String {
	"WooCommerce".to_string()
}

fn default_environment() -> String {
	"production".to_string()
}

fn default_request_timeout() -> u64 {
	15
}

fn default_order_timeout() -> u64 {
	30
}

fn default_token_margin() -> u64 {
	120
}

fn default_configuration_cache() -> u64 {
	86_400
}

fn default_backend() -> String {
	"memory".to_string()
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::Table::new())
}

fn default_true() -> bool {
	true
}

fn default_sweep_interval() -> u64 {
	120
}

fn default_new_order_minutes() -> i64 {
	30
}

fn default_max_age_minutes() -> i64 {
	120
}
