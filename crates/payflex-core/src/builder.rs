use crate::{CoreError, GatewayEngine};
use payflex_config::{Config, ProviderConfig};
use payflex_orders::{OrderStore, OrderStoreInterface};
use payflex_provider::{ProviderError, ProviderInterface, ProviderService};
use payflex_storage::{StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

type StorageFactory = Box<dyn Fn(&toml::Value) -> Box<dyn StorageInterface> + Send>;
type OrderStoreFactory =
	Box<dyn Fn(&toml::Value, Arc<StorageService>) -> Box<dyn OrderStoreInterface> + Send>;
type ProviderFactory =
	Box<dyn Fn(&ProviderConfig) -> Result<Box<dyn ProviderInterface>, ProviderError> + Send>;

/// Builds a [`GatewayEngine`] from configuration and backend factories.
///
/// Backends are selected by the `backend` name in the `storage` and
/// `orders` sections; a factory must be registered for each selected name.
pub struct GatewayBuilder {
	config: Config,
	storage_factories: HashMap<String, StorageFactory>,
	order_store_factories: HashMap<String, OrderStoreFactory>,
	provider_factory: Option<ProviderFactory>,
}

impl GatewayBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			storage_factories: HashMap::new(),
			order_store_factories: HashMap::new(),
			provider_factory: None,
		}
	}

	pub fn with_storage_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Box<dyn StorageInterface> + Send + 'static,
	{
		self.storage_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_order_store_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value, Arc<StorageService>) -> Box<dyn OrderStoreInterface> + Send + 'static,
	{
		self.order_store_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_provider_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&ProviderConfig) -> Result<Box<dyn ProviderInterface>, ProviderError> + Send + 'static,
	{
		self.provider_factory = Some(Box::new(factory));
		self
	}

	pub fn build(self) -> Result<GatewayEngine, CoreError> {
		// Create storage backend
		let storage_backend = self
			.storage_factories
			.get(&self.config.storage.backend)
			.ok_or_else(|| {
				CoreError::Config(format!(
					"No storage factory registered for '{}'",
					self.config.storage.backend
				))
			})?(&self.config.storage.config);
		let storage = Arc::new(StorageService::new(storage_backend));

		// Create order store
		let order_backend = self
			.order_store_factories
			.get(&self.config.orders.backend)
			.ok_or_else(|| {
				CoreError::Config(format!(
					"No order store factory registered for '{}'",
					self.config.orders.backend
				))
			})?(&self.config.orders.config, storage.clone());
		let orders = Arc::new(OrderStore::new(order_backend));

		// Create provider client
		let provider_backend = self
			.provider_factory
			.as_ref()
			.ok_or_else(|| CoreError::Config("Provider factory not provided".into()))?(
			&self.config.provider,
		)?;
		let provider = Arc::new(ProviderService::new(
			Arc::from(provider_backend),
			storage.clone(),
			&self.config.provider,
		));

		info!(
			storage = %self.config.storage.backend,
			orders = %self.config.orders.backend,
			environment = %self.config.provider.environment,
			"Gateway engine built"
		);

		Ok(GatewayEngine::assemble(self.config, storage, orders, provider))
	}
}
