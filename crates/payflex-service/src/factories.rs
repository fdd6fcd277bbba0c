//! Concrete backend registration.

use payflex_config::Config;
use payflex_core::{CoreError, GatewayBuilder, GatewayEngine};
use payflex_orders::implementations::{memory as memory_orders, stored};
use payflex_provider::implementations::http;
use payflex_storage::implementations::{file, memory};

/// Builds the engine with every backend this service ships.
pub fn build_engine(config: Config) -> Result<GatewayEngine, CoreError> {
	GatewayBuilder::new(config)
		.with_storage_factory("memory", memory::create_storage)
		.with_storage_factory("file", file::create_storage)
		.with_order_store_factory("memory", memory_orders::create_order_store)
		.with_order_store_factory("storage", stored::create_order_store)
		.with_provider_factory(http::create_provider)
		.build()
}
