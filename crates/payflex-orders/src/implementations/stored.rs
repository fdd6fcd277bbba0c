//! Order store persisted through `StorageService`.
//!
//! Orders are kept as JSON documents under the `orders` namespace, with an
//! id index and an order-key index alongside. Every write, including the
//! load-modify-save of field updates, holds `write_lock` for its whole span.

use crate::{OrderStoreError, OrderStoreInterface};
use async_trait::async_trait;
use payflex_storage::StorageService;
use payflex_types::{LocalOrder, OrderId, OrderNote, OrderQuery, OrderStatus};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

const ORDERS: &str = "orders";
const INDEX: &str = "orders_index";
const KEYS: &str = "order_keys";
const CARTS: &str = "carts";

pub struct StoredOrderStore {
	storage: Arc<StorageService>,
	write_lock: Mutex<()>,
}

impl StoredOrderStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			write_lock: Mutex::new(()),
		}
	}

	/// Writes the order and its indexes. Callers hold `write_lock`.
	async fn persist(&self, order: &LocalOrder) -> Result<(), OrderStoreError> {
		self.storage.store(ORDERS, order.id.as_str(), order).await?;
		self.storage.store(KEYS, &order.order_key, &order.id).await?;

		let mut index = self.index().await?;
		if !index.contains(&order.id) {
			debug!(order_id = %order.id, "Indexing new order");
			index.push(order.id.clone());
			self.storage.store(INDEX, "all", &index).await?;
		}
		Ok(())
	}

	/// Load-modify-save under the write lock. `f` returns whether the order
	/// changed and should be written back.
	async fn update<F>(&self, id: &OrderId, f: F) -> Result<bool, OrderStoreError>
	where
		F: FnOnce(&mut LocalOrder) -> bool + Send,
	{
		let _guard = self.write_lock.lock().await;
		let mut order = self.load(id).await?;
		if !f(&mut order) {
			return Ok(false);
		}
		self.storage.store(ORDERS, id.as_str(), &order).await?;
		Ok(true)
	}

	async fn index(&self) -> Result<Vec<OrderId>, OrderStoreError> {
		Ok(self
			.storage
			.retrieve_optional(INDEX, "all")
			.await?
			.unwrap_or_default())
	}
}

#[async_trait]
impl OrderStoreInterface for StoredOrderStore {
	async fn load(&self, id: &OrderId) -> Result<LocalOrder, OrderStoreError> {
		self.storage
			.retrieve_optional(ORDERS, id.as_str())
			.await?
			.ok_or_else(|| OrderStoreError::NotFound(id.clone()))
	}

	async fn find_by_key(&self, order_key: &str) -> Result<Option<LocalOrder>, OrderStoreError> {
		let id: Option<OrderId> = self.storage.retrieve_optional(KEYS, order_key).await?;
		match id {
			Some(id) => match self.load(&id).await {
				Ok(order) => Ok(Some(order)),
				Err(OrderStoreError::NotFound(_)) => Ok(None),
				Err(e) => Err(e),
			},
			None => Ok(None),
		}
	}

	async fn save(&self, order: &LocalOrder) -> Result<(), OrderStoreError> {
		let _guard = self.write_lock.lock().await;
		self.persist(order).await
	}

	async fn query(&self, query: &OrderQuery) -> Result<Vec<LocalOrder>, OrderStoreError> {
		let mut found = Vec::new();
		for id in self.index().await? {
			match self.load(&id).await {
				Ok(order) if query.matches(&order) => found.push(order),
				Ok(_) => {}
				Err(OrderStoreError::NotFound(_)) => {}
				Err(e) => return Err(e),
			}
		}
		found.sort_by_key(|order| order.created_at);
		Ok(found)
	}

	async fn empty_cart(&self, id: &OrderId) -> Result<(), OrderStoreError> {
		self.storage.store(CARTS, id.as_str(), &true).await?;
		Ok(())
	}

	async fn cart_emptied(&self, id: &OrderId) -> Result<bool, OrderStoreError> {
		Ok(self.storage.exists(CARTS, id.as_str()).await?)
	}

	async fn set_meta(&self, id: &OrderId, key: &str, value: &str) -> Result<(), OrderStoreError> {
		self.update(id, |order| {
			order.meta.insert(key.to_string(), value.to_string());
			true
		})
		.await?;
		Ok(())
	}

	async fn add_note(&self, id: &OrderId, content: &str) -> Result<(), OrderStoreError> {
		self.update(id, |order| {
			order.notes.push(OrderNote::new(content));
			true
		})
		.await?;
		Ok(())
	}

	async fn add_note_unless_present(
		&self,
		id: &OrderId,
		content: &str,
	) -> Result<bool, OrderStoreError> {
		self.update(id, |order| {
			if order.has_note_exact(content) {
				return false;
			}
			order.notes.push(OrderNote::new(content));
			true
		})
		.await
	}

	async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<(), OrderStoreError> {
		self.update(id, |order| {
			if order.status == status {
				return false;
			}
			order.status = status;
			true
		})
		.await?;
		Ok(())
	}

	async fn payment_complete(
		&self,
		id: &OrderId,
		transaction_id: &str,
	) -> Result<(), OrderStoreError> {
		self.update(id, |order| {
			if order.status.is_paid() {
				return false;
			}
			order.transaction_id = Some(transaction_id.to_string());
			order.status = OrderStatus::Processing;
			true
		})
		.await?;
		Ok(())
	}
}

/// Factory function for the storage-backed order store.
pub fn create_order_store(
	_config: &toml::Value,
	storage: Arc<StorageService>,
) -> Box<dyn OrderStoreInterface> {
	Box::new(StoredOrderStore::new(storage))
}
