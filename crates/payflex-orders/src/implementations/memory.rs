//! In-memory order store.
//!
//! Field updates go through `DashMap::get_mut`, so each one is atomic with
//! respect to concurrent callbacks and sweeps.

use crate::{OrderStoreError, OrderStoreInterface};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use payflex_storage::StorageService;
use payflex_types::{LocalOrder, OrderId, OrderNote, OrderQuery, OrderStatus};
use std::sync::Arc;

#[derive(Default)]
pub struct MemoryOrderStore {
	orders: DashMap<OrderId, LocalOrder>,
	emptied_carts: DashSet<OrderId>,
}

impl MemoryOrderStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn update<F, T>(&self, id: &OrderId, f: F) -> Result<T, OrderStoreError>
	where
		F: FnOnce(&mut LocalOrder) -> T,
	{
		let mut order = self
			.orders
			.get_mut(id)
			.ok_or_else(|| OrderStoreError::NotFound(id.clone()))?;
		Ok(f(order.value_mut()))
	}
}

#[async_trait]
impl OrderStoreInterface for MemoryOrderStore {
	async fn load(&self, id: &OrderId) -> Result<LocalOrder, OrderStoreError> {
		self.orders
			.get(id)
			.map(|order| order.value().clone())
			.ok_or_else(|| OrderStoreError::NotFound(id.clone()))
	}

	async fn find_by_key(&self, order_key: &str) -> Result<Option<LocalOrder>, OrderStoreError> {
		Ok(self
			.orders
			.iter()
			.find(|entry| entry.value().order_key == order_key)
			.map(|entry| entry.value().clone()))
	}

	async fn save(&self, order: &LocalOrder) -> Result<(), OrderStoreError> {
		self.orders.insert(order.id.clone(), order.clone());
		Ok(())
	}

	async fn query(&self, query: &OrderQuery) -> Result<Vec<LocalOrder>, OrderStoreError> {
		let mut orders: Vec<LocalOrder> = self
			.orders
			.iter()
			.filter(|entry| query.matches(entry.value()))
			.map(|entry| entry.value().clone())
			.collect();
		orders.sort_by_key(|order| order.created_at);
		Ok(orders)
	}

	async fn empty_cart(&self, id: &OrderId) -> Result<(), OrderStoreError> {
		self.emptied_carts.insert(id.clone());
		Ok(())
	}

	async fn cart_emptied(&self, id: &OrderId) -> Result<bool, OrderStoreError> {
		Ok(self.emptied_carts.contains(id))
	}

	async fn set_meta(&self, id: &OrderId, key: &str, value: &str) -> Result<(), OrderStoreError> {
		self.update(id, |order| {
			order.meta.insert(key.to_string(), value.to_string());
		})
	}

	async fn add_note(&self, id: &OrderId, content: &str) -> Result<(), OrderStoreError> {
		self.update(id, |order| order.notes.push(OrderNote::new(content)))
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
	}

	async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<(), OrderStoreError> {
		self.update(id, |order| order.status = status)
	}

	async fn payment_complete(
		&self,
		id: &OrderId,
		transaction_id: &str,
	) -> Result<(), OrderStoreError> {
		self.update(id, |order| {
			if !order.status.is_paid() {
				order.transaction_id = Some(transaction_id.to_string());
				order.status = OrderStatus::Processing;
			}
		})
	}
}

/// Factory function for the memory order store. It takes no options.
pub fn create_order_store(
	_config: &toml::Value,
	_storage: Arc<StorageService>,
) -> Box<dyn OrderStoreInterface> {
	Box::new(MemoryOrderStore::new())
}
