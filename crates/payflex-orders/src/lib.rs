//! Order store for the Payflex gateway.
//!
//! The order store stands in for the host commerce platform's order
//! records. The gateway never owns orders: it reads the fields it needs to
//! build a remote order and writes back status, transaction reference,
//! metadata and notes. Backends implement `OrderStoreInterface`; the
//! `OrderStore` service adds the conveniences the reconciliation paths rely
//! on, such as notes that are only written once.

use async_trait::async_trait;
use payflex_types::{LocalOrder, OrderId, OrderNote, OrderQuery, OrderStatus};
use thiserror::Error;
use tracing::debug;

pub mod implementations {
	pub mod memory;
	pub mod stored;
}

#[derive(Debug, Error)]
pub enum OrderStoreError {
	#[error("Order not found: {0}")]
	NotFound(OrderId),
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid order: {0}")]
	Invalid(String),
}

impl From<payflex_storage::StorageError> for OrderStoreError {
	fn from(err: payflex_storage::StorageError) -> Self {
		OrderStoreError::Storage(err.to_string())
	}
}

/// Operations the gateway needs from the host platform's order storage.
///
/// Backends provide record access; field-level operations have default
/// implementations on top of `load` and `save`.
#[async_trait]
pub trait OrderStoreInterface: Send + Sync {
	async fn load(&self, id: &OrderId) -> Result<LocalOrder, OrderStoreError>;

	/// Finds an order by its secret order key.
	async fn find_by_key(&self, order_key: &str) -> Result<Option<LocalOrder>, OrderStoreError>;

	/// Creates or replaces an order record.
	async fn save(&self, order: &LocalOrder) -> Result<(), OrderStoreError>;

	async fn query(&self, query: &OrderQuery) -> Result<Vec<LocalOrder>, OrderStoreError>;

	/// Clears the shopper's cart after a successful payment.
	async fn empty_cart(&self, id: &OrderId) -> Result<(), OrderStoreError>;

	/// Whether `empty_cart` has run for this order.
	async fn cart_emptied(&self, id: &OrderId) -> Result<bool, OrderStoreError>;

	async fn get_meta(&self, id: &OrderId, key: &str) -> Result<Option<String>, OrderStoreError> {
		Ok(self.load(id).await?.meta.get(key).cloned())
	}

	async fn set_meta(&self, id: &OrderId, key: &str, value: &str) -> Result<(), OrderStoreError> {
		let mut order = self.load(id).await?;
		order.meta.insert(key.to_string(), value.to_string());
		self.save(&order).await
	}

	async fn add_note(&self, id: &OrderId, content: &str) -> Result<(), OrderStoreError> {
		let mut order = self.load(id).await?;
		order.notes.push(OrderNote::new(content));
		self.save(&order).await
	}

	/// Appends `content` unless a note with exactly the same content exists.
	/// Returns whether the note was added.
	async fn add_note_unless_present(
		&self,
		id: &OrderId,
		content: &str,
	) -> Result<bool, OrderStoreError> {
		let mut order = self.load(id).await?;
		if order.has_note_exact(content) {
			return Ok(false);
		}
		order.notes.push(OrderNote::new(content));
		self.save(&order).await?;
		Ok(true)
	}

	async fn notes(&self, id: &OrderId) -> Result<Vec<OrderNote>, OrderStoreError> {
		Ok(self.load(id).await?.notes)
	}

	async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<(), OrderStoreError> {
		let mut order = self.load(id).await?;
		if order.status == status {
			return Ok(());
		}
		order.status = status;
		self.save(&order).await
	}

	/// Marks the order paid. Orders already processing or completed are left untouched.
	async fn payment_complete(
		&self,
		id: &OrderId,
		transaction_id: &str,
	) -> Result<(), OrderStoreError> {
		let mut order = self.load(id).await?;
		if order.status.is_paid() {
			return Ok(());
		}
		order.transaction_id = Some(transaction_id.to_string());
		order.status = OrderStatus::Processing;
		self.save(&order).await
	}
}

/// Order store service used by the gateway components.
pub struct OrderStore {
	backend: Box<dyn OrderStoreInterface>,
}

impl OrderStore {
	pub fn new(backend: Box<dyn OrderStoreInterface>) -> Self {
		Self { backend }
	}

	pub async fn load(&self, id: &OrderId) -> Result<LocalOrder, OrderStoreError> {
		self.backend.load(id).await
	}

	pub async fn find_by_key(&self, order_key: &str) -> Result<Option<LocalOrder>, OrderStoreError> {
		self.backend.find_by_key(order_key).await
	}

	pub async fn save(&self, order: &LocalOrder) -> Result<(), OrderStoreError> {
		if order.id.as_str().is_empty() {
			return Err(OrderStoreError::Invalid("order id is empty".into()));
		}
		self.backend.save(order).await
	}

	pub async fn query(&self, query: &OrderQuery) -> Result<Vec<LocalOrder>, OrderStoreError> {
		self.backend.query(query).await
	}

	/// Metadata value for `key`; an empty string counts as absent.
	pub async fn meta(&self, id: &OrderId, key: &str) -> Result<Option<String>, OrderStoreError> {
		Ok(self
			.backend
			.get_meta(id, key)
			.await?
			.filter(|value| !value.is_empty()))
	}

	pub async fn set_meta(&self, id: &OrderId, key: &str, value: &str) -> Result<(), OrderStoreError> {
		self.backend.set_meta(id, key, value).await
	}

	pub async fn add_note(&self, id: &OrderId, content: &str) -> Result<(), OrderStoreError> {
		debug!(order_id = %id, note = content, "Adding order note");
		self.backend.add_note(id, content).await
	}

	pub async fn notes(&self, id: &OrderId) -> Result<Vec<OrderNote>, OrderStoreError> {
		self.backend.notes(id).await
	}

	/// Whether any note on the order contains `fragment`.
	pub async fn has_note(&self, id: &OrderId, fragment: &str) -> Result<bool, OrderStoreError> {
		Ok(self
			.backend
			.notes(id)
			.await?
			.iter()
			.any(|note| note.content.contains(fragment)))
	}

	/// Adds `content` unless a byte-identical note already exists. Returns whether it was added.
	pub async fn add_note_once(&self, id: &OrderId, content: &str) -> Result<bool, OrderStoreError> {
		let added = self.backend.add_note_unless_present(id, content).await?;
		if added {
			debug!(order_id = %id, note = content, "Adding order note");
		}
		Ok(added)
	}

	pub async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<(), OrderStoreError> {
		debug!(order_id = %id, %status, "Updating order status");
		self.backend.update_status(id, status).await
	}

	pub async fn payment_complete(&self, id: &OrderId, transaction_id: &str) -> Result<(), OrderStoreError> {
		self.backend.payment_complete(id, transaction_id).await
	}

	pub async fn empty_cart(&self, id: &OrderId) -> Result<(), OrderStoreError> {
		self.backend.empty_cart(id).await
	}

	pub async fn cart_emptied(&self, id: &OrderId) -> Result<bool, OrderStoreError> {
		self.backend.cart_emptied(id).await
	}
}


#[cfg(test)]
mod tests {
	use super::implementations::memory::MemoryOrderStore;
	use super::test_fixtures::order;
	use super::*;

	fn store() -> OrderStore {
		OrderStore::new(Box::new(MemoryOrderStore::new()))
	}

	#[tokio::test]
	async fn test_add_note_once_is_idempotent() {
		let store = store();
		store.save(&order("1")).await.unwrap();
		let id = OrderId::from("1");

		assert!(store.add_note_once(&id, "Payment approved.").await.unwrap());
		assert!(!store.add_note_once(&id, "Payment approved.").await.unwrap());
		assert_eq!(store.notes(&id).await.unwrap().len(), 1);
		assert!(store.has_note(&id, "approved").await.unwrap());
	}

	#[tokio::test]
	async fn test_add_note_once_matches_whole_content() {
		let store = store();
		store.save(&order("1")).await.unwrap();
		let id = OrderId::from("1");

		let earlier = "Payment checked via CRON. Order Declined. Payflex order ID: R10";
		let later = "Payment checked via CRON. Order Declined. Payflex order ID: R1";
		assert!(store.add_note_once(&id, earlier).await.unwrap());
		assert!(store.add_note_once(&id, later).await.unwrap());
		assert!(!store.add_note_once(&id, later).await.unwrap());

		let notes = store.notes(&id).await.unwrap();
		assert_eq!(notes.len(), 2);
		assert_eq!(notes[1].content, later);
	}

	#[tokio::test]
	async fn test_empty_meta_reads_as_absent() {
		let store = store();
		store.save(&order("1")).await.unwrap();
		let id = OrderId::from("1");

		store.set_meta(&id, "_payflex_order_id", "").await.unwrap();
		assert_eq!(store.meta(&id, "_payflex_order_id").await.unwrap(), None);
		store.set_meta(&id, "_payflex_order_id", "R1").await.unwrap();
		assert_eq!(
			store.meta(&id, "_payflex_order_id").await.unwrap().as_deref(),
			Some("R1")
		);
	}

	#[tokio::test]
	async fn test_payment_complete_skips_paid_orders() {
		let store = store();
		store.save(&order("1")).await.unwrap();
		let id = OrderId::from("1");

		store.payment_complete(&id, "R1").await.unwrap();
		store.payment_complete(&id, "R2").await.unwrap();

		let loaded = store.load(&id).await.unwrap();
		assert_eq!(loaded.status, OrderStatus::Processing);
		assert_eq!(loaded.transaction_id.as_deref(), Some("R1"));
	}

	#[tokio::test]
	async fn test_missing_order() {
		let store = store();
		let result = store.load(&OrderId::from("404")).await;
		assert!(matches!(result, Err(OrderStoreError::NotFound(_))));
	}
}
