//! In-process storage backend.
//!
//! Entries live in a `DashMap` and are dropped lazily when read after their
//! expiry.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn is_live(&self, now: Instant) -> bool {
		self.expires_at.map_or(true, |at| now < at)
	}
}

#[derive(Default)]
pub struct MemoryStorage {
	entries: DashMap<String, Entry>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let now = Instant::now();
		if let Some(entry) = self.entries.get(key) {
			if entry.is_live(now) {
				return Ok(entry.value.clone());
			}
		}
		self.entries.remove_if(key, |_, entry| !entry.is_live(now));
		Err(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let expires_at = ttl.map(|ttl| Instant::now() + ttl);
		self.entries
			.insert(key.to_string(), Entry { value, expires_at });
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.entries.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self
			.entries
			.get(key)
			.is_some_and(|entry| entry.is_live(Instant::now())))
	}
}

/// Factory function for the memory backend. It takes no options.
pub fn create_storage(_config: &toml::Value) -> Box<dyn StorageInterface> {
	Box::new(MemoryStorage::new())
}
