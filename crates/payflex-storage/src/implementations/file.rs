//! File-based storage backend.
//!
//! Each key maps to a `.bin` file under the base directory. Entries written
//! with a TTL get a sibling `.expiry` file holding the expiry as a unix
//! timestamp in milliseconds.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}

	fn expiry_path(&self, key: &str) -> PathBuf {
		self.get_file_path(key).with_extension("expiry")
	}

	async fn write_atomic(path: &PathBuf, value: &[u8]) -> Result<(), StorageError> {
		let mut temp_path = path.as_os_str().to_owned();
		temp_path.push(".tmp");
		let temp_path = PathBuf::from(temp_path);
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn remove_if_present(path: &PathBuf) -> Result<(), StorageError> {
		match fs::remove_file(path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	/// Whether the entry for `key` carries an expiry that has passed.
	async fn is_expired(&self, key: &str) -> Result<bool, StorageError> {
		match fs::read_to_string(self.expiry_path(key)).await {
			Ok(raw) => {
				let expires_at: i64 = raw
					.trim()
					.parse()
					.map_err(|_| StorageError::Backend(format!("Corrupt expiry for {}", key)))?;
				Ok(Utc::now().timestamp_millis() >= expires_at)
			}
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		if self.is_expired(key).await? {
			debug!(key, "Dropping expired entry");
			self.delete(key).await?;
			return Err(StorageError::NotFound);
		}

		match fs::read(self.get_file_path(key)).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let expiry_path = self.expiry_path(key);
		match ttl {
			Some(ttl) => {
				let expires_at = Utc::now().timestamp_millis() + ttl.as_millis() as i64;
				Self::write_atomic(&expiry_path, expires_at.to_string().as_bytes()).await?;
			}
			None => Self::remove_if_present(&expiry_path).await?,
		}

		Self::write_atomic(&self.get_file_path(key), &value).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		Self::remove_if_present(&self.get_file_path(key)).await?;
		Self::remove_if_present(&self.expiry_path(key)).await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		if self.is_expired(key).await? {
			return Ok(false);
		}
		Ok(self.get_file_path(key).exists())
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Box<dyn StorageInterface> {
	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage")
		.to_string();

	Box::new(FileStorage::new(PathBuf::from(storage_path)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_persists_and_deletes() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		storage
			.set_bytes("orders:42", b"{}".to_vec(), None)
			.await
			.unwrap();
		assert!(dir.path().join("orders_42.bin").exists());
		assert_eq!(storage.get_bytes("orders:42").await.unwrap(), b"{}".to_vec());

		storage.delete("orders:42").await.unwrap();
		assert!(matches!(
			storage.get_bytes("orders:42").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_ttl_is_honoured() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		storage
			.set_bytes("provider:access_token", b"t".to_vec(), Some(Duration::from_millis(30)))
			.await
			.unwrap();
		assert!(storage.exists("provider:access_token").await.unwrap());

		tokio::time::sleep(Duration::from_millis(60)).await;
		assert!(!storage.exists("provider:access_token").await.unwrap());
		assert!(matches!(
			storage.get_bytes("provider:access_token").await,
			Err(StorageError::NotFound)
		));
		assert!(!dir.path().join("provider_access_token.expiry").exists());
	}

	#[tokio::test]
	async fn test_rewrite_without_ttl_clears_expiry() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		storage
			.set_bytes("k", b"1".to_vec(), Some(Duration::from_millis(1)))
			.await
			.unwrap();
		storage.set_bytes("k", b"2".to_vec(), None).await.unwrap();
		tokio::time::sleep(Duration::from_millis(10)).await;

		assert_eq!(storage.get_bytes("k").await.unwrap(), b"2".to_vec());
	}
}
