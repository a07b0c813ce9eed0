//! Durable key-value state for the relay.
//!
//! Per-user nonces and relay receipts live here, namespaced as
//! `<namespace>:<id>` and encoded as JSON.

use async_trait::async_trait;
use relay_config::{StorageBackend, StorageConfig};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Key not found")]
	NotFound,
	#[error("Could not encode or decode value: {0}")]
	Serialization(String),
	#[error("Storage backend failed: {0}")]
	Backend(String),
}

/// Raw byte store behind [`StorageService`].
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Returns [`StorageError::NotFound`] for a missing key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Removing a missing key succeeds.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

fn storage_key(namespace: &str, id: &str) -> String {
	format!("{namespace}:{id}")
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// JSON-typed view over a [`StorageInterface`].
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		value: &T,
	) -> Result<(), StorageError> {
		self.backend
			.set_bytes(&storage_key(namespace, id), encode(value)?)
			.await
	}

	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		decode(&self.backend.get_bytes(&storage_key(namespace, id)).await?)
	}

	/// Every `(id, value)` pair stored under `namespace`.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<(String, T)>, StorageError> {
		let prefix = storage_key(namespace, "");
		let keys = self.backend.list_keys(&prefix).await?;
		let mut values = Vec::with_capacity(keys.len());

		for key in keys {
			match self.backend.get_bytes(&key).await {
				Ok(bytes) => {
					let id = key.strip_prefix(&prefix).unwrap_or(&key).to_string();
					values.push((id, decode(&bytes)?));
				}
				// Removed after listing.
				Err(StorageError::NotFound) => {}
				Err(e) => return Err(e),
			}
		}

		Ok(values)
	}

	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&storage_key(namespace, id)).await
	}

	pub async fn contains(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&storage_key(namespace, id)).await
	}
}

/// Picks the backend named in `[storage]`.
pub fn create_storage(config: &StorageConfig) -> Box<dyn StorageInterface> {
	match config.backend {
		StorageBackend::Memory => Box::new(implementations::memory::MemoryStorage::new()),
		StorageBackend::File => Box::new(implementations::file::FileStorage::new(
			config.path.clone(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;

	#[tokio::test]
	async fn test_typed_round_trip_and_namespaces() {
		let service = StorageService::new(Box::new(MemoryStorage::new()));

		service.store("nonces", "alice", &3u64).await.unwrap();
		service.store("nonces", "bob", &7u64).await.unwrap();
		service.store("receipts", "0x01", &"pending").await.unwrap();

		let alice: u64 = service.retrieve("nonces", "alice").await.unwrap();
		assert_eq!(alice, 3);

		let mut all: Vec<(String, u64)> = service.retrieve_all("nonces").await.unwrap();
		all.sort();
		assert_eq!(all, vec![("alice".to_string(), 3), ("bob".to_string(), 7)]);

		service.remove("nonces", "alice").await.unwrap();
		assert!(!service.contains("nonces", "alice").await.unwrap());
		assert!(matches!(
			service.retrieve::<u64>("nonces", "alice").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_wrong_type_is_serialization_error() {
		let service = StorageService::new(Box::new(MemoryStorage::new()));
		service.store("receipts", "x", &"text").await.unwrap();

		assert!(matches!(
			service.retrieve::<u64>("receipts", "x").await,
			Err(StorageError::Serialization(_))
		));
	}
}
