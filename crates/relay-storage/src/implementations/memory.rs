//! Process-local backend. Nothing survives a restart.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryStorage {
	data: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		match self.data.get(key) {
			Some(entry) => Ok(entry.value().clone()),
			None => Err(StorageError::NotFound),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.data.insert(key.to_string(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let _ = self.data.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.data.contains_key(key))
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let mut keys = Vec::new();
		for entry in self.data.iter() {
			if entry.key().starts_with(prefix) {
				keys.push(entry.key().clone());
			}
		}
		Ok(keys)
	}
}
