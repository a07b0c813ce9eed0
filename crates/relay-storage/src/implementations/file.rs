//! One file per key under a base directory.
//!
//! Keys are percent-encoded into file names so `list_keys` can recover them.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

const EXTENSION: &str = "json";

fn backend(e: io::Error) -> StorageError {
	StorageError::Backend(e.to_string())
}

pub struct FileStorage {
	root: PathBuf,
}

impl FileStorage {
	/// The directory is created on first write.
	pub fn new(root: PathBuf) -> Self {
		Self { root }
	}

	fn path_for(&self, key: &str) -> PathBuf {
		self.root.join(format!("{}.{}", encode_key(key), EXTENSION))
	}
}

/// Escapes the characters that cannot appear in a file name.
fn encode_key(key: &str) -> String {
	let mut encoded = String::with_capacity(key.len());
	for c in key.chars() {
		match c {
			'%' => encoded.push_str("%25"),
			'/' => encoded.push_str("%2F"),
			':' => encoded.push_str("%3A"),
			'\\' => encoded.push_str("%5C"),
			_ => encoded.push(c),
		}
	}
	encoded
}

fn decode_key(name: &str) -> String {
	name.replace("%2F", "/")
		.replace("%3A", ":")
		.replace("%5C", "\\")
		.replace("%25", "%")
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		fs::read(self.path_for(key)).await.map_err(|e| match e.kind() {
			ErrorKind::NotFound => StorageError::NotFound,
			_ => backend(e),
		})
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		fs::create_dir_all(&self.root).await.map_err(backend)?;

		// Readers only ever see a complete file. Each write stages under its
		// own name so concurrent writers of one key never share a file.
		let path = self.path_for(key);
		let staging = path.with_extension(format!("{}.partial", Uuid::new_v4().simple()));
		fs::write(&staging, value).await.map_err(backend)?;
		fs::rename(&staging, &path).await.map_err(backend)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.path_for(key)).await {
			Err(e) if e.kind() != ErrorKind::NotFound => Err(backend(e)),
			_ => Ok(()),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.path_for(key)).await.map_err(backend)
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let mut dir = match fs::read_dir(&self.root).await {
			Ok(dir) => dir,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(backend(e)),
		};

		let mut keys = Vec::new();
		while let Some(entry) = dir.next_entry().await.map_err(backend)? {
			let path = entry.path();
			if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
				continue;
			}
			let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
				warn!("Skipping non UTF-8 storage file {:?}", path);
				continue;
			};
			let key = decode_key(stem);
			if key.starts_with(prefix) {
				keys.push(key);
			}
		}

		Ok(keys)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_key_encoding_is_reversible() {
		for key in ["nonces:0xabc", "a/b:c", "100%:x", "plain"] {
			assert_eq!(decode_key(&encode_key(key)), key);
			assert!(!encode_key(key).contains(':'));
			assert!(!encode_key(key).contains('/'));
		}
	}

	#[tokio::test]
	async fn test_file_storage_persists_across_instances() {
		let dir = tempfile::tempdir().unwrap();

		let storage = FileStorage::new(dir.path().to_path_buf());
		storage
			.set_bytes("nonces:0xabc", b"4".to_vec())
			.await
			.unwrap();
		storage
			.set_bytes("receipts:0x01", b"{}".to_vec())
			.await
			.unwrap();

		let reopened = FileStorage::new(dir.path().to_path_buf());
		assert_eq!(reopened.get_bytes("nonces:0xabc").await.unwrap(), b"4");
		assert!(reopened.exists("receipts:0x01").await.unwrap());
		assert_eq!(
			reopened.list_keys("nonces:").await.unwrap(),
			vec!["nonces:0xabc".to_string()]
		);

		reopened.delete("nonces:0xabc").await.unwrap();
		assert!(matches!(
			reopened.get_bytes("nonces:0xabc").await,
			Err(StorageError::NotFound)
		));
		// Deleting twice is fine
		reopened.delete("nonces:0xabc").await.unwrap();
	}

	#[tokio::test]
	async fn test_list_keys_on_missing_directory() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().join("missing"));
		assert!(storage.list_keys("").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_concurrent_writes_to_one_key() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		let writes = (0..16u8).map(|i| storage.set_bytes("receipts:0x01", vec![i; 64]));
		for result in futures::future::join_all(writes).await {
			result.unwrap();
		}

		let stored = storage.get_bytes("receipts:0x01").await.unwrap();
		assert_eq!(stored.len(), 64);
		assert!(stored.iter().all(|b| *b == stored[0]));

		let mut files = std::fs::read_dir(dir.path()).unwrap();
		assert!(files.next().is_some());
		assert!(files.next().is_none(), "staging files left behind");
	}
}
