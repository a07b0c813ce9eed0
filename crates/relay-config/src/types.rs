//! Configuration types for the relay.

use crate::serde_helpers::PrivateKey;
use relay_types::Address;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete relay configuration.
///
/// Loaded once at startup and shared read-only by every component.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Relay identity and logging
	pub relay: RelaySettings,
	/// Network connection
	pub network: NetworkConfig,
	/// Forwarder contract and signing domain
	pub forwarder: ForwarderConfig,
	/// Relay operator credential
	pub account: AccountConfig,
	/// Gas policy
	#[serde(default)]
	pub gas: GasConfig,
	/// Confirmation tracking
	#[serde(default)]
	pub confirmation: ConfirmationConfig,
	/// Nonce and receipt persistence
	#[serde(default)]
	pub storage: StorageConfig,
	/// HTTP API
	#[serde(default)]
	pub api: ApiConfig,
}

/// Relay identity settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelaySettings {
	/// Relay name for logging and health output
	pub name: String,
	/// Log filter used when `RUST_LOG` is not set
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

/// Network connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	/// HTTP JSON-RPC endpoint
	pub rpc_url: String,
	/// Chain the relay submits to and binds signatures to
	pub chain_id: u64,
}

/// Forwarder contract settings.
///
/// The address comes either inline or from the deployment output file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwarderConfig {
	/// Forwarder contract address
	#[serde(default)]
	pub address: Option<Address>,
	/// Deployment output file to read the address from
	#[serde(default)]
	pub deployment_file: Option<PathBuf>,
	/// Contract name to look up in the deployment file
	#[serde(default = "default_contract_name")]
	pub contract_name: String,
	/// EIP-712 domain name
	#[serde(default = "default_domain_name")]
	pub domain_name: String,
	/// EIP-712 domain version
	#[serde(default = "default_domain_version")]
	pub domain_version: String,
}

/// Relay operator credential
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	/// Hex-encoded secp256k1 private key
	pub private_key: PrivateKey,
}

/// Gas policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GasConfig {
	/// Gas limit used when the request asks for none, zero, or too much
	#[serde(default = "default_gas_limit")]
	pub default_limit: u64,
	/// Highest gas limit a request may ask for
	#[serde(default = "default_max_gas_limit")]
	pub max_limit: u64,
	/// Fixed gas price in wei; the network's price is used when unset
	#[serde(default)]
	pub gas_price_wei: Option<u64>,
	/// Largest call data accepted for forwarding
	#[serde(default = "default_max_call_data_bytes")]
	pub max_call_data_bytes: usize,
}

impl Default for GasConfig {
	fn default() -> Self {
		Self {
			default_limit: default_gas_limit(),
			max_limit: default_max_gas_limit(),
			gas_price_wei: None,
			max_call_data_bytes: default_max_call_data_bytes(),
		}
	}
}

/// Confirmation tracking settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfirmationConfig {
	/// Blocks that must be mined on top of the inclusion block, counting it
	#[serde(default = "default_confirmations")]
	pub confirmations: u64,
	/// Wall-clock budget for waiting on a receipt
	#[serde(default = "default_timeout_seconds")]
	pub timeout_seconds: u64,
	/// Delay between receipt polls
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// How long settled receipts are kept before they are forgotten
	#[serde(default = "default_receipt_retention_seconds")]
	pub receipt_retention_seconds: u64,
}

impl ConfirmationConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_seconds)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn receipt_retention(&self) -> Duration {
		Duration::from_secs(self.receipt_retention_seconds)
	}
}

impl Default for ConfirmationConfig {
	fn default() -> Self {
		Self {
			confirmations: default_confirmations(),
			timeout_seconds: default_timeout_seconds(),
			poll_interval_ms: default_poll_interval_ms(),
			receipt_retention_seconds: default_receipt_retention_seconds(),
		}
	}
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
	Memory,
	File,
}

/// Persistence settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	#[serde(default = "default_storage_backend")]
	pub backend: StorageBackend,
	/// Base directory for the file backend
	#[serde(default = "default_storage_path")]
	pub path: PathBuf,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			backend: default_storage_backend(),
			path: default_storage_path(),
		}
	}
}

/// HTTP API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			host: default_api_host(),
			port: default_api_port(),
		}
	}
}

/// Contract addresses published by the deployment script.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeploymentManifest {
	pub chain_id: u64,
	pub contracts: std::collections::HashMap<String, Address>,
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_contract_name() -> String {
	"TrustedForwarder".to_string()
}

fn default_domain_name() -> String {
	"TrustedForwarder".to_string()
}

fn default_domain_version() -> String {
	"1".to_string()
}

fn default_gas_limit() -> u64 {
	800_000
}

fn default_max_gas_limit() -> u64 {
	2_000_000
}

fn default_max_call_data_bytes() -> usize {
	128 * 1024
}

fn default_confirmations() -> u64 {
	1
}

fn default_timeout_seconds() -> u64 {
	60
}

fn default_poll_interval_ms() -> u64 {
	1_000
}

fn default_receipt_retention_seconds() -> u64 {
	7 * 24 * 60 * 60
}

fn default_storage_backend() -> StorageBackend {
	StorageBackend::Memory
}

fn default_storage_path() -> PathBuf {
	PathBuf::from("./data/relay")
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}
