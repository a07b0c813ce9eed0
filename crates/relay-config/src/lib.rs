//! Configuration loading for the meta-transaction relay.
//!
//! Configuration is read once at startup from a TOML, JSON or YAML file,
//! with `${VAR}` placeholders substituted from the environment, a small set
//! of `RELAY_` prefixed overrides applied, and the forwarder address resolved
//! from the deployment output when configured that way. The result is an
//! immutable [`Config`] handed to every component.

use regex::Regex;
use relay_types::ForwarderDomain;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use zeroize::Zeroizing;

mod serde_helpers;
mod types;

pub use serde_helpers::PrivateKey;
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
	Toml,
	Json,
	Yaml,
}

impl ConfigFormat {
	/// Picks the format from the file extension.
	pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
		match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Ok(ConfigFormat::Toml),
			Some("json") => Ok(ConfigFormat::Json),
			Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
			_ => Err(ConfigError::ParseError(format!(
				"Unsupported config format: {:?}",
				path
			))),
		}
	}
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<PathBuf>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "RELAY_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_path_buf());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	/// Loads, resolves and validates the configuration file.
	pub async fn load(&self) -> Result<Config, ConfigError> {
		let file_path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;
		info!("Loading configuration from {:?}", file_path);

		let content = match tokio::fs::read_to_string(file_path).await {
			Ok(content) => Zeroizing::new(content),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(ConfigError::FileNotFound(file_path.display().to_string()))
			}
			Err(e) => return Err(e.into()),
		};

		let format = ConfigFormat::from_path(file_path)?;
		let mut config = self.parse(&content, format)?;

		self.apply_env_overrides(&mut config)?;

		let base_dir = file_path.parent().unwrap_or_else(|| Path::new("."));
		resolve_deployment(&mut config, base_dir).await?;

		validate_config(&config)?;
		Ok(config)
	}

	/// Parses configuration text after substituting environment variables.
	///
	/// Does not apply overrides, resolve the deployment file, or validate.
	pub fn parse(&self, content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
		let substituted = self.substitute_env_vars(content)?;

		match format {
			ConfigFormat::Toml => toml::from_str(&substituted)
				.map_err(|e| ConfigError::ParseError(format!("Failed to parse TOML: {}", e))),
			ConfigFormat::Json => serde_json::from_str(&substituted)
				.map_err(|e| ConfigError::ParseError(format!("Failed to parse JSON: {}", e))),
			ConfigFormat::Yaml => serde_yaml::from_str(&substituted)
				.map_err(|e| ConfigError::ParseError(format!("Failed to parse YAML: {}", e))),
		}
	}

	fn substitute_env_vars(&self, content: &str) -> Result<Zeroizing<String>, ConfigError> {
		let mut result = Zeroizing::new(content.to_string());

		// Find and replace ${VAR_NAME} patterns
		let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = Zeroizing::new(
				env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?,
			);

			result = Zeroizing::new(result.replace(full_match, &env_value));
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.relay.log_level = log_level;
		}

		if let Ok(api_port) = env::var(format!("{}API_PORT", self.env_prefix)) {
			config.api.port = api_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid API port: {}", e)))?;
		}

		if let Ok(rpc_url) = env::var(format!("{}RPC_URL", self.env_prefix)) {
			debug!("Overriding RPC URL from environment");
			config.network.rpc_url = rpc_url;
		}

		if let Ok(key) = env::var(format!("{}PRIVATE_KEY", self.env_prefix)) {
			debug!("Overriding private key from environment");
			config.account.private_key = PrivateKey::new(key);
		}

		Ok(())
	}
}

impl Config {
	/// Returns the signing domain for forward requests.
	///
	/// Fails if the forwarder address has not been resolved.
	pub fn forwarder_domain(&self) -> Result<ForwarderDomain, ConfigError> {
		let address = self.forwarder.address.ok_or_else(|| {
			ConfigError::ValidationError("Forwarder address is not resolved".to_string())
		})?;

		Ok(ForwarderDomain {
			name: self.forwarder.domain_name.clone(),
			version: self.forwarder.domain_version.clone(),
			chain_id: self.network.chain_id,
			address,
		})
	}
}

/// Reads the forwarder address from the deployment output file, if one is
/// configured. Relative paths are resolved against `base_dir`.
pub async fn resolve_deployment(config: &mut Config, base_dir: &Path) -> Result<(), ConfigError> {
	let Some(deployment_file) = config.forwarder.deployment_file.clone() else {
		return Ok(());
	};

	if config.forwarder.address.is_some() {
		return Err(ConfigError::ValidationError(
			"Set either forwarder.address or forwarder.deployment_file, not both".to_string(),
		));
	}

	let path = if deployment_file.is_absolute() {
		deployment_file
	} else {
		base_dir.join(deployment_file)
	};

	let content = tokio::fs::read_to_string(&path)
		.await
		.map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;
	let manifest: DeploymentManifest = serde_json::from_str(&content)
		.map_err(|e| ConfigError::ParseError(format!("Invalid deployment file: {}", e)))?;

	if manifest.chain_id != config.network.chain_id {
		return Err(ConfigError::ValidationError(format!(
			"Deployment file is for chain {}, relay is configured for chain {}",
			manifest.chain_id, config.network.chain_id
		)));
	}

	let address = manifest
		.contracts
		.get(&config.forwarder.contract_name)
		.copied()
		.ok_or_else(|| {
			ConfigError::ValidationError(format!(
				"Contract '{}' not found in deployment file",
				config.forwarder.contract_name
			))
		})?;

	info!(forwarder = %address, "Resolved forwarder from deployment file");
	config.forwarder.address = Some(address);
	Ok(())
}

/// Validates a resolved configuration.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
	let url = &config.network.rpc_url;
	if !(url.starts_with("http://") || url.starts_with("https://")) {
		return Err(ConfigError::ValidationError(
			"RPC URL must start with http:// or https://".to_string(),
		));
	}

	if config.network.chain_id == 0 {
		return Err(ConfigError::ValidationError(
			"Chain ID must be non-zero".to_string(),
		));
	}

	match config.forwarder.address {
		None => {
			return Err(ConfigError::ValidationError(
				"Forwarder address is required (inline or via deployment_file)".to_string(),
			))
		}
		Some(address) if address.is_zero() => {
			return Err(ConfigError::ValidationError(
				"Forwarder address must not be the zero address".to_string(),
			))
		}
		Some(_) => {}
	}

	let key = config.account.private_key.expose();
	let key_without_prefix = key.strip_prefix("0x").unwrap_or(key);
	if key_without_prefix.len() != 64 || hex::decode(key_without_prefix).is_err() {
		return Err(ConfigError::ValidationError(
			"Private key must be 64 hex characters (32 bytes)".to_string(),
		));
	}

	let gas = &config.gas;
	if gas.default_limit == 0 {
		return Err(ConfigError::ValidationError(
			"gas.default_limit must be greater than zero".to_string(),
		));
	}
	if gas.default_limit > gas.max_limit {
		return Err(ConfigError::ValidationError(format!(
			"gas.default_limit ({}) exceeds gas.max_limit ({})",
			gas.default_limit, gas.max_limit
		)));
	}

	let confirmation = &config.confirmation;
	if confirmation.confirmations == 0 {
		return Err(ConfigError::ValidationError(
			"confirmation.confirmations must be at least 1".to_string(),
		));
	}
	if confirmation.timeout_seconds == 0 || confirmation.poll_interval_ms == 0 {
		return Err(ConfigError::ValidationError(
			"confirmation timeout and poll interval must be non-zero".to_string(),
		));
	}

	Ok(())
}
