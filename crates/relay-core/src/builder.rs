//! Assembles a [`RelayEngine`] from configuration.

use crate::{EngineError, EventBus, RelayEngine, RelayInfo};
use relay_account::{implementations::local::create_account, AccountInterface};
use relay_builder::TransactionBuilder;
use relay_config::Config;
use relay_delivery::{implementations::alloy::AlloyNetwork, NetworkInterface, Submitter};
use relay_nonce::ReplayGuard;
use relay_storage::{create_storage, StorageService};
use relay_verifier::SignatureVerifier;
use std::sync::Arc;
use tracing::info;

const EVENT_BUS_CAPACITY: usize = 1000;

/// Builder for the relay engine.
///
/// Consumes the configuration; the operator key it holds is wiped when the
/// builder finishes, whether or not the build succeeds.
pub struct RelayBuilder {
	config: Config,
	network: Option<Arc<dyn NetworkInterface>>,
	account: Option<Arc<dyn AccountInterface>>,
}

impl RelayBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			network: None,
			account: None,
		}
	}

	/// Uses `network` instead of connecting to the configured RPC URL.
	pub fn with_network(mut self, network: Arc<dyn NetworkInterface>) -> Self {
		self.network = Some(network);
		self
	}

	/// Uses `account` instead of the configured private key.
	pub fn with_account(mut self, account: Arc<dyn AccountInterface>) -> Self {
		self.account = Some(account);
		self
	}

	pub async fn build(self) -> Result<RelayEngine, EngineError> {
		let config = self.config;

		let account: Arc<dyn AccountInterface> = match self.account {
			Some(account) => account,
			None => Arc::from(create_account(&config.account)?),
		};

		let network: Arc<dyn NetworkInterface> = match self.network {
			Some(network) => network,
			None => Arc::new(AlloyNetwork::new(&config.network.rpc_url)?),
		};

		let actual = network.chain_id().await?;
		if actual != config.network.chain_id {
			return Err(EngineError::ChainMismatch {
				expected: config.network.chain_id,
				actual,
			});
		}

		let domain = config.forwarder_domain()?;
		let storage = Arc::new(StorageService::new(create_storage(&config.storage)));

		let replay_guard = ReplayGuard::new(storage.clone());
		let nonces = replay_guard
			.load()
			.await
			.map_err(|e| EngineError::Storage(e.to_string()))?;

		let submitter = Submitter::new(network, account.clone(), config.confirmation.clone())
			.with_gas_price(config.gas.gas_price_wei)
			.with_storage(storage);
		let receipts = submitter
			.load()
			.await
			.map_err(|e| EngineError::Storage(e.to_string()))?;

		let info = RelayInfo {
			name: config.relay.name.clone(),
			chain_id: config.network.chain_id,
			forwarder: domain.address,
			operator: account.address(),
		};

		info!(
			relay = %info.name,
			chain_id = info.chain_id,
			forwarder = %info.forwarder,
			operator = %info.operator,
			nonces,
			receipts,
			"Relay engine ready"
		);

		Ok(RelayEngine::new(
			info,
			SignatureVerifier::new(domain.clone()),
			replay_guard,
			TransactionBuilder::new(domain.address, domain.chain_id, config.gas.clone()),
			submitter,
			EventBus::new(EVENT_BUS_CAPACITY),
		))
	}
}
