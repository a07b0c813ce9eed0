//! Transaction delivery for the relay.
//!
//! This crate signs forwarder transactions with the operator account,
//! broadcasts them, and tracks them until they are mined. Chain access goes
//! through [`NetworkInterface`] so the submitter can run against a live node
//! or the scripted mock network.

use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use dashmap::DashMap;
use relay_account::AccountInterface;
use relay_config::ConfirmationConfig;
use relay_storage::{StorageError, StorageService};
use relay_types::{
	truncate_hash, Address, Bytes, ExecutionOutcome, RelayReceipt, TransactionDraft, TxHash,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Re-export implementations
pub mod implementations {
	pub mod alloy;
	#[cfg(any(test, feature = "mock"))]
	pub mod mock;
}

/// Storage namespace holding tracked transactions.
pub const RECEIPT_NAMESPACE: &str = "receipts";

/// Errors reported by a network backend.
#[derive(Debug, Error)]
pub enum NetworkError {
	#[error("RPC error: {0}")]
	Rpc(String),
	#[error("Invalid RPC URL: {0}")]
	InvalidUrl(String),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
	/// Signing or broadcast failed; nothing reached the network.
	#[error("Submission failed: {0}")]
	Submission(String),
	#[error("Unknown transaction {0}")]
	UnknownTransaction(TxHash),
	#[error("Network error: {0}")]
	Network(#[from] NetworkError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// The parts of a mined transaction's receipt the relay cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainReceipt {
	pub block_number: u64,
	pub gas_used: u64,
	pub success: bool,
}

/// Chain access used by the submitter.
#[async_trait]
pub trait NetworkInterface: Send + Sync {
	async fn chain_id(&self) -> Result<u64, NetworkError>;

	async fn block_number(&self) -> Result<u64, NetworkError>;

	/// Current gas price in wei.
	async fn gas_price(&self) -> Result<u128, NetworkError>;

	/// Transaction count of `address` including pending transactions.
	async fn transaction_count(&self, address: Address) -> Result<u64, NetworkError>;

	/// Broadcasts an EIP-2718 encoded transaction, returning its hash once the
	/// node accepts it into the pool.
	async fn send_raw_transaction(&self, raw: &Bytes) -> Result<TxHash, NetworkError>;

	/// Receipt for `hash`, or `None` while it is not mined.
	async fn get_receipt(&self, hash: TxHash) -> Result<Option<ChainReceipt>, NetworkError>;

	/// Replays `call` against the state at `block_number` and decodes the
	/// revert reason, if any.
	async fn revert_reason(
		&self,
		call: TransactionRequest,
		block_number: u64,
	) -> Result<Option<String>, NetworkError>;
}

/// A broadcast transaction and its latest receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrackedTransaction {
	receipt: RelayReceipt,
	/// Kept so a revert can be replayed when the receipt is settled.
	draft: TransactionDraft,
}

/// Signs, broadcasts and tracks forwarder transactions.
pub struct Submitter {
	network: Arc<dyn NetworkInterface>,
	account: Arc<dyn AccountInterface>,
	/// Operator signing nonce. `None` means it must be re-read from the
	/// network before the next signature.
	operator_nonce: Mutex<Option<u64>>,
	gas_price_wei: Option<u64>,
	confirmation: ConfirmationConfig,
	tracked: DashMap<TxHash, TrackedTransaction>,
	storage: Option<Arc<StorageService>>,
}

impl Submitter {
	pub fn new(
		network: Arc<dyn NetworkInterface>,
		account: Arc<dyn AccountInterface>,
		confirmation: ConfirmationConfig,
	) -> Self {
		Self {
			network,
			account,
			operator_nonce: Mutex::new(None),
			gas_price_wei: None,
			confirmation,
			tracked: DashMap::new(),
			storage: None,
		}
	}

	/// Uses a fixed gas price instead of asking the network.
	pub fn with_gas_price(mut self, gas_price_wei: Option<u64>) -> Self {
		self.gas_price_wei = gas_price_wei;
		self
	}

	/// Mirrors receipts to `storage`.
	pub fn with_storage(mut self, storage: Arc<StorageService>) -> Self {
		self.storage = Some(storage);
		self
	}

	pub fn operator(&self) -> Address {
		self.account.address()
	}

	/// Restores tracked transactions from storage.
	pub async fn load(&self) -> Result<usize, DeliveryError> {
		let Some(storage) = &self.storage else {
			return Ok(0);
		};

		let stored: Vec<(String, TrackedTransaction)> =
			storage.retrieve_all(RECEIPT_NAMESPACE).await?;

		for (_, tracked) in stored {
			self.tracked.insert(tracked.receipt.tx_hash(), tracked);
		}
		self.prune_settled().await;
		Ok(self.tracked.len())
	}

	/// Forgets receipts settled longer ago than the retention window, in
	/// memory and in storage. Pending receipts are always kept.
	pub async fn prune_settled(&self) -> usize {
		let retention = self.confirmation.receipt_retention();
		let expired: Vec<TxHash> = self
			.tracked
			.iter()
			.filter(|entry| entry.receipt.settled_longer_than(retention))
			.map(|entry| *entry.key())
			.collect();

		for tx_hash in &expired {
			self.tracked.remove(tx_hash);
			if let Some(storage) = &self.storage {
				if let Err(e) = storage.remove(RECEIPT_NAMESPACE, &tx_hash.to_string()).await {
					warn!(tx_hash = %truncate_hash(tx_hash), error = %e, "Failed to drop stored receipt");
				}
			}
		}

		if !expired.is_empty() {
			debug!(count = expired.len(), "Pruned settled receipts");
		}
		expired.len()
	}

	/// Signs and broadcasts `draft` on behalf of `user`.
	///
	/// Returns a pending receipt once the node accepts the transaction.
	pub async fn submit(
		&self,
		draft: &TransactionDraft,
		user: Address,
		user_nonce: u64,
	) -> Result<RelayReceipt, DeliveryError> {
		let gas_price = match self.gas_price_wei {
			Some(price) => u128::from(price),
			None => self
				.network
				.gas_price()
				.await
				.map_err(|e| DeliveryError::Submission(format!("gas price: {}", e)))?,
		};

		let tx_hash = {
			let mut operator_nonce = self.operator_nonce.lock().await;
			let nonce = match *operator_nonce {
				Some(nonce) => nonce,
				None => self
					.network
					.transaction_count(self.account.address())
					.await
					.map_err(|e| DeliveryError::Submission(format!("operator nonce: {}", e)))?,
			};

			let signed = match self.account.sign_transaction(draft, nonce, gas_price).await {
				Ok(signed) => signed,
				Err(e) => {
					// Nothing was broadcast, so the nonce is still unused.
					*operator_nonce = Some(nonce);
					return Err(DeliveryError::Submission(e.to_string()));
				}
			};

			match self.network.send_raw_transaction(&signed.raw).await {
				Ok(hash) => {
					*operator_nonce = Some(nonce + 1);
					if hash != signed.hash {
						warn!(
							expected = %truncate_hash(&signed.hash),
							reported = %truncate_hash(&hash),
							"Node reported a different transaction hash"
						);
					}
					debug!(operator_nonce = nonce, "Broadcast accepted");
					signed.hash
				}
				Err(e) => {
					*operator_nonce = None;
					return Err(DeliveryError::Submission(e.to_string()));
				}
			}
		};

		info!(
			tx_hash = %truncate_hash(&tx_hash),
			%user,
			nonce = user_nonce,
			"Submitted transaction"
		);

		let tracked = TrackedTransaction {
			receipt: RelayReceipt::pending(tx_hash, user, user_nonce),
			draft: draft.clone(),
		};
		let receipt = tracked.receipt.clone();
		self.tracked.insert(tx_hash, tracked.clone());
		self.persist(&tracked).await;
		self.prune_settled().await;

		Ok(receipt)
	}

	/// Polls until the transaction is confirmed deep enough or the timeout
	/// elapses. A timed-out receipt is returned still pending.
	pub async fn wait(&self, tx_hash: TxHash) -> Result<RelayReceipt, DeliveryError> {
		let timeout = self.confirmation.timeout();
		let start = tokio::time::Instant::now();

		debug!(
			tx_hash = %truncate_hash(&tx_hash),
			confirmations = self.confirmation.confirmations,
			timeout_secs = timeout.as_secs(),
			"Waiting for confirmation"
		);

		loop {
			// A slow node cannot stretch the wait past the budget.
			let remaining = timeout.saturating_sub(start.elapsed());
			let receipt = match tokio::time::timeout(remaining, self.poll(tx_hash)).await {
				Ok(Ok(receipt)) => receipt,
				Ok(Err(DeliveryError::Network(e))) => {
					warn!(tx_hash = %truncate_hash(&tx_hash), error = %e, "Receipt poll failed");
					self.cached(tx_hash)?
				}
				Ok(Err(e)) => return Err(e),
				Err(_) => {
					info!(tx_hash = %truncate_hash(&tx_hash), "Confirmation timed out mid-poll");
					return self.cached(tx_hash);
				}
			};

			if receipt.status().is_terminal() {
				return Ok(receipt);
			}

			let remaining = timeout.saturating_sub(start.elapsed());
			if remaining.is_zero() {
				info!(tx_hash = %truncate_hash(&tx_hash), "Confirmation timed out");
				return Ok(receipt);
			}

			tokio::time::sleep(self.confirmation.poll_interval().min(remaining)).await;
		}
	}

	/// Checks the chain once and settles the receipt if the transaction is
	/// mined with enough confirmations.
	pub async fn poll(&self, tx_hash: TxHash) -> Result<RelayReceipt, DeliveryError> {
		let tracked = self
			.tracked
			.get(&tx_hash)
			.map(|entry| entry.clone())
			.ok_or(DeliveryError::UnknownTransaction(tx_hash))?;

		if tracked.receipt.status().is_terminal() {
			return Ok(tracked.receipt);
		}

		let Some(mined) = self.network.get_receipt(tx_hash).await? else {
			return Ok(tracked.receipt);
		};

		let head = self.network.block_number().await?;
		let depth = head.saturating_sub(mined.block_number) + 1;
		if depth < self.confirmation.confirmations {
			debug!(
				tx_hash = %truncate_hash(&tx_hash),
				remaining = self.confirmation.confirmations - depth,
				"Waiting for more confirmations"
			);
			return Ok(tracked.receipt);
		}

		let outcome = if mined.success {
			ExecutionOutcome::Success {
				block_number: mined.block_number,
				gas_used: mined.gas_used,
			}
		} else {
			let call = tracked.draft.to_call_request(self.account.address());
			let reason = match self.network.revert_reason(call, mined.block_number).await {
				Ok(reason) => reason,
				Err(e) => {
					warn!(tx_hash = %truncate_hash(&tx_hash), error = %e, "Could not replay reverted call");
					None
				}
			};
			ExecutionOutcome::Reverted {
				block_number: mined.block_number,
				gas_used: mined.gas_used,
				reason,
			}
		};

		let settled = {
			let Some(mut entry) = self.tracked.get_mut(&tx_hash) else {
				return Err(DeliveryError::UnknownTransaction(tx_hash));
			};
			// A concurrent poll may have settled it first; keep that result.
			if entry.receipt.settle(outcome).is_ok() {
				info!(
					tx_hash = %truncate_hash(&tx_hash),
					status = %entry.receipt.status(),
					block_number = mined.block_number,
					"Transaction settled"
				);
			}
			entry.clone()
		};
		self.persist(&settled).await;

		Ok(settled.receipt)
	}

	/// Latest known receipt, without touching the network.
	pub fn receipt(&self, tx_hash: &TxHash) -> Option<RelayReceipt> {
		self.tracked.get(tx_hash).map(|entry| entry.receipt.clone())
	}

	fn cached(&self, tx_hash: TxHash) -> Result<RelayReceipt, DeliveryError> {
		self.receipt(&tx_hash)
			.ok_or(DeliveryError::UnknownTransaction(tx_hash))
	}

	async fn persist(&self, tracked: &TrackedTransaction) {
		let Some(storage) = &self.storage else {
			return;
		};
		let id = tracked.receipt.tx_hash().to_string();
		if let Err(e) = storage.store(RECEIPT_NAMESPACE, &id, tracked).await {
			warn!(tx_hash = %truncate_hash(&tracked.receipt.tx_hash()), error = %e, "Failed to persist receipt");
		}
	}
}
