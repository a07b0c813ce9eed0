//! Scripted in-memory network.
//!
//! Accepts any raw transaction, mines it into its own block (immediately, or
//! when [`MockNetwork::mine`] is called) and can be told to fail broadcasts or
//! revert the next transaction.

use crate::{ChainReceipt, NetworkError, NetworkInterface};
use alloy::primitives::keccak256;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use relay_types::{Address, Bytes, TxHash};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct MockState {
	block_number: u64,
	transaction_count: u64,
	gas_price: u128,
	auto_mine: bool,
	failing_sends: usize,
	next_revert: Option<String>,
	/// Broadcast but not mined, with the revert reason they will hit.
	mempool: Vec<(TxHash, Option<String>)>,
	receipts: HashMap<TxHash, ChainReceipt>,
	revert_reasons: HashMap<u64, String>,
	sent: Vec<Bytes>,
}

#[derive(Debug)]
pub struct MockNetwork {
	chain_id: u64,
	state: Mutex<MockState>,
}

impl MockNetwork {
	/// Gas reported for every mined transaction.
	pub const GAS_USED: u64 = 52_000;

	pub fn new(chain_id: u64) -> Self {
		Self {
			chain_id,
			state: Mutex::new(MockState {
				auto_mine: true,
				gas_price: 1_000_000_000,
				..Default::default()
			}),
		}
	}

	/// Whether broadcasts are mined immediately.
	pub async fn set_auto_mine(&self, auto_mine: bool) {
		self.state.lock().await.auto_mine = auto_mine;
	}

	/// Overrides the operator transaction count the network reports.
	pub async fn set_transaction_count(&self, count: u64) {
		self.state.lock().await.transaction_count = count;
	}

	/// Rejects the next `count` broadcasts.
	pub async fn fail_next_sends(&self, count: usize) {
		self.state.lock().await.failing_sends = count;
	}

	/// Makes the next broadcast transaction revert with `reason`.
	pub async fn revert_next(&self, reason: impl Into<String>) {
		self.state.lock().await.next_revert = Some(reason.into());
	}

	/// Mines every pending transaction, one per block.
	pub async fn mine(&self) {
		let mut state = self.state.lock().await;
		let mempool = std::mem::take(&mut state.mempool);
		for (hash, revert) in mempool {
			state.include(hash, revert);
		}
	}

	/// Mines `count` empty blocks.
	pub async fn advance_blocks(&self, count: u64) {
		self.state.lock().await.block_number += count;
	}

	/// Raw transactions accepted so far, in broadcast order.
	pub async fn sent(&self) -> Vec<Bytes> {
		self.state.lock().await.sent.clone()
	}
}

impl MockState {
	fn include(&mut self, hash: TxHash, revert: Option<String>) {
		self.block_number += 1;
		let success = revert.is_none();
		if let Some(reason) = revert {
			self.revert_reasons.insert(self.block_number, reason);
		}
		self.receipts.insert(
			hash,
			ChainReceipt {
				block_number: self.block_number,
				gas_used: MockNetwork::GAS_USED,
				success,
			},
		);
	}
}

#[async_trait]
impl NetworkInterface for MockNetwork {
	async fn chain_id(&self) -> Result<u64, NetworkError> {
		Ok(self.chain_id)
	}

	async fn block_number(&self) -> Result<u64, NetworkError> {
		Ok(self.state.lock().await.block_number)
	}

	async fn gas_price(&self) -> Result<u128, NetworkError> {
		Ok(self.state.lock().await.gas_price)
	}

	async fn transaction_count(&self, _address: Address) -> Result<u64, NetworkError> {
		Ok(self.state.lock().await.transaction_count)
	}

	async fn send_raw_transaction(&self, raw: &Bytes) -> Result<TxHash, NetworkError> {
		let mut state = self.state.lock().await;
		if state.failing_sends > 0 {
			state.failing_sends -= 1;
			return Err(NetworkError::Rpc("transaction underpriced".to_string()));
		}

		// Legacy transactions hash to the keccak of their encoding.
		let hash = keccak256(raw);
		state.sent.push(raw.clone());
		state.transaction_count += 1;

		let revert = state.next_revert.take();
		if state.auto_mine {
			state.include(hash, revert);
		} else {
			state.mempool.push((hash, revert));
		}

		Ok(hash)
	}

	async fn get_receipt(&self, hash: TxHash) -> Result<Option<ChainReceipt>, NetworkError> {
		Ok(self.state.lock().await.receipts.get(&hash).copied())
	}

	async fn revert_reason(
		&self,
		_call: TransactionRequest,
		block_number: u64,
	) -> Result<Option<String>, NetworkError> {
		Ok(self
			.state
			.lock()
			.await
			.revert_reasons
			.get(&block_number)
			.cloned())
	}
}
