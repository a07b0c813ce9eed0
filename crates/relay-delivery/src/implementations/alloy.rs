//! JSON-RPC network backend built on the Alloy provider.

use crate::{ChainReceipt, NetworkError, NetworkInterface};
use alloy::eips::BlockId;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::decode_revert_reason;
use async_trait::async_trait;
use relay_types::{Address, Bytes, TxHash};
use tracing::debug;

/// Network access over HTTP JSON-RPC.
pub struct AlloyNetwork {
	provider: DynProvider,
}

impl AlloyNetwork {
	pub fn new(rpc_url: &str) -> Result<Self, NetworkError> {
		let url = rpc_url
			.parse()
			.map_err(|e| NetworkError::InvalidUrl(format!("{}", e)))?;

		// Transactions arrive signed, so no fillers are needed.
		let provider = ProviderBuilder::new()
			.disable_recommended_fillers()
			.connect_http(url)
			.erased();

		Ok(Self { provider })
	}
}

fn rpc_error(context: &str, error: impl std::fmt::Display) -> NetworkError {
	NetworkError::Rpc(format!("{}: {}", context, error))
}

#[async_trait]
impl NetworkInterface for AlloyNetwork {
	async fn chain_id(&self) -> Result<u64, NetworkError> {
		self.provider
			.get_chain_id()
			.await
			.map_err(|e| rpc_error("Failed to get chain id", e))
	}

	async fn block_number(&self) -> Result<u64, NetworkError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| rpc_error("Failed to get block number", e))
	}

	async fn gas_price(&self) -> Result<u128, NetworkError> {
		self.provider
			.get_gas_price()
			.await
			.map_err(|e| rpc_error("Failed to get gas price", e))
	}

	async fn transaction_count(&self, address: Address) -> Result<u64, NetworkError> {
		self.provider
			.get_transaction_count(address)
			.pending()
			.await
			.map_err(|e| rpc_error("Failed to get transaction count", e))
	}

	async fn send_raw_transaction(&self, raw: &Bytes) -> Result<TxHash, NetworkError> {
		let pending = self
			.provider
			.send_raw_transaction(raw)
			.await
			.map_err(|e| rpc_error("Failed to send transaction", e))?;

		Ok(*pending.tx_hash())
	}

	async fn get_receipt(&self, hash: TxHash) -> Result<Option<ChainReceipt>, NetworkError> {
		let receipt = self
			.provider
			.get_transaction_receipt(hash)
			.await
			.map_err(|e| rpc_error("Failed to get receipt", e))?;

		Ok(receipt.map(|receipt| ChainReceipt {
			block_number: receipt.block_number.unwrap_or(0),
			gas_used: receipt.gas_used,
			success: receipt.status(),
		}))
	}

	async fn revert_reason(
		&self,
		call: TransactionRequest,
		block_number: u64,
	) -> Result<Option<String>, NetworkError> {
		match self
			.provider
			.call(call)
			.block(BlockId::number(block_number))
			.await
		{
			// The call succeeds when replayed; the reason is unavailable.
			Ok(_) => Ok(None),
			Err(e) => {
				let reason = e
					.as_error_resp()
					.and_then(|payload| payload.as_revert_data())
					.and_then(|data| decode_revert_reason(&data));

				if reason.is_none() {
					if let Some(payload) = e.as_error_resp() {
						debug!(block_number, message = %payload.message, "Revert without decodable data");
						return Ok(Some(payload.message.to_string()));
					}
					return Err(rpc_error("Failed to replay call", e));
				}

				Ok(reason)
			}
		}
	}
}

impl std::fmt::Debug for AlloyNetwork {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AlloyNetwork").finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_rejects_malformed_url() {
		assert!(matches!(
			AlloyNetwork::new("not a url"),
			Err(NetworkError::InvalidUrl(_))
		));
	}

	#[test]
	fn test_accepts_http_url() {
		assert!(AlloyNetwork::new("http://127.0.0.1:8545").is_ok());
	}
}
