//! Relay operator account.
//!
//! The operator account signs the forwarder transactions and pays their gas.
//! It is distinct from the users whose requests are relayed.

use async_trait::async_trait;
use relay_types::{Address, Bytes, TransactionDraft, TxHash};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

/// A transaction signed by the operator, ready to broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
	pub hash: TxHash,
	/// EIP-2718 encoded transaction
	pub raw: Bytes,
}

#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Returns the operator address.
	fn address(&self) -> Address;

	/// Signs `draft` with the given operator nonce and gas price.
	async fn sign_transaction(
		&self,
		draft: &TransactionDraft,
		nonce: u64,
		gas_price: u128,
	) -> Result<SignedTransaction, AccountError>;
}
