//! Transaction draft type.

use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use serde::{Deserialize, Serialize};

/// An unsigned transaction to the forwarder contract.
///
/// Produced by the builder and signed by the relay operator at submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDraft {
	/// Chain the transaction is bound to (EIP-155).
	pub chain_id: u64,
	/// The forwarder contract.
	pub to: Address,
	/// ABI-encoded forwarder call.
	pub data: Bytes,
	/// Gas limit after the relay's gas policy was applied.
	pub gas_limit: u64,
	/// Native value sent along; relayed calls never carry value.
	pub value: U256,
}

impl TransactionDraft {
	/// Converts the draft into a call request sent from `from`.
	///
	/// Used to replay a mined transaction with `eth_call` when recovering a
	/// revert reason.
	pub fn to_call_request(&self, from: Address) -> TransactionRequest {
		TransactionRequest {
			from: Some(from),
			to: Some(TxKind::Call(self.to)),
			gas: Some(self.gas_limit),
			value: Some(self.value),
			chain_id: Some(self.chain_id),
			input: TransactionInput::new(self.data.clone()),
			..Default::default()
		}
	}
}
