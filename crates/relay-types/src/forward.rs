//! Forward request types.
//!
//! A forward request is the user's authorization for the relay to call
//! `target` with `data` on their behalf through the trusted forwarder.

use alloy::primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};

/// A user's request to have a call forwarded.
///
/// Immutable once received; every stage of the pipeline reads it through a
/// shared reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRequest {
	/// The user on whose behalf the call is made.
	pub user: Address,
	/// The contract the forwarder will call.
	pub target: Address,
	/// Opaque call data passed to the target.
	pub data: Bytes,
	/// Gas limit requested by the user, subject to the relay's gas policy.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gas_limit: Option<u64>,
	/// Per-user sequence number.
	pub nonce: u64,
}

/// A forward request together with the user's signature over its typed-data
/// digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedForwardRequest {
	#[serde(flatten)]
	pub request: ForwardRequest,
	/// 65-byte `(r, s, v)` signature.
	pub signature: Bytes,
}

/// The EIP-712 domain a forward request is signed under.
///
/// Binds signatures to one forwarder contract on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwarderDomain {
	/// Domain name declared by the forwarder contract.
	pub name: String,
	/// Domain version declared by the forwarder contract.
	pub version: String,
	pub chain_id: u64,
	/// The forwarder contract (EIP-712 `verifyingContract`).
	pub address: Address,
}

impl SignedForwardRequest {
	pub fn new(request: ForwardRequest, signature: impl Into<Bytes>) -> Self {
		Self {
			request,
			signature: signature.into(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_signed_request_json_shape() {
		let json = r#"{
			"user": "0x1111111111111111111111111111111111111111",
			"target": "0x2222222222222222222222222222222222222222",
			"data": "0xabcd",
			"nonce": 3,
			"signature": "0x00"
		}"#;

		let signed: SignedForwardRequest = serde_json::from_str(json).unwrap();
		assert_eq!(signed.request.nonce, 3);
		assert_eq!(signed.request.gas_limit, None);
		assert_eq!(signed.request.data.as_ref(), &[0xab, 0xcd]);
		assert_eq!(signed.signature.len(), 1);

		let value = serde_json::to_value(&signed).unwrap();
		assert!(value.get("gas_limit").is_none());
		assert_eq!(value["nonce"], 3);
	}
}
