//! Builds forwarder transactions from verified requests.
//!
//! The builder turns a verified forward request into an unsigned call to the
//! trusted forwarder's `forward(address,bytes,address)` entry point and
//! applies the relay's gas policy. It neither signs nor sends.

use alloy::sol;
use alloy::sol_types::SolCall;
use relay_config::GasConfig;
use relay_types::{Address, TransactionDraft, U256};
use relay_verifier::VerifiedRequest;
use thiserror::Error;
use tracing::debug;

sol! {
	/// Entry point of the trusted forwarder contract.
	interface ITrustedForwarder {
		function forward(address target, bytes data, address user) external;
	}
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
	#[error("Target address is zero")]
	ZeroTarget,
	#[error("Target {0} is the forwarder itself")]
	TargetIsForwarder(Address),
	#[error("Call data is {size} bytes, limit is {max}")]
	CallDataTooLarge { size: usize, max: usize },
}

/// Assembles forwarder calls for one forwarder on one chain.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
	forwarder: Address,
	chain_id: u64,
	gas: GasConfig,
}

impl TransactionBuilder {
	pub fn new(forwarder: Address, chain_id: u64, gas: GasConfig) -> Self {
		Self {
			forwarder,
			chain_id,
			gas,
		}
	}

	/// Gas limit the relay will use for a request asking for `requested`.
	///
	/// Missing, zero or over-ceiling requests get the configured default.
	pub fn gas_limit_for(&self, requested: Option<u64>) -> u64 {
		match requested {
			Some(limit) if limit > 0 && limit <= self.gas.max_limit => limit,
			_ => self.gas.default_limit,
		}
	}

	pub fn build(&self, verified: &VerifiedRequest) -> Result<TransactionDraft, BuildError> {
		let request = verified.request();

		if request.target == Address::ZERO {
			return Err(BuildError::ZeroTarget);
		}
		if request.target == self.forwarder {
			return Err(BuildError::TargetIsForwarder(request.target));
		}
		if request.data.len() > self.gas.max_call_data_bytes {
			return Err(BuildError::CallDataTooLarge {
				size: request.data.len(),
				max: self.gas.max_call_data_bytes,
			});
		}

		let data = ITrustedForwarder::forwardCall {
			target: request.target,
			data: request.data.clone(),
			user: request.user,
		}
		.abi_encode();

		let gas_limit = self.gas_limit_for(request.gas_limit);
		debug!(
			user = %request.user,
			nonce = request.nonce,
			gas_limit,
			"Built forwarder call"
		);

		Ok(TransactionDraft {
			chain_id: self.chain_id,
			to: self.forwarder,
			data: data.into(),
			gas_limit,
			value: U256::ZERO,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::keccak256;
	use alloy::signers::{local::PrivateKeySigner, SignerSync};
	use relay_types::{Bytes, ForwardRequest, ForwarderDomain, SignedForwardRequest};
	use relay_verifier::{signing_digest, SignatureVerifier};

	const FORWARDER: Address = Address::repeat_byte(0xf0);

	fn gas() -> GasConfig {
		GasConfig {
			default_limit: 500_000,
			max_limit: 1_000_000,
			gas_price_wei: None,
			max_call_data_bytes: 16,
		}
	}

	fn builder() -> TransactionBuilder {
		TransactionBuilder::new(FORWARDER, 31337, gas())
	}

	fn verified_request(target: Address, data: Vec<u8>, gas_limit: Option<u64>) -> VerifiedRequest {
		let signer = PrivateKeySigner::random();
		let domain = ForwarderDomain {
			name: "TrustedForwarder".to_string(),
			version: "1".to_string(),
			chain_id: 31337,
			address: FORWARDER,
		};
		let request = ForwardRequest {
			user: signer.address(),
			target,
			data: Bytes::from(data),
			gas_limit,
			nonce: 0,
		};
		let signature = signer
			.sign_hash_sync(&signing_digest(&request, &domain))
			.unwrap();
		SignatureVerifier::new(domain)
			.verify(&SignedForwardRequest::new(
				request,
				signature.as_bytes().to_vec(),
			))
			.unwrap()
	}

	#[test]
	fn test_call_data_decodes_to_verified_fields() {
		let target = Address::repeat_byte(0x7a);
		let verified = verified_request(target, vec![0xab, 0xcd], Some(120_000));

		let draft = builder().build(&verified).unwrap();
		assert_eq!(draft.to, FORWARDER);
		assert_eq!(draft.chain_id, 31337);
		assert_eq!(draft.value, U256::ZERO);
		assert_eq!(draft.gas_limit, 120_000);

		let selector = &keccak256("forward(address,bytes,address)")[..4];
		assert_eq!(&draft.data[..4], selector);

		let call = ITrustedForwarder::forwardCall::abi_decode(&draft.data).unwrap();
		assert_eq!(call.target, target);
		assert_eq!(call.data.as_ref(), &[0xab, 0xcd]);
		assert_eq!(call.user, verified.user());
	}

	#[test]
	fn test_gas_policy() {
		let builder = builder();
		assert_eq!(builder.gas_limit_for(None), 500_000);
		assert_eq!(builder.gas_limit_for(Some(0)), 500_000);
		assert_eq!(builder.gas_limit_for(Some(1_000_001)), 500_000);
		assert_eq!(builder.gas_limit_for(Some(1_000_000)), 1_000_000);
		assert_eq!(builder.gas_limit_for(Some(21_000)), 21_000);
	}

	#[test]
	fn test_rejects_zero_target() {
		let verified = verified_request(Address::ZERO, vec![], None);
		assert_eq!(builder().build(&verified), Err(BuildError::ZeroTarget));
	}

	#[test]
	fn test_rejects_forwarder_as_target() {
		let verified = verified_request(FORWARDER, vec![], None);
		assert_eq!(
			builder().build(&verified),
			Err(BuildError::TargetIsForwarder(FORWARDER))
		);
	}

	#[test]
	fn test_rejects_oversized_call_data() {
		let verified = verified_request(Address::repeat_byte(0x7a), vec![0; 17], None);
		assert_eq!(
			builder().build(&verified),
			Err(BuildError::CallDataTooLarge { size: 17, max: 16 })
		);

		let at_limit = verified_request(Address::repeat_byte(0x7a), vec![0; 16], None);
		assert!(builder().build(&at_limit).is_ok());
	}
}
