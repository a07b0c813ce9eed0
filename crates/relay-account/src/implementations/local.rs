//! Local private key wallet.

use crate::{AccountError, AccountInterface, SignedTransaction};
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSigner;
use alloy::primitives::TxKind;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use relay_config::{AccountConfig, PrivateKey};
use relay_types::{Address, TransactionDraft};
use std::fmt;

/// Local wallet implementation using Alloy's signer.
///
/// The signing key is held inside the signer, which wipes it on drop. The
/// wallet's `Debug` output shows only the address.
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Creates a new LocalWallet from a hex-encoded private key.
	pub fn new(private_key: &PrivateKey) -> Result<Self, AccountError> {
		let signer = private_key
			.expose()
			.parse::<PrivateKeySigner>()
			// The parse error is not forwarded; it may echo key material.
			.map_err(|_| AccountError::InvalidKey("Invalid private key".to_string()))?;

		Ok(Self { signer })
	}

	pub fn from_signer(signer: PrivateKeySigner) -> Self {
		Self { signer }
	}
}

impl fmt::Debug for LocalWallet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LocalWallet")
			.field("address", &self.signer.address())
			.finish()
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn address(&self) -> Address {
		self.signer.address()
	}

	async fn sign_transaction(
		&self,
		draft: &TransactionDraft,
		nonce: u64,
		gas_price: u128,
	) -> Result<SignedTransaction, AccountError> {
		let mut legacy_tx = TxLegacy {
			chain_id: Some(draft.chain_id),
			nonce,
			gas_price,
			gas_limit: draft.gas_limit,
			to: TxKind::Call(draft.to),
			value: draft.value,
			input: draft.data.clone(),
		};

		let signature = self
			.signer
			.sign_transaction(&mut legacy_tx)
			.await
			.map_err(|e| {
				AccountError::SigningFailed(format!("Failed to sign transaction: {}", e))
			})?;

		let envelope = TxEnvelope::Legacy(legacy_tx.into_signed(signature));

		Ok(SignedTransaction {
			hash: *envelope.tx_hash(),
			raw: envelope.encoded_2718().into(),
		})
	}
}

/// Creates the operator account from configuration.
pub fn create_account(config: &AccountConfig) -> Result<Box<dyn AccountInterface>, AccountError> {
	Ok(Box::new(LocalWallet::new(&config.private_key)?))
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::eips::eip2718::Decodable2718;
	use alloy::primitives::{keccak256, Bytes, U256};

	const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn draft() -> TransactionDraft {
		TransactionDraft {
			chain_id: 31337,
			to: Address::repeat_byte(0x42),
			data: Bytes::from_static(&[0xab, 0xcd]),
			gas_limit: 100_000,
			value: U256::ZERO,
		}
	}

	#[test]
	fn test_invalid_key_does_not_leak() {
		let key = PrivateKey::new("0xnot-a-key-but-secret");
		let err = LocalWallet::new(&key).unwrap_err();
		assert!(!err.to_string().contains("secret"));
	}

	#[test]
	fn test_debug_shows_only_address() {
		let wallet = LocalWallet::new(&PrivateKey::new(TEST_KEY)).unwrap();
		let debug = format!("{:?}", wallet);
		assert!(debug.contains("LocalWallet"));
		assert!(!debug.contains(&TEST_KEY[2..]));
	}

	#[tokio::test]
	async fn test_signed_transaction_recovers_operator() {
		let wallet = LocalWallet::new(&PrivateKey::new(TEST_KEY)).unwrap();
		let signed = wallet
			.sign_transaction(&draft(), 5, 1_000_000_000)
			.await
			.unwrap();

		assert_eq!(signed.hash, keccak256(&signed.raw));

		let decoded = TxEnvelope::decode_2718(&mut signed.raw.as_ref()).unwrap();
		let TxEnvelope::Legacy(legacy) = decoded else {
			panic!("expected a legacy transaction");
		};

		let signer = legacy
			.signature()
			.recover_address_from_prehash(&legacy.signature_hash())
			.unwrap();
		assert_eq!(signer, wallet.address());
		assert_eq!(legacy.tx().nonce, 5);
		assert_eq!(legacy.tx().chain_id, Some(31337));
		assert_eq!(legacy.tx().gas_limit, 100_000);
		assert_eq!(legacy.tx().input, draft().data);
	}
}
