//! Signature verification for forward requests.
//!
//! Users sign an EIP-712 digest of their forward request under a domain that
//! names the forwarder contract and the chain id, so a signature produced for
//! one forwarder or chain never verifies against another. Verification is a
//! pure function of the request, the signature and the configured domain.

use alloy::primitives::{uint, Signature, B256, U256};
use alloy::sol_types::{Eip712Domain, SolStruct};
use relay_types::{Address, Bytes, ForwardRequest, ForwarderDomain, SignedForwardRequest};
use std::borrow::Cow;
use thiserror::Error;
use tracing::debug;

mod eip712 {
	alloy::sol! {
		/// Typed-data struct users sign.
		struct ForwardRequest {
			address from;
			address to;
			uint256 gas;
			uint256 nonce;
			bytes data;
		}
	}
}

/// Half the secp256k1 group order; signatures with a larger `s` are
/// malleable duplicates and are rejected.
const SECP256K1N_HALF: U256 =
	uint!(0x7FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF5D576E7357A4501DDFE92F46681B20A0_U256);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
	#[error("Invalid signature for {claimed}: {reason}")]
	InvalidSignature {
		/// The user the request claims to come from.
		claimed: Address,
		/// The signer actually recovered, if recovery succeeded.
		recovered: Option<Address>,
		reason: String,
	},
}

/// A forward request whose signature has been checked.
///
/// Only [`SignatureVerifier::verify`] constructs this type. It carries the
/// digest the signature was checked against so later stages use the exact
/// bytes that were verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRequest {
	request: ForwardRequest,
	signature: Bytes,
	digest: B256,
}

impl VerifiedRequest {
	pub fn request(&self) -> &ForwardRequest {
		&self.request
	}

	pub fn signature(&self) -> &Bytes {
		&self.signature
	}

	/// The EIP-712 digest the user signed.
	pub fn digest(&self) -> B256 {
		self.digest
	}

	pub fn user(&self) -> Address {
		self.request.user
	}

	pub fn nonce(&self) -> u64 {
		self.request.nonce
	}
}

/// Builds the EIP-712 domain for a forwarder.
pub fn eip712_domain(domain: &ForwarderDomain) -> Eip712Domain {
	Eip712Domain::new(
		Some(Cow::Owned(domain.name.clone())),
		Some(Cow::Owned(domain.version.clone())),
		Some(U256::from(domain.chain_id)),
		Some(domain.address),
		None,
	)
}

/// Computes the digest a user signs for `request` under `domain`.
///
/// A missing gas limit is encoded as zero.
pub fn signing_digest(request: &ForwardRequest, domain: &ForwarderDomain) -> B256 {
	let typed = eip712::ForwardRequest {
		from: request.user,
		to: request.target,
		gas: U256::from(request.gas_limit.unwrap_or(0)),
		nonce: U256::from(request.nonce),
		data: request.data.clone(),
	};

	typed.eip712_signing_hash(&eip712_domain(domain))
}

/// Verifies forward request signatures against one forwarder domain.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
	domain: ForwarderDomain,
}

impl SignatureVerifier {
	pub fn new(domain: ForwarderDomain) -> Self {
		Self { domain }
	}

	pub fn domain(&self) -> &ForwarderDomain {
		&self.domain
	}

	/// Checks that `signed` was signed by its claimed user for this domain.
	pub fn verify(&self, signed: &SignedForwardRequest) -> Result<VerifiedRequest, VerifyError> {
		let claimed = signed.request.user;
		let invalid = |recovered: Option<Address>, reason: String| VerifyError::InvalidSignature {
			claimed,
			recovered,
			reason,
		};

		let signature = parse_signature(&signed.signature).map_err(|reason| invalid(None, reason))?;
		let digest = signing_digest(&signed.request, &self.domain);

		let recovered = signature
			.recover_address_from_prehash(&digest)
			.map_err(|e| invalid(None, format!("recovery failed: {}", e)))?;

		if recovered != claimed {
			debug!(%claimed, %recovered, "Signature recovered a different signer");
			return Err(invalid(
				Some(recovered),
				"recovered signer does not match user".to_string(),
			));
		}

		Ok(VerifiedRequest {
			request: signed.request.clone(),
			signature: signed.signature.clone(),
			digest,
		})
	}
}

/// Parses a 65-byte `(r, s, v)` signature.
///
/// `v` must be 0, 1, 27 or 28 and `s` must be in the lower half of the curve
/// order.
fn parse_signature(bytes: &[u8]) -> Result<Signature, String> {
	if bytes.len() != 65 {
		return Err(format!("expected 65 signature bytes, got {}", bytes.len()));
	}

	let r = U256::from_be_slice(&bytes[..32]);
	let s = U256::from_be_slice(&bytes[32..64]);
	let y_parity = match bytes[64] {
		0 | 27 => false,
		1 | 28 => true,
		v => return Err(format!("invalid recovery id {}", v)),
	};

	if s > SECP256K1N_HALF {
		return Err("signature s value is not canonical".to_string());
	}

	Ok(Signature::new(r, s, y_parity))
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::signers::{local::PrivateKeySigner, SignerSync};

	const SECP256K1N: U256 =
		uint!(0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141_U256);

	fn domain(chain_id: u64) -> ForwarderDomain {
		ForwarderDomain {
			name: "TrustedForwarder".to_string(),
			version: "1".to_string(),
			chain_id,
			address: Address::repeat_byte(0xf0),
		}
	}

	fn request(user: Address) -> ForwardRequest {
		ForwardRequest {
			user,
			target: Address::repeat_byte(0x7a),
			data: Bytes::from_static(&[0xab, 0xcd]),
			gas_limit: Some(100_000),
			nonce: 0,
		}
	}

	fn sign(
		signer: &PrivateKeySigner,
		request: ForwardRequest,
		domain: &ForwarderDomain,
	) -> SignedForwardRequest {
		let digest = signing_digest(&request, domain);
		let signature = signer.sign_hash_sync(&digest).unwrap();
		SignedForwardRequest::new(request, signature.as_bytes().to_vec())
	}

	#[test]
	fn test_valid_signature_verifies() {
		let signer = PrivateKeySigner::random();
		let verifier = SignatureVerifier::new(domain(1));
		let signed = sign(&signer, request(signer.address()), verifier.domain());

		let verified = verifier.verify(&signed).unwrap();
		assert_eq!(verified.user(), signer.address());
		assert_eq!(verified.request(), &signed.request);
		// The digest carried forward is the one a re-encoding produces.
		assert_eq!(
			verified.digest(),
			signing_digest(&signed.request, verifier.domain())
		);
	}

	#[test]
	fn test_recovery_id_zero_or_one_accepted() {
		let signer = PrivateKeySigner::random();
		let verifier = SignatureVerifier::new(domain(1));
		let mut signed = sign(&signer, request(signer.address()), verifier.domain());

		let mut bytes = signed.signature.to_vec();
		bytes[64] -= 27;
		signed.signature = bytes.into();

		assert!(verifier.verify(&signed).is_ok());
	}

	#[test]
	fn test_every_signature_bit_flip_is_rejected() {
		let signer = PrivateKeySigner::random();
		let verifier = SignatureVerifier::new(domain(1));
		let signed = sign(&signer, request(signer.address()), verifier.domain());

		for byte in 0..65 {
			for bit in 0..8 {
				let mut bytes = signed.signature.to_vec();
				bytes[byte] ^= 1 << bit;
				let mutated = SignedForwardRequest::new(signed.request.clone(), bytes);

				let result = verifier.verify(&mutated);
				assert!(
					matches!(result, Err(VerifyError::InvalidSignature { .. })),
					"bit {} of byte {} accepted",
					bit,
					byte
				);
			}
		}
	}

	#[test]
	fn test_every_request_field_is_bound() {
		let signer = PrivateKeySigner::random();
		let verifier = SignatureVerifier::new(domain(1));
		let signed = sign(&signer, request(signer.address()), verifier.domain());

		let mut mutations: Vec<ForwardRequest> = Vec::new();

		let mut m = signed.request.clone();
		m.user.0[19] ^= 1;
		mutations.push(m);

		let mut m = signed.request.clone();
		m.target.0[0] ^= 0x80;
		mutations.push(m);

		let mut m = signed.request.clone();
		m.data = Bytes::from_static(&[0xab, 0xcc]);
		mutations.push(m);

		let mut m = signed.request.clone();
		m.gas_limit = Some(100_001);
		mutations.push(m);

		let mut m = signed.request.clone();
		m.nonce ^= 1;
		mutations.push(m);

		for request in mutations {
			let mutated = SignedForwardRequest::new(request, signed.signature.clone());
			assert!(matches!(
				verifier.verify(&mutated),
				Err(VerifyError::InvalidSignature { .. })
			));
		}
	}

	#[test]
	fn test_signature_for_other_chain_is_rejected() {
		let signer = PrivateKeySigner::random();
		let signed = sign(&signer, request(signer.address()), &domain(1));

		let verifier = SignatureVerifier::new(domain(5));
		let err = verifier.verify(&signed).unwrap_err();

		let VerifyError::InvalidSignature {
			claimed, recovered, ..
		} = err;
		assert_eq!(claimed, signer.address());
		assert_ne!(recovered, Some(signer.address()));
	}

	#[test]
	fn test_signature_for_other_forwarder_is_rejected() {
		let signer = PrivateKeySigner::random();
		let mut other = domain(1);
		other.address = Address::repeat_byte(0xf1);
		let signed = sign(&signer, request(signer.address()), &other);

		assert!(SignatureVerifier::new(domain(1)).verify(&signed).is_err());
	}

	#[test]
	fn test_signature_by_someone_else_is_rejected() {
		let user = PrivateKeySigner::random();
		let attacker = PrivateKeySigner::random();
		let verifier = SignatureVerifier::new(domain(1));
		let signed = sign(&attacker, request(user.address()), verifier.domain());

		let err = verifier.verify(&signed).unwrap_err();
		assert_eq!(
			err,
			VerifyError::InvalidSignature {
				claimed: user.address(),
				recovered: Some(attacker.address()),
				reason: "recovered signer does not match user".to_string(),
			}
		);
	}

	#[test]
	fn test_malformed_signatures() {
		let signer = PrivateKeySigner::random();
		let verifier = SignatureVerifier::new(domain(1));
		let signed = sign(&signer, request(signer.address()), verifier.domain());

		let short = SignedForwardRequest::new(signed.request.clone(), signed.signature[..64].to_vec());
		assert!(verifier.verify(&short).is_err());

		let empty = SignedForwardRequest::new(signed.request.clone(), Vec::<u8>::new());
		assert!(verifier.verify(&empty).is_err());
	}

	#[test]
	fn test_high_s_duplicate_is_rejected() {
		let signer = PrivateKeySigner::random();
		let verifier = SignatureVerifier::new(domain(1));
		let signed = sign(&signer, request(signer.address()), verifier.domain());

		let bytes = signed.signature.to_vec();
		let s = U256::from_be_slice(&bytes[32..64]);
		let high_s = SECP256K1N - s;

		let mut malleated = bytes.clone();
		malleated[32..64].copy_from_slice(&high_s.to_be_bytes::<32>());
		malleated[64] = if bytes[64] == 27 { 28 } else { 27 };

		let mutated = SignedForwardRequest::new(signed.request.clone(), malleated);
		assert!(verifier.verify(&mutated).is_err());
	}

	#[test]
	fn test_missing_gas_limit_encodes_as_zero() {
		let d = domain(1);
		let mut with_none = request(Address::repeat_byte(1));
		with_none.gas_limit = None;
		let mut with_zero = with_none.clone();
		with_zero.gas_limit = Some(0);

		assert_eq!(signing_digest(&with_none, &d), signing_digest(&with_zero, &d));
	}
}
