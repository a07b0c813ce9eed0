//! Shared types for the meta-transaction relay.
//!
//! This crate defines the request, transaction and receipt types that flow
//! between the verifier, replay guard, builder, submitter and orchestrator,
//! along with the events the orchestrator publishes.

pub mod events;
pub mod forward;
pub mod receipt;
pub mod transaction;

pub use events::*;
pub use forward::*;
pub use receipt::*;
pub use transaction::*;

pub use alloy::primitives::{Address, Bytes, TxHash, B256, U256};

/// Utility function to truncate a hash for display.
pub fn truncate_hash(hash: &B256) -> String {
	let hash_str = hex::encode(hash.0);
	if hash_str.len() <= 8 {
		hash_str
	} else {
		format!("{}..", &hash_str[..8])
	}
}
