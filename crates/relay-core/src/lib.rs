//! Relay orchestration.
//!
//! Ties the verifier, replay guard, builder and submitter into the per-request
//! pipeline and wires them up from configuration.

use relay_account::AccountError;
use relay_builder::BuildError;
use relay_config::ConfigError;
use relay_delivery::{DeliveryError, NetworkError};
use relay_types::{RelayReceipt, ReceiptStatus, TxHash};
use relay_verifier::VerifyError;
use thiserror::Error;

pub mod builder;
pub mod engine;
pub mod event_bus;

pub use builder::RelayBuilder;
pub use engine::{RelayEngine, RelayInfo};
pub use event_bus::EventBus;
pub use relay_nonce::ReplayError;

/// Why a relay request was refused before it produced a receipt.
#[derive(Debug, Error)]
pub enum RelayError {
	#[error(transparent)]
	InvalidSignature(#[from] VerifyError),
	#[error(transparent)]
	ReplayRejected(#[from] ReplayError),
	#[error("Build failed: {0}")]
	Build(#[from] BuildError),
	#[error(transparent)]
	Submission(#[from] DeliveryError),
}

/// Errors raised while assembling the engine at startup.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(#[from] ConfigError),
	#[error("Account error: {0}")]
	Account(#[from] AccountError),
	#[error("Network error: {0}")]
	Network(#[from] NetworkError),
	#[error("Network reports chain {actual}, configured chain is {expected}")]
	ChainMismatch { expected: u64, actual: u64 },
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Result of a request that reached the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
	/// Mined and executed successfully.
	Confirmed(RelayReceipt),
	/// Mined but reverted; the receipt carries the reason when known.
	Reverted(RelayReceipt),
	/// Not confirmed within the wait budget; poll the receipt later.
	TimedOut(RelayReceipt),
}

impl RelayOutcome {
	pub(crate) fn from_receipt(receipt: RelayReceipt) -> Self {
		match receipt.status() {
			ReceiptStatus::Confirmed => RelayOutcome::Confirmed(receipt),
			ReceiptStatus::Failed => RelayOutcome::Reverted(receipt),
			ReceiptStatus::Pending => RelayOutcome::TimedOut(receipt),
		}
	}

	pub fn receipt(&self) -> &RelayReceipt {
		match self {
			RelayOutcome::Confirmed(receipt)
			| RelayOutcome::Reverted(receipt)
			| RelayOutcome::TimedOut(receipt) => receipt,
		}
	}

	pub fn tx_hash(&self) -> TxHash {
		self.receipt().tx_hash()
	}

	/// Short lowercase label used in API responses.
	pub fn label(&self) -> &'static str {
		match self {
			RelayOutcome::Confirmed(_) => "confirmed",
			RelayOutcome::Reverted(_) => "reverted",
			RelayOutcome::TimedOut(_) => "timed_out",
		}
	}
}
