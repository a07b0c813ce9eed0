//! Events published by the relay orchestrator.

use alloy::primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stages a relay request moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayStage {
	Received,
	Verified,
	NonceReserved,
	Built,
	Submitted,
	Confirmed,
	Failed,
	TimedOut,
}

impl fmt::Display for RelayStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			RelayStage::Received => "received",
			RelayStage::Verified => "verified",
			RelayStage::NonceReserved => "nonce_reserved",
			RelayStage::Built => "built",
			RelayStage::Submitted => "submitted",
			RelayStage::Confirmed => "confirmed",
			RelayStage::Failed => "failed",
			RelayStage::TimedOut => "timed_out",
		};
		write!(f, "{}", name)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RelayEvent {
	Accepted {
		request_id: Uuid,
		user: Address,
		nonce: u64,
	},
	/// The request was rejected before broadcast. `stage` is the last stage
	/// it reached.
	Rejected {
		request_id: Uuid,
		user: Address,
		nonce: u64,
		stage: RelayStage,
		reason: String,
	},
	Submitted {
		request_id: Uuid,
		user: Address,
		nonce: u64,
		tx_hash: TxHash,
	},
	Confirmed {
		request_id: Uuid,
		tx_hash: TxHash,
		block_number: u64,
		gas_used: u64,
	},
	Reverted {
		request_id: Uuid,
		tx_hash: TxHash,
		reason: Option<String>,
	},
	TimedOut {
		request_id: Uuid,
		tx_hash: TxHash,
	},
}
