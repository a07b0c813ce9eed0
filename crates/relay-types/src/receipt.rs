//! Relay receipt types.
//!
//! A receipt is created when a transaction is accepted into the pending pool
//! and is settled at most once, when the transaction is mined.

use alloy::primitives::{Address, TxHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Status of a relayed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
	Pending,
	Confirmed,
	Failed,
}

impl ReceiptStatus {
	pub fn is_terminal(&self) -> bool {
		!matches!(self, ReceiptStatus::Pending)
	}
}

impl fmt::Display for ReceiptStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ReceiptStatus::Pending => write!(f, "pending"),
			ReceiptStatus::Confirmed => write!(f, "confirmed"),
			ReceiptStatus::Failed => write!(f, "failed"),
		}
	}
}

/// How a mined transaction executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
	Success {
		block_number: u64,
		gas_used: u64,
	},
	Reverted {
		block_number: u64,
		gas_used: u64,
		reason: Option<String>,
	},
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReceiptError {
	#[error("Receipt for {tx_hash} is already {status}")]
	AlreadySettled {
		tx_hash: TxHash,
		status: ReceiptStatus,
	},
}

/// Receipt for a relayed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReceipt {
	tx_hash: TxHash,
	user: Address,
	nonce: u64,
	status: ReceiptStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	block_number: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	gas_used: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	revert_reason: Option<String>,
	submitted_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	settled_at: Option<DateTime<Utc>>,
}

impl RelayReceipt {
	/// Creates a pending receipt for a transaction that was just broadcast.
	pub fn pending(tx_hash: TxHash, user: Address, nonce: u64) -> Self {
		Self {
			tx_hash,
			user,
			nonce,
			status: ReceiptStatus::Pending,
			block_number: None,
			gas_used: None,
			revert_reason: None,
			submitted_at: Utc::now(),
			settled_at: None,
		}
	}

	/// Moves a pending receipt to its terminal status.
	///
	/// Fails without modifying the receipt if it has already been settled.
	pub fn settle(&mut self, outcome: ExecutionOutcome) -> Result<(), ReceiptError> {
		if self.status.is_terminal() {
			return Err(ReceiptError::AlreadySettled {
				tx_hash: self.tx_hash,
				status: self.status,
			});
		}

		match outcome {
			ExecutionOutcome::Success {
				block_number,
				gas_used,
			} => {
				self.status = ReceiptStatus::Confirmed;
				self.block_number = Some(block_number);
				self.gas_used = Some(gas_used);
			}
			ExecutionOutcome::Reverted {
				block_number,
				gas_used,
				reason,
			} => {
				self.status = ReceiptStatus::Failed;
				self.block_number = Some(block_number);
				self.gas_used = Some(gas_used);
				self.revert_reason = reason;
			}
		}
		self.settled_at = Some(Utc::now());
		Ok(())
	}

	pub fn tx_hash(&self) -> TxHash {
		self.tx_hash
	}

	pub fn user(&self) -> Address {
		self.user
	}

	pub fn nonce(&self) -> u64 {
		self.nonce
	}

	pub fn status(&self) -> ReceiptStatus {
		self.status
	}

	pub fn block_number(&self) -> Option<u64> {
		self.block_number
	}

	pub fn gas_used(&self) -> Option<u64> {
		self.gas_used
	}

	pub fn revert_reason(&self) -> Option<&str> {
		self.revert_reason.as_deref()
	}

	pub fn submitted_at(&self) -> DateTime<Utc> {
		self.submitted_at
	}

	pub fn settled_at(&self) -> Option<DateTime<Utc>> {
		self.settled_at
	}

	/// True once the receipt has been settled for longer than `age`.
	pub fn settled_longer_than(&self, age: std::time::Duration) -> bool {
		let (Some(settled_at), Ok(age)) = (self.settled_at, chrono::Duration::from_std(age)) else {
			return false;
		};
		Utc::now().signed_duration_since(settled_at) > age
	}
}
