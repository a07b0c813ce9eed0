//! Replay protection for forward requests.
//!
//! The forwarder contract receives neither the user's nonce nor their
//! signature, so this table is the only thing standing between a captured
//! request and its replay. Each user has a strictly sequential nonce starting
//! at zero. A request reserves the next nonce while it is built and
//! broadcast; the reservation is committed once the transaction leaves the
//! relay or rolled back so the user can retry with the same nonce.

use dashmap::DashMap;
use relay_storage::{StorageError, StorageService};
use relay_types::Address;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Storage namespace holding each user's next expected nonce.
pub const NONCE_NAMESPACE: &str = "nonces";

#[derive(Debug, Error)]
pub enum ReplayError {
	#[error("Nonce {actual} rejected for {user}: expected {expected}{}", pending_suffix(.pending))]
	Rejected {
		user: Address,
		expected: u64,
		actual: u64,
		/// Nonce whose reservation is still in flight, if any.
		pending: Option<u64>,
	},
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

fn pending_suffix(pending: &Option<u64>) -> String {
	match pending {
		Some(nonce) => format!(" (nonce {} in flight)", nonce),
		None => String::new(),
	}
}

#[derive(Debug, Default, Clone, Copy)]
struct NonceEntry {
	/// Next nonce to accept once any in-flight reservation settles.
	next: u64,
	/// Nonce currently reserved and not yet committed.
	pending: Option<u64>,
}

type NonceTable = Arc<DashMap<Address, NonceEntry>>;

/// Per-user nonce table.
///
/// Entries are locked individually, so requests from different users never
/// wait on each other.
pub struct ReplayGuard {
	entries: NonceTable,
	storage: Option<Arc<StorageService>>,
}

impl ReplayGuard {
	/// Creates a guard that mirrors committed nonces to `storage`.
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			entries: Arc::new(DashMap::new()),
			storage: Some(storage),
		}
	}

	/// Creates a guard with no persistence.
	pub fn in_memory() -> Self {
		Self {
			entries: Arc::new(DashMap::new()),
			storage: None,
		}
	}

	/// Restores committed nonces from storage.
	pub async fn load(&self) -> Result<usize, ReplayError> {
		let Some(storage) = &self.storage else {
			return Ok(0);
		};

		let stored: Vec<(String, u64)> = storage.retrieve_all(NONCE_NAMESPACE).await?;
		let mut loaded = 0;
		for (id, next) in stored {
			match id.parse::<Address>() {
				Ok(user) => {
					self.entries.insert(
						user,
						NonceEntry {
							next,
							pending: None,
						},
					);
					loaded += 1;
				}
				Err(_) => warn!(key = %id, "Skipping malformed nonce entry"),
			}
		}

		Ok(loaded)
	}

	/// Next nonce `user` should sign, ignoring any in-flight reservation.
	pub fn next_nonce(&self, user: &Address) -> u64 {
		self.entries
			.get(user)
			.map(|entry| entry.pending.unwrap_or(entry.next))
			.unwrap_or(0)
	}

	/// Reserves `nonce` for `user` if it is the next expected one and no other
	/// request from the same user is in flight.
	pub fn check_and_reserve(
		&self,
		user: Address,
		nonce: u64,
	) -> Result<NonceReservation, ReplayError> {
		let mut entry = self.entries.entry(user).or_default();

		let expected = entry.pending.unwrap_or(entry.next);
		if entry.pending.is_some() || nonce != expected {
			debug!(%user, nonce, expected, pending = ?entry.pending, "Nonce rejected");
			return Err(ReplayError::Rejected {
				user,
				expected,
				actual: nonce,
				pending: entry.pending,
			});
		}

		entry.pending = Some(nonce);
		entry.next = nonce + 1;
		debug!(%user, nonce, "Nonce reserved");

		Ok(NonceReservation {
			user,
			nonce,
			entries: self.entries.clone(),
			storage: self.storage.clone(),
			state: ReservationState::Open,
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReservationState {
	Open,
	/// The nonce is spent; only the storage write is outstanding.
	Committing,
	Settled,
}

/// A provisional claim on one user's nonce.
///
/// Dropping an open reservation rolls it back. Once `commit` has started the
/// nonce stays spent, even if the commit future is dropped.
#[must_use = "dropping a reservation rolls the nonce back"]
pub struct NonceReservation {
	user: Address,
	nonce: u64,
	entries: NonceTable,
	storage: Option<Arc<StorageService>>,
	state: ReservationState,
}

impl NonceReservation {
	pub fn user(&self) -> Address {
		self.user
	}

	pub fn nonce(&self) -> u64 {
		self.nonce
	}

	/// Makes the reservation permanent and persists the user's next nonce.
	///
	/// The user's entry stays in flight until the write finishes, so writes
	/// for one user land in nonce order. A storage failure still leaves the
	/// nonce spent in memory.
	pub async fn commit(mut self) -> Result<(), ReplayError> {
		self.state = ReservationState::Committing;

		let written = match &self.storage {
			Some(storage) => storage
				.store(NONCE_NAMESPACE, &self.user.to_string(), &(self.nonce + 1))
				.await
				.map_err(ReplayError::from),
			None => Ok(()),
		};

		self.settle();
		written
	}

	/// Releases the nonce so the same value can be used again.
	pub fn rollback(mut self) {
		self.settle();
	}

	fn settle(&mut self) {
		let state = std::mem::replace(&mut self.state, ReservationState::Settled);
		if state == ReservationState::Settled {
			return;
		}

		let Some(mut entry) = self.entries.get_mut(&self.user) else {
			return;
		};
		if entry.pending != Some(self.nonce) {
			return;
		}
		entry.pending = None;

		if state == ReservationState::Open {
			entry.next = self.nonce;
			debug!(user = %self.user, nonce = self.nonce, "Nonce rolled back");
		} else {
			debug!(user = %self.user, nonce = self.nonce, "Nonce committed");
		}
	}
}

impl Drop for NonceReservation {
	fn drop(&mut self) {
		self.settle();
	}
}

impl std::fmt::Debug for NonceReservation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NonceReservation")
			.field("user", &self.user)
			.field("nonce", &self.nonce)
			.field("state", &self.state)
			.finish()
	}
}
