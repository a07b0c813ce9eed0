//! The per-request relay pipeline.

use crate::{EventBus, RelayError, RelayOutcome};
use relay_builder::TransactionBuilder;
use relay_delivery::{DeliveryError, Submitter};
use relay_nonce::ReplayGuard;
use relay_types::{
	truncate_hash, Address, RelayEvent, RelayReceipt, RelayStage, SignedForwardRequest, TxHash,
};
use relay_verifier::SignatureVerifier;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Static facts about the running relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayInfo {
	pub name: String,
	pub chain_id: u64,
	pub forwarder: Address,
	pub operator: Address,
}

/// Runs relay requests from signature check to confirmation.
pub struct RelayEngine {
	info: RelayInfo,
	verifier: SignatureVerifier,
	replay_guard: ReplayGuard,
	builder: TransactionBuilder,
	submitter: Arc<Submitter>,
	event_bus: EventBus,
}

impl RelayEngine {
	pub fn new(
		info: RelayInfo,
		verifier: SignatureVerifier,
		replay_guard: ReplayGuard,
		builder: TransactionBuilder,
		submitter: Submitter,
		event_bus: EventBus,
	) -> Self {
		Self {
			info,
			verifier,
			replay_guard,
			builder,
			submitter: Arc::new(submitter),
			event_bus,
		}
	}

	pub fn info(&self) -> &RelayInfo {
		&self.info
	}

	pub fn verifier(&self) -> &SignatureVerifier {
		&self.verifier
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Nonce the user should sign next.
	pub fn next_nonce(&self, user: &Address) -> u64 {
		self.replay_guard.next_nonce(user)
	}

	/// Relays one signed request and waits for its confirmation.
	///
	/// Nothing is broadcast unless the signature verifies and the nonce is the
	/// user's next. A failed build or broadcast releases the nonce again.
	///
	/// Dropping the returned future after the nonce is reserved does not
	/// release it: broadcast and commit finish in a detached task.
	pub async fn relay(&self, signed: SignedForwardRequest) -> Result<RelayOutcome, RelayError> {
		let request_id = Uuid::new_v4();
		let user = signed.request.user;
		let nonce = signed.request.nonce;

		let span = info_span!("relay", %request_id, %user, nonce);
		self.run(request_id, signed).instrument(span).await
	}

	async fn run(
		&self,
		request_id: Uuid,
		signed: SignedForwardRequest,
	) -> Result<RelayOutcome, RelayError> {
		let user = signed.request.user;
		let nonce = signed.request.nonce;
		debug!(stage = %RelayStage::Received, call_target = %signed.request.target, "Request received");

		let verified = self
			.verifier
			.verify(&signed)
			.map_err(|e| self.reject(request_id, user, nonce, RelayStage::Received, e.into()))?;
		debug!(stage = %RelayStage::Verified, "Signature verified");

		let reservation = self
			.replay_guard
			.check_and_reserve(user, nonce)
			.map_err(|e| self.reject(request_id, user, nonce, RelayStage::Verified, e.into()))?;
		debug!(stage = %RelayStage::NonceReserved, "Nonce reserved");
		self.event_bus
			.publish(RelayEvent::Accepted {
				request_id,
				user,
				nonce,
			})
			.ok();

		let draft = match self.builder.build(&verified) {
			Ok(draft) => draft,
			Err(e) => {
				reservation.rollback();
				return Err(self.reject(request_id, user, nonce, RelayStage::NonceReserved, e.into()));
			}
		};
		debug!(stage = %RelayStage::Built, gas_limit = draft.gas_limit, "Transaction built");

		let submitter = self.submitter.clone();
		let broadcast = tokio::spawn(
			async move {
				match submitter.submit(&draft, user, nonce).await {
					Ok(receipt) => {
						// Broadcast happened: the nonce is spent whatever the outcome.
						if let Err(e) = reservation.commit().await {
							warn!(error = %e, "Failed to persist committed nonce");
						}
						Ok(receipt)
					}
					Err(e) => {
						reservation.rollback();
						Err(e)
					}
				}
			}
			.in_current_span(),
		);

		let pending = match broadcast.await {
			Ok(Ok(receipt)) => receipt,
			Ok(Err(e)) => {
				return Err(self.reject(request_id, user, nonce, RelayStage::Built, e.into()));
			}
			Err(e) => {
				let error = DeliveryError::Submission(format!("broadcast task failed: {}", e));
				return Err(self.reject(request_id, user, nonce, RelayStage::Built, error.into()));
			}
		};

		let tx_hash = pending.tx_hash();
		info!(stage = %RelayStage::Submitted, tx_hash = %truncate_hash(&tx_hash), "Request submitted");
		self.event_bus
			.publish(RelayEvent::Submitted {
				request_id,
				user,
				nonce,
				tx_hash,
			})
			.ok();

		let receipt = match self.submitter.wait(tx_hash).await {
			Ok(receipt) => receipt,
			Err(e) => {
				warn!(tx_hash = %truncate_hash(&tx_hash), error = %e, "Confirmation tracking failed");
				pending
			}
		};

		let outcome = RelayOutcome::from_receipt(receipt);
		self.publish_outcome(request_id, &outcome);
		Ok(outcome)
	}

	/// Re-checks a submitted transaction.
	///
	/// Returns `None` for hashes this relay never submitted. Network failures
	/// fall back to the last known receipt.
	pub async fn poll_receipt(&self, tx_hash: TxHash) -> Option<RelayReceipt> {
		match self.submitter.poll(tx_hash).await {
			Ok(receipt) => Some(receipt),
			Err(DeliveryError::UnknownTransaction(_)) => None,
			Err(e) => {
				warn!(tx_hash = %truncate_hash(&tx_hash), error = %e, "Receipt poll failed");
				self.submitter.receipt(&tx_hash)
			}
		}
	}

	fn reject(
		&self,
		request_id: Uuid,
		user: Address,
		nonce: u64,
		stage: RelayStage,
		error: RelayError,
	) -> RelayError {
		info!(%stage, error = %error, "Request rejected");
		self.event_bus
			.publish(RelayEvent::Rejected {
				request_id,
				user,
				nonce,
				stage,
				reason: error.to_string(),
			})
			.ok();
		error
	}

	fn publish_outcome(&self, request_id: Uuid, outcome: &RelayOutcome) {
		let receipt = outcome.receipt();
		let tx_hash = receipt.tx_hash();

		let event = match outcome {
			RelayOutcome::Confirmed(_) => {
				info!(stage = %RelayStage::Confirmed, tx_hash = %truncate_hash(&tx_hash), "Request confirmed");
				RelayEvent::Confirmed {
					request_id,
					tx_hash,
					block_number: receipt.block_number().unwrap_or_default(),
					gas_used: receipt.gas_used().unwrap_or_default(),
				}
			}
			RelayOutcome::Reverted(_) => {
				info!(
					stage = %RelayStage::Failed,
					tx_hash = %truncate_hash(&tx_hash),
					reason = receipt.revert_reason().unwrap_or("unknown"),
					"Request reverted"
				);
				RelayEvent::Reverted {
					request_id,
					tx_hash,
					reason: receipt.revert_reason().map(str::to_string),
				}
			}
			RelayOutcome::TimedOut(_) => {
				info!(stage = %RelayStage::TimedOut, tx_hash = %truncate_hash(&tx_hash), "Request still pending");
				RelayEvent::TimedOut {
					request_id,
					tx_hash,
				}
			}
		};

		self.event_bus.publish(event).ok();
	}
}
