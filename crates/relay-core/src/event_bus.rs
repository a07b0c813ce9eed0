//! Broadcast bus for relay lifecycle events.
//!
//! The engine publishes a [`RelayEvent`] at every stage transition; the
//! service and tests subscribe to observe requests without coupling to the
//! engine's internals.

use relay_types::RelayEvent;
use tokio::sync::broadcast;

/// Event bus carrying relay events to any number of subscribers.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<RelayEvent>,
}

impl EventBus {
	/// Creates a bus buffering up to `capacity` events per lagging subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Receives every event published after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
		self.sender.subscribe()
	}

	/// Publishes to all current subscribers.
	///
	/// Fails only when nobody is subscribed.
	pub fn publish(&self, event: RelayEvent) -> Result<(), broadcast::error::SendError<RelayEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}
