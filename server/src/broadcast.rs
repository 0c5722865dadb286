//! Envelope fan-out for the EventPlat gateway.
//!
//! A single tokio broadcast channel distributes every [`Envelope`] to every
//! authorized connection. Because all envelopes flow through one channel,
//! each subscriber observes them in a total order, which in particular
//! preserves the per-sender emission order of chat messages.
//!
//! Delivery is best-effort and at-most-once: a subscriber that falls more
//! than the channel capacity behind loses the oldest envelopes (surfaced to
//! it as a lag error) without affecting any other subscriber.

use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::types::Envelope;

/// Default channel capacity.
///
/// Bounds how far a slow connection may lag before it starts missing
/// envelopes; chat and notification traffic is low-volume, so a modest
/// buffer is plenty.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Central fan-out hub delivering envelopes to all subscribed connections.
///
/// `Broadcaster` is `Clone`, `Send`, and `Sync`; clones share the same
/// underlying channel, so any clone may broadcast and any clone may hand out
/// subscriptions.
///
/// # Example
///
/// ```rust
/// use eventplat_server::broadcast::Broadcaster;
/// use eventplat_server::types::Envelope;
///
/// let broadcaster = Broadcaster::new();
/// let mut rx = broadcaster.subscribe();
///
/// let delivered = broadcaster.broadcast(Envelope::Message("hi".to_string()));
/// assert_eq!(delivered, 1);
/// ```
#[derive(Debug, Clone)]
pub struct Broadcaster {
    sender: Sender<Envelope>,
}

impl Broadcaster {
    /// Creates a broadcaster with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a broadcaster with a custom channel capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        debug!(capacity, "Created broadcaster");
        Self { sender }
    }

    /// Subscribes to all envelopes broadcast after this call.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<Envelope> {
        let rx = self.sender.subscribe();
        debug!(
            subscriber_count = self.subscriber_count(),
            "New subscriber added"
        );
        rx
    }

    /// Broadcasts an envelope to every current subscriber.
    ///
    /// Returns the number of subscribers the envelope was handed to, or 0 if
    /// nobody is listening. Never blocks; when the channel is full the
    /// oldest envelope is dropped for the lagging subscriber only.
    pub fn broadcast(&self, envelope: Envelope) -> usize {
        trace!(event = envelope.event_name(), "Broadcasting envelope");

        match self.sender.send(envelope) {
            Ok(receivers) => receivers,
            Err(_) => {
                // send fails only when there are no active receivers
                warn!("No connected clients to receive envelope");
                0
            }
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventSummary;

    fn chat(body: &str) -> Envelope {
        Envelope::Message(body.to_string())
    }

    fn created(id: &str, title: &str) -> Envelope {
        Envelope::EventCreated(EventSummary {
            id: id.to_string(),
            title: title.to_string(),
            description: "desc".to_string(),
            location: "loc".to_string(),
            created_by: "user-1".to_string(),
        })
    }

    #[test]
    fn new_broadcaster_has_no_subscribers() {
        let broadcaster = Broadcaster::new();
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn subscribe_and_drop_track_count() {
        let broadcaster = Broadcaster::new();

        let rx1 = broadcaster.subscribe();
        let rx2 = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(broadcaster.subscriber_count(), 1);
        drop(rx2);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn broadcast_without_subscribers_returns_zero() {
        let broadcaster = Broadcaster::new();
        assert_eq!(broadcaster.broadcast(chat("hi")), 0);
    }

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let broadcaster = Broadcaster::new();
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();

        let delivered = broadcaster.broadcast(created("1", "Meetup"));
        assert_eq!(delivered, 2);

        assert_eq!(rx1.recv().await.unwrap(), created("1", "Meetup"));
        assert_eq!(rx2.recv().await.unwrap(), created("1", "Meetup"));
    }

    #[tokio::test]
    async fn envelopes_arrive_in_emission_order() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.broadcast(chat("first"));
        broadcaster.broadcast(chat("second"));
        broadcaster.broadcast(chat("third"));

        assert_eq!(rx.recv().await.unwrap(), chat("first"));
        assert_eq!(rx.recv().await.unwrap(), chat("second"));
        assert_eq!(rx.recv().await.unwrap(), chat("third"));
    }

    #[tokio::test]
    async fn dropped_subscriber_receives_nothing_further() {
        let broadcaster = Broadcaster::new();
        let rx = broadcaster.subscribe();
        let mut rx_other = broadcaster.subscribe();

        drop(rx);
        let delivered = broadcaster.broadcast(chat("after-drop"));

        assert_eq!(delivered, 1);
        assert_eq!(rx_other.recv().await.unwrap(), chat("after-drop"));
    }

    #[tokio::test]
    async fn clones_share_the_channel() {
        let broadcaster = Broadcaster::new();
        let clone = broadcaster.clone();
        let mut rx = broadcaster.subscribe();

        clone.broadcast(chat("via-clone"));
        assert_eq!(rx.recv().await.unwrap(), chat("via-clone"));
        assert_eq!(clone.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn lagging_subscriber_loses_only_oldest() {
        let broadcaster = Broadcaster::with_capacity(2);
        let mut rx = broadcaster.subscribe();

        broadcaster.broadcast(chat("a"));
        broadcaster.broadcast(chat("b"));
        broadcaster.broadcast(chat("c"));

        // The first recv reports the lag, subsequent ones drain what's left.
        assert!(rx.recv().await.is_err());
        assert_eq!(rx.recv().await.unwrap(), chat("b"));
        assert_eq!(rx.recv().await.unwrap(), chat("c"));
    }
}
