//! Producer side of the `eventCreated` channel.
//!
//! The CRUD layer calls [`EventNotifier::event_created`] once a new event
//! record is durably saved. Publication is fire-and-forget: delivery
//! problems are logged and never reported back, and they never roll back
//! the creation.

use tracing::{debug, info};

use crate::broadcast::Broadcaster;
use crate::types::{Envelope, EventSummary};

/// Publishes event-creation notifications through the gateway.
#[derive(Debug, Clone)]
pub struct EventNotifier {
    broadcaster: Broadcaster,
}

impl EventNotifier {
    /// Creates a notifier publishing through the given broadcaster.
    #[must_use]
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self { broadcaster }
    }

    /// Broadcasts an `eventCreated` notification to all connected clients.
    ///
    /// Best-effort: the summary goes out at most once per connection, and a
    /// pool with no connections is not an error.
    pub fn event_created(&self, summary: EventSummary) {
        let event_id = summary.id.clone();
        let delivered = self.broadcaster.broadcast(Envelope::EventCreated(summary));

        if delivered == 0 {
            debug!(event_id = %event_id, "Event created with no clients connected");
        } else {
            info!(
                event_id = %event_id,
                delivered,
                "Broadcast event creation notification"
            );
        }
    }
}
