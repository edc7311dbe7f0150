//! Publish/subscribe between the controllers.

use tokio::sync::broadcast;

const CAPACITY: usize = 64;

/// Something that happened in one controller that others may care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// The current session changed, or the session list did.
    SessionChanged {
        /// The session now current, if any.
        session_id: Option<String>,
    },
    /// A message was added to a session.
    MessageAdded {
        /// The session it was added to.
        session_id: String,
        /// The new message's id.
        message_id: String,
    },
    /// The pending attachments changed.
    UploadChanged {
        /// How many files are attached.
        count: usize,
    },
    /// The sidebar was collapsed or expanded.
    SidebarToggled {
        /// Whether it is now collapsed.
        collapsed: bool,
    },
}

/// A broadcast channel of [`AppEvent`]s.
///
/// Clones publish to the same subscribers.  Publishing with no subscribers
/// is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CAPACITY);
        Self { sender }
    }

    /// Deliver `event` to every current subscriber.
    pub fn emit(&self, event: AppEvent) {
        tracing::trace!(?event, "emit");
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Take every event already waiting on `rx` without blocking.
///
/// Events lost to a lagging receiver are skipped.
pub fn drain(rx: &mut broadcast::Receiver<AppEvent>) -> Vec<AppEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event receiver lagged");
            }
            Err(_) => break,
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_fine() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(AppEvent::UploadChanged { count: 1 });
    }

    #[test]
    fn subscribers_see_events_in_order() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.clone().subscribe();
        bus.emit(AppEvent::SidebarToggled { collapsed: true });
        bus.emit(AppEvent::SessionChanged {
            session_id: Some("s1".to_string()),
        });
        let expected = vec![
            AppEvent::SidebarToggled { collapsed: true },
            AppEvent::SessionChanged {
                session_id: Some("s1".to_string()),
            },
        ];
        assert_eq!(drain(&mut a), expected);
        assert_eq!(drain(&mut b), expected);
        assert!(drain(&mut a).is_empty());
    }
}
