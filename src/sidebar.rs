//! The session list: search, collapse state, and what to show.

use std::time::{Duration, Instant};

use crate::events::{AppEvent, EventBus};
use crate::store::{LocalCache, SessionStore};
use crate::types::Session;

/// Quiet period before a typed query takes effect.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Shown when there are sessions but none match the query.
pub const NO_MATCHES: &str = "No matching chats found.";

/// Shown when there are no sessions at all.
pub const NO_SESSIONS: &str = "No sessions yet.";

/// Sessions whose name or loaded messages contain `query`, ignoring case.
///
/// An empty or all-blank query matches everything.  Order is preserved.
pub fn filter_sessions<'a>(sessions: &'a [Session], query: &str) -> Vec<&'a Session> {
    let query = query.trim().to_lowercase();
    sessions.iter().filter(|s| s.matches(&query)).collect()
}

/// One row of the session list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarEntry {
    /// Session id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Messages in the session, loaded or not.
    pub message_count: u32,
    /// Whether this is the current session.
    pub active: bool,
    /// Whether the session is password protected.
    pub protected: bool,
}

/// State behind the sidebar.
#[derive(Debug)]
pub struct SidebarController {
    query: String,
    pending: Option<(String, Instant)>,
    debounce: Duration,
    collapsed: bool,
    cache: Option<LocalCache>,
    events: EventBus,
}

impl SidebarController {
    /// A sidebar that restores and persists its collapse state through `cache`.
    pub fn new(cache: Option<LocalCache>, events: EventBus) -> Self {
        let collapsed = cache.as_ref().is_some_and(LocalCache::sidebar_collapsed);
        Self {
            query: String::new(),
            pending: None,
            debounce: SEARCH_DEBOUNCE,
            collapsed,
            cache,
            events,
        }
    }

    /// The query currently filtering the list.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Apply a query right away, dropping any pending one.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.pending = None;
        self.query = query.into();
    }

    /// Record a keystroke-driven query; it applies once `poll` sees the
    /// debounce period pass without another edit.
    pub fn type_query(&mut self, query: impl Into<String>, now: Instant) {
        self.pending = Some((query.into(), now));
    }

    /// Apply the pending query if it has settled.  Returns true if the
    /// query changed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match &self.pending {
            Some((_, typed_at)) if now.duration_since(*typed_at) >= self.debounce => {
                let Some((query, _)) = self.pending.take() else {
                    return false;
                };
                let changed = query != self.query;
                self.query = query;
                changed
            }
            _ => false,
        }
    }

    /// When the pending query will settle, if there is one.
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at + self.debounce)
    }

    /// Rows to show, filtered by the current query.
    pub fn entries(&self, store: &SessionStore) -> Vec<SidebarEntry> {
        let current = store.current_id();
        filter_sessions(store.sessions(), &self.query)
            .into_iter()
            .map(|s| SidebarEntry {
                id: s.id.clone(),
                name: s.name.clone(),
                message_count: s.message_count.max(s.messages.len() as u32),
                active: Some(s.id.as_str()) == current,
                protected: s.is_protected,
            })
            .collect()
    }

    /// Text to show in place of an empty list.
    pub fn empty_state(&self, store: &SessionStore) -> Option<&'static str> {
        if store.is_empty() {
            Some(NO_SESSIONS)
        } else if filter_sessions(store.sessions(), &self.query).is_empty() {
            Some(NO_MATCHES)
        } else {
            None
        }
    }

    /// Whether the sidebar is collapsed.
    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    /// Flip the collapse state, remember it, and announce it.
    pub fn toggle(&mut self) -> bool {
        self.collapsed = !self.collapsed;
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.set_sidebar_collapsed(self.collapsed) {
                tracing::warn!(error = %err, "could not save sidebar state");
            }
        }
        self.events.emit(AppEvent::SidebarToggled {
            collapsed: self.collapsed,
        });
        self.collapsed
    }

    /// Returns true if `event` means the list should be redrawn.
    pub fn needs_redraw(&self, event: &AppEvent) -> bool {
        matches!(
            event,
            AppEvent::SessionChanged { .. } | AppEvent::MessageAdded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::drain;
    use crate::types::Message;

    fn store() -> SessionStore {
        let mut store = SessionStore::new();
        store.insert(Session::new("taco", "Sleepy Taco"));
        store.insert(Session::new("penguin", "Giggling Penguin"));
        store
    }

    #[test]
    fn query_filters_by_name() {
        let store = store();
        let found: Vec<&str> = filter_sessions(store.sessions(), "pen")
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(found, vec!["Giggling Penguin"]);
        assert_eq!(filter_sessions(store.sessions(), "").len(), 2);
        assert_eq!(filter_sessions(store.sessions(), "  PEN ").len(), 1);
    }

    #[test]
    fn query_searches_message_content() {
        let mut store = store();
        store.push_message("taco", Message::user("What is a narwhal?")).unwrap();
        let found = filter_sessions(store.sessions(), "narwhal");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "taco");
    }

    #[test]
    fn entries_mark_the_current_session() {
        let mut store = store();
        store.set_current("taco").unwrap();
        let sidebar = SidebarController::new(None, EventBus::new());
        let entries = sidebar.entries(&store);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().find(|e| e.id == "taco").unwrap().active);
        assert!(!entries.iter().find(|e| e.id == "penguin").unwrap().active);
    }

    #[test]
    fn empty_states() {
        let mut sidebar = SidebarController::new(None, EventBus::new());
        assert_eq!(sidebar.empty_state(&SessionStore::new()), Some(NO_SESSIONS));
        let store = store();
        assert_eq!(sidebar.empty_state(&store), None);
        sidebar.set_query("zebra");
        assert_eq!(sidebar.empty_state(&store), Some(NO_MATCHES));
        assert!(sidebar.entries(&store).is_empty());
    }

    #[test]
    fn typed_query_waits_for_quiet_period() {
        let mut sidebar = SidebarController::new(None, EventBus::new());
        let start = Instant::now();
        sidebar.type_query("pe", start);
        sidebar.type_query("pen", start + Duration::from_millis(100));
        assert!(!sidebar.poll(start + Duration::from_millis(350)));
        assert_eq!(sidebar.query(), "");
        assert_eq!(
            sidebar.pending_deadline(),
            Some(start + Duration::from_millis(400))
        );
        assert!(sidebar.poll(start + Duration::from_millis(400)));
        assert_eq!(sidebar.query(), "pen");
        assert!(sidebar.pending_deadline().is_none());
    }

    #[test]
    fn collapse_state_is_persisted_and_announced() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut sidebar = SidebarController::new(Some(LocalCache::new(dir.path())), bus.clone());
        assert!(!sidebar.is_collapsed());
        assert!(sidebar.toggle());
        assert_eq!(drain(&mut rx), vec![AppEvent::SidebarToggled { collapsed: true }]);

        let restored = SidebarController::new(Some(LocalCache::new(dir.path())), bus);
        assert!(restored.is_collapsed());
    }
}
