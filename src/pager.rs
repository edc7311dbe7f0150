//! Upward infinite scroll through a session's history.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::client::AriaClient;
use crate::error::Result;
use crate::observability::{HISTORY_PAGE_ERRORS, HISTORY_PAGE_LOADS};
use crate::store::SessionStore;
use crate::types::{PaginatedMessages, Session};

/// Default distance from the top, in pixels, that triggers a load.
pub const DEFAULT_THRESHOLD: f64 = 100.0;

/// Default number of messages per page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Where the message list is scrolled to.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    /// Distance scrolled from the top.
    pub scroll_top: f64,
    /// Height of all content.
    pub scroll_height: f64,
}

/// Anything that can fetch pages of history.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch up to `limit` messages older than `cursor` (or the newest, with none).
    async fn fetch_page(
        &self,
        session_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<PaginatedMessages>;
}

#[async_trait::async_trait]
impl PageSource for AriaClient {
    async fn fetch_page(
        &self,
        session_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<PaginatedMessages> {
        self.paginated_messages(session_id, limit, cursor).await
    }
}

/// The part of the view the pager drives.
pub trait HistoryView {
    /// Show the loading spinner above the messages.
    fn show_history_spinner(&mut self);
    /// Remove the loading spinner.
    fn hide_history_spinner(&mut self);
    /// Redraw `session` after older messages were put in front, returning
    /// the resulting content height.
    fn render_prepended(&mut self, session: &Session) -> f64;
    /// Scroll the message list.
    fn set_scroll_top(&mut self, scroll_top: f64);
}

/// Result of a call to [`HistoryPager::load_older`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOutcome {
    /// Older messages were prepended and the scroll position compensated.
    Loaded {
        /// Messages added.
        added: usize,
        /// The scroll position now set on the view.
        scroll_top: f64,
    },
    /// The session has no older messages.
    Exhausted,
    /// A load for this session is already running, possibly through a clone
    /// of the pager.
    Busy,
}

/// Decides when to fetch older history and splices it in.
///
/// Clones share the set of sessions being loaded, so a session has at most
/// one older-page fetch running however many handles drive it.
#[derive(Debug, Clone)]
pub struct HistoryPager {
    threshold: f64,
    page_size: u32,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Default for HistoryPager {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

struct Spinner<'a> {
    view: &'a mut dyn HistoryView,
}

impl<'a> Spinner<'a> {
    fn show(view: &'a mut dyn HistoryView) -> Self {
        view.show_history_spinner();
        Self { view }
    }
}

impl Drop for Spinner<'_> {
    fn drop(&mut self) {
        self.view.hide_history_spinner();
    }
}

fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct InFlight {
    set: Arc<Mutex<HashSet<String>>>,
    session_id: String,
}

impl InFlight {
    fn claim(set: &Arc<Mutex<HashSet<String>>>, session_id: &str) -> Option<Self> {
        if !lock(set).insert(session_id.to_string()) {
            return None;
        }
        Some(Self {
            set: Arc::clone(set),
            session_id: session_id.to_string(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.session_id);
    }
}

impl HistoryPager {
    /// A pager fetching `page_size` messages at a time.
    pub fn new(page_size: u32) -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            page_size: page_size.max(1),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Change the trigger distance from the top.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Messages per page.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Returns true if a load for `session_id` is running.
    pub fn is_loading(&self, session_id: &str) -> bool {
        lock(&self.in_flight).contains(session_id)
    }

    /// Returns true when the view is near enough to the top, the session
    /// has older messages, and no load is running for it.
    pub fn should_load(&self, session: &Session, viewport: &Viewport) -> bool {
        viewport.scroll_top <= self.threshold && session.has_more && !self.is_loading(&session.id)
    }

    /// Fetch the newest page of a session and make it authoritative.
    pub async fn load_latest<P: PageSource + ?Sized>(
        &self,
        source: &P,
        store: &mut SessionStore,
        session_id: &str,
    ) -> Result<()> {
        let page = source.fetch_page(session_id, self.page_size, None).await?;
        HISTORY_PAGE_LOADS.click();
        tracing::debug!(session_id, messages = page.messages.len(), has_more = page.has_more, "loaded latest page");
        store.apply_latest_page(session_id, page)
    }

    /// Fetch the page before the oldest loaded message and prepend it.
    ///
    /// The spinner is shown for the length of the fetch and removed whether
    /// it succeeds or not.  On success the scroll position moves down by the
    /// height the new messages added, so the view does not jump.
    pub async fn load_older<P: PageSource + ?Sized>(
        &self,
        source: &P,
        store: &mut SessionStore,
        session_id: &str,
        view: &mut dyn HistoryView,
        viewport: Viewport,
    ) -> Result<LoadOutcome> {
        let session = store.require(session_id)?;
        if !session.has_more {
            return Ok(LoadOutcome::Exhausted);
        }
        let cursor = session.next_cursor.clone();
        let Some(_flight) = InFlight::claim(&self.in_flight, session_id) else {
            return Ok(LoadOutcome::Busy);
        };
        let page_size = self.page_size;

        let spinner = Spinner::show(view);
        let page = match source.fetch_page(session_id, page_size, cursor.as_deref()).await {
            Ok(page) => page,
            Err(err) => {
                HISTORY_PAGE_ERRORS.click();
                tracing::warn!(session_id, error = %err, "failed to load older messages");
                return Err(err);
            }
        };
        HISTORY_PAGE_LOADS.click();

        let added = store.prepend_older(session_id, page)?;
        let session = store.require(session_id)?;
        let new_height = spinner.view.render_prepended(session);
        let scroll_top = viewport.scroll_top + (new_height - viewport.scroll_height);
        spinner.view.set_scroll_top(scroll_top);
        tracing::debug!(session_id, added, has_more = session.has_more, "prepended older messages");
        Ok(LoadOutcome::Loaded { added, scroll_top })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use time::Duration;

    use super::*;
    use crate::error::Error;
    use crate::types::{Message, Role};

    /// A backend holding `total` messages; the cursor is the index of the
    /// oldest message of the previous page.
    struct FakeHistory {
        messages: Vec<Message>,
        fail: Mutex<bool>,
        requests: Mutex<Vec<Option<String>>>,
    }

    impl FakeHistory {
        fn new(total: usize) -> Self {
            let start = time::macros::datetime!(2025-01-01 00:00 UTC);
            let messages = (0..total)
                .map(|i| {
                    let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                    let mut m = Message::new(role, format!("message {i}"));
                    m.id = format!("m{i:03}");
                    m.timestamp = start + Duration::minutes(i as i64);
                    m
                })
                .collect();
            Self {
                messages,
                fail: Mutex::new(false),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl PageSource for FakeHistory {
        async fn fetch_page(
            &self,
            _session_id: &str,
            limit: u32,
            cursor: Option<&str>,
        ) -> Result<PaginatedMessages> {
            self.requests.lock().unwrap().push(cursor.map(str::to_string));
            if *self.fail.lock().unwrap() {
                return Err(Error::connection("connection refused", None));
            }
            let end = match cursor {
                Some(c) => c.parse::<usize>().unwrap(),
                None => self.messages.len(),
            };
            let start = end.saturating_sub(limit as usize);
            let has_more = start > 0;
            Ok(PaginatedMessages {
                messages: self.messages[start..end].to_vec(),
                has_more,
                next_cursor: has_more.then(|| start.to_string()),
            })
        }
    }

    #[derive(Default)]
    struct RecordingView {
        spinner_visible: bool,
        spinner_shows: usize,
        scroll_top: Option<f64>,
        height_per_message: f64,
    }

    impl HistoryView for RecordingView {
        fn show_history_spinner(&mut self) {
            self.spinner_visible = true;
            self.spinner_shows += 1;
        }

        fn hide_history_spinner(&mut self) {
            self.spinner_visible = false;
        }

        fn render_prepended(&mut self, session: &Session) -> f64 {
            session.messages.len() as f64 * self.height_per_message
        }

        fn set_scroll_top(&mut self, scroll_top: f64) {
            self.scroll_top = Some(scroll_top);
        }
    }

    fn store_with_session() -> SessionStore {
        let mut store = SessionStore::new();
        store.insert(Session::new("s", "Sleepy Taco"));
        store
    }

    #[tokio::test]
    async fn pages_are_gapless_and_unique() {
        let source = FakeHistory::new(25);
        let mut store = store_with_session();
        let pager = HistoryPager::new(10);
        let mut view = RecordingView {
            height_per_message: 40.0,
            ..Default::default()
        };

        pager.load_latest(&source, &mut store, "s").await.unwrap();
        assert!(store.get("s").unwrap().has_more);

        let mut loads = 0;
        loop {
            let viewport = Viewport {
                scroll_top: 0.0,
                scroll_height: store.get("s").unwrap().messages.len() as f64 * 40.0,
            };
            match pager
                .load_older(&source, &mut store, "s", &mut view, viewport)
                .await
                .unwrap()
            {
                LoadOutcome::Loaded { .. } => loads += 1,
                LoadOutcome::Exhausted => break,
                LoadOutcome::Busy => panic!("no load should be running"),
            }
        }
        assert_eq!(loads, 2);

        let session = store.get("s").unwrap();
        let ids: Vec<String> = session.messages.iter().map(|m| m.id.clone()).collect();
        let expected: Vec<String> = (0..25).map(|i| format!("m{i:03}")).collect();
        assert_eq!(ids, expected);
        assert!(session.messages.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(
            *source.requests.lock().unwrap(),
            vec![None, Some("15".to_string()), Some("5".to_string())]
        );
    }

    #[tokio::test]
    async fn scroll_is_compensated_by_added_height() {
        let source = FakeHistory::new(30);
        let mut store = store_with_session();
        let pager = HistoryPager::new(10);
        let mut view = RecordingView {
            height_per_message: 50.0,
            ..Default::default()
        };
        pager.load_latest(&source, &mut store, "s").await.unwrap();

        let viewport = Viewport {
            scroll_top: 30.0,
            scroll_height: 500.0,
        };
        let outcome = pager
            .load_older(&source, &mut store, "s", &mut view, viewport)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            LoadOutcome::Loaded {
                added: 10,
                scroll_top: 530.0
            }
        );
        assert_eq!(view.scroll_top, Some(530.0));
        assert!(!view.spinner_visible);
    }

    #[tokio::test]
    async fn spinner_is_removed_on_failure() {
        let source = FakeHistory::new(30);
        let mut store = store_with_session();
        let pager = HistoryPager::new(10);
        let mut view = RecordingView::default();
        pager.load_latest(&source, &mut store, "s").await.unwrap();

        *source.fail.lock().unwrap() = true;
        let result = pager
            .load_older(&source, &mut store, "s", &mut view, Viewport::default())
            .await;
        assert!(result.unwrap_err().is_connection());
        assert_eq!(view.spinner_shows, 1);
        assert!(!view.spinner_visible);
        assert!(!pager.is_loading("s"));
        assert_eq!(store.get("s").unwrap().messages.len(), 10);
    }

    struct SlowHistory(FakeHistory);

    #[async_trait::async_trait]
    impl PageSource for SlowHistory {
        async fn fetch_page(
            &self,
            session_id: &str,
            limit: u32,
            cursor: Option<&str>,
        ) -> Result<PaginatedMessages> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.0.fetch_page(session_id, limit, cursor).await
        }
    }

    #[tokio::test]
    async fn clones_share_one_load_per_session() {
        let source = SlowHistory(FakeHistory::new(30));
        let pager = HistoryPager::new(10);
        let other = pager.clone();
        let mut first_store = store_with_session();
        let mut second_store = store_with_session();
        pager.load_latest(&source, &mut first_store, "s").await.unwrap();
        other.load_latest(&source, &mut second_store, "s").await.unwrap();
        let mut first_view = RecordingView {
            height_per_message: 40.0,
            ..Default::default()
        };
        let mut second_view = RecordingView::default();

        let (first, second) = tokio::join!(
            pager.load_older(&source, &mut first_store, "s", &mut first_view, Viewport::default()),
            other.load_older(&source, &mut second_store, "s", &mut second_view, Viewport::default()),
        );
        assert!(matches!(first.unwrap(), LoadOutcome::Loaded { added: 10, .. }));
        assert_eq!(second.unwrap(), LoadOutcome::Busy);
        assert_eq!(second_view.spinner_shows, 0);
        assert_eq!(second_store.get("s").unwrap().messages.len(), 10);
        assert!(!pager.is_loading("s"));
        assert!(!other.is_loading("s"));
        assert_eq!(source.0.requests.lock().unwrap().len(), 3);
    }

    #[test]
    fn should_load_needs_top_more_and_idle() {
        let pager = HistoryPager::new(10);
        let mut session = Session::new("s", "S");
        let near_top = Viewport {
            scroll_top: 80.0,
            scroll_height: 2000.0,
        };
        let far = Viewport {
            scroll_top: 400.0,
            scroll_height: 2000.0,
        };

        assert!(!pager.should_load(&session, &near_top));
        session.has_more = true;
        assert!(pager.should_load(&session, &near_top));
        assert!(!pager.should_load(&session, &far));

        lock(&pager.in_flight).insert("s".to_string());
        assert!(!pager.should_load(&session, &near_top));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let source = FakeHistory::new(1);
        let mut store = SessionStore::new();
        let pager = HistoryPager::default();
        let mut view = RecordingView::default();
        let err = pager
            .load_older(&source, &mut store, "missing", &mut view, Viewport::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(view.spinner_shows, 0);
    }
}
