//! The client-side session list and its on-disk mirror.
//!
//! The store is a cache of what the backend holds.  Local writes (an
//! optimistic user message, a reply appended before the refresh) are
//! provisional; [`SessionStore::apply_latest_page`] lets the backend's copy
//! overwrite them.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{from_reader, to_writer_pretty};

use crate::error::{Error, Result};
use crate::types::{Message, PaginatedMessages, Session, SessionDescriptor};

/// In-memory sessions plus the id of the current one.
///
/// Sessions are kept newest first, the order the sidebar shows them in.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Vec<Session>,
    current: Option<String>,
    provisional: HashSet<String>,
}

impl SessionStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding `sessions`, with no current session.
    pub fn from_sessions(sessions: Vec<Session>) -> Self {
        Self {
            sessions,
            current: None,
            provisional: HashSet::new(),
        }
    }

    /// All sessions, newest first.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Look up a session.
    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Look up a session for mutation.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    /// Look up a session that must exist.
    pub fn require(&self, id: &str) -> Result<&Session> {
        self.get(id).ok_or_else(|| Error::session_not_found(id))
    }

    /// Look up a session that must exist, for mutation.
    pub fn require_mut(&mut self, id: &str) -> Result<&mut Session> {
        self.get_mut(id).ok_or_else(|| Error::session_not_found(id))
    }

    /// Display names of every session.
    pub fn names(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.name.clone()).collect()
    }

    /// The current session id.
    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// The current session.
    pub fn current(&self) -> Option<&Session> {
        self.current.as_deref().and_then(|id| self.get(id))
    }

    /// Make `id` the current session.
    pub fn set_current(&mut self, id: &str) -> Result<()> {
        self.require(id)?;
        self.current = Some(id.to_string());
        Ok(())
    }

    /// Add a session at the top of the list.
    pub fn insert(&mut self, session: Session) {
        self.sessions.retain(|s| s.id != session.id);
        self.sessions.insert(0, session);
    }

    /// Remove a session.  If it was current, the next one in the list
    /// becomes current.
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        let index = self.sessions.iter().position(|s| s.id == id)?;
        let removed = self.sessions.remove(index);
        if self.current.as_deref() == Some(id) {
            self.current = self.sessions.first().map(|s| s.id.clone());
        }
        Some(removed)
    }

    /// Replace the list with the backend's metadata.
    ///
    /// Messages already loaded for a session that is still present are kept,
    /// as is its pagination state.  The current session survives if it is
    /// still listed.
    pub fn sync_metadata(&mut self, descriptors: Vec<SessionDescriptor>) {
        let mut previous: Vec<Session> = std::mem::take(&mut self.sessions);
        for descriptor in descriptors {
            let mut session = Session::from(descriptor);
            if let Some(index) = previous.iter().position(|s| s.id == session.id) {
                let old = previous.swap_remove(index);
                if !old.messages.is_empty() {
                    session.messages = old.messages;
                    session.next_cursor = old.next_cursor;
                    session.has_more = old.has_more;
                }
            }
            self.sessions.push(session);
        }
        if let Some(current) = &self.current {
            if self.get(current).is_none() {
                self.current = None;
            }
        }
    }

    /// Append a locally created message to a session.
    ///
    /// The message stays provisional until a page from the backend replaces it.
    pub fn push_message(&mut self, session_id: &str, message: Message) -> Result<()> {
        let id = message.id.clone();
        self.require_mut(session_id)?.push_message(message);
        self.provisional.insert(id);
        Ok(())
    }

    /// Returns true if `message_id` was appended locally and not yet replaced.
    pub fn is_provisional(&self, message_id: &str) -> bool {
        self.provisional.contains(message_id)
    }

    /// Remove one message; returns true if it was present.
    pub fn remove_message(&mut self, session_id: &str, message_id: &str) -> Result<bool> {
        let session = self.require_mut(session_id)?;
        let before = session.messages.len();
        session.messages.retain(|m| m.id != message_id);
        let removed = session.messages.len() != before;
        if removed {
            session.message_count = session.message_count.saturating_sub(1);
        }
        self.provisional.remove(message_id);
        Ok(removed)
    }

    /// Let the newest page from the backend replace the local view of a session.
    ///
    /// Loaded messages that precede the page are kept, unless they are
    /// provisional.  Everything else, including provisional local messages,
    /// is replaced.  A message precedes the page if it sits before the page's
    /// oldest message in the local list, or, when that message was never
    /// loaded, if it is older by timestamp.
    pub fn apply_latest_page(&mut self, session_id: &str, page: PaginatedMessages) -> Result<()> {
        let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) else {
            return Err(Error::session_not_found(session_id));
        };
        let page_ids: HashSet<&str> = page.messages.iter().map(|m| m.id.as_str()).collect();
        let retained: Vec<Message> = match page.messages.first() {
            Some(oldest) => {
                let position = session.messages.iter().position(|m| m.id == oldest.id);
                let before = match position {
                    Some(index) => &session.messages[..index],
                    None => &session.messages[..],
                };
                before
                    .iter()
                    .filter(|m| position.is_some() || m.timestamp < oldest.timestamp)
                    .filter(|m| !self.provisional.contains(&m.id) && !page_ids.contains(m.id.as_str()))
                    .cloned()
                    .collect()
            }
            None => Vec::new(),
        };
        for message in &session.messages {
            self.provisional.remove(&message.id);
        }
        if retained.is_empty() {
            session.next_cursor = page.next_cursor;
            session.has_more = page.has_more;
        }
        let mut messages = retained;
        messages.extend(page.messages);
        session.messages = messages;
        session.message_count = session.message_count.max(session.messages.len() as u32);
        session.user_message_count = session
            .user_message_count
            .max(session.loaded_user_messages() as u32);
        Ok(())
    }

    /// Put an older page in front of a session's messages.
    ///
    /// Messages already loaded are skipped.  Returns how many were added.
    pub fn prepend_older(&mut self, session_id: &str, page: PaginatedMessages) -> Result<usize> {
        let session = self.require_mut(session_id)?;
        let known: HashSet<String> = session.messages.iter().map(|m| m.id.clone()).collect();
        let mut older: Vec<Message> = page
            .messages
            .into_iter()
            .filter(|m| !known.contains(&m.id))
            .collect();
        let added = older.len();
        older.append(&mut session.messages);
        session.messages = older;
        session.next_cursor = page.next_cursor;
        session.has_more = page.has_more && session.next_cursor.is_some();
        Ok(added)
    }
}

/// Name of the cache file under the cache directory.
pub const CACHE_FILE: &str = "aria-chat-sessions.json";

const SIDEBAR_FILE: &str = "sidebar-collapsed";

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u8,
    sessions: Vec<Session>,
}

/// Best-effort mirror of the session list on disk.
///
/// Used only when the backend cannot be reached; it is never authoritative.
#[derive(Debug, Clone)]
pub struct LocalCache {
    dir: PathBuf,
}

impl LocalCache {
    /// A cache rooted at `dir`.  Nothing is touched until the first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory the cache lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The session cache file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    /// Write `sessions` to disk.
    pub fn save(&self, sessions: &[Session]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|err| Error::io("failed to create cache directory", err))?;
        let file = File::create(self.path())
            .map_err(|err| Error::io("failed to create session cache", err))?;
        let cache = CacheFile {
            version: 1,
            sessions: sessions.to_vec(),
        };
        to_writer_pretty(BufWriter::new(file), &cache).map_err(|err| {
            Error::serialization("failed to serialize session cache", Some(Box::new(err)))
        })
    }

    /// Read the cached sessions.  A missing cache is an empty list.
    pub fn load(&self) -> Result<Vec<Session>> {
        let file = match File::open(self.path()) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::io("failed to open session cache", err)),
        };
        let cache: CacheFile = from_reader(BufReader::new(file)).map_err(|err| {
            Error::serialization("failed to parse session cache", Some(Box::new(err)))
        })?;
        Ok(cache.sessions)
    }

    /// Whether the sidebar was last left collapsed.
    pub fn sidebar_collapsed(&self) -> bool {
        fs::read_to_string(self.dir.join(SIDEBAR_FILE))
            .map(|s| s.trim() == "1")
            .unwrap_or(false)
    }

    /// Remember the sidebar state.
    pub fn set_sidebar_collapsed(&self, collapsed: bool) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|err| Error::io("failed to create cache directory", err))?;
        fs::write(self.dir.join(SIDEBAR_FILE), if collapsed { "1" } else { "0" })
            .map_err(|err| Error::io("failed to save sidebar state", err))
    }
}
