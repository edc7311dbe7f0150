//! Client library for the Aria chat API.
//!
//! [`AriaClient`] speaks to the server; the remaining modules hold the pieces
//! a chat front-end is built from, and [`chat`] assembles them into one.

// Public modules
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod diagram;
pub mod error;
pub mod events;
pub mod fragment;
pub mod markdown;
pub mod names;
pub mod observability;
pub mod pager;
pub mod render;
pub mod sidebar;
pub mod store;
pub mod stream;
pub mod types;
pub mod upload;
pub mod utils;

// Re-exports
pub use chat::{ChatBackend, ChatController, ChatState, SubmitOutcome};
pub use client::{AriaClient, RequestFormat};
pub use client_logger::{ClientLogger, TraceLogger};
pub use diagram::{DiagramOptions, DiagramRenderer};
pub use error::{Error, Result};
pub use events::{AppEvent, EventBus};
pub use fragment::Fragment;
pub use observability::register_biometrics;
pub use pager::{HistoryPager, LoadOutcome, PageSource, Viewport};
pub use render::{PlainTextRenderer, Renderer, ToastKind};
pub use store::{LocalCache, SessionStore};
pub use types::*;
pub use upload::{Attachment, UploadController, UploadPolicy};
