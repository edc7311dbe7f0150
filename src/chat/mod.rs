//! The chat front-end built on the aria-chat client library.
//!
//! This module ties the pieces of the library into an interactive client:
//!
//! - Streaming replies shown as they arrive, then replaced by the server's copy
//! - Sessions listed, searched, created, switched, and deleted
//! - Attachments validated before they are sent
//! - Slash commands for everything that is not a message
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`backend`]: the server calls the controller depends on
//! - [`controller`]: the chat state machine and session management
//! - [`commands`]: slash command parsing

mod backend;
mod commands;
mod config;
mod controller;

pub use backend::ChatBackend;
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, DEFAULT_BASE_URL, DEFAULT_DIAGRAM_TIMEOUT, DEFAULT_TIMEOUT};
pub use controller::{ChatController, ChatState, SubmitOutcome};
