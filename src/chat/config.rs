//! Configuration types for the chat front-end.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved
//! configuration the controllers are built from.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::client::RequestFormat;
use crate::pager::DEFAULT_PAGE_SIZE;

/// Default API location when neither `--base-url` nor `ARIA_API_URL` is set.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(360);

/// Default wait for the diagram library.
pub const DEFAULT_DIAGRAM_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Command-line arguments for the aria-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the API.
    #[arrrg(optional, "API base URL (default: $ARIA_API_URL or http://localhost:8000)", "URL")]
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    #[arrrg(optional, "Request timeout in seconds (default: 360)", "SECONDS")]
    pub timeout: Option<u64>,

    /// Messages fetched per history page.
    #[arrrg(optional, "Messages per history page (default: 50)", "COUNT")]
    pub page_size: Option<u32>,

    /// Directory for the offline session cache.
    #[arrrg(optional, "Directory for the offline session cache", "DIR")]
    pub cache_dir: Option<String>,

    /// How long to wait for the diagram library, in milliseconds.
    #[arrrg(optional, "Diagram library wait in milliseconds (default: 15000)", "MILLIS")]
    pub diagram_timeout: Option<u64>,

    /// Always send messages as multipart form data.
    #[arrrg(flag, "Send messages as multipart even without attachments")]
    pub multipart: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Log at debug level.
    #[arrrg(flag, "Enable debug logging on stderr")]
    pub verbose: bool,
}

/// Resolved configuration for the chat front-end.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Base URL of the API.
    pub base_url: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Messages fetched per history page.
    pub page_size: u32,

    /// Directory for the offline session cache; `None` disables it.
    pub cache_dir: Option<PathBuf>,

    /// How long to wait for the diagram library.
    pub diagram_timeout: Duration,

    /// How message bodies are encoded.
    pub request_format: RequestFormat,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Whether to log at debug level.
    pub verbose: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// The base URL comes from `ARIA_API_URL` when it is set.
    pub fn new() -> Self {
        Self {
            base_url: env::var("ARIA_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            timeout: DEFAULT_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
            cache_dir: default_cache_dir(),
            diagram_timeout: DEFAULT_DIAGRAM_TIMEOUT,
            request_format: RequestFormat::Auto,
            use_color: true,
            verbose: false,
        }
    }

    /// Sets the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the history page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets or disables the cache directory.
    pub fn with_cache_dir(mut self, cache_dir: Option<PathBuf>) -> Self {
        self.cache_dir = cache_dir;
        self
    }

    /// Sets the diagram library wait.
    pub fn with_diagram_timeout(mut self, timeout: Duration) -> Self {
        self.diagram_timeout = timeout;
        self
    }

    /// Sets the request encoding.
    pub fn with_request_format(mut self, format: RequestFormat) -> Self {
        self.request_format = format;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let defaults = ChatConfig::new();
        ChatConfig {
            base_url: args.base_url.unwrap_or(defaults.base_url),
            timeout: args.timeout.map(Duration::from_secs).unwrap_or(DEFAULT_TIMEOUT),
            page_size: args.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1),
            cache_dir: args.cache_dir.map(PathBuf::from).or(defaults.cache_dir),
            diagram_timeout: args
                .diagram_timeout
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_DIAGRAM_TIMEOUT),
            request_format: if args.multipart {
                RequestFormat::Multipart
            } else {
                RequestFormat::Auto
            },
            use_color: !args.no_color,
            verbose: args.verbose,
        }
    }
}

/// `$XDG_CACHE_HOME/aria-chat`, else `$HOME/.cache/aria-chat`.
fn default_cache_dir() -> Option<PathBuf> {
    env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .map(|dir| dir.join("aria-chat"))
}
