// Public modules
pub mod health;
pub mod message;
pub mod pagination;
pub mod password;
pub mod prompt;
pub mod search;
pub mod session;

// Re-exports
pub use health::HealthStatus;
pub use message::{FileReference, Message, Role, STREAMING_MESSAGE_ID};
pub use pagination::PaginatedMessages;
pub use password::{PasswordResponse, ValidationResponse};
pub use prompt::ImprovedPrompt;
pub use search::SearchResult;
pub use session::{Session, SessionDescriptor};
