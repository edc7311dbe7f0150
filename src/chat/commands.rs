//! Slash command parsing for the chat front-end.
//!
//! Input starting with `/` controls the client instead of being sent as a
//! message.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Create a session, optionally named.
    New(Option<String>),

    /// List sessions.
    Sessions,

    /// Switch to a session by list position or id.
    Switch(String),

    /// Delete a session by list position or id; `None` is the current one.
    Delete(Option<String>),

    /// Filter the session list; an empty query clears the filter.
    Search(String),

    /// Search message text on the server.
    Find(String),

    /// Attach a file to the next message.
    Attach(String),

    /// Remove an attachment by its 1-based position.
    Detach(usize),

    /// List pending attachments.
    Files,

    /// Load older messages of the current session.
    Older,

    /// Ask the server to improve a draft prompt.
    Improve(String),

    /// Set or change the current session's password.
    PasswordSet {
        /// The existing password; empty if none.
        current: String,
        /// The new password.
        new: String,
    },

    /// Remove the current session's password.
    PasswordRemove(Option<String>),

    /// Check a password against the current session.
    PasswordCheck(String),

    /// Delete a message of the current session by id.
    DeleteMessage(String),

    /// Collapse or expand the sidebar.
    Sidebar,

    /// Check the API's health.
    Health,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be sent as a message.
///
/// # Examples
///
/// ```
/// # use aria_chat::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/switch 2").is_some());
/// assert!(parse_command("Hello, Aria!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "new" => ChatCommand::New(argument.map(str::to_string)),
        "sessions" | "ls" => ChatCommand::Sessions,
        "switch" => required(argument, "/switch requires a session number or id", ChatCommand::Switch),
        "delete" | "rm" => ChatCommand::Delete(argument.map(str::to_string)),
        "search" => ChatCommand::Search(argument.unwrap_or_default().to_string()),
        "find" => required(argument, "/find requires a query", ChatCommand::Find),
        "attach" => required(argument, "/attach requires a file path", ChatCommand::Attach),
        "detach" => match argument.map(str::parse::<usize>) {
            Some(Ok(index)) if index > 0 => ChatCommand::Detach(index),
            _ => ChatCommand::Invalid("/detach expects an attachment number".to_string()),
        },
        "files" => ChatCommand::Files,
        "older" | "more" => ChatCommand::Older,
        "improve" => required(argument, "/improve requires the text to improve", ChatCommand::Improve),
        "password" => parse_password_command(argument),
        "unsend" => required(argument, "/unsend requires a message id", ChatCommand::DeleteMessage),
        "sidebar" => ChatCommand::Sidebar,
        "health" => ChatCommand::Health,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn required<F>(argument: Option<&str>, message: &str, constructor: F) -> ChatCommand
where
    F: Fn(String) -> ChatCommand,
{
    match argument {
        Some(arg) => constructor(arg.to_string()),
        None => ChatCommand::Invalid(message.to_string()),
    }
}

fn parse_password_command(argument: Option<&str>) -> ChatCommand {
    let Some(arg) = argument else {
        return ChatCommand::Invalid(
            "/password requires 'set', 'remove', or 'check'".to_string(),
        );
    };

    let words: Vec<&str> = arg.split_whitespace().collect();
    match words.as_slice() {
        ["set", new] => ChatCommand::PasswordSet {
            current: String::new(),
            new: new.to_string(),
        },
        ["set", current, new] => ChatCommand::PasswordSet {
            current: current.to_string(),
            new: new.to_string(),
        },
        ["set", ..] => ChatCommand::Invalid("/password set [current] <new>".to_string()),
        ["remove"] => ChatCommand::PasswordRemove(None),
        ["remove", current] => ChatCommand::PasswordRemove(Some(current.to_string())),
        ["check", password] => ChatCommand::PasswordCheck(password.to_string()),
        ["check", ..] => ChatCommand::Invalid("/password check <password>".to_string()),
        _ => ChatCommand::Invalid(
            "Unrecognized /password action (use set, remove, or check)".to_string(),
        ),
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /new [name]                    Start a new session
  /sessions                      List sessions
  /switch <n|id>                 Switch to a session
  /delete [n|id]                 Delete a session (default: current)
  /search [query]                Filter the session list (no query clears it)
  /find <query>                  Search messages on the server
  /attach <path>                 Attach a file to the next message
  /detach <n>                    Remove an attachment
  /files                         List attachments
  /older                         Load older messages
  /improve <text>                Suggest a clearer prompt
  /password set [current] <new>  Protect the current session
  /password remove [current]     Remove the password
  /password check <password>     Check a password
  /unsend <message-id>           Delete a message
  /sidebar                       Collapse or expand the session list
  /health                        Check the server
  /help                          Show this help message
  /quit                          Exit the chat"#
}
