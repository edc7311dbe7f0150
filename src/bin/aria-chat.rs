//! Interactive terminal client for the Aria chat API.
//!
//! # Usage
//!
//! ```bash
//! # Talk to a local server
//! aria-chat
//!
//! # Talk to another server, without colors
//! aria-chat --base-url http://aria.internal:8000 --no-color
//!
//! # Debug logging on stderr
//! ARIA_LOG=aria_chat=trace aria-chat
//! ```
//!
//! Anything not starting with `/` is sent as a message; `/help` lists the
//! commands.

use std::path::Path;
use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use aria_chat::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatController, SubmitOutcome, help_text, parse_command,
};
use aria_chat::client_logger::TraceLogger;
use aria_chat::diagram::{DiagramOptions, DiagramRenderer, OutlineEngine, Preloaded};
use aria_chat::pager::{LoadOutcome, Viewport};
use aria_chat::render::{PlainTextRenderer, Renderer};
use aria_chat::utils::format::format_file_size;
use aria_chat::{AriaClient, Error};

type Controller = ChatController<AriaClient, PlainTextRenderer>;

/// Main entry point for the aria-chat application.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("aria-chat [OPTIONS]");
    let config = ChatConfig::from(args);

    let default_level = if config.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("ARIA_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let client = AriaClient::with_options(Some(config.base_url.clone()), Some(config.timeout))?
        .with_request_format(config.request_format)
        .with_logger(Arc::new(TraceLogger));
    let diagrams = DiagramRenderer::with_options(
        Arc::new(Preloaded(Arc::new(OutlineEngine))),
        DiagramOptions {
            library_timeout: config.diagram_timeout,
            ..DiagramOptions::default()
        },
    );
    let renderer = PlainTextRenderer::with_color(config.use_color);
    let mut chat = ChatController::from_config(client, renderer, diagrams, &config);
    let mut rl = DefaultEditor::new()?;

    println!("Aria Chat ({})", config.base_url);
    println!("Type /help for commands, /quit to exit");

    if let Err(err) = chat.start().await {
        chat.report_error(&err);
        return Err(err.into());
    }

    loop {
        let prefill = chat.input().to_string();
        let readline = if prefill.is_empty() {
            rl.readline("You: ")
        } else {
            rl.readline_with_initial("You: ", (&prefill, ""))
        };

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    chat.set_input("");
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    chat.set_input("");
                    if matches!(cmd, ChatCommand::Quit) {
                        println!("Goodbye!");
                        break;
                    }
                    if let Err(err) = run_command(&mut chat, cmd).await {
                        chat.report_error(&err);
                    }
                    if chat.pump_events() && !chat.sidebar().is_collapsed() {
                        chat.show_sidebar();
                    }
                    continue;
                }

                chat.set_input(line);
                if let SubmitOutcome::Busy = chat.submit().await {
                    chat.view_mut().print_error("A message is already being sent.");
                }
                chat.pump_events();
            }
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                chat.view_mut().print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    chat.save_cache();
    Ok(())
}

async fn run_command(chat: &mut Controller, cmd: ChatCommand) -> Result<(), Error> {
    match cmd {
        ChatCommand::New(name) => {
            chat.new_session(name).await?;
        }
        ChatCommand::Sessions => chat.show_sidebar(),
        ChatCommand::Switch(reference) => {
            let id = resolve(chat, &reference)?;
            chat.switch_session(&id).await?;
        }
        ChatCommand::Delete(reference) => {
            let id = match reference {
                Some(reference) => resolve(chat, &reference)?,
                None => chat
                    .current_session_id()
                    .map(str::to_string)
                    .ok_or_else(|| Error::validation("No session is selected", None))?,
            };
            chat.delete_session(&id).await?;
        }
        ChatCommand::Search(query) => chat.search(&query),
        ChatCommand::Find(query) => {
            let results = chat.find(&query).await?;
            if results.is_empty() {
                chat.view_mut().print_info("No messages found.");
            }
            for result in results {
                let session = result.session_name.unwrap_or(result.session_id);
                let preview: String = result.message.content.chars().take(80).collect();
                chat.view_mut()
                    .print_info(&format!("  [{session}] {}: {preview}", result.message.role));
            }
        }
        ChatCommand::Attach(path) => {
            chat.attach(Path::new(&path))?;
            if let Some(file) = chat.uploads().files().last() {
                let line = format!("Attached {} ({})", file.name, format_file_size(file.size()));
                chat.view_mut().print_info(&line);
            }
        }
        ChatCommand::Detach(position) => match chat.detach(position) {
            Some(file) => chat.view_mut().print_info(&format!("Removed {}", file.name)),
            None => chat.view_mut().print_error("No such attachment."),
        },
        ChatCommand::Files => {
            let lines: Vec<String> = chat
                .uploads()
                .files()
                .iter()
                .enumerate()
                .map(|(i, f)| format!("  {}. {} ({})", i + 1, f.name, format_file_size(f.size())))
                .collect();
            if lines.is_empty() {
                chat.view_mut().print_info("No files attached.");
            }
            for line in lines {
                chat.view_mut().print_info(&line);
            }
        }
        ChatCommand::Older => match chat.load_older(Viewport::default()).await? {
            LoadOutcome::Loaded { added, .. } => {
                chat.view_mut()
                    .print_info(&format!("Loaded {added} older messages."));
            }
            LoadOutcome::Exhausted => chat.view_mut().print_info("No older messages."),
            LoadOutcome::Busy => chat.view_mut().print_info("Already loading."),
        },
        ChatCommand::Improve(text) => {
            let improved = chat.improve_prompt(&text).await?;
            if !improved.explanation.is_empty() {
                chat.view_mut().print_info(&improved.explanation);
            }
            chat.view_mut()
                .print_info("Edit the suggestion below and press Enter to send it.");
        }
        ChatCommand::PasswordSet { current, new } => {
            chat.set_password(&current, &new).await?;
        }
        ChatCommand::PasswordRemove(current) => {
            chat.remove_password(current.as_deref()).await?;
        }
        ChatCommand::PasswordCheck(password) => {
            let response = chat.check_password(&password).await?;
            if response.valid {
                chat.view_mut().print_info("Password is correct.");
            } else {
                let reason = response.error.unwrap_or_else(|| "Password is incorrect".to_string());
                chat.view_mut().print_error(&reason);
            }
        }
        ChatCommand::DeleteMessage(id) => chat.delete_message(&id).await?,
        ChatCommand::Sidebar => {
            chat.toggle_sidebar();
        }
        ChatCommand::Health => {
            let health = chat.health().await?;
            let line = format!(
                "Server {} (model: {}, up {}s)",
                health.status, health.model, health.uptime
            );
            chat.view_mut().print_info(&line);
        }
        ChatCommand::Help => {
            for line in help_text().lines() {
                chat.view_mut().print_info(&format!("    {}", line));
            }
        }
        ChatCommand::Invalid(message) => chat.view_mut().print_error(&message),
        ChatCommand::Quit => {}
    }
    Ok(())
}

fn resolve(chat: &Controller, reference: &str) -> Result<String, Error> {
    chat.resolve_session(reference).ok_or_else(|| {
        Error::not_found(format!("No session matches '{reference}'"), None, None)
    })
}
