//! Interactive chat loop over stdin.

use crate::commands::Context;
use crate::printer::{print_transcript, stream_events};
use crate::require_owner;
use anyhow::Context as _;
use log::{debug, info};
use parley_backend::open_assistant;
use parley_core::{ConversationSession, SendOutcome, SessionOptions};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "commands: /new, /open <conversation_id>, /reload, /show, /help, /quit";

/// Slash commands accepted at the chat prompt.
#[derive(Debug, PartialEq)]
enum SlashCommand {
    New,
    Open(String),
    Reload,
    Show,
    Help,
    Quit,
}

/// Run the chat loop until stdin closes or `/quit`.
///
/// Session failures are reported by the event printer as notices, so the
/// loop keeps going after a failed send or load.
pub async fn run(context: &Context, conversation: Option<String>) -> anyhow::Result<()> {
    let owner = require_owner(context.owner.as_ref())?.clone();
    let assistant = open_assistant(&context.config).context("failed to open assistant")?;
    let session = ConversationSession::new(
        owner,
        context.gateway.clone(),
        assistant,
        context.sink(),
        SessionOptions::from_config(&context.config),
    );
    let printer = tokio::spawn(stream_events(context.bus.subscribe()));

    if let Some(conversation_id) = conversation {
        if session.open(&conversation_id).await.is_ok() {
            print_transcript(&session.snapshot());
        }
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let command = match parse_slash_command(&line) {
            Ok(command) => command,
            Err(usage) => {
                eprintln!("{usage}");
                continue;
            }
        };
        match command {
            Some(SlashCommand::Quit) => break,
            Some(SlashCommand::Help) => println!("{HELP}"),
            Some(SlashCommand::New) => {
                session.start_new();
                println!("started a new conversation");
            }
            Some(SlashCommand::Open(conversation_id)) => {
                if session.open(&conversation_id).await.is_ok() {
                    print_transcript(&session.snapshot());
                }
            }
            Some(SlashCommand::Reload) => {
                if session.reload().await.is_ok() {
                    print_transcript(&session.snapshot());
                }
            }
            Some(SlashCommand::Show) => print_transcript(&session.snapshot()),
            None if line.trim().is_empty() => continue,
            None => match session.send(&line).await {
                Ok(SendOutcome::Delivered {
                    conversation_id, ..
                }) => debug!("reply delivered (conversation_id={conversation_id})"),
                Ok(SendOutcome::Busy) => eprintln!("still answering the previous message"),
                Err(err) => debug!("send failed: {err}"),
            },
        }
    }

    info!("chat finished (conversation_set={})", session.conversation_id().is_some());
    printer.abort();
    Ok(())
}

/// Parse a slash command from the input line.
fn parse_slash_command(input: &str) -> Result<Option<SlashCommand>, String> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return Ok(None);
    }
    let mut parts = trimmed.trim_start_matches('/').split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(None);
    };
    match command.to_lowercase().as_str() {
        "new" => Ok(Some(SlashCommand::New)),
        "reload" => Ok(Some(SlashCommand::Reload)),
        "show" => Ok(Some(SlashCommand::Show)),
        "help" => Ok(Some(SlashCommand::Help)),
        "quit" | "exit" => Ok(Some(SlashCommand::Quit)),
        "open" => match parts.next() {
            Some(id) => Ok(Some(SlashCommand::Open(id.to_string()))),
            None => Err("usage: /open <conversation_id>".to_string()),
        },
        other => Err(format!("unknown command: /{other}")),
    }
}
