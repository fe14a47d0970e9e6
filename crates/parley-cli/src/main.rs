//! Line-oriented front end for Parley conversations and prompt enhancement.

mod chat;
mod commands;
mod printer;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use log::{debug, info};
use parley_config::{ParleyConfig, StoreBackend};
use parley_core::OwnerId;
use std::path::PathBuf;

const STORE_URL_ENV: &str = "PARLEY_STORE_URL";
const API_KEY_ENV: &str = "PARLEY_API_KEY";

/// Command-line options for the Parley client.
#[derive(Parser)]
#[command(name = "parley", version)]
struct Cli {
    /// Optional path to a parley.json5 config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Authenticated user id that owns conversations and enhancements
    #[arg(long, env = "PARLEY_USER")]
    user: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chat with the assistant, one message per line
    Chat {
        /// Continue a stored conversation
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Enhance a prompt and record it in the history
    Enhance {
        /// Prompt text; joined with spaces
        #[arg(required = true)]
        prompt: Vec<String>,
    },
    /// List recorded enhancements, newest first
    Enhancements,
    /// Delete a recorded enhancement
    DeleteEnhancement { id: String },
    /// List conversations, most recently updated first
    Conversations,
    /// Delete a conversation and its messages
    DeleteConversation { id: String },
}

/// Entry point for the Parley CLI.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();

    let cli = Cli::parse();
    info!(
        "starting parley (config_set={}, user_set={})",
        cli.config.is_some(),
        cli.user.is_some()
    );
    let mut config = load_config(cli.config.as_ref())?;
    apply_env_overrides(
        &mut config,
        std::env::var(STORE_URL_ENV).ok(),
        std::env::var(API_KEY_ENV).ok(),
    );
    config.validate().context("invalid configuration")?;

    let owner = cli.user.as_deref().map(OwnerId::new);
    let context = commands::Context::open(config, owner)?;
    match cli.command {
        Command::Chat { conversation } => chat::run(&context, conversation).await,
        Command::Enhance { prompt } => commands::enhance(&context, &prompt.join(" ")).await,
        Command::Enhancements => commands::list_enhancements(&context).await,
        Command::DeleteEnhancement { id } => commands::delete_enhancement(&context, &id).await,
        Command::Conversations => commands::list_conversations(&context).await,
        Command::DeleteConversation { id } => commands::delete_conversation(&context, &id).await,
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ParleyConfig> {
    if let Some(path) = path {
        info!("loading config from path: {}", path.display());
        return ParleyConfig::load_from_path(path).context("failed to load config");
    }
    let cwd = std::env::current_dir().context("cwd")?;
    info!("loading layered config from cwd: {}", cwd.display());
    let layered = ParleyConfig::load_layered(&cwd).context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    Ok(layered.config)
}

/// A store URL from the environment selects the REST backend.
fn apply_env_overrides(config: &mut ParleyConfig, url: Option<String>, api_key: Option<String>) {
    if let Some(url) = url.filter(|url| !url.trim().is_empty()) {
        config.store.backend = StoreBackend::Rest;
        config.store.url = Some(url);
    }
    if let Some(key) = api_key.filter(|key| !key.trim().is_empty()) {
        config.store.api_key = Some(key);
    }
}

/// Owner required by commands that only make sense for a signed-in user.
fn require_owner(owner: Option<&OwnerId>) -> anyhow::Result<&OwnerId> {
    owner.ok_or_else(|| anyhow!("--user (or PARLEY_USER) is required for this command"))
}
