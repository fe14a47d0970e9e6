//! One-shot commands: enhancement and conversation history.

use crate::printer::report_notices;
use crate::require_owner;
use anyhow::Context as _;
use async_trait::async_trait;
use log::info;
use parley_backend::{open_enhancer, open_gateway};
use parley_config::ParleyConfig;
use parley_core::{
    ConversationHistory, EnhancedPrompt, EnhancementService, EnhancementSession, EventBus,
    EventSink, OwnerId, PersistenceGateway, ServiceError,
};
use std::sync::Arc;

/// Backends and event bus shared by every command.
pub struct Context {
    pub config: ParleyConfig,
    pub owner: Option<OwnerId>,
    pub gateway: PersistenceGateway,
    pub bus: EventBus,
}

impl Context {
    pub fn open(config: ParleyConfig, owner: Option<OwnerId>) -> anyhow::Result<Self> {
        let gateway = open_gateway(&config).context("failed to open store")?;
        let bus = EventBus::new(config.session.event_buffer);
        Ok(Self {
            config,
            owner,
            gateway,
            bus,
        })
    }

    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::new(self.bus.clone())
    }

    fn enhancement_session(&self) -> EnhancementSession {
        let enhancer: Arc<dyn EnhancementService> = match open_enhancer(&self.config) {
            Ok(enhancer) => enhancer,
            Err(err) => Arc::new(UnconfiguredEnhancer {
                reason: err.to_string(),
            }),
        };
        EnhancementSession::new(
            self.owner.clone(),
            self.gateway.enhancements.clone(),
            enhancer,
            self.sink(),
            self.config.enhancements.default_provider.clone(),
        )
    }

    fn conversation_history(&self) -> anyhow::Result<ConversationHistory> {
        let owner = require_owner(self.owner.as_ref())?;
        Ok(ConversationHistory::new(
            owner.clone(),
            self.gateway.conversations.clone(),
            self.sink(),
        ))
    }
}

/// Stands in when no functions endpoint is configured, so history
/// commands still work while enhancing reports why it cannot.
struct UnconfiguredEnhancer {
    reason: String,
}

#[async_trait]
impl EnhancementService for UnconfiguredEnhancer {
    async fn enhance(&self, _prompt: &str) -> Result<EnhancedPrompt, ServiceError> {
        Err(ServiceError::Request(self.reason.clone()))
    }
}

pub async fn enhance(context: &Context, prompt: &str) -> anyhow::Result<()> {
    let mut rx = context.bus.subscribe();
    let session = context.enhancement_session();
    let result = session.enhance(prompt).await;
    report_notices(&mut rx);
    let outcome = result.context("failed to enhance prompt")?;
    match &outcome.record {
        Some(record) => info!("enhancement recorded (enhancement_id={})", record.id),
        None => info!("enhancement not recorded"),
    }
    println!("{}", outcome.enhanced_prompt);
    Ok(())
}

pub async fn list_enhancements(context: &Context) -> anyhow::Result<()> {
    require_owner(context.owner.as_ref())?;
    let session = context.enhancement_session();
    session
        .load_history()
        .await
        .context("failed to load enhancement history")?;
    let history = session.history();
    if history.is_empty() {
        println!("no enhancements yet");
    }
    for record in history {
        println!(
            "{}  {}  [{}]",
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.provider
        );
        println!("  original: {}", record.original_prompt);
        println!("  enhanced: {}", record.enhanced_prompt);
    }
    Ok(())
}

pub async fn delete_enhancement(context: &Context, id: &str) -> anyhow::Result<()> {
    require_owner(context.owner.as_ref())?;
    context
        .enhancement_session()
        .delete(id)
        .await
        .with_context(|| format!("failed to delete enhancement {id}"))?;
    println!("deleted enhancement {id}");
    Ok(())
}

pub async fn list_conversations(context: &Context) -> anyhow::Result<()> {
    let history = context.conversation_history()?;
    let conversations = history.load().await.context("failed to load conversations")?;
    if conversations.is_empty() {
        println!("no conversations yet");
    }
    for conversation in conversations {
        println!(
            "{}  {}  {}",
            conversation.id,
            conversation.updated_at.format("%Y-%m-%d %H:%M"),
            conversation.title
        );
    }
    Ok(())
}

pub async fn delete_conversation(context: &Context, id: &str) -> anyhow::Result<()> {
    context
        .conversation_history()?
        .delete(id)
        .await
        .with_context(|| format!("failed to delete conversation {id}"))?;
    println!("deleted conversation {id}");
    Ok(())
}
