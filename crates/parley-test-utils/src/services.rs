use async_trait::async_trait;
use parking_lot::Mutex;
use parley_core::{AssistantService, EnhancedPrompt, EnhancementService, Message, ServiceError};
use std::sync::Arc;
use tokio::sync::Notify;

/// Assistant that answers with a fixed reply and records what it was asked.
#[derive(Default)]
pub struct ScriptedAssistant {
    reply: String,
    calls: Mutex<Vec<(Vec<Message>, String)>>,
}

impl ScriptedAssistant {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    /// History passed with each call.
    pub fn histories(&self) -> Vec<Vec<Message>> {
        self.calls
            .lock()
            .iter()
            .map(|(history, _)| history.clone())
            .collect()
    }
}

#[async_trait]
impl AssistantService for ScriptedAssistant {
    async fn respond(&self, history: &[Message], prompt: &str) -> Result<String, ServiceError> {
        self.calls.lock().push((history.to_vec(), prompt.to_string()));
        Ok(self.reply.clone())
    }
}

/// Assistant that always fails.
#[derive(Debug, Clone, Default)]
pub struct FailingAssistant;

#[async_trait]
impl AssistantService for FailingAssistant {
    async fn respond(&self, _history: &[Message], _prompt: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Request("assistant unavailable".to_string()))
    }
}

/// Assistant that holds every call until released.
pub struct GatedAssistant {
    reply: String,
    entered: Arc<Notify>,
    gate: Arc<Notify>,
}

impl GatedAssistant {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            entered: Arc::new(Notify::new()),
            gate: Arc::new(Notify::new()),
        }
    }

    /// Wait until a call is blocked on the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one blocked call answer.
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl AssistantService for GatedAssistant {
    async fn respond(&self, _history: &[Message], _prompt: &str) -> Result<String, ServiceError> {
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(self.reply.clone())
    }
}

/// Enhancer that returns a fixed rewrite and records its inputs.
#[derive(Default)]
pub struct FixedEnhancer {
    enhanced: String,
    provider: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FixedEnhancer {
    pub fn new(enhanced: impl Into<String>) -> Self {
        Self {
            enhanced: enhanced.into(),
            provider: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl EnhancementService for FixedEnhancer {
    async fn enhance(&self, prompt: &str) -> Result<EnhancedPrompt, ServiceError> {
        self.prompts.lock().push(prompt.to_string());
        Ok(EnhancedPrompt {
            enhanced_prompt: self.enhanced.clone(),
            provider: self.provider.clone(),
        })
    }
}

/// Enhancer that always fails.
#[derive(Debug, Clone, Default)]
pub struct FailingEnhancer;

#[async_trait]
impl EnhancementService for FailingEnhancer {
    async fn enhance(&self, _prompt: &str) -> Result<EnhancedPrompt, ServiceError> {
        Err(ServiceError::Rejected {
            status: 500,
            message: "Failed to enhance prompt".to_string(),
        })
    }
}
