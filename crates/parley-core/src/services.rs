//! Boundaries to the text services the sessions call.

use crate::types::Message;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the assistant and enhancement services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Request(String),
    /// The service answered with an error.
    #[error("service rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The service answered with a body the client could not interpret.
    #[error("unexpected service response: {0}")]
    Decode(String),
    /// The service answered successfully but without any text.
    #[error("service returned an empty response")]
    EmptyResponse,
}

/// Produces assistant replies.
#[async_trait]
pub trait AssistantService: Send + Sync {
    /// Reply to `prompt`, given the settled messages of the conversation so far.
    async fn respond(&self, history: &[Message], prompt: &str) -> Result<String, ServiceError>;
}

/// Result of an enhancement call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancedPrompt {
    pub enhanced_prompt: String,
    /// Label of the producing service, when it reports one.
    pub provider: Option<String>,
}

/// Rewrites prompts.
#[async_trait]
pub trait EnhancementService: Send + Sync {
    async fn enhance(&self, prompt: &str) -> Result<EnhancedPrompt, ServiceError>;
}

/// Local assistant that answers every prompt with a canned reply.
#[derive(Debug, Clone, Default)]
pub struct EchoAssistant {
    latency: Duration,
}

impl EchoAssistant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait `latency` before answering.
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }

    pub fn reply_to(prompt: &str) -> String {
        format!(
            "I understand you're asking about: \"{prompt}\". This is a simulated AI response. \
             In a real implementation, you would connect this to your AI service endpoint to get \
             actual intelligent responses."
        )
    }
}

#[async_trait]
impl AssistantService for EchoAssistant {
    async fn respond(&self, _history: &[Message], prompt: &str) -> Result<String, ServiceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(Self::reply_to(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::{AssistantService, EchoAssistant};

    #[tokio::test]
    async fn echo_quotes_the_prompt() {
        let reply = EchoAssistant::new().respond(&[], "hello").await.expect("reply");
        assert!(reply.starts_with("I understand you're asking about: \"hello\"."));
        assert!(reply.ends_with("actual intelligent responses."));
    }
}
