//! Hosted text functions: assistant replies and prompt enhancement.

use crate::error::BackendError;
use async_trait::async_trait;
use log::{debug, warn};
use parley_core::{AssistantService, EnhancedPrompt, EnhancementService, Message, ServiceError};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CHAT_FUNCTION: &str = "chat";
const ENHANCE_FUNCTION: &str = "enhance-prompt";

/// Thin client for `POST <base>/<function>` calls with a JSON body.
#[derive(Debug, Clone)]
pub struct FunctionsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl FunctionsClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn function_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    /// Invoke a function and decode its JSON reply.
    pub async fn invoke<B, T>(&self, name: &str, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.function_url(name);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {key}"));
        }
        let response = request
            .send()
            .await
            .map_err(|err| ServiceError::Request(err.to_string()))?;
        let status = response.status();
        debug!("function replied (function={}, status={})", name, status);
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|err| ServiceError::Decode(format!("failed to parse response: {err}")))
        } else {
            let body = response.text().await.unwrap_or_default();
            let error = function_error(status, &body, name);
            warn!("function failed (function={}, error={})", name, error);
            Err(error)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    error: Option<String>,
}

fn function_error(status: StatusCode, body: &str, name: &str) -> ServiceError {
    let message = serde_json::from_str::<ErrorReply>(body)
        .ok()
        .and_then(|reply| reply.error)
        .unwrap_or_else(|| format!("function {name} failed"));
    ServiceError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[derive(Debug, Serialize)]
struct HistoryEntry<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    prompt: &'a str,
    history: Vec<HistoryEntry<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    response: String,
}

/// Assistant backed by the hosted `chat` function.
#[derive(Debug, Clone)]
pub struct HttpAssistant {
    functions: FunctionsClient,
}

impl HttpAssistant {
    pub fn new(functions: FunctionsClient) -> Self {
        Self { functions }
    }
}

#[async_trait]
impl AssistantService for HttpAssistant {
    async fn respond(&self, history: &[Message], prompt: &str) -> Result<String, ServiceError> {
        let request = ChatRequest {
            prompt,
            history: history
                .iter()
                .map(|message| HistoryEntry {
                    role: message.role.as_str(),
                    content: &message.content,
                })
                .collect(),
        };
        let reply: ChatReply = self.functions.invoke(CHAT_FUNCTION, &request).await?;
        if reply.response.is_empty() {
            return Err(ServiceError::EmptyResponse);
        }
        Ok(reply.response)
    }
}

#[derive(Debug, Serialize)]
struct EnhanceRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EnhanceReply {
    enhanced_prompt: String,
    #[serde(default)]
    provider: Option<String>,
}

/// Prompt enhancer backed by the hosted `enhance-prompt` function.
#[derive(Debug, Clone)]
pub struct HttpEnhancer {
    functions: FunctionsClient,
}

impl HttpEnhancer {
    pub fn new(functions: FunctionsClient) -> Self {
        Self { functions }
    }
}

#[async_trait]
impl EnhancementService for HttpEnhancer {
    async fn enhance(&self, prompt: &str) -> Result<EnhancedPrompt, ServiceError> {
        let reply: EnhanceReply = self
            .functions
            .invoke(ENHANCE_FUNCTION, &EnhanceRequest { prompt })
            .await?;
        Ok(EnhancedPrompt {
            enhanced_prompt: reply.enhanced_prompt,
            provider: reply.provider,
        })
    }
}
