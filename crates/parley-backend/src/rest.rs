//! PostgREST-style store over HTTP.

use crate::error::BackendError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parley_core::types::DEFAULT_CONVERSATION_TITLE;
use parley_core::{
    Conversation, ConversationStore, Enhancement, EnhancementStore, Message, MessageId,
    MessageStore, NewEnhancement, OwnerId, Role, StoreError, StoreResult,
};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

const CONVERSATIONS: &str = "conversations";
const MESSAGES: &str = "messages";
const ENHANCEMENTS: &str = "prompt_enhancements";

/// Client for the hosted relational store.
///
/// Rows are addressed with `eq.` filters and sorted with `order=`; writes ask
/// for `return=representation` when the stored row is needed back.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
    default_provider: String,
}

impl RestStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("rest store configured (url={})", base_url);
        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            default_provider: "enhance-prompt".to_string(),
        })
    }

    /// Provider label for enhancement rows stored without one.
    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = provider.into();
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", self.api_key.as_str())
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        request
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> StoreResult<T> {
        let response = self.send(request).await?;
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|err| StoreError::Decode(format!("failed to parse response: {err}")))
        } else {
            Err(rejection(status, response.text().await.unwrap_or_default()))
        }
    }

    async fn execute(&self, request: RequestBuilder) -> StoreResult<()> {
        let response = self.send(request).await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(rejection(status, response.text().await.unwrap_or_default()))
        }
    }

    fn enhancement_from_row(&self, row: EnhancementRow) -> Enhancement {
        Enhancement {
            id: row.id,
            owner_id: OwnerId::new(row.user_id),
            original_prompt: row.original_prompt,
            enhanced_prompt: row.enhanced_prompt,
            provider: row
                .provider
                .filter(|label| !label.is_empty())
                .unwrap_or_else(|| self.default_provider.clone()),
            created_at: row.created_at,
        }
    }
}

/// First row of a `return=representation` reply.
fn single<T>(rows: Vec<T>, entity: &'static str) -> StoreResult<T> {
    rows.into_iter()
        .next()
        .ok_or_else(|| StoreError::Decode(format!("store returned no {entity} row")))
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

fn rejection(status: StatusCode, body: String) -> StoreError {
    let parsed = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|body| body.message.or(body.error));
    let message = match parsed {
        Some(message) => message,
        None if !body.trim().is_empty() => body,
        None => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    StoreError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[derive(Debug, Deserialize)]
struct ConversationRow {
    id: String,
    user_id: String,
    title: Option<String>,
    summary: Option<String>,
    tags: Option<Vec<String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        let mut tags: Vec<String> = Vec::new();
        for tag in row.tags.unwrap_or_default() {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        Conversation {
            id: row.id,
            owner_id: OwnerId::new(row.user_id),
            title: row
                .title
                .unwrap_or_else(|| DEFAULT_CONVERSATION_TITLE.to_string()),
            summary: row.summary,
            tags,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageRow {
    id: String,
    conversation_id: String,
    role: Role,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: MessageId::Settled(row.id),
            conversation_id: row.conversation_id,
            role: row.role,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EnhancementRow {
    id: String,
    user_id: String,
    original_prompt: String,
    enhanced_prompt: String,
    provider: Option<String>,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl ConversationStore for RestStore {
    async fn create_conversation(&self, owner: &OwnerId) -> StoreResult<Conversation> {
        let request = self
            .request(Method::POST, CONVERSATIONS)
            .header("Prefer", "return=representation")
            .json(&json!({
                "user_id": owner.as_str(),
                "title": DEFAULT_CONVERSATION_TITLE,
            }));
        let rows: Vec<ConversationRow> = self.fetch(request).await?;
        let conversation = Conversation::from(single(rows, "conversation")?);
        debug!(
            "created conversation (conversation_id={}, owner={})",
            conversation.id, owner
        );
        Ok(conversation)
    }

    async fn list_conversations(&self, owner: &OwnerId) -> StoreResult<Vec<Conversation>> {
        let request = self.request(Method::GET, CONVERSATIONS).query(&[
            ("select", "*".to_string()),
            ("user_id", eq(owner.as_str())),
            ("order", "updated_at.desc".to_string()),
        ]);
        let rows: Vec<ConversationRow> = self.fetch(request).await?;
        Ok(rows.into_iter().map(Conversation::from).collect())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> StoreResult<()> {
        // Messages go with the conversation through the foreign-key cascade.
        let request = self
            .request(Method::DELETE, CONVERSATIONS)
            .header("Prefer", "return=representation")
            .query(&[("id", eq(conversation_id))]);
        let rows: Vec<Value> = self.fetch(request).await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound {
                entity: "conversation",
                id: conversation_id.to_string(),
            });
        }
        info!("deleted conversation (conversation_id={})", conversation_id);
        Ok(())
    }
}

#[async_trait]
impl MessageStore for RestStore {
    async fn list_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>> {
        let request = self.request(Method::GET, MESSAGES).query(&[
            ("select", "*".to_string()),
            ("conversation_id", eq(conversation_id)),
            ("order", "created_at.asc".to_string()),
        ]);
        let rows: Vec<MessageRow> = self.fetch(request).await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> StoreResult<()> {
        let request = self
            .request(Method::POST, MESSAGES)
            .header("Prefer", "return=minimal")
            .json(&json!({
                "conversation_id": conversation_id,
                "role": role.as_str(),
                "content": content,
            }));
        self.execute(request).await?;
        debug!(
            "appended message (conversation_id={}, role={}, content_len={})",
            conversation_id,
            role,
            content.len()
        );

        // The message row is stored at this point; a failed bump only affects
        // list ordering.
        let touch = self
            .request(Method::PATCH, CONVERSATIONS)
            .query(&[("id", eq(conversation_id))])
            .header("Prefer", "return=minimal")
            .json(&json!({ "updated_at": Utc::now() }));
        if let Err(err) = self.execute(touch).await {
            warn!(
                "conversation activity not recorded (conversation_id={}, error={})",
                conversation_id, err
            );
        }
        Ok(())
    }
}

#[async_trait]
impl EnhancementStore for RestStore {
    async fn list_enhancements(&self, owner: &OwnerId) -> StoreResult<Vec<Enhancement>> {
        let request = self.request(Method::GET, ENHANCEMENTS).query(&[
            ("select", "*".to_string()),
            ("user_id", eq(owner.as_str())),
            ("order", "created_at.desc".to_string()),
        ]);
        let rows: Vec<EnhancementRow> = self.fetch(request).await?;
        Ok(rows
            .into_iter()
            .map(|row| self.enhancement_from_row(row))
            .collect())
    }

    async fn create_enhancement(
        &self,
        owner: &OwnerId,
        input: NewEnhancement,
    ) -> StoreResult<Enhancement> {
        let request = self
            .request(Method::POST, ENHANCEMENTS)
            .header("Prefer", "return=representation")
            .json(&json!({
                "user_id": owner.as_str(),
                "original_prompt": input.original_prompt,
                "enhanced_prompt": input.enhanced_prompt,
                "provider": input.provider,
            }));
        let rows: Vec<EnhancementRow> = self.fetch(request).await?;
        Ok(self.enhancement_from_row(single(rows, "enhancement")?))
    }

    async fn delete_enhancement(&self, enhancement_id: &str, owner: &OwnerId) -> StoreResult<()> {
        let request = self
            .request(Method::DELETE, ENHANCEMENTS)
            .header("Prefer", "return=representation")
            .query(&[("id", eq(enhancement_id)), ("user_id", eq(owner.as_str()))]);
        let rows: Vec<Value> = self.fetch(request).await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound {
                entity: "enhancement",
                id: enhancement_id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationRow, MessageRow, RestStore, rejection};
    use parley_core::{Conversation, Message, StoreError};
    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;
    use std::time::Duration;

    #[test]
    fn table_urls_ignore_trailing_slash() {
        let store = RestStore::new("https://db.example.test/", "anon", Duration::from_secs(5))
            .expect("store");
        assert_eq!(
            store.table_url("messages"),
            "https://db.example.test/rest/v1/messages"
        );
    }

    #[test]
    fn conversation_rows_fill_defaults_and_dedupe_tags() {
        let row: ConversationRow = serde_json::from_str(
            r#"{
                "id": "c1",
                "user_id": "u1",
                "title": null,
                "summary": null,
                "tags": ["rust", "async", "rust"],
                "created_at": "2025-01-01T10:00:00.123456+00:00",
                "updated_at": "2025-01-01T10:05:00+00:00"
            }"#,
        )
        .expect("row");
        let conversation = Conversation::from(row);
        assert_eq!(conversation.title, "New Conversation");
        assert_eq!(conversation.tags, vec!["rust", "async"]);
        assert_eq!(conversation.owner_id.as_str(), "u1");
    }

    #[test]
    fn message_rows_are_settled() {
        let row: MessageRow = serde_json::from_str(
            r#"{
                "id": "m1",
                "conversation_id": "c1",
                "role": "assistant",
                "content": "hi",
                "created_at": "2025-01-01T10:00:00Z"
            }"#,
        )
        .expect("row");
        let message = Message::from(row);
        assert!(message.is_settled());
        assert_eq!(message.id.as_str(), "m1");
    }

    #[test]
    fn rejection_prefers_the_store_message() {
        let err = rejection(
            StatusCode::CONFLICT,
            r#"{"code":"23503","message":"violates foreign key constraint"}"#.to_string(),
        );
        match err {
            StoreError::Rejected { status, message } => {
                assert_eq!(status, 409);
                assert_eq!(message, "violates foreign key constraint");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = rejection(StatusCode::BAD_GATEWAY, String::new());
        assert_eq!(err.to_string(), "store rejected request (502): Bad Gateway");
    }
}
