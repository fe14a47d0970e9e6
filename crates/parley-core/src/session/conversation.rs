//! Conversation session: optimistic send, paced reveal and reconciliation.

use super::reconcile::reconcile;
use crate::error::SessionError;
use crate::events::{EventSink, Notice, SessionEvent};
use crate::ids::{EntityKind, IdAllocator, LocalId};
use crate::reveal::reveal_stream;
use crate::services::{AssistantService, ServiceError};
use crate::store::{PersistenceGateway, StoreError};
use crate::types::{Message, MessageId, OwnerId, Role};
use futures_util::StreamExt;
use log::{debug, info, warn};
use parking_lot::RwLock;
use parley_config::ParleyConfig;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// State machine of a conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    /// Resolving or creating the conversation for a send.
    AwaitingConversation,
    /// Persisting the user message.
    Sending,
    /// Waiting for and revealing the assistant reply.
    Revealing,
    /// A send failed; the session returns to idle right after.
    Failed,
}

/// Snapshot of what the presentation layer shows for a conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationView {
    pub conversation_id: Option<String>,
    /// Settled messages in store order, followed by pending ones.
    pub messages: Vec<Message>,
    pub revealing: bool,
    pub in_flight: bool,
    pub state: ConversationState,
}

/// Tunables for a conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Delay between revealed characters.
    pub step_delay: Duration,
    /// Maximum clock distance between a pending entry and its settled record.
    pub reconcile_window: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(20),
            reconcile_window: Duration::from_secs(300),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &ParleyConfig) -> Self {
        Self {
            step_delay: config.reveal.step_delay(),
            reconcile_window: config.session.reconcile_window(),
        }
    }
}

/// Result of a send that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Both messages were persisted.
    Delivered {
        conversation_id: String,
        response: String,
    },
    /// Another send was in flight; nothing happened.
    Busy,
}

struct Inner {
    view: ConversationView,
    /// Bumped whenever the view is reset; flows holding an older value stop
    /// touching the view.
    epoch: u64,
}

/// Orchestrates one user's conversation with the assistant.
pub struct ConversationSession {
    owner: OwnerId,
    gateway: PersistenceGateway,
    assistant: Arc<dyn AssistantService>,
    events: Arc<dyn EventSink>,
    ids: IdAllocator,
    options: SessionOptions,
    inner: RwLock<Inner>,
}

impl ConversationSession {
    pub fn new(
        owner: OwnerId,
        gateway: PersistenceGateway,
        assistant: Arc<dyn AssistantService>,
        events: Arc<dyn EventSink>,
        options: SessionOptions,
    ) -> Self {
        Self {
            owner,
            gateway,
            assistant,
            events,
            ids: IdAllocator::new(),
            options,
            inner: RwLock::new(Inner {
                view: ConversationView::default(),
                epoch: 0,
            }),
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Copy of the current view.
    pub fn snapshot(&self) -> ConversationView {
        self.inner.read().view.clone()
    }

    pub fn state(&self) -> ConversationState {
        self.inner.read().view.state
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.inner.read().view.conversation_id.clone()
    }

    /// Show a stored conversation, abandoning any in-flight send.
    pub async fn open(&self, conversation_id: &str) -> Result<(), SessionError> {
        let epoch = self.reset(Some(conversation_id.to_string()));
        match self.gateway.messages.list_messages(conversation_id).await {
            Ok(messages) => {
                debug!(
                    "opened conversation (conversation_id={}, messages={})",
                    conversation_id,
                    messages.len()
                );
                if self.apply(epoch, |view| view.messages = messages) {
                    self.emit_messages_changed();
                }
                Ok(())
            }
            Err(err) => {
                warn!(
                    "failed to load conversation (conversation_id={}, error={})",
                    conversation_id, err
                );
                self.notify(Notice::error("load conversation", err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Clear the view so the next send starts a new conversation.
    pub fn start_new(&self) {
        self.reset(None);
    }

    /// Reconcile the view against the store.
    pub async fn reload(&self) -> Result<(), SessionError> {
        let (epoch, conversation_id) = {
            let inner = self.inner.read();
            (inner.epoch, inner.view.conversation_id.clone())
        };
        let Some(conversation_id) = conversation_id else {
            return Ok(());
        };
        self.refresh(epoch, &conversation_id).await.map_err(|err| {
            self.notify(Notice::error("reload conversation", err.to_string()));
            SessionError::from(err)
        })
    }

    /// Send a user message and reveal the assistant reply.
    ///
    /// Blank input is rejected before any state change. A call made while
    /// another send is in flight returns [`SendOutcome::Busy`].
    pub async fn send(&self, text: &str) -> Result<SendOutcome, SessionError> {
        let prompt = text.trim();
        if prompt.is_empty() {
            self.notify(Notice::warning("send message", "message is empty"));
            return Err(SessionError::Validation("message is empty".to_string()));
        }
        let Some((epoch, current, history)) = self.begin() else {
            debug!("send ignored while another send is in flight");
            return Ok(SendOutcome::Busy);
        };
        self.events.emit(SessionEvent::StateChanged {
            state: ConversationState::AwaitingConversation,
        });

        let conversation_id = match current {
            Some(id) => id,
            None => match self.gateway.conversations.create_conversation(&self.owner).await {
                Ok(conversation) if conversation.id.trim().is_empty() => {
                    let err = SessionError::Unexpected(
                        "store returned a conversation without an id".to_string(),
                    );
                    return Err(self.fail(epoch, "start conversation", err));
                }
                Ok(conversation) => {
                    info!(
                        "started conversation (conversation_id={}, owner={})",
                        conversation.id, self.owner
                    );
                    let id = conversation.id;
                    if self.apply(epoch, |view| view.conversation_id = Some(id.clone())) {
                        self.events.emit(SessionEvent::ConversationOpened {
                            conversation_id: Some(id.clone()),
                        });
                    }
                    id
                }
                Err(err) => return Err(self.fail(epoch, "start conversation", err.into())),
            },
        };

        let user_id = self.ids.allocate(EntityKind::Message);
        let user_message = Message::pending(user_id.clone(), &conversation_id, Role::User, prompt);
        if self.apply(epoch, |view| view.messages.push(user_message)) {
            self.emit_messages_changed();
        }
        self.set_state(epoch, ConversationState::Sending);

        if let Err(err) = self
            .gateway
            .messages
            .append_message(&conversation_id, Role::User, prompt)
            .await
        {
            self.remove_pending(epoch, &user_id);
            return Err(self.fail(epoch, "send message", err.into()));
        }

        let assistant_id = self.ids.allocate(EntityKind::Message);
        let placeholder =
            Message::pending(assistant_id.clone(), &conversation_id, Role::Assistant, "");
        if self.apply(epoch, |view| {
            view.messages.push(placeholder);
            view.revealing = true;
        }) {
            self.emit_messages_changed();
        }
        self.set_state(epoch, ConversationState::Revealing);

        let response = match self.assistant.respond(&history, prompt).await {
            Ok(response) if response.is_empty() => Err(ServiceError::EmptyResponse),
            other => other,
        };
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                if self.apply(epoch, |view| {
                    view.messages.retain(|message| !is_local(message, &assistant_id));
                    view.revealing = false;
                }) {
                    self.emit_messages_changed();
                }
                if let Err(refresh_err) = self.refresh(epoch, &conversation_id).await {
                    warn!(
                        "refresh after assistant failure failed (conversation_id={}, error={})",
                        conversation_id, refresh_err
                    );
                }
                return Err(self.fail(epoch, "get assistant reply", err.into()));
            }
        };

        let mut partials = Box::pin(reveal_stream(response.clone(), self.options.step_delay));
        while let Some(partial) = partials.next().await {
            let shown = self.apply(epoch, |view| {
                if let Some(message) = view
                    .messages
                    .iter_mut()
                    .find(|message| is_local(message, &assistant_id))
                {
                    message.content.clone_from(&partial);
                }
            });
            if !shown {
                debug!(
                    "reveal abandoned (conversation_id={}, message_id={})",
                    conversation_id, assistant_id
                );
                break;
            }
            self.events.emit(SessionEvent::MessageRevealed {
                id: assistant_id.clone(),
                content: partial,
            });
        }
        drop(partials);
        self.apply(epoch, |view| view.revealing = false);

        let saved = self
            .gateway
            .messages
            .append_message(&conversation_id, Role::Assistant, &response)
            .await;
        if let Err(err) = &saved {
            warn!(
                "assistant reply not saved (conversation_id={}, error={})",
                conversation_id, err
            );
        }
        let refreshed = self.refresh(epoch, &conversation_id).await;

        if let Err(err) = saved {
            return Err(self.fail(epoch, "save assistant reply", err.into()));
        }
        if let Err(err) = refreshed {
            return Err(self.fail(epoch, "refresh conversation", err.into()));
        }

        if self.apply(epoch, |view| {
            view.state = ConversationState::Idle;
            view.in_flight = false;
        }) {
            self.events.emit(SessionEvent::StateChanged {
                state: ConversationState::Idle,
            });
        }
        info!(
            "message delivered (conversation_id={}, response_len={})",
            conversation_id,
            response.len()
        );
        Ok(SendOutcome::Delivered {
            conversation_id,
            response,
        })
    }

    /// Claim the session for a send. Returns the flow epoch, the current
    /// conversation and its settled history.
    fn begin(&self) -> Option<(u64, Option<String>, Vec<Message>)> {
        let mut inner = self.inner.write();
        if inner.view.in_flight {
            return None;
        }
        inner.view.in_flight = true;
        inner.view.state = ConversationState::AwaitingConversation;
        let history = inner
            .view
            .messages
            .iter()
            .filter(|message| message.is_settled())
            .cloned()
            .collect();
        Some((inner.epoch, inner.view.conversation_id.clone(), history))
    }

    fn reset(&self, conversation_id: Option<String>) -> u64 {
        let epoch = {
            let mut inner = self.inner.write();
            inner.epoch += 1;
            inner.view = ConversationView {
                conversation_id: conversation_id.clone(),
                ..ConversationView::default()
            };
            inner.epoch
        };
        self.events
            .emit(SessionEvent::ConversationOpened { conversation_id });
        self.events.emit(SessionEvent::StateChanged {
            state: ConversationState::Idle,
        });
        epoch
    }

    /// Fetch the settled messages and merge them into the view.
    async fn refresh(&self, epoch: u64, conversation_id: &str) -> Result<(), StoreError> {
        if !self.is_current(epoch) {
            return Ok(());
        }
        let settled = self.gateway.messages.list_messages(conversation_id).await?;
        let window = self.options.reconcile_window;
        if self.apply(epoch, |view| {
            view.messages = reconcile(&view.messages, &settled, window);
        }) {
            self.emit_messages_changed();
        }
        Ok(())
    }

    /// Move to Failed then Idle, notify once, and hand the error back.
    fn fail(&self, epoch: u64, action: &str, error: SessionError) -> SessionError {
        warn!("{} failed (owner={}, error={})", action, self.owner, error);
        if self.apply(epoch, |view| {
            view.state = ConversationState::Failed;
            view.revealing = false;
        }) {
            self.events.emit(SessionEvent::StateChanged {
                state: ConversationState::Failed,
            });
            if self.apply(epoch, |view| {
                view.state = ConversationState::Idle;
                view.in_flight = false;
            }) {
                self.events.emit(SessionEvent::StateChanged {
                    state: ConversationState::Idle,
                });
            }
        }
        let message = match &error {
            SessionError::Unexpected(_) => "something went wrong, please try again".to_string(),
            other => other.to_string(),
        };
        self.notify(Notice::error(action, message));
        error
    }

    fn remove_pending(&self, epoch: u64, id: &LocalId) {
        if self.apply(epoch, |view| {
            view.messages.retain(|message| !is_local(message, id));
        }) {
            self.emit_messages_changed();
        }
    }

    fn set_state(&self, epoch: u64, state: ConversationState) {
        if self.apply(epoch, |view| view.state = state) {
            self.events.emit(SessionEvent::StateChanged { state });
        }
    }

    /// Run `edit` on the view if `epoch` is still current.
    fn apply<F>(&self, epoch: u64, edit: F) -> bool
    where
        F: FnOnce(&mut ConversationView),
    {
        let mut inner = self.inner.write();
        if inner.epoch != epoch {
            return false;
        }
        edit(&mut inner.view);
        true
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.read().epoch == epoch
    }

    fn emit_messages_changed(&self) {
        let (conversation_id, count) = {
            let inner = self.inner.read();
            (inner.view.conversation_id.clone(), inner.view.messages.len())
        };
        self.events.emit(SessionEvent::MessagesChanged {
            conversation_id,
            count,
        });
    }

    fn notify(&self, notice: Notice) {
        self.events.emit(SessionEvent::Notice(notice));
    }
}

fn is_local(message: &Message, id: &LocalId) -> bool {
    matches!(&message.id, MessageId::Pending(local) if local == id)
}

#[cfg(test)]
mod tests {
    use super::{ConversationSession, ConversationState, SendOutcome, SessionOptions};
    use crate::events::{EventBus, SessionEvent};
    use crate::services::EchoAssistant;
    use crate::store::{
        ConversationStore, MemoryStore, MessageStore, PersistenceGateway, StoreResult,
    };
    use crate::types::{Conversation, OwnerId, Role};
    use crate::SessionError;
    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast::Receiver;

    fn session(store: Arc<MemoryStore>, bus: &EventBus) -> ConversationSession {
        ConversationSession::new(
            OwnerId::new("u1"),
            PersistenceGateway::from_store(store),
            Arc::new(EchoAssistant::new()),
            Arc::new(bus.clone()),
            SessionOptions {
                step_delay: Duration::ZERO,
                ..SessionOptions::default()
            },
        )
    }

    fn states(rx: &mut Receiver<SessionEvent>) -> Vec<ConversationState> {
        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::StateChanged { state } = event {
                states.push(state);
            }
        }
        states
    }

    #[tokio::test]
    async fn first_send_creates_conversation_and_settles_both_messages() {
        let store = Arc::new(MemoryStore::new());
        let bus = EventBus::new(4096);
        let mut rx = bus.subscribe();
        let session = session(store.clone(), &bus);

        let outcome = session.send("  hello  ").await.expect("send");
        let SendOutcome::Delivered {
            conversation_id,
            response,
        } = outcome
        else {
            panic!("expected delivery");
        };
        assert_eq!(response, EchoAssistant::reply_to("hello"));

        let view = session.snapshot();
        assert_eq!(view.conversation_id.as_deref(), Some(conversation_id.as_str()));
        assert_eq!(view.state, ConversationState::Idle);
        assert!(!view.in_flight && !view.revealing);
        let roles: Vec<Role> = view.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert!(view.messages.iter().all(|m| m.is_settled()));
        assert_eq!(view.messages[0].content, "hello");
        assert_eq!(
            store.list_messages(&conversation_id).await.expect("list").len(),
            2
        );

        assert_eq!(
            states(&mut rx),
            vec![
                ConversationState::AwaitingConversation,
                ConversationState::Sending,
                ConversationState::Revealing,
                ConversationState::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn blank_input_is_rejected_without_transition() {
        let store = Arc::new(MemoryStore::new());
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let session = session(store, &bus);

        let err = session.send("   ").await.expect_err("blank");
        assert!(matches!(err, SessionError::Validation(_)));
        assert!(states(&mut rx).is_empty());
        assert_eq!(session.snapshot().conversation_id, None);
    }

    #[tokio::test]
    async fn start_new_clears_the_view() {
        let store = Arc::new(MemoryStore::new());
        let bus = EventBus::new(4096);
        let session = session(store, &bus);
        session.send("hello").await.expect("send");

        session.start_new();
        let view = session.snapshot();
        assert_eq!(view.conversation_id, None);
        assert!(view.messages.is_empty());

        let outcome = session.send("again").await.expect("send");
        assert!(matches!(outcome, SendOutcome::Delivered { .. }));
        assert_eq!(session.snapshot().messages.len(), 2);
    }

    #[tokio::test]
    async fn open_shows_stored_messages() {
        let store = Arc::new(MemoryStore::new());
        let bus = EventBus::new(4096);
        let first = session(store.clone(), &bus);
        let SendOutcome::Delivered { conversation_id, .. } =
            first.send("hello").await.expect("send")
        else {
            panic!("expected delivery");
        };

        let second = session(store, &bus);
        second.open(&conversation_id).await.expect("open");
        let view = second.snapshot();
        assert_eq!(view.messages.len(), 2);
        assert_eq!(view.conversation_id, Some(conversation_id));

        second.reload().await.expect("reload");
        assert_eq!(second.snapshot().messages.len(), 2);
    }

    /// Hands out conversations whose id the store never filled in.
    struct IdlessConversations;

    #[async_trait]
    impl ConversationStore for IdlessConversations {
        async fn create_conversation(&self, owner: &OwnerId) -> StoreResult<Conversation> {
            Ok(Conversation {
                id: String::new(),
                owner_id: owner.clone(),
                title: "New Conversation".to_string(),
                summary: None,
                tags: Vec::new(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
        }

        async fn list_conversations(&self, _owner: &OwnerId) -> StoreResult<Vec<Conversation>> {
            Ok(Vec::new())
        }

        async fn delete_conversation(&self, _conversation_id: &str) -> StoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn conversation_without_id_fails_the_send() {
        let store = Arc::new(MemoryStore::new());
        let bus = EventBus::new(4096);
        let mut rx = bus.subscribe();
        let session = ConversationSession::new(
            OwnerId::new("u1"),
            PersistenceGateway::new(Arc::new(IdlessConversations), store.clone(), store),
            Arc::new(EchoAssistant::new()),
            Arc::new(bus.clone()),
            SessionOptions {
                step_delay: Duration::ZERO,
                ..SessionOptions::default()
            },
        );

        let err = session.send("hello").await.expect_err("no id");
        assert!(matches!(err, SessionError::Unexpected(_)));
        let view = session.snapshot();
        assert_eq!(view.conversation_id, None);
        assert!(view.messages.is_empty());
        assert!(!view.in_flight);

        let mut notices = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::Notice(notice) = event {
                notices.push(notice);
            }
        }
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].action, "start conversation");
        assert_eq!(notices[0].message, "something went wrong, please try again");
    }
}
