use parley_core::{
    ConversationSession, ConversationState, ConversationStore, MessageStore, NoticeLevel, OwnerId,
    PersistenceGateway, Role, SendOutcome, SessionError, SessionOptions,
};
use parley_test_utils::{
    FailingAssistant, FlakyStore, GatedAssistant, Operation, RecordingSink, ScriptedAssistant,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const REPLY: &str = "Hi! How can I help?";

fn options() -> SessionOptions {
    SessionOptions {
        step_delay: Duration::ZERO,
        ..SessionOptions::default()
    }
}

fn session_with(
    store: Arc<FlakyStore>,
    assistant: Arc<dyn parley_core::AssistantService>,
    sink: Arc<RecordingSink>,
) -> ConversationSession {
    ConversationSession::new(
        OwnerId::new("user-1"),
        PersistenceGateway::from_store(store),
        assistant,
        sink,
        options(),
    )
}

#[tokio::test]
async fn hello_creates_conversation_and_settles_both_messages() {
    let store = Arc::new(FlakyStore::new());
    let assistant = Arc::new(ScriptedAssistant::new(REPLY));
    let sink = Arc::new(RecordingSink::new());
    let session = session_with(store.clone(), assistant.clone(), sink.clone());

    let outcome = session.send("hello").await.expect("send");
    let SendOutcome::Delivered {
        conversation_id,
        response,
    } = outcome
    else {
        panic!("expected delivery");
    };
    assert_eq!(response, REPLY);

    let view = session.snapshot();
    let summary: Vec<(Role, &str, bool)> = view
        .messages
        .iter()
        .map(|m| (m.role, m.content.as_str(), m.is_settled()))
        .collect();
    assert_eq!(
        summary,
        vec![(Role::User, "hello", true), (Role::Assistant, REPLY, true)]
    );
    assert_eq!(
        sink.states(),
        vec![
            ConversationState::AwaitingConversation,
            ConversationState::Sending,
            ConversationState::Revealing,
            ConversationState::Idle,
        ]
    );
    assert!(sink.notices().is_empty());

    let conversations = store
        .list_conversations(&OwnerId::new("user-1"))
        .await
        .expect("list");
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].id, conversation_id);
    assert_eq!(conversations[0].title, "New Conversation");
}

#[tokio::test]
async fn follow_up_reuses_conversation_and_passes_settled_history() {
    let store = Arc::new(FlakyStore::new());
    let assistant = Arc::new(ScriptedAssistant::new(REPLY));
    let sink = Arc::new(RecordingSink::new());
    let session = session_with(store.clone(), assistant.clone(), sink);

    session.send("first").await.expect("first");
    session.send("second").await.expect("second");

    assert_eq!(store.calls(Operation::CreateConversation), 1);
    assert_eq!(assistant.prompts(), vec!["first", "second"]);
    let histories = assistant.histories();
    assert!(histories[0].is_empty());
    assert_eq!(histories[1].len(), 2);
    assert!(histories[1].iter().all(|m| m.is_settled()));
    assert_eq!(session.snapshot().messages.len(), 4);
}

#[tokio::test]
async fn reveal_partials_grow_to_the_full_reply() {
    let store = Arc::new(FlakyStore::new());
    let sink = Arc::new(RecordingSink::new());
    let session = session_with(store, Arc::new(ScriptedAssistant::new(REPLY)), sink.clone());

    session.send("hello").await.expect("send");
    let revealed = sink.revealed();
    assert_eq!(revealed.len(), REPLY.chars().count());
    for pair in revealed.windows(2) {
        assert!(pair[1].starts_with(pair[0].as_str()));
        assert!(pair[1].len() > pair[0].len());
    }
    assert_eq!(revealed.last().map(String::as_str), Some(REPLY));
}

#[tokio::test]
async fn conversation_creation_failure_leaves_nothing_behind() {
    let store = Arc::new(FlakyStore::new());
    store.fail(Operation::CreateConversation);
    let sink = Arc::new(RecordingSink::new());
    let assistant = Arc::new(ScriptedAssistant::new(REPLY));
    let session = session_with(store.clone(), assistant, sink.clone());

    let err = session.send("hello").await.expect_err("creation fails");
    assert!(matches!(err, SessionError::Store(_)));

    let view = session.snapshot();
    assert!(view.messages.is_empty());
    assert_eq!(view.conversation_id, None);
    assert_eq!(view.state, ConversationState::Idle);
    assert!(!view.in_flight);
    assert_eq!(
        sink.states(),
        vec![
            ConversationState::AwaitingConversation,
            ConversationState::Failed,
            ConversationState::Idle,
        ]
    );
    let notices = sink.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].action, "start conversation");
    assert_eq!(store.calls(Operation::AppendUserMessage), 0);
}

#[tokio::test]
async fn user_message_rejection_rolls_back_the_view() {
    let store = Arc::new(FlakyStore::new());
    let assistant = Arc::new(ScriptedAssistant::new(REPLY));
    let sink = Arc::new(RecordingSink::new());
    let session = session_with(store.clone(), assistant.clone(), sink.clone());
    session.send("kept").await.expect("first send");
    let before = session.snapshot().messages;

    store.fail(Operation::AppendUserMessage);
    sink.clear();
    let err = session.send("rejected").await.expect_err("append fails");
    assert!(matches!(err, SessionError::Store(_)));

    let view = session.snapshot();
    assert_eq!(view.messages, before);
    assert!(view.messages.iter().all(|m| m.content != "rejected"));
    assert_eq!(view.state, ConversationState::Idle);
    assert_eq!(assistant.prompts(), vec!["kept"]);
    let notices = sink.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].action, "send message");
    assert_eq!(notices[0].level, NoticeLevel::Error);
}

#[tokio::test]
async fn assistant_failure_keeps_only_the_saved_user_message() {
    let store = Arc::new(FlakyStore::new());
    let sink = Arc::new(RecordingSink::new());
    let session = session_with(store.clone(), Arc::new(FailingAssistant), sink.clone());

    let err = session.send("hello").await.expect_err("assistant fails");
    assert!(matches!(err, SessionError::Service(_)));

    let view = session.snapshot();
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].role, Role::User);
    assert!(view.messages[0].is_settled());
    assert!(!view.revealing);
    assert_eq!(view.state, ConversationState::Idle);
    assert_eq!(store.calls(Operation::AppendAssistantMessage), 0);
    assert_eq!(sink.notices().len(), 1);
    assert_eq!(sink.notices()[0].action, "get assistant reply");
}

#[tokio::test]
async fn unsaved_reply_stays_visible_as_pending() {
    let store = Arc::new(FlakyStore::new());
    store.fail(Operation::AppendAssistantMessage);
    let sink = Arc::new(RecordingSink::new());
    let assistant = Arc::new(ScriptedAssistant::new(REPLY));
    let session = session_with(store.clone(), assistant, sink.clone());

    let err = session.send("hello").await.expect_err("save fails");
    assert!(matches!(err, SessionError::Store(_)));

    let view = session.snapshot();
    assert_eq!(view.messages.len(), 2);
    assert!(view.messages[0].is_settled());
    assert!(view.messages[1].is_pending());
    assert_eq!(view.messages[1].content, REPLY);
    assert_eq!(view.state, ConversationState::Idle);
    assert_eq!(sink.notices().len(), 1);
    assert_eq!(sink.notices()[0].action, "save assistant reply");

    let conversation_id = view.conversation_id.expect("conversation");
    let stored = store.inner().list_messages(&conversation_id).await.expect("list");
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn unsaved_reply_keeps_its_place_when_the_next_reply_repeats_it() {
    let store = Arc::new(FlakyStore::new());
    let sink = Arc::new(RecordingSink::new());
    let session = session_with(store.clone(), Arc::new(ScriptedAssistant::new(REPLY)), sink);

    store.fail(Operation::AppendAssistantMessage);
    session.send("first").await.expect_err("save fails");
    store.recover(Operation::AppendAssistantMessage);
    session.send("second").await.expect("send");

    let view = session.snapshot();
    let shown: Vec<(Role, &str, bool)> = view
        .messages
        .iter()
        .map(|m| (m.role, m.content.as_str(), m.is_settled()))
        .collect();
    assert_eq!(
        shown,
        vec![
            (Role::User, "first", true),
            (Role::Assistant, REPLY, false),
            (Role::User, "second", true),
            (Role::Assistant, REPLY, true),
        ]
    );
    assert!(
        view.messages
            .windows(2)
            .all(|pair| pair[0].created_at <= pair[1].created_at)
    );
}

#[tokio::test]
async fn send_while_in_flight_is_ignored() {
    let store = Arc::new(FlakyStore::new());
    let assistant = Arc::new(GatedAssistant::new(REPLY));
    let sink = Arc::new(RecordingSink::new());
    let session = Arc::new(session_with(store.clone(), assistant.clone(), sink));

    let running = tokio::spawn({
        let session = session.clone();
        async move { session.send("first").await }
    });
    assistant.entered().await;

    let busy = session.send("second").await.expect("ignored");
    assert_eq!(busy, SendOutcome::Busy);
    assert_eq!(session.state(), ConversationState::Revealing);

    assistant.release();
    let outcome = running.await.expect("join").expect("send");
    assert!(matches!(outcome, SendOutcome::Delivered { .. }));
    assert_eq!(store.calls(Operation::AppendUserMessage), 1);
    assert_eq!(session.snapshot().messages.len(), 2);
}

#[tokio::test]
async fn starting_over_abandons_rendering_but_not_persistence() {
    let store = Arc::new(FlakyStore::new());
    let assistant = Arc::new(GatedAssistant::new(REPLY));
    let sink = Arc::new(RecordingSink::new());
    let session = Arc::new(session_with(store.clone(), assistant.clone(), sink));

    let running = tokio::spawn({
        let session = session.clone();
        async move { session.send("hello").await }
    });
    assistant.entered().await;
    let abandoned_id = session.conversation_id().expect("conversation");

    session.start_new();
    assistant.release();
    let outcome = running.await.expect("join").expect("send");
    assert!(matches!(outcome, SendOutcome::Delivered { .. }));

    let view = session.snapshot();
    assert_eq!(view.conversation_id, None);
    assert!(view.messages.is_empty());
    assert_eq!(view.state, ConversationState::Idle);

    let stored = store.inner().list_messages(&abandoned_id).await.expect("list");
    let roles: Vec<Role> = stored.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);
}

#[tokio::test]
async fn reload_after_send_changes_nothing() {
    let store = Arc::new(FlakyStore::new());
    let sink = Arc::new(RecordingSink::new());
    let session = session_with(store, Arc::new(ScriptedAssistant::new(REPLY)), sink);

    session.send("hello").await.expect("send");
    let before = session.snapshot();
    session.reload().await.expect("reload");
    assert_eq!(session.snapshot(), before);
}

#[tokio::test]
async fn open_failure_is_reported() {
    let store = Arc::new(FlakyStore::new());
    let conversation = store
        .create_conversation(&OwnerId::new("user-1"))
        .await
        .expect("create");
    store.fail(Operation::ListMessages);
    let sink = Arc::new(RecordingSink::new());
    let session = session_with(store, Arc::new(ScriptedAssistant::new(REPLY)), sink.clone());

    let err = session.open(&conversation.id).await.expect_err("load fails");
    assert!(matches!(err, SessionError::Store(_)));
    assert_eq!(sink.notices().len(), 1);
    assert_eq!(sink.notices()[0].action, "load conversation");
    assert!(session.snapshot().messages.is_empty());
}
