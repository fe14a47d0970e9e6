use parking_lot::Mutex;
use parley_core::{ConversationState, EventSink, Notice, SessionEvent};

/// Event sink that keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Notice(notice) => Some(notice.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn states(&self) -> Vec<ConversationState> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SessionEvent::StateChanged { state } => Some(*state),
                _ => None,
            })
            .collect()
    }

    /// Contents of every `MessageRevealed` event, in order.
    pub fn revealed(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SessionEvent::MessageRevealed { content, .. } => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }
}
