//! Terminal rendering of session events.

use log::warn;
use parley_core::{ConversationState, ConversationView, LocalId, Notice, NoticeLevel, SessionEvent};
use std::io::{self, Write};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// Reveal currently being printed and how many bytes of it are on screen.
type Revealing = Option<(LocalId, usize)>;

/// Print reveal partials and notices until the bus closes.
pub async fn stream_events(mut rx: broadcast::Receiver<SessionEvent>) {
    let mut revealing: Revealing = None;
    loop {
        match rx.recv().await {
            Ok(event) => render(event, &mut revealing),
            // Partials are prefixes, so the next one still prints correctly.
            Err(RecvError::Lagged(skipped)) => warn!("event printer lagged (skipped={skipped})"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Print pending non-error notices; errors reach the user through the
/// command's result.
pub fn report_notices(rx: &mut broadcast::Receiver<SessionEvent>) {
    loop {
        match rx.try_recv() {
            Ok(SessionEvent::Notice(notice)) if notice.level != NoticeLevel::Error => {
                eprintln!("{}", format_notice(&notice));
            }
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

pub fn print_transcript(view: &ConversationView) {
    match &view.conversation_id {
        Some(id) => println!("conversation {id}"),
        None => println!("new conversation"),
    }
    for message in &view.messages {
        let marker = if message.is_pending() { " (unsaved)" } else { "" };
        println!("{}{}> {}", message.role, marker, message.content);
    }
}

fn render(event: SessionEvent, revealing: &mut Revealing) {
    match event {
        SessionEvent::MessageRevealed { id, content } => {
            let printed = match revealing.as_ref() {
                Some((current, printed)) if *current == id => *printed,
                _ => {
                    print!("assistant> ");
                    0
                }
            };
            if let Some(delta) = content.get(printed..) {
                print!("{delta}");
            }
            let _ = io::stdout().flush();
            *revealing = Some((id, content.len()));
        }
        SessionEvent::StateChanged {
            state: ConversationState::Idle | ConversationState::Failed,
        } => {
            if revealing.take().is_some() {
                println!();
            }
        }
        SessionEvent::Notice(notice) => eprintln!("{}", format_notice(&notice)),
        _ => {}
    }
}

fn format_notice(notice: &Notice) -> String {
    let level = match notice.level {
        NoticeLevel::Error => "error",
        NoticeLevel::Warning => "warning",
        NoticeLevel::Info => "info",
    };
    format!("[{level}] {}: {}", notice.action, notice.message)
}
