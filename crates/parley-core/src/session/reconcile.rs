//! Merge of optimistic view entries with the store's settled record.

use crate::types::Message;
use chrono::TimeDelta;
use std::collections::HashSet;
use std::time::Duration;

/// Replace pending messages with their settled counterparts.
///
/// A counterpart is a settled record with the same role and content, created
/// within `window` of the pending entry, that `view` does not already show as
/// settled. When several pending entries could take the same record, the one
/// closest to it in time wins (the newer entry on a tie), and each record is
/// taken at most once.
///
/// The result is `settled` in store order with every unmatched pending entry
/// slotted in by creation time. Applying the function twice yields the same
/// list.
pub fn reconcile(view: &[Message], settled: &[Message], window: Duration) -> Vec<Message> {
    let shown: HashSet<&str> = view
        .iter()
        .filter(|message| message.is_settled())
        .map(|message| message.id.as_str())
        .collect();
    let pending: Vec<&Message> = view.iter().filter(|message| message.is_pending()).collect();

    let mut pairs: Vec<(TimeDelta, usize, usize)> = Vec::new();
    for (slot, entry) in pending.iter().enumerate() {
        for (index, record) in settled.iter().enumerate() {
            if shown.contains(record.id.as_str())
                || record.role != entry.role
                || record.content != entry.content
            {
                continue;
            }
            let skew = (record.created_at - entry.created_at).abs();
            if within(skew, window) {
                pairs.push((skew, slot, index));
            }
        }
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut matched = vec![false; pending.len()];
    let mut claimed = vec![false; settled.len()];
    for (_, slot, index) in pairs {
        if !matched[slot] && !claimed[index] {
            matched[slot] = true;
            claimed[index] = true;
        }
    }

    let mut unmatched: Vec<&Message> = pending
        .into_iter()
        .zip(matched)
        .filter_map(|(entry, matched)| (!matched).then_some(entry))
        .collect();
    unmatched.sort_by_key(|entry| entry.created_at);

    let mut unmatched = unmatched.into_iter().peekable();
    let mut merged = Vec::with_capacity(settled.len() + unmatched.len());
    for record in settled {
        while let Some(entry) = unmatched.next_if(|entry| entry.created_at < record.created_at) {
            merged.push(entry.clone());
        }
        merged.push(record.clone());
    }
    merged.extend(unmatched.cloned());
    merged
}

fn within(skew: TimeDelta, window: Duration) -> bool {
    TimeDelta::from_std(window).map_or(true, |window| skew <= window)
}

#[cfg(test)]
mod tests {
    use super::reconcile;
    use crate::ids::{EntityKind, IdAllocator};
    use crate::types::{Message, MessageId, Role};
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const WINDOW: Duration = Duration::from_secs(300);

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T10:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    fn settled_at(id: &str, role: Role, content: &str, second: i64) -> Message {
        Message {
            id: MessageId::Settled(id.to_string()),
            conversation_id: "c1".to_string(),
            role,
            content: content.to_string(),
            created_at: base() + ChronoDuration::seconds(second),
        }
    }

    fn pending_at(alloc: &IdAllocator, role: Role, content: &str, second: i64) -> Message {
        let id = alloc.allocate(EntityKind::Message);
        let mut message = Message::pending(id, "c1", role, content);
        message.created_at = base() + ChronoDuration::seconds(second);
        message
    }

    fn ids(messages: &[Message]) -> Vec<String> {
        messages.iter().map(|message| message.id.to_string()).collect()
    }

    #[test]
    fn pending_entries_collapse_into_settled_records() {
        let alloc = IdAllocator::new();
        let view = vec![
            settled_at("m1", Role::User, "earlier", 0),
            pending_at(&alloc, Role::User, "hello", 10),
            pending_at(&alloc, Role::Assistant, "hi", 11),
        ];
        let store = vec![
            settled_at("m1", Role::User, "earlier", 0),
            settled_at("m2", Role::User, "hello", 10),
            settled_at("m3", Role::Assistant, "hi", 12),
        ];

        let merged = reconcile(&view, &store, WINDOW);
        assert_eq!(ids(&merged), vec!["m1", "m2", "m3"]);
        assert!(merged.iter().all(Message::is_settled));
    }

    #[test]
    fn unmatched_pending_entries_keep_their_place_in_time() {
        let alloc = IdAllocator::new();
        let unsaved = pending_at(&alloc, Role::Assistant, "lost", 2);
        let view = vec![
            settled_at("m1", Role::User, "hello", 1),
            unsaved.clone(),
            pending_at(&alloc, Role::User, "again", 3),
        ];
        let store = vec![
            settled_at("m1", Role::User, "hello", 1),
            settled_at("m2", Role::User, "again", 3),
        ];

        let merged = reconcile(&view, &store, WINDOW);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].id, MessageId::Settled("m1".to_string()));
        assert_eq!(merged[1], unsaved);
        assert_eq!(merged[2].id, MessageId::Settled("m2".to_string()));
    }

    #[test]
    fn closest_pending_entry_takes_a_repeated_reply() {
        let alloc = IdAllocator::new();
        let unsaved = pending_at(&alloc, Role::Assistant, "reply", 2);
        let view = vec![
            settled_at("m1", Role::User, "first", 1),
            unsaved.clone(),
            pending_at(&alloc, Role::User, "second", 20),
            pending_at(&alloc, Role::Assistant, "reply", 21),
        ];
        let store = vec![
            settled_at("m1", Role::User, "first", 1),
            settled_at("m2", Role::User, "second", 20),
            settled_at("m3", Role::Assistant, "reply", 22),
        ];

        let merged = reconcile(&view, &store, WINDOW);
        assert_eq!(
            ids(&merged),
            vec![
                "m1".to_string(),
                unsaved.id.to_string(),
                "m2".to_string(),
                "m3".to_string()
            ]
        );
        assert!(merged[1].is_pending());
    }

    #[test]
    fn repeated_text_claims_only_new_records() {
        let alloc = IdAllocator::new();
        // "ok" was already settled and shown; a second "ok" is pending.
        let view = vec![
            settled_at("m1", Role::User, "ok", 0),
            pending_at(&alloc, Role::User, "ok", 5),
        ];
        let store = vec![
            settled_at("m1", Role::User, "ok", 0),
            settled_at("m2", Role::User, "ok", 5),
        ];
        assert_eq!(ids(&reconcile(&view, &store, WINDOW)), vec!["m1", "m2"]);

        // Two pending copies of the same text claim distinct records.
        let view = vec![
            pending_at(&alloc, Role::User, "ok", 0),
            pending_at(&alloc, Role::User, "ok", 5),
        ];
        let merged = reconcile(&view, &store, WINDOW);
        assert_eq!(ids(&merged), vec!["m1", "m2"]);
    }

    #[test]
    fn role_and_window_must_match() {
        let alloc = IdAllocator::new();
        let stale = settled_at("m1", Role::User, "hello", -600);
        let view = vec![pending_at(&alloc, Role::Assistant, "hello", 0)];

        let merged = reconcile(&view, &[stale.clone()], WINDOW);
        assert_eq!(merged.len(), 2);

        let user_view = vec![pending_at(&alloc, Role::User, "hello", 0)];
        let merged = reconcile(&user_view, &[stale], WINDOW);
        assert_eq!(merged.len(), 2);
        assert!(merged[1].is_pending());
    }

    #[test]
    fn reconcile_is_idempotent() {
        let alloc = IdAllocator::new();
        let view = vec![
            settled_at("m1", Role::User, "a", 0),
            pending_at(&alloc, Role::User, "b", 1),
            pending_at(&alloc, Role::Assistant, "unsaved", 2),
        ];
        let store = vec![
            settled_at("m1", Role::User, "a", 0),
            settled_at("m2", Role::User, "b", 1),
        ];

        let once = reconcile(&view, &store, WINDOW);
        let twice = reconcile(&once, &store, WINDOW);
        assert_eq!(once, twice);
        assert_eq!(once.last().map(Message::is_pending), Some(true));
    }

    #[test]
    fn empty_view_shows_the_store() {
        let store = vec![
            settled_at("m1", Role::User, "a", 0),
            settled_at("m2", Role::Assistant, "b", 1),
        ];
        assert_eq!(reconcile(&[], &store, WINDOW), store);
    }
}
