//! Paced, character-by-character disclosure of a fully received text.
//!
//! The reveal is a lazy stream: nothing is emitted until it is polled, and the
//! consumer cancels it by dropping the stream.

use futures_util::stream::{self, Stream, StreamExt};
use std::time::Duration;

/// Stream the growing prefixes of `full`, one character per item.
///
/// The first prefix is emitted immediately; each following prefix waits
/// `step`. A zero `step` emits every prefix without sleeping. Prefixes always
/// end on a character boundary, and the last item equals `full`.
pub fn reveal_stream(full: String, step: Duration) -> impl Stream<Item = String> + Send + 'static {
    let ends: Vec<usize> = full
        .char_indices()
        .map(|(index, ch)| index + ch.len_utf8())
        .collect();
    stream::unfold((full, ends, 0usize), move |(full, ends, position)| async move {
        let end = *ends.get(position)?;
        if position > 0 && !step.is_zero() {
            tokio::time::sleep(step).await;
        }
        let partial = full[..end].to_string();
        Some((partial, (full, ends, position + 1)))
    })
}

/// Drive a reveal to completion, calling `on_partial` for every prefix and
/// `on_done` once afterwards.
pub async fn reveal<P, D>(full: &str, step: Duration, mut on_partial: P, on_done: D)
where
    P: FnMut(&str),
    D: FnOnce(),
{
    let mut partials = Box::pin(reveal_stream(full.to_string(), step));
    while let Some(partial) = partials.next().await {
        on_partial(&partial);
    }
    on_done();
}
