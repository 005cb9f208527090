//! Append-only progress log with replayable subscriptions

use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

use crate::types::ProgressEvent;

/// Ordered progress events of one document
///
/// Sequence numbers are positions in the log, so subscribers can resume from any
/// point and never see a gap or a duplicate.
pub struct EventLog {
    events: RwLock<Vec<ProgressEvent>>,
    length: watch::Sender<usize>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::from_events(Vec::new())
    }

    /// Rebuild a log from persisted events
    pub fn from_events(mut events: Vec<ProgressEvent>) -> Self {
        events.sort_by_key(|e| e.sequence);
        let (length, _) = watch::channel(events.len());
        Self {
            events: RwLock::new(events),
            length,
        }
    }

    /// Sequence the next appended event will get
    pub fn next_sequence(&self) -> u64 {
        self.events.read().len() as u64
    }

    /// Assign the next sequence number without appending
    pub fn stamp(&self, mut event: ProgressEvent) -> ProgressEvent {
        event.sequence = self.next_sequence();
        event
    }

    /// Append an event and wake subscribers
    pub fn push(&self, mut event: ProgressEvent) {
        let len = {
            let mut events = self.events.write();
            event.sequence = events.len() as u64;
            events.push(event);
            events.len()
        };
        self.length.send_replace(len);
    }

    pub fn get(&self, sequence: u64) -> Option<ProgressEvent> {
        usize::try_from(sequence)
            .ok()
            .and_then(|i| self.events.read().get(i).cloned())
    }

    /// True once a terminal event has been appended
    pub fn is_closed(&self) -> bool {
        self.events
            .read()
            .last()
            .map(ProgressEvent::is_terminal)
            .unwrap_or(false)
    }

    /// Stream events from `from` onward, live
    ///
    /// The stream ends after yielding the terminal event, or immediately when the
    /// log is already closed and `from` is past its end.
    pub fn subscribe(self: &Arc<Self>, from: u64) -> BoxStream<'static, ProgressEvent> {
        let changes = self.length.subscribe();
        let log = Arc::clone(self);

        stream::unfold(
            (log, changes, from, false),
            |(log, mut changes, cursor, finished)| async move {
                if finished {
                    return None;
                }
                loop {
                    if let Some(event) = log.get(cursor) {
                        let terminal = event.is_terminal();
                        return Some((event, (log, changes, cursor + 1, terminal)));
                    }
                    if log.is_closed() || changes.changed().await.is_err() {
                        return None;
                    }
                }
            },
        )
        .boxed()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
