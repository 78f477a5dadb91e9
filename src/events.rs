//! Bounded error-event queue : runtime errors encountered inside
//! a play loop are logged and pushed here instead of failing a
//! capability call, so external observers can subscribe to what went
//! wrong without one frame's failure blocking another caller's request.
//!
//! Grounded on the preview streamer's bounded-queue-with-drop idiom
//! (`preview/mod.rs`'s `SUBSCRIBER_QUEUE_DEPTH`): a fixed-capacity ring
//! that discards the oldest entry on overflow rather than blocking the
//! play loop that is pushing to it.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;
use uuid::Uuid;

const EVENT_QUEUE_CAPACITY: usize = 256;

/// One logged runtime failure , tagged with
/// enough context for an observer to correlate it with a frame and clip.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub player_id: String,
    pub frame_number: u64,
    pub clip_id: Option<Uuid>,
    pub kind: String,
    pub message: String,
}

/// A fixed-capacity FIFO of [`ErrorEvent`]s. Oldest events are dropped
/// on overflow; this is a diagnostics feed, not a delivery guarantee.
pub struct ErrorEventQueue {
    events: Mutex<VecDeque<ErrorEvent>>,
}

impl ErrorEventQueue {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(EVENT_QUEUE_CAPACITY)),
        }
    }

    pub fn push(&self, event: ErrorEvent) {
        let mut events = self.events.lock().expect("error event queue poisoned");
        if events.len() >= EVENT_QUEUE_CAPACITY {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Drain everything currently queued. A poll, not a stream: a caller
    /// that wants push delivery subscribes at the transport layer, out
    /// of scope here.
    pub fn drain(&self) -> Vec<ErrorEvent> {
        self.events.lock().expect("error event queue poisoned").drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("error event queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ErrorEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u64) -> ErrorEvent {
        ErrorEvent {
            player_id: "video".to_string(),
            frame_number: n,
            clip_id: None,
            kind: "internal".to_string(),
            message: format!("event {}", n),
        }
    }

    #[test]
    fn drain_returns_everything_and_empties_the_queue() {
        let queue = ErrorEventQueue::new();
        queue.push(event(1));
        queue.push(event(2));
        assert_eq!(queue.len(), 2);
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_drops_the_oldest_event() {
        let queue = ErrorEventQueue::new();
        for i in 0..(EVENT_QUEUE_CAPACITY as u64 + 10) {
            queue.push(event(i));
        }
        assert_eq!(queue.len(), EVENT_QUEUE_CAPACITY);
        let drained = queue.drain();
        assert_eq!(drained[0].frame_number, 10);
    }
}
