//! Change feed for observing document writes.
//!
//! Every successful create, update, save, migration rewrite and delete is
//! published as a [`ChangeEvent`]. Subscribers receive events through an
//! `mpsc` channel; recent events are also kept for polling.
//!
//! # Usage
//!
//! ```rust,ignore
//! use quidstore_core::CollectionStore;
//!
//! let store = CollectionStore::in_memory(Config::default());
//! let receiver = store.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(event) = receiver.recv() {
//!         println!("{} {:?} {}", event.collection, event.change_type, event.uuid);
//!     }
//! });
//! ```

use crate::document::Document;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

/// Type of change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Document was created.
    Insert,
    /// Document was rewritten.
    Update,
    /// Document was deleted.
    Delete,
}

/// A single change event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Position in the feed, assigned on emission. Starts at 1.
    pub sequence: u64,
    /// Collection name.
    pub collection: String,
    /// Document id.
    pub uuid: String,
    /// Type of change.
    pub change_type: ChangeType,
    /// The document as written (for Insert/Update) or as deleted.
    pub document: Option<Document>,
}

impl ChangeEvent {
    fn new(
        collection: &str,
        uuid: &str,
        change_type: ChangeType,
        document: Option<Document>,
    ) -> Self {
        Self {
            sequence: 0,
            collection: collection.to_string(),
            uuid: uuid.to_string(),
            change_type,
            document,
        }
    }

    /// Creates an insert event.
    pub fn insert(collection: &str, uuid: &str, document: Document) -> Self {
        Self::new(collection, uuid, ChangeType::Insert, Some(document))
    }

    /// Creates an update event.
    pub fn update(collection: &str, uuid: &str, document: Document) -> Self {
        Self::new(collection, uuid, ChangeType::Update, Some(document))
    }

    /// Creates a delete event, carrying the deleted document when known.
    pub fn delete(collection: &str, uuid: &str, document: Option<Document>) -> Self {
        Self::new(collection, uuid, ChangeType::Delete, document)
    }
}

/// Distributes change events to subscribers.
///
/// Events are delivered in emission order and numbered consecutively.
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
    /// Recent events plus the last assigned sequence.
    history: Mutex<(VecDeque<ChangeEvent>, u64)>,
    max_history: usize,
}

impl ChangeFeed {
    /// Creates a change feed with the default history limit.
    pub fn new() -> Self {
        Self::with_max_history(10_000)
    }

    /// Creates a change feed keeping at most `max_history` events.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: Mutex::new((VecDeque::new(), 0)),
            max_history,
        }
    }

    /// Subscribes to the change feed.
    ///
    /// The receiver sees every event emitted after this call. Drop it to
    /// unsubscribe.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Numbers `event`, records it and sends it to every subscriber.
    ///
    /// Returns the assigned sequence.
    pub fn emit(&self, mut event: ChangeEvent) -> u64 {
        let mut history = self.history.lock();
        history.1 += 1;
        event.sequence = history.1;
        if self.max_history > 0 {
            history.0.push_back(event.clone());
            while history.0.len() > self.max_history {
                history.0.pop_front();
            }
        }

        // Still holding the history lock, so subscribers see sequence order.
        self.subscribers
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
        event.sequence
    }

    /// Emits several events in order.
    pub fn emit_batch(&self, events: Vec<ChangeEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Returns up to `limit` recorded events with sequence greater than `cursor`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<ChangeEvent> {
        self.history
            .lock()
            .0
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the last assigned sequence, or 0 before any event.
    pub fn latest_sequence(&self) -> u64 {
        self.history.lock().1
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of recorded events.
    pub fn history_len(&self) -> usize {
        self.history.lock().0.len()
    }

    /// Drops recorded events older than `min_sequence`.
    pub fn truncate_history(&self, min_sequence: u64) {
        self.history.lock().0.retain(|e| e.sequence >= min_sequence);
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("subscribers", &self.subscriber_count())
            .field("latest_sequence", &self.latest_sequence())
            .field("max_history", &self.max_history)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn profile(name: &str) -> Document {
        Document::from_value(json!({"uuid": "a1", "name": name})).unwrap()
    }

    #[test]
    fn emit_and_receive() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();

        let sequence = feed.emit(ChangeEvent::insert("profiles", "a1", profile("Rex")));
        assert_eq!(sequence, 1);

        let received = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received.sequence, 1);
        assert_eq!(received.change_type, ChangeType::Insert);
        assert_eq!(received.document, Some(profile("Rex")));
    }

    #[test]
    fn multiple_subscribers() {
        let feed = ChangeFeed::new();
        let rx1 = feed.subscribe();
        let rx2 = feed.subscribe();

        feed.emit(ChangeEvent::delete("profiles", "a1", None));

        assert_eq!(rx1.recv().unwrap().uuid, "a1");
        assert_eq!(rx2.recv().unwrap().change_type, ChangeType::Delete);
    }

    #[test]
    fn subscriber_cleanup() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(rx);
        feed.emit(ChangeEvent::delete("profiles", "a1", None));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn poll_from_cursor() {
        let feed = ChangeFeed::new();
        for name in ["a", "b", "c", "d", "e"] {
            feed.emit(ChangeEvent::update("profiles", "a1", profile(name)));
        }

        let events = feed.poll(2, 10);
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![3, 4, 5]);
        assert_eq!(feed.poll(0, 2).len(), 2);
    }

    #[test]
    fn history_is_bounded() {
        let feed = ChangeFeed::with_max_history(5);
        for _ in 0..10 {
            feed.emit(ChangeEvent::delete("profiles", "a1", None));
        }

        assert_eq!(feed.history_len(), 5);
        assert_eq!(feed.poll(0, 100)[0].sequence, 6);
        assert_eq!(feed.latest_sequence(), 10);

        feed.truncate_history(9);
        assert_eq!(feed.history_len(), 2);
    }

    #[test]
    fn threaded_emitters_get_distinct_sequences() {
        let feed = Arc::new(ChangeFeed::new());
        let rx = feed.subscribe();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let feed = Arc::clone(&feed);
                thread::spawn(move || {
                    for _ in 0..25 {
                        feed.emit(ChangeEvent::delete("profiles", "a1", None));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let received: Vec<u64> = rx.try_iter().map(|e| e.sequence).collect();
        assert_eq!(received, (1..=100).collect::<Vec<u64>>());
    }
}
