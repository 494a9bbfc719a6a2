//! # Event Bus System
//!
//! Provides an event-driven architecture for the playback-sync core using
//! `tokio::sync::broadcast`. Core modules publish typed events; the host
//! (player UI, "recently played" lists, diagnostics) subscribes independently.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enums for position writes and bulk sync passes
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐   emit   ┌───────────┐
//! │ LocalPositionStore ├─────────>│           │   subscribe   ┌────────────┐
//! └────────────────────┘          │ EventBus  ├──────────────>│ Subscriber │
//! ┌────────────────────┐   emit   │ (broadcast│               └────────────┘
//! │ BulkSyncDriver     ├─────────>│  channel) │
//! └────────────────────┘          └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PositionEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Position(PositionEvent::Updated {
//!         handle: "content://media/42".to_string(),
//!         position_ms: 5_000,
//!         updated_at: 1_700_000_000_000,
//!     }))
//!     .ok();
//!
//! let received = stream.recv().await.unwrap();
//! assert!(matches!(received, CoreEvent::Position(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers returns an error that publishers ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Local position store writes
    Position(PositionEvent),
    /// Bulk sync passes
    Sync(SyncEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Position(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Cancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Position Events
// ============================================================================

/// Events emitted after a successful write to the local position store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PositionEvent {
    /// Resume position (and its timestamp) changed for a file.
    Updated {
        /// Opaque file handle of the row.
        handle: String,
        /// Persisted position in milliseconds; may be the unset sentinel.
        position_ms: i64,
        /// Position timestamp (Unix epoch milliseconds).
        updated_at: i64,
    },
    /// Positions were overwritten in bulk for every row sharing a content hash.
    UpdatedByIdentifier {
        /// Content identifier the rows were matched on.
        identifier: String,
        /// Persisted position in milliseconds.
        position_ms: i64,
        /// Position timestamp (Unix epoch milliseconds).
        updated_at: i64,
        /// Number of rows touched.
        rows: u64,
    },
    /// A per-file player setting changed (speed, track, zoom, subtitles).
    SettingChanged {
        /// Opaque file handle of the row.
        handle: String,
        /// Name of the setting that changed.
        setting: String,
    },
}

impl PositionEvent {
    fn description(&self) -> &str {
        match self {
            PositionEvent::Updated { .. } => "Playback position updated",
            PositionEvent::UpdatedByIdentifier { .. } => "Playback positions updated by identifier",
            PositionEvent::SettingChanged { .. } => "Player setting changed",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events related to bulk sync passes over the external folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Bulk sync pass initiated.
    Started {
        /// Unique identifier for this pass.
        job_id: String,
        /// Checkpoint the pass reads from, if any.
        since: Option<i64>,
    },
    /// Bulk sync pass finished and the checkpoint advanced.
    Completed {
        /// The pass ID.
        job_id: String,
        /// Records applied to the local store.
        records_applied: u64,
        /// New checkpoint (Unix epoch milliseconds).
        checkpoint: i64,
        /// Wall-clock duration of the pass in milliseconds.
        duration_ms: u64,
    },
    /// Bulk sync pass failed; the checkpoint was left unchanged.
    Failed {
        /// The pass ID.
        job_id: String,
        /// Human-readable error message.
        message: String,
        /// Records applied before the failure.
        records_applied: u64,
    },
    /// Bulk sync pass was cancelled with its owning lifecycle.
    Cancelled {
        /// The pass ID.
        job_id: String,
        /// Records applied before cancellation.
        records_applied: u64,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Completed { .. } => "Sync completed successfully",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Cancelled { .. } => "Sync cancelled",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let sync_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter (if any).
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position_event(handle: &str, position_ms: i64) -> CoreEvent {
        CoreEvent::Position(PositionEvent::Updated {
            handle: handle.to_string(),
            position_ms,
            updated_at: 1_700_000_000_000,
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(position_event("a", 1)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Sync(SyncEvent::Started {
            job_id: "job-1".to_string(),
            since: Some(42),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Sync(_)));

        bus.emit(position_event("content://media/1", 1000)).ok();

        let sync_event = CoreEvent::Sync(SyncEvent::Completed {
            job_id: "job-1".to_string(),
            records_applied: 3,
            checkpoint: 1_700_000_000_000,
            duration_ms: 12,
        });
        bus.emit(sync_event.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), sync_event);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(position_event("content://media/1", i)).ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity_and_description() {
        let failed = CoreEvent::Sync(SyncEvent::Failed {
            job_id: "job-1".to_string(),
            message: "folder revoked".to_string(),
            records_applied: 0,
        });
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(failed.description(), "Sync failed");

        let setting = CoreEvent::Position(PositionEvent::SettingChanged {
            handle: "h".to_string(),
            setting: "zoom".to_string(),
        });
        assert_eq!(setting.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Position(PositionEvent::UpdatedByIdentifier {
            identifier: "abc123".to_string(),
            position_ms: 7000,
            updated_at: 200,
            rows: 2,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("abc123"));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe();

        let handles: Vec<_> = (0..2)
            .map(|worker| {
                let bus = bus.clone();
                tokio::spawn(async move {
                    for i in 0..10 {
                        bus.emit(position_event(&format!("worker-{}", worker), i)).ok();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.ok();
        }

        let mut count = 0;
        while sub.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 20);
    }
}
