//! Event types for the BeaBot event system
//!
//! Provides shared event definitions and the EventBus used by the core
//! components. Scheduler and reaper outcomes are silent to end users; the
//! event stream is where they become observable outside of logs.

mod moderation_types;
mod playback_types;

pub use moderation_types::ActionKind;
pub use playback_types::{RepeatMode, SessionState};

use crate::ids::{SubjectId, WorkspaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// BeaBot event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BotEvent {
    /// Session state changed
    PlaybackStateChanged {
        workspace: WorkspaceId,
        old_state: SessionState,
        new_state: SessionState,
        timestamp: DateTime<Utc>,
    },

    /// A track started playing
    TrackStarted {
        workspace: WorkspaceId,
        track_id: Uuid,
        title: String,
        timestamp: DateTime<Utc>,
    },

    /// A track left the active slot
    TrackFinished {
        workspace: WorkspaceId,
        track_id: Uuid,
        title: String,
        /// False when the track was skipped
        completed: bool,
        timestamp: DateTime<Utc>,
    },

    /// The platform refused to play a track
    TrackFailed {
        workspace: WorkspaceId,
        track_id: Uuid,
        title: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Queue contents changed
    QueueChanged {
        workspace: WorkspaceId,
        length: usize,
        timestamp: DateTime<Utc>,
    },

    /// Session removed from the registry
    SessionClosed {
        workspace: WorkspaceId,
        timestamp: DateTime<Utc>,
    },

    /// A query could not be turned into a playable track
    ResolutionFailed {
        workspace: Option<WorkspaceId>,
        query: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A moderation action was applied on the platform
    ModerationApplied {
        workspace: WorkspaceId,
        subject: SubjectId,
        kind: ActionKind,
        reason: String,
        /// Present for temporary actions
        duration_secs: Option<u64>,
        timestamp: DateTime<Utc>,
    },

    /// A temporary action reversal was scheduled
    ActionScheduled {
        workspace: WorkspaceId,
        subject: SubjectId,
        kind: ActionKind,
        expires_at: DateTime<Utc>,
        /// True when an earlier pending action for the subject was replaced
        replaced: bool,
        timestamp: DateTime<Utc>,
    },

    /// An expired action was reversed and cleared
    ActionReversed {
        subject: SubjectId,
        kind: ActionKind,
        /// Workspaces where the reversal succeeded
        workspaces: Vec<WorkspaceId>,
        timestamp: DateTime<Utc>,
    },

    /// A pending action exhausted its reversal attempts
    ActionAbandoned {
        subject: SubjectId,
        kind: ActionKind,
        attempts: u32,
        last_error: String,
        timestamp: DateTime<Utc>,
    },
}

impl BotEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            BotEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            BotEvent::TrackStarted { .. } => "TrackStarted",
            BotEvent::TrackFinished { .. } => "TrackFinished",
            BotEvent::TrackFailed { .. } => "TrackFailed",
            BotEvent::QueueChanged { .. } => "QueueChanged",
            BotEvent::SessionClosed { .. } => "SessionClosed",
            BotEvent::ResolutionFailed { .. } => "ResolutionFailed",
            BotEvent::ModerationApplied { .. } => "ModerationApplied",
            BotEvent::ActionScheduled { .. } => "ActionScheduled",
            BotEvent::ActionReversed { .. } => "ActionReversed",
            BotEvent::ActionAbandoned { .. } => "ActionAbandoned",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use beabot_common::events::{BotEvent, EventBus};
/// use beabot_common::WorkspaceId;
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(BotEvent::SessionClosed {
///     workspace: WorkspaceId(1),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BotEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: BotEvent) -> Result<usize, broadcast::error::SendError<BotEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: BotEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = BotEvent::QueueChanged {
            workspace: WorkspaceId(5),
            length: 3,
            timestamp: Utc::now(),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "QueueChanged");
        assert_eq!(json["workspace"], 5);
        assert_eq!(json["length"], 3);
        assert_eq!(event.event_type(), "QueueChanged");
    }

    #[test]
    fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        let result = bus.emit(BotEvent::SessionClosed {
            workspace: WorkspaceId(1),
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let delivered = bus
            .emit(BotEvent::SessionClosed {
                workspace: WorkspaceId(9),
                timestamp: Utc::now(),
            })
            .unwrap();
        assert_eq!(delivered, 2);

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                BotEvent::SessionClosed { workspace, .. } => assert_eq!(workspace, WorkspaceId(9)),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }
}
