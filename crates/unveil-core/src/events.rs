//! Protocol events.
//!
//! Every accepted mutation produces one or more events. Events are
//! collected while the record lock is held and delivered to the injected
//! sink only after it is released; the sink must never be reached
//! mid-mutation. Transport is at-least-once, so sinks should tolerate
//! duplicates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reveal::{RevealStage, RevealStatus};
use crate::reveal::guidance::Guidance;

/// Closed set of events emitted by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RevealRequested {
        reveal_id: String,
        conversation_id: String,
        stage: RevealStage,
        requester_id: String,
        target_id: String,
        message: Option<String>,
        stage_deadline: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    RevealAccepted {
        reveal_id: String,
        conversation_id: String,
        stage: RevealStage,
        at: DateTime<Utc>,
    },
    RevealDeclined {
        reveal_id: String,
        conversation_id: String,
        status: RevealStatus,
        message: Option<String>,
        at: DateTime<Utc>,
    },
    RevealNotReady {
        reveal_id: String,
        conversation_id: String,
        status: RevealStatus,
        guidance: Guidance,
        at: DateTime<Utc>,
    },
    IntentionRecorded {
        reveal_id: String,
        conversation_id: String,
        stage: RevealStage,
        user_id: String,
        both_recorded: bool,
        at: DateTime<Utc>,
    },
    /// Generic stage-entry notice for transitions without a dedicated event.
    StageProgress {
        reveal_id: String,
        conversation_id: String,
        stage: RevealStage,
        status: RevealStatus,
        stage_deadline: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    CountdownStarted {
        reveal_id: String,
        conversation_id: String,
        stage: RevealStage,
        stage_deadline: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    PhotosRevealed {
        reveal_id: String,
        conversation_id: String,
        stage: RevealStage,
        revealed_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// Celebration notice; fired right after `photos_revealed`.
    RevealCompleted {
        reveal_id: String,
        conversation_id: String,
        status: RevealStatus,
        at: DateTime<Utc>,
    },
    RevealAborted {
        reveal_id: String,
        conversation_id: String,
        status: RevealStatus,
        aborted_by: String,
        at: DateTime<Utc>,
    },
    RevealTimeout {
        reveal_id: String,
        conversation_id: String,
        stage: RevealStage,
        status: RevealStatus,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// The reveal this event belongs to.
    pub fn reveal_id(&self) -> &str {
        match self {
            Event::RevealRequested { reveal_id, .. }
            | Event::RevealAccepted { reveal_id, .. }
            | Event::RevealDeclined { reveal_id, .. }
            | Event::RevealNotReady { reveal_id, .. }
            | Event::IntentionRecorded { reveal_id, .. }
            | Event::StageProgress { reveal_id, .. }
            | Event::CountdownStarted { reveal_id, .. }
            | Event::PhotosRevealed { reveal_id, .. }
            | Event::RevealCompleted { reveal_id, .. }
            | Event::RevealAborted { reveal_id, .. }
            | Event::RevealTimeout { reveal_id, .. } => reveal_id,
        }
    }
}

/// Receives coordinator events for delivery to users.
///
/// Injected into the coordinator; implementations should enqueue quickly
/// and do their real I/O elsewhere.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, event: &Event);
}

/// Sink that drops everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn deliver(&self, _event: &Event) {}
}

/// Sink that records events in memory, for tests and local inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| {
                serde_json::to_value(e)
                    .ok()
                    .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from))
                    .unwrap_or_default()
            })
            .collect()
    }
}

impl NotificationSink for MemorySink {
    fn deliver(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}
