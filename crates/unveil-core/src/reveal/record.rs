//! The reveal record and its stage/status model.
//!
//! A `Reveal` is the single shared mutable resource of the protocol. It is
//! created by `request_reveal`, mutated only by the coordinator, and frozen
//! once its status turns terminal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The six protocol stages, in order. Stages only ever advance forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealStage {
    Preparation,
    Intention,
    MutualReadiness,
    Countdown,
    Reveal,
    Integration,
}

impl RevealStage {
    /// Position in the stage ordering.
    pub fn order(self) -> u8 {
        match self {
            RevealStage::Preparation => 0,
            RevealStage::Intention => 1,
            RevealStage::MutualReadiness => 2,
            RevealStage::Countdown => 3,
            RevealStage::Reveal => 4,
            RevealStage::Integration => 5,
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(self) -> Option<RevealStage> {
        match self {
            RevealStage::Preparation => Some(RevealStage::Intention),
            RevealStage::Intention => Some(RevealStage::MutualReadiness),
            RevealStage::MutualReadiness => Some(RevealStage::Countdown),
            RevealStage::Countdown => Some(RevealStage::Reveal),
            RevealStage::Reveal => Some(RevealStage::Integration),
            RevealStage::Integration => None,
        }
    }

    pub const ALL: [RevealStage; 6] = [
        RevealStage::Preparation,
        RevealStage::Intention,
        RevealStage::MutualReadiness,
        RevealStage::Countdown,
        RevealStage::Reveal,
        RevealStage::Integration,
    ];
}

/// Lifecycle status. `Pending` is the only non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealStatus {
    Pending,
    Completed,
    Declined,
    NotReady,
    Paused,
    Aborted,
    Timeout,
}

impl RevealStatus {
    pub fn is_terminal(self) -> bool {
        self != RevealStatus::Pending
    }
}

/// One reveal between two conversation participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reveal {
    pub id: String,
    pub conversation_id: String,
    pub requester_id: String,
    pub target_id: String,
    pub stage: RevealStage,
    pub status: RevealStatus,
    /// Frozen at creation; never re-evaluated afterwards.
    pub readiness_score_at_admission: f64,
    pub requester_intention: Option<String>,
    pub target_intention: Option<String>,
    pub requester_ready: Option<bool>,
    pub target_ready: Option<bool>,
    /// Recomputed on every stage entry.
    pub stage_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revealed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Reveal {
    /// Create a new pending reveal in `Preparation`.
    pub fn new(
        conversation_id: impl Into<String>,
        requester_id: impl Into<String>,
        target_id: impl Into<String>,
        readiness_score: f64,
        preparation_timeout: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            requester_id: requester_id.into(),
            target_id: target_id.into(),
            stage: RevealStage::Preparation,
            status: RevealStatus::Pending,
            readiness_score_at_admission: readiness_score.clamp(0.0, 1.0),
            requester_intention: None,
            target_intention: None,
            requester_ready: None,
            target_ready: None,
            stage_deadline: now + preparation_timeout,
            created_at: now,
            revealed_at: None,
            completed_at: None,
        }
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.requester_id == user_id || self.target_id == user_id
    }

    pub fn is_target(&self, user_id: &str) -> bool {
        self.target_id == user_id
    }

    /// Advance to `stage` and recompute the deadline.
    ///
    /// Returns false (and leaves the record untouched) if `stage` is not
    /// strictly ahead of the current one.
    pub fn enter_stage(&mut self, stage: RevealStage, timeout: Duration) -> bool {
        if stage.order() <= self.stage.order() {
            return false;
        }
        self.stage = stage;
        self.stage_deadline = Utc::now() + timeout;
        true
    }

    /// Record the caller's intention. Blank text does not count toward
    /// leaving the Intention stage.
    ///
    /// Returns true if the text was actually recorded.
    pub fn set_intention(&mut self, user_id: &str, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }
        if self.requester_id == user_id {
            self.requester_intention = Some(trimmed.to_string());
        } else {
            self.target_intention = Some(trimmed.to_string());
        }
        true
    }

    pub fn both_intentions_set(&self) -> bool {
        self.requester_intention.is_some() && self.target_intention.is_some()
    }

    pub fn set_readiness(&mut self, user_id: &str, ready: bool) {
        if self.requester_id == user_id {
            self.requester_ready = Some(ready);
        } else {
            self.target_ready = Some(ready);
        }
    }

    pub fn both_ready(&self) -> bool {
        self.requester_ready == Some(true) && self.target_ready == Some(true)
    }
}
