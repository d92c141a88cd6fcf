//! Conversation feature snapshots consumed by the readiness scorer.
//!
//! Features are extracted externally from conversation history; this module
//! only defines the snapshot shape and the collaborator seam that supplies
//! it. All ratio fields are normalized to [0, 1]; missing signals default to
//! zero, which biases admission toward rejection rather than premature
//! disclosure.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A point-in-time view of conversational signals for one conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConversationFeatures {
    /// Total messages exchanged in the conversation.
    #[serde(default)]
    pub message_count: u32,
    /// Share of messages classified as emotionally deep.
    #[serde(default)]
    pub depth_ratio: f64,
    /// Share of messages containing self-disclosure.
    #[serde(default)]
    pub vulnerability_ratio: f64,
    /// Whether both participants have disclosed, not just one.
    #[serde(default)]
    pub mutual_vulnerability: bool,
    /// Day-over-day engagement consistency.
    #[serde(default)]
    pub consistency_score: f64,
    /// Share of messages referencing shared future plans.
    #[serde(default)]
    pub future_talk_ratio: f64,
    /// Share of messages that ask the other person something.
    #[serde(default)]
    pub question_ratio: f64,
    /// Regularity of reply latencies.
    #[serde(default)]
    pub response_time_consistency: f64,
    /// Connection score carried over from prior interactions.
    #[serde(default)]
    pub prior_emotional_connection_score: f64,
    /// Optional model-based secondary assessment, blended when present.
    #[serde(default)]
    pub secondary_score: Option<f64>,
}

/// Supplies feature snapshots for conversations.
///
/// Implemented outside the core by whatever owns conversation history.
pub trait FeatureSource: Send + Sync {
    fn conversation_features(&self, conversation_id: &str)
        -> Result<ConversationFeatures, CoreError>;
}
