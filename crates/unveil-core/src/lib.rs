//! # Unveil Core Library
//!
//! This library implements the mutual-consent photo reveal protocol: a
//! six-stage state machine with per-stage deadlines, bilateral
//! confirmation, and a readiness-score admission gate computed from
//! conversational signals. It is consumed by a service layer or by the
//! standalone CLI binary; both drive the same coordinator.
//!
//! ## Architecture
//!
//! - **Reveal Coordinator**: the state machine. Serializes mutations per
//!   record, schedules one cancellable deadline timer per stage, and emits
//!   typed events to an injected sink after each transition
//! - **Readiness Scorer**: pure weighted scoring of a conversation feature
//!   snapshot, gating admission at a configurable threshold
//! - **Quota Gate**: tier-based daily allowance with compensatable
//!   reservations
//! - **Storage**: SQLite-backed reveal store and TOML-based configuration
//!
//! Conversation feature extraction, usage lookup, and notification
//! delivery are collaborator traits implemented outside the core.
//!
//! ## Key Components
//!
//! - [`RevealCoordinator`]: protocol state machine
//! - [`ReadinessScorer`]: admission scoring
//! - [`RevealStore`]: record persistence seam
//! - [`NotificationSink`]: event delivery seam

pub mod error;
pub mod events;
pub mod features;
pub mod quota;
pub mod readiness;
pub mod reveal;
pub mod storage;

pub use error::{ConfigError, CoreError, RevealError, StoreError};
pub use events::{Event, MemorySink, NotificationSink, NullSink};
pub use features::{ConversationFeatures, FeatureSource};
pub use quota::{QuotaGate, QuotaGrant, Tier, TierCaps, UsageSource};
pub use readiness::{ReadinessScorer, ScoreBreakdown, SignalTerm, SignalWeights};
pub use reveal::{
    Guidance, Reveal, RevealCoordinator, RevealRequest, RevealResponse, RevealStage, RevealStatus,
    RevealSummary, StageTimers,
};
pub use storage::{
    MemoryRevealStore, RevealConfig, RevealStore, SqliteRevealStore,
};
