//! The reveal coordinator.
//!
//! One coordinator instance serves a deployment. Each reveal is an
//! independently mutable resource: operations on different reveals run in
//! parallel, operations on the same reveal serialize on a per-record lock.
//! Admission work (scoring, quota) happens before the record exists, so no
//! lock is held for it.
//!
//! Mutations follow one discipline: acquire the record lock, re-read the
//! record, validate stage and caller authority, mutate, persist, then
//! release the lock and only afterwards hand the collected events to the
//! notification sink. Timer firings go through the same lock; a firing
//! that lost the race to a user action observes the new stage and becomes
//! a no-op.

use std::sync::{Arc, Weak};

use chrono::{Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::guidance::{self, Guidance};
use super::record::{Reveal, RevealStage, RevealStatus};
use super::timers::StageTimers;
use crate::error::RevealError;
use crate::events::{Event, NotificationSink};
use crate::features::FeatureSource;
use crate::quota::{QuotaGate, Tier, UsageSource};
use crate::readiness::ReadinessScorer;
use crate::storage::{RevealConfig, RevealStore};

/// Input to `request_reveal`.
///
/// The caller resolves conversation membership and the requester's tier;
/// the core only consumes them.
#[derive(Debug, Clone)]
pub struct RevealRequest {
    pub conversation_id: String,
    pub requester_id: String,
    pub target_id: String,
    pub tier: Tier,
    pub message: Option<String>,
}

/// Target's answer to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealResponse {
    Accept,
    Decline,
    NotReady,
}

/// Read-only view returned by `get_status`.
#[derive(Debug, Clone, Serialize)]
pub struct RevealSummary {
    pub reveal: Reveal,
    /// Present once the reveal has settled into a terminal status.
    pub guidance: Option<Guidance>,
}

/// The protocol state machine.
pub struct RevealCoordinator {
    config: RevealConfig,
    scorer: ReadinessScorer,
    quota: QuotaGate,
    store: Arc<dyn RevealStore>,
    features: Arc<dyn FeatureSource>,
    sink: Arc<dyn NotificationSink>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    timers: StageTimers,
    weak: Weak<RevealCoordinator>,
}

impl RevealCoordinator {
    /// Build a coordinator with its collaborators injected.
    pub fn new(
        config: RevealConfig,
        store: Arc<dyn RevealStore>,
        features: Arc<dyn FeatureSource>,
        usage: Arc<dyn UsageSource>,
        sink: Arc<dyn NotificationSink>,
    ) -> Arc<Self> {
        let scorer = ReadinessScorer::new()
            .with_volume_thresholds(
                config.admission.min_messages,
                config.admission.confidence_window,
            )
            .with_secondary_blend(config.admission.secondary_blend);
        let quota = QuotaGate::new(config.quota.caps(), usage);

        Arc::new_cyclic(|weak| Self {
            config,
            scorer,
            quota,
            store,
            features,
            sink,
            locks: DashMap::new(),
            timers: StageTimers::new(),
            weak: weak.clone(),
        })
    }

    pub fn config(&self) -> &RevealConfig {
        &self.config
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Open a reveal for a conversation.
    ///
    /// Runs the admission gate (readiness score, then quota), enforces the
    /// one-pending-reveal-per-conversation invariant, creates the record in
    /// `Preparation` and notifies the target. The quota reservation is
    /// released if record creation fails after it was taken.
    pub async fn request_reveal(&self, request: RevealRequest) -> Result<Reveal, RevealError> {
        let features = self
            .features
            .conversation_features(&request.conversation_id)?;
        let breakdown = self.scorer.score(&features);
        let required = self.config.admission.threshold;
        if breakdown.final_score < required {
            return Err(RevealError::InsufficientConnection {
                score: breakdown.final_score,
                required,
            });
        }

        let grant = self
            .quota
            .check_and_reserve(&request.requester_id, request.tier)?;

        // Cheap pre-check; the store's unique index stays authoritative.
        match self
            .store
            .load_active_by_conversation(&request.conversation_id)
        {
            Ok(None) => {}
            Ok(Some(_)) => {
                self.quota.release(grant);
                return Err(RevealError::AlreadyInProgress {
                    conversation_id: request.conversation_id,
                });
            }
            Err(e) => {
                self.quota.release(grant);
                return Err(e.into());
            }
        }

        let reveal = Reveal::new(
            &request.conversation_id,
            &request.requester_id,
            &request.target_id,
            breakdown.final_score,
            self.stage_duration(RevealStage::Preparation),
        );
        if let Err(e) = self.store.persist(&reveal) {
            self.quota.release(grant);
            return Err(e.into());
        }
        self.quota.commit(grant);

        self.schedule_stage_timer(&reveal.id, RevealStage::Preparation);
        self.dispatch(vec![Event::RevealRequested {
            reveal_id: reveal.id.clone(),
            conversation_id: reveal.conversation_id.clone(),
            stage: reveal.stage,
            requester_id: reveal.requester_id.clone(),
            target_id: reveal.target_id.clone(),
            message: request.message,
            stage_deadline: reveal.stage_deadline,
            at: reveal.created_at,
        }]);
        Ok(reveal)
    }

    /// The target's answer during `Preparation`.
    pub async fn respond_to_reveal(
        &self,
        reveal_id: &str,
        user_id: &str,
        response: RevealResponse,
        message: Option<String>,
    ) -> Result<Reveal, RevealError> {
        // Gap hints need the feature snapshot; fetch it before taking the
        // record lock so no collaborator I/O happens mid-mutation.
        let not_ready_guidance = if response == RevealResponse::NotReady {
            let conversation_id = self
                .store
                .load(reveal_id)?
                .ok_or_else(|| RevealError::NotFound {
                    reveal_id: reveal_id.to_string(),
                })?
                .conversation_id;
            let features = self
                .features
                .conversation_features(&conversation_id)
                .unwrap_or_default();
            Some(guidance::for_not_ready(&features))
        } else {
            None
        };

        let intention_timeout = self.stage_duration(RevealStage::Intention);
        self.mutate(reveal_id, |reveal| {
            if !reveal.is_participant(user_id) {
                return Err(RevealError::NotParticipant);
            }
            if reveal.status.is_terminal() || reveal.stage != RevealStage::Preparation {
                return Err(RevealError::InvalidStageTransition {
                    stage: reveal.stage,
                    action: "respond",
                });
            }
            if !reveal.is_target(user_id) {
                // Only the target answers a request.
                return Err(RevealError::InvalidStageTransition {
                    stage: reveal.stage,
                    action: "respond",
                });
            }

            let now = Utc::now();
            match response {
                RevealResponse::Accept => {
                    reveal.enter_stage(RevealStage::Intention, intention_timeout);
                    Ok(vec![
                        Event::RevealAccepted {
                            reveal_id: reveal.id.clone(),
                            conversation_id: reveal.conversation_id.clone(),
                            stage: reveal.stage,
                            at: now,
                        },
                        Event::StageProgress {
                            reveal_id: reveal.id.clone(),
                            conversation_id: reveal.conversation_id.clone(),
                            stage: reveal.stage,
                            status: reveal.status,
                            stage_deadline: reveal.stage_deadline,
                            at: now,
                        },
                    ])
                }
                RevealResponse::Decline => {
                    reveal.status = RevealStatus::Declined;
                    Ok(vec![Event::RevealDeclined {
                        reveal_id: reveal.id.clone(),
                        conversation_id: reveal.conversation_id.clone(),
                        status: reveal.status,
                        message,
                        at: now,
                    }])
                }
                RevealResponse::NotReady => {
                    reveal.status = RevealStatus::NotReady;
                    let payload = not_ready_guidance
                        .unwrap_or_else(|| guidance::for_not_ready(&Default::default()));
                    Ok(vec![Event::RevealNotReady {
                        reveal_id: reveal.id.clone(),
                        conversation_id: reveal.conversation_id.clone(),
                        status: reveal.status,
                        guidance: payload,
                        at: now,
                    }])
                }
            }
        })
        .await
    }

    /// Record a participant's intention during `Intention`.
    pub async fn submit_intention(
        &self,
        reveal_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<Reveal, RevealError> {
        let readiness_timeout = self.stage_duration(RevealStage::MutualReadiness);
        self.mutate(reveal_id, |reveal| {
            if !reveal.is_participant(user_id) {
                return Err(RevealError::NotParticipant);
            }
            if reveal.status.is_terminal() || reveal.stage != RevealStage::Intention {
                return Err(RevealError::InvalidStageTransition {
                    stage: reveal.stage,
                    action: "submit_intention",
                });
            }

            let mut events = Vec::new();
            if reveal.set_intention(user_id, text) {
                let now = Utc::now();
                events.push(Event::IntentionRecorded {
                    reveal_id: reveal.id.clone(),
                    conversation_id: reveal.conversation_id.clone(),
                    stage: reveal.stage,
                    user_id: user_id.to_string(),
                    both_recorded: reveal.both_intentions_set(),
                    at: now,
                });
                if reveal.both_intentions_set() {
                    reveal.enter_stage(RevealStage::MutualReadiness, readiness_timeout);
                    events.push(Event::StageProgress {
                        reveal_id: reveal.id.clone(),
                        conversation_id: reveal.conversation_id.clone(),
                        stage: reveal.stage,
                        status: reveal.status,
                        stage_deadline: reveal.stage_deadline,
                        at: now,
                    });
                }
            }
            Ok(events)
        })
        .await
    }

    /// Record a participant's readiness during `MutualReadiness`.
    ///
    /// An explicit `false` pauses the reveal; restarting requires a fresh
    /// `request_reveal` with a fresh admission check. Two concurrent calls
    /// serialize on the record lock and the second performs the joint
    /// check.
    pub async fn submit_readiness(
        &self,
        reveal_id: &str,
        user_id: &str,
        ready: bool,
    ) -> Result<Reveal, RevealError> {
        let countdown_timeout = self.stage_duration(RevealStage::Countdown);
        self.mutate(reveal_id, |reveal| {
            if !reveal.is_participant(user_id) {
                return Err(RevealError::NotParticipant);
            }
            if reveal.status.is_terminal() || reveal.stage != RevealStage::MutualReadiness {
                return Err(RevealError::InvalidStageTransition {
                    stage: reveal.stage,
                    action: "submit_readiness",
                });
            }

            reveal.set_readiness(user_id, ready);
            let now = Utc::now();
            if !ready {
                reveal.status = RevealStatus::Paused;
                Ok(vec![Event::StageProgress {
                    reveal_id: reveal.id.clone(),
                    conversation_id: reveal.conversation_id.clone(),
                    stage: reveal.stage,
                    status: reveal.status,
                    stage_deadline: reveal.stage_deadline,
                    at: now,
                }])
            } else if reveal.both_ready() {
                reveal.enter_stage(RevealStage::Countdown, countdown_timeout);
                Ok(vec![Event::CountdownStarted {
                    reveal_id: reveal.id.clone(),
                    conversation_id: reveal.conversation_id.clone(),
                    stage: reveal.stage,
                    stage_deadline: reveal.stage_deadline,
                    at: now,
                }])
            } else {
                Ok(Vec::new())
            }
        })
        .await
    }

    /// Manually advance past the countdown instead of waiting it out.
    pub async fn continue_countdown(
        &self,
        reveal_id: &str,
        user_id: &str,
    ) -> Result<Reveal, RevealError> {
        self.mutate(reveal_id, |reveal| {
            if !reveal.is_participant(user_id) {
                return Err(RevealError::NotParticipant);
            }
            if reveal.status.is_terminal() || reveal.stage != RevealStage::Countdown {
                return Err(RevealError::InvalidStageTransition {
                    stage: reveal.stage,
                    action: "continue",
                });
            }
            Ok(self.fire_reveal(reveal))
        })
        .await
    }

    /// Stop the reveal during the countdown.
    pub async fn abort(&self, reveal_id: &str, user_id: &str) -> Result<Reveal, RevealError> {
        self.mutate(reveal_id, |reveal| {
            if !reveal.is_participant(user_id) {
                return Err(RevealError::NotParticipant);
            }
            if reveal.status.is_terminal() || reveal.stage != RevealStage::Countdown {
                return Err(RevealError::InvalidStageTransition {
                    stage: reveal.stage,
                    action: "abort",
                });
            }
            reveal.status = RevealStatus::Aborted;
            Ok(vec![Event::RevealAborted {
                reveal_id: reveal.id.clone(),
                conversation_id: reveal.conversation_id.clone(),
                status: reveal.status,
                aborted_by: user_id.to_string(),
                at: Utc::now(),
            }])
        })
        .await
    }

    /// Read-only snapshot, valid in every stage and status.
    pub fn get_status(&self, reveal_id: &str, user_id: &str) -> Result<RevealSummary, RevealError> {
        let reveal = self
            .store
            .load(reveal_id)?
            .ok_or_else(|| RevealError::NotFound {
                reveal_id: reveal_id.to_string(),
            })?;
        if !reveal.is_participant(user_id) {
            return Err(RevealError::NotParticipant);
        }
        let guidance = reveal.status.is_terminal().then(|| {
            guidance::for_terminal(
                reveal.status,
                reveal.stage,
                reveal.readiness_score_at_admission,
            )
        });
        Ok(RevealSummary { reveal, guidance })
    }

    /// Stage deadline handler, invoked by `StageTimers`.
    ///
    /// A countdown expiry is implicit confirmation and advances to the
    /// reveal; any other pending stage times out. Firings for a stage the
    /// record has already left are no-ops.
    pub async fn on_stage_timeout(
        &self,
        reveal_id: &str,
        stage: RevealStage,
    ) -> Result<Option<Reveal>, RevealError> {
        let lock = self.record_lock(reveal_id);
        let _guard = lock.lock().await;

        let Some(mut reveal) = self.store.load(reveal_id)? else {
            debug!(reveal_id, ?stage, "timer fired for unknown reveal");
            self.locks.remove(reveal_id);
            return Ok(None);
        };
        if reveal.status.is_terminal() {
            // Settled reveals reach this through the integration window
            // expiry; tracking ends here.
            debug!(reveal_id, ?stage, status = ?reveal.status, "timer fired on settled reveal");
            self.end_tracking(reveal_id);
            return Ok(None);
        }
        if reveal.stage != stage {
            debug!(reveal_id, fired = ?stage, current = ?reveal.stage, "stale stage timer ignored");
            return Ok(None);
        }

        let events = if stage == RevealStage::Countdown {
            self.fire_reveal(&mut reveal)
        } else {
            reveal.status = RevealStatus::Timeout;
            vec![Event::RevealTimeout {
                reveal_id: reveal.id.clone(),
                conversation_id: reveal.conversation_id.clone(),
                stage: reveal.stage,
                status: reveal.status,
                at: Utc::now(),
            }]
        };
        self.store.persist(&reveal)?;
        self.settle_timers(&reveal, stage);
        self.dispatch(events);
        Ok(Some(reveal))
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Run one serialized mutation against a record.
    ///
    /// Events returned by `op` are delivered only after the lock is
    /// released. Timer bookkeeping follows the observed transition: a
    /// stage change reschedules, completion opens the integration window,
    /// any other terminal status ends tracking.
    async fn mutate<F>(&self, reveal_id: &str, op: F) -> Result<Reveal, RevealError>
    where
        F: FnOnce(&mut Reveal) -> Result<Vec<Event>, RevealError>,
    {
        let lock = self.record_lock(reveal_id);
        let guard = lock.lock().await;

        let Some(mut reveal) = self.store.load(reveal_id)? else {
            self.locks.remove(reveal_id);
            return Err(RevealError::NotFound {
                reveal_id: reveal_id.to_string(),
            });
        };
        let prior_stage = reveal.stage;
        let events = op(&mut reveal)?;
        self.store.persist(&reveal)?;
        self.settle_timers(&reveal, prior_stage);

        drop(guard);
        self.dispatch(events);
        Ok(reveal)
    }

    /// Cancel and reschedule timers after a persisted transition.
    fn settle_timers(&self, reveal: &Reveal, prior_stage: RevealStage) {
        match reveal.status {
            RevealStatus::Pending => {
                if reveal.stage != prior_stage {
                    self.timers.cancel(&reveal.id, prior_stage);
                    self.schedule_stage_timer(&reveal.id, reveal.stage);
                }
            }
            RevealStatus::Completed => {
                // Post-completion grace window; expiry only ends tracking.
                self.timers.cancel(&reveal.id, prior_stage);
                self.schedule_stage_timer(&reveal.id, RevealStage::Integration);
            }
            _ => self.end_tracking(&reveal.id),
        }
    }

    /// The countdown resolved: show photos, complete, open integration.
    fn fire_reveal(&self, reveal: &mut Reveal) -> Vec<Event> {
        let now = Utc::now();
        reveal.enter_stage(RevealStage::Reveal, Duration::zero());
        reveal.status = RevealStatus::Completed;
        reveal.revealed_at = Some(now);
        reveal.completed_at = Some(now);
        let photos = Event::PhotosRevealed {
            reveal_id: reveal.id.clone(),
            conversation_id: reveal.conversation_id.clone(),
            stage: reveal.stage,
            revealed_at: now,
            at: now,
        };
        reveal.enter_stage(
            RevealStage::Integration,
            self.stage_duration(RevealStage::Integration),
        );
        let completed = Event::RevealCompleted {
            reveal_id: reveal.id.clone(),
            conversation_id: reveal.conversation_id.clone(),
            status: reveal.status,
            at: now,
        };
        vec![photos, completed]
    }

    fn record_lock(&self, reveal_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(reveal_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn stage_duration(&self, stage: RevealStage) -> Duration {
        Duration::seconds(self.config.stages.timeout_secs(stage) as i64)
    }

    fn schedule_stage_timer(&self, reveal_id: &str, stage: RevealStage) {
        let delay = std::time::Duration::from_secs(self.config.stages.timeout_secs(stage));
        let weak = self.weak.clone();
        let id = reveal_id.to_string();
        self.timers.schedule(reveal_id, stage, delay, async move {
            if let Some(coordinator) = weak.upgrade() {
                if let Err(err) = coordinator.on_stage_timeout(&id, stage).await {
                    warn!(reveal_id = %id, ?stage, %err, "stage timeout handling failed");
                }
            }
        });
    }

    /// Drop all per-reveal runtime state. The record itself is kept.
    fn end_tracking(&self, reveal_id: &str) {
        self.timers.cancel_all(reveal_id);
        self.locks.remove(reveal_id);
    }

    fn dispatch(&self, events: Vec<Event>) {
        for event in &events {
            self.sink.deliver(event);
        }
    }
}
