//! Integration tests for the reveal protocol.
//!
//! These drive the public coordinator API over the SQLite store, end to
//! end: the full happy path, every termination path, and the timer
//! behavior with real (zero-length) stage deadlines.

use std::sync::Arc;
use std::time::Duration;

use unveil_core::error::CoreError;
use unveil_core::{
    ConversationFeatures, Event, FeatureSource, MemorySink, RevealCoordinator, RevealError,
    RevealRequest, RevealResponse, RevealStage, RevealStatus, SqliteRevealStore, Tier,
    UsageSource,
};
use unveil_core::storage::RevealConfig;

struct StubFeatures(ConversationFeatures);

impl FeatureSource for StubFeatures {
    fn conversation_features(
        &self,
        _conversation_id: &str,
    ) -> Result<ConversationFeatures, CoreError> {
        Ok(self.0.clone())
    }
}

struct NoUsage;

impl UsageSource for NoUsage {
    fn used_today(&self, _user_id: &str) -> Result<u32, CoreError> {
        Ok(0)
    }
}

fn strong_features() -> ConversationFeatures {
    ConversationFeatures {
        message_count: 50,
        depth_ratio: 0.9,
        vulnerability_ratio: 0.8,
        mutual_vulnerability: true,
        consistency_score: 0.8,
        future_talk_ratio: 0.6,
        question_ratio: 0.5,
        response_time_consistency: 0.7,
        prior_emotional_connection_score: 0.7,
        secondary_score: Some(0.9),
    }
}

fn build(config: RevealConfig) -> (Arc<RevealCoordinator>, Arc<MemorySink>) {
    let store = Arc::new(SqliteRevealStore::open_memory().unwrap());
    let sink = Arc::new(MemorySink::new());
    let coordinator = RevealCoordinator::new(
        config,
        store,
        Arc::new(StubFeatures(strong_features())),
        Arc::new(NoUsage),
        sink.clone(),
    );
    (coordinator, sink)
}

fn request_for(conversation: &str) -> RevealRequest {
    RevealRequest {
        conversation_id: conversation.into(),
        requester_id: "amelie".into(),
        target_id: "juno".into(),
        tier: Tier::Plus,
        message: None,
    }
}

#[tokio::test]
async fn full_protocol_round_trip_over_sqlite() {
    let (coordinator, sink) = build(RevealConfig::default());

    let reveal = coordinator
        .request_reveal(request_for("conv-1"))
        .await
        .unwrap();
    assert_eq!(reveal.stage, RevealStage::Preparation);

    coordinator
        .respond_to_reveal(&reveal.id, "juno", RevealResponse::Accept, None)
        .await
        .unwrap();
    coordinator
        .submit_intention(&reveal.id, "amelie", "to be seen honestly")
        .await
        .unwrap();
    let in_readiness = coordinator
        .submit_intention(&reveal.id, "juno", "curiosity without pressure")
        .await
        .unwrap();
    assert_eq!(in_readiness.stage, RevealStage::MutualReadiness);

    coordinator
        .submit_readiness(&reveal.id, "amelie", true)
        .await
        .unwrap();
    let counting = coordinator
        .submit_readiness(&reveal.id, "juno", true)
        .await
        .unwrap();
    assert_eq!(counting.stage, RevealStage::Countdown);

    let done = coordinator
        .continue_countdown(&reveal.id, "juno")
        .await
        .unwrap();
    assert_eq!(done.status, RevealStatus::Completed);
    assert_eq!(done.stage, RevealStage::Integration);
    assert!(done.revealed_at.is_some());

    let names = sink.event_names();
    assert!(names.contains(&"photos_revealed".to_string()));
    assert!(names.contains(&"reveal_completed".to_string()));

    let summary = coordinator.get_status(&reveal.id, "amelie").unwrap();
    assert!(summary.guidance.is_some());
}

#[tokio::test]
async fn countdown_timer_fires_and_completes_the_reveal() {
    let mut config = RevealConfig::default();
    config.stages.countdown_timeout_secs = 0;
    let (coordinator, sink) = build(config);

    let reveal = coordinator
        .request_reveal(request_for("conv-1"))
        .await
        .unwrap();
    coordinator
        .respond_to_reveal(&reveal.id, "juno", RevealResponse::Accept, None)
        .await
        .unwrap();
    coordinator
        .submit_intention(&reveal.id, "amelie", "a")
        .await
        .unwrap();
    coordinator
        .submit_intention(&reveal.id, "juno", "b")
        .await
        .unwrap();
    coordinator
        .submit_readiness(&reveal.id, "amelie", true)
        .await
        .unwrap();
    coordinator
        .submit_readiness(&reveal.id, "juno", true)
        .await
        .unwrap();

    // The zero-length countdown fires immediately; give the task a beat.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let summary = coordinator.get_status(&reveal.id, "amelie").unwrap();
    assert_eq!(summary.reveal.status, RevealStatus::Completed);
    assert!(summary.reveal.revealed_at.is_some());
    assert!(sink
        .event_names()
        .contains(&"photos_revealed".to_string()));
}

#[tokio::test]
async fn unanswered_request_times_out() {
    let mut config = RevealConfig::default();
    config.stages.preparation_timeout_secs = 0;
    let (coordinator, sink) = build(config);

    let reveal = coordinator
        .request_reveal(request_for("conv-1"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let summary = coordinator.get_status(&reveal.id, "juno").unwrap();
    assert_eq!(summary.reveal.status, RevealStatus::Timeout);
    assert!(sink.event_names().contains(&"reveal_timeout".to_string()));

    // A timed-out conversation is free for a new request.
    assert!(coordinator.request_reveal(request_for("conv-1")).await.is_ok());
}

#[tokio::test]
async fn accepting_before_the_deadline_defuses_the_preparation_timer() {
    let mut config = RevealConfig::default();
    config.stages.preparation_timeout_secs = 1;
    let (coordinator, _sink) = build(config);

    let reveal = coordinator
        .request_reveal(request_for("conv-1"))
        .await
        .unwrap();
    coordinator
        .respond_to_reveal(&reveal.id, "juno", RevealResponse::Accept, None)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1200)).await;

    let summary = coordinator.get_status(&reveal.id, "juno").unwrap();
    assert_eq!(summary.reveal.status, RevealStatus::Pending);
    assert_eq!(summary.reveal.stage, RevealStage::Intention);
}

#[tokio::test]
async fn simultaneous_readiness_submissions_both_land() {
    let (coordinator, _sink) = build(RevealConfig::default());

    let reveal = coordinator
        .request_reveal(request_for("conv-1"))
        .await
        .unwrap();
    coordinator
        .respond_to_reveal(&reveal.id, "juno", RevealResponse::Accept, None)
        .await
        .unwrap();
    coordinator
        .submit_intention(&reveal.id, "amelie", "a")
        .await
        .unwrap();
    coordinator
        .submit_intention(&reveal.id, "juno", "b")
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        coordinator.submit_readiness(&reveal.id, "amelie", true),
        coordinator.submit_readiness(&reveal.id, "juno", true),
    );
    first.unwrap();
    second.unwrap();

    let summary = coordinator.get_status(&reveal.id, "amelie").unwrap();
    assert_eq!(summary.reveal.stage, RevealStage::Countdown);
}

#[tokio::test]
async fn independent_conversations_progress_independently() {
    let (coordinator, _sink) = build(RevealConfig::default());

    let first = coordinator
        .request_reveal(request_for("conv-1"))
        .await
        .unwrap();
    let second = coordinator
        .request_reveal(request_for("conv-2"))
        .await
        .unwrap();

    coordinator
        .respond_to_reveal(&first.id, "juno", RevealResponse::Decline, None)
        .await
        .unwrap();

    let untouched = coordinator.get_status(&second.id, "amelie").unwrap();
    assert_eq!(untouched.reveal.status, RevealStatus::Pending);
    assert_eq!(untouched.reveal.stage, RevealStage::Preparation);
}

#[tokio::test]
async fn duplicate_request_is_rejected_while_pending() {
    let (coordinator, _sink) = build(RevealConfig::default());

    coordinator
        .request_reveal(request_for("conv-1"))
        .await
        .unwrap();
    let second = coordinator.request_reveal(request_for("conv-1")).await;
    assert!(matches!(
        second,
        Err(RevealError::AlreadyInProgress { .. })
    ));
}

#[tokio::test]
async fn declined_reveal_emits_guidance_in_events_and_status() {
    let (coordinator, sink) = build(RevealConfig::default());

    let reveal = coordinator
        .request_reveal(request_for("conv-1"))
        .await
        .unwrap();
    coordinator
        .respond_to_reveal(
            &reveal.id,
            "juno",
            RevealResponse::Decline,
            Some("not yet".into()),
        )
        .await
        .unwrap();

    let declined = sink.events().into_iter().find_map(|e| match e {
        Event::RevealDeclined { message, .. } => Some(message),
        _ => None,
    });
    assert_eq!(declined, Some(Some("not yet".into())));

    let summary = coordinator.get_status(&reveal.id, "amelie").unwrap();
    let guidance = summary.guidance.unwrap();
    assert!(!guidance.headline.is_empty());
    assert!(!guidance.suggestions.is_empty());
}
