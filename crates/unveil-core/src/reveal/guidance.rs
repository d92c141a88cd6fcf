//! Guidance payloads for reveal outcomes.
//!
//! Every terminal status produces a short human-readable payload built from
//! stage and score context. The not-ready path additionally turns the
//! conversation feature snapshot into concrete connection-gap hints. All of
//! it is informational; none of it blocks further app use.

use serde::{Deserialize, Serialize};

use crate::features::ConversationFeatures;
use crate::reveal::{RevealStage, RevealStatus};

/// Human-readable outcome guidance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guidance {
    pub headline: String,
    pub suggestions: Vec<String>,
}

/// Gap thresholds for the not-ready hint rules.
const LOW_DEPTH: f64 = 0.4;
const LOW_VULNERABILITY: f64 = 0.3;
const LOW_CONSISTENCY: f64 = 0.5;
const LOW_FUTURE_TALK: f64 = 0.2;

/// Build the payload for a terminal status.
pub fn for_terminal(status: RevealStatus, stage: RevealStage, score: f64) -> Guidance {
    match status {
        RevealStatus::Completed => Guidance {
            headline: "Photos revealed. Take a moment together before moving on.".into(),
            suggestions: vec![
                "Share what the reveal meant to you".into(),
                "Keep the conversation at the same depth that got you here".into(),
            ],
        },
        RevealStatus::Declined => Guidance {
            headline: "They chose not to exchange photos right now.".into(),
            suggestions: vec![
                "A decline is about timing, not about you".into(),
                "Continue building connection at your shared pace".into(),
            ],
        },
        RevealStatus::NotReady => Guidance {
            headline: "They asked for more time before a reveal.".into(),
            suggestions: vec!["Keep the conversation going and ask again later".into()],
        },
        RevealStatus::Paused => Guidance {
            headline: "The reveal was paused before the countdown.".into(),
            suggestions: vec![
                "Either of you can start fresh with a new request when it feels right".into(),
            ],
        },
        RevealStatus::Aborted => Guidance {
            headline: "The countdown was stopped before any photos were shown.".into(),
            suggestions: vec![
                "Nothing was shared".into(),
                "Talk about what felt rushed before trying again".into(),
            ],
        },
        RevealStatus::Timeout => Guidance {
            headline: timeout_headline(stage).into(),
            suggestions: vec![
                "A new request starts the process over whenever you're both ready".into(),
            ],
        },
        RevealStatus::Pending => Guidance {
            headline: format!(
                "Reveal in progress. Connection score at admission was {:.0}%.",
                score * 100.0
            ),
            suggestions: Vec::new(),
        },
    }
}

fn timeout_headline(stage: RevealStage) -> &'static str {
    match stage {
        RevealStage::Preparation => "The request expired without a response.",
        RevealStage::Intention => "Intentions weren't completed in time.",
        RevealStage::MutualReadiness => "Readiness wasn't confirmed in time.",
        _ => "The reveal timed out.",
    }
}

/// Connection-gap hints for a not-ready response.
///
/// A small rule set over the feature snapshot; at most three hints, the
/// most fundamental gaps first.
pub fn connection_gaps(features: &ConversationFeatures) -> Vec<String> {
    let mut hints = Vec::new();

    if features.depth_ratio < LOW_DEPTH {
        hints.push("Try moving past small talk into what actually matters to each of you".to_string());
    }
    if features.vulnerability_ratio < LOW_VULNERABILITY {
        hints.push("Sharing something personal first often invites the same in return".to_string());
    }
    if !features.mutual_vulnerability {
        hints.push("Openness has mostly flowed one way so far; give it room to become mutual".to_string());
    }
    if features.consistency_score < LOW_CONSISTENCY {
        hints.push("More regular check-ins build the trust a reveal needs".to_string());
    }
    if features.future_talk_ratio < LOW_FUTURE_TALK {
        hints.push("Talking about things you'd like to do together signals investment".to_string());
    }

    hints.truncate(3);
    if hints.is_empty() {
        hints.push("You're close; a little more time is all this needs".to_string());
    }
    hints
}

/// Merge gap hints into a not-ready payload.
pub fn for_not_ready(features: &ConversationFeatures) -> Guidance {
    Guidance {
        headline: "They asked for more time before a reveal.".into(),
        suggestions: connection_gaps(features),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_terminal_status_has_guidance() {
        for status in [
            RevealStatus::Completed,
            RevealStatus::Declined,
            RevealStatus::NotReady,
            RevealStatus::Paused,
            RevealStatus::Aborted,
            RevealStatus::Timeout,
        ] {
            let guidance = for_terminal(status, RevealStage::Preparation, 0.8);
            assert!(!guidance.headline.is_empty());
            assert!(!guidance.suggestions.is_empty());
        }
    }

    #[test]
    fn timeout_headline_names_the_stalled_stage() {
        let guidance = for_terminal(RevealStatus::Timeout, RevealStage::Intention, 0.75);
        assert!(guidance.headline.contains("Intentions"));
    }

    #[test]
    fn gap_hints_follow_the_weak_signals() {
        let features = ConversationFeatures {
            message_count: 40,
            depth_ratio: 0.2,
            vulnerability_ratio: 0.1,
            mutual_vulnerability: false,
            consistency_score: 0.9,
            future_talk_ratio: 0.5,
            question_ratio: 0.5,
            response_time_consistency: 0.8,
            prior_emotional_connection_score: 0.4,
            secondary_score: None,
        };
        let hints = connection_gaps(&features);
        assert_eq!(hints.len(), 3);
        assert!(hints[0].contains("small talk"));
    }

    #[test]
    fn strong_conversations_get_an_encouraging_hint() {
        let features = ConversationFeatures {
            message_count: 40,
            depth_ratio: 0.9,
            vulnerability_ratio: 0.8,
            mutual_vulnerability: true,
            consistency_score: 0.9,
            future_talk_ratio: 0.6,
            question_ratio: 0.5,
            response_time_consistency: 0.8,
            prior_emotional_connection_score: 0.7,
            secondary_score: None,
        };
        let hints = connection_gaps(&features);
        assert_eq!(hints.len(), 1);
        assert!(hints[0].contains("close"));
    }
}
