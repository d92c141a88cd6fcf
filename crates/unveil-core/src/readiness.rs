//! Emotional-readiness scoring engine.
//!
//! Admission into the reveal protocol is gated by a single number in
//! [0, 1] computed from a conversation feature snapshot. The computation is
//! a weighted sum over normalized signals, optionally blended with a
//! secondary assessment, then dampened by message-volume confidence.
//!
//! The scorer is deterministic and performs no I/O. It runs exactly once,
//! at request time; the resulting score is frozen on the record and never
//! re-evaluated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::ConversationFeatures;

/// Individual signal term with weight and score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalTerm {
    /// Signal name
    pub name: String,
    /// Weight for this signal (0.0 to 1.0)
    pub weight: f64,
    /// Raw signal value (0.0 to 1.0)
    pub value: f64,
    /// Weighted contribution to the base score
    pub contribution: f64,
}

impl SignalTerm {
    pub fn new(name: impl Into<String>, weight: f64, value: f64) -> Self {
        let weight = weight.clamp(0.0, 1.0);
        let value = value.clamp(0.0, 1.0);
        Self {
            name: name.into(),
            weight,
            value,
            contribution: weight * value,
        }
    }
}

/// Complete scoring breakdown for explainability.
///
/// `final_score` is what the admission gate compares against the threshold;
/// the terms explain the base sum before blending and dampening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Individual signal terms
    pub terms: Vec<SignalTerm>,
    /// Weighted sum of signal terms
    pub base_score: f64,
    /// Secondary assessment blended in, if one was supplied
    pub secondary_score: Option<f64>,
    /// Message-volume confidence factor applied last
    pub confidence_factor: f64,
    /// Final score in [0, 1]
    pub final_score: f64,
    /// Timestamp when scored
    pub scored_at: DateTime<Utc>,
}

impl ScoreBreakdown {
    /// Get terms sorted by contribution (descending).
    pub fn terms_by_contribution(&self) -> Vec<&SignalTerm> {
        let mut sorted: Vec<_> = self.terms.iter().collect();
        sorted.sort_by(|a, b| b.contribution.partial_cmp(&a.contribution).unwrap());
        sorted
    }

    /// The weakest signals, lowest raw value first. Feeds guidance hints.
    pub fn weakest_terms(&self, count: usize) -> Vec<&SignalTerm> {
        let mut sorted: Vec<_> = self.terms.iter().collect();
        sorted.sort_by(|a, b| a.value.partial_cmp(&b.value).unwrap());
        sorted.truncate(count);
        sorted
    }
}

/// Weights for each conversational signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    pub depth_ratio: f64,
    pub vulnerability_ratio: f64,
    pub mutual_vulnerability: f64,
    pub consistency_score: f64,
    pub future_talk_ratio: f64,
    pub question_ratio: f64,
    pub response_time_consistency: f64,
    pub prior_emotional_connection: f64,
}

impl SignalWeights {
    /// Default weighting, tuned toward depth and disclosure signals.
    pub fn standard() -> Self {
        Self {
            depth_ratio: 0.25,
            vulnerability_ratio: 0.20,
            mutual_vulnerability: 0.15,
            consistency_score: 0.10,
            future_talk_ratio: 0.10,
            question_ratio: 0.05,
            response_time_consistency: 0.05,
            prior_emotional_connection: 0.10,
        }
    }

    fn as_named(&self) -> [(&'static str, f64); 8] {
        [
            ("depth_ratio", self.depth_ratio),
            ("vulnerability_ratio", self.vulnerability_ratio),
            ("mutual_vulnerability", self.mutual_vulnerability),
            ("consistency_score", self.consistency_score),
            ("future_talk_ratio", self.future_talk_ratio),
            ("question_ratio", self.question_ratio),
            ("response_time_consistency", self.response_time_consistency),
            ("prior_emotional_connection", self.prior_emotional_connection),
        ]
    }

    /// Normalize weights to sum to 1.0.
    pub fn normalize(&mut self) {
        let sum: f64 = self.as_named().iter().map(|(_, w)| w).sum();
        if sum > 0.0 {
            self.depth_ratio /= sum;
            self.vulnerability_ratio /= sum;
            self.mutual_vulnerability /= sum;
            self.consistency_score /= sum;
            self.future_talk_ratio /= sum;
            self.question_ratio /= sum;
            self.response_time_consistency /= sum;
            self.prior_emotional_connection /= sum;
        }
    }

    /// Validate that all weights are in [0.0, 1.0].
    pub fn validate(&self) -> Result<(), String> {
        for (name, weight) in self.as_named() {
            if !(0.0..=1.0).contains(&weight) {
                return Err(format!(
                    "Weight '{}' must be in [0.0, 1.0], got {}",
                    name, weight
                ));
            }
        }
        Ok(())
    }
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self::standard()
    }
}

/// Readiness scoring engine.
pub struct ReadinessScorer {
    weights: SignalWeights,
    /// Below this message count the score is defined as 0.0.
    min_messages: u32,
    /// Message count at which volume confidence reaches 1.0.
    confidence_window: u32,
    /// Share of the final score taken from the secondary assessment.
    secondary_blend: f64,
}

impl ReadinessScorer {
    pub const DEFAULT_MIN_MESSAGES: u32 = 10;
    pub const DEFAULT_CONFIDENCE_WINDOW: u32 = 15;
    pub const DEFAULT_SECONDARY_BLEND: f64 = 0.3;

    /// Create a scorer with standard weights and thresholds.
    pub fn new() -> Self {
        Self {
            weights: SignalWeights::standard(),
            min_messages: Self::DEFAULT_MIN_MESSAGES,
            confidence_window: Self::DEFAULT_CONFIDENCE_WINDOW,
            secondary_blend: Self::DEFAULT_SECONDARY_BLEND,
        }
    }

    /// Create with custom weights.
    pub fn with_weights(weights: SignalWeights) -> Self {
        Self {
            weights,
            ..Self::new()
        }
    }

    /// Override the message floor and confidence window.
    pub fn with_volume_thresholds(mut self, min_messages: u32, confidence_window: u32) -> Self {
        self.min_messages = min_messages;
        self.confidence_window = confidence_window.max(1);
        self
    }

    /// Override the secondary blend share.
    pub fn with_secondary_blend(mut self, blend: f64) -> Self {
        self.secondary_blend = blend.clamp(0.0, 1.0);
        self
    }

    pub fn weights(&self) -> &SignalWeights {
        &self.weights
    }

    /// Score a feature snapshot.
    ///
    /// Conversations below the message floor score 0.0 outright; sparse
    /// history cannot justify disclosure.
    pub fn score(&self, features: &ConversationFeatures) -> ScoreBreakdown {
        if features.message_count < self.min_messages {
            return ScoreBreakdown {
                terms: Vec::new(),
                base_score: 0.0,
                secondary_score: None,
                confidence_factor: 0.0,
                final_score: 0.0,
                scored_at: Utc::now(),
            };
        }

        let w = &self.weights;
        let terms = vec![
            SignalTerm::new("depth_ratio", w.depth_ratio, features.depth_ratio),
            SignalTerm::new(
                "vulnerability_ratio",
                w.vulnerability_ratio,
                features.vulnerability_ratio,
            ),
            SignalTerm::new(
                "mutual_vulnerability",
                w.mutual_vulnerability,
                if features.mutual_vulnerability { 1.0 } else { 0.0 },
            ),
            SignalTerm::new(
                "consistency_score",
                w.consistency_score,
                features.consistency_score,
            ),
            SignalTerm::new(
                "future_talk_ratio",
                w.future_talk_ratio,
                features.future_talk_ratio,
            ),
            SignalTerm::new("question_ratio", w.question_ratio, features.question_ratio),
            SignalTerm::new(
                "response_time_consistency",
                w.response_time_consistency,
                features.response_time_consistency,
            ),
            SignalTerm::new(
                "prior_emotional_connection",
                w.prior_emotional_connection,
                features.prior_emotional_connection_score,
            ),
        ];

        let base_score: f64 = terms.iter().map(|t| t.contribution).sum();

        let secondary = features.secondary_score.map(|s| s.clamp(0.0, 1.0));
        let blended = match secondary {
            Some(s) => (1.0 - self.secondary_blend) * base_score + self.secondary_blend * s,
            None => base_score,
        };

        let confidence_factor =
            (f64::from(features.message_count) / f64::from(self.confidence_window)).min(1.0);
        let final_score = (blended * confidence_factor).clamp(0.0, 1.0);

        ScoreBreakdown {
            terms,
            base_score,
            secondary_score: secondary,
            confidence_factor,
            final_score,
            scored_at: Utc::now(),
        }
    }
}

impl Default for ReadinessScorer {
    fn default() -> Self {
        Self::new()
    }
}
