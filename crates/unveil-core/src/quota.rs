//! Daily reveal allowance gate.
//!
//! Tier caps are configuration; usage comes from an injected collaborator.
//! Reservations are tracked in-process per (user, UTC day) so concurrent
//! requests from the same user serialize on one counter, and a reservation
//! can be released if record creation fails after it was taken.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{CoreError, RevealError};

/// Subscription tier, used only to look up the daily cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Plus,
    Unlimited,
}

/// Daily reveal caps per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCaps {
    pub free: u32,
    pub plus: u32,
    pub unlimited: u32,
}

impl TierCaps {
    pub fn cap(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Free => self.free,
            Tier::Plus => self.plus,
            Tier::Unlimited => self.unlimited,
        }
    }
}

impl Default for TierCaps {
    fn default() -> Self {
        Self {
            free: 1,
            plus: 5,
            unlimited: 15,
        }
    }
}

/// Usage lookup collaborator.
///
/// Counts reveals the user has successfully requested today; in-flight
/// reservations are the gate's own concern.
pub trait UsageSource: Send + Sync {
    fn used_today(&self, user_id: &str) -> Result<u32, CoreError>;
}

/// A granted slot in today's allowance.
///
/// Hold it until the reveal record is durably persisted, then `commit`;
/// if creation fails afterwards (uniqueness conflict), `release` instead.
/// Both hand the slot back to the in-flight counter; the difference is
/// whether the persisted record now accounts for the usage.
#[derive(Debug)]
pub struct QuotaGrant {
    key: String,
    /// Slots left for the user today after this grant.
    pub remaining_today: u32,
}

/// Per-user daily reveal gate.
pub struct QuotaGate {
    caps: TierCaps,
    usage: Arc<dyn UsageSource>,
    in_flight: DashMap<String, u32>,
}

impl QuotaGate {
    pub fn new(caps: TierCaps, usage: Arc<dyn UsageSource>) -> Self {
        Self {
            caps,
            usage,
            in_flight: DashMap::new(),
        }
    }

    fn day_key(user_id: &str) -> String {
        format!("{}:{}", user_id, Utc::now().date_naive())
    }

    /// Check the user's allowance and reserve one slot.
    ///
    /// The usage read happens while the reservation entry is held, so two
    /// simultaneous requests from one user cannot both observe the last
    /// free slot.
    pub fn check_and_reserve(&self, user_id: &str, tier: Tier) -> Result<QuotaGrant, RevealError> {
        let limit = self.caps.cap(tier);
        let key = Self::day_key(user_id);

        let mut entry = self.in_flight.entry(key.clone()).or_insert(0);
        let used = self.usage.used_today(user_id)?;
        let taken = used.saturating_add(*entry);
        if taken >= limit {
            return Err(RevealError::QuotaExceeded { used: taken, limit });
        }
        *entry += 1;
        let remaining_today = limit - taken - 1;
        drop(entry);

        Ok(QuotaGrant {
            key,
            remaining_today,
        })
    }

    /// Hand a slot back after the reveal record was persisted.
    pub fn commit(&self, grant: QuotaGrant) {
        self.settle(&grant.key);
    }

    /// Compensate a reservation whose reveal was never created.
    pub fn release(&self, grant: QuotaGrant) {
        self.settle(&grant.key);
    }

    fn settle(&self, key: &str) {
        if let Some(mut entry) = self.in_flight.get_mut(key) {
            *entry = entry.saturating_sub(1);
        }
        self.in_flight.remove_if(key, |_, count| *count == 0);
    }
}
