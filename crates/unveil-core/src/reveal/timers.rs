//! Stage deadline timers.
//!
//! One cancellable task per (reveal, stage) pair. Every stage transition
//! cancels the previous stage's timer before scheduling the next one; the
//! coordinator's stage re-check is the second line of defense against a
//! firing that loses the race.

use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

use super::RevealStage;

type TimerKey = (String, RevealStage);

/// Registry of pending stage deadlines.
#[derive(Debug, Default)]
pub struct StageTimers {
    tasks: DashMap<TimerKey, JoinHandle<()>>,
}

impl StageTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `fire` to run after `delay`.
    ///
    /// Replaces (and aborts) any timer already scheduled for the same
    /// reveal-stage pair. Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, reveal_id: &str, stage: RevealStage, delay: Duration, fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire.await;
        });
        if let Some(stale) = self
            .tasks
            .insert((reveal_id.to_string(), stage), handle)
        {
            stale.abort();
        }
    }

    /// Cancel the timer for one reveal-stage pair, if scheduled.
    pub fn cancel(&self, reveal_id: &str, stage: RevealStage) {
        if let Some((_, handle)) = self.tasks.remove(&(reveal_id.to_string(), stage)) {
            handle.abort();
        }
    }

    /// Cancel every timer belonging to a reveal.
    pub fn cancel_all(&self, reveal_id: &str) {
        self.tasks.retain(|(id, _), handle| {
            if id == reveal_id {
                handle.abort();
                false
            } else {
                true
            }
        });
    }

    /// Number of currently tracked timers (finished tasks included until
    /// their key is cancelled or replaced).
    pub fn tracked(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn scheduled_timer_fires() {
        let timers = StageTimers::new();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        timers.schedule("r-1", RevealStage::Preparation, Duration::from_millis(5), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let timers = StageTimers::new();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        timers.schedule("r-1", RevealStage::Countdown, Duration::from_millis(20), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        timers.cancel("r-1", RevealStage::Countdown);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(timers.tracked(), 0);
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_stale_timer() {
        let timers = StageTimers::new();
        let fired = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let counter = fired.clone();
            timers.schedule("r-1", RevealStage::Intention, Duration::from_millis(5), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_all_is_scoped_to_one_reveal() {
        let timers = StageTimers::new();
        let fired = Arc::new(AtomicU32::new(0));
        for id in ["r-1", "r-2"] {
            let counter = fired.clone();
            timers.schedule(id, RevealStage::Preparation, Duration::from_millis(20), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        timers.cancel_all("r-1");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
