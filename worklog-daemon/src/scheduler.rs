//! Interval timer that triggers sync runs.
//!
//! The scheduler owns at most one timer task. [`Scheduler::reconcile`] always
//! cancels it first, then arms a fresh one only for a schedulable config, so
//! two timers can never be live at once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use worklog_core::SyncConfig;
use worklog_sync::StatusTracker;

/// Called on every tick with the config the timer was armed with.
pub type TickFn = Arc<dyn Fn(&SyncConfig) + Send + Sync>;

pub struct Scheduler {
    status: Arc<StatusTracker>,
    on_tick: TickFn,
    timer: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(status: Arc<StatusTracker>, on_tick: TickFn) -> Self {
        Self {
            status,
            on_tick,
            timer: None,
        }
    }

    /// Re-derive the timer from `config`. Must be called inside a tokio
    /// runtime.
    ///
    /// Returns the new `nextSyncAt`, or `None` when nothing was armed.
    pub fn reconcile(&mut self, config: &SyncConfig) -> Option<DateTime<Utc>> {
        self.cancel();
        if !config.is_schedulable() {
            tracing::info!(enabled = config.enabled, "schedule disarmed");
            return None;
        }

        let period = config.interval();
        let next = next_after(period);
        self.status.set_next_sync_at(next);

        let status = self.status.clone();
        let on_tick = self.on_tick.clone();
        let armed = config.clone();
        self.timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                status.set_next_sync_at(next_after(period));
                tracing::debug!("scheduled sync tick");
                on_tick(&armed);
            }
        }));

        tracing::info!(
            interval_minutes = config.interval_minutes,
            next_sync_at = ?next,
            "schedule armed",
        );
        next
    }

    /// Drop the pending timer. An in-flight run is not affected.
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.status.set_next_sync_at(None);
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

fn next_after(period: Duration) -> Option<DateTime<Utc>> {
    let period = chrono::Duration::from_std(period).ok()?;
    Utc::now().checked_add_signed(period)
}
