use super::AlarmScheduler;
use crate::services::alarm_sync::NowProvider;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Longest single nap before the wall clock is read again.
pub const MAX_SLEEP: Duration = Duration::from_secs(30);

/// Wall-clock alarms backed by tokio timers.
///
/// Each armed id owns one task that naps in steps of at most [`MAX_SLEEP`] and
/// re-reads the wall clock after each step, so time spent suspended and clock
/// adjustments count towards the deadline. When it is due, the id is sent on
/// the channel returned by [`TimerAlarmScheduler::new`]. Must be used from
/// within a tokio runtime.
pub struct TimerAlarmScheduler {
    timers: Mutex<HashMap<i64, JoinHandle<()>>>,
    fired: UnboundedSender<i64>,
    now_provider: NowProvider,
    max_sleep: Duration,
}

impl TimerAlarmScheduler {
    pub fn new() -> (Self, UnboundedReceiver<i64>) {
        let (fired, receiver) = mpsc::unbounded_channel();
        let scheduler = Self {
            timers: Mutex::new(HashMap::new()),
            fired,
            now_provider: Arc::new(Utc::now),
            max_sleep: MAX_SLEEP,
        };
        (scheduler, receiver)
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn with_max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep;
        self
    }

    /// Number of alarms still waiting to fire.
    pub fn pending(&self) -> usize {
        let timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        timers.values().filter(|handle| !handle.is_finished()).count()
    }
}

impl AlarmScheduler for TimerAlarmScheduler {
    fn schedule(&self, alarm_id: i64, at: DateTime<Utc>) {
        let fired = self.fired.clone();
        let now_provider = self.now_provider.clone();
        let max_sleep = self.max_sleep;

        let handle = tokio::spawn(async move {
            loop {
                let remaining = (at - now_provider()).to_std().unwrap_or_default();
                if remaining.is_zero() {
                    break;
                }
                tokio::time::sleep(remaining.min(max_sleep)).await;
            }
            if fired.send(alarm_id).is_err() {
                log::warn!("Alarm {} fired after dispatch stopped", alarm_id);
            }
        });

        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        timers.retain(|_, handle| !handle.is_finished());
        if let Some(previous) = timers.insert(alarm_id, handle) {
            previous.abort();
        }
    }

    fn cancel(&self, alarm_id: i64) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = timers.remove(&alarm_id) {
            handle.abort();
        }
    }
}
