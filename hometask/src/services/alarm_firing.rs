use crate::integrations::{AlarmScheduler, NotificationPresenter};
use crate::models::EventAlarm;
use crate::services::alarm_store::{AlarmStore, StoreError};
use crate::services::alarm_sync::{NowProvider, first_fire_at};
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use log::{debug, error, info};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// What to tell the user when an alarm fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmNotice {
    GetReady {
        device_name: String,
        minutes_until_start: i64,
    },
    StartNow {
        device_name: String,
        ends_at: DateTime<Utc>,
    },
}

impl AlarmNotice {
    /// Before the start it is a get-ready notice, from the start on a
    /// start-now notice.
    pub fn for_alarm(alarm: &EventAlarm, now: DateTime<Utc>) -> Self {
        if now < alarm.start_time {
            let seconds = (alarm.start_time - now).num_seconds();
            AlarmNotice::GetReady {
                device_name: alarm.device_name.clone(),
                minutes_until_start: (seconds + 59) / 60,
            }
        } else {
            AlarmNotice::StartNow {
                device_name: alarm.device_name.clone(),
                ends_at: alarm.end_time(),
            }
        }
    }

    pub fn title(&self) -> &str {
        match self {
            AlarmNotice::GetReady { device_name, .. }
            | AlarmNotice::StartNow { device_name, .. } => device_name.as_str(),
        }
    }

    pub fn body(&self, timezone: Tz) -> String {
        match self {
            AlarmNotice::GetReady {
                minutes_until_start: 1,
                ..
            } => "Starts in 1 minute, get ready".to_string(),
            AlarmNotice::GetReady {
                minutes_until_start,
                ..
            } => format!("Starts in {} minutes, get ready", minutes_until_start),
            AlarmNotice::StartNow { ends_at, .. } => format!(
                "Start now, runs until {}",
                ends_at.with_timezone(&timezone).format("%H:%M")
            ),
        }
    }
}

/// Handles alarms as the scheduler fires them.
pub struct AlarmFiringHandler {
    store: Arc<dyn AlarmStore>,
    scheduler: Arc<dyn AlarmScheduler>,
    presenter: Arc<dyn NotificationPresenter>,
    timezone: Tz,
    now_provider: NowProvider,
}

impl AlarmFiringHandler {
    pub fn new(
        store: Arc<dyn AlarmStore>,
        scheduler: Arc<dyn AlarmScheduler>,
        presenter: Arc<dyn NotificationPresenter>,
    ) -> Self {
        Self {
            store,
            scheduler,
            presenter,
            timezone: Tz::UTC,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Present the notice for `alarm_id`.
    ///
    /// A missing row means the alarm was removed after it was armed; nothing is
    /// shown. A get-ready notice arms the start-now notice for the event start.
    pub fn on_alarm(&self, alarm_id: i64) -> Result<Option<AlarmNotice>, StoreError> {
        let Some(alarm) = self.store.load_by_id(alarm_id)? else {
            debug!("Alarm {} fired but is no longer stored, ignoring", alarm_id);
            return Ok(None);
        };

        let now = (self.now_provider)();
        let notice = AlarmNotice::for_alarm(&alarm, now);
        self.presenter
            .present(notice.title(), &notice.body(self.timezone));

        if let AlarmNotice::GetReady { .. } = notice {
            let at = first_fire_at(now, alarm.start_time, TimeDelta::zero());
            debug!("Arming start notice for alarm {} at {}", alarm.id, at);
            self.scheduler.schedule(alarm.id, at);
        }

        Ok(Some(notice))
    }
}

/// Feed fired alarm ids to the handler until the scheduler goes away.
pub async fn dispatch_alarms(mut fired: UnboundedReceiver<i64>, handler: Arc<AlarmFiringHandler>) {
    while let Some(alarm_id) = fired.recv().await {
        if let Err(e) = handler.on_alarm(alarm_id) {
            error!("Failed to handle alarm {}: {}", alarm_id, e);
        }
    }
    info!("Alarm dispatch stopped");
}
