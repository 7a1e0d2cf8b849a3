use crate::integrations::{AlarmScheduler, SourceError, Sources};
use crate::models::{DeviceTask, EventAlarm};
use crate::services::alarm_store::{AlarmStore, StoreError};
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// How long before an event starts the get-ready notice fires.
pub const DEFAULT_NOTIFY_BEFORE_MINUTES: i64 = 10;

/// A reconciliation pass failed. Every variant is retried on the next pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        true
    }
}

/// Alarms to add and remove so the local table matches the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlarmDiff {
    pub to_insert: Vec<EventAlarm>,
    pub to_delete: Vec<EventAlarm>,
}

impl AlarmDiff {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_delete.is_empty()
    }
}

/// Compare server events against the stored alarms.
pub fn reconcile(device_tasks: &[DeviceTask], local_alarms: &[EventAlarm]) -> AlarmDiff {
    let mut live: HashMap<i64, EventAlarm> = HashMap::new();
    for device_task in device_tasks {
        for task_event in &device_task.task_events {
            if let Some(event) = &task_event.event {
                live.entry(event.id).or_insert_with(|| {
                    EventAlarm::new(&device_task.device, &task_event.task, event)
                });
            }
        }
    }

    let stored: HashSet<i64> = local_alarms.iter().map(|alarm| alarm.id).collect();

    let mut to_insert: Vec<EventAlarm> = live
        .iter()
        .filter(|(id, _)| !stored.contains(id))
        .map(|(_, alarm)| alarm.clone())
        .collect();
    to_insert.sort_by_key(|alarm| alarm.id);

    let to_delete: Vec<EventAlarm> = local_alarms
        .iter()
        .filter(|alarm| !live.contains_key(&alarm.id))
        .cloned()
        .collect();

    AlarmDiff {
        to_insert,
        to_delete,
    }
}

/// When an alarm for an event starting at `start` should first fire.
///
/// `lead` ahead of the start if that is still in the future, otherwise right
/// away.
pub fn first_fire_at(now: DateTime<Utc>, start: DateTime<Utc>, lead: TimeDelta) -> DateTime<Utc> {
    let notify_at = start - lead;
    if now < notify_at { notify_at } else { now }
}

/// Keeps the local alarm table and the scheduler in line with the server.
pub struct AlarmSyncService {
    sources: Sources,
    store: Arc<dyn AlarmStore>,
    scheduler: Arc<dyn AlarmScheduler>,
    notify_before: TimeDelta,
    now_provider: NowProvider,
}

impl AlarmSyncService {
    pub fn new(
        sources: Sources,
        store: Arc<dyn AlarmStore>,
        scheduler: Arc<dyn AlarmScheduler>,
    ) -> Self {
        Self {
            sources,
            store,
            scheduler,
            notify_before: TimeDelta::minutes(DEFAULT_NOTIFY_BEFORE_MINUTES),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_notify_before(mut self, notify_before: TimeDelta) -> Self {
        self.notify_before = notify_before;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Run one reconciliation pass.
    ///
    /// Nothing is written before all server state has been fetched. Store
    /// changes are committed in one step, then alarms are armed and cancelled.
    pub async fn run_pass(&self) -> Result<AlarmDiff, SyncError> {
        let device_tasks = self.sources.fetch_device_tasks().await?;
        let local_alarms = self.store.get_all()?;

        let diff = reconcile(&device_tasks, &local_alarms);
        if diff.is_empty() {
            debug!("Alarms already in sync ({} stored)", local_alarms.len());
            return Ok(diff);
        }

        self.store.apply(&diff)?;

        let now = (self.now_provider)();
        for alarm in &diff.to_insert {
            let at = first_fire_at(now, alarm.start_time, self.notify_before);
            debug!(
                "Arming alarm {} for {} at {}",
                alarm.id, alarm.device_name, at
            );
            self.scheduler.schedule(alarm.id, at);
        }
        for alarm in &diff.to_delete {
            debug!("Cancelling alarm {} for {}", alarm.id, alarm.device_name);
            self.scheduler.cancel(alarm.id);
        }

        info!(
            "Alarm sync: {} added, {} removed",
            diff.to_insert.len(),
            diff.to_delete.len()
        );

        Ok(diff)
    }

    /// Register stored alarms with the scheduler again.
    ///
    /// Timer registrations live in memory, so this runs once at start-up.
    /// Alarms whose run already ended stay in the table until the server drops
    /// the event, but are not armed.
    pub fn rearm_stored(&self) -> Result<usize, StoreError> {
        let alarms = self.store.get_all()?;
        let now = (self.now_provider)();

        let mut armed = 0;
        for alarm in &alarms {
            if alarm.end_time() <= now {
                warn!(
                    "Not re-arming alarm {} for {}: run ended at {}",
                    alarm.id,
                    alarm.device_name,
                    alarm.end_time()
                );
                continue;
            }
            self.scheduler
                .schedule(alarm.id, first_fire_at(now, alarm.start_time, self.notify_before));
            armed += 1;
        }

        info!("Re-armed {} of {} stored alarms", armed, alarms.len());
        Ok(armed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::fakes::{FakeServer, RecordingScheduler, SchedulerCall};
    use crate::models::{Device, Event, Task, TaskEvent, TimeSpan};
    use crate::services::alarm_store::MemoryAlarmStore;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn default_lead() -> TimeDelta {
        TimeDelta::minutes(DEFAULT_NOTIFY_BEFORE_MINUTES)
    }

    fn washer() -> Device {
        Device {
            id: 1,
            name: "Washer".to_string(),
            power_watts: 2000.0,
        }
    }

    fn task(id: i64, device_id: i64, duration_ms: i64) -> Task {
        Task {
            id,
            device_id,
            time_span: TimeSpan {
                start: t0(),
                end: t0() + TimeDelta::hours(3),
            },
            duration_ms,
        }
    }

    fn event(id: i64, task_id: i64, start_time: DateTime<Utc>) -> Event {
        Event {
            id,
            task_id,
            start_time,
        }
    }

    fn alarm(id: i64, name: &str, start_time: DateTime<Utc>, duration_ms: i64) -> EventAlarm {
        EventAlarm {
            id,
            device_name: name.to_string(),
            start_time,
            duration_ms,
        }
    }

    fn device_tasks(events: Vec<Event>) -> Vec<DeviceTask> {
        crate::services::task_join::join(
            vec![washer()],
            vec![task(10, 1, 300_000), task(11, 1, 600_000)],
            events,
        )
    }

    #[test]
    fn test_reconcile_deletes_alarm_for_vanished_event() {
        let local = vec![alarm(5, "Washer", t0(), 300_000)];

        let diff = reconcile(&device_tasks(vec![]), &local);

        assert_eq!(diff.to_delete, local);
        assert!(diff.to_insert.is_empty());
    }

    #[test]
    fn test_reconcile_inserts_new_event() {
        let start = t0() + TimeDelta::hours(1);

        let diff = reconcile(&device_tasks(vec![event(9, 11, start)]), &[]);

        assert_eq!(diff.to_insert, vec![alarm(9, "Washer", start, 600_000)]);
        assert!(diff.to_delete.is_empty());
    }

    #[test]
    fn test_reconcile_ignores_tasks_without_events() {
        let diff = reconcile(&device_tasks(vec![]), &[]);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let server = device_tasks(vec![event(1, 10, t0()), event(2, 11, t0())]);
        let mut local = vec![alarm(7, "Washer", t0(), 1000)];

        let first = reconcile(&server, &local);
        assert_eq!(first.to_insert.len(), 2);
        assert_eq!(first.to_delete.len(), 1);

        local.retain(|a| !first.to_delete.contains(a));
        local.extend(first.to_insert.iter().cloned());

        assert!(reconcile(&server, &local).is_empty());
    }

    #[test]
    fn test_reconcile_keeps_stored_alarm_still_reported() {
        let server = device_tasks(vec![event(3, 10, t0())]);
        let inserted = reconcile(&server, &[]).to_insert;

        assert!(reconcile(&server, &inserted).is_empty());
    }

    #[test]
    fn test_reconcile_ids_are_partitioned() {
        let server = device_tasks(vec![event(1, 10, t0())]);
        let local = vec![alarm(2, "Washer", t0(), 1000)];

        let diff = reconcile(&server, &local);
        let inserted: HashSet<i64> = diff.to_insert.iter().map(|a| a.id).collect();
        assert!(diff.to_delete.iter().all(|a| !inserted.contains(&a.id)));
    }

    #[test]
    fn test_reconcile_uses_owning_device_name() {
        let charger = Device {
            id: 2,
            name: "Charger".to_string(),
            power_watts: 7400.0,
        };
        let device_tasks = vec![
            DeviceTask {
                device: charger,
                task_events: vec![TaskEvent {
                    task: task(20, 2, 120_000),
                    event: Some(event(200, 20, t0())),
                }],
            },
            DeviceTask {
                device: washer(),
                task_events: vec![],
            },
        ];

        let diff = reconcile(&device_tasks, &[]);
        assert_eq!(diff.to_insert[0].device_name, "Charger");
        assert_eq!(diff.to_insert[0].duration_ms, 120_000);
    }

    #[test]
    fn test_first_fire_at_before_window() {
        let start = t0() + TimeDelta::hours(1);
        assert_eq!(
            first_fire_at(t0(), start, default_lead()),
            start - TimeDelta::minutes(10)
        );
    }

    #[test]
    fn test_first_fire_at_inside_window_fires_now() {
        let start = t0() + TimeDelta::minutes(5);
        assert_eq!(first_fire_at(t0(), start, default_lead()), t0());

        let exactly = t0() + TimeDelta::minutes(10);
        assert_eq!(first_fire_at(t0(), exactly, default_lead()), t0());
    }

    struct Harness {
        server: Arc<FakeServer>,
        store: Arc<MemoryAlarmStore>,
        scheduler: Arc<RecordingScheduler>,
        service: AlarmSyncService,
    }

    fn harness(events: Vec<Event>) -> Harness {
        let server = Arc::new(FakeServer::new(
            vec![washer()],
            vec![task(10, 1, 300_000), task(11, 1, 600_000)],
            events,
        ));
        let store = Arc::new(MemoryAlarmStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let service = AlarmSyncService::new(
            Sources::from_client(server.clone()),
            store.clone(),
            scheduler.clone(),
        )
        .with_now_provider(Arc::new(t0));

        Harness {
            server,
            store,
            scheduler,
            service,
        }
    }

    #[tokio::test]
    async fn test_run_pass_stores_and_arms_new_alarms() {
        let later = t0() + TimeDelta::hours(2);
        let soon = t0() + TimeDelta::minutes(3);
        let h = harness(vec![event(100, 10, later), event(101, 11, soon)]);

        let diff = h.service.run_pass().await.unwrap();

        assert_eq!(diff.to_insert.len(), 2);
        assert_eq!(h.store.get_all().unwrap().len(), 2);
        assert_eq!(
            h.scheduler.take(),
            vec![
                SchedulerCall::Schedule(100, later - TimeDelta::minutes(10)),
                SchedulerCall::Schedule(101, t0()),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_pass_twice_is_a_no_op() {
        let h = harness(vec![event(100, 10, t0() + TimeDelta::hours(2))]);

        h.service.run_pass().await.unwrap();
        h.scheduler.take();

        let second = h.service.run_pass().await.unwrap();
        assert!(second.is_empty());
        assert!(h.scheduler.take().is_empty());
    }

    #[tokio::test]
    async fn test_run_pass_cancels_removed_events() {
        let h = harness(vec![event(100, 10, t0() + TimeDelta::hours(2))]);
        h.service.run_pass().await.unwrap();
        h.scheduler.take();

        h.server.set_events(vec![]);
        let diff = h.service.run_pass().await.unwrap();

        assert_eq!(diff.to_delete.len(), 1);
        assert!(h.store.get_all().unwrap().is_empty());
        assert_eq!(h.scheduler.take(), vec![SchedulerCall::Cancel(100)]);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_everything_untouched() {
        let h = harness(vec![event(100, 10, t0() + TimeDelta::hours(2))]);
        h.store.insert(&alarm(5, "Washer", t0(), 300_000)).unwrap();

        for error in [
            SourceError::NotAuthenticated,
            SourceError::Transport("502 Bad Gateway".to_string()),
        ] {
            h.server.fail_with(Some(error));
            let err = h.service.run_pass().await.unwrap_err();
            assert!(err.is_retryable());
            assert!(matches!(err, SyncError::Source(_)));
        }

        assert_eq!(h.store.get_all().unwrap(), vec![alarm(5, "Washer", t0(), 300_000)]);
        assert!(h.scheduler.take().is_empty());

        // Next pass after recovery catches up
        h.server.fail_with(None);
        let diff = h.service.run_pass().await.unwrap();
        assert_eq!(diff.to_insert.len(), 1);
        assert_eq!(diff.to_delete.len(), 1);
    }

    #[tokio::test]
    async fn test_rearm_stored_skips_finished_runs() {
        let h = harness(vec![]);
        h.store
            .insert(&alarm(1, "Washer", t0() + TimeDelta::hours(1), 300_000))
            .unwrap();
        h.store.insert(&alarm(2, "Washer", t0(), 300_000)).unwrap();
        h.store
            .insert(&alarm(3, "Washer", t0() - TimeDelta::hours(1), 300_000))
            .unwrap();

        assert_eq!(h.service.rearm_stored().unwrap(), 2);
        assert_eq!(
            h.scheduler.take(),
            vec![
                SchedulerCall::Schedule(1, t0() + TimeDelta::minutes(50)),
                SchedulerCall::Schedule(2, t0()),
            ]
        );
    }

    #[tokio::test]
    async fn test_custom_notify_before() {
        let start = t0() + TimeDelta::hours(1);
        let h = harness(vec![event(100, 10, start)]);
        let service = AlarmSyncService::new(
            Sources::from_client(h.server.clone()),
            h.store.clone(),
            h.scheduler.clone(),
        )
        .with_notify_before(TimeDelta::minutes(1))
        .with_now_provider(Arc::new(t0));

        service.run_pass().await.unwrap();
        assert_eq!(
            h.scheduler.take(),
            vec![SchedulerCall::Schedule(100, start - TimeDelta::minutes(1))]
        );
    }
}
