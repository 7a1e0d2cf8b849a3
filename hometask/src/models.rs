use chrono::{DateTime, TimeDelta, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Device {
    pub id: i64,
    pub name: String,
    /// Power draw in watts. A null or missing value from the server reads as 0.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub power_watts: f64,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

/// Window in which a task is allowed to run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSpan {
    pub fn length(&self) -> TimeDelta {
        self.end - self.start
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: i64,
    pub device_id: i64,
    pub time_span: TimeSpan,
    /// Required contiguous runtime inside `time_span`, in milliseconds.
    pub duration_ms: i64,
}

impl Task {
    pub fn duration(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.duration_ms)
    }
}

/// Concrete start the server picked for a task.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: i64,
    pub task_id: i64,
    pub start_time: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub task: Task,
    pub event: Option<Event>,
}

impl TaskEvent {
    /// End of the scheduled run, if the task has an event.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.event
            .as_ref()
            .map(|event| event.start_time + self.task.duration())
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DeviceTask {
    pub device: Device,
    pub task_events: Vec<TaskEvent>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DeviceOverview {
    pub device: Device,
    pub task_event: Option<TaskEvent>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Inactive,
    Scheduled,
    Active,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Inactive => "inactive",
            DeviceState::Scheduled => "scheduled",
            DeviceState::Active => "active",
        }
    }
}

/// Locally persisted alarm for one server event. `id` is the event id.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventAlarm {
    pub id: i64,
    pub device_name: String,
    pub start_time: DateTime<Utc>,
    pub duration_ms: i64,
}

impl EventAlarm {
    pub fn new(device: &Device, task: &Task, event: &Event) -> Self {
        Self {
            id: event.id,
            device_name: device.name.clone(),
            start_time: event.start_time,
            duration_ms: task.duration_ms,
        }
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + TimeDelta::milliseconds(self.duration_ms)
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::event_alarms)]
pub struct EventAlarmRow {
    pub id: i64,
    pub device_name: String,
    pub start_time_ms: i64,
    pub duration_ms: i64,
}

impl From<&EventAlarm> for EventAlarmRow {
    fn from(alarm: &EventAlarm) -> Self {
        Self {
            id: alarm.id,
            device_name: alarm.device_name.clone(),
            start_time_ms: alarm.start_time.timestamp_millis(),
            duration_ms: alarm.duration_ms,
        }
    }
}

impl From<EventAlarmRow> for EventAlarm {
    fn from(row: EventAlarmRow) -> Self {
        Self {
            id: row.id,
            device_name: row.device_name,
            start_time: DateTime::from_timestamp_millis(row.start_time_ms).unwrap_or_default(),
            duration_ms: row.duration_ms,
        }
    }
}

/// Body of a task creation request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub device_id: i64,
    pub time_span: TimeSpan,
    pub duration_ms: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    #[error("time span must end after it starts")]
    EmptyWindow,
    #[error("duration must be positive")]
    NonPositiveDuration,
    #[error("duration of {duration_ms} ms does not fit in a {window_ms} ms window")]
    DurationExceedsWindow { duration_ms: i64, window_ms: i64 },
}

impl NewTask {
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        let window_ms = self.time_span.length().num_milliseconds();
        if window_ms <= 0 {
            return Err(TaskValidationError::EmptyWindow);
        }
        if self.duration_ms <= 0 {
            return Err(TaskValidationError::NonPositiveDuration);
        }
        if self.duration_ms > window_ms {
            return Err(TaskValidationError::DurationExceedsWindow {
                duration_ms: self.duration_ms,
                window_ms,
            });
        }
        Ok(())
    }
}
