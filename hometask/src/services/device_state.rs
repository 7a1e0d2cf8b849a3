use crate::models::{DeviceState, TaskEvent};
use chrono::{DateTime, Utc};

/// Classify a device from its primary task-event at `now`.
///
/// An event starting exactly at `now` is already active. The active window is
/// the task's own duration.
pub fn device_state(task_event: Option<&TaskEvent>, now: DateTime<Utc>) -> DeviceState {
    let Some(task_event) = task_event else {
        return DeviceState::Inactive;
    };
    let Some(event) = &task_event.event else {
        return DeviceState::Inactive;
    };

    if event.start_time > now {
        DeviceState::Scheduled
    } else if now < event.start_time + task_event.task.duration() {
        DeviceState::Active
    } else {
        DeviceState::Inactive
    }
}
