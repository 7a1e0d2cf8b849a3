use crate::models::{DeviceOverview, DeviceTask};

/// Reduce each device history to its primary task-event.
///
/// The primary entry is the first one carrying an event, which after the join
/// ordering is the latest-starting scheduled run.
pub fn overview(device_tasks: Vec<DeviceTask>) -> Vec<DeviceOverview> {
    device_tasks
        .into_iter()
        .map(|DeviceTask { device, task_events }| DeviceOverview {
            device,
            task_event: task_events.into_iter().find(|te| te.event.is_some()),
        })
        .collect()
}
