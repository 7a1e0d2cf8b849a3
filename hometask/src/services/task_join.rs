use crate::models::{Device, DeviceTask, Event, Task, TaskEvent};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// History order: task-events with an event first, latest start first.
pub fn compare_task_events(a: &TaskEvent, b: &TaskEvent) -> Ordering {
    match (&a.event, &b.event) {
        (Some(a), Some(b)) => b.start_time.cmp(&a.start_time),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Index events by the task they belong to.
///
/// If the server reports several events for one task, the one with the
/// highest event id is kept.
fn events_by_task(events: Vec<Event>) -> HashMap<i64, Event> {
    let mut by_task: HashMap<i64, Event> = HashMap::with_capacity(events.len());
    for event in events {
        match by_task.entry(event.task_id) {
            Entry::Occupied(mut slot) => {
                if event.id > slot.get().id {
                    log::debug!(
                        "Task {} has several events, keeping {} over {}",
                        event.task_id,
                        event.id,
                        slot.get().id
                    );
                    slot.insert(event);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(event);
            }
        }
    }
    by_task
}

/// Build per-device task histories, ordered by device name.
///
/// Tasks that reference an unknown device are left out.
pub fn join(mut devices: Vec<Device>, tasks: Vec<Task>, events: Vec<Event>) -> Vec<DeviceTask> {
    let mut events = events_by_task(events);

    let mut by_device: HashMap<i64, Vec<TaskEvent>> = HashMap::new();
    for task in tasks {
        let event = events.remove(&task.id);
        by_device
            .entry(task.device_id)
            .or_default()
            .push(TaskEvent { task, event });
    }

    devices.sort_by(|a, b| a.name.cmp(&b.name));

    let device_tasks: Vec<DeviceTask> = devices
        .into_iter()
        .map(|device| {
            let mut task_events = by_device.remove(&device.id).unwrap_or_default();
            task_events.sort_by(compare_task_events);
            DeviceTask {
                device,
                task_events,
            }
        })
        .collect();

    if !by_device.is_empty() {
        let orphaned: usize = by_device.values().map(Vec::len).sum();
        log::debug!(
            "Dropped {} tasks referencing unknown devices {:?}",
            orphaned,
            by_device.keys().collect::<Vec<_>>()
        );
    }

    device_tasks
}
