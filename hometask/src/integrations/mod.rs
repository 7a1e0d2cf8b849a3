use crate::models::{Device, DeviceTask, Event, NewTask, Task};
use crate::services::task_join;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub mod notifier;
pub mod rest;
pub mod timer;

pub use notifier::LogNotifier;
pub use rest::RestClient;
pub use timer::TimerAlarmScheduler;

/// Failure while reading server state.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Transport failure: {0}")]
    Transport(String),
}

#[async_trait]
pub trait DeviceSource: Send + Sync {
    async fn get_all_devices(&self) -> Result<Vec<Device>, SourceError>;
}

#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn get_all_tasks(&self) -> Result<Vec<Task>, SourceError>;
}

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn get_all_events(&self) -> Result<Vec<Event>, SourceError>;
}

/// Forwards task creation requests to the server.
#[async_trait]
pub trait TaskWriter: Send + Sync {
    async fn create_task(&self, task: &NewTask) -> Result<Task, SourceError>;
}

/// Wall-clock alarm registrations keyed by alarm id.
///
/// Scheduling an id that is already armed replaces the registration.
/// Cancelling an unknown id does nothing.
pub trait AlarmScheduler: Send + Sync {
    fn schedule(&self, alarm_id: i64, at: DateTime<Utc>);

    fn cancel(&self, alarm_id: i64);
}

/// Shows a user-visible notice. Fire-and-forget.
pub trait NotificationPresenter: Send + Sync {
    fn present(&self, title: &str, body: &str);
}

/// The three server collaborators the join needs.
#[derive(Clone)]
pub struct Sources {
    pub devices: Arc<dyn DeviceSource>,
    pub tasks: Arc<dyn TaskSource>,
    pub events: Arc<dyn EventSource>,
}

impl Sources {
    pub fn new(
        devices: Arc<dyn DeviceSource>,
        tasks: Arc<dyn TaskSource>,
        events: Arc<dyn EventSource>,
    ) -> Self {
        Self {
            devices,
            tasks,
            events,
        }
    }

    /// Use one client for all three collaborators.
    pub fn from_client<C>(client: Arc<C>) -> Self
    where
        C: DeviceSource + TaskSource + EventSource + 'static,
    {
        Self {
            devices: client.clone(),
            tasks: client.clone(),
            events: client,
        }
    }

    /// Fetch devices, tasks and events concurrently and join them.
    ///
    /// Fails as soon as any of the three fetches fails.
    pub async fn fetch_device_tasks(&self) -> Result<Vec<DeviceTask>, SourceError> {
        let (devices, tasks, events) = tokio::try_join!(
            self.devices.get_all_devices(),
            self.tasks.get_all_tasks(),
            self.events.get_all_events(),
        )?;

        log::debug!(
            "Fetched {} devices, {} tasks, {} events",
            devices.len(),
            tasks.len(),
            events.len()
        );

        Ok(task_join::join(devices, tasks, events))
    }
}
