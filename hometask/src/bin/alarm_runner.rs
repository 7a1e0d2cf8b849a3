//! Alarm Runner - keeps local alarms in step with the scheduling server
//!
//! This binary runs as a daemon:
//! - re-arms alarms left in the local store by a previous run
//! - reconciles alarms with the server at startup and on HOMETASK_SYNC_CRON
//! - presents "get ready" and "start now" notices as alarms fire
//!
//! Environment variables:
//!   HOMETASK_API_URL - scheduling server base URL (required)
//!   DATABASE_URL     - SQLite file holding the alarm store
//!   HOMETASK_USERNAME / HOMETASK_PASSWORD - login when the session expires

use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use hometask::config::Config;
use hometask::db;
use hometask::integrations::notifier::CommandNotifier;
use hometask::integrations::{
    AlarmScheduler, LogNotifier, NotificationPresenter, RestClient, Sources, TimerAlarmScheduler,
};
use hometask::services::alarm_firing::{AlarmFiringHandler, dispatch_alarms};
use hometask::services::alarm_store::{AlarmStore, SqliteAlarmStore};
use hometask::services::alarm_sync::AlarmSyncService;
use hometask::services::session::SessionStore;

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match db::init_pool(&config.database_url) {
        Ok(p) => p,
        Err(e) => {
            log::error!("Could not open alarm store {}: {}", config.database_url, e);
            std::process::exit(1);
        }
    };

    if config.credentials.is_none() {
        log::warn!("No credentials configured, relying on {}", config.session_file);
    }

    let client = Arc::new(
        RestClient::new(&config.api_url, SessionStore::new(&config.session_file))
            .with_credentials(config.credentials.clone()),
    );
    let store: Arc<dyn AlarmStore> = Arc::new(SqliteAlarmStore::new(pool));
    let (timer, fired) = TimerAlarmScheduler::new();
    let scheduler: Arc<dyn AlarmScheduler> = Arc::new(timer);

    let presenter: Arc<dyn NotificationPresenter> = match &config.notify_command {
        Some(program) => Arc::new(CommandNotifier::new(program)),
        None => Arc::new(LogNotifier),
    };

    let handler = Arc::new(
        AlarmFiringHandler::new(store.clone(), scheduler.clone(), presenter)
            .with_timezone(config.timezone),
    );
    tokio::spawn(dispatch_alarms(fired, handler));

    let sync = Arc::new(
        AlarmSyncService::new(Sources::from_client(client), store, scheduler)
            .with_notify_before(config.notify_before),
    );

    log::info!("Starting HomeTask alarm runner...");

    match sync.rearm_stored() {
        Ok(count) => log::info!("Re-armed {} stored alarms", count),
        Err(e) => log::error!("Could not read stored alarms: {}", e),
    }

    // Run initial reconciliation at startup
    run_sync(sync.clone()).await;

    let sched = match JobScheduler::new().await {
        Ok(s) => s,
        Err(e) => {
            log::error!("Failed to create scheduler: {}", e);
            std::process::exit(1);
        }
    };

    let sync_job = sync.clone();
    let job = match Job::new_async(config.sync_cron.as_str(), move |_uuid, _l| {
        let sync = sync_job.clone();
        Box::pin(async move {
            log::info!("Scheduled alarm sync triggered");
            run_sync(sync).await;
        })
    }) {
        Ok(j) => j,
        Err(e) => {
            log::error!("Invalid HOMETASK_SYNC_CRON {:?}: {}", config.sync_cron, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = sched.add(job).await {
        log::error!("Failed to add sync job: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = sched.start().await {
        log::error!("Failed to start scheduler: {}", e);
        std::process::exit(1);
    }

    log::info!("Alarm runner running. Sync scheduled at {}", config.sync_cron);

    // Keep the process running
    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
    }
}

/// One reconciliation pass. Failures leave the store untouched and are
/// retried at the next tick.
async fn run_sync(sync: Arc<AlarmSyncService>) {
    match sync.run_pass().await {
        Ok(diff) if diff.is_empty() => log::debug!("Alarms already up to date"),
        Ok(_) => {}
        Err(e) if e.is_retryable() => log::warn!("Alarm sync failed, retrying next tick: {}", e),
        Err(e) => log::error!("Alarm sync failed: {}", e),
    }
}
