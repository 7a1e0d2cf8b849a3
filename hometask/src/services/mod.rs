pub mod alarm_firing;
pub mod alarm_store;
pub mod alarm_sync;
pub mod device_state;
pub mod overview;
pub mod session;
pub mod task_join;
