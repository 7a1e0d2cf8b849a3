//! HomeTask client library
//!
//! Reads devices, tasks and scheduled events from a household scheduling
//! server and turns them into:
//! - A per-device view of tasks and their scheduled runs
//! - A one-line overview with the current state of every device
//! - Local alarms that warn before a run and announce its start

pub mod api;
pub mod config;
pub mod db;
pub mod integrations;
pub mod models;
pub mod schema;
pub mod services;
