use crate::db::DbPool;
use crate::models::{EventAlarm, EventAlarmRow};
use crate::schema::event_alarms;
use crate::services::alarm_sync::AlarmDiff;
use diesel::prelude::*;
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("Database query error: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Alarm store lock poisoned")]
    Poisoned,
}

/// Local table of alarms, one row per server event.
///
/// Writes are idempotent by id so overlapping reconciliation passes that saw
/// the same baseline do not duplicate rows.
pub trait AlarmStore: Send + Sync {
    fn get_all(&self) -> Result<Vec<EventAlarm>, StoreError>;

    fn load_by_id(&self, id: i64) -> Result<Option<EventAlarm>, StoreError>;

    fn insert(&self, alarm: &EventAlarm) -> Result<(), StoreError>;

    fn delete(&self, alarm: &EventAlarm) -> Result<(), StoreError>;

    /// Applies every insert and delete of a diff as a single commit.
    fn apply(&self, diff: &AlarmDiff) -> Result<(), StoreError>;
}

/// SQLite-backed store used by the binaries.
#[derive(Clone)]
pub struct SqliteAlarmStore {
    pool: DbPool,
}

impl SqliteAlarmStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn replace_row(conn: &mut SqliteConnection, alarm: &EventAlarm) -> QueryResult<usize> {
    diesel::replace_into(event_alarms::table)
        .values(EventAlarmRow::from(alarm))
        .execute(conn)
}

fn delete_row(conn: &mut SqliteConnection, id: i64) -> QueryResult<usize> {
    diesel::delete(event_alarms::table.find(id)).execute(conn)
}

impl AlarmStore for SqliteAlarmStore {
    fn get_all(&self) -> Result<Vec<EventAlarm>, StoreError> {
        let mut conn = self.pool.get()?;
        let rows: Vec<EventAlarmRow> = event_alarms::table
            .order(event_alarms::id.asc())
            .select(EventAlarmRow::as_select())
            .load(&mut conn)?;
        Ok(rows.into_iter().map(EventAlarm::from).collect())
    }

    fn load_by_id(&self, id: i64) -> Result<Option<EventAlarm>, StoreError> {
        let mut conn = self.pool.get()?;
        let row: Option<EventAlarmRow> = event_alarms::table
            .find(id)
            .select(EventAlarmRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(EventAlarm::from))
    }

    fn insert(&self, alarm: &EventAlarm) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        replace_row(&mut conn, alarm)?;
        Ok(())
    }

    fn delete(&self, alarm: &EventAlarm) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        delete_row(&mut conn, alarm.id)?;
        Ok(())
    }

    fn apply(&self, diff: &AlarmDiff) -> Result<(), StoreError> {
        if diff.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.get()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            for alarm in &diff.to_insert {
                replace_row(conn, alarm)?;
            }
            for alarm in &diff.to_delete {
                delete_row(conn, alarm.id)?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

/// In-process store, handy for embedding and tests.
#[derive(Default)]
pub struct MemoryAlarmStore {
    alarms: Mutex<BTreeMap<i64, EventAlarm>>,
}

impl MemoryAlarmStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_alarms<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<i64, EventAlarm>) -> T,
    ) -> Result<T, StoreError> {
        let mut alarms = self.alarms.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&mut alarms))
    }
}

impl AlarmStore for MemoryAlarmStore {
    fn get_all(&self) -> Result<Vec<EventAlarm>, StoreError> {
        self.with_alarms(|alarms| alarms.values().cloned().collect())
    }

    fn load_by_id(&self, id: i64) -> Result<Option<EventAlarm>, StoreError> {
        self.with_alarms(|alarms| alarms.get(&id).cloned())
    }

    fn insert(&self, alarm: &EventAlarm) -> Result<(), StoreError> {
        self.with_alarms(|alarms| {
            alarms.insert(alarm.id, alarm.clone());
        })
    }

    fn delete(&self, alarm: &EventAlarm) -> Result<(), StoreError> {
        self.with_alarms(|alarms| {
            alarms.remove(&alarm.id);
        })
    }

    fn apply(&self, diff: &AlarmDiff) -> Result<(), StoreError> {
        self.with_alarms(|alarms| {
            for alarm in &diff.to_insert {
                alarms.insert(alarm.id, alarm.clone());
            }
            for alarm in &diff.to_delete {
                alarms.remove(&alarm.id);
            }
        })
    }
}
