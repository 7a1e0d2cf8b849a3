use crate::services::alarm_store::StoreError;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use diesel::sqlite::SqliteConnection;
use diesel::{RunQueryDsl, sql_query};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use std::time::Duration;

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// How long a connection waits on a lock held by the other process.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// The server and the alarm runner share one database file.
#[derive(Debug, Clone, Copy)]
struct BusyTimeout(Duration);

impl CustomizeConnection<SqliteConnection, r2d2::Error> for BusyTimeout {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        sql_query(format!("PRAGMA busy_timeout = {}", self.0.as_millis()))
            .execute(conn)
            .map(|_| ())
            .map_err(r2d2::Error::QueryError)
    }
}

/// Opens the local alarm database and runs pending migrations.
///
/// The pool holds a single connection: the alarm table has one writer per
/// reconciliation pass, and `:memory:` databases only exist per connection.
pub fn init_pool(database_url: &str) -> Result<DbPool, StoreError> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .connection_customizer(Box::new(BusyTimeout(BUSY_TIMEOUT)))
        .build(manager)?;

    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| StoreError::Migration(e.to_string()))?;

    log::info!("Alarm database ready at {}", database_url);

    Ok(pool)
}
