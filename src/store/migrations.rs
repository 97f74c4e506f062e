//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS jurisdictions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                workflow_enabled INTEGER NOT NULL DEFAULT 0,
                cx_survey_enabled INTEGER NOT NULL DEFAULT 0,
                reply_to_service_request_enabled INTEGER NOT NULL DEFAULT 0,
                broadcast_to_submitter_on_request_closed INTEGER NOT NULL DEFAULT 0,
                filter_broadcasts_by_department INTEGER NOT NULL DEFAULT 0,
                enforce_assignment_through_department INTEGER NOT NULL DEFAULT 0,
                preferred_broadcast_channel TEXT NOT NULL DEFAULT 'email',
                workflow_broadcast_window INTEGER,
                cx_survey_broadcast_window INTEGER,
                cx_survey_trigger_status TEXT NOT NULL DEFAULT 'done',
                send_from_email TEXT,
                send_from_email_verified INTEGER NOT NULL DEFAULT 0,
                send_from_phone TEXT,
                reply_to_email TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS staff_users (
                id TEXT PRIMARY KEY,
                jurisdiction_id TEXT NOT NULL REFERENCES jurisdictions(id),
                email TEXT NOT NULL,
                first_name TEXT,
                last_name TEXT,
                phone TEXT,
                is_admin INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_staff_users_jurisdiction ON staff_users(jurisdiction_id);

            CREATE TABLE IF NOT EXISTS departments (
                id TEXT PRIMARY KEY,
                jurisdiction_id TEXT NOT NULL REFERENCES jurisdictions(id),
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS services (
                id TEXT PRIMARY KEY,
                jurisdiction_id TEXT NOT NULL REFERENCES jurisdictions(id),
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS staff_user_departments (
                staff_user_id TEXT NOT NULL REFERENCES staff_users(id) ON DELETE CASCADE,
                department_id TEXT NOT NULL REFERENCES departments(id) ON DELETE CASCADE,
                is_lead INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (staff_user_id, department_id)
            );

            CREATE TABLE IF NOT EXISTS service_requests (
                id TEXT PRIMARY KEY,
                jurisdiction_id TEXT NOT NULL REFERENCES jurisdictions(id),
                public_id INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'inbox',
                channel TEXT,
                description TEXT NOT NULL,
                first_name TEXT,
                last_name TEXT,
                email TEXT,
                phone TEXT,
                assigned_to TEXT,
                department_id TEXT,
                service_id TEXT,
                input_channel TEXT NOT NULL,
                close_date TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (jurisdiction_id, public_id)
            );
            CREATE INDEX IF NOT EXISTS idx_service_requests_jurisdiction ON service_requests(jurisdiction_id);

            CREATE TABLE IF NOT EXISTS service_request_comments (
                id TEXT PRIMARY KEY,
                service_request_id TEXT NOT NULL REFERENCES service_requests(id) ON DELETE CASCADE,
                comment TEXT NOT NULL,
                added_by TEXT,
                broadcast_to_submitter INTEGER NOT NULL DEFAULT 0,
                broadcast_to_assignee INTEGER NOT NULL DEFAULT 0,
                broadcast_to_staff INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_comments_request ON service_request_comments(service_request_id);

            CREATE TABLE IF NOT EXISTS inbound_maps (
                id TEXT PRIMARY KEY,
                channel TEXT NOT NULL,
                jurisdiction_id TEXT NOT NULL REFERENCES jurisdictions(id),
                department_id TEXT,
                staff_user_id TEXT,
                service_request_id TEXT,
                service_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_inbound_maps_request ON inbound_maps(service_request_id);
        "#,
    },
    Migration {
        version: 2,
        name: "communications",
        sql: r#"
            CREATE TABLE IF NOT EXISTS communications (
                id TEXT PRIMARY KEY,
                channel TEXT NOT NULL,
                address TEXT NOT NULL,
                type TEXT NOT NULL,
                dispatched INTEGER NOT NULL,
                dispatch_payload TEXT NOT NULL,
                dispatch_response TEXT NOT NULL,
                accepted INTEGER NOT NULL,
                delivered INTEGER NOT NULL,
                service_request_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_communications_request ON communications(service_request_id);
            CREATE INDEX IF NOT EXISTS idx_communications_address ON communications(address);

            CREATE TABLE IF NOT EXISTS channel_statuses (
                id TEXT PRIMARY KEY,
                channel TEXT NOT NULL,
                is_allowed INTEGER,
                log TEXT NOT NULL DEFAULT '[]',
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
        "#,
    },
    Migration {
        version: 3,
        name: "templates",
        sql: r#"
            CREATE TABLE IF NOT EXISTS templates (
                jurisdiction_id TEXT NOT NULL REFERENCES jurisdictions(id),
                channel TEXT NOT NULL,
                name TEXT NOT NULL,
                type TEXT NOT NULL,
                content TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (jurisdiction_id, channel, name, type)
            );
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::Migration(format!("Bad migration version: {e}"))),
        None => Ok(0),
    }
}

async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    #[tokio::test]
    async fn applies_all_migrations() {
        let conn = memory_conn().await;
        run_migrations(&conn).await.unwrap();
        let version = get_current_version(&conn).await.unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = memory_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();
        let version = get_current_version(&conn).await.unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);
    }

    #[tokio::test]
    async fn migrations_run_on_spawned_task() {
        let conn = memory_conn().await;
        let version = tokio::spawn(async move {
            run_migrations(&conn).await?;
            get_current_version(&conn).await
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);
    }

    #[test]
    fn versions_are_strictly_increasing() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[1].version > pair[0].version);
        }
    }
}
