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
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS dialog_states (
            session_id TEXT NOT NULL,
            user_id TEXT NOT NULL DEFAULT '',
            flow TEXT NOT NULL DEFAULT 'general',
            step TEXT NOT NULL DEFAULT '',
            collected TEXT NOT NULL DEFAULT '{"flow":"general"}',
            is_complete INTEGER NOT NULL DEFAULT 0,
            rounds INTEGER NOT NULL DEFAULT 0,
            last_depth REAL NOT NULL DEFAULT 0,
            last_stage TEXT NOT NULL DEFAULT 'initial',
            updated_at TEXT NOT NULL,
            PRIMARY KEY (session_id, user_id)
        );
        CREATE INDEX IF NOT EXISTS idx_dialog_states_updated
            ON dialog_states(updated_at);

        CREATE TABLE IF NOT EXISTS turns (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            context TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_turns_session
            ON turns(session_id, created_at);

        CREATE TABLE IF NOT EXISTS relationship_profiles (
            user_key TEXT PRIMARY KEY,
            total_rounds INTEGER NOT NULL DEFAULT 0,
            identity TEXT,
            region TEXT,
            interests TEXT NOT NULL DEFAULT '[]',
            visit_period TEXT,
            planned_period TEXT,
            revisit_count INTEGER NOT NULL DEFAULT 0,
            last_depth REAL NOT NULL DEFAULT 0,
            last_stage TEXT NOT NULL DEFAULT 'initial',
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS knowledge_items (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'general',
            status TEXT NOT NULL DEFAULT 'pending',
            confidence REAL NOT NULL DEFAULT 0.5,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_knowledge_status
            ON knowledge_items(status);

        CREATE TABLE IF NOT EXISTS locations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            address TEXT NOT NULL DEFAULT '',
            lat REAL NOT NULL DEFAULT 0,
            lng REAL NOT NULL DEFAULT 0,
            category TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_locations_name ON locations(name);

        CREATE TABLE IF NOT EXISTS merchant_products (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            location_name TEXT NOT NULL,
            business_type TEXT,
            opening_hours TEXT,
            product_name TEXT NOT NULL,
            price_cents INTEGER NOT NULL,
            duration_min INTEGER,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_merchant_products_session
            ON merchant_products(session_id);

        CREATE TABLE IF NOT EXISTS travel_memories (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            user_key TEXT NOT NULL,
            location_name TEXT NOT NULL,
            memory_text TEXT,
            companions TEXT,
            visit_date TEXT,
            revisit_intent INTEGER,
            revisit_reason TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_travel_memories_user
            ON travel_memories(user_key);

        CREATE TABLE IF NOT EXISTS distance_cache (
            origin TEXT NOT NULL,
            destination TEXT NOT NULL,
            mode TEXT NOT NULL,
            distance_text TEXT NOT NULL,
            duration_text TEXT NOT NULL,
            distance_meters INTEGER NOT NULL,
            duration_seconds INTEGER NOT NULL,
            cached_at TEXT NOT NULL,
            PRIMARY KEY (origin, destination, mode)
        );
    "#,
}];

/// Apply all migrations newer than the recorded version.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("creating _migrations table: {e}")))?;

    let current = current_version(conn).await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.sql)
            .await
            .map_err(|e| {
                DatabaseError::Migration(format!(
                    "migration v{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            libsql::params![migration.version, migration.name],
        )
        .await
        .map_err(|e| {
            DatabaseError::Migration(format!(
                "recording migration v{}: {e}",
                migration.version
            ))
        })?;
        tracing::info!(version = migration.version, name = migration.name, "Applied migration");
    }

    Ok(())
}

async fn current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("reading migration version: {e}")))?;
    match rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?
    {
        Some(row) => row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::Migration(e.to_string())),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        db.connect().unwrap()
    }

    #[tokio::test]
    async fn migrations_create_all_tables() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        for table in &[
            "dialog_states",
            "turns",
            "relationship_profiles",
            "knowledge_items",
            "locations",
            "merchant_products",
            "travel_memories",
            "distance_cache",
            "_migrations",
        ] {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    libsql::params![*table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap().unwrap();
            let count: i64 = row.get(0).unwrap();
            assert_eq!(count, 1, "Table '{}' should exist", table);
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let version = current_version(&conn).await.unwrap();
        assert_eq!(version, 1);
    }
}
