//! SQLite schema for the issue store: baseline tables plus versioned
//! migrations that add the lookup indexes.

use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

use crate::errors::ConsistencyResult;

/// Baseline DDL: tables only. `IF NOT EXISTS` everywhere, so replaying on an
/// initialised database is harmless.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS engine_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS issues (
        project_id TEXT NOT NULL,
        id TEXT NOT NULL,
        batch_id TEXT NOT NULL,
        category TEXT NOT NULL,
        severity TEXT NOT NULL,
        status TEXT NOT NULL,
        subject TEXT NOT NULL,
        message TEXT NOT NULL,
        artifact_ids_json TEXT NOT NULL,
        locations_json TEXT NOT NULL,
        auto_fixable INTEGER NOT NULL DEFAULT 0,
        fix_json TEXT,
        fix_applied INTEGER NOT NULL DEFAULT 0,
        first_seen_at TEXT DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(project_id, id)
    );",
    "CREATE TABLE IF NOT EXISTS validation_runs (
        run_id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        batch_id TEXT NOT NULL,
        artifact_ids_json TEXT NOT NULL,
        issue_ids_json TEXT NOT NULL,
        summary_json TEXT NOT NULL,
        created_at TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS migration_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_version INTEGER NOT NULL,
        to_version INTEGER NOT NULL,
        description TEXT NOT NULL,
        status TEXT NOT NULL,
        error_message TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
];

/// One schema step on top of the baseline tables.
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

/// Ordered by version, starting at 1.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "issues by batch",
        statements: &["CREATE INDEX idx_issues_batch ON issues(project_id, batch_id);"],
    },
    Migration {
        version: 2,
        description: "issues by status",
        statements: &["CREATE INDEX idx_issues_status ON issues(project_id, status);"],
    },
    Migration {
        version: 3,
        description: "latest run per batch",
        statements: &[
            "CREATE INDEX idx_runs_batch_created ON validation_runs(project_id, batch_id, created_at);",
        ],
    },
];

/// Version the schema reaches once every migration has run.
pub const SCHEMA_VERSION: i32 = MIGRATIONS[MIGRATIONS.len() - 1].version;

/// Apply every migration newer than the stored version. Each step runs in
/// its own savepoint; a failing step is rolled back, recorded and returned.
pub fn migrate_schema(conn: &mut Connection) -> ConsistencyResult<()> {
    let stored = get_schema_version(conn)?;
    let mut current = stored;

    for migration in MIGRATIONS.iter().filter(|m| m.version > stored) {
        let applied = (|| -> ConsistencyResult<()> {
            let step = conn.savepoint()?;
            for stmt in migration.statements {
                step.execute_batch(stmt)?;
            }
            set_schema_version(&step, migration.version)?;
            record_step(&step, current, migration, "success", None)?;
            step.commit()?;
            Ok(())
        })();

        if let Err(e) = applied {
            warn!(
                "schema migration {} -> {} ({}) failed: {}",
                current, migration.version, migration.description, e
            );
            let _ = record_step(conn, current, migration, "failed", Some(&e.to_string()));
            return Err(e);
        }
        info!("schema migrated to v{} ({})", migration.version, migration.description);
        current = migration.version;
    }
    Ok(())
}

/// Stored schema version; 0 for a database that never ran a migration.
pub fn get_schema_version(conn: &Connection) -> ConsistencyResult<i32> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM engine_meta WHERE key = 'schema_version';",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(stored.and_then(|v| v.parse().ok()).unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> ConsistencyResult<()> {
    conn.execute(
        "INSERT INTO engine_meta(key, value) VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        [version.to_string()],
    )?;
    Ok(())
}

fn record_step(
    conn: &Connection,
    from: i32,
    migration: &Migration,
    status: &str,
    error: Option<&str>,
) -> ConsistencyResult<()> {
    conn.execute(
        "INSERT INTO migration_history(from_version, to_version, description, status, error_message) \
         VALUES (?1, ?2, ?3, ?4, ?5);",
        rusqlite::params![from, migration.version, migration.description, status, error],
    )?;
    Ok(())
}
