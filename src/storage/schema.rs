//! SQLite schema definition.
//!
//! The schema is applied exactly once, when the database file is created.
//! There is no migration path; `PRAGMA user_version` records which layout a
//! file was created with.

use rusqlite::Connection;

/// Schema version stamped into `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = "
CREATE TABLE experiment (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE(name)
);

CREATE TABLE run (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment INTEGER NOT NULL,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    params BLOB NOT NULL,
    FOREIGN KEY (experiment) REFERENCES experiment(id),
    UNIQUE(experiment, name)
);

CREATE TABLE metric (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run INTEGER NOT NULL,
    key TEXT NOT NULL,
    value REAL,
    timestamp INTEGER NOT NULL,
    FOREIGN KEY (run) REFERENCES run(id)
);
CREATE INDEX idx_metric_run ON metric(run);
";

/// Create all tables in a single transaction and stamp the schema version.
pub(crate) fn create_schema(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA_SQL)?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()
}

/// Read the schema version stamp.
pub(crate) fn read_schema_version(conn: &Connection) -> Result<i64, rusqlite::Error> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_schema_in_memory() {
        let mut conn = Connection::open_in_memory().unwrap();
        create_schema(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(tables, vec!["experiment", "metric", "run"]);
        assert_eq!(read_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_metric_value_accepts_null() {
        let mut conn = Connection::open_in_memory().unwrap();
        create_schema(&mut conn).unwrap();
        conn.execute_batch(
            "INSERT INTO experiment (name, created_at, updated_at) VALUES ('e', 0, 0);
             INSERT INTO run (experiment, name, params, created_at, updated_at) VALUES (1, 'r', x'01', 0, 0);
             INSERT INTO metric (run, key, value, timestamp) VALUES (1, 'loss', NULL, 0);",
        )
        .unwrap();
    }

    #[test]
    fn test_schema_is_not_reapplied() {
        let mut conn = Connection::open_in_memory().unwrap();
        create_schema(&mut conn).unwrap();
        assert!(create_schema(&mut conn).is_err());
    }
}
