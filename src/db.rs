use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

pub const KEY_MESSAGE_QUEUE: &str = "messageQueue";
pub const KEY_MIN_WAIT_TIME: &str = "minWaitTime";
pub const KEY_IMAGE_QUEUE_MODE: &str = "imageQueueMode";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    key             TEXT PRIMARY KEY,
    value_json      TEXT NOT NULL,
    updated_at      DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Open (or create) the store database. Pass `None` for an in-memory database.
///
/// A fresh database is initialised with an empty `messageQueue`.
pub fn open_database(path: Option<&std::path::Path>) -> Result<Connection> {
    let conn = match path {
        Some(p) => Connection::open(p).context("Failed to open queue database")?,
        None => Connection::open_in_memory().context("Failed to open in-memory database")?,
    };

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;",
    )
    .context("Failed to set PRAGMA options")?;

    conn.execute_batch(SCHEMA)
        .context("Failed to create settings schema")?;

    initialize(&conn)?;

    Ok(conn)
}

/// Seed the keys a fresh install starts with. Existing values are kept.
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO settings (key, value_json) VALUES (?1, '[]')",
        params![KEY_MESSAGE_QUEUE],
    )
    .context("Failed to initialise message queue")?;
    Ok(())
}

/// Read a value by key.
pub fn get_value(conn: &Connection, key: &str) -> Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("Failed to read setting '{}'", key))?;

    match raw {
        Some(json) => {
            let value = serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse setting '{}'", key))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Insert or overwrite a value.
pub fn put_value(conn: &Connection, key: &str, value: &Value) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO settings (key, value_json, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json,
                                        updated_at = excluded.updated_at",
        params![key, serde_json::to_string(value)?, now],
    )
    .with_context(|| format!("Failed to write setting '{}'", key))?;
    Ok(())
}

/// Remove every stored key. Returns the number of rows deleted.
pub fn delete_all(conn: &Connection) -> Result<u32> {
    let count = conn
        .execute("DELETE FROM settings", [])
        .context("Failed to clear settings")?;
    Ok(count as u32)
}
