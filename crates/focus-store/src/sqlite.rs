//! SQLite-based store implementation
//!
//! The database file is shared with the platform shim process. Session writes
//! take a `BEGIN IMMEDIATE` transaction, which holds SQLite's reserved lock
//! for the whole read-modify-write, so concurrent writers in either process
//! serialize and the last committed write wins.

use chrono::{DateTime, Local};
use focus_api::Session;
use focus_util::{from_epoch_millis, to_epoch_millis, CommandId};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    decode_session, encode_session, AuditEvent, DeviceKey, Store, StoreError, StoreResult,
    StoredCommand, SESSION_KEYS,
};

/// How long a writer waits for the other process to release its lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "Store opened");

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Session record and device bookkeeping, one scalar per key
            CREATE TABLE IF NOT EXISTS prefs (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Remote commands; payload is dropped once consumed, the id stays
            CREATE TABLE IF NOT EXISTS remote_commands (
                command_id TEXT PRIMARY KEY,
                received_at INTEGER NOT NULL,
                payload_json TEXT,
                consumed_at INTEGER
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_remote_pending
                ON remote_commands(consumed_at, received_at);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn load_session_values(conn: &Connection) -> StoreResult<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT key, value FROM prefs WHERE key LIKE 'session.%'")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

    let mut values = HashMap::new();
    for row in rows {
        let (key, value) = row?;
        values.insert(key, value);
    }
    Ok(values)
}

fn persist_session(conn: &Connection, session: &Session) -> StoreResult<()> {
    for (key, value) in encode_session(session) {
        put_value(conn, key, value.as_deref())?;
    }
    Ok(())
}

fn put_value(conn: &Connection, key: &str, value: Option<&str>) -> StoreResult<()> {
    match value {
        Some(value) => {
            conn.execute(
                r#"
                INSERT INTO prefs (key, value) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
                params![key, value],
            )?;
        }
        None => {
            conn.execute("DELETE FROM prefs WHERE key = ?1", [key])?;
        }
    }
    Ok(())
}

fn get_value(conn: &Connection, key: &str) -> StoreResult<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM prefs WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?)
}

impl Store for SqliteStore {
    fn read_session(&self) -> Session {
        let values = self.lock().and_then(|conn| load_session_values(&conn));
        match values {
            Ok(values) => decode_session(&values),
            Err(e) => {
                warn!(error = %e, "Failed to read session record, using defaults");
                Session::default()
            }
        }
    }

    fn write_session(&self, mutator: &mut dyn FnMut(Session) -> Session) -> StoreResult<Session> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = decode_session(&load_session_values(&tx)?);
        let next = mutator(current).normalized();
        persist_session(&tx, &next)?;
        tx.commit()?;

        debug!(
            active = next.active,
            card_required = next.card_required,
            "Session record written"
        );
        Ok(next)
    }

    fn clear_session(&self) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for key in SESSION_KEYS {
            tx.execute("DELETE FROM prefs WHERE key = ?1", [key])?;
        }
        tx.commit()?;

        debug!("Session record cleared");
        Ok(())
    }

    fn insert_remote_command(
        &self,
        id: &CommandId,
        received_at: DateTime<Local>,
        payload_json: &str,
    ) -> StoreResult<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO remote_commands (command_id, received_at, payload_json)
            VALUES (?1, ?2, ?3)
            "#,
            params![id.as_str(), to_epoch_millis(&received_at), payload_json],
        )?;

        debug!(command_id = %id, inserted = inserted == 1, "Remote command stored");
        Ok(inserted == 1)
    }

    fn pending_remote_commands(&self) -> StoreResult<Vec<StoredCommand>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT command_id, received_at, payload_json FROM remote_commands
            WHERE consumed_at IS NULL AND payload_json IS NOT NULL
            ORDER BY received_at, rowid
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let received_at: i64 = row.get(1)?;
            let payload_json: String = row.get(2)?;
            Ok((id, received_at, payload_json))
        })?;

        let mut commands = Vec::new();
        for row in rows {
            let (id, received_at, payload_json) = row?;
            commands.push(StoredCommand {
                id: CommandId::new(id),
                received_at: from_epoch_millis(received_at).unwrap_or_else(focus_util::now),
                payload_json,
            });
        }

        Ok(commands)
    }

    fn mark_command_consumed(&self, id: &CommandId, at: DateTime<Local>) -> StoreResult<()> {
        let conn = self.lock()?;
        let at = to_epoch_millis(&at);
        conn.execute(
            r#"
            INSERT INTO remote_commands (command_id, received_at, payload_json, consumed_at)
            VALUES (?1, ?2, NULL, ?2)
            ON CONFLICT(command_id)
            DO UPDATE SET payload_json = NULL, consumed_at = excluded.consumed_at
            "#,
            params![id.as_str(), at],
        )?;

        debug!(command_id = %id, "Remote command consumed");
        Ok(())
    }

    fn is_command_consumed(&self, id: &CommandId) -> StoreResult<bool> {
        let conn = self.lock()?;
        let consumed: Option<i64> = conn
            .query_row(
                "SELECT consumed_at FROM remote_commands WHERE command_id = ?1",
                [id.as_str()],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten();
        Ok(consumed.is_some())
    }

    fn prune_tombstones(&self, cutoff: DateTime<Local>) -> StoreResult<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM remote_commands WHERE consumed_at IS NOT NULL AND consumed_at < ?1",
            [to_epoch_millis(&cutoff)],
        )?;

        debug!(removed, "Tombstones pruned");
        Ok(removed)
    }

    fn get_device_value(&self, key: DeviceKey) -> StoreResult<Option<String>> {
        let conn = self.lock()?;
        get_value(&conn, key.as_key())
    }

    fn set_device_value(&self, key: DeviceKey, value: Option<&str>) -> StoreResult<()> {
        let conn = self.lock()?;
        put_value(&conn, key.as_key(), value)
    }

    fn take_device_value(&self, key: DeviceKey) -> StoreResult<Option<String>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = get_value(&tx, key.as_key())?;
        if value.is_some() {
            put_value(&tx, key.as_key(), None)?;
        }
        tx.commit()?;
        Ok(value)
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.lock()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| focus_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
