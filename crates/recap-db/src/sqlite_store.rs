use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Local, Utc};
use recap_common::{
    ChatRole, Error, HistoryEntry, Result, StatusKind, StatusRecord, SummaryDocument,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info, warn};

use crate::store::SummaryStore;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS statuses (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        kind TEXT NOT NULL DEFAULT 'ongoing',
        completed INTEGER NOT NULL DEFAULT 0,
        processed INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS summary (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        text TEXT NOT NULL,
        last_updated TEXT
    );

    CREATE TABLE IF NOT EXISTS history (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    );";

const RECORD_COLUMNS: &str =
    "id, title, description, kind, completed, processed, created_at, updated_at";

/// SQLite-backed store for status records and the singleton summary.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening summary store at {}", db_path.display());
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Persistence(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| Error::Persistence(format!("failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Persistence(format!("failed to open in-memory database: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.lock()?
            .execute_batch(SCHEMA)
            .map_err(|e| Error::Persistence(format!("migration failed: {e}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Persistence("database mutex poisoned".into()))
    }

    /// Run `f` against the raw connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Insert a new record with a generated id.
    pub fn add_record(
        &self,
        title: &str,
        description: &str,
        kind: StatusKind,
    ) -> Result<StatusRecord> {
        let record = StatusRecord::new(
            uuid::Uuid::new_v4().to_string(),
            title.trim(),
            description.trim(),
            kind,
        );
        self.insert_record(&record)?;
        debug!("added status record {}", record.id);
        Ok(record)
    }

    /// Insert a fully formed record, failing if the id already exists.
    pub fn insert_record(&self, record: &StatusRecord) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO statuses (id, title, description, kind, completed, processed, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.title,
                    record.description,
                    record.kind.as_str(),
                    record.completed,
                    record.processed,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| Error::Persistence(format!("failed to insert record: {e}")))?;
        Ok(())
    }

    pub fn get_record(&self, id: &str) -> Result<Option<StatusRecord>> {
        let conn = self.lock()?;
        query_record(&conn, id)
    }

    /// Set the completion flag. Returns the updated record, or `None` if the
    /// id is unknown.
    pub fn set_completed(&self, id: &str, completed: bool) -> Result<Option<StatusRecord>> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE statuses SET completed = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, completed, Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::Persistence(format!("failed to update record: {e}")))?;
        if rows == 0 {
            return Ok(None);
        }
        query_record(&conn, id)
    }

    pub fn delete_record(&self, id: &str) -> Result<bool> {
        let rows = self
            .lock()?
            .execute("DELETE FROM statuses WHERE id = ?1", params![id])
            .map_err(|e| Error::Persistence(format!("failed to delete record: {e}")))?;
        Ok(rows > 0)
    }
}

impl SummaryStore for SqliteStore {
    fn list_records(&self) -> Result<Vec<StatusRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM statuses ORDER BY rowid ASC"
            ))
            .map_err(|e| Error::Persistence(format!("failed to prepare record query: {e}")))?;

        let rows = stmt
            .query_map([], map_record)
            .map_err(|e| Error::Persistence(format!("failed to load records: {e}")))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(
                row.map_err(|e| Error::Persistence(format!("failed to read record row: {e}")))?,
            );
        }
        Ok(records)
    }

    fn mark_processed(&self, ids: &[String]) -> Result<usize> {
        let conn = self.lock()?;
        mark_processed_in(&conn, ids, Utc::now())
    }

    fn get_summary(&self) -> Result<SummaryDocument> {
        let conn = self.lock()?;
        read_summary(&conn)
    }

    fn put_summary(&self, doc: &SummaryDocument) -> Result<()> {
        let conn = self.lock()?;
        write_summary(&conn, doc)
    }

    fn commit_generation(
        &self,
        generated: &str,
        consumed: &[String],
        now: DateTime<Local>,
    ) -> Result<SummaryDocument> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Persistence(format!("failed to begin transaction: {e}")))?;

        let prior = read_summary(&tx)?;
        let doc = prior.appended(generated, now);
        write_summary(&tx, &doc)?;
        let marked = mark_processed_in(&tx, consumed, now.with_timezone(&Utc))?;

        tx.commit()
            .map_err(|e| Error::Persistence(format!("failed to commit summary: {e}")))?;

        info!(
            summary_len = doc.text.len(),
            marked, "committed generated summary"
        );
        Ok(doc)
    }

    fn load_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT role, content, created_at FROM (
                     SELECT seq, role, content, created_at FROM history
                     ORDER BY seq DESC LIMIT ?1
                 ) ORDER BY seq ASC",
            )
            .map_err(|e| Error::Persistence(format!("failed to prepare history query: {e}")))?;

        let rows = stmt
            .query_map(params![sql_limit(limit)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| Error::Persistence(format!("failed to load history: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            let (role, content, created_at) =
                row.map_err(|e| Error::Persistence(format!("failed to read history row: {e}")))?;
            let Some(role) = ChatRole::parse(&role) else {
                warn!("skipping history entry with unknown role '{role}'");
                continue;
            };
            entries.push(HistoryEntry {
                role,
                content,
                timestamp: parse_timestamp(&created_at),
            });
        }
        Ok(entries)
    }

    fn append_history(&self, entries: &[HistoryEntry], capacity: usize) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Persistence(format!("failed to begin transaction: {e}")))?;

        for entry in entries {
            tx.execute(
                "INSERT INTO history (role, content, created_at) VALUES (?1, ?2, ?3)",
                params![
                    entry.role.as_str(),
                    entry.content,
                    entry.timestamp.to_rfc3339()
                ],
            )
            .map_err(|e| Error::Persistence(format!("failed to save history: {e}")))?;
        }
        tx.execute(
            "DELETE FROM history WHERE seq NOT IN (
                 SELECT seq FROM history ORDER BY seq DESC LIMIT ?1
             )",
            params![sql_limit(capacity)],
        )
        .map_err(|e| Error::Persistence(format!("failed to trim history: {e}")))?;

        tx.commit()
            .map_err(|e| Error::Persistence(format!("failed to commit history: {e}")))
    }

    fn clear_history(&self) -> Result<()> {
        self.lock()?
            .execute("DELETE FROM history", [])
            .map_err(|e| Error::Persistence(format!("failed to clear history: {e}")))?;
        Ok(())
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn read_summary(conn: &Connection) -> Result<SummaryDocument> {
    let row = conn
        .query_row(
            "SELECT text, last_updated FROM summary WHERE id = 1",
            [],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
        )
        .optional()
        .map_err(|e| Error::Persistence(format!("failed to load summary: {e}")))?;

    Ok(match row {
        Some((text, last_updated)) => SummaryDocument {
            text,
            last_updated: last_updated.map(|raw| parse_timestamp(&raw)),
        },
        None => SummaryDocument::default(),
    })
}

fn write_summary(conn: &Connection, doc: &SummaryDocument) -> Result<()> {
    conn.execute(
        "INSERT INTO summary (id, text, last_updated) VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET
           text = excluded.text,
           last_updated = excluded.last_updated",
        params![doc.text, doc.last_updated.map(|ts| ts.to_rfc3339())],
    )
    .map_err(|e| Error::Persistence(format!("failed to save summary: {e}")))?;
    Ok(())
}

fn mark_processed_in(conn: &Connection, ids: &[String], now: DateTime<Utc>) -> Result<usize> {
    let now = now.to_rfc3339();
    let mut marked = 0;
    for id in ids {
        marked += conn
            .execute(
                "UPDATE statuses SET processed = 1, updated_at = ?2 WHERE id = ?1",
                params![id, now],
            )
            .map_err(|e| Error::Persistence(format!("failed to mark record {id} processed: {e}")))?;
    }
    Ok(marked)
}

fn query_record(conn: &Connection, id: &str) -> Result<Option<StatusRecord>> {
    conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM statuses WHERE id = ?1"),
        params![id],
        map_record,
    )
    .optional()
    .map_err(|e| Error::Persistence(format!("failed to load record {id}: {e}")))
}

fn map_record(row: &Row<'_>) -> rusqlite::Result<StatusRecord> {
    let kind: String = row.get(3)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(StatusRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        kind: StatusKind::parse(&kind),
        completed: row.get(4)?,
        processed: row.get(5)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!(
                "failed to parse timestamp '{}': {e}, falling back to now",
                value
            );
            Utc::now()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(records: &[StatusRecord]) -> Vec<String> {
        records.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn add_and_list_preserves_insertion_order() {
        let store = SqliteStore::in_memory().expect("in-memory store should open");
        let first = store.add_record("Learn X", "", StatusKind::Ongoing).unwrap();
        let second = store
            .add_record("Plan Y", "soon", StatusKind::Planned)
            .unwrap();

        let records = store.list_records().unwrap();
        assert_eq!(ids(&records), vec![first.id, second.id]);
        assert_eq!(records[1].kind, StatusKind::Planned);
        assert_eq!(records[1].description, "soon");
    }

    #[test]
    fn empty_store_has_blank_summary() {
        let store = SqliteStore::in_memory().unwrap();
        let summary = store.get_summary().unwrap();
        assert!(summary.text.is_empty());
        assert!(summary.last_updated.is_none());
    }

    #[test]
    fn set_completed_and_delete() {
        let store = SqliteStore::in_memory().unwrap();
        let record = store.add_record("Task", "", StatusKind::Ongoing).unwrap();

        let updated = store.set_completed(&record.id, true).unwrap().unwrap();
        assert!(updated.completed);
        assert!(store.set_completed("missing", true).unwrap().is_none());

        assert!(store.delete_record(&record.id).unwrap());
        assert!(!store.delete_record(&record.id).unwrap());
        assert!(store.get_record(&record.id).unwrap().is_none());
    }

    #[test]
    fn commit_generation_writes_summary_and_marks_records() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.add_record("A", "", StatusKind::Ongoing).unwrap();
        let b = store.add_record("B", "", StatusKind::Planned).unwrap();

        let doc = store
            .commit_generation("Hello", &[a.id.clone()], Local::now())
            .unwrap();
        assert_eq!(doc.text, "Hello");
        assert_eq!(store.get_summary().unwrap(), doc);

        assert!(store.get_record(&a.id).unwrap().unwrap().processed);
        assert!(!store.get_record(&b.id).unwrap().unwrap().processed);
    }

    #[test]
    fn second_commit_appends_with_separator() {
        let store = SqliteStore::in_memory().unwrap();
        store.commit_generation("one", &[], Local::now()).unwrap();
        let doc = store.commit_generation("two", &[], Local::now()).unwrap();

        assert!(doc.text.starts_with("one\n\n---\n**"));
        assert!(doc.text.ends_with("**\n\ntwo"));
    }

    #[test]
    fn failed_commit_leaves_summary_and_flags_untouched() {
        let store = SqliteStore::in_memory().unwrap();
        let record = store.add_record("A", "", StatusKind::Ongoing).unwrap();
        store
            .put_summary(&SummaryDocument {
                text: "before".into(),
                last_updated: None,
            })
            .unwrap();

        // Fail the processed flip after the summary row has been written.
        store
            .with_connection(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_processed BEFORE UPDATE OF processed ON statuses
                     BEGIN SELECT RAISE(ABORT, 'flip rejected'); END;",
                )
                .map_err(|e| Error::Persistence(e.to_string()))
            })
            .unwrap();

        let err = store
            .commit_generation("after", &[record.id.clone()], Local::now())
            .unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));

        assert_eq!(store.get_summary().unwrap().text, "before");
        assert!(!store.get_record(&record.id).unwrap().unwrap().processed);
    }

    #[test]
    fn mark_processed_ignores_unknown_ids() {
        let store = SqliteStore::in_memory().unwrap();
        let record = store.add_record("A", "", StatusKind::Ongoing).unwrap();
        let marked = store
            .mark_processed(&[record.id.clone(), "ghost".into()])
            .unwrap();
        assert_eq!(marked, 1);
    }

    #[test]
    fn open_creates_parent_directory_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("recap.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.add_record("Persisted", "", StatusKind::Completed).unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        let records = reopened.list_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, StatusKind::Completed);
    }

    #[test]
    fn history_is_trimmed_to_capacity_and_read_oldest_first() {
        let store = SqliteStore::in_memory().unwrap();
        let turns: Vec<HistoryEntry> = (0..5)
            .map(|i| HistoryEntry::new(ChatRole::User, format!("m{i}")))
            .collect();

        store.append_history(&turns[..2], 3).unwrap();
        store.append_history(&turns[2..], 3).unwrap();

        let contents: Vec<String> = store
            .load_history(10)
            .unwrap()
            .into_iter()
            .map(|e| e.content)
            .collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);

        let newest = store.load_history(1).unwrap();
        assert_eq!(newest[0].content, "m4");
        assert_eq!(newest[0].role, ChatRole::User);
    }

    #[test]
    fn clear_history_empties_the_table() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .append_history(&[HistoryEntry::new(ChatRole::Assistant, "hi")], 50)
            .unwrap();
        store.clear_history().unwrap();
        assert!(store.load_history(50).unwrap().is_empty());
    }

    #[test]
    fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recap.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .append_history(&[HistoryEntry::new(ChatRole::User, "before restart")], 50)
                .unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.load_history(50).unwrap()[0].content, "before restart");
    }
}
