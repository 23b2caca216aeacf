//! Status store trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::error::StateError;
use super::schema;
use super::types::{
    CatalogEntry, NewPage, PageDescriptor, PageStatus, StoreSummary, TransferRunStats,
};

/// Persisted record of catalog entries and pages.
///
/// This trait is object-safe and can be used with `Arc<dyn StatusStore>` for
/// shared access across async tasks. Every write touches one entity by key.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Create an origin-side catalog entry unless (name, origin_instance)
    /// already exists. Returns whether a row was created.
    async fn insert_entry_if_absent(
        &self,
        name: &str,
        origin_instance: &str,
        origin_external_key: &str,
    ) -> Result<bool, StateError>;

    async fn find_entry(
        &self,
        name: &str,
        origin_instance: &str,
    ) -> Result<Option<CatalogEntry>, StateError>;

    /// Record the target side of an entry.
    async fn link_entry(
        &self,
        id: i64,
        target_instance: &str,
        target_external_key: &str,
    ) -> Result<(), StateError>;

    /// Entries of `origin` linked to `target`, i.e. transfer-eligible for
    /// that pair.
    async fn linked_entries(
        &self,
        origin: &str,
        target: &str,
    ) -> Result<Vec<CatalogEntry>, StateError>;

    /// Entries linked to `target` from any origin.
    async fn entries_for_target(&self, target: &str) -> Result<Vec<CatalogEntry>, StateError>;

    /// Remove an entry and all of its pages.
    async fn delete_entry(&self, id: i64) -> Result<(), StateError>;

    /// Insert pages whose URL is not yet known. Existing pages are left
    /// untouched whatever their status. Returns the number created.
    async fn insert_pages_if_absent(&self, pages: &[NewPage]) -> Result<u64, StateError>;

    async fn pages_for_entry(&self, entry_id: i64) -> Result<Vec<PageDescriptor>, StateError>;

    async fn pages_with_status(&self, status: PageStatus)
        -> Result<Vec<PageDescriptor>, StateError>;

    async fn mark_processed(&self, page_id: i64, request_id: &str) -> Result<(), StateError>;

    /// Mark a page processed that had nothing left to copy. It keeps no
    /// request id, so the report skips it.
    async fn mark_empty(&self, page_id: i64) -> Result<(), StateError>;

    async fn mark_failed(&self, page_id: i64, error: &str) -> Result<(), StateError>;

    /// Move every failed page back to `new`. Returns the number reset.
    async fn reset_failed(&self) -> Result<u64, StateError>;

    async fn summary(&self) -> Result<StoreSummary, StateError>;

    async fn start_run(&self, origin: &str, target: &str) -> Result<i64, StateError>;

    async fn complete_run(&self, run_id: i64, stats: &TransferRunStats) -> Result<(), StateError>;
}

/// SQLite implementation of the status store.
pub struct SqliteStatusStore {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStatusStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn configure(conn: &Connection) -> Result<(), StateError> {
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(StateError::Migration)?;
    schema::migrate(conn)
}

impl SqliteStatusStore {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| StateError::CreateDir {
                        path: parent.to_path_buf(),
                        source: e,
                    })?;
                }
            }

            let conn = Connection::open(&path_clone).map_err(|e| StateError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StateError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StateError::Migration)?;

            configure(&conn)?;
            Ok::<_, StateError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        configure(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StateError> {
        self.conn
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))
    }
}

const ENTRY_COLUMNS: &str =
    "id, name, origin_instance, origin_external_key, target_instance, target_external_key";

const PAGE_COLUMNS: &str = "id, url, catalog_entry_id, status, has_natural_key, request_id, attempts, last_error, updated_at";

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogEntry> {
    Ok(CatalogEntry {
        id: row.get(0)?,
        name: row.get(1)?,
        origin_instance: row.get(2)?,
        origin_external_key: row.get(3)?,
        target_instance: row.get(4)?,
        target_external_key: row.get(5)?,
    })
}

fn row_to_page(row: &rusqlite::Row<'_>) -> rusqlite::Result<PageDescriptor> {
    let status: String = row.get(3)?;
    let attempts: i64 = row.get(6)?;
    let updated_at: i64 = row.get(8)?;
    Ok(PageDescriptor {
        id: row.get(0)?,
        url: row.get(1)?,
        catalog_entry_id: row.get(2)?,
        status: PageStatus::from_str(&status).unwrap_or(PageStatus::New),
        has_natural_key: row.get(4)?,
        request_id: row.get(5)?,
        attempts: attempts as u32,
        last_error: row.get(7)?,
        updated_at: timestamp(updated_at).unwrap_or(DateTime::UNIX_EPOCH),
    })
}

fn timestamp(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

fn query_entries(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<CatalogEntry>, StateError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM catalog_entries WHERE {filter} ORDER BY name"
        ))
        .map_err(StateError::query)?;
    let entries = stmt
        .query_map(params, row_to_entry)
        .map_err(StateError::query)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(StateError::query)?;
    Ok(entries)
}

fn query_pages(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<PageDescriptor>, StateError> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {PAGE_COLUMNS} FROM pages WHERE {filter} ORDER BY id"
        ))
        .map_err(StateError::query)?;
    let pages = stmt
        .query_map(params, row_to_page)
        .map_err(StateError::query)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(StateError::query)?;
    Ok(pages)
}

fn count(conn: &Connection, sql: &str) -> Result<u64, StateError> {
    conn.query_row(sql, [], |row| row.get::<_, i64>(0))
        .map(|n| n as u64)
        .map_err(StateError::query)
}

#[async_trait]
impl StatusStore for SqliteStatusStore {
    async fn insert_entry_if_absent(
        &self,
        name: &str,
        origin_instance: &str,
        origin_external_key: &str,
    ) -> Result<bool, StateError> {
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO catalog_entries (name, origin_instance, origin_external_key) VALUES (?1, ?2, ?3)",
                [name, origin_instance, origin_external_key],
            )
            .map_err(StateError::query)?;
        Ok(inserted > 0)
    }

    async fn find_entry(
        &self,
        name: &str,
        origin_instance: &str,
    ) -> Result<Option<CatalogEntry>, StateError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM catalog_entries WHERE name = ?1 AND origin_instance = ?2"
            ),
            [name, origin_instance],
            row_to_entry,
        )
        .optional()
        .map_err(StateError::query)
    }

    async fn link_entry(
        &self,
        id: i64,
        target_instance: &str,
        target_external_key: &str,
    ) -> Result<(), StateError> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE catalog_entries SET target_instance = ?1, target_external_key = ?2 WHERE id = ?3",
                rusqlite::params![target_instance, target_external_key, id],
            )
            .map_err(StateError::query)?;
        if updated == 0 {
            return Err(StateError::EntryNotFound(id));
        }
        Ok(())
    }

    async fn linked_entries(
        &self,
        origin: &str,
        target: &str,
    ) -> Result<Vec<CatalogEntry>, StateError> {
        let conn = self.lock()?;
        query_entries(
            &conn,
            "origin_instance = ?1 AND target_instance = ?2 AND target_external_key IS NOT NULL",
            [origin, target],
        )
    }

    async fn entries_for_target(&self, target: &str) -> Result<Vec<CatalogEntry>, StateError> {
        let conn = self.lock()?;
        query_entries(
            &conn,
            "target_instance = ?1 AND target_external_key IS NOT NULL",
            [target],
        )
    }

    async fn delete_entry(&self, id: i64) -> Result<(), StateError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StateError::query)?;
        tx.execute("DELETE FROM pages WHERE catalog_entry_id = ?1", [id])
            .map_err(StateError::query)?;
        tx.execute("DELETE FROM catalog_entries WHERE id = ?1", [id])
            .map_err(StateError::query)?;
        tx.commit().map_err(StateError::query)
    }

    async fn insert_pages_if_absent(&self, pages: &[NewPage]) -> Result<u64, StateError> {
        if pages.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let now = Utc::now().timestamp();
        let tx = conn.transaction().map_err(StateError::query)?;
        let mut created = 0u64;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO pages (url, catalog_entry_id, status, has_natural_key, updated_at) VALUES (?1, ?2, 'new', ?3, ?4)",
                )
                .map_err(StateError::query)?;
            for page in pages {
                created += stmt
                    .execute(rusqlite::params![
                        page.url,
                        page.catalog_entry_id,
                        page.has_natural_key,
                        now
                    ])
                    .map_err(StateError::query)? as u64;
            }
        }
        tx.commit().map_err(StateError::query)?;
        Ok(created)
    }

    async fn pages_for_entry(&self, entry_id: i64) -> Result<Vec<PageDescriptor>, StateError> {
        let conn = self.lock()?;
        query_pages(&conn, "catalog_entry_id = ?1", [entry_id])
    }

    async fn pages_with_status(
        &self,
        status: PageStatus,
    ) -> Result<Vec<PageDescriptor>, StateError> {
        let conn = self.lock()?;
        query_pages(&conn, "status = ?1", [status.as_str()])
    }

    async fn mark_processed(&self, page_id: i64, request_id: &str) -> Result<(), StateError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE pages SET status = 'processed', request_id = ?1, last_error = NULL, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![request_id, Utc::now().timestamp(), page_id],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn mark_empty(&self, page_id: i64) -> Result<(), StateError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE pages SET status = 'processed', request_id = NULL, last_error = NULL, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![Utc::now().timestamp(), page_id],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn mark_failed(&self, page_id: i64, error: &str) -> Result<(), StateError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE pages SET status = 'failed', attempts = attempts + 1, last_error = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![error, Utc::now().timestamp(), page_id],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn reset_failed(&self) -> Result<u64, StateError> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE pages SET status = 'new', last_error = NULL, updated_at = ?1 WHERE status = 'failed'",
                [Utc::now().timestamp()],
            )
            .map_err(StateError::query)?;
        Ok(rows as u64)
    }

    async fn summary(&self) -> Result<StoreSummary, StateError> {
        let conn = self.lock()?;

        let last_run: Option<(i64, Option<i64>)> = conn
            .query_row(
                "SELECT started_at, completed_at FROM transfer_runs ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(StateError::query)?;

        Ok(StoreSummary {
            entries: count(&conn, "SELECT COUNT(*) FROM catalog_entries")?,
            linked_entries: count(
                &conn,
                "SELECT COUNT(*) FROM catalog_entries WHERE target_instance IS NOT NULL AND target_external_key IS NOT NULL",
            )?,
            pages_new: count(&conn, "SELECT COUNT(*) FROM pages WHERE status = 'new'")?,
            pages_processed: count(
                &conn,
                "SELECT COUNT(*) FROM pages WHERE status = 'processed'",
            )?,
            pages_failed: count(&conn, "SELECT COUNT(*) FROM pages WHERE status = 'failed'")?,
            last_run_started: last_run.and_then(|(started, _)| timestamp(started)),
            last_run_completed: last_run.and_then(|(_, completed)| completed.and_then(timestamp)),
        })
    }

    async fn start_run(&self, origin: &str, target: &str) -> Result<i64, StateError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO transfer_runs (origin_instance, target_instance, started_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![origin, target, Utc::now().timestamp()],
        )
        .map_err(StateError::query)?;
        Ok(conn.last_insert_rowid())
    }

    async fn complete_run(&self, run_id: i64, stats: &TransferRunStats) -> Result<(), StateError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE transfer_runs SET completed_at = ?1, entries_linked = ?2, pages_scheduled = ?3, pages_processed = ?4, pages_failed = ?5 WHERE id = ?6",
            rusqlite::params![
                Utc::now().timestamp(),
                stats.entries_linked as i64,
                stats.pages_scheduled as i64,
                stats.pages_processed as i64,
                stats.pages_failed as i64,
                run_id
            ],
        )
        .map_err(StateError::query)?;
        Ok(())
    }
}
