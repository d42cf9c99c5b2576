//! SQLite-backed screenshot archive.
//!
//! All database access runs on a dedicated worker thread; callers hand it
//! closures over an async channel and await the result. Mutations additionally
//! pass through an async write gate, so a hotkey capture that would otherwise
//! stall behind a long sweep can give up with [`StoreError::Busy`] before it
//! has produced any side effects.
//!
//! Inserts and deletes keep the image file and its index row in step: a
//! failed insert removes the file it just wrote, and a delete that cannot
//! remove the file rolls the row back.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex as StdMutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error, warn};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, oneshot};

use super::migrations::run_migrations;
use super::record::{Page, RecordDraft, RecordId, ScreenshotRecord, SearchQuery, StoreError};

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreCommand {
    Execute(StoreTask),
    Shutdown,
}

struct StoreInner {
    sender: mpsc::Sender<StoreCommand>,
    worker: StdMutex<Option<JoinHandle<()>>>,
    write_gate: AsyncMutex<()>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let _ = self.sender.send(StoreCommand::Shutdown);
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("History store worker panicked during shutdown");
            }
        }
    }
}

/// Handle to the history store. Cloning is cheap; all clones share the same
/// worker thread and write gate.
#[derive(Clone)]
pub struct HistoryStore {
    inner: Arc<StoreInner>,
    db_path: Arc<PathBuf>,
}

impl HistoryStore {
    /// Opens (creating if necessary) the database at `db_path` and starts the
    /// worker thread. Fails if the file was written by a newer schema.
    pub fn open(db_path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), StoreError>>();
        let worker_path = db_path.clone();

        let handle = thread::Builder::new()
            .name("snapvault-history".to_string())
            .spawn(move || {
                let mut conn = match Connection::open(&worker_path) {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.into()));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    warn!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    warn!("Failed to enable foreign keys: {err}");
                }
                if let Err(err) = conn.busy_timeout(Duration::from_secs(5)) {
                    warn!("Failed to set SQLite busy timeout: {err}");
                }

                let init = run_migrations(&mut conn);
                let init_failed = init.is_err();
                if ready_tx.send(init).is_err() {
                    error!("History store opener went away before the ready signal");
                    return;
                }
                if init_failed {
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StoreCommand::Execute(task) => task(&mut conn),
                        StoreCommand::Shutdown => break,
                    }
                }
                debug!("History store worker stopped");
            })?;

        ready_rx.recv().map_err(|_| StoreError::WorkerGone)??;

        Ok(Self {
            inner: Arc::new(StoreInner {
                sender: command_tx,
                worker: StdMutex::new(Some(handle)),
                write_gate: AsyncMutex::new(()),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Writes `bytes` to the draft's destination and indexes it, returning the
    /// completed record. Either both halves happen or neither does.
    ///
    /// With a `busy_timeout`, waiting longer than that for another writer
    /// returns [`StoreError::Busy`] without touching disk. `None` waits
    /// indefinitely.
    pub async fn insert(
        &self,
        draft: RecordDraft,
        bytes: Vec<u8>,
        busy_timeout: Option<Duration>,
    ) -> Result<ScreenshotRecord, StoreError> {
        let _gate = self.acquire_write_gate(busy_timeout).await?;
        self.execute(move |conn| insert_record(conn, draft, bytes))
            .await
    }

    pub async fn get(&self, id: RecordId) -> Result<ScreenshotRecord, StoreError> {
        self.execute(move |conn| fetch_record(conn, id)).await
    }

    /// Matching records, newest first. Ordering ties on `created_at` break by
    /// descending id, so pagination is stable.
    pub async fn search(
        &self,
        query: SearchQuery,
        page: Page,
    ) -> Result<Vec<ScreenshotRecord>, StoreError> {
        self.execute(move |conn| search_records(conn, &query, &page))
            .await
    }

    /// Removes the record and its file. The row only goes away if the file
    /// could be removed (a file that is already gone counts as removed).
    pub async fn delete(
        &self,
        id: RecordId,
        busy_timeout: Option<Duration>,
    ) -> Result<(), StoreError> {
        let _gate = self.acquire_write_gate(busy_timeout).await?;
        self.execute(move |conn| delete_record(conn, id)).await
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        self.execute(|conn| {
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM screenshots", [], |row| {
                row.get(0)
            })?;
            Ok(total.max(0) as u64)
        })
        .await
    }

    /// Ids of records created strictly before `cutoff`, oldest first.
    pub async fn expired_ids(&self, cutoff: DateTime<Utc>) -> Result<Vec<RecordId>, StoreError> {
        let cutoff_text = format_timestamp(&cutoff);
        self.execute(move |conn| expired_before(conn, &cutoff_text))
            .await
    }

    /// Ids of the oldest records beyond `max_count`, oldest first. Empty when
    /// the store holds `max_count` records or fewer.
    pub async fn overflow_ids(&self, max_count: u64) -> Result<Vec<RecordId>, StoreError> {
        self.execute(move |conn| overflow_of(conn, max_count)).await
    }

    async fn acquire_write_gate(
        &self,
        busy_timeout: Option<Duration>,
    ) -> Result<MutexGuard<'_, ()>, StoreError> {
        match busy_timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.write_gate.lock())
                .await
                .map_err(|_| StoreError::Busy),
            None => Ok(self.inner.write_gate.lock().await),
        }
    }

    #[cfg(test)]
    pub(crate) async fn hold_write_gate(&self) -> MutexGuard<'_, ()> {
        self.inner.write_gate.lock().await
    }

    async fn execute<F, T>(&self, task: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = StoreCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                debug!("History store caller went away before its result");
            }
        }));
        self.inner
            .sender
            .send(command)
            .map_err(|_| StoreError::WorkerGone)?;
        reply_rx.await.map_err(|_| StoreError::WorkerGone)?
    }
}

fn insert_record(
    conn: &mut Connection,
    draft: RecordDraft,
    bytes: Vec<u8>,
) -> Result<ScreenshotRecord, StoreError> {
    let path = draft.file_path.clone();

    // Refusing an existing destination up front means the rollback below can
    // never remove a file that belongs to someone else.
    if path.exists() {
        return Err(StoreError::DestinationExists(path));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Err(err) = std::fs::write(&path, &bytes) {
        remove_file_best_effort(&path);
        return Err(err.into());
    }

    let file_size = bytes.len() as u64;
    let created_at = format_timestamp(&draft.created_at);
    let inserted = conn.execute(
        "INSERT INTO screenshots \
         (file_path, created_at, mode, window_title, application_name, \
          width, height, file_size, format) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            path.to_string_lossy(),
            created_at,
            draft.mode,
            draft.window_title,
            draft.application_name,
            draft.width as i64,
            draft.height as i64,
            file_size as i64,
            draft.format,
        ],
    );
    if let Err(err) = inserted {
        remove_file_best_effort(&path);
        return Err(err.into());
    }

    let id = conn.last_insert_rowid();
    debug!("Archived {} as record {id}", path.display());

    Ok(ScreenshotRecord {
        id,
        file_path: draft.file_path,
        created_at: draft.created_at,
        mode: draft.mode,
        window_title: draft.window_title,
        application_name: draft.application_name,
        width: draft.width,
        height: draft.height,
        file_size,
        format: draft.format,
    })
}

fn delete_record(conn: &mut Connection, id: RecordId) -> Result<(), StoreError> {
    let tx = conn.transaction()?;

    let path: Option<String> = tx
        .query_row(
            "SELECT file_path FROM screenshots WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(path) = path else {
        return Err(StoreError::NotFound(id));
    };

    tx.execute("DELETE FROM screenshots WHERE id = ?1", params![id])?;

    match std::fs::remove_file(&path) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("Backing file {path} was already gone");
        }
        // Returning drops the transaction, which puts the row back.
        Err(err) => return Err(err.into()),
    }

    tx.commit()?;
    debug!("Deleted record {id} ({path})");
    Ok(())
}

fn fetch_record(conn: &mut Connection, id: RecordId) -> Result<ScreenshotRecord, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, file_path, created_at, mode, window_title, application_name, \
         width, height, file_size, format \
         FROM screenshots WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => record_from_row(row),
        None => Err(StoreError::NotFound(id)),
    }
}

fn search_records(
    conn: &mut Connection,
    query: &SearchQuery,
    page: &Page,
) -> Result<Vec<ScreenshotRecord>, StoreError> {
    let mut sql = String::from(
        "SELECT id, file_path, created_at, mode, window_title, application_name, \
         width, height, file_size, format FROM screenshots",
    );
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<String> = Vec::new();

    if let Some(text) = &query.text {
        let pattern = format!("%{text}%");
        clauses.push("(window_title LIKE ? OR application_name LIKE ? OR file_path LIKE ?)");
        args.push(pattern.clone());
        args.push(pattern.clone());
        args.push(pattern);
    }
    if let Some(application) = &query.application {
        clauses.push("application_name LIKE ?");
        args.push(format!("%{application}%"));
    }
    if let Some(since) = &query.since {
        clauses.push("created_at >= ?");
        args.push(format_timestamp(since));
    }
    if let Some(until) = &query.until {
        clauses.push("created_at <= ?");
        args.push(format_timestamp(until));
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC, id DESC");
    // Pagination values are plain integers and go straight into the SQL.
    sql.push_str(&format!(" LIMIT {} OFFSET {}", page.limit, page.offset));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(record_from_row(row)?);
    }
    Ok(records)
}

fn expired_before(conn: &mut Connection, cutoff_text: &str) -> Result<Vec<RecordId>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM screenshots WHERE created_at < ?1 ORDER BY created_at ASC, id ASC",
    )?;
    let mut rows = stmt.query(params![cutoff_text])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get(0)?);
    }
    Ok(ids)
}

fn overflow_of(conn: &mut Connection, max_count: u64) -> Result<Vec<RecordId>, StoreError> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM screenshots", [], |row| row.get(0))?;
    let excess = (total.max(0) as u64).saturating_sub(max_count);
    if excess == 0 {
        return Ok(Vec::new());
    }

    let mut stmt =
        conn.prepare("SELECT id FROM screenshots ORDER BY created_at ASC, id ASC LIMIT ?1")?;
    let mut rows = stmt.query(params![excess as i64])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get(0)?);
    }
    Ok(ids)
}

fn record_from_row(row: &rusqlite::Row<'_>) -> Result<ScreenshotRecord, StoreError> {
    let created_text: String = row.get(2)?;
    Ok(ScreenshotRecord {
        id: row.get(0)?,
        file_path: PathBuf::from(row.get::<_, String>(1)?),
        created_at: parse_timestamp(&created_text)?,
        mode: row.get(3)?,
        window_title: row.get(4)?,
        application_name: row.get(5)?,
        width: to_u32(row.get(6)?, "width")?,
        height: to_u32(row.get(7)?, "height")?,
        file_size: to_u64(row.get(8)?, "file_size")?,
        format: row.get(9)?,
    })
}

/// Fixed-width RFC 3339 in UTC, so string comparison in SQL matches
/// chronological order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| StoreError::Corrupt(format!("bad timestamp {text:?}: {err}")))
}

fn to_u32(value: i64, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn to_u64(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn remove_file_best_effort(path: &Path) {
    if let Err(err) = std::fs::remove_file(path)
        && err.kind() != ErrorKind::NotFound
    {
        warn!(
            "Failed to remove {} while rolling back an insert: {err}",
            path.display()
        );
    }
}
