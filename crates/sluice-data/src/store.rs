//! SQLite-backed repository for torrents and their tracked files.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{FromRow, Row};
use tracing::info;

use crate::error::{DataError, Result};
use crate::model::{FileItem, FileStatus, NewTorrent, TORRENT_STATUS_PROCESSING, TorrentRecord};
use crate::retry::{RetryError, RetryPolicy};

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_CONNECTIONS: u32 = 8;

const INSERT_TORRENT: &str = r"
    INSERT INTO torrents (hash, name, status, total_size, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT (hash) DO NOTHING
";

const INSERT_FILE: &str = r"
    INSERT INTO files (torrent_hash, file_index, path, rel_path, size, status)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
";

const SELECT_TORRENTS: &str = r"
    SELECT hash, name, status, total_size, created_at
    FROM torrents
    ORDER BY created_at, hash
";

const SELECT_TORRENT_HASHES: &str = r"SELECT hash FROM torrents";

const TORRENT_EXISTS: &str = r"SELECT EXISTS (SELECT 1 FROM torrents WHERE hash = ?1)";

const SELECT_FILES_FOR_TORRENT: &str = r"
    SELECT id, torrent_hash, file_index, path, rel_path, size, status, started_at, failed_reason
    FROM files
    WHERE torrent_hash = ?1
    ORDER BY file_index
";

const SELECT_FILES_WITH_STATUS: &str = r"
    SELECT id, torrent_hash, file_index, path, rel_path, size, status, started_at, failed_reason
    FROM files
    WHERE status = ?1
    ORDER BY id
";

const SELECT_FILE: &str = r"
    SELECT id, torrent_hash, file_index, path, rel_path, size, status, started_at, failed_reason
    FROM files
    WHERE id = ?1
";

const TRANSITION_FILE: &str = r"
    UPDATE files
    SET status = ?1,
        failed_reason = COALESCE(?2, failed_reason)
    WHERE id = ?3 AND status = ?4
";

const MARK_STARTED: &str = r"
    UPDATE files
    SET started_at = ?1
    WHERE id = ?2 AND status = ?3 AND started_at = 0
";

const DELETE_FILES_FOR_TORRENT: &str = r"DELETE FROM files WHERE torrent_hash = ?1";

const DELETE_TORRENT: &str = r"DELETE FROM torrents WHERE hash = ?1";

const STATUS_COUNTS: &str = r"SELECT status, COUNT(*) AS total FROM files GROUP BY status";

const REQUEUE_UPLOADS: &str = r"UPDATE files SET status = ?1 WHERE status = ?2";

/// Repository over the Sluice state database.
///
/// Clones share the same connection pool.
#[derive(Clone, Debug)]
pub struct StateStore {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl StateStore {
    /// Open (creating if needed) the database file and apply migrations.
    ///
    /// The database runs in WAL mode with `synchronous = NORMAL` and a 30 second
    /// busy timeout so readers never block the single writer for long.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or migrations fail.
    pub async fn open(path: impl AsRef<Path>, retry: RetryPolicy) -> Result<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|source| DataError::ConnectFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Self::with_pool(pool, retry).await
    }

    /// Wrap an existing pool, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn with_pool(pool: SqlitePool, retry: RetryPolicy) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|source| DataError::MigrationFailed { source })?;
        Ok(Self { pool, retry })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Retry policy applied to mutations.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Cheap reachability probe.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be queried.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DataError::query("ping"))?;
        Ok(())
    }

    async fn mutate<T, F, Fut>(&self, operation: &'static str, action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry
            .run(operation, DataError::is_contention, action)
            .await
            .map_err(|err| match err {
                RetryError::Fatal(err) => err,
                RetryError::Exhausted {
                    operation,
                    attempts,
                    last,
                } => DataError::RetriesExhausted {
                    operation,
                    attempts,
                    source: Box::new(last),
                },
            })
    }

    /// Insert a torrent and its files in one transaction.
    ///
    /// Returns `false` without touching anything when the hash is already stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails after retries.
    pub async fn insert_torrent(&self, torrent: &NewTorrent) -> Result<bool> {
        self.mutate("insert_torrent", || self.insert_torrent_once(torrent))
            .await
    }

    async fn insert_torrent_once(&self, torrent: &NewTorrent) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(DataError::query("insert_torrent.begin"))?;
        let inserted = sqlx::query(INSERT_TORRENT)
            .bind(&torrent.hash)
            .bind(&torrent.name)
            .bind(TORRENT_STATUS_PROCESSING)
            .bind(clamp_i64(torrent.total_size))
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(DataError::query("insert_torrent"))?
            .rows_affected();
        if inserted == 0 {
            tx.rollback()
                .await
                .map_err(DataError::query("insert_torrent.rollback"))?;
            return Ok(false);
        }
        for file in &torrent.files {
            sqlx::query(INSERT_FILE)
                .bind(&torrent.hash)
                .bind(i64::from(file.file_index))
                .bind(&file.path)
                .bind(&file.rel_path)
                .bind(clamp_i64(file.size))
                .bind(FileStatus::Waiting.code())
                .execute(&mut *tx)
                .await
                .map_err(DataError::query("insert_file"))?;
        }
        tx.commit()
            .await
            .map_err(DataError::query("insert_torrent.commit"))?;
        Ok(true)
    }

    /// Whether a torrent with `hash` is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn torrent_exists(&self, hash: &str) -> Result<bool> {
        let exists: i64 = sqlx::query_scalar(TORRENT_EXISTS)
            .bind(hash)
            .fetch_one(&self.pool)
            .await
            .map_err(DataError::query("torrent_exists"))?;
        Ok(exists != 0)
    }

    /// Hashes of every stored torrent.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn torrent_hashes(&self) -> Result<HashSet<String>> {
        let hashes: Vec<String> = sqlx::query_scalar(SELECT_TORRENT_HASHES)
            .fetch_all(&self.pool)
            .await
            .map_err(DataError::query("torrent_hashes"))?;
        Ok(hashes.into_iter().collect())
    }

    /// All stored torrents, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_torrents(&self) -> Result<Vec<TorrentRecord>> {
        let rows = sqlx::query_as::<_, TorrentRow>(SELECT_TORRENTS)
            .fetch_all(&self.pool)
            .await
            .map_err(DataError::query("list_torrents"))?;
        Ok(rows.into_iter().map(TorrentRecord::from).collect())
    }

    /// Tracked files of a torrent ordered by engine index.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn files_for_torrent(&self, hash: &str) -> Result<Vec<FileItem>> {
        let rows = sqlx::query_as::<_, FileRow>(SELECT_FILES_FOR_TORRENT)
            .bind(hash)
            .fetch_all(&self.pool)
            .await
            .map_err(DataError::query("files_for_torrent"))?;
        rows.into_iter().map(FileItem::try_from).collect()
    }

    /// Files holding `status`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn files_with_status(&self, status: FileStatus) -> Result<Vec<FileItem>> {
        let rows = sqlx::query_as::<_, FileRow>(SELECT_FILES_WITH_STATUS)
            .bind(status.code())
            .fetch_all(&self.pool)
            .await
            .map_err(DataError::query("files_with_status"))?;
        rows.into_iter().map(FileItem::try_from).collect()
    }

    /// Fetch one file by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn file(&self, id: i64) -> Result<Option<FileItem>> {
        let row = sqlx::query_as::<_, FileRow>(SELECT_FILE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DataError::query("file"))?;
        row.map(FileItem::try_from).transpose()
    }

    /// Compare-and-set a file from `from` to `to`, optionally recording `reason`.
    ///
    /// Returns `false` when the file no longer holds `from` (another writer won).
    /// Reaching `Done` clears any reason left by an earlier failed upload.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::IllegalTransition`] for moves outside the lifecycle,
    /// or a query error after retries.
    pub async fn transition(
        &self,
        id: i64,
        from: FileStatus,
        to: FileStatus,
        reason: Option<&str>,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(DataError::IllegalTransition {
                file_id: id,
                from,
                to,
            });
        }
        let reason = if to == FileStatus::Done { Some("") } else { reason };
        self.mutate("transition", || async move {
            let updated = sqlx::query(TRANSITION_FILE)
                .bind(to.code())
                .bind(reason)
                .bind(id)
                .bind(from.code())
                .execute(&self.pool)
                .await
                .map_err(DataError::query("transition"))?
                .rows_affected();
            Ok(updated == 1)
        })
        .await
    }

    /// Compare-and-set several files in one transaction, returning the ids that moved.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::IllegalTransition`] for moves outside the lifecycle,
    /// or a query error after retries.
    pub async fn transition_many(
        &self,
        ids: &[i64],
        from: FileStatus,
        to: FileStatus,
    ) -> Result<Vec<i64>> {
        if !from.can_transition_to(to) {
            return Err(DataError::IllegalTransition {
                file_id: ids.first().copied().unwrap_or_default(),
                from,
                to,
            });
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.mutate("transition_many", || self.transition_many_once(ids, from, to))
            .await
    }

    async fn transition_many_once(
        &self,
        ids: &[i64],
        from: FileStatus,
        to: FileStatus,
    ) -> Result<Vec<i64>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(DataError::query("transition_many.begin"))?;
        let mut moved = Vec::with_capacity(ids.len());
        for &id in ids {
            let updated = sqlx::query(TRANSITION_FILE)
                .bind(to.code())
                .bind(None::<&str>)
                .bind(id)
                .bind(from.code())
                .execute(&mut *tx)
                .await
                .map_err(DataError::query("transition_many"))?
                .rows_affected();
            if updated == 1 {
                moved.push(id);
            }
        }
        tx.commit()
            .await
            .map_err(DataError::query("transition_many.commit"))?;
        Ok(moved)
    }

    /// Stamp the first observed download time; no-op once set or after the
    /// file left `Downloading`.
    ///
    /// # Errors
    ///
    /// Returns a query error after retries.
    pub async fn mark_started(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let started = to_epoch_seconds(at);
        self.mutate("mark_started", || async move {
            let updated = sqlx::query(MARK_STARTED)
                .bind(started)
                .bind(id)
                .bind(FileStatus::Downloading.code())
                .execute(&self.pool)
                .await
                .map_err(DataError::query("mark_started"))?
                .rows_affected();
            Ok(updated == 1)
        })
        .await
    }

    /// Remove a torrent and every file row it owns.
    ///
    /// # Errors
    ///
    /// Returns a query error after retries.
    pub async fn delete_torrent(&self, hash: &str) -> Result<bool> {
        self.mutate("delete_torrent", || async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(DataError::query("delete_torrent.begin"))?;
            sqlx::query(DELETE_FILES_FOR_TORRENT)
                .bind(hash)
                .execute(&mut *tx)
                .await
                .map_err(DataError::query("delete_torrent.files"))?;
            let removed = sqlx::query(DELETE_TORRENT)
                .bind(hash)
                .execute(&mut *tx)
                .await
                .map_err(DataError::query("delete_torrent"))?
                .rows_affected();
            tx.commit()
                .await
                .map_err(DataError::query("delete_torrent.commit"))?;
            Ok(removed == 1)
        })
        .await
    }

    /// Number of files per status; statuses with no files are reported as zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn status_counts(&self) -> Result<BTreeMap<FileStatus, u64>> {
        let rows = sqlx::query(STATUS_COUNTS)
            .fetch_all(&self.pool)
            .await
            .map_err(DataError::query("status_counts"))?;
        let mut counts: BTreeMap<FileStatus, u64> =
            FileStatus::ALL.into_iter().map(|status| (status, 0)).collect();
        for row in rows {
            let code: i64 = row.try_get("status").map_err(DataError::query("status_counts"))?;
            let total: i64 = row.try_get("total").map_err(DataError::query("status_counts"))?;
            let status =
                FileStatus::from_code(code).ok_or(DataError::UnknownStatus { file_id: 0, code })?;
            counts.insert(status, u64::try_from(total).unwrap_or_default());
        }
        Ok(counts)
    }

    /// Move files a previous process left `Uploading` back to `Ready`.
    ///
    /// # Errors
    ///
    /// Returns a query error after retries.
    pub async fn requeue_interrupted_uploads(&self) -> Result<u64> {
        let requeued = self
            .mutate("requeue_interrupted_uploads", || async move {
                let result = sqlx::query(REQUEUE_UPLOADS)
                    .bind(FileStatus::Ready.code())
                    .bind(FileStatus::Uploading.code())
                    .execute(&self.pool)
                    .await
                    .map_err(DataError::query("requeue_interrupted_uploads"))?;
                Ok(result.rows_affected())
            })
            .await?;
        if requeued > 0 {
            info!(requeued, "requeued uploads interrupted by a previous run");
        }
        Ok(requeued)
    }
}

#[derive(Debug, FromRow)]
struct TorrentRow {
    hash: String,
    name: String,
    status: String,
    total_size: i64,
    created_at: DateTime<Utc>,
}

impl From<TorrentRow> for TorrentRecord {
    fn from(row: TorrentRow) -> Self {
        Self {
            hash: row.hash,
            name: row.name,
            status: row.status,
            total_size: u64::try_from(row.total_size).unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct FileRow {
    id: i64,
    torrent_hash: String,
    file_index: i64,
    path: String,
    rel_path: String,
    size: i64,
    status: i64,
    started_at: f64,
    failed_reason: String,
}

impl TryFrom<FileRow> for FileItem {
    type Error = DataError;

    fn try_from(row: FileRow) -> Result<Self> {
        let status = FileStatus::from_code(row.status).ok_or(DataError::UnknownStatus {
            file_id: row.id,
            code: row.status,
        })?;
        Ok(Self {
            id: row.id,
            torrent_hash: row.torrent_hash,
            file_index: u32::try_from(row.file_index).unwrap_or_default(),
            path: row.path,
            rel_path: row.rel_path,
            size: u64::try_from(row.size).unwrap_or_default(),
            status,
            started_at: from_epoch_seconds(row.started_at),
            failed_reason: row.failed_reason,
        })
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[allow(clippy::cast_precision_loss)]
fn to_epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

#[allow(clippy::cast_possible_truncation)]
fn from_epoch_seconds(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    DateTime::from_timestamp_millis((value * 1000.0).round() as i64)
}
