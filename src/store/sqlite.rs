// ABOUTME: SQLite-backed deployment store using rusqlite.
// ABOUTME: Records and their append-only logs live in two tables of one database file.

use async_trait::async_trait;
use chrono::SecondsFormat;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::deploy::{DeploymentRecord, LogEntry};
use crate::types::{DeploymentId, ProjectId};

use super::{DeploymentStore, StoreError, StoreKind};

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS deployments (
    id          TEXT PRIMARY KEY NOT NULL,
    project_id  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    data        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_deployments_project
    ON deployments (project_id, created_at);

CREATE TABLE IF NOT EXISTS deployment_logs (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    deployment_id  TEXT NOT NULL REFERENCES deployments (id) ON DELETE CASCADE,
    data           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_deployment_logs_deployment
    ON deployment_logs (deployment_id, seq);
";

/// Stores deployments in a single SQLite file.
///
/// The `deployments` table holds the serialized record (without logs) plus
/// denormalized `project_id` / `created_at` columns for filtering and
/// ordering. Logs go to `deployment_logs`, ordered by an autoincrement key.
/// All rusqlite calls run on the blocking pool.
pub struct SqliteStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish()
    }
}

impl SqliteStore {
    /// Open the database, creating the file (and parent directory) if missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::backend_unavailable(&path, e))?;
        }
        Self::open_with_flags(path, OpenFlags::default()).await
    }

    /// Open an existing database; fails with `BackendUnavailable` instead of
    /// creating a new file.
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Self::open_with_flags(path.as_ref().to_path_buf(), flags).await
    }

    /// Open an existing database read-only without touching its schema.
    /// Fails with `BackendUnavailable` when the deployment tables are missing.
    pub async fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || {
            let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            let conn = Connection::open_with_flags(&open_path, flags)
                .map_err(|e| StoreError::backend_unavailable(&open_path, e))?;
            let tables: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master
                     WHERE type = 'table' AND name IN ('deployments', 'deployment_logs')",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| StoreError::backend_unavailable(&open_path, e))?;
            if tables != 2 {
                return Err(StoreError::backend_unavailable(
                    &open_path,
                    "not a deployment database",
                ));
            }
            Ok::<_, StoreError>(conn)
        })
        .await??;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn open_with_flags(path: PathBuf, flags: OpenFlags) -> Result<Self, StoreError> {
        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open_with_flags(&open_path, flags)
                .map_err(|e| StoreError::backend_unavailable(&open_path, e))?;
            conn.execute_batch(SCHEMA)
                .map_err(|e| StoreError::backend_unavailable(&open_path, e))?;
            Ok::<_, StoreError>(conn)
        })
        .await??;

        tracing::debug!("opened SQLite store at {}", path.display());
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the connection, releasing the database file.
    pub async fn close(self) -> Result<(), StoreError> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| StoreError::Task("connection still in use".to_string()))?
            .into_inner();
        tokio::task::spawn_blocking(move || conn.close().map_err(|(_, e)| StoreError::from(e)))
            .await?
    }

    /// Number of stored deployments.
    pub async fn count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM deployments", [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or_default())
        })
        .await
    }

    /// Whether a deployment with `id` is stored.
    pub async fn contains(&self, id: &DeploymentId) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| deployment_exists(conn, &id)).await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await?
    }
}

fn deployment_exists(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM deployments WHERE id = ?1",
            params![id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn load_logs(conn: &Connection, id: &str) -> Result<Vec<LogEntry>, StoreError> {
    let mut stmt =
        conn.prepare_cached("SELECT data FROM deployment_logs WHERE deployment_id = ?1 ORDER BY seq")?;
    let rows = stmt
        .query_map(params![id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    rows.iter()
        .map(|data| serde_json::from_str(data).map_err(StoreError::from))
        .collect()
}

fn hydrate(conn: &Connection, data: &str) -> Result<DeploymentRecord, StoreError> {
    let mut record: DeploymentRecord = serde_json::from_str(data)?;
    record.logs = load_logs(conn, record.id.as_str())?;
    Ok(record)
}

#[async_trait]
impl DeploymentStore for SqliteStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Database
    }

    async fn save_deployment(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        let mut stored = record.clone();
        let logs = std::mem::take(&mut stored.logs);
        let data = serde_json::to_string(&stored)?;
        let log_rows = logs
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        let id = stored.id.to_string();
        let project_id = stored.project_id.to_string();
        let created_at = stored.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true);

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO deployments (id, project_id, created_at, data)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (id) DO UPDATE SET
                     project_id = excluded.project_id,
                     created_at = excluded.created_at,
                     data = excluded.data",
                params![id, project_id, created_at, data],
            )?;
            tx.execute(
                "DELETE FROM deployment_logs WHERE deployment_id = ?1",
                params![id],
            )?;
            {
                let mut insert = tx.prepare_cached(
                    "INSERT INTO deployment_logs (deployment_id, data) VALUES (?1, ?2)",
                )?;
                for row in &log_rows {
                    insert.execute(params![id, row])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_deployment(
        &self,
        id: &DeploymentId,
    ) -> Result<Option<DeploymentRecord>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let data: Option<String> = conn
                .query_row(
                    "SELECT data FROM deployments WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            data.map(|data| hydrate(conn, &data)).transpose()
        })
        .await
    }

    async fn list_deployments(
        &self,
        project_id: Option<&ProjectId>,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        let project_id = project_id.map(ToString::to_string);
        self.with_conn(move |conn| {
            let rows: Vec<String> = match &project_id {
                Some(project_id) => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT data FROM deployments WHERE project_id = ?1
                         ORDER BY created_at, rowid",
                    )?;
                    let rows = stmt
                        .query_map(params![project_id], |row| row.get(0))?
                        .collect::<Result<_, _>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn
                        .prepare_cached("SELECT data FROM deployments ORDER BY created_at, rowid")?;
                    let rows = stmt
                        .query_map([], |row| row.get(0))?
                        .collect::<Result<_, _>>()?;
                    rows
                }
            };
            rows.iter().map(|data| hydrate(conn, data)).collect()
        })
        .await
    }

    async fn append_log(&self, id: &DeploymentId, entry: &LogEntry) -> Result<(), StoreError> {
        let deployment_id = id.clone();
        let id = id.to_string();
        let data = serde_json::to_string(entry)?;
        self.with_conn(move |conn| {
            if !deployment_exists(conn, &id)? {
                return Err(StoreError::NotFound(deployment_id));
            }
            conn.execute(
                "INSERT INTO deployment_logs (deployment_id, data) VALUES (?1, ?2)",
                params![id, data],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_deployment_history(&self, id: &DeploymentId) -> Result<Vec<LogEntry>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| load_logs(conn, &id)).await
    }
}
