use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::models::{Folder, Report, ReportInput, Slide};
use crate::error::StoreError;

/// Local time as `YYYY-MM-DDTHH:MM:SS.ffffff`.
pub fn timestamp() -> String {
    chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// SQLite catalog shared by all request handlers.
///
/// A single connection sits behind a mutex; every operation runs on the
/// blocking pool so handlers never stall the runtime on disk I/O.
#[derive(Clone)]
pub struct MetadataStore {
    conn: Arc<Mutex<Connection>>,
}

impl MetadataStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Task(format!("{}: {}", parent.display(), e)))?;
        }
        let store = Self::from_connection(Connection::open(path)?)?;
        info!(path = %path.display(), "Metadata store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    // =========================================================================
    // Folders
    // =========================================================================

    /// All folders with their slide counts, oldest first.
    pub async fn list_folders(&self) -> Result<Vec<Folder>, StoreError> {
        self.call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT f.id, f.name, f.created_at, f.updated_at, COUNT(s.id)
                 FROM folder f
                 LEFT JOIN slide s ON s.folder_id = f.id
                 GROUP BY f.id
                 ORDER BY f.id",
            )?;
            let folders = stmt
                .query_map([], |row| {
                    Ok(Folder {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                        slide_count: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(folders)
        })
        .await
    }

    /// Create a folder, returning its id.
    pub async fn create_folder(&self, name: &str) -> Result<i64, StoreError> {
        let name = name.to_string();
        self.call(move |conn| {
            let now = timestamp();
            conn.execute(
                "INSERT INTO folder (name, created_at, updated_at) VALUES (?1, ?2, ?2)",
                params![name, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn rename_folder(&self, id: i64, name: &str) -> Result<(), StoreError> {
        let name = name.to_string();
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE folder SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, timestamp(), id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound {
                    entity: "folder",
                    id,
                });
            }
            Ok(())
        })
        .await
    }

    // =========================================================================
    // Slides
    // =========================================================================

    /// Slides in upload order, restricted to one folder when `folder_id` is set.
    pub async fn list_slides(&self, folder_id: Option<i64>) -> Result<Vec<Slide>, StoreError> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.filename, s.created_at, s.folder_id, f.name
                 FROM slide s
                 LEFT JOIN folder f ON f.id = s.folder_id
                 WHERE ?1 IS NULL OR s.folder_id = ?1
                 ORDER BY s.id",
            )?;
            let slides = stmt
                .query_map(params![folder_id], |row| {
                    Ok(Slide {
                        id: row.get(0)?,
                        filename: row.get(1)?,
                        created_at: row.get(2)?,
                        folder_id: row.get(3)?,
                        folder_name: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(slides)
        })
        .await
    }

    /// Record an uploaded slide, returning its id.
    ///
    /// Fails with `MissingReference` when `folder_id` names no folder.
    pub async fn insert_slide(
        &self,
        filename: &str,
        folder_id: Option<i64>,
    ) -> Result<i64, StoreError> {
        let filename = filename.to_string();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            if let Some(folder_id) = folder_id {
                if !exists(&tx, "SELECT 1 FROM folder WHERE id = ?1", folder_id)? {
                    return Err(StoreError::MissingReference {
                        entity: "folder",
                        id: folder_id,
                    });
                }
            }
            tx.execute(
                "INSERT INTO slide (filename, created_at, folder_id) VALUES (?1, ?2, ?3)",
                params![filename, timestamp(), folder_id],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(id)
        })
        .await
    }

    // =========================================================================
    // Reports
    // =========================================================================

    pub async fn list_reports(&self, slide_id: i64) -> Result<Vec<Report>, StoreError> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, content, created_at, updated_at
                 FROM report
                 WHERE slide_id = ?1
                 ORDER BY id",
            )?;
            let reports = stmt
                .query_map(params![slide_id], |row| {
                    Ok(Report {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        content: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(reports)
        })
        .await
    }

    /// Create or update a report of `slide_id`, returning the report id.
    ///
    /// Updates only match reports belonging to `slide_id`; anything else is
    /// `NotFound`. Creating a report for an unknown slide is
    /// `MissingReference`.
    pub async fn save_report(&self, slide_id: i64, input: ReportInput) -> Result<i64, StoreError> {
        self.call(move |conn| {
            let now = timestamp();
            match input.id {
                Some(id) => {
                    let changed = conn.execute(
                        "UPDATE report SET title = ?1, content = ?2, updated_at = ?3
                         WHERE id = ?4 AND slide_id = ?5",
                        params![input.title, input.content, now, id, slide_id],
                    )?;
                    if changed == 0 {
                        return Err(StoreError::NotFound {
                            entity: "report",
                            id,
                        });
                    }
                    Ok(id)
                }
                None => {
                    let tx = conn.transaction()?;
                    if !exists(&tx, "SELECT 1 FROM slide WHERE id = ?1", slide_id)? {
                        return Err(StoreError::MissingReference {
                            entity: "slide",
                            id: slide_id,
                        });
                    }
                    tx.execute(
                        "INSERT INTO report (slide_id, title, content, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?4)",
                        params![slide_id, input.title, input.content, now],
                    )?;
                    let id = tx.last_insert_rowid();
                    tx.commit()?;
                    Ok(id)
                }
            }
        })
        .await
    }
}

fn exists(conn: &Connection, sql: &str, id: i64) -> Result<bool, StoreError> {
    Ok(conn
        .query_row(sql, params![id], |_| Ok(()))
        .optional()?
        .is_some())
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS folder (
            id          INTEGER PRIMARY KEY,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS slide (
            id          INTEGER PRIMARY KEY,
            filename    TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            folder_id   INTEGER REFERENCES folder(id)
        );
        CREATE TABLE IF NOT EXISTS report (
            id          INTEGER PRIMARY KEY,
            slide_id    INTEGER NOT NULL REFERENCES slide(id),
            title       TEXT NOT NULL,
            content     TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_slide_folder ON slide(folder_id);
        CREATE INDEX IF NOT EXISTS idx_report_slide ON report(slide_id);",
    )?;
    Ok(())
}
