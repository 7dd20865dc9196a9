use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock},
};

use afb_core::{
    domain::{BannedSets, ChatId, MediaFile, MessageId},
    ports::{SaveOutcome, Store},
    Error, Result,
};
use async_trait::async_trait;
use regex::Regex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tokio::sync::OnceCell;
use tracing::{debug, info};

static SEPARATORS: OnceLock<Regex> = OnceLock::new();
static IDENTIFIER: OnceLock<Regex> = OnceLock::new();

/// File names are stored with `_ - . +` turned into spaces so word search works.
pub fn normalize_file_name(name: &str) -> String {
    let re = SEPARATORS.get_or_init(|| Regex::new(r"[_\-.+]").expect("valid regex"));
    re.replace_all(name, " ").trim().to_string()
}

fn is_identifier(name: &str) -> bool {
    IDENTIFIER
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
        .is_match(name)
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

fn schema_sql(collection: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS banned_users (id INTEGER PRIMARY KEY, reason TEXT);
         CREATE TABLE IF NOT EXISTS banned_chats (id INTEGER PRIMARY KEY, reason TEXT);
         CREATE TABLE IF NOT EXISTS {collection} (
             file_id    TEXT NOT NULL,
             file_name  TEXT NOT NULL,
             file_size  INTEGER NOT NULL,
             mime_type  TEXT,
             caption    TEXT,
             chat_id    INTEGER NOT NULL,
             message_id INTEGER NOT NULL
         );"
    )
}

/// One SQLite file holding the banned lists and the media collection.
///
/// The file is opened on first use, so a missing or unreadable database shows
/// up during startup hydration as [`Error::DependencyUnavailable`]. rusqlite is
/// blocking, so every call hops onto `spawn_blocking` and takes the connection
/// mutex there.
#[derive(Clone)]
pub struct SqliteStore {
    path: PathBuf,
    conn: Arc<OnceCell<Arc<Mutex<Connection>>>>,
    collection: String,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// A store for `path` that connects on first use. Only the collection name
    /// is checked here.
    pub fn lazy(path: &Path, collection: &str) -> Result<Self> {
        if !is_identifier(collection) {
            return Err(Error::Config(format!(
                "collection name {collection:?} is not a valid identifier"
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            conn: Arc::new(OnceCell::new()),
            collection: collection.to_string(),
        })
    }

    /// Open (or create) the database and its tables now. Indexes are left to
    /// [`Store::ensure_indexes`].
    pub async fn open(path: &Path, collection: &str) -> Result<Self> {
        let store = Self::lazy(path, collection)?;
        store.connection().await?;
        Ok(store)
    }

    pub async fn in_memory(collection: &str) -> Result<Self> {
        Self::open(Path::new(":memory:"), collection).await
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn connection(&self) -> Result<Arc<Mutex<Connection>>> {
        self.conn
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let schema = schema_sql(&self.collection);
                let conn = tokio::task::spawn_blocking(move || {
                    let conn = Connection::open(&path)?;
                    conn.execute_batch(&schema)?;
                    Ok::<_, rusqlite::Error>(conn)
                })
                .await
                .map_err(|e| Error::Database(format!("open task failed: {e}")))?
                .map_err(|e| Error::DependencyUnavailable(format!("sqlite open: {e}")))?;
                info!(path = %self.path.display(), "database opened");
                Ok(Arc::new(Mutex::new(conn)))
            })
            .await
            .cloned()
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.connection().await?;
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| Error::Database("connection mutex poisoned".to_string()))?;
            f(&guard).map_err(db_err)
        })
        .await
        .map_err(|e| Error::Database(format!("blocking task failed: {e}")))?
    }

    pub async fn ban_user(&self, user_id: i64, reason: Option<String>) -> Result<()> {
        self.with_conn(move |c| {
            c.execute(
                "INSERT OR REPLACE INTO banned_users (id, reason) VALUES (?1, ?2)",
                params![user_id, reason],
            )
            .map(|_| ())
        })
        .await
    }

    pub async fn ban_chat(&self, chat_id: i64, reason: Option<String>) -> Result<()> {
        self.with_conn(move |c| {
            c.execute(
                "INSERT OR REPLACE INTO banned_chats (id, reason) VALUES (?1, ?2)",
                params![chat_id, reason],
            )
            .map(|_| ())
        })
        .await
    }

    /// Look a file up by id.
    pub async fn get_file(&self, file_id: &str) -> Result<Option<MediaFile>> {
        let sql = format!(
            "SELECT file_id, file_name, file_size, mime_type, caption, chat_id, message_id
             FROM {} WHERE file_id = ?1",
            self.collection
        );
        let file_id = file_id.to_string();
        self.with_conn(move |c| c.query_row(&sql, [file_id], row_to_media).optional())
            .await
    }
}

fn row_to_media(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaFile> {
    Ok(MediaFile {
        file_id: row.get(0)?,
        file_name: row.get(1)?,
        file_size: row.get(2)?,
        mime_type: row.get(3)?,
        caption: row.get(4)?,
        chat_id: ChatId(row.get(5)?),
        message_id: MessageId(row.get(6)?),
    })
}

fn load_ids(c: &Connection, table: &str) -> rusqlite::Result<std::collections::HashSet<i64>> {
    let mut stmt = c.prepare(&format!("SELECT id FROM {table}"))?;
    let ids = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    ids.collect()
}

#[async_trait]
impl Store for SqliteStore {
    async fn load_banned(&self) -> Result<BannedSets> {
        self.with_conn(|c| {
            Ok(BannedSets {
                users: load_ids(c, "banned_users")?,
                chats: load_ids(c, "banned_chats")?,
            })
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.with_conn(|c| c.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .map(|_| ())
            .map_err(|e| Error::DependencyUnavailable(e.to_string()))
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let t = self.collection.clone();
        let sql = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {t}_file_id ON {t} (file_id);
             CREATE INDEX IF NOT EXISTS {t}_file_name ON {t} (file_name);"
        );
        self.with_conn(move |c| c.execute_batch(&sql)).await?;
        info!(collection = %self.collection, "indexes ensured");
        Ok(())
    }

    async fn save_media(&self, file: &MediaFile) -> Result<SaveOutcome> {
        let sql = format!(
            "INSERT OR IGNORE INTO {t}
                 (file_id, file_name, file_size, mime_type, caption, chat_id, message_id)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
             WHERE NOT EXISTS (SELECT 1 FROM {t} WHERE file_id = ?1)",
            t = self.collection
        );
        let mut file = file.clone();
        file.file_name = normalize_file_name(&file.file_name);

        let inserted = self
            .with_conn(move |c| {
                c.execute(
                    &sql,
                    params![
                        file.file_id,
                        file.file_name,
                        file.file_size,
                        file.mime_type,
                        file.caption,
                        file.chat_id.0,
                        file.message_id.0,
                    ],
                )
            })
            .await?;

        if inserted == 0 {
            debug!("media already saved");
            return Ok(SaveOutcome::Duplicate);
        }
        Ok(SaveOutcome::Saved)
    }

    /// Every word of `query` must appear in the (normalized) file name.
    async fn search_media(&self, query: &str, limit: usize) -> Result<Vec<MediaFile>> {
        let words: Vec<String> = normalize_file_name(query)
            .split_whitespace()
            .map(|w| format!("%{}%", w.replace('%', "").replace('_', "")))
            .filter(|w| w != "%%")
            .collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }

        let filter = (1..=words.len())
            .map(|i| format!("file_name LIKE ?{i}"))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!(
            "SELECT file_id, file_name, file_size, mime_type, caption, chat_id, message_id
             FROM {t} WHERE {filter} ORDER BY rowid DESC LIMIT {limit}",
            t = self.collection
        );

        self.with_conn(move |c| {
            let mut stmt = c.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(words.iter()), row_to_media)?;
            rows.collect()
        })
        .await
    }

    async fn count_media(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.collection);
        let n = self
            .with_conn(move |c| c.query_row(&sql, [], |row| row.get::<_, i64>(0)))
            .await?;
        Ok(n.max(0) as u64)
    }
}
