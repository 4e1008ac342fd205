//! SQLite implementation of the library store.
//!
//! One connection guarded by a mutex serves both plain reads and units of
//! work. A unit of work maps to a single transaction: the unit closure runs
//! against the open transaction and the transaction commits only when the
//! closure returns `Ok`.

use crate::config::StoreConfig;
use crate::error::{Result, WatariError};
use crate::library::store::{Store, StoreUnit, UnitFn};
use crate::library::types::{Chapter, HistoryEntry, LibraryRecord, Manga, MangaKey, TrackerLink};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// SQLite-backed library store.
pub struct SqliteStore {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create or open a library database at the given path.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| WatariError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        Ok(Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create a store backed by an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        Ok(Self {
            db_path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Configure connection with optimal settings.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout={};
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            ",
            StoreConfig::BUSY_TIMEOUT.as_millis()
        ))?;
        Ok(())
    }

    /// Ensure the base schema exists.
    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS library (
                source_id TEXT NOT NULL,
                manga_id TEXT NOT NULL,
                title TEXT,
                author TEXT,
                artist TEXT,
                description TEXT,
                cover_url TEXT,
                url TEXT,
                tags_json TEXT NOT NULL DEFAULT '[]',
                added_at TEXT NOT NULL,
                pinned_order INTEGER,
                PRIMARY KEY (source_id, manga_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chapters (
                source_id TEXT NOT NULL,
                manga_id TEXT NOT NULL,
                chapter_id TEXT NOT NULL,
                title TEXT,
                chapter_num REAL,
                volume_num REAL,
                scanlator TEXT,
                lang TEXT,
                source_order INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (source_id, manga_id, chapter_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS history (
                source_id TEXT NOT NULL,
                manga_id TEXT NOT NULL,
                chapter_id TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                progress REAL,
                last_read TEXT,
                PRIMARY KEY (source_id, manga_id, chapter_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tracker_links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tracker_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                manga_id TEXT NOT NULL,
                entry_id TEXT NOT NULL,
                UNIQUE (tracker_id, source_id, manga_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tracker_links_manga
             ON tracker_links(source_id, manga_id)",
            [],
        )?;

        Ok(())
    }

    /// Get the database path.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| WatariError::Database {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        })
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<LibraryRecord> {
        let tags_json: String = row.get(8)?;
        let tags: Vec<String> = serde_json::from_str(&tags_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;

        Ok(LibraryRecord {
            manga: Manga {
                key: MangaKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                title: row.get(2)?,
                author: row.get(3)?,
                artist: row.get(4)?,
                description: row.get(5)?,
                cover_url: row.get(6)?,
                url: row.get(7)?,
                tags,
            },
            added_at: parse_timestamp(row, 9)?,
            pinned_order: row.get(10)?,
        })
    }

    fn row_to_chapter(row: &Row) -> rusqlite::Result<Chapter> {
        Ok(Chapter {
            manga_key: MangaKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
            chapter_id: row.get(2)?,
            title: row.get(3)?,
            chapter_num: row.get::<_, Option<f64>>(4)?.map(|v| v as f32),
            volume_num: row.get::<_, Option<f64>>(5)?.map(|v| v as f32),
            scanlator: row.get(6)?,
            lang: row.get(7)?,
            source_order: row.get(8)?,
        })
    }

    fn row_to_history(row: &Row) -> rusqlite::Result<HistoryEntry> {
        Ok(HistoryEntry {
            manga_key: MangaKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
            chapter_id: row.get(2)?,
            completed: row.get(3)?,
            progress: row.get::<_, Option<f64>>(4)?.map(|v| v as f32),
            last_read: parse_timestamp_opt(row, 5)?,
        })
    }

    fn row_to_tracker_link(row: &Row) -> rusqlite::Result<TrackerLink> {
        Ok(TrackerLink {
            id: row.get(0)?,
            tracker_id: row.get(1)?,
            manga_key: MangaKey::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
            entry_id: row.get(4)?,
        })
    }
}

fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_timestamp_opt(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

// ============================================================================
// Queries shared between plain reads and units of work
// ============================================================================

fn query_record(conn: &Connection, key: &MangaKey) -> Result<Option<LibraryRecord>> {
    let result = conn
        .query_row(
            "SELECT source_id, manga_id, title, author, artist, description,
                    cover_url, url, tags_json, added_at, pinned_order
             FROM library WHERE source_id = ?1 AND manga_id = ?2",
            params![key.source_id.as_str(), key.manga_id],
            SqliteStore::row_to_record,
        )
        .optional()?;
    Ok(result)
}

fn query_records(conn: &Connection) -> Result<Vec<LibraryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT source_id, manga_id, title, author, artist, description,
                cover_url, url, tags_json, added_at, pinned_order
         FROM library ORDER BY added_at, source_id, manga_id",
    )?;
    let rows = stmt.query_map([], SqliteStore::row_to_record)?;
    let mut records = Vec::new();
    for record in rows {
        records.push(record?);
    }
    Ok(records)
}

fn query_chapters(conn: &Connection, key: &MangaKey) -> Result<Vec<Chapter>> {
    let mut stmt = conn.prepare(
        "SELECT source_id, manga_id, chapter_id, title, chapter_num, volume_num,
                scanlator, lang, source_order
         FROM chapters WHERE source_id = ?1 AND manga_id = ?2
         ORDER BY source_order",
    )?;
    let rows = stmt.query_map(
        params![key.source_id.as_str(), key.manga_id],
        SqliteStore::row_to_chapter,
    )?;
    let mut chapters = Vec::new();
    for chapter in rows {
        chapters.push(chapter?);
    }
    Ok(chapters)
}

fn query_history(conn: &Connection, key: &MangaKey) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT source_id, manga_id, chapter_id, completed, progress, last_read
         FROM history WHERE source_id = ?1 AND manga_id = ?2
         ORDER BY chapter_id",
    )?;
    let rows = stmt.query_map(
        params![key.source_id.as_str(), key.manga_id],
        SqliteStore::row_to_history,
    )?;
    let mut entries = Vec::new();
    for entry in rows {
        entries.push(entry?);
    }
    Ok(entries)
}

fn query_tracker_links(conn: &Connection, key: &MangaKey) -> Result<Vec<TrackerLink>> {
    let mut stmt = conn.prepare(
        "SELECT id, tracker_id, source_id, manga_id, entry_id
         FROM tracker_links WHERE source_id = ?1 AND manga_id = ?2
         ORDER BY id",
    )?;
    let rows = stmt.query_map(
        params![key.source_id.as_str(), key.manga_id],
        SqliteStore::row_to_tracker_link,
    )?;
    let mut links = Vec::new();
    for link in rows {
        links.push(link?);
    }
    Ok(links)
}

fn query_has_tracker_link(conn: &Connection, tracker_id: &str, key: &MangaKey) -> Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM tracker_links
            WHERE tracker_id = ?1 AND source_id = ?2 AND manga_id = ?3
        )",
        params![tracker_id, key.source_id.as_str(), key.manga_id],
        |row| row.get(0),
    )?;
    Ok(exists != 0)
}

impl Store for SqliteStore {
    fn get_record(&self, key: &MangaKey) -> Result<Option<LibraryRecord>> {
        let conn = self.lock_conn()?;
        query_record(&conn, key)
    }

    fn list_records(&self) -> Result<Vec<LibraryRecord>> {
        let conn = self.lock_conn()?;
        query_records(&conn)
    }

    fn chapters_for(&self, key: &MangaKey) -> Result<Vec<Chapter>> {
        let conn = self.lock_conn()?;
        query_chapters(&conn, key)
    }

    fn history_for(&self, key: &MangaKey) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock_conn()?;
        query_history(&conn, key)
    }

    fn tracker_links_for(&self, key: &MangaKey) -> Result<Vec<TrackerLink>> {
        let conn = self.lock_conn()?;
        query_tracker_links(&conn, key)
    }

    fn has_tracker_link(&self, tracker_id: &str, key: &MangaKey) -> Result<bool> {
        let conn = self.lock_conn()?;
        query_has_tracker_link(&conn, tracker_id, key)
    }

    fn with_unit(&self, f: UnitFn<'_>) -> Result<()> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let mut unit = SqliteUnit { tx };
        f(&mut unit)?;
        unit.tx.commit()?;
        Ok(())
    }
}

/// One open transaction on the library database.
struct SqliteUnit<'conn> {
    tx: Transaction<'conn>,
}

impl StoreUnit for SqliteUnit<'_> {
    fn get_record(&mut self, key: &MangaKey) -> Result<Option<LibraryRecord>> {
        query_record(&self.tx, key)
    }

    fn upsert_record(&mut self, record: &LibraryRecord) -> Result<()> {
        let manga = &record.manga;
        let tags_json = serde_json::to_string(&manga.tags)?;

        self.tx.execute(
            "INSERT INTO library (source_id, manga_id, title, author, artist, description,
                                  cover_url, url, tags_json, added_at, pinned_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(source_id, manga_id) DO UPDATE SET
                 title=excluded.title,
                 author=excluded.author,
                 artist=excluded.artist,
                 description=excluded.description,
                 cover_url=excluded.cover_url,
                 url=excluded.url,
                 tags_json=excluded.tags_json",
            params![
                manga.key.source_id.as_str(),
                manga.key.manga_id,
                manga.title,
                manga.author,
                manga.artist,
                manga.description,
                manga.cover_url,
                manga.url,
                tags_json,
                record.added_at.to_rfc3339(),
                record.pinned_order,
            ],
        )?;
        Ok(())
    }

    fn replace_record(&mut self, key: &MangaKey, manga: &Manga) -> Result<()> {
        let tags_json = serde_json::to_string(&manga.tags)?;

        let rows = self.tx.execute(
            "UPDATE library SET
                 source_id = ?1,
                 manga_id = ?2,
                 title = ?3,
                 author = ?4,
                 artist = ?5,
                 description = ?6,
                 cover_url = ?7,
                 url = ?8,
                 tags_json = ?9
             WHERE source_id = ?10 AND manga_id = ?11",
            params![
                manga.key.source_id.as_str(),
                manga.key.manga_id,
                manga.title,
                manga.author,
                manga.artist,
                manga.description,
                manga.cover_url,
                manga.url,
                tags_json,
                key.source_id.as_str(),
                key.manga_id,
            ],
        )?;

        if rows == 0 {
            debug!("replace_record: no record at {}", key);
        }
        Ok(())
    }

    fn delete_record(&mut self, key: &MangaKey) -> Result<bool> {
        let rows = self.tx.execute(
            "DELETE FROM library WHERE source_id = ?1 AND manga_id = ?2",
            params![key.source_id.as_str(), key.manga_id],
        )?;
        Ok(rows > 0)
    }

    fn insert_chapters(&mut self, key: &MangaKey, chapters: &[Chapter]) -> Result<()> {
        let mut stmt = self.tx.prepare(
            "INSERT INTO chapters (source_id, manga_id, chapter_id, title, chapter_num,
                                   volume_num, scanlator, lang, source_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(source_id, manga_id, chapter_id) DO UPDATE SET
                 title=excluded.title,
                 chapter_num=excluded.chapter_num,
                 volume_num=excluded.volume_num,
                 scanlator=excluded.scanlator,
                 lang=excluded.lang,
                 source_order=excluded.source_order",
        )?;

        for chapter in chapters {
            stmt.execute(params![
                key.source_id.as_str(),
                key.manga_id,
                chapter.chapter_id,
                chapter.title,
                chapter.chapter_num.map(f64::from),
                chapter.volume_num.map(f64::from),
                chapter.scanlator,
                chapter.lang,
                chapter.source_order,
            ])?;
        }
        Ok(())
    }

    fn delete_chapters(&mut self, key: &MangaKey) -> Result<usize> {
        let rows = self.tx.execute(
            "DELETE FROM chapters WHERE source_id = ?1 AND manga_id = ?2",
            params![key.source_id.as_str(), key.manga_id],
        )?;
        Ok(rows)
    }

    fn history_for(&mut self, key: &MangaKey) -> Result<Vec<HistoryEntry>> {
        query_history(&self.tx, key)
    }

    fn insert_history(&mut self, entry: &HistoryEntry) -> Result<()> {
        self.tx.execute(
            "INSERT INTO history (source_id, manga_id, chapter_id, completed, progress, last_read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(source_id, manga_id, chapter_id) DO UPDATE SET
                 completed=excluded.completed,
                 progress=excluded.progress,
                 last_read=excluded.last_read",
            params![
                entry.manga_key.source_id.as_str(),
                entry.manga_key.manga_id,
                entry.chapter_id,
                entry.completed,
                entry.progress.map(f64::from),
                entry.last_read.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn delete_history(&mut self, key: &MangaKey) -> Result<usize> {
        let rows = self.tx.execute(
            "DELETE FROM history WHERE source_id = ?1 AND manga_id = ?2",
            params![key.source_id.as_str(), key.manga_id],
        )?;
        Ok(rows)
    }

    fn mark_chapters_completed(&mut self, key: &MangaKey, chapter_ids: &[String]) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.tx.prepare(
            "INSERT INTO history (source_id, manga_id, chapter_id, completed, progress, last_read)
             SELECT c.source_id, c.manga_id, c.chapter_id, 1, c.chapter_num, ?4
             FROM chapters c
             WHERE c.source_id = ?1 AND c.manga_id = ?2 AND c.chapter_id = ?3
             ON CONFLICT(source_id, manga_id, chapter_id) DO UPDATE SET
                 completed=1,
                 progress=excluded.progress",
        )?;

        let mut marked = 0;
        for chapter_id in chapter_ids {
            marked += stmt.execute(params![
                key.source_id.as_str(),
                key.manga_id,
                chapter_id,
                now,
            ])?;
        }
        Ok(marked)
    }

    fn tracker_links_for(&mut self, key: &MangaKey) -> Result<Vec<TrackerLink>> {
        query_tracker_links(&self.tx, key)
    }

    fn has_tracker_link(&mut self, tracker_id: &str, key: &MangaKey) -> Result<bool> {
        query_has_tracker_link(&self.tx, tracker_id, key)
    }

    fn insert_tracker_link(
        &mut self,
        tracker_id: &str,
        key: &MangaKey,
        entry_id: &str,
    ) -> Result<i64> {
        self.tx.execute(
            "INSERT INTO tracker_links (tracker_id, source_id, manga_id, entry_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![tracker_id, key.source_id.as_str(), key.manga_id, entry_id],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    fn rebind_tracker_link(&mut self, link_id: i64, key: &MangaKey) -> Result<()> {
        let rows = self.tx.execute(
            "UPDATE tracker_links SET source_id = ?1, manga_id = ?2 WHERE id = ?3",
            params![key.source_id.as_str(), key.manga_id, link_id],
        )?;

        if rows == 0 {
            return Err(WatariError::Database {
                message: format!("Tracker link {} does not exist", link_id),
                source: None,
            });
        }
        Ok(())
    }
}
