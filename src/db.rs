//! SQLite persistence. One connection behind a mutex; list-valued columns
//! (genres, chapters, images) are stored as JSON text.

use crate::error::Result;
use crate::helpers::now_ts;
use crate::models::{ChapterContent, ChapterReference, SourceConfig, Title, TitleSummary};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_tables()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn create_tables(&self) -> Result<()> {
        log::info!("Creating tables if not exists...");
        let conn = self.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS titles (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                thumbnail TEXT,
                description TEXT,
                author TEXT,
                status TEXT,
                genres TEXT NOT NULL DEFAULT '[]',
                chapters TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chapter_contents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title_id TEXT NOT NULL,
                chapter_id TEXT NOT NULL,
                images TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(title_id, chapter_id)
            );",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cc_title ON chapter_contents(title_id);",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS source_config (
                key TEXT PRIMARY KEY DEFAULT 'default',
                base_url TEXT NOT NULL,
                title_url_template TEXT NOT NULL,
                chapter_url_template TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
            [],
        )?;

        Ok(())
    }

    /// Current source-site configuration. Read fresh on every crawl
    /// operation because the row is mutable from outside this process;
    /// a missing row falls back to the built-in default.
    pub fn source_config(&self) -> Result<SourceConfig> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT base_url, title_url_template, chapter_url_template
                 FROM source_config WHERE key = 'default'",
                [],
                |row| {
                    Ok(SourceConfig {
                        base_url: row.get(0)?,
                        title_url_template: row.get(1)?,
                        chapter_url_template: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row.unwrap_or_default())
    }

    pub fn set_source_config(&self, config: &SourceConfig) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO source_config (key, base_url, title_url_template, chapter_url_template, updated_at)
             VALUES ('default', ?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                base_url=excluded.base_url,
                title_url_template=excluded.title_url_template,
                chapter_url_template=excluded.chapter_url_template,
                updated_at=excluded.updated_at",
            params![
                config.base_url,
                config.title_url_template,
                config.chapter_url_template,
                now_ts()
            ],
        )?;
        Ok(())
    }

    /// Insert or fully refresh a title. The chapter list is replaced
    /// wholesale; created_at survives the upsert.
    pub fn upsert_title(&self, title: &Title) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO titles (id, title, url, thumbnail, description, author, status, genres, chapters, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT(id) DO UPDATE SET
                title=excluded.title,
                url=excluded.url,
                thumbnail=excluded.thumbnail,
                description=excluded.description,
                author=excluded.author,
                status=excluded.status,
                genres=excluded.genres,
                chapters=excluded.chapters,
                updated_at=excluded.updated_at",
            params![
                title.id,
                title.title,
                title.url,
                title.thumbnail,
                title.description,
                title.author,
                title.status,
                serde_json::to_string(&title.genres)?,
                serde_json::to_string(&title.chapters)?,
                now_ts()
            ],
        )?;
        Ok(())
    }

    pub fn get_title(&self, id: &str) -> Result<Option<Title>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, title, url, thumbnail, description, author, status, genres, chapters, created_at, updated_at
                 FROM titles WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, i64>(9)?,
                        row.get::<_, i64>(10)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, title, url, thumbnail, description, author, status, genres, chapters, created_at, updated_at)) = row
        else {
            return Ok(None);
        };
        let genres: Vec<String> = serde_json::from_str(&genres)?;
        let chapters: Vec<ChapterReference> = serde_json::from_str(&chapters)?;
        Ok(Some(Title {
            id,
            title,
            url,
            thumbnail,
            description,
            author,
            status,
            genres,
            chapters,
            created_at,
            updated_at,
        }))
    }

    pub fn list_titles(&self) -> Result<Vec<TitleSummary>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, title, url, thumbnail, chapters FROM titles ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, title, url, thumbnail, chapters) = row?;
            let chapters: Vec<ChapterReference> =
                serde_json::from_str(&chapters).unwrap_or_default();
            out.push(TitleSummary {
                id,
                title,
                url,
                thumbnail,
                latest_chapter: chapters.first().map(|c| c.title.clone()),
            });
        }
        Ok(out)
    }

    pub fn delete_title(&self, id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM chapter_contents WHERE title_id = ?1", [id])?;
        conn.execute("DELETE FROM titles WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Upsert a chapter's published images. created_at is kept on conflict
    /// so the row records its first successful crawl.
    pub fn upsert_chapter_content(
        &self,
        title_id: &str,
        chapter_id: &str,
        images: &[String],
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO chapter_contents (title_id, chapter_id, images, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(title_id, chapter_id) DO UPDATE SET
                images=excluded.images,
                updated_at=excluded.updated_at",
            params![title_id, chapter_id, serde_json::to_string(images)?, now_ts()],
        )?;
        Ok(())
    }

    pub fn get_chapter_content(
        &self,
        title_id: &str,
        chapter_id: &str,
    ) -> Result<Option<ChapterContent>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT title_id, chapter_id, images, created_at, updated_at
                 FROM chapter_contents WHERE title_id = ?1 AND chapter_id = ?2",
                [title_id, chapter_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((title_id, chapter_id, images, created_at, updated_at)) = row else {
            return Ok(None);
        };
        let images: Vec<String> = serde_json::from_str(&images)?;
        Ok(Some(ChapterContent {
            title_id,
            chapter_id,
            images,
            created_at,
            updated_at,
        }))
    }

    /// Remove a chapter's content row. The reference in the title's chapter
    /// list stays, so the chapter can be re-downloaded on the next request.
    pub fn delete_chapter_content(&self, title_id: &str, chapter_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM chapter_contents WHERE title_id = ?1 AND chapter_id = ?2",
            [title_id, chapter_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_title(id: &str, chapter_count: u32) -> Title {
        Title {
            id: id.to_string(),
            title: "One Piece".to_string(),
            url: format!("https://site.example/truyen-tranh/{}", id),
            thumbnail: Some("https://cdn.example/op.jpg".to_string()),
            description: Some("Pirates.".to_string()),
            author: Some("Oda".to_string()),
            status: Some("Ongoing".to_string()),
            genres: vec!["Action".to_string()],
            chapters: (0..chapter_count)
                .rev()
                .map(|n| ChapterReference {
                    id: n.to_string(),
                    title: format!("Chapter {}", n),
                    url: format!("https://site.example/truyen-tranh/{}/chapter-{}", id, n),
                })
                .collect(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn title_roundtrip_and_upsert() {
        let db = Db::open_in_memory().unwrap();
        db.upsert_title(&sample_title("one-piece", 3)).unwrap();

        let got = db.get_title("one-piece").unwrap().unwrap();
        assert_eq!(got.title, "One Piece");
        assert_eq!(got.chapters.len(), 3);
        assert_eq!(got.chapters[0].id, "2");

        // re-crawl replaces the chapter list wholesale
        db.upsert_title(&sample_title("one-piece", 5)).unwrap();
        let got = db.get_title("one-piece").unwrap().unwrap();
        assert_eq!(got.chapters.len(), 5);
    }

    #[test]
    fn missing_title_is_none() {
        let db = Db::open_in_memory().unwrap();
        assert!(db.get_title("nope").unwrap().is_none());
    }

    #[test]
    fn chapter_content_unique_per_chapter() {
        let db = Db::open_in_memory().unwrap();
        let imgs = vec!["http://m/000.jpg".to_string(), "http://m/001.jpg".to_string()];
        db.upsert_chapter_content("one-piece", "1", &imgs).unwrap();
        db.upsert_chapter_content("one-piece", "1", &imgs[..1].to_vec())
            .unwrap();

        let got = db.get_chapter_content("one-piece", "1").unwrap().unwrap();
        assert_eq!(got.images.len(), 1);
        assert!(db.get_chapter_content("one-piece", "2").unwrap().is_none());
    }

    #[test]
    fn delete_title_cascades_contents() {
        let db = Db::open_in_memory().unwrap();
        db.upsert_title(&sample_title("one-piece", 2)).unwrap();
        db.upsert_chapter_content("one-piece", "1", &["u".to_string()])
            .unwrap();

        db.delete_title("one-piece").unwrap();
        assert!(db.get_title("one-piece").unwrap().is_none());
        assert!(db.get_chapter_content("one-piece", "1").unwrap().is_none());
    }

    #[test]
    fn source_config_defaults_then_updates() {
        let db = Db::open_in_memory().unwrap();
        let cfg = db.source_config().unwrap();
        assert_eq!(cfg.base_url, SourceConfig::default().base_url);

        let updated = SourceConfig {
            base_url: "https://new.example".to_string(),
            title_url_template: "https://new.example/t/{slug}".to_string(),
            chapter_url_template: "https://new.example/t/{slug}/chapter-{chapter}".to_string(),
        };
        db.set_source_config(&updated).unwrap();
        assert_eq!(db.source_config().unwrap().base_url, "https://new.example");
    }

    #[test]
    fn list_titles_reports_latest_chapter() {
        let db = Db::open_in_memory().unwrap();
        db.upsert_title(&sample_title("one-piece", 4)).unwrap();
        let list = db.list_titles().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].latest_chapter.as_deref(), Some("Chapter 3"));
    }
}
