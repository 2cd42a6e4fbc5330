use serde::{Deserialize, Serialize};

/// One entry in a title's chapter list. Exists only inside `Title::chapters`;
/// the list order is authoritative (newest first) and drives prev/next
/// navigation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChapterReference {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// A catalog entry (one manga series), keyed by its source slug.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Title {
    pub id: String,
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub status: Option<String>,
    pub genres: Vec<String>,
    pub chapters: Vec<ChapterReference>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Published images for one chapter, keyed by (title_id, chapter_id).
/// A non-empty image list means the chapter is downloaded.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChapterContent {
    pub title_id: String,
    pub chapter_id: String,
    pub images: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Lightweight search result row.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TitleSummary {
    pub id: String,
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub latest_chapter: Option<String>,
}

/// Numeric chapter-URL convention inferred from visible anchors.
/// Derived per crawl, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlPattern {
    pub prefix: String,
    pub separator: String,
    pub base_url: String,
    pub min: u32,
    pub max: u32,
}

/// Source-site configuration. Stored in the database, externally mutable,
/// and read fresh on every crawl operation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    pub title_url_template: String,
    pub chapter_url_template: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nettruyen.one".to_string(),
            title_url_template: "https://nettruyen.one/truyen-tranh/{slug}".to_string(),
            chapter_url_template: "https://nettruyen.one/truyen-tranh/{slug}/chapter-{chapter}"
                .to_string(),
        }
    }
}

/// Outcome of one `crawl_range` run.
#[derive(Debug, Default, Serialize, Clone)]
pub struct RangeReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped_existing: usize,
}
