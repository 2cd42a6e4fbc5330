use thiserror::Error;

/// Errors produced by crawl operations.
///
/// Only `BypassExhausted` and `ParseValidation` abort an orchestrator
/// operation outright; media failures are per-item and are logged and
/// skipped by the pipeline instead of surfacing here.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("all bypass strategies failed for {url}")]
    BypassExhausted { url: String },

    #[error("parsed page failed validation: {0}")]
    ParseValidation(String),

    #[error("title not found: {0}")]
    TitleNotFound(String),

    #[error("chapter not found: {title_id}/{chapter_id}")]
    ChapterNotFound {
        title_id: String,
        chapter_id: String,
    },

    #[error("no content images extracted")]
    NoImages,

    #[error("content unavailable after crawl attempt")]
    ContentUnavailable,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("media store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CrawlError>;
