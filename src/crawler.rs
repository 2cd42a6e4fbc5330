//! Crawl orchestration: ties bypass resolution, parsing, pattern inference
//! and the media pipeline together, and owns the idempotency and validation
//! rules around persistence.

use crate::bypass::{BypassOutcome, BypassResolver};
use crate::db::Db;
use crate::error::{CrawlError, Result};
use crate::helpers::{last_path_segment, normalize_chapter_url, now_ts, slugify};
use crate::media::{chapter_folder, title_folder, MediaPipeline, MediaStore};
use crate::models::{ChapterContent, RangeReport, Title, TitleSummary};
use crate::{parser, pattern};

/// Seam between the orchestrator and the network: anything that can turn a
/// protected URL into a rendered page.
pub trait PageFetcher {
    fn fetch(&self, url: &str) -> impl std::future::Future<Output = Result<BypassOutcome>> + Send;
}

impl PageFetcher for BypassResolver {
    async fn fetch(&self, url: &str) -> Result<BypassOutcome> {
        self.solve(url).await
    }
}

pub struct CrawlOrchestrator<F: PageFetcher> {
    db: Db,
    fetcher: F,
    pipeline: MediaPipeline,
    store: MediaStore,
}

impl<F: PageFetcher> CrawlOrchestrator<F> {
    pub fn new(db: Db, fetcher: F, pipeline: MediaPipeline, store: MediaStore) -> Self {
        Self {
            db,
            fetcher,
            pipeline,
            store,
        }
    }

    /// Crawl a title detail page and refresh its record. `identifier` is a
    /// slug or an absolute detail URL. On a validation failure the prior
    /// persisted record is left untouched.
    pub async fn crawl_title(&self, identifier: &str) -> Result<Title> {
        let config = self.db.source_config()?;
        let url = if identifier.starts_with("http://") || identifier.starts_with("https://") {
            identifier.to_string()
        } else {
            config.title_url_template.replace("{slug}", identifier)
        };
        let id = last_path_segment(&url)
            .ok_or_else(|| CrawlError::ParseValidation(format!("no slug in url {}", url)))?;

        log::info!("crawling title {} from {}", id, url);
        let outcome = self.fetcher.fetch(&url).await?;
        let parsed = parser::parse_title_detail(&outcome.html, &config.base_url);

        if parsed.title.trim().is_empty() {
            return Err(CrawlError::ParseValidation(format!(
                "empty title parsed from {}",
                url
            )));
        }

        let prior = self.db.get_title(&id)?;
        let chapters = pattern::build_chapter_list(&parsed.chapters, &id, &config);
        if chapters.is_empty() {
            if let Some(prior) = &prior {
                if !prior.chapters.is_empty() {
                    return Err(CrawlError::ParseValidation(format!(
                        "zero chapters parsed for {} but {} were previously known",
                        id,
                        prior.chapters.len()
                    )));
                }
            }
        }

        // Republish the cover so it survives source-site domain rotations.
        // A failed cover download keeps the original URL, never aborts.
        let thumbnail = match &parsed.thumbnail {
            Some(src) => {
                let published = self
                    .pipeline
                    .fetch_and_publish(
                        std::slice::from_ref(src),
                        &url,
                        &config.base_url,
                        &title_folder(&id),
                        Some(&outcome),
                    )
                    .await;
                published.into_iter().next().or_else(|| parsed.thumbnail.clone())
            }
            None => None,
        };

        let title = Title {
            id: id.clone(),
            title: parsed.title,
            url,
            thumbnail,
            description: parsed.description,
            author: parsed.author,
            status: parsed.status,
            genres: parsed.genres,
            chapters,
            created_at: prior.as_ref().map(|p| p.created_at).unwrap_or_else(now_ts),
            updated_at: now_ts(),
        };
        self.db.upsert_title(&title)?;
        log::info!("title {} saved with {} chapters", id, title.chapters.len());
        Ok(title)
    }

    /// Crawl one chapter's images and publish them. Existing non-empty
    /// content is an idempotent no-op with zero network activity. An empty
    /// crawl result persists nothing so the next request retries.
    pub async fn crawl_chapter(&self, title_id: &str, chapter_id: &str) -> Result<ChapterContent> {
        if let Some(existing) = self.db.get_chapter_content(title_id, chapter_id)? {
            if !existing.images.is_empty() {
                log::debug!(
                    "chapter {}/{} already downloaded, skipping",
                    title_id,
                    chapter_id
                );
                return Ok(existing);
            }
        }

        let title = self
            .db
            .get_title(title_id)?
            .ok_or_else(|| CrawlError::TitleNotFound(title_id.to_string()))?;
        let reference = title
            .chapters
            .iter()
            .find(|c| c.id == chapter_id)
            .ok_or_else(|| CrawlError::ChapterNotFound {
                title_id: title_id.to_string(),
                chapter_id: chapter_id.to_string(),
            })?;

        let config = self.db.source_config()?;
        let url = normalize_chapter_url(&reference.url, &config.base_url);
        log::info!("crawling chapter {}/{} from {}", title_id, chapter_id, url);

        let outcome = self.fetcher.fetch(&url).await?;
        let sources = parser::parse_chapter_images(&outcome.html, &config.base_url);
        if sources.is_empty() {
            log::warn!("no images parsed from {}", url);
            return Err(CrawlError::NoImages);
        }

        let published = self
            .pipeline
            .fetch_and_publish(
                &sources,
                &url,
                &config.base_url,
                &chapter_folder(title_id, chapter_id),
                Some(&outcome),
            )
            .await;
        if published.is_empty() {
            log::warn!(
                "all {} image downloads failed for {}/{}",
                sources.len(),
                title_id,
                chapter_id
            );
            return Err(CrawlError::NoImages);
        }
        log::info!(
            "published {}/{} images for {}/{}",
            published.len(),
            sources.len(),
            title_id,
            chapter_id
        );

        self.db
            .upsert_chapter_content(title_id, chapter_id, &published)?;
        self.db
            .get_chapter_content(title_id, chapter_id)?
            .ok_or(CrawlError::ContentUnavailable)
    }

    /// Sequentially crawl the chapters at list positions from..=to.
    /// Per-chapter failures are tallied, never aborting the run.
    pub async fn crawl_range(
        &self,
        title_id: &str,
        from_pos: usize,
        to_pos: usize,
    ) -> Result<RangeReport> {
        let title = self
            .db
            .get_title(title_id)?
            .ok_or_else(|| CrawlError::TitleNotFound(title_id.to_string()))?;

        let mut report = RangeReport::default();
        let end = to_pos.min(title.chapters.len().saturating_sub(1));
        for pos in from_pos..=end {
            let Some(reference) = title.chapters.get(pos) else {
                break;
            };
            report.attempted += 1;

            let already = self
                .db
                .get_chapter_content(title_id, &reference.id)?
                .map(|c| !c.images.is_empty())
                .unwrap_or(false);
            if already {
                report.skipped_existing += 1;
                continue;
            }

            match self.crawl_chapter(title_id, &reference.id).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    log::warn!(
                        "range crawl failed at position {} ({}/{}): {}",
                        pos,
                        title_id,
                        reference.id,
                        e
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Search the source site. The keyword's slug is probed as a direct
    /// detail URL first (exact-title hits skip the search page entirely);
    /// otherwise the search page is fetched and its result cards parsed.
    pub async fn search(&self, keyword: &str) -> Result<Vec<TitleSummary>> {
        let config = self.db.source_config()?;
        let slug = slugify(keyword);
        if slug.is_empty() {
            return Ok(Vec::new());
        }

        let direct_url = config.title_url_template.replace("{slug}", &slug);
        if let Ok(outcome) = self.fetcher.fetch(&direct_url).await {
            let parsed = parser::parse_title_detail(&outcome.html, &config.base_url);
            if !parsed.title.trim().is_empty() {
                let thumbnail = parsed
                    .thumbnail
                    .map(|t| crate::helpers::ensure_absolute(&t, &config.base_url));
                return Ok(vec![TitleSummary {
                    id: slug,
                    title: parsed.title,
                    url: direct_url,
                    thumbnail,
                    latest_chapter: parsed.chapters.first().map(|c| c.title.clone()),
                }]);
            }
        }

        for term in [keyword, slug.as_str()] {
            let search_url = match reqwest::Url::parse_with_params(
                &format!("{}/tim-truyen", config.base_url),
                [("keyword", term)],
            ) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    log::warn!("bad search url for keyword {}: {}", term, e);
                    continue;
                }
            };
            match self.fetcher.fetch(&search_url).await {
                Ok(outcome) => {
                    let results = parser::parse_search_results(&outcome.html, &config.base_url);
                    if !results.is_empty() {
                        return Ok(results);
                    }
                }
                Err(e) => log::warn!("search page fetch failed for {}: {}", search_url, e),
            }
        }
        Ok(Vec::new())
    }

    /// Delete a title, its chapter contents and its media folder.
    pub async fn delete_title(&self, title_id: &str) -> Result<()> {
        self.db.delete_title(title_id)?;
        self.store.delete_folder(&title_folder(title_id)).await?;
        log::info!("deleted title {} and its media", title_id);
        Ok(())
    }

    /// Delete one chapter's content row and media folder. The reference in
    /// the title's chapter list stays so the chapter can be re-downloaded.
    pub async fn delete_chapter(&self, title_id: &str, chapter_id: &str) -> Result<()> {
        self.db.delete_chapter_content(title_id, chapter_id)?;
        self.store
            .delete_folder(&chapter_folder(title_id, chapter_id))
            .await?;
        Ok(())
    }

    pub fn db(&self) -> &Db {
        &self.db
    }
}
