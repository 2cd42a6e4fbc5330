//! Lazy serving boundary: queries answer from the store and a miss triggers
//! a synchronous crawl (bounded by a hard timeout) before re-querying.
//! Duplicate concurrent triggers for the same chapter are wasted work, not a
//! hazard, because persistence is an idempotent upsert.

use crate::crawler::{CrawlOrchestrator, PageFetcher};
use crate::error::{CrawlError, Result};
use crate::models::{ChapterContent, ChapterReference, Title};
use std::time::Duration;

/// Adjacent chapters for reader navigation. The chapter list is newest
/// first, so "next" moves toward the front of the list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChapterNavigation {
    pub prev: Option<ChapterReference>,
    pub next: Option<ChapterReference>,
}

pub struct LazyTrigger<F: PageFetcher> {
    orchestrator: CrawlOrchestrator<F>,
    crawl_timeout: Duration,
}

impl<F: PageFetcher> LazyTrigger<F> {
    pub fn new(orchestrator: CrawlOrchestrator<F>, crawl_timeout: Duration) -> Self {
        Self {
            orchestrator,
            crawl_timeout,
        }
    }

    /// A chapter's published images, crawling on miss. The timeout abandons
    /// the crawl best-effort; a miss after the retry is a hard error.
    pub async fn chapter_images(&self, title_id: &str, chapter_id: &str) -> Result<ChapterContent> {
        if let Some(existing) = self
            .orchestrator
            .db()
            .get_chapter_content(title_id, chapter_id)?
        {
            if !existing.images.is_empty() {
                return Ok(existing);
            }
        }

        log::info!(
            "chapter {}/{} not downloaded yet, crawling on demand",
            title_id,
            chapter_id
        );
        let crawl = self.orchestrator.crawl_chapter(title_id, chapter_id);
        match tokio::time::timeout(self.crawl_timeout, crawl).await {
            Ok(Ok(content)) => return Ok(content),
            Ok(Err(e)) => log::warn!("on-demand crawl failed for {}/{}: {}", title_id, chapter_id, e),
            Err(_) => log::warn!(
                "on-demand crawl timed out after {:?} for {}/{}",
                self.crawl_timeout,
                title_id,
                chapter_id
            ),
        }

        match self
            .orchestrator
            .db()
            .get_chapter_content(title_id, chapter_id)?
        {
            Some(content) if !content.images.is_empty() => Ok(content),
            _ => Err(CrawlError::ContentUnavailable),
        }
    }

    /// A title's detail record, crawling on miss.
    pub async fn title_detail(&self, title_id: &str) -> Result<Title> {
        if let Some(title) = self.orchestrator.db().get_title(title_id)? {
            return Ok(title);
        }

        log::info!("title {} not in store, crawling on demand", title_id);
        let crawl = self.orchestrator.crawl_title(title_id);
        if let Ok(Err(e)) = tokio::time::timeout(self.crawl_timeout, crawl).await {
            log::warn!("on-demand title crawl failed for {}: {}", title_id, e);
        }

        self.orchestrator
            .db()
            .get_title(title_id)?
            .ok_or_else(|| CrawlError::TitleNotFound(title_id.to_string()))
    }

    /// Prev/next references around a chapter, resolved from the title's
    /// authoritative chapter order.
    pub fn navigation(&self, title_id: &str, chapter_id: &str) -> Result<ChapterNavigation> {
        let title = self
            .orchestrator
            .db()
            .get_title(title_id)?
            .ok_or_else(|| CrawlError::TitleNotFound(title_id.to_string()))?;
        Ok(navigate(&title.chapters, chapter_id))
    }

    pub fn orchestrator(&self) -> &CrawlOrchestrator<F> {
        &self.orchestrator
    }
}

fn navigate(chapters: &[ChapterReference], chapter_id: &str) -> ChapterNavigation {
    let Some(idx) = chapters.iter().position(|c| c.id == chapter_id) else {
        return ChapterNavigation::default();
    };
    ChapterNavigation {
        next: idx.checked_sub(1).and_then(|i| chapters.get(i)).cloned(),
        prev: chapters.get(idx + 1).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapters(ids: &[&str]) -> Vec<ChapterReference> {
        ids.iter()
            .map(|id| ChapterReference {
                id: id.to_string(),
                title: format!("Chapter {}", id),
                url: format!("https://s.example/t/op/chapter-{}", id),
            })
            .collect()
    }

    #[test]
    fn navigation_over_newest_first_list() {
        let list = chapters(&["3", "2", "1", "0"]);

        let nav = navigate(&list, "2");
        assert_eq!(nav.next.unwrap().id, "3");
        assert_eq!(nav.prev.unwrap().id, "1");
    }

    #[test]
    fn navigation_at_edges() {
        let list = chapters(&["3", "2", "1", "0"]);

        let newest = navigate(&list, "3");
        assert!(newest.next.is_none());
        assert_eq!(newest.prev.unwrap().id, "2");

        let oldest = navigate(&list, "0");
        assert_eq!(oldest.next.unwrap().id, "1");
        assert!(oldest.prev.is_none());
    }

    #[test]
    fn navigation_unknown_chapter_is_empty() {
        let list = chapters(&["1", "0"]);
        let nav = navigate(&list, "9");
        assert!(nav.prev.is_none() && nav.next.is_none());
    }
}
