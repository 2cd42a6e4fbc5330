//! Pure HTML parsing. No network access here: every function takes a
//! rendered document and returns structured data, so the whole module is
//! testable against fixture HTML.
//!
//! Source sites restyle frequently, so each field is read through an ordered
//! selector chain and the first selector yielding a non-empty value wins.

use crate::helpers::ensure_absolute;
use crate::models::{ChapterReference, TitleSummary};
use scraper::{ElementRef, Html, Selector};

/// Structured result of parsing a title detail page.
#[derive(Debug, Default, Clone)]
pub struct ParsedTitle {
    pub title: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub status: Option<String>,
    pub genres: Vec<String>,
    pub thumbnail: Option<String>,
    pub chapters: Vec<ChapterReference>,
}

const TITLE_SELECTORS: &[&str] = &["h1.title-detail", ".title-detail", "h1[itemprop=name]", "h1"];

const DESCRIPTION_SELECTORS: &[&str] = &[
    ".detail-content p",
    ".detail-content",
    ".summary__content",
    "div[itemprop=description]",
];

const AUTHOR_SELECTORS: &[&str] = &[".author p:nth-child(2)", ".author .col-xs-8", ".author-content a"];

const STATUS_SELECTORS: &[&str] = &[".status p:nth-child(2)", ".status .col-xs-8", ".post-status .summary-content"];

const GENRE_SELECTORS: &[&str] = &[".kind a", ".kind p:nth-child(2) a", ".genres-content a"];

const THUMBNAIL_SELECTORS: &[&str] = &[
    ".col-image img",
    ".detail-info img",
    ".summary_image img",
    "img[itemprop=image]",
];

const CHAPTER_LIST_SELECTORS: &[&str] = &[
    ".list-chapter li a",
    "#nt_listchapter li a",
    ".wp-manga-chapter a",
    ".chapter-list a",
];

const CHAPTER_IMAGE_SELECTORS: &[&str] = &[
    ".page-chapter img",
    ".reading-detail img",
    ".reading-content img",
    ".chapter-content img",
];

const SEARCH_CARD_SELECTORS: &[&str] = &[".items .item", ".item-manga", ".c-tabs-item__content"];

/// Attributes lazy-load plugins stash the real source in, checked before
/// the plain `src` (which is usually a 1x1 placeholder on these sites).
const LAZY_ATTRS: &[&str] = &["data-original", "data-src", "data-lazy-src"];

fn first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    for sel in selectors {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        if let Some(el) = doc.select(&selector).next() {
            let text: String = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn image_src(el: &ElementRef, base_url: &str) -> Option<String> {
    for attr in LAZY_ATTRS {
        if let Some(v) = el.value().attr(attr) {
            let v = v.trim();
            if !v.is_empty() {
                return Some(ensure_absolute(v, base_url));
            }
        }
    }
    el.value()
        .attr("src")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| ensure_absolute(v, base_url))
}

/// Parse a title detail page. An empty title string here is a validation
/// failure upstream, not this module's concern.
pub fn parse_title_detail(html: &str, base_url: &str) -> ParsedTitle {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, TITLE_SELECTORS).unwrap_or_default();
    let description = first_text(&doc, DESCRIPTION_SELECTORS);
    let author = first_text(&doc, AUTHOR_SELECTORS).filter(|a| a != "Đang cập nhật");
    let status = first_text(&doc, STATUS_SELECTORS);

    let mut genres = Vec::new();
    for sel in GENRE_SELECTORS {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        for el in doc.select(&selector) {
            let g: String = el.text().collect::<String>().trim().to_string();
            if !g.is_empty() && !genres.contains(&g) {
                genres.push(g);
            }
        }
        if !genres.is_empty() {
            break;
        }
    }

    let thumbnail = THUMBNAIL_SELECTORS.iter().find_map(|sel| {
        let selector = Selector::parse(sel).ok()?;
        let el = doc.select(&selector).next()?;
        image_src(&el, base_url)
    });

    let chapters = parse_chapter_anchors(&doc, base_url);

    ParsedTitle {
        title,
        description,
        author,
        status,
        genres,
        thumbnail,
        chapters,
    }
}

fn parse_chapter_anchors(doc: &Html, base_url: &str) -> Vec<ChapterReference> {
    for sel in CHAPTER_LIST_SELECTORS {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        let mut out = Vec::new();
        for el in doc.select(&selector) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let label: String = el.text().collect::<String>().trim().to_string();
            if label.is_empty() {
                continue;
            }
            out.push(ChapterReference {
                id: chapter_id_from_label(&label),
                title: label,
                url: ensure_absolute(href, base_url),
            });
        }
        if !out.is_empty() {
            return out;
        }
    }
    Vec::new()
}

/// Trailing number in a chapter label ("Chapter 42", "Chương 42: ...")
/// becomes the chapter id; labels without one keep the whole label.
fn chapter_id_from_label(label: &str) -> String {
    let re = regex::Regex::new(r"(\d+)").unwrap();
    re.captures(label)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| label.to_string())
}

/// Extract the ordered, de-duplicated content image sources from a chapter
/// page. Falls back to scanning every `img` with non-content images filtered
/// out by substring when no reader container matches.
pub fn parse_chapter_images(html: &str, base_url: &str) -> Vec<String> {
    let doc = Html::parse_document(html);

    for sel in CHAPTER_IMAGE_SELECTORS {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        let imgs = collect_images(doc.select(&selector), base_url);
        if !imgs.is_empty() {
            return imgs;
        }
    }

    // Last resort: every image on the page, minus obvious chrome.
    let Ok(all) = Selector::parse("img") else {
        return Vec::new();
    };
    collect_images(
        doc.select(&all).filter(|el| {
            let src = el
                .value()
                .attr("src")
                .or_else(|| el.value().attr("data-src"))
                .unwrap_or("");
            let lower = src.to_lowercase();
            !lower.contains("logo")
                && !lower.contains("icon")
                && !lower.contains("avatar")
                && !lower.contains("banner")
        }),
        base_url,
    )
}

fn collect_images<'a, I>(elements: I, base_url: &str) -> Vec<String>
where
    I: Iterator<Item = ElementRef<'a>>,
{
    let mut out = Vec::new();
    for el in elements {
        if let Some(src) = image_src(&el, base_url) {
            if !out.contains(&src) {
                out.push(src);
            }
        }
    }
    out
}

/// Parse a search results page into lightweight summaries.
pub fn parse_search_results(html: &str, base_url: &str) -> Vec<TitleSummary> {
    let doc = Html::parse_document(html);
    let title_link = match Selector::parse("h3 a, .post-title a, .jtip") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let img_sel = match Selector::parse("img") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let chapter_sel = Selector::parse(".chapter a, .latest-chap a").ok();

    for sel in SEARCH_CARD_SELECTORS {
        let Ok(card) = Selector::parse(sel) else {
            continue;
        };
        let mut out = Vec::new();
        for el in doc.select(&card) {
            let Some(link) = el.select(&title_link).next() else {
                continue;
            };
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let name: String = link.text().collect::<String>().trim().to_string();
            if name.is_empty() {
                continue;
            }
            let url = ensure_absolute(href, base_url);
            let Some(id) = crate::helpers::last_path_segment(&url) else {
                continue;
            };
            let thumbnail = el.select(&img_sel).next().and_then(|i| image_src(&i, base_url));
            let latest_chapter = chapter_sel.as_ref().and_then(|cs| {
                el.select(cs)
                    .next()
                    .map(|c| c.text().collect::<String>().trim().to_string())
            });
            out.push(TitleSummary {
                id,
                title: name,
                url,
                thumbnail,
                latest_chapter,
            });
        }
        if !out.is_empty() {
            return out;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://site.example";

    #[test]
    fn detail_page_fields() {
        let html = r#"
            <html><body>
              <h1 class="title-detail">One Piece</h1>
              <div class="detail-content"><p>Pirate adventure.</p></div>
              <div class="author"><p>Tác giả</p><p>Oda</p></div>
              <div class="status"><p>Tình trạng</p><p>Đang tiến hành</p></div>
              <div class="kind"><a>Action</a><a>Adventure</a></div>
              <div class="col-image"><img data-original="/covers/op.jpg" src="/1x1.gif"></div>
              <div class="list-chapter"><ul>
                <li><a href="/truyen-tranh/one-piece/chapter-2">Chapter 2</a></li>
                <li><a href="/truyen-tranh/one-piece/chapter-1">Chapter 1</a></li>
              </ul></div>
            </body></html>"#;
        let parsed = parse_title_detail(html, BASE);
        assert_eq!(parsed.title, "One Piece");
        assert_eq!(parsed.description.as_deref(), Some("Pirate adventure."));
        assert_eq!(parsed.author.as_deref(), Some("Oda"));
        assert_eq!(parsed.genres, vec!["Action", "Adventure"]);
        // lazy-load attr beats the placeholder src
        assert_eq!(
            parsed.thumbnail.as_deref(),
            Some("https://site.example/covers/op.jpg")
        );
        assert_eq!(parsed.chapters.len(), 2);
        assert_eq!(parsed.chapters[0].id, "2");
        assert_eq!(
            parsed.chapters[1].url,
            "https://site.example/truyen-tranh/one-piece/chapter-1"
        );
    }

    #[test]
    fn chapter_ids_extracted_from_labels() {
        assert_eq!(chapter_id_from_label("Chapter 42"), "42");
        assert_eq!(chapter_id_from_label("Chương 7: Khởi đầu"), "7");
        assert_eq!(chapter_id_from_label("Oneshot"), "Oneshot");
    }

    #[test]
    fn missing_fields_stay_none() {
        let parsed = parse_title_detail("<html><body></body></html>", BASE);
        assert!(parsed.title.is_empty());
        assert!(parsed.description.is_none());
        assert!(parsed.chapters.is_empty());
    }

    #[test]
    fn chapter_images_from_reader_container() {
        let html = r#"
            <div class="page-chapter"><img data-src="/img/001.jpg"></div>
            <div class="page-chapter"><img data-src="/img/002.jpg"></div>
            <div class="page-chapter"><img data-src="/img/001.jpg"></div>
            <img src="/static/logo.png">"#;
        let imgs = parse_chapter_images(html, BASE);
        assert_eq!(
            imgs,
            vec![
                "https://site.example/img/001.jpg",
                "https://site.example/img/002.jpg"
            ]
        );
    }

    #[test]
    fn chapter_images_fallback_filters_chrome() {
        let html = r#"
            <img src="https://cdn.example/pages/01.jpg">
            <img src="https://cdn.example/pages/02.jpg">
            <img src="/static/site-logo.png">
            <img src="/ads/banner-top.jpg">
            <img src="/u/avatar.png">"#;
        let imgs = parse_chapter_images(html, BASE);
        assert_eq!(
            imgs,
            vec![
                "https://cdn.example/pages/01.jpg",
                "https://cdn.example/pages/02.jpg"
            ]
        );
    }

    #[test]
    fn search_results_cards() {
        let html = r#"
            <div class="items">
              <div class="item">
                <img data-original="/covers/op.jpg">
                <h3><a href="/truyen-tranh/one-piece">One Piece</a></h3>
                <div class="chapter"><a>Chapter 1100</a></div>
              </div>
            </div>"#;
        let results = parse_search_results(html, BASE);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "one-piece");
        assert_eq!(results[0].latest_chapter.as_deref(), Some("Chapter 1100"));
        assert!(results[0]
            .thumbnail
            .as_deref()
            .unwrap()
            .starts_with("https://"));
    }
}
