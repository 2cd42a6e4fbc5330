//! Chapter-URL pattern inference.
//!
//! Source sites only render a window of chapter links (newest page, a few
//! older ones). When the visible anchors follow a numeric URL convention we
//! can infer it and synthesize the full chapter list without loading any
//! pagination.

use crate::models::{ChapterReference, CrawlPattern, SourceConfig};
use regex::Regex;

fn chapter_token_re() -> Regex {
    Regex::new(r"(?i)[/-](chuong|chap|chapter)[/-]?(\d+)").unwrap()
}

/// Inspect visible chapter anchors and derive the numeric URL convention,
/// if any. The first matching anchor fixes the base URL, prefix token and
/// separator; every match updates the running min/max chapter numbers.
pub fn infer(anchors: &[ChapterReference]) -> Option<CrawlPattern> {
    let re = chapter_token_re();
    let mut pattern: Option<CrawlPattern> = None;

    for anchor in anchors {
        let Some(caps) = re.captures(&anchor.url) else {
            continue;
        };
        let m = caps.get(0)?;
        let prefix = caps.get(1)?.as_str().to_lowercase();
        let number: u32 = match caps.get(2)?.as_str().parse() {
            Ok(n) => n,
            Err(_) => continue,
        };

        match pattern.as_mut() {
            Some(p) => {
                p.min = p.min.min(number);
                p.max = p.max.max(number);
            }
            None => {
                let base_url = anchor.url[..m.start()].to_string();
                let separator = if anchor.url.to_lowercase().contains(&format!("{}-", prefix)) {
                    "-".to_string()
                } else {
                    String::new()
                };
                pattern = Some(CrawlPattern {
                    prefix,
                    separator,
                    base_url,
                    min: number,
                    max: number,
                });
            }
        }
    }

    pattern
}

/// Build the chapter list for a title. With a recognized pattern and max > 0,
/// synthesize every chapter max..=0 in descending order (newest first) —
/// chapter 0 is included because some series use it for a prologue; a miss
/// there is accepted downstream. Without a pattern the visible anchors are
/// returned verbatim.
pub fn build_chapter_list(
    anchors: &[ChapterReference],
    title_id: &str,
    config: &SourceConfig,
) -> Vec<ChapterReference> {
    let Some(pattern) = infer(anchors) else {
        return anchors.to_vec();
    };
    if pattern.max == 0 {
        return anchors.to_vec();
    }

    log::debug!(
        "inferred pattern for {}: prefix={} base={} range {}..{}",
        title_id,
        pattern.prefix,
        pattern.base_url,
        pattern.min,
        pattern.max
    );

    (0..=pattern.max)
        .rev()
        .map(|n| ChapterReference {
            id: n.to_string(),
            title: format!("Chapter {}", n),
            url: chapter_url(&pattern, n, title_id, config),
        })
        .collect()
}

/// URL for one synthesized chapter. The source-configured template wins when
/// present; otherwise the inferred base plus the observed token style.
fn chapter_url(pattern: &CrawlPattern, number: u32, title_id: &str, config: &SourceConfig) -> String {
    if !config.chapter_url_template.is_empty() {
        return config
            .chapter_url_template
            .replace("{slug}", title_id)
            .replace("{chapter}", &number.to_string());
    }
    format!(
        "{}/{}{}{}",
        pattern.base_url.trim_end_matches('/'),
        pattern.prefix,
        pattern.separator,
        number
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(url: &str) -> ChapterReference {
        ChapterReference {
            id: String::new(),
            title: "Chapter".to_string(),
            url: url.to_string(),
        }
    }

    fn config() -> SourceConfig {
        SourceConfig {
            base_url: "https://site.example".to_string(),
            title_url_template: "https://site.example/truyen-tranh/{slug}".to_string(),
            chapter_url_template: "https://site.example/truyen-tranh/{slug}/chapter-{chapter}"
                .to_string(),
        }
    }

    #[test]
    fn infers_prefix_and_range() {
        let anchors = vec![
            anchor("https://site.example/truyen-tranh/one-piece/chapter-42"),
            anchor("https://site.example/truyen-tranh/one-piece/chapter-41"),
            anchor("https://site.example/truyen-tranh/one-piece/chapter-3"),
        ];
        let p = infer(&anchors).unwrap();
        assert_eq!(p.prefix, "chapter");
        assert_eq!(p.separator, "-");
        assert_eq!(p.min, 3);
        assert_eq!(p.max, 42);
        assert_eq!(p.base_url, "https://site.example/truyen-tranh/one-piece");
    }

    #[test]
    fn separator_detection_ignores_case() {
        let anchors = vec![anchor("https://site.example/t/op/Chapter-5")];
        let p = infer(&anchors).unwrap();
        assert_eq!(p.prefix, "chapter");
        assert_eq!(p.separator, "-");
    }

    #[test]
    fn recognizes_chuong_token() {
        let anchors = vec![anchor("https://site.example/t/dao-hai-tac/chuong-7")];
        let p = infer(&anchors).unwrap();
        assert_eq!(p.prefix, "chuong");
        assert_eq!(p.max, 7);
    }

    #[test]
    fn synthesizes_full_descending_list() {
        // visible chapters 1..K, pattern recognized: K+1 entries ordered K..0
        let k = 5u32;
        let anchors: Vec<_> = (1..=k)
            .map(|n| anchor(&format!("https://site.example/truyen-tranh/op/chapter-{}", n)))
            .collect();
        let list = build_chapter_list(&anchors, "op", &config());
        assert_eq!(list.len(), (k + 1) as usize);
        assert_eq!(list[0].id, "5");
        assert_eq!(list.last().map(|c| c.id.as_str()), Some("0"));
        assert_eq!(
            list[0].url,
            "https://site.example/truyen-tranh/op/chapter-5"
        );
    }

    #[test]
    fn no_pattern_keeps_anchors_verbatim() {
        let anchors = vec![
            anchor("https://site.example/read/abcdef"),
            anchor("https://site.example/read/ghijkl"),
        ];
        let list = build_chapter_list(&anchors, "op", &config());
        assert_eq!(list, anchors);
    }

    #[test]
    fn template_fallback_uses_inferred_base() {
        let anchors = vec![anchor("https://site.example/t/op/chapter-2")];
        let mut cfg = config();
        cfg.chapter_url_template = String::new();
        let list = build_chapter_list(&anchors, "op", &cfg);
        assert_eq!(list[0].url, "https://site.example/t/op/chapter-2");
    }
}
