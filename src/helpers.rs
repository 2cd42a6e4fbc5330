use regex::Regex;

/// Lowercase ASCII slug: diacritics folded (including đ -> d), everything
/// that is not alphanumeric or whitespace dropped, whitespace runs become '-'.
pub fn slugify(input: &str) -> String {
    let mut folded = String::with_capacity(input.len());
    for c in input.chars() {
        match fold_char(c) {
            Some(f) => folded.push_str(f),
            None => folded.push(c),
        }
    }
    let mut out = String::with_capacity(folded.len());
    let mut last_dash = true; // suppress a leading dash
    for c in folded.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_dash = false;
        } else if c.is_whitespace() && !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    if out.ends_with('-') {
        out.pop();
    }
    out
}

/// Vietnamese-oriented diacritic fold. Covers the letters the source site
/// actually uses in titles; anything else passes through untouched.
fn fold_char(c: char) -> Option<&'static str> {
    let f = match c {
        'à' | 'á' | 'ạ' | 'ả' | 'ã' | 'â' | 'ầ' | 'ấ' | 'ậ' | 'ẩ' | 'ẫ' | 'ă' | 'ằ' | 'ắ'
        | 'ặ' | 'ẳ' | 'ẵ' => "a",
        'è' | 'é' | 'ẹ' | 'ẻ' | 'ẽ' | 'ê' | 'ề' | 'ế' | 'ệ' | 'ể' | 'ễ' => "e",
        'ì' | 'í' | 'ị' | 'ỉ' | 'ĩ' => "i",
        'ò' | 'ó' | 'ọ' | 'ỏ' | 'õ' | 'ô' | 'ồ' | 'ố' | 'ộ' | 'ổ' | 'ỗ' | 'ơ' | 'ờ' | 'ớ'
        | 'ợ' | 'ở' | 'ỡ' => "o",
        'ù' | 'ú' | 'ụ' | 'ủ' | 'ũ' | 'ư' | 'ừ' | 'ứ' | 'ự' | 'ử' | 'ữ' => "u",
        'ỳ' | 'ý' | 'ỵ' | 'ỷ' | 'ỹ' => "y",
        'đ' => "d",
        'À' | 'Á' | 'Ạ' | 'Ả' | 'Ã' | 'Â' | 'Ă' => "A",
        'È' | 'É' | 'Ẹ' | 'Ẻ' | 'Ẽ' | 'Ê' => "E",
        'Ì' | 'Í' | 'Ị' | 'Ỉ' | 'Ĩ' => "I",
        'Ò' | 'Ó' | 'Ọ' | 'Ỏ' | 'Õ' | 'Ô' | 'Ơ' => "O",
        'Ù' | 'Ú' | 'Ụ' | 'Ủ' | 'Ũ' | 'Ư' => "U",
        'Ỳ' | 'Ý' | 'Ỵ' | 'Ỷ' | 'Ỹ' => "Y",
        'Đ' => "D",
        _ => return None,
    };
    Some(f)
}

/// Resolve a possibly-relative URL against a base. Protocol-relative URLs
/// (`//cdn...`) get https; anything already absolute is returned as-is.
pub fn ensure_absolute(url: &str, base: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    if let Some(rest) = url.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    let base = base.trim_end_matches('/');
    if url.starts_with('/') {
        // join against the origin, not the full base path
        format!("{}{}", origin_of(base), url)
    } else {
        format!("{}/{}", base, url)
    }
}

/// scheme://host portion of a URL, without any path.
pub fn origin_of(url: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let after = &url[scheme_end + 3..];
        let host_end = after.find('/').unwrap_or(after.len());
        return url[..scheme_end + 3 + host_end].to_string();
    }
    url.to_string()
}

/// Rewrite a chapter URL saved under an older site host/path convention into
/// the form the current source base expects:
///  - host swapped to the current base host (sites rotate domains)
///  - `/chuong-N` aliased to `/chapter-N`
///  - `/chapter-chapter-N` duplicates collapsed
///  - a bare trailing `/N` gains the `chapter-` prefix
pub fn normalize_chapter_url(url: &str, base_url: &str) -> String {
    let mut u = ensure_absolute(url, base_url);

    let base_origin = origin_of(base_url);
    if let Some(scheme_end) = u.find("://") {
        let after = &u[scheme_end + 3..];
        let path_start = after.find('/').map(|i| scheme_end + 3 + i);
        u = match path_start {
            Some(i) => format!("{}{}", base_origin, &u[i..]),
            None => base_origin.clone(),
        };
    }

    let chuong = Regex::new(r"/chuong-(\d+)").unwrap();
    u = chuong.replace_all(&u, "/chapter-$1").into_owned();

    let doubled = Regex::new(r"/chapter-chapter-(\d+)").unwrap();
    u = doubled.replace_all(&u, "/chapter-$1").into_owned();

    let bare_tail = Regex::new(r"/(\d+)$").unwrap();
    if !u.contains("/chapter-") {
        u = bare_tail.replace(&u, "/chapter-$1").into_owned();
    }

    u
}

/// Last path segment of a URL, e.g. the title slug from a detail URL.
pub fn last_path_segment(url: &str) -> Option<String> {
    let no_query = url.split(['?', '#']).next().unwrap_or(url);
    no_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains("://"))
        .map(|s| s.to_string())
}

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("one piece"), "one-piece");
        assert_eq!(slugify("One Piece!"), "one-piece");
    }

    #[test]
    fn slugify_vietnamese() {
        assert_eq!(slugify("Đảo Hải Tặc"), "dao-hai-tac");
        assert_eq!(slugify("Thám Tử Lừng Danh"), "tham-tu-lung-danh");
    }

    #[test]
    fn absolute_urls_pass_through() {
        assert_eq!(
            ensure_absolute("https://cdn.example/x.jpg", "https://site.example"),
            "https://cdn.example/x.jpg"
        );
        assert_eq!(
            ensure_absolute("//cdn.example/x.jpg", "https://site.example"),
            "https://cdn.example/x.jpg"
        );
    }

    #[test]
    fn relative_urls_join_origin() {
        assert_eq!(
            ensure_absolute("/truyen-tranh/one-piece", "https://site.example/path"),
            "https://site.example/truyen-tranh/one-piece"
        );
    }

    #[test]
    fn host_rewritten_to_current_base() {
        let out = normalize_chapter_url(
            "https://old.example/truyen-tranh/one-piece/chapter-12",
            "https://new.example",
        );
        assert_eq!(out, "https://new.example/truyen-tranh/one-piece/chapter-12");
    }

    #[test]
    fn chuong_alias_and_duplicates_collapse() {
        assert_eq!(
            normalize_chapter_url("https://s.example/t/one-piece/chuong-5", "https://s.example"),
            "https://s.example/t/one-piece/chapter-5"
        );
        assert_eq!(
            normalize_chapter_url(
                "https://s.example/t/one-piece/chapter-chapter-5",
                "https://s.example"
            ),
            "https://s.example/t/one-piece/chapter-5"
        );
    }

    #[test]
    fn bare_numeric_tail_gets_prefix() {
        assert_eq!(
            normalize_chapter_url("https://s.example/t/one-piece/7", "https://s.example"),
            "https://s.example/t/one-piece/chapter-7"
        );
    }

    #[test]
    fn last_segment() {
        assert_eq!(
            last_path_segment("https://s.example/truyen-tranh/one-piece/").as_deref(),
            Some("one-piece")
        );
        assert_eq!(
            last_path_segment("https://s.example/a/b?page=2").as_deref(),
            Some("b")
        );
    }
}
