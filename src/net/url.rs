//! URL normalization shared by listing, details and page extraction.
//!
//! Sites hand out every flavour of link: absolute, protocol-relative
//! (`//cdn.example.com/x.jpg`), root-relative and document-relative. Items
//! store a canonical site-relative `url` plus absolute public and cover URLs.

use url::Url;

/// Resolves `raw` against `https://{domain}/`.
///
/// Absolute `http(s)` URLs are returned unchanged, protocol-relative URLs get
/// `https:`. Blank input gives an empty string.
///
/// ```rust
/// use yomikomi::net::url::to_absolute;
///
/// assert_eq!(to_absolute("/img/x.jpg", "example.com"), "https://example.com/img/x.jpg");
/// assert_eq!(to_absolute("https://cdn.test/a.png", "example.com"), "https://cdn.test/a.png");
/// assert_eq!(to_absolute("//cdn.test/a.png", "example.com"), "https://cdn.test/a.png");
/// ```
pub fn to_absolute(raw: &str, domain: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    if has_http_scheme(raw) {
        return raw.to_string();
    }
    if let Some(rest) = raw.strip_prefix("//") {
        return format!("https://{rest}");
    }

    match site_root(domain).and_then(|base| base.join(raw).ok()) {
        Some(url) => url.to_string(),
        None => format!("https://{}/{}", domain, raw.trim_start_matches('/')),
    }
}

/// Reduces `raw` to a site-relative URL (path, query and fragment).
///
/// URLs pointing at another host are kept absolute so they still resolve.
///
/// ```rust
/// use yomikomi::net::url::to_relative;
///
/// assert_eq!(to_relative("https://example.com/truyen/a?x=1", "example.com"), "/truyen/a?x=1");
/// assert_eq!(to_relative("truyen/a", "example.com"), "/truyen/a");
/// ```
pub fn to_relative(raw: &str, domain: &str) -> String {
    let absolute = to_absolute(raw, domain);
    let Ok(url) = Url::parse(&absolute) else {
        return raw.trim().to_string();
    };

    let same_host = url
        .host_str()
        .is_some_and(|host| host.eq_ignore_ascii_case(domain) || is_www_alias(host, domain));
    if !same_host {
        return absolute;
    }

    let mut relative = url.path().to_string();
    if let Some(query) = url.query() {
        relative.push('?');
        relative.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        relative.push('#');
        relative.push_str(fragment);
    }
    relative
}

fn site_root(domain: &str) -> Option<Url> {
    Url::parse(&format!("https://{}/", domain.trim_end_matches('/'))).ok()
}

fn has_http_scheme(raw: &str) -> bool {
    let lower = raw.get(..8).unwrap_or(raw).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn is_www_alias(host: &str, domain: &str) -> bool {
    let strip = |h: &str| h.trim_start_matches("www.").to_ascii_lowercase();
    strip(host) == strip(domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/img/x.jpg", "https://example.com/img/x.jpg")]
    #[case("img/x.jpg", "https://example.com/img/x.jpg")]
    #[case("  /img/x.jpg  ", "https://example.com/img/x.jpg")]
    #[case("https://cdn.test/a.png", "https://cdn.test/a.png")]
    #[case("HTTP://cdn.test/A.png", "HTTP://cdn.test/A.png")]
    #[case("//cdn.test/a.png", "https://cdn.test/a.png")]
    #[case("", "")]
    fn absolute_urls(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(to_absolute(raw, "example.com"), expected);
    }

    #[rstest]
    #[case("https://example.com/truyen/a/", "/truyen/a/")]
    #[case("https://www.example.com/truyen/a", "/truyen/a")]
    #[case("/truyen/a?page=2", "/truyen/a?page=2")]
    #[case("https://other.test/truyen/a", "https://other.test/truyen/a")]
    fn relative_urls(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(to_relative(raw, "example.com"), expected);
    }
}
