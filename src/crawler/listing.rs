//! Listing page parsing.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

static RESULTS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.results").expect("valid selector"));
static LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Extract entry links from a listing page, resolved against `base`.
///
/// Only the first `div.results` block is considered. Links inside a `nav`
/// (pagination) are skipped. A results block without links marks the end of
/// a listing. `None` means the page has no results block at all, which is
/// what throttling, captcha and maintenance pages look like.
pub fn parse_listing(html: &str, base: &Url) -> Option<Vec<String>> {
    let document = Html::parse_document(html);
    let results = document.select(&RESULTS).next()?;

    let mut seen = HashSet::new();
    let links = results
        .select(&LINKS)
        .filter(|link| !inside_nav(link))
        .filter_map(|link| link.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty() && !href.starts_with('#'))
        .filter_map(|href| base.join(href).ok())
        .map(String::from)
        .filter(|url| seen.insert(url.clone()))
        .collect();

    Some(links)
}

fn inside_nav(element: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| ancestor.value().name() == "nav")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.fortiguard.com").unwrap()
    }

    #[test]
    fn test_extracts_entry_links() {
        let html = r#"
            <html><body>
              <div class="header"><a href="/home">Home</a></div>
              <div class="results">
                <div class="row"><a href="/encyclopedia/ips/51006">Log4j</a></div>
                <div class="row"><a href="/encyclopedia/ips/48123">Struts</a></div>
                <div class="row"><a href="/encyclopedia/ips/51006">Log4j again</a></div>
                <nav><ul>
                  <li><a href="/encyclopedia?type=ips&page=2">Next</a></li>
                </ul></nav>
              </div>
            </body></html>
        "#;

        let links = parse_listing(html, &base()).unwrap();
        assert_eq!(
            links,
            vec![
                "https://www.fortiguard.com/encyclopedia/ips/51006",
                "https://www.fortiguard.com/encyclopedia/ips/48123",
            ]
        );
    }

    #[test]
    fn test_missing_results_block_is_not_a_listing() {
        let html = "<html><body><p>Too many requests</p></body></html>";
        assert_eq!(parse_listing(html, &base()), None);
    }

    #[test]
    fn test_results_with_only_pagination_is_empty() {
        let html = r##"
            <div class="results">
              <p>No results found</p>
              <nav><a href="/encyclopedia?type=ips&page=1">Prev</a></nav>
              <a href="#top">Top</a>
            </div>
        "##;
        assert_eq!(parse_listing(html, &base()), Some(vec![]));
    }

    #[test]
    fn test_absolute_links_are_kept() {
        let html = r#"<div class="results"><a href="https://fortiguard.com/encyclopedia/ips/1">x</a></div>"#;
        assert_eq!(
            parse_listing(html, &base()),
            Some(vec!["https://fortiguard.com/encyclopedia/ips/1".to_string()])
        );
    }
}
