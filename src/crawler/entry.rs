//! Entry page parsing and CVE extraction.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};

use super::EntryError;
use crate::database::CveRecord;

static CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("section.ency_content").expect("valid selector"));
static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("valid selector"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2.title").expect("valid selector"));
static PARAGRAPH: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("valid selector"));

/// Extract one record per distinct CVE referenced by the entry.
///
/// Entries without CVE references yield an empty list.
pub fn parse_entry(html: &str, entry_url: &str, source: &str) -> Result<Vec<CveRecord>, EntryError> {
    let document = Html::parse_document(html);
    let content = document
        .select(&CONTENT)
        .next()
        .ok_or(EntryError::MissingContent)?;

    let cve_ids = cve_references(content);
    if cve_ids.is_empty() {
        return Ok(Vec::new());
    }

    let vuln_name = content
        .select(&TITLE)
        .next()
        .map(|title| collapse_whitespace(&title.text().collect::<String>()))
        .filter(|name| !name.is_empty())
        .ok_or(EntryError::MissingTitle)?;

    let description = content
        .select(&PARAGRAPH)
        .next()
        .map(format_description)
        .unwrap_or_default();

    Ok(cve_ids
        .into_iter()
        .map(|cve_id| CveRecord::new(cve_id, vuln_name.clone(), description.clone(), source, entry_url))
        .collect())
}

/// Anchor texts starting with `CVE`, in document order, without duplicates.
fn cve_references(content: ElementRef<'_>) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .select(&ANCHORS)
        .map(|anchor| anchor.text().collect::<String>().trim().to_string())
        .filter(|text| text.starts_with("CVE"))
        .filter(|text| seen.insert(text.clone()))
        .collect()
}

/// Flatten a description paragraph into plain text.
///
/// Line breaks are dropped, links are replaced by their text, and any other
/// markup is kept verbatim as HTML.
pub fn format_description(paragraph: ElementRef<'_>) -> String {
    let mut parts: Vec<String> = Vec::new();

    for child in paragraph.children() {
        match child.value() {
            Node::Text(text) => parts.push(text.text.to_string()),
            Node::Element(element) => {
                let Some(element_ref) = ElementRef::wrap(child) else {
                    continue;
                };
                match element.name() {
                    "br" => {}
                    "a" => parts.push(element_ref.text().collect()),
                    _ => parts.push(element_ref.html()),
                }
            }
            _ => {}
        }
    }

    let joined = parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    collapse_whitespace(&joined)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.fortiguard.com/encyclopedia/ips/51006";

    const LOG4J: &str = r#"
        <html><body>
        <section class="ency_content">
          <h2 class="title">Apache.Log4j.Error.Log.Remote.Code.Execution</h2>
          <p>This indicates an attack attempt to exploit a
             Remote Code Execution vulnerability in <a href="https://logging.apache.org">Apache Log4j</a>.<br/>
             The vulnerability is due to <em>insufficient</em> sanitizing.</p>
          <p>Second paragraph is ignored.</p>
          <h3>CVE References</h3>
          <a href="/encyclopedia/cve/1">CVE-2021-44228</a>
          <a href="/encyclopedia/cve/2"> CVE-2021-45046 </a>
          <a href="/encyclopedia/cve/1">CVE-2021-44228</a>
          <a href="/encyclopedia/other">Vendor advisory</a>
        </section>
        </body></html>
    "#;

    #[test]
    fn test_extracts_each_cve_once() {
        let records = parse_entry(LOG4J, URL, "ips").unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.cve_id.as_str()).collect();
        assert_eq!(ids, vec!["CVE-2021-44228", "CVE-2021-45046"]);

        let first = &records[0];
        assert_eq!(first.vuln_name, "Apache.Log4j.Error.Log.Remote.Code.Execution");
        assert_eq!(first.source, "ips");
        assert_eq!(first.entry_url, URL);
        assert_eq!(records[1].description, first.description);
    }

    #[test]
    fn test_description_formatting() {
        let records = parse_entry(LOG4J, URL, "ips").unwrap();
        assert_eq!(
            records[0].description,
            "This indicates an attack attempt to exploit a Remote Code Execution \
             vulnerability in Apache Log4j . The vulnerability is due to \
             <em>insufficient</em> sanitizing."
        );
    }

    #[test]
    fn test_entry_without_cves_is_empty() {
        let html = r#"
            <section class="ency_content">
              <h2 class="title">Some.Botnet</h2>
              <p>No references here.</p>
              <a href="/x">Related</a>
            </section>
        "#;
        assert!(parse_entry(html, URL, "ips").unwrap().is_empty());
    }

    #[test]
    fn test_missing_content_is_an_error() {
        let html = "<html><body><h1>Service Unavailable</h1></body></html>";
        assert_eq!(parse_entry(html, URL, "ips").unwrap_err(), EntryError::MissingContent);
    }

    #[test]
    fn test_missing_title_is_an_error() {
        let html = r#"<section class="ency_content"><p>x</p><a>CVE-2019-0001</a></section>"#;
        assert_eq!(parse_entry(html, URL, "ips").unwrap_err(), EntryError::MissingTitle);
    }

    #[test]
    fn test_missing_paragraph_gives_empty_description() {
        let html = r#"
            <section class="ency_content">
              <h2 class="title">FortiClient.Issue</h2>
              <a>CVE-2020-9290</a>
            </section>
        "#;
        let records = parse_entry(html, URL, "forticlientvuln").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].description, "");
    }
}
