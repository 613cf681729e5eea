//! Crawl outcome reporting.

use dashmap::DashMap;
use serde::Serialize;

/// An entry that could not be processed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedEntry {
    pub url: String,
    pub source: String,
    pub page: u32,
    pub reason: String,
}

/// Entry failures collected concurrently while a page is processed.
#[derive(Debug, Default)]
pub struct FailureLog {
    entries: DashMap<String, FailedEntry>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure. A later failure for the same URL replaces the earlier one.
    pub fn record(&self, failure: FailedEntry) {
        self.entries.insert(failure.url.clone(), failure);
    }

    /// Failures ordered by source, page and URL.
    pub fn snapshot(&self) -> Vec<FailedEntry> {
        let mut failures: Vec<FailedEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        failures.sort_by(|a, b| {
            (a.source.as_str(), a.page, a.url.as_str()).cmp(&(b.source.as_str(), b.page, b.url.as_str()))
        });
        failures
    }
}

/// Per-source counters.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SourceSummary {
    pub source: String,
    pub pages: u32,
    pub entries: usize,
    pub records: usize,
}

impl SourceSummary {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }
}

/// Result of a crawl run, logged as JSON when the run ends.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlReport {
    pub sources: Vec<SourceSummary>,
    /// Records written to the store (unchanged records are not counted).
    pub persisted: usize,
    pub failures: Vec<FailedEntry>,
    /// The run stopped early on a shutdown request.
    pub interrupted: bool,
}

impl CrawlReport {
    pub fn total_records(&self) -> usize {
        self.sources.iter().map(|s| s.records).sum()
    }

    pub fn total_entries(&self) -> usize {
        self.sources.iter().map(|s| s.entries).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(url: &str, page: u32, reason: &str) -> FailedEntry {
        FailedEntry {
            url: url.to_string(),
            source: "ips".to_string(),
            page,
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_failure_log_dedupes_and_sorts() {
        let log = FailureLog::new();
        log.record(failure("https://x/2", 2, "timeout"));
        log.record(failure("https://x/1", 1, "timeout"));
        log.record(failure("https://x/2", 2, "status 503"));

        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].url, "https://x/1");
        assert_eq!(snapshot[1].reason, "status 503");
    }

    #[test]
    fn test_report_serializes() {
        let report = CrawlReport {
            sources: vec![SourceSummary {
                source: "ips".into(),
                pages: 2,
                entries: 10,
                records: 4,
            }],
            persisted: 4,
            failures: vec![],
            interrupted: false,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["sources"][0]["records"], 4);
        assert_eq!(json["interrupted"], false);
        assert_eq!(report.total_records(), 4);
        assert_eq!(report.total_entries(), 10);
    }
}
