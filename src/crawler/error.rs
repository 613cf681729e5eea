//! Crawl errors.

use thiserror::Error;

/// Failure to retrieve a page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// No usable answer: connection, TLS, timeout or body read failure.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The server answered with a non-success status.
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    /// A listing page came back without a results block.
    #[error("{url} has no results listing")]
    NoResults { url: String },
}

impl FetchError {
    /// Whether the server reported that the page does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Status { status: 404, .. })
    }
}

/// Failure to extract CVE data from an entry page.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryError {
    #[error("entry has no content section")]
    MissingContent,

    #[error("entry references CVEs but has no title")]
    MissingTitle,
}

/// Fatal crawl errors. Entry-level failures are logged, not raised.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("listing page {url} unavailable after {attempts} attempts")]
    Listing {
        url: String,
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Persist(#[from] anyhow::Error),
}
