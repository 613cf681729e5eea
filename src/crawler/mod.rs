//! Encyclopedia crawler.
//!
//! Walks each source's listing pages in order, fetches the entries on every
//! page concurrently and hands the extracted CVE records to a [`RecordSink`]
//! in batches.
//!
//! - `fetcher` - HTTP access behind the [`PageFetcher`] trait
//! - `listing` - entry links from a listing page
//! - `entry` - CVE records from an entry page
//! - `user_agent` - user agent rotation
//! - `report` - failure log and run summary

mod entry;
mod error;
mod fetcher;
mod listing;
mod report;
mod user_agent;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

pub use entry::parse_entry;
pub use error::{CrawlError, EntryError, FetchError};
pub use fetcher::{HttpFetcher, PageFetcher};
pub use listing::parse_listing;
pub use report::{CrawlReport, FailedEntry, FailureLog, SourceSummary};
pub use user_agent::UserAgentRotator;

use crate::cache::{CacheConfig, CacheError, CacheRegistry, TypedCache};
use crate::config::{CrawlSettings, Source};
use crate::database::CveRecord;

/// Destination for extracted records.
pub trait RecordSink: Send + Sync {
    /// Persist a batch, returning how many records were written.
    fn save_batch(
        &self,
        records: Vec<CveRecord>,
    ) -> impl Future<Output = anyhow::Result<usize>> + Send;
}

/// Crawls every configured source once.
pub struct Crawler<F, S> {
    fetcher: F,
    sink: S,
    settings: CrawlSettings,
    agents: UserAgentRotator,
    visited: TypedCache<String, ()>,
    failures: FailureLog,
    pending: Vec<CveRecord>,
    persisted: usize,
    interrupted: bool,
    shutdown: Arc<AtomicBool>,
}

impl<F, S> Crawler<F, S>
where
    F: PageFetcher,
    S: RecordSink,
{
    pub fn new(
        fetcher: F,
        sink: S,
        mut settings: CrawlSettings,
        cache: &CacheRegistry,
    ) -> Result<Self, CacheError> {
        settings.flush_every = settings.flush_every.max(1);
        settings.max_concurrency = settings.max_concurrency.max(1);
        settings.page_retries = settings.page_retries.max(1);

        let visited = cache.get_or_create("visited_entries", CacheConfig::visited_entries())?;
        let agents = UserAgentRotator::new(settings.user_agents.clone(), settings.rotate_every);

        Ok(Self {
            fetcher,
            sink,
            settings,
            agents,
            visited,
            failures: FailureLog::new(),
            pending: Vec::new(),
            persisted: 0,
            interrupted: false,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that stops the crawl after the current page when set.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Crawl all sources in order.
    ///
    /// Pending records are flushed before a fatal error is returned.
    pub async fn run(mut self) -> Result<CrawlReport, CrawlError> {
        let sources = self.settings.sources.clone();
        let mut summaries = Vec::with_capacity(sources.len());

        for source in &sources {
            if self.shutdown_requested() {
                break;
            }

            info!("Crawling source {}", source.name);
            match self.crawl_source(source).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    if let Err(flush_err) = self.flush().await {
                        error!("Failed to flush pending records: {}", flush_err);
                    }
                    return Err(e);
                }
            }
        }

        self.flush().await?;

        debug!("{} entries visited this run", self.visited.entry_count());

        let failures = self.failures.snapshot();
        if !failures.is_empty() {
            warn!("{} entries could not be processed", failures.len());
        }

        Ok(CrawlReport {
            sources: summaries,
            persisted: self.persisted,
            failures,
            interrupted: self.interrupted,
        })
    }

    fn shutdown_requested(&mut self) -> bool {
        if self.shutdown.load(Ordering::SeqCst) {
            if !self.interrupted {
                info!("Shutdown requested, stopping crawl");
            }
            self.interrupted = true;
        }
        self.interrupted
    }

    async fn crawl_source(&mut self, source: &Source) -> Result<SourceSummary, CrawlError> {
        let mut summary = SourceSummary::new(&source.name);
        let mut page = self.settings.start_page;

        loop {
            if self.shutdown_requested() {
                break;
            }

            if let Some(max) = self.settings.max_pages
                && summary.pages >= max
            {
                info!("Reached page limit ({}) for {}", max, source.name);
                break;
            }

            let user_agent = self.agents.for_page(page).to_string();

            let Some(entries) = self.fetch_listing(source, page, &user_agent).await? else {
                info!("Crawled all pages of {}", source.name);
                break;
            };

            let total = entries.len();
            let fresh: Vec<String> = entries
                .into_iter()
                .filter(|url| !self.visited.contains(url))
                .collect();

            // Out-of-range pages that echo an earlier page would loop forever.
            if fresh.is_empty() {
                info!("Page {} of {} only repeats crawled entries, stopping", page, source.name);
                break;
            }
            if fresh.len() < total {
                debug!("Skipping {} already crawled entries on page {}", total - fresh.len(), page);
            }

            info!("Working on page {} of {} ({} entries)", page, source.name, total);
            summary.entries += fresh.len();

            let records = self.crawl_entries(source, page, fresh, &user_agent).await;
            summary.records += records.len();
            summary.pages += 1;
            self.pending.extend(records);

            if page % self.settings.flush_every == 0 {
                self.flush().await?;
            }

            page += 1;
        }

        self.flush().await?;
        Ok(summary)
    }

    /// Fetch a listing page, retrying while it comes back empty or fails.
    ///
    /// Returns `None` once the listing is over: a results block without
    /// entries, or a 404. Error statuses, transport failures and pages
    /// without a results block are failed attempts; a page that fails every
    /// attempt is fatal.
    async fn fetch_listing(
        &self,
        source: &Source,
        page: u32,
        user_agent: &str,
    ) -> Result<Option<Vec<String>>, CrawlError> {
        let url = source.page_url(page);
        let attempts = self.settings.page_retries;
        let mut finished = false;
        let mut last_error = None;

        for attempt in 1..=attempts {
            let outcome = self.fetcher.fetch(&url, user_agent).await.and_then(|body| {
                parse_listing(&body, &self.settings.base_url)
                    .ok_or_else(|| FetchError::NoResults { url: url.clone() })
            });

            match outcome {
                Ok(entries) if !entries.is_empty() => return Ok(Some(entries)),
                Ok(_) => {
                    finished = true;
                    debug!("No entries on {} (attempt {}/{})", url, attempt, attempts);
                }
                Err(e) if e.is_not_found() => {
                    finished = true;
                    debug!("{} (attempt {}/{})", e, attempt, attempts);
                }
                Err(e) => {
                    warn!("Listing {} attempt {}/{} failed: {}", url, attempt, attempts, e);
                    last_error = Some(e);
                }
            }

            if attempt < attempts && !self.settings.retry_delay.is_zero() {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }

        match last_error {
            Some(source) if !finished => Err(CrawlError::Listing {
                url,
                attempts,
                source,
            }),
            _ => Ok(None),
        }
    }

    async fn crawl_entries(
        &self,
        source: &Source,
        page: u32,
        entries: Vec<String>,
        user_agent: &str,
    ) -> Vec<CveRecord> {
        let results: Vec<Vec<CveRecord>> = stream::iter(entries)
            .map(|url| self.crawl_entry(source, page, url, user_agent))
            .buffer_unordered(self.settings.max_concurrency)
            .collect()
            .await;

        results.into_iter().flatten().collect()
    }

    async fn crawl_entry(
        &self,
        source: &Source,
        page: u32,
        url: String,
        user_agent: &str,
    ) -> Vec<CveRecord> {
        debug!("Working on entry {}", url);

        let outcome = match self.fetcher.fetch(&url, user_agent).await {
            Ok(body) => parse_entry(&body, &url, &source.name).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        // Failed entries count as visited too; they are reported, not retried.
        self.visited.insert(url.clone(), ());

        match outcome {
            Ok(records) => {
                if !records.is_empty() {
                    debug!("{} CVE references in {}", records.len(), url);
                }
                records
            }
            Err(reason) => {
                warn!("Entry on page {} could not be retrieved, skipping {}: {}", page, url, reason);
                self.failures.record(FailedEntry {
                    url,
                    source: source.name.clone(),
                    page,
                    reason,
                });
                Vec::new()
            }
        }
    }

    async fn flush(&mut self) -> Result<(), CrawlError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.pending);
        let count = batch.len();
        let written = self.sink.save_batch(batch).await?;
        self.persisted += written;

        info!("Flushed {} records ({} written)", count, written);
        Ok(())
    }
}
