//! FortiGuard CVE crawler
//!
//! Crawls the FortiGuard encyclopedia (IPS and FortiClient vulnerability
//! listings) for CVE references and stores them in MongoDB.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `database` - MongoDB integration
//! - `cache` - Run-scoped caches with Moka
//! - `crawler` - Listing/entry crawling and CVE extraction

mod cache;
mod config;
mod crawler;
mod database;

use std::sync::atomic::Ordering;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cache::CacheRegistry;
use config::Config;
use crawler::{Crawler, HttpFetcher};
use database::{CveRepository, Database};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fortiguard_cve_crawler=info,mongodb=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("Starting FortiGuard CVE crawler...");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: {} sources, concurrency {}",
        config.crawl.sources.len(),
        config.crawl.max_concurrency
    );

    info!("Connecting to MongoDB...");
    let db = Database::connect(&config.mongodb_uri, &config.mongodb_database).await?;

    let cache = CacheRegistry::new();
    let repository = CveRepository::new(&db, &cache, &config.mongodb_collection, config.batch_size)?;
    repository.ensure_indexes().await?;
    info!(
        "Storing records in {}.{}",
        config.mongodb_database, config.mongodb_collection
    );

    let fetcher = HttpFetcher::new(config.crawl.request_timeout)?;
    let crawler = Crawler::new(fetcher, repository, config.crawl.clone(), &cache)?;

    // First Ctrl+C finishes the current page, flushes and stops; a second one exits at once
    let shutdown = crawler.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, finishing current page (Ctrl+C again to exit now)...");
        shutdown.store(true, Ordering::SeqCst);

        if tokio::signal::ctrl_c().await.is_ok() {
            error!("Second interrupt received, exiting without flushing");
            std::process::exit(130);
        }
    });

    let report = crawler.run().await?;

    info!(
        "Crawl finished: {} entries, {} CVE references, {} written, {} failed",
        report.total_entries(),
        report.total_records(),
        report.persisted,
        report.failures.len()
    );
    info!("Report: {}", serde_json::to_string(&report)?);

    Ok(())
}
