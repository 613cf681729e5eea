//! Configuration module for the crawler.
//!
//! Loads configuration from environment variables (and `.env`).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.fortiguard.com";
const DEFAULT_SOURCES: &str = "ips,forticlientvuln";

const DEFAULT_USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/13.1.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:77.0) Gecko/20100101 Firefox/77.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/83.0.4103.97 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:77.0) Gecko/20100101 Firefox/77.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/83.0.4103.97 Safari/537.36",
];

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// One encyclopedia listing to crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Encyclopedia type, e.g. `ips`.
    pub name: String,
    /// Listing URL without the page number.
    pub listing_url: String,
}

impl Source {
    /// Build a source for the given encyclopedia type.
    pub fn new(base_url: &Url, name: &str) -> Self {
        let root = base_url.as_str().trim_end_matches('/');
        Self {
            name: name.to_string(),
            listing_url: format!("{root}/encyclopedia?type={name}&page="),
        }
    }

    /// URL of a single listing page.
    pub fn page_url(&self, page: u32) -> String {
        format!("{}{}", self.listing_url, page)
    }
}

/// Crawl behaviour settings.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub base_url: Url,
    pub sources: Vec<Source>,
    pub user_agents: Vec<String>,

    /// Rotate user agent on every page number that is a multiple of this.
    pub rotate_every: u32,

    /// Entry pages fetched concurrently.
    pub max_concurrency: usize,

    /// Attempts per listing page before the source is considered done.
    pub page_retries: u32,
    pub retry_delay: Duration,

    /// Flush pending records every N pages.
    pub flush_every: u32,
    pub start_page: u32,
    pub max_pages: Option<u32>,
    pub request_timeout: Duration,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // MongoDB
    pub mongodb_uri: String,
    pub mongodb_database: String,
    pub mongodb_collection: String,

    /// Upserts per write batch.
    pub batch_size: usize,

    pub crawl: CrawlSettings,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mongodb_uri = get("MONGODB_URI").ok_or(ConfigError::Missing("MONGODB_URI"))?;

        let base_raw = get("CRAWL_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base_raw).map_err(|e| ConfigError::Invalid {
            key: "CRAWL_BASE_URL",
            value: base_raw.clone(),
            reason: e.to_string(),
        })?;

        let sources: Vec<Source> = get("CRAWL_SOURCES")
            .unwrap_or_else(|| DEFAULT_SOURCES.to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|name| Source::new(&base_url, name))
            .collect();
        if sources.is_empty() {
            return Err(ConfigError::Invalid {
                key: "CRAWL_SOURCES",
                value: String::new(),
                reason: "at least one source is required".into(),
            });
        }

        let user_agents: Vec<String> = match get("CRAWL_USER_AGENTS") {
            Some(raw) => raw
                .split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        };
        if user_agents.is_empty() {
            return Err(ConfigError::Invalid {
                key: "CRAWL_USER_AGENTS",
                value: String::new(),
                reason: "at least one user agent is required".into(),
            });
        }

        let max_pages = match get("CRAWL_MAX_PAGES") {
            Some(raw) => Some(parse_positive("CRAWL_MAX_PAGES", &raw)?),
            None => None,
        };

        let crawl = CrawlSettings {
            base_url,
            sources,
            user_agents,
            rotate_every: positive_or(&get, "CRAWL_ROTATE_EVERY", 20)?,
            max_concurrency: positive_or(&get, "CRAWL_MAX_CONCURRENCY", 5)?,
            page_retries: positive_or(&get, "CRAWL_PAGE_RETRIES", 3)?,
            retry_delay: Duration::from_secs(number_or(&get, "CRAWL_RETRY_DELAY_SECS", 3)?),
            flush_every: positive_or(&get, "CRAWL_FLUSH_EVERY", 10)?,
            start_page: positive_or(&get, "CRAWL_START_PAGE", 1)?,
            max_pages,
            request_timeout: Duration::from_secs(positive_or(&get, "HTTP_TIMEOUT_SECS", 30)?),
        };

        Ok(Self {
            mongodb_uri,
            mongodb_database: get("MONGODB_DATABASE")
                .unwrap_or_else(|| "alienvault_interview_db".to_string()),
            mongodb_collection: get("MONGODB_COLLECTION")
                .unwrap_or_else(|| "alienvault_interview_collection".to_string()),
            batch_size: positive_or(&get, "CRAWL_BATCH_SIZE", 500)?,
            crawl,
        })
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_positive<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let value = parse_number::<T>(key, raw)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

fn number_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_number(key, &raw),
        None => Ok(default),
    }
}

fn positive_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_positive(key, &raw),
        None => Ok(default),
    }
}
