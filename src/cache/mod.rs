//! Cache module - named in-memory caches backed by Moka.
//!
//! The crawler keeps two caches for the lifetime of a run:
//! - `visited_entries` - entry URLs already crawled, so repeated listings
//!   do not trigger another fetch
//! - `persisted_records` - the last record written per CVE id, so unchanged
//!   records are not rewritten
//!
//! ## Usage
//!
//! ```rust
//! let registry = CacheRegistry::new();
//! let visited = registry.get_or_create::<String, ()>("visited_entries", CacheConfig::visited_entries())?;
//!
//! visited.insert(url.clone(), ());
//! assert!(visited.contains(&url));
//! ```

mod config;
mod registry;
mod typed;

pub use config::CacheConfig;
pub use registry::{CacheError, CacheRegistry};
pub use typed::TypedCache;
