//! CVE repository with write-skipping cache.
//!
//! Records are upserted by CVE id. The last written record per id is cached,
//! so re-crawling unchanged entries costs no database writes.

use std::collections::HashMap;

use anyhow::Result;
use futures::future::try_join_all;
use mongodb::bson::doc;
use mongodb::options::UpdateOptions;
use mongodb::{Collection, IndexModel};
use tracing::{debug, info};

use crate::cache::{CacheConfig, CacheRegistry, TypedCache};
use crate::crawler::RecordSink;
use crate::database::models::CveRecord;
use crate::database::Database;

/// Repository for CVE records.
pub struct CveRepository {
    collection: Collection<CveRecord>,
    cache: TypedCache<String, CveRecord>,
    batch_size: usize,
}

impl CveRepository {
    pub fn new(
        db: &Database,
        cache: &CacheRegistry,
        collection: &str,
        batch_size: usize,
    ) -> Result<Self> {
        let records_cache = cache.get_or_create("persisted_records", CacheConfig::persisted_records())?;

        Ok(Self {
            collection: db.collection(collection),
            cache: records_cache,
            batch_size: batch_size.max(1),
        })
    }

    /// Create secondary indexes used for querying by source.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let index = IndexModel::builder().keys(doc! { "source": 1 }).build();
        self.collection.create_index(index).await?;
        debug!("Ensured index on source");
        Ok(())
    }

    /// Upsert records in chunks of `batch_size`, skipping unchanged ones.
    ///
    /// Returns the number of records written.
    pub async fn save_batch(&self, records: Vec<CveRecord>) -> Result<usize> {
        let total = records.len();
        let changed = changed_records(&self.cache, records);
        if changed.is_empty() {
            debug!("No changed records out of {}", total);
            return Ok(0);
        }

        let options = UpdateOptions::builder().upsert(true).build();
        let options = &options;

        for chunk in changed.chunks(self.batch_size) {
            try_join_all(chunk.iter().map(|record| async move {
                self.collection
                    .update_one(record.id_filter(), record.upsert_update())
                    .with_options(options.clone())
                    .await
            }))
            .await?;

            for record in chunk {
                self.cache.insert(record.cve_id.clone(), record.clone());
            }
            debug!("Upserted chunk of {} records", chunk.len());
        }

        info!("Saved {} records ({} unchanged)", changed.len(), total - changed.len());
        Ok(changed.len())
    }
}

impl RecordSink for CveRepository {
    async fn save_batch(&self, records: Vec<CveRecord>) -> Result<usize> {
        CveRepository::save_batch(self, records).await
    }
}

/// Collapse duplicate ids (last one wins) and drop records matching the cache.
/// Order of first appearance is kept.
fn changed_records(cache: &TypedCache<String, CveRecord>, records: Vec<CveRecord>) -> Vec<CveRecord> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<CveRecord> = Vec::with_capacity(records.len());

    for record in records {
        match positions.get(&record.cve_id) {
            Some(&idx) => unique[idx] = record,
            None => {
                positions.insert(record.cve_id.clone(), unique.len());
                unique.push(record);
            }
        }
    }

    unique
        .into_iter()
        .filter(|record| match cache.get(&record.cve_id) {
            Some(previous) => record.has_changed(&previous),
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str) -> CveRecord {
        CveRecord::new(id, name, "desc", "ips", "https://www.fortiguard.com/encyclopedia/ips/1")
    }

    #[test]
    fn test_changed_records_skips_cached() {
        let cache: TypedCache<String, CveRecord> = TypedCache::new("t", CacheConfig::persisted_records());
        cache.insert("CVE-2020-0001".to_string(), record("CVE-2020-0001", "Old"));
        cache.insert("CVE-2020-0002".to_string(), record("CVE-2020-0002", "Same"));

        let changed = changed_records(
            &cache,
            vec![
                record("CVE-2020-0001", "New"),
                record("CVE-2020-0002", "Same"),
                record("CVE-2020-0003", "Fresh"),
            ],
        );

        let ids: Vec<&str> = changed.iter().map(|r| r.cve_id.as_str()).collect();
        assert_eq!(ids, vec!["CVE-2020-0001", "CVE-2020-0003"]);
    }

    #[test]
    fn test_changed_records_last_duplicate_wins() {
        let cache: TypedCache<String, CveRecord> = TypedCache::new("t", CacheConfig::persisted_records());

        let changed = changed_records(
            &cache,
            vec![
                record("CVE-2020-0001", "First"),
                record("CVE-2020-0002", "Other"),
                record("CVE-2020-0001", "Second"),
            ],
        );

        assert_eq!(changed.len(), 2);
        assert_eq!(changed[0].cve_id, "CVE-2020-0001");
        assert_eq!(changed[0].vuln_name, "Second");
    }
}
