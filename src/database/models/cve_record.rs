//! CVE reference model.

use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};

/// One CVE referenced by an encyclopedia entry.
///
/// Keyed by the CVE identifier, so a CVE referenced by several entries keeps
/// the details of the entry that was crawled last.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CveRecord {
    /// CVE identifier, e.g. `CVE-2021-44228`
    #[serde(rename = "_id")]
    pub cve_id: String,

    /// Vulnerability name from the entry title
    pub vuln_name: String,

    /// Formatted vulnerability description
    #[serde(default)]
    pub description: String,

    /// Encyclopedia type the entry was found under (`ips`, `forticlientvuln`)
    pub source: String,

    pub entry_url: String,

    /// Unix timestamp of the last write
    #[serde(default)]
    pub updated_at: i64,

    /// Unix timestamp of the first write (set by the database on insert)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<i64>,
}

impl CveRecord {
    pub fn new(
        cve_id: impl Into<String>,
        vuln_name: impl Into<String>,
        description: impl Into<String>,
        source: impl Into<String>,
        entry_url: impl Into<String>,
    ) -> Self {
        Self {
            cve_id: cve_id.into(),
            vuln_name: vuln_name.into(),
            description: description.into(),
            source: source.into(),
            entry_url: entry_url.into(),
            updated_at: chrono::Utc::now().timestamp(),
            first_seen: None,
        }
    }

    /// Check whether the crawled content differs from `other`.
    /// Timestamps are ignored.
    pub fn has_changed(&self, other: &CveRecord) -> bool {
        self.cve_id != other.cve_id
            || self.vuln_name != other.vuln_name
            || self.description != other.description
            || self.source != other.source
            || self.entry_url != other.entry_url
    }

    /// Filter matching this record's document.
    pub fn id_filter(&self) -> Document {
        doc! { "_id": self.cve_id.as_str() }
    }

    /// Upsert modifications: content is overwritten, `first_seen` only on insert.
    pub fn upsert_update(&self) -> Document {
        doc! {
            "$set": {
                "vuln_name": self.vuln_name.as_str(),
                "description": self.description.as_str(),
                "source": self.source.as_str(),
                "entry_url": self.entry_url.as_str(),
                "updated_at": self.updated_at,
            },
            "$setOnInsert": {
                "first_seen": self.updated_at,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CveRecord {
        CveRecord::new(
            "CVE-2021-44228",
            "Apache.Log4j.Error.Log.Remote.Code.Execution",
            "This indicates an attack attempt.",
            "ips",
            "https://www.fortiguard.com/encyclopedia/ips/51006",
        )
    }

    #[test]
    fn test_has_changed_ignores_timestamps() {
        let a = record();
        let mut b = record();
        b.updated_at += 3600;
        b.first_seen = Some(1);
        assert!(!a.has_changed(&b));

        b.description.push_str(" Updated.");
        assert!(a.has_changed(&b));
    }

    #[test]
    fn test_upsert_update_shape() {
        let r = record();
        let update = r.upsert_update();

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("vuln_name").unwrap(), r.vuln_name);
        assert_eq!(set.get_str("source").unwrap(), "ips");
        assert_eq!(set.get_i64("updated_at").unwrap(), r.updated_at);
        assert!(!set.contains_key("_id"));

        let on_insert = update.get_document("$setOnInsert").unwrap();
        assert_eq!(on_insert.get_i64("first_seen").unwrap(), r.updated_at);

        assert_eq!(r.id_filter().get_str("_id").unwrap(), "CVE-2021-44228");
    }

    #[test]
    fn test_serializes_id_as_underscore_id() {
        let document = mongodb::bson::to_document(&record()).unwrap();
        assert_eq!(document.get_str("_id").unwrap(), "CVE-2021-44228");
        assert!(!document.contains_key("first_seen"));
    }
}
