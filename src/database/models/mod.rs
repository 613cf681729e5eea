//! Database models.

pub mod cve_record;

pub use cve_record::CveRecord;
