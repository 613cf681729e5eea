//! Repository module - data access layer.

mod cve_repository;

pub use cve_repository::CveRepository;
