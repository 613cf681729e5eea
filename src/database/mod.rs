//! Database module exports.

mod models;
mod mongo;
mod repository;

pub use models::CveRecord;
pub use mongo::Database;
pub use repository::CveRepository;
