//! Generic persistent state management.
//!
//! A [`Store`] persists any type implementing [`Record`] behind a simple
//! collection model: an append-only JSONL log per collection is the durable
//! source of truth, and an embedded SQLite database is a queryable
//! projection that can be rebuilt from that log at any time via
//! [`Store::rebuild_indexes`]. Callers get create/get/update/delete plus
//! filtered listing without hand-rolling a schema migration for every new
//! record type.

mod error;
mod record;
mod store;

pub use error::StoreError;
pub use record::{now_ms, Filter, FilterOp, IndexValue, Record};
pub use store::Store;
