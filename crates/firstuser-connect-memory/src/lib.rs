//! In-memory storage adapter for FirstUser Connect.
//!
//! Backs the integration tables with a `HashMap` behind a `tokio::sync::RwLock`.
//! Unique and unique-together constraints from the schema are checked inside
//! the write lock, so concurrent violating writes are rejected the same way a
//! database constraint would reject them. Conditional updates are atomic,
//! which is what the access-code redeemer's compare-and-swap relies on.

mod adapter;

pub use adapter::MemoryAdapter;
