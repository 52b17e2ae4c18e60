//! Persistence layer — the durable `Database` trait with its libSQL
//! backend, the ephemeral TTL cache, and the dual-store `StateStore`.

pub mod cache;
pub mod libsql_backend;
pub mod migrations;
pub mod state_store;
pub mod traits;

pub use cache::{EphemeralStore, MemoryCache};
pub use libsql_backend::LibSqlBackend;
pub use state_store::StateStore;
pub use traits::Database;
