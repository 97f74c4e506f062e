//! Persistence layer: libSQL-backed storage for tenants, tickets and audit records.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
