//! Storage implementations.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "memory")]
pub use memory::MemoryStorage;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteJobStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresJobStore;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
fn map_insert_error(jid: &remote_exec_core::JobId, err: sqlx::Error) -> remote_exec_core::StoreError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            remote_exec_core::StoreError::DuplicateJid(jid.clone())
        }
        other => backend_error("insert job", &other),
    }
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
fn backend_error(action: &str, err: &sqlx::Error) -> remote_exec_core::StoreError {
    remote_exec_core::StoreError::Backend(format!("Failed to {action}: {err}"))
}
