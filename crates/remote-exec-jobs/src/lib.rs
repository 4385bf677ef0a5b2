//! Job cache and dispatch for remote device execution.
//!
//! Provides:
//! - `JobCache` - Job id generation, load storage, result reporting and queries
//! - `JobDispatcher` - Fan a job out to managed devices and record the results
//! - Storage implementations (memory, SQLite, PostgreSQL)

pub mod cache;
pub mod dispatch;
pub mod jid;
pub mod query;
pub mod returner;
pub mod storage;

pub use cache::JobCache;
pub use dispatch::{DispatchRequest, JobDispatcher};
pub use jid::{JidGenerator, MAX_JID_ATTEMPTS};
