//! Core abstractions for remote device execution.
//!
//! This crate provides the fundamental building blocks:
//! - `JobId`, `Load`, `JobResult` - Job cache data model
//! - `DeviceConfig`, `StoreConfig` - Connection parameters
//! - `TransportSession` and `JobStore` traits

pub mod config;
pub mod job;
pub mod traits;

pub use config::{ConfigError, DeviceConfig, StoreConfig};
pub use job::{JobId, JobResult, JobSummary, Load, MinionReturn, jid_to_time};
pub use traits::{JobStore, ReturnRecord, StoreError, TransportError, TransportSession};
