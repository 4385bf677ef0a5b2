//! Connection lifecycle management for stateful device sessions.
//!
//! Provides:
//! - `ConnectionManager` - Owns one transport session per device
//! - `CallPolicy` - Allow-list for pass-through method calls

pub mod call;
pub mod manager;

pub use call::{CallError, CallPolicy, clean_kwargs};
pub use manager::{ConnectionManager, ConnectionMode, ConnectionState, ReconnectOutcome};
