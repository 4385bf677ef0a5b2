//! Core traits for device transports and job storage.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{ConfigError, DeviceConfig, JobId};

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Session is not open")]
    NotOpen,
    #[error("Unknown method: {0}")]
    UnknownMethod(String),
    #[error("Invocation of {method} failed: {reason}")]
    Invocation { method: String, reason: String },
}

/// A live, stateful connection to one remote device.
///
/// Implementations wrap a concrete client (interactive shell, vendor API).
/// A session is owned by exactly one connection manager.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Open the connection.
    async fn open(&mut self, config: &DeviceConfig) -> Result<(), TransportError>;

    /// Close the connection, returning whatever the client reports.
    async fn close(&mut self) -> Result<Value, TransportError>;

    /// Probe the underlying connection.
    async fn is_alive(&self) -> bool;

    /// Invoke a named operation of the native client.
    async fn invoke(
        &mut self,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, TransportError>;

    /// Names of the operations `invoke` understands.
    fn capabilities(&self) -> Vec<String>;
}

#[async_trait]
impl<T: TransportSession + ?Sized> TransportSession for Box<T> {
    async fn open(&mut self, config: &DeviceConfig) -> Result<(), TransportError> {
        (**self).open(config).await
    }

    async fn close(&mut self) -> Result<Value, TransportError> {
        (**self).close().await
    }

    async fn is_alive(&self) -> bool {
        (**self).is_alive().await
    }

    async fn invoke(
        &mut self,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, TransportError> {
        (**self).invoke(method, args, kwargs).await
    }

    fn capabilities(&self) -> Vec<String> {
        (**self).capabilities()
    }
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job id already exists: {0}")]
    DuplicateJid(JobId),
    #[error("No unused job id after {attempts} attempts")]
    JidExhausted { attempts: u32 },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Storage error: {0}")]
    Backend(String),
}

/// One row of the results table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnRecord {
    pub fun: String,
    pub jid: JobId,
    /// Return payload, already serialized to JSON text.
    pub return_json: String,
    /// Target id.
    pub id: String,
    pub success: bool,
}

/// Trait for job store backends.
///
/// Backends store serialized text and know nothing about its shape; ids
/// arrive already normalized.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Whether a job row exists for the id.
    async fn jid_exists(&self, jid: &JobId) -> Result<bool, StoreError>;

    /// Insert a job row.
    ///
    /// Fails with [`StoreError::DuplicateJid`] if the id is taken.
    async fn insert_load(&self, jid: &JobId, load_json: &str) -> Result<(), StoreError>;

    /// Serialized load of a job.
    async fn fetch_load(&self, jid: &JobId) -> Result<Option<String>, StoreError>;

    /// Every job row.
    async fn fetch_loads(&self) -> Result<Vec<(JobId, String)>, StoreError>;

    /// Insert one result row.
    async fn insert_return(&self, record: &ReturnRecord) -> Result<(), StoreError>;

    /// `(target id, serialized return)` for a job, oldest first.
    async fn fetch_returns(&self, jid: &JobId) -> Result<Vec<(String, String)>, StoreError>;
}
