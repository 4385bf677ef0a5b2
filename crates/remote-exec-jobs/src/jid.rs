//! Collision-free job id generation.

use std::sync::{Mutex, PoisonError};

use chrono::{NaiveDateTime, SubsecRound, TimeDelta, Utc};
use remote_exec_core::{
    JobId, Load,
    traits::{JobStore, StoreError},
};

use crate::cache::JobCache;

/// Maximum number of candidates tried before giving up.
pub const MAX_JID_ATTEMPTS: u32 = 64;

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Timestamp-based job id generator.
///
/// Ids are strictly increasing within a process: when the clock has not
/// advanced past the last issued microsecond, the next microsecond is used.
pub struct JidGenerator {
    clock: Clock,
    last: Mutex<Option<NaiveDateTime>>,
}

impl Default for JidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl JidGenerator {
    /// Generator driven by the system UTC clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(|| Utc::now().naive_utc())
    }

    /// Generator driven by a custom clock.
    #[must_use]
    pub fn with_clock<F>(clock: F) -> Self
    where
        F: Fn() -> NaiveDateTime + Send + Sync + 'static,
    {
        Self {
            clock: Box::new(clock),
            last: Mutex::new(None),
        }
    }

    /// Next candidate id.
    pub fn next_jid(&self) -> JobId {
        let now = (self.clock)().trunc_subsecs(6);
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let issued = match *last {
            Some(prev) if now <= prev => prev + TimeDelta::microseconds(1),
            _ => now,
        };
        *last = Some(issued);
        JobId::from_datetime(issued)
    }
}

impl<S> JobCache<S>
where
    S: JobStore,
{
    /// Return a job id not present in the store.
    ///
    /// The id is not reserved: another writer may take it between this call
    /// and `save_load`. Use [`Self::reserve_jid`] when several processes
    /// share a store.
    ///
    /// The `no_cache` flag is accepted for compatibility and has no effect.
    ///
    /// # Errors
    /// Returns [`StoreError::JidExhausted`] if every candidate is taken, or
    /// any backend error.
    pub async fn prepare_jid(&self, _no_cache: bool) -> Result<JobId, StoreError> {
        for _ in 0..MAX_JID_ATTEMPTS {
            let jid = self.generator.next_jid();
            if !self.store.jid_exists(&jid).await? {
                return Ok(jid);
            }
            tracing::info!(%jid, "jid clash, generating a new one");
        }
        Err(StoreError::JidExhausted {
            attempts: MAX_JID_ATTEMPTS,
        })
    }

    /// Generate a job id and store `load` under it in one step.
    ///
    /// The insert itself is the reservation; a duplicate key means another
    /// writer won and a new candidate is tried.
    ///
    /// # Errors
    /// Returns [`StoreError::JidExhausted`] if every candidate is taken, or
    /// any other backend error.
    pub async fn reserve_jid(&self, load: &Load) -> Result<JobId, StoreError> {
        let load_json = serde_json::to_string(load)?;
        for _ in 0..MAX_JID_ATTEMPTS {
            let jid = self.generator.next_jid();
            match self.store.insert_load(&jid, &load_json).await {
                Ok(()) => {
                    tracing::debug!(%jid, "Reserved job id");
                    return Ok(jid);
                }
                Err(StoreError::DuplicateJid(_)) => {
                    tracing::info!(%jid, "jid clash, generating a new one");
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::JidExhausted {
            attempts: MAX_JID_ATTEMPTS,
        })
    }
}
