//! Caller-facing job cache.

use remote_exec_core::{
    JobId, Load,
    traits::{JobStore, StoreError},
};

use crate::jid::JidGenerator;

/// Job cache over a storage backend.
///
/// Id generation lives in [`crate::jid`], result reporting in
/// [`crate::returner`] and the read side in [`crate::query`].
pub struct JobCache<S>
where
    S: JobStore,
{
    pub(crate) store: S,
    pub(crate) generator: JidGenerator,
}

impl<S> JobCache<S>
where
    S: JobStore,
{
    /// Create a cache using the system clock for job ids.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_generator(store, JidGenerator::new())
    }

    /// Create a cache with a custom id generator.
    #[must_use]
    pub const fn with_generator(store: S, generator: JidGenerator) -> Self {
        Self { store, generator }
    }

    /// Storage backend.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Save the load of a job.
    ///
    /// # Errors
    /// Returns [`StoreError::DuplicateJid`] if the id is already stored, or
    /// any backend error.
    pub async fn save_load(&self, jid: &JobId, load: &Load) -> Result<(), StoreError> {
        let jid = jid.normalized();
        let load_json = serde_json::to_string(load)?;
        self.store.insert_load(&jid, &load_json).await?;
        tracing::debug!(%jid, "Saved job load");
        Ok(())
    }

    /// Retention hook for old jobs. Nothing is removed.
    ///
    /// # Errors
    /// Never fails today; the signature leaves room for a real policy.
    #[allow(clippy::unused_async)]
    pub async fn clean_old_jobs(&self) -> Result<(), StoreError> {
        tracing::debug!("No retention policy configured, keeping all jobs");
        Ok(())
    }
}
