//! Result reporting.

use remote_exec_core::{
    JobResult,
    traits::{JobStore, ReturnRecord, StoreError},
};

use crate::cache::JobCache;

impl<S> JobCache<S>
where
    S: JobStore,
{
    /// Store the outcome of one job on one target.
    ///
    /// Exactly one result row is written. Nothing is retried; the caller
    /// decides whether to dispatch again.
    ///
    /// # Errors
    /// Returns error if the return value cannot be serialized or the store
    /// rejects the row.
    pub async fn record_result(&self, result: &JobResult) -> Result<(), StoreError> {
        let record = ReturnRecord {
            fun: result.fun.clone(),
            jid: result.jid.normalized(),
            return_json: serde_json::to_string(&result.return_value)?,
            id: result.id.clone(),
            success: result.success,
        };
        self.store.insert_return(&record).await?;
        tracing::debug!(
            jid = %record.jid,
            target_id = %record.id,
            fun = %record.fun,
            success = record.success,
            "Recorded job result"
        );
        Ok(())
    }
}
