//! In-memory job store.

use std::{collections::BTreeMap, sync::RwLock};

use async_trait::async_trait;
use remote_exec_core::{
    JobId,
    traits::{JobStore, ReturnRecord, StoreError},
};

/// In-memory storage implementation.
///
/// Useful for development and single-process deployments.
/// Data is lost on restart.
pub struct MemoryStorage {
    jobs: RwLock<BTreeMap<JobId, String>>,
    /// Insertion order is arrival order.
    returns: RwLock<Vec<ReturnRecord>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            jobs: RwLock::new(BTreeMap::new()),
            returns: RwLock::new(Vec::new()),
        }
    }

    /// Number of result rows, across all jobs.
    ///
    /// # Errors
    /// Returns error if the lock is poisoned.
    pub fn return_count(&self) -> Result<usize, StoreError> {
        Ok(self
            .returns
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .len())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryStorage {
    async fn jid_exists(&self, jid: &JobId) -> Result<bool, StoreError> {
        Ok(self
            .jobs
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .contains_key(jid))
    }

    async fn insert_load(&self, jid: &JobId, load_json: &str) -> Result<(), StoreError> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if jobs.contains_key(jid) {
            return Err(StoreError::DuplicateJid(jid.clone()));
        }
        jobs.insert(jid.clone(), load_json.to_string());

        Ok(())
    }

    async fn fetch_load(&self, jid: &JobId) -> Result<Option<String>, StoreError> {
        Ok(self
            .jobs
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .get(jid)
            .cloned())
    }

    async fn fetch_loads(&self) -> Result<Vec<(JobId, String)>, StoreError> {
        let jobs = self
            .jobs
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(jobs
            .iter()
            .map(|(jid, load)| (jid.clone(), load.clone()))
            .collect())
    }

    async fn insert_return(&self, record: &ReturnRecord) -> Result<(), StoreError> {
        self.returns
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .push(record.clone());

        Ok(())
    }

    async fn fetch_returns(&self, jid: &JobId) -> Result<Vec<(String, String)>, StoreError> {
        let returns = self
            .returns
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(returns
            .iter()
            .filter(|r| r.jid == *jid)
            .map(|r| (r.id.clone(), r.return_json.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(jid: &str, id: &str) -> ReturnRecord {
        ReturnRecord {
            fun: "test.ping".to_string(),
            jid: JobId::new(jid),
            return_json: "true".to_string(),
            id: id.to_string(),
            success: true,
        }
    }

    #[tokio::test]
    async fn test_insert_load_rejects_duplicates() {
        let store = MemoryStorage::new();
        let jid = JobId::new("20230101120000000000");

        store.insert_load(&jid, "{}").await.unwrap();
        assert!(store.jid_exists(&jid).await.unwrap());
        assert!(matches!(
            store.insert_load(&jid, "{}").await,
            Err(StoreError::DuplicateJid(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_returns_filters_by_jid() {
        let store = MemoryStorage::new();
        store.insert_return(&record("1", "a")).await.unwrap();
        store.insert_return(&record("2", "b")).await.unwrap();
        store.insert_return(&record("1", "c")).await.unwrap();

        let returns = store.fetch_returns(&JobId::new("1")).await.unwrap();
        assert_eq!(
            returns,
            vec![
                ("a".to_string(), "true".to_string()),
                ("c".to_string(), "true".to_string())
            ]
        );
        assert_eq!(store.return_count().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_fetch_returns_keeps_arrival_order() {
        let store = MemoryStorage::new();
        let mut first = record("20230101120000000000_7", "edge1");
        first.return_json = "\"first\"".to_string();
        let mut second = record("20230101120000000000_7", "edge1");
        second.return_json = "\"second\"".to_string();
        store.insert_return(&first).await.unwrap();
        store.insert_return(&second).await.unwrap();

        let returns = store
            .fetch_returns(&JobId::new("20230101120000000000_7"))
            .await
            .unwrap();
        assert_eq!(
            returns.last(),
            Some(&("edge1".to_string(), "\"second\"".to_string()))
        );
        assert_eq!(returns.len(), 2);
    }
}
