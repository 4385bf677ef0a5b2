//! Read side of the job cache.

use std::collections::BTreeMap;

use remote_exec_core::{
    JobId, JobSummary, Load, MinionReturn,
    traits::{JobStore, StoreError},
};

use crate::cache::JobCache;

impl<S> JobCache<S>
where
    S: JobStore,
{
    /// Load a job was submitted with, or an empty map for unknown ids.
    ///
    /// # Errors
    /// Returns error if the store fails or the stored load is not a JSON
    /// object.
    pub async fn get_load(&self, jid: &JobId) -> Result<Load, StoreError> {
        let jid = jid.normalized();
        match self.store.fetch_load(&jid).await? {
            Some(load_json) => Ok(serde_json::from_str(&load_json)?),
            None => Ok(Load::new()),
        }
    }

    /// Returns of a job keyed by target id.
    ///
    /// When a target reported more than once, its latest return wins.
    ///
    /// # Errors
    /// Returns error if the store fails or a stored return is not valid JSON.
    pub async fn get_jid(&self, jid: &JobId) -> Result<BTreeMap<String, MinionReturn>, StoreError> {
        let jid = jid.normalized();
        let mut returns = BTreeMap::new();
        for (target, return_json) in self.store.fetch_returns(&jid).await? {
            let value = serde_json::from_str(&return_json)?;
            returns.insert(target, MinionReturn { value });
        }
        Ok(returns)
    }

    /// Summary of every cached job.
    ///
    /// # Errors
    /// Returns error if the store fails or a stored load is not a JSON
    /// object.
    pub async fn get_jids(&self) -> Result<BTreeMap<JobId, JobSummary>, StoreError> {
        let mut jobs = BTreeMap::new();
        for (jid, load_json) in self.store.fetch_loads().await? {
            let load: Load = serde_json::from_str(&load_json)?;
            let summary = JobSummary::from_load(&jid, &load);
            jobs.insert(jid, summary);
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use remote_exec_core::JobResult;
    use serde_json::{Value, json};

    use super::*;
    use crate::storage::MemoryStorage;

    fn load(value: Value) -> Load {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn result(jid: &str, target: &str, value: Value) -> JobResult {
        JobResult {
            fun: "test.ping".to_string(),
            jid: JobId::new(jid),
            return_value: value,
            id: target.to_string(),
            success: true,
        }
    }

    #[tokio::test]
    async fn test_load_roundtrip_nested() {
        let cache = JobCache::new(MemoryStorage::new());
        let jid = JobId::new("20230101120000000000");
        let original = load(json!({
            "fun": "state.apply",
            "arg": ["netconfig", {"test": true}],
            "kwarg": {"pillar": {"vlans": [10, 20, {"id": 30, "name": null}]}},
            "tgt": ["edge1", "edge2"],
            "tgt_type": "list",
            "user": "netops"
        }));

        cache.save_load(&jid, &original).await.unwrap();
        assert_eq!(cache.get_load(&jid).await.unwrap(), original);
    }

    #[tokio::test]
    async fn test_get_load_unknown_is_empty() {
        let cache = JobCache::new(MemoryStorage::new());
        let loaded = cache.get_load(&JobId::new("20990101000000000000")).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_get_jid_unknown_is_empty() {
        let cache = JobCache::new(MemoryStorage::new());
        assert!(cache.get_jid(&JobId::new("20990101000000000000")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_save_load_fails() {
        let cache = JobCache::new(MemoryStorage::new());
        let jid = JobId::new("20230101120000000000");
        cache.save_load(&jid, &Load::new()).await.unwrap();

        let err = cache
            .save_load(&JobId::new("'20230101120000000000'"), &Load::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateJid(j) if j == jid));
    }

    #[tokio::test]
    async fn test_quoted_ids_are_normalized() {
        let cache = JobCache::new(MemoryStorage::new());
        let quoted = JobId::new("'20230101120000000000'");
        let bare = JobId::new("20230101120000000000");
        let original = load(json!({"fun": "test.ping"}));

        cache.save_load(&quoted, &original).await.unwrap();
        cache.record_result(&result("2023'0101120000000000", "host1", json!(true))).await.unwrap();

        assert_eq!(cache.get_load(&bare).await.unwrap(), original);
        assert_eq!(cache.get_load(&quoted).await.unwrap(), original);
        assert_eq!(cache.get_jid(&bare).await.unwrap(), cache.get_jid(&quoted).await.unwrap());
        assert_eq!(cache.get_jid(&bare).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_jid_groups_by_target() {
        let cache = JobCache::new(MemoryStorage::new());
        let jid = "20230101120000000000";
        cache.save_load(&JobId::new(jid), &Load::new()).await.unwrap();

        cache.record_result(&result(jid, "host1", json!({"uptime": 42}))).await.unwrap();
        cache.record_result(&result(jid, "host2", json!(["a", "b"]))).await.unwrap();
        cache.record_result(&result("20230101120000000001", "host3", json!(1))).await.unwrap();

        let returns = cache.get_jid(&JobId::new(jid)).await.unwrap();
        assert_eq!(
            serde_json::to_value(&returns).unwrap(),
            json!({
                "host1": {"return": {"uptime": 42}},
                "host2": {"return": ["a", "b"]}
            })
        );
    }

    #[tokio::test]
    async fn test_get_jid_latest_return_wins() {
        let cache = JobCache::new(MemoryStorage::new());
        let jid = "20230101120000000000";
        cache.record_result(&result(jid, "host1", json!("first"))).await.unwrap();
        cache.record_result(&result(jid, "host1", json!("second"))).await.unwrap();

        let returns = cache.get_jid(&JobId::new(jid)).await.unwrap();
        assert_eq!(returns.len(), 1);
        assert_eq!(returns["host1"].value, json!("second"));
    }

    #[tokio::test]
    async fn test_get_jids_formats_summaries() {
        let cache = JobCache::new(MemoryStorage::new());
        cache
            .save_load(
                &JobId::new("20230101120000000000"),
                &load(json!({"fun": "test.ping", "tgt": "*", "tgt_type": "glob"})),
            )
            .await
            .unwrap();
        cache
            .save_load(&JobId::new("20230615083000123456"), &Load::new())
            .await
            .unwrap();

        let jobs = cache.get_jids().await.unwrap();
        assert_eq!(jobs.len(), 2);

        let ping = &jobs[&JobId::new("20230101120000000000")];
        assert_eq!(ping.function, "test.ping");
        assert_eq!(ping.target, json!("*"));
        assert_eq!(ping.user, "root");
        assert_eq!(ping.start_time, "2023, Jan 01 12:00:00.000000");

        let bare = &jobs[&JobId::new("20230615083000123456")];
        assert_eq!(bare.function, "unknown-function");
        assert_eq!(bare.target, json!("unknown-target"));
        assert_eq!(bare.start_time, "2023, Jun 15 08:30:00.123456");
    }

    #[tokio::test]
    async fn test_clean_old_jobs_keeps_everything() {
        let cache = JobCache::new(MemoryStorage::new());
        cache
            .save_load(&JobId::new("20000101000000000000"), &Load::new())
            .await
            .unwrap();

        cache.clean_old_jobs().await.unwrap();
        assert_eq!(cache.get_jids().await.unwrap().len(), 1);
    }
}
