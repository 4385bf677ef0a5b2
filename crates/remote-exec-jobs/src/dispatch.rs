//! Fan a job out to managed devices and record what comes back.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use futures::future::join_all;
use remote_exec_core::{
    JobId, JobResult, Load,
    traits::{JobStore, StoreError, TransportSession},
};
use remote_exec_proxy::{CallError, ConnectionManager};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cache::JobCache;

/// A job to run on a set of devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Function name recorded with the job, e.g. `netmiko.send_command`.
    pub fun: String,
    /// Session method invoked on each device.
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    /// Target ids.
    pub targets: Vec<String>,
    /// Invoking user.
    #[serde(default = "default_user")]
    pub user: String,
}

fn default_user() -> String {
    "root".to_string()
}

impl DispatchRequest {
    /// Load stored for this request.
    #[must_use]
    pub fn to_load(&self) -> Load {
        let mut load = Load::new();
        load.insert("fun".to_string(), Value::String(self.fun.clone()));
        load.insert("arg".to_string(), Value::Array(self.args.clone()));
        if !self.kwargs.is_empty() {
            load.insert("kwarg".to_string(), Value::Object(self.kwargs.clone()));
        }
        load.insert(
            "tgt".to_string(),
            Value::Array(self.targets.iter().cloned().map(Value::String).collect()),
        );
        load.insert("tgt_type".to_string(), Value::String("list".to_string()));
        load.insert("user".to_string(), Value::String(self.user.clone()));
        load
    }
}

/// Runs jobs against registered devices and writes results to a job cache.
pub struct JobDispatcher<S, T>
where
    S: JobStore,
    T: TransportSession,
{
    cache: Arc<JobCache<S>>,
    devices: HashMap<String, Arc<ConnectionManager<T>>>,
}

impl<S, T> JobDispatcher<S, T>
where
    S: JobStore,
    T: TransportSession,
{
    /// Create a dispatcher with no devices.
    #[must_use]
    pub fn new(cache: Arc<JobCache<S>>) -> Self {
        Self {
            cache,
            devices: HashMap::new(),
        }
    }

    /// Register a device under its target id, replacing any previous one.
    pub fn register(&mut self, manager: Arc<ConnectionManager<T>>) -> Option<Arc<ConnectionManager<T>>> {
        self.devices.insert(manager.target().to_string(), manager)
    }

    /// Manager of a registered device.
    #[must_use]
    pub fn device(&self, target: &str) -> Option<&Arc<ConnectionManager<T>>> {
        self.devices.get(target)
    }

    /// Job cache results are written to.
    #[must_use]
    pub const fn cache(&self) -> &Arc<JobCache<S>> {
        &self.cache
    }

    /// Open every registered device concurrently.
    ///
    /// Returns whether each device came up.
    pub async fn init_all(&self) -> BTreeMap<String, bool> {
        let attempts = self.devices.iter().map(|(target, manager)| async move {
            (target.clone(), manager.init().await)
        });
        join_all(attempts).await.into_iter().collect()
    }

    /// Run a request on its targets and record one result per target.
    ///
    /// The job id is reserved together with the load before any device is
    /// contacted. Device errors become failed results; store errors are
    /// returned.
    ///
    /// # Errors
    /// Returns error if the job id cannot be reserved or a result cannot be
    /// stored.
    pub async fn dispatch(&self, request: &DispatchRequest) -> Result<JobId, StoreError> {
        let jid = self.cache.reserve_jid(&request.to_load()).await?;
        tracing::info!(%jid, fun = %request.fun, targets = request.targets.len(), "Dispatching job");

        let calls = request.targets.iter().map(|target| async move {
            let outcome = match self.devices.get(target) {
                Some(manager) => {
                    manager
                        .call(&request.method, request.args.clone(), request.kwargs.clone())
                        .await
                }
                None => Err(CallError::NotConnected(target.clone())),
            };
            (target, outcome)
        });

        for (target, outcome) in join_all(calls).await {
            let (return_value, success) = match outcome {
                Ok(value) => (value, true),
                Err(e) => {
                    tracing::warn!(%jid, target_id = %target, error = %e, "Job failed on target");
                    (Value::String(e.to_string()), false)
                }
            };
            self.cache
                .record_result(&JobResult {
                    fun: request.fun.clone(),
                    jid: jid.clone(),
                    return_value,
                    id: target.clone(),
                    success,
                })
                .await?;
        }

        Ok(jid)
    }
}
