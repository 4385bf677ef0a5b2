//! Job cache walkthrough against simulated devices.
//!
//! Run with: cargo run -p job-cache-demo
//!
//! Set `RUST_LOG=debug` to see store operations.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use remote_exec_core::{DeviceConfig, TransportError, TransportSession};
use remote_exec_jobs::{JobCache, JobDispatcher, dispatch::DispatchRequest, storage::MemoryStorage};
use remote_exec_proxy::ConnectionManager;
use serde_json::{Map, Value, json};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pretends to be a network device shell.
struct SimulatedDevice {
    hostname: String,
    open: bool,
}

#[async_trait]
impl TransportSession for SimulatedDevice {
    async fn open(&mut self, config: &DeviceConfig) -> Result<(), TransportError> {
        if config.username.is_none() {
            return Err(TransportError::Authentication(format!(
                "no credentials for {}",
                config.host
            )));
        }
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<Value, TransportError> {
        self.open = false;
        Ok(Value::Bool(true))
    }

    async fn is_alive(&self) -> bool {
        self.open
    }

    async fn invoke(
        &mut self,
        method: &str,
        args: Vec<Value>,
        _kwargs: Map<String, Value>,
    ) -> Result<Value, TransportError> {
        match method {
            "send_command" => {
                let command = args.first().and_then(Value::as_str).unwrap_or_default();
                Ok(json!(format!("{}# {command}\nok", self.hostname)))
            }
            other => Err(TransportError::UnknownMethod(other.to_string())),
        }
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["send_command".to_string()]
    }
}

fn device(target: &str, with_credentials: bool) -> Arc<ConnectionManager<SimulatedDevice>> {
    let mut config = DeviceConfig::new(format!("{target}.lab"), "cisco_ios");
    if with_credentials {
        config = config.with_credentials("admin", "admin");
    }
    Arc::new(ConnectionManager::new(
        target,
        config,
        SimulatedDevice {
            hostname: target.to_string(),
            open: false,
        },
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cache = Arc::new(JobCache::new(MemoryStorage::new()));
    let mut dispatcher = JobDispatcher::new(Arc::clone(&cache));
    dispatcher.register(device("edge1", true));
    dispatcher.register(device("edge2", true));
    dispatcher.register(device("core1", false));

    for (target, up) in dispatcher.init_all().await {
        tracing::info!(target_id = %target, up, "Device initialized");
    }

    let request = DispatchRequest {
        fun: "netmiko.send_command".to_string(),
        method: "send_command".to_string(),
        args: vec![json!("show version")],
        kwargs: Map::new(),
        targets: vec!["edge1".into(), "edge2".into(), "core1".into()],
        user: "root".to_string(),
    };
    let jid = dispatcher
        .dispatch(&request)
        .await
        .context("Failed to dispatch job")?;

    let returns = cache.get_jid(&jid).await.context("Failed to read results")?;
    println!("{}", serde_json::to_string_pretty(&returns)?);

    let jobs = cache.get_jids().await.context("Failed to list jobs")?;
    println!("{}", serde_json::to_string_pretty(&jobs)?);

    Ok(())
}
