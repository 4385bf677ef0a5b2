//! Connection manager for one managed device.

use std::sync::atomic::{AtomicBool, Ordering};

use remote_exec_core::{DeviceConfig, TransportError, TransportSession};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::call::{CallError, CallPolicy, clean_kwargs};

const ALREADY_ALIVE: &str = "Already alive.";
const RESTARTED: &str = "Connection restarted!";

/// How the manager holds its connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Persistent stateful session kept open between jobs.
    #[default]
    Proxy,
    /// Regular, non-persistent context. Always considered alive.
    Regular,
}

/// Lifecycle state of a managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// `init` has not succeeded yet.
    Uninitialized,
    /// Session open.
    Up,
    /// Session was open at some point and is now closed.
    Down,
}

/// Result of a reconnect request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectOutcome {
    pub out: Option<Value>,
    pub result: bool,
    pub comment: String,
}

impl Default for ReconnectOutcome {
    fn default() -> Self {
        Self {
            out: None,
            result: true,
            comment: ALREADY_ALIVE.to_string(),
        }
    }
}

/// Owns the transport session of one device and tracks its lifecycle.
///
/// One manager per device; share it between call sites through an `Arc`,
/// never between devices. Callers must let `init` finish before issuing
/// `call`, `is_alive` or `reconnect`.
pub struct ConnectionManager<T>
where
    T: TransportSession,
{
    target: String,
    config: DeviceConfig,
    mode: ConnectionMode,
    policy: CallPolicy,
    session: Mutex<T>,
    initialized: AtomicBool,
    up: AtomicBool,
}

impl<T> ConnectionManager<T>
where
    T: TransportSession,
{
    /// Create a manager around an unopened session.
    #[must_use]
    pub fn new(target: impl Into<String>, config: DeviceConfig, session: T) -> Self {
        Self {
            target: target.into(),
            config,
            mode: ConnectionMode::default(),
            policy: CallPolicy::default(),
            session: Mutex::new(session),
            initialized: AtomicBool::new(false),
            up: AtomicBool::new(false),
        }
    }

    /// Set the connection mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ConnectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set which methods `call` may forward.
    #[must_use]
    pub fn with_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Target id of the managed device.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Connection parameters.
    #[must_use]
    pub const fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Connection mode.
    #[must_use]
    pub const fn mode(&self) -> ConnectionMode {
        self.mode
    }

    /// Open the session.
    ///
    /// Failures are logged, not returned: the result is `true` only when the
    /// session was opened, and `initialized()`/`ping()` stay `false`
    /// otherwise. Calling `init` on a connection that is already up is a
    /// no-op.
    pub async fn init(&self) -> bool {
        // Checked under the session lock so concurrent callers open once.
        let mut session = self.session.lock().await;
        if self.ping() {
            tracing::debug!(target_id = %self.target, "Connection already up, skipping init");
            return true;
        }

        match open_session(&mut *session, &self.config).await {
            Ok(()) => {
                self.initialized.store(true, Ordering::SeqCst);
                self.up.store(true, Ordering::SeqCst);
                tracing::info!(
                    target_id = %self.target,
                    host = %self.config.host,
                    device_type = %self.config.device_type,
                    "Connection established"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    target_id = %self.target,
                    host = %self.config.host,
                    error = %e,
                    "Unable to set up the connection"
                );
                false
            }
        }
    }

    /// Whether the connection is up and the session's probe succeeds.
    ///
    /// A failed probe does not change the cached state.
    pub async fn is_alive(&self) -> bool {
        if !(self.ping() && self.initialized()) {
            return false;
        }
        self.session.lock().await.is_alive().await
    }

    /// Cached "connection opened" flag. Does not touch the device.
    #[must_use]
    pub fn ping(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    /// Cached "init succeeded" flag.
    #[must_use]
    pub fn initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match (self.initialized(), self.ping()) {
            (false, _) => ConnectionState::Uninitialized,
            (true, true) => ConnectionState::Up,
            (true, false) => ConnectionState::Down,
        }
    }

    /// Restart a session dropped by the device.
    ///
    /// Regular connections are left alone. Proxy connections are closed and
    /// re-opened when alive or when `force` is set; closing is best effort.
    pub async fn reconnect(&self, force: bool) -> ReconnectOutcome {
        let mut outcome = ReconnectOutcome::default();
        if self.mode == ConnectionMode::Regular {
            return outcome;
        }

        if !(self.is_alive().await || force) {
            return outcome;
        }

        let mut session = self.session.lock().await;

        tracing::info!(target_id = %self.target, "Closing the proxy connection");
        if let Err(e) = session.close().await {
            tracing::warn!(target_id = %self.target, error = %e, "Error while closing the connection");
        }
        self.up.store(false, Ordering::SeqCst);

        tracing::info!(target_id = %self.target, "Re-opening the proxy connection");
        match open_session(&mut *session, &self.config).await {
            Ok(()) => {
                self.initialized.store(true, Ordering::SeqCst);
                self.up.store(true, Ordering::SeqCst);
                outcome.comment = RESTARTED.to_string();
            }
            Err(e) => {
                tracing::error!(target_id = %self.target, error = %e, "Unable to re-open the connection");
                outcome.result = false;
                outcome.comment = format!("Unable to re-open the connection: {e}");
            }
        }
        outcome
    }

    /// Close the session and return what the transport reports.
    ///
    /// # Errors
    /// Returns error if `init` never succeeded or the transport fails to
    /// close.
    pub async fn shutdown(&self) -> Result<Value, CallError> {
        if !self.initialized() {
            return Err(CallError::NotConnected(self.target.clone()));
        }

        let closed = self.session.lock().await.close().await?;
        self.up.store(false, Ordering::SeqCst);
        tracing::info!(target_id = %self.target, "Connection closed");
        Ok(closed)
    }

    /// Invoke a named operation of the underlying session.
    ///
    /// Publisher metadata (`__pub_*`) and null keyword arguments are
    /// dropped before forwarding. Errors from the transport are returned
    /// unchanged.
    ///
    /// # Errors
    /// Returns error if the connection is not up, the policy rejects
    /// `method`, or the transport call fails.
    pub async fn call(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, CallError> {
        if !self.ping() {
            return Err(CallError::NotConnected(self.target.clone()));
        }

        let mut session = self.session.lock().await;
        if !self.policy.permits(method, &session.capabilities()) {
            tracing::warn!(target_id = %self.target, method, "Rejected call outside the allow-list");
            return Err(CallError::NotAllowed(method.to_string()));
        }

        tracing::debug!(target_id = %self.target, method, "Forwarding call to the session");
        Ok(session.invoke(method, args, clean_kwargs(kwargs)).await?)
    }

    /// Run a command on the device shell.
    ///
    /// # Errors
    /// Same as [`Self::call`].
    pub async fn send_command(
        &self,
        command: &str,
        kwargs: Map<String, Value>,
    ) -> Result<Value, CallError> {
        self.call("send_command", vec![Value::String(command.to_string())], kwargs)
            .await
    }
}

async fn open_session<T>(session: &mut T, config: &DeviceConfig) -> Result<(), TransportError>
where
    T: TransportSession + ?Sized,
{
    match tokio::time::timeout(config.timeout, session.open(config)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(config.timeout)),
    }
}
