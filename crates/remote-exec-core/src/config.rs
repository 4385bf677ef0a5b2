//! Connection parameters for devices and the job store.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Default device connection timeout.
const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required option: {0}")]
    Missing(&'static str),
    #[error("Invalid option {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Connection parameters for one managed device.
///
/// Only presence is checked here; the transport interprets the values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device hostname or address.
    pub host: String,
    /// Login user.
    #[serde(default)]
    pub username: Option<String>,
    /// Login password.
    #[serde(default)]
    pub password: Option<String>,
    /// Device / platform type understood by the transport.
    pub device_type: String,
    /// Port override.
    #[serde(default)]
    pub port: Option<u16>,
    /// Timeout applied to opening the session.
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,
    /// Transport-specific options passed through untouched.
    #[serde(default)]
    pub options: Map<String, Value>,
}

const fn default_timeout() -> Duration {
    DEFAULT_DEVICE_TIMEOUT
}

impl DeviceConfig {
    /// Create a config for a host and device type.
    #[must_use]
    pub fn new(host: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: None,
            password: None,
            device_type: device_type.into(),
            port: None,
            timeout: DEFAULT_DEVICE_TIMEOUT,
            options: Map::new(),
        }
    }

    /// Set login credentials.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the session open timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a config from proxy options.
    ///
    /// `proxytype` selects the proxy module and is dropped. Well-known keys
    /// (`host`, `username`, `password`, `device_type`, `port`, `timeout`)
    /// populate fields; everything else goes to `options`.
    ///
    /// # Errors
    /// Returns error if a well-known key is missing or has the wrong type.
    pub fn from_proxy_opts(opts: &Map<String, Value>) -> Result<Self, ConfigError> {
        let mut rest = opts.clone();
        rest.remove("proxytype");

        let host = take_string(&mut rest, "host")?.ok_or(ConfigError::Missing("host"))?;
        let device_type =
            take_string(&mut rest, "device_type")?.ok_or(ConfigError::Missing("device_type"))?;
        let username = take_string(&mut rest, "username")?;
        let password = take_string(&mut rest, "password")?;

        let port = match rest.remove("port") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .and_then(|p| u16::try_from(p).ok())
                    .ok_or_else(|| ConfigError::Invalid {
                        key: "port",
                        reason: format!("expected a port number, got {v}"),
                    })?,
            ),
        };

        let timeout = match rest.remove("timeout") {
            None | Some(Value::Null) => DEFAULT_DEVICE_TIMEOUT,
            Some(v) => v
                .as_f64()
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(Duration::from_secs_f64)
                .ok_or_else(|| ConfigError::Invalid {
                    key: "timeout",
                    reason: format!("expected positive seconds, got {v}"),
                })?,
        };

        let config = Self {
            host,
            username,
            password,
            device_type,
            port,
            timeout,
            options: rest,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that required fields are present.
    ///
    /// # Errors
    /// Returns error naming the first missing field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("host"));
        }
        if self.device_type.trim().is_empty() {
            return Err(ConfigError::Missing("device_type"));
        }
        Ok(())
    }
}

fn take_string(map: &mut Map<String, Value>, key: &'static str) -> Result<Option<String>, ConfigError> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

/// Job store connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    /// Database name; for SQLite, the database file path or `:memory:`.
    #[serde(rename = "db", alias = "database")]
    pub database: String,
    pub port: u16,
    /// Upper bound on pooled store connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            user: "jobs".to_string(),
            password: "jobs".to_string(),
            database: "jobs".to_string(),
            port: 5432,
            max_connections: default_max_connections(),
        }
    }
}

impl StoreConfig {
    /// Check that required fields are present.
    ///
    /// # Errors
    /// Returns error naming the first missing field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::Missing("db"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "max_connections",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Check the fields a database server connection needs.
    ///
    /// # Errors
    /// Returns error if host or user is missing.
    pub fn validate_server(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("host"));
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::Missing("user"));
        }
        Ok(())
    }

    /// Whether `database` names an in-memory SQLite database.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.database == ":memory:"
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opts(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_from_proxy_opts_drops_proxytype() {
        let config = DeviceConfig::from_proxy_opts(&opts(json!({
            "proxytype": "netmiko",
            "host": "10.0.0.1",
            "device_type": "cisco_ios",
            "username": "admin",
            "password": "secret",
            "port": 2222,
            "secret": "enable-pass"
        })))
        .unwrap();

        assert_eq!(config.host, "10.0.0.1");
        assert_eq!(config.device_type, "cisco_ios");
        assert_eq!(config.username.as_deref(), Some("admin"));
        assert_eq!(config.port, Some(2222));
        assert_eq!(config.timeout, DEFAULT_DEVICE_TIMEOUT);
        assert!(!config.options.contains_key("proxytype"));
        assert_eq!(config.options.get("secret"), Some(&json!("enable-pass")));
    }

    #[test]
    fn test_from_proxy_opts_requires_host() {
        let err = DeviceConfig::from_proxy_opts(&opts(json!({"device_type": "junos"}))).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("host")));
    }

    #[test]
    fn test_from_proxy_opts_rejects_bad_port() {
        let err = DeviceConfig::from_proxy_opts(&opts(json!({
            "host": "r1",
            "device_type": "junos",
            "port": 70000
        })))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "port", .. }));
    }

    #[test]
    fn test_store_server_fields() {
        assert!(StoreConfig::default().validate_server().is_ok());

        let no_host = StoreConfig {
            host: " ".to_string(),
            ..StoreConfig::default()
        };
        assert!(matches!(no_host.validate_server(), Err(ConfigError::Missing("host"))));

        let memory = StoreConfig {
            database: ":memory:".to_string(),
            ..StoreConfig::default()
        };
        assert!(memory.is_in_memory());
        assert!(!StoreConfig::default().is_in_memory());
    }

    #[test]
    fn test_store_config_accepts_db_key() {
        let config: StoreConfig = serde_json::from_value(json!({
            "host": "db.local",
            "user": "jobs",
            "password": "pw",
            "db": "jobs",
            "port": 5433
        }))
        .unwrap();
        assert_eq!(config.database, "jobs");
        assert_eq!(config.max_connections, 5);
    }
}
