//! Pass-through method calls on a transport session.

use std::collections::BTreeSet;

use remote_exec_core::TransportError;
use serde_json::{Map, Value};
use thiserror::Error;

/// Prefix of keyword arguments injected by the job publisher.
const PUBLISH_METADATA_PREFIX: &str = "__pub_";

/// Call error.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("Connection to {0} is not established")]
    NotConnected(String),
    #[error("Method not allowed: {0}")]
    NotAllowed(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Which methods `ConnectionManager::call` may forward.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CallPolicy {
    /// Whatever the session advertises through `capabilities()`.
    #[default]
    Capabilities,
    /// An explicit set of method names.
    AllowList(BTreeSet<String>),
    /// Any method. Only meant for testing against lab devices.
    Unrestricted,
}

impl CallPolicy {
    /// Build an explicit allow-list.
    #[must_use]
    pub fn allow_list<I>(methods: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self::AllowList(methods.into_iter().map(Into::into).collect())
    }

    /// Whether `method` may be forwarded given the session's capabilities.
    #[must_use]
    pub fn permits(&self, method: &str, capabilities: &[String]) -> bool {
        match self {
            Self::Capabilities => capabilities.iter().any(|c| c == method),
            Self::AllowList(allowed) => allowed.contains(method),
            Self::Unrestricted => true,
        }
    }
}

/// Drop publisher metadata and null-valued keyword arguments.
#[must_use]
pub fn clean_kwargs(kwargs: Map<String, Value>) -> Map<String, Value> {
    kwargs
        .into_iter()
        .filter(|(key, value)| !value.is_null() && !key.starts_with(PUBLISH_METADATA_PREFIX))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_kwargs() {
        let Value::Object(kwargs) = json!({
            "__pub_jid": "20230101120000000000",
            "__pub_user": "root",
            "delay_factor": 2,
            "expect_string": null,
            "strip_prompt": false
        }) else {
            unreachable!()
        };

        let cleaned = clean_kwargs(kwargs);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned.get("delay_factor"), Some(&json!(2)));
        assert_eq!(cleaned.get("strip_prompt"), Some(&json!(false)));
    }

    #[test]
    fn test_policy_permits() {
        let caps = vec!["send_command".to_string(), "get_facts".to_string()];

        assert!(CallPolicy::Capabilities.permits("get_facts", &caps));
        assert!(!CallPolicy::Capabilities.permits("load_merge_candidate", &caps));

        let narrow = CallPolicy::allow_list(["get_facts"]);
        assert!(narrow.permits("get_facts", &caps));
        assert!(!narrow.permits("send_command", &caps));

        assert!(CallPolicy::Unrestricted.permits("anything", &[]));
    }
}
