//! Job cache data model.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Job payload: function name, arguments, target specifier, and anything
/// else the publisher attached.
pub type Load = Map<String, Value>;

/// Length of the timestamp part of a job id (`YYYYMMDDhhmmssffffff`).
const JID_TIMESTAMP_LEN: usize = 20;

/// Job identifier.
///
/// The canonical form is a 20-digit UTC timestamp with microsecond
/// resolution, so the creation time can be read back from the id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap a raw id.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Build the canonical id for a timestamp.
    #[must_use]
    pub fn from_datetime(at: NaiveDateTime) -> Self {
        Self(at.format("%Y%m%d%H%M%S%6f").to_string())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id with every single quote removed.
    ///
    /// Applied wherever an id reaches the store, so `'2023...'` and
    /// `2023...` address the same job.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self(self.0.replace('\'', ""))
    }

    /// Timestamp embedded in the id, if it has one.
    ///
    /// Accepts the bare 20-digit form and the suffixed form
    /// (`<20 digits>_<anything>`).
    #[must_use]
    pub fn start_time(&self) -> Option<NaiveDateTime> {
        let raw = self.0.as_bytes();
        let suffixed = raw.len() > JID_TIMESTAMP_LEN + 1 && raw[JID_TIMESTAMP_LEN] == b'_';
        if raw.len() != JID_TIMESTAMP_LEN && !suffixed {
            return None;
        }
        let digits = &self.0[..JID_TIMESTAMP_LEN];
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let field = |range: std::ops::Range<usize>| digits[range].parse::<u32>().ok();
        let year = digits[0..4].parse::<i32>().ok()?;
        NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?.and_hms_micro_opt(
            field(8..10)?,
            field(10..12)?,
            field(12..14)?,
            field(14..20)?,
        )
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for JobId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Human-readable start time of a job, e.g. `2023, Jan 01 12:00:00.000000`.
///
/// Returns an empty string when the id carries no timestamp.
#[must_use]
pub fn jid_to_time(jid: &JobId) -> String {
    jid.start_time()
        .map(|at| at.format("%Y, %b %d %H:%M:%S%.6f").to_string())
        .unwrap_or_default()
}

/// Outcome of one job on one target, as reported back to the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Function that was executed.
    pub fun: String,
    /// Job the result belongs to.
    pub jid: JobId,
    /// Returned payload.
    #[serde(rename = "return")]
    pub return_value: Value,
    /// Target (device / minion) id.
    pub id: String,
    /// Whether the function succeeded.
    pub success: bool,
}

/// Stored return of a single target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinionReturn {
    #[serde(rename = "return")]
    pub value: Value,
}

/// Listing entry for a cached job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    #[serde(rename = "Function")]
    pub function: String,
    #[serde(rename = "Arguments")]
    pub arguments: Vec<Value>,
    #[serde(rename = "Target")]
    pub target: Value,
    #[serde(rename = "Target-type")]
    pub target_type: Value,
    #[serde(rename = "User")]
    pub user: String,
    #[serde(rename = "StartTime")]
    pub start_time: String,
}

impl JobSummary {
    /// Summarise a load, falling back to defaults for missing fields.
    #[must_use]
    pub fn from_load(jid: &JobId, load: &Load) -> Self {
        let function = load
            .get("fun")
            .and_then(Value::as_str)
            .unwrap_or("unknown-function")
            .to_string();

        let arguments = match load.get("arg") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(args)) => args.clone(),
            Some(other) => vec![other.clone()],
        };

        let target = load
            .get("tgt")
            .cloned()
            .unwrap_or_else(|| Value::String("unknown-target".to_string()));

        let target_type = load
            .get("tgt_type")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));

        let user = load
            .get("user")
            .and_then(Value::as_str)
            .unwrap_or("root")
            .to_string();

        Self {
            function,
            arguments,
            target,
            target_type,
            user,
            start_time: jid_to_time(jid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalized_strips_quotes() {
        let jid = JobId::new("'2023'0101120000000000'");
        assert_eq!(jid.normalized().as_str(), "20230101120000000000");
    }

    #[test]
    fn test_start_time_roundtrip() {
        let at = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_micro_opt(23, 59, 58, 123_456)
            .unwrap();
        let jid = JobId::from_datetime(at);
        assert_eq!(jid.as_str(), "20240229235958123456");
        assert_eq!(jid.start_time(), Some(at));
    }

    #[test]
    fn test_jid_to_time() {
        assert_eq!(
            jid_to_time(&JobId::new("20230101120000000000")),
            "2023, Jan 01 12:00:00.000000"
        );
        assert_eq!(
            jid_to_time(&JobId::new("20231231235959999999_4242")),
            "2023, Dec 31 23:59:59.999999"
        );
        assert_eq!(jid_to_time(&JobId::new("not-a-jid")), "");
        assert_eq!(jid_to_time(&JobId::new("20231399120000000000")), "");
    }

    #[test]
    fn test_summary_defaults() {
        let summary = JobSummary::from_load(&JobId::new("20230101120000000000"), &Load::new());
        assert_eq!(summary.function, "unknown-function");
        assert!(summary.arguments.is_empty());
        assert_eq!(summary.target, json!("unknown-target"));
        assert_eq!(summary.target_type, json!([]));
        assert_eq!(summary.user, "root");
        assert_eq!(summary.start_time, "2023, Jan 01 12:00:00.000000");
    }

    #[test]
    fn test_summary_serialized_keys() {
        let load = json!({
            "fun": "net.cli",
            "arg": ["show version"],
            "tgt": "edge*",
            "tgt_type": "glob",
            "user": "netops"
        });
        let Value::Object(load) = load else { unreachable!() };
        let summary = JobSummary::from_load(&JobId::new("20230101120000000000"), &load);

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["Function"], "net.cli");
        assert_eq!(value["Arguments"], json!(["show version"]));
        assert_eq!(value["Target"], "edge*");
        assert_eq!(value["Target-type"], "glob");
        assert_eq!(value["User"], "netops");
    }

    #[test]
    fn test_result_uses_return_key() {
        let result: JobResult = serde_json::from_value(json!({
            "fun": "test.ping",
            "jid": "20230101120000000000",
            "return": true,
            "id": "host1",
            "success": true
        }))
        .unwrap();
        assert_eq!(result.return_value, json!(true));
        assert_eq!(result.jid, JobId::new("20230101120000000000"));
    }
}
