use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    violation::{Violation, ViolationLog},
    ProctorError, Result,
};

/// Interview results as posted to the backend. Only the violation array is
/// owned here; scores and answers ride along untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionPayload {
    #[serde(flatten)]
    pub results: Map<String, Value>,
    pub violations: Vec<Violation>,
}

impl SubmissionPayload {
    pub fn new(results: Map<String, Value>, log: &ViolationLog) -> Self {
        Self {
            results,
            violations: log.entries().to_vec(),
        }
    }

    /// Merges `log` into an existing JSON object under `violations`.
    pub fn attach(payload: Value, log: &ViolationLog) -> Result<Value> {
        let Value::Object(mut results) = payload else {
            return Err(ProctorError::Session(
                "submission payload must be a JSON object".into(),
            ));
        };
        results.remove("violations");
        let merged = Self::new(results, log);
        serde_json::to_value(merged)
            .map_err(|err| ProctorError::Session(format!("failed to encode submission: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violation::{Severity, ViolationKind};
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn attach_keeps_results_and_order() {
        let mut log = ViolationLog::new();
        log.push(Violation::new(
            ViolationKind::WindowBlur,
            Severity::Medium,
            "first",
            Utc::now(),
        ));
        log.push(Violation::new(
            ViolationKind::TabSwitch,
            Severity::High,
            "second",
            Utc::now(),
        ));

        let merged = SubmissionPayload::attach(json!({"score": 42, "answers": [1, 2]}), &log)
            .expect("attach violations");
        assert_eq!(merged["score"], 42);
        let violations = merged["violations"].as_array().expect("violation array");
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0]["description"], "first");
        assert_eq!(violations[1]["type"], "tab_switch");
    }

    #[test]
    fn empty_log_is_an_empty_array() {
        let merged =
            SubmissionPayload::attach(json!({}), &ViolationLog::new()).expect("attach empty log");
        assert_eq!(merged["violations"], json!([]));
    }

    #[test]
    fn rejects_non_object_payloads() {
        assert!(SubmissionPayload::attach(json!([1]), &ViolationLog::new()).is_err());
    }
}
