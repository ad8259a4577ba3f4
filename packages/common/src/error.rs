use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Errors that carry a stable, machine-readable identifier.
///
/// Codes are dashed identifiers such as `move-operation-nodes-do-not-exist`.
/// They never change between releases, so tooling may match on them.
pub trait ErrorCode {
    fn code(&self) -> &'static str;

    /// Structured context for the failure, `null` when there is none.
    fn data(&self) -> Value {
        Value::Null
    }
}

/// Serializable snapshot of a coded error, used for logs and CLI output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl ErrorReport {
    pub fn from_error<E: ErrorCode + fmt::Display>(error: &E) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            data: error.data(),
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("thing {0} is missing")]
    struct Missing(u32);

    impl ErrorCode for Missing {
        fn code(&self) -> &'static str {
            "thing-missing"
        }

        fn data(&self) -> Value {
            json!({ "id": self.0 })
        }
    }

    #[test]
    fn test_report_from_error() {
        let report = ErrorReport::from_error(&Missing(7));
        assert_eq!(report.code, "thing-missing");
        assert_eq!(report.message, "thing 7 is missing");
        assert_eq!(report.data, json!({ "id": 7 }));
        assert_eq!(report.to_string(), "[thing-missing] thing 7 is missing");
    }
}
