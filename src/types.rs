use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::DriverError;

/// The only action the driver context understands.
pub const PROCESS_MESSAGE: &str = "processMessage";

/// Request sent from the processor context to the driver context.
///
/// Wire shape: `{"action": "processMessage", "promptText": "...", "imageMode": false}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub action: String,
    pub prompt_text: String,
    pub image_mode: bool,
}

impl ProcessRequest {
    /// Build a `processMessage` request.
    pub fn new(prompt_text: impl Into<String>, image_mode: bool) -> Self {
        Self {
            action: PROCESS_MESSAGE.to_string(),
            prompt_text: prompt_text.into(),
            image_mode,
        }
    }

    /// Decode a request received over the bridge.
    ///
    /// A `promptText` that is missing or not a string is `InvalidInput`, so
    /// the caller can answer it like any other rejected prompt.
    pub fn from_value(value: &Value) -> Result<Self, DriverError> {
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if action != PROCESS_MESSAGE {
            return Err(DriverError::InvalidInput(format!(
                "Unknown action: {:?}",
                action
            )));
        }

        let prompt_text = value
            .get("promptText")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::InvalidInput("Invalid message: not a string".into()))?;

        Ok(Self {
            action: action.to_string(),
            prompt_text: prompt_text.to_string(),
            image_mode: value
                .get("imageMode")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

/// Response sent back from the driver context: `{"success": bool, "error"?: string}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessResponse {
    /// Create a successful response.
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// Create a failure response with a reason.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

impl From<Result<(), DriverError>> for ProcessResponse {
    fn from(result: Result<(), DriverError>) -> Self {
        match result {
            Ok(()) => ProcessResponse::success(),
            Err(e) => ProcessResponse::failure(e.reason()),
        }
    }
}

/// Point-in-time view of the processor for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub queue: Vec<String>,
    pub processing: bool,
    #[serde(with = "millis")]
    pub min_wait: Duration,
    pub image_mode: bool,
}

pub(crate) mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let req = ProcessRequest::new("hello", true);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({"action": "processMessage", "promptText": "hello", "imageMode": true})
        );
    }

    #[test]
    fn test_request_from_value_rejects_non_text() {
        let err = ProcessRequest::from_value(&json!({
            "action": "processMessage",
            "promptText": 42,
            "imageMode": false
        }))
        .unwrap_err();
        assert!(matches!(err, DriverError::InvalidInput(_)));
    }

    #[test]
    fn test_request_from_value_rejects_unknown_action() {
        let err = ProcessRequest::from_value(&json!({"action": "ping", "promptText": "x"}))
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidInput(_)));
    }

    #[test]
    fn test_request_image_mode_defaults_off() {
        let req =
            ProcessRequest::from_value(&json!({"action": "processMessage", "promptText": "x"}))
                .unwrap();
        assert!(!req.image_mode);
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let snapshot = QueueSnapshot {
            queue: vec!["a".into()],
            processing: false,
            min_wait: Duration::from_millis(3000),
            image_mode: true,
        };
        assert_eq!(
            serde_json::to_value(&snapshot).unwrap(),
            json!({"queue": ["a"], "processing": false, "minWait": 3000, "imageMode": true})
        );
    }

    #[test]
    fn test_response_omits_missing_error() {
        let value = serde_json::to_value(ProcessResponse::success()).unwrap();
        assert_eq!(value, json!({"success": true}));

        let failed: ProcessResponse = Err(DriverError::Timeout).into();
        assert_eq!(failed.error.as_deref(), Some("Response timeout"));
    }
}
