use serde::Serialize;
use serde_json::{json, Value};

use crate::error::BridgeError;

/// One response line on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl Response {
    pub fn pong() -> Self {
        Response::Success {
            message: None,
            result: Some(json!({ "message": "pong" })),
        }
    }

    pub fn from_error(err: &BridgeError) -> Self {
        Response::Error {
            error: err.to_string(),
            detail: err.detail(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }

    /// Serialized form, newline terminated.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|err| {
            format!(r#"{{"status":"error","error":"Response could not be encoded: {err}"}}"#)
        });
        line.push('\n');
        line
    }
}

impl From<Reply> for Response {
    fn from(reply: Reply) -> Self {
        Response::Success {
            message: Some(reply.message),
            result: reply.data,
        }
    }
}

/// What a handler produces on success.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub message: String,
    pub data: Option<Value>,
}

impl Reply {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    /// Folds per-key failures into the message; the request still succeeds.
    pub fn with_warnings(mut self, warnings: &[String]) -> Self {
        if !warnings.is_empty() {
            self.message = format!(
                "{} Warnings ({}): {}",
                self.message,
                warnings.len(),
                warnings.join("; ")
            );
        }
        self
    }
}
