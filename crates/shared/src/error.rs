use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body the backend sends when it rejects a request: `{ "success": false, "message": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEnvelope {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "statusCode", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl FailureEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            status_code: None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("server rejected request: {message}")]
pub struct ServerRejection {
    pub message: String,
}

impl ServerRejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<FailureEnvelope> for ServerRejection {
    fn from(value: FailureEnvelope) -> Self {
        Self {
            message: value.message.unwrap_or_default(),
        }
    }
}
