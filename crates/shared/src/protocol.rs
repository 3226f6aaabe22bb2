use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::ListingKind,
    error::{FailureEnvelope, ServerRejection},
};

/// Body of `POST /api/user/update/{id}`. Fields left as `None` are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Query string of `GET /api/listing/get`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<bool>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ListingKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl ListingQuery {
    pub fn offers(limit: u32) -> Self {
        Self {
            offer: Some(true),
            kind: None,
            limit: Some(limit),
        }
    }

    pub fn of_kind(kind: ListingKind, limit: u32) -> Self {
        Self {
            offer: None,
            kind: Some(kind),
            limit: Some(limit),
        }
    }
}

/// Free-form confirmation payload returned by delete and sign-out endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Acknowledgement(pub Value);

impl Acknowledgement {
    pub fn message(&self) -> Option<&str> {
        match &self.0 {
            Value::String(text) => Some(text),
            Value::Object(map) => map.get("message").and_then(Value::as_str),
            _ => None,
        }
    }
}

/// A backend reply: either the expected payload or a `success: false` rejection.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerReply<T> {
    Accepted(T),
    Rejected(ServerRejection),
}

impl<T: DeserializeOwned> ServerReply<T> {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if value.get("success").and_then(Value::as_bool) == Some(false) {
            let envelope: FailureEnvelope = serde_json::from_value(value)?;
            return Ok(Self::Rejected(envelope.into()));
        }
        serde_json::from_value(value).map(Self::Accepted)
    }
}

impl<T> ServerReply<T> {
    pub fn into_result(self) -> Result<T, ServerRejection> {
        match self {
            Self::Accepted(payload) => Ok(payload),
            Self::Rejected(rejection) => Err(rejection),
        }
    }
}
