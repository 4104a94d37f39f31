use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProxyError, BODY_SHAPE_MESSAGE};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

impl ChatRequest {
    /// Parses a raw request body. An empty body counts as `{}`.
    pub fn parse(body: &[u8]) -> Result<Self, ProxyError> {
        let value: Value = if body.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_slice(body).map_err(|_| ProxyError::InvalidJson)?
        };

        // Struct deserialization would otherwise accept `[user, history]`.
        if !value.is_object() {
            return Err(ProxyError::InvalidBody(BODY_SHAPE_MESSAGE.to_string()));
        }

        serde_json::from_value(value).map_err(|e| {
            debug!("Rejected request body: {}", e);
            ProxyError::InvalidBody(BODY_SHAPE_MESSAGE.to_string())
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

/// Role of a caller-supplied history turn. Anything but `"user"` is the assistant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Value")]
pub enum TurnRole {
    User,
    #[default]
    Assistant,
}

impl From<Value> for TurnRole {
    fn from(value: Value) -> Self {
        match value.as_str() {
            Some("user") => Self::User,
            _ => Self::Assistant,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationTurn {
    #[serde(default)]
    pub role: TurnRole,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "system")]
    System,
}

impl From<TurnRole> for Role {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}
