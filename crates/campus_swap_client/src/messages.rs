//! Realtime wire format. Every WebSocket text frame is one JSON envelope:
//! `{"event": "<name>", "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;
use crate::models::ChatMessage;

/// Event names used on the realtime channel.
pub mod events {
    /// Both directions: one chat message.
    pub const CHAT_MESSAGE: &str = "chat message";
    /// Client → server: ask for the conversation list.
    pub const GET_ALL_CONVERSATIONS: &str = "get all conversations";
    /// Server → client: `Vec<Conversation>`.
    pub const ALL_CONVERSATIONS: &str = "all conversations";
    /// Client → server: [`super::HistoryRequest`].
    pub const GET_CONVERSATION_HISTORY: &str = "get conversation history";
    /// Server → client: [`super::HistoryResponse`].
    pub const CONVERSATION_HISTORY: &str = "conversation history";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn to_frame(&self) -> Result<String, ClientError> {
        serde_json::to_string(self).map_err(|e| ClientError::Socket(e.to_string()))
    }

    pub fn parse(frame: &str) -> Result<Self, ClientError> {
        serde_json::from_str(frame).map_err(|e| ClientError::Socket(format!("bad frame: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub user_id: String,
}

/// Counterpart details sent along with a history response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_online: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub recipient: Option<Recipient>,
}
