//! Request and response payloads for the Spark chat-completion endpoint.
//!
//! The endpoint speaks JSON over a WebSocket: one request frame out, a
//! sequence of completion frames back. Field names follow the wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal value of `header.status` on an inbound frame.
pub const TERMINAL_STATUS: i64 = 2;

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub header: RequestHeader,
    pub parameter: RequestParameter,
    pub payload: RequestPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestHeader {
    pub app_id: String,
    pub uid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestParameter {
    pub chat: ChatParameter,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatParameter {
    pub domain: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestPayload {
    pub message: MessageBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<FunctionBlock>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageBlock {
    pub text: Vec<WireMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionBlock {
    pub text: Vec<FunctionDefinition>,
}

/// A single conversation entry as the endpoint sees it, in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallFragment>,
}

/// Function-call directive carried inside a completion fragment. The
/// `arguments` field is a JSON document encoded as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallFragment {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// A callable tool advertised to the model alongside the conversation.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub payload: Option<ResponsePayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseHeader {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub sid: String,
    #[serde(default)]
    pub status: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsePayload {
    pub choices: ResponseChoices,
    #[serde(default)]
    pub usage: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseChoices {
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub seq: i64,
    #[serde(default)]
    pub text: Vec<WireMessage>,
}
