//! Streaming exchange against the Spark endpoint.
//!
//! One exchange is one request frame out followed by a sequence of
//! completion frames back. Frame folding is kept separate from socket
//! handling so the state machine can be exercised without a connection.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::debug;

use crate::api::auth;
use crate::api::types::{
    ChatParameter, ChatRequest, ChatResponse, FunctionBlock, FunctionCallFragment,
    FunctionDefinition, MessageBlock, RequestHeader, RequestParameter, RequestPayload,
    WireMessage, TERMINAL_STATUS,
};
use crate::core::config::SparkConfig;
use crate::core::error::ChatError;

const FRAME_TIMEOUT_SECONDS: u64 = 60;

/// Receives assistant text fragments as they arrive, in stream order.
pub trait StreamObserver: Send {
    fn on_partial_text(&mut self, fragment: &str);
}

/// How a completed exchange resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeOutcome {
    /// Plain assistant text, accumulated across all fragments.
    Text(String),
    /// The model asked for a tool invocation instead of answering directly.
    FunctionCall(FunctionCallRequest),
}

/// A function-call directive with its arguments parsed into JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallRequest {
    pub name: String,
    pub arguments: Value,
}

/// A chat-completion endpoint the session can stream an exchange through.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn stream_exchange(
        &self,
        messages: Vec<WireMessage>,
        functions: Option<Vec<FunctionDefinition>>,
        observer: &mut dyn StreamObserver,
    ) -> Result<ExchangeOutcome, ChatError>;
}

enum FrameStep {
    Continue,
    Resolved(ExchangeOutcome),
}

/// Folds inbound frames into an outcome. Text fragments accumulate in
/// arrival order; a function-call fragment, once seen, stays pending until
/// the terminal frame and wins over any accumulated text.
#[derive(Default)]
struct ExchangeState {
    accumulated: String,
    pending_call: Option<FunctionCallFragment>,
}

impl ExchangeState {
    fn apply(
        &mut self,
        response: ChatResponse,
        observer: &mut dyn StreamObserver,
    ) -> Result<FrameStep, ChatError> {
        if response.header.code != 0 {
            return Err(ChatError::Protocol(format!(
                "code {}: {} (sid {})",
                response.header.code, response.header.message, response.header.sid
            )));
        }

        if let Some(payload) = response.payload {
            for fragment in payload.choices.text {
                if !fragment.content.is_empty() {
                    observer.on_partial_text(&fragment.content);
                    self.accumulated.push_str(&fragment.content);
                }
                if let Some(call) = fragment.function_call {
                    if self.pending_call.is_none() {
                        self.pending_call = Some(call);
                    }
                }
            }
        }

        if response.header.status == TERMINAL_STATUS {
            return Ok(FrameStep::Resolved(self.resolve()?));
        }
        Ok(FrameStep::Continue)
    }

    fn resolve(&mut self) -> Result<ExchangeOutcome, ChatError> {
        match self.pending_call.take() {
            Some(call) => {
                let arguments = if call.arguments.trim().is_empty() {
                    Value::Object(serde_json::Map::new())
                } else {
                    serde_json::from_str(&call.arguments).map_err(|err| {
                        ChatError::Protocol(format!(
                            "malformed arguments for function {}: {err}",
                            call.name
                        ))
                    })?
                };
                Ok(ExchangeOutcome::FunctionCall(FunctionCallRequest {
                    name: call.name,
                    arguments,
                }))
            }
            None => Ok(ExchangeOutcome::Text(std::mem::take(&mut self.accumulated))),
        }
    }
}

/// Spark endpoint backend. Each exchange opens a fresh signed WebSocket
/// connection, sends one request frame, and folds frames until terminal.
pub struct SparkBackend {
    config: SparkConfig,
    uid: String,
}

impl SparkBackend {
    pub fn new(config: SparkConfig) -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        SparkBackend {
            config,
            uid: format!("sparkmd-{millis:x}"),
        }
    }

    fn build_request(
        &self,
        messages: Vec<WireMessage>,
        functions: Option<Vec<FunctionDefinition>>,
    ) -> ChatRequest {
        ChatRequest {
            header: RequestHeader {
                app_id: self.config.app_id.clone(),
                uid: self.uid.clone(),
            },
            parameter: RequestParameter {
                chat: ChatParameter {
                    domain: self.config.domain.clone(),
                    temperature: self.config.temperature,
                    max_tokens: self.config.max_tokens,
                },
            },
            payload: RequestPayload {
                message: MessageBlock { text: messages },
                functions: functions.map(|text| FunctionBlock { text }),
            },
        }
    }
}

#[async_trait]
impl CompletionBackend for SparkBackend {
    async fn stream_exchange(
        &self,
        messages: Vec<WireMessage>,
        functions: Option<Vec<FunctionDefinition>>,
        observer: &mut dyn StreamObserver,
    ) -> Result<ExchangeOutcome, ChatError> {
        let url = auth::auth_url(
            &self.config.chat_url,
            &self.config.api_key,
            &self.config.api_secret,
        )
        .map_err(ChatError::Transport)?;

        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        let request = self.build_request(messages, functions);
        let frame = serde_json::to_string(&request)
            .map_err(|err| ChatError::Protocol(err.to_string()))?;
        debug!(bytes = frame.len(), "Sending Spark request frame");
        sink.send(WsMessage::Text(frame))
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))?;

        let frame_timeout = tokio::time::Duration::from_secs(FRAME_TIMEOUT_SECONDS);
        let mut state = ExchangeState::default();
        loop {
            let next = tokio::time::timeout(frame_timeout, stream.next())
                .await
                .map_err(|_| {
                    ChatError::Transport("timed out waiting for completion frame".to_string())
                })?;
            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(err)) => return Err(ChatError::Transport(err.to_string())),
                None => {
                    return Err(ChatError::Transport(
                        "connection closed before terminal frame".to_string(),
                    ))
                }
            };

            match message {
                WsMessage::Text(text) => {
                    let response: ChatResponse = serde_json::from_str(&text).map_err(|err| {
                        ChatError::Protocol(format!("malformed completion frame: {err}"))
                    })?;
                    debug!(
                        status = response.header.status,
                        seq = response.payload.as_ref().map(|p| p.choices.seq),
                        "Received Spark frame"
                    );
                    match state.apply(response, observer)? {
                        FrameStep::Continue => {}
                        FrameStep::Resolved(outcome) => {
                            // The client closes; it never waits on the peer.
                            let _ = sink.send(WsMessage::Close(None)).await;
                            return Ok(outcome);
                        }
                    }
                }
                WsMessage::Ping(payload) => {
                    let _ = sink.send(WsMessage::Pong(payload)).await;
                }
                WsMessage::Close(_) => {
                    return Err(ChatError::Transport(
                        "connection closed before terminal frame".to_string(),
                    ));
                }
                _ => {}
            }
        }
    }
}
