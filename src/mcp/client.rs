//! Stdio transport for the markdown tool provider.
//!
//! The provider is spawned as a child process and spoken to over
//! newline-delimited JSON-RPC on its stdin/stdout. Responses are matched
//! to requests through a pending map keyed by request id; a reader task
//! owns stdout and a drain task keeps stderr from blocking the child.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::{
    CallToolRequestParams, CallToolResult, ClientCapabilities, GetPromptRequestParams,
    GetPromptResult, Implementation, InitializeRequestParams, InitializeResult, ListPromptsResult,
    ListResourcesResult, ListToolsResult, ReadResourceRequestParams, ReadResourceResult,
    RequestId, LATEST_PROTOCOL_VERSION,
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::debug;

use crate::mcp::{parse_response, ToolProvider};

const STDIO_REQUEST_TIMEOUT_SECONDS: u64 = 60;

/// MCP client for a stdio tool provider.
pub struct StdioToolClient {
    stdin: Mutex<ChildStdin>,
    pending: Arc<Mutex<HashMap<RequestId, oneshot::Sender<ServerMessage>>>>,
    next_request_id: AtomicI64,
    server_details: RwLock<Option<InitializeResult>>,
}

impl StdioToolClient {
    /// Spawns the provider process and performs the initialize handshake.
    pub async fn connect(command: &str, args: &[String]) -> Result<Arc<Self>, String> {
        debug!(command = %command, args = ?args, "Starting MCP stdio server");
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|err| err.to_string())?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| "Unable to retrieve stdin.".to_string())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "Unable to retrieve stdout.".to_string())?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| "Unable to retrieve stderr.".to_string())?;

        let pending: Arc<Mutex<HashMap<RequestId, oneshot::Sender<ServerMessage>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let client = Arc::new(Self {
            stdin: Mutex::new(stdin),
            pending: pending.clone(),
            next_request_id: AtomicI64::new(0),
            server_details: RwLock::new(None),
        });

        Self::spawn_stdout_reader(pending.clone(), stdout);
        Self::spawn_stderr_drain(stderr);

        // Dropped senders make in-flight requests fail fast if the child dies.
        tokio::spawn(async move {
            let _ = child.wait().await;
            let mut pending = pending.lock().await;
            pending.clear();
        });

        client.initialize().await?;
        Ok(client)
    }

    /// Details reported by the provider during initialize, if connected.
    pub async fn server_details(&self) -> Option<InitializeResult> {
        self.server_details.read().await.clone()
    }

    /// Closes the provider's stdin so it can exit on EOF.
    pub async fn shutdown(&self) {
        let mut stdin = self.stdin.lock().await;
        let _ = stdin.shutdown().await;
    }

    async fn initialize(&self) -> Result<InitializeResult, String> {
        let details = InitializeRequestParams {
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "sparkmd".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Sparkmd MCP Client".to_string()),
                description: Some("Sparkmd markdown chat client".to_string()),
                icons: Vec::new(),
                website_url: None,
            },
            meta: None,
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
        };
        let response = self
            .send_request(RequestFromClient::InitializeRequest(details))
            .await?;
        let result = parse_initialize_result(response)?;
        *self.server_details.write().await = Some(result.clone());
        self.send_notification(NotificationFromClient::InitializedNotification(None))
            .await?;
        Ok(result)
    }

    fn spawn_stdout_reader(
        pending: Arc<Mutex<HashMap<RequestId, oneshot::Sender<ServerMessage>>>>,
        stdout: tokio::process::ChildStdout,
    ) {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                let value = match serde_json::from_str::<Value>(&line) {
                    Ok(value) => value,
                    Err(_) => continue,
                };
                if let Some(items) = value.as_array() {
                    for item in items {
                        if let Ok(message) = serde_json::from_value::<ServerMessage>(item.clone()) {
                            Self::dispatch_message(&pending, message).await;
                        }
                    }
                } else if let Ok(message) = serde_json::from_value::<ServerMessage>(value) {
                    Self::dispatch_message(&pending, message).await;
                }
            }
        });
    }

    fn spawn_stderr_drain(stderr: tokio::process::ChildStderr) {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(_)) = reader.next_line().await {}
        });
    }

    async fn dispatch_message(
        pending: &Arc<Mutex<HashMap<RequestId, oneshot::Sender<ServerMessage>>>>,
        message: ServerMessage,
    ) {
        match &message {
            ServerMessage::Response(response) => {
                debug!(response_id = ?response.id, "Received MCP stdio response");
                if let Some(tx) = pending.lock().await.remove(&response.id) {
                    let _ = tx.send(message);
                }
            }
            ServerMessage::Error(error) => {
                debug!(error_id = ?error.id, error_code = error.error.code, "Received MCP stdio error");
                if let Some(id) = error.id.as_ref() {
                    if let Some(tx) = pending.lock().await.remove(id) {
                        let _ = tx.send(message);
                    }
                }
            }
            ServerMessage::Request(_) | ServerMessage::Notification(_) => {
                debug!("Ignoring unsolicited MCP stdio message");
            }
        }
    }

    fn next_request_id(&self) -> RequestId {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst) + 1;
        RequestId::Integer(id)
    }

    async fn send_request(&self, request: RequestFromClient) -> Result<ServerMessage, String> {
        let request_id = self.next_request_id();
        debug!(request_id = ?request_id, "Sending MCP stdio request");
        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(request_id.clone()),
        )
        .map_err(|err| err.to_string())?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(request_id.clone(), tx);
        }

        if let Err(err) = self.write_line(&message).await {
            self.pending.lock().await.remove(&request_id);
            return Err(err);
        }

        let timeout = tokio::time::Duration::from_secs(STDIO_REQUEST_TIMEOUT_SECONDS);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err("MCP stdio response channel closed.".to_string()),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err("MCP stdio request timed out.".to_string())
            }
        }
    }

    async fn send_notification(&self, notification: NotificationFromClient) -> Result<(), String> {
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|err| err.to_string())?;
        self.write_line(&message).await
    }

    async fn write_line(&self, message: &ClientMessage) -> Result<(), String> {
        let payload = serde_json::to_string(message).map_err(|err| err.to_string())?;
        let write_timeout = tokio::time::Duration::from_secs(10);
        let mut stdin = self.stdin.lock().await;
        debug!(bytes = payload.len(), "Writing MCP stdio message");
        tokio::time::timeout(write_timeout, stdin.write_all(payload.as_bytes()))
            .await
            .map_err(|_| "Timed out writing MCP stdio message.".to_string())?
            .map_err(|err| err.to_string())?;
        tokio::time::timeout(write_timeout, stdin.write_all(b"\n"))
            .await
            .map_err(|_| "Timed out writing MCP stdio message newline.".to_string())?
            .map_err(|err| err.to_string())?;
        tokio::time::timeout(write_timeout, stdin.flush())
            .await
            .map_err(|_| "Timed out flushing MCP stdio message.".to_string())?
            .map_err(|err| err.to_string())?;
        Ok(())
    }
}

#[async_trait]
impl ToolProvider for StdioToolClient {
    async fn list_tools(&self) -> Result<ListToolsResult, String> {
        let response = self
            .send_request(RequestFromClient::ListToolsRequest(None))
            .await?;
        parse_response(response)
    }

    async fn list_resources(&self) -> Result<ListResourcesResult, String> {
        let response = self
            .send_request(RequestFromClient::ListResourcesRequest(None))
            .await?;
        parse_response(response)
    }

    async fn list_prompts(&self) -> Result<ListPromptsResult, String> {
        let response = self
            .send_request(RequestFromClient::ListPromptsRequest(None))
            .await?;
        parse_response(response)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallToolResult, String> {
        let mut params = CallToolRequestParams::new(name);
        if let Some(arguments) = arguments {
            params = params.with_arguments(arguments);
        }
        let response = self
            .send_request(RequestFromClient::CallToolRequest(params))
            .await?;
        parse_response(response)
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, String> {
        let params = ReadResourceRequestParams {
            meta: None,
            uri: uri.to_string(),
        };
        let response = self
            .send_request(RequestFromClient::ReadResourceRequest(params))
            .await?;
        parse_response(response)
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<GetPromptResult, String> {
        let params = GetPromptRequestParams {
            name: name.to_string(),
            arguments: (!arguments.is_empty()).then_some(arguments),
            meta: None,
        };
        let response = self
            .send_request(RequestFromClient::GetPromptRequest(params))
            .await?;
        parse_response(response)
    }
}

fn parse_initialize_result(message: ServerMessage) -> Result<InitializeResult, String> {
    let value = crate::mcp::parse_response_value(message)?;
    let result =
        serde_json::from_value::<InitializeResult>(value).map_err(|err| err.to_string())?;
    if result.protocol_version.trim().is_empty() {
        return Err("Unexpected initialize response.".to_string());
    }
    Ok(result)
}
