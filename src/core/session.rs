//! Chat session state and the turn processor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::types::WireMessage;
use crate::core::chat_stream::{
    CompletionBackend, ExchangeOutcome, FunctionCallRequest, StreamObserver,
};
use crate::core::error::ChatError;
use crate::core::message::Message;
use crate::mcp::inventory::CapabilityInventory;
use crate::mcp::ToolProvider;

const SYSTEM_PREAMBLE: &str = "You are a helpful assistant that manages the user's \
markdown documents. Prefer calling a tool over describing what you would do. \
Answer in the user's language.";

/// One user-facing conversation: transcript, capability snapshot, and the
/// single-flight guard around the turn processor. Shared freely; turns
/// requested while one is in flight fail fast with [`ChatError::Busy`].
pub struct ChatSession {
    backend: Box<dyn CompletionBackend>,
    provider: Arc<dyn ToolProvider>,
    history: Mutex<Vec<Message>>,
    inventory: Mutex<Option<CapabilityInventory>>,
    busy: AtomicBool,
}

/// Releases the busy flag when the turn finishes, including when the turn
/// future is dropped mid-exchange.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ChatSession {
    pub fn new(backend: Box<dyn CompletionBackend>, provider: Arc<dyn ToolProvider>) -> Self {
        ChatSession {
            backend,
            provider,
            history: Mutex::new(Vec::new()),
            inventory: Mutex::new(None),
            busy: AtomicBool::new(false),
        }
    }

    /// Fetches the provider's capability inventory. Turns are rejected with
    /// [`ChatError::NotConnected`] until this succeeds.
    pub async fn connect(&self) -> Result<CapabilityInventory, ChatError> {
        let inventory = CapabilityInventory::fetch(self.provider.as_ref())
            .await
            .map_err(ChatError::Tool)?;
        *self.inventory.lock().await = Some(inventory.clone());
        Ok(inventory)
    }

    pub async fn inventory(&self) -> Option<CapabilityInventory> {
        self.inventory.lock().await.clone()
    }

    pub async fn history(&self) -> Vec<Message> {
        self.history.lock().await.clone()
    }

    /// Empties the transcript. The system preamble is rebuilt per request
    /// and survives.
    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }

    pub fn provider(&self) -> &Arc<dyn ToolProvider> {
        &self.provider
    }

    /// Runs one full turn: first exchange with the function table offered,
    /// then, if the model called a tool, the invocation and a summary
    /// exchange without functions. Returns the final assistant text. A turn
    /// requested while another is outstanding is rejected immediately and
    /// leaves the transcript untouched.
    pub async fn process_turn(
        &self,
        user_text: &str,
        observer: &mut dyn StreamObserver,
    ) -> Result<String, ChatError> {
        if self.inventory.lock().await.is_none() {
            return Err(ChatError::NotConnected);
        }
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(ChatError::Busy);
        }
        let _guard = BusyGuard(&self.busy);
        self.run_turn(user_text, observer).await
    }

    async fn run_turn(
        &self,
        user_text: &str,
        observer: &mut dyn StreamObserver,
    ) -> Result<String, ChatError> {
        self.history.lock().await.push(Message::user(user_text));

        let mut messages = self.outbound_messages().await;
        let functions = self
            .inventory
            .lock()
            .await
            .as_ref()
            .map(|inventory| inventory.function_definitions());

        // A failed exchange keeps the user turn in the transcript; no
        // assistant entry is recorded for it.
        let outcome = self
            .backend
            .stream_exchange(messages.clone(), functions, observer)
            .await?;

        let final_text = match outcome {
            ExchangeOutcome::Text(text) => text,
            ExchangeOutcome::FunctionCall(call) => {
                debug!(tool = %call.name, "Model requested a tool invocation");
                match self.invoke_tool(&call).await {
                    Ok(tool_summary) => {
                        self.refresh_inventory().await;
                        messages.push(WireMessage {
                            role: "assistant".to_string(),
                            content: tool_summary.clone(),
                            content_type: None,
                            index: None,
                            function_call: None,
                        });
                        self.summarize(messages, tool_summary, observer).await
                    }
                    Err(reason) => {
                        warn!(tool = %call.name, error = %reason, "Tool invocation failed");
                        format!("operation failed: {reason}")
                    }
                }
            }
        };

        self.history
            .lock()
            .await
            .push(Message::assistant(final_text.clone()));
        Ok(final_text)
    }

    /// Second exchange with no function table. Falls back to the raw tool
    /// outcome when the model adds nothing usable.
    async fn summarize(
        &self,
        messages: Vec<WireMessage>,
        tool_summary: String,
        observer: &mut dyn StreamObserver,
    ) -> String {
        match self.backend.stream_exchange(messages, None, observer).await {
            Ok(ExchangeOutcome::Text(text)) if !text.is_empty() => text,
            Ok(_) => tool_summary,
            Err(err) => {
                warn!(error = %err, "Summary exchange failed");
                tool_summary
            }
        }
    }

    async fn invoke_tool(&self, call: &FunctionCallRequest) -> Result<String, String> {
        let arguments = match &call.arguments {
            Value::Object(map) => Some(map.clone()),
            Value::Null => None,
            _ => return Err("tool arguments must be a JSON object".to_string()),
        };
        let result = self.provider.call_tool(&call.name, arguments).await?;
        let rendered = serde_json::to_string_pretty(&result).map_err(|err| err.to_string())?;
        Ok(format!("Executed tool {} with result:\n{rendered}", call.name))
    }

    async fn refresh_inventory(&self) {
        match CapabilityInventory::fetch(self.provider.as_ref()).await {
            Ok(refreshed) => *self.inventory.lock().await = Some(refreshed),
            Err(err) => {
                // Keep the previous snapshot on a failed refresh.
                warn!(error = %err, "Failed to refresh capability inventory");
            }
        }
    }

    /// The wire view of the session: system preamble, capability snapshot,
    /// then the full transcript in order.
    async fn outbound_messages(&self) -> Vec<WireMessage> {
        let mut messages = vec![Message::system(SYSTEM_PREAMBLE).to_wire()];
        if let Some(inventory) = self.inventory.lock().await.as_ref() {
            messages.push(Message::system(inventory.render_system_message()).to_wire());
        }
        messages.extend(self.history.lock().await.iter().map(Message::to_wire));
        messages
    }
}
