//! JSON-RPC dispatch for the markdown provider.
//!
//! The provider speaks newline-delimited JSON-RPC 2.0 on stdio. Requests
//! carry an id and get exactly one response; notifications are consumed
//! silently. Unknown methods and bad parameters come back as standard
//! RPC errors.

use chrono::Utc;
use pulldown_cmark::{html, Parser};
use rust_mcp_schema::{RpcError, LATEST_PROTOCOL_VERSION};
use serde_json::{json, Value};
use tracing::debug;

use crate::server::store::{file_name_from_uri, MarkdownStore, StoreError, URI_SCHEME};

pub struct MarkdownHandler {
    store: MarkdownStore,
}

impl MarkdownHandler {
    pub fn new(store: MarkdownStore) -> Self {
        MarkdownHandler { store }
    }

    /// Handles one inbound line. Returns the response to write back, or
    /// `None` for notifications and unparseable input.
    pub fn handle_line(&self, line: &str) -> Option<Value> {
        let message: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "Ignoring unparseable input line");
                return None;
            }
        };
        let method = message.get("method").and_then(Value::as_str)?.to_string();
        let Some(id) = message.get("id").filter(|id| !id.is_null()).cloned() else {
            debug!(method = %method, "Ignoring client notification");
            return None;
        };
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        debug!(method = %method, "Handling request");
        Some(match self.dispatch(&method, &params) {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err(error) => {
                let error = serde_json::to_value(&error).unwrap_or_else(|_| {
                    json!({"code": -32603, "message": "Internal error"})
                });
                json!({"jsonrpc": "2.0", "id": id, "error": error})
            }
        })
    }

    fn dispatch(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize(params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({"tools": tool_table()})),
            "tools/call" => self.call_tool(params),
            "resources/list" => self.list_resources(),
            "resources/read" => self.read_resource(params),
            "prompts/list" => Ok(json!({"prompts": prompt_table()})),
            "prompts/get" => self.get_prompt(params),
            other => {
                Err(RpcError::method_not_found()
                    .with_message(&format!("unknown method: {other}")))
            }
        }
    }

    fn initialize(&self, params: &Value) -> Value {
        let protocol_version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(LATEST_PROTOCOL_VERSION);
        json!({
            "protocolVersion": protocol_version,
            "capabilities": {"tools": {}, "resources": {}, "prompts": {}},
            "serverInfo": {
                "name": "sparkmd-server",
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    fn call_tool(&self, params: &Value) -> Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params().with_message("missing tool name"))?;
        let args = params.get("arguments").cloned().unwrap_or(json!({}));
        match name {
            "create_markdown" => self.create_markdown(&args),
            "edit_markdown" => self.edit_markdown(&args),
            "delete_markdown" => self.delete_markdown(&args),
            "search_markdown" => self.search_markdown(&args),
            "convert_to_html" => convert_to_html(&args),
            "update_metadata" => self.update_metadata(&args),
            "list_versions" => self.list_versions(&args),
            "export_markdown" => self.export_markdown(&args),
            other => Err(RpcError::method_not_found()
                .with_message(&format!("unknown tool: {other}"))),
        }
    }

    fn create_markdown(&self, args: &Value) -> Result<Value, RpcError> {
        let title = required_str(args, "title")?;
        let content = required_str(args, "content")?;
        let (file_name, meta) = self
            .store
            .create(
                title,
                content,
                string_list(args, "categories"),
                string_list(args, "tags"),
            )
            .map_err(store_error)?;
        Ok(text_result(format!(
            "Created markdown document {file_name} ({URI_SCHEME}{file_name}), metadata: {}",
            compact(&meta)
        )))
    }

    fn edit_markdown(&self, args: &Value) -> Result<Value, RpcError> {
        let file_name = uri_arg(args)?;
        let content = required_str(args, "content")?;
        let meta = self.store.update(&file_name, content).map_err(store_error)?;
        Ok(text_result(format!(
            "Updated document {file_name}, metadata: {}",
            compact(&meta)
        )))
    }

    fn delete_markdown(&self, args: &Value) -> Result<Value, RpcError> {
        let file_name = uri_arg(args)?;
        self.store.delete(&file_name).map_err(store_error)?;
        Ok(text_result(format!("Deleted document {file_name}")))
    }

    fn search_markdown(&self, args: &Value) -> Result<Value, RpcError> {
        let query = required_str(args, "query")?;
        let hits = self.store.search(query).map_err(store_error)?;
        if hits.is_empty() {
            return Ok(text_result(format!(
                "No markdown documents matched \"{query}\""
            )));
        }
        let mut text = format!("Found {} matching documents:\n\n", hits.len());
        for hit in hits {
            text.push_str(&format!("## {}\n", hit.file_name));
            if let Some(categories) = &hit.meta.categories {
                text.push_str(&format!("Categories: {}\n", categories.join(", ")));
            }
            if let Some(tags) = &hit.meta.tags {
                text.push_str(&format!("Tags: {}\n", tags.join(", ")));
            }
            text.push_str(&hit.matches.join("\n"));
            text.push_str("\n\n");
        }
        Ok(text_result(text))
    }

    fn update_metadata(&self, args: &Value) -> Result<Value, RpcError> {
        let file_name = uri_arg(args)?;
        let meta = self
            .store
            .update_meta(
                &file_name,
                string_list(args, "categories"),
                string_list(args, "tags"),
            )
            .map_err(store_error)?;
        Ok(text_result(format!(
            "Updated metadata for {file_name}: {}",
            compact(&meta)
        )))
    }

    fn list_versions(&self, args: &Value) -> Result<Value, RpcError> {
        let file_name = uri_arg(args)?;
        let versions = self.store.versions(&file_name).map_err(store_error)?;
        if versions.is_empty() {
            return Ok(text_result(format!(
                "Document {file_name} has no saved versions"
            )));
        }
        let mut text = format!("Versions of {file_name}, newest first:\n\n");
        for version in versions {
            text.push_str(&format!("- {version}\n"));
        }
        Ok(text_result(text))
    }

    fn export_markdown(&self, args: &Value) -> Result<Value, RpcError> {
        let file_name = uri_arg(args)?;
        let format = required_str(args, "format")?;
        let (content, _) = self.store.read(&file_name).map_err(store_error)?;
        match format {
            "html" => Ok(text_result(markdown_to_html(&content))),
            // Binary formats would need external converters; report instead
            // of failing the whole call.
            "pdf" | "docx" => Ok(text_result(format!(
                "Export to {format} is not available in this build"
            ))),
            other => Err(RpcError::invalid_params()
                .with_message(&format!("unsupported export format: {other}"))),
        }
    }

    fn list_resources(&self) -> Result<Value, RpcError> {
        let entries = self.store.list().map_err(store_error)?;
        let resources: Vec<Value> = entries
            .iter()
            .map(|entry| {
                json!({
                    "uri": format!("{URI_SCHEME}{}", entry.file_name),
                    "name": entry.file_name,
                    "mimeType": "text/markdown",
                    "description": format!("markdown document created {}", entry.meta.created_at),
                    "size": entry.size,
                })
            })
            .collect();
        Ok(json!({"resources": resources}))
    }

    fn read_resource(&self, params: &Value) -> Result<Value, RpcError> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params().with_message("missing resource uri"))?;
        let file_name = file_name_from_uri(uri).map_err(store_error)?;
        let (content, _) = self.store.read(&file_name).map_err(store_error)?;
        Ok(json!({
            "contents": [{
                "uri": uri,
                "mimeType": "text/markdown",
                "text": content,
            }]
        }))
    }

    fn get_prompt(&self, params: &Value) -> Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params().with_message("missing prompt name"))?;
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        match name {
            "markdown-template" => {
                let kind = arguments
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("note");
                let topic = arguments
                    .get("topic")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let template = template_for(kind, topic);
                Ok(prompt_result(format!(
                    "This is a {kind} markdown template on \"{topic}\". \
                     Fill it in following this structure:\n\n{template}"
                )))
            }
            "markdown-summary" => {
                let content = arguments
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                Ok(prompt_result(format!(
                    "Write a concise summary of the following markdown content:\n\n{content}"
                )))
            }
            other => Err(RpcError::method_not_found()
                .with_message(&format!("unknown prompt: {other}"))),
        }
    }
}

fn template_for(kind: &str, topic: &str) -> String {
    let heading = |fallback: &str| {
        if topic.is_empty() {
            fallback.to_string()
        } else {
            topic.to_string()
        }
    };
    match kind {
        "article" => format!(
            "# {}\n\n## Abstract\n\nBriefly describe the article\n\n## Body\n\n## Conclusion\n\n",
            heading("Article title")
        ),
        "note" => format!(
            "# {}\n\n- Point 1\n- Point 2\n\n## Details\n\n",
            heading("Note title")
        ),
        "todo" => format!(
            "# {}\n\n## Today\n\n- [ ] Task 1\n- [ ] Task 2\n\n## Later\n\n",
            heading("To-do list")
        ),
        "meeting-notes" => format!(
            "# {} - {}\n\n## Attendees\n\n- Person 1\n- Person 2\n\n## Discussion\n\n### Topic 1\n\n### Topic 2\n\n## Action items\n\n",
            heading("Meeting notes"),
            Utc::now().format("%Y-%m-%d")
        ),
        _ => format!("# {}\n\nStart writing...\n", heading("Document title")),
    }
}

fn tool_table() -> Vec<Value> {
    let uri_property = json!({
        "type": "string",
        "description": "Document URI (markdown://filename.md)"
    });
    vec![
        json!({
            "name": "create_markdown",
            "description": "Create and save a new markdown document",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "title": {"type": "string", "description": "Document title"},
                    "content": {"type": "string", "description": "Markdown content"},
                    "categories": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Document categories"
                    },
                    "tags": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Document tags"
                    }
                },
                "required": ["title", "content"]
            }
        }),
        json!({
            "name": "edit_markdown",
            "description": "Replace the content of an existing markdown document",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "uri": uri_property.clone(),
                    "content": {"type": "string", "description": "New markdown content"}
                },
                "required": ["uri", "content"]
            }
        }),
        json!({
            "name": "delete_markdown",
            "description": "Delete a markdown document",
            "inputSchema": {
                "type": "object",
                "properties": {"uri": uri_property.clone()},
                "required": ["uri"]
            }
        }),
        json!({
            "name": "search_markdown",
            "description": "Search markdown documents by content",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search keywords"}
                },
                "required": ["query"]
            }
        }),
        json!({
            "name": "convert_to_html",
            "description": "Convert markdown text to HTML",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "markdown": {"type": "string", "description": "Markdown content"}
                },
                "required": ["markdown"]
            }
        }),
        json!({
            "name": "update_metadata",
            "description": "Update a document's categories and tags",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "uri": uri_property.clone(),
                    "categories": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Document categories"
                    },
                    "tags": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Document tags"
                    }
                },
                "required": ["uri"]
            }
        }),
        json!({
            "name": "list_versions",
            "description": "List the saved versions of a document",
            "inputSchema": {
                "type": "object",
                "properties": {"uri": uri_property.clone()},
                "required": ["uri"]
            }
        }),
        json!({
            "name": "export_markdown",
            "description": "Export a markdown document to another format",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "uri": uri_property.clone(),
                    "format": {
                        "type": "string",
                        "enum": ["pdf", "html", "docx"],
                        "description": "Export format"
                    }
                },
                "required": ["uri", "format"]
            }
        }),
    ]
}

fn prompt_table() -> Vec<Value> {
    vec![
        json!({
            "name": "markdown-template",
            "description": "Generate a standard markdown template",
            "arguments": [
                {
                    "name": "type",
                    "description": "Template type (article, note, todo, meeting-notes)",
                    "required": true
                },
                {
                    "name": "topic",
                    "description": "Document topic",
                    "required": false
                }
            ]
        }),
        json!({
            "name": "markdown-summary",
            "description": "Generate a summary for markdown content",
            "arguments": [
                {
                    "name": "content",
                    "description": "Markdown content",
                    "required": true
                }
            ]
        }),
    ]
}

fn convert_to_html(args: &Value) -> Result<Value, RpcError> {
    let markdown = required_str(args, "markdown")?;
    Ok(text_result(markdown_to_html(markdown)))
}

fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new(markdown);
    let mut output = String::new();
    html::push_html(&mut output, parser);
    output
}

fn uri_arg(args: &Value) -> Result<String, RpcError> {
    let uri = required_str(args, "uri")?;
    file_name_from_uri(uri).map_err(store_error)
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, RpcError> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| RpcError::invalid_params().with_message(&format!("missing argument: {key}")))
}

fn string_list(args: &Value, key: &str) -> Option<Vec<String>> {
    args.get(key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(|item| item.to_string())
            .collect()
    })
}

fn text_result(text: String) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

fn prompt_result(text: String) -> Value {
    json!({
        "messages": [{
            "role": "user",
            "content": {"type": "text", "text": text}
        }]
    })
}

fn compact(meta: &impl serde::Serialize) -> String {
    serde_json::to_string(meta).unwrap_or_default()
}

fn store_error(err: StoreError) -> RpcError {
    match err {
        StoreError::InvalidParams(message) | StoreError::NotFound(message) => {
            RpcError::invalid_params().with_message(&message)
        }
        StoreError::Io(message) => RpcError::internal_error().with_message(&message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn handler() -> (tempfile::TempDir, MarkdownHandler) {
        let dir = tempdir().unwrap();
        let store = MarkdownStore::open(dir.path()).unwrap();
        (dir, MarkdownHandler::new(store))
    }

    fn request(id: i64, method: &str, params: Value) -> String {
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
    }

    fn call(handler: &MarkdownHandler, id: i64, method: &str, params: Value) -> Value {
        handler.handle_line(&request(id, method, params)).unwrap()
    }

    fn result_text(response: &Value) -> &str {
        response["result"]["content"][0]["text"].as_str().unwrap()
    }

    #[test]
    fn initialize_reports_all_capabilities() {
        let (_dir, handler) = handler();
        let response = call(
            &handler,
            1,
            "initialize",
            json!({"protocolVersion": "2025-06-18", "capabilities": {}}),
        );
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], "2025-06-18");
        assert_eq!(response["result"]["serverInfo"]["name"], "sparkmd-server");
        let capabilities = &response["result"]["capabilities"];
        assert!(capabilities.get("tools").is_some());
        assert!(capabilities.get("resources").is_some());
        assert!(capabilities.get("prompts").is_some());
    }

    #[test]
    fn notifications_get_no_response() {
        let (_dir, handler) = handler();
        let line = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
        assert!(handler.handle_line(&line).is_none());
        assert!(handler.handle_line("not json at all").is_none());
    }

    #[test]
    fn tools_list_names_the_full_surface() {
        let (_dir, handler) = handler();
        let response = call(&handler, 2, "tools/list", json!({}));
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 8);
        let names: Vec<&str> = tools
            .iter()
            .map(|tool| tool["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"create_markdown"));
        assert!(names.contains(&"export_markdown"));
        assert!(tools[0]["inputSchema"]["required"].is_array());
    }

    #[test]
    fn create_then_read_round_trips_through_rpc() {
        let (_dir, handler) = handler();
        let response = call(
            &handler,
            3,
            "tools/call",
            json!({
                "name": "create_markdown",
                "arguments": {"title": "Weekly Report", "content": "# Report\n", "tags": ["work"]}
            }),
        );
        let text = result_text(&response);
        assert!(text.contains("weekly-report-"));

        let listing = call(&handler, 4, "resources/list", json!({}));
        let resources = listing["result"]["resources"].as_array().unwrap();
        assert_eq!(resources.len(), 1);
        let uri = resources[0]["uri"].as_str().unwrap().to_string();
        assert!(uri.starts_with("markdown://weekly-report-"));

        let read = call(&handler, 5, "resources/read", json!({"uri": uri}));
        assert_eq!(read["result"]["contents"][0]["text"], "# Report\n");
    }

    #[test]
    fn missing_arguments_are_invalid_params() {
        let (_dir, handler) = handler();
        let response = call(
            &handler,
            6,
            "tools/call",
            json!({"name": "create_markdown", "arguments": {"title": "no content"}}),
        );
        assert_eq!(response["error"]["code"], -32602);
        assert!(response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("content"));
    }

    #[test]
    fn unknown_method_and_tool_are_rejected() {
        let (_dir, handler) = handler();
        let response = call(&handler, 7, "documents/burn", json!({}));
        assert_eq!(response["error"]["code"], -32601);

        let response = call(
            &handler,
            8,
            "tools/call",
            json!({"name": "burn_markdown", "arguments": {}}),
        );
        assert_eq!(response["error"]["code"], -32601);
    }

    #[test]
    fn convert_to_html_renders_markdown() {
        let (_dir, handler) = handler();
        let response = call(
            &handler,
            9,
            "tools/call",
            json!({"name": "convert_to_html", "arguments": {"markdown": "# Title"}}),
        );
        assert!(result_text(&response).contains("<h1>Title</h1>"));
    }

    #[test]
    fn search_reports_matches_and_misses() {
        let (_dir, handler) = handler();
        call(
            &handler,
            10,
            "tools/call",
            json!({
                "name": "create_markdown",
                "arguments": {"title": "minutes", "content": "Review the budget today\n"}
            }),
        );
        let hit = call(
            &handler,
            11,
            "tools/call",
            json!({"name": "search_markdown", "arguments": {"query": "REVIEW, the budget"}}),
        );
        assert!(result_text(&hit).contains("Found 1 matching documents"));
        assert!(result_text(&hit).contains("> Review the budget today"));

        let miss = call(
            &handler,
            12,
            "tools/call",
            json!({"name": "search_markdown", "arguments": {"query": "nothing here"}}),
        );
        assert!(result_text(&miss).contains("No markdown documents matched"));
    }

    #[test]
    fn prompts_are_listed_and_rendered() {
        let (_dir, handler) = handler();
        let listing = call(&handler, 13, "prompts/list", json!({}));
        let prompts = listing["result"]["prompts"].as_array().unwrap();
        assert_eq!(prompts.len(), 2);

        let rendered = call(
            &handler,
            14,
            "prompts/get",
            json!({"name": "markdown-template", "arguments": {"type": "todo", "topic": "Release"}}),
        );
        let text = rendered["result"]["messages"][0]["content"]["text"]
            .as_str()
            .unwrap();
        assert!(text.contains("# Release"));
        assert!(text.contains("- [ ] Task 1"));

        let unknown = call(&handler, 15, "prompts/get", json!({"name": "nope"}));
        assert_eq!(unknown["error"]["code"], -32601);
    }

    #[test]
    fn export_html_works_and_binary_formats_are_stubbed() {
        let (_dir, handler) = handler();
        call(
            &handler,
            16,
            "tools/call",
            json!({
                "name": "create_markdown",
                "arguments": {"title": "exportable", "content": "# Heading\n"}
            }),
        );
        let listing = call(&handler, 17, "resources/list", json!({}));
        let uri = listing["result"]["resources"][0]["uri"]
            .as_str()
            .unwrap()
            .to_string();

        let html = call(
            &handler,
            18,
            "tools/call",
            json!({"name": "export_markdown", "arguments": {"uri": uri.clone(), "format": "html"}}),
        );
        assert!(result_text(&html).contains("<h1>Heading</h1>"));

        let pdf = call(
            &handler,
            19,
            "tools/call",
            json!({"name": "export_markdown", "arguments": {"uri": uri, "format": "pdf"}}),
        );
        assert!(result_text(&pdf).contains("not available"));
    }

    #[test]
    fn edit_and_versions_flow_through_rpc() {
        let (_dir, handler) = handler();
        call(
            &handler,
            20,
            "tools/call",
            json!({
                "name": "create_markdown",
                "arguments": {"title": "draft", "content": "first"}
            }),
        );
        let listing = call(&handler, 21, "resources/list", json!({}));
        let uri = listing["result"]["resources"][0]["uri"]
            .as_str()
            .unwrap()
            .to_string();

        let edited = call(
            &handler,
            22,
            "tools/call",
            json!({"name": "edit_markdown", "arguments": {"uri": uri.clone(), "content": "second"}}),
        );
        assert!(result_text(&edited).contains("Updated document"));

        let versions = call(
            &handler,
            23,
            "tools/call",
            json!({"name": "list_versions", "arguments": {"uri": uri}}),
        );
        assert!(result_text(&versions).contains("newest first"));
    }
}
