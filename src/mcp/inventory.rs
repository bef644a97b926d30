//! Snapshot of the capabilities a tool provider advertises.

use rust_mcp_schema::{Prompt, Resource, Tool};
use serde_json::{json, Value};

use crate::api::types::FunctionDefinition;
use crate::mcp::ToolProvider;

/// Tools, resources, and prompts fetched from the provider in one pass.
/// Refreshed wholesale after a mutating tool call; list failures leave the
/// previous snapshot in place at the call site.
#[derive(Debug, Clone, Default)]
pub struct CapabilityInventory {
    pub tools: Vec<Tool>,
    pub resources: Vec<Resource>,
    pub prompts: Vec<Prompt>,
}

impl CapabilityInventory {
    pub async fn fetch(provider: &dyn ToolProvider) -> Result<Self, String> {
        let tools = provider.list_tools().await?.tools;
        let resources = provider.list_resources().await?.resources;
        let prompts = provider.list_prompts().await?.prompts;
        Ok(CapabilityInventory {
            tools,
            resources,
            prompts,
        })
    }

    /// Converts the advertised tools into the function table offered to the
    /// model. Schemas pass through as opaque JSON.
    pub fn function_definitions(&self) -> Vec<FunctionDefinition> {
        self.tools
            .iter()
            .map(|tool| FunctionDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: serde_json::to_value(&tool.input_schema)
                    .unwrap_or_else(|_| json!({"type": "object"})),
            })
            .collect()
    }

    /// Renders the snapshot as the system message injected ahead of every
    /// request, so the model knows what it can reach for.
    pub fn render_system_message(&self) -> String {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description.clone().unwrap_or_default(),
                })
            })
            .collect();
        let resources: Vec<Value> = self
            .resources
            .iter()
            .map(|resource| json!({"uri": resource.uri}))
            .collect();
        let prompts: Vec<Value> = self
            .prompts
            .iter()
            .map(|prompt| json!({"name": prompt.name}))
            .collect();
        let rendered = serde_json::to_string_pretty(&json!({
            "tools": tools,
            "resources": resources,
            "prompts": prompts,
        }))
        .unwrap_or_default();
        format!(
            "You have access to a markdown document provider. \
             Call a tool by name when the user asks for a document operation. \
             Available capabilities:\n{rendered}"
        )
    }

    /// One-line summary for the connection banner.
    pub fn summary(&self) -> String {
        let names: Vec<&str> = self.tools.iter().map(|tool| tool.name.as_str()).collect();
        format!(
            "{} tools ({}), {} resources, {} prompts",
            self.tools.len(),
            names.join(", "),
            self.resources.len(),
            self.prompts.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_mcp_schema::ToolInputSchema;

    fn sample_tool(name: &str, description: Option<&str>) -> Tool {
        Tool {
            annotations: None,
            description: description.map(|text| text.to_string()),
            execution: None,
            icons: Vec::new(),
            input_schema: ToolInputSchema::new(Vec::new(), None, None),
            meta: None,
            name: name.to_string(),
            output_schema: None,
            title: None,
        }
    }

    #[test]
    fn function_definitions_mirror_tools() {
        let inventory = CapabilityInventory {
            tools: vec![
                sample_tool("create_markdown", Some("Create a markdown document")),
                sample_tool("search_markdown", None),
            ],
            ..Default::default()
        };
        let definitions = inventory.function_definitions();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].name, "create_markdown");
        assert_eq!(
            definitions[0].description.as_deref(),
            Some("Create a markdown document")
        );
        assert!(definitions[1].description.is_none());
        assert!(definitions[0].parameters.is_object());
    }

    #[test]
    fn system_message_lists_tool_names() {
        let inventory = CapabilityInventory {
            tools: vec![sample_tool("search_markdown", Some("Full-text search"))],
            ..Default::default()
        };
        let message = inventory.render_system_message();
        assert!(message.contains("search_markdown"));
        assert!(message.contains("Full-text search"));
    }

    #[test]
    fn summary_counts_capabilities() {
        let inventory = CapabilityInventory {
            tools: vec![sample_tool("search_markdown", None)],
            ..Default::default()
        };
        assert_eq!(
            inventory.summary(),
            "1 tools (search_markdown), 0 resources, 0 prompts"
        );
    }
}
