//! Client tools the remote agent can invoke by name.
//!
//! Tools follow a simple contract: a name, a description, a JSON schema for
//! the parameters, and an async `execute` that returns text for the agent.

mod file;
mod image;
mod web;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::Config;
use crate::images::OpenAiImageClient;

pub use file::SaveToTxt;
pub use image::GenerateImages;
pub use web::WebSearch;

/// A tool callable by the agent.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    /// Run the tool. Relative paths in `args` resolve against `workspace`.
    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<String>;
}

/// Name and description of a registered tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Tools indexed by the names the agent uses to call them.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Registration order of primary names, aliases excluded.
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the web search, file append and image tools, plus the
    /// snake_case aliases `save_to_txt` and `generate_images`.
    pub fn with_defaults(config: &Config) -> anyhow::Result<Self> {
        let mut registry = Self::new();

        registry.register(Arc::new(WebSearch::new(config.search_endpoint.clone())?));
        registry.register(Arc::new(SaveToTxt));

        let images = OpenAiImageClient::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
        );
        registry.register(Arc::new(GenerateImages::new(
            Arc::new(images),
            config.image_model.clone(),
        )));

        registry.register_alias("save_to_txt", "saveToTxt");
        registry.register_alias("generate_images", "generateImages");

        Ok(registry)
    }

    /// Register a tool under its own name, replacing any previous entry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        } else {
            tracing::warn!("Tool '{}' registered twice, keeping the latest", name);
        }
    }

    /// Make `alias` resolve to the tool registered as `target`.
    ///
    /// Returns false when `target` is unknown.
    pub fn register_alias(&mut self, alias: &str, target: &str) -> bool {
        match self.tools.get(target).cloned() {
            Some(tool) => {
                self.tools.insert(alias.to_string(), tool);
                true
            }
            None => {
                tracing::warn!("Cannot alias '{}': tool '{}' is not registered", alias, target);
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tools in registration order (aliases not repeated).
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolInfo {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
            })
            .collect()
    }

    /// Function-style schemas for every registered tool.
    pub fn get_tool_schemas(&self) -> Vec<Value> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "parameters": tool.parameters_schema(),
                })
            })
            .collect()
    }

    /// Execute a tool by name (primary name or alias).
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        workspace: &Path,
    ) -> anyhow::Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Tool '{}' is not registered", name))?;

        tool.execute(args, workspace).await
    }
}

/// Read a string argument, treating missing, null and empty values as absent.
pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
