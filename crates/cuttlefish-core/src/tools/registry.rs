//! Tool registry for managing available tools
//!
//! A `Tool` is a stateless factory registered once at startup. Each run
//! instantiates the tools it actually uses; the `ToolInstance` lives until the
//! run ends and is shut down exactly once.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::agent::approval::ApprovalHandle;
use crate::settings::AppSettings;

/// Outcome of one tool invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Short summary placed after `Observation:`
    pub result: String,
    /// Language tag for the output fence, e.g. `chart`
    pub custom_result_tag: Option<String>,
    pub output: String,
}

impl RunResult {
    pub fn new(result: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            custom_result_tag: None,
            output: output.into(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.custom_result_tag = Some(tag.into());
        self
    }
}

/// Tool factory
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry id used in action directives and enabled-tool lists
    fn id(&self) -> &str;

    /// Human readable name; authors the observation message
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Argument name to documentation
    fn argument_descriptions(&self) -> BTreeMap<String, String>;

    async fn instantiate(
        &self,
        settings: &AppSettings,
        approval: ApprovalHandle,
    ) -> Result<Box<dyn ToolInstance>>;
}

/// Per-run tool state
#[async_trait]
pub trait ToolInstance: Send {
    async fn run(&mut self, args: &Map<String, Value>) -> Result<RunResult>;

    /// Release resources. Called once when the run ends.
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Deserialize action args into a tool's parameter struct
pub fn parse_args<T: serde::de::DeserializeOwned>(args: &Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(args.clone()))
        .map_err(|e| anyhow::anyhow!("Invalid arguments: {}", e))
}

/// Entry of the tools description rendered into the system prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDescription {
    pub tool: String,
    pub description: String,
    pub args: BTreeMap<String, String>,
}

/// Id and display name, for settings screens
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableTool {
    pub id: String,
    pub name: String,
}

/// Immutable id → tool map built at startup
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        let tools = tools
            .into_iter()
            .map(|tool| (tool.id().to_string(), tool))
            .collect();
        Self { tools }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptions of the enabled tools, sorted by id. Unknown ids are skipped.
    pub fn describe(&self, enabled: &[String]) -> Vec<ToolDescription> {
        let mut descriptions: Vec<ToolDescription> = self
            .tools
            .values()
            .filter(|tool| enabled.iter().any(|id| id == tool.id()))
            .map(|tool| ToolDescription {
                tool: tool.id().to_string(),
                description: tool.description().to_string(),
                args: tool.argument_descriptions(),
            })
            .collect();
        descriptions.sort_by(|a, b| a.tool.cmp(&b.tool));
        descriptions
    }

    /// Every registered tool, sorted by display name
    pub fn available_tools(&self) -> Vec<AvailableTool> {
        let mut tools: Vec<AvailableTool> = self
            .tools
            .values()
            .map(|tool| AvailableTool {
                id: tool.id().to_string(),
                name: tool.name().to_string(),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }
}
