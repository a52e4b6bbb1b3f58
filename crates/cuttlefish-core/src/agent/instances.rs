//! Lazily instantiated tools, scoped to one run

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::approval::ApprovalHandle;
use super::error::GenerationError;
use crate::settings::AppSettings;
use crate::storage::ConversationSettings;
use crate::tools::{ToolInstance, ToolRegistry};

struct CachedInstance {
    name: String,
    instance: Box<dyn ToolInstance>,
}

/// Tool instances created on first use and shut down together at run end
pub struct ToolInstanceCache {
    registry: Arc<ToolRegistry>,
    settings: AppSettings,
    enabled: Vec<String>,
    approval: ApprovalHandle,
    instances: HashMap<String, CachedInstance>,
}

impl ToolInstanceCache {
    pub fn new(
        registry: Arc<ToolRegistry>,
        settings: AppSettings,
        conversation_settings: &ConversationSettings,
        approval: ApprovalHandle,
    ) -> Self {
        Self {
            registry,
            settings,
            enabled: conversation_settings.tools_enabled.clone(),
            approval,
            instances: HashMap::new(),
        }
    }

    /// The instance for `tool_id` and the tool's display name.
    ///
    /// Unknown or disabled tools are unresolved.
    pub async fn get_or_instantiate(
        &mut self,
        tool_id: &str,
    ) -> Result<(String, &mut dyn ToolInstance), GenerationError> {
        if !self.instances.contains_key(tool_id) {
            if !self.enabled.iter().any(|id| id == tool_id) {
                return Err(GenerationError::UnresolvedTool(tool_id.to_string()));
            }
            let tool = self
                .registry
                .get(tool_id)
                .ok_or_else(|| GenerationError::UnresolvedTool(tool_id.to_string()))?;

            debug!(tool = tool_id, "Instantiating tool");
            let instance = tool
                .instantiate(&self.settings, self.approval.clone())
                .await
                .map_err(|error| GenerationError::ToolInstantiation {
                    tool: tool_id.to_string(),
                    error,
                })?;
            self.instances.insert(
                tool_id.to_string(),
                CachedInstance {
                    name: tool.name().to_string(),
                    instance,
                },
            );
        }

        let cached = self
            .instances
            .get_mut(tool_id)
            .ok_or_else(|| GenerationError::UnresolvedTool(tool_id.to_string()))?;
        Ok((cached.name.clone(), cached.instance.as_mut()))
    }

    /// Shut down and drop every instance, collecting failures per tool id
    pub async fn shutdown_all(&mut self) -> Vec<(String, anyhow::Error)> {
        let mut failures = Vec::new();
        for (tool_id, mut cached) in self.instances.drain() {
            if let Err(e) = cached.instance.shutdown().await {
                warn!(tool = %tool_id, "Tool shutdown failed: {:#}", e);
                failures.push((tool_id, e));
            }
        }
        failures
    }
}
