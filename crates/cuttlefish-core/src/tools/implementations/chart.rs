//! Chart tool - hand ECharts options to the UI

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::agent::approval::ApprovalHandle;
use crate::settings::AppSettings;
use crate::tools::registry::{RunResult, Tool, ToolInstance};

/// Result tag the UI renders as a chart
pub const CHART_RESULT_TAG: &str = "chart";

pub struct ChartTool;

struct ChartInstance;

#[async_trait]
impl Tool for ChartTool {
    fn id(&self) -> &str {
        "chart"
    }

    fn name(&self) -> &str {
        "Chart"
    }

    fn description(&self) -> &str {
        "plot data on charts using Apache ECharts"
    }

    fn argument_descriptions(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            "options".to_string(),
            "Options to pass to the Apache ECharts chart.".to_string(),
        )])
    }

    async fn instantiate(
        &self,
        _settings: &AppSettings,
        _approval: ApprovalHandle,
    ) -> Result<Box<dyn ToolInstance>> {
        Ok(Box::new(ChartInstance))
    }
}

#[async_trait]
impl ToolInstance for ChartInstance {
    async fn run(&mut self, args: &Map<String, Value>) -> Result<RunResult> {
        let options = args.get("options").unwrap_or(&Value::Null);
        let json = serde_json::to_string_pretty(options).context("could not encode options")?;
        Ok(RunResult::new(
            "here's the chart; this will already be visible to the user",
            format!("{}\n", json),
        )
        .with_tag(CHART_RESULT_TAG))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::agent::approval::ApprovalGate;

    #[tokio::test]
    async fn test_echoes_options_with_chart_tag() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let approval = ApprovalHandle::new(Arc::new(ApprovalGate::new(tx)), 1, CancellationToken::new());
        let mut instance = ChartTool
            .instantiate(&AppSettings::default(), approval)
            .await
            .unwrap();

        let args = json!({ "options": { "series": [1, 2] } });
        let result = instance.run(args.as_object().unwrap()).await.unwrap();
        assert_eq!(result.custom_result_tag.as_deref(), Some("chart"));
        let echoed: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(echoed, json!({ "series": [1, 2] }));
    }
}
