//! Python tool - run snippets with the configured interpreter

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::process::Command;

use super::process::{resolve_program, run_captured};
use crate::agent::approval::ApprovalHandle;
use crate::settings::AppSettings;
use crate::tools::registry::{parse_args, RunResult, Tool, ToolInstance};

pub struct PythonTool;

#[derive(Deserialize)]
struct Params {
    code: String,
}

struct PythonInstance {
    interpreter: PathBuf,
}

#[async_trait]
impl Tool for PythonTool {
    fn id(&self) -> &str {
        "python"
    }

    fn name(&self) -> &str {
        "Python"
    }

    fn description(&self) -> &str {
        "run python3 scripts"
    }

    fn argument_descriptions(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            "code".to_string(),
            "python code to run; keep in mind that this is a json string, so you'll need to escape newlines and relevant special characters".to_string(),
        )])
    }

    async fn instantiate(
        &self,
        settings: &AppSettings,
        _approval: ApprovalHandle,
    ) -> Result<Box<dyn ToolInstance>> {
        Ok(Box::new(PythonInstance {
            interpreter: resolve_program(&settings.python.interpreter_path)?,
        }))
    }
}

#[async_trait]
impl ToolInstance for PythonInstance {
    async fn run(&mut self, args: &Map<String, Value>) -> Result<RunResult> {
        let params: Params = parse_args(args)?;

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-c").arg(&params.code);
        let output = run_captured(cmd).await?;

        Ok(RunResult::new(output.summary(&params.code), output.output))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::agent::approval::ApprovalGate;

    fn handle() -> ApprovalHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        ApprovalHandle::new(Arc::new(ApprovalGate::new(tx)), 1, CancellationToken::new())
    }

    fn args(code: &str) -> Map<String, Value> {
        json!({ "code": code }).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_runs_snippet() {
        if which::which("python3").is_err() {
            return;
        }
        let mut instance = PythonTool
            .instantiate(&AppSettings::default(), handle())
            .await
            .unwrap();

        let result = instance.run(&args("print(6 * 7)")).await.unwrap();
        assert_eq!(result.result, "successfully executed `print(6 * 7)`");
        assert_eq!(result.output, "42\n");

        let result = instance
            .run(&args("import sys; sys.exit(3)"))
            .await
            .unwrap();
        assert_eq!(result.result, "exit status 3");
    }

    #[tokio::test]
    async fn test_missing_interpreter_fails_instantiation() {
        let mut settings = AppSettings::default();
        settings.python.interpreter_path = "/nonexistent/python-cuttlefish".to_string();
        assert!(PythonTool.instantiate(&settings, handle()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_code_is_an_error() {
        if which::which("python3").is_err() {
            return;
        }
        let mut instance = PythonTool
            .instantiate(&AppSettings::default(), handle())
            .await
            .unwrap();
        assert!(instance.run(&Map::new()).await.is_err());
    }
}
