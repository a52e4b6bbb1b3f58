//! Terminal tool - run commands in a bash shell

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::process::Command;

use super::process::{resolve_program, run_captured};
use crate::agent::approval::ApprovalHandle;
use crate::settings::AppSettings;
use crate::tools::registry::{parse_args, RunResult, Tool, ToolInstance};

pub struct TerminalTool;

#[derive(Deserialize)]
struct Params {
    command: String,
}

struct TerminalInstance {
    bash: PathBuf,
    require_approval: bool,
    approval: ApprovalHandle,
}

#[async_trait]
impl Tool for TerminalTool {
    fn id(&self) -> &str {
        "terminal"
    }

    fn name(&self) -> &str {
        "Terminal"
    }

    fn description(&self) -> &str {
        "run commands in a bash shell"
    }

    fn argument_descriptions(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("command".to_string(), "bash command to run".to_string())])
    }

    async fn instantiate(
        &self,
        settings: &AppSettings,
        approval: ApprovalHandle,
    ) -> Result<Box<dyn ToolInstance>> {
        Ok(Box::new(TerminalInstance {
            bash: resolve_program("bash")?,
            require_approval: settings.terminal.require_approval,
            approval,
        }))
    }
}

#[async_trait]
impl ToolInstance for TerminalInstance {
    async fn run(&mut self, args: &Map<String, Value>) -> Result<RunResult> {
        let params: Params = parse_args(args)?;

        if self.require_approval {
            self.approval
                .wait_for_approval(&format!("run terminal command `{}`", params.command))
                .await
                .context("user did not approve")?;
        }

        let mut cmd = Command::new(&self.bash);
        cmd.arg("-c").arg(&params.command).env("NO_COLOR", "1");
        let output = run_captured(cmd).await?;

        Ok(RunResult::new(
            output.summary(&params.command),
            format!("{}\n", output.output),
        ))
    }
}
