//! Failure taxonomy for a generation run

use super::action::ActionError;

/// Why a run ended without a final answer.
///
/// `Cancelled` is a clean stop requested by the user; every other variant is
/// reported as an async error.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation was cancelled")]
    Cancelled,

    #[error("conversation {0} is already generating")]
    AlreadyGenerating(i64),

    #[error("completion stream failed: {0:#}")]
    Transport(anyhow::Error),

    #[error("couldn't decode action: {0}")]
    ActionDecode(#[from] ActionError),

    #[error("tool `{0}` not found")]
    UnresolvedTool(String),

    #[error("couldn't instantiate tool `{tool}`: {error:#}")]
    ToolInstantiation { tool: String, error: anyhow::Error },

    #[error("couldn't run tool `{tool}`: {error:#}")]
    ToolExecution { tool: String, error: anyhow::Error },

    #[error("couldn't generate a response after {attempts} attempts")]
    EmptyCompletionExhausted { attempts: usize },

    #[error("couldn't render system prompt: {0}")]
    Prompt(String),

    #[error("{0:#}")]
    Persistence(anyhow::Error),
}

impl GenerationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Map a storage failure into the run taxonomy with context
pub(crate) fn persistence(context: &'static str) -> impl FnOnce(anyhow::Error) -> GenerationError {
    move |e| GenerationError::Persistence(e.context(context))
}
