//! Action directives embedded in model output
//!
//! A completion asks for a tool by embedding a JSON object `{"tool", "args"}`
//! in one of two forms:
//!
//! ````text
//! ```action
//! {"tool": "terminal", "args": {"command": "ls"}}
//! ```
//! ````
//!
//! or an `Action:` marker followed by an ordinary fenced block, whose first
//! line (the language tag, if any) is skipped.

use serde::Deserialize;
use serde_json::{Map, Value};

const ACTION_FENCE: &str = "```action";
const ACTION_MARKER: &str = "Action:";
const FENCE: &str = "```";

/// A decoded tool request
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Action {
    pub tool: String,
    pub args: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("no action directive in message")]
    NoDirective,

    #[error("action block is not closed")]
    Unterminated,

    #[error("invalid action JSON: {0}")]
    InvalidJson(String),
}

/// Whether the content asks for a tool at all
pub fn contains_directive(content: &str) -> bool {
    content.contains(ACTION_FENCE) || content.contains(ACTION_MARKER)
}

/// Slice out the JSON body of the first directive.
///
/// The fenced form wins when both are present.
pub fn extract_directive(content: &str) -> Result<&str, ActionError> {
    if let Some(start) = content.find(ACTION_FENCE) {
        let body = &content[start + ACTION_FENCE.len()..];
        let end = body.find(FENCE).ok_or(ActionError::Unterminated)?;
        return Ok(&body[..end]);
    }

    let start = content.find(ACTION_MARKER).ok_or(ActionError::NoDirective)?;
    let after_marker = &content[start + ACTION_MARKER.len()..];
    let fence = after_marker.find(FENCE).ok_or(ActionError::Unterminated)?;
    let fenced = &after_marker[fence..];
    let newline = fenced.find('\n').ok_or(ActionError::Unterminated)?;
    let body = &fenced[newline..];
    let end = body.find(FENCE).ok_or(ActionError::Unterminated)?;
    Ok(&body[..end])
}

/// Decode the first directive in `content`
pub fn parse_action(content: &str) -> Result<Action, ActionError> {
    let json = extract_directive(content)?;
    serde_json::from_str(json).map_err(|e| ActionError::InvalidJson(e.to_string()))
}
