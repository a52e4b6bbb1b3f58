//! Prompt assembly: system turn, history, and observation messages

use tera::{Context, Tera};

use super::error::GenerationError;
use crate::ai::types::{ChatMessage, ChatRole};
use crate::storage::{ConversationSettings, Message, AUTHOR_ASSISTANT, AUTHOR_USER};
use crate::tools::{RunResult, ToolRegistry};

pub const DEFAULT_SYSTEM_PROMPT_TEMPLATE: &str = include_str!("default_system_prompt.tera");

/// Render the conversation's system prompt template.
///
/// The template sees `tools_description`, a pretty JSON array of the enabled
/// tools, and `any_tools_enabled`.
pub fn render_system_prompt(
    settings: &ConversationSettings,
    registry: &ToolRegistry,
) -> Result<String, GenerationError> {
    let tools = registry.describe(&settings.tools_enabled);
    let tools_description = serde_json::to_string_pretty(&tools)
        .map_err(|e| GenerationError::Prompt(format!("couldn't encode tools description: {e}")))?;

    let mut context = Context::new();
    context.insert("tools_description", &tools_description);
    context.insert("any_tools_enabled", &!tools.is_empty());

    Tera::one_off(&settings.system_prompt_template, &context, false)
        .map_err(|e| GenerationError::Prompt(format!("{e:?}")))
}

/// System turn followed by the non-empty history.
///
/// Tool observations go back as user turns tagged with the tool's name.
pub fn build_prompt(system_prompt: String, history: &[Message]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::new(ChatRole::System, system_prompt));

    for message in history {
        if message.content.trim().is_empty() {
            continue;
        }
        let chat = match message.author.as_str() {
            AUTHOR_ASSISTANT => ChatMessage::new(ChatRole::Assistant, message.content.clone()),
            AUTHOR_USER => ChatMessage::new(ChatRole::User, message.content.clone()),
            tool => ChatMessage::new(
                ChatRole::User,
                format!("`{}` response:{}", tool, message.content),
            ),
        };
        messages.push(chat);
    }
    messages
}

/// Message content recording a tool invocation's outcome
pub fn format_observation(result: &RunResult) -> String {
    format!(
        "Observation: {}\n```{}\n{}\n```",
        result.result,
        result.custom_result_tag.as_deref().unwrap_or(""),
        result.output
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: i64, author: &str, content: &str) -> Message {
        Message {
            id,
            conversation_id: 1,
            content: content.to_string(),
            author: author.to_string(),
        }
    }

    #[test]
    fn test_history_roles_and_skips() {
        let history = vec![
            message(1, "user", "list files"),
            message(2, "assistant", "```action\n{}\n```"),
            message(3, "Terminal", "Observation: ok"),
            message(4, "assistant", "   \n"),
        ];
        let prompt = build_prompt("sys".to_string(), &history);

        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[0].role, ChatRole::System);
        assert_eq!(prompt[1].role, ChatRole::User);
        assert_eq!(prompt[2].role, ChatRole::Assistant);
        assert_eq!(prompt[3].role, ChatRole::User);
        assert_eq!(prompt[3].content, "`Terminal` response:Observation: ok");
    }

    #[test]
    fn test_observation_format() {
        let plain = RunResult::new("exit code 0", "hello");
        assert_eq!(
            format_observation(&plain),
            "Observation: exit code 0\n```\nhello\n```"
        );

        let chart = RunResult::new("Chart rendered", "{}").with_tag("chart");
        assert_eq!(
            format_observation(&chart),
            "Observation: Chart rendered\n```chart\n{}\n```"
        );
    }

    #[test]
    fn test_render_without_tools() {
        let settings = ConversationSettings {
            id: None,
            system_prompt_template: "{% if any_tools_enabled %}tools{% else %}none{% endif %}"
                .to_string(),
            tools_enabled: vec![],
        };
        let rendered = render_system_prompt(&settings, &ToolRegistry::default()).unwrap();
        assert_eq!(rendered, "none");
    }

    #[test]
    fn test_render_lists_enabled_tools() {
        let settings = ConversationSettings {
            id: None,
            system_prompt_template: DEFAULT_SYSTEM_PROMPT_TEMPLATE.to_string(),
            tools_enabled: vec!["terminal".to_string(), "chart".to_string()],
        };
        let rendered =
            render_system_prompt(&settings, &ToolRegistry::with_builtin_tools()).unwrap();
        assert!(rendered.contains("\"tool\": \"chart\""));
        assert!(rendered.contains("\"tool\": \"terminal\""));
        assert!(!rendered.contains("\"tool\": \"python\""));
        assert!(rendered.find("\"chart\"") < rendered.find("\"terminal\""));
    }

    #[test]
    fn test_invalid_template_is_prompt_error() {
        let settings = ConversationSettings {
            id: None,
            system_prompt_template: "{% if %}".to_string(),
            tools_enabled: vec![],
        };
        let err = render_system_prompt(&settings, &ToolRegistry::default()).unwrap_err();
        assert!(matches!(err, GenerationError::Prompt(_)));
    }
}
