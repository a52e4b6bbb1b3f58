//! One-shot commands: listings and settings

use anyhow::Result;
use clap::Subcommand;

use cuttlefish_core::App;

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Change one or more settings
    Set {
        #[arg(long)]
        api_key: Option<String>,

        #[arg(long)]
        model: Option<String>,

        /// Ask before every terminal command
        #[arg(long)]
        require_approval: Option<bool>,

        #[arg(long)]
        python: Option<String>,

        #[arg(long)]
        search_engine_id: Option<String>,

        #[arg(long)]
        google_api_key: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum DefaultsAction {
    /// Replace the default prompt template and/or enabled tools
    Set {
        /// Path to a prompt template file
        #[arg(long)]
        template: Option<std::path::PathBuf>,

        /// Comma separated tool ids
        #[arg(long, value_delimiter = ',')]
        tools: Option<Vec<String>>,
    },
}

pub fn list_conversations(app: &App) -> Result<()> {
    for conversation in app.conversations()? {
        println!(
            "{:>5}  {}  {}{}",
            conversation.id,
            conversation.last_message_time.format("%Y-%m-%d %H:%M"),
            conversation.title,
            if conversation.generating { "  (generating)" } else { "" }
        );
    }
    Ok(())
}

pub fn show_conversation(app: &App, conversation_id: i64) -> Result<()> {
    let conversation = app.conversation(conversation_id)?;
    println!("# {}\n", conversation.title);
    for message in app.messages(conversation_id)? {
        println!("── [{}] {} ──\n{}\n", message.id, message.author, message.content);
    }
    Ok(())
}

pub fn list_tools(app: &App) {
    for tool in app.available_tools() {
        println!("{:<16} {}", tool.id, tool.name);
    }
}

pub fn settings(app: &App, action: Option<SettingsAction>) -> Result<()> {
    if let Some(SettingsAction::Set {
        api_key,
        model,
        require_approval,
        python,
        search_engine_id,
        google_api_key,
    }) = action
    {
        let mut settings = app.settings()?;
        if let Some(key) = api_key {
            settings.openai_api_key = key;
        }
        if let Some(model) = model {
            settings.model = model;
        }
        if let Some(require) = require_approval {
            settings.terminal.require_approval = require;
        }
        if let Some(path) = python {
            settings.python.interpreter_path = path;
        }
        let google = &mut settings.search.google_custom_search;
        if let Some(id) = search_engine_id {
            google.custom_search_engine_id = id;
        }
        if let Some(key) = google_api_key {
            google.google_cloud_api_key = key;
        }
        app.save_settings(settings)?;
    }

    println!("{}", serde_json::to_string_pretty(&app.settings()?)?);
    Ok(())
}

pub fn defaults(app: &App, action: Option<DefaultsAction>) -> Result<()> {
    if let Some(DefaultsAction::Set { template, tools }) = action {
        let current = app.default_conversation_settings()?;
        let template = match template {
            Some(path) => std::fs::read_to_string(path)?,
            None => current.system_prompt_template,
        };
        let tools = tools.unwrap_or(current.tools_enabled);
        app.set_default_conversation_settings(&template, &tools)?;
    }

    let defaults = app.default_conversation_settings()?;
    println!("tools: {}", defaults.tools_enabled.join(", "));
    println!("template:\n{}", defaults.system_prompt_template);
    Ok(())
}
