//! Cuttlefish - chat with a model that can use tools on your computer
//!
//! A terminal client over `cuttlefish-core`:
//! - Streams answers as they are generated
//! - Asks before privileged tool actions when approval is enabled
//! - Ctrl-C cancels the current generation

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use cuttlefish_core::storage::Database;
use cuttlefish_core::{paths, App};

mod chat;
mod commands;

/// Cuttlefish - tool-using chat in the terminal
#[derive(Parser)]
#[command(name = "cuttlefish")]
#[command(about = "Chat with a language model that can run tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message and stream the reply
    ///
    /// Without --conversation a new conversation is started.
    Send {
        /// Conversation to continue
        #[arg(short, long)]
        conversation: Option<i64>,

        /// Message text
        message: String,
    },

    /// Regenerate a conversation from one of its messages
    ///
    /// The message is kept; everything after it is deleted.
    Rerun {
        #[arg(short, long)]
        conversation: i64,

        #[arg(short, long)]
        message: i64,
    },

    /// List conversations, most recent first
    List,

    /// Print a conversation's messages
    Show { conversation: i64 },

    /// Delete a conversation
    Delete { conversation: i64 },

    /// List available tools
    Tools,

    /// Show or change application settings
    Settings {
        #[command(subcommand)]
        action: Option<commands::SettingsAction>,
    },

    /// Show or change the settings new conversations start with
    Defaults {
        #[command(subcommand)]
        action: Option<commands::DefaultsAction>,
    },
}

/// Log to ~/.cuttlefish/logs so stdout stays free for the chat
fn init_logging() {
    let log_dir = paths::logs_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory: {}", e);
        return;
    }

    let log_file = match std::fs::File::create(log_dir.join("cuttlefish.log")) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to create log file: {}, logging disabled", e);
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    paths::ensure_config_dir()?;
    let db = Database::new(&paths::database_path())?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let app = App::new(db, events_tx)?;
    tracing::info!("Cuttlefish started");

    match cli.command {
        Commands::Send {
            conversation,
            message,
        } => {
            let sent = app.send_message(conversation, &message)?;
            chat::follow(&app, events_rx, sent.conversation_id, sent.id).await?;
        }
        Commands::Rerun {
            conversation,
            message,
        } => {
            app.rerun_from_message(conversation, message)?;
            chat::follow(&app, events_rx, conversation, message).await?;
        }
        Commands::List => commands::list_conversations(&app)?,
        Commands::Show { conversation } => commands::show_conversation(&app, conversation)?,
        Commands::Delete { conversation } => {
            app.delete_conversation(conversation)?;
            println!("Deleted conversation {}", conversation);
        }
        Commands::Tools => commands::list_tools(&app),
        Commands::Settings { action } => commands::settings(&app, action)?,
        Commands::Defaults { action } => commands::defaults(&app, action)?,
    }

    app.shutdown();
    Ok(())
}
