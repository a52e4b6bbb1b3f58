//! Application facade
//!
//! Everything a presentation layer needs: conversations, messages, settings,
//! and starting, cancelling and approving generation runs. Runs are spawned
//! on the current tokio runtime, so methods that start one must be called
//! from within it.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::events::emit;
use crate::agent::prompt::DEFAULT_SYSTEM_PROMPT_TEMPLATE;
use crate::agent::{
    AppEvent, ApprovalGate, ApprovalRequest, CancellationRegistry, EventSender, Orchestrator,
    OrchestratorServices,
};
use crate::ai::client::{ClientConfig, CompletionClient, OpenAiClient};
use crate::constants::conversation;
use crate::settings::AppSettings;
use crate::storage::{
    Conversation, ConversationSettings, ConversationStore, Database, Message, MessageStore,
    AUTHOR_USER,
};
use crate::tools::{AvailableTool, ToolRegistry};

pub struct App {
    db: Database,
    tools: Arc<ToolRegistry>,
    approvals: Arc<ApprovalGate>,
    cancellations: Arc<CancellationRegistry>,
    events: EventSender,
    /// Fixed client; `None` builds an OpenAI client from settings for each run
    client: Option<Arc<dyn CompletionClient>>,
    shutdown: CancellationToken,
}

impl App {
    /// Production app: built-in tools, OpenAI client from stored settings
    pub fn new(db: Database, events: EventSender) -> Result<Self> {
        Self::build(db, ToolRegistry::with_builtin_tools(), None, events)
    }

    /// App with a fixed completion client and tool set
    pub fn with_client(
        db: Database,
        tools: ToolRegistry,
        client: Arc<dyn CompletionClient>,
        events: EventSender,
    ) -> Result<Self> {
        Self::build(db, tools, Some(client), events)
    }

    fn build(
        db: Database,
        tools: ToolRegistry,
        client: Option<Arc<dyn CompletionClient>>,
        events: EventSender,
    ) -> Result<Self> {
        let cleared = ConversationStore::new(&db).clear_stale_generation()?;
        if cleared > 0 {
            info!(cleared, "Cleared stale generating flags");
        }

        Ok(Self {
            db,
            tools: Arc::new(tools),
            approvals: Arc::new(ApprovalGate::new(events.clone())),
            cancellations: Arc::new(CancellationRegistry::new()),
            events,
            client,
            shutdown: CancellationToken::new(),
        })
    }

    // ── Generation ─────────────────────────────────────────────────────

    /// Persist a user message and start a run.
    ///
    /// `None` starts a new conversation with a copy of the default settings.
    /// A conversation that is already generating is rejected before anything
    /// is written.
    pub fn send_message(&self, conversation_id: Option<i64>, content: &str) -> Result<Message> {
        let conversation_id = match conversation_id {
            Some(id) => id,
            None => self.create_conversation(content)?,
        };

        self.start_run(conversation_id, || {
            let message = MessageStore::new(&self.db)
                .create_message(conversation_id, AUTHOR_USER, content)
                .context("couldn't create message")?;
            emit(&self.events, AppEvent::ConversationUpdated { conversation_id });
            Ok(message)
        })
    }

    /// Drop everything after `message_id` and generate again from there
    pub fn rerun_from_message(&self, conversation_id: i64, message_id: i64) -> Result<()> {
        self.start_run(conversation_id, || {
            MessageStore::new(&self.db)
                .reset_conversation_from(conversation_id, message_id)
                .context("couldn't reset conversation")?;
            emit(&self.events, AppEvent::ConversationUpdated { conversation_id });
            Ok(())
        })
    }

    /// Returns false when the conversation has no active run
    pub fn cancel_generation(&self, conversation_id: i64) -> bool {
        self.cancellations.cancel(conversation_id)
    }

    pub fn is_generating(&self, conversation_id: i64) -> bool {
        self.cancellations.is_registered(conversation_id)
    }

    pub fn approve(&self, conversation_id: i64, approval_id: &str) -> bool {
        self.approvals.approve(conversation_id, approval_id)
    }

    pub fn list_approval_requests(&self, conversation_id: i64) -> Vec<ApprovalRequest> {
        self.approvals.pending(conversation_id)
    }

    /// Cancel every run
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Claim the conversation's slot, run `prepare`, then spawn the run.
    ///
    /// A busy conversation or unreadable settings fail before `prepare`
    /// writes anything. Any failure releases the slot again.
    fn start_run<T>(&self, conversation_id: i64, prepare: impl FnOnce() -> Result<T>) -> Result<T> {
        let registration = self
            .cancellations
            .try_register(conversation_id, &self.shutdown)?;

        let prepared = self
            .orchestrator(conversation_id)
            .and_then(|orchestrator| Ok((prepare()?, orchestrator)));
        match prepared {
            Ok((prepared, orchestrator)) => {
                orchestrator.spawn(registration);
                Ok(prepared)
            }
            Err(e) => {
                self.cancellations
                    .unregister(conversation_id, registration.run_id);
                Err(e)
            }
        }
    }

    fn orchestrator(&self, conversation_id: i64) -> Result<Orchestrator> {
        let settings = AppSettings::load(&self.db)?.with_env_overrides();
        let client: Arc<dyn CompletionClient> = match &self.client {
            Some(client) => client.clone(),
            None => Arc::new(OpenAiClient::new(ClientConfig::from_settings(&settings))),
        };
        let services = OrchestratorServices {
            db: self.db.clone(),
            client,
            tools: self.tools.clone(),
            approvals: self.approvals.clone(),
            cancellations: self.cancellations.clone(),
            events: self.events.clone(),
        };
        Ok(Orchestrator::new(services, conversation_id, settings))
    }

    fn create_conversation(&self, content: &str) -> Result<i64> {
        let defaults = self.default_conversation_settings()?;
        let store = ConversationStore::new(&self.db);
        let settings = store
            .create_conversation_settings(&defaults.system_prompt_template, &defaults.tools_enabled)
            .context("couldn't create conversation settings")?;
        let settings_id = settings
            .id
            .context("created conversation settings have no id")?;
        let conversation = store
            .create_conversation(settings_id, &conversation_title(content))
            .context("couldn't create conversation")?;
        emit(&self.events, AppEvent::ConversationsUpdated);
        Ok(conversation.id)
    }

    // ── Conversations ──────────────────────────────────────────────────

    pub fn conversations(&self) -> Result<Vec<Conversation>> {
        ConversationStore::new(&self.db).list_conversations()
    }

    pub fn conversation(&self, conversation_id: i64) -> Result<Conversation> {
        ConversationStore::new(&self.db).get_conversation(conversation_id)
    }

    pub fn messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        MessageStore::new(&self.db).list_messages(conversation_id)
    }

    /// Delete a conversation, cancelling its run first
    pub fn delete_conversation(&self, conversation_id: i64) -> Result<()> {
        self.cancellations.cancel(conversation_id);
        ConversationStore::new(&self.db)
            .delete_conversation(conversation_id)
            .context("couldn't delete conversation")?;
        emit(&self.events, AppEvent::ConversationsUpdated);
        Ok(())
    }

    // ── Settings ───────────────────────────────────────────────────────

    /// Settings with the API key masked
    pub fn settings(&self) -> Result<AppSettings> {
        Ok(AppSettings::load(&self.db)?.masked())
    }

    pub fn save_settings(&self, settings: AppSettings) -> Result<()> {
        settings.save(&self.db)?;
        Ok(())
    }

    pub fn conversation_settings(&self, settings_id: i64) -> Result<ConversationSettings> {
        ConversationStore::new(&self.db).get_conversation_settings(settings_id)
    }

    pub fn update_conversation_settings(
        &self,
        settings_id: i64,
        system_prompt_template: &str,
        tools_enabled: &[String],
    ) -> Result<ConversationSettings> {
        ConversationStore::new(&self.db).update_conversation_settings(
            settings_id,
            system_prompt_template,
            tools_enabled,
        )
    }

    /// The stored default, or the built-in one (with `id: None`)
    pub fn default_conversation_settings(&self) -> Result<ConversationSettings> {
        let stored = ConversationStore::new(&self.db)
            .get_default_conversation_settings()
            .context("couldn't get default conversation settings")?;
        Ok(stored.unwrap_or_else(|| ConversationSettings {
            id: None,
            system_prompt_template: DEFAULT_SYSTEM_PROMPT_TEMPLATE.to_string(),
            tools_enabled: conversation::DEFAULT_TOOLS_ENABLED
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }))
    }

    pub fn set_default_conversation_settings(
        &self,
        system_prompt_template: &str,
        tools_enabled: &[String],
    ) -> Result<ConversationSettings> {
        let store = ConversationStore::new(&self.db);
        match store.get_default_conversation_settings()? {
            Some(ConversationSettings { id: Some(id), .. }) => {
                store.update_conversation_settings(id, system_prompt_template, tools_enabled)
            }
            _ => store.create_default_conversation_settings(system_prompt_template, tools_enabled),
        }
    }

    /// Registered tools sorted by display name
    pub fn available_tools(&self) -> Vec<AvailableTool> {
        self.tools.available_tools()
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// First message as title, shortened when long
fn conversation_title(content: &str) -> String {
    if content.chars().count() > conversation::TITLE_MAX_CHARS {
        let head: String = content
            .chars()
            .take(conversation::TITLE_TRUNCATED_CHARS)
            .collect();
        format!("{}...", head)
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use super::*;
    use crate::agent::GenerationError;
    use crate::ai::client::CompletionStream;
    use crate::ai::types::{CompletionChunk, CompletionRequest, StreamPart};
    use crate::storage::KeyValueStore;

    /// Replies with canned text; `None` leaves the stream open
    struct CannedClient {
        replies: Mutex<VecDeque<Option<&'static str>>>,
        open: Mutex<Vec<mpsc::UnboundedSender<StreamPart>>>,
    }

    #[async_trait]
    impl CompletionClient for CannedClient {
        async fn create_stream(&self, _request: CompletionRequest) -> Result<CompletionStream> {
            let (tx, rx) = mpsc::unbounded_channel();
            match self.replies.lock().pop_front().flatten() {
                Some(text) => {
                    let _ = tx.send(StreamPart::Chunk(CompletionChunk::text(text)));
                }
                None => self.open.lock().push(tx),
            }
            Ok(rx)
        }
    }

    fn create_app(
        replies: Vec<Option<&'static str>>,
    ) -> (App, mpsc::UnboundedReceiver<AppEvent>, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Arc::new(CannedClient {
            replies: Mutex::new(replies.into()),
            open: Mutex::new(Vec::new()),
        });
        let app = App::with_client(db, ToolRegistry::with_builtin_tools(), client, tx).unwrap();
        (app, rx, temp_dir)
    }

    async fn wait_idle(app: &App, conversation_id: i64) {
        for _ in 0..200 {
            if !app.is_generating(conversation_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("run never finished");
    }

    #[test]
    fn test_conversation_title() {
        assert_eq!(conversation_title("short question"), "short question");
        assert_eq!(
            conversation_title("what is the weather like in Lisbon"),
            "what is the w..."
        );
        assert_eq!(conversation_title("ééééééééééééééééééééé").chars().count(), 16);
    }

    #[tokio::test]
    async fn test_send_message_creates_conversation_and_runs() {
        let (app, mut events, _temp) = create_app(vec![Some("Hi!")]);

        let message = app.send_message(None, "hello").unwrap();
        assert_eq!(events.recv().await, Some(AppEvent::ConversationsUpdated));

        wait_idle(&app, message.conversation_id).await;
        let messages = app.messages(message.conversation_id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "Hi!");

        let conversation = app.conversation(message.conversation_id).unwrap();
        assert_eq!(conversation.title, "hello");
        assert!(!conversation.generating);

        let settings = app
            .conversation_settings(conversation.conversation_settings_id)
            .unwrap();
        assert_eq!(settings.tools_enabled, vec!["terminal", "python", "get_url", "chart"]);
    }

    #[tokio::test]
    async fn test_busy_conversation_rejects_send() {
        let (app, _events, _temp) = create_app(vec![None]);
        let first = app.send_message(None, "hello").unwrap();
        let conversation_id = first.conversation_id;

        let err = app.send_message(Some(conversation_id), "again").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerationError>(),
            Some(GenerationError::AlreadyGenerating(_))
        ));
        // The rejected message was never stored
        let users = app
            .messages(conversation_id)
            .unwrap()
            .into_iter()
            .filter(|m| m.author == "user")
            .count();
        assert_eq!(users, 1);

        assert!(app.cancel_generation(conversation_id));
        wait_idle(&app, conversation_id).await;
        assert!(!app.cancel_generation(conversation_id));
    }

    #[tokio::test]
    async fn test_held_slot_rejects_before_writing() {
        let (app, _events, _temp) = create_app(vec![Some("first"), Some("second")]);
        let question = app.send_message(None, "question").unwrap();
        let conversation_id = question.conversation_id;
        wait_idle(&app, conversation_id).await;

        // Another caller owns the conversation between our check and our write
        let held = app
            .cancellations
            .try_register(conversation_id, &app.shutdown)
            .unwrap();
        assert!(app.send_message(Some(conversation_id), "racing").is_err());
        assert!(app.rerun_from_message(conversation_id, question.id).is_err());

        let contents: Vec<String> = app
            .messages(conversation_id)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["question", "first"]);

        app.cancellations.unregister(conversation_id, held.run_id);
        app.send_message(Some(conversation_id), "follow-up").unwrap();
        wait_idle(&app, conversation_id).await;
        assert_eq!(app.messages(conversation_id).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_unreadable_settings_release_slot() {
        let (app, _events, _temp) = create_app(vec![Some("ok"), Some("ok again")]);
        let first = app.send_message(None, "hello").unwrap();
        let conversation_id = first.conversation_id;
        wait_idle(&app, conversation_id).await;

        KeyValueStore::new(&app.db)
            .put(crate::constants::app::SETTINGS_KEY, "{not json")
            .unwrap();
        assert!(app.send_message(Some(conversation_id), "lost").is_err());
        assert!(!app.is_generating(conversation_id));
        assert_eq!(app.messages(conversation_id).unwrap().len(), 2);

        app.save_settings(AppSettings::default()).unwrap();
        app.send_message(Some(conversation_id), "again").unwrap();
        wait_idle(&app, conversation_id).await;
        assert_eq!(app.messages(conversation_id).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_rerun_keeps_anchor_message() {
        let (app, _events, _temp) = create_app(vec![Some("first"), Some("second")]);
        let question = app.send_message(None, "question").unwrap();
        let conversation_id = question.conversation_id;
        wait_idle(&app, conversation_id).await;

        app.rerun_from_message(conversation_id, question.id).unwrap();
        wait_idle(&app, conversation_id).await;

        let contents: Vec<String> = app
            .messages(conversation_id)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["question", "second"]);
    }

    #[tokio::test]
    async fn test_default_conversation_settings_round_trip() {
        let (app, _events, _temp) = create_app(vec![]);
        let builtin = app.default_conversation_settings().unwrap();
        assert_eq!(builtin.id, None);
        assert_eq!(builtin.system_prompt_template, DEFAULT_SYSTEM_PROMPT_TEMPLATE);

        let saved = app
            .set_default_conversation_settings("custom", &["chart".to_string()])
            .unwrap();
        let updated = app
            .set_default_conversation_settings("custom 2", &[])
            .unwrap();
        assert_eq!(saved.id, updated.id);
        assert_eq!(
            app.default_conversation_settings().unwrap().system_prompt_template,
            "custom 2"
        );
    }

    #[tokio::test]
    async fn test_settings_are_masked() {
        let (app, _events, _temp) = create_app(vec![]);
        app.save_settings(AppSettings {
            openai_api_key: "sk-live".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(app.settings().unwrap().openai_api_key, "*****");
    }

    #[tokio::test]
    async fn test_delete_conversation_notifies() {
        let (app, mut events, _temp) = create_app(vec![Some("ok")]);
        let message = app.send_message(None, "hello").unwrap();
        assert_eq!(events.recv().await, Some(AppEvent::ConversationsUpdated));
        wait_idle(&app, message.conversation_id).await;

        app.delete_conversation(message.conversation_id).unwrap();
        loop {
            match events.recv().await {
                Some(AppEvent::ConversationsUpdated) => break,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
        assert!(app.conversations().unwrap().is_empty());
    }
}
