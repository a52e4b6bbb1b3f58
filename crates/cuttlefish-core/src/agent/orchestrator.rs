//! Agent orchestrator
//!
//! One run per conversation: stream a completion into an assistant message,
//! and while the model keeps asking for tools, run them and feed the
//! observation back as the next turn.
//!
//! ```text
//! history ──► completion ──► assistant message ──┬─ no directive ─► done
//!    ▲                                           │
//!    └──── observation message ◄── tool run ◄────┘
//! ```
//!
//! `start` takes the conversation's cancel slot synchronously and spawns the
//! loop; `spawn` is for callers that took the slot themselves. However the
//! loop ends, cleanup shuts down tool instances, clears the generating flag,
//! releases the slot, and notifies listeners.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::action;
use super::approval::{ApprovalError, ApprovalGate, ApprovalHandle};
use super::cancellation::{CancellationRegistry, RunRegistration};
use super::error::{persistence, GenerationError};
use super::events::{emit, AppEvent, EventSender};
use super::instances::ToolInstanceCache;
use super::prompt;
use super::stream::{accumulate_stream, StreamTarget};
use crate::ai::client::CompletionClient;
use crate::ai::types::CompletionRequest;
use crate::constants::ai;
use crate::settings::AppSettings;
use crate::storage::{ConversationStore, Database, MessageStore, AUTHOR_ASSISTANT};
use crate::tools::ToolRegistry;

/// Shared dependencies of every run
#[derive(Clone)]
pub struct OrchestratorServices {
    pub db: Database,
    pub client: Arc<dyn CompletionClient>,
    pub tools: Arc<ToolRegistry>,
    pub approvals: Arc<ApprovalGate>,
    pub cancellations: Arc<CancellationRegistry>,
    pub events: EventSender,
}

pub struct Orchestrator {
    services: OrchestratorServices,
    conversation_id: i64,
    settings: AppSettings,
}

impl Orchestrator {
    pub fn new(services: OrchestratorServices, conversation_id: i64, settings: AppSettings) -> Self {
        Self {
            services,
            conversation_id,
            settings,
        }
    }

    /// Register the run and spawn it.
    ///
    /// Fails with `AlreadyGenerating` without spawning if the conversation is
    /// busy. Failures other than cancellation are also emitted as
    /// `AsyncError` before the run's final update.
    pub fn start(
        self,
        parent: &CancellationToken,
    ) -> Result<JoinHandle<Result<(), GenerationError>>, GenerationError> {
        let registration = self
            .services
            .cancellations
            .try_register(self.conversation_id, parent)?;
        Ok(self.spawn(registration))
    }

    /// Spawn a run whose slot the caller already holds.
    ///
    /// The run releases `registration` when it ends.
    pub fn spawn(self, registration: RunRegistration) -> JoinHandle<Result<(), GenerationError>> {
        tokio::spawn(self.run(registration))
    }

    async fn run(self, registration: RunRegistration) -> Result<(), GenerationError> {
        let conversation_id = self.conversation_id;
        let token = registration.token.clone();
        info!(conversation_id, run_id = registration.run_id, "Generation started");

        let mut instances = None;
        let result = self.generate(&token, &mut instances).await;

        // Listeners treat cleanup's final update as the end of the run
        match &result {
            Ok(()) => info!(conversation_id, "Generation finished"),
            Err(e) if e.is_cancelled() => info!(conversation_id, "Generation cancelled"),
            Err(e) => {
                warn!(conversation_id, "Generation failed: {}", e);
                emit(
                    &self.services.events,
                    AppEvent::AsyncError {
                        error: e.to_string(),
                    },
                );
            }
        }

        self.cleanup(&registration, instances).await;
        result
    }

    async fn generate(
        &self,
        token: &CancellationToken,
        instances: &mut Option<ToolInstanceCache>,
    ) -> Result<(), GenerationError> {
        let services = &self.services;
        let conversation_id = self.conversation_id;
        let conversations = ConversationStore::new(&services.db);
        let messages = MessageStore::new(&services.db);

        conversations
            .mark_generation_started(conversation_id)
            .map_err(persistence("couldn't mark conversation as generating"))?;
        emit(&services.events, AppEvent::ConversationUpdated { conversation_id });

        let conversation = conversations
            .get_conversation(conversation_id)
            .map_err(persistence("couldn't load conversation"))?;
        let conversation_settings = conversations
            .get_conversation_settings(conversation.conversation_settings_id)
            .map_err(persistence("couldn't load conversation settings"))?;

        let instances = instances.insert(ToolInstanceCache::new(
            services.tools.clone(),
            self.settings.clone(),
            &conversation_settings,
            ApprovalHandle::new(services.approvals.clone(), conversation_id, token.clone()),
        ));

        let mut stop: Vec<String> = ai::DEFAULT_STOP_SEQUENCES
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut empty_completions = 0usize;

        loop {
            if token.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }

            let history = messages
                .list_messages(conversation_id)
                .map_err(persistence("couldn't list conversation messages"))?;
            let system_prompt = prompt::render_system_prompt(&conversation_settings, &services.tools)?;
            let request = CompletionRequest {
                model: self.settings.model.clone(),
                max_tokens: ai::MAX_OUTPUT_TOKENS,
                temperature: ai::TEMPERATURE,
                top_p: ai::TOP_P,
                messages: prompt::build_prompt(system_prompt, &history),
                stop: stop.clone(),
            };

            let stream = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(GenerationError::Cancelled),
                stream = services.client.create_stream(request) => {
                    stream.map_err(GenerationError::Transport)?
                }
            };

            let message = messages
                .create_message(conversation_id, AUTHOR_ASSISTANT, "")
                .map_err(persistence("couldn't create assistant message"))?;
            accumulate_stream(
                stream,
                StreamTarget {
                    db: &services.db,
                    events: &services.events,
                    conversation_id,
                    message_id: message.id,
                },
                token,
            )
            .await?;

            let content = messages
                .get_message(message.id)
                .map_err(persistence("couldn't reload assistant message"))?
                .content;

            if content.trim().is_empty() {
                empty_completions += 1;
                if empty_completions >= ai::MAX_COMPLETION_ATTEMPTS {
                    return Err(GenerationError::EmptyCompletionExhausted {
                        attempts: empty_completions,
                    });
                }
                warn!(
                    conversation_id,
                    attempt = empty_completions,
                    "Empty completion, retrying without stop sequences"
                );
                stop.clear();
                continue;
            }

            if !action::contains_directive(&content) {
                return Ok(());
            }

            let action = action::parse_action(&content)?;
            info!(conversation_id, tool = %action.tool, "Running tool");

            let (tool_name, instance) = instances.get_or_instantiate(&action.tool).await?;
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(GenerationError::Cancelled),
                outcome = instance.run(&action.args) => outcome,
            };
            let result = outcome.map_err(|error| {
                if token.is_cancelled() || error.downcast_ref::<ApprovalError>().is_some() {
                    GenerationError::Cancelled
                } else {
                    GenerationError::ToolExecution {
                        tool: action.tool.clone(),
                        error,
                    }
                }
            })?;

            messages
                .create_message(conversation_id, &tool_name, &prompt::format_observation(&result))
                .map_err(persistence("couldn't save tool observation"))?;
            emit(&services.events, AppEvent::ConversationUpdated { conversation_id });
        }
    }

    async fn cleanup(&self, registration: &RunRegistration, instances: Option<ToolInstanceCache>) {
        let services = &self.services;
        let conversation_id = self.conversation_id;

        if let Some(mut instances) = instances {
            for (tool, error) in instances.shutdown_all().await {
                emit(
                    &services.events,
                    AppEvent::AsyncError {
                        error: format!("couldn't shut down tool `{}`: {:#}", tool, error),
                    },
                );
            }
        }

        if let Err(e) = ConversationStore::new(&services.db).mark_generation_done(conversation_id) {
            warn!(conversation_id, "Failed to clear generating flag: {:#}", e);
            emit(
                &services.events,
                AppEvent::AsyncError {
                    error: format!("couldn't mark generation as done: {:#}", e),
                },
            );
        }

        services
            .cancellations
            .unregister(conversation_id, registration.run_id);
        emit(&services.events, AppEvent::ConversationUpdated { conversation_id });
    }
}
