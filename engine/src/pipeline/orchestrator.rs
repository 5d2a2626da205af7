//! Per-turn sequencing of the goal pipeline
//!
//! A turn runs, in order: append user message, infer, reconcile, stream the
//! reply, append assistant message, evaluate. Each goal stage is gated by
//! the conversation's `pipeline_settings` as they stood when the turn
//! started. The conversation's mutex is held for the whole turn.
//!
//! Events go out through an `mpsc::Sender<ServerEvent>`. A failed send
//! means the client is gone: relaying stops, but the turn still runs to
//! completion so the stored conversation stays consistent.

use futures::StreamExt;
use sdk::{ClientEvent, Conversation, Goal, Message, PipelineStage, ServerEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{evaluation, inference, merge};
use crate::config::PipelineConfig;
use crate::llm::{self, LLMProvider};
use crate::store::ConversationStore;

/// Reply stored and relayed when the provider has no credentials
pub const UNAVAILABLE_REPLY: &str = "LLM service unavailable - API key not configured";

/// Reply stored and relayed when streaming the assistant reply fails
pub const STREAM_FAILURE_REPLY: &str =
    "Unable to generate response. Please check your API key configuration.";

/// What a completed turn left behind
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSummary {
    pub user_message_id: String,
    pub assistant_message_id: String,
    pub reply: String,
    pub goal_count: usize,
    pub evaluated: usize,
}

/// Outbound side of one client connection
struct Outbox<'a> {
    tx: &'a mpsc::Sender<ServerEvent>,
    open: bool,
}

impl<'a> Outbox<'a> {
    fn new(tx: &'a mpsc::Sender<ServerEvent>) -> Self {
        Self { tx, open: true }
    }

    /// Send an event; returns false once the client has gone away
    async fn send(&mut self, event: ServerEvent) -> bool {
        if self.open && self.tx.send(event).await.is_err() {
            tracing::info!("Client disconnected, no further events will be sent");
            self.open = false;
        }
        self.open
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn LLMProvider>,
    store: ConversationStore,
    limits: PipelineConfig,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn LLMProvider>, store: ConversationStore, limits: PipelineConfig) -> Self {
        Self {
            provider,
            store,
            limits,
        }
    }

    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Dispatch one client message for the given conversation
    pub async fn handle_client_event(
        &self,
        conversation_id: &str,
        event: ClientEvent,
        tx: &mpsc::Sender<ServerEvent>,
    ) {
        match event {
            ClientEvent::UserMessage { message } => {
                self.run_turn(conversation_id, &message, tx).await;
            }
            ClientEvent::TogglePipeline { stage, enabled } => {
                self.toggle_stage(conversation_id, stage, enabled, tx).await;
            }
            ClientEvent::GetConversation => {
                self.send_state(conversation_id, tx).await;
            }
        }
    }

    /// Flip a stage for later turns and acknowledge
    pub async fn toggle_stage(
        &self,
        conversation_id: &str,
        stage: PipelineStage,
        enabled: bool,
        tx: &mpsc::Sender<ServerEvent>,
    ) {
        let handle = self.store.get_or_create(conversation_id).await;
        handle.lock().await.pipeline_settings.set(stage, enabled);

        tracing::info!(conversation_id, %stage, enabled, "Pipeline stage toggled");
        Outbox::new(tx)
            .send(ServerEvent::PipelineToggled { stage, enabled })
            .await;
    }

    /// Send a full snapshot of the conversation
    pub async fn send_state(&self, conversation_id: &str, tx: &mpsc::Sender<ServerEvent>) {
        let handle = self.store.get_or_create(conversation_id).await;
        let conversation: Conversation = handle.lock().await.clone();
        Outbox::new(tx)
            .send(ServerEvent::ConversationState { conversation })
            .await;
    }

    /// Run one full conversation turn for a user message
    pub async fn run_turn(
        &self,
        conversation_id: &str,
        text: &str,
        tx: &mpsc::Sender<ServerEvent>,
    ) -> TurnSummary {
        let mut out = Outbox::new(tx);
        let handle = self.store.get_or_create(conversation_id).await;
        let mut conversation = handle.lock().await;
        let settings = conversation.pipeline_settings;

        let message_id = conversation.next_message_id();
        conversation
            .messages
            .push(Message::user(message_id.clone(), text));

        tracing::info!(conversation_id, %message_id, "Turn started");

        // Inference
        let mut inferred: Vec<Goal> = Vec::new();
        if settings.infer {
            inferred = inference::infer_goals(
                self.provider.as_ref(),
                text,
                &message_id,
                conversation.goals.len(),
                self.limits.inference_max_tokens,
            )
            .await;

            if let Some(user_message) = conversation.messages.last_mut() {
                user_message.goals = inferred.clone();
            }

            if !inferred.is_empty() {
                out.send(ServerEvent::GoalsInferred {
                    goals: inferred.clone(),
                    message_id: message_id.clone(),
                })
                .await;
            }
        }

        // Reconciliation
        if !inferred.is_empty() {
            let current = std::mem::take(&mut conversation.goals);
            conversation.goals = self.reconcile(current, &inferred, settings.merge).await;

            if !conversation.goals.is_empty() {
                out.send(ServerEvent::GoalsUpdated {
                    goals: conversation.goals.clone(),
                    message_id: message_id.clone(),
                })
                .await;
            }
        }

        // Assistant reply
        let assistant_message_id = conversation.next_message_id();
        let history: Vec<llm::Message> = conversation.messages.iter().map(Into::into).collect();
        let reply = self
            .stream_reply(&history, &assistant_message_id, &mut out)
            .await;
        conversation
            .messages
            .push(Message::assistant(assistant_message_id.clone(), reply.clone()));

        // Evaluation
        let mut evaluations = Vec::new();
        if settings.evaluate && !conversation.goals.is_empty() && !reply.is_empty() {
            for goal in conversation.goals.iter_mut().filter(|g| !g.completed) {
                let record = evaluation::evaluate_goal(
                    self.provider.as_ref(),
                    goal,
                    &reply,
                    self.limits.evaluation_max_tokens,
                )
                .await;
                evaluations.push(record);
            }

            if !evaluations.is_empty() {
                out.send(ServerEvent::GoalsEvaluated {
                    evaluations: evaluations.clone(),
                    message_id: assistant_message_id.clone(),
                })
                .await;
            }
        }

        tracing::info!(
            conversation_id,
            %message_id,
            goals = conversation.goals.len(),
            evaluated = evaluations.len(),
            "Turn completed"
        );

        TurnSummary {
            user_message_id: message_id,
            assistant_message_id,
            reply,
            goal_count: conversation.goals.len(),
            evaluated: evaluations.len(),
        }
    }

    /// Fold inferred goals into the live goal set.
    ///
    /// Locked goals never reach the merge oracle; they are carried forward
    /// ahead of whatever the merge produced.
    async fn reconcile(&self, current: Vec<Goal>, inferred: &[Goal], merge_enabled: bool) -> Vec<Goal> {
        if !merge_enabled || current.is_empty() {
            return append_unique(current, inferred.to_vec());
        }

        let (locked, open): (Vec<Goal>, Vec<Goal>) = current.into_iter().partition(|g| g.locked);
        if !locked.is_empty() {
            tracing::debug!(locked = locked.len(), "Withholding locked goals from merge");
        }

        let merged = merge::merge_goals(
            self.provider.as_ref(),
            &open,
            inferred,
            self.limits.merge_max_tokens,
        )
        .await;

        append_unique(locked, merged)
    }

    /// Stream the assistant reply, relaying chunks. Returns the text to store.
    async fn stream_reply(
        &self,
        history: &[llm::Message],
        message_id: &str,
        out: &mut Outbox<'_>,
    ) -> String {
        if !self.provider.is_available() {
            tracing::warn!(provider = self.provider.name(), "Provider unavailable, skipping reply");
            out.send(ServerEvent::error(UNAVAILABLE_REPLY)).await;
            return UNAVAILABLE_REPLY.to_string();
        }

        let mut stream = match self
            .provider
            .generate_stream(history, self.limits.response_max_tokens)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Reply stream could not be opened: {}", e);
                out.send(ServerEvent::error(STREAM_FAILURE_REPLY)).await;
                return STREAM_FAILURE_REPLY.to_string();
            }
        };

        let mut full_text = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(text) => {
                    full_text.push_str(&text);
                    let delivered = out
                        .send(ServerEvent::LlmResponseChunk {
                            text,
                            message_id: message_id.to_string(),
                        })
                        .await;
                    if !delivered {
                        tracing::info!(message_id, "Reply relay stopped, keeping partial text");
                        return full_text;
                    }
                }
                Err(e) => {
                    tracing::warn!(message_id, "Reply stream failed: {}", e);
                    out.send(ServerEvent::error(STREAM_FAILURE_REPLY)).await;
                    return STREAM_FAILURE_REPLY.to_string();
                }
            }
        }

        out.send(ServerEvent::LlmResponseComplete {
            message_id: message_id.to_string(),
            full_text: full_text.clone(),
        })
        .await;

        full_text
    }
}

/// Append `produced` after `carried`, renaming any produced goal whose id is
/// already taken to `<id>_<n>`
fn append_unique(mut carried: Vec<Goal>, produced: Vec<Goal>) -> Vec<Goal> {
    let mut taken: HashSet<String> = carried.iter().map(|g| g.id.clone()).collect();

    for mut goal in produced {
        if taken.contains(&goal.id) {
            let base = goal.id.clone();
            let mut n = 1;
            while taken.contains(&format!("{}_{}", base, n)) {
                n += 1;
            }
            goal.id = format!("{}_{}", base, n);
        }
        taken.insert(goal.id.clone());
        carried.push(goal);
    }

    carried
}
