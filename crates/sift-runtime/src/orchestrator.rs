//! Runtime orchestrator for many independent conversations.
//!
//! The engine is synchronous. The orchestrator hosts it behind an async API:
//! - One shared, read-only [`Engine`] for every conversation
//! - One [`Session`] per conversation; turns within a conversation are serialized
//! - Each resolution runs on a blocking worker under the global timeout
//! - A global timeout becomes a courtesy exit, not an error
//!
//! Conversations share no mutable state. The history of a conversation is
//! appended exactly once per turn, after the resolution finishes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use sift_core::{
    AuditTrail, ConversationContext, Engine, ExitReason, Outcome, ResolveOptions, SelectionResult,
    Selector, Session, Stimulus, Turn,
};

use crate::config::{ConfigError, RuntimeConfig};

/// Errors from the runtime orchestrator.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Unknown conversation: {0}")]
    UnknownConversation(String),

    #[error("Conversation already open: {0}")]
    ConversationExists(String),

    #[error("Resolution worker failed: {0}")]
    Worker(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result of one turn.
#[derive(Debug, Clone)]
pub struct RuntimeResponse {
    pub conversation: String,

    /// The resolution, or a courtesy exit if the global timeout hit
    pub result: SelectionResult,

    /// Wall-clock time for the turn
    pub elapsed: Duration,

    /// Whether the global timeout cut the resolution off
    pub timed_out: bool,
}

/// Hosts conversations against one engine.
pub struct RuntimeOrchestrator {
    engine: Arc<Engine>,
    config: RuntimeConfig,
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl RuntimeOrchestrator {
    /// Create an orchestrator over an existing engine.
    pub fn new(engine: Arc<Engine>, config: RuntimeConfig) -> Self {
        Self {
            engine,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn builder() -> RuntimeOrchestratorBuilder {
        RuntimeOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Open a new conversation.
    pub async fn open(&self, conversation: &str) -> Result<(), RuntimeError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(conversation) {
            return Err(RuntimeError::ConversationExists(conversation.to_string()));
        }
        let mut session = Session::new(self.engine.clone());
        session.disclosure = self.config.disclosure;
        session.max_turns = self.config.history.max_turns_considered;
        sessions.insert(conversation.to_string(), Arc::new(Mutex::new(session)));
        tracing::debug!(conversation, "conversation opened");
        Ok(())
    }

    /// Close a conversation, returning its history.
    pub async fn close(&self, conversation: &str) -> Result<Vec<Turn>, RuntimeError> {
        let session = self
            .sessions
            .lock()
            .await
            .remove(conversation)
            .ok_or_else(|| RuntimeError::UnknownConversation(conversation.to_string()))?;
        let history = session.lock().await.history();
        Ok(history)
    }

    pub async fn conversation_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// The recorded turns of a conversation, oldest first.
    pub async fn history(&self, conversation: &str) -> Result<Vec<Turn>, RuntimeError> {
        let session = self.session(conversation).await?;
        let history = session.lock().await.history();
        Ok(history)
    }

    /// Resolve one incoming message in a conversation.
    ///
    /// # Execution Flow
    /// 1. Lock the conversation (turns are sequential per conversation)
    /// 2. Snapshot the history into a context
    /// 3. Resolve on a blocking worker, bounded by the global timeout
    /// 4. Append the emitted text once
    pub async fn respond(&self, conversation: &str, input: &str) -> Result<RuntimeResponse, RuntimeError> {
        let session = self.session(conversation).await?;
        let mut session = session.lock().await;

        let started = Instant::now();
        let stimulus = Stimulus::new(input);
        let context = session.context();
        let resolved_at = self.config.resolved_at();
        let options = ResolveOptions::with_budget(self.config.budget());

        let worker = {
            let engine = self.engine.clone();
            let context = context.clone();
            tokio::task::spawn_blocking(move || engine.resolve_with(&stimulus, &context, options, resolved_at))
        };

        let (result, timed_out) = match tokio::time::timeout(self.config.global_timeout, worker).await {
            Ok(Ok(result)) => (result, false),
            Ok(Err(join_error)) => {
                tracing::warn!(conversation, error = %join_error, "resolution worker failed");
                return Err(RuntimeError::Worker(join_error.to_string()));
            }
            Err(_) => {
                tracing::warn!(
                    conversation,
                    timeout = ?self.config.global_timeout,
                    "resolution exceeded the global timeout"
                );
                (self.timeout_exit(&context, resolved_at), true)
            }
        };

        session.record(input, &result);
        Ok(RuntimeResponse {
            conversation: conversation.to_string(),
            result,
            elapsed: started.elapsed(),
            timed_out,
        })
    }

    async fn session(&self, conversation: &str) -> Result<Arc<Mutex<Session>>, RuntimeError> {
        self.sessions
            .lock()
            .await
            .get(conversation)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownConversation(conversation.to_string()))
    }

    /// Courtesy exit standing in for a resolution that did not finish in time.
    fn timeout_exit(&self, context: &ConversationContext, resolved_at: chrono::DateTime<chrono::Utc>) -> SelectionResult {
        SelectionResult {
            outcome: Outcome::CourtesyExit {
                text: Selector.courtesy_exit(&context.prior_outputs),
                reason: ExitReason::BudgetExhausted,
            },
            audit: AuditTrail {
                defense: vec![format!(
                    "Courtesy exit: global timeout of {} elapsed",
                    humantime::format_duration(self.config.global_timeout)
                )],
                ..AuditTrail::default()
            },
            resolved_at,
        }
    }
}

/// Builder for RuntimeOrchestrator.
pub struct RuntimeOrchestratorBuilder {
    engine: Option<Arc<Engine>>,
    config: RuntimeConfig,
}

impl RuntimeOrchestratorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            engine: None,
            config: RuntimeConfig::default(),
        }
    }

    /// Use a prepared engine instead of building one from the configuration.
    pub fn engine(mut self, engine: Arc<Engine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<RuntimeOrchestrator, RuntimeError> {
        self.config.validate()?;
        let engine = match self.engine {
            Some(engine) => engine,
            None => Arc::new(self.config.build_engine()?),
        };
        Ok(RuntimeOrchestrator::new(engine, self.config))
    }
}

impl Default for RuntimeOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sift_core::{Candidate, CandidateGenerator, GenerationRequest};

    fn fixed_config() -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.latency_budget = Duration::from_secs(1);
        config.determinism.resolved_at = Some(chrono::Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        config
    }

    // Generator that never finishes in time
    struct Stalled(Duration);

    impl CandidateGenerator for Stalled {
        fn generate(&self, _request: &GenerationRequest<'_>) -> Vec<Candidate> {
            std::thread::sleep(self.0);
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_an_error() {
        let orchestrator = RuntimeOrchestrator::builder().config(fixed_config()).build().unwrap();
        let err = orchestrator.respond("missing", "hello there").await.unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownConversation(_)));
    }

    #[tokio::test]
    async fn test_open_twice_is_an_error() {
        let orchestrator = RuntimeOrchestrator::builder().build().unwrap();
        orchestrator.open("a").await.unwrap();
        assert!(matches!(
            orchestrator.open("a").await,
            Err(RuntimeError::ConversationExists(_))
        ));
        assert_eq!(orchestrator.conversation_count().await, 1);
    }

    #[tokio::test]
    async fn test_respond_records_each_turn_once() {
        let orchestrator = RuntimeOrchestrator::builder().config(fixed_config()).build().unwrap();
        orchestrator.open("kitchen").await.unwrap();

        let response = orchestrator
            .respond("kitchen", "which of {washer, vaccine, fridge} is for sauces?")
            .await
            .unwrap();
        let expected = "The fridge is the one for sauces, because it goes with food and cold.";
        assert_eq!(response.result.text(), expected);
        assert!(!response.timed_out);

        let history = orchestrator.history("kitchen").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].response, expected);
        assert_eq!(history[0].recorded_at, response.result.resolved_at);
    }

    #[tokio::test]
    async fn test_conversations_do_not_share_history() {
        let orchestrator = RuntimeOrchestrator::builder().config(fixed_config()).build().unwrap();
        orchestrator.open("a").await.unwrap();
        orchestrator.open("b").await.unwrap();

        let a1 = orchestrator.respond("a", "autopilot again").await.unwrap();
        let a2 = orchestrator.respond("a", "autopilot again").await.unwrap();
        let b1 = orchestrator.respond("b", "autopilot again").await.unwrap();

        assert_ne!(a1.result.text(), a2.result.text());
        assert_eq!(a1.result.text(), b1.result.text());

        let closed = orchestrator.close("a").await.unwrap();
        assert_eq!(closed.len(), 2);
        assert_eq!(orchestrator.conversation_count().await, 1);
    }

    #[tokio::test]
    async fn test_global_timeout_becomes_courtesy_exit() {
        let mut config = fixed_config();
        config.latency_budget = Duration::from_millis(10);
        config.global_timeout = Duration::from_millis(50);
        let engine = Engine::builder().generator(Stalled(Duration::from_millis(300))).build();
        let orchestrator = RuntimeOrchestrator::builder()
            .config(config)
            .engine(Arc::new(engine))
            .build()
            .unwrap();
        orchestrator.open("slow").await.unwrap();

        let response = orchestrator.respond("slow", "tell me something").await.unwrap();
        assert!(response.timed_out);
        assert!(matches!(
            response.result.outcome,
            Outcome::CourtesyExit {
                reason: ExitReason::BudgetExhausted,
                ..
            }
        ));
        assert!(response.elapsed < Duration::from_millis(300));
        assert_eq!(orchestrator.history("slow").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_to_build() {
        let mut config = RuntimeConfig::default();
        config.max_depth = 0;
        assert!(matches!(
            RuntimeOrchestrator::builder().config(config).build(),
            Err(RuntimeError::Config(_))
        ));
    }
}
