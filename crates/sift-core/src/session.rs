//! Conversation sessions.
//!
//! A [`Session`] is the only owner of a conversation's history. Each turn
//! reads a snapshot of the store, resolves against it, and appends the
//! emitted text exactly once afterwards. Nothing is written while a
//! resolution is running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::budget::LatencyBudget;
use crate::engine::Engine;
use crate::types::{ConversationContext, DisclosureLevel, SelectionResult, Stimulus};

/// One exchange in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub stimulus: String,
    pub response: String,
    /// Whether the response was a resolution rather than a courtesy exit.
    pub resolved: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only history of a conversation.
pub trait ContextStore: Send {
    /// The most recent `limit` turns, oldest first.
    fn snapshot(&self, limit: usize) -> Vec<Turn>;

    fn append(&mut self, turn: Turn);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The in-memory store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContextStore {
    turns: Vec<Turn>,
}

impl ContextStore for InMemoryContextStore {
    fn snapshot(&self, limit: usize) -> Vec<Turn> {
        let start = self.turns.len().saturating_sub(limit);
        self.turns[start..].to_vec()
    }

    fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    fn len(&self) -> usize {
        self.turns.len()
    }
}

/// A single conversation against a shared engine.
pub struct Session {
    engine: Arc<Engine>,
    store: Box<dyn ContextStore>,
    pub disclosure: DisclosureLevel,
    pub precision: bool,
    /// Turns of history each resolution sees.
    pub max_turns: usize,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("turns", &self.store.len())
            .field("disclosure", &self.disclosure)
            .field("precision", &self.precision)
            .field("max_turns", &self.max_turns)
            .finish()
    }
}

impl Session {
    pub const DEFAULT_MAX_TURNS: usize = 20;

    pub fn new(engine: Arc<Engine>) -> Self {
        Self::with_store(engine, Box::new(InMemoryContextStore::default()))
    }

    pub fn with_store(engine: Arc<Engine>, store: Box<dyn ContextStore>) -> Self {
        Self {
            engine,
            store,
            disclosure: DisclosureLevel::default(),
            precision: false,
            max_turns: Self::DEFAULT_MAX_TURNS,
        }
    }

    /// Context built from the current history.
    pub fn context(&self) -> ConversationContext {
        ConversationContext {
            prior_outputs: self
                .store
                .snapshot(self.max_turns)
                .into_iter()
                .map(|turn| turn.response)
                .collect(),
            disclosure: self.disclosure,
            precision: self.precision,
        }
    }

    /// Resolve `input` and record the turn.
    pub fn respond(&mut self, input: &str, budget: LatencyBudget) -> SelectionResult {
        self.respond_at(input, budget, Utc::now())
    }

    /// [`Session::respond`] with an explicit timestamp.
    pub fn respond_at(
        &mut self,
        input: &str,
        budget: LatencyBudget,
        at: DateTime<Utc>,
    ) -> SelectionResult {
        let stimulus = Stimulus::new(input);
        let context = self.context();
        let result = self.engine.resolve_at(&stimulus, &context, budget, at);
        self.record(input, &result);
        result
    }

    /// Append the emitted text for a finished resolution.
    pub fn record(&mut self, input: &str, result: &SelectionResult) {
        self.store.append(Turn {
            stimulus: input.to_string(),
            response: result.text().to_string(),
            resolved: result.outcome.is_resolved(),
            recorded_at: result.resolved_at,
        });
    }

    /// The whole history, oldest first.
    pub fn history(&self) -> Vec<Turn> {
        self.store.snapshot(self.store.len())
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn turn(response: &str) -> Turn {
        Turn {
            stimulus: "q".to_string(),
            response: response.to_string(),
            resolved: true,
            recorded_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_snapshot_keeps_most_recent_in_order() {
        let mut store = InMemoryContextStore::default();
        for r in ["a", "b", "c"] {
            store.append(turn(r));
        }
        let snapshot: Vec<String> = store.snapshot(2).into_iter().map(|t| t.response).collect();
        assert_eq!(snapshot, vec!["b", "c"]);
        assert_eq!(store.snapshot(10).len(), 3);
    }

    #[test]
    fn test_each_turn_is_recorded_once() {
        let mut session = Session::new(Arc::new(Engine::standard()));
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let first = session.respond_at(
            "which of {washer, vaccine, fridge} is for sauces?",
            LatencyBudget::unbounded(),
            at,
        );
        session.respond_at("autopilot autopilot", LatencyBudget::unbounded(), at);

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].response, first.text());
        assert!(history[0].resolved);
        assert!(!history[1].resolved);
        assert_eq!(history[1].recorded_at, at);
    }

    #[test]
    fn test_context_carries_settings() {
        let mut session = Session::new(Arc::new(Engine::standard()));
        session.disclosure = DisclosureLevel::Full;
        session.precision = true;
        session.max_turns = 1;
        let engine = session.engine().clone();
        for _ in 0..2 {
            let result = engine.resolve(
                &Stimulus::new("autopilot"),
                &ConversationContext::default(),
                LatencyBudget::unbounded(),
            );
            session.record("autopilot", &result);
        }

        let context = session.context();
        assert_eq!(context.prior_outputs.len(), 1);
        assert_eq!(context.disclosure, DisclosureLevel::Full);
        assert!(context.precision);
    }
}
