//! # sift-core
//!
//! Depth-bounded interpretation ranking.
//!
//! Given a stimulus, the engine searches interpretive layers from the most
//! literal (depth 1) to the most synthetic (depth 9), at most three attempts
//! per depth, and emits the shallowest interpretation that is both eligible
//! and a direct answer. When nothing qualifies it emits a neutral courtesy
//! exit instead.
//!
//! ## Key Guarantees
//!
//! 1. **Shallowest first**: a depth-1 answer never invokes deeper layers
//! 2. **Bounded**: at most 3 attempts per depth, 27 in total, within the latency budget
//! 3. **Infallible**: `resolve` always returns a [`SelectionResult`]
//! 4. **Traceable**: every degraded or rejected step is in the audit trail
//! 5. **Deterministic**: identical inputs and collaborator answers give identical results
//!
//! Safety screening is an upstream precondition. The engine assumes the
//! stimulus has already been admitted.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sift_core::{resolve, ConversationContext, LatencyBudget, Outcome, Stimulus};
//!
//! let stimulus = Stimulus::new("which of {washer, vaccine, fridge} is for sauces?");
//! let result = resolve(&stimulus, &ConversationContext::default(), LatencyBudget::DEFAULT);
//!
//! match result.outcome {
//!     Outcome::Resolved { text, depth, .. } => println!("{} (depth {})", text, depth),
//!     Outcome::CourtesyExit { text, .. } => println!("{}", text),
//! }
//! ```

pub mod budget;
pub mod collaborators;
pub mod controller;
pub mod engine;
pub mod gate;
pub mod generator;
pub mod knowledge;
pub mod question;
pub mod scorer;
pub mod selector;
pub mod session;
pub mod text;
pub mod types;

// Re-export main types at crate root
pub use budget::{Deadline, LatencyBudget};
pub use collaborators::{
    CollaboratorError, CollaboratorTimeouts, Collaborators, HeuristicTokenizer, KnowledgeLookup,
    ParsedText, TableLookup, TemporalBucket, Tokenizer,
};
pub use controller::{EngineLimits, PassState, MAX_ATTEMPTS_PER_DEPTH, MAX_DEPTH, MAX_TOTAL_ATTEMPTS};
pub use engine::{Engine, EngineBuilder, ResolveError, ResolveOptions};
pub use gate::{AntiPatternGate, RejectReason};
pub use generator::{CandidateGenerator, GenerationRequest, LayeredGenerator, BATCH_SIZE};
pub use knowledge::{KnowledgeBase, KnowledgeError, LoadMode, LoadOutcome, LoadedKnowledge};
pub use question::{QuestionFrame, QuestionType};
pub use scorer::{CategorySignal, KeywordSignal, PriorityScorer, ScoreError};
pub use selector::{Selector, COURTESY_EXITS};
pub use session::{ContextStore, InMemoryContextStore, Session, Turn};
pub use types::{
    AuditEvent, AuditTrail, Candidate, CandidateId, CandidateSummary, ConversationContext,
    DisclosureLevel, Dimension, ExitReason, Outcome, PriorityCategory, PriorityScore,
    ScoredCandidate, Segment, SegmentOrigin, SelectionResult, Stimulus, SubSignals,
};

use chrono::{DateTime, Utc};

/// Resolve a stimulus with the standard engine.
///
/// # Determinism
///
/// This function uses the current system time for `resolved_at`.
/// For fully deterministic results use [`resolve_at`].
pub fn resolve(
    stimulus: &Stimulus,
    context: &ConversationContext,
    budget: LatencyBudget,
) -> SelectionResult {
    Engine::standard().resolve(stimulus, context, budget)
}

/// Resolve with an explicit timestamp.
pub fn resolve_at(
    stimulus: &Stimulus,
    context: &ConversationContext,
    budget: LatencyBudget,
    resolved_at: DateTime<Utc>,
) -> SelectionResult {
    Engine::standard().resolve_at(stimulus, context, budget, resolved_at)
}
