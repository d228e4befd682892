//! The assembled engine.
//!
//! An [`Engine`] owns one instance of every capability (knowledge tables,
//! generator, gate, scorer, selector, collaborators) and exposes the single
//! public operation, [`Engine::resolve`]. Each capability has exactly one
//! owner; alternatives are injected through [`EngineBuilder`].
//!
//! `resolve` never fails. Anything that goes wrong inside a resolution is
//! recorded in the audit trail and, at worst, ends in a courtesy exit.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::budget::LatencyBudget;
use crate::collaborators::{
    CollaboratorTimeouts, Collaborators, HeuristicTokenizer, KnowledgeLookup, TableLookup, Tokenizer,
};
use crate::controller::{
    EngineLimits, PassController, PassReport, Terminal, MAX_ATTEMPTS_PER_DEPTH, MAX_DEPTH,
};
use crate::gate::AntiPatternGate;
use crate::generator::{CandidateGenerator, LayeredGenerator};
use crate::knowledge::{KnowledgeBase, LoadOutcome, LoadedKnowledge};
use crate::question::analyze;
use crate::scorer::{CategorySignal, PriorityScorer};
use crate::selector::Selector;
use crate::types::{
    AuditEvent, AuditTrail, ConversationContext, ExitReason, Outcome, SelectionResult, Stimulus,
};

/// Invalid caller-supplied input to the option helpers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("max_depth must be within 1..={max}, got {got}")]
    InvalidDepth { got: u8, max: u8 },

    #[error("attempts_per_depth must be within 1..={max}, got {got}")]
    InvalidAttempts { got: u8, max: u8 },
}

/// Budget and limits for one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResolveOptions {
    pub budget: LatencyBudget,
    /// Tightens the engine's own limits for this call only.
    pub limits: Option<EngineLimits>,
}

impl ResolveOptions {
    pub fn with_budget(budget: LatencyBudget) -> Self {
        Self {
            budget,
            limits: None,
        }
    }

    /// Options with explicit limits. Out-of-range limits are rejected rather
    /// than clamped.
    pub fn with_limits(
        budget: LatencyBudget,
        max_depth: u8,
        attempts_per_depth: u8,
    ) -> Result<Self, ResolveError> {
        if !(1..=MAX_DEPTH).contains(&max_depth) {
            return Err(ResolveError::InvalidDepth {
                got: max_depth,
                max: MAX_DEPTH,
            });
        }
        if !(1..=MAX_ATTEMPTS_PER_DEPTH).contains(&attempts_per_depth) {
            return Err(ResolveError::InvalidAttempts {
                got: attempts_per_depth,
                max: MAX_ATTEMPTS_PER_DEPTH,
            });
        }
        Ok(Self {
            budget,
            limits: Some(EngineLimits {
                max_depth,
                attempts_per_depth,
            }),
        })
    }
}

/// The interpretation-ranking engine.
pub struct Engine {
    knowledge: Arc<KnowledgeBase>,
    knowledge_outcome: LoadOutcome,
    generator: Box<dyn CandidateGenerator>,
    gate: AntiPatternGate,
    scorer: PriorityScorer,
    selector: Selector,
    collaborators: Collaborators,
    limits: EngineLimits,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("knowledge_entries", &self.knowledge.entry_count())
            .field("knowledge_outcome", &self.knowledge_outcome)
            .field("scorer", &self.scorer)
            .field("collaborators", &self.collaborators)
            .field("limits", &self.limits)
            .finish()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Built-in knowledge with the local heuristic tokenizer and the
    /// snippet table as knowledge lookup.
    pub fn standard() -> Self {
        Self::builder()
            .tokenizer(HeuristicTokenizer)
            .table_lookup()
            .build()
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn knowledge_outcome(&self) -> &LoadOutcome {
        &self.knowledge_outcome
    }

    pub fn limits(&self) -> EngineLimits {
        self.limits
    }

    /// Resolve a stimulus.
    ///
    /// Uses the current time for `resolved_at`. For reproducible results use
    /// [`Engine::resolve_at`].
    pub fn resolve(
        &self,
        stimulus: &Stimulus,
        context: &ConversationContext,
        budget: LatencyBudget,
    ) -> SelectionResult {
        self.resolve_with(stimulus, context, ResolveOptions::with_budget(budget), Utc::now())
    }

    /// Resolve with an explicit timestamp.
    ///
    /// Identical stimulus, context and collaborator responses give identical
    /// results, as long as the budget does not run out.
    pub fn resolve_at(
        &self,
        stimulus: &Stimulus,
        context: &ConversationContext,
        budget: LatencyBudget,
        resolved_at: DateTime<Utc>,
    ) -> SelectionResult {
        self.resolve_with(stimulus, context, ResolveOptions::with_budget(budget), resolved_at)
    }

    /// Resolve with per-call options.
    pub fn resolve_with(
        &self,
        stimulus: &Stimulus,
        context: &ConversationContext,
        options: ResolveOptions,
        resolved_at: DateTime<Utc>,
    ) -> SelectionResult {
        let span = tracing::debug_span!("resolve", chars = stimulus.text.len());
        let _enter = span.enter();

        let limits = match options.limits {
            Some(limits) => {
                let limits = limits.clamped();
                EngineLimits {
                    max_depth: limits.max_depth.min(self.limits.max_depth),
                    attempts_per_depth: limits.attempts_per_depth.min(self.limits.attempts_per_depth),
                }
            }
            None => self.limits,
        };

        let frame = analyze(&stimulus.text);
        let deadline = options.budget.start();
        let controller = PassController {
            generator: self.generator.as_ref(),
            gate: &self.gate,
            scorer: &self.scorer,
            collaborators: &self.collaborators,
            limits,
        };
        let PassReport {
            terminal, mut audit, ..
        } = controller.run(stimulus, context, &frame, &deadline);

        if let Some(reason) = self.knowledge_outcome.degradation() {
            audit.events.insert(0, AuditEvent::KnowledgeDegraded { reason });
        }

        let outcome = match terminal {
            Terminal::Resolved(finalists) => match self.selector.select(finalists, context) {
                Some(selection) => Outcome::Resolved {
                    text: selection.text,
                    depth: selection.depth,
                    blended: selection.blended,
                    contributors: selection.contributors,
                    score: selection.score,
                },
                None => self.courtesy_exit(context, ExitReason::DepthExhausted),
            },
            Terminal::Exhausted(reason) => self.courtesy_exit(context, reason),
        };

        audit.defense = defense(&outcome, &audit);
        match &outcome {
            Outcome::Resolved { depth, blended, .. } => {
                tracing::info!(depth = *depth, blended = *blended, attempts = audit.total_attempts, "resolved");
            }
            Outcome::CourtesyExit { reason, .. } => {
                tracing::info!(reason = ?reason, attempts = audit.total_attempts, "courtesy exit");
            }
        }

        SelectionResult {
            outcome,
            audit,
            resolved_at,
        }
    }

    fn courtesy_exit(&self, context: &ConversationContext, reason: ExitReason) -> Outcome {
        Outcome::CourtesyExit {
            text: self.selector.courtesy_exit(&context.prior_outputs),
            reason,
        }
    }
}

/// Human-readable justification of the outcome.
fn defense(outcome: &Outcome, audit: &AuditTrail) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(kind) = audit.question_type {
        lines.push(format!("Question type: {:?}", kind));
    }

    match outcome {
        Outcome::Resolved {
            depth,
            blended,
            contributors,
            score,
            ..
        } => {
            lines.push(format!(
                "Resolved at depth {} after {} attempt(s)",
                depth, audit.total_attempts
            ));
            let met: Vec<String> = score
                .categories
                .iter()
                .filter(|c| c.met)
                .map(|c| format!("{:?}", c.category))
                .collect();
            lines.push(format!(
                "Leading score {:.3}, {} categories met{}",
                score.aggregate,
                score.met_count,
                if met.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", met.join(", "))
                }
            ));
            if let Some(leader) = contributors
                .first()
                .and_then(|id| audit.top_candidates.iter().find(|c| c.id == *id))
            {
                lines.push(format!("Leading dimension: {:?}", leader.dimension));
            }
            if *blended {
                let ids: Vec<String> = contributors.iter().map(|id| id.to_string()).collect();
                lines.push(format!("Blended from {}", ids.join(", ")));
            }
        }
        Outcome::CourtesyExit { reason, .. } => {
            let why = match reason {
                ExitReason::DepthExhausted => "no candidate qualified at any depth",
                ExitReason::BudgetExhausted => "the latency budget ran out",
            };
            lines.push(format!(
                "Courtesy exit after {} attempt(s): {}",
                audit.total_attempts, why
            ));
        }
    }

    let rejected = audit
        .events
        .iter()
        .filter(|e| matches!(e, AuditEvent::GateRejected { .. }))
        .count();
    if rejected > 0 {
        lines.push(format!("{} candidate(s) rejected by the gate", rejected));
    }
    for event in &audit.events {
        match event {
            AuditEvent::CollaboratorDegraded { collaborator, reason } => {
                lines.push(format!("Degraded {:?}: {}", collaborator, reason));
            }
            AuditEvent::KnowledgeDegraded { reason } => {
                lines.push(format!("Built-in knowledge in use: {}", reason));
            }
            AuditEvent::Rollback { from_depth, to_depth } => {
                lines.push(format!("Rolled back from depth {} to {}", from_depth, to_depth));
            }
            _ => {}
        }
    }
    lines
}

/// Assembles an [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    knowledge: Option<LoadedKnowledge>,
    generator: Option<Box<dyn CandidateGenerator>>,
    signals: Vec<Box<dyn CategorySignal>>,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    knowledge_lookup: Option<Arc<dyn KnowledgeLookup>>,
    table_lookup: bool,
    timeouts: CollaboratorTimeouts,
    limits: EngineLimits,
}

impl EngineBuilder {
    /// Use `base` as the knowledge tables.
    pub fn knowledge(mut self, base: KnowledgeBase) -> Self {
        self.knowledge = Some(LoadedKnowledge {
            base,
            outcome: LoadOutcome::Builtin,
        });
        self
    }

    /// Use tables from [`KnowledgeBase::load`], keeping its outcome for the audit trail.
    pub fn loaded_knowledge(mut self, loaded: LoadedKnowledge) -> Self {
        self.knowledge = Some(loaded);
        self
    }

    pub fn generator(mut self, generator: impl CandidateGenerator + 'static) -> Self {
        self.generator = Some(Box::new(generator));
        self
    }

    /// Replace the signal for one category.
    pub fn signal(mut self, signal: impl CategorySignal + 'static) -> Self {
        self.signals.push(Box::new(signal));
        self
    }

    pub fn tokenizer(mut self, tokenizer: impl Tokenizer + 'static) -> Self {
        self.tokenizer = Some(Arc::new(tokenizer));
        self
    }

    pub fn knowledge_lookup(mut self, lookup: impl KnowledgeLookup + 'static) -> Self {
        self.knowledge_lookup = Some(Arc::new(lookup));
        self
    }

    /// Serve lookups from the engine's own snippet table, unless a lookup
    /// was injected.
    pub fn table_lookup(mut self) -> Self {
        self.table_lookup = true;
        self
    }

    pub fn timeouts(mut self, timeouts: CollaboratorTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn limits(mut self, limits: EngineLimits) -> Self {
        self.limits = limits.clamped();
        self
    }

    pub fn build(self) -> Engine {
        let LoadedKnowledge { base, outcome } = self.knowledge.unwrap_or_else(|| LoadedKnowledge {
            base: KnowledgeBase::builtin(),
            outcome: LoadOutcome::Builtin,
        });
        let knowledge = Arc::new(base);

        let mut scorer = PriorityScorer::new(&knowledge);
        for signal in self.signals {
            scorer.replace_signal(signal);
        }

        let generator = self
            .generator
            .unwrap_or_else(|| Box::new(LayeredGenerator::new(knowledge.clone())));

        let knowledge_lookup = match self.knowledge_lookup {
            Some(lookup) => Some(lookup),
            None if self.table_lookup => {
                Some(Arc::new(TableLookup::new(knowledge.clone())) as Arc<dyn KnowledgeLookup>)
            }
            None => None,
        };

        Engine {
            gate: AntiPatternGate::new(knowledge.clone()),
            knowledge,
            knowledge_outcome: outcome,
            generator,
            scorer,
            selector: Selector,
            collaborators: Collaborators {
                tokenizer: self.tokenizer,
                knowledge: knowledge_lookup,
                timeouts: self.timeouts,
            },
            limits: self.limits,
        }
    }
}
