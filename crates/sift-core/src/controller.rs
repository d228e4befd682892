//! The depth/attempt state machine.
//!
//! A resolution starts at depth 1, attempt 0. Each step generates, gates and
//! scores a batch of candidates, then moves on:
//!
//! | Condition                                  | Transition                         |
//! |--------------------------------------------|------------------------------------|
//! | a candidate is eligible and answers        | stop, resolve with the finalists   |
//! | attempts remain at this depth              | next attempt, same depth           |
//! | attempts exhausted, depth below the limit  | next depth, attempt 0              |
//! | attempts exhausted at the deepest depth    | stop, courtesy exit                |
//! | latency budget expired                     | stop, courtesy exit                |
//!
//! Depth 1 attempt 0 always runs, even on an expired budget. Everything the
//! machine knows travels in an explicit [`PassState`].

use std::cmp::Ordering;

use crate::budget::Deadline;
use crate::collaborators::{Collaborators, ParsedText};
use crate::gate::{AntiPatternGate, GateContext};
use crate::generator::{CandidateGenerator, GenerationRequest};
use crate::question::{directly_answers, QuestionFrame};
use crate::scorer::PriorityScorer;
use crate::text;
use crate::types::{
    AuditEvent, AuditTrail, Candidate, CandidateSummary, CandidateVerdict, CollaboratorKind,
    ConversationContext, DepthAttempts, Dimension, ExitReason, ScoredCandidate, Stimulus,
};

/// Deepest interpretive layer.
pub const MAX_DEPTH: u8 = 9;

/// Attempts allowed at each depth.
pub const MAX_ATTEMPTS_PER_DEPTH: u8 = 3;

/// Hard ceiling on attempts in one resolution.
pub const MAX_TOTAL_ATTEMPTS: u32 = MAX_DEPTH as u32 * MAX_ATTEMPTS_PER_DEPTH as u32;

/// Search limits. Values outside `1..=9` and `1..=3` are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    pub max_depth: u8,
    pub attempts_per_depth: u8,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            attempts_per_depth: MAX_ATTEMPTS_PER_DEPTH,
        }
    }
}

impl EngineLimits {
    pub fn clamped(self) -> Self {
        Self {
            max_depth: self.max_depth.clamp(1, MAX_DEPTH),
            attempts_per_depth: self.attempts_per_depth.clamp(1, MAX_ATTEMPTS_PER_DEPTH),
        }
    }
}

/// Where the machine moved after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    NextAttempt,
    NextDepth,
    Exhausted,
}

/// Explicit state of one resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct PassState {
    pub depth: u8,
    pub attempt: u8,
    pub satisfied: bool,
    pub total_attempts: u32,
    attempts: Vec<DepthAttempts>,
}

impl Default for PassState {
    fn default() -> Self {
        Self::new()
    }
}

impl PassState {
    pub fn new() -> Self {
        Self {
            depth: 1,
            attempt: 0,
            satisfied: false,
            total_attempts: 0,
            attempts: Vec::new(),
        }
    }

    /// Whether this is the attempt that runs regardless of budget.
    pub fn is_first_attempt(&self) -> bool {
        self.depth == 1 && self.attempt == 0
    }

    /// Count the current attempt.
    pub fn record_attempt(&mut self) {
        self.total_attempts += 1;
        match self.attempts.iter_mut().find(|a| a.depth == self.depth) {
            Some(entry) => entry.attempts += 1,
            None => self.attempts.push(DepthAttempts {
                depth: self.depth,
                attempts: 1,
            }),
        }
    }

    /// Move to the next attempt or depth.
    pub fn advance(&mut self, limits: EngineLimits) -> Advance {
        if self.attempt + 1 < limits.attempts_per_depth {
            self.attempt += 1;
            Advance::NextAttempt
        } else if self.depth < limits.max_depth {
            self.depth += 1;
            self.attempt = 0;
            Advance::NextDepth
        } else {
            Advance::Exhausted
        }
    }

    pub fn attempts(&self) -> &[DepthAttempts] {
        &self.attempts
    }

    pub fn depth_reached(&self) -> u8 {
        self.attempts.iter().map(|a| a.depth).max().unwrap_or(0)
    }
}

/// How a pass ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    /// Qualifying candidates, shallowest depth only, best first.
    Resolved(Vec<ScoredCandidate>),
    Exhausted(ExitReason),
}

/// A finished pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub terminal: Terminal,
    pub state: PassState,
    /// Audit trail without the defense lines.
    pub audit: AuditTrail,
}

/// Per-resolution scratch space.
#[derive(Default)]
struct Workspace {
    parsed: Option<Result<ParsedText, String>>,
    snippets: Option<Result<Vec<String>, String>>,
    trite: f64,
    /// Best survivor of the previous depth. New depths extend it.
    frontier: Option<ScoredCandidate>,
    /// Best survivor of the current depth.
    next_frontier: Option<ScoredCandidate>,
    finalists: Vec<ScoredCandidate>,
    summaries: Vec<CandidateSummary>,
    events: Vec<AuditEvent>,
}

impl Workspace {
    fn parsed(&self) -> Option<&ParsedText> {
        self.parsed.as_ref().and_then(|r| r.as_ref().ok())
    }

    fn snippets(&self) -> &[String] {
        self.snippets
            .as_ref()
            .and_then(|r| r.as_ref().ok())
            .map_or(&[], Vec::as_slice)
    }
}

/// Drives one resolution over borrowed engine parts.
pub struct PassController<'e> {
    pub generator: &'e dyn CandidateGenerator,
    pub gate: &'e AntiPatternGate,
    pub scorer: &'e PriorityScorer,
    pub collaborators: &'e Collaborators,
    pub limits: EngineLimits,
}

impl<'e> PassController<'e> {
    pub fn run(
        &self,
        stimulus: &Stimulus,
        context: &ConversationContext,
        frame: &QuestionFrame,
        deadline: &Deadline,
    ) -> PassReport {
        let limits = self.limits.clamped();
        let mut state = PassState::new();
        let mut ws = Workspace::default();

        let terminal = loop {
            if !state.is_first_attempt() && deadline.expired() {
                tracing::debug!(depth = state.depth, attempt = state.attempt, "latency budget exhausted");
                ws.events.push(AuditEvent::BudgetExhausted {
                    depth: state.depth,
                    attempt: state.attempt,
                });
                break Terminal::Exhausted(ExitReason::BudgetExhausted);
            }

            self.prefetch(state.depth, stimulus, frame, deadline, &mut ws);

            let candidates = {
                let request = GenerationRequest {
                    stimulus,
                    context,
                    frame,
                    depth: state.depth,
                    attempt: state.attempt,
                    base: ws.frontier.as_ref().map(|f| &f.candidate),
                    parsed: ws.parsed(),
                    snippets: ws.snippets(),
                };
                self.generator.generate(&request)
            };
            state.record_attempt();

            if candidates.is_empty() {
                let reason = failure_reason(state.depth, &ws);
                ws.events.push(AuditEvent::GenerationFailure {
                    depth: state.depth,
                    attempt: state.attempt,
                    reason,
                });
            } else {
                self.evaluate(candidates, stimulus, context, frame, &mut state, &mut ws);
            }

            if state.satisfied {
                let (kept, event) = rollback(std::mem::take(&mut ws.finalists));
                ws.events.extend(event);
                break Terminal::Resolved(kept);
            }

            match state.advance(limits) {
                Advance::NextAttempt => {}
                Advance::NextDepth => {
                    if let Some(best) = ws.next_frontier.take() {
                        ws.frontier = Some(best);
                    }
                }
                Advance::Exhausted => break Terminal::Exhausted(ExitReason::DepthExhausted),
            }
        };

        let mut top_candidates = ws.summaries;
        top_candidates.sort_by(CandidateSummary::ranking);
        top_candidates.truncate(AuditTrail::TOP_CANDIDATES);

        let audit = AuditTrail {
            question_type: Some(frame.kind),
            depth_reached: state.depth_reached(),
            attempts: state.attempts().to_vec(),
            total_attempts: state.total_attempts,
            events: ws.events,
            top_candidates,
            defense: Vec::new(),
        };

        PassReport {
            terminal,
            state,
            audit,
        }
    }

    /// Fetch collaborator output the first time a depth needs it.
    fn prefetch(
        &self,
        depth: u8,
        stimulus: &Stimulus,
        frame: &QuestionFrame,
        deadline: &Deadline,
        ws: &mut Workspace,
    ) {
        if depth >= Dimension::Context.depth() && ws.parsed.is_none() {
            let result = self.collaborators.parse(&stimulus.text, deadline.remaining());
            if let Err(err) = &result {
                tracing::warn!(collaborator = ?CollaboratorKind::Tokenizer, error = %err, "collaborator degraded");
                ws.events.push(AuditEvent::CollaboratorDegraded {
                    collaborator: CollaboratorKind::Tokenizer,
                    reason: err.to_string(),
                });
            }
            ws.parsed = Some(result.map_err(|e| e.to_string()));
        }

        if depth >= Dimension::CrossReference.depth() && ws.snippets.is_none() {
            let mut keys = frame.keywords.clone();
            if let Some(parsed) = ws.parsed() {
                for token in parsed.salient_tokens() {
                    if !keys.contains(&token) {
                        keys.push(token);
                    }
                }
            }
            let result = self.collaborators.lookup(&keys, deadline.remaining());
            match &result {
                Ok(snippets) => ws.trite = trite_level(snippets),
                Err(err) => {
                    tracing::warn!(collaborator = ?CollaboratorKind::KnowledgeLookup, error = %err, "collaborator degraded");
                    ws.events.push(AuditEvent::CollaboratorDegraded {
                        collaborator: CollaboratorKind::KnowledgeLookup,
                        reason: err.to_string(),
                    });
                }
            }
            ws.snippets = Some(result.map_err(|e| e.to_string()));
        }
    }

    /// Gate, score and judge one batch.
    fn evaluate(
        &self,
        candidates: Vec<Candidate>,
        stimulus: &Stimulus,
        context: &ConversationContext,
        frame: &QuestionFrame,
        state: &mut PassState,
        ws: &mut Workspace,
    ) {
        if state.depth == Dimension::Context.depth()
            && candidates.iter().any(|c| !c.has_dimension(Dimension::Context))
        {
            ws.events.push(AuditEvent::ContextUnsupported { depth: state.depth });
        }

        let gate_context = GateContext {
            stimulus,
            prior_outputs: &context.prior_outputs,
            trite: ws.trite,
        };
        let outcome = self.gate.filter(candidates, &gate_context);

        for (candidate, reason) in outcome.rejected {
            ws.events.push(AuditEvent::GateRejected {
                candidate: candidate.id,
                depth: candidate.depth,
                reason: reason.to_string(),
            });
            ws.summaries.push(summary(
                &candidate,
                CandidateVerdict::Rejected {
                    reason: reason.to_string(),
                },
            ));
        }

        let mut scored = Vec::new();
        for candidate in outcome.passed {
            match self.scorer.score(&candidate) {
                Ok(score) => {
                    let answers = directly_answers(frame, &candidate.answer_text());
                    ws.summaries.push(summary(
                        &candidate,
                        CandidateVerdict::Scored {
                            aggregate: score.aggregate,
                            met_count: score.met_count,
                            answers,
                            eligible: score.is_eligible(),
                        },
                    ));
                    scored.push(ScoredCandidate {
                        candidate,
                        score,
                        answers,
                    });
                }
                Err(err) => {
                    tracing::warn!(candidate = %candidate.id, error = %err, "candidate could not be scored");
                    ws.events.push(AuditEvent::ScoringFailure {
                        candidate: candidate.id,
                        depth: candidate.depth,
                        reason: err.to_string(),
                    });
                    ws.summaries.push(summary(
                        &candidate,
                        CandidateVerdict::Unscored {
                            reason: err.to_string(),
                        },
                    ));
                }
            }
        }

        scored.sort_by(ranking);
        if let Some(best) = scored.first() {
            let better = ws
                .next_frontier
                .as_ref()
                .map_or(true, |current| ranking(best, current) == Ordering::Less);
            if better {
                ws.next_frontier = Some(best.clone());
            }
        }

        let qualifying: Vec<ScoredCandidate> = scored.into_iter().filter(|s| s.qualifies()).collect();
        if !qualifying.is_empty() {
            tracing::debug!(depth = state.depth, attempt = state.attempt, count = qualifying.len(), "qualifying candidates found");
            ws.finalists.extend(qualifying);
            state.satisfied = true;
        }
    }
}

/// Keep only the shallowest qualifying depth.
///
/// Returns the kept candidates, best first, and a rollback event when deeper
/// candidates were dropped.
pub fn rollback(mut finalists: Vec<ScoredCandidate>) -> (Vec<ScoredCandidate>, Option<AuditEvent>) {
    let qualifying_depths = finalists
        .iter()
        .filter(|f| f.qualifies())
        .map(|f| f.candidate.depth);
    let (Some(shallowest), Some(deepest)) = (qualifying_depths.clone().min(), qualifying_depths.max()) else {
        return (Vec::new(), None);
    };

    finalists.retain(|f| f.qualifies() && f.candidate.depth == shallowest);
    finalists.sort_by(ranking);

    let event = (deepest > shallowest).then_some(AuditEvent::Rollback {
        from_depth: deepest,
        to_depth: shallowest,
    });
    (finalists, event)
}

/// Best first: eligible, then aggregate, then shallower, then earlier id.
pub fn ranking(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .is_eligible()
        .cmp(&a.score.is_eligible())
        .then(
            b.score
                .aggregate
                .partial_cmp(&a.score.aggregate)
                .unwrap_or(Ordering::Equal),
        )
        .then(a.candidate.depth.cmp(&b.candidate.depth))
        .then(a.candidate.id.cmp(&b.candidate.id))
}

/// Redundancy of looked-up material: many snippets saying the same thing.
fn trite_level(snippets: &[String]) -> f64 {
    if snippets.is_empty() {
        return 0.0;
    }
    let count_factor = (snippets.len() as f64 / 5.0).min(1.0);
    let sets: Vec<_> = snippets.iter().map(|s| text::keyword_set(s)).collect();
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in sets.iter().enumerate() {
        for b in &sets[i + 1..] {
            total += text::jaccard(a, b);
            pairs += 1;
        }
    }
    let similarity = if pairs == 0 { 0.0 } else { total / pairs as f64 };
    (count_factor * 0.6 + similarity * 0.4).clamp(0.0, 1.0)
}

fn failure_reason(depth: u8, ws: &Workspace) -> String {
    match (&ws.parsed, depth) {
        (_, 1) => "no further literal readings".to_string(),
        (Some(Err(err)), _) => format!("tokenizer unavailable: {}", err),
        _ => "no alternatives left at this depth".to_string(),
    }
}

fn summary(candidate: &Candidate, verdict: CandidateVerdict) -> CandidateSummary {
    const PREVIEW_CHARS: usize = 160;
    let text = candidate.text();
    let text = if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut.trim_end())
    } else {
        text
    };
    CandidateSummary {
        id: candidate.id,
        depth: candidate.depth,
        attempt: candidate.attempt,
        dimension: candidate.added,
        text,
        signals: candidate.signals,
        verdict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateId, PriorityScore, Segment, SegmentOrigin};

    fn scored(depth: u8, index: usize, aggregate: f64, answers: bool) -> ScoredCandidate {
        ScoredCandidate {
            candidate: Candidate {
                id: CandidateId::new(depth, 0, index),
                depth,
                attempt: 0,
                added: Dimension::for_depth(depth).unwrap(),
                segments: vec![Segment {
                    dimension: Dimension::Literal,
                    origin: SegmentOrigin::Stimulus,
                    text: format!("candidate {} at depth {}", index, depth),
                }],
                signals: None,
            },
            score: PriorityScore {
                categories: Vec::new(),
                aggregate,
                met_count: 0,
            },
            answers,
        }
    }

    #[test]
    fn test_state_advances_attempts_then_depths() {
        let limits = EngineLimits::default();
        let mut state = PassState::new();
        assert!(state.is_first_attempt());
        assert_eq!(state.advance(limits), Advance::NextAttempt);
        assert_eq!(state.advance(limits), Advance::NextAttempt);
        assert_eq!(state.advance(limits), Advance::NextDepth);
        assert_eq!((state.depth, state.attempt), (2, 0));
    }

    #[test]
    fn test_state_exhausts_at_limits() {
        let limits = EngineLimits {
            max_depth: 2,
            attempts_per_depth: 1,
        };
        let mut state = PassState::new();
        assert_eq!(state.advance(limits), Advance::NextDepth);
        assert_eq!(state.advance(limits), Advance::Exhausted);
    }

    #[test]
    fn test_limits_are_clamped() {
        let limits = EngineLimits {
            max_depth: 40,
            attempts_per_depth: 0,
        }
        .clamped();
        assert_eq!(limits.max_depth, MAX_DEPTH);
        assert_eq!(limits.attempts_per_depth, 1);
        assert_eq!(MAX_TOTAL_ATTEMPTS, 27);
    }

    #[test]
    fn test_record_attempt_counts_per_depth() {
        let mut state = PassState::new();
        state.record_attempt();
        state.advance(EngineLimits::default());
        state.record_attempt();
        assert_eq!(state.total_attempts, 2);
        assert_eq!(state.attempts(), &[DepthAttempts { depth: 1, attempts: 2 }]);
        assert_eq!(state.depth_reached(), 1);
    }

    #[test]
    fn test_rollback_prefers_shallower_answering_candidate() {
        let deep = scored(5, 0, 2.0, true);
        let shallow = scored(2, 0, 0.9, true);
        let (kept, event) = rollback(vec![deep, shallow.clone()]);
        assert_eq!(kept, vec![shallow]);
        assert_eq!(
            event,
            Some(AuditEvent::Rollback {
                from_depth: 5,
                to_depth: 2
            })
        );
    }

    #[test]
    fn test_rollback_ignores_non_answering_shallow_candidates() {
        let deep = scored(5, 0, 2.0, true);
        let shallow = scored(2, 0, 0.9, false);
        let (kept, event) = rollback(vec![shallow, deep.clone()]);
        assert_eq!(kept, vec![deep]);
        assert_eq!(event, None);
    }

    #[test]
    fn test_rollback_orders_same_depth_by_score() {
        let a = scored(3, 0, 0.8, true);
        let b = scored(3, 1, 1.4, true);
        let (kept, _) = rollback(vec![a.clone(), b.clone()]);
        assert_eq!(kept, vec![b, a]);
    }

    #[test]
    fn test_trite_level() {
        assert_eq!(trite_level(&[]), 0.0);
        let same = vec!["tides follow the moon".to_string(); 5];
        assert!((trite_level(&same) - 1.0).abs() < 1e-9);
        let distinct = vec!["tides follow the moon".to_string(), "bread needs yeast".to_string()];
        assert!((trite_level(&distinct) - 0.24).abs() < 1e-9);
    }
}
