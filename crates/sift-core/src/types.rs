//! Core types for sift resolution.
//!
//! These are the data structures that flow through a resolution: the
//! stimulus and its context going in, candidates and scores in the middle,
//! and the [`SelectionResult`] with its audit trail coming out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::question::QuestionType;

/// Marker that opens a self-directed curiosity stimulus.
pub const CURIOSITY_PREFIX: &str = "[Own discovery:";

/// How much of the engine's reasoning a response may carry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DisclosureLevel {
    /// One sentence, never blended.
    Taste,
    /// Up to two contributors may be blended.
    #[default]
    Open,
    /// Up to three contributors may be blended.
    Full,
}

impl DisclosureLevel {
    /// Largest number of candidates the selector may merge at this level.
    pub fn blend_limit(&self) -> usize {
        match self {
            DisclosureLevel::Taste => 1,
            DisclosureLevel::Open => 2,
            DisclosureLevel::Full => 3,
        }
    }
}

/// An incoming message. Immutable for the duration of a resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stimulus {
    /// The text to interpret, with any curiosity prefix removed.
    pub text: String,

    /// Self-directed context carried by a `[Own discovery: ...]` prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curiosity: Option<String>,
}

impl Stimulus {
    /// Build a stimulus, splitting off a leading curiosity block if present.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim_start();
        if let Some(rest) = trimmed.strip_prefix(CURIOSITY_PREFIX) {
            if let Some(close) = rest.find(']') {
                let discovery = rest[..close].trim().to_string();
                let text = rest[close + 1..].trim().to_string();
                return Self {
                    text,
                    curiosity: (!discovery.is_empty()).then_some(discovery),
                };
            }
        }
        Self {
            text: raw.trim().to_string(),
            curiosity: None,
        }
    }
}

/// What the engine knows about the conversation so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationContext {
    /// Text of earlier responses, oldest first.
    #[serde(default)]
    pub prior_outputs: Vec<String>,

    /// How much may be disclosed in the response.
    #[serde(default)]
    pub disclosure: DisclosureLevel,

    /// Precision requests skip filler compression.
    #[serde(default)]
    pub precision: bool,
}

impl ConversationContext {
    /// Context with earlier responses and default disclosure.
    pub fn with_prior_outputs(prior_outputs: Vec<String>) -> Self {
        Self {
            prior_outputs,
            ..Self::default()
        }
    }

    /// The most recent `n` responses, newest first.
    pub fn recent_outputs(&self, n: usize) -> impl Iterator<Item = &String> {
        self.prior_outputs.iter().rev().take(n)
    }
}

/// The interpretive layers, one introduced per depth.
///
/// Ordered by the depth that introduces them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Literal,
    Context,
    Idiom,
    Metaphor,
    CrossReference,
    SelfReference,
    SystemFrame,
    Counterpoint,
    Synthesis,
}

impl Dimension {
    /// All dimensions in depth order.
    pub const ALL: [Dimension; 9] = [
        Dimension::Literal,
        Dimension::Context,
        Dimension::Idiom,
        Dimension::Metaphor,
        Dimension::CrossReference,
        Dimension::SelfReference,
        Dimension::SystemFrame,
        Dimension::Counterpoint,
        Dimension::Synthesis,
    ];

    /// The dimension introduced at `depth` (1-based).
    pub fn for_depth(depth: u8) -> Option<Self> {
        Self::ALL.get(usize::from(depth).checked_sub(1)?).copied()
    }

    /// The depth that introduces this dimension.
    pub fn depth(&self) -> u8 {
        match self {
            Dimension::Literal => 1,
            Dimension::Context => 2,
            Dimension::Idiom => 3,
            Dimension::Metaphor => 4,
            Dimension::CrossReference => 5,
            Dimension::SelfReference => 6,
            Dimension::SystemFrame => 7,
            Dimension::Counterpoint => 8,
            Dimension::Synthesis => 9,
        }
    }
}

/// Identifier of a candidate within one resolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CandidateId(pub u32);

impl CandidateId {
    /// Ids encode where the candidate came from: `depth`, `attempt`, then index.
    pub fn new(depth: u8, attempt: u8, index: usize) -> Self {
        Self(u32::from(depth) * 1000 + u32::from(attempt) * 100 + index as u32)
    }
}

impl std::fmt::Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Where the words of a segment came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SegmentOrigin {
    /// A restatement of the stimulus.
    Stimulus,
    /// Earlier responses or the curiosity block.
    Context,
    /// Knowledge tables or the knowledge lookup.
    Knowledge,
    /// A frame template filled with a topic. Never answers anything by itself.
    Template,
}

/// One piece of candidate text, tagged with the dimension it expresses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub dimension: Dimension,
    pub origin: SegmentOrigin,
    pub text: String,
}

/// A proposed interpretation and response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub id: CandidateId,

    /// Depth that generated this candidate.
    pub depth: u8,

    /// Attempt index within the depth (0-based).
    pub attempt: u8,

    /// The dimension this candidate adds over its base.
    pub added: Dimension,

    /// Response text, split by dimension.
    pub segments: Vec<Segment>,

    /// Raw measurements recorded by the gate. `None` until the gate has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<SubSignals>,
}

impl Candidate {
    /// The full response text.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The text the "directly answers" check sees: everything except
    /// template framing.
    pub fn answer_text(&self) -> String {
        self.segments
            .iter()
            .filter(|s| s.origin != SegmentOrigin::Template)
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether this candidate carries a segment for `dimension`.
    pub fn has_dimension(&self, dimension: Dimension) -> bool {
        self.segments.iter().any(|s| s.dimension == dimension)
    }
}

/// The five universal measurements, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SubSignals {
    /// Distance from earlier responses and canned phrasing.
    pub originality: f64,
    /// Absence of platitudes and hedging.
    pub authenticity: f64,
    /// Sentence quality and lexical variety.
    pub craft: f64,
    /// How well the response's effort matches the stimulus.
    pub earnestness: f64,
    /// How much of the stimulus the response reflects back.
    pub reflection: f64,
}

impl SubSignals {
    pub fn values(&self) -> [f64; 5] {
        [
            self.originality,
            self.authenticity,
            self.craft,
            self.earnestness,
            self.reflection,
        ]
    }

    pub fn all_finite(&self) -> bool {
        self.values().iter().all(|v| v.is_finite())
    }
}

/// The five priority categories.
///
/// Ordered alphabetically for deterministic iteration in BTreeMap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PriorityCategory {
    Amusing,
    Compassionate,
    Insightful,
    Nourishing,
    Strategic,
}

impl PriorityCategory {
    pub const ALL: [PriorityCategory; 5] = [
        PriorityCategory::Amusing,
        PriorityCategory::Compassionate,
        PriorityCategory::Insightful,
        PriorityCategory::Nourishing,
        PriorityCategory::Strategic,
    ];

    /// Fixed weight applied to the raw category score.
    pub fn weight(&self) -> f64 {
        match self {
            PriorityCategory::Amusing => 1.0,
            PriorityCategory::Insightful => 0.95,
            PriorityCategory::Nourishing => 0.90,
            PriorityCategory::Compassionate => 0.85,
            PriorityCategory::Strategic => 0.80,
        }
    }

    /// The question this category asks of a candidate.
    pub fn question(&self) -> &'static str {
        match self {
            PriorityCategory::Amusing => "Does this bring lightness or play?",
            PriorityCategory::Insightful => "Does this reveal how something works?",
            PriorityCategory::Nourishing => "Does this leave the reader better equipped?",
            PriorityCategory::Compassionate => "Does this meet the reader with care?",
            PriorityCategory::Strategic => "Does this point somewhere useful next?",
        }
    }
}

/// Score for a single category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CategoryScore {
    pub category: PriorityCategory,
    /// Raw strength in `[0, 1]`.
    pub raw: f64,
    /// `raw * weight`.
    pub weighted: f64,
    /// Whether `raw` cleared the activation threshold.
    pub met: bool,
}

/// Aggregate score for a candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriorityScore {
    /// Per-category scores in [`PriorityCategory::ALL`] order.
    pub categories: Vec<CategoryScore>,
    /// Sum of weighted category scores.
    pub aggregate: f64,
    /// How many categories cleared the activation threshold.
    pub met_count: usize,
}

impl PriorityScore {
    /// Aggregate must exceed this for eligibility (unless enough categories are met).
    pub const ELIGIBILITY_THRESHOLD: f64 = 0.35;

    /// Categories that must be met for eligibility regardless of aggregate.
    pub const MIN_CATEGORIES_MET: usize = 2;

    pub fn is_eligible(&self) -> bool {
        self.aggregate > Self::ELIGIBILITY_THRESHOLD || self.met_count >= Self::MIN_CATEGORIES_MET
    }

    pub fn get(&self, category: PriorityCategory) -> Option<&CategoryScore> {
        self.categories.iter().find(|c| c.category == category)
    }
}

/// A candidate together with its score and question-type verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: PriorityScore,
    /// Whether the candidate directly answers the detected question type.
    pub answers: bool,
}

impl ScoredCandidate {
    /// Eligible and directly answering.
    pub fn qualifies(&self) -> bool {
        self.answers && self.score.is_eligible()
    }
}

/// Why a resolution ended in a courtesy exit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Every depth and attempt ran without a qualifying candidate.
    DepthExhausted,
    /// The latency budget ran out first.
    BudgetExhausted,
}

/// The terminal outcome of a resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Outcome {
    /// A qualifying interpretation was found.
    Resolved {
        /// The response text.
        text: String,
        /// Depth of the selected candidate (the shallowest contributor when blended).
        depth: u8,
        /// Whether more than one candidate contributed.
        blended: bool,
        /// Candidates whose content appears in the response, best first.
        contributors: Vec<CandidateId>,
        /// Score of the leading contributor.
        score: PriorityScore,
    },

    /// No qualifying interpretation; a neutral holding response instead.
    CourtesyExit {
        text: String,
        reason: ExitReason,
    },
}

impl Outcome {
    pub fn text(&self) -> &str {
        match self {
            Outcome::Resolved { text, .. } | Outcome::CourtesyExit { text, .. } => text,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Outcome::Resolved { .. })
    }

    pub fn is_courtesy_exit(&self) -> bool {
        matches!(self, Outcome::CourtesyExit { .. })
    }
}

/// Which external collaborator an event refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorKind {
    Tokenizer,
    KnowledgeLookup,
}

/// Something worth recording that happened during a resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// An attempt produced no candidates.
    GenerationFailure { depth: u8, attempt: u8, reason: String },
    /// Depth 2 found no contextual signal and reused the literal reading.
    ContextUnsupported { depth: u8 },
    /// A candidate was hard-rejected before scoring.
    GateRejected { candidate: CandidateId, depth: u8, reason: String },
    /// A malformed candidate reached the scorer.
    ScoringFailure { candidate: CandidateId, depth: u8, reason: String },
    /// A collaborator timed out or failed; the resolution degraded.
    CollaboratorDegraded { collaborator: CollaboratorKind, reason: String },
    /// Knowledge tables could not be loaded; built-ins were used.
    KnowledgeDegraded { reason: String },
    /// The latency budget ran out before this attempt.
    BudgetExhausted { depth: u8, attempt: u8 },
    /// Deeper qualifying candidates were dropped in favour of shallower ones.
    Rollback { from_depth: u8, to_depth: u8 },
}

/// Attempts spent at one depth.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepthAttempts {
    pub depth: u8,
    pub attempts: u8,
}

/// Where a candidate ended up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum CandidateVerdict {
    Rejected { reason: String },
    Unscored { reason: String },
    Scored { aggregate: f64, met_count: usize, answers: bool, eligible: bool },
}

/// Compact record of a candidate for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateSummary {
    pub id: CandidateId,
    pub depth: u8,
    pub attempt: u8,
    pub dimension: Dimension,
    pub text: String,
    /// Sub-signals recorded by the gate, absent for rejected candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<SubSignals>,
    #[serde(flatten)]
    pub verdict: CandidateVerdict,
}

impl CandidateSummary {
    fn sort_key(&self) -> f64 {
        match self.verdict {
            CandidateVerdict::Scored { aggregate, .. } => aggregate,
            _ => f64::NEG_INFINITY,
        }
    }

    /// Order by aggregate (best first), then by id.
    pub fn ranking(a: &Self, b: &Self) -> std::cmp::Ordering {
        b.sort_key()
            .partial_cmp(&a.sort_key())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    }
}

/// Structured record of how a resolution went.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuditTrail {
    /// Detected question type.
    pub question_type: Option<QuestionType>,

    /// Deepest depth that ran at least one attempt.
    pub depth_reached: u8,

    /// Attempts per depth, for every depth that ran.
    pub attempts: Vec<DepthAttempts>,

    /// Total attempts across all depths.
    pub total_attempts: u32,

    /// Recorded events in order.
    pub events: Vec<AuditEvent>,

    /// Best-ranked candidates seen, at most [`AuditTrail::TOP_CANDIDATES`].
    pub top_candidates: Vec<CandidateSummary>,

    /// Human-readable account of the outcome.
    pub defense: Vec<String>,
}

impl AuditTrail {
    pub const TOP_CANDIDATES: usize = 9;

    /// Attempts spent at `depth`.
    pub fn attempts_at(&self, depth: u8) -> u8 {
        self.attempts
            .iter()
            .find(|a| a.depth == depth)
            .map_or(0, |a| a.attempts)
    }

    pub fn has_event(&self, predicate: impl Fn(&AuditEvent) -> bool) -> bool {
        self.events.iter().any(predicate)
    }
}

/// Result of a resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectionResult {
    pub outcome: Outcome,
    pub audit: AuditTrail,
    /// When the resolution occurred.
    pub resolved_at: DateTime<Utc>,
}

impl SelectionResult {
    pub fn text(&self) -> &str {
        self.outcome.text()
    }
}
