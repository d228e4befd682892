//! Priority scoring.
//!
//! Each of the five categories has exactly one owning [`CategorySignal`].
//! The scorer combines that signal with the universal sub-signals recorded
//! by the gate, weights the result and sums it.
//!
//! ## Combination
//!
//! | Step      | Formula                                                          |
//! |-----------|------------------------------------------------------------------|
//! | strength  | signal strength, + 0.15 per universal boost keyword if it fired  |
//! | affinity  | the sub-signal(s) the category leans on                          |
//! | raw       | `strength * (0.5 + 0.5 * affinity)`, in [0, 1]                   |
//! | weighted  | `raw * weight`                                                   |
//! | aggregate | sum of weighted                                                  |
//! | met       | `raw > 0.3`                                                      |
//!
//! Sub-signals scale a category's own signal and boost words amplify it;
//! neither creates one. A candidate with no category signal scores zero.

mod signals;

pub use signals::{CategorySignal, KeywordSignal};

use std::collections::BTreeMap;
use thiserror::Error;

use crate::knowledge::KnowledgeBase;
use crate::text::contains_phrase;
use crate::types::{Candidate, CategoryScore, PriorityCategory, PriorityScore, SubSignals};

/// Why a candidate could not be scored.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("Candidate text is empty")]
    EmptyText,

    #[error("Candidate text contains control characters")]
    ControlCharacters,

    #[error("Candidate text is {len} characters, limit is {max}")]
    Oversize { len: usize, max: usize },

    #[error("Candidate reached the scorer without gate signals")]
    MissingSignals,

    #[error("Non-finite value in {0}")]
    NonFinite(String),
}

/// Scores candidates across the five categories.
pub struct PriorityScorer {
    signals: BTreeMap<PriorityCategory, Box<dyn CategorySignal>>,
    boost_keywords: Vec<String>,
}

impl std::fmt::Debug for PriorityScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityScorer")
            .field("signals", &self.signals.keys().collect::<Vec<_>>())
            .field("boost_keywords", &self.boost_keywords)
            .finish()
    }
}

impl PriorityScorer {
    /// A category is met when its raw score exceeds this.
    pub const ACTIVATION_THRESHOLD: f64 = 0.3;

    /// Strength added per universal boost keyword to a category that fired.
    pub const BOOST_PER_HIT: f64 = 0.15;

    /// Longest candidate text accepted.
    pub const MAX_CANDIDATE_CHARS: usize = 4000;

    /// Keyword signals for every category, from the knowledge tables.
    pub fn new(knowledge: &KnowledgeBase) -> Self {
        let signals = PriorityCategory::ALL
            .into_iter()
            .map(|category| {
                let keywords = knowledge
                    .category_keywords
                    .get(&category)
                    .cloned()
                    .unwrap_or_default();
                let signal: Box<dyn CategorySignal> = Box::new(KeywordSignal::new(category, keywords));
                (category, signal)
            })
            .collect();
        Self {
            signals,
            boost_keywords: knowledge.boost_keywords.clone(),
        }
    }

    /// Install `signal` as the owner of its category, returning the previous owner.
    pub fn replace_signal(&mut self, signal: Box<dyn CategorySignal>) -> Option<Box<dyn CategorySignal>> {
        self.signals.insert(signal.category(), signal)
    }

    /// Score a gated candidate.
    pub fn score(&self, candidate: &Candidate) -> Result<PriorityScore, ScoreError> {
        let text = candidate.text();
        if text.trim().is_empty() {
            return Err(ScoreError::EmptyText);
        }
        if text.chars().any(|c| c.is_control() && !c.is_whitespace()) {
            return Err(ScoreError::ControlCharacters);
        }
        let len = text.chars().count();
        if len > Self::MAX_CANDIDATE_CHARS {
            return Err(ScoreError::Oversize {
                len,
                max: Self::MAX_CANDIDATE_CHARS,
            });
        }
        let sub = candidate.signals.ok_or(ScoreError::MissingSignals)?;
        if !sub.all_finite() {
            return Err(ScoreError::NonFinite("sub-signals".to_string()));
        }

        let boost = self
            .boost_keywords
            .iter()
            .filter(|k| contains_phrase(&text, k))
            .count() as f64
            * Self::BOOST_PER_HIT;

        let mut categories = Vec::with_capacity(PriorityCategory::ALL.len());
        for category in PriorityCategory::ALL {
            let strength = self
                .signals
                .get(&category)
                .map_or(0.0, |s| s.strength(&text));
            if !strength.is_finite() {
                return Err(ScoreError::NonFinite(format!("{:?} signal", category)));
            }
            let strength = if strength > 0.0 {
                (strength + boost).min(1.0)
            } else {
                0.0
            };
            let affinity = affinity(category, &sub);
            let raw = (strength * (0.5 + 0.5 * affinity)).clamp(0.0, 1.0);
            categories.push(CategoryScore {
                category,
                raw,
                weighted: raw * category.weight(),
                met: raw > Self::ACTIVATION_THRESHOLD,
            });
        }

        let aggregate = categories.iter().map(|c| c.weighted).sum();
        let met_count = categories.iter().filter(|c| c.met).count();
        Ok(PriorityScore {
            categories,
            aggregate,
            met_count,
        })
    }
}

/// The sub-signals each category leans on.
fn affinity(category: PriorityCategory, sub: &SubSignals) -> f64 {
    let value = match category {
        PriorityCategory::Amusing => sub.originality,
        PriorityCategory::Insightful => (sub.reflection + sub.craft) / 2.0,
        PriorityCategory::Nourishing => sub.earnestness,
        PriorityCategory::Compassionate => sub.authenticity,
        PriorityCategory::Strategic => (sub.reflection + sub.earnestness) / 2.0,
    };
    value.clamp(0.0, 1.0)
}
