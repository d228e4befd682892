//! Anti-pattern gate.
//!
//! Every candidate passes through the gate before it is scored. The gate
//! hard-rejects what must never be emitted and records the five universal
//! sub-signals for everything else.
//!
//! ## Hard Rejects
//!
//! | Reason          | Condition                                                   |
//! |-----------------|-------------------------------------------------------------|
//! | Blacklisted     | Contains a phrase from the knowledge `hard_reject` table     |
//! | Autopilot       | Boilerplate assistant phrasing or a looped word             |
//! | Filler          | No content words once filler and framing words are removed  |
//! | VerbatimRepeat  | Same text as an earlier response                            |
//! | DejaVu          | Shares more than 60% of content words with a recent response |

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::knowledge::KnowledgeBase;
use crate::text::{self, keyword_set};
use crate::types::{Candidate, Stimulus, SubSignals};

lazy_static! {
    static ref AUTOPILOT_PATTERNS: Vec<(&'static str, Regex)> = vec![
        ("assistant boilerplate", Regex::new(r"(?i)\bas an (?:ai|assistant)\b").unwrap()),
        ("stock closer", Regex::new(r"(?i)\b(?:hope this helps|let me know if (?:you have )?any (?:other )?questions)\b").unwrap()),
        ("self-description", Regex::new(r"(?i)\bi(?:'m| am) (?:just|only) (?:a|an) (?:bot|program|machine)\b").unwrap()),
    ];

    static ref HEDGES: Regex = Regex::new(
        r"(?i)\b(?:maybe|perhaps|kind of|sort of|i guess|i think|probably|basically)\b"
    ).unwrap();

    static ref FILLER_WORDS: HashSet<&'static str> = [
        "stuff", "things", "thing", "whatever", "like", "really", "basically", "um", "uh",
        "yeah", "okay", "anyway", "etc", "blah", "well", "totally", "literally",
    ]
    .into_iter()
    .collect();
}

/// Why a candidate was hard-rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    Blacklisted(String),
    Autopilot(&'static str),
    Filler,
    VerbatimRepeat,
    DejaVu { overlap: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Blacklisted(marker) => write!(f, "blacklisted phrase '{}'", marker),
            RejectReason::Autopilot(kind) => write!(f, "autopilot phrasing ({})", kind),
            RejectReason::Filler => write!(f, "generic filler"),
            RejectReason::VerbatimRepeat => write!(f, "verbatim repeat of an earlier response"),
            RejectReason::DejaVu { overlap } => {
                write!(f, "too close to a recent response ({:.0}% overlap)", overlap * 100.0)
            }
        }
    }
}

/// What the gate needs to know besides the candidate.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    pub stimulus: &'a Stimulus,
    pub prior_outputs: &'a [String],
    /// Redundancy of looked-up material in `[0, 1]`. Lowers originality.
    pub trite: f64,
}

/// Candidates split by verdict.
#[derive(Debug, Default)]
pub struct GateOutcome {
    /// Survivors, each with `signals` filled in.
    pub passed: Vec<Candidate>,
    pub rejected: Vec<(Candidate, RejectReason)>,
}

/// Hard-reject filter and sub-signal recorder.
#[derive(Debug, Clone)]
pub struct AntiPatternGate {
    knowledge: Arc<KnowledgeBase>,
}

impl AntiPatternGate {
    /// Recent responses compared for déjà-vu.
    pub const DEJA_VU_WINDOW: usize = 5;
    /// Overlap above this is déjà-vu.
    pub const DEJA_VU_THRESHOLD: f64 = 0.6;
    /// Candidates with fewer content words are never déjà-vu.
    pub const DEJA_VU_MIN_WORDS: usize = 3;

    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }

    /// Split `candidates` into survivors and rejects.
    pub fn filter(&self, candidates: Vec<Candidate>, context: &GateContext<'_>) -> GateOutcome {
        let mut outcome = GateOutcome::default();
        for mut candidate in candidates {
            match self.check(&candidate.text(), context) {
                Ok(signals) => {
                    candidate.signals = Some(signals);
                    outcome.passed.push(candidate);
                }
                Err(reason) => {
                    tracing::debug!(candidate = %candidate.id, %reason, "gate rejected candidate");
                    outcome.rejected.push((candidate, reason));
                }
            }
        }
        outcome
    }

    /// Check one text. Returns its sub-signals if it passes.
    pub fn check(&self, text: &str, context: &GateContext<'_>) -> Result<SubSignals, RejectReason> {
        let lower = text.to_lowercase();

        if let Some(marker) = self
            .knowledge
            .hard_reject
            .iter()
            .find(|m| lower.contains(m.to_lowercase().as_str()))
        {
            return Err(RejectReason::Blacklisted(marker.clone()));
        }

        if let Some((kind, _)) = AUTOPILOT_PATTERNS.iter().find(|(_, p)| p.is_match(text)) {
            return Err(RejectReason::Autopilot(*kind));
        }
        if has_looped_word(&text::words(text)) {
            return Err(RejectReason::Autopilot("looped word"));
        }

        let words = keyword_set(text);
        let substantive = words
            .iter()
            .filter(|w| !FILLER_WORDS.contains(w.as_str()) && !text::is_echo_word(w))
            .count();
        if substantive == 0 {
            return Err(RejectReason::Filler);
        }

        let normalized = text::normalize(text);
        if context
            .prior_outputs
            .iter()
            .any(|p| text::normalize(p) == normalized)
        {
            return Err(RejectReason::VerbatimRepeat);
        }

        let closest = self.closest_recent(&words, context.prior_outputs);
        if words.len() >= Self::DEJA_VU_MIN_WORDS && closest > Self::DEJA_VU_THRESHOLD {
            return Err(RejectReason::DejaVu { overlap: closest });
        }

        Ok(self.sub_signals(text, &lower, &words, closest, context))
    }

    /// Highest content-word overlap with any recent response.
    fn closest_recent(&self, words: &BTreeSet<String>, prior_outputs: &[String]) -> f64 {
        prior_outputs
            .iter()
            .rev()
            .take(Self::DEJA_VU_WINDOW)
            .map(|p| keyword_set(p))
            .filter(|p| p.len() >= Self::DEJA_VU_MIN_WORDS)
            .map(|p| text::overlap_ratio(words, &p))
            .fold(0.0, f64::max)
    }

    fn sub_signals(
        &self,
        text: &str,
        lower: &str,
        words: &BTreeSet<String>,
        closest: f64,
        context: &GateContext<'_>,
    ) -> SubSignals {
        let canned = self
            .knowledge
            .canned_openers
            .iter()
            .any(|c| lower.contains(c.as_str()));
        let originality = ((1.0 - closest - if canned { 0.4 } else { 0.0 })
            * (1.0 - 0.5 * context.trite.clamp(0.0, 1.0)))
        .clamp(0.0, 1.0);

        let platitudes = self
            .knowledge
            .platitudes
            .iter()
            .filter(|p| lower.contains(p.as_str()))
            .count();
        let hedges = HEDGES.find_iter(text).count();
        let authenticity = (1.0 - 0.25 * platitudes as f64 - 0.15 * hedges as f64).clamp(0.0, 1.0);

        let tokens = text::words(text);
        let variety = text::lexical_variety(&tokens);
        let craft = if text::is_real_sentence(text) {
            0.5 + 0.5 * variety
        } else {
            0.25 * variety
        };

        let stimulus_tokens = text::words(&context.stimulus.text);
        let questions = context.stimulus.text.matches('?').count();
        let challenge = (stimulus_tokens.len() as f64 / 30.0 + questions as f64 * 0.2).min(1.0);
        let structure = text.matches([',', ':', ';']).count().min(3);
        let skill = (tokens.len() as f64 / 40.0 + structure as f64 * 0.1).min(1.0);
        let earnestness = (1.0 - (skill - challenge).abs()).max(0.1);

        let stimulus_words = keyword_set(&context.stimulus.text);
        let reflection = if stimulus_words.is_empty() {
            0.5
        } else {
            (text::loose_overlap(words.iter(), &stimulus_words) as f64 / stimulus_words.len() as f64)
                .min(1.0)
        };

        SubSignals {
            originality,
            authenticity,
            craft,
            earnestness,
            reflection,
        }
    }
}

/// Same word three or more times in a row.
fn has_looped_word(tokens: &[String]) -> bool {
    tokens
        .windows(3)
        .any(|w| w[0] == w[1] && w[1] == w[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AntiPatternGate {
        AntiPatternGate::new(Arc::new(KnowledgeBase::builtin()))
    }

    fn context<'a>(stimulus: &'a Stimulus, prior: &'a [String]) -> GateContext<'a> {
        GateContext {
            stimulus,
            prior_outputs: prior,
            trite: 0.0,
        }
    }

    #[test]
    fn test_blacklisted_phrase_is_rejected() {
        let stimulus = Stimulus::new("how was your day");
        let result = gate().check("Honestly it was a copy of a copy.", &context(&stimulus, &[]));
        assert_eq!(
            result,
            Err(RejectReason::Blacklisted("copy of a copy".to_string()))
        );
    }

    #[test]
    fn test_autopilot_phrasing_is_rejected() {
        let stimulus = Stimulus::new("what is rain?");
        let gate = gate();
        assert!(matches!(
            gate.check("As an AI I find rain fascinating.", &context(&stimulus, &[])),
            Err(RejectReason::Autopilot(_))
        ));
        assert!(matches!(
            gate.check("Rain rain rain falls.", &context(&stimulus, &[])),
            Err(RejectReason::Autopilot("looped word"))
        ));
    }

    #[test]
    fn test_generic_filler_is_rejected() {
        let stimulus = Stimulus::new("tell me more");
        assert_eq!(
            gate().check("Yeah, stuff and things, whatever.", &context(&stimulus, &[])),
            Err(RejectReason::Filler)
        );
    }

    #[test]
    fn test_verbatim_repeat_is_rejected() {
        let stimulus = Stimulus::new("which is for sauces?");
        let prior = vec!["The fridge is the one for sauces.".to_string()];
        assert_eq!(
            gate().check("the fridge is the one for sauces", &context(&stimulus, &prior)),
            Err(RejectReason::VerbatimRepeat)
        );
    }

    #[test]
    fn test_deja_vu_is_rejected() {
        let stimulus = Stimulus::new("tell me about tides");
        let prior = vec!["Tides follow the moon and the ocean answers its gravity.".to_string()];
        let result = gate().check(
            "The ocean answers gravity, and tides follow the moon again.",
            &context(&stimulus, &prior),
        );
        assert!(matches!(result, Err(RejectReason::DejaVu { .. })));
    }

    #[test]
    fn test_deja_vu_only_looks_at_recent_window() {
        let stimulus = Stimulus::new("tell me about tides");
        let mut prior = vec!["Tides follow the moon and the ocean answers its gravity.".to_string()];
        for i in 0..AntiPatternGate::DEJA_VU_WINDOW {
            prior.push(format!("Unrelated note number {} about gardening soil.", i));
        }
        assert!(gate()
            .check(
                "The ocean answers gravity, and tides follow the moon again.",
                &context(&stimulus, &prior),
            )
            .is_ok());
    }

    #[test]
    fn test_sub_signals_are_bounded() {
        let stimulus = Stimulus::new("which of {washer, vaccine, fridge} is for sauces?");
        let signals = gate()
            .check("The fridge is the one for sauces.", &context(&stimulus, &[]))
            .unwrap();
        for value in signals.values() {
            assert!((0.0..=1.0).contains(&value), "{:?}", signals);
        }
        assert_eq!(signals.originality, 1.0);
        assert!((signals.reflection - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_canned_opener_and_trite_material_lower_originality() {
        let stimulus = Stimulus::new("why do tides rise?");
        let gate = gate();
        let fresh = gate
            .check("Tides rise because the moon pulls the water.", &context(&stimulus, &[]))
            .unwrap();
        let canned = gate
            .check(
                "The way I see it, tides rise because the moon pulls the water.",
                &GateContext {
                    trite: 1.0,
                    ..context(&stimulus, &[])
                },
            )
            .unwrap();
        assert!(canned.originality < fresh.originality);
        assert!((canned.originality - 0.3).abs() < 1e-9);
    }
}
