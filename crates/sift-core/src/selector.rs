//! Final selection.
//!
//! The selector turns the controller's finalists into one response, and
//! produces the courtesy exit when there are none.
//!
//! ## Selection Rules
//!
//! | Condition                                         | Result                    |
//! |---------------------------------------------------|---------------------------|
//! | one finalist                                      | emitted verbatim          |
//! | leading finalist meets 4+ categories              | emitted verbatim          |
//! | disclosure `taste`                                | leading finalist, one sentence |
//! | otherwise                                         | merged by dimension       |
//!
//! Taste takes the first sentence of the leader's deepest non-template
//! segment. Merging keeps each dimension in order: every finalist's own
//! added layer for it, else the shared segment once from the best finalist
//! carrying it.
//!
//! Filler phrases are stripped afterwards unless the context asks for precision.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::controller::ranking;
use crate::text::{self, first_sentence, normalize};
use crate::types::{
    CandidateId, ConversationContext, DisclosureLevel, Dimension, PriorityScore, ScoredCandidate,
    SegmentOrigin,
};

/// Holding responses used when nothing qualifies.
pub const COURTESY_EXITS: [&str; 6] = [
    "Still turning this one over. What part matters most here?",
    "Holding on that for a moment. What would make it clearer?",
    "Not landing on a good reading of that yet. Could it be put another way?",
    "That one needs another angle. What is the main thing to get across?",
    "Pausing on this. Which part should come first?",
    "Nothing solid on that yet. What detail would help most?",
];

lazy_static! {
    static ref FILLER_PHRASES: Regex = Regex::new(
        r"(?i)\b(?:basically|essentially|actually|you know|i mean|sort of|kind of|additionally|furthermore|moreover)\b,?\s*"
    ).unwrap();

    static ref SPACE_BEFORE_PUNCT: Regex = Regex::new(r"\s+([.,;:!?])").unwrap();

    static ref MULTISPACE: Regex = Regex::new(r"\s{2,}").unwrap();

    /// Words a courtesy exit must never contain.
    static ref ADDRESSING_WORDS: HashSet<&'static str> = [
        "you", "your", "yours", "yourself", "he", "him", "his", "she", "her", "hers",
        "they", "them", "their", "theirs", "we", "us", "why",
    ]
    .into_iter()
    .collect();
}

/// A chosen response.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub text: String,
    /// Shallowest contributing depth.
    pub depth: u8,
    pub blended: bool,
    pub contributors: Vec<CandidateId>,
    /// Score of the leading finalist.
    pub score: PriorityScore,
}

/// Chooses or merges finalists.
#[derive(Debug, Clone, Copy, Default)]
pub struct Selector;

impl Selector {
    /// Met categories at which the leading finalist is emitted as-is.
    pub const COMPRESSION_MIN_CATEGORIES: usize = 4;

    /// Shortest text filler stripping may leave behind.
    pub const MIN_TRIMMED_CHARS: usize = 5;

    /// Build the response from `finalists`. `None` when there are none.
    pub fn select(
        &self,
        mut finalists: Vec<ScoredCandidate>,
        context: &ConversationContext,
    ) -> Option<Selection> {
        finalists.sort_by(ranking);
        let anchor = finalists.first()?.clone();

        let mut selection = if context.disclosure == DisclosureLevel::Taste {
            let segments = &anchor.candidate.segments;
            let deepest = segments
                .iter()
                .rev()
                .find(|s| s.origin != SegmentOrigin::Template)
                .or_else(|| segments.last())
                .map(|s| s.text.as_str())
                .unwrap_or_default();
            Selection {
                text: first_sentence(deepest).to_string(),
                depth: anchor.candidate.depth,
                blended: false,
                contributors: vec![anchor.candidate.id],
                score: anchor.score.clone(),
            }
        } else if finalists.len() == 1
            || anchor.score.met_count >= Self::COMPRESSION_MIN_CATEGORIES
        {
            Selection {
                text: anchor.candidate.text(),
                depth: anchor.candidate.depth,
                blended: false,
                contributors: vec![anchor.candidate.id],
                score: anchor.score.clone(),
            }
        } else {
            finalists.truncate(context.disclosure.blend_limit());
            merge(&finalists)
        };

        if !context.precision {
            selection.text = trim_filler(&selection.text);
        }
        Some(selection)
    }

    /// A neutral holding response that does not repeat a recent one.
    pub fn courtesy_exit(&self, prior_outputs: &[String]) -> String {
        let used: Vec<String> = prior_outputs.iter().map(|p| normalize(p)).collect();
        let start = COURTESY_EXITS
            .iter()
            .filter(|v| used.contains(&normalize(v)))
            .count()
            % COURTESY_EXITS.len();

        let recent: Vec<&String> = used.iter().rev().take(COURTESY_EXITS.len() - 1).collect();
        (0..COURTESY_EXITS.len())
            .map(|i| COURTESY_EXITS[(start + i) % COURTESY_EXITS.len()])
            .find(|v| !recent.contains(&&normalize(v)))
            .unwrap_or(COURTESY_EXITS[start])
            .to_string()
    }
}

/// Merge finalists (best first) dimension by dimension.
///
/// A finalist's added segment is its own contribution and is kept for every
/// finalist that added the dimension, skipping repeated text. Segments a
/// finalist inherited from its base are shared and appear once, from the
/// best finalist carrying them.
fn merge(finalists: &[ScoredCandidate]) -> Selection {
    let mut segments: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut contributors: Vec<CandidateId> = Vec::new();
    let mut depth = u8::MAX;

    let mut take = |finalist: &ScoredCandidate, text: &str| {
        if !seen.insert(normalize(text)) {
            return;
        }
        segments.push(text.trim().to_string());
        if !contributors.contains(&finalist.candidate.id) {
            contributors.push(finalist.candidate.id);
            depth = depth.min(finalist.candidate.depth);
        }
    };

    for dimension in Dimension::ALL {
        let own: Vec<_> = finalists
            .iter()
            .filter(|f| f.candidate.added == dimension)
            .filter_map(|f| f.candidate.segments.last().map(|s| (f, s)))
            .filter(|(_, s)| s.dimension == dimension)
            .collect();

        if own.is_empty() {
            let shared = finalists.iter().find_map(|f| {
                f.candidate
                    .segments
                    .iter()
                    .find(|s| s.dimension == dimension)
                    .map(|s| (f, s))
            });
            if let Some((finalist, segment)) = shared {
                take(finalist, &segment.text);
            }
        } else {
            for (finalist, segment) in own {
                take(finalist, &segment.text);
            }
        }
    }

    let score = finalists
        .first()
        .map(|f| f.score.clone())
        .unwrap_or(PriorityScore {
            categories: Vec::new(),
            aggregate: 0.0,
            met_count: 0,
        });
    Selection {
        text: segments.join(" "),
        depth: if depth == u8::MAX { 0 } else { depth },
        blended: contributors.len() > 1,
        contributors,
        score,
    }
}

/// Strip filler phrases. Text that would shrink below
/// [`Selector::MIN_TRIMMED_CHARS`] is returned unchanged.
pub fn trim_filler(input: &str) -> String {
    let stripped = FILLER_PHRASES.replace_all(input, "");
    let stripped = SPACE_BEFORE_PUNCT.replace_all(&stripped, "$1");
    let stripped = MULTISPACE.replace_all(&stripped, " ");
    let trimmed = stripped.trim();
    if trimmed.chars().count() < Selector::MIN_TRIMMED_CHARS {
        return input.to_string();
    }

    let mut out = String::with_capacity(trimmed.len());
    let mut at_start = true;
    for c in trimmed.chars() {
        if at_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
            at_start = false;
        } else {
            out.push(c);
            if matches!(c, '.' | '!' | '?') {
                at_start = true;
            } else if !c.is_whitespace() {
                at_start = false;
            }
        }
    }
    out
}

/// Whether `text` avoids addressing or accusing anyone.
pub fn is_neutral(text: &str) -> bool {
    text::words(text)
        .iter()
        .all(|w| !ADDRESSING_WORDS.contains(w.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Candidate, Segment};

    fn finalist(id: u32, depth: u8, aggregate: f64, met_count: usize, segments: &[(Dimension, &str)]) -> ScoredCandidate {
        let with_origin: Vec<(Dimension, SegmentOrigin, &str)> = segments
            .iter()
            .map(|(dimension, text)| (*dimension, SegmentOrigin::Knowledge, *text))
            .collect();
        finalist_with_origins(id, depth, aggregate, met_count, &with_origin)
    }

    fn finalist_with_origins(
        id: u32,
        depth: u8,
        aggregate: f64,
        met_count: usize,
        segments: &[(Dimension, SegmentOrigin, &str)],
    ) -> ScoredCandidate {
        ScoredCandidate {
            candidate: Candidate {
                id: CandidateId(id),
                depth,
                attempt: 0,
                added: segments.last().map(|s| s.0).unwrap_or(Dimension::Literal),
                segments: segments
                    .iter()
                    .map(|(dimension, origin, text)| Segment {
                        dimension: *dimension,
                        origin: *origin,
                        text: text.to_string(),
                    })
                    .collect(),
                signals: None,
            },
            score: PriorityScore {
                categories: Vec::new(),
                aggregate,
                met_count,
            },
            answers: true,
        }
    }

    #[test]
    fn test_single_finalist_is_verbatim() {
        let selection = Selector
            .select(
                vec![finalist(1, 1, 0.9, 0, &[(Dimension::Literal, "The fridge is the one for sauces.")])],
                &ConversationContext::default(),
            )
            .unwrap();
        assert_eq!(selection.text, "The fridge is the one for sauces.");
        assert!(!selection.blended);
    }

    #[test]
    fn test_no_finalists_selects_nothing() {
        assert!(Selector.select(Vec::new(), &ConversationContext::default()).is_none());
    }

    #[test]
    fn test_compression_emits_leader_verbatim() {
        let leader = finalist(1, 3, 2.0, 4, &[(Dimension::Literal, "Base."), (Dimension::Idiom, "Idiom reading.")]);
        let other = finalist(2, 3, 1.0, 1, &[(Dimension::Literal, "Other base."), (Dimension::Context, "Context note.")]);
        let selection = Selector
            .select(vec![other, leader], &ConversationContext::default())
            .unwrap();
        assert_eq!(selection.text, "Base. Idiom reading.");
        assert_eq!(selection.contributors, vec![CandidateId(1)]);
    }

    #[test]
    fn test_merge_shares_the_base_once_and_orders_by_dimension() {
        let leader = finalist(1, 3, 2.0, 1, &[(Dimension::Literal, "Base."), (Dimension::Idiom, "Idiom reading.")]);
        let other = finalist(2, 3, 1.0, 1, &[(Dimension::Literal, "Other base."), (Dimension::Context, "Context note.")]);
        let selection = Selector
            .select(vec![other, leader], &ConversationContext::default())
            .unwrap();
        assert_eq!(selection.text, "Base. Context note. Idiom reading.");
        assert!(selection.blended);
        assert_eq!(selection.contributors, vec![CandidateId(1), CandidateId(2)]);
        assert_eq!(selection.score.aggregate, 2.0);
    }

    #[test]
    fn test_taste_disclosure_is_one_sentence_of_the_deepest_layer() {
        let leader = finalist(
            1,
            3,
            2.0,
            1,
            &[(Dimension::Literal, "My week went sideways."), (Dimension::Idiom, "That means plans slipped. More detail.")],
        );
        let context = ConversationContext {
            disclosure: DisclosureLevel::Taste,
            ..ConversationContext::default()
        };
        let selection = Selector.select(vec![leader], &context).unwrap();
        assert_eq!(selection.text, "That means plans slipped.");
    }

    #[test]
    fn test_taste_skips_template_framing() {
        let leader = finalist_with_origins(
            1,
            5,
            2.0,
            1,
            &[
                (Dimension::Literal, SegmentOrigin::Template, "Taken at face value, the question is: When do tides turn?"),
                (Dimension::Metaphor, SegmentOrigin::Template, "Think of tides as a map."),
                (Dimension::CrossReference, SegmentOrigin::Knowledge, "Tides follow the moon. Twice a day."),
            ],
        );
        let context = ConversationContext {
            disclosure: DisclosureLevel::Taste,
            ..ConversationContext::default()
        };
        let selection = Selector.select(vec![leader], &context).unwrap();
        assert_eq!(selection.text, "Tides follow the moon.");
    }

    #[test]
    fn test_merge_keeps_each_finalists_own_layer() {
        let leader = finalist(1, 3, 2.0, 2, &[(Dimension::Literal, "My week went sideways."), (Dimension::Idiom, "Idiom reading.")]);
        let other = finalist(2, 3, 1.5, 1, &[(Dimension::Literal, "My week went sideways."), (Dimension::Idiom, "Kind reading.")]);
        let third = finalist(3, 3, 1.0, 1, &[(Dimension::Literal, "My week went sideways."), (Dimension::Idiom, "Third reading.")]);
        let open = ConversationContext {
            disclosure: DisclosureLevel::Open,
            ..ConversationContext::default()
        };

        let selection = Selector
            .select(vec![third.clone(), other.clone(), leader.clone()], &open)
            .unwrap();
        assert_eq!(selection.text, "My week went sideways. Idiom reading. Kind reading.");
        assert_eq!(selection.contributors, vec![CandidateId(1), CandidateId(2)]);
        assert!(selection.blended);

        let full = ConversationContext {
            disclosure: DisclosureLevel::Full,
            ..ConversationContext::default()
        };
        let selection = Selector.select(vec![third, other, leader], &full).unwrap();
        assert_eq!(
            selection.text,
            "My week went sideways. Idiom reading. Kind reading. Third reading."
        );
        assert_eq!(selection.contributors.len(), 3);
    }

    #[test]
    fn test_trim_filler() {
        assert_eq!(
            trim_filler("Basically, the fridge is sort of the one for sauces."),
            "The fridge is the one for sauces."
        );
        assert_eq!(trim_filler("Basically."), "Basically.");
    }

    #[test]
    fn test_precision_skips_trimming() {
        let context = ConversationContext {
            precision: true,
            ..ConversationContext::default()
        };
        let selection = Selector
            .select(
                vec![finalist(1, 1, 0.9, 0, &[(Dimension::Literal, "Basically, sauces go cold.")])],
                &context,
            )
            .unwrap();
        assert_eq!(selection.text, "Basically, sauces go cold.");
    }

    #[test]
    fn test_courtesy_exits_are_neutral() {
        for variant in COURTESY_EXITS {
            assert!(is_neutral(variant), "{}", variant);
        }
        assert!(!is_neutral("Why would you say that?"));
    }

    #[test]
    fn test_courtesy_exit_rotates_past_used_variants() {
        let first = Selector.courtesy_exit(&[]);
        let second = Selector.courtesy_exit(&[first.clone()]);
        let third = Selector.courtesy_exit(&[first.clone(), second.clone()]);
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_ne!(first, third);
    }
}
