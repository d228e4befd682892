//! Candidate generation by depth.
//!
//! | Depth | Dimension      | Needs tokenizer | Source                                    |
//! |-------|----------------|-----------------|-------------------------------------------|
//! | 1     | Literal        | no              | restatement, option lexicon, definitions  |
//! | 2     | Context        | yes             | curiosity block, recent responses         |
//! | 3     | Idiom          | yes             | idiom table, kind membership              |
//! | 4     | Metaphor       | yes             | frame templates                           |
//! | 5     | CrossReference | yes             | knowledge snippets, lexicon, templates    |
//! | 6-9   | SelfReference, SystemFrame, Counterpoint, Synthesis | yes | frame templates |
//!
//! Every candidate past depth 1 is its base (the best survivor of the
//! previous depth, or the literal reading) plus exactly one new segment.
//! Attempt `k` proposes alternatives `3k..3k+3` of its depth as one batch;
//! running out of alternatives yields an empty list.
//!
//! Each segment records its [`SegmentOrigin`]. Template framing and bare
//! restatements of a question are marked [`SegmentOrigin::Template`] so they
//! can never count as an answer.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::collaborators::ParsedText;
use crate::knowledge::{render_frame, KnowledgeBase};
use crate::question::{QuestionFrame, QuestionType};
use crate::text::{self, capitalize, ensure_terminal, keyword_set};
use crate::types::{
    Candidate, CandidateId, ConversationContext, Dimension, Segment, SegmentOrigin, Stimulus,
};

/// Recent responses searched for contextual support.
const CONTEXT_WINDOW: usize = 5;

/// Alternatives proposed per attempt.
pub const BATCH_SIZE: usize = 3;

/// Everything a generator may look at for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub stimulus: &'a Stimulus,
    pub context: &'a ConversationContext,
    pub frame: &'a QuestionFrame,
    pub depth: u8,
    pub attempt: u8,
    /// Candidate to extend. Falls back to the literal reading.
    pub base: Option<&'a Candidate>,
    /// Tokenizer output, if the tokenizer answered.
    pub parsed: Option<&'a ParsedText>,
    /// Knowledge lookup snippets, empty if the lookup was unavailable.
    pub snippets: &'a [String],
}

/// Trait implemented by candidate sources.
pub trait CandidateGenerator: Send + Sync {
    /// Propose candidates for one attempt. An empty list is a generation failure.
    fn generate(&self, request: &GenerationRequest<'_>) -> Vec<Candidate>;
}

/// The built-in generator.
#[derive(Debug, Clone)]
pub struct LayeredGenerator {
    knowledge: Arc<KnowledgeBase>,
}

impl CandidateGenerator for LayeredGenerator {
    fn generate(&self, request: &GenerationRequest<'_>) -> Vec<Candidate> {
        match (request.depth, request.parsed) {
            (1, _) if request.attempt == 0 => vec![self.literal_reading(request, 1)],
            (1, _) => Vec::new(),
            (_, None) => Vec::new(),
            (2, Some(parsed)) => self.contextual(request, parsed),
            (3, Some(_)) => self.batch(request, self.structural(request)),
            (4..=9, Some(parsed)) => match Dimension::for_depth(request.depth) {
                Some(dimension) => self.batch(request, self.layered(request, dimension, parsed)),
                None => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}

impl LayeredGenerator {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }

    /// The context-free reading of the stimulus.
    pub fn literal_reading(&self, request: &GenerationRequest<'_>, depth: u8) -> Candidate {
        let frame = request.frame;
        let (origin, text) = match frame.kind {
            QuestionType::Choice => match self.pick_by_association(frame) {
                Some(option) => (SegmentOrigin::Knowledge, self.choice_reason(frame, option)),
                None => (
                    SegmentOrigin::Template,
                    "Taken at face value, the choice is still open.".to_string(),
                ),
            },
            QuestionType::Definition => {
                let subject = frame.subject.as_deref().unwrap_or("this");
                match self.knowledge.definitions.get(subject) {
                    Some(gloss) => (
                        SegmentOrigin::Knowledge,
                        format!("{} is {}.", capitalize(subject), gloss),
                    ),
                    None => (
                        SegmentOrigin::Template,
                        format!("{} is what is being asked about.", capitalize(subject)),
                    ),
                }
            }
            QuestionType::Explanation | QuestionType::Factual => (
                SegmentOrigin::Template,
                format!(
                    "Taken at face value, the question is: {}",
                    ensure_terminal(request.stimulus.text.trim())
                ),
            ),
            QuestionType::Open => (
                SegmentOrigin::Stimulus,
                ensure_terminal(&capitalize(request.stimulus.text.trim())),
            ),
        };

        Candidate {
            id: CandidateId::new(depth, request.attempt, 0),
            depth,
            attempt: request.attempt,
            added: Dimension::Literal,
            segments: vec![Segment {
                dimension: Dimension::Literal,
                origin,
                text,
            }],
            signals: None,
        }
    }

    /// The chosen option with the associations that tie it to the focus.
    fn choice_reason(&self, frame: &QuestionFrame, option: &str) -> String {
        let focus = frame.focus_keywords();
        let reasons: Vec<String> = self
            .knowledge
            .associations(option)
            .iter()
            .filter(|a| !focus.iter().any(|f| text::loosely_equal(a, f)))
            .take(2)
            .cloned()
            .collect();
        if reasons.is_empty() {
            format!("The {} is the one for {}.", option, focus_phrase(frame))
        } else {
            format!(
                "The {} is the one for {}, because it goes with {}.",
                option,
                focus_phrase(frame),
                text::join_natural(&reasons)
            )
        }
    }

    /// The option whose associations uniquely overlap the stimulus.
    fn pick_by_association<'f>(&self, frame: &'f QuestionFrame) -> Option<&'f str> {
        let focus: BTreeSet<String> = frame.focus_keywords().into_iter().collect();
        unique_best(frame.options.iter().map(|option| {
            let support = text::loose_overlap(self.knowledge.associations(option), &focus);
            (option.as_str(), support)
        }))
    }

    /// Depth 2: relate the stimulus to the curiosity block or earlier responses.
    fn contextual(&self, request: &GenerationRequest<'_>, parsed: &ParsedText) -> Vec<Candidate> {
        let mut salient: BTreeSet<String> = parsed.salient_tokens().into_iter().collect();
        salient.extend(request.frame.keywords.iter().cloned());

        let mut sources: Vec<String> = Vec::new();
        if let Some(curiosity) = &request.stimulus.curiosity {
            sources.push(curiosity.clone());
        }
        sources.extend(request.context.recent_outputs(CONTEXT_WINDOW).cloned());

        let topics: Vec<String> = sources
            .iter()
            .filter_map(|source| context_topic(source, &salient, request.frame))
            .collect();

        if topics.is_empty() {
            let mut unchanged = self.literal_reading(request, 2);
            return if request.attempt == 0 {
                unchanged.id = CandidateId::new(2, 0, 0);
                vec![unchanged]
            } else {
                Vec::new()
            };
        }

        let templates = self.knowledge.frames_for(Dimension::Context);
        if templates.is_empty() {
            return Vec::new();
        }
        let alternatives: Vec<Segment> = topics
            .iter()
            .enumerate()
            .map(|(i, topic)| Segment {
                dimension: Dimension::Context,
                origin: SegmentOrigin::Context,
                text: render_frame(&templates[i % templates.len()], topic),
            })
            .collect();
        self.batch(request, alternatives)
    }

    /// Depth 3: idioms and kind membership.
    fn structural(&self, request: &GenerationRequest<'_>) -> Vec<Segment> {
        let frame = request.frame;
        let mut alternatives: Vec<String> = self
            .knowledge
            .idioms
            .iter()
            .filter(|idiom| text::contains_phrase(&request.stimulus.text, &idiom.phrase))
            .map(|idiom| {
                format!(
                    "\"{}\" is the everyday way of saying {}, a pattern most people know.",
                    capitalize(&idiom.phrase),
                    idiom.meaning
                )
            })
            .collect();

        if frame.kind == QuestionType::Choice {
            if let Some((option, kind, members)) = self.pick_by_kind(frame) {
                alternatives.push(format!(
                    "By kind, the {} belongs with {}, and so does {}. That shared structure is the reason to choose it.",
                    option,
                    kind,
                    text::join_natural(&members)
                ));
            }
        } else {
            for keyword in &frame.keywords {
                if let Some(kind) = self.knowledge.category_of(keyword) {
                    let companions: Vec<String> = self.knowledge.categories[kind]
                        .iter()
                        .filter(|m| !text::loosely_equal(m, keyword))
                        .take(2)
                        .cloned()
                        .collect();
                    alternatives.push(format!(
                        "The word {} belongs with {}, alongside {}; that shared structure explains where it fits.",
                        keyword,
                        kind,
                        text::join_natural(&companions)
                    ));
                }
            }
        }

        alternatives
            .into_iter()
            .map(|text| Segment {
                dimension: Dimension::Idiom,
                origin: SegmentOrigin::Knowledge,
                text,
            })
            .collect()
    }

    /// The option that shares a kind with the stimulus focus words.
    fn pick_by_kind(&self, frame: &QuestionFrame) -> Option<(String, String, Vec<String>)> {
        let focus = frame.focus_keywords();
        let supported = frame.options.iter().map(|option| {
            let kind = self.knowledge.category_of(option);
            let members: Vec<&String> = focus
                .iter()
                .filter(|w| kind.is_some() && self.knowledge.category_of(w) == kind)
                .collect();
            (option.as_str(), members.len())
        });
        let option = unique_best(supported)?;
        let kind = self.knowledge.category_of(option)?.to_string();
        let members = focus
            .iter()
            .filter(|w| self.knowledge.category_of(w) == Some(kind.as_str()))
            .cloned()
            .collect();
        Some((option.to_string(), kind, members))
    }

    /// Depths 4 to 9: the frames of one dimension. Cross-reference puts
    /// looked-up snippets and lexicon associations ahead of its frames.
    fn layered(&self, request: &GenerationRequest<'_>, dimension: Dimension, parsed: &ParsedText) -> Vec<Segment> {
        let topic = layer_topic(request.frame, parsed);
        let mut alternatives = Vec::new();

        if dimension == Dimension::CrossReference {
            alternatives.extend(request.snippets.iter().map(|s| Segment {
                dimension,
                origin: SegmentOrigin::Knowledge,
                text: format!("Elsewhere, on {}: {}", topic, ensure_terminal(s.trim())),
            }));

            let associations: Vec<String> = text::words(&topic)
                .iter()
                .flat_map(|w| self.knowledge.associations(w).iter().take(3).cloned())
                .collect();
            if !associations.is_empty() {
                alternatives.push(Segment {
                    dimension,
                    origin: SegmentOrigin::Knowledge,
                    text: format!(
                        "{} also connects to {}.",
                        capitalize(&topic),
                        text::join_natural(&associations)
                    ),
                });
            }
        }

        alternatives.extend(self.knowledge.frames_for(dimension).iter().map(|t| Segment {
            dimension,
            origin: SegmentOrigin::Template,
            text: render_frame(t, &topic),
        }));
        alternatives
    }

    /// This attempt's share of `alternatives`, each extending the base.
    fn batch(&self, request: &GenerationRequest<'_>, alternatives: Vec<Segment>) -> Vec<Candidate> {
        alternatives
            .into_iter()
            .skip(usize::from(request.attempt) * BATCH_SIZE)
            .take(BATCH_SIZE)
            .enumerate()
            .map(|(index, segment)| self.extend(request, segment, index))
            .collect()
    }

    /// Base segments plus one new segment.
    fn extend(&self, request: &GenerationRequest<'_>, segment: Segment, index: usize) -> Candidate {
        let added = segment.dimension;
        let mut segments = match request.base {
            Some(base) => base.segments.clone(),
            None => self.literal_reading(request, 1).segments,
        };
        segments.push(segment);
        Candidate {
            id: CandidateId::new(request.depth, request.attempt, index),
            depth: request.depth,
            attempt: request.attempt,
            added,
            segments,
            signals: None,
        }
    }
}

/// Focus words of a choice stimulus as a phrase.
fn focus_phrase(frame: &QuestionFrame) -> String {
    let focus = frame.focus_keywords();
    if focus.is_empty() {
        "this".to_string()
    } else {
        focus.join(" ")
    }
}

/// Topic for a context segment: a word the source shares with the stimulus,
/// followed by up to two words only the source has.
fn context_topic(source: &str, salient: &BTreeSet<String>, frame: &QuestionFrame) -> Option<String> {
    let source_words = text::extract_keywords(source);
    let shared = source_words
        .iter()
        .find(|w| salient.iter().any(|s| text::loosely_equal(w, s)))?;
    let stimulus_words = keyword_set(&frame.keywords.join(" "));
    let extras = source_words
        .iter()
        .filter(|w| !stimulus_words.iter().any(|s| text::loosely_equal(w, s)))
        .filter(|w| !frame.options.contains(w))
        .take(2)
        .cloned();
    let words: Vec<String> = std::iter::once(shared.clone()).chain(extras).collect();
    Some(text::join_natural(&words))
}

/// Topic for depths 4 to 9, never naming a choice option.
fn layer_topic(frame: &QuestionFrame, parsed: &ParsedText) -> String {
    if let Some(subject) = &frame.subject {
        return subject.clone();
    }
    let words: Vec<String> = parsed
        .salient_tokens()
        .into_iter()
        .filter(|t| t.len() > 2 && !frame.options.iter().any(|o| text::contains_phrase(o, t)))
        .take(2)
        .collect();
    if words.is_empty() {
        frame.topic()
    } else {
        text::join_natural(&words)
    }
}

/// The single entry with the highest positive support.
fn unique_best<'a>(entries: impl Iterator<Item = (&'a str, usize)>) -> Option<&'a str> {
    let mut best: Option<(&str, usize)> = None;
    let mut tied = false;
    for (name, support) in entries {
        match best {
            _ if support == 0 => {}
            Some((_, top)) if support == top => tied = true,
            Some((_, top)) if support < top => {}
            _ => {
                best = Some((name, support));
                tied = false;
            }
        }
    }
    if tied {
        None
    } else {
        best.map(|(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{HeuristicTokenizer, Tokenizer};
    use crate::question::analyze;

    struct Fixture {
        stimulus: Stimulus,
        context: ConversationContext,
        frame: QuestionFrame,
        parsed: ParsedText,
    }

    impl Fixture {
        fn new(text: &str, prior: &[&str]) -> Self {
            let stimulus = Stimulus::new(text);
            let frame = analyze(&stimulus.text);
            let parsed = HeuristicTokenizer.parse(&stimulus.text).unwrap();
            Self {
                stimulus,
                context: ConversationContext::with_prior_outputs(
                    prior.iter().map(|s| s.to_string()).collect(),
                ),
                frame,
                parsed,
            }
        }

        fn request(&self, depth: u8, attempt: u8, tokenized: bool) -> GenerationRequest<'_> {
            GenerationRequest {
                stimulus: &self.stimulus,
                context: &self.context,
                frame: &self.frame,
                depth,
                attempt,
                base: None,
                parsed: tokenized.then_some(&self.parsed),
                snippets: &[],
            }
        }
    }

    fn generator() -> LayeredGenerator {
        LayeredGenerator::new(Arc::new(KnowledgeBase::builtin()))
    }

    #[test]
    fn test_literal_choice_uses_option_lexicon() {
        let fixture = Fixture::new("which of {washer, vaccine, fridge} is for sauces?", &[]);
        let candidates = generator().generate(&fixture.request(1, 0, false));
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].text(),
            "The fridge is the one for sauces, because it goes with food and cold."
        );
        assert_eq!(candidates[0].added, Dimension::Literal);
        assert_eq!(candidates[0].segments[0].origin, SegmentOrigin::Knowledge);
    }

    #[test]
    fn test_question_restatement_is_template() {
        let fixture = Fixture::new("Who wrote Hamlet?", &[]);
        let candidates = generator().generate(&fixture.request(1, 0, false));
        assert_eq!(candidates[0].segments[0].origin, SegmentOrigin::Template);
        assert!(candidates[0].answer_text().is_empty());
    }

    #[test]
    fn test_depth_one_needs_no_collaborators_and_only_one_attempt() {
        let fixture = Fixture::new("my week went sideways", &[]);
        let generator = generator();
        assert_eq!(generator.generate(&fixture.request(1, 0, false)).len(), 1);
        assert!(generator.generate(&fixture.request(1, 1, false)).is_empty());
        assert!(generator.generate(&fixture.request(3, 0, false)).is_empty());
    }

    #[test]
    fn test_literal_definition_from_tables() {
        let fixture = Fixture::new("what is entropy?", &[]);
        let candidates = generator().generate(&fixture.request(1, 0, false));
        assert!(candidates[0].text().starts_with("Entropy is the measure"));
    }

    #[test]
    fn test_context_without_signal_returns_literal_unchanged() {
        let fixture = Fixture::new("my week went sideways", &[]);
        let generator = generator();
        let literal = generator.generate(&fixture.request(1, 0, true));
        let unchanged = generator.generate(&fixture.request(2, 0, true));
        assert_eq!(unchanged.len(), 1);
        assert_eq!(unchanged[0].segments, literal[0].segments);
        assert_eq!(unchanged[0].added, Dimension::Literal);
        assert!(generator.generate(&fixture.request(2, 1, true)).is_empty());
    }

    #[test]
    fn test_context_segment_from_prior_output() {
        let fixture = Fixture::new(
            "the tides looked strange today",
            &["Tides follow the moon and its gravity."],
        );
        let candidates = generator().generate(&fixture.request(2, 0, true));
        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert_eq!(candidate.added, Dimension::Context);
        assert_eq!(candidate.segments.len(), 2);
        assert!(candidate.text().contains("tides, follow and moon"), "{}", candidate.text());
    }

    #[test]
    fn test_idiom_layer_adds_exactly_one_segment() {
        let fixture = Fixture::new("my week went sideways", &[]);
        let candidates = generator().generate(&fixture.request(3, 0, true));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].segments.len(), 2);
        assert_eq!(candidates[0].added, Dimension::Idiom);
        assert!(candidates[0].text().contains("\"Went sideways\" is the everyday way of saying"));
    }

    #[test]
    fn test_choice_by_kind_at_depth_three() {
        let fixture = Fixture::new("which of {washer, oven} goes with shirts?", &[]);
        let generator = generator();
        let literal = generator.generate(&fixture.request(1, 0, true));
        assert_eq!(literal[0].text(), "Taken at face value, the choice is still open.");
        let structural = generator.generate(&fixture.request(3, 0, true));
        assert!(structural[0]
            .text()
            .contains("By kind, the washer belongs with laundry, and so does shirts."));
    }

    #[test]
    fn test_deep_layers_extend_the_base() {
        let fixture = Fixture::new("my week went sideways", &[]);
        let generator = generator();
        let base = generator.generate(&fixture.request(3, 0, true)).remove(0);
        for depth in 4..=9u8 {
            let request = GenerationRequest {
                base: Some(&base),
                ..fixture.request(depth, 0, true)
            };
            let candidates = generator.generate(&request);
            assert!(!candidates.is_empty(), "depth {}", depth);
            for candidate in &candidates {
                assert_eq!(candidate.segments.len(), base.segments.len() + 1);
                assert_eq!(Some(candidate.added), Dimension::for_depth(depth));
            }
        }
    }

    #[test]
    fn test_attempt_proposes_a_batch_of_alternatives() {
        let fixture = Fixture::new("my week went sideways and the towels piled up", &[]);
        let generator = generator();
        let batch = generator.generate(&fixture.request(3, 0, true));
        assert_eq!(batch.len(), 2);
        assert_ne!(batch[0].id, batch[1].id);
        assert!(batch[0].text().contains("went wrong"));
        assert!(batch[1].text().contains("towels belongs with laundry"));
        assert!(batch.iter().all(|c| c.added == Dimension::Idiom));
        assert!(generator.generate(&fixture.request(3, 1, true)).is_empty());
    }

    #[test]
    fn test_later_attempts_take_the_next_alternatives() {
        let fixture = Fixture::new("how do tides work", &[]);
        let snippets: Vec<String> = (1..=4).map(|i| format!("Tide fact number {}", i)).collect();
        let generator = generator();
        let first = generator.generate(&GenerationRequest {
            snippets: &snippets,
            ..fixture.request(5, 0, true)
        });
        let second = generator.generate(&GenerationRequest {
            snippets: &snippets,
            ..fixture.request(5, 1, true)
        });
        assert_eq!(first.len(), BATCH_SIZE);
        assert!(first[2].text().ends_with("Tide fact number 3."));
        assert!(second[0].text().ends_with("Tide fact number 4."));
        assert_eq!(second[0].segments.last().unwrap().origin, SegmentOrigin::Knowledge);
        assert!(second
            .iter()
            .skip(1)
            .all(|c| c.segments.last().unwrap().origin == SegmentOrigin::Template));
    }

    #[test]
    fn test_cross_reference_prefers_snippets() {
        let fixture = Fixture::new("how do tides work", &[]);
        let snippets = vec!["Tidal ranges peak near the equinoxes".to_string()];
        let request = GenerationRequest {
            snippets: &snippets,
            ..fixture.request(5, 0, true)
        };
        let candidates = generator().generate(&request);
        assert!(candidates[0].text().contains("Tidal ranges peak near the equinoxes."));
    }

    #[test]
    fn test_attempts_past_the_alternatives_fail() {
        let fixture = Fixture::new("my week went sideways", &[]);
        let generator = generator();
        assert_eq!(generator.generate(&fixture.request(4, 0, true)).len(), 3);
        assert!(generator.generate(&fixture.request(4, 1, true)).is_empty());
    }

    #[test]
    fn test_unique_best_rejects_ties_and_zero() {
        assert_eq!(unique_best([("a", 1), ("b", 2)].into_iter()), Some("b"));
        assert_eq!(unique_best([("a", 2), ("b", 2)].into_iter()), None);
        assert_eq!(unique_best([("a", 0), ("b", 0)].into_iter()), None);
    }
}
