//! Question-type detection and the "directly answers" check.
//!
//! | Type        | Detected by                                   | Answered when the candidate...                |
//! |-------------|-----------------------------------------------|-----------------------------------------------|
//! | Choice      | a `{a, b, c}` option set or an `x or y` pair  | names exactly one option                      |
//! | Definition  | `what is`, `define`, `what does ... mean`     | names the term, uses a copula, adds content   |
//! | Explanation | leading `why` / `how`                         | gives a causal connective and adds content    |
//! | Factual     | other questions                               | is a sentence on topic that adds content      |
//! | Open        | everything else                               | stays on topic and adds content               |

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::text::{self, contains_phrase, is_echo_word, keyword_set, loose_overlap};

lazy_static! {
    static ref OPTION_SET: Regex = Regex::new(r"\{([^{}]+)\}").unwrap();

    static ref DEFINITION_LEAD: Regex = Regex::new(
        r"(?i)^\s*(?:what\s+is|what's|what\s+are|define|meaning\s+of|what\s+does)\s+(?:an?\s+|the\s+)?(.+?)(?:\s+mean)?\s*[?.!]*\s*$"
    ).unwrap();

    static ref EXPLANATION_LEAD: Regex = Regex::new(r"(?i)^\s*(?:why|how)\b").unwrap();

    static ref CAUSAL: Regex = Regex::new(
        r"(?i)\b(?:because|since|due to|so that|which means|that is how|leads to|results in|as a result|thanks to)\b"
    ).unwrap();

    static ref COPULA: Regex = Regex::new(r"(?i)\b(?:is|are|means|refers to|describes|stands for)\b").unwrap();
}

/// The shape of question a stimulus asks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Choice,
    Definition,
    Explanation,
    Factual,
    Open,
}

/// What the analyzer extracted from a stimulus.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionFrame {
    pub kind: QuestionType,
    /// Options for a choice question, lowercase, in stated order.
    pub options: Vec<String>,
    /// The term being defined, for definition questions.
    pub subject: Option<String>,
    /// Content words of the stimulus.
    pub keywords: Vec<String>,
}

impl QuestionFrame {
    /// Stimulus content words that are not choice options.
    pub fn focus_keywords(&self) -> Vec<String> {
        self.keywords
            .iter()
            .filter(|k| !self.options.iter().any(|o| contains_phrase(o, k)))
            .cloned()
            .collect()
    }

    /// A short phrase naming what the stimulus is about.
    pub fn topic(&self) -> String {
        if let Some(subject) = &self.subject {
            return subject.clone();
        }
        let focus = self.focus_keywords();
        if focus.is_empty() {
            "this".to_string()
        } else {
            focus.into_iter().take(3).collect::<Vec<_>>().join(" ")
        }
    }
}

/// Classify a stimulus and pull out the pieces the answer check needs.
pub fn analyze(stimulus: &str) -> QuestionFrame {
    let keywords = text::extract_keywords(stimulus);

    let options = extract_options(stimulus);
    if options.len() >= 2 {
        return QuestionFrame {
            kind: QuestionType::Choice,
            options,
            subject: None,
            keywords,
        };
    }

    if let Some(captures) = DEFINITION_LEAD.captures(stimulus) {
        let subject = captures[1].trim().to_lowercase();
        if !subject.is_empty() {
            return QuestionFrame {
                kind: QuestionType::Definition,
                options: Vec::new(),
                subject: Some(subject),
                keywords,
            };
        }
    }

    let kind = if EXPLANATION_LEAD.is_match(stimulus) {
        QuestionType::Explanation
    } else if stimulus.trim_end().ends_with('?') {
        QuestionType::Factual
    } else {
        QuestionType::Open
    };

    QuestionFrame {
        kind,
        options: Vec::new(),
        subject: None,
        keywords,
    }
}

/// Options from a brace set (`{a, b, c}`) or an `x or y` pair.
pub fn extract_options(stimulus: &str) -> Vec<String> {
    if let Some(captures) = OPTION_SET.captures(stimulus) {
        return dedup(
            captures[1]
                .split(',')
                .map(|o| text::words(o).join(" "))
                .filter(|o| !o.is_empty()),
        );
    }

    let lower = stimulus.to_lowercase();
    let Some((left, right)) = lower.split_once(" or ") else {
        return Vec::new();
    };

    let mut options: Vec<String> = left
        .split(',')
        .filter_map(|item| text::words(item).pop())
        .collect();
    if let Some(first) = text::words(right).into_iter().next() {
        options.push(first);
    }
    dedup(options.into_iter())
}

fn dedup(options: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    options.filter(|o| seen.insert(o.clone())).collect()
}

/// Whether `candidate` directly answers the question described by `frame`.
pub fn directly_answers(frame: &QuestionFrame, candidate: &str) -> bool {
    let candidate_words = keyword_set(candidate);
    let stimulus_words: BTreeSet<String> = frame.keywords.iter().cloned().collect();

    let on_topic = loose_overlap(candidate_words.iter(), &stimulus_words);
    let novel = candidate_words
        .iter()
        .filter(|w| !is_echo_word(w))
        .filter(|w| !stimulus_words.iter().any(|s| text::loosely_equal(w, s)))
        .count();

    match frame.kind {
        QuestionType::Choice => {
            frame
                .options
                .iter()
                .filter(|o| contains_phrase(candidate, o))
                .count()
                == 1
        }
        QuestionType::Definition => {
            frame
                .subject
                .as_deref()
                .is_some_and(|s| contains_phrase(candidate, s))
                && COPULA.is_match(candidate)
                && novel >= 2
        }
        QuestionType::Explanation => CAUSAL.is_match(candidate) && on_topic >= 1 && novel >= 2,
        QuestionType::Factual => on_topic >= 1 && novel >= 2 && text::is_real_sentence(candidate),
        QuestionType::Open => (stimulus_words.is_empty() || on_topic >= 1) && novel >= 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brace_options_make_a_choice() {
        let frame = analyze("which of {washer, vaccine, fridge} is for sauces?");
        assert_eq!(frame.kind, QuestionType::Choice);
        assert_eq!(frame.options, vec!["washer", "vaccine", "fridge"]);
        assert_eq!(frame.focus_keywords(), vec!["sauces"]);
    }

    #[test]
    fn test_or_pair_makes_a_choice() {
        let frame = analyze("Tea or coffee?");
        assert_eq!(frame.kind, QuestionType::Choice);
        assert_eq!(frame.options, vec!["tea", "coffee"]);
    }

    #[test]
    fn test_definition_subject_extraction() {
        let frame = analyze("What does break the ice mean?");
        assert_eq!(frame.kind, QuestionType::Definition);
        assert_eq!(frame.subject.as_deref(), Some("break the ice"));

        let frame = analyze("what is an idiom?");
        assert_eq!(frame.subject.as_deref(), Some("idiom"));

        let frame = analyze("Define entropy");
        assert_eq!(frame.subject.as_deref(), Some("entropy"));
    }

    #[test]
    fn test_explanation_factual_and_open() {
        assert_eq!(analyze("Why is the sky blue?").kind, QuestionType::Explanation);
        assert_eq!(analyze("how do tides work").kind, QuestionType::Explanation);
        assert_eq!(analyze("Who wrote Hamlet?").kind, QuestionType::Factual);
        assert_eq!(analyze("my week went sideways").kind, QuestionType::Open);
    }

    #[test]
    fn test_choice_answer_names_exactly_one_option() {
        let frame = analyze("which of {washer, vaccine, fridge} is for sauces?");
        assert!(directly_answers(&frame, "The fridge is the one for sauces."));
        assert!(!directly_answers(&frame, "Either the fridge or the washer."));
        assert!(!directly_answers(&frame, "Sauces go somewhere cold."));
    }

    #[test]
    fn test_definition_answer_needs_term_copula_and_content() {
        let frame = analyze("what is entropy?");
        assert!(directly_answers(
            &frame,
            "Entropy is the measure of how spread out energy is in a system."
        ));
        assert!(!directly_answers(&frame, "Entropy is what is being asked."));
        assert!(!directly_answers(&frame, "Energy spreads out over time."));
    }

    #[test]
    fn test_explanation_answer_needs_causal_connective() {
        let frame = analyze("why do tides rise?");
        assert!(directly_answers(
            &frame,
            "Tides rise because the moon's gravity pulls ocean water toward it."
        ));
        assert!(!directly_answers(&frame, "Tides rise and fall every day near coastlines."));
    }

    #[test]
    fn test_open_restatement_does_not_answer() {
        let frame = analyze("my week went sideways");
        assert!(!directly_answers(&frame, "My week went sideways."));
        assert!(directly_answers(
            &frame,
            "My week went sideways, which usually means plans fell apart somewhere."
        ));
    }
}
