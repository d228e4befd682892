//! Word-level helpers shared by the question analyzer, gate, scorer and selector.
//!
//! Everything here is lowercase-insensitive and allocation-light. Matching is
//! lexical: a "content word" is any token longer than two characters that is
//! not a stopword.

use lazy_static::lazy_static;
use std::collections::{BTreeSet, HashSet};

lazy_static! {
    /// Common English stopwords that carry no interpretive content.
    static ref STOPWORDS: HashSet<&'static str> = {
        let words = [
            // Articles
            "a", "an", "the",
            // Prepositions
            "about", "above", "across", "after", "against", "along", "among", "around",
            "at", "before", "behind", "below", "beneath", "beside", "between", "beyond",
            "by", "down", "during", "except", "for", "from", "in", "inside", "into",
            "near", "of", "off", "on", "onto", "out", "outside", "over", "past",
            "through", "to", "toward", "under", "until", "up", "upon", "with", "within", "without",
            // Conjunctions
            "and", "but", "or", "nor", "so", "yet", "both", "either", "neither",
            // Pronouns
            "i", "me", "my", "myself", "we", "our", "ours", "ourselves",
            "you", "your", "yours", "yourself", "yourselves",
            "he", "him", "his", "himself", "she", "her", "hers", "herself",
            "it", "its", "itself", "they", "them", "their", "theirs", "themselves",
            "what", "which", "who", "whom", "this", "that", "these", "those",
            // Auxiliaries
            "is", "are", "was", "were", "be", "been", "being",
            "have", "has", "had", "having", "do", "does", "did", "doing",
            "can", "could", "shall", "should", "will", "would", "may", "might", "must",
            // Other common words
            "all", "any", "each", "every", "few", "more", "most", "other", "some", "such",
            "no", "not", "only", "own", "same", "than", "too", "very", "one",
            "just", "also", "now", "here", "there", "when", "where", "why", "how",
        ];
        words.into_iter().collect()
    };

    /// Words a restatement uses to frame the stimulus. They never count as new
    /// content when judging whether a candidate answers anything.
    static ref ECHO_WORDS: HashSet<&'static str> = {
        let words = [
            "taken", "face", "value", "question", "asked", "asking", "plainly",
            "literally", "reading", "stated", "choice", "options", "still", "open",
            "earlier", "thread", "picks", "talk", "turned", "continues", "came", "builds",
        ];
        words.into_iter().collect()
    };

    /// Verbs that mark a word run as a sentence rather than a fragment.
    static ref SENTENCE_VERBS: HashSet<&'static str> = {
        let words = [
            "is", "are", "was", "were", "be", "has", "have", "had", "does", "do", "did",
            "means", "works", "keeps", "points", "holds", "belongs", "sits", "runs",
            "fits", "matters", "shows", "turns", "changes", "connects", "touches",
            "can", "will", "would", "could", "should",
        ];
        words.into_iter().collect()
    };
}

/// Split text into lowercase alphanumeric tokens.
pub fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

/// Extract content words in order of first appearance, without duplicates.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    words(text)
        .into_iter()
        .filter(|word| word.len() > 2 && !STOPWORDS.contains(word.as_str()))
        .filter(|word| seen.insert(word.clone()))
        .collect()
}

/// Content words as an ordered set.
pub fn keyword_set(text: &str) -> BTreeSet<String> {
    extract_keywords(text).into_iter().collect()
}

/// Whether `word` is part of the restatement vocabulary.
pub fn is_echo_word(word: &str) -> bool {
    ECHO_WORDS.contains(word)
}

/// Equality that tolerates simple inflection ("sauce" vs "sauces").
pub fn loosely_equal(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() >= 4 && long.len() - short.len() <= 2 && long.starts_with(short)
}

/// Count words in `words` that loosely match any word in `against`.
pub fn loose_overlap<'a, I>(words: I, against: &BTreeSet<String>) -> usize
where
    I: IntoIterator<Item = &'a String>,
{
    words
        .into_iter()
        .filter(|w| against.iter().any(|o| loosely_equal(w, o)))
        .count()
}

/// Shared words divided by the size of the smaller set.
pub fn overlap_ratio(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / smaller as f64
}

/// Jaccard similarity of two word sets.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Whether `phrase` appears in `text` on word boundaries.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let needle = words(phrase).join(" ");
    if needle.is_empty() {
        return false;
    }
    let haystack = format!(" {} ", words(text).join(" "));
    haystack.contains(&format!(" {} ", needle))
}

/// Lowercase, collapse whitespace and drop trailing punctuation so that two
/// renderings of the same sentence compare equal.
pub fn normalize(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase()
}

/// Uppercase the first character.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Append a period unless the text already ends a sentence.
pub fn ensure_terminal(text: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.ends_with(['.', '!', '?', '"']) {
        trimmed.to_string()
    } else {
        format!("{}.", trimmed)
    }
}

/// Join words as a list: "a", "a and b", "a, b and c".
pub fn join_natural(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// The text up to and including the first sentence terminator.
pub fn first_sentence(text: &str) -> &str {
    let trimmed = text.trim();
    let mut chars = trimmed.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_break = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_break {
                return &trimmed[..idx + c.len_utf8()];
            }
        }
    }
    trimmed
}

/// A rough test for a complete sentence: enough words, a verb, and not a
/// word salad of repeats.
pub fn is_real_sentence(text: &str) -> bool {
    let tokens = words(text);
    if tokens.len() < 4 {
        return false;
    }
    let has_verb = tokens.iter().any(|w| {
        SENTENCE_VERBS.contains(w.as_str())
            || (w.len() > 4 && (w.ends_with("ing") || w.ends_with("ed")))
    });
    has_verb && lexical_variety(&tokens) >= 0.5
}

/// Unique tokens over total tokens.
pub fn lexical_variety(tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let unique: HashSet<&String> = tokens.iter().collect();
    unique.len() as f64 / tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_keywords_drops_stopwords_and_duplicates() {
        let keywords = extract_keywords("Which of the washer or the fridge is for the washer?");
        assert_eq!(keywords, vec!["washer", "fridge"]);
    }

    #[test]
    fn test_loosely_equal_handles_plurals() {
        assert!(loosely_equal("sauce", "sauces"));
        assert!(loosely_equal("sauces", "sauce"));
        assert!(!loosely_equal("cat", "cats"));
        assert!(!loosely_equal("wash", "washington"));
    }

    #[test]
    fn test_contains_phrase_respects_word_boundaries() {
        assert!(contains_phrase("The fridge is cold.", "fridge"));
        assert!(!contains_phrase("The refridge is cold.", "fridge"));
        assert!(contains_phrase("Time to break the ice, then.", "break the ice"));
    }

    #[test]
    fn test_normalize_ignores_case_spacing_and_terminal_punctuation() {
        assert_eq!(normalize("  The Fridge   is cold. "), normalize("the fridge is cold"));
    }

    #[test]
    fn test_first_sentence() {
        assert_eq!(first_sentence("One thing. Another thing."), "One thing.");
        assert_eq!(first_sentence("Version 2.5 ships today. Later more."), "Version 2.5 ships today.");
        assert_eq!(first_sentence("no terminator"), "no terminator");
    }

    #[test]
    fn test_overlap_ratio_uses_smaller_set() {
        let a = keyword_set("fridge sauce cold");
        let b = keyword_set("fridge sauce cold storage kitchen leftovers");
        assert!((overlap_ratio(&a, &b) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_is_real_sentence() {
        assert!(is_real_sentence("The fridge is the one for sauces."));
        assert!(!is_real_sentence("sauces sauces"));
        assert!(!is_real_sentence("cold cold cold cold cold is"));
    }
}
