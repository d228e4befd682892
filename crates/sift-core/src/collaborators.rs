//! External collaborators and bounded calls into them.
//!
//! The engine consults two optional services: a [`Tokenizer`] for structure
//! (subject, object, focus, tense) and a [`KnowledgeLookup`] for topic
//! snippets. Both are synchronous traits; every call runs on a helper thread
//! and is abandoned once its timeout (capped by the remaining latency budget)
//! elapses. A slow collaborator therefore costs at most its bound.
//!
//! [`TableLookup`] answers lookups from the snippet table of a
//! [`KnowledgeBase`] without leaving the process.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::knowledge::KnowledgeBase;
use crate::text;

/// Errors a collaborator call can end in.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator failed: {0}")]
    Failed(String),

    #[error("Collaborator thread ended without answering")]
    Disconnected,
}

/// Coarse tense of a stimulus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemporalBucket {
    Past,
    Present,
    Future,
    Timeless,
}

/// Structure a tokenizer extracts from text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParsedText {
    pub subject_tokens: Vec<String>,
    pub object_tokens: Vec<String>,
    pub focus_tokens: Vec<String>,
    pub temporal_bucket: Option<TemporalBucket>,
}

impl ParsedText {
    /// Every token the parse marked as meaningful, without duplicates.
    pub fn salient_tokens(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.subject_tokens
            .iter()
            .chain(&self.object_tokens)
            .chain(&self.focus_tokens)
            .map(|t| t.to_lowercase())
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }
}

/// Structural parsing service.
pub trait Tokenizer: Send + Sync {
    fn parse(&self, text: &str) -> Result<ParsedText, CollaboratorError>;
}

/// Topic snippet service.
pub trait KnowledgeLookup: Send + Sync {
    fn lookup(&self, topic_keys: &[String]) -> Result<Vec<String>, CollaboratorError>;
}

/// Knowledge lookup over the snippet table.
///
/// Keys are matched in order; each distinct snippet is returned once, up to
/// [`TableLookup::MAX_SNIPPETS`].
#[derive(Debug, Clone)]
pub struct TableLookup {
    knowledge: Arc<KnowledgeBase>,
}

impl TableLookup {
    pub const MAX_SNIPPETS: usize = 5;

    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }
}

impl KnowledgeLookup for TableLookup {
    fn lookup(&self, topic_keys: &[String]) -> Result<Vec<String>, CollaboratorError> {
        let mut seen = HashSet::new();
        let snippets = topic_keys
            .iter()
            .flat_map(|key| self.knowledge.snippets_for(key).iter())
            .filter(|s| seen.insert(text::normalize(s)))
            .take(Self::MAX_SNIPPETS)
            .cloned()
            .collect();
        Ok(snippets)
    }
}

/// Per-collaborator call timeouts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollaboratorTimeouts {
    pub tokenizer: Duration,
    pub knowledge: Duration,
}

impl Default for CollaboratorTimeouts {
    fn default() -> Self {
        Self {
            tokenizer: Duration::from_millis(50),
            knowledge: Duration::from_millis(80),
        }
    }
}

/// The collaborators available to an engine.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub tokenizer: Option<Arc<dyn Tokenizer>>,
    pub knowledge: Option<Arc<dyn KnowledgeLookup>>,
    pub timeouts: CollaboratorTimeouts,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("tokenizer", &self.tokenizer.is_some())
            .field("knowledge", &self.knowledge.is_some())
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl Collaborators {
    /// Parse `text`, bounded by `limit`.
    pub fn parse(&self, text: &str, limit: Duration) -> Result<ParsedText, CollaboratorError> {
        let tokenizer = self
            .tokenizer
            .clone()
            .ok_or_else(|| CollaboratorError::Unavailable("no tokenizer configured".into()))?;
        let text = text.to_string();
        call_bounded(self.timeouts.tokenizer.min(limit), move || {
            tokenizer.parse(&text)
        })
    }

    /// Look up snippets for `keys`, bounded by `limit`.
    pub fn lookup(&self, keys: &[String], limit: Duration) -> Result<Vec<String>, CollaboratorError> {
        let knowledge = self
            .knowledge
            .clone()
            .ok_or_else(|| CollaboratorError::Unavailable("no knowledge lookup configured".into()))?;
        let keys = keys.to_vec();
        call_bounded(self.timeouts.knowledge.min(limit), move || {
            knowledge.lookup(&keys)
        })
    }
}

/// Run `call` on a helper thread and wait at most `timeout` for it.
///
/// A zero timeout fails without starting the call. A call that outlives its
/// timeout keeps running detached; its answer is dropped.
pub fn call_bounded<T, F>(timeout: Duration, call: F) -> Result<T, CollaboratorError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CollaboratorError> + Send + 'static,
{
    if timeout.is_zero() {
        return Err(CollaboratorError::Timeout(timeout));
    }

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("sift-collaborator".into())
        .spawn(move || {
            let _ = tx.send(call());
        })
        .map_err(|e| CollaboratorError::Failed(format!("could not start call: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(CollaboratorError::Timeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(CollaboratorError::Disconnected),
    }
}

lazy_static! {
    static ref PAST_MARKERS: HashSet<&'static str> =
        ["was", "were", "did", "had", "went", "yesterday", "ago", "used", "last"].into_iter().collect();
    static ref FUTURE_MARKERS: HashSet<&'static str> =
        ["will", "tomorrow", "next", "soon", "gonna", "shall"].into_iter().collect();
    static ref PRESENT_MARKERS: HashSet<&'static str> =
        ["is", "are", "am", "now", "today", "currently"].into_iter().collect();
    static ref LINKING_VERBS: HashSet<&'static str> = [
        "is", "are", "was", "were", "went", "goes", "go", "has", "have", "had", "does", "do",
        "did", "feels", "felt", "seems", "became", "becomes", "means",
    ]
    .into_iter()
    .collect();
}

/// Local word-based tokenizer.
///
/// No model behind it: the subject is the first content word, objects are the
/// content words after the first linking verb, and tense comes from marker
/// words. Always available and always fast.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl Tokenizer for HeuristicTokenizer {
    fn parse(&self, input: &str) -> Result<ParsedText, CollaboratorError> {
        let tokens = text::words(input);
        let focus_tokens = text::extract_keywords(input);

        let subject_tokens = focus_tokens.first().cloned().into_iter().collect();

        let object_tokens = match tokens.iter().position(|t| LINKING_VERBS.contains(t.as_str())) {
            Some(verb) => text::extract_keywords(&tokens[verb + 1..].join(" ")),
            None => Vec::new(),
        };

        let has = |markers: &HashSet<&'static str>| tokens.iter().any(|t| markers.contains(t.as_str()));
        let temporal_bucket = if has(&FUTURE_MARKERS) {
            TemporalBucket::Future
        } else if has(&PAST_MARKERS) {
            TemporalBucket::Past
        } else if has(&PRESENT_MARKERS) {
            TemporalBucket::Present
        } else {
            TemporalBucket::Timeless
        };

        Ok(ParsedText {
            subject_tokens,
            object_tokens,
            focus_tokens,
            temporal_bucket: Some(temporal_bucket),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct SlowTokenizer(Duration);

    impl Tokenizer for SlowTokenizer {
        fn parse(&self, _text: &str) -> Result<ParsedText, CollaboratorError> {
            thread::sleep(self.0);
            Ok(ParsedText::default())
        }
    }

    #[test]
    fn test_heuristic_tokenizer_parse() {
        let parsed = HeuristicTokenizer.parse("My week went sideways yesterday").unwrap();
        assert_eq!(parsed.subject_tokens, vec!["week"]);
        assert_eq!(parsed.object_tokens, vec!["sideways", "yesterday"]);
        assert_eq!(parsed.temporal_bucket, Some(TemporalBucket::Past));
        assert!(parsed.salient_tokens().contains(&"went".to_string()));
    }

    #[test]
    fn test_call_bounded_returns_fast_results() {
        let result = call_bounded(Duration::from_millis(500), || Ok(7));
        assert_eq!(result, Ok(7));
    }

    #[test]
    fn test_call_bounded_zero_timeout_fails_without_calling() {
        let result: Result<(), _> = call_bounded(Duration::ZERO, || panic!("must not run"));
        assert_eq!(result, Err(CollaboratorError::Timeout(Duration::ZERO)));
    }

    #[test]
    fn test_slow_tokenizer_is_abandoned_at_the_bound() {
        let collaborators = Collaborators {
            tokenizer: Some(Arc::new(SlowTokenizer(Duration::from_millis(300)))),
            ..Collaborators::default()
        };
        let started = Instant::now();
        let result = collaborators.parse("anything", Duration::from_millis(20));
        assert!(matches!(result, Err(CollaboratorError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn test_table_lookup_matches_keys_in_order() {
        let mut knowledge = KnowledgeBase::default();
        knowledge.snippets.insert("tides".into(), vec!["Tides follow the moon.".into()]);
        knowledge.snippets.insert(
            "moon".into(),
            vec!["Tides follow the moon.".into(), "The moon is slowly drifting away.".into()],
        );
        let lookup = TableLookup::new(Arc::new(knowledge));

        let snippets = lookup.lookup(&["tide".into(), "moon".into()]).unwrap();
        assert_eq!(snippets, vec!["Tides follow the moon.", "The moon is slowly drifting away."]);
        assert!(lookup.lookup(&["hamlet".into()]).unwrap().is_empty());
    }

    #[test]
    fn test_table_lookup_caps_snippets() {
        let mut knowledge = KnowledgeBase::default();
        knowledge
            .snippets
            .insert("rain".into(), (0..8).map(|i| format!("Rain fact {}.", i)).collect());
        let lookup = TableLookup::new(Arc::new(knowledge));
        assert_eq!(lookup.lookup(&["rain".into()]).unwrap().len(), TableLookup::MAX_SNIPPETS);
    }

    #[test]
    fn test_missing_collaborator_is_unavailable() {
        let collaborators = Collaborators::default();
        assert!(matches!(
            collaborators.lookup(&["tides".to_string()], Duration::from_secs(1)),
            Err(CollaboratorError::Unavailable(_))
        ));
    }
}
