//! Read-only knowledge tables.
//!
//! A [`KnowledgeBase`] holds everything the engine knows without asking a
//! collaborator: category keywords, option lexicons, idioms, definitions,
//! topic snippets, dimension frames and the anti-pattern markers the gate
//! rejects on. It is
//! built once, wrapped in an `Arc`, and shared across resolutions.
//!
//! Tables can be extended from a YAML or JSON file. See [`loader`].

mod builtin;
pub mod loader;

pub use loader::{LoadMode, LoadOutcome, LoadedKnowledge};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{Dimension, PriorityCategory};

/// Errors that can occur when loading knowledge tables.
#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("Failed to read knowledge file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Knowledge validation failed: {0}")]
    ValidationError(String),

    #[error("Knowledge file not found: {0}")]
    NotFound(String),
}

/// A fixed expression and what it means.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Idiom {
    pub phrase: String,
    pub meaning: String,
}

/// Knowledge tables. Every field may be omitted in a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KnowledgeBase {
    /// Keywords that signal each priority category.
    pub category_keywords: BTreeMap<PriorityCategory, Vec<String>>,

    /// Keywords that lift every category.
    pub boost_keywords: Vec<String>,

    /// Option name to the words it is associated with.
    pub lexicon: BTreeMap<String, Vec<String>>,

    /// Kind name to its members.
    pub categories: BTreeMap<String, Vec<String>>,

    /// Term to a short gloss, used for literal definitions.
    pub definitions: BTreeMap<String, String>,

    pub idioms: Vec<Idiom>,

    /// Topic to short factual snippets, served by the table lookup.
    pub snippets: BTreeMap<String, Vec<String>>,

    /// Phrasing templates per dimension. `{topic}` and `{Topic}` are substituted.
    pub frames: BTreeMap<Dimension, Vec<String>>,

    /// Phrases that hard-reject a candidate.
    pub hard_reject: Vec<String>,

    /// Stock openers that lower originality.
    pub canned_openers: Vec<String>,

    /// Stock sayings that lower authenticity.
    pub platitudes: Vec<String>,
}

impl KnowledgeBase {
    /// The tables compiled into the crate.
    pub fn builtin() -> Self {
        builtin::BUILTIN.clone()
    }

    /// Total number of entries across all tables.
    pub fn entry_count(&self) -> usize {
        self.category_keywords.values().map(Vec::len).sum::<usize>()
            + self.boost_keywords.len()
            + self.lexicon.len()
            + self.categories.len()
            + self.definitions.len()
            + self.idioms.len()
            + self.snippets.values().map(Vec::len).sum::<usize>()
            + self.frames.values().map(Vec::len).sum::<usize>()
            + self.hard_reject.len()
            + self.canned_openers.len()
            + self.platitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Fold `other` into `self`. Lists are extended, map entries are replaced.
    pub fn merge(&mut self, other: KnowledgeBase) {
        for (category, keywords) in other.category_keywords {
            extend_unique(self.category_keywords.entry(category).or_default(), keywords);
        }
        extend_unique(&mut self.boost_keywords, other.boost_keywords);
        self.lexicon.extend(other.lexicon);
        self.categories.extend(other.categories);
        self.definitions.extend(other.definitions);
        for idiom in other.idioms {
            if !self.idioms.iter().any(|i| i.phrase == idiom.phrase) {
                self.idioms.push(idiom);
            }
        }
        self.snippets.extend(other.snippets);
        for (dimension, templates) in other.frames {
            extend_unique(self.frames.entry(dimension).or_default(), templates);
        }
        extend_unique(&mut self.hard_reject, other.hard_reject);
        extend_unique(&mut self.canned_openers, other.canned_openers);
        extend_unique(&mut self.platitudes, other.platitudes);
    }

    /// Validate table contents.
    pub fn validate(&self) -> Result<(), KnowledgeError> {
        for idiom in &self.idioms {
            if idiom.phrase.trim().is_empty() || idiom.meaning.trim().is_empty() {
                return Err(KnowledgeError::ValidationError(format!(
                    "Idiom entries need both a phrase and a meaning: {:?}",
                    idiom.phrase
                )));
            }
        }

        for (topic, lines) in &self.snippets {
            if topic.trim().is_empty() || lines.iter().any(|l| l.trim().is_empty()) {
                return Err(KnowledgeError::ValidationError(format!(
                    "Snippet entries need a topic and non-empty lines: {:?}",
                    topic
                )));
            }
        }

        for (dimension, templates) in &self.frames {
            if *dimension == Dimension::Literal {
                return Err(KnowledgeError::ValidationError(
                    "Literal readings have no frame templates".to_string(),
                ));
            }
            for template in templates {
                if !template.contains("{topic}") && !template.contains("{Topic}") {
                    return Err(KnowledgeError::ValidationError(format!(
                        "Frame template for {:?} has no {{topic}} placeholder: {}",
                        dimension, template
                    )));
                }
            }
        }

        for (term, gloss) in &self.definitions {
            if gloss.trim().is_empty() {
                return Err(KnowledgeError::ValidationError(format!(
                    "Definition for '{}' is empty",
                    term
                )));
            }
        }

        Ok(())
    }

    /// Associations for `option`, matched loosely.
    pub fn associations(&self, option: &str) -> &[String] {
        self.lexicon
            .iter()
            .find(|(key, _)| crate::text::loosely_equal(key, option))
            .map_or(&[], |(_, words)| words.as_slice())
    }

    /// The kind `word` belongs to, if any.
    pub fn category_of(&self, word: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|(_, members)| members.iter().any(|m| crate::text::loosely_equal(m, word)))
            .map(|(kind, _)| kind.as_str())
    }

    /// Snippets for `topic`, matched loosely.
    pub fn snippets_for(&self, topic: &str) -> &[String] {
        self.snippets
            .iter()
            .find(|(key, _)| crate::text::loosely_equal(key, topic))
            .map_or(&[], |(_, lines)| lines.as_slice())
    }

    /// Templates for `dimension`.
    pub fn frames_for(&self, dimension: Dimension) -> &[String] {
        self.frames.get(&dimension).map_or(&[], Vec::as_slice)
    }
}

fn extend_unique(target: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// Substitute `{topic}` / `{Topic}` in a frame template.
pub fn render_frame(template: &str, topic: &str) -> String {
    template
        .replace("{Topic}", &crate::text::capitalize(topic))
        .replace("{topic}", topic)
}
