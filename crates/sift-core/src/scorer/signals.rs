//! Per-category signal functions.

use crate::text::contains_phrase;
use crate::types::PriorityCategory;

/// Trait implemented by every category signal.
///
/// A signal measures how strongly a text expresses its one category. The
/// scorer owns combination with the universal sub-signals; a signal only
/// looks at the text.
pub trait CategorySignal: Send + Sync {
    /// The category this signal measures.
    fn category(&self) -> PriorityCategory;

    /// The question this category asks of a candidate.
    fn question(&self) -> &'static str {
        self.category().question()
    }

    /// Strength in `[0, 1]`.
    fn strength(&self, text: &str) -> f64;
}

/// Keyword-hit signal. Each matched keyword closes half of the remaining
/// distance to 1, so one hit gives 0.5, two give 0.75, three 0.875.
#[derive(Debug, Clone)]
pub struct KeywordSignal {
    category: PriorityCategory,
    keywords: Vec<String>,
}

impl KeywordSignal {
    pub const HIT_STRENGTH: f64 = 0.5;

    pub fn new(category: PriorityCategory, keywords: Vec<String>) -> Self {
        Self { category, keywords }
    }

    /// Number of keywords present in `text`.
    pub fn hits(&self, text: &str) -> usize {
        self.keywords
            .iter()
            .filter(|k| contains_phrase(text, k))
            .count()
    }
}

impl CategorySignal for KeywordSignal {
    fn category(&self) -> PriorityCategory {
        self.category
    }

    fn strength(&self, text: &str) -> f64 {
        1.0 - (1.0 - Self::HIT_STRENGTH).powi(self.hits(text) as i32)
    }
}
