//! Keyword-scoring classifier. Last resort of the chain; never fails.

use super::{Category, ClassificationResult};

/// Fixed confidence reported for heuristic decisions.
pub const HEURISTIC_CONFIDENCE: f32 = 0.6;

const PRODUCTIVE_KEYWORDS: &[&str] = &[
    "problema",
    "erro",
    "solicitação",
    "pedido",
    "status",
    "suporte",
    "urgente",
];

const UNPRODUCTIVE_KEYWORDS: &[&str] = &[
    "obrigado",
    "agradeço",
    "parabéns",
    "feliz",
    "natal",
    "cumprimentos",
];

/// Counts productive vs. unproductive keyword hits. Ties go to Productive.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &'static str {
        "heuristic"
    }

    pub fn classify(&self, text: &str) -> ClassificationResult {
        let lower = text.to_lowercase();
        let productive = count_hits(&lower, PRODUCTIVE_KEYWORDS);
        let unproductive = count_hits(&lower, UNPRODUCTIVE_KEYWORDS);

        let category = if productive >= unproductive {
            Category::Productive
        } else {
            Category::Unproductive
        };

        ClassificationResult::new(category, Some(HEURISTIC_CONFIDENCE))
    }
}

/// Number of distinct keywords present as substrings.
fn count_hits(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| text.contains(*kw)).count()
}
