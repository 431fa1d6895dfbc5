//! Email classification with hierarchical fallback.
//!
//! Tiers, in preference order:
//! 1. `RemoteClassifier`: hosted inference endpoint (only if configured)
//! 2. `StatisticalClassifier`: local TF-IDF + logistic regression
//! 3. `HeuristicClassifier`: keyword scoring, cannot fail
//!
//! A tier miss is logged and the next tier is tried. The chain itself
//! always produces an answer.

pub mod corpus;
pub mod heuristic;
pub mod remote;
pub mod statistical;

pub use heuristic::HeuristicClassifier;
pub use remote::RemoteClassifier;
pub use statistical::StatisticalClassifier;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::TierError;

/// Whether an email needs action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Requires a concrete response or action.
    #[serde(rename = "Produtivo")]
    Productive,
    /// Social or courtesy message.
    #[serde(rename = "Improdutivo")]
    Unproductive,
}

impl Category {
    /// Wire label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Productive => "Produtivo",
            Self::Unproductive => "Improdutivo",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of a successful classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    /// In `[0, 1]` when the tier reports one.
    pub confidence: Option<f32>,
}

impl ClassificationResult {
    pub fn new(category: Category, confidence: Option<f32>) -> Self {
        Self {
            category,
            confidence: confidence.map(|c| c.clamp(0.0, 1.0)),
        }
    }
}

/// One fallible classification strategy.
#[async_trait]
pub trait ClassifierTier: Send + Sync {
    /// Tier name for logs.
    fn name(&self) -> &'static str;

    async fn classify(&self, text: &str) -> Result<ClassificationResult, TierError>;
}

/// Ordered fallible tiers followed by the infallible heuristic.
pub struct ClassificationChain {
    tiers: Vec<Arc<dyn ClassifierTier>>,
    fallback: HeuristicClassifier,
}

impl ClassificationChain {
    /// Chain with only the heuristic fallback.
    pub fn new() -> Self {
        Self {
            tiers: Vec::new(),
            fallback: HeuristicClassifier::new(),
        }
    }

    /// Append a tier. Tiers are tried in insertion order.
    pub fn with_tier(mut self, tier: Arc<dyn ClassifierTier>) -> Self {
        self.tiers.push(tier);
        self
    }

    /// Names of the configured tiers, fallback included.
    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers
            .iter()
            .map(|t| t.name())
            .chain(std::iter::once(self.fallback.name()))
            .collect()
    }

    /// Classify `text`, returning the first tier success.
    ///
    /// Callers must reject empty input beforehand.
    pub async fn classify(&self, text: &str) -> ClassificationResult {
        for tier in &self.tiers {
            match tier.classify(text).await {
                Ok(result) => {
                    info!(
                        tier = tier.name(),
                        category = %result.category,
                        confidence = ?result.confidence,
                        "Email classified"
                    );
                    return result;
                }
                Err(TierError::Disabled(reason)) => {
                    debug!(tier = tier.name(), reason, "Classifier tier disabled, skipping");
                }
                Err(e) => {
                    warn!(tier = tier.name(), error = %e, "Classifier tier missed, falling back");
                }
            }
        }

        let result = self.fallback.classify(text);
        info!(
            tier = self.fallback.name(),
            category = %result.category,
            "Email classified by heuristic fallback"
        );
        result
    }
}

impl Default for ClassificationChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingTier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ClassifierTier for FailingTier {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn classify(&self, _text: &str) -> Result<ClassificationResult, TierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TierError::Transport("connection refused".into()))
        }
    }

    struct FixedTier(Category);

    #[async_trait]
    impl ClassifierTier for FixedTier {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn classify(&self, _text: &str) -> Result<ClassificationResult, TierError> {
            Ok(ClassificationResult::new(self.0, Some(0.99)))
        }
    }

    #[tokio::test]
    async fn empty_chain_uses_heuristic() {
        let chain = ClassificationChain::new();
        let result = chain
            .classify("Preciso de ajuda urgente com erro no sistema")
            .await;
        assert_eq!(result.category, Category::Productive);
        assert_eq!(result.confidence, Some(0.6));
    }

    #[tokio::test]
    async fn first_success_wins() {
        let failing = Arc::new(FailingTier {
            calls: AtomicUsize::new(0),
        });
        let chain = ClassificationChain::new()
            .with_tier(failing.clone())
            .with_tier(Arc::new(FixedTier(Category::Unproductive)))
            .with_tier(Arc::new(FixedTier(Category::Productive)));

        let result = chain.classify("erro erro erro").await;
        assert_eq!(result.category, Category::Unproductive);
        assert_eq!(result.confidence, Some(0.99));
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_tiers_missing_falls_through_to_heuristic() {
        let chain = ClassificationChain::new()
            .with_tier(Arc::new(FailingTier {
                calls: AtomicUsize::new(0),
            }))
            .with_tier(Arc::new(FailingTier {
                calls: AtomicUsize::new(0),
            }));

        let result = chain.classify("Feliz natal e obrigado!").await;
        assert_eq!(result.category, Category::Unproductive);
        assert_eq!(result.confidence, Some(0.6));
    }

    #[tokio::test]
    async fn broken_statistical_artifact_falls_back_to_heuristic() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, b"{not json").unwrap();
        let out_of_range = dir.path().join("out_of_range.json");
        std::fs::write(
            &out_of_range,
            serde_json::to_vec(&serde_json::json!({
                "version": 1,
                "trained_at": "2024-01-01T00:00:00Z",
                "accuracy": 1.0,
                "samples": 40,
                "vectorizer": { "vocabulary": { "erro": 7 }, "idf": [1.0] },
                "model": { "weights": [0.5], "bias": 0.0 }
            }))
            .unwrap(),
        )
        .unwrap();

        for path in [garbage, out_of_range] {
            let chain = ClassificationChain::new()
                .with_tier(Arc::new(RemoteClassifier::new(None)))
                .with_tier(Arc::new(StatisticalClassifier::new(&path)));

            let result = chain
                .classify("Preciso de ajuda urgente com erro no sistema")
                .await;
            assert_eq!(result.category, Category::Productive);
            assert_eq!(result.confidence, Some(0.6));
        }
    }

    #[test]
    fn tier_names_include_fallback() {
        let chain = ClassificationChain::new().with_tier(Arc::new(FixedTier(Category::Productive)));
        assert_eq!(chain.tier_names(), vec!["fixed", "heuristic"]);
    }

    #[test]
    fn category_serializes_to_wire_labels() {
        assert_eq!(
            serde_json::to_value(Category::Productive).unwrap(),
            "Produtivo"
        );
        assert_eq!(
            serde_json::from_value::<Category>(serde_json::json!("Improdutivo")).unwrap(),
            Category::Unproductive
        );
    }

    #[test]
    fn confidence_is_clamped() {
        let result = ClassificationResult::new(Category::Productive, Some(1.7));
        assert_eq!(result.confidence, Some(1.0));
    }
}
