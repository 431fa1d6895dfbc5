//! Suggested-reply generation with fallback.
//!
//! The remote generator is tried first when configured; the template
//! responder always answers.

pub mod remote;
pub mod template;

pub use remote::RemoteResponder;
pub use template::TemplateResponder;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::classify::Category;
use crate::error::TierError;

/// One fallible reply-generation strategy.
#[async_trait]
pub trait ResponderTier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce a non-empty reply for `text` classified as `category`.
    async fn respond(&self, category: Category, text: &str) -> Result<String, TierError>;
}

/// Ordered fallible tiers followed by the template fallback.
pub struct ResponseChain {
    tiers: Vec<Arc<dyn ResponderTier>>,
    fallback: TemplateResponder,
}

impl ResponseChain {
    pub fn new() -> Self {
        Self {
            tiers: Vec::new(),
            fallback: TemplateResponder::new(),
        }
    }

    pub fn with_tier(mut self, tier: Arc<dyn ResponderTier>) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers
            .iter()
            .map(|t| t.name())
            .chain(std::iter::once(self.fallback.name()))
            .collect()
    }

    /// Generate a reply. Never empty.
    pub async fn respond(&self, category: Category, text: &str) -> String {
        for tier in &self.tiers {
            match tier.respond(category, text).await {
                Ok(reply) if !reply.trim().is_empty() => {
                    info!(tier = tier.name(), chars = reply.chars().count(), "Reply generated");
                    return reply;
                }
                Ok(_) => {
                    warn!(tier = tier.name(), error = %TierError::EmptyOutput, "Responder tier missed, falling back");
                }
                Err(TierError::Disabled(reason)) => {
                    debug!(tier = tier.name(), reason, "Responder tier disabled, skipping");
                }
                Err(e) => {
                    warn!(tier = tier.name(), error = %e, "Responder tier missed, falling back");
                }
            }
        }

        info!(tier = self.fallback.name(), "Reply generated from template");
        self.fallback.respond(category, text)
    }
}

impl Default for ResponseChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    #[async_trait]
    impl ResponderTier for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn respond(&self, _: Category, _: &str) -> Result<String, TierError> {
            Err(TierError::Timeout(std::time::Duration::from_secs(30)))
        }
    }

    struct Blank;

    #[async_trait]
    impl ResponderTier for Blank {
        fn name(&self) -> &'static str {
            "blank"
        }

        async fn respond(&self, _: Category, _: &str) -> Result<String, TierError> {
            Ok("   ".into())
        }
    }

    struct Canned(&'static str);

    #[async_trait]
    impl ResponderTier for Canned {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn respond(&self, _: Category, _: &str) -> Result<String, TierError> {
            Ok(self.0.into())
        }
    }

    #[tokio::test]
    async fn remote_success_is_used() {
        let chain = ResponseChain::new().with_tier(Arc::new(Canned("Resposta gerada")));
        let reply = chain.respond(Category::Productive, "erro").await;
        assert_eq!(reply, "Resposta gerada");
    }

    #[tokio::test]
    async fn failures_fall_back_to_template() {
        let chain = ResponseChain::new()
            .with_tier(Arc::new(Broken))
            .with_tier(Arc::new(Blank));
        let reply = chain
            .respond(Category::Productive, "Encontrei um erro no sistema")
            .await;
        assert_eq!(
            reply,
            "Obrigado por relatar o problema. Nossa equipe técnica foi acionada e retornará em breve."
        );
        assert_eq!(chain.tier_names(), vec!["broken", "blank", "template"]);
    }
}
