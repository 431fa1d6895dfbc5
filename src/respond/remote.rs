//! Remote reply generation through a Gemini completion model.

use std::time::Duration;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::{AssistantContent, CompletionModel};
use rig::providers::gemini;
use secrecy::ExposeSecret;
use tracing::{info, warn};

use super::ResponderTier;
use crate::classify::Category;
use crate::config::RemoteGeneratorConfig;
use crate::error::TierError;

/// Characters of the email embedded in the prompt.
const PROMPT_INPUT_CHARS: usize = 800;

/// Upper bound on accepted reply length.
const MAX_REPLY_CHARS: usize = 1000;

/// Build the category-specific generation prompt.
pub fn build_prompt(category: Category, text: &str) -> String {
    let excerpt: String = text.chars().take(PROMPT_INPUT_CHARS).collect();
    match category {
        Category::Productive => format!(
            "Gere resposta profissional para email de suporte:\n\n\
             EMAIL: {excerpt}\n\n\
             DIRETRIZES:\n\
             - Português formal brasileiro\n\
             - Demonstrar empatia e compreensão\n\
             - Oferecer solução ou encaminhamento claro\n\
             - Incluir prazos realistas\n\
             - Máximo 100 palavras\n\n\
             RESPOSTA:"
        ),
        Category::Unproductive => format!(
            "Gere resposta cortês para mensagem social:\n\n\
             EMAIL: {excerpt}\n\n\
             DIRETRIZES:\n\
             - Português educado\n\
             - Agradecimento genuíno\n\
             - Brevidade com elegância\n\
             - Máximo 50 palavras\n\n\
             RESPOSTA:"
        ),
    }
}

/// Join the text parts of a completion, trimmed and capped.
fn reply_text(choice: impl IntoIterator<Item = AssistantContent>) -> Result<String, TierError> {
    let text: String = choice
        .into_iter()
        .filter_map(|content| match content {
            AssistantContent::Text(text) => Some(text.text),
            _ => None,
        })
        .collect();

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(TierError::EmptyOutput);
    }
    Ok(trimmed.chars().take(MAX_REPLY_CHARS).collect())
}

fn create_gemini_model(
    config: &RemoteGeneratorConfig,
) -> Result<gemini::completion::CompletionModel, TierError> {
    let client = gemini::Client::builder()
        .api_key(config.api_key.expose_secret())
        .base_url(config.api_base.as_str())
        .build()
        .map_err(|e| TierError::Provider(format!("Failed to create Gemini client: {e}")))?;
    Ok(client.completion_model(&config.model))
}

struct Generator {
    model: gemini::completion::CompletionModel,
    timeout: Duration,
}

/// Responder tier backed by a hosted generative model.
pub struct RemoteResponder {
    generator: Option<Generator>,
}

impl RemoteResponder {
    /// A `None` config, or one whose client cannot be built, yields a tier
    /// that always reports itself disabled.
    pub fn new(config: Option<RemoteGeneratorConfig>) -> Self {
        let generator = config.and_then(|config| match create_gemini_model(&config) {
            Ok(model) => {
                info!("Using Gemini for replies (model: {})", config.model);
                Some(Generator {
                    model,
                    timeout: config.timeout,
                })
            }
            Err(e) => {
                warn!(error = %e, "Remote responder disabled");
                None
            }
        });
        Self { generator }
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }
}

#[async_trait]
impl ResponderTier for RemoteResponder {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn respond(&self, category: Category, text: &str) -> Result<String, TierError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or(TierError::Disabled("GEMINI_API_KEY or GEMINI_MODEL not set"))?;

        let request = generator
            .model
            .completion_request(build_prompt(category, text))
            .send();
        let response = tokio::time::timeout(generator.timeout, request)
            .await
            .map_err(|_| TierError::Timeout(generator.timeout))??;

        reply_text(response.choice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{Router, http::StatusCode};
    use secrecy::SecretString;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config(api_base: String, timeout: Duration) -> RemoteGeneratorConfig {
        RemoteGeneratorConfig {
            api_base,
            api_key: SecretString::from("gemini-key"),
            model: "test-model".into(),
            timeout,
        }
    }

    #[test]
    fn productive_prompt_has_directives() {
        let prompt = build_prompt(Category::Productive, "Erro no login");
        assert!(prompt.contains("EMAIL: Erro no login"));
        assert!(prompt.contains("Máximo 100 palavras"));
        assert!(prompt.contains("Incluir prazos realistas"));
    }

    #[test]
    fn unproductive_prompt_is_brief() {
        let prompt = build_prompt(Category::Unproductive, "Feliz natal");
        assert!(prompt.contains("Máximo 50 palavras"));
        assert!(!prompt.contains("100 palavras"));
    }

    #[test]
    fn prompt_excerpt_is_bounded() {
        let long = "x".repeat(5000);
        let prompt = build_prompt(Category::Productive, &long);
        assert!(prompt.contains(&"x".repeat(PROMPT_INPUT_CHARS)));
        assert!(!prompt.contains(&"x".repeat(PROMPT_INPUT_CHARS + 1)));
    }

    #[test]
    fn reply_is_trimmed_and_capped() {
        let reply = reply_text(vec![AssistantContent::text(format!(
            "  {}  ",
            "a".repeat(3000)
        ))])
        .unwrap();
        assert_eq!(reply.chars().count(), MAX_REPLY_CHARS);
    }

    #[test]
    fn text_parts_are_joined() {
        let reply = reply_text(vec![
            AssistantContent::text(" Olá! "),
            AssistantContent::text("Recebemos sua solicitação. "),
        ])
        .unwrap();
        assert_eq!(reply, "Olá! Recebemos sua solicitação.");
    }

    #[test]
    fn blank_reply_is_empty_output() {
        assert!(matches!(
            reply_text(vec![AssistantContent::text("   ")]),
            Err(TierError::EmptyOutput)
        ));
        assert!(matches!(reply_text(Vec::new()), Err(TierError::EmptyOutput)));
    }

    #[test]
    fn configured_tier_constructs() {
        let tier = RemoteResponder::new(Some(config(
            "http://127.0.0.1:9".into(),
            Duration::from_secs(5),
        )));
        assert!(tier.is_configured());
    }

    #[tokio::test]
    async fn unconfigured_tier_is_disabled() {
        let tier = RemoteResponder::new(None);
        assert!(!tier.is_configured());
        assert!(matches!(
            tier.respond(Category::Productive, "erro").await,
            Err(TierError::Disabled(_))
        ));
    }

    #[tokio::test]
    async fn error_status_is_a_miss() {
        let app = Router::new().fallback(|| async { (StatusCode::TOO_MANY_REQUESTS, "quota") });
        let tier = RemoteResponder::new(Some(config(serve(app).await, Duration::from_secs(5))));
        assert!(matches!(
            tier.respond(Category::Unproductive, "obrigado").await,
            Err(TierError::Provider(_))
        ));
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let app = Router::new().fallback(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (StatusCode::OK, "{}")
        });
        let timeout = Duration::from_millis(100);
        let tier = RemoteResponder::new(Some(config(serve(app).await, timeout)));
        assert!(matches!(
            tier.respond(Category::Productive, "erro no sistema").await,
            Err(TierError::Timeout(t)) if t == timeout
        ));
    }
}
