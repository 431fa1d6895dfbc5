//! Deterministic keyword → template replies.

use crate::classify::Category;

struct Template {
    keywords: &'static [&'static str],
    reply: &'static str,
}

const PRODUCTIVE_TEMPLATES: &[Template] = &[
    Template {
        keywords: &["pedido", "solicitação", "status"],
        reply: "Agradecemos seu contato. Seu pedido está em processamento. Retornaremos com atualizações em breve.",
    },
    Template {
        keywords: &["problema", "erro", "bug"],
        reply: "Obrigado por relatar o problema. Nossa equipe técnica foi acionada e retornará em breve.",
    },
    Template {
        keywords: &["pagamento", "fatura", "cobrança"],
        reply: "Agradecemos sua mensagem. Nossa equipe financeira analisará e retornará em até 24h.",
    },
];

const PRODUCTIVE_DEFAULT: &str =
    "Agradecemos seu contato. Nossa equipe analisará sua solicitação e retornará em breve.";

const UNPRODUCTIVE_TEMPLATES: &[Template] = &[
    Template {
        keywords: &["natal", "ano novo"],
        reply: "Agradecemos as felicitações! Desejamos um excelente final de ano!",
    },
    Template {
        keywords: &["obrigado", "agradeço"],
        reply: "Obrigado pelo feedback! Ficamos felizes em ajudar.",
    },
];

const UNPRODUCTIVE_DEFAULT: &str = "Agradecemos suas gentis palavras! Desejamos um ótimo dia.";

/// Picks the first template whose keywords appear in the text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateResponder;

impl TemplateResponder {
    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &'static str {
        "template"
    }

    pub fn respond(&self, category: Category, text: &str) -> String {
        let (templates, default) = match category {
            Category::Productive => (PRODUCTIVE_TEMPLATES, PRODUCTIVE_DEFAULT),
            Category::Unproductive => (UNPRODUCTIVE_TEMPLATES, UNPRODUCTIVE_DEFAULT),
        };

        let lower = text.to_lowercase();
        templates
            .iter()
            .find(|t| t.keywords.iter().any(|kw| lower.contains(kw)))
            .map_or(default, |t| t.reply)
            .to_string()
    }
}
