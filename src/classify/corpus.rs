//! Fixed labeled corpus used to train the statistical classifier.

use super::Category;

const PRODUCTIVE: &[&str] = &[
    "Preciso de ajuda urgente com erro no sistema de pagamento",
    "Qual o status atual da minha solicitação de reembolso #12345?",
    "Como proceder para atualizar meus dados cadastrais na plataforma?",
    "Estou com problemas críticos para acessar minha conta corporativa",
    "Solicito suporte técnico imediato para falha no processo de login",
    "Gostaria de saber os prazos exatos de entrega do pedido #67890",
    "Preciso falar urgentemente com o departamento financeiro sobre cobrança indevida",
    "Como faço para resetar minha senha de acesso ao sistema?",
    "Relato um bug crítico na funcionalidade de upload de arquivos grandes",
    "Solicito informações detalhadas sobre o andamento do meu caso #11223",
    "Problema emergencial no sistema requer atenção imediata da equipe",
    "Não consigo acessar meus relatórios financeiros mensais",
    "Erro 500 persistente no processamento de transações cartão de crédito",
    "Solicitação de prioridade máxima para pedido importante do cliente XYZ",
    "Dúvida técnica sobre integração da API de pagamentos com nosso ERP",
    "Problema de performance na dashboard administrativa",
    "Relatório de inconsistência nos dados de faturamento",
    "Solicitação de novo recurso para exportação de relatórios",
    "Problema de conectividade com servidor de produção",
    "Dúvida sobre configuração de webhook para notificações",
];

const UNPRODUCTIVE: &[&str] = &[
    "Agradeço profundamente pela excelente assistência técnica recebida",
    "Desejo um feliz natal e próspero ano novo a toda equipe maravilhosa",
    "Parabéns pelo ótimo trabalho desenvolvido pela equipe de suporte",
    "Apenas passando para desejar um bom final de semana prolongado",
    "Obrigado pelo atendimento de qualidade excepcional prestado",
    "Feliz páscoa para toda a família corporativa maravilhosa",
    "Cumprimentos e saudações cordiais a todos os colaboradores",
    "Agradeço sinceramente a atenção dedicada de todos os envolvidos",
    "Desejo muito sucesso nos projetos futuros da empresa",
    "Mensagem de agradecimento pelo apoio incansável recebido",
    "Feliz ano novo cheio de conquistas e realizações profissionais",
    "Parabéns pelo aniversário de 5 anos da empresa brilhante",
    "Agradecimento pelo suporte excepcional prestado durante o projeto",
    "Desejo um ótimo feriado prolongado para todos os colaboradores",
    "Mensagem de carinho e apreciação pelo trabalho dedicado",
    "Cumprimentos festivos pela época natalina que se aproxima",
    "Agradecimento pela paciência e profissionalismo demonstrados",
    "Desejo um final de semana relaxante e revigorante",
    "Mensagem de reconhecimento pelo excelente atendimento ao cliente",
    "Cumprimentos cordiais e votos de prosperidade para todos",
];

/// A training example.
#[derive(Debug, Clone, Copy)]
pub struct LabeledExample {
    pub text: &'static str,
    pub category: Category,
}

/// The full two-class corpus, productive examples first.
pub fn training_corpus() -> Vec<LabeledExample> {
    PRODUCTIVE
        .iter()
        .map(|text| LabeledExample {
            text,
            category: Category::Productive,
        })
        .chain(UNPRODUCTIVE.iter().map(|text| LabeledExample {
            text,
            category: Category::Unproductive,
        }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corpus_is_balanced() {
        let corpus = training_corpus();
        let productive = corpus
            .iter()
            .filter(|e| e.category == Category::Productive)
            .count();
        assert_eq!(productive, 20);
        assert_eq!(corpus.len() - productive, 20);
    }
}
