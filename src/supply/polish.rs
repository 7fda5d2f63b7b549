use super::generated::GENERATED_ID_PREFIX;
use super::*;
use crate::llm::{GenerateRequest, LlmManager};
use std::time::Duration;

const SYSTEM_PROMPT: &str = r#"Eres un editor experto en la cultura y el habla de Venezuela.
Recibes una pregunta de trivia navideña y la reescribes para que suene natural en boca de un venezolano, con algún coloquialismo ("vaina", "chamo", "pana") donde caiga bien.
No cambies el dato que se pregunta: la respuesta y las opciones siguen siendo válidas.
Responde SOLO con el texto de la pregunta reescrita, sin comillas ni explicaciones."#;

/// Rewrites the text of another supplier's questions in Venezuelan dialect.
///
/// Generated questions already speak the dialect and pass through untouched.
/// A failed or empty rewrite keeps the original text.
pub struct PolishingSupplier {
    inner: Arc<dyn QuestionSupplier>,
    llm: Arc<LlmManager>,
    timeout: Duration,
    max_tokens: u32,
}

impl PolishingSupplier {
    pub fn new(
        inner: Arc<dyn QuestionSupplier>,
        llm: Arc<LlmManager>,
        timeout: Duration,
        max_tokens: u32,
    ) -> Self {
        Self {
            inner,
            llm,
            timeout,
            max_tokens,
        }
    }

    async fn polish(&self, mut question: Question) -> Question {
        if question.id.starts_with(GENERATED_ID_PREFIX) {
            return question;
        }

        let request = GenerateRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: format!("Pregunta: {}", question.text),
            max_tokens: Some(self.max_tokens),
            temperature: Some(0.5),
            timeout: self.timeout,
        };

        match self.llm.generate(request).await {
            Ok(response) => match clean_rewrite(&response.text) {
                Some(text) => {
                    tracing::debug!("Polished question {}", question.id);
                    question.text = text;
                }
                None => tracing::warn!("Empty rewrite for question {}, keeping it", question.id),
            },
            Err(e) => tracing::warn!("Could not polish question {}: {}", question.id, e),
        }
        question
    }
}

/// Strip the quotes and whitespace models like to wrap their answer in
fn clean_rewrite(raw: &str) -> Option<String> {
    let text = raw
        .trim()
        .trim_matches(|c| matches!(c, '"' | '“' | '”' | '«' | '»'))
        .trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[async_trait]
impl QuestionSupplier for PolishingSupplier {
    async fn fetch(&self, query: &QuestionQuery) -> SupplyResult<Vec<Question>> {
        let questions = self.inner.fetch(query).await?;
        let mut polished = Vec::with_capacity(questions.len());
        for question in questions {
            polished.push(self.polish(question).await);
        }
        Ok(polished)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
