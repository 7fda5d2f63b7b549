use super::*;
use crate::llm::{GenerateRequest, LlmManager};
use rand::seq::IndexedRandom;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// Prefix for ids of generated questions
pub const GENERATED_ID_PREFIX: &str = "ai-gen-";

const SYSTEM_PROMPT: &str = r#"Eres un experto en la Navidad venezolana y escribes como un pana caraqueño: "chamo", "pana", "vaina", "chévere", "pues".
Escribes UNA pregunta de trivia en español de Venezuela. El tono es coloquial pero la dificultad es la que se pide.

Reglas:
- Cuatro opciones distintas y cortas; solo una es correcta.
- La respuesta correcta debe aparecer textualmente entre las opciones.
- Nada de preguntas repetidas ni de la lista de preguntas a evitar.

Responde SOLO con un objeto JSON, sin texto adicional:
{"question": "...", "answer": "...", "options": ["...", "...", "...", "..."]}"#;

/// Questions written on demand by an LLM
pub struct GeneratedSupplier {
    llm: Arc<LlmManager>,
    timeout: Duration,
    max_tokens: u32,
    /// Text of every question generated so far, so exclusions can be described to the model
    generated: Mutex<HashMap<QuestionId, String>>,
    /// Used to describe excluded bank questions
    bank: Option<Arc<QuestionBank>>,
}

#[derive(Debug, Deserialize)]
struct GeneratedQuestion {
    question: String,
    answer: String,
    options: Vec<String>,
}

impl GeneratedSupplier {
    pub fn new(llm: Arc<LlmManager>, timeout: Duration, max_tokens: u32) -> Self {
        Self {
            llm,
            timeout,
            max_tokens,
            generated: Mutex::new(HashMap::new()),
            bank: None,
        }
    }

    pub fn with_bank(mut self, bank: Arc<QuestionBank>) -> Self {
        self.bank = Some(bank);
        self
    }

    fn build_prompt(difficulty: Tier, category: Category, avoid: &[String]) -> String {
        let mut prompt = format!(
            "Categoría: {}\nDificultad: {} (nivel {} de 3)\n",
            category.label(),
            difficulty.label(),
            difficulty.level()
        );
        if !avoid.is_empty() {
            prompt.push_str("Preguntas a evitar:\n");
            for text in avoid {
                prompt.push_str("- ");
                prompt.push_str(text);
                prompt.push('\n');
            }
        }
        prompt
    }

    async fn texts_to_avoid(&self, exclude: &[QuestionId]) -> Vec<String> {
        let generated = self.generated.lock().await;
        exclude
            .iter()
            .filter_map(|id| {
                generated.get(id).cloned().or_else(|| {
                    self.bank
                        .as_ref()
                        .and_then(|bank| bank.text_of(id).map(str::to_string))
                })
            })
            .collect()
    }
}

/// Parse the model's reply into a question. Tolerates code fences and chatter around the object.
pub fn parse_generated(
    raw: &str,
    id: QuestionId,
    difficulty: Tier,
    category: Category,
) -> SupplyResult<Question> {
    let start = raw
        .find('{')
        .ok_or_else(|| SupplyError::Malformed("no JSON object in reply".to_string()))?;
    let end = raw
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| SupplyError::Malformed("unterminated JSON object".to_string()))?;

    let parsed: GeneratedQuestion = serde_json::from_str(&raw[start..=end])
        .map_err(|e| SupplyError::Malformed(e.to_string()))?;

    let options: Vec<String> = parsed
        .options
        .iter()
        .map(|o| o.trim().to_string())
        .collect();
    let options: [String; 4] = options
        .try_into()
        .map_err(|v: Vec<String>| SupplyError::Malformed(format!("{} options, need 4", v.len())))?;

    let question = Question {
        id,
        text: parsed.question.trim().to_string(),
        options,
        answer: parsed.answer.trim().to_string(),
        category,
        difficulty,
    };
    question.validate().map_err(SupplyError::Malformed)?;
    Ok(question)
}

#[async_trait]
impl QuestionSupplier for GeneratedSupplier {
    async fn fetch(&self, query: &QuestionQuery) -> SupplyResult<Vec<Question>> {
        // "All categories" still asks the model for one concrete category
        let category = match query.category {
            Some(category) => category,
            None => *Category::ALL
                .choose(&mut rand::rng())
                .unwrap_or(&Category::Tradiciones),
        };
        let avoid = self.texts_to_avoid(&query.exclude).await;

        let request = GenerateRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: Self::build_prompt(query.difficulty, category, &avoid),
            max_tokens: Some(self.max_tokens),
            temperature: Some(0.9),
            timeout: self.timeout,
        };

        let response = self.llm.generate(request).await?;
        let id = format!("{}{}", GENERATED_ID_PREFIX, ulid::Ulid::new().to_string().to_lowercase());
        let question = parse_generated(&response.text, id, query.difficulty, category)?;

        tracing::info!(
            "Generated {:?} question {} via {}",
            query.difficulty,
            question.id,
            response.metadata.provider
        );
        self.generated
            .lock()
            .await
            .insert(question.id.clone(), question.text.clone());
        Ok(vec![question])
    }

    fn name(&self) -> &str {
        "generated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerateResponse, LlmProvider, LlmResult, ResponseMetadata};

    struct Scripted(&'static str);

    #[async_trait]
    impl LlmProvider for Scripted {
        async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
            assert!(request.prompt.contains("Dificultad"));
            Ok(GenerateResponse {
                text: self.0.to_string(),
                metadata: ResponseMetadata {
                    provider: "scripted".to_string(),
                    model: "test".to_string(),
                    tokens_used: None,
                    latency_ms: 0,
                },
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn supplier(reply: &'static str) -> GeneratedSupplier {
        let llm = Arc::new(LlmManager::new(vec![Box::new(Scripted(reply))]));
        GeneratedSupplier::new(llm, Duration::from_secs(1), 200)
    }

    const GOOD: &str = r#"```json
{"question": "¿Qué se toca con una vara y un cuero?", "answer": "El furruco",
 "options": ["El cuatro", "El furruco", "La charrasca", "Las maracas"]}
```"#;

    #[test]
    fn test_parse_tolerates_fences() {
        let q = parse_generated(GOOD, "ai-gen-1".to_string(), Tier::PaloERon, Category::Musica)
            .unwrap();
        assert_eq!(q.answer, "El furruco");
        assert_eq!(q.correct_index(), Some(1));
        assert_eq!(q.category, Category::Musica);
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        let three = r#"{"question": "¿?", "answer": "a", "options": ["a", "b", "c"]}"#;
        assert!(matches!(
            parse_generated(three, "x".into(), Tier::PaloERon, Category::Musica),
            Err(SupplyError::Malformed(_))
        ));

        let missing = r#"{"question": "¿?", "answer": "z", "options": ["a", "b", "c", "d"]}"#;
        assert!(matches!(
            parse_generated(missing, "x".into(), Tier::PaloERon, Category::Musica),
            Err(SupplyError::Malformed(_))
        ));

        assert!(matches!(
            parse_generated("lo siento, no puedo", "x".into(), Tier::PaloERon, Category::Musica),
            Err(SupplyError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_generated_ids_are_prefixed_and_remembered() {
        let supplier = supplier(GOOD);
        let query = QuestionQuery {
            difficulty: Tier::ElCanonazo,
            category: None,
            count: 1,
            exclude: Vec::new(),
        };

        let questions = supplier.fetch(&query).await.unwrap();
        assert_eq!(questions.len(), 1);
        let question = &questions[0];
        assert!(question.id.starts_with(GENERATED_ID_PREFIX));
        assert_eq!(question.difficulty, Tier::ElCanonazo);

        let avoid = supplier.texts_to_avoid(&[question.id.clone()]).await;
        assert_eq!(avoid, vec![question.text.clone()]);
    }

    #[test]
    fn test_prompt_lists_questions_to_avoid() {
        let prompt = GeneratedSupplier::build_prompt(
            Tier::JugueteDeNino,
            Category::Gastronomia,
            &["¿Con qué hoja se envuelve la hallaca?".to_string()],
        );
        assert!(prompt.contains("Gastronomía"));
        assert!(prompt.contains("Juguete de Niño"));
        assert!(prompt.contains("- ¿Con qué hoja se envuelve la hallaca?"));
    }
}
