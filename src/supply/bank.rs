use super::*;
use rand::seq::SliceRandom;
use std::collections::HashSet;

const EMBEDDED_BANK: &str = include_str!("../../data/questions.json");

/// Static question bank, validated once at load
#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    /// The bank shipped with the binary
    pub fn embedded() -> SupplyResult<Self> {
        Self::from_json(EMBEDDED_BANK)
    }

    pub fn from_json(json: &str) -> SupplyResult<Self> {
        let questions: Vec<Question> =
            serde_json::from_str(json).map_err(|e| SupplyError::Bank(e.to_string()))?;
        Self::new(questions)
    }

    /// Rejects banks with invalid questions or duplicate ids
    pub fn new(questions: Vec<Question>) -> SupplyResult<Self> {
        let mut ids = HashSet::new();
        for question in &questions {
            question.validate().map_err(SupplyError::Bank)?;
            if !ids.insert(question.id.as_str()) {
                return Err(SupplyError::Bank(format!(
                    "Duplicate question id '{}'",
                    question.id
                )));
            }
        }
        tracing::debug!("Question bank loaded with {} questions", questions.len());
        Ok(Self { questions })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Text of a bank question, if the id belongs to the bank
    pub fn text_of(&self, id: &str) -> Option<&str> {
        self.questions
            .iter()
            .find(|q| q.id == id)
            .map(|q| q.text.as_str())
    }

    /// Pick up to `count` unused questions.
    ///
    /// Category and difficulty filter first. When that leaves fewer than `count`,
    /// the category is dropped; when the difficulty itself is used up, any unused
    /// question will do. Once every question was served, the least recently served
    /// ones come back, so long survival runs never starve.
    pub fn pick(&self, query: &QuestionQuery) -> Vec<Question> {
        let count = query.count as usize;
        let unused: Vec<&Question> = self
            .questions
            .iter()
            .filter(|q| !query.exclude.contains(&q.id))
            .collect();

        let same_tier: Vec<&Question> = unused
            .iter()
            .copied()
            .filter(|q| q.difficulty == query.difficulty)
            .collect();

        let mut pool: Vec<&Question> = match query.category {
            Some(category) => same_tier
                .iter()
                .copied()
                .filter(|q| q.category == category)
                .collect(),
            None => same_tier.clone(),
        };

        if pool.len() < count {
            if query.category.is_some() {
                tracing::debug!(
                    "Not enough {:?} questions for {:?}, using every category",
                    query.category,
                    query.difficulty
                );
            }
            pool = same_tier;
        }
        if pool.is_empty() {
            tracing::debug!("No unused {:?} questions left, using any tier", query.difficulty);
            pool = unused;
        }
        if pool.is_empty() {
            return self.least_recently_served(query);
        }

        pool.shuffle(&mut rand::rng());
        pool.into_iter().take(count).cloned().collect()
    }

    /// Repeat questions in the order they were served (`exclude` is oldest first),
    /// preferring the requested difficulty
    fn least_recently_served(&self, query: &QuestionQuery) -> Vec<Question> {
        tracing::debug!("Bank exhausted, repeating the oldest questions");
        let mut oldest: Vec<&Question> = query
            .exclude
            .iter()
            .filter_map(|id| self.questions.iter().find(|q| q.id == *id))
            .collect();
        // Stable, so serve order holds within each group
        oldest.sort_by_key(|q| q.difficulty != query.difficulty);
        oldest
            .into_iter()
            .take(query.count as usize)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl QuestionSupplier for QuestionBank {
    async fn fetch(&self, query: &QuestionQuery) -> SupplyResult<Vec<Question>> {
        let picked = self.pick(query);
        if picked.is_empty() {
            return Err(SupplyError::Empty);
        }
        Ok(picked)
    }

    fn name(&self) -> &str {
        "bank"
    }
}
