//! Question supply: where the engine's questions come from.
//!
//! The engine only describes what it needs (a [`crate::engine::FetchRequest`]);
//! a [`QuestionSupplier`] resolves it asynchronously. Results may arrive late
//! or out of order; the engine matches them against the request's ticket.

mod bank;
mod generated;
mod polish;

pub use bank::QuestionBank;
pub use generated::GeneratedSupplier;
pub use polish::PolishingSupplier;

use crate::llm::LlmError;
use crate::types::{Category, Question, QuestionId, Tier};
use async_trait::async_trait;
use std::sync::Arc;

/// Result type for supply operations
pub type SupplyResult<T> = Result<T, SupplyError>;

#[derive(Debug, thiserror::Error)]
pub enum SupplyError {
    #[error("No unused question is available")]
    Empty,

    #[error("Question generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Generated question is malformed: {0}")]
    Malformed(String),

    #[error("Question bank is invalid: {0}")]
    Bank(String),
}

/// What to fetch: difficulty, optional category filter, how many, and ids already served
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionQuery {
    pub difficulty: Tier,
    /// `None` means any category
    pub category: Option<Category>,
    pub count: u32,
    /// Served ids, least recently served first
    pub exclude: Vec<QuestionId>,
}

impl From<&crate::engine::FetchRequest> for QuestionQuery {
    fn from(request: &crate::engine::FetchRequest) -> Self {
        Self {
            difficulty: request.difficulty,
            category: request.category,
            count: request.count,
            exclude: request.exclude.clone(),
        }
    }
}

/// Source of questions
#[async_trait]
pub trait QuestionSupplier: Send + Sync {
    /// Up to `query.count` questions not in `query.exclude`. A supplier with nothing
    /// unused left may repeat excluded ids, oldest first.
    async fn fetch(&self, query: &QuestionQuery) -> SupplyResult<Vec<Question>>;

    fn name(&self) -> &str;
}

/// Tries a primary supplier (usually generative) and falls back to the static bank
pub struct FallbackSupplier {
    primary: Option<Arc<dyn QuestionSupplier>>,
    bank: Arc<QuestionBank>,
}

impl FallbackSupplier {
    pub fn new(primary: Option<Arc<dyn QuestionSupplier>>, bank: Arc<QuestionBank>) -> Self {
        Self { primary, bank }
    }

    /// Bank only
    pub fn bank_only(bank: Arc<QuestionBank>) -> Self {
        Self::new(None, bank)
    }
}

#[async_trait]
impl QuestionSupplier for FallbackSupplier {
    async fn fetch(&self, query: &QuestionQuery) -> SupplyResult<Vec<Question>> {
        if let Some(primary) = &self.primary {
            match primary.fetch(query).await {
                Ok(questions) if !questions.is_empty() => return Ok(questions),
                Ok(_) => tracing::warn!("{} returned no questions, using the bank", primary.name()),
                Err(e) => tracing::warn!("{} failed ({}), using the bank", primary.name(), e),
            }
        }
        self.bank.fetch(query).await
    }

    fn name(&self) -> &str {
        "fallback"
    }
}
