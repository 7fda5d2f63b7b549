use crate::config::EngineConfig;
use crate::results::{ResultSink, ScoreLog};
use crate::supply::QuestionSupplier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared application state: everything a session driver needs besides its own engine
pub struct AppState {
    pub supplier: Arc<dyn QuestionSupplier>,
    /// Where finished sessions are recorded
    pub sink: Arc<dyn ResultSink>,
    /// Backing store for the leaderboards API
    pub scores: Arc<ScoreLog>,
    pub engine_config: EngineConfig,
    active_sessions: AtomicUsize,
}

impl AppState {
    pub fn new(
        supplier: Arc<dyn QuestionSupplier>,
        scores: Arc<ScoreLog>,
        engine_config: EngineConfig,
    ) -> Self {
        Self {
            supplier,
            sink: scores.clone(),
            scores,
            engine_config,
            active_sessions: AtomicUsize::new(0),
        }
    }

    /// Record results somewhere other than the score log
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    pub(crate) fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }
}
