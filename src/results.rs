//! Result sink: where finished sessions go.
//!
//! `ScoreLog` keeps a JSON file of score entries, newest first, and derives
//! leaderboards from it. Recording is best-effort; callers log failures and
//! move on.

use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Entries beyond this are dropped, oldest first
pub const MAX_ENTRIES: usize = 1000;
pub const ALL_TIME_LIMIT: usize = 10;
pub const PER_MODE_LIMIT: usize = 5;

pub type SinkResult<T> = Result<T, ResultSinkError>;

#[derive(Debug, thiserror::Error)]
pub enum ResultSinkError {
    #[error("Score log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Score log is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Consumer of finished sessions
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record(&self, results: &GameResults) -> SinkResult<()>;
}

/// One player's result in one finished session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreEntry {
    pub id: String,
    pub session_id: SessionId,
    pub name: String,
    pub score: u32,
    pub mode: Mode,
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub survival_streak: Option<u32>,
    /// ISO timestamp
    pub date: String,
}

impl ScoreEntry {
    pub fn from_results(results: &GameResults) -> Vec<ScoreEntry> {
        results
            .scores
            .iter()
            .map(|s| ScoreEntry {
                id: ulid::Ulid::new().to_string(),
                session_id: results.session_id.clone(),
                name: s.name.clone(),
                score: s.score,
                mode: results.mode,
                category: results.category,
                survival_streak: results.survival_streak,
                date: results.finished_at.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Leaderboards {
    pub all_time: Vec<ScoreEntry>,
    pub solo: Vec<ScoreEntry>,
    pub group: Vec<ScoreEntry>,
    pub survival: Vec<ScoreEntry>,
    /// Survival ranked by best streak instead of score
    pub survival_streaks: Vec<ScoreEntry>,
}

/// Best entry per case-insensitive name, ranked by `key` (descending), first `limit`.
/// Ties keep the newer entry since the log is newest first.
fn top_unique<'a, I, K>(entries: I, limit: usize, key: K) -> Vec<ScoreEntry>
where
    I: Iterator<Item = &'a ScoreEntry>,
    K: Fn(&ScoreEntry) -> u32,
{
    let mut ranked: Vec<&ScoreEntry> = entries.collect();
    ranked.sort_by_key(|e| std::cmp::Reverse(key(e)));

    let mut seen = HashSet::new();
    ranked
        .into_iter()
        .filter(|e| seen.insert(e.name.trim().to_lowercase()))
        .take(limit)
        .cloned()
        .collect()
}

impl Leaderboards {
    pub fn from_entries(entries: &[ScoreEntry]) -> Self {
        let of_mode = |mode: Mode| entries.iter().filter(move |e| e.mode == mode);
        Self {
            all_time: top_unique(entries.iter(), ALL_TIME_LIMIT, |e| e.score),
            solo: top_unique(of_mode(Mode::Solo), PER_MODE_LIMIT, |e| e.score),
            group: top_unique(of_mode(Mode::Group), PER_MODE_LIMIT, |e| e.score),
            survival: top_unique(of_mode(Mode::Survival), PER_MODE_LIMIT, |e| e.score),
            survival_streaks: top_unique(of_mode(Mode::Survival), PER_MODE_LIMIT, |e| {
                e.survival_streak.unwrap_or(0)
            }),
        }
    }
}

/// JSON-file score log with an in-memory cache
pub struct ScoreLog {
    path: PathBuf,
    cache: RwLock<Option<Vec<ScoreEntry>>>,
}

impl ScoreLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    async fn read_file(&self) -> SinkResult<Vec<ScoreEntry>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// All entries, newest first
    pub async fn entries(&self) -> SinkResult<Vec<ScoreEntry>> {
        if let Some(entries) = self.cache.read().await.as_ref() {
            return Ok(entries.clone());
        }
        let entries = self.read_file().await?;
        *self.cache.write().await = Some(entries.clone());
        Ok(entries)
    }

    pub async fn leaderboards(&self) -> SinkResult<Leaderboards> {
        Ok(Leaderboards::from_entries(&self.entries().await?))
    }

    /// Write through a temp file and rename, so readers never see half a file
    async fn write_file(&self, entries: &[ScoreEntry]) -> SinkResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ResultSink for ScoreLog {
    async fn record(&self, results: &GameResults) -> SinkResult<()> {
        let mut cache = self.cache.write().await;
        let previous = match cache.take() {
            Some(entries) => entries,
            None => self.read_file().await?,
        };

        let mut entries = previous.clone();
        let mut fresh = ScoreEntry::from_results(results);
        fresh.reverse();
        for entry in fresh {
            entries.insert(0, entry);
        }
        entries.truncate(MAX_ENTRIES);

        // The cache only ever holds what reached the disk
        if let Err(e) = self.write_file(&entries).await {
            *cache = Some(previous);
            return Err(e);
        }
        *cache = Some(entries);

        tracing::info!(
            "Recorded {} score(s) for session {}",
            results.scores.len(),
            results.session_id
        );
        Ok(())
    }
}
