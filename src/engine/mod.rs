//! Round engine: authoritative state for one play session.
//!
//! The engine is a synchronous state machine. Every operation either rejects
//! with an [`EngineError`] and leaves the session untouched, or applies one
//! transition and returns the [`Effect`]s the caller must perform (fetch a
//! question, schedule the next turn, schedule a malus expiry, record results).
//! The caller feeds the outcome of those effects back in as new events.

mod answer;
mod power_up;
mod snapshot;
mod timer;
mod turn;

pub use answer::{points_for_correct, ScoreContext};
pub use snapshot::{OptionView, PlayerView, QuestionView, SessionSnapshot};

use crate::config::EngineConfig;
use crate::types::*;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Rejected operations. None of these change the session.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error("No question is waiting for an answer (phase: {0})")]
    NotAwaitingAnswer(&'static str),

    #[error("The current question was already answered")]
    AlreadyAnswered,

    #[error("The session is over")]
    SessionClosed,

    #[error("Fetch result does not match the outstanding request")]
    StaleFetch,

    #[error("Turn {0} is no longer current")]
    StaleTurn(u64),

    #[error("Effect was replaced or already expired")]
    StaleEffect,

    #[error("Operation not available in {0:?} mode")]
    WrongMode(Mode),

    #[error("Player does not hold {0}")]
    NotHeld(&'static str),

    #[error("No charges left for {0}")]
    NoCharges(&'static str),

    #[error("{0} is already active")]
    AlreadyActive(&'static str),

    #[error("A target must be chosen for the pending power-up first")]
    TargetSelectionPending,

    #[error("No power-up is waiting for a target")]
    NoPendingTarget,

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Nothing to retry")]
    NothingToRetry,

    #[error("Game over has not been reached")]
    NotGameOver,
}

/// Explicit engine state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Phase {
    /// A question fetch is outstanding; answers are rejected and the clock is stopped
    Loading,
    AwaitingAnswer,
    /// Answer recorded, waiting for the scheduled advance
    TurnTransition,
    /// Mid-session fetch failed; scores, lives and streak are untouched
    SupplyFailed { message: String },
    /// The very first question could not be obtained; the session never started
    Unplayable { message: String },
    /// Survival lives exhausted; needs an acknowledgement before results
    GameOver,
    Finished,
    Abandoned,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Loading => "loading",
            Phase::AwaitingAnswer => "awaiting_answer",
            Phase::TurnTransition => "turn_transition",
            Phase::SupplyFailed { .. } => "supply_failed",
            Phase::Unplayable { .. } => "unplayable",
            Phase::GameOver => "game_over",
            Phase::Finished => "finished",
            Phase::Abandoned => "abandoned",
        }
    }

    /// No further operations are valid
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Phase::Unplayable { .. } | Phase::Finished | Phase::Abandoned
        )
    }
}

/// Identifies one question request; results carrying another ticket are discarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub session_id: SessionId,
    /// 0-based index of the question being fetched
    pub question_no: usize,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub ticket: FetchTicket,
    pub difficulty: Tier,
    pub category: Option<Category>,
    pub count: u32,
    pub exclude: Vec<QuestionId>,
}

/// Work the engine asks its caller to perform
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Fetch(FetchRequest),
    /// Call `advance_turn(turn)` after the delay
    ScheduleAdvance { turn: u64, after: Duration },
    /// Call `expire_malus(target, token)` after the delay
    ScheduleExpiry {
        target: PlayerId,
        token: u64,
        after: Duration,
    },
    Notify(Notice),
    /// Hand the final results to the result sink
    Record(GameResults),
}

/// One-off events for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    RapidFire {
        player_id: PlayerId,
        ticks: u32,
    },
    Answered {
        player_id: PlayerId,
        correct: bool,
        points: u32,
        timed_out: bool,
    },
    LevelUp {
        tier: Tier,
        level: u8,
    },
    PowerUpGranted {
        player_id: PlayerId,
        power_up: GroupPowerUp,
    },
    ConsumableGranted {
        player_id: PlayerId,
        consumable: SurvivalPowerUp,
    },
    DoubleScoreArmed {
        player_id: PlayerId,
    },
    MalusApplied {
        from: PlayerId,
        target: PlayerId,
        malus: Malus,
    },
    MalusExpired {
        target: PlayerId,
        malus: Malus,
    },
    ConsumableUsed {
        player_id: PlayerId,
        consumable: SurvivalPowerUp,
    },
    LifeSaved {
        player_id: PlayerId,
    },
    /// Presentation-only wrong-answer feedback
    Shake {
        player_id: PlayerId,
    },
    SupplyFailed {
        message: String,
    },
    GameOver {
        score: u32,
        best_streak: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveMalus {
    pub kind: Malus,
    pub from: PlayerId,
    token: u64,
}

/// Per-turn transient state, rebuilt on every advance
#[derive(Debug, Clone, Default)]
struct TurnState {
    answered: bool,
    selection: Option<String>,
    correct: Option<bool>,
    time_left: u32,
    time_budget: u32,
    rapid_fire: bool,
    double_score: bool,
    extend_time: bool,
    revealed: bool,
    /// Indices into the question's options
    hidden: Vec<usize>,
    pending_target: Option<GroupPowerUp>,
}

impl TurnState {
    fn new(time_budget: u32, rapid_fire: bool) -> Self {
        Self {
            time_left: time_budget,
            time_budget,
            rapid_fire,
            ..Default::default()
        }
    }
}

pub struct RoundEngine {
    session_id: SessionId,
    config: SessionConfig,
    rules: EngineConfig,
    rng: StdRng,
    phase: Phase,
    players: Vec<Player>,
    current_player: usize,
    questions: Vec<Question>,
    /// Ids of served questions, least recently served first
    served: Vec<QuestionId>,
    /// Presentation order of the current question's options
    display_order: [usize; 4],
    turn: TurnState,
    turn_seq: u64,
    fetch_seq: u64,
    pending_fetch: Option<FetchTicket>,
    lives: u32,
    streak: u32,
    best_streak: u32,
    maluses: HashMap<PlayerId, ActiveMalus>,
    malus_seq: u64,
    life_shield: bool,
    answered_turns: u32,
    results: Option<GameResults>,
}

impl RoundEngine {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn current_player(&self) -> &Player {
        &self.players[self.current_player]
    }

    pub fn current_player_index(&self) -> usize {
        self.current_player
    }

    /// The question on screen, if one is loaded
    pub fn question(&self) -> Option<&Question> {
        match self.phase {
            Phase::AwaitingAnswer | Phase::TurnTransition | Phase::GameOver => {
                self.questions.last()
            }
            _ => None,
        }
    }

    /// Number of questions served so far
    pub fn questions_served(&self) -> usize {
        self.questions.len()
    }

    pub fn time_left(&self) -> u32 {
        self.turn.time_left
    }

    pub fn is_rapid_fire(&self) -> bool {
        self.turn.rapid_fire
    }

    pub fn lives(&self) -> u32 {
        self.lives
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn best_streak(&self) -> u32 {
        self.best_streak
    }

    pub fn turn_seq(&self) -> u64 {
        self.turn_seq
    }

    /// Turns that received an answer (including timeouts)
    pub fn answered_turns(&self) -> u32 {
        self.answered_turns
    }

    pub fn malus_on(&self, player_id: &PlayerId) -> Option<Malus> {
        self.maluses.get(player_id).map(|m| m.kind)
    }

    pub fn results(&self) -> Option<&GameResults> {
        self.results.as_ref()
    }

    /// Difficulty requested for the next question
    pub fn tier(&self) -> Tier {
        match self.config.mode {
            Mode::Survival => Tier::from_streak(self.streak),
            Mode::Solo | Mode::Group => self.config.difficulty,
        }
    }

    fn current_player_id(&self) -> PlayerId {
        self.players[self.current_player].id.clone()
    }

    /// Shared guard for actions taken while a question is on screen
    fn ensure_awaiting_answer(&self) -> EngineResult<()> {
        match self.phase {
            Phase::AwaitingAnswer if self.turn.answered => Err(EngineError::AlreadyAnswered),
            Phase::AwaitingAnswer => Ok(()),
            Phase::TurnTransition | Phase::GameOver => Err(EngineError::AlreadyAnswered),
            ref p if p.is_closed() => Err(EngineError::SessionClosed),
            ref p => Err(EngineError::NotAwaitingAnswer(p.name())),
        }
    }
}
