use crate::engine::{EngineError, Notice, SessionSnapshot};
use crate::types::*;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Begin a new session; replaces any session on this connection
    Start {
        config: SessionConfig,
    },
    Answer {
        /// Omitted or empty means no answer
        #[serde(default)]
        option: Option<String>,
    },
    UsePowerUp {
        power_up: GroupPowerUp,
    },
    ChooseTarget {
        player_id: PlayerId,
    },
    CancelTarget,
    UseConsumable {
        consumable: SurvivalPowerUp,
    },
    /// Re-issue a failed question fetch
    Retry,
    AcknowledgeGameOver,
    Leave,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        server_now: String,
    },
    /// Full session state after every transition
    State {
        snapshot: Box<SessionSnapshot>,
    },
    Notice {
        notice: Notice,
    },
    Finished {
        results: GameResults,
        /// Survival milestones reached, lowest first
        achievements: Vec<Achievement>,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn welcome() -> Self {
        ServerMessage::Welcome {
            protocol: PROTOCOL_VERSION.to_string(),
            server_now: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn state(snapshot: SessionSnapshot) -> Self {
        ServerMessage::State {
            snapshot: Box::new(snapshot),
        }
    }

    pub fn error(code: &str, msg: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            msg: msg.into(),
        }
    }
}

/// Stable error code for a rejected engine operation
pub fn error_code(error: &EngineError) -> &'static str {
    match error {
        EngineError::InvalidConfig(_) => "INVALID_CONFIG",
        EngineError::NotAwaitingAnswer(_) => "NOT_AWAITING_ANSWER",
        EngineError::AlreadyAnswered => "ALREADY_ANSWERED",
        EngineError::SessionClosed => "SESSION_CLOSED",
        EngineError::StaleFetch | EngineError::StaleTurn(_) | EngineError::StaleEffect => "STALE",
        EngineError::WrongMode(_) => "WRONG_MODE",
        EngineError::NotHeld(_) => "NOT_HELD",
        EngineError::NoCharges(_) => "NO_CHARGES",
        EngineError::AlreadyActive(_) => "ALREADY_ACTIVE",
        EngineError::TargetSelectionPending => "TARGET_PENDING",
        EngineError::NoPendingTarget => "NO_PENDING_TARGET",
        EngineError::InvalidTarget(_) => "INVALID_TARGET",
        EngineError::NothingToRetry => "NOTHING_TO_RETRY",
        EngineError::NotGameOver => "NOT_GAME_OVER",
    }
}

impl From<&EngineError> for ServerMessage {
    fn from(error: &EngineError) -> Self {
        ServerMessage::error(error_code(error), error.to_string())
    }
}
