//! Runtime configuration loaded from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Timing and probability knobs for the round engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Length of one countdown tick at normal speed
    pub tick: Duration,
    /// Ticks available on a normal turn
    pub turn_ticks: u32,
    /// Ticks available on a rapid-fire turn
    pub rapid_fire_ticks: u32,
    /// Pause between an answer and the next turn
    pub advance_delay: Duration,
    /// Chance that a group turn becomes rapid-fire
    pub rapid_fire_chance: f64,
    /// Chance that a correct group answer on tier 2+ grants a power-up
    pub power_up_chance: f64,
    pub blind_duration: Duration,
    pub slow_duration: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            turn_ticks: 35,
            rapid_fire_ticks: 3,
            advance_delay: Duration::from_millis(1500),
            rapid_fire_chance: 0.15,
            power_up_chance: 0.3,
            blind_duration: Duration::from_secs(3),
            slow_duration: Duration::from_secs(5),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Probabilities outside [0, 1] would make the dice panic
fn env_chance(key: &str) -> Option<f64> {
    env_parse::<f64>(key).filter(|p| (0.0..=1.0).contains(p))
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tick: env_millis("PARRANDA_TICK_MS")
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.tick),
            turn_ticks: env_parse("PARRANDA_TURN_TICKS")
                .filter(|t| *t > 0)
                .unwrap_or(defaults.turn_ticks),
            rapid_fire_ticks: env_parse("PARRANDA_RAPID_TICKS")
                .filter(|t| *t > 0)
                .unwrap_or(defaults.rapid_fire_ticks),
            advance_delay: env_millis("PARRANDA_ADVANCE_DELAY_MS")
                .unwrap_or(defaults.advance_delay),
            rapid_fire_chance: env_chance("PARRANDA_RAPID_FIRE_CHANCE")
                .unwrap_or(defaults.rapid_fire_chance),
            power_up_chance: env_chance("PARRANDA_POWER_UP_CHANCE")
                .unwrap_or(defaults.power_up_chance),
            blind_duration: env_millis("PARRANDA_BLIND_MS").unwrap_or(defaults.blind_duration),
            slow_duration: env_millis("PARRANDA_SLOW_MS").unwrap_or(defaults.slow_duration),
        }
    }
}

/// Server-level settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// JSON file the finished sessions are appended to
    pub scores_path: PathBuf,
    /// Ask the LLM for fresh questions before falling back to the bank
    pub use_ai: bool,
    /// Have the LLM reword bank questions in Venezuelan dialect
    pub polish_dialect: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 9002)),
            scores_path: PathBuf::from("data/scores.json"),
            use_ai: false,
            polish_dialect: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            addr: env_parse("PARRANDA_ADDR").unwrap_or(defaults.addr),
            scores_path: std::env::var("PARRANDA_SCORES_PATH")
                .ok()
                .and_then(|p| {
                    let trimmed = p.trim();
                    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
                })
                .unwrap_or(defaults.scores_path),
            use_ai: env_flag("PARRANDA_USE_AI").unwrap_or(defaults.use_ai),
            polish_dialect: env_flag("PARRANDA_POLISH_DIALECT").unwrap_or(defaults.polish_dialect),
        }
    }
}
