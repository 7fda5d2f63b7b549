use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque ID types for type safety
pub type SessionId = String;
pub type PlayerId = String;
pub type QuestionId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Solo,
    Group,
    Survival,
}

/// Difficulty tier. Fixed per session in solo/group, derived from the streak in survival.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    JugueteDeNino,
    PaloERon,
    ElCanonazo,
}

impl Tier {
    /// Streak thresholds: `[0,6)`, `[6,16)`, `[16,∞)`
    pub fn from_streak(streak: u32) -> Self {
        match streak {
            0..=5 => Tier::JugueteDeNino,
            6..=15 => Tier::PaloERon,
            _ => Tier::ElCanonazo,
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            Tier::JugueteDeNino => 1.0,
            Tier::PaloERon => 1.2,
            Tier::ElCanonazo => 1.5,
        }
    }

    /// 1-based level number
    pub fn level(self) -> u8 {
        match self {
            Tier::JugueteDeNino => 1,
            Tier::PaloERon => 2,
            Tier::ElCanonazo => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::JugueteDeNino => "Juguete de Niño",
            Tier::PaloERon => "Palo 'e Ron",
            Tier::ElCanonazo => "¡El Cañonazo!",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Gastronomia,
    Musica,
    Tradiciones,
    Folclore,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Gastronomia,
        Category::Musica,
        Category::Tradiciones,
        Category::Folclore,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Gastronomia => "Gastronomía",
            Category::Musica => "Música y Parrandas",
            Category::Tradiciones => "Tradiciones y Costumbres",
            Category::Folclore => "Folclore Regional",
        }
    }
}

/// A multiple-choice question with exactly four options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub options: [String; 4],
    pub answer: String,
    pub category: Category,
    pub difficulty: Tier,
}

impl Question {
    pub fn is_correct(&self, selection: &str) -> bool {
        selection == self.answer
    }

    pub fn correct_index(&self) -> Option<usize> {
        self.options.iter().position(|o| *o == self.answer)
    }

    /// Check the shape invariants: non-empty text, distinct options, answer among them
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Question id cannot be empty".to_string());
        }
        if self.text.trim().is_empty() {
            return Err(format!("Question '{}' has no text", self.id));
        }
        for (i, option) in self.options.iter().enumerate() {
            if option.trim().is_empty() {
                return Err(format!("Question '{}' has an empty option", self.id));
            }
            if self.options[..i].contains(option) {
                return Err(format!(
                    "Question '{}' has duplicate option '{}'",
                    self.id, option
                ));
            }
        }
        if self.correct_index().is_none() {
            return Err(format!(
                "Question '{}' answer '{}' is not one of its options",
                self.id, self.answer
            ));
        }
        Ok(())
    }
}

/// Offensive/defensive power-ups held by group players
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum GroupPowerUp {
    /// Doubles the holder's next correct answer this turn
    HallacaDeOro,
    PaloDeCiego,
    LaLadilla,
    ElEstruendo,
}

impl GroupPowerUp {
    pub const ALL: [GroupPowerUp; 4] = [
        GroupPowerUp::HallacaDeOro,
        GroupPowerUp::PaloDeCiego,
        GroupPowerUp::LaLadilla,
        GroupPowerUp::ElEstruendo,
    ];

    /// The malus this power-up inflicts on an opponent, if it is offensive
    pub fn malus(self) -> Option<Malus> {
        match self {
            GroupPowerUp::HallacaDeOro => None,
            GroupPowerUp::PaloDeCiego => Some(Malus::Blind),
            GroupPowerUp::LaLadilla => Some(Malus::Slow),
            GroupPowerUp::ElEstruendo => Some(Malus::Distraction),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GroupPowerUp::HallacaDeOro => "Hallaca de Oro",
            GroupPowerUp::PaloDeCiego => "Palo de Ciego",
            GroupPowerUp::LaLadilla => "La Ladilla",
            GroupPowerUp::ElEstruendo => "El Estruendo",
        }
    }
}

/// Negative effect one group player inflicts on another
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Malus {
    /// Obscures the target's options
    Blind,
    /// Target's clock runs at half speed
    Slow,
    /// Cosmetic distraction; lasts until the target finishes a turn
    Distraction,
}

/// Single-use survival consumables, held as per-kind counts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SurvivalPowerUp {
    /// Extends time: the clock runs at half speed this turn
    ChiguireLento,
    /// Reveals the correct option
    Soplon,
    /// Hides two incorrect options
    MediaHallaca,
    /// Cancels the next life loss
    MilagroSanto,
}

impl SurvivalPowerUp {
    pub const ALL: [SurvivalPowerUp; 4] = [
        SurvivalPowerUp::ChiguireLento,
        SurvivalPowerUp::Soplon,
        SurvivalPowerUp::MediaHallaca,
        SurvivalPowerUp::MilagroSanto,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SurvivalPowerUp::ChiguireLento => "Chigüire Lento",
            SurvivalPowerUp::Soplon => "Soplón",
            SurvivalPowerUp::MediaHallaca => "Media Hallaca",
            SurvivalPowerUp::MilagroSanto => "Milagro Santo",
        }
    }
}

/// Survival streak milestones
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Achievement {
    Parrandita,
    Fogonazo,
    ElInmortal,
    ElMaestro,
}

impl Achievement {
    /// Lowest threshold first
    pub const ALL: [Achievement; 4] = [
        Achievement::Parrandita,
        Achievement::Fogonazo,
        Achievement::ElInmortal,
        Achievement::ElMaestro,
    ];

    /// Streak needed to unlock
    pub fn threshold(self) -> u32 {
        match self {
            Achievement::Parrandita => 10,
            Achievement::Fogonazo => 25,
            Achievement::ElInmortal => 50,
            Achievement::ElMaestro => 100,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Achievement::Parrandita => "Parrandita",
            Achievement::Fogonazo => "Fogonazo",
            Achievement::ElInmortal => "El Inmortal",
            Achievement::ElMaestro => "El Maestro",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Achievement::Parrandita => "Alcanzar una racha de 10. ¡Aprendiz de Racha!",
            Achievement::Fogonazo => "Alcanzar una racha de 25. ¡El Ciclón Decembrino!",
            Achievement::ElInmortal => "Alcanzar una racha de 50. ¡Cazador de Hallacas!",
            Achievement::ElMaestro => "Alcanzar una racha de 100. ¡El Vencedor del Cañonazo!",
        }
    }

    /// Every milestone a streak reaches, lowest first
    pub fn unlocked_by(streak: u32) -> Vec<Achievement> {
        Self::ALL
            .into_iter()
            .filter(|a| streak >= a.threshold())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
    #[serde(default)]
    pub power_ups: Vec<GroupPowerUp>,
    #[serde(default)]
    pub consumables: BTreeMap<SurvivalPowerUp, u32>,
}

impl Player {
    pub fn new(name: String) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            name,
            score: 0,
            power_ups: Vec::new(),
            consumables: BTreeMap::new(),
        }
    }

    pub fn charges(&self, kind: SurvivalPowerUp) -> u32 {
        self.consumables.get(&kind).copied().unwrap_or(0)
    }
}

pub const DEFAULT_SOLO_NAME: &str = "Tú";
pub const DEFAULT_SURVIVAL_NAME: &str = "Valiente";
pub const MAX_GROUP_PLAYERS: usize = 4;

fn default_num_questions() -> u32 {
    10
}

fn default_lives() -> u32 {
    3
}

/// Settings chosen by the players before a session starts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub mode: Mode,
    /// `None` means questions from every category
    #[serde(default)]
    pub category: Option<Category>,
    /// Ignored in survival
    #[serde(default = "default_num_questions")]
    pub num_questions: u32,
    #[serde(default)]
    pub players: Vec<String>,
    /// Survival only
    #[serde(default = "default_lives")]
    pub lives: u32,
    /// Fixed difficulty for solo/group; survival always starts at the first tier
    #[serde(default)]
    pub difficulty: Tier,
}

impl SessionConfig {
    pub fn solo(difficulty: Tier, num_questions: u32) -> Self {
        Self {
            mode: Mode::Solo,
            category: None,
            num_questions,
            players: Vec::new(),
            lives: default_lives(),
            difficulty,
        }
    }

    pub fn group(players: Vec<String>, difficulty: Tier, num_questions: u32) -> Self {
        Self {
            mode: Mode::Group,
            category: None,
            num_questions,
            players,
            lives: default_lives(),
            difficulty,
        }
    }

    pub fn survival(lives: u32) -> Self {
        Self {
            mode: Mode::Survival,
            category: None,
            num_questions: 0,
            players: Vec::new(),
            lives,
            difficulty: Tier::JugueteDeNino,
        }
    }

    /// Resolve the participant names, filling the single-player defaults
    pub fn player_names(&self) -> Vec<String> {
        let named: Vec<String> = self
            .players
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();

        match self.mode {
            Mode::Group => named,
            Mode::Solo => vec![named
                .into_iter()
                .next()
                .unwrap_or_else(|| DEFAULT_SOLO_NAME.to_string())],
            Mode::Survival => vec![named
                .into_iter()
                .next()
                .unwrap_or_else(|| DEFAULT_SURVIVAL_NAME.to_string())],
        }
    }

    /// User-facing validation, run before a session is handed to the engine
    pub fn validate(&self) -> Result<(), String> {
        if self.mode == Mode::Group {
            let count = self.player_names().len();
            if !(2..=MAX_GROUP_PLAYERS).contains(&count) {
                return Err(format!(
                    "Group mode needs between 2 and {} players, got {}",
                    MAX_GROUP_PLAYERS, count
                ));
            }
        }
        if self.mode != Mode::Survival && self.num_questions == 0 {
            return Err("Number of questions must be at least 1".to_string());
        }
        if self.mode == Mode::Survival && self.lives == 0 {
            return Err("Survival needs at least one life".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerScore {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
}

/// Immutable record of a finished session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameResults {
    pub session_id: SessionId,
    pub mode: Mode,
    pub category: Option<Category>,
    pub scores: Vec<PlayerScore>,
    /// Highest streak reached during a survival session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub survival_streak: Option<u32>,
    /// ISO timestamp
    pub finished_at: String,
}

impl GameResults {
    /// Milestones unlocked by the best survival streak; empty for other modes
    pub fn achievements(&self) -> Vec<Achievement> {
        self.survival_streak
            .map(Achievement::unlocked_by)
            .unwrap_or_default()
    }

    /// Scores ordered best first
    pub fn ranking(&self) -> Vec<PlayerScore> {
        let mut ranked = self.scores.clone();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }
}
