use super::*;
use std::collections::BTreeMap;

/// Read-only view of a session for the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub mode: Mode,
    pub category: Option<Category>,
    pub phase: Phase,
    pub question: Option<QuestionView>,
    /// 1-based number of the question on screen (0 before the first load)
    pub question_number: usize,
    /// `None` in survival, which has no fixed length
    pub total_questions: Option<u32>,
    pub players: Vec<PlayerView>,
    pub current_player: PlayerId,
    pub time_left: u32,
    pub time_budget: u32,
    pub rapid_fire: bool,
    pub slowed: bool,
    pub tier: Tier,
    pub double_score: bool,
    pub pending_target: Option<GroupPowerUp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lives: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_streak: Option<u32>,
    pub life_shield: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<GameResults>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OptionView {
    pub text: String,
    /// Removed by Media Hallaca
    pub hidden: bool,
}

/// The question on screen. The correct answer is withheld until it was answered or revealed.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub text: String,
    pub category: Category,
    pub difficulty: Tier,
    pub options: Vec<OptionView>,
    pub selected: Option<String>,
    pub correct_answer: Option<String>,
    pub answered_correctly: Option<bool>,
    /// The acting player is blinded
    pub obscured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
    pub power_ups: Vec<GroupPowerUp>,
    pub consumables: BTreeMap<SurvivalPowerUp, u32>,
    pub malus: Option<Malus>,
}

impl RoundEngine {
    pub fn snapshot(&self) -> SessionSnapshot {
        let survival = self.config.mode == Mode::Survival;
        let current_id = self.current_player_id();

        let question = self.question().map(|q| {
            let disclosed = self.turn.answered || self.turn.revealed;
            QuestionView {
                id: q.id.clone(),
                text: q.text.clone(),
                category: q.category,
                difficulty: q.difficulty,
                options: self
                    .display_order
                    .iter()
                    .map(|&i| OptionView {
                        text: q.options[i].clone(),
                        hidden: self.turn.hidden.contains(&i),
                    })
                    .collect(),
                selected: self.turn.selection.clone(),
                correct_answer: disclosed.then(|| q.answer.clone()),
                answered_correctly: self.turn.correct,
                obscured: self.malus_on(&current_id) == Some(Malus::Blind),
            }
        });

        SessionSnapshot {
            session_id: self.session_id.clone(),
            mode: self.config.mode,
            category: self.config.category,
            phase: self.phase.clone(),
            question,
            question_number: self.questions.len(),
            total_questions: (!survival).then_some(self.config.num_questions),
            players: self
                .players
                .iter()
                .map(|p| PlayerView {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    score: p.score,
                    power_ups: p.power_ups.clone(),
                    consumables: p.consumables.clone(),
                    malus: self.malus_on(&p.id),
                })
                .collect(),
            current_player: current_id,
            time_left: self.turn.time_left,
            time_budget: self.turn.time_budget,
            rapid_fire: self.turn.rapid_fire,
            slowed: self.is_slowed(),
            tier: self.tier(),
            double_score: self.turn.double_score,
            pending_target: self.turn.pending_target,
            lives: survival.then_some(self.lives),
            streak: survival.then_some(self.streak),
            best_streak: survival.then_some(self.best_streak),
            life_shield: self.life_shield,
            results: self.results.clone(),
        }
    }
}
