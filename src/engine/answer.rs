use super::*;
use rand::seq::IndexedRandom;
use rand::Rng;

/// Correct answers are worth this much before multipliers
const BASE_POINTS: f64 = 10.0;
const RAPID_FIRE_POINTS: f64 = 20.0;
const MAX_TIME_BONUS: f64 = 5.0;
/// Survival grants a consumable every this many consecutive hits
const CONSUMABLE_STREAK_INTERVAL: u32 = 5;

/// Inputs to the score of one correct answer
#[derive(Debug, Clone, Copy)]
pub struct ScoreContext {
    pub mode: Mode,
    /// Session difficulty (solo/group)
    pub difficulty: Tier,
    /// Streak tier before this answer (survival)
    pub streak_tier: Tier,
    pub rapid_fire: bool,
    pub time_left: u32,
    pub time_budget: u32,
    pub double_score: bool,
}

/// Points awarded for a correct answer, rounded to the nearest integer
pub fn points_for_correct(ctx: ScoreContext) -> u32 {
    let mut points = if ctx.rapid_fire {
        RAPID_FIRE_POINTS
    } else {
        BASE_POINTS
    };

    match ctx.mode {
        Mode::Solo => points *= ctx.difficulty.multiplier(),
        Mode::Survival => points *= ctx.streak_tier.multiplier(),
        Mode::Group => {}
    }

    if ctx.mode != Mode::Survival && ctx.time_budget > 0 {
        let unused = f64::from(ctx.time_left.min(ctx.time_budget)) / f64::from(ctx.time_budget);
        points += (unused * MAX_TIME_BONUS).floor().min(MAX_TIME_BONUS);
    }

    if ctx.double_score {
        points *= 2.0;
    }

    points.round() as u32
}

impl RoundEngine {
    /// Answer the question on screen. `None` (or an empty string) is a timeout.
    pub fn submit_answer(&mut self, selection: Option<&str>) -> EngineResult<Vec<Effect>> {
        self.ensure_awaiting_answer()?;
        let question = self
            .questions
            .last()
            .cloned()
            .ok_or(EngineError::NotAwaitingAnswer("loading"))?;

        let selection = selection.filter(|s| !s.is_empty()).map(str::to_string);
        let correct = selection
            .as_deref()
            .map(|s| question.is_correct(s))
            .unwrap_or(false);
        let timed_out = selection.is_none();

        self.turn.answered = true;
        self.turn.selection = selection;
        self.turn.correct = Some(correct);
        self.turn.pending_target = None;
        self.answered_turns += 1;

        let player_id = self.current_player_id();
        let mut effects = Vec::new();

        if correct {
            let streak_tier = Tier::from_streak(self.streak);
            let points = points_for_correct(ScoreContext {
                mode: self.config.mode,
                difficulty: self.config.difficulty,
                streak_tier,
                rapid_fire: self.turn.rapid_fire,
                time_left: self.turn.time_left,
                time_budget: self.turn.time_budget,
                double_score: self.turn.double_score,
            });
            self.turn.double_score = false;
            let player = &mut self.players[self.current_player];
            player.score = player.score.saturating_add(points);

            effects.push(Effect::Notify(Notice::Answered {
                player_id: player_id.clone(),
                correct: true,
                points,
                timed_out: false,
            }));

            match self.config.mode {
                Mode::Survival => effects.extend(self.extend_streak(streak_tier)),
                Mode::Group if self.config.difficulty >= Tier::PaloERon => {
                    effects.extend(self.maybe_grant_power_up())
                }
                Mode::Solo | Mode::Group => {}
            }
        } else {
            self.turn.double_score = false;
            effects.push(Effect::Notify(Notice::Answered {
                player_id: player_id.clone(),
                correct: false,
                points: 0,
                timed_out,
            }));
            effects.push(Effect::Notify(Notice::Shake {
                player_id: player_id.clone(),
            }));

            if self.config.mode == Mode::Survival {
                self.streak = 0;
                if self.life_shield {
                    self.life_shield = false;
                    tracing::info!("Life shield absorbed a miss in {}", self.session_id);
                    effects.push(Effect::Notify(Notice::LifeSaved { player_id }));
                } else {
                    self.lives = self.lives.saturating_sub(1);
                    if self.lives == 0 {
                        self.phase = Phase::GameOver;
                        tracing::info!(
                            "Game over in {} (best streak {})",
                            self.session_id,
                            self.best_streak
                        );
                        effects.push(Effect::Notify(Notice::GameOver {
                            score: self.players[self.current_player].score,
                            best_streak: self.best_streak,
                        }));
                        return Ok(effects);
                    }
                }
            }
        }

        self.phase = Phase::TurnTransition;
        effects.push(Effect::ScheduleAdvance {
            turn: self.turn_seq,
            after: self.rules.advance_delay,
        });
        Ok(effects)
    }

    /// Survival bookkeeping after a hit: streak, level-up, periodic consumable
    fn extend_streak(&mut self, previous_tier: Tier) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.streak += 1;
        self.best_streak = self.best_streak.max(self.streak);

        let tier = Tier::from_streak(self.streak);
        if tier > previous_tier {
            tracing::info!("Level up to {} in {}", tier.label(), self.session_id);
            effects.push(Effect::Notify(Notice::LevelUp {
                tier,
                level: tier.level(),
            }));
        }

        if self.streak % CONSUMABLE_STREAK_INTERVAL == 0 {
            let kind = *SurvivalPowerUp::ALL
                .choose(&mut self.rng)
                .unwrap_or(&SurvivalPowerUp::Soplon);
            let player = &mut self.players[self.current_player];
            *player.consumables.entry(kind).or_insert(0) += 1;
            effects.push(Effect::Notify(Notice::ConsumableGranted {
                player_id: player.id.clone(),
                consumable: kind,
            }));
        }
        effects
    }

    fn maybe_grant_power_up(&mut self) -> Vec<Effect> {
        if !self.rng.random_bool(self.rules.power_up_chance) {
            return Vec::new();
        }
        let power_up = *GroupPowerUp::ALL
            .choose(&mut self.rng)
            .unwrap_or(&GroupPowerUp::HallacaDeOro);
        let player = &mut self.players[self.current_player];
        player.power_ups.push(power_up);
        tracing::debug!("{} earned {}", player.name, power_up.name());
        vec![Effect::Notify(Notice::PowerUpGranted {
            player_id: player.id.clone(),
            power_up,
        })]
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn ctx(mode: Mode) -> ScoreContext {
        ScoreContext {
            mode,
            difficulty: Tier::JugueteDeNino,
            streak_tier: Tier::JugueteDeNino,
            rapid_fire: false,
            time_left: 0,
            time_budget: 35,
            double_score: false,
        }
    }

    #[test]
    fn test_solo_multiplier_without_bonus() {
        let points = points_for_correct(ScoreContext {
            difficulty: Tier::PaloERon,
            ..ctx(Mode::Solo)
        });
        assert_eq!(points, 12);

        let points = points_for_correct(ScoreContext {
            difficulty: Tier::ElCanonazo,
            ..ctx(Mode::Solo)
        });
        assert_eq!(points, 15);
    }

    #[test]
    fn test_time_bonus_is_floored_and_capped() {
        let full = points_for_correct(ScoreContext {
            time_left: 35,
            ..ctx(Mode::Group)
        });
        assert_eq!(full, 15);

        // 20/35 * 5 = 2.86 -> 2
        let partial = points_for_correct(ScoreContext {
            time_left: 20,
            ..ctx(Mode::Group)
        });
        assert_eq!(partial, 12);

        // Survival never gets the bonus
        let survival = points_for_correct(ScoreContext {
            time_left: 35,
            ..ctx(Mode::Survival)
        });
        assert_eq!(survival, 10);
    }

    #[test]
    fn test_rapid_fire_and_double_score() {
        let points = points_for_correct(ScoreContext {
            rapid_fire: true,
            time_left: 3,
            time_budget: 3,
            double_score: true,
            ..ctx(Mode::Group)
        });
        assert_eq!(points, 50);
    }

    #[test]
    fn test_survival_uses_tier_before_increment() {
        let points = points_for_correct(ScoreContext {
            streak_tier: Tier::PaloERon,
            ..ctx(Mode::Survival)
        });
        assert_eq!(points, 12);
    }

    #[test]
    fn test_second_answer_is_noop() {
        let mut engine = started(SessionConfig::solo(Tier::JugueteDeNino, 3), quiet_rules());
        let answer = correct_answer(&engine);
        engine.submit_answer(Some(&answer)).unwrap();
        let score = engine.players()[0].score;

        let result = engine.submit_answer(Some(&answer));
        assert_eq!(result, Err(EngineError::AlreadyAnswered));
        assert_eq!(engine.players()[0].score, score);
        assert_eq!(engine.answered_turns(), 1);
    }

    #[test]
    fn test_answer_rejected_while_loading() {
        let mut engine = started(SessionConfig::solo(Tier::JugueteDeNino, 3), quiet_rules());
        let answer = correct_answer(&engine);
        let effects = engine.submit_answer(Some(&answer)).unwrap();
        engine.advance_turn(advance_of(&effects).unwrap()).unwrap();

        assert_eq!(*engine.phase(), Phase::Loading);
        assert_eq!(
            engine.submit_answer(Some("q1-correcta")),
            Err(EngineError::NotAwaitingAnswer("loading"))
        );
    }

    #[test]
    fn test_empty_selection_counts_as_wrong() {
        let mut engine = started(SessionConfig::solo(Tier::JugueteDeNino, 3), quiet_rules());
        let effects = engine.submit_answer(Some("")).unwrap();

        assert_eq!(engine.players()[0].score, 0);
        assert!(notices(&effects).iter().any(|n| matches!(
            n,
            Notice::Answered {
                correct: false,
                timed_out: true,
                ..
            }
        )));
        assert!(notices(&effects)
            .iter()
            .any(|n| matches!(n, Notice::Shake { .. })));
    }

    #[test]
    fn test_streak_and_level_up_in_survival() {
        let mut engine = started(SessionConfig::survival(3), quiet_rules());

        for _ in 0..5 {
            let answer = correct_answer(&engine);
            let effects = engine.submit_answer(Some(&answer)).unwrap();
            next_turn(&mut engine, &effects);
        }
        assert_eq!(engine.streak(), 5);
        assert_eq!(engine.players()[0].score, 50);

        // 5 -> 6 crosses into the second tier but scores with the first
        let answer = correct_answer(&engine);
        let effects = engine.submit_answer(Some(&answer)).unwrap();
        let level_ups: Vec<_> = notices(&effects)
            .into_iter()
            .filter(|n| matches!(n, Notice::LevelUp { .. }))
            .collect();
        assert_eq!(
            level_ups,
            vec![Notice::LevelUp {
                tier: Tier::PaloERon,
                level: 2
            }]
        );
        assert_eq!(engine.players()[0].score, 60);

        // Next fetch asks for the new tier
        let effects = engine.advance_turn(advance_of(&effects).unwrap()).unwrap();
        assert_eq!(fetch_of(&effects).unwrap().difficulty, Tier::PaloERon);
    }

    #[test]
    fn test_consumable_granted_every_five_hits() {
        let mut engine = started(SessionConfig::survival(3), quiet_rules());
        let mut granted = 0;
        for _ in 0..10 {
            let answer = correct_answer(&engine);
            let effects = engine.submit_answer(Some(&answer)).unwrap();
            granted += notices(&effects)
                .iter()
                .filter(|n| matches!(n, Notice::ConsumableGranted { .. }))
                .count();
            next_turn(&mut engine, &effects);
        }
        assert_eq!(granted, 2);
        let held: u32 = engine.players()[0].consumables.values().sum();
        assert_eq!(held, 2);
    }

    #[test]
    fn test_miss_resets_streak_and_costs_a_life() {
        let mut engine = started(SessionConfig::survival(3), quiet_rules());
        for _ in 0..3 {
            let answer = correct_answer(&engine);
            let effects = engine.submit_answer(Some(&answer)).unwrap();
            next_turn(&mut engine, &effects);
        }
        let answer = wrong_answer(&engine);
        engine.submit_answer(Some(&answer)).unwrap();

        assert_eq!(engine.streak(), 0);
        assert_eq!(engine.best_streak(), 3);
        assert_eq!(engine.lives(), 2);
        assert_eq!(*engine.phase(), Phase::TurnTransition);
    }

    #[test]
    fn test_random_survival_run_keeps_streak_invariants() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let mut dice = StdRng::seed_from_u64(2024);
        let mut engine = started(SessionConfig::survival(500), quiet_rules());
        let (mut streak, mut best, mut lives, mut shield) = (0, 0, 500, false);
        let mut score = 0;

        for _ in 0..400 {
            if !shield && dice.random_bool(0.15) {
                *engine.players[0]
                    .consumables
                    .entry(SurvivalPowerUp::MilagroSanto)
                    .or_insert(0) += 1;
                engine.use_consumable(SurvivalPowerUp::MilagroSanto).unwrap();
                shield = true;
            }

            let effects = if dice.random_bool(0.7) {
                let answer = correct_answer(&engine);
                streak += 1;
                engine.submit_answer(Some(&answer)).unwrap()
            } else {
                let answer = wrong_answer(&engine);
                streak = 0;
                if shield {
                    shield = false;
                } else {
                    lives -= 1;
                }
                engine.submit_answer(Some(&answer)).unwrap()
            };
            best = best.max(streak);

            assert_eq!(engine.streak(), streak);
            assert_eq!(engine.best_streak(), best);
            assert_eq!(engine.lives(), lives);
            assert_eq!(engine.tier(), Tier::from_streak(streak));
            assert!(engine.players()[0].score >= score);
            score = engine.players()[0].score;

            next_turn(&mut engine, &effects);
            // The next question is asked at the streak's tier
            assert_eq!(engine.question().unwrap().difficulty, Tier::from_streak(streak));
        }
        assert!(best >= 6, "the run should reach the second tier at least once");
    }

    #[test]
    fn test_last_life_is_game_over() {
        let mut engine = started(SessionConfig::survival(1), quiet_rules());
        let answer = correct_answer(&engine);
        let effects = engine.submit_answer(Some(&answer)).unwrap();
        next_turn(&mut engine, &effects);

        let answer = wrong_answer(&engine);
        let effects = engine.submit_answer(Some(&answer)).unwrap();

        assert_eq!(*engine.phase(), Phase::GameOver);
        assert_eq!(engine.lives(), 0);
        assert!(advance_of(&effects).is_none());
        assert!(notices(&effects).contains(&Notice::GameOver {
            score: 10,
            best_streak: 1
        }));

        // Frozen until acknowledged
        assert!(engine.tick().is_err());
        assert_eq!(engine.submit_answer(None), Err(EngineError::AlreadyAnswered));

        let effects = engine.acknowledge_game_over().unwrap();
        assert_eq!(*engine.phase(), Phase::Finished);
        let results = engine.results().unwrap();
        assert_eq!(results.survival_streak, Some(1));
        assert!(matches!(effects[0], Effect::Record(_)));
    }

    #[test]
    fn test_group_power_up_only_on_harder_tiers() {
        let rules = EngineConfig {
            power_up_chance: 1.0,
            ..quiet_rules()
        };
        let names = vec!["Ana".to_string(), "Luis".to_string()];

        let mut easy = started(
            SessionConfig::group(names.clone(), Tier::JugueteDeNino, 3),
            rules.clone(),
        );
        let answer = correct_answer(&easy);
        easy.submit_answer(Some(&answer)).unwrap();
        assert!(easy.players()[0].power_ups.is_empty());

        let mut hard = started(SessionConfig::group(names, Tier::ElCanonazo, 3), rules);
        let answer = correct_answer(&hard);
        let effects = hard.submit_answer(Some(&answer)).unwrap();
        assert_eq!(hard.players()[0].power_ups.len(), 1);
        assert!(notices(&effects)
            .iter()
            .any(|n| matches!(n, Notice::PowerUpGranted { .. })));
    }
}
