use super::*;
use crate::supply::SupplyError;
use rand::seq::SliceRandom;
use rand::Rng;

impl RoundEngine {
    /// Initialize a session and request its first question
    pub fn start(
        config: SessionConfig,
        rules: EngineConfig,
        rng: StdRng,
    ) -> EngineResult<(Self, Vec<Effect>)> {
        let names = config.player_names();
        if names.is_empty() {
            return Err(EngineError::InvalidConfig(
                "Session needs at least one player".to_string(),
            ));
        }
        if config.mode != Mode::Survival && config.num_questions == 0 {
            return Err(EngineError::InvalidConfig(
                "Target question count must be at least 1".to_string(),
            ));
        }
        if config.mode == Mode::Survival && config.lives == 0 {
            return Err(EngineError::InvalidConfig(
                "Survival needs at least one life".to_string(),
            ));
        }
        if rules.turn_ticks == 0 || rules.rapid_fire_ticks == 0 {
            return Err(EngineError::InvalidConfig(
                "Turn budgets must be at least one tick".to_string(),
            ));
        }
        for chance in [rules.rapid_fire_chance, rules.power_up_chance] {
            if !(0.0..=1.0).contains(&chance) {
                return Err(EngineError::InvalidConfig(format!(
                    "Probability {} is outside [0, 1]",
                    chance
                )));
            }
        }

        let players: Vec<Player> = names.into_iter().map(Player::new).collect();
        let lives = match config.mode {
            Mode::Survival => config.lives,
            Mode::Solo | Mode::Group => 0,
        };
        let turn = TurnState::new(rules.turn_ticks, false);

        let mut engine = Self {
            session_id: ulid::Ulid::new().to_string(),
            config,
            rules,
            rng,
            phase: Phase::Loading,
            players,
            current_player: 0,
            questions: Vec::new(),
            served: Vec::new(),
            display_order: [0, 1, 2, 3],
            turn,
            turn_seq: 0,
            fetch_seq: 0,
            pending_fetch: None,
            lives,
            streak: 0,
            best_streak: 0,
            maluses: HashMap::new(),
            malus_seq: 0,
            life_shield: false,
            answered_turns: 0,
            results: None,
        };

        tracing::info!(
            "Starting {:?} session {} with {} player(s)",
            engine.config.mode,
            engine.session_id,
            engine.players.len()
        );

        let fetch = engine.request_question();
        Ok((engine, vec![fetch]))
    }

    /// Enter the loading sub-state and describe the fetch to perform
    fn request_question(&mut self) -> Effect {
        self.fetch_seq += 1;
        let ticket = FetchTicket {
            session_id: self.session_id.clone(),
            question_no: self.questions.len(),
            seq: self.fetch_seq,
        };
        self.pending_fetch = Some(ticket.clone());
        self.phase = Phase::Loading;

        Effect::Fetch(FetchRequest {
            ticket,
            difficulty: self.tier(),
            category: self.config.category,
            count: 1,
            exclude: self.served.clone(),
        })
    }

    /// Feed the outcome of a fetch back in
    pub fn question_loaded(
        &mut self,
        ticket: FetchTicket,
        outcome: Result<Vec<Question>, SupplyError>,
    ) -> EngineResult<Vec<Effect>> {
        if self.phase.is_closed() || self.pending_fetch.as_ref() != Some(&ticket) {
            tracing::debug!(
                "Discarding stale fetch result for question {} (seq {})",
                ticket.question_no,
                ticket.seq
            );
            return Err(EngineError::StaleFetch);
        }
        self.pending_fetch = None;

        // A repeat is only taken when the batch holds nothing fresh
        let picked = outcome.and_then(|questions| {
            let mut valid: Vec<Question> = questions
                .into_iter()
                .filter(|q| q.validate().is_ok())
                .collect();
            let fresh = valid.iter().position(|q| !self.served.contains(&q.id));
            match fresh {
                Some(index) => Ok(valid.swap_remove(index)),
                None if !valid.is_empty() => Ok(valid.swap_remove(0)),
                None => Err(SupplyError::Empty),
            }
        });

        match picked {
            Ok(question) => {
                tracing::debug!(
                    "Question {} loaded: {}",
                    self.questions.len() + 1,
                    question.id
                );
                if let Some(pos) = self.served.iter().position(|id| *id == question.id) {
                    tracing::debug!("Repeating question {}", question.id);
                    self.served.remove(pos);
                }
                self.served.push(question.id.clone());
                self.questions.push(question);
                self.display_order.shuffle(&mut self.rng);
                self.start_clock();
                Ok(Vec::new())
            }
            Err(e) => {
                let message = e.to_string();
                if self.questions.is_empty() {
                    tracing::warn!("Session {} is unplayable: {}", self.session_id, message);
                    self.phase = Phase::Unplayable { message };
                    Ok(Vec::new())
                } else {
                    tracing::warn!(
                        "Fetching question {} failed: {}",
                        ticket.question_no + 1,
                        message
                    );
                    self.phase = Phase::SupplyFailed {
                        message: message.clone(),
                    };
                    Ok(vec![Effect::Notify(Notice::SupplyFailed { message })])
                }
            }
        }
    }

    /// Re-issue the fetch that failed mid-session
    pub fn retry_fetch(&mut self) -> EngineResult<Vec<Effect>> {
        match self.phase {
            Phase::SupplyFailed { .. } => Ok(vec![self.request_question()]),
            ref p if p.is_closed() => Err(EngineError::SessionClosed),
            _ => Err(EngineError::NothingToRetry),
        }
    }

    fn start_clock(&mut self) {
        self.turn.time_left = self.turn.time_budget;
        self.phase = Phase::AwaitingAnswer;
    }

    /// Move to the next turn: next player, next question, or the end
    pub fn advance_turn(&mut self, turn: u64) -> EngineResult<Vec<Effect>> {
        match self.phase {
            Phase::TurnTransition => {}
            ref p if p.is_closed() => return Err(EngineError::SessionClosed),
            ref p => return Err(EngineError::NotAwaitingAnswer(p.name())),
        }
        if turn != self.turn_seq {
            return Err(EngineError::StaleTurn(turn));
        }

        // The acting player has completed a turn, which ends any malus on them
        let finished_player = self.current_player_id();
        self.maluses.remove(&finished_player);

        let mut effects = Vec::new();
        let rapid_fire = self.config.mode == Mode::Group
            && self.rng.random_bool(self.rules.rapid_fire_chance);
        let budget = if rapid_fire {
            self.rules.rapid_fire_ticks
        } else {
            self.rules.turn_ticks
        };
        self.turn = TurnState::new(budget, rapid_fire);
        self.turn_seq += 1;

        let new_round = match self.config.mode {
            Mode::Group => {
                self.current_player = (self.current_player + 1) % self.players.len();
                self.current_player == 0
            }
            Mode::Solo | Mode::Survival => true,
        };

        if rapid_fire {
            effects.push(Effect::Notify(Notice::RapidFire {
                player_id: self.current_player_id(),
                ticks: budget,
            }));
        }

        if !new_round {
            // Same question, next player in the round
            self.start_clock();
            return Ok(effects);
        }

        let exhausted = self.config.mode != Mode::Survival
            && self.questions.len() as u32 >= self.config.num_questions;
        if exhausted {
            effects.extend(self.finish());
        } else {
            effects.push(self.request_question());
        }
        Ok(effects)
    }

    /// Close a survival session after its game-over screen
    pub fn acknowledge_game_over(&mut self) -> EngineResult<Vec<Effect>> {
        if self.phase != Phase::GameOver {
            return Err(EngineError::NotGameOver);
        }
        Ok(self.finish())
    }

    /// Produce the final results and close the session
    fn finish(&mut self) -> Vec<Effect> {
        let results = GameResults {
            session_id: self.session_id.clone(),
            mode: self.config.mode,
            category: self.config.category,
            scores: self
                .players
                .iter()
                .map(|p| PlayerScore {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    score: p.score,
                })
                .collect(),
            survival_streak: (self.config.mode == Mode::Survival).then_some(self.best_streak),
            finished_at: chrono::Utc::now().to_rfc3339(),
        };

        tracing::info!(
            "Session {} finished after {} answered turns",
            self.session_id,
            self.answered_turns
        );

        self.phase = Phase::Finished;
        self.pending_fetch = None;
        self.maluses.clear();
        self.results = Some(results.clone());
        vec![Effect::Record(results)]
    }

    /// Leave the session; later events (including in-flight fetches) are ignored
    pub fn abandon(&mut self) {
        if self.phase.is_closed() {
            return;
        }
        tracing::info!("Session {} abandoned", self.session_id);
        self.phase = Phase::Abandoned;
        self.pending_fetch = None;
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_start_rejects_empty_player_list() {
        let config = SessionConfig::group(Vec::new(), Tier::JugueteDeNino, 5);
        let result = RoundEngine::start(config, quiet_rules(), StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_start_rejects_zero_question_count() {
        let config = SessionConfig::solo(Tier::JugueteDeNino, 0);
        let result = RoundEngine::start(config, quiet_rules(), StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_start_requests_first_question() {
        let config = SessionConfig::solo(Tier::ElCanonazo, 3);
        let (engine, effects) =
            RoundEngine::start(config, quiet_rules(), StdRng::seed_from_u64(1)).unwrap();

        assert_eq!(*engine.phase(), Phase::Loading);
        assert!(engine.question().is_none());
        let request = fetch_of(&effects).unwrap();
        assert_eq!(request.difficulty, Tier::ElCanonazo);
        assert_eq!(request.count, 1);
        assert!(request.exclude.is_empty());
        assert_eq!(request.ticket.question_no, 0);
    }

    #[test]
    fn test_survival_always_starts_on_first_tier() {
        let mut config = SessionConfig::survival(3);
        config.difficulty = Tier::ElCanonazo;
        let (_, effects) =
            RoundEngine::start(config, quiet_rules(), StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(fetch_of(&effects).unwrap().difficulty, Tier::JugueteDeNino);
    }

    #[test]
    fn test_initial_fetch_failure_is_unplayable() {
        let config = SessionConfig::solo(Tier::JugueteDeNino, 3);
        let (mut engine, effects) =
            RoundEngine::start(config, quiet_rules(), StdRng::seed_from_u64(1)).unwrap();
        let request = fetch_of(&effects).unwrap();

        engine
            .question_loaded(request.ticket, Err(SupplyError::Empty))
            .unwrap();

        assert!(matches!(engine.phase(), Phase::Unplayable { .. }));
        assert_eq!(engine.retry_fetch(), Err(EngineError::SessionClosed));
        assert_eq!(engine.submit_answer(None), Err(EngineError::SessionClosed));
    }

    #[test]
    fn test_mid_session_failure_is_recoverable() {
        let mut engine = started(SessionConfig::solo(Tier::JugueteDeNino, 3), quiet_rules());
        let answer = correct_answer(&engine);
        let effects = engine.submit_answer(Some(&answer)).unwrap();
        let score = engine.players()[0].score;

        let effects = engine.advance_turn(advance_of(&effects).unwrap()).unwrap();
        let request = fetch_of(&effects).unwrap();
        let effects = engine
            .question_loaded(request.ticket, Err(SupplyError::Empty))
            .unwrap();

        assert!(matches!(engine.phase(), Phase::SupplyFailed { .. }));
        assert!(matches!(
            notices(&effects)[0],
            Notice::SupplyFailed { .. }
        ));
        assert_eq!(engine.players()[0].score, score);

        let effects = engine.retry_fetch().unwrap();
        let retry = fetch_of(&effects).unwrap();
        assert_eq!(retry.ticket.question_no, 1);
        assert_eq!(retry.exclude, vec!["q0".to_string()]);

        engine
            .question_loaded(retry.ticket, Ok(vec![question("q1", Tier::JugueteDeNino)]))
            .unwrap();
        assert_eq!(*engine.phase(), Phase::AwaitingAnswer);
        assert_eq!(engine.questions_served(), 2);
    }

    #[test]
    fn test_stale_fetch_is_discarded() {
        let config = SessionConfig::solo(Tier::JugueteDeNino, 3);
        let (mut engine, effects) =
            RoundEngine::start(config, quiet_rules(), StdRng::seed_from_u64(1)).unwrap();
        let request = fetch_of(&effects).unwrap();

        let mut wrong = request.ticket.clone();
        wrong.seq += 10;
        let result =
            engine.question_loaded(wrong, Ok(vec![question("zz", Tier::JugueteDeNino)]));
        assert_eq!(result, Err(EngineError::StaleFetch));
        assert_eq!(*engine.phase(), Phase::Loading);
    }

    #[test]
    fn test_abandoned_session_ignores_late_fetch() {
        let config = SessionConfig::solo(Tier::JugueteDeNino, 3);
        let (mut engine, effects) =
            RoundEngine::start(config, quiet_rules(), StdRng::seed_from_u64(1)).unwrap();
        let request = fetch_of(&effects).unwrap();

        engine.abandon();
        let result = engine.question_loaded(
            request.ticket,
            Ok(vec![question("q0", Tier::JugueteDeNino)]),
        );

        assert_eq!(result, Err(EngineError::StaleFetch));
        assert_eq!(*engine.phase(), Phase::Abandoned);
        assert_eq!(engine.questions_served(), 0);
    }

    #[test]
    fn test_repeated_and_invalid_questions_are_skipped() {
        let mut engine = started(SessionConfig::solo(Tier::JugueteDeNino, 3), quiet_rules());
        let answer = correct_answer(&engine);
        let effects = engine.submit_answer(Some(&answer)).unwrap();
        let effects = engine.advance_turn(advance_of(&effects).unwrap()).unwrap();
        let request = fetch_of(&effects).unwrap();

        let mut broken = question("q9", Tier::JugueteDeNino);
        broken.answer = "nope".to_string();
        engine
            .question_loaded(
                request.ticket,
                Ok(vec![
                    question("q0", Tier::JugueteDeNino),
                    broken,
                    question("q1", Tier::JugueteDeNino),
                ]),
            )
            .unwrap();

        assert_eq!(engine.question().unwrap().id, "q1");
    }

    #[test]
    fn test_repeat_accepted_when_nothing_fresh_and_moves_to_back() {
        let mut engine = started(SessionConfig::solo(Tier::JugueteDeNino, 5), quiet_rules());
        let answer = correct_answer(&engine);
        let effects = engine.submit_answer(Some(&answer)).unwrap();
        next_turn(&mut engine, &effects);
        assert_eq!(engine.question().unwrap().id, "q1");

        let answer = correct_answer(&engine);
        let effects = engine.submit_answer(Some(&answer)).unwrap();
        let effects = engine.advance_turn(advance_of(&effects).unwrap()).unwrap();
        let request = fetch_of(&effects).unwrap();
        // Oldest first
        assert_eq!(request.exclude, vec!["q0".to_string(), "q1".to_string()]);

        engine
            .question_loaded(request.ticket, Ok(vec![question("q0", Tier::JugueteDeNino)]))
            .unwrap();
        assert_eq!(*engine.phase(), Phase::AwaitingAnswer);
        assert_eq!(engine.question().unwrap().id, "q0");

        let answer = correct_answer(&engine);
        let effects = engine.submit_answer(Some(&answer)).unwrap();
        let effects = engine.advance_turn(advance_of(&effects).unwrap()).unwrap();
        let request = fetch_of(&effects).unwrap();
        assert_eq!(request.exclude, vec!["q1".to_string(), "q0".to_string()]);
    }

    #[test]
    fn test_solo_ends_after_configured_count() {
        let mut engine = started(SessionConfig::solo(Tier::JugueteDeNino, 3), quiet_rules());

        for _ in 0..2 {
            let answer = correct_answer(&engine);
            let effects = engine.submit_answer(Some(&answer)).unwrap();
            next_turn(&mut engine, &effects);
            assert_eq!(*engine.phase(), Phase::AwaitingAnswer);
        }

        let answer = correct_answer(&engine);
        let effects = engine.submit_answer(Some(&answer)).unwrap();
        let effects = engine.advance_turn(advance_of(&effects).unwrap()).unwrap();

        assert_eq!(*engine.phase(), Phase::Finished);
        let results = engine.results().unwrap();
        assert_eq!(results.mode, Mode::Solo);
        assert!(results.survival_streak.is_none());
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Record(r) if r == results)));
    }

    #[test]
    fn test_group_round_robin_and_question_pointer() {
        let names = vec!["Ana".to_string(), "Luis".to_string(), "Rosa".to_string()];
        let mut engine = started(
            SessionConfig::group(names, Tier::JugueteDeNino, 2),
            quiet_rules(),
        );

        let mut visited = Vec::new();
        for _ in 0..3 {
            visited.push(engine.current_player_index());
            assert_eq!(engine.questions_served(), 1);
            let answer = wrong_answer(&engine);
            let effects = engine.submit_answer(Some(&answer)).unwrap();
            next_turn(&mut engine, &effects);
        }

        assert_eq!(visited, vec![0, 1, 2]);
        assert_eq!(engine.current_player_index(), 0);
        assert_eq!(engine.questions_served(), 2);
        assert_eq!(engine.question().unwrap().id, "q1");
    }

    #[test]
    fn test_stale_advance_is_rejected() {
        let mut engine = started(SessionConfig::solo(Tier::JugueteDeNino, 3), quiet_rules());
        let answer = correct_answer(&engine);
        let effects = engine.submit_answer(Some(&answer)).unwrap();
        let turn = advance_of(&effects).unwrap();

        assert_eq!(
            engine.advance_turn(turn + 1),
            Err(EngineError::StaleTurn(turn + 1))
        );
        assert!(engine.advance_turn(turn).is_ok());
        // The same scheduled advance firing twice is rejected
        assert!(engine.advance_turn(turn).is_err());
    }

    #[test]
    fn test_rapid_fire_only_in_group_mode() {
        let rules = EngineConfig {
            rapid_fire_chance: 1.0,
            ..quiet_rules()
        };

        let mut solo = started(SessionConfig::solo(Tier::JugueteDeNino, 3), rules.clone());
        let answer = correct_answer(&solo);
        let effects = solo.submit_answer(Some(&answer)).unwrap();
        next_turn(&mut solo, &effects);
        assert!(!solo.is_rapid_fire());
        assert_eq!(solo.time_left(), 35);

        let names = vec!["Ana".to_string(), "Luis".to_string()];
        let mut group = started(SessionConfig::group(names, Tier::JugueteDeNino, 3), rules);
        let answer = correct_answer(&group);
        let effects = group.submit_answer(Some(&answer)).unwrap();
        let effects = next_turn(&mut group, &effects);

        assert!(group.is_rapid_fire());
        assert_eq!(group.time_left(), 3);
        assert!(notices(&effects)
            .iter()
            .any(|n| matches!(n, Notice::RapidFire { ticks: 3, .. })));
    }
}
