use super::*;
use rand::seq::SliceRandom;

impl RoundEngine {
    /// Activate one of the current group player's power-ups.
    ///
    /// The double-score buff takes effect immediately and leaves the inventory
    /// right away; it is lost if the turn ends without a correct answer.
    /// Offensive power-ups wait for `choose_target`.
    pub fn use_power_up(&mut self, power_up: GroupPowerUp) -> EngineResult<Vec<Effect>> {
        if self.config.mode != Mode::Group {
            return Err(EngineError::WrongMode(self.config.mode));
        }
        self.ensure_awaiting_answer()?;
        if self.turn.pending_target.is_some() {
            return Err(EngineError::TargetSelectionPending);
        }
        if !self.players[self.current_player]
            .power_ups
            .contains(&power_up)
        {
            return Err(EngineError::NotHeld(power_up.name()));
        }

        if power_up.malus().is_some() {
            self.turn.pending_target = Some(power_up);
            return Ok(Vec::new());
        }

        if self.turn.double_score {
            return Err(EngineError::AlreadyActive(power_up.name()));
        }
        self.take_power_up(power_up);
        self.turn.double_score = true;
        Ok(vec![Effect::Notify(Notice::DoubleScoreArmed {
            player_id: self.current_player_id(),
        })])
    }

    /// Drop a pending offensive power-up without using it
    pub fn cancel_target_selection(&mut self) -> EngineResult<()> {
        self.turn
            .pending_target
            .take()
            .map(|_| ())
            .ok_or(EngineError::NoPendingTarget)
    }

    /// Inflict the pending malus on another player. Replaces any malus they already carry.
    pub fn choose_target(&mut self, target: &PlayerId) -> EngineResult<Vec<Effect>> {
        self.ensure_awaiting_answer()?;
        let power_up = self
            .turn
            .pending_target
            .ok_or(EngineError::NoPendingTarget)?;
        let malus = power_up
            .malus()
            .ok_or(EngineError::InvalidTarget("power-up has no target".to_string()))?;

        let from = self.current_player_id();
        if *target == from {
            return Err(EngineError::InvalidTarget(
                "cannot target yourself".to_string(),
            ));
        }
        if !self.players.iter().any(|p| p.id == *target) {
            return Err(EngineError::InvalidTarget(format!(
                "unknown player {}",
                target
            )));
        }

        self.turn.pending_target = None;
        self.take_power_up(power_up);

        self.malus_seq += 1;
        let token = self.malus_seq;
        if let Some(replaced) = self.maluses.insert(
            target.clone(),
            ActiveMalus {
                kind: malus,
                from: from.clone(),
                token,
            },
        ) {
            tracing::debug!("{:?} on {} replaced by {:?}", replaced.kind, target, malus);
        }

        let mut effects = vec![Effect::Notify(Notice::MalusApplied {
            from,
            target: target.clone(),
            malus,
        })];
        match malus {
            Malus::Blind => effects.push(Effect::ScheduleExpiry {
                target: target.clone(),
                token,
                after: self.rules.blind_duration,
            }),
            Malus::Slow => effects.push(Effect::ScheduleExpiry {
                target: target.clone(),
                token,
                after: self.rules.slow_duration,
            }),
            // Lasts until the target completes their next turn
            Malus::Distraction => effects.push(Effect::Notify(Notice::Shake {
                player_id: target.clone(),
            })),
        }
        Ok(effects)
    }

    /// Remove a timed malus, unless it was already replaced or cleared
    pub fn expire_malus(&mut self, target: &PlayerId, token: u64) -> EngineResult<Vec<Effect>> {
        match self.maluses.get(target) {
            Some(active) if active.token == token => {
                let malus = active.kind;
                self.maluses.remove(target);
                Ok(vec![Effect::Notify(Notice::MalusExpired {
                    target: target.clone(),
                    malus,
                })])
            }
            _ => Err(EngineError::StaleEffect),
        }
    }

    fn take_power_up(&mut self, power_up: GroupPowerUp) {
        let held = &mut self.players[self.current_player].power_ups;
        if let Some(pos) = held.iter().position(|p| *p == power_up) {
            held.remove(pos);
        }
    }

    /// Spend one survival consumable; the charge is gone even if it ends up not mattering
    pub fn use_consumable(&mut self, kind: SurvivalPowerUp) -> EngineResult<Vec<Effect>> {
        if self.config.mode != Mode::Survival {
            return Err(EngineError::WrongMode(self.config.mode));
        }
        self.ensure_awaiting_answer()?;
        if self.players[self.current_player].charges(kind) == 0 {
            return Err(EngineError::NoCharges(kind.name()));
        }
        if kind == SurvivalPowerUp::MilagroSanto && self.life_shield {
            return Err(EngineError::AlreadyActive(kind.name()));
        }

        if let Some(count) = self.players[self.current_player]
            .consumables
            .get_mut(&kind)
        {
            *count -= 1;
        }

        match kind {
            SurvivalPowerUp::ChiguireLento => self.turn.extend_time = true,
            SurvivalPowerUp::Soplon => self.turn.revealed = true,
            SurvivalPowerUp::MediaHallaca => self.hide_two_wrong_options(),
            SurvivalPowerUp::MilagroSanto => self.life_shield = true,
        }

        Ok(vec![Effect::Notify(Notice::ConsumableUsed {
            player_id: self.current_player_id(),
            consumable: kind,
        })])
    }

    fn hide_two_wrong_options(&mut self) {
        if !self.turn.hidden.is_empty() {
            return;
        }
        let Some(question) = self.questions.last() else {
            return;
        };
        let mut wrong: Vec<usize> = (0..question.options.len())
            .filter(|i| question.options[*i] != question.answer)
            .collect();
        wrong.shuffle(&mut self.rng);
        wrong.truncate(2);
        wrong.sort_unstable();
        self.turn.hidden = wrong;
    }
}
