use super::*;

impl RoundEngine {
    /// Whether the acting player's clock currently runs at half speed
    pub fn is_slowed(&self) -> bool {
        let player_id = &self.players[self.current_player].id;
        self.turn.extend_time || self.malus_on(player_id) == Some(Malus::Slow)
    }

    /// Delay until the next tick, or `None` while the clock is suspended.
    /// Slow sources double the interval once; they never stack.
    pub fn tick_interval(&self) -> Option<Duration> {
        if self.phase != Phase::AwaitingAnswer || self.turn.answered {
            return None;
        }
        if self.is_slowed() {
            Some(self.rules.tick * 2)
        } else {
            Some(self.rules.tick)
        }
    }

    /// One countdown step. Reaching zero submits an empty answer exactly once.
    pub fn tick(&mut self) -> EngineResult<Vec<Effect>> {
        self.ensure_awaiting_answer()?;

        self.turn.time_left = self.turn.time_left.saturating_sub(1);
        if self.turn.time_left > 0 {
            return Ok(Vec::new());
        }

        tracing::debug!(
            "Time is up for {} on question {}",
            self.players[self.current_player].name,
            self.questions.len()
        );
        self.submit_answer(None)
    }
}
