//! Session driver: the async shell around one [`RoundEngine`].
//!
//! The driver owns the engine and is the only task that touches it. Client
//! messages, fetch results, scheduled advances and malus expiries all arrive
//! as events on channels and are applied one at a time, so no two
//! transitions ever interleave. The countdown is a deadline recomputed after
//! every event from [`RoundEngine::tick_interval`].

use crate::engine::{Effect, EngineResult, FetchTicket, RoundEngine};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::supply::{QuestionQuery, SupplyResult};
use crate::types::{PlayerId, Question};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Results of work the driver scheduled for itself
#[derive(Debug)]
enum DriverEvent {
    Loaded {
        ticket: FetchTicket,
        outcome: SupplyResult<Vec<Question>>,
    },
    Advance {
        turn: u64,
    },
    Expire {
        target: PlayerId,
        token: u64,
    },
}

pub struct SessionDriver {
    state: Arc<AppState>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    events_rx: mpsc::UnboundedReceiver<DriverEvent>,
    engine: Option<RoundEngine>,
    /// In-flight fetches and timers of the current session
    tasks: Vec<JoinHandle<()>>,
    next_tick: Option<(u64, Instant)>,
    seed: Option<u64>,
}

impl SessionDriver {
    pub fn new(state: Arc<AppState>, outbound: mpsc::UnboundedSender<ServerMessage>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state,
            outbound,
            events_tx,
            events_rx,
            engine: None,
            tasks: Vec::new(),
            next_tick: None,
            seed: None,
        }
    }

    /// Deterministic randomness for every session this driver starts
    pub fn seeded(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Process events until the client side hangs up
    pub async fn run(mut self, mut inbound: mpsc::UnboundedReceiver<ClientMessage>) {
        self.state.session_opened();

        loop {
            let deadline = self.next_tick.map(|(_, at)| at);
            tokio::select! {
                msg = inbound.recv() => match msg {
                    Some(msg) => self.handle_client(msg),
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                _ = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    self.next_tick = None;
                    self.apply(|engine| engine.tick());
                }
            }
            self.rearm_clock();
        }

        if let Some(engine) = self.engine.as_mut() {
            engine.abandon();
        }
        self.cancel_tasks();
        self.state.session_closed();
        tracing::debug!("Session driver stopped");
    }

    fn handle_client(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::Start { config } => self.start(config),
            ClientMessage::Answer { option } => {
                self.apply(|engine| engine.submit_answer(option.as_deref()))
            }
            ClientMessage::UsePowerUp { power_up } => {
                self.apply(|engine| engine.use_power_up(power_up))
            }
            ClientMessage::ChooseTarget { player_id } => {
                self.apply(|engine| engine.choose_target(&player_id))
            }
            ClientMessage::CancelTarget => self.apply(|engine| {
                engine.cancel_target_selection()?;
                Ok(Vec::new())
            }),
            ClientMessage::UseConsumable { consumable } => {
                self.apply(|engine| engine.use_consumable(consumable))
            }
            ClientMessage::Retry => self.apply(|engine| engine.retry_fetch()),
            ClientMessage::AcknowledgeGameOver => self.apply(|engine| engine.acknowledge_game_over()),
            ClientMessage::Leave => self.apply(|engine| {
                engine.abandon();
                Ok(Vec::new())
            }),
        }
    }

    fn handle_event(&mut self, event: DriverEvent) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let result = match event {
            DriverEvent::Loaded { ticket, outcome } => engine.question_loaded(ticket, outcome),
            DriverEvent::Advance { turn } => engine.advance_turn(turn),
            DriverEvent::Expire { target, token } => engine.expire_malus(&target, token),
        };
        match result {
            Ok(effects) => {
                self.perform(effects);
                self.send_state();
            }
            // Timers and fetches that lost a race are expected
            Err(e) => tracing::debug!("Ignoring scheduled event: {}", e),
        }
    }

    fn start(&mut self, config: crate::types::SessionConfig) {
        if let Err(msg) = config.validate() {
            self.send(ServerMessage::error("INVALID_CONFIG", msg));
            return;
        }

        if let Some(previous) = self.engine.as_mut() {
            previous.abandon();
        }
        self.cancel_tasks();
        self.next_tick = None;

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        match RoundEngine::start(config, self.state.engine_config.clone(), rng) {
            Ok((engine, effects)) => {
                self.engine = Some(engine);
                self.perform(effects);
                self.send_state();
            }
            Err(e) => self.send(ServerMessage::from(&e)),
        }
    }

    /// Run a client-initiated operation; rejections go back to the client as errors
    fn apply<F>(&mut self, op: F)
    where
        F: FnOnce(&mut RoundEngine) -> EngineResult<Vec<Effect>>,
    {
        let Some(engine) = self.engine.as_mut() else {
            self.send(ServerMessage::error("NO_SESSION", "No session has been started"));
            return;
        };
        let was_closed = engine.phase().is_closed();

        match op(engine) {
            Ok(effects) => {
                self.perform(effects);
                if !was_closed && self.engine.as_ref().is_some_and(|e| e.phase().is_closed()) {
                    self.cancel_tasks();
                }
                self.send_state();
            }
            Err(e) => {
                tracing::debug!("Rejected operation: {}", e);
                self.send(ServerMessage::from(&e));
            }
        }
    }

    fn perform(&mut self, effects: Vec<Effect>) {
        self.tasks.retain(|task| !task.is_finished());

        for effect in effects {
            match effect {
                Effect::Fetch(request) => {
                    let supplier = self.state.supplier.clone();
                    let tx = self.events_tx.clone();
                    self.tasks.push(tokio::spawn(async move {
                        let outcome = supplier.fetch(&QuestionQuery::from(&request)).await;
                        let _ = tx.send(DriverEvent::Loaded {
                            ticket: request.ticket,
                            outcome,
                        });
                    }));
                }
                Effect::ScheduleAdvance { turn, after } => {
                    let tx = self.events_tx.clone();
                    self.tasks.push(tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = tx.send(DriverEvent::Advance { turn });
                    }));
                }
                Effect::ScheduleExpiry {
                    target,
                    token,
                    after,
                } => {
                    let tx = self.events_tx.clone();
                    self.tasks.push(tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = tx.send(DriverEvent::Expire { target, token });
                    }));
                }
                Effect::Notify(notice) => self.send(ServerMessage::Notice { notice }),
                Effect::Record(results) => {
                    // Never blocks or fails the results screen
                    let sink = self.state.sink.clone();
                    let record = results.clone();
                    tokio::spawn(async move {
                        if let Err(e) = sink.record(&record).await {
                            tracing::warn!("Failed to record results of {}: {}", record.session_id, e);
                        }
                    });
                    self.send(ServerMessage::Finished {
                        achievements: results.achievements(),
                        results,
                    });
                }
            }
        }
    }

    /// Keep the countdown deadline in step with the engine's turn and clock speed
    fn rearm_clock(&mut self) {
        let Some(engine) = self.engine.as_ref() else {
            self.next_tick = None;
            return;
        };
        match engine.tick_interval() {
            None => self.next_tick = None,
            Some(interval) => {
                let turn = engine.turn_seq();
                match self.next_tick {
                    Some((armed_turn, _)) if armed_turn == turn => {}
                    _ => self.next_tick = Some((turn, Instant::now() + interval)),
                }
            }
        }
    }

    fn cancel_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    fn send_state(&self) {
        if let Some(engine) = self.engine.as_ref() {
            self.send(ServerMessage::state(engine.snapshot()));
        }
    }

    fn send(&self, msg: ServerMessage) {
        if self.outbound.send(msg).is_err() {
            tracing::debug!("Client is gone, dropping outbound message");
        }
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        self.cancel_tasks();
    }
}

/// Client-side handle: send messages in, read server messages out
pub struct DriverHandle {
    pub inbound: mpsc::UnboundedSender<ClientMessage>,
    pub outbound: mpsc::UnboundedReceiver<ServerMessage>,
    pub task: JoinHandle<()>,
}

/// Spawn a driver task with fresh channels
pub fn spawn(state: Arc<AppState>, seed: Option<u64>) -> DriverHandle {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let mut driver = SessionDriver::new(state, outbound_tx);
    if let Some(seed) = seed {
        driver = driver.seeded(seed);
    }
    DriverHandle {
        inbound: inbound_tx,
        outbound: outbound_rx,
        task: tokio::spawn(driver.run(inbound_rx)),
    }
}
