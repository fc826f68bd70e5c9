//! The control room: single owner of all mutable studio state.
//!
//! One task owns the mental-state tracker, the breakdown flag, the
//! history, the rotation clock, and the RNG. Everything else talks to
//! it through a [`ControlRoomHandle`] (commands with oneshot replies)
//! or listens on the event bus. During a breakdown the inter-stage
//! delays stay responsive to commands and shutdown, but every command
//! observes `in_breakdown == true`, which is what keeps the
//! one-breakdown-at-a-time invariant without any locking.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::broadcast::events::EventBus;
use crate::broadcast::rotation::RotationTimer;
use crate::broadcast::schedule::ProgramSchedule;
use crate::broadcast::sequencer::{BreakdownHistory, BreakdownRecord, BreakdownStage};
use crate::broadcast::trigger::{TriggerEvaluator, TriggerReason};
use crate::config::TriggerSettings;
use crate::dialogue::{DialogueLine, DialogueSource, fallback_line};
use crate::error::{Error, Result};
use crate::personas::{MentalStateTracker, Persona, PersonaRegistry, PersonaState};

/// Runtime configuration for the control room.
#[derive(Debug, Clone)]
pub struct ControlRoomConfig {
    /// Scheduler tick interval.
    pub tick_interval: Duration,
    /// Anchor rotation interval.
    pub rotation_interval: Duration,
    /// Minimum inter-stage delay during a breakdown.
    pub stage_delay_min: Duration,
    /// Maximum inter-stage delay during a breakdown.
    pub stage_delay_max: Duration,
    /// Timeout for the dialogue collaborator per stage.
    pub dialogue_timeout: Duration,
    /// Breakdown trigger and mental-state tuning.
    pub triggers: TriggerSettings,
    /// Maximum breakdown records retained.
    pub history_capacity: usize,
}

impl Default for ControlRoomConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            rotation_interval: Duration::from_secs(300),
            stage_delay_min: Duration::from_secs(2),
            stage_delay_max: Duration::from_secs(5),
            dialogue_timeout: Duration::from_secs(10),
            triggers: TriggerSettings::default(),
            history_capacity: 100,
        }
    }
}

/// Point-in-time view of the studio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    /// Persona ID of the anchor at the desk.
    pub on_air: String,
    /// Show currently on the schedule, if any.
    pub show: Option<String>,
    /// Whether a breakdown is in progress.
    pub in_breakdown: bool,
    /// Stage currently airing, when in a breakdown.
    pub current_stage: Option<BreakdownStage>,
    /// Breakdowns since the process started (including evicted records).
    pub breakdown_count: usize,
    /// When the natural timer next comes due.
    pub next_breakdown_time: DateTime<Utc>,
    /// Current drift-trigger probability.
    pub drift_probability: f64,
    /// Mental state of every anchor, ordered by persona ID.
    pub personas: Vec<PersonaState>,
    /// Seconds since the control room went on air.
    pub uptime_secs: u64,
}

/// Forecast of the next breakdown, derived from current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownPrediction {
    /// When the natural timer comes due.
    pub predicted_time: DateTime<Utc>,
    /// How sure the network is, 0..=100.
    pub confidence_percent: u8,
    /// Minutes until the predicted time (0 when due or in progress).
    pub time_until_minutes: i64,
    /// Observable omens, most severe first.
    pub warning_signs: Vec<String>,
}

/// Commands accepted by the control room.
enum Command {
    SubmitComment {
        text: String,
        reply: oneshot::Sender<bool>,
    },
    ForceBreakdown {
        reply: oneshot::Sender<Result<()>>,
    },
    Status {
        reply: oneshot::Sender<StatusReport>,
    },
    Prediction {
        reply: oneshot::Sender<BreakdownPrediction>,
    },
    History {
        limit: usize,
        reply: oneshot::Sender<Vec<BreakdownRecord>>,
    },
}

/// Client handle to the control room task.
#[derive(Clone)]
pub struct ControlRoomHandle {
    tx: mpsc::Sender<Command>,
}

impl ControlRoomHandle {
    /// Feed a viewer comment to the trigger evaluator.
    ///
    /// Returns whether the comment started a breakdown.
    pub async fn submit_comment(&self, text: impl Into<String>) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::SubmitComment {
                text: text.into(),
                reply: tx,
            })
            .await
            .map_err(|_| Error::ControlRoomClosed)?;
        rx.await.map_err(|_| Error::ControlRoomClosed)
    }

    /// Administrative override: start a breakdown now.
    pub async fn force_breakdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::ForceBreakdown { reply: tx })
            .await
            .map_err(|_| Error::ControlRoomClosed)?;
        rx.await.map_err(|_| Error::ControlRoomClosed)?
    }

    /// Snapshot the studio state.
    pub async fn status(&self) -> Result<StatusReport> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::Status { reply: tx })
            .await
            .map_err(|_| Error::ControlRoomClosed)?;
        rx.await.map_err(|_| Error::ControlRoomClosed)
    }

    /// Forecast the next breakdown.
    pub async fn prediction(&self) -> Result<BreakdownPrediction> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::Prediction { reply: tx })
            .await
            .map_err(|_| Error::ControlRoomClosed)?;
        rx.await.map_err(|_| Error::ControlRoomClosed)
    }

    /// The most recent breakdown records, newest last.
    pub async fn history(&self, limit: usize) -> Result<Vec<BreakdownRecord>> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::History { limit, reply: tx })
            .await
            .map_err(|_| Error::ControlRoomClosed)?;
        rx.await.map_err(|_| Error::ControlRoomClosed)
    }
}

/// What the run loop decided to do next.
enum Step {
    Tick,
    Command(Command),
    Shutdown,
}

/// The control room task.
pub struct ControlRoom {
    config: ControlRoomConfig,
    registry: Arc<PersonaRegistry>,
    dialogue: Arc<dyn DialogueSource>,
    events: Arc<EventBus>,
    schedule: ProgramSchedule,
    evaluator: TriggerEvaluator,
    tracker: MentalStateTracker,
    rotation: RotationTimer,
    history: BreakdownHistory,
    rng: StdRng,
    rx: mpsc::Receiver<Command>,
    shutdown: broadcast::Receiver<()>,

    on_air: String,
    current_show: Option<String>,
    in_breakdown: bool,
    current_stage: Option<BreakdownStage>,
    last_breakdown: DateTime<Utc>,
    next_breakdown_time: DateTime<Utc>,
    last_tick: DateTime<Utc>,
    started_at: DateTime<Utc>,
    pending_trigger: Option<TriggerReason>,
    total_breakdowns: usize,
    shutting_down: bool,
}

/// Spawn the control room task, returning a handle to it.
pub fn spawn(
    config: ControlRoomConfig,
    registry: Arc<PersonaRegistry>,
    dialogue: Arc<dyn DialogueSource>,
    events: Arc<EventBus>,
    shutdown: broadcast::Receiver<()>,
) -> Result<(ControlRoomHandle, JoinHandle<()>)> {
    let (tx, rx) = mpsc::channel(64);
    let room = ControlRoom::new(config, registry, dialogue, events, rx, shutdown)?;
    let join = tokio::spawn(room.run());
    Ok((ControlRoomHandle { tx }, join))
}

impl ControlRoom {
    fn new(
        config: ControlRoomConfig,
        registry: Arc<PersonaRegistry>,
        dialogue: Arc<dyn DialogueSource>,
        events: Arc<EventBus>,
        rx: mpsc::Receiver<Command>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<Self> {
        let now = Utc::now();
        let on_air = registry.first_on_air()?.id.clone();
        let tracker = MentalStateTracker::new(&registry.rotation_ids());
        let evaluator = TriggerEvaluator::new(config.triggers.clone());
        let mut rng = StdRng::from_os_rng();
        let next_breakdown_time = evaluator.next_breakdown_after(now, &mut rng);

        Ok(Self {
            rotation: RotationTimer::new(config.rotation_interval, now),
            history: BreakdownHistory::new(config.history_capacity),
            schedule: ProgramSchedule::default_lineup(),
            config,
            registry,
            dialogue,
            events,
            evaluator,
            tracker,
            rng,
            rx,
            shutdown,
            on_air,
            current_show: None,
            in_breakdown: false,
            current_stage: None,
            last_breakdown: now,
            next_breakdown_time,
            last_tick: now,
            started_at: now,
            pending_trigger: None,
            total_breakdowns: 0,
            shutting_down: false,
        })
    }

    /// Main loop: multiplex the tick clock, the command channel, and
    /// the shutdown signal.
    async fn run(mut self) {
        log::info!(
            "control room on air: anchor={} next breakdown expected at {}",
            self.on_air,
            self.next_breakdown_time
        );

        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick completes immediately; swallow it.
        tick.tick().await;

        loop {
            let step = tokio::select! {
                _ = tick.tick() => Step::Tick,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => Step::Command(cmd),
                    None => Step::Shutdown,
                },
                _ = self.shutdown.recv() => Step::Shutdown,
            };

            match step {
                Step::Tick => self.on_tick(Utc::now()).await,
                Step::Command(cmd) => self.handle_command(cmd),
                Step::Shutdown => break,
            }

            if let Some(reason) = self.pending_trigger.take() {
                self.run_breakdown(reason).await;
                if self.shutting_down {
                    break;
                }
            }
        }

        log::info!("control room signing off after {} breakdowns", self.total_breakdowns);
    }

    /// One scheduler tick: advance mental state, follow the schedule,
    /// evaluate triggers, rotate the desk.
    async fn on_tick(&mut self, now: DateTime<Utc>) {
        let delta_ms = (now - self.last_tick).num_milliseconds().max(0) as u64;
        self.last_tick = now;
        self.tracker
            .tick(Duration::from_millis(delta_ms), self.evaluator.settings(), &mut self.rng);

        if let Some(window) = self.schedule.show_at(now.time())
            && self.current_show.as_deref() != Some(window.show_name.as_str())
        {
            let show_name = window.show_name.clone();
            log::info!("now showing: {}", show_name);
            self.current_show = Some(show_name.clone());
            self.events.show_changed(&show_name).await;
        }

        let minutes_left = (self.next_breakdown_time - now).num_minutes();
        self.tracker.set_breakdown_imminent(minutes_left <= 30);

        // Mutual exclusion: the evaluator is never consulted mid-breakdown.
        if self.in_breakdown {
            return;
        }

        if let Some(reason) = self
            .evaluator
            .evaluate(now, self.last_breakdown, self.next_breakdown_time, &mut self.rng)
        {
            self.pending_trigger = Some(reason);
        } else if self.rotation.maybe_rotate(now, self.in_breakdown) {
            self.rotate(now).await;
        }
    }

    async fn rotate(&mut self, now: DateTime<Utc>) {
        match self.registry.next_on_air(&self.on_air) {
            Ok(next) => {
                let from = std::mem::replace(&mut self.on_air, next.id.clone());
                self.rotation.mark_rotated(now);
                log::info!("anchor rotation: {} hands the desk to {}", from, self.on_air);
                self.events.anchor_rotated(&from, &self.on_air).await;
            }
            Err(e) => log::warn!("rotation skipped: {}", e),
        }
    }

    /// Handle one command. Synchronous on purpose: replies are cheap
    /// state reads, and trigger requests only set `pending_trigger` for
    /// the main loop to pick up, so this is safe to call from inside a
    /// running breakdown without reentrancy.
    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::SubmitComment { text, reply } => {
                let matched = self.evaluator.check_comment(&text);
                let triggered = matched && !self.in_breakdown;
                if triggered {
                    log::info!("viewer comment struck a nerve: {:?}", text);
                    self.pending_trigger = Some(TriggerReason::Comment);
                } else if matched {
                    log::debug!("comment matched mid-breakdown, ignored: {:?}", text);
                }
                let _ = reply.send(triggered);
            }

            Command::ForceBreakdown { reply } => {
                if self.in_breakdown {
                    let _ = reply.send(Err(Error::BreakdownInProgress));
                } else {
                    self.pending_trigger = Some(TriggerReason::Forced);
                    let _ = reply.send(Ok(()));
                }
            }

            Command::Status { reply } => {
                let _ = reply.send(self.status(Utc::now()));
            }

            Command::Prediction { reply } => {
                let _ = reply.send(self.prediction(Utc::now()));
            }

            Command::History { limit, reply } => {
                let _ = reply.send(self.history.recent(limit));
            }
        }
    }

    fn status(&self, now: DateTime<Utc>) -> StatusReport {
        StatusReport {
            on_air: self.on_air.clone(),
            show: self.current_show.clone(),
            in_breakdown: self.in_breakdown,
            current_stage: self.current_stage,
            breakdown_count: self.total_breakdowns,
            next_breakdown_time: self.next_breakdown_time,
            drift_probability: self.evaluator.drift_probability(now, self.last_breakdown),
            personas: self.tracker.snapshot(),
            uptime_secs: (now - self.started_at).num_seconds().max(0) as u64,
        }
    }

    fn prediction(&self, now: DateTime<Utc>) -> BreakdownPrediction {
        if self.in_breakdown {
            return BreakdownPrediction {
                predicted_time: now,
                confidence_percent: 100,
                time_until_minutes: 0,
                warning_signs: vec!["it is happening right now".to_string()],
            };
        }

        let minutes = (self.next_breakdown_time - now).num_minutes().max(0);
        let window_minutes = (self.config.triggers.breakdown_window_max_hours * 60.0).max(1.0);
        let confidence = (95.0 - 75.0 * (minutes as f64 / window_minutes).min(1.0)) as u8;

        let mut warning_signs = Vec::new();
        if minutes <= 30 {
            warning_signs.push("breakdown window closing".to_string());
        }
        if self.evaluator.drift_probability(now, self.last_breakdown) >= self.config.triggers.drift_cap {
            warning_signs.push("drift probability at ceiling".to_string());
        }
        if self.tracker.peak_confusion() >= 70 {
            warning_signs.push("anchors questioning the teleprompter".to_string());
        }
        if self.tracker.floor_sanity() <= 30 {
            warning_signs.push("sanity reserves critically low".to_string());
        }
        if self.tracker.snapshot().iter().any(|s| s.hours_awake >= 24.0) {
            warning_signs.push("no anchor has slept since launch".to_string());
        }

        BreakdownPrediction {
            predicted_time: self.next_breakdown_time,
            confidence_percent: confidence.clamp(5, 99),
            time_until_minutes: minutes,
            warning_signs,
        }
    }

    /// Walk the six stages in order, emitting dialogue per stage. The
    /// sequence always reaches `finalize_breakdown`, even on shutdown.
    async fn run_breakdown(&mut self, reason: TriggerReason) {
        let started_at = Utc::now();
        self.in_breakdown = true;
        self.total_breakdowns += 1;
        self.tracker.apply_breakdown_effects();

        let persona_id = self.on_air.clone();
        log::info!(
            "breakdown #{} on air: anchor={} reason={}",
            self.total_breakdowns,
            persona_id,
            reason
        );
        self.events.breakdown_started(&persona_id, reason).await;

        let mut stages_aired = 0;
        for stage in BreakdownStage::ALL {
            self.current_stage = Some(stage);

            let delay = self.stage_delay();
            if !self.responsive_sleep(delay).await {
                log::warn!("shutdown mid-breakdown at stage {}; finalizing early", stage);
                self.finalize_breakdown(reason, started_at, stages_aired, false).await;
                return;
            }

            let lines = self.stage_lines(stage).await;
            self.events.breakdown_stage(&persona_id, stage, &lines).await;
            stages_aired += 1;
        }

        self.finalize_breakdown(reason, started_at, stages_aired, true).await;
    }

    /// Write the record, clear the flag, recover the desk, rearm the
    /// timer. Runs for aborted sequences too, so state is never stuck.
    async fn finalize_breakdown(
        &mut self,
        reason: TriggerReason,
        started_at: DateTime<Utc>,
        stages_aired: usize,
        completed: bool,
    ) {
        let now = Utc::now();
        let persona_id = self.on_air.clone();
        self.history
            .push(BreakdownRecord::new(&persona_id, reason, started_at, now, stages_aired, completed));
        self.in_breakdown = false;
        self.current_stage = None;
        self.tracker.apply_recovery();
        self.last_breakdown = now;
        self.next_breakdown_time = self.evaluator.next_breakdown_after(now, &mut self.rng);

        log::info!(
            "breakdown ended: completed={} stages={} next expected at {}",
            completed,
            stages_aired,
            self.next_breakdown_time
        );
        self.events.breakdown_ended(&persona_id, completed, stages_aired).await;
    }

    /// Sample the inter-stage pacing delay.
    fn stage_delay(&mut self) -> Duration {
        let min = self.config.stage_delay_min;
        let max = self.config.stage_delay_max.max(min);
        if max > min {
            let span = (max - min).as_secs_f64();
            min + Duration::from_secs_f64(self.rng.random_range(0.0..=span))
        } else {
            min
        }
    }

    /// Sleep for `delay` while still serving commands. Returns false
    /// when shutdown was requested.
    async fn responsive_sleep(&mut self, delay: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + delay;
        loop {
            let step = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => Step::Tick,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => Step::Command(cmd),
                    None => Step::Shutdown,
                },
                _ = self.shutdown.recv() => Step::Shutdown,
            };
            match step {
                Step::Tick => return true,
                Step::Command(cmd) => self.handle_command(cmd),
                Step::Shutdown => {
                    self.shutting_down = true;
                    return false;
                }
            }
        }
    }

    /// Fetch a stage's dialogue under the collaborator timeout, falling
    /// back to the canned line on any failure. The show must go on.
    async fn stage_lines(&self, stage: BreakdownStage) -> Vec<DialogueLine> {
        let fallback = || vec![DialogueLine::new(&self.on_air, fallback_line(stage))];

        let on_air = match self.registry.get(&self.on_air) {
            Ok(persona) => persona.clone(),
            Err(e) => {
                log::error!("on-air anchor missing from registry: {}", e);
                return fallback();
            }
        };
        let desk: Vec<Persona> = self.registry.on_rotation().into_iter().cloned().collect();

        match tokio::time::timeout(
            self.config.dialogue_timeout,
            self.dialogue.stage_dialogue(stage, &on_air, &desk),
        )
        .await
        {
            Ok(Ok(lines)) if !lines.is_empty() => lines,
            Ok(Ok(_)) => {
                log::warn!("dialogue source returned nothing for stage {}", stage);
                fallback()
            }
            Ok(Err(e)) => {
                log::warn!("dialogue generation failed for stage {}: {}", stage, e);
                fallback()
            }
            Err(_) => {
                log::warn!("dialogue generation timed out for stage {}", stage);
                fallback()
            }
        }
    }
}

/// Periodically snapshot the studio through `handle` and log it.
///
/// Read-only: the metrics loop never mutates scheduler state.
pub async fn metrics_loop(handle: ControlRoomHandle, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.recv() => break,
        }

        match handle.status().await {
            Ok(status) => {
                log::info!(
                    "metrics: on_air={} breakdowns={} in_breakdown={} drift={:.3} uptime={}s",
                    status.on_air,
                    status.breakdown_count,
                    status.in_breakdown,
                    status.drift_probability,
                    status.uptime_secs
                );
            }
            Err(_) => break,
        }
    }
}
