//! Trial state machine.
//!
//! `Init -> Cue -> Moving -> (Reward | Timeout) -> Reset -> Init`
//!
//! Each phase has explicit entry and exit hooks that run once per
//! transition. `step` consumes one coherent position snapshot per tick,
//! runs the safety checks, then the current phase's handler.
//!
//! Safety: every phase has a dwell ceiling. Exceeding it, a position past
//! the mechanical limit, or a run of stale motor-board reads aborts the
//! trial toward Reset. From Reset itself the watchdog stops the actuator,
//! reports, and starts over at Init.

use std::sync::Arc;
use std::time::Instant;

use lever_traits::clock::Clock;
use lever_traits::{Actuator, CuePresenter, DigitalOutput, SerialLink};

use crate::config::{MovingLaw, Tier, TrialConfig};
use crate::control::{ControlLaw, MotionController, PidController, ViscousField};
use crate::error::{AbortReason, Result, RigError};
use crate::event::{EventCode, Marker, StateGuard};
use crate::hw_error::map_hw_error;
use crate::protocol::MotorBoard;
use crate::reward::RewardSequencer;
use crate::shared::SharedState;
use crate::status::{TrialRecord, TrialStatus};
use crate::telemetry::{TelemetrySink, TrialOutcome, event_line, trial_line};
use crate::tuning::TuningCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    Cue,
    Moving,
    Reward,
    Timeout,
    Reset,
}

impl Phase {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Cue => "cue",
            Self::Moving => "moving",
            Self::Reward => "reward",
            Self::Timeout => "timeout",
            Self::Reset => "reset",
        }
    }
}

/// Per-trial timers and outcome, cleared on every Init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialState {
    pub phase: Phase,
    pub entered_at_ms: u64,
    pub tier: u8,
    /// Threshold crossing first seen (Moving debounce)
    pub hold_since_ms: Option<u64>,
    /// Lever first seen within tolerance of home (Reset)
    pub home_since_ms: Option<u64>,
    /// Home confirmed and the trial line sent; settle runs from here
    pub homed_at_ms: Option<u64>,
    pub moving_entered_ms: Option<u64>,
    pub reaction_time_ms: Option<u64>,
    pub outcome: Option<TrialOutcome>,
    /// Zero-pulse tiers wait out one phase before Reset
    pub reward_wait_until_ms: Option<u64>,
    pub abort: Option<AbortReason>,
}

impl TrialState {
    fn fresh(now_ms: u64) -> Self {
        Self {
            phase: Phase::Init,
            entered_at_ms: now_ms,
            tier: 0,
            hold_since_ms: None,
            home_since_ms: None,
            homed_at_ms: None,
            moving_entered_ms: None,
            reaction_time_ms: None,
            outcome: None,
            reward_wait_until_ms: None,
            abort: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Number of the trial in progress (1-based)
    pub trial_number: u32,
    /// Trials that reported a TRIAL line
    pub total: u32,
    pub correct: u32,
    pub timeouts: u32,
    pub aborts: u32,
}

/// xorshift64 for tier draws; quality is irrelevant, determinism under a
/// fixed seed is not.
#[derive(Debug, Clone)]
pub(crate) struct XorShift64(u64);

impl XorShift64 {
    pub(crate) fn new(seed: u64) -> Self {
        let seed = if seed == 0 {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
                .unwrap_or(0x9E37_79B9_7F4A_7C15)
        } else {
            seed
        };
        Self(seed | 1)
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

pub type BoardLink = Box<dyn SerialLink + Send>;

pub struct TrialController {
    pub(crate) cfg: TrialConfig,
    pub(crate) motion: MotionController,
    pub(crate) actuator: Box<dyn Actuator + Send>,
    pub(crate) marker: Box<dyn Marker + Send>,
    pub(crate) reward: RewardSequencer<Box<dyn DigitalOutput + Send>>,
    pub(crate) cue: Box<dyn CuePresenter + Send>,
    pub(crate) telemetry: Box<dyn TelemetrySink>,
    pub(crate) board: Option<MotorBoard<BoardLink>>,
    pub(crate) shared: Option<Arc<SharedState>>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) epoch: Instant,
    pub(crate) guard: StateGuard<Phase>,
    pub(crate) state: TrialState,
    pub(crate) stats: SessionStats,
    pub(crate) rng: XorShift64,
    pub(crate) paused: bool,
    pub(crate) home: i32,
    pub(crate) damping_override: Option<f32>,
    pub(crate) tone_on: bool,
    pub(crate) last_board_poll_ms: Option<u64>,
    pub(crate) last_position: i32,
}

impl core::fmt::Debug for TrialController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrialController")
            .field("state", &self.state)
            .field("stats", &self.stats)
            .field("paused", &self.paused)
            .field("home", &self.home)
            .field("board", &self.board.is_some())
            .finish_non_exhaustive()
    }
}

impl TrialController {
    pub(crate) fn assemble(
        cfg: TrialConfig,
        actuator: Box<dyn Actuator + Send>,
        marker: Box<dyn Marker + Send>,
        reward_out: Box<dyn DigitalOutput + Send>,
        cue: Box<dyn CuePresenter + Send>,
        telemetry: Box<dyn TelemetrySink>,
        board: Option<MotorBoard<BoardLink>>,
        shared: Option<Arc<SharedState>>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let dt = cfg.control.dt();
        let c = &cfg.control;
        let motion = MotionController::new(
            PidController::new(c.kp, c.ki, c.kd, c.deadzone, dt),
            ViscousField::new(c.tau_s, 0.0, dt),
        );
        let reward = RewardSequencer::new(reward_out, cfg.reward.half_period_ms);
        let epoch = clock.now();
        let home = cfg.timings.home;
        let rng = XorShift64::new(cfg.timings.seed);
        Self {
            cfg,
            motion,
            actuator,
            marker,
            reward,
            cue,
            telemetry,
            board,
            shared,
            clock,
            epoch,
            guard: StateGuard::new(),
            state: TrialState::fresh(0),
            stats: SessionStats::default(),
            rng,
            paused: false,
            home,
            damping_override: None,
            tone_on: false,
            last_board_poll_ms: None,
            last_position: 0,
        }
    }

    pub fn builder() -> crate::builder::TrialControllerBuilder<
        crate::builder::Missing,
        crate::builder::Missing,
    > {
        crate::builder::TrialControllerBuilder::default()
    }

    fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    fn now_us(&self) -> u64 {
        self.clock.us_since(self.epoch)
    }

    /// Start the first trial. Emits the `INIT` marker.
    pub fn begin(&mut self) {
        let now = self.now_ms();
        tracing::info!(
            tiers = self.cfg.tiers.len(),
            law = ?self.cfg.timings.moving_law,
            board = self.board.is_some(),
            "session start"
        );
        self.transition(Phase::Init, now);
    }

    /// Take this tick's position from the shared snapshot and step.
    pub fn step_shared(&mut self) -> Result<TrialStatus> {
        let Some(shared) = self.shared.as_ref() else {
            return Err(eyre::Report::new(RigError::State(
                "no shared position state attached".into(),
            )));
        };
        let snap = shared.snapshot();
        self.step(snap.position)
    }

    /// One orchestrator tick against a coherent position snapshot.
    pub fn step(&mut self, position: i32) -> Result<TrialStatus> {
        let now = self.now_ms();
        self.last_position = position;
        if self.paused {
            return Ok(self.paused_checks(position, now));
        }

        if let Some(status) = self.safety_checks(position, now) {
            return Ok(status);
        }

        let next = match self.state.phase {
            Phase::Init => Some(Phase::Cue),
            Phase::Cue => self.tick_cue(now),
            Phase::Moving => self.tick_moving(position, now),
            Phase::Reward => self.tick_reward(now),
            Phase::Timeout => self.tick_timeout(now),
            Phase::Reset => match self.tick_reset(position, now) {
                ResetTick::Stay => None,
                ResetTick::Reported(record) => return Ok(TrialStatus::Completed(record)),
                ResetTick::Done => Some(Phase::Init),
            },
        };
        if let Some(next) = next {
            self.transition(next, now);
        }
        Ok(TrialStatus::Running)
    }

    // ── Safety ──────────────────────────────────────────────────────────────

    fn dwell_limit(&self, phase: Phase) -> u64 {
        let d = &self.cfg.safety.dwell;
        match phase {
            Phase::Init => d.init_ms,
            Phase::Cue => d.cue_ms,
            Phase::Moving => d.moving_ms,
            Phase::Reward => d.reward_ms,
            Phase::Timeout => d.timeout_ms,
            Phase::Reset => d.reset_ms,
        }
    }

    fn safety_checks(&mut self, position: i32, now: u64) -> Option<TrialStatus> {
        let phase = self.state.phase;
        let limit = self.cfg.safety.mechanical_limit;
        if phase != Phase::Reset && position.unsigned_abs() > limit.unsigned_abs() {
            return Some(self.abort(AbortReason::OutOfRange { position, limit }, now));
        }

        if let Some(status) = self.poll_board(now) {
            return Some(status);
        }

        let dwell = self.dwell_limit(phase);
        if now.saturating_sub(self.state.entered_at_ms) > dwell {
            let reason = AbortReason::DwellExceeded {
                phase,
                limit_ms: dwell,
            };
            if phase != Phase::Reset {
                return Some(self.abort(reason, now));
            }
            // Never homed: stop, report what we have, start over.
            tracing::warn!(%reason, "reset watchdog fired");
            self.stats.aborts += 1;
            self.state.abort = Some(reason);
            self.motor_stop();
            let record = if self.state.homed_at_ms.is_none() {
                Some(self.report(position))
            } else {
                None
            };
            self.transition(Phase::Init, now);
            return Some(match record {
                Some(r) => TrialStatus::Completed(r),
                None => TrialStatus::Aborted(RigError::Abort(reason)),
            });
        }
        None
    }

    /// While stopped only the mechanical limit is watched; phase timers and
    /// the board poll are frozen.
    fn paused_checks(&mut self, position: i32, now: u64) -> TrialStatus {
        let limit = self.cfg.safety.mechanical_limit;
        if self.state.phase != Phase::Reset && position.unsigned_abs() > limit.unsigned_abs() {
            return self.abort(AbortReason::OutOfRange { position, limit }, now);
        }
        TrialStatus::Running
    }

    fn poll_board(&mut self, now: u64) -> Option<TrialStatus> {
        let poll_ms = self.cfg.board.poll_ms;
        let due = self
            .last_board_poll_ms
            .is_none_or(|last| now.saturating_sub(last) >= poll_ms);
        let board = self.board.as_mut()?;
        if !due {
            return None;
        }
        self.last_board_poll_ms = Some(now);
        let reading = board.read_encoder_value();
        let streak = board.stale_streak();
        if !reading.stale {
            tracing::trace!(
                board = reading.position,
                local = self.last_position,
                status = reading.status,
                "board encoder"
            );
        }
        if streak > self.cfg.safety.max_stale_reads && self.state.phase != Phase::Reset {
            return Some(self.abort(AbortReason::StaleReadings { count: streak }, now));
        }
        None
    }

    /// Cut the current trial short and head for Reset.
    fn abort(&mut self, reason: AbortReason, now: u64) -> TrialStatus {
        tracing::warn!(
            %reason,
            phase = self.state.phase.name(),
            trial = self.stats.trial_number,
            "trial aborted"
        );
        self.stats.aborts += 1;
        self.state.abort = Some(reason);
        if self.state.outcome.is_none() {
            self.state.outcome = Some(TrialOutcome::Timeout);
            self.state.reaction_time_ms = Some(
                self.state
                    .moving_entered_ms
                    .map_or(0, |t| now.saturating_sub(t)),
            );
        }
        self.reward.abort();
        self.transition(Phase::Reset, now);
        TrialStatus::Aborted(RigError::Abort(reason))
    }

    // ── Transitions ─────────────────────────────────────────────────────────

    fn entry_code(&self, phase: Phase) -> EventCode {
        match phase {
            Phase::Init => EventCode::Init,
            Phase::Cue => EventCode::cue(self.state.tier),
            Phase::Moving => EventCode::Moving,
            Phase::Reward => EventCode::reward(self.state.tier),
            Phase::Timeout => EventCode::Timeout,
            Phase::Reset => EventCode::Reset,
        }
    }

    fn transition(&mut self, next: Phase, now: u64) {
        if self.guard.current() == Some(next) {
            return;
        }
        let prev = self.state.phase;
        if self.guard.current().is_some() {
            self.on_exit(prev);
        }
        if next == Phase::Init {
            self.prepare_trial(now);
        }
        self.state.phase = next;
        self.state.entered_at_ms = now;
        let code = self.entry_code(next);
        if self.guard.enter(next, code, &mut self.marker) {
            let line = event_line(code, self.stats.trial_number, self.now_us());
            self.telemetry.emit(&line);
        }
        tracing::debug!(from = prev.name(), to = next.name(), at_ms = now, "phase change");
        self.on_enter(next, now);
    }

    /// New trial number, fresh timers, tier draw.
    fn prepare_trial(&mut self, now: u64) {
        self.stats.trial_number += 1;
        self.state = TrialState::fresh(now);
        self.state.tier = self.select_tier();
    }

    #[allow(clippy::cast_possible_truncation)]
    fn select_tier(&mut self) -> u8 {
        if let Some(t) = self.cfg.timings.fixed_tier {
            return t;
        }
        let n = self.cfg.tiers.len().max(1) as u64;
        (self.rng.next_u64() % n) as u8
    }

    fn tier(&self) -> Tier {
        let idx = usize::from(self.state.tier).min(self.cfg.tiers.len().saturating_sub(1));
        self.cfg.tiers[idx]
    }

    fn on_enter(&mut self, phase: Phase, now: u64) {
        match phase {
            Phase::Init => {
                let tier = self.tier();
                let b = self.damping_override.unwrap_or(tier.damping);
                self.motion.viscous.set_damping(b);
                self.motion.pid.reset();
                tracing::info!(
                    trial = self.stats.trial_number,
                    tier = self.state.tier,
                    threshold = tier.threshold,
                    damping = b,
                    "trial start"
                );
            }
            Phase::Cue => {
                let hz = self.tier().cue_hz;
                self.cue_start(hz);
            }
            Phase::Moving => {
                let pos = self.last_position;
                self.state.moving_entered_ms = Some(now);
                self.state.hold_since_ms = None;
                self.motion.viscous.prime(pos);
                self.motion.pid.reset();
                let c = &self.cfg.control;
                self.motion.ramp.prime(
                    pos,
                    c.ramp_target,
                    c.ramp_rate_cps,
                    c.dt(),
                    c.ramp_delay_ms,
                    now,
                );
                let range = self.cfg.board.unlock_range;
                let homing = self.cfg.board.homing;
                if let Some(board) = self.board.as_mut()
                    && let Err(e) = board.unlock(&homing, range)
                {
                    tracing::warn!(error = %e, "board unlock failed");
                }
            }
            Phase::Reward => {
                let pulses = self.tier().pulses;
                self.reward.start(pulses, now);
                if pulses == 0 {
                    self.state.reward_wait_until_ms =
                        Some(now.saturating_add(self.reward.half_period_ms()));
                } else if self.cfg.reward.tone_hz > 0 {
                    self.cue_start(self.cfg.reward.tone_hz);
                }
            }
            Phase::Timeout => {}
            Phase::Reset => {
                self.state.home_since_ms = None;
                self.state.homed_at_ms = None;
                self.motion.pid.reset();
                if let Some(shared) = self.shared.as_ref() {
                    shared.set_motor_locked(true);
                }
                if !self.paused {
                    self.home_board();
                }
            }
        }
    }

    fn home_board(&mut self) {
        let mut homing = self.cfg.board.homing;
        homing.home = self.home;
        if let Some(board) = self.board.as_mut()
            && let Err(e) = board.home(&homing)
        {
            tracing::warn!(error = %e, "board homing move failed");
        }
    }

    fn on_exit(&mut self, phase: Phase) {
        match phase {
            Phase::Init | Phase::Timeout => {}
            Phase::Cue => self.cue_stop(),
            Phase::Moving => {
                self.motor_stop();
                self.motion.ramp.disarm();
            }
            Phase::Reward => {
                self.reward.abort();
                self.cue_stop();
            }
            Phase::Reset => {
                self.motor_stop();
                if let Some(shared) = self.shared.as_ref() {
                    shared.set_motor_locked(false);
                }
            }
        }
    }

    // ── Phase handlers ──────────────────────────────────────────────────────

    fn elapsed(&self, now: u64) -> u64 {
        now.saturating_sub(self.state.entered_at_ms)
    }

    fn tick_cue(&mut self, now: u64) -> Option<Phase> {
        (self.elapsed(now) >= self.cfg.timings.cue_ms).then_some(Phase::Moving)
    }

    fn moving_law(&self) -> ControlLaw {
        match self.cfg.timings.moving_law {
            MovingLaw::None => ControlLaw::Idle,
            MovingLaw::Viscous => ControlLaw::Viscous,
            MovingLaw::Ramp => ControlLaw::RampedPid,
        }
    }

    fn tick_moving(&mut self, position: i32, now: u64) -> Option<Phase> {
        let law = self.moving_law();
        let effort = self.motion.step(law, position, now);
        if law != ControlLaw::Idle {
            self.apply(effort);
        }

        let t = &self.cfg.timings;
        let threshold = self.tier().threshold;
        let entered = self.state.moving_entered_ms.unwrap_or(self.state.entered_at_ms);
        if t.crossing.crossed(position, threshold) {
            let since = *self.state.hold_since_ms.get_or_insert(now);
            if now.saturating_sub(since) >= t.reward_hold_ms {
                self.state.outcome = Some(TrialOutcome::Correct);
                self.state.reaction_time_ms = Some(now.saturating_sub(entered));
                return Some(Phase::Reward);
            }
        } else {
            self.state.hold_since_ms = None;
        }

        if self.elapsed(now) >= t.moving_timeout_ms {
            self.state.outcome = Some(TrialOutcome::Timeout);
            self.state.reaction_time_ms = Some(now.saturating_sub(entered));
            return Some(Phase::Timeout);
        }
        None
    }

    fn tick_reward(&mut self, now: u64) -> Option<Phase> {
        if let Some(high) = self.reward.update(now)
            && self.cfg.reward.tone_hz > 0
        {
            if high {
                self.cue_start(self.cfg.reward.tone_hz);
            } else {
                self.cue_stop();
            }
        }
        let waited = self
            .state
            .reward_wait_until_ms
            .is_none_or(|until| now >= until);
        (!self.reward.is_active() && waited).then_some(Phase::Reset)
    }

    fn tick_timeout(&mut self, now: u64) -> Option<Phase> {
        (self.elapsed(now) >= self.cfg.timings.timeout_hold_ms).then_some(Phase::Reset)
    }

    fn tick_reset(&mut self, position: i32, now: u64) -> ResetTick {
        if let Some(homed_at) = self.state.homed_at_ms {
            return if now.saturating_sub(homed_at) >= self.cfg.timings.settle_ms {
                ResetTick::Done
            } else {
                ResetTick::Stay
            };
        }

        let effort = self
            .motion
            .step(ControlLaw::HoldPid(self.home), position, now);
        self.apply(effort);

        let t = &self.cfg.timings;
        if position.abs_diff(self.home) <= t.reset_tolerance.unsigned_abs() {
            let since = *self.state.home_since_ms.get_or_insert(now);
            if now.saturating_sub(since) >= t.reset_hold_ms {
                self.motor_stop();
                self.state.homed_at_ms = Some(now);
                return ResetTick::Reported(self.report(position));
            }
        } else {
            self.state.home_since_ms = None;
        }
        ResetTick::Stay
    }

    /// Emit the trial's one `TRIAL` line and fold it into the stats.
    fn report(&mut self, final_position: i32) -> TrialRecord {
        let outcome = self.state.outcome.unwrap_or(TrialOutcome::Timeout);
        let rt = self.state.reaction_time_ms.unwrap_or(0);
        self.telemetry.emit(&trial_line(outcome, rt, final_position));
        self.stats.total += 1;
        match outcome {
            TrialOutcome::Correct => self.stats.correct += 1,
            TrialOutcome::Timeout => self.stats.timeouts += 1,
        }
        let record = TrialRecord {
            trial_number: self.stats.trial_number,
            tier: self.state.tier,
            outcome,
            reaction_time_ms: rt,
            final_position,
            abort: self.state.abort,
        };
        tracing::info!(
            trial = record.trial_number,
            tier = record.tier,
            outcome = %outcome,
            rt_ms = rt,
            position = final_position,
            "trial complete"
        );
        record
    }

    // ── Device helpers ──────────────────────────────────────────────────────

    fn apply(&mut self, effort: f32) {
        if let Err(e) = self.actuator.apply(effort) {
            let e = map_hw_error(&*e);
            tracing::warn!(error = %e, effort, "actuator write failed");
        }
    }

    /// Stop the actuator (best-effort).
    pub fn motor_stop(&mut self) {
        if let Err(e) = self.actuator.stop() {
            let e = eyre::Report::new(map_hw_error(&*e));
            tracing::warn!(error = %e, "motor_stop failed");
        }
    }

    fn cue_start(&mut self, hz: u32) {
        match self.cue.start(hz) {
            Ok(()) => self.tone_on = true,
            Err(e) => tracing::warn!(error = %map_hw_error(&*e), hz, "cue start failed"),
        }
    }

    fn cue_stop(&mut self) {
        if !self.tone_on {
            return;
        }
        match self.cue.stop() {
            Ok(()) => self.tone_on = false,
            Err(e) => tracing::warn!(error = %map_hw_error(&*e), "cue stop failed"),
        }
    }

    // ── Live tuning ─────────────────────────────────────────────────────────

    /// Apply one tuning command between ticks.
    pub fn apply_tuning(&mut self, cmd: TuningCommand) -> TrialStatus {
        let now = self.now_ms();
        match cmd {
            TuningCommand::SetKp(v) => self.motion.pid.set_kp(v),
            TuningCommand::SetKi(v) => self.motion.pid.set_ki(v),
            TuningCommand::SetKd(v) => self.motion.pid.set_kd(v),
            TuningCommand::SetDeadzone(v) => self.motion.pid.set_deadzone(v),
            TuningCommand::SetTarget(v) => self.home = v,
            TuningCommand::SetViscous(b) => {
                self.damping_override = Some(b);
                self.motion.viscous.set_damping(b);
            }
            TuningCommand::Stop => {
                if !self.paused {
                    self.paused = true;
                    self.motor_stop();
                    // An interrupted reward is not redelivered on START.
                    self.reward.abort();
                    self.cue_stop();
                    tracing::warn!(phase = self.state.phase.name(), "actuation stopped by operator");
                }
            }
            TuningCommand::Start => {
                if self.paused {
                    self.paused = false;
                    // Phase timers restart from the resume instant.
                    self.state.entered_at_ms = now;
                    self.state.hold_since_ms = None;
                    self.state.home_since_ms = None;
                    if self.state.homed_at_ms.is_some() {
                        self.state.homed_at_ms = Some(now);
                    }
                    match self.state.phase {
                        Phase::Cue => {
                            let hz = self.tier().cue_hz;
                            self.cue_start(hz);
                        }
                        Phase::Reset => self.home_board(),
                        _ => {}
                    }
                    tracing::info!(phase = self.state.phase.name(), "actuation resumed");
                }
            }
            TuningCommand::Reset => {
                if self.state.phase != Phase::Reset {
                    return self.abort(AbortReason::Operator, now);
                }
            }
        }
        TrialStatus::Running
    }

    /// Stop every output; call before dropping the controller.
    pub fn shutdown(&mut self) {
        self.motor_stop();
        self.reward.abort();
        self.cue_stop();
        tracing::info!(
            trials = self.stats.total,
            correct = self.stats.correct,
            "session end"
        );
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn state(&self) -> &TrialState {
        &self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn home(&self) -> i32 {
        self.home
    }

    pub fn motion(&self) -> &MotionController {
        &self.motion
    }

    pub fn config(&self) -> &TrialConfig {
        &self.cfg
    }

    pub fn last_position(&self) -> i32 {
        self.last_position
    }

    pub fn board_stale_total(&self) -> Option<u64> {
        self.board.as_ref().map(MotorBoard::stale_total)
    }
}

enum ResetTick {
    Stay,
    Reported(TrialRecord),
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xorshift_is_deterministic_under_seed() {
        let mut a = XorShift64::new(42);
        let mut b = XorShift64::new(42);
        for _ in 0..8 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn xorshift_covers_all_tiers() {
        let mut r = XorShift64::new(7);
        let mut seen = [false; 4];
        for _ in 0..200 {
            seen[(r.next_u64() % 4) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
