//! Type-state builder for `TrialController`.
//!
//! The builder enforces at compile time that an actuator and an event marker
//! are provided before `build()` is available. `try_build()` is always
//! available for dynamic checks. Everything else has a working default.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use lever_traits::clock::{Clock, MonotonicClock};
use lever_traits::{Actuator, CuePresenter, DigitalOutput, SerialLink};

use crate::config::TrialConfig;
use crate::error::{BuildError, Result};
use crate::event::Marker;
use crate::mocks::{NullCue, NullOutput};
use crate::protocol::MotorBoard;
use crate::shared::SharedState;
use crate::telemetry::{StdoutSink, TelemetrySink};
use crate::trial::{BoardLink, TrialController};

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `TrialController`. Validated on `build()`.
pub struct TrialControllerBuilder<A, M> {
    actuator: Option<Box<dyn Actuator + Send>>,
    marker: Option<Box<dyn Marker + Send>>,
    reward_out: Option<Box<dyn DigitalOutput + Send>>,
    cue: Option<Box<dyn CuePresenter + Send>>,
    telemetry: Option<Box<dyn TelemetrySink>>,
    board: Option<MotorBoard<BoardLink>>,
    shared: Option<Arc<SharedState>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    config: Option<TrialConfig>,
    _a: PhantomData<A>,
    _m: PhantomData<M>,
}

impl Default for TrialControllerBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            actuator: None,
            marker: None,
            reward_out: None,
            cue: None,
            telemetry: None,
            board: None,
            shared: None,
            clock: None,
            config: None,
            _a: PhantomData,
            _m: PhantomData,
        }
    }
}

fn validate(cfg: &TrialConfig) -> Result<()> {
    if cfg.tiers.is_empty() {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "at least one tier is required",
        )));
    }
    if cfg.tiers.len() > 4 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "at most four tiers have event markers",
        )));
    }
    if let Some(t) = cfg.timings.fixed_tier
        && usize::from(t) >= cfg.tiers.len()
    {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "fixed_tier out of range",
        )));
    }
    if cfg.control.loop_hz == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "loop_hz must be > 0",
        )));
    }
    let dt = cfg.control.dt();
    if !dt.is_finite() || dt <= 0.0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "control period must be finite and > 0",
        )));
    }
    if cfg.reward.half_period_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "reward half period must be >= 1 ms",
        )));
    }
    if cfg.timings.reset_tolerance < 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "reset_tolerance must be >= 0",
        )));
    }
    if cfg.safety.mechanical_limit <= 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "mechanical_limit must be > 0",
        )));
    }
    if cfg.control.deadzone < 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "deadzone must be >= 0",
        )));
    }
    Ok(())
}

impl<A, M> TrialControllerBuilder<A, M> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<TrialController> {
        let actuator = self
            .actuator
            .ok_or_else(|| eyre::Report::new(BuildError::MissingActuator))?;
        let marker = self
            .marker
            .ok_or_else(|| eyre::Report::new(BuildError::MissingMarker))?;
        let cfg = self.config.unwrap_or_default();
        validate(&cfg)?;

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };

        Ok(TrialController::assemble(
            cfg,
            actuator,
            marker,
            self.reward_out.unwrap_or_else(|| Box::new(NullOutput)),
            self.cue.unwrap_or_else(|| Box::new(NullCue)),
            self.telemetry.unwrap_or_else(|| Box::new(StdoutSink)),
            self.board,
            self.shared,
            clock,
        ))
    }
}

/// Chainable setters that do not affect type-state.
impl<A, M> TrialControllerBuilder<A, M> {
    pub fn with_config(mut self, config: TrialConfig) -> Self {
        self.config = Some(config);
        self
    }
    pub fn with_reward_output(mut self, out: impl DigitalOutput + Send + 'static) -> Self {
        self.reward_out = Some(Box::new(out));
        self
    }
    pub fn with_cue(mut self, cue: impl CuePresenter + Send + 'static) -> Self {
        self.cue = Some(Box::new(cue));
        self
    }
    pub fn with_telemetry(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.telemetry = Some(Box::new(sink));
        self
    }
    /// Attach a motor board for homing moves and the stale-read cross-check.
    pub fn with_board(
        mut self,
        link: impl SerialLink + Send + 'static,
        read_timeout: Duration,
    ) -> Self {
        self.board = Some(MotorBoard::new(Box::new(link), read_timeout));
        self
    }
    /// As `with_board`, for a driver the caller already set up.
    pub fn with_motor_board(mut self, board: MotorBoard<BoardLink>) -> Self {
        self.board = Some(board);
        self
    }
    /// Position snapshots for `step_shared`.
    pub fn with_shared(mut self, shared: Arc<SharedState>) -> Self {
        self.shared = Some(shared);
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<M> TrialControllerBuilder<Missing, M> {
    pub fn with_actuator(
        self,
        actuator: impl Actuator + Send + 'static,
    ) -> TrialControllerBuilder<Set, M> {
        TrialControllerBuilder {
            actuator: Some(Box::new(actuator)),
            marker: self.marker,
            reward_out: self.reward_out,
            cue: self.cue,
            telemetry: self.telemetry,
            board: self.board,
            shared: self.shared,
            clock: self.clock,
            config: self.config,
            _a: PhantomData,
            _m: PhantomData,
        }
    }
}

impl<A> TrialControllerBuilder<A, Missing> {
    pub fn with_marker(
        self,
        marker: impl Marker + Send + 'static,
    ) -> TrialControllerBuilder<A, Set> {
        TrialControllerBuilder {
            actuator: self.actuator,
            marker: Some(Box::new(marker)),
            reward_out: self.reward_out,
            cue: self.cue,
            telemetry: self.telemetry,
            board: self.board,
            shared: self.shared,
            clock: self.clock,
            config: self.config,
            _a: PhantomData,
            _m: PhantomData,
        }
    }
}

impl TrialControllerBuilder<Set, Set> {
    /// Validate and build. Only available once the actuator and marker are set.
    pub fn build(self) -> Result<TrialController> {
        self.try_build()
    }
}
