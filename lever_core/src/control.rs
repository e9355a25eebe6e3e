//! Motion-control laws: PID with anti-windup and a deadzone brake, a viscous
//! damping field, and a setpoint ramp that feeds the PID.
//!
//! The laws compose by selection. `MotionController::step` runs exactly one
//! of them per tick, chosen by the orchestrator through `ControlLaw`.

/// Symmetric saturation applied to every law's output.
pub const OUTPUT_LIMIT: f32 = 100.0;

#[inline]
fn saturate(x: f32) -> f32 {
    x.clamp(-OUTPUT_LIMIT, OUTPUT_LIMIT)
}

/// Gains plus integrator memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerState {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub integral: f32,
    pub last_error: f32,
    pub deadzone: i32,
}

#[derive(Debug, Clone)]
pub struct PidController {
    state: ControllerState,
    dt: f32,
}

impl PidController {
    pub fn new(kp: f32, ki: f32, kd: f32, deadzone: i32, dt: f32) -> Self {
        Self {
            state: ControllerState {
                kp,
                ki,
                kd,
                integral: 0.0,
                last_error: 0.0,
                deadzone,
            },
            dt,
        }
    }

    /// One control step toward `target`. Returns effort in `[-100, 100]`.
    #[allow(clippy::cast_precision_loss)]
    pub fn step(&mut self, position: i32, target: f32) -> f32 {
        let error = target - position as f32;
        if error.abs() <= self.state.deadzone as f32 {
            // Brake: no effort and no memory carried out of the deadzone.
            self.state.integral = 0.0;
            self.state.last_error = 0.0;
            return 0.0;
        }
        let s = &mut self.state;
        let p = s.kp * error;
        let tentative = s.integral + error * self.dt;
        let i = s.ki * tentative;
        let d = s.kd * (error - s.last_error) / self.dt;
        let raw = p + i + d;
        let out = saturate(raw);
        if (-OUTPUT_LIMIT..=OUTPUT_LIMIT).contains(&raw) {
            s.integral = tentative;
        }
        s.last_error = error;
        out
    }

    pub fn set_gains(&mut self, kp: f32, ki: f32, kd: f32) {
        self.state.kp = kp;
        self.state.ki = ki;
        self.state.kd = kd;
    }

    pub fn set_kp(&mut self, kp: f32) {
        self.state.kp = kp;
    }

    pub fn set_ki(&mut self, ki: f32) {
        self.state.ki = ki;
    }

    pub fn set_kd(&mut self, kd: f32) {
        self.state.kd = kd;
    }

    pub fn set_deadzone(&mut self, deadzone: i32) {
        self.state.deadzone = deadzone.max(0);
    }

    /// Clear integrator memory, keeping gains.
    pub fn reset(&mut self) {
        self.state.integral = 0.0;
        self.state.last_error = 0.0;
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Overwrite integrator memory (tests and warm starts).
    pub fn set_memory(&mut self, integral: f32, last_error: f32) {
        self.state.integral = integral;
        self.state.last_error = last_error;
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViscousState {
    pub tau: f32,
    pub b: f32,
    pub last_position: f32,
    pub last_filtered_velocity: f32,
}

/// Output proportional to negative filtered velocity.
#[derive(Debug, Clone)]
pub struct ViscousField {
    state: ViscousState,
    alpha: f32,
    dt: f32,
}

impl ViscousField {
    pub fn new(tau: f32, b: f32, dt: f32) -> Self {
        let alpha = if tau + dt > 0.0 { dt / (tau + dt) } else { 1.0 };
        Self {
            state: ViscousState {
                tau,
                b,
                last_position: 0.0,
                last_filtered_velocity: 0.0,
            },
            alpha,
            dt,
        }
    }

    /// Seed the velocity estimator at `position` with zero velocity.
    #[allow(clippy::cast_precision_loss)]
    pub fn prime(&mut self, position: i32) {
        self.state.last_position = position as f32;
        self.state.last_filtered_velocity = 0.0;
    }

    pub fn set_damping(&mut self, b: f32) {
        self.state.b = b;
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn step(&mut self, position: i32) -> f32 {
        let pos = position as f32;
        let s = &mut self.state;
        let v = (pos - s.last_position) / self.dt;
        let vf = self.alpha.mul_add(v, (1.0 - self.alpha) * s.last_filtered_velocity);
        s.last_position = pos;
        s.last_filtered_velocity = vf;
        saturate(-s.b * vf)
    }

    pub fn state(&self) -> ViscousState {
        self.state
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }
}

/// Moving setpoint that walks from a start position to a fixed target at a
/// bounded rate, optionally after a start delay.
#[derive(Debug, Clone)]
pub struct SetpointRamp {
    setpoint: f32,
    target: f32,
    step: f32,
    start_at_ms: u64,
    armed: bool,
}

impl SetpointRamp {
    pub fn new() -> Self {
        Self {
            setpoint: 0.0,
            target: 0.0,
            step: 0.0,
            start_at_ms: 0,
            armed: false,
        }
    }

    /// Arm the ramp. `rate_cps * dt` is the per-tick setpoint step.
    #[allow(clippy::cast_precision_loss)]
    pub fn prime(
        &mut self,
        start: i32,
        target: i32,
        rate_cps: f32,
        dt: f32,
        delay_ms: u64,
        now_ms: u64,
    ) {
        self.setpoint = start as f32;
        self.target = target as f32;
        self.step = (rate_cps * dt).abs();
        self.start_at_ms = now_ms.saturating_add(delay_ms);
        self.armed = true;
    }

    /// Advance one tick. `None` until primed and past the start delay.
    pub fn advance(&mut self, now_ms: u64) -> Option<f32> {
        if !self.armed || now_ms < self.start_at_ms {
            return None;
        }
        let remaining = self.target - self.setpoint;
        if remaining.abs() <= self.step {
            self.setpoint = self.target;
        } else {
            self.setpoint += self.step.copysign(remaining);
        }
        Some(self.setpoint)
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    pub fn reached(&self) -> bool {
        self.armed && (self.setpoint - self.target).abs() <= f32::EPSILON
    }
}

impl Default for SetpointRamp {
    fn default() -> Self {
        Self::new()
    }
}

/// Which law drives the actuator this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlLaw {
    /// Actuator held at zero
    Idle,
    Viscous,
    /// PID toward the ramp's moving setpoint
    RampedPid,
    /// PID toward a fixed target
    HoldPid(i32),
}

/// The three laws behind one selection point.
#[derive(Debug, Clone)]
pub struct MotionController {
    pub pid: PidController,
    pub viscous: ViscousField,
    pub ramp: SetpointRamp,
}

impl MotionController {
    pub fn new(pid: PidController, viscous: ViscousField) -> Self {
        Self {
            pid,
            viscous,
            ramp: SetpointRamp::new(),
        }
    }

    /// Run `law` once against a coherent position snapshot.
    #[allow(clippy::cast_precision_loss)]
    pub fn step(&mut self, law: ControlLaw, position: i32, now_ms: u64) -> f32 {
        match law {
            ControlLaw::Idle => 0.0,
            ControlLaw::Viscous => self.viscous.step(position),
            ControlLaw::RampedPid => match self.ramp.advance(now_ms) {
                Some(setpoint) => self.pid.step(position, setpoint),
                None => 0.0,
            },
            ControlLaw::HoldPid(target) => self.pid.step(position, target as f32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_pushes_toward_target() {
        let mut pid = PidController::new(0.21, 0.001, 0.003, 5, 0.002);
        assert!(pid.step(0, 50.0) > 0.0);
        pid.reset();
        assert!(pid.step(0, -50.0) < 0.0);
    }

    #[test]
    fn pid_output_is_saturated() {
        let mut pid = PidController::new(10.0, 0.0, 0.0, 0, 0.002);
        assert_eq!(pid.step(0, 1000.0), 100.0);
        assert_eq!(pid.step(0, -1000.0), -100.0);
    }

    #[test]
    fn viscous_opposes_motion() {
        let mut v = ViscousField::new(0.02, 0.003, 0.002);
        v.prime(0);
        let out = v.step(10);
        assert!(out < 0.0);
        let mut v = ViscousField::new(0.02, 0.003, 0.002);
        v.prime(0);
        assert!(v.step(-10) > 0.0);
    }

    #[test]
    fn viscous_alpha_matches_time_constant() {
        let v = ViscousField::new(0.02, 0.003, 0.002);
        assert!((v.alpha() - 0.002 / 0.022).abs() < 1e-6);
        // tau = 0 passes velocity through unfiltered.
        assert_eq!(ViscousField::new(0.0, 1.0, 0.002).alpha(), 1.0);
    }

    #[test]
    fn ramp_waits_for_delay_then_lands_on_target() {
        let mut r = SetpointRamp::new();
        assert_eq!(r.advance(0), None);
        r.prime(0, 5, 1000.0, 0.002, 100, 0);
        assert_eq!(r.advance(50), None);
        assert_eq!(r.advance(100), Some(2.0));
        assert_eq!(r.advance(102), Some(4.0));
        assert_eq!(r.advance(104), Some(5.0));
        assert_eq!(r.advance(106), Some(5.0));
        assert!(r.reached());
    }

    #[test]
    fn ramp_walks_downward() {
        let mut r = SetpointRamp::new();
        r.prime(10, 0, 2500.0, 0.002, 0, 0);
        assert_eq!(r.advance(0), Some(5.0));
        assert_eq!(r.advance(2), Some(0.0));
    }

    #[test]
    fn idle_law_is_zero() {
        let mut mc = MotionController::new(
            PidController::new(1.0, 0.0, 0.0, 0, 0.002),
            ViscousField::new(0.02, 1.0, 0.002),
        );
        assert_eq!(mc.step(ControlLaw::Idle, 500, 0), 0.0);
        assert!(mc.step(ControlLaw::HoldPid(0), 50, 0) < 0.0);
        // Ramp not primed: no effort.
        assert_eq!(mc.step(ControlLaw::RampedPid, 50, 0), 0.0);
    }
}
