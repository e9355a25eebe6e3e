//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "lever", version, about = "Motorized lever trial rig")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/lever_rig.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub const fn os_default() -> Self {
        if cfg!(target_os = "linux") {
            Self::Current
        } else {
            Self::None
        }
    }
}

/// Behavior of the simulated subject (ignored with real hardware).
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SimSubject {
    /// Never touches the lever; every trial times out
    Idle,
    /// Pulls past the default threshold once every two seconds
    Puller,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Stop after this many trials (overrides trial.max_trials; 0 = until Ctrl-C)
    #[arg(long, value_name = "N")]
    pub trials: Option<u32>,
    /// Append TRIAL/EVENT lines to FILE instead of stdout
    #[arg(long, value_name = "FILE")]
    pub telemetry: Option<PathBuf>,
    /// Read tuning commands (SET_KP_x, STOP, ...) from stdin
    #[arg(long = "tune-stdin", action = ArgAction::SetTrue)]
    pub tune_stdin: bool,
    /// Simulated subject behavior
    #[arg(long, value_enum, value_name = "MODEL", default_value = "puller")]
    pub subject: SimSubject,
    /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode on supported OSes.\n\nLinux: Attempts SCHED_FIFO priority for the control loop, pins the process to one CPU, and locks the address space into RAM. This reduces page faults and jitter but may require elevated privileges or ulimits (e.g., memlock).\n\nRequires a build with the `rt` feature; otherwise a warning is logged and the session runs with normal scheduling."
    )]
    pub rt: bool,
    /// Real-time priority for SCHED_FIFO on Linux (clamped to the system range)
    #[arg(long, value_name = "PRIO")]
    pub rt_prio: Option<i32>,
    /// Select memory locking mode for --rt: none, current, or all
    #[arg(long, value_enum, value_name = "MODE")]
    pub rt_lock: Option<RtLock>,
    /// CPU index to pin the process to when --rt is enabled (Linux only; default 0)
    #[arg(long, value_name = "CPU")]
    pub rt_cpu: Option<usize>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum FrameCmd {
    /// Position command (DRIVE_M1, or SET_POSITION with --buffered)
    Drive {
        #[arg(long, allow_hyphen_values = true)]
        accel: i32,
        #[arg(long, allow_hyphen_values = true)]
        speed: i32,
        #[arg(long, allow_hyphen_values = true)]
        decel: i32,
        #[arg(long, allow_hyphen_values = true)]
        position: i32,
        /// Queue behind the current move instead of replacing it
        #[arg(long, action = ArgAction::SetTrue)]
        buffered: bool,
    },
    /// Zero the board's encoder counter
    ResetEncoder,
    /// Encoder read request
    ReadEncoder,
    /// PID upload built from `[protocol.homing]`
    Pid,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run trials until --trials complete or Ctrl-C
    Run(RunArgs),
    /// Validate the config and exercise the simulated devices
    SelfCheck,
    /// Print a motor-board frame as hex
    Frame {
        #[command(subcommand)]
        kind: FrameCmd,
    },
}
