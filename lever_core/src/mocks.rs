//! Stand-in devices for wiring the controller without real peripherals.
//!
//! `SimulatedBoard` answers the motor-board protocol in memory, so the board
//! path can run end to end in tests and in the simulated CLI rig.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lever_traits::{Actuator, BoxError, CuePresenter, DigitalOutput, PulseCounter, SerialLink};

use crate::protocol::{ADDRESS, Command, parse_frame, response_crc};

/// Counter that never moves.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCounter;

impl PulseCounter for NoopCounter {
    fn count(&mut self) -> i16 {
        0
    }
}

/// Actuator for rigs where a motor board does the moving.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullActuator;

impl Actuator for NullActuator {
    fn apply(&mut self, _effort: f32) -> Result<(), BoxError> {
        Ok(())
    }
    fn stop(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl DigitalOutput for NullOutput {
    fn set_level(&mut self, _high: bool) -> Result<(), BoxError> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullCue;

impl CuePresenter for NullCue {
    fn start(&mut self, _freq_hz: u32) -> Result<(), BoxError> {
        Ok(())
    }
    fn stop(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// How the simulated board misbehaves on reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoardFault {
    #[default]
    None,
    /// Flip a bit in the response CRC
    CorruptCrc,
    /// Never answer
    Silent,
    /// Answer with the last byte missing
    Truncate,
}

#[derive(Debug, Default)]
struct BoardInner {
    position: i32,
    status: u8,
    pid: [u8; 28],
    frames: Vec<Vec<u8>>,
    pending: Vec<u8>,
    fault: BoardFault,
    rejected: u32,
}

/// In-memory motor board speaking the framed protocol. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBoard {
    inner: Arc<Mutex<BoardInner>>,
}

impl SimulatedBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BoardInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_position(&self, position: i32) {
        self.lock().position = position;
    }

    pub fn position(&self) -> i32 {
        self.lock().position
    }

    pub fn set_fault(&self, fault: BoardFault) {
        self.lock().fault = fault;
    }

    /// Every well-formed frame received, oldest first.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().frames.clone()
    }

    /// Command bytes of the frames received.
    pub fn commands(&self) -> Vec<u8> {
        self.lock().frames.iter().map(|f| f[1]).collect()
    }

    /// Frames dropped for a bad address or CRC.
    pub fn rejected(&self) -> u32 {
        self.lock().rejected
    }

    fn respond(inner: &mut BoardInner, cmd: Command, data: &[u8]) {
        let mut out = data.to_vec();
        let mut crc = response_crc(cmd, data);
        if inner.fault == BoardFault::CorruptCrc {
            crc ^= 0x0001;
        }
        out.extend_from_slice(&crc.to_be_bytes());
        if inner.fault == BoardFault::Truncate {
            out.pop();
        }
        if inner.fault != BoardFault::Silent {
            inner.pending = out;
        }
    }
}

fn be_i32(b: &[u8]) -> i32 {
    i32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

impl SerialLink for SimulatedBoard {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        let mut inner = self.lock();
        if bytes.len() == 2 && bytes[0] == ADDRESS {
            // Read request: header only, no CRC.
            inner.frames.push(bytes.to_vec());
            let cmd = Command(bytes[1]);
            match cmd {
                Command::READ_ENCODER => {
                    let mut data = [0u8; 5];
                    data[..4].copy_from_slice(&inner.position.to_be_bytes());
                    data[4] = inner.status;
                    Self::respond(&mut inner, cmd, &data);
                }
                Command::READ_PID => {
                    let pid = inner.pid;
                    Self::respond(&mut inner, cmd, &pid);
                }
                _ => {}
            }
            return Ok(());
        }
        let Ok((cmd, payload)) = parse_frame(bytes) else {
            inner.rejected += 1;
            return Ok(());
        };
        if bytes[0] != ADDRESS {
            inner.rejected += 1;
            return Ok(());
        }
        inner.frames.push(bytes.to_vec());
        match cmd {
            Command::DRIVE_M1 if payload.len() >= 16 => {
                // The sim board reaches its target instantly.
                inner.position = be_i32(&payload[12..16]);
            }
            Command::SET_PID if payload.len() == 28 => {
                // Stored in read-back order: P, I, D, then the limits.
                let mut pid = [0u8; 28];
                pid[0..4].copy_from_slice(&payload[4..8]);
                pid[4..8].copy_from_slice(&payload[8..12]);
                pid[8..12].copy_from_slice(&payload[0..4]);
                pid[12..28].copy_from_slice(&payload[12..28]);
                inner.pid = pid;
            }
            Command::RESET_ENCODER => inner.position = 0,
            _ => {}
        }
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), BoxError> {
        self.lock().pending.clear();
        Ok(())
    }

    fn read_exact_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<(), BoxError> {
        let mut inner = self.lock();
        if inner.pending.len() < buf.len() {
            inner.pending.clear();
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "serial read timed out",
            )));
        }
        let rest = inner.pending.split_off(buf.len());
        buf.copy_from_slice(&inner.pending);
        inner.pending = rest;
        Ok(())
    }
}
