//! Framed request/response driver for the external motor board.
//!
//! Every frame is `[0x80, cmd, payload..., crc_hi, crc_lo]` with big-endian
//! integers and a CRC16-CCITT (poly 0x1021, init 0) over everything before
//! the trailer. Responses carry only `data..., crc_hi, crc_lo`; their CRC
//! covers the request header followed by the data.
//!
//! Reads flush the receive side, send the two-byte request and make a single
//! bounded receive. A response that times out, comes up short, or fails its
//! CRC is discarded. Encoder reads then fall back to the last good position
//! and count as stale; nothing is retried.

use std::time::Duration;

use lever_traits::SerialLink;

use crate::encoder::PositionSource;
use crate::error::{ProtocolError, Result, RigError};
use crate::hw_error::map_hw_error;

/// Fixed device address.
pub const ADDRESS: u8 = 0x80;
pub const MAX_PAYLOAD: usize = 28;
pub const MAX_FRAME: usize = 2 + MAX_PAYLOAD + 2;
/// Gains travel as Q10 fixed point.
pub const Q10_SCALE: f32 = 1024.0;

/// CRC16-CCITT, polynomial 0x1021, initial value 0, MSB first.
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &b in bytes {
        crc ^= u16::from(b) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command(pub u8);

impl Command {
    pub const READ_ENCODER: Self = Self(16);
    pub const RESET_ENCODER: Self = Self(20);
    pub const SET_PID: Self = Self(61);
    pub const READ_PID: Self = Self(63);
    pub const DRIVE_M1: Self = Self(65);
}

/// One outgoing frame, built in place without allocating.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; MAX_FRAME],
    len: usize,
    sealed: bool,
}

impl core::fmt::Debug for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Frame")
            .field("bytes", &self.as_bytes())
            .field("sealed", &self.sealed)
            .finish()
    }
}

impl Frame {
    pub fn new(cmd: Command) -> Self {
        let mut bytes = [0u8; MAX_FRAME];
        bytes[0] = ADDRESS;
        bytes[1] = cmd.0;
        Self {
            bytes,
            len: 2,
            sealed: false,
        }
    }

    fn push(&mut self, data: &[u8]) -> core::result::Result<(), ProtocolError> {
        if self.sealed {
            return Err(ProtocolError::Sealed);
        }
        let payload = self.len - 2 + data.len();
        if payload > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLong(payload));
        }
        self.bytes[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    pub fn push_u8(&mut self, v: u8) -> core::result::Result<&mut Self, ProtocolError> {
        self.push(&[v])?;
        Ok(self)
    }

    pub fn push_i32(&mut self, v: i32) -> core::result::Result<&mut Self, ProtocolError> {
        self.push(&v.to_be_bytes())?;
        Ok(self)
    }

    pub fn push_u32(&mut self, v: u32) -> core::result::Result<&mut Self, ProtocolError> {
        self.push(&v.to_be_bytes())?;
        Ok(self)
    }

    /// Append the CRC trailer. Further pushes fail.
    pub fn seal(&mut self) -> &mut Self {
        if !self.sealed {
            let crc = crc16(&self.bytes[..self.len]).to_be_bytes();
            self.bytes[self.len..self.len + 2].copy_from_slice(&crc);
            self.len += 2;
            self.sealed = true;
        }
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn command(&self) -> Command {
        Command(self.bytes[1])
    }
}

/// Validate a complete incoming request frame and split out its payload.
pub fn parse_frame(bytes: &[u8]) -> core::result::Result<(Command, &[u8]), ProtocolError> {
    if bytes.len() < 4 {
        return Err(ProtocolError::ShortRead { expected: 4 });
    }
    let (body, trailer) = bytes.split_at(bytes.len() - 2);
    let got = u16::from_be_bytes([trailer[0], trailer[1]]);
    let expected = crc16(body);
    if got != expected {
        return Err(ProtocolError::CrcMismatch { expected, got });
    }
    Ok((Command(body[1]), &body[2..]))
}

/// CRC a response body the way the board computes it.
pub fn response_crc(cmd: Command, data: &[u8]) -> u16 {
    let mut crc_input = [0u8; MAX_FRAME];
    crc_input[0] = ADDRESS;
    crc_input[1] = cmd.0;
    let n = data.len().min(MAX_FRAME - 2);
    crc_input[2..2 + n].copy_from_slice(&data[..n]);
    crc16(&crc_input[..2 + n])
}

/// Float gain to the board's Q10 representation.
#[allow(clippy::cast_possible_truncation)]
pub fn to_q10(x: f32) -> i32 {
    (x * Q10_SCALE) as i32
}

#[allow(clippy::cast_precision_loss)]
pub fn from_q10(raw: i32) -> f32 {
    raw as f32 / Q10_SCALE
}

/// Position-PID parameters uploaded to the board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidUpload {
    pub p: f32,
    pub i: f32,
    pub d: f32,
    pub max_integral: u32,
    pub deadzone: u32,
    pub min_pos: i32,
    pub max_pos: i32,
}

/// Stiff PID plus the buffered move that returns the lever home.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomingProfile {
    pub pid: PidUpload,
    pub accel: i32,
    pub speed: i32,
    pub decel: i32,
    pub home: i32,
    /// Gains of the soft PID used once the lever is free
    pub unlock_p: f32,
    pub unlock_i: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderReading {
    pub position: i32,
    pub status: u8,
    /// Response was discarded; `position` is the last good value
    pub stale: bool,
}

/// Coarse lever direction relative to a symmetric threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeverState {
    PullBack,
    PushForward,
    NotActuated,
}

impl LeverState {
    pub fn classify(position: i32, threshold: i32) -> Self {
        if position >= threshold {
            Self::PushForward
        } else if position <= -threshold {
            Self::PullBack
        } else {
            Self::NotActuated
        }
    }
}

pub struct MotorBoard<L: SerialLink> {
    link: L,
    read_timeout: Duration,
    last_good: i32,
    stale_streak: u32,
    stale_total: u64,
}

impl<L: SerialLink> core::fmt::Debug for MotorBoard<L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MotorBoard")
            .field("read_timeout", &self.read_timeout)
            .field("last_good", &self.last_good)
            .field("stale_streak", &self.stale_streak)
            .finish_non_exhaustive()
    }
}

impl<L: SerialLink> MotorBoard<L> {
    pub fn new(link: L, read_timeout: Duration) -> Self {
        Self {
            link,
            read_timeout,
            last_good: 0,
            stale_streak: 0,
            stale_total: 0,
        }
    }

    fn send(&mut self, frame: &Frame) -> Result<()> {
        tracing::trace!(cmd = frame.command().0, len = frame.as_bytes().len(), "board tx");
        self.link
            .write_all(frame.as_bytes())
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)).wrap_err("motor board write"))
    }

    fn position_command(
        &mut self,
        accel: i32,
        speed: i32,
        decel: i32,
        position: i32,
        buffered: Option<bool>,
    ) -> Result<()> {
        let mut f = Frame::new(Command::DRIVE_M1);
        f.push_i32(accel)?
            .push_i32(speed)?
            .push_i32(decel)?
            .push_i32(position)?;
        if let Some(b) = buffered {
            f.push_u8(u8::from(b))?;
        }
        f.seal();
        self.send(&f)
    }

    /// Move M1 to `position` with the given profile.
    pub fn drive_m1(&mut self, accel: i32, speed: i32, decel: i32, position: i32) -> Result<()> {
        self.position_command(accel, speed, decel, position, None)
    }

    /// As `drive_m1`, with the trailing buffer flag (true queues behind the
    /// move in progress).
    pub fn set_position(
        &mut self,
        accel: i32,
        speed: i32,
        decel: i32,
        position: i32,
        buffered: bool,
    ) -> Result<()> {
        self.position_command(accel, speed, decel, position, Some(buffered))
    }

    /// Upload position-PID parameters. Gains go out as Q10 in D, P, I order.
    #[allow(clippy::cast_sign_loss)]
    pub fn update_pid(&mut self, pid: &PidUpload) -> Result<()> {
        let mut f = Frame::new(Command::SET_PID);
        f.push_i32(to_q10(pid.d))?
            .push_i32(to_q10(pid.p))?
            .push_i32(to_q10(pid.i))?
            .push_u32(pid.max_integral)?
            .push_u32(pid.deadzone)?
            .push_u32(pid.min_pos as u32)?
            .push_u32(pid.max_pos as u32)?;
        f.seal();
        tracing::debug!(p = pid.p, i = pid.i, d = pid.d, deadzone = pid.deadzone, "board pid upload");
        self.send(&f)
    }

    pub fn reset_encoder_counter(&mut self) -> Result<()> {
        let mut f = Frame::new(Command::RESET_ENCODER);
        f.seal();
        self.last_good = 0;
        self.send(&f)
    }

    /// Single-byte command such as a duty or mode setting.
    pub fn send_command(&mut self, cmd: Command, value: u8) -> Result<()> {
        let mut f = Frame::new(cmd);
        f.push_u8(value)?;
        f.seal();
        self.send(&f)
    }

    /// Request `cmd` and fill `data` with the CRC-checked response body.
    pub fn read_command(&mut self, cmd: Command, data: &mut [u8]) -> Result<()> {
        let want = data.len() + 2;
        if data.len() > MAX_PAYLOAD {
            return Err(RigError::Protocol(ProtocolError::PayloadTooLong(data.len())).into());
        }
        if let Err(e) = self.link.clear_input() {
            tracing::debug!(error = %e, "board input flush failed");
        }
        // Read requests are the bare header; the response CRC covers it.
        self.send(&Frame::new(cmd))?;

        let mut rx = [0u8; MAX_FRAME];
        if let Err(e) = self.link.read_exact_timeout(&mut rx[..want], self.read_timeout) {
            let mapped = match map_hw_error(&*e) {
                RigError::Timeout => RigError::Protocol(ProtocolError::Timeout(
                    u64::try_from(self.read_timeout.as_millis()).unwrap_or(u64::MAX),
                )),
                other => other,
            };
            return Err(mapped.into());
        }
        let (body, trailer) = rx[..want].split_at(data.len());
        let got = u16::from_be_bytes([trailer[0], trailer[1]]);
        let expected = response_crc(cmd, body);
        if got != expected {
            return Err(RigError::Protocol(ProtocolError::CrcMismatch { expected, got }).into());
        }
        data.copy_from_slice(body);
        Ok(())
    }

    /// Encoder position and status byte. Never fails: an unusable response
    /// yields the last good position flagged stale.
    pub fn read_encoder_value(&mut self) -> EncoderReading {
        let mut data = [0u8; 5];
        match self.read_command(Command::READ_ENCODER, &mut data) {
            Ok(()) => {
                let position = i32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                self.last_good = position;
                self.stale_streak = 0;
                EncoderReading {
                    position,
                    status: data[4],
                    stale: false,
                }
            }
            Err(e) => {
                self.stale_streak = self.stale_streak.saturating_add(1);
                self.stale_total = self.stale_total.saturating_add(1);
                tracing::debug!(error = %e, streak = self.stale_streak, "stale encoder read");
                EncoderReading {
                    position: self.last_good,
                    status: 0,
                    stale: true,
                }
            }
        }
    }

    /// Read back the board's position PID (Q10 gains decoded).
    #[allow(clippy::cast_possible_wrap)]
    pub fn read_pid(&mut self) -> Result<PidUpload> {
        let mut data = [0u8; 28];
        self.read_command(Command::READ_PID, &mut data)?;
        let word = |i: usize| u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        Ok(PidUpload {
            p: from_q10(word(0) as i32),
            i: from_q10(word(4) as i32),
            d: from_q10(word(8) as i32),
            max_integral: word(12),
            deadzone: word(16),
            min_pos: word(20) as i32,
            max_pos: word(24) as i32,
        })
    }

    /// Stiff PID and a buffered move to `profile.home`.
    pub fn home(&mut self, profile: &HomingProfile) -> Result<()> {
        self.update_pid(&profile.pid)?;
        self.set_position(profile.accel, profile.speed, profile.decel, profile.home, true)
    }

    /// Soft PID whose deadzone spans the free range, leaving the lever loose.
    pub fn unlock(&mut self, profile: &HomingProfile, range: u32) -> Result<()> {
        self.update_pid(&PidUpload {
            p: profile.unlock_p,
            i: profile.unlock_i,
            d: 0.0,
            deadzone: range,
            ..profile.pid
        })
    }

    pub fn lever_state(&mut self, threshold: i32) -> LeverState {
        LeverState::classify(self.read_encoder_value().position, threshold)
    }

    /// Consecutive stale reads since the last good one.
    pub fn stale_streak(&self) -> u32 {
        self.stale_streak
    }

    pub fn stale_total(&self) -> u64 {
        self.stale_total
    }

    pub fn last_good(&self) -> i32 {
        self.last_good
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

impl<L: SerialLink> PositionSource for MotorBoard<L> {
    fn read_position(&mut self) -> Result<i32> {
        Ok(self.read_encoder_value().position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value_matches_xmodem() {
        assert_eq!(crc16(b"123456789"), 0x31C3);
    }

    #[test]
    fn reset_frame_layout() {
        let mut f = Frame::new(Command::RESET_ENCODER);
        f.seal();
        assert_eq!(f.as_bytes(), &[0x80, 0x14, 0x49, 0x2D]);
    }

    #[test]
    fn payload_limit_is_enforced() {
        let mut f = Frame::new(Command::SET_PID);
        for _ in 0..7 {
            f.push_u32(0).unwrap();
        }
        assert_eq!(f.push_u8(0).unwrap_err(), ProtocolError::PayloadTooLong(29));
    }

    #[test]
    fn sealed_frame_rejects_more_payload() {
        let mut f = Frame::new(Command::DRIVE_M1);
        f.seal();
        assert_eq!(f.push_u8(1).unwrap_err(), ProtocolError::Sealed);
        assert_eq!(f.push_i32(-1).unwrap_err(), ProtocolError::Sealed);
        assert_eq!(f.as_bytes().len(), 4);
    }

    #[test]
    fn q10_conversion() {
        assert_eq!(to_q10(600.0), 614_400);
        assert_eq!(to_q10(0.03), 30);
        assert!((from_q10(to_q10(0.21)) - 0.2099).abs() < 1e-3);
    }

    #[test]
    fn lever_state_classification() {
        assert_eq!(LeverState::classify(30, 25), LeverState::PushForward);
        assert_eq!(LeverState::classify(-25, 25), LeverState::PullBack);
        assert_eq!(LeverState::classify(0, 25), LeverState::NotActuated);
    }
}
