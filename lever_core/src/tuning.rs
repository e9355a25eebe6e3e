//! Line-oriented live tuning commands.
//!
//! Lines look like `SET_KP_0.25` or `STOP`. Anything unrecognized or with an
//! unparsable value is ignored.

use std::io::BufRead;

use crossbeam_channel as xch;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TuningCommand {
    SetKp(f32),
    SetKi(f32),
    SetKd(f32),
    /// New home position for Reset
    SetTarget(i32),
    SetDeadzone(i32),
    /// Viscous damping override
    SetViscous(f32),
    Stop,
    Start,
    Reset,
}

fn finite(s: &str) -> Option<f32> {
    s.trim().parse::<f32>().ok().filter(|v| v.is_finite())
}

impl TuningCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        match line {
            "STOP" => return Some(Self::Stop),
            "START" => return Some(Self::Start),
            "RESET" => return Some(Self::Reset),
            _ => {}
        }
        if let Some(v) = line.strip_prefix("SET_KP_") {
            return finite(v).map(Self::SetKp);
        }
        if let Some(v) = line.strip_prefix("SET_KI_") {
            return finite(v).map(Self::SetKi);
        }
        if let Some(v) = line.strip_prefix("SET_KD_") {
            return finite(v).map(Self::SetKd);
        }
        if let Some(v) = line.strip_prefix("SET_TARGET_") {
            return v.trim().parse().ok().map(Self::SetTarget);
        }
        if let Some(v) = line.strip_prefix("SET_DEADZONE_") {
            return v.trim().parse().ok().map(Self::SetDeadzone);
        }
        if let Some(v) = line.strip_prefix("SET_VISCOUS_") {
            return finite(v).map(Self::SetViscous);
        }
        None
    }
}

/// Reads commands from a line source on a background thread.
///
/// The thread is detached: blocking reads on stdin cannot be interrupted, so
/// it ends when the source hits EOF or the receiver is dropped.
#[derive(Debug)]
pub struct TuningReader {
    rx: xch::Receiver<TuningCommand>,
}

impl TuningReader {
    pub fn spawn<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = xch::bounded(32);
        std::thread::spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::warn!(error = %e, "tuning input closed");
                        break;
                    }
                };
                match TuningCommand::parse(&line) {
                    Some(cmd) => {
                        tracing::info!(?cmd, "tuning command");
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => tracing::debug!(line = %line.trim(), "ignoring unrecognized tuning line"),
                }
            }
            tracing::trace!("tuning reader exiting");
        });
        Self { rx }
    }

    /// Commands received since the last call, oldest first.
    pub fn drain(&self) -> Vec<TuningCommand> {
        self.rx.try_iter().collect()
    }

    pub fn receiver(&self) -> &xch::Receiver<TuningCommand> {
        &self.rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_forwards_parsed_lines() {
        let input = std::io::Cursor::new("SET_KP_0.5\nnoise\nSTOP\n");
        let reader = TuningReader::spawn(input);
        let mut got = Vec::new();
        while let Ok(cmd) = reader
            .receiver()
            .recv_timeout(std::time::Duration::from_secs(2))
        {
            got.push(cmd);
        }
        assert_eq!(got, vec![TuningCommand::SetKp(0.5), TuningCommand::Stop]);
    }
}
