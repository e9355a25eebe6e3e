//! Serial link to the motor-driver board via `serialport`.

use std::io::{Read, Write};
use std::time::Duration;

use lever_traits::{BoxError, SerialLink};
use serialport::{ClearBuffer, SerialPort};

use crate::error::{HwError, Result};

pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
}

impl core::fmt::Debug for SerialPortLink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SerialPortLink")
            .field("name", &self.port.name())
            .finish()
    }
}

impl SerialPortLink {
    pub fn open(path: &str, baud: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(timeout)
            .open()
            .map_err(|e| HwError::Serial(format!("open {path}: {e}")))?;
        tracing::info!(path, baud, "motor board link open");
        Ok(Self { port })
    }
}

impl SerialLink for SerialPortLink {
    fn write_all(&mut self, bytes: &[u8]) -> std::result::Result<(), BoxError> {
        self.port.write_all(bytes).map_err(HwError::from)?;
        self.port.flush().map_err(HwError::from)?;
        Ok(())
    }

    fn clear_input(&mut self) -> std::result::Result<(), BoxError> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| HwError::Serial(e.to_string()))?;
        Ok(())
    }

    fn read_exact_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> std::result::Result<(), BoxError> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| HwError::Serial(e.to_string()))?;
        match self.port.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(Box::new(HwError::Timeout)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(Box::new(HwError::ShortRead {
                    expected: buf.len(),
                    got: 0,
                }))
            }
            Err(e) => Err(Box::new(HwError::Io(e))),
        }
    }
}
