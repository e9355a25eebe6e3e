//! Raspberry Pi backends built on `rppal`.

use std::sync::Arc;
use std::time::Duration;

use lever_traits::{Actuator, BoxError, CuePresenter, Dac, DigitalOutput, PulseCounter, PulseOutput};
use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use rppal::i2c::I2c;
use tracing::trace;

use crate::dac::{MCP4725_ADDR, mcp4725_packet};
use crate::error::{HwError, Result};
use crate::quadrature::{Channel, QuadDecoder};
use crate::util::{sleep_then_spin, ticks_to_duration};

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

fn output_pin(gpio: &Gpio, pin: u8) -> Result<OutputPin> {
    Ok(gpio.get(pin).map_err(gpio_err)?.into_output_low())
}

/// x4 quadrature decoder on two input pins, counted in interrupt callbacks.
pub struct GpioQuadrature {
    _a: InputPin,
    _b: InputPin,
    decoder: Arc<QuadDecoder>,
}

impl GpioQuadrature {
    pub fn new(pin_a: u8, pin_b: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let mut a = gpio.get(pin_a).map_err(gpio_err)?.into_input_pullup();
        let mut b = gpio.get(pin_b).map_err(gpio_err)?.into_input_pullup();
        let decoder = Arc::new(QuadDecoder::new(a.is_high(), b.is_high()));

        // rppal runs each pin's callback on its own thread.
        let da = decoder.clone();
        a.set_async_interrupt(Trigger::Both, move |level| {
            da.edge(Channel::A, level == Level::High);
        })
        .map_err(gpio_err)?;
        let db = decoder.clone();
        b.set_async_interrupt(Trigger::Both, move |level| {
            db.edge(Channel::B, level == Level::High);
        })
        .map_err(gpio_err)?;

        Ok(Self {
            _a: a,
            _b: b,
            decoder,
        })
    }
}

impl PulseCounter for GpioQuadrature {
    #[allow(clippy::cast_possible_truncation)]
    fn count(&mut self) -> i16 {
        // Expose the low 16 bits so callers see the same wrap as a PCNT unit.
        self.decoder.count() as i16
    }
}

/// H-bridge motor: software PWM on one pin, direction on another.
pub struct PwmMotor {
    pwm: OutputPin,
    dir: OutputPin,
    freq_hz: f64,
}

impl PwmMotor {
    pub fn new(pwm_pin: u8, dir_pin: u8, freq_hz: f64) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        Ok(Self {
            pwm: output_pin(&gpio, pwm_pin)?,
            dir: output_pin(&gpio, dir_pin)?,
            freq_hz,
        })
    }
}

impl Actuator for PwmMotor {
    fn apply(&mut self, effort: f32) -> std::result::Result<(), BoxError> {
        let e = effort.clamp(-100.0, 100.0);
        if e >= 0.0 {
            self.dir.set_high();
        } else {
            self.dir.set_low();
        }
        let duty = f64::from(e.abs()) / 100.0;
        self.pwm
            .set_pwm_frequency(self.freq_hz, duty)
            .map_err(|e| Box::new(gpio_err(e)) as BoxError)
    }

    fn stop(&mut self) -> std::result::Result<(), BoxError> {
        self.pwm
            .clear_pwm()
            .map_err(|e| Box::new(gpio_err(e)) as BoxError)?;
        self.pwm.set_low();
        Ok(())
    }
}

/// Event-marker line; pulse width timed by sleep plus a short spin.
pub struct GpioPulse {
    pin: OutputPin,
    resolution_hz: u32,
}

impl GpioPulse {
    pub fn new(pin: u8, resolution_hz: u32) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        Ok(Self {
            pin: output_pin(&gpio, pin)?,
            resolution_hz,
        })
    }
}

const PULSE_SPIN_MARGIN: Duration = Duration::from_micros(300);

impl PulseOutput for GpioPulse {
    fn emit(&mut self, high_ticks: u32, low_ticks: u32) -> std::result::Result<(), BoxError> {
        self.pin.set_high();
        sleep_then_spin(
            ticks_to_duration(high_ticks, self.resolution_hz),
            PULSE_SPIN_MARGIN,
        );
        self.pin.set_low();
        if low_ticks > 0 {
            sleep_then_spin(
                ticks_to_duration(low_ticks, self.resolution_hz),
                PULSE_SPIN_MARGIN,
            );
        }
        trace!(high_ticks, low_ticks, "marker pulse");
        Ok(())
    }
}

/// Plain output line (reward TTL).
pub struct GpioLine {
    pin: OutputPin,
}

impl GpioLine {
    pub fn new(pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        Ok(Self {
            pin: output_pin(&gpio, pin)?,
        })
    }
}

impl DigitalOutput for GpioLine {
    fn set_level(&mut self, high: bool) -> std::result::Result<(), BoxError> {
        if high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}

/// Square-wave buzzer on a PWM-capable pin.
pub struct PwmTone {
    pin: OutputPin,
}

impl PwmTone {
    pub fn new(pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        Ok(Self {
            pin: output_pin(&gpio, pin)?,
        })
    }
}

impl CuePresenter for PwmTone {
    fn start(&mut self, freq_hz: u32) -> std::result::Result<(), BoxError> {
        self.pin
            .set_pwm_frequency(f64::from(freq_hz), 0.5)
            .map_err(|e| Box::new(gpio_err(e)) as BoxError)
    }

    fn stop(&mut self) -> std::result::Result<(), BoxError> {
        self.pin
            .clear_pwm()
            .map_err(|e| Box::new(gpio_err(e)) as BoxError)?;
        self.pin.set_low();
        Ok(())
    }
}

/// MCP4725 on the default I2C bus.
pub struct Mcp4725 {
    i2c: I2c,
}

impl Mcp4725 {
    pub fn new() -> Result<Self> {
        let mut i2c = I2c::new().map_err(|e| HwError::I2c(e.to_string()))?;
        i2c.set_slave_address(MCP4725_ADDR)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(Self { i2c })
    }
}

impl Dac for Mcp4725 {
    fn write_code(&mut self, code: u16) -> std::result::Result<(), BoxError> {
        let packet = mcp4725_packet(code);
        let written = self
            .i2c
            .write(&packet)
            .map_err(|e| Box::new(HwError::I2c(e.to_string())) as BoxError)?;
        if written != packet.len() {
            return Err(Box::new(HwError::ShortRead {
                expected: packet.len(),
                got: written,
            }));
        }
        Ok(())
    }
}
