//! Bit-banged `Transport` on plain `embedded-hal` pins.  GPIO byte 0 is mapped onto the JTAG
//! pins the way MPSSE adapters wire them: bit 0 TCK, bit 1 TDI, bit 2 TDO, bit 3 TMS.  There is
//! no upper GPIO byte; writes to it are ignored and it reads as zero.
use alloc::format;
use bitvec::prelude::*;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin, PinState};

use crate::cable::{ClockMode, Edge, Transport};
use crate::error::TransportError;

const PIN_TCK: u8 = 1;
const PIN_TDI: u8 = 1 << 1;
const PIN_TDO: u8 = 1 << 2;
const PIN_TMS: u8 = 1 << 3;

fn pin_error<E: core::fmt::Debug>(e: E) -> TransportError {
    TransportError::Io(format!("{e:?}"))
}

pub struct Gpio<Clk, Tdi, Tdo, Tms, Delay>
where
    Clk: OutputPin,
    Tdi: OutputPin,
    Tdo: InputPin,
    Tms: OutputPin,
    Delay: DelayNs,
{
    half_period: u32,
    delay: Delay,
    clock: Clk,
    tdi: Tdi,
    tdo: Tdo,
    tms: Tms,
    // Bits sampled since the last flush
    captured: BitVec<u8>,
}

impl<Clk, Tdi, Tdo, Tms, Delay> Gpio<Clk, Tdi, Tdo, Tms, Delay>
where
    Clk: OutputPin,
    Tdi: OutputPin,
    Tdo: InputPin,
    Tms: OutputPin,
    Delay: DelayNs,
{
    pub fn new(freq_hz: u32, clock: Clk, tdi: Tdi, tdo: Tdo, tms: Tms, delay: Delay) -> Self {
        Gpio {
            half_period: half_period_ns(freq_hz),
            delay,
            clock,
            tdi,
            tdo,
            tms,
            captured: BitVec::new(),
        }
    }

    /// One TCK cycle with TDI and TMS already set up.  TCK idles low, so the outputs change
    /// while it is low, i.e. after the falling edge.
    fn cycle(&mut self, sample: Edge) -> Result<bool, TransportError> {
        self.clock.set_high().map_err(pin_error)?;
        let mut tdo = false;
        if sample == Edge::Rising {
            tdo = self.tdo.is_high().map_err(pin_error)?;
        }
        self.delay.delay_ns(self.half_period);

        self.clock.set_low().map_err(pin_error)?;
        if sample == Edge::Falling {
            tdo = self.tdo.is_high().map_err(pin_error)?;
        }
        self.delay.delay_ns(self.half_period);
        Ok(tdo)
    }
}

// Rounded up, so TCK never runs faster than asked for.
fn half_period_ns(freq_hz: u32) -> u32 {
    500_000_000u32.div_ceil(freq_hz.max(1)).max(1)
}

impl<Clk, Tdi, Tdo, Tms, Delay> Transport for Gpio<Clk, Tdi, Tdo, Tms, Delay>
where
    Clk: OutputPin,
    Tdi: OutputPin,
    Tdo: InputPin,
    Tms: OutputPin,
    Delay: DelayNs,
{
    fn clock_data(
        &mut self,
        out: Option<&BitSlice<u8>>,
        capture: bool,
        bits: usize,
        mode: ClockMode,
    ) -> Result<(), TransportError> {
        self.tms.set_low().map_err(pin_error)?;
        for i in 0..bits {
            let tdi = out.map(|o| o[i]).unwrap_or(false);
            self.tdi.set_state(PinState::from(tdi)).map_err(pin_error)?;
            let tdo = self.cycle(mode.sample)?;
            if capture {
                self.captured.push(tdo);
            }
        }
        Ok(())
    }

    fn clock_tms(
        &mut self,
        tms: &BitSlice<u8>,
        tdi: bool,
        capture: bool,
        mode: ClockMode,
    ) -> Result<(), TransportError> {
        self.tdi.set_state(PinState::from(tdi)).map_err(pin_error)?;
        for bit in tms.iter().by_vals() {
            self.tms.set_state(PinState::from(bit)).map_err(pin_error)?;
            let tdo = self.cycle(mode.sample)?;
            if capture {
                self.captured.push(tdo);
            }
        }
        Ok(())
    }

    fn set_gpio_low(&mut self, value: u8, _direction: u8) -> Result<(), TransportError> {
        self.clock
            .set_state(PinState::from(value & PIN_TCK != 0))
            .map_err(pin_error)?;
        self.tdi
            .set_state(PinState::from(value & PIN_TDI != 0))
            .map_err(pin_error)?;
        self.tms
            .set_state(PinState::from(value & PIN_TMS != 0))
            .map_err(pin_error)?;
        Ok(())
    }

    fn set_gpio_high(&mut self, _value: u8, _direction: u8) -> Result<(), TransportError> {
        Ok(())
    }

    fn read_gpio_low(&mut self) -> Result<u8, TransportError> {
        let tdo = self.tdo.is_high().map_err(pin_error)?;
        Ok(if tdo { PIN_TDO } else { 0 })
    }

    fn read_gpio_high(&mut self) -> Result<u8, TransportError> {
        Ok(0)
    }

    fn set_frequency(&mut self, hz: u32) -> Result<u32, TransportError> {
        self.half_period = half_period_ns(hz);
        Ok(500_000_000 / self.half_period)
    }

    fn set_loopback(&mut self, enable: bool) -> Result<(), TransportError> {
        if enable {
            return Err(TransportError::Unsupported("loopback"));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<BitVec<u8>, TransportError> {
        Ok(core::mem::take(&mut self.captured))
    }

    fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }
}
