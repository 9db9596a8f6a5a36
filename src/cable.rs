//! Implementations for different debug adapters live here.  Adapters implement the `Transport`
//! trait, which is the only thing the JTAG executor and SWD queue talk to.
use bitvec::prelude::*;
use core::str::FromStr;

use crate::error::{Error, TransportError};

pub mod gpio;
#[cfg(feature = "std")]
pub mod mpsse;

#[cfg(test)]
pub(crate) mod mock;

/// A TCK edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

impl FromStr for Edge {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rising" => Ok(Edge::Rising),
            "falling" => Ok(Edge::Falling),
            other => Err(Error::Config(alloc::format!(
                "unknown clock edge '{other}', use rising or falling"
            ))),
        }
    }
}

/// How data is clocked.  Bits always go LSB first; `sample` is the edge TDO/SWDIO is captured
/// on and `drive` the edge TDI/SWDIO changes on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockMode {
    pub sample: Edge,
    pub drive: Edge,
}

impl ClockMode {
    pub const JTAG: ClockMode = ClockMode {
        sample: Edge::Rising,
        drive: Edge::Falling,
    };
    /// Samples TDO on the falling edge, which some targets need to meet timing at high TCK
    /// rates.
    pub const JTAG_ALT: ClockMode = ClockMode {
        sample: Edge::Falling,
        drive: Edge::Falling,
    };
    pub const SWD: ClockMode = ClockMode::JTAG;

    /// The JTAG mode that samples TDO on `edge`.
    pub fn jtag(edge: Edge) -> ClockMode {
        match edge {
            Edge::Rising => ClockMode::JTAG,
            Edge::Falling => ClockMode::JTAG_ALT,
        }
    }
}

pub trait Transport {
    /// Clock `bits` cycles with TMS held low.  Each cycle drives the next bit of `out` on TDI
    /// (low when `out` is `None`), and when `capture` is set, records TDO for the next `flush`.
    fn clock_data(
        &mut self,
        out: Option<&BitSlice<u8>>,
        capture: bool,
        bits: usize,
        mode: ClockMode,
    ) -> Result<(), TransportError>;

    /// Clock one cycle per element of `tms`, holding TDI at `tdi`.  When `capture` is set, TDO
    /// is recorded for the next `flush`.  `tms` is never longer than `tms_burst_limit`.
    fn clock_tms(
        &mut self,
        tms: &BitSlice<u8>,
        tdi: bool,
        capture: bool,
        mode: ClockMode,
    ) -> Result<(), TransportError>;

    /// Queue new output values and directions (1 = output) for GPIO bits 0..8.
    fn set_gpio_low(&mut self, value: u8, direction: u8) -> Result<(), TransportError>;

    /// Queue new output values and directions for GPIO bits 8..16.
    fn set_gpio_high(&mut self, value: u8, direction: u8) -> Result<(), TransportError>;

    /// Read GPIO bits 0..8.  Everything queued before the read is executed first; bits captured
    /// along the way are kept for the next `flush`.
    fn read_gpio_low(&mut self) -> Result<u8, TransportError>;

    /// Read GPIO bits 8..16, see `read_gpio_low`.
    fn read_gpio_high(&mut self) -> Result<u8, TransportError>;

    /// Set the TCK frequency.  Returns the frequency actually achieved.
    fn set_frequency(&mut self, hz: u32) -> Result<u32, TransportError>;

    /// Connect TDI to TDO inside the adapter.
    fn set_loopback(&mut self, enable: bool) -> Result<(), TransportError>;

    /// Execute everything queued and return all bits captured since the previous flush, in the
    /// order they were clocked.
    fn flush(&mut self) -> Result<BitVec<u8>, TransportError>;

    /// Wait for at least `us` microseconds.
    fn delay_us(&mut self, us: u32);

    /// The longest TMS sequence a single `clock_tms` call may carry.
    fn tms_burst_limit(&self) -> usize {
        7
    }
}
