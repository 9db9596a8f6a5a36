//! Adapter settings that are fixed when a session is opened.
use core::str::FromStr;

use crate::cable::Edge;
use crate::error::Error;
use crate::signal::GpioState;
use crate::swd::DEFAULT_QUEUE_CAPACITY;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WireProtocol {
    #[default]
    Jtag,
    Swd,
}

impl FromStr for WireProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jtag" => Ok(WireProtocol::Jtag),
            "swd" => Ok(WireProtocol::Swd),
            other => Err(Error::Config(alloc::format!("unknown transport '{other}'"))),
        }
    }
}

/// Which reset lines the board has and how they are wired.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResetConfig {
    pub has_trst: bool,
    pub has_srst: bool,
    /// TRST is released by tri-stating it instead of driving it high.
    pub trst_open_drain: bool,
    /// SRST is released by driving it high instead of tri-stating it.
    pub srst_push_pull: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdapterConfig {
    pub protocol: WireProtocol,
    /// GPIO outputs and directions written when the adapter is opened.
    pub layout_init: GpioState,
    /// The TCK edge TDO is sampled on.
    pub tdo_sample_edge: Edge,
    pub speed_hz: u32,
    pub reset: ResetConfig,
    /// Transactions the SWD queue holds before it has to run.
    pub swd_queue_capacity: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            protocol: WireProtocol::Jtag,
            layout_init: GpioState::default(),
            tdo_sample_edge: Edge::Rising,
            speed_hz: 1_000_000,
            reset: ResetConfig::default(),
            swd_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl AdapterConfig {
    pub fn with_protocol(mut self, protocol: WireProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_layout_init(mut self, layout_init: GpioState) -> Self {
        self.layout_init = layout_init;
        self
    }

    pub fn with_tdo_sample_edge(mut self, edge: Edge) -> Self {
        self.tdo_sample_edge = edge;
        self
    }

    pub fn with_speed(mut self, hz: u32) -> Self {
        self.speed_hz = hz;
        self
    }

    pub fn with_reset(mut self, reset: ResetConfig) -> Self {
        self.reset = reset;
        self
    }

    pub fn with_swd_queue_capacity(mut self, capacity: usize) -> Self {
        self.swd_queue_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.speed_hz == 0 {
            return Err(Error::Config("adapter speed must not be zero".into()));
        }
        if self.swd_queue_capacity == 0 {
            return Err(Error::Config("SWD queue capacity must not be zero".into()));
        }
        Ok(())
    }
}
