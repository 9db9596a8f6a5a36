//! A debug session on one adapter.
//!
//! `Session` owns the transport together with everything that has to agree about its state:
//! the tracked TAP state, the GPIO shadow and the pending SWD transactions.  All JTAG, SWD and
//! signal operations go through it so that bits captured for one of them never end up in
//! another's results.
use core::ops::DerefMut;

use tracing::{debug, error, info};

use crate::cable::{ClockMode, Edge, Transport};
use crate::commands::{JtagCommand, JtagExecutor};
use crate::config::{AdapterConfig, WireProtocol};
use crate::error::Error;
use crate::sequences::SwdSequence;
use crate::signal::{LayoutSignal, SignalLevel, SignalRegistry, SWD_EN};
use crate::statemachine::JtagState;
use crate::swd::{Port, ReadSlot, SwdQueue};

/// Above this TCK rate, sampling TDO on the rising edge may not meet target timing.
const FAST_TCK_HZ: u32 = 10_000_000;

pub struct Session<T> {
    pub transport: T,
    config: AdapterConfig,
    signals: SignalRegistry,
    jtag: JtagExecutor,
    swd: SwdQueue,
}

impl<T, U> Session<T>
where
    T: DerefMut<Target = U>,
    U: Transport + ?Sized,
{
    /// Bring up the adapter: write the initial GPIO layout, turn off loopback and set the clock.
    /// In SWD mode the layout must define `SWD_EN`, which is asserted first.
    pub fn open(mut transport: T, config: AdapterConfig, mut signals: SignalRegistry) -> Result<Self, Error> {
        config.validate()?;
        signals.set_init_state(config.layout_init);

        let mode = match config.protocol {
            WireProtocol::Jtag => ClockMode::jtag(config.tdo_sample_edge),
            WireProtocol::Swd => {
                signals.define_default("TCK", 0x01);
                signals.define_default("TDI", 0x02);
                signals.define_default("TDO", 0x04);
                signals.define_default("TMS", 0x08);

                let Some(swd_en) = signals.signal(SWD_EN).copied() else {
                    error!("SWD mode is active but {} signal is not defined", SWD_EN);
                    return Err(Error::Config(alloc::format!(
                        "SWD mode is active but {SWD_EN} signal is not defined"
                    )));
                };
                // A placeholder SWD_EN has no mask and nothing to drive.
                if swd_en.data_mask != 0 {
                    signals.set(&mut *transport, SWD_EN, SignalLevel::High)?;
                }
                ClockMode::SWD
            }
        };

        signals.write_all(&mut *transport)?;
        transport.set_loopback(false)?;
        let hz = transport.set_frequency(config.speed_hz)?;
        info!("adapter clock {} Hz (requested {} Hz)", hz, config.speed_hz);
        transport.flush()?;

        let session = Self {
            transport,
            config,
            signals,
            jtag: JtagExecutor::new(mode),
            swd: SwdQueue::with_capacity(config.swd_queue_capacity),
        };
        session.speed_hint(hz);
        Ok(session)
    }

    /// Execute a batch of JTAG commands and fill in the captured scan data.
    pub fn execute(&mut self, commands: &mut [JtagCommand]) -> Result<(), Error> {
        if self.swd.outstanding_bits() > 0 {
            self.flush()?;
        }

        self.signals.indicate(&mut *self.transport, true);
        let queued = self.jtag.queue(&mut *self.transport, commands);
        self.signals.indicate(&mut *self.transport, false);
        queued?;

        let bits = self.transport.flush()?;
        self.jtag.complete(commands, &bits)
    }

    /// Queue an SWD register read.  The slot is filled by the next successful `swd_run`.
    pub fn swd_read(&mut self, port: Port, address: u8, ap_delay: u32) -> ReadSlot {
        self.swd
            .read(&mut *self.transport, &mut self.signals, port, address, ap_delay)
    }

    /// Queue an SWD register write.
    pub fn swd_write(&mut self, port: Port, address: u8, value: u32, ap_delay: u32) {
        self.swd.write(
            &mut *self.transport,
            &mut self.signals,
            port,
            address,
            value,
            ap_delay,
        )
    }

    /// Execute the queued SWD transactions.
    pub fn swd_run(&mut self) -> Result<(), Error> {
        self.swd.run(&mut *self.transport, &mut self.signals)
    }

    /// Queue one of the JTAG/SWD/dormant switching sequences.
    pub fn switch_sequence(&mut self, sequence: SwdSequence) -> Result<(), Error> {
        debug!("SWD sequence {}", sequence);
        self.signals.swdio_drive(&mut *self.transport, true)?;
        let bits = sequence.bits();
        self.transport
            .clock_data(Some(bits), false, bits.len(), ClockMode::SWD)?;
        Ok(())
    }

    pub fn define_signal(&mut self, name: &str, layout: LayoutSignal) -> Result<(), Error> {
        self.signals.define(name, layout)
    }

    /// Drive a signal and flush, so the change takes effect before returning.
    pub fn set_signal(&mut self, name: &str, level: SignalLevel) -> Result<(), Error> {
        self.signals.set(&mut *self.transport, name, level)?;
        self.flush()
    }

    pub fn get_signal(&mut self, name: &str) -> Result<u16, Error> {
        self.signals.get(&mut *self.transport, name)
    }

    /// Assert or release TRST and SRST through the `nTRST` and `nSRST` signals.  Released lines
    /// are only touched if the board has them, and are tri-stated or driven high depending on
    /// how they are wired.  TRST is left alone in SWD mode.
    pub fn reset(&mut self, trst: bool, srst: bool) -> Result<(), Error> {
        let reset = self.config.reset;
        let transport = &mut *self.transport;

        let has_trst = self.signals.contains("nTRST");
        // SWD has no TAP to reset.
        if self.config.protocol == WireProtocol::Swd {
            if trst {
                debug!("ignoring TRST in SWD mode");
            }
        } else if trst {
            if has_trst {
                self.signals.set(transport, "nTRST", SignalLevel::Low)?;
            } else {
                error!("can't assert TRST: nTRST signal is not defined");
            }
            self.jtag.set_state(JtagState::Reset);
        } else if has_trst && reset.has_trst {
            let level = if reset.trst_open_drain {
                SignalLevel::HighZ
            } else {
                SignalLevel::High
            };
            self.signals.set(transport, "nTRST", level)?;
        }

        let has_srst = self.signals.contains("nSRST");
        if srst {
            if has_srst {
                self.signals.set(transport, "nSRST", SignalLevel::Low)?;
            } else {
                error!("can't assert SRST: nSRST signal is not defined");
            }
        } else if has_srst && reset.has_srst {
            let level = if reset.srst_push_pull {
                SignalLevel::High
            } else {
                SignalLevel::HighZ
            };
            self.signals.set(transport, "nSRST", level)?;
        }

        debug!("trst: {}, srst: {}", trst, srst);
        self.flush()
    }

    /// Change the TCK frequency.  Returns the frequency the adapter actually runs at.
    pub fn set_speed(&mut self, hz: u32) -> Result<u32, Error> {
        if hz == 0 {
            return Err(Error::Config("adapter speed must not be zero".into()));
        }
        let actual = self.transport.set_frequency(hz)?;
        self.config.speed_hz = hz;
        self.speed_hint(actual);
        Ok(actual)
    }

    /// Execute everything queued on the transport.  Captured bits are handed to the SWD queue
    /// if it is waiting for them.
    pub fn flush(&mut self) -> Result<(), Error> {
        let bits = self.transport.flush()?;
        self.swd.absorb(&bits);
        Ok(())
    }

    /// The TAP state after the last JTAG command.
    pub fn state(&self) -> JtagState {
        self.jtag.state()
    }

    pub fn signals(&self) -> &SignalRegistry {
        &self.signals
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Flush anything still queued and give the transport back.
    pub fn close(mut self) -> Result<T, Error> {
        self.flush()?;
        Ok(self.transport)
    }

    fn speed_hint(&self, hz: u32) {
        if self.config.protocol == WireProtocol::Jtag
            && hz >= FAST_TCK_HZ
            && self.config.tdo_sample_edge != Edge::Falling
        {
            info!("if you experience problems at higher adapter clocks, try sampling TDO on the falling edge");
        }
    }
}
