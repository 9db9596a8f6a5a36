//! A transport that records every call, for tests.  In JTAG mode it loops TDI back to TDO and
//! tracks the TAP state the clocked TMS bits lead to.  With an `SwdTarget` attached it answers
//! SWD requests from a register map instead.
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use bitvec::prelude::*;

use crate::cable::{ClockMode, Transport};
use crate::error::TransportError;
use crate::statemachine::JtagState;
use crate::swd::{parity, Ack};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Data {
        out: Option<BitVec<u8>>,
        capture: bool,
        bits: usize,
        mode: ClockMode,
    },
    Tms {
        tms: BitVec<u8>,
        tdi: bool,
        capture: bool,
        mode: ClockMode,
    },
    GpioLow(u8, u8),
    GpioHigh(u8, u8),
    ReadLow,
    ReadHigh,
    Frequency(u32),
    Loopback(bool),
    Flush,
    Delay(u32),
}

#[derive(Clone, Copy, Debug)]
enum Pending {
    Response { ap: bool, read: bool, address: u8, ack: Ack },
    WriteData { ap: bool, address: u8, ack: Ack },
}

/// A simulated SWD target.  Registers are keyed by (access port, address) and read as zero
/// until written.  Acknowledgements are taken from `acks` in order, then OK.
#[derive(Clone, Debug, Default)]
pub struct SwdTarget {
    pub registers: BTreeMap<(bool, u8), u32>,
    pub acks: VecDeque<Ack>,
    pub corrupt_parity: bool,
    pending: Option<Pending>,
}

impl SwdTarget {
    fn clock(&mut self, out: Option<&BitSlice<u8>>, capture: bool, bits: usize) -> BitVec<u8> {
        let mut response = BitVec::new();

        match (self.pending, out) {
            (None, Some(out)) if bits == 8 && out.len() >= 8 && out[..8].load_le::<u8>() & 0x81 == 0x81 => {
                let request = out[..8].load_le::<u8>();
                self.pending = Some(Pending::Response {
                    ap: request & 0x02 != 0,
                    read: request & 0x04 != 0,
                    address: (request & 0x18) >> 1,
                    ack: self.acks.pop_front().unwrap_or(Ack::Ok),
                });
            }
            (Some(Pending::Response { ap, read, address, ack }), None) if capture => {
                let ack_bits = ack.to_bits();
                response.push(false);
                response.extend((0..3).map(|i| ack_bits & (1 << i) != 0));
                if read {
                    let value = if ack == Ack::Ok {
                        self.registers.get(&(ap, address)).copied().unwrap_or(0)
                    } else {
                        0
                    };
                    response.extend((0..32).map(|i| value & (1 << i) != 0));
                    response.push(parity(value) ^ self.corrupt_parity);
                    self.pending = None;
                } else {
                    self.pending = Some(Pending::WriteData { ap, address, ack });
                }
                response.push(false);
            }
            (Some(Pending::WriteData { ap, address, ack }), Some(out)) if bits == 33 => {
                if ack == Ack::Ok {
                    self.registers.insert((ap, address), out[..32].load_le::<u32>());
                }
                self.pending = None;
            }
            _ => {}
        }

        if capture {
            response.resize(bits, false);
        } else {
            response.clear();
        }
        response
    }
}

#[derive(Debug)]
pub struct MockTransport {
    pub ops: Vec<Op>,
    /// The TAP state the clocked TMS bits have led to.
    pub state: JtagState,
    pub pins_low: u8,
    pub pins_high: u8,
    pub swd: Option<SwdTarget>,
    pub burst_limit: usize,
    pub fail_flush: bool,
    /// `clock_data` calls that succeed before the next one fails with a timeout.
    pub clock_data_budget: Option<usize>,
    captured: BitVec<u8>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            state: JtagState::Reset,
            pins_low: 0,
            pins_high: 0,
            swd: None,
            burst_limit: 7,
            fail_flush: false,
            clock_data_budget: None,
            captured: BitVec::new(),
        }
    }

    pub fn flushes(&self) -> usize {
        self.ops.iter().filter(|op| **op == Op::Flush).count()
    }

    /// All TMS bits clocked by `clock_tms`, in order.
    pub fn tms_bits(&self) -> BitVec<u8> {
        let mut bits = BitVec::new();
        for op in &self.ops {
            if let Op::Tms { tms, .. } = op {
                bits.extend_from_bitslice(tms);
            }
        }
        bits
    }

    /// Length of every `clock_tms` call, in order.
    pub fn tms_bursts(&self) -> Vec<usize> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Tms { tms, .. } => Some(tms.len()),
                _ => None,
            })
            .collect()
    }
}

impl Transport for MockTransport {
    fn clock_data(
        &mut self,
        out: Option<&BitSlice<u8>>,
        capture: bool,
        bits: usize,
        mode: ClockMode,
    ) -> Result<(), TransportError> {
        match self.clock_data_budget {
            Some(0) => {
                self.clock_data_budget = None;
                return Err(TransportError::Timeout);
            }
            Some(n) => self.clock_data_budget = Some(n - 1),
            None => {}
        }
        self.ops.push(Op::Data {
            out: out.map(|o| o[..bits].to_bitvec()),
            capture,
            bits,
            mode,
        });

        if let Some(target) = &mut self.swd {
            let response = target.clock(out, capture, bits);
            self.captured.extend_from_bitslice(&response);
            return Ok(());
        }

        for i in 0..bits {
            if capture {
                let tdi = out.map(|o| o[i]).unwrap_or(false);
                self.captured.push(tdi);
            }
            self.state = self.state.step(false);
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
        assert!(
            tms.len() <= self.burst_limit,
            "TMS burst of {} bits exceeds the limit",
            tms.len()
        );
        self.ops.push(Op::Tms {
            tms: tms.to_bitvec(),
            tdi,
            capture,
            mode,
        });

        for bit in tms.iter().by_vals() {
            if capture {
                self.captured.push(tdi);
            }
            self.state = self.state.step(bit);
        }
        Ok(())
    }

    fn set_gpio_low(&mut self, value: u8, direction: u8) -> Result<(), TransportError> {
        self.ops.push(Op::GpioLow(value, direction));
        Ok(())
    }

    fn set_gpio_high(&mut self, value: u8, direction: u8) -> Result<(), TransportError> {
        self.ops.push(Op::GpioHigh(value, direction));
        Ok(())
    }

    fn read_gpio_low(&mut self) -> Result<u8, TransportError> {
        self.ops.push(Op::ReadLow);
        Ok(self.pins_low)
    }

    fn read_gpio_high(&mut self) -> Result<u8, TransportError> {
        self.ops.push(Op::ReadHigh);
        Ok(self.pins_high)
    }

    fn set_frequency(&mut self, hz: u32) -> Result<u32, TransportError> {
        self.ops.push(Op::Frequency(hz));
        Ok(hz)
    }

    fn set_loopback(&mut self, enable: bool) -> Result<(), TransportError> {
        self.ops.push(Op::Loopback(enable));
        Ok(())
    }

    fn flush(&mut self) -> Result<BitVec<u8>, TransportError> {
        self.ops.push(Op::Flush);
        if self.fail_flush {
            self.captured.clear();
            return Err(TransportError::Timeout);
        }
        Ok(core::mem::take(&mut self.captured))
    }

    fn delay_us(&mut self, us: u32) {
        self.ops.push(Op::Delay(us));
    }

    fn tms_burst_limit(&self) -> usize {
        self.burst_limit
    }
}
