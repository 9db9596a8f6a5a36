//! Queued SWD register access.
//!
//! Every transaction is put on the wire as soon as it is queued, but the adapter only executes
//! it on the next flush, so acknowledgements and read data are not known until [`SwdQueue::run`].
//! Reads hand out a [`ReadSlot`] that is filled in by a successful run.
//!
//! A transaction is an 8-bit request (start, APnDP, RnW, A\[2:3\], parity, stop, park), then
//! a turnaround, a 3-bit acknowledgement and, for reads, 32 data bits, a parity bit and
//! another turnaround.  Writes turn the line around after the acknowledgement and send 32 data
//! bits and a parity bit.
use alloc::sync::Arc;
use alloc::vec::Vec;
use bitvec::prelude::*;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tracing::{debug, error, trace};

use crate::cable::{ClockMode, Transport};
use crate::error::{Error, TransportError};
use crate::signal::SignalRegistry;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// DP register address of TARGETSEL.
pub const DP_TARGETSEL: u8 = 0x0c;

// turnaround, ack, data, parity, turnaround
const READ_CAPTURE_BITS: usize = 1 + 3 + 32 + 1 + 1;
// turnaround, ack, turnaround
const WRITE_CAPTURE_BITS: usize = 1 + 3 + 1;
// A transaction must be followed by another one or by at least 8 idle cycles.
const TRAILING_IDLE_CYCLES: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Port {
    DebugPort,
    AccessPort,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwdRequest {
    pub port: Port,
    pub read: bool,
    /// Register address; only bits 2 and 3 go on the wire.
    pub address: u8,
}

impl SwdRequest {
    pub fn read(port: Port, address: u8) -> Self {
        Self {
            port,
            read: true,
            address,
        }
    }

    pub fn write(port: Port, address: u8) -> Self {
        Self {
            port,
            read: false,
            address,
        }
    }

    /// The request byte, LSB first on the wire.
    pub fn encode(&self) -> u8 {
        let ap = self.port == Port::AccessPort;
        let a2 = self.address & 0x04 != 0;
        let a3 = self.address & 0x08 != 0;
        let parity = ap ^ self.read ^ a2 ^ a3;

        0x81 | (ap as u8) << 1
            | (self.read as u8) << 2
            | (self.address & 0x0c) << 1
            | (parity as u8) << 5
    }

    /// Whether the target acknowledges this request.  Writes to DP TARGETSEL are not
    /// answered, since every target on a multi-drop bus sees them.
    pub fn returns_ack(&self) -> bool {
        !(self.port == Port::DebugPort && !self.read && self.address == DP_TARGETSEL)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ack {
    Ok,
    Wait,
    Fault,
    /// No target answered, or the answer was garbled.
    Invalid(u8),
}

impl Ack {
    /// Decode the 3 acknowledgement bits as received, LSB first.
    pub fn from_bits(bits: u8) -> Ack {
        match bits & 0x7 {
            0b001 => Ack::Ok,
            0b010 => Ack::Wait,
            0b100 => Ack::Fault,
            other => Ack::Invalid(other),
        }
    }

    pub fn to_bits(self) -> u8 {
        match self {
            Ack::Ok => 0b001,
            Ack::Wait => 0b010,
            Ack::Fault => 0b100,
            Ack::Invalid(bits) => bits & 0x7,
        }
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ack::Ok => f.write_str("OK"),
            Ack::Wait => f.write_str("WAIT"),
            Ack::Fault => f.write_str("FAULT"),
            Ack::Invalid(bits) => write!(f, "JUNK ({bits:#05b})"),
        }
    }
}

/// Odd parity over a data word: `true` if an odd number of bits are set.
pub fn parity(value: u32) -> bool {
    value.count_ones() % 2 == 1
}

/// A decoded target response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwdResponse {
    pub ack: Ack,
    pub data: u32,
    pub parity: bool,
}

impl SwdResponse {
    /// Decode the bits captured for a read: turnaround, ack, data, parity, turnaround.
    pub fn decode_read(bits: &BitSlice<u8>) -> SwdResponse {
        SwdResponse {
            ack: Ack::from_bits(bits[1..4].load_le::<u8>()),
            data: bits[4..36].load_le::<u32>(),
            parity: bits[36],
        }
    }

    /// Decode the bits captured for a write: turnaround, ack, turnaround.
    pub fn decode_write(bits: &BitSlice<u8>) -> SwdResponse {
        SwdResponse {
            ack: Ack::from_bits(bits[1..4].load_le::<u8>()),
            data: 0,
            parity: false,
        }
    }

    pub fn parity_ok(&self) -> bool {
        parity(self.data) == self.parity
    }
}

/// Where the result of a queued read shows up.  Empty until the queue has run successfully
/// up to and including this read.
#[derive(Clone, Debug, Default)]
pub struct ReadSlot(Arc<SlotValue>);

#[derive(Debug, Default)]
struct SlotValue {
    value: AtomicU32,
    filled: AtomicBool,
}

impl ReadSlot {
    pub fn get(&self) -> Option<u32> {
        self.0
            .filled
            .load(Ordering::Acquire)
            .then(|| self.0.value.load(Ordering::Relaxed))
    }

    fn set(&self, value: u32) {
        self.0.value.store(value, Ordering::Relaxed);
        self.0.filled.store(true, Ordering::Release);
    }
}

#[derive(Debug)]
struct Entry {
    request: SwdRequest,
    slot: Option<ReadSlot>,
    // Position of this transaction's captured bits among everything captured for the queue.
    offset: usize,
}

#[derive(Debug)]
pub struct SwdQueue {
    entries: Vec<Entry>,
    capacity: usize,
    captured: BitVec<u8>,
    pending_bits: usize,
    status: Result<(), Error>,
}

impl Default for SwdQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl SwdQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            captured: BitVec::new(),
            pending_bits: 0,
            status: Ok(()),
        }
    }

    /// Queue a register read.  `ap_delay` idle cycles follow access port reads.
    pub fn read<U>(
        &mut self,
        transport: &mut U,
        signals: &mut SignalRegistry,
        port: Port,
        address: u8,
        ap_delay: u32,
    ) -> ReadSlot
    where
        U: Transport + ?Sized,
    {
        let slot = ReadSlot::default();
        self.queue(
            transport,
            signals,
            SwdRequest::read(port, address),
            0,
            Some(slot.clone()),
            ap_delay,
        );
        slot
    }

    /// Queue a register write.  `ap_delay` idle cycles follow access port writes.
    pub fn write<U>(
        &mut self,
        transport: &mut U,
        signals: &mut SignalRegistry,
        port: Port,
        address: u8,
        value: u32,
        ap_delay: u32,
    ) where
        U: Transport + ?Sized,
    {
        self.queue(
            transport,
            signals,
            SwdRequest::write(port, address),
            value,
            None,
            ap_delay,
        );
    }

    fn queue<U>(
        &mut self,
        transport: &mut U,
        signals: &mut SignalRegistry,
        request: SwdRequest,
        value: u32,
        slot: Option<ReadSlot>,
        ap_delay: u32,
    ) where
        U: Transport + ?Sized,
    {
        if self.entries.len() >= self.capacity {
            // Full: run what we have, and make room for more next time.
            self.status = self.run(transport, signals);
            self.capacity *= 2;
            debug!("SWD queue grown to {} transactions", self.capacity);
        }

        if self.status.is_err() {
            return;
        }

        if let Err(e) = self.put_on_wire(transport, signals, request, value, ap_delay) {
            self.status = Err(e);
            return;
        }

        let captured = if request.read {
            READ_CAPTURE_BITS
        } else {
            WRITE_CAPTURE_BITS
        };
        self.entries.push(Entry {
            request,
            slot,
            offset: self.pending_bits,
        });
        self.pending_bits += captured;
    }

    fn put_on_wire<U>(
        &mut self,
        transport: &mut U,
        signals: &mut SignalRegistry,
        request: SwdRequest,
        value: u32,
        ap_delay: u32,
    ) -> Result<(), Error>
    where
        U: Transport + ?Sized,
    {
        let cmd = [request.encode()];
        transport.clock_data(Some(cmd.view_bits::<Lsb0>()), false, 8, ClockMode::SWD)?;

        signals.swdio_drive(transport, false)?;
        if request.read {
            transport.clock_data(None, true, READ_CAPTURE_BITS, ClockMode::SWD)?;
            signals.swdio_drive(transport, true)?;
        } else {
            transport.clock_data(None, true, WRITE_CAPTURE_BITS, ClockMode::SWD)?;
            signals.swdio_drive(transport, true)?;

            let mut payload = bitvec![u8, Lsb0; 0; 33];
            payload[..32].store_le(value);
            payload.set(32, parity(value));
            transport.clock_data(Some(payload.as_bitslice()), false, 33, ClockMode::SWD)?;
        }

        if request.port == Port::AccessPort && ap_delay > 0 {
            transport.clock_data(None, false, ap_delay as usize, ClockMode::SWD)?;
        }
        Ok(())
    }

    /// Execute the queued transactions and check their responses in order.  Stops at the
    /// first transaction that was not acknowledged with OK or whose read data has bad parity;
    /// read slots from that point on stay empty.  An error left behind by an earlier automatic
    /// run is returned here, and the queue is emptied either way.
    pub fn run<U>(&mut self, transport: &mut U, signals: &mut SignalRegistry) -> Result<(), Error>
    where
        U: Transport + ?Sized,
    {
        trace!("executing {} queued SWD transactions", self.entries.len());
        let mut result = core::mem::replace(&mut self.status, Ok(()));

        if result.is_ok() {
            result = self.execute(transport, signals);
        } else {
            debug!("skipping SWD queue due to previous errors");
            // Whatever the dropped transactions clocked is still waiting in the transport.
            if let Err(e) = transport.flush() {
                error!("flushing dropped SWD transactions failed: {}", e);
            }
        }

        self.entries.clear();
        self.captured.clear();
        self.pending_bits = 0;

        if result.is_ok() {
            signals.indicate(transport, true);
        }
        result
    }

    fn execute<U>(&mut self, transport: &mut U, signals: &mut SignalRegistry) -> Result<(), Error>
    where
        U: Transport + ?Sized,
    {
        transport.clock_data(None, false, TRAILING_IDLE_CYCLES, ClockMode::SWD)?;
        signals.indicate(transport, false);

        let bits = transport.flush().map_err(|e| {
            error!("SWD queue flush failed: {}", e);
            e
        })?;
        self.absorb(&bits);

        if self.captured.len() < self.pending_bits {
            return Err(TransportError::ShortRead {
                expected: self.pending_bits,
                actual: self.captured.len(),
            }
            .into());
        }

        for entry in &self.entries {
            let request = entry.request;
            let response = if request.read {
                SwdResponse::decode_read(&self.captured[entry.offset..][..READ_CAPTURE_BITS])
            } else {
                SwdResponse::decode_write(&self.captured[entry.offset..][..WRITE_CAPTURE_BITS])
            };

            trace!(
                "{} {} {} reg {:#x} ack {}",
                if request.port == Port::AccessPort { "AP" } else { "DP" },
                if request.read { "read" } else { "write" },
                if request.read { response.data } else { 0 },
                request.address,
                response.ack,
            );

            if response.ack != Ack::Ok && request.returns_ack() {
                debug!("SWD ack not OK: {}", response.ack);
                return Err(Error::ProtocolAck(response.ack));
            }

            if request.read {
                if !response.parity_ok() {
                    error!("SWD read data parity mismatch");
                    return Err(Error::DataIntegrity);
                }
                if let Some(slot) = &entry.slot {
                    slot.set(response.data);
                }
            }
        }

        Ok(())
    }

    /// Take bits returned by a flush that happened while transactions were queued.  Bits
    /// arriving with nothing queued belong to somebody else and are dropped.
    pub fn absorb(&mut self, bits: &BitSlice<u8>) {
        if self.entries.is_empty() {
            return;
        }
        self.captured.extend_from_bitslice(bits);
    }

    /// Number of captured bits that queued transactions are still waiting for.
    pub fn outstanding_bits(&self) -> usize {
        self.pending_bits.saturating_sub(self.captured.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cable::mock::{MockTransport, Op, SwdTarget};
    use crate::signal::{GpioState, LayoutSignal, LED, SWDIO_OE};
    use alloc::vec;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn swd_mock() -> MockTransport {
        let mut mock = MockTransport::new();
        mock.swd = Some(SwdTarget::default());
        mock
    }

    #[test_case(SwdRequest::read(Port::DebugPort, 0x0), 0xa5)]
    #[test_case(SwdRequest::write(Port::DebugPort, 0x0), 0x81)]
    #[test_case(SwdRequest::read(Port::AccessPort, 0xc), 0x9f)]
    #[test_case(SwdRequest::read(Port::DebugPort, 0x4), 0x8d)]
    #[test_case(SwdRequest::write(Port::DebugPort, 0x8), 0xb1)]
    fn request_encoding(request: SwdRequest, byte: u8) {
        assert_eq!(request.encode(), byte);
    }

    #[test]
    fn only_targetsel_write_skips_ack() {
        assert!(!SwdRequest::write(Port::DebugPort, DP_TARGETSEL).returns_ack());
        assert!(SwdRequest::read(Port::DebugPort, DP_TARGETSEL).returns_ack());
        assert!(SwdRequest::write(Port::AccessPort, DP_TARGETSEL).returns_ack());
    }

    #[test_case(0, false)]
    #[test_case(1, true)]
    #[test_case(0xdeadbeef, false)]
    #[test_case(0x8000_0001, false)]
    #[test_case(0x0000_0007, true)]
    fn parity_of(value: u32, odd: bool) {
        assert_eq!(parity(value), odd);
    }

    #[test]
    fn write_then_read_back() {
        let mut mock = swd_mock();
        let mut signals = SignalRegistry::new();
        let mut queue = SwdQueue::default();

        queue.write(&mut mock, &mut signals, Port::AccessPort, 0x4, 0xdeadbeef, 0);
        let slot = queue.read(&mut mock, &mut signals, Port::AccessPort, 0x4, 0);
        assert_eq!(slot.get(), None);
        assert_eq!(queue.len(), 2);

        queue.run(&mut mock, &mut signals).unwrap();
        assert_eq!(slot.get(), Some(0xdeadbeef));
        assert!(queue.is_empty());
    }

    #[test]
    fn transaction_layout_on_the_wire() {
        let mut mock = swd_mock();
        let mut signals = SignalRegistry::new();
        let mut queue = SwdQueue::default();

        queue.read(&mut mock, &mut signals, Port::DebugPort, 0x0, 0);
        queue.write(&mut mock, &mut signals, Port::DebugPort, 0x8, 0x1, 0);

        let clocks: Vec<(Option<u8>, bool, usize)> = mock
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Data { out, capture, bits, .. } => {
                    Some((out.as_ref().map(|o| o[..8].load_le::<u8>()), *capture, *bits))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            clocks,
            vec![
                (Some(0xa5), false, 8),
                (None, true, 38),
                (Some(0xb1), false, 8),
                (None, true, 5),
                // 0x1 with its parity bit
                (Some(0x01), false, 33),
            ]
        );
    }

    #[test]
    fn wait_leaves_read_slots_empty() {
        let mut mock = swd_mock();
        mock.swd.as_mut().unwrap().acks.extend([Ack::Ok, Ack::Wait]);
        let mut signals = SignalRegistry::new();
        let mut queue = SwdQueue::default();

        let first = queue.read(&mut mock, &mut signals, Port::DebugPort, 0x0, 0);
        let second = queue.read(&mut mock, &mut signals, Port::DebugPort, 0x4, 0);
        let third = queue.read(&mut mock, &mut signals, Port::DebugPort, 0x8, 0);

        let err = queue.run(&mut mock, &mut signals).unwrap_err();
        assert!(matches!(err, Error::ProtocolAck(Ack::Wait)));
        assert!(!err.is_fatal());
        assert_eq!(first.get(), Some(0));
        assert_eq!(second.get(), None);
        assert_eq!(third.get(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn fault_is_reported() {
        let mut mock = swd_mock();
        mock.swd.as_mut().unwrap().acks.push_back(Ack::Fault);
        let mut signals = SignalRegistry::new();
        let mut queue = SwdQueue::default();

        queue.write(&mut mock, &mut signals, Port::AccessPort, 0x0, 0x23, 0);
        assert!(matches!(
            queue.run(&mut mock, &mut signals),
            Err(Error::ProtocolAck(Ack::Fault))
        ));
    }

    #[test]
    fn targetsel_ack_is_ignored() {
        let mut mock = swd_mock();
        mock.swd.as_mut().unwrap().acks.push_back(Ack::Invalid(0b111));
        let mut signals = SignalRegistry::new();
        let mut queue = SwdQueue::default();

        queue.write(&mut mock, &mut signals, Port::DebugPort, DP_TARGETSEL, 0x0100_2927, 0);
        let idr = queue.read(&mut mock, &mut signals, Port::DebugPort, 0x0, 0);
        queue.run(&mut mock, &mut signals).unwrap();
        assert_eq!(idr.get(), Some(0));
    }

    #[test]
    fn parity_mismatch_fails() {
        let mut mock = swd_mock();
        let target = mock.swd.as_mut().unwrap();
        target.registers.insert((false, 0x0), 0x2ba0_1477);
        target.corrupt_parity = true;
        let mut signals = SignalRegistry::new();
        let mut queue = SwdQueue::default();

        let slot = queue.read(&mut mock, &mut signals, Port::DebugPort, 0x0, 0);
        let err = queue.run(&mut mock, &mut signals).unwrap_err();
        assert!(matches!(err, Error::DataIntegrity));
        assert!(err.is_fatal());
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn full_queue_runs_before_growing() {
        let mut mock = swd_mock();
        mock.swd.as_mut().unwrap().registers.insert((false, 0x4), 0xf000_0040);
        let mut signals = SignalRegistry::new();
        let mut queue = SwdQueue::with_capacity(10);

        let slots: Vec<ReadSlot> = (0..10)
            .map(|_| queue.read(&mut mock, &mut signals, Port::DebugPort, 0x4, 0))
            .collect();
        assert_eq!(mock.flushes(), 0);

        let eleventh = queue.read(&mut mock, &mut signals, Port::DebugPort, 0x4, 0);
        assert_eq!(mock.flushes(), 1);
        assert_eq!(queue.capacity(), 20);
        assert_eq!(queue.len(), 1);
        assert!(slots.iter().all(|s| s.get() == Some(0xf000_0040)));
        assert_eq!(eleventh.get(), None);

        queue.run(&mut mock, &mut signals).unwrap();
        assert_eq!(eleventh.get(), Some(0xf000_0040));
    }

    #[test]
    fn error_from_automatic_run_is_sticky() {
        let mut mock = swd_mock();
        // The third transaction of the first batch is answered with FAULT.
        mock.swd.as_mut().unwrap().acks.extend([Ack::Ok, Ack::Ok, Ack::Fault]);
        let mut signals = SignalRegistry::new();
        let mut queue = SwdQueue::with_capacity(3);

        for _ in 0..3 {
            queue.write(&mut mock, &mut signals, Port::DebugPort, 0x8, 0, 0);
        }
        let ops_before = mock.ops.len();
        let dropped = queue.read(&mut mock, &mut signals, Port::DebugPort, 0x0, 0);
        assert_eq!(mock.flushes(), 1);
        let after_run = mock.ops.len();
        assert!(after_run > ops_before);

        // Queued while the error is pending: dropped without touching the wire.
        queue.write(&mut mock, &mut signals, Port::DebugPort, 0x8, 0, 0);
        assert_eq!(mock.ops.len(), after_run);

        assert!(matches!(
            queue.run(&mut mock, &mut signals),
            Err(Error::ProtocolAck(Ack::Fault))
        ));
        assert_eq!(mock.flushes(), 2);
        assert_eq!(dropped.get(), None);

        // The error is reported once.
        queue.run(&mut mock, &mut signals).unwrap();
    }

    #[test]
    fn bits_of_dropped_transactions_are_discarded() {
        let mut mock = swd_mock();
        let target = mock.swd.as_mut().unwrap();
        target.registers.insert((false, 0x0), 0x1111_1111);
        target.registers.insert((false, 0x4), 0x2222_2222);
        // The request of the second read fails to go out.
        mock.clock_data_budget = Some(2);
        let mut signals = SignalRegistry::new();
        let mut queue = SwdQueue::default();

        let first = queue.read(&mut mock, &mut signals, Port::DebugPort, 0x0, 0);
        let second = queue.read(&mut mock, &mut signals, Port::DebugPort, 0x8, 0);
        assert!(matches!(
            queue.run(&mut mock, &mut signals),
            Err(Error::Transport(TransportError::Timeout))
        ));
        assert_eq!(first.get(), None);
        assert_eq!(second.get(), None);

        let third = queue.read(&mut mock, &mut signals, Port::DebugPort, 0x4, 0);
        queue.run(&mut mock, &mut signals).unwrap();
        assert_eq!(third.get(), Some(0x2222_2222));
    }

    #[test]
    fn queue_can_move_between_threads() {
        fn assert_send<T: Send>() {}
        assert_send::<SwdQueue>();
        assert_send::<ReadSlot>();
    }

    #[test]
    fn access_port_delay_follows_ap_transactions_only() {
        let mut mock = swd_mock();
        let mut signals = SignalRegistry::new();
        let mut queue = SwdQueue::default();

        queue.read(&mut mock, &mut signals, Port::AccessPort, 0xc, 16);
        queue.read(&mut mock, &mut signals, Port::DebugPort, 0xc, 16);

        let idle: Vec<usize> = mock
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Data { out: None, capture: false, bits, .. } => Some(*bits),
                _ => None,
            })
            .collect();
        assert_eq!(idle, vec![16]);
    }

    #[test]
    fn run_adds_idle_cycles_and_blinks() {
        let mut mock = swd_mock();
        let mut signals = SignalRegistry::new();
        signals.define(LED, LayoutSignal::new().data(0x0800)).unwrap();
        let mut queue = SwdQueue::default();

        queue.read(&mut mock, &mut signals, Port::DebugPort, 0x0, 0);
        mock.ops.clear();
        queue.run(&mut mock, &mut signals).unwrap();

        assert_eq!(
            mock.ops,
            vec![
                Op::Data { out: None, capture: false, bits: 8, mode: ClockMode::SWD },
                Op::Flush,
                Op::GpioHigh(0x08, 0x00),
            ]
        );
    }

    #[test]
    fn swdio_is_released_for_the_response() {
        let mut mock = swd_mock();
        let mut signals = SignalRegistry::new();
        signals.set_init_state(GpioState { output: 0x0000, direction: 0x000b });
        signals.define(SWDIO_OE, LayoutSignal::new()).unwrap();
        let mut queue = SwdQueue::default();

        queue.write(&mut mock, &mut signals, Port::DebugPort, 0x4, 0x5000_0000, 0);

        let kinds: Vec<&str> = mock
            .ops
            .iter()
            .map(|op| match op {
                Op::Data { capture: true, .. } => "in",
                Op::Data { .. } => "out",
                Op::GpioLow(_, 0x09) => "release",
                Op::GpioLow(_, 0x0b) => "drive",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["out", "release", "in", "drive", "out"]);
    }

    #[test]
    fn flushed_bits_without_queue_are_dropped() {
        let mut queue = SwdQueue::default();
        queue.absorb(bits![u8, Lsb0; 1, 0, 1]);
        assert_eq!(queue.outstanding_bits(), 0);
    }

    #[test]
    fn outstanding_bits_track_queued_captures() {
        let mut mock = swd_mock();
        let mut signals = SignalRegistry::new();
        let mut queue = SwdQueue::default();

        queue.read(&mut mock, &mut signals, Port::DebugPort, 0x0, 0);
        queue.write(&mut mock, &mut signals, Port::DebugPort, 0x4, 0, 0);
        assert_eq!(queue.outstanding_bits(), 38 + 5);

        let bits = mock.flush().unwrap();
        queue.absorb(&bits);
        assert_eq!(queue.outstanding_bits(), 0);
        queue.run(&mut mock, &mut signals).unwrap();
    }
}
