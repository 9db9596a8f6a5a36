//! Implement the `Transport` trait for FTDI chips in MPSSE mode (FT2232H, FT4232H, FT232H and
//! the many adapters built on them).
//!
//! Commands are collected in a buffer and only sent when it is full, when a GPIO read needs an
//! answer, or on `flush`.  For every command that makes the chip send data back, a `Reply` is
//! recorded so the answer can be split back into captured bits.
use std::time::Duration;
use std::vec;
use std::vec::Vec;

use bitvec::prelude::*;
use ftdi_mpsse::{MpsseCmdBuilder, MpsseCmdExecutor};
use tracing::{debug, trace};

use crate::cable::{ClockMode, Edge, Transport};
use crate::error::TransportError;

#[cfg(feature = "libftd2xx")]
use libftd2xx::{Ft2232h, Ftdi, FtdiCommon, FtdiMpsse};

// Size of the chip's command and reply buffers.
const BUFFER_SIZE: usize = 4096;
// Largest data chunk per command, leaving room for the opcode and length.
const MAX_CHUNK_BYTES: usize = BUFFER_SIZE - 3;
// TCK is 60 MHz / ((1 + divisor) * 2) with the divide-by-5 prescaler off.
const BASE_CLOCK_HZ: u32 = 30_000_000;
const MAX_TMS_BITS: usize = 7;

/// What the chip sends back for one queued command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reply {
    /// Whole bytes of captured data.
    Bytes(usize),
    /// Up to 8 captured bits, in the top of a single byte.
    Bits(usize),
    /// The value of eight GPIO pins.
    Pin,
}

impl Reply {
    fn len(&self) -> usize {
        match self {
            Reply::Bytes(n) => *n,
            Reply::Bits(_) | Reply::Pin => 1,
        }
    }
}

#[derive(Debug, Default)]
struct CommandQueue {
    buffer: Vec<u8>,
    replies: Vec<Reply>,
    reply_bytes: usize,
}

impl CommandQueue {
    fn fits(&self, command: usize, reply: usize) -> bool {
        self.buffer.len() + command <= BUFFER_SIZE && self.reply_bytes + reply <= BUFFER_SIZE
    }

    fn push(&mut self, command: &[u8], reply: Option<Reply>) {
        self.buffer.extend_from_slice(command);
        if let Some(reply) = reply {
            self.reply_bytes += reply.len();
            self.replies.push(reply);
        }
    }

    fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

fn data_opcode(write: bool, read: bool, bits: bool, mode: ClockMode) -> u8 {
    // LSB first
    let mut op = 0x08;
    if write {
        op |= 0x10;
        if mode.drive == Edge::Falling {
            op |= 0x01;
        }
    }
    if read {
        op |= 0x20;
        if mode.sample == Edge::Falling {
            op |= 0x04;
        }
    }
    if bits {
        op |= 0x02;
    }
    op
}

fn tms_opcode(read: bool, mode: ClockMode) -> u8 {
    let mut op = 0x4a;
    if mode.drive == Edge::Falling {
        op |= 0x01;
    }
    if read {
        op |= 0x20;
        if mode.sample == Edge::Falling {
            op |= 0x04;
        }
    }
    op
}

/// Split a data clock into byte and bit commands.  Without `out`, zeros are clocked unless the
/// bits are only read.
fn data_commands(
    out: Option<&BitSlice<u8>>,
    capture: bool,
    bits: usize,
    mode: ClockMode,
) -> Vec<(Vec<u8>, Option<Reply>)> {
    let write = out.is_some() || !capture;
    let mut commands = Vec::new();
    let bytes = bits / 8;

    let mut start = 0;
    while start < bytes {
        let len = (bytes - start).min(MAX_CHUNK_BYTES);
        let mut cmd = vec![
            data_opcode(write, capture, false, mode),
            ((len - 1) & 0xff) as u8,
            ((len - 1) >> 8) as u8,
        ];
        if write {
            cmd.extend((start..start + len).map(|i| match out {
                Some(out) => out[i * 8..i * 8 + 8].load_le::<u8>(),
                None => 0,
            }));
        }
        commands.push((cmd, capture.then_some(Reply::Bytes(len))));
        start += len;
    }

    let rest = bits % 8;
    if rest > 0 {
        let mut cmd = vec![data_opcode(write, capture, true, mode), (rest - 1) as u8];
        if write {
            cmd.push(match out {
                Some(out) => out[bytes * 8..bits].load_le::<u8>(),
                None => 0,
            });
        }
        commands.push((cmd, capture.then_some(Reply::Bits(rest))));
    }

    commands
}

fn tms_command(tms: &BitSlice<u8>, tdi: bool, capture: bool, mode: ClockMode) -> [u8; 3] {
    let data = tms.load_le::<u8>() | (tdi as u8) << 7;
    [tms_opcode(capture, mode), (tms.len() - 1) as u8, data]
}

/// Split the chip's answer into captured bits, appended to `captured`.  Returns the last GPIO
/// value read, if any.
fn decode_replies(
    replies: &[Reply],
    rx: &[u8],
    captured: &mut BitVec<u8>,
) -> Result<Option<u8>, TransportError> {
    let mut pos = 0;
    let mut pin = None;

    for reply in replies {
        let len = reply.len();
        let Some(bytes) = rx.get(pos..pos + len) else {
            return Err(TransportError::ShortRead {
                expected: replies.iter().map(Reply::len).sum::<usize>() * 8,
                actual: rx.len() * 8,
            });
        };
        match reply {
            Reply::Bytes(_) => captured.extend_from_bitslice(bytes.view_bits::<Lsb0>()),
            Reply::Bits(n) => {
                // Bits are shifted in from the top of the byte.
                let byte = bytes[0] >> (8 - n);
                captured.extend_from_bitslice(&byte.view_bits::<Lsb0>()[..*n]);
            }
            Reply::Pin => pin = Some(bytes[0]),
        }
        pos += len;
    }

    Ok(pin)
}

/// The divisor for a TCK of at most `hz`, and the frequency it gives.
fn clock_divisor(hz: u32) -> (u32, u32) {
    let divisor = BASE_CLOCK_HZ.div_ceil(hz.max(1)).saturating_sub(1).min(0xffff);
    (divisor, BASE_CLOCK_HZ / (divisor + 1))
}

fn io_error<E: core::fmt::Debug>(e: E) -> TransportError {
    TransportError::Io(std::format!("{e:?}"))
}

pub struct Mpsse<T> {
    ft: T,
    queue: CommandQueue,
    // Bits read back but not yet returned by `flush`
    captured: BitVec<u8>,
}

impl<T: MpsseCmdExecutor> Mpsse<T>
where
    <T as MpsseCmdExecutor>::Error: core::fmt::Debug,
{
    /// Wrap a chip that is already in MPSSE mode.
    pub fn new(mut ft: T) -> Result<Self, TransportError> {
        let builder = MpsseCmdBuilder::new()
            .disable_3phase_data_clocking()
            .disable_adaptive_data_clocking();
        ft.send(builder.as_slice()).map_err(io_error)?;

        Ok(Self {
            ft,
            queue: CommandQueue::default(),
            captured: BitVec::new(),
        })
    }

    fn enqueue(&mut self, command: &[u8], reply: Option<Reply>) -> Result<(), TransportError> {
        let reply_len = reply.map(|r| r.len()).unwrap_or(0);
        if !self.queue.fits(command.len(), reply_len) {
            self.execute()?;
        }
        self.queue.push(command, reply);
        Ok(())
    }

    /// Send everything queued and decode the answer.  Returns the last GPIO value read.
    fn execute(&mut self) -> Result<Option<u8>, TransportError> {
        if self.queue.is_empty() {
            return Ok(None);
        }
        let CommandQueue {
            mut buffer,
            replies,
            reply_bytes,
        } = core::mem::take(&mut self.queue);

        trace!("sending {} bytes, expecting {}", buffer.len(), reply_bytes);
        if reply_bytes == 0 {
            self.ft.send(&buffer).map_err(io_error)?;
            return Ok(None);
        }

        buffer.extend_from_slice(MpsseCmdBuilder::new().send_immediate().as_slice());
        let mut rx = vec![0; reply_bytes];
        self.ft.xfer(&buffer, &mut rx).map_err(io_error)?;
        decode_replies(&replies, &rx, &mut self.captured)
    }

    fn read_pins(&mut self, command: &[u8]) -> Result<u8, TransportError> {
        self.enqueue(command, Some(Reply::Pin))?;
        self.execute()?.ok_or(TransportError::ShortRead {
            expected: 8,
            actual: 0,
        })
    }
}

#[cfg(feature = "libftd2xx")]
impl Mpsse<Ft2232h> {
    /// Open an FT2232H by USB description.  FT2232-based adapters have both an "A" and a "B"
    /// interface, e.g. "Dual RS232-HS A".
    pub fn open(description: &str) -> Result<Self, TransportError> {
        let ft = Ftdi::with_description(description).map_err(io_error)?;
        let mut ft = Ft2232h::try_from(ft).map_err(io_error)?;
        ft.initialize_mpsse_default().map_err(io_error)?;
        ft.set_latency_timer(Duration::from_millis(0)).map_err(io_error)?;
        debug!("opened MPSSE adapter '{}'", description);
        Mpsse::new(ft)
    }
}

impl<T: MpsseCmdExecutor> Transport for Mpsse<T>
where
    <T as MpsseCmdExecutor>::Error: core::fmt::Debug,
{
    fn clock_data(
        &mut self,
        out: Option<&BitSlice<u8>>,
        capture: bool,
        bits: usize,
        mode: ClockMode,
    ) -> Result<(), TransportError> {
        for (command, reply) in data_commands(out, capture, bits, mode) {
            self.enqueue(&command, reply)?;
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
        if tms.is_empty() {
            return Ok(());
        }
        if tms.len() > MAX_TMS_BITS {
            return Err(TransportError::Unsupported("TMS sequences longer than 7 bits"));
        }
        let reply = capture.then_some(Reply::Bits(tms.len()));
        self.enqueue(&tms_command(tms, tdi, capture, mode), reply)
    }

    fn set_gpio_low(&mut self, value: u8, direction: u8) -> Result<(), TransportError> {
        let builder = MpsseCmdBuilder::new().set_gpio_lower(value, direction);
        self.enqueue(builder.as_slice(), None)
    }

    fn set_gpio_high(&mut self, value: u8, direction: u8) -> Result<(), TransportError> {
        let builder = MpsseCmdBuilder::new().set_gpio_upper(value, direction);
        self.enqueue(builder.as_slice(), None)
    }

    fn read_gpio_low(&mut self) -> Result<u8, TransportError> {
        self.read_pins(MpsseCmdBuilder::new().gpio_lower().as_slice())
    }

    fn read_gpio_high(&mut self) -> Result<u8, TransportError> {
        self.read_pins(MpsseCmdBuilder::new().gpio_upper().as_slice())
    }

    fn set_frequency(&mut self, hz: u32) -> Result<u32, TransportError> {
        let (divisor, actual) = clock_divisor(hz);
        debug!("TCK divisor {} for {} Hz, running at {} Hz", divisor, hz, actual);
        let builder = MpsseCmdBuilder::new().set_clock(divisor, Some(false));
        self.enqueue(builder.as_slice(), None)?;
        Ok(actual)
    }

    fn set_loopback(&mut self, enable: bool) -> Result<(), TransportError> {
        let builder = if enable {
            MpsseCmdBuilder::new().enable_loopback()
        } else {
            MpsseCmdBuilder::new().disable_loopback()
        };
        self.enqueue(builder.as_slice(), None)
    }

    fn flush(&mut self) -> Result<BitVec<u8>, TransportError> {
        let result = self.execute();
        let captured = core::mem::take(&mut self.captured);
        result?;
        Ok(captured)
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }

    fn tms_burst_limit(&self) -> usize {
        MAX_TMS_BITS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(true, false, false, ClockMode::JTAG, 0x19)]
    #[test_case(true, true, false, ClockMode::JTAG, 0x39)]
    #[test_case(false, true, false, ClockMode::JTAG, 0x28)]
    #[test_case(true, false, true, ClockMode::JTAG, 0x1b)]
    #[test_case(true, true, true, ClockMode::JTAG, 0x3b)]
    #[test_case(false, true, true, ClockMode::JTAG, 0x2a)]
    #[test_case(true, true, false, ClockMode::JTAG_ALT, 0x3d)]
    fn data_opcodes(write: bool, read: bool, bits: bool, mode: ClockMode, op: u8) {
        assert_eq!(data_opcode(write, read, bits, mode), op);
    }

    #[test]
    fn tms_opcodes() {
        assert_eq!(tms_opcode(false, ClockMode::JTAG), 0x4b);
        assert_eq!(tms_opcode(true, ClockMode::JTAG), 0x6b);
        assert_eq!(tms_opcode(true, ClockMode::JTAG_ALT), 0x6f);
    }

    #[test]
    fn write_is_split_into_bytes_and_bits() {
        let out = bitvec![u8, Lsb0; 1, 0, 1, 0, 0, 1, 0, 1, 1, 1, 0, 1];
        let commands = data_commands(Some(&out), false, 12, ClockMode::JTAG);
        assert_eq!(
            commands,
            vec![
                (vec![0x19, 0x00, 0x00, 0xa5], None),
                (vec![0x1b, 0x03, 0x0b], None),
            ]
        );
    }

    #[test]
    fn read_only_sends_no_data() {
        let commands = data_commands(None, true, 20, ClockMode::JTAG);
        assert_eq!(
            commands,
            vec![
                (vec![0x28, 0x01, 0x00], Some(Reply::Bytes(2))),
                (vec![0x2a, 0x03], Some(Reply::Bits(4))),
            ]
        );
    }

    #[test]
    fn idle_clocks_write_zeros() {
        let commands = data_commands(None, false, 8, ClockMode::SWD);
        assert_eq!(commands, vec![(vec![0x19, 0x00, 0x00, 0x00], None)]);
    }

    #[test]
    fn long_writes_are_chunked() {
        let out = bitvec![u8, Lsb0; 1; 8 * (MAX_CHUNK_BYTES + 2)];
        let commands = data_commands(Some(&out), false, out.len(), ClockMode::JTAG);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].0.len(), 3 + MAX_CHUNK_BYTES);
        assert_eq!(&commands[1].0[..4], &[0x19, 0x01, 0x00, 0xff]);
    }

    #[test]
    fn tms_command_carries_tdi_in_bit_7() {
        let tms = bits![u8, Lsb0; 1, 1, 0];
        assert_eq!(tms_command(tms, true, true, ClockMode::JTAG), [0x6b, 0x02, 0x83]);
        assert_eq!(tms_command(tms, false, false, ClockMode::JTAG), [0x4b, 0x02, 0x03]);
    }

    #[test]
    fn replies_are_decoded_in_order() {
        let mut captured = BitVec::new();
        let pin = decode_replies(
            &[Reply::Bytes(1), Reply::Bits(3), Reply::Pin],
            &[0xa5, 0b1010_0000, 0x42],
            &mut captured,
        )
        .unwrap();
        assert_eq!(pin, Some(0x42));
        assert_eq!(
            captured,
            bitvec![u8, Lsb0; 1, 0, 1, 0, 0, 1, 0, 1, 1, 0, 1]
        );
    }

    #[test]
    fn short_reply_is_an_error() {
        let mut captured = BitVec::new();
        let err = decode_replies(&[Reply::Bytes(2), Reply::Bits(1)], &[0x00, 0x00], &mut captured)
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::ShortRead { expected: 24, actual: 16 }
        ));
    }

    #[test_case(1_000_000, 29, 1_000_000)]
    #[test_case(30_000_000, 0, 30_000_000)]
    #[test_case(60_000_000, 0, 30_000_000)]
    #[test_case(7_000_000, 4, 6_000_000)]
    #[test_case(100, 0xffff, 457)]
    fn divisors_never_exceed_the_request(hz: u32, divisor: u32, actual: u32) {
        assert_eq!(clock_divisor(hz), (divisor, actual));
    }

    #[test]
    fn queue_limits() {
        let mut queue = CommandQueue::default();
        queue.push(&[0u8; BUFFER_SIZE - 4], Some(Reply::Bytes(BUFFER_SIZE - 1)));
        assert!(queue.fits(4, 1));
        assert!(!queue.fits(5, 0));
        assert!(!queue.fits(1, 2));
    }
}
