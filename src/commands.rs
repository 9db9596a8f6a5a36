//! JTAG command execution.
//!
//! [`JtagExecutor`] turns a batch of [`JtagCommand`]s into TMS bursts and data clocks on a
//! [`Transport`], keeping track of the TAP state after every clocked TMS bit.  TDO is only
//! known once the transport has been flushed, so captured bits are stored into the scan
//! fields by [`JtagExecutor::complete`] after the batch has gone out.
use alloc::vec::Vec;
use bitvec::prelude::*;
use core::iter;

use tracing::{debug, error, trace};

use crate::cable::{ClockMode, Transport};
use crate::error::{Error, TransportError};
use crate::statemachine::{tms_path, JtagState};

/// One field of a scan.  `num_bits` bits of `out_value` are shifted in LSB first (zeros when
/// there is none); when `capture` is set, the bits shifted out end up in `in_value`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanField {
    pub num_bits: usize,
    pub out_value: Option<BitVec<u8>>,
    pub capture: bool,
    pub in_value: Option<BitVec<u8>>,
}

impl ScanField {
    /// Shift `bits` in and ignore what comes out.
    pub fn out(bits: BitVec<u8>) -> Self {
        Self {
            num_bits: bits.len(),
            out_value: Some(bits),
            capture: false,
            in_value: None,
        }
    }

    /// Shift `num_bits` zeros in and keep what comes out.
    pub fn capture(num_bits: usize) -> Self {
        Self {
            num_bits,
            out_value: None,
            capture: true,
            in_value: None,
        }
    }

    /// Shift `bits` in and keep what comes out.
    pub fn out_capture(bits: BitVec<u8>) -> Self {
        Self {
            num_bits: bits.len(),
            out_value: Some(bits),
            capture: true,
            in_value: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JtagCommand {
    /// Go to Idle, clock `cycles` times there, then go to `end_state`.
    RunTest { cycles: usize, end_state: JtagState },
    /// Go to `end_state` by the shortest path.  Moving to `Reset` always clocks the TMS=1
    /// sequence, even when the TAP is believed to be there already.
    StateMove { end_state: JtagState },
    /// Step through `path`, one TCK per state.  Each state must be reachable from the previous
    /// one with a single TMS bit.
    PathMove { path: Vec<JtagState> },
    /// Shift `fields` through IR or DR.  The last bit is clocked while leaving the shift state.
    Scan {
        ir_scan: bool,
        fields: Vec<ScanField>,
        end_state: JtagState,
    },
    /// Clock raw TMS bits, LSB first.
    Tms { bits: BitVec<u8> },
    /// Flush everything queued so far and wait.
    Sleep { us: u32 },
    /// Clock `cycles` times without leaving the current state.
    StableClocks { cycles: usize },
}

// Where a capturing field's bits sit among the bits captured for the batch.
#[derive(Clone, Copy, Debug)]
struct Capture {
    command: usize,
    field: usize,
    offset: usize,
    bits: usize,
}

#[derive(Debug)]
pub struct JtagExecutor {
    state: JtagState,
    mode: ClockMode,
    captures: Vec<Capture>,
    captured: BitVec<u8>,
    pending_bits: usize,
}

impl JtagExecutor {
    pub fn new(mode: ClockMode) -> Self {
        Self {
            state: JtagState::Reset,
            mode,
            captures: Vec::new(),
            captured: BitVec::new(),
            pending_bits: 0,
        }
    }

    /// The TAP state after everything queued so far.
    pub fn state(&self) -> JtagState {
        self.state
    }

    /// Override the tracked state, e.g. after TRST was pulsed.
    pub fn set_state(&mut self, state: JtagState) {
        self.state = state;
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ClockMode) {
        self.mode = mode;
    }

    /// Queue, flush and complete `commands`.
    pub fn execute<U>(&mut self, transport: &mut U, commands: &mut [JtagCommand]) -> Result<(), Error>
    where
        U: Transport + ?Sized,
    {
        self.queue(transport, commands)?;
        let bits = transport.flush()?;
        self.complete(commands, &bits)
    }

    /// Put `commands` on the wire.  Nothing is clocked if any command names an end state the
    /// TAP can't rest in, or contains an impossible path move.  Call `complete` with the bits
    /// of the next flush afterwards.
    pub fn queue<U>(&mut self, transport: &mut U, commands: &[JtagCommand]) -> Result<(), Error>
    where
        U: Transport + ?Sized,
    {
        self.captures.clear();
        self.captured.clear();
        self.pending_bits = 0;

        self.validate(commands)?;

        if let Err(e) = self.issue(transport, commands) {
            // Bits the partial batch captured must not show up in the next one.
            if let Err(flush) = transport.flush() {
                error!("flushing after a failed JTAG batch failed: {}", flush);
            }
            self.captures.clear();
            self.captured.clear();
            self.pending_bits = 0;
            return Err(e);
        }
        Ok(())
    }

    fn issue<U>(&mut self, transport: &mut U, commands: &[JtagCommand]) -> Result<(), Error>
    where
        U: Transport + ?Sized,
    {
        for (index, command) in commands.iter().enumerate() {
            match command {
                JtagCommand::RunTest { cycles, end_state } => {
                    trace!("runtest {} cycles, end in {:?}", cycles, end_state);
                    if self.state != JtagState::Idle {
                        self.move_to(transport, JtagState::Idle)?;
                    }
                    self.clock_tms_bits(transport, iter::repeat(false).take(*cycles), false)?;
                    if self.state != *end_state {
                        self.move_to(transport, *end_state)?;
                    }
                }
                JtagCommand::StateMove { end_state } => {
                    trace!("statemove end in {:?}", end_state);
                    if self.state != *end_state || *end_state == JtagState::Reset {
                        self.move_to(transport, *end_state)?;
                    }
                }
                JtagCommand::PathMove { path } => {
                    trace!("pathmove: {} states, end in {:?}", path.len(), path.last());
                    let mut state = self.state;
                    let bits: BitVec<u8> = path
                        .iter()
                        .map(|next| {
                            let tms = state.step(true) == *next;
                            state = *next;
                            tms
                        })
                        .collect();
                    self.clock_tms_bits(transport, bits.iter().by_vals(), false)?;
                }
                JtagCommand::Scan {
                    ir_scan,
                    fields,
                    end_state,
                } => {
                    self.scan(transport, index, *ir_scan, fields, *end_state)?;
                }
                JtagCommand::Tms { bits } => {
                    trace!("TMS: {} bits", bits.len());
                    self.clock_tms_bits(transport, bits.iter().by_vals(), false)?;
                }
                JtagCommand::Sleep { us } => {
                    trace!("sleep {} us", us);
                    let bits = transport.flush()?;
                    self.captured.extend_from_bitslice(&bits);
                    transport.delay_us(*us);
                }
                JtagCommand::StableClocks { cycles } => {
                    trace!("stableclocks {} cycles", cycles);
                    let level = self.state.hold_level();
                    self.clock_tms_bits(transport, iter::repeat(level).take(*cycles), false)?;
                }
            }
        }

        Ok(())
    }

    /// Store the captured bits of the batch queued last into its scan fields.  `bits` are the
    /// bits returned by the flush that followed `queue`.
    pub fn complete(&mut self, commands: &mut [JtagCommand], bits: &BitSlice<u8>) -> Result<(), Error> {
        self.captured.extend_from_bitslice(bits);
        if self.captured.len() < self.pending_bits {
            error!(
                "adapter returned {} captured bits, expected {}",
                self.captured.len(),
                self.pending_bits
            );
            return Err(TransportError::ShortRead {
                expected: self.pending_bits,
                actual: self.captured.len(),
            }
            .into());
        }

        for capture in self.captures.drain(..) {
            if let Some(JtagCommand::Scan { fields, .. }) = commands.get_mut(capture.command) {
                if let Some(field) = fields.get_mut(capture.field) {
                    field.in_value =
                        Some(self.captured[capture.offset..][..capture.bits].to_bitvec());
                }
            }
        }
        self.captured.clear();
        self.pending_bits = 0;
        Ok(())
    }

    fn validate(&self, commands: &[JtagCommand]) -> Result<(), Error> {
        let stable = |state: JtagState| {
            if state.is_stable() {
                Ok(state)
            } else {
                error!("{:?} is not a valid end state", state);
                Err(Error::NotStable(state))
            }
        };

        let mut state = self.state;
        for command in commands {
            state = match command {
                JtagCommand::RunTest { end_state, .. } | JtagCommand::StateMove { end_state } => {
                    stable(*end_state)?
                }
                JtagCommand::PathMove { path } => {
                    for next in path {
                        if state.step(false) != *next && state.step(true) != *next {
                            error!("{:?} -> {:?} isn't a valid TAP state transition", state, next);
                            return Err(Error::InvalidTransition {
                                from: state,
                                to: *next,
                            });
                        }
                        state = *next;
                    }
                    state
                }
                JtagCommand::Scan {
                    fields, end_state, ..
                } => {
                    let end_state = stable(*end_state)?;
                    for field in fields {
                        if let Some(out) = &field.out_value {
                            if out.len() < field.num_bits {
                                return Err(Error::Config(alloc::format!(
                                    "scan field has {} bits to shift but only {} out bits",
                                    field.num_bits,
                                    out.len()
                                )));
                            }
                        }
                    }
                    if fields.iter().all(|f| f.num_bits == 0) {
                        state
                    } else {
                        end_state
                    }
                }
                JtagCommand::Tms { bits } => bits.iter().by_vals().fold(state, JtagState::step),
                JtagCommand::Sleep { .. } => state,
                JtagCommand::StableClocks { .. } => stable(state)?,
            };
        }
        Ok(())
    }

    fn scan<U>(
        &mut self,
        transport: &mut U,
        index: usize,
        ir_scan: bool,
        fields: &[ScanField],
        end_state: JtagState,
    ) -> Result<(), Error>
    where
        U: Transport + ?Sized,
    {
        let Some(last) = fields.iter().rposition(|f| f.num_bits > 0) else {
            debug!("empty scan, nothing to do");
            return Ok(());
        };
        trace!(
            "{} scan, {} bits, end in {:?}",
            if ir_scan { "IR" } else { "DR" },
            fields.iter().map(|f| f.num_bits).sum::<usize>(),
            end_state
        );

        let shift = if ir_scan {
            JtagState::ShiftIR
        } else {
            JtagState::ShiftDR
        };
        if self.state != shift {
            self.move_to(transport, shift)?;
        }

        for (i, field) in fields.iter().enumerate().take(last + 1) {
            let out = field.out_value.as_deref();
            if field.capture {
                self.captures.push(Capture {
                    command: index,
                    field: i,
                    offset: self.pending_bits,
                    bits: field.num_bits,
                });
                self.pending_bits += field.num_bits;
            }

            // A scan ending in the shift state itself stays there for the last bit.
            if i < last || self.state == end_state {
                if field.num_bits > 0 {
                    transport.clock_data(out, field.capture, field.num_bits, self.mode)?;
                }
                continue;
            }

            // The last bit goes out with TMS=1, leaving Shift for Exit1.
            let n = field.num_bits - 1;
            if n > 0 {
                transport.clock_data(out.map(|o| &o[..n]), field.capture, n, self.mode)?;
            }
            let last_bit = out.map(|o| o[n]).unwrap_or(false);
            transport.clock_tms(&[1u8].view_bits::<Lsb0>()[..1], last_bit, field.capture, self.mode)?;
            self.state = self.state.step(true);

            if end_state == JtagState::Idle {
                // Exit1 -> Update -> Idle
                self.clock_tms_bits(transport, [true, false], last_bit)?;
            } else {
                // Exit1 -> Pause
                self.clock_tms_bits(transport, [false], last_bit)?;
            }
        }

        if self.state != end_state {
            self.move_to(transport, end_state)?;
        }
        Ok(())
    }

    fn move_to<U>(&mut self, transport: &mut U, goal: JtagState) -> Result<(), Error>
    where
        U: Transport + ?Sized,
    {
        let path = tms_path(self.state, goal)?;
        trace!("move {:?} -> {:?}: {} TMS bits", self.state, goal, path.len());
        self.clock_tms_bits(transport, path.iter(), false)
    }

    /// Clock `tms` in bursts no longer than the transport allows, holding TDI at `tdi`.  The
    /// tracked state follows each burst.
    fn clock_tms_bits<U, I>(&mut self, transport: &mut U, tms: I, tdi: bool) -> Result<(), Error>
    where
        U: Transport + ?Sized,
        I: IntoIterator<Item = bool>,
    {
        let limit = transport.tms_burst_limit().max(1);
        let mut burst: BitVec<u8> = BitVec::with_capacity(limit);
        let mut next = self.state;

        for bit in tms {
            burst.push(bit);
            next = next.step(bit);
            if burst.len() == limit {
                transport.clock_tms(&burst, tdi, false, self.mode)?;
                self.state = next;
                burst.clear();
            }
        }
        if !burst.is_empty() {
            transport.clock_tms(&burst, tdi, false, self.mode)?;
            self.state = next;
        }
        Ok(())
    }
}
