//! This crate drives JTAG and SWD debug interfaces through a dumb, bit-clocking adapter such as
//! an FTDI MPSSE cable.  Nothing here knows about targets or architectures; it only produces
//! the exact wire sequences and keeps track of what it has put on the wire.
//!
//! At the lowest level is the `Transport` trait in [`cable`].  A transport can clock data bits
//! out and in, clock TMS sequences, and drive the adapter's GPIO pins.  Transports batch
//! everything until `flush`, which is where the USB round trip happens.
//!
//! On top of that, [`statemachine`] is a pure model of the TAP controller, and
//! [`commands::JtagExecutor`] turns a list of JTAG commands (scans, state moves, run-test
//! cycles...) into as few clock bursts as possible while keeping the tracked TAP state in step
//! with every TMS bit it sends.
//!
//! For SWD, [`swd::SwdQueue`] queues register reads and writes and only checks the target's
//! acknowledgements and parity once the batch has been flushed.  [`sequences`] holds the fixed
//! JTAG/SWD/dormant switching sequences.
//!
//! Adapter-specific pins (resets, output enables, LEDs) are described by name in a
//! [`signal::SignalRegistry`].
//!
//! [`session::Session`] ties all of these together around a single transport.
//!
//! # Example
//! ```no_run
//! # #[cfg(feature = "libftd2xx")]
//! # fn main() -> Result<(), mpsse_debug::Error> {
//! use bitvec::prelude::*;
//! use mpsse_debug::cable::mpsse::Mpsse;
//! use mpsse_debug::commands::{JtagCommand, ScanField};
//! use mpsse_debug::config::AdapterConfig;
//! use mpsse_debug::session::Session;
//! use mpsse_debug::signal::{GpioState, LayoutSignal, SignalRegistry};
//! use mpsse_debug::statemachine::JtagState;
//!
//! let cable = Mpsse::open("Dual RS232-HS A")?;
//! let config = AdapterConfig::default()
//!     .with_layout_init(GpioState { output: 0x0c08, direction: 0x0f1b });
//! let mut signals = SignalRegistry::new();
//! signals.define("nTRST", LayoutSignal::new().data(0x0100).noe(0x0400))?;
//! signals.define("nSRST", LayoutSignal::new().data(0x0200).noe(0x0800))?;
//!
//! let mut session = Session::open(Box::new(cable), config, signals)?;
//! let mut commands = vec![
//!     JtagCommand::StateMove { end_state: JtagState::Reset },
//!     JtagCommand::Scan {
//!         ir_scan: false,
//!         fields: vec![ScanField::capture(32)],
//!         end_state: JtagState::Idle,
//!     },
//! ];
//! session.execute(&mut commands)?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "libftd2xx"))]
//! # fn main() {}
//! ```

#![no_std]

#[cfg(any(feature = "std", test))]
extern crate std;

extern crate alloc;

pub mod cable;
pub mod commands;
pub mod config;
pub mod error;
pub mod sequences;
pub mod session;
pub mod signal;
pub mod statemachine;
pub mod swd;

pub use error::{Error, TransportError};
