//! A model of the JTAG TAP controller.  `JtagState::step` follows the IEEE 1149.1 transition
//! table, and `tms_path` gives the TMS bits that move the TAP from one state to another by the
//! shortest route.  Nothing in here performs I/O; the command executor clocks the bits and uses
//! this module to keep its idea of the TAP state in step with the hardware.
use alloc::collections::VecDeque;

use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
}

use JtagState::*;

// Next state for TMS=0 and TMS=1.
const TRANSITIONS: [[JtagState; 2]; 16] = [
    [Idle, Reset],           // Reset
    [Idle, SelectDR],        // Idle
    [CaptureDR, SelectIR],   // SelectDR
    [ShiftDR, Exit1DR],      // CaptureDR
    [ShiftDR, Exit1DR],      // ShiftDR
    [PauseDR, UpdateDR],     // Exit1DR
    [PauseDR, Exit2DR],      // PauseDR
    [ShiftDR, UpdateDR],     // Exit2DR
    [Idle, SelectDR],        // UpdateDR
    [CaptureIR, Reset],      // SelectIR
    [ShiftIR, Exit1IR],      // CaptureIR
    [ShiftIR, Exit1IR],      // ShiftIR
    [PauseIR, UpdateIR],     // Exit1IR
    [PauseIR, Exit2IR],      // PauseIR
    [ShiftIR, UpdateIR],     // Exit2IR
    [Idle, SelectDR],        // UpdateIR
];

/// States the TAP can rest in while TMS is held, in the order used by `SHORT_PATHS`.
const STABLE: [JtagState; 6] = [Reset, Idle, ShiftDR, PauseDR, ShiftIR, PauseIR];

// (bits, length) indexed by [from][to] over `STABLE`.  Bits are clocked LSB first.
const SHORT_PATHS: [[(u8, u8); 6]; 6] = [
    [(0x1f, 5), (0x00, 1), (0x02, 4), (0x0a, 5), (0x06, 5), (0x16, 6)], // Reset
    [(0x1f, 5), (0x00, 1), (0x01, 3), (0x05, 4), (0x03, 4), (0x0b, 5)], // Idle
    [(0x1f, 5), (0x03, 3), (0x07, 5), (0x01, 2), (0x0f, 6), (0x2f, 7)], // ShiftDR
    [(0x1f, 5), (0x03, 3), (0x01, 2), (0x00, 1), (0x0f, 6), (0x2f, 7)], // PauseDR
    [(0x1f, 5), (0x03, 3), (0x07, 5), (0x17, 6), (0x0f, 6), (0x01, 2)], // ShiftIR
    [(0x1f, 5), (0x03, 3), (0x07, 5), (0x17, 6), (0x01, 2), (0x00, 1)], // PauseIR
];

impl JtagState {
    pub const ALL: [JtagState; 16] = [
        Reset, Idle, SelectDR, CaptureDR, ShiftDR, Exit1DR, PauseDR, Exit2DR, UpdateDR,
        SelectIR, CaptureIR, ShiftIR, Exit1IR, PauseIR, Exit2IR, UpdateIR,
    ];

    /// The state reached from `self` after one TCK with the given TMS level.
    pub fn step(self, tms: bool) -> JtagState {
        TRANSITIONS[self as usize][tms as usize]
    }

    /// Whether the TAP stays in this state while TMS is held at its resting level.
    pub fn is_stable(self) -> bool {
        STABLE.contains(&self)
    }

    /// The TMS level that keeps the TAP in this state (1 only for `Reset`).
    pub fn hold_level(self) -> bool {
        self == Reset
    }

    fn stable_index(self) -> Option<usize> {
        STABLE.iter().position(|s| *s == self)
    }
}

/// A sequence of at most 8 TMS bits, clocked LSB first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TmsPath {
    bits: u8,
    len: u8,
}

impl TmsPath {
    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The TMS levels in the order they are clocked.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.bits & (1 << i) != 0)
    }

    /// The state reached by clocking this path from `start`.
    pub fn apply(&self, start: JtagState) -> JtagState {
        self.iter().fold(start, JtagState::step)
    }
}

/// TMS bits that move the TAP from `start` to the stable state `goal`.
///
/// Paths between stable states come from a fixed table.  Moving from a state onto itself
/// stays put with one resting clock, except for `Reset`, which is always re-entered with five
/// TMS=1 clocks so a TAP in an unknown state is brought back too.
pub fn tms_path(start: JtagState, goal: JtagState) -> Result<TmsPath, Error> {
    let to = goal.stable_index().ok_or(Error::NotStable(goal))?;
    match start.stable_index() {
        Some(from) => {
            let (bits, len) = SHORT_PATHS[from][to];
            Ok(TmsPath { bits, len })
        }
        None => Ok(shortest_path(start, goal)),
    }
}

/// Breadth-first search over the transition graph.  Used for start states that are not in
/// the precomputed table, e.g. after a path move that ended in an exit state.
pub fn shortest_path(start: JtagState, goal: JtagState) -> TmsPath {
    let mut visited = [false; 16];
    let mut paths = VecDeque::new();
    paths.push_back((start, TmsPath { bits: 0, len: 0 }));
    visited[start as usize] = true;

    while let Some((state, path)) = paths.pop_front() {
        for tms in [false, true] {
            let next = state.step(tms);
            let path = TmsPath {
                bits: path.bits | ((tms as u8) << path.len),
                len: path.len + 1,
            };
            if next == goal {
                return path;
            }
            if !visited[next as usize] {
                visited[next as usize] = true;
                paths.push_back((next, path));
            }
        }
    }

    // Every state can reach every other one in at most 7 steps.
    unreachable!("TAP graph is strongly connected")
}
