//! Fixed bit sequences that switch a debug port between JTAG, SWD and the dormant state, and
//! the SWD line reset.  All sequences are clocked LSB first on the SWDIO/TMS line.
use core::fmt;
use core::str::FromStr;

use bitvec::prelude::*;

use crate::error::Error;

// Selection alert sequence that wakes a dormant debug port, 128 bits.
macro_rules! selection_alert {
    () => {
        [
            0x92, 0xf3, 0x09, 0x62, 0x95, 0x2d, 0x85, 0x86, 0xe9, 0xaf, 0xdd, 0xe3, 0xa2, 0x0e,
            0xbc, 0x19,
        ]
    };
}

const LINE_RESET: [u8; 8] = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00];

const JTAG_TO_SWD: [u8; 17] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x9e, 0xe7, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0x00,
];

const SWD_TO_JTAG: [u8; 10] = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x3c, 0xe7, 0xff];

const SWD_TO_DORMANT: [u8; 9] = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xbc, 0xe3];

const JTAG_TO_DORMANT: [u8; 5] = [0xff, 0xba, 0xbb, 0xbb, 0x33];

const DORMANT_TO_SWD: [u8; 28] = concat_alert(
    [0xff],
    [
        0xa0, 0xf1, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00,
    ],
);

const DORMANT_TO_JTAG: [u8; 20] = concat_alert([0xff], [0x00, 0xf0, 0xff]);

/// `head`, the selection alert sequence, then `tail`.
const fn concat_alert<const H: usize, const T: usize, const N: usize>(
    head: [u8; H],
    tail: [u8; T],
) -> [u8; N] {
    let alert: [u8; 16] = selection_alert!();
    let mut out = [0u8; N];
    let mut i = 0;
    while i < H {
        out[i] = head[i];
        i += 1;
    }
    let mut j = 0;
    while j < 16 {
        out[H + j] = alert[j];
        j += 1;
    }
    let mut k = 0;
    while k < T {
        out[H + 16 + k] = tail[k];
        k += 1;
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwdSequence {
    /// At least 50 cycles high followed by idle cycles.
    LineReset = 0,
    JtagToSwd = 1,
    JtagToDormant = 2,
    SwdToJtag = 3,
    SwdToDormant = 4,
    DormantToSwd = 5,
    DormantToJtag = 6,
}

impl SwdSequence {
    pub const ALL: [SwdSequence; 7] = [
        SwdSequence::LineReset,
        SwdSequence::JtagToSwd,
        SwdSequence::JtagToDormant,
        SwdSequence::SwdToJtag,
        SwdSequence::SwdToDormant,
        SwdSequence::DormantToSwd,
        SwdSequence::DormantToJtag,
    ];

    /// The bits to clock, in order.
    pub fn bits(self) -> &'static BitSlice<u8> {
        let (bytes, len): (&'static [u8], usize) = match self {
            SwdSequence::LineReset => (&LINE_RESET, 64),
            SwdSequence::JtagToSwd => (&JTAG_TO_SWD, 136),
            SwdSequence::JtagToDormant => (&JTAG_TO_DORMANT, 40),
            SwdSequence::SwdToJtag => (&SWD_TO_JTAG, 80),
            SwdSequence::SwdToDormant => (&SWD_TO_DORMANT, 72),
            SwdSequence::DormantToSwd => (&DORMANT_TO_SWD, 224),
            SwdSequence::DormantToJtag => (&DORMANT_TO_JTAG, 160),
        };
        &bytes.view_bits::<Lsb0>()[..len]
    }

    pub fn name(self) -> &'static str {
        match self {
            SwdSequence::LineReset => "line-reset",
            SwdSequence::JtagToSwd => "jtag-to-swd",
            SwdSequence::JtagToDormant => "jtag-to-dormant",
            SwdSequence::SwdToJtag => "swd-to-jtag",
            SwdSequence::SwdToDormant => "swd-to-dormant",
            SwdSequence::DormantToSwd => "dormant-to-swd",
            SwdSequence::DormantToJtag => "dormant-to-jtag",
        }
    }
}

impl fmt::Display for SwdSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SwdSequence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SwdSequence::ALL
            .into_iter()
            .find(|seq| seq.name() == s)
            .ok_or_else(|| Error::Config(alloc::format!("unknown SWD sequence '{s}'")))
    }
}

impl TryFrom<u8> for SwdSequence {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        SwdSequence::ALL
            .get(id as usize)
            .copied()
            .ok_or_else(|| Error::Config(alloc::format!("invalid SWD sequence id {id}")))
    }
}
