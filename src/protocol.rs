//! Mux board command vocabulary and addressing sequences.
//!
//! The mux controller firmware speaks single ASCII command bytes over serial
//! with no framing, no checksum, and no reply (the "NO_ACK" firmware). A full
//! addressing sequence is always:
//!
//! ```text
//! Z (clear) -> secondary path -> dimension -> hex index -> ... -> trigger
//! ```
//!
//! Commands are restricted to one character each and must avoid the letters
//! `A`-`F`, which are reserved for the hex index payload. Index bytes are a
//! single lowercase hex digit, which caps the addressable space at 16 lines
//! per dimension.

use crate::error::{AppResult, TesterError};

/// Global clear: all mux switches to high-Z, all enables off.
pub const CLEAR: u8 = b'Z';

/// Number of addressable lines per dimension (rows, columns, reset lines).
pub const ARRAY_DIM: usize = 16;

/// Secondary mux path selector: which two nodes are connected to the
/// measurement bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecondaryPath {
    RowCol,
    RowPzbias,
    ColPzbias,
    RowShield,
    ColShield,
    RstPzbias,
    RstShield,
    RstCol,
    VddCol,
    VddShield,
    VddPzbias,
    VrstCol,
    VrstShield,
    VrstPzbias,
    ShieldPzbias,
    LoopbackOne,
    LoopbackTwo,
}

impl SecondaryPath {
    /// Wire byte understood by the secondary mux board.
    pub fn byte(self) -> u8 {
        match self {
            Self::RowCol => b'U',
            Self::RowPzbias => b'V',
            Self::ColPzbias => b'W',
            Self::RowShield => b'X',
            Self::ColShield => b'Y',
            Self::RstPzbias => b'M',
            Self::RstShield => b'N',
            Self::RstCol => b'Q',
            Self::VddCol => b'!',
            Self::VddShield => b'@',
            Self::VddPzbias => b'#',
            Self::VrstCol => b'$',
            Self::VrstShield => b'%',
            Self::VrstPzbias => b'^',
            Self::ShieldPzbias => b'(',
            Self::LoopbackOne => b'&',
            Self::LoopbackTwo => b'*',
        }
    }
}

/// Primary mux dimension selector: which bank of 16 lines the next index
/// byte addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Row,
    Column,
    Reset,
}

impl Dimension {
    pub fn byte(self) -> u8 {
        match self {
            Self::Row => b'R',
            Self::Column => b'L',
            Self::Reset => b'T',
        }
    }

    /// Display name used in CSV headers and grid labels.
    pub fn label(self) -> &'static str {
        match self {
            Self::Row => "Row",
            Self::Column => "Col",
            Self::Reset => "Rst",
        }
    }
}

/// Measurement trigger: the final byte of an addressing sequence, selecting
/// what the primary mux does with the addressed lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Continuity check mode.
    Continuity,
    /// Capacitance check mode; drives the addressed row TFTs on (+15V).
    CapTftOn,
    /// Binary counter disable mode; forces all TFTs off (-8V).
    TftOff,
    /// Reset sweep mode.
    ResetSweep,
}

impl Trigger {
    pub fn byte(self) -> u8 {
        match self {
            Self::Continuity => b'O',
            Self::CapTftOn => b'P',
            Self::TftOff => b'I',
            Self::ResetSweep => b'S',
        }
    }
}

/// Validated mux line index, 0 through 15.
///
/// The wire encoding is a single lowercase hex digit; constructing an index
/// outside that range is an error rather than a silently mis-encoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressIndex(u8);

impl AddressIndex {
    pub const MAX: u8 = (ARRAY_DIM as u8) - 1;

    pub fn new(value: u8) -> AppResult<Self> {
        if value > Self::MAX {
            return Err(TesterError::AddressOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Zero-based line number.
    pub fn get(self) -> u8 {
        self.0
    }

    /// One-based line number as reported in CSV output.
    pub fn display(self) -> u8 {
        self.0 + 1
    }

    /// Single ASCII hex digit sent on the wire (`10` encodes as `b'a'`).
    pub fn hex_byte(self) -> u8 {
        b"0123456789abcdef"[self.0 as usize]
    }

    /// All indices in ascending order. Sweeps iterate this to guarantee the
    /// deterministic traversal order.
    pub fn all() -> impl Iterator<Item = AddressIndex> {
        (0..=Self::MAX).map(AddressIndex)
    }
}

/// Assemble the byte sequence for one measurement, per the firmware
/// invariant: clear, path, then dimension/index pairs, then the trigger.
pub fn address_sequence(
    path: SecondaryPath,
    dims: &[(Dimension, AddressIndex)],
    trigger: Trigger,
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(3 + dims.len() * 2);
    bytes.push(CLEAR);
    bytes.push(path.byte());
    for (dim, index) in dims {
        bytes.push(dim.byte());
        bytes.push(index.hex_byte());
    }
    bytes.push(trigger.byte());
    bytes
}
