use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbol alphabet used for the compact genome string form.
const SYMBOLS: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Symbol printed for opcodes outside the alphabet.
pub const UNKNOWN_SYMBOL: char = '?';

/// A single genome site: an opcode identity.
///
/// The meaning of an opcode is defined by the instruction set the hardware
/// was built with; the value itself is an immutable `Copy` type.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    Archive,
    RkyvSerialize,
    RkyvDeserialize,
)]
#[archive(check_bytes)]
#[archive_attr(derive(Debug, PartialEq, Eq))]
pub struct Instruction(u8);

impl Instruction {
    /// Largest opcode that still has a printable symbol.
    pub const MAX_SYMBOLIC: u8 = SYMBOLS.len() as u8 - 1;

    #[must_use]
    pub const fn new(op: u8) -> Self {
        Self(op)
    }

    #[must_use]
    pub const fn op(self) -> u8 {
        self.0
    }

    /// Opcode as a table index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// One-character form used in genome strings (`a`-`z`, `A`-`Z`, `0`-`9`).
    #[must_use]
    pub fn symbol(self) -> char {
        SYMBOLS
            .get(self.index())
            .map_or(UNKNOWN_SYMBOL, |&b| b as char)
    }

    /// Inverse of [`Instruction::symbol`].
    #[must_use]
    pub fn from_symbol(c: char) -> Option<Self> {
        let byte = u8::try_from(c).ok()?;
        SYMBOLS
            .iter()
            .position(|&s| s == byte)
            .map(|idx| Self(idx as u8))
    }
}

impl From<u8> for Instruction {
    fn from(op: u8) -> Self {
        Self(op)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}
