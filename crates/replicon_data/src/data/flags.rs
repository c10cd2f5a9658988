use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Per-site provenance bits carried alongside every genome instruction.
///
/// Bits are independent; they are set as side effects of execution and
/// mutation and only cleared by an explicit clear or reset of the buffer.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Archive,
    RkyvSerialize,
    RkyvDeserialize,
)]
#[archive(check_bytes)]
pub struct SiteFlags(u8);

impl SiteFlags {
    pub const EMPTY: Self = Self(0);
    /// Written by a copy operation.
    pub const COPIED: Self = Self(1 << 0);
    /// Touched by any mutation operator.
    pub const MUTATED: Self = Self(1 << 1);
    /// Fetched by an instruction pointer (or read as a modifier).
    pub const EXECUTED: Self = Self(1 << 2);
    /// Debugger stop point.
    pub const BREAKPOINT: Self = Self(1 << 3);
    /// Substituted by a point mutation.
    pub const POINT_MUTATED: Self = Self(1 << 4);
    /// Substituted while being copied.
    pub const COPY_MUTATED: Self = Self(1 << 5);
    /// Spliced in from a foreign genome.
    pub const INJECTED: Self = Self(1 << 6);

    const NAMES: [(Self, char); 7] = [
        (Self::COPIED, 'c'),
        (Self::MUTATED, 'm'),
        (Self::EXECUTED, 'e'),
        (Self::BREAKPOINT, 'b'),
        (Self::POINT_MUTATED, 'p'),
        (Self::COPY_MUTATED, 'y'),
        (Self::INJECTED, 'i'),
    ];

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x7f)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for SiteFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SiteFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for SiteFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, name) in Self::NAMES {
            let c = if self.contains(flag) { name } else { '-' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}
