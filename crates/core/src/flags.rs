//! Set-of-flags abstraction over persisted bitmasks.
//!
//! Identities, templates and recipients each carry a bitmask column. In memory
//! they are handled as a [`FlagSet`] of a named flag enum, so call sites ask
//! questions like `flags.contains(RecipientFlag::Warmup)` instead of doing bit
//! arithmetic. The raw bits round-trip exactly, including bits this build does
//! not know about.

use core::fmt;
use core::marker::PhantomData;
use core::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single named flag with a fixed persisted bit.
pub trait Flag: Copy + Eq + fmt::Debug + 'static {
    /// Every flag of this kind, in bit order.
    const ALL: &'static [Self];

    /// The persisted bit value (a single set bit).
    fn bit(self) -> i64;
}

/// A set of flags of one kind, stored as the persisted bitmask.
pub struct FlagSet<F> {
    bits: i64,
    _flag: PhantomData<F>,
}

impl<F: Flag> FlagSet<F> {
    pub const fn empty() -> Self {
        Self {
            bits: 0,
            _flag: PhantomData,
        }
    }

    /// Wrap a persisted bitmask as-is.
    pub const fn from_bits(bits: i64) -> Self {
        Self {
            bits,
            _flag: PhantomData,
        }
    }

    pub fn of(flags: &[F]) -> Self {
        flags.iter().copied().collect()
    }

    pub const fn bits(&self) -> i64 {
        self.bits
    }

    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn contains(&self, flag: F) -> bool {
        self.bits & flag.bit() != 0
    }

    /// True when every flag in `other` is also in `self`.
    pub fn contains_all(&self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }

    /// True when at least one flag is shared.
    pub fn intersects(&self, other: Self) -> bool {
        self.bits & other.bits != 0
    }

    /// Insert a flag, returning whether the set changed.
    pub fn insert(&mut self, flag: F) -> bool {
        let before = self.bits;
        self.bits |= flag.bit();
        before != self.bits
    }

    /// Remove a flag, returning whether the set changed.
    pub fn remove(&mut self, flag: F) -> bool {
        let before = self.bits;
        self.bits &= !flag.bit();
        before != self.bits
    }

    pub fn with(mut self, flag: F) -> Self {
        self.insert(flag);
        self
    }

    pub fn union(self, other: Self) -> Self {
        Self::from_bits(self.bits | other.bits)
    }

    pub fn difference(self, other: Self) -> Self {
        Self::from_bits(self.bits & !other.bits)
    }

    /// Known flags present in the set, in bit order.
    pub fn iter(&self) -> impl Iterator<Item = F> + '_ {
        F::ALL.iter().copied().filter(|f| self.contains(*f))
    }
}

impl<F> Clone for FlagSet<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for FlagSet<F> {}

impl<F> PartialEq for FlagSet<F> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<F> Eq for FlagSet<F> {}

impl<F> core::hash::Hash for FlagSet<F> {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}

impl<F: Flag> Default for FlagSet<F> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<F: Flag> fmt::Debug for FlagSet<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        set.entries(self.iter());
        let known = F::ALL.iter().fold(0, |acc, flag| acc | flag.bit());
        let unknown = self.bits & !known;
        if unknown != 0 {
            set.entry(&format_args!("{unknown:#x}"));
        }
        set.finish()
    }
}

impl<F: Flag> From<F> for FlagSet<F> {
    fn from(flag: F) -> Self {
        Self::from_bits(flag.bit())
    }
}

impl<F: Flag> FromIterator<F> for FlagSet<F> {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        let mut set = Self::empty();
        for flag in iter {
            set.insert(flag);
        }
        set
    }
}

impl<F: Flag> BitOr for FlagSet<F> {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl<F: Flag> BitOr<F> for FlagSet<F> {
    type Output = Self;

    fn bitor(self, rhs: F) -> Self {
        self.with(rhs)
    }
}

impl<F: Flag> BitOrAssign<F> for FlagSet<F> {
    fn bitor_assign(&mut self, rhs: F) {
        self.insert(rhs);
    }
}

impl<F> Serialize for FlagSet<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.bits)
    }
}

impl<'de, F: Flag> Deserialize<'de> for FlagSet<F> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Self::from_bits)
    }
}
