//! Width-generic SHA-2 word arithmetic.
//!
//! The attack runs unchanged on SHA-256 and SHA-512; the only difference is
//! the word width and the constants that depend on it. [`Word`] captures that
//! difference so the statistical engines can be written once, over native
//! wrapping 32- or 64-bit arithmetic, with no width dispatch in the hot
//! loops.

use {
    docext::docext,
    std::{
        fmt,
        ops::{BitAnd, BitOr, BitXor, BitXorAssign, Not, Shl, Shr},
    },
};

/// A SHA-2 working-register word, either `u32` (SHA-256) or `u64` (SHA-512).
///
/// Carries the width-dependent pieces of the compression function: the first
/// two round constants $K_0, K_1$ and the big-sigma and small-sigma mixing
/// functions with the rotation distances of the selected width,
///
/// $$
/// \begin{array}{lll}
/// & W = 32 & W = 64\\
/// \Sigma_0 & \mathrm{ROTR}\ 2, 13, 22 & \mathrm{ROTR}\ 28, 34, 39\\
/// \Sigma_1 & \mathrm{ROTR}\ 6, 11, 25 & \mathrm{ROTR}\ 14, 18, 41\\
/// \sigma_0 & \mathrm{ROTR}\ 7, 18,\ \gg 3 & \mathrm{ROTR}\ 1, 8,\ \gg 7\\
/// \sigma_1 & \mathrm{ROTR}\ 17, 19,\ \gg 10 & \mathrm{ROTR}\ 19, 61,\ \gg 6
/// \end{array}
/// $$
///
/// All addition and subtraction on words is wrapping modulo $2^W$; overflow
/// is correct behavior everywhere in the attack.
#[docext]
pub trait Word:
    Copy
    + Eq
    + Ord
    + fmt::Debug
    + fmt::LowerHex
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + BitXor<Output = Self>
    + BitXorAssign
    + Not<Output = Self>
    + Shl<u32, Output = Self>
    + Shr<u32, Output = Self>
{
    /// The word width in bits.
    const BITS: u32;

    const ZERO: Self;
    const ONE: Self;

    /// The most significant bit, `1 << (BITS - 1)`.
    const MSB: Self;

    /// The first two SHA-2 round constants for this width.
    const K: [Self; 2];

    fn wrapping_add(self, rhs: Self) -> Self;

    fn wrapping_sub(self, rhs: Self) -> Self;

    /// Truncate a `u64` to this width.
    fn from_u64(value: u64) -> Self;

    /// Zero-extend to `u64`, used to derive subset bin indices.
    fn to_u64(self) -> u64;

    /// The mask covering the `count` least significant bits. Defined for
    /// `count` up to and including `BITS`.
    fn low_mask(count: u32) -> Self;

    fn count_ones(self) -> u32;

    /// Helper function Σ₀ (see the trait docs for the rotation distances).
    fn uppercase_sigma_0(self) -> Self;

    /// Helper function Σ₁.
    fn uppercase_sigma_1(self) -> Self;

    /// Helper function σ₀.
    fn lowercase_sigma_0(self) -> Self;

    /// Helper function σ₁.
    fn lowercase_sigma_1(self) -> Self;

    /// `ONE` if the flag is set, `ZERO` otherwise.
    fn from_bool(flag: bool) -> Self {
        if flag {
            Self::ONE
        } else {
            Self::ZERO
        }
    }

    /// The bit at the given position, as `0` or `1`.
    fn bit(self, position: u32) -> u64 {
        (self >> position & Self::ONE).to_u64()
    }
}

impl Word for u32 {
    const BITS: u32 = 32;
    const K: [Self; 2] = [0x428a2f98, 0x71374491];
    const MSB: Self = 1 << 31;
    const ONE: Self = 1;
    const ZERO: Self = 0;

    fn wrapping_add(self, rhs: Self) -> Self {
        u32::wrapping_add(self, rhs)
    }

    fn wrapping_sub(self, rhs: Self) -> Self {
        u32::wrapping_sub(self, rhs)
    }

    fn from_u64(value: u64) -> Self {
        value as u32
    }

    fn to_u64(self) -> u64 {
        self.into()
    }

    fn low_mask(count: u32) -> Self {
        if count >= Self::BITS {
            u32::MAX
        } else {
            (1 << count) - 1
        }
    }

    fn count_ones(self) -> u32 {
        u32::count_ones(self)
    }

    fn uppercase_sigma_0(self) -> Self {
        self.rotate_right(2) ^ self.rotate_right(13) ^ self.rotate_right(22)
    }

    fn uppercase_sigma_1(self) -> Self {
        self.rotate_right(6) ^ self.rotate_right(11) ^ self.rotate_right(25)
    }

    fn lowercase_sigma_0(self) -> Self {
        self.rotate_right(7) ^ self.rotate_right(18) ^ (self >> 3)
    }

    fn lowercase_sigma_1(self) -> Self {
        self.rotate_right(17) ^ self.rotate_right(19) ^ (self >> 10)
    }
}

impl Word for u64 {
    const BITS: u32 = 64;
    const K: [Self; 2] = [0x428a2f98d728ae22, 0x7137449123ef65cd];
    const MSB: Self = 1 << 63;
    const ONE: Self = 1;
    const ZERO: Self = 0;

    fn wrapping_add(self, rhs: Self) -> Self {
        u64::wrapping_add(self, rhs)
    }

    fn wrapping_sub(self, rhs: Self) -> Self {
        u64::wrapping_sub(self, rhs)
    }

    fn from_u64(value: u64) -> Self {
        value
    }

    fn to_u64(self) -> u64 {
        self
    }

    fn low_mask(count: u32) -> Self {
        if count >= Self::BITS {
            u64::MAX
        } else {
            (1 << count) - 1
        }
    }

    fn count_ones(self) -> u32 {
        u64::count_ones(self)
    }

    fn uppercase_sigma_0(self) -> Self {
        self.rotate_right(28) ^ self.rotate_right(34) ^ self.rotate_right(39)
    }

    fn uppercase_sigma_1(self) -> Self {
        self.rotate_right(14) ^ self.rotate_right(18) ^ self.rotate_right(41)
    }

    fn lowercase_sigma_0(self) -> Self {
        self.rotate_right(1) ^ self.rotate_right(8) ^ (self >> 7)
    }

    fn lowercase_sigma_1(self) -> Self {
        self.rotate_right(19) ^ self.rotate_right(61) ^ (self >> 6)
    }
}

/// Helper function $Ch$.
///
/// $$
/// Ch(e, f, g) = (e \land f) \oplus (\neg e \land g)
/// $$
#[docext]
pub fn ch<W: Word>(e: W, f: W, g: W) -> W {
    (e & f) ^ (!e & g)
}

/// Helper function $Maj$.
///
/// $$
/// Maj(a, b, c) = (a \land b) \oplus (a \land c) \oplus (b \land c)
/// $$
#[docext]
pub fn maj<W: Word>(a: W, b: W, c: W) -> W {
    (a & b) ^ (a & c) ^ (b & c)
}

/// Hamming distance between two words,
///
/// $$
/// \mathrm{hd}(x, y) = \mathrm{popcount}(x \oplus y).
/// $$
///
/// This is the quantity the side channel leaks: a register update from $x$ to
/// $y$ costs one unit of signal per flipped bit.
#[docext]
pub fn hamming_distance<W: Word>(x: W, y: W) -> u32 {
    (x ^ y).count_ones()
}
