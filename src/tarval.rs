//! Tarval: interned target values (component C1, continued).
//!
//! spec.md treats tarval arithmetic as mostly an external collaborator ("the
//! core assumes tarval operations are provided"); this module ships the
//! contract (the [`Relation`] lattice, [`Tarval`] itself) plus a default
//! arithmetic engine over `i128`/`f64` wide enough for every predefined mode.
//! A target that needs something else (e.g. a software-float library for an
//! exotic mantissa width) can bypass the cached arithmetic methods here and
//! compute its own [`Tarval`]s via [`Tarval::from_int`]/[`Tarval::from_float`].

use std::fmt;

use bitflags::bitflags;

use crate::mode::Mode;

bitflags! {
    /// Comparison outcomes form a lattice; a [`Relation`] is a bitwise union
    /// of the atoms `EQUAL`/`LESS`/`GREATER`/`UNORDERED`. spec.md §3.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Relation: u8 {
        const FALSE      = 0;
        const EQUAL      = 1 << 0;
        const LESS       = 1 << 1;
        const GREATER    = 1 << 2;
        const UNORDERED  = 1 << 3;
        const LESS_EQUAL    = Self::LESS.bits() | Self::EQUAL.bits();
        const GREATER_EQUAL = Self::GREATER.bits() | Self::EQUAL.bits();
        const NOT_EQUAL     = Self::LESS.bits() | Self::GREATER.bits() | Self::UNORDERED.bits();
        const LESS_GREATER  = Self::LESS.bits() | Self::GREATER.bits();
        const TRUE = Self::EQUAL.bits() | Self::LESS.bits() | Self::GREATER.bits() | Self::UNORDERED.bits();
    }
}

impl Relation {
    /// The relation negation (complement within the full lattice).
    #[must_use]
    pub fn negate(self) -> Self {
        Self::TRUE.difference(self)
    }
}

#[derive(Debug, Clone, Copy)]
enum Bits {
    Int(i128),
    Float(f64),
    /// The `Bad` value: result of an operation on already-Bad input, or of a
    /// client-provided uninitialized-variable callback.
    Bad,
}

/// An interned value of a particular [`Mode`].
///
/// Two `Tarval`s compare equal iff their mode and bit pattern match;
/// `PartialEq`/`Eq` are derived rather than pointer-interned, which is
/// observationally identical for callers and avoids a second global table
/// (modes themselves are the thing spec.md requires process-wide identity
/// for — see `mode.rs`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tarval {
    mode: Mode,
    bits: TarvalBitsEq,
}

#[derive(Debug, Clone, Copy)]
struct TarvalBitsEq(Bits);

impl PartialEq for TarvalBitsEq {
    fn eq(&self, other: &Self) -> bool {
        match (self.0, other.0) {
            (Bits::Int(a), Bits::Int(b)) => a == b,
            (Bits::Float(a), Bits::Float(b)) => a.to_bits() == b.to_bits(),
            (Bits::Bad, Bits::Bad) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Tarval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bits.0 {
            Bits::Int(v) => write!(f, "{v}:{}", self.mode.name()),
            Bits::Float(v) => write!(f, "{v}:{}", self.mode.name()),
            Bits::Bad => write!(f, "Bad:{}", self.mode.name()),
        }
    }
}

impl Tarval {
    /// Construct an integer tarval, masking/sign-extending to the mode's
    /// bit-width per its modulo-shift semantics.
    #[must_use]
    pub fn from_int(mode: Mode, value: i128) -> Self {
        let bits = mode.size_bits();
        let masked = mask_to_bits(value, bits);
        let v = if mode.is_signed() {
            sign_extend(masked, bits)
        } else {
            masked
        };
        Self {
            mode,
            bits: TarvalBitsEq(Bits::Int(v)),
        }
    }

    #[must_use]
    pub fn from_float(mode: Mode, value: f64) -> Self {
        Self {
            mode,
            bits: TarvalBitsEq(Bits::Float(value)),
        }
    }

    #[must_use]
    pub fn bad(mode: Mode) -> Self {
        Self {
            mode,
            bits: TarvalBitsEq(Bits::Bad),
        }
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn is_bad(&self) -> bool {
        matches!(self.bits.0, Bits::Bad)
    }

    /// Panics if this is not an integer tarval; callers should check
    /// `mode().is_int()` first, matching the crate's "no silent coercions
    /// across sorts" stance.
    #[must_use]
    pub fn as_i128(&self) -> i128 {
        match self.bits.0 {
            Bits::Int(v) => v,
            _ => panic!("as_i128 called on non-integer tarval"),
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match self.bits.0 {
            Bits::Float(v) => v,
            _ => panic!("as_f64 called on non-float tarval"),
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        match self.bits.0 {
            Bits::Int(v) => v == 0,
            Bits::Float(v) => v == 0.0,
            Bits::Bad => false,
        }
    }

    #[must_use]
    pub fn is_one(&self) -> bool {
        matches!(self.bits.0, Bits::Int(1)) || matches!(self.bits.0, Bits::Float(f) if f == 1.0)
    }

    #[must_use]
    pub fn is_all_one(&self) -> bool {
        match self.bits.0 {
            Bits::Int(v) => {
                let bits = self.mode.size_bits();
                mask_to_bits(v, bits) == mask_to_bits(-1, bits)
            }
            _ => false,
        }
    }

    /// `sub`: `self - other`, both in the same mode.
    #[must_use]
    pub fn sub(&self, other: &Tarval) -> Tarval {
        assert_eq!(self.mode, other.mode, "sub across modes");
        match (self.bits.0, other.bits.0) {
            (Bits::Int(a), Bits::Int(b)) => Tarval::from_int(self.mode, a.wrapping_sub(b)),
            (Bits::Float(a), Bits::Float(b)) => Tarval::from_float(self.mode, a - b),
            _ => Tarval::bad(self.mode),
        }
    }

    #[must_use]
    pub fn add(&self, other: &Tarval) -> Tarval {
        assert_eq!(self.mode, other.mode, "add across modes");
        match (self.bits.0, other.bits.0) {
            (Bits::Int(a), Bits::Int(b)) => Tarval::from_int(self.mode, a.wrapping_add(b)),
            (Bits::Float(a), Bits::Float(b)) => Tarval::from_float(self.mode, a + b),
            _ => Tarval::bad(self.mode),
        }
    }

    /// `convert`: reinterpret/convert this value into `target` mode.
    #[must_use]
    pub fn convert(&self, target: Mode) -> Tarval {
        match (self.bits.0, target.sort()) {
            (Bits::Int(v), crate::mode::Sort::IntNumber) => Tarval::from_int(target, v),
            (Bits::Int(v), crate::mode::Sort::FloatNumber) => Tarval::from_float(target, v as f64),
            (Bits::Float(v), crate::mode::Sort::IntNumber) => Tarval::from_int(target, v as i128),
            (Bits::Float(v), crate::mode::Sort::FloatNumber) => Tarval::from_float(target, v),
            _ => Tarval::bad(target),
        }
    }

    /// `compare`: yields a [`Relation`] describing how `self` relates to
    /// `other`.
    #[must_use]
    pub fn compare(&self, other: &Tarval) -> Relation {
        assert_eq!(self.mode, other.mode, "compare across modes");
        match (self.bits.0, other.bits.0) {
            (Bits::Int(a), Bits::Int(b)) => match a.cmp(&b) {
                std::cmp::Ordering::Less => Relation::LESS,
                std::cmp::Ordering::Equal => Relation::EQUAL,
                std::cmp::Ordering::Greater => Relation::GREATER,
            },
            (Bits::Float(a), Bits::Float(b)) => {
                if a.is_nan() || b.is_nan() {
                    Relation::UNORDERED
                } else if a < b {
                    Relation::LESS
                } else if a > b {
                    Relation::GREATER
                } else {
                    Relation::EQUAL
                }
            }
            _ => Relation::UNORDERED,
        }
    }
}

fn mask_to_bits(value: i128, bits: u16) -> i128 {
    if bits >= 128 {
        return value;
    }
    let mask = (1i128 << bits) - 1;
    value & mask
}

fn sign_extend(value: i128, bits: u16) -> i128 {
    if bits >= 128 {
        return value;
    }
    let shift = 128 - bits as u32;
    (value << shift) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::predefined;

    #[test]
    fn integer_wraps_on_overflow() {
        let m = predefined().iu8;
        let v = Tarval::from_int(m, 255).add(&Tarval::from_int(m, 1));
        assert_eq!(v.as_i128(), 0);
    }

    #[test]
    fn sign_extension() {
        let m = predefined().is8;
        let v = Tarval::from_int(m, 0xFF);
        assert_eq!(v.as_i128(), -1);
    }

    #[test]
    fn compare_relations() {
        let m = predefined().is32;
        let a = Tarval::from_int(m, 3);
        let b = Tarval::from_int(m, 5);
        assert_eq!(a.compare(&b), Relation::LESS);
        assert!(Relation::LESS_EQUAL.contains(a.compare(&b)));
        assert_eq!(b.compare(&b), Relation::EQUAL);
    }

    #[test]
    fn float_unordered_on_nan() {
        let m = predefined().f64;
        let a = Tarval::from_float(m, f64::NAN);
        let b = Tarval::from_float(m, 1.0);
        assert_eq!(a.compare(&b), Relation::UNORDERED);
    }

    #[test]
    fn all_one_detection() {
        let m = predefined().iu8;
        assert!(Tarval::from_int(m, 0xFF).is_all_one());
        let s = predefined().is8;
        assert!(Tarval::from_int(s, -1).is_all_one());
    }
}
