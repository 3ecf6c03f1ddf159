//! Mode & tarval registry (component C1).
//!
//! A [`Mode`] is a value kind — integer width, float format, memory, control,
//! block, tuple, or one of the two bookkeeping sorts `Bad`/`Any`. Modes are
//! interned: two [`make_int_mode`]/[`make_float_mode`]/[`make_reference_mode`]
//! calls with identical attributes hand back the same [`Mode`].

use std::fmt;
use std::sync::{Mutex, OnceLock};

use crate::tarval::Tarval;

/// The coarse category a [`Mode`] belongs to.
///
/// See spec.md §3 ("Sorts are enumerated").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sort {
    Auxiliary,
    ControlFlow,
    Block,
    Tuple,
    Any,
    Bad,
    Memory,
    InternalBoolean,
    IntNumber,
    Reference,
    FloatNumber,
}

/// Arithmetic family a mode's values follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arithmetic {
    /// No arithmetic defined (control, memory, block, tuple, bad, any).
    None,
    TwosComplement,
    Ieee754,
}

#[derive(Debug, Clone)]
struct ModeData {
    name: String,
    sort: Sort,
    arithmetic: Arithmetic,
    /// Bit size. For floats this is `1 + exponent_bits + mantissa_bits`.
    bits: u16,
    signed: bool,
    modulo_shift: u16,
    exponent_bits: u16,
    mantissa_bits: u16,
    /// Cached constants, filled in on first request (`Mode::min` etc.); these
    /// are `None` for sorts with no natural constants (control, memory, ...).
    min: Option<Tarval>,
    max: Option<Tarval>,
    null: Option<Tarval>,
    one: Option<Tarval>,
    minus_one: Option<Tarval>,
    all_one: Option<Tarval>,
}

/// An interned mode handle. Cheap to copy and compare; identity is the
/// interning index, matching spec.md's "Modes are interned" invariant.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode(u32);

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Mode").field(&self.name()).finish()
    }
}

struct Registry {
    modes: Vec<ModeData>,
}

fn registry() -> &'static Mutex<Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Registry { modes: Vec::new() }))
}

/// Failure reasons for mode construction (spec.md §4.1 "Failure").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeError {
    MantissaTooWide(u16),
    ExponentTooWide(u16),
    WrongArithmeticForSort { sort: Sort, arithmetic: Arithmetic },
}

impl fmt::Display for ModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MantissaTooWide(n) => write!(f, "mantissa width {n} >= 256"),
            Self::ExponentTooWide(n) => write!(f, "exponent width {n} >= 256"),
            Self::WrongArithmeticForSort { sort, arithmetic } => write!(
                f,
                "arithmetic {arithmetic:?} is not appropriate for sort {sort:?}"
            ),
        }
    }
}

impl std::error::Error for ModeError {}

fn find_or_insert(data: ModeData) -> Mode {
    let mut reg = registry().lock().unwrap();
    if let Some(idx) = reg.modes.iter().position(|m| {
        m.sort == data.sort
            && m.arithmetic == data.arithmetic
            && m.bits == data.bits
            && m.signed == data.signed
            && m.modulo_shift == data.modulo_shift
            && m.exponent_bits == data.exponent_bits
            && m.mantissa_bits == data.mantissa_bits
    }) {
        return Mode(idx as u32);
    }
    let idx = reg.modes.len() as u32;
    reg.modes.push(data);
    Mode(idx)
}

/// Create (or look up) an integer mode.
///
/// Returns the existing mode if one with identical attributes is already
/// registered; see spec.md §4.1.
pub fn make_int_mode(
    name: &str,
    arithmetic: Arithmetic,
    bits: u16,
    signed: bool,
    modulo_shift: u16,
) -> Result<Mode, ModeError> {
    if !matches!(arithmetic, Arithmetic::TwosComplement) {
        return Err(ModeError::WrongArithmeticForSort {
            sort: Sort::IntNumber,
            arithmetic,
        });
    }
    Ok(find_or_insert(ModeData {
        name: name.to_owned(),
        sort: Sort::IntNumber,
        arithmetic,
        bits,
        signed,
        modulo_shift,
        exponent_bits: 0,
        mantissa_bits: 0,
        min: None,
        max: None,
        null: None,
        one: None,
        minus_one: None,
        all_one: None,
    }))
}

/// Create (or look up) a float mode.
pub fn make_float_mode(
    name: &str,
    arithmetic: Arithmetic,
    exponent_bits: u16,
    mantissa_bits: u16,
) -> Result<Mode, ModeError> {
    if exponent_bits >= 256 {
        return Err(ModeError::ExponentTooWide(exponent_bits));
    }
    if mantissa_bits >= 256 {
        return Err(ModeError::MantissaTooWide(mantissa_bits));
    }
    if !matches!(arithmetic, Arithmetic::Ieee754) {
        return Err(ModeError::WrongArithmeticForSort {
            sort: Sort::FloatNumber,
            arithmetic,
        });
    }
    let bits = 1 + exponent_bits + mantissa_bits;
    Ok(find_or_insert(ModeData {
        name: name.to_owned(),
        sort: Sort::FloatNumber,
        arithmetic,
        bits,
        signed: true,
        modulo_shift: 0,
        exponent_bits,
        mantissa_bits,
        min: None,
        max: None,
        null: None,
        one: None,
        minus_one: None,
        all_one: None,
    }))
}

/// Create (or look up) a reference (pointer) mode.
pub fn make_reference_mode(
    name: &str,
    arithmetic: Arithmetic,
    bits: u16,
    modulo_shift: u16,
) -> Result<Mode, ModeError> {
    if !matches!(arithmetic, Arithmetic::TwosComplement | Arithmetic::None) {
        return Err(ModeError::WrongArithmeticForSort {
            sort: Sort::Reference,
            arithmetic,
        });
    }
    Ok(find_or_insert(ModeData {
        name: name.to_owned(),
        sort: Sort::Reference,
        arithmetic,
        bits,
        signed: false,
        modulo_shift,
        exponent_bits: 0,
        mantissa_bits: 0,
        min: None,
        max: None,
        null: None,
        one: None,
        minus_one: None,
        all_one: None,
    }))
}

fn make_auxiliary(name: &str, sort: Sort, bits: u16) -> Mode {
    find_or_insert(ModeData {
        name: name.to_owned(),
        sort,
        arithmetic: Arithmetic::None,
        bits,
        signed: false,
        modulo_shift: 0,
        exponent_bits: 0,
        mantissa_bits: 0,
        min: None,
        max: None,
        null: None,
        one: None,
        minus_one: None,
        all_one: None,
    })
}

impl Mode {
    fn with_data<R>(self, f: impl FnOnce(&ModeData) -> R) -> R {
        let reg = registry().lock().unwrap();
        f(&reg.modes[self.0 as usize])
    }

    #[must_use]
    pub fn name(self) -> String {
        self.with_data(|d| d.name.clone())
    }

    #[must_use]
    pub fn sort(self) -> Sort {
        self.with_data(|d| d.sort)
    }

    #[must_use]
    pub fn arithmetic(self) -> Arithmetic {
        self.with_data(|d| d.arithmetic)
    }

    /// `size-bits`: the bit width of values in this mode.
    #[must_use]
    pub fn size_bits(self) -> u16 {
        self.with_data(|d| d.bits)
    }

    /// `signed?`
    #[must_use]
    pub fn is_signed(self) -> bool {
        self.with_data(|d| d.signed)
    }

    #[must_use]
    pub fn modulo_shift(self) -> u16 {
        self.with_data(|d| d.modulo_shift)
    }

    /// `mantissa-size`
    #[must_use]
    pub fn mantissa_size(self) -> u16 {
        self.with_data(|d| d.mantissa_bits)
    }

    /// `exponent-size`
    #[must_use]
    pub fn exponent_size(self) -> u16 {
        self.with_data(|d| d.exponent_bits)
    }

    #[must_use]
    pub fn is_int(self) -> bool {
        self.sort() == Sort::IntNumber
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        self.sort() == Sort::FloatNumber
    }

    #[must_use]
    pub fn is_reference(self) -> bool {
        self.sort() == Sort::Reference
    }

    /// Pure function of mode attributes: IEEE-754 floats honor signed zero,
    /// nothing else does.
    #[must_use]
    pub fn honors_signed_zeros(self) -> bool {
        self.arithmetic() == Arithmetic::Ieee754
    }

    /// Pure function of mode attributes: unary minus can overflow only for
    /// signed two's-complement modes (negating the minimum value).
    #[must_use]
    pub fn overflow_on_unary_minus(self) -> bool {
        self.arithmetic() == Arithmetic::TwosComplement && self.is_signed()
    }

    /// Pure function of mode attributes: two's-complement modes wrap,
    /// IEEE-754 modes saturate/produce infinities instead.
    #[must_use]
    pub fn wrap_around(self) -> bool {
        self.arithmetic() == Arithmetic::TwosComplement
    }

    fn set_constants(self, min: Tarval, max: Tarval, null: Tarval, one: Tarval, minus_one: Tarval, all_one: Tarval) {
        let mut reg = registry().lock().unwrap();
        let d = &mut reg.modes[self.0 as usize];
        d.min = Some(min);
        d.max = Some(max);
        d.null = Some(null);
        d.one = Some(one);
        d.minus_one = Some(minus_one);
        d.all_one = Some(all_one);
    }

    fn cached(self, get: impl Fn(&ModeData) -> Option<Tarval>) -> Option<Tarval> {
        self.with_data(get)
    }

    /// The mode's minimum representable value, computing and caching it on
    /// first use.
    #[must_use]
    pub fn min(self) -> Option<Tarval> {
        self.ensure_constants();
        self.cached(|d| d.min)
    }

    #[must_use]
    pub fn max(self) -> Option<Tarval> {
        self.ensure_constants();
        self.cached(|d| d.max)
    }

    #[must_use]
    pub fn null(self) -> Option<Tarval> {
        self.ensure_constants();
        self.cached(|d| d.null)
    }

    #[must_use]
    pub fn one(self) -> Option<Tarval> {
        self.ensure_constants();
        self.cached(|d| d.one)
    }

    #[must_use]
    pub fn minus_one(self) -> Option<Tarval> {
        self.ensure_constants();
        self.cached(|d| d.minus_one)
    }

    #[must_use]
    pub fn all_one(self) -> Option<Tarval> {
        self.ensure_constants();
        self.cached(|d| d.all_one)
    }

    fn ensure_constants(self) {
        if self.cached(|d| d.null).is_some() {
            return;
        }
        match self.sort() {
            Sort::IntNumber => {
                let bits = self.size_bits();
                let (min, max) = if self.is_signed() {
                    let m = 1i128 << (bits - 1);
                    (-m, m - 1)
                } else {
                    (0, (1i128 << bits) - 1)
                };
                // The all-ones bit pattern is -1 in signed two's complement,
                // and the maximum value when unsigned.
                let all_one = if self.is_signed() { -1 } else { max };
                self.set_constants(
                    Tarval::from_int(self, min),
                    Tarval::from_int(self, max),
                    Tarval::from_int(self, 0),
                    Tarval::from_int(self, 1),
                    Tarval::from_int(self, all_one),
                    Tarval::from_int(self, all_one),
                );
            }
            Sort::FloatNumber => {
                self.set_constants(
                    Tarval::from_float(self, f64::MIN),
                    Tarval::from_float(self, f64::MAX),
                    Tarval::from_float(self, 0.0),
                    Tarval::from_float(self, 1.0),
                    Tarval::from_float(self, -1.0),
                    Tarval::from_float(self, f64::NAN),
                );
            }
            Sort::Reference => {
                let bits = self.size_bits();
                let max = if bits >= 127 { i128::MAX } else { (1i128 << bits) - 1 };
                self.set_constants(
                    Tarval::from_int(self, 0),
                    Tarval::from_int(self, max),
                    Tarval::from_int(self, 0),
                    Tarval::from_int(self, 1),
                    Tarval::from_int(self, -1),
                    Tarval::from_int(self, max),
                );
            }
            _ => {}
        }
    }

    /// `smaller-mode(sm, lm)`: can a value of `self` convert into `larger`
    /// without loss, i.e. is `self` no wider than `larger` in the same
    /// arithmetic family? This is an ordering, not a total order across
    /// mixed sorts — mixed-sort pairs are always `false`.
    #[must_use]
    pub fn smaller_mode(self, larger: Mode) -> bool {
        if self.sort() != larger.sort() {
            return false;
        }
        match self.sort() {
            Sort::IntNumber => {
                if self.is_signed() == larger.is_signed() {
                    self.size_bits() <= larger.size_bits()
                } else if larger.is_signed() {
                    self.size_bits() < larger.size_bits()
                } else {
                    false
                }
            }
            Sort::FloatNumber => {
                self.mantissa_size() <= larger.mantissa_size()
                    && self.exponent_size() <= larger.exponent_size()
            }
            Sort::Reference => self.size_bits() <= larger.size_bits(),
            _ => false,
        }
    }

    /// `values-in-mode(sm, lm)`: true when every value representable in
    /// `self` round-trips losslessly through `larger` and back.
    #[must_use]
    pub fn values_in_mode(self, larger: Mode) -> bool {
        self.smaller_mode(larger)
    }

    /// `reinterpret-cast?(a, b)`: same bit-size and arithmetic family, so a
    /// bitcast needs no conversion code.
    #[must_use]
    pub fn reinterpret_cast(self, other: Mode) -> bool {
        self.size_bits() == other.size_bits() && self.arithmetic() == other.arithmetic()
    }
}

/// A pointer/code/data mode pair and the full predefined mode set (spec.md
/// §3 "A set of predefined modes is always present").
#[derive(Debug, Clone, Copy)]
pub struct PredefinedModes {
    pub memory: Mode,
    pub control: Mode,
    pub block: Mode,
    pub tuple: Mode,
    pub boolean: Mode,
    pub bad: Mode,
    pub any: Mode,
    pub is8: Mode,
    pub iu8: Mode,
    pub is16: Mode,
    pub iu16: Mode,
    pub is32: Mode,
    pub iu32: Mode,
    pub is64: Mode,
    pub iu64: Mode,
    pub is128: Mode,
    pub iu128: Mode,
    pub f32: Mode,
    pub f64: Mode,
    pub f128: Mode,
    pub pointer: Mode,
}

/// Client-settable machine pointer modes (spec.md: "two client-settable
/// machine pointer modes for code and data").
#[derive(Debug, Clone, Copy)]
pub struct MachinePointerModes {
    pub code: Mode,
    pub data: Mode,
}

/// The always-present predefined modes, computed once.
#[must_use]
pub fn predefined() -> PredefinedModes {
    static PREDEFINED: OnceLock<PredefinedModes> = OnceLock::new();
    *PREDEFINED.get_or_init(|| PredefinedModes {
        memory: make_auxiliary("M", Sort::Memory, 0),
        control: make_auxiliary("X", Sort::ControlFlow, 0),
        block: make_auxiliary("BB", Sort::Block, 0),
        tuple: make_auxiliary("T", Sort::Tuple, 0),
        boolean: make_auxiliary("b", Sort::InternalBoolean, 1),
        bad: make_auxiliary("Bad", Sort::Bad, 0),
        any: make_auxiliary("Any", Sort::Any, 0),
        is8: make_int_mode("Is8", Arithmetic::TwosComplement, 8, true, 32).unwrap(),
        iu8: make_int_mode("Iu8", Arithmetic::TwosComplement, 8, false, 32).unwrap(),
        is16: make_int_mode("Is16", Arithmetic::TwosComplement, 16, true, 32).unwrap(),
        iu16: make_int_mode("Iu16", Arithmetic::TwosComplement, 16, false, 32).unwrap(),
        is32: make_int_mode("Is32", Arithmetic::TwosComplement, 32, true, 32).unwrap(),
        iu32: make_int_mode("Iu32", Arithmetic::TwosComplement, 32, false, 32).unwrap(),
        is64: make_int_mode("Is64", Arithmetic::TwosComplement, 64, true, 64).unwrap(),
        iu64: make_int_mode("Iu64", Arithmetic::TwosComplement, 64, false, 64).unwrap(),
        is128: make_int_mode("Is128", Arithmetic::TwosComplement, 128, true, 128).unwrap(),
        iu128: make_int_mode("Iu128", Arithmetic::TwosComplement, 128, false, 128).unwrap(),
        f32: make_float_mode("F32", Arithmetic::Ieee754, 8, 23).unwrap(),
        f64: make_float_mode("F64", Arithmetic::Ieee754, 11, 52).unwrap(),
        f128: make_float_mode("F128", Arithmetic::Ieee754, 15, 112).unwrap(),
        pointer: make_reference_mode("P", Arithmetic::TwosComplement, 64, 64).unwrap(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_returns_same_mode() {
        let a = make_int_mode("MyInt", Arithmetic::TwosComplement, 32, true, 32).unwrap();
        let b = make_int_mode("MyInt", Arithmetic::TwosComplement, 32, true, 32).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_huge_mantissa() {
        let err = make_float_mode("huge", Arithmetic::Ieee754, 8, 300).unwrap_err();
        assert_eq!(err, ModeError::MantissaTooWide(300));
    }

    #[test]
    fn signed_int_constants() {
        let m = predefined().is32;
        assert_eq!(m.min().unwrap().as_i128(), i32::MIN as i128);
        assert_eq!(m.max().unwrap().as_i128(), i32::MAX as i128);
        assert_eq!(m.null().unwrap().as_i128(), 0);
    }

    #[test]
    fn smaller_mode_ordering() {
        let p = predefined();
        assert!(p.is8.smaller_mode(p.is32));
        assert!(!p.is32.smaller_mode(p.is8));
        assert!(!p.is32.smaller_mode(p.f32));
    }

    #[test]
    fn wrap_and_overflow_flags() {
        let p = predefined();
        assert!(p.is32.wrap_around());
        assert!(p.is32.overflow_on_unary_minus());
        assert!(!p.iu32.overflow_on_unary_minus());
        assert!(!p.f64.wrap_around());
        assert!(p.f64.honors_signed_zeros());
    }
}
