// Copyright (c) 2024-2026 The shannon developers

//! Arbitrary precision integers with 4-state semantics.
//!
//! An [`SVInt`] carries a bit width, a sign flag, and up to two bit planes:
//! the value plane and an optional unknown plane. A bit whose unknown-plane
//! bit is set is either X or Z; the value-plane bit distinguishes the two
//! (0 is X, 1 is Z). Two-state values carry no unknown plane at all.
//!
//! Arithmetic follows the hardware semantics: any unknown bit in an operand
//! poisons the entire result to all-X, and division by zero yields all-X
//! rather than trapping. Bitwise operations are bit-precise, so a known zero
//! still dominates an AND with an unknown bit.

use num::{BigInt, Integer, One, Signed, ToPrimitive, Zero};
use std::fmt;

/// A single 4-state logic value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Logic {
    Zero,
    One,
    X,
    Z,
}

impl Logic {
    /// Interpret a literal digit character as a logic value.
    pub fn from_char(c: char) -> Option<Logic> {
        match c {
            '0' => Some(Logic::Zero),
            '1' => Some(Logic::One),
            'x' | 'X' => Some(Logic::X),
            'z' | 'Z' | '?' => Some(Logic::Z),
            _ => None,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Logic::Zero => '0',
            Logic::One => '1',
            Logic::X => 'x',
            Logic::Z => 'z',
        }
    }

    pub fn from_bool(b: bool) -> Logic {
        if b {
            Logic::One
        } else {
            Logic::Zero
        }
    }

    pub fn is_unknown(self) -> bool {
        match self {
            Logic::X | Logic::Z => true,
            _ => false,
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// An arbitrary precision integer with 4-state semantics.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SVInt {
    width: u32,
    signed: bool,
    /// The value plane. Always non-negative and truncated to `width` bits.
    value: BigInt,
    /// The unknown plane. Set bits mark X or Z positions; for those bits the
    /// value plane selects Z when set and X when cleared. `None` for
    /// two-state values.
    unknown: Option<BigInt>,
}

fn mask(width: u32) -> BigInt {
    (BigInt::one() << width as usize) - 1
}

fn wrap(value: BigInt, width: u32) -> BigInt {
    value.mod_floor(&(BigInt::one() << width as usize))
}

fn bit(plane: &BigInt, index: u32) -> bool {
    ((plane >> index as usize) & BigInt::one()).is_one()
}

impl SVInt {
    /// Create a new value from a (possibly negative) integer, truncating it
    /// to `width` bits in two's complement.
    pub fn new(width: u32, signed: bool, value: BigInt) -> SVInt {
        assert!(width >= 1, "zero-width integer");
        SVInt {
            width,
            signed,
            value: wrap(value, width),
            unknown: None,
        }
    }

    /// Create a new value with explicit bit planes.
    pub fn with_planes(width: u32, signed: bool, value: BigInt, unknown: BigInt) -> SVInt {
        assert!(width >= 1, "zero-width integer");
        let m = mask(width);
        let unknown = unknown.mod_floor(&(BigInt::one() << width as usize));
        SVInt {
            width,
            signed,
            value: wrap(value, width) & &m,
            unknown: if unknown.is_zero() {
                None
            } else {
                Some(unknown)
            },
        }
    }

    pub fn from_u64(width: u32, signed: bool, value: u64) -> SVInt {
        SVInt::new(width, signed, value.into())
    }

    pub fn from_usize(width: u32, signed: bool, value: usize) -> SVInt {
        SVInt::new(width, signed, value.into())
    }

    pub fn zero(width: u32) -> SVInt {
        SVInt::new(width, false, BigInt::zero())
    }

    /// An all-X value, as produced by poisoned arithmetic.
    pub fn all_x(width: u32, signed: bool) -> SVInt {
        SVInt {
            width,
            signed,
            value: BigInt::zero(),
            unknown: Some(mask(width)),
        }
    }

    /// An all-Z value.
    pub fn all_z(width: u32, signed: bool) -> SVInt {
        SVInt {
            width,
            signed,
            value: mask(width),
            unknown: Some(mask(width)),
        }
    }

    /// A value with every bit set to `digit`, as produced by the unbased
    /// unsized literals `'0`, `'1`, `'x`, and `'z`.
    pub fn filled(width: u32, digit: Logic) -> SVInt {
        match digit {
            Logic::Zero => SVInt::zero(width),
            Logic::One => SVInt::new(width, false, mask(width)),
            Logic::X => SVInt::all_x(width, false),
            Logic::Z => SVInt::all_z(width, false),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Return the same bits with a different sign flag.
    pub fn as_signedness(&self, signed: bool) -> SVInt {
        SVInt {
            signed,
            ..self.clone()
        }
    }

    pub fn has_unknown(&self) -> bool {
        self.unknown.is_some()
    }

    pub fn is_zero(&self) -> bool {
        self.unknown.is_none() && self.value.is_zero()
    }

    /// The raw value plane.
    pub fn value_bits(&self) -> &BigInt {
        &self.value
    }

    /// The numeric value, if all bits are known. Respects the sign flag.
    pub fn get_value(&self) -> Option<BigInt> {
        if self.has_unknown() {
            None
        } else {
            Some(self.as_arith())
        }
    }

    /// Interpret the value plane numerically: two's complement if the sign
    /// flag is set, plain binary otherwise.
    fn as_arith(&self) -> BigInt {
        if self.signed && bit(&self.value, self.width - 1) {
            &self.value - (BigInt::one() << self.width as usize)
        } else {
            self.value.clone()
        }
    }

    fn unknown_plane(&self) -> BigInt {
        self.unknown.clone().unwrap_or_else(BigInt::zero)
    }

    /// Obtain the logic value of the bit at `index`. Out-of-range bits read
    /// as X.
    pub fn get_bit(&self, index: u32) -> Logic {
        if index >= self.width {
            return Logic::X;
        }
        let v = bit(&self.value, index);
        let u = self
            .unknown
            .as_ref()
            .map(|u| bit(u, index))
            .unwrap_or(false);
        match (u, v) {
            (false, false) => Logic::Zero,
            (false, true) => Logic::One,
            (true, false) => Logic::X,
            (true, true) => Logic::Z,
        }
    }

    /// Resize to `width` bits. Truncates from the top, or extends with the
    /// sign bit for signed values and zeros otherwise. Unknown sign bits
    /// extend as unknown.
    pub fn resize(&self, width: u32) -> SVInt {
        if width == self.width {
            return self.clone();
        }
        if width < self.width {
            let m = mask(width);
            return SVInt::with_planes(
                width,
                self.signed,
                &self.value & &m,
                self.unknown_plane() & &m,
            );
        }
        let fill = mask(width) ^ mask(self.width);
        let msb = self.get_bit(self.width - 1);
        let (vfill, ufill) = if self.signed {
            match msb {
                Logic::Zero => (BigInt::zero(), BigInt::zero()),
                Logic::One => (fill.clone(), BigInt::zero()),
                Logic::X => (BigInt::zero(), fill.clone()),
                Logic::Z => (fill.clone(), fill.clone()),
            }
        } else {
            (BigInt::zero(), BigInt::zero())
        };
        SVInt::with_planes(
            width,
            self.signed,
            &self.value | vfill,
            self.unknown_plane() | ufill,
        )
    }

    /// Extend with a specific logic value. Used when sizing based literals,
    /// where a leading X or Z digit fills the value up to its full width.
    pub fn extend_with(&self, width: u32, digit: Logic) -> SVInt {
        if width <= self.width {
            return self.resize(width);
        }
        let fill = mask(width) ^ mask(self.width);
        let (vfill, ufill) = match digit {
            Logic::Zero => (BigInt::zero(), BigInt::zero()),
            Logic::One => (fill.clone(), BigInt::zero()),
            Logic::X => (BigInt::zero(), fill.clone()),
            Logic::Z => (fill.clone(), fill.clone()),
        };
        SVInt::with_planes(
            width,
            self.signed,
            &self.value | vfill,
            self.unknown_plane() | ufill,
        )
    }

    /// Promote two operands to a common width and signedness, following the
    /// arithmetic promotion rules: the result is as wide as the wider
    /// operand, and signed only if both operands are signed.
    fn promote(a: &SVInt, b: &SVInt) -> (SVInt, SVInt, u32, bool) {
        let width = a.width.max(b.width);
        let signed = a.signed && b.signed;
        let pa = a.resize(width).as_signedness(signed);
        let pb = b.resize(width).as_signedness(signed);
        (pa, pb, width, signed)
    }

    fn arith<F>(&self, other: &SVInt, f: F) -> SVInt
    where
        F: FnOnce(BigInt, BigInt) -> BigInt,
    {
        let (a, b, width, signed) = SVInt::promote(self, other);
        if a.has_unknown() || b.has_unknown() {
            return SVInt::all_x(width, signed);
        }
        SVInt::new(width, signed, f(a.as_arith(), b.as_arith()))
    }

    pub fn add(&self, other: &SVInt) -> SVInt {
        self.arith(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &SVInt) -> SVInt {
        self.arith(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &SVInt) -> SVInt {
        self.arith(other, |a, b| a * b)
    }

    /// Division. Truncates toward zero; division by zero yields all-X.
    pub fn div(&self, other: &SVInt) -> SVInt {
        let (a, b, width, signed) = SVInt::promote(self, other);
        if a.has_unknown() || b.has_unknown() || b.value.is_zero() {
            return SVInt::all_x(width, signed);
        }
        SVInt::new(width, signed, a.as_arith() / b.as_arith())
    }

    /// Remainder. Takes the sign of the dividend; modulo zero yields all-X.
    pub fn rem(&self, other: &SVInt) -> SVInt {
        let (a, b, width, signed) = SVInt::promote(self, other);
        if a.has_unknown() || b.has_unknown() || b.value.is_zero() {
            return SVInt::all_x(width, signed);
        }
        SVInt::new(width, signed, a.as_arith() % b.as_arith())
    }

    /// Exponentiation per the power operator table: negative exponents
    /// collapse to 0/1/-1 depending on the base, and `0 ** negative` is
    /// all-X.
    pub fn pow(&self, other: &SVInt) -> SVInt {
        let width = self.width;
        let signed = self.signed;
        if self.has_unknown() || other.has_unknown() {
            return SVInt::all_x(width, signed);
        }
        let base = self.as_arith();
        let exp = other.as_arith();
        if exp.is_negative() {
            let v = if base.is_one() {
                BigInt::one()
            } else if base == BigInt::from(-1) {
                if exp.is_even() {
                    BigInt::one()
                } else {
                    BigInt::from(-1)
                }
            } else if base.is_zero() {
                return SVInt::all_x(width, signed);
            } else {
                BigInt::zero()
            };
            return SVInt::new(width, signed, v);
        }
        let modulus = BigInt::one() << width as usize;
        let v = wrap(base, width).modpow(&exp, &modulus);
        SVInt::new(width, signed, v)
    }

    /// Arithmetic negation.
    pub fn neg(&self) -> SVInt {
        if self.has_unknown() {
            return SVInt::all_x(self.width, self.signed);
        }
        SVInt::new(self.width, self.signed, -self.as_arith())
    }

    // Per-bit decompositions used by the logic operations. A bit is "known
    // one" or "known zero" only if its unknown-plane bit is clear.
    fn known_ones(&self) -> BigInt {
        &self.value & (mask(self.width) ^ self.unknown_plane())
    }

    fn known_zeros(&self) -> BigInt {
        mask(self.width) ^ (&self.value | self.unknown_plane())
    }

    /// Bitwise NOT. Unknown bits produce X.
    pub fn bit_not(&self) -> SVInt {
        let unk = self.unknown_plane();
        let value = (&self.value ^ mask(self.width)) & (mask(self.width) ^ &unk);
        SVInt::with_planes(self.width, self.signed, value, unk)
    }

    /// Bitwise AND. A known zero dominates an unknown bit.
    pub fn bit_and(&self, other: &SVInt) -> SVInt {
        let (a, b, width, signed) = SVInt::promote(self, other);
        let ones = a.known_ones() & b.known_ones();
        let zeros = a.known_zeros() | b.known_zeros();
        let unk = mask(width) ^ (&ones | zeros);
        SVInt::with_planes(width, signed, ones, unk)
    }

    /// Bitwise OR. A known one dominates an unknown bit.
    pub fn bit_or(&self, other: &SVInt) -> SVInt {
        let (a, b, width, signed) = SVInt::promote(self, other);
        let ones = a.known_ones() | b.known_ones();
        let zeros = a.known_zeros() & b.known_zeros();
        let unk = mask(width) ^ (&ones | zeros);
        SVInt::with_planes(width, signed, ones, unk)
    }

    /// Bitwise XOR. Any unknown bit makes the result bit X.
    pub fn bit_xor(&self, other: &SVInt) -> SVInt {
        let (a, b, width, signed) = SVInt::promote(self, other);
        let unk = a.unknown_plane() | b.unknown_plane();
        let value = (&a.value ^ &b.value) & (mask(width) ^ &unk);
        SVInt::with_planes(width, signed, value, unk)
    }

    /// Reduction AND over all bits.
    pub fn reduce_and(&self) -> Logic {
        if !self.known_zeros().is_zero() {
            Logic::Zero
        } else if self.has_unknown() {
            Logic::X
        } else {
            Logic::One
        }
    }

    /// Reduction OR over all bits.
    pub fn reduce_or(&self) -> Logic {
        if !self.known_ones().is_zero() {
            Logic::One
        } else if self.has_unknown() {
            Logic::X
        } else {
            Logic::Zero
        }
    }

    /// Reduction XOR over all bits.
    pub fn reduce_xor(&self) -> Logic {
        if self.has_unknown() {
            return Logic::X;
        }
        let mut parity = false;
        for byte in self.value.to_bytes_le().1 {
            parity ^= byte.count_ones() % 2 == 1;
        }
        Logic::from_bool(parity)
    }

    /// The truth value of this integer: the reduction OR.
    pub fn to_logic(&self) -> Logic {
        self.reduce_or()
    }

    /// Shift left by `amount` bits. An unknown amount poisons the result.
    pub fn shl(&self, amount: &SVInt) -> SVInt {
        let n = match self.shift_amount(amount) {
            Ok(n) => n,
            Err(poisoned) => return poisoned,
        };
        match n {
            Some(n) if n < self.width as usize => SVInt::with_planes(
                self.width,
                self.signed,
                &self.value << n,
                self.unknown_plane() << n,
            ),
            _ => SVInt::zero(self.width).as_signedness(self.signed),
        }
    }

    /// Logical shift right by `amount` bits, filling with zeros.
    pub fn lshr(&self, amount: &SVInt) -> SVInt {
        let n = match self.shift_amount(amount) {
            Ok(n) => n,
            Err(poisoned) => return poisoned,
        };
        match n {
            Some(n) if n < self.width as usize => SVInt::with_planes(
                self.width,
                self.signed,
                &self.value >> n,
                self.unknown_plane() >> n,
            ),
            _ => SVInt::zero(self.width).as_signedness(self.signed),
        }
    }

    /// Arithmetic shift right by `amount` bits, filling with the sign bit if
    /// the value is signed.
    pub fn ashr(&self, amount: &SVInt) -> SVInt {
        if !self.signed {
            return self.lshr(amount);
        }
        let n = match self.shift_amount(amount) {
            Ok(n) => n,
            Err(poisoned) => return poisoned,
        };
        let n = n
            .map(|n| n.min(self.width as usize))
            .unwrap_or(self.width as usize);
        let msb = self.get_bit(self.width - 1);
        let shifted = SVInt::with_planes(
            self.width,
            self.signed,
            &self.value >> n,
            self.unknown_plane() >> n,
        );
        let kept = self.width - n as u32;
        if kept == 0 {
            return SVInt::filled(self.width, msb).as_signedness(self.signed);
        }
        shifted.resize(self.width).extend_fill(kept, msb)
    }

    fn extend_fill(&self, from: u32, digit: Logic) -> SVInt {
        let fill = mask(self.width) ^ mask(from);
        let (vfill, ufill) = match digit {
            Logic::Zero => (BigInt::zero(), BigInt::zero()),
            Logic::One => (fill.clone(), BigInt::zero()),
            Logic::X => (BigInt::zero(), fill.clone()),
            Logic::Z => (fill.clone(), fill.clone()),
        };
        SVInt::with_planes(
            self.width,
            self.signed,
            (&self.value & mask(from)) | vfill,
            (self.unknown_plane() & mask(from)) | ufill,
        )
    }

    fn shift_amount(&self, amount: &SVInt) -> Result<Option<usize>, SVInt> {
        if self.has_unknown() || amount.has_unknown() {
            return Err(SVInt::all_x(self.width, self.signed));
        }
        Ok(amount.value.to_usize())
    }

    /// Logical equality. Returns X if either operand has unknown bits.
    pub fn logic_eq(&self, other: &SVInt) -> Logic {
        let (a, b, _, _) = SVInt::promote(self, other);
        if a.has_unknown() || b.has_unknown() {
            return Logic::X;
        }
        Logic::from_bool(a.value == b.value)
    }

    /// Logical inequality. Returns X if either operand has unknown bits.
    pub fn logic_neq(&self, other: &SVInt) -> Logic {
        match self.logic_eq(other) {
            Logic::Zero => Logic::One,
            Logic::One => Logic::Zero,
            x => x,
        }
    }

    /// Case equality: bit-exact comparison including X and Z positions.
    pub fn case_eq(&self, other: &SVInt) -> bool {
        let (a, b, _, _) = SVInt::promote(self, other);
        a.value == b.value && a.unknown_plane() == b.unknown_plane()
    }

    /// Wildcard equality: X and Z positions in `other` are don't-care.
    /// Unknown bits of `self` outside the don't-care positions yield X.
    pub fn wildcard_eq(&self, other: &SVInt) -> Logic {
        let (a, b, width, _) = SVInt::promote(self, other);
        let care = mask(width) ^ b.unknown_plane();
        if !(a.unknown_plane() & &care).is_zero() {
            return Logic::X;
        }
        Logic::from_bool((&a.value & &care) == (&b.value & &care))
    }

    fn compare(&self, other: &SVInt) -> Option<std::cmp::Ordering> {
        let (a, b, _, _) = SVInt::promote(self, other);
        if a.has_unknown() || b.has_unknown() {
            return None;
        }
        Some(a.as_arith().cmp(&b.as_arith()))
    }

    pub fn lt(&self, other: &SVInt) -> Logic {
        match self.compare(other) {
            Some(ord) => Logic::from_bool(ord == std::cmp::Ordering::Less),
            None => Logic::X,
        }
    }

    pub fn le(&self, other: &SVInt) -> Logic {
        match self.compare(other) {
            Some(ord) => Logic::from_bool(ord != std::cmp::Ordering::Greater),
            None => Logic::X,
        }
    }

    pub fn gt(&self, other: &SVInt) -> Logic {
        other.lt(self)
    }

    pub fn ge(&self, other: &SVInt) -> Logic {
        other.le(self)
    }

    /// Extract `width` bits starting at bit `lsb`. Bits beyond the end of
    /// the value read as X.
    pub fn extract(&self, lsb: u32, width: u32) -> SVInt {
        let mut value = BigInt::zero();
        let mut unknown = BigInt::zero();
        for i in 0..width {
            match self.get_bit(lsb + i) {
                Logic::Zero => (),
                Logic::One => value |= BigInt::one() << i as usize,
                Logic::X => unknown |= BigInt::one() << i as usize,
                Logic::Z => {
                    value |= BigInt::one() << i as usize;
                    unknown |= BigInt::one() << i as usize;
                }
            }
        }
        SVInt::with_planes(width, false, value, unknown)
    }

    /// Concatenate values, with the first operand ending up in the most
    /// significant position.
    pub fn concat<'a, I>(parts: I) -> SVInt
    where
        I: IntoIterator<Item = &'a SVInt>,
    {
        let mut width = 0u32;
        let mut value = BigInt::zero();
        let mut unknown = BigInt::zero();
        for part in parts {
            width += part.width;
            value = (value << part.width as usize) | &part.value;
            unknown = (unknown << part.width as usize) | part.unknown_plane();
        }
        assert!(width >= 1, "empty concatenation");
        SVInt::with_planes(width, false, value, unknown)
    }

    /// Replicate this value `count` times.
    pub fn replicate(&self, count: u32) -> SVInt {
        assert!(count >= 1, "empty replication");
        SVInt::concat(std::iter::repeat(self).take(count as usize))
    }

    /// Merge two alternatives of a conditional whose selector is unknown:
    /// bits on which both sides agree keep their value, all others become X.
    pub fn merge_conditional(&self, other: &SVInt) -> SVInt {
        let (a, b, width, signed) = SVInt::promote(self, other);
        let diff = (&a.value ^ &b.value) | a.unknown_plane() | b.unknown_plane();
        let value = &a.value & (mask(width) ^ &diff);
        SVInt::with_planes(width, signed, value, diff)
    }

    /// Convert to `u32`. Fails if the value has unknown bits or does not fit.
    pub fn to_u32(&self) -> Option<u32> {
        self.get_value()?.to_u32()
    }

    /// Convert to `i32`. Fails if the value has unknown bits or does not fit.
    pub fn to_i32(&self) -> Option<i32> {
        self.get_value()?.to_i32()
    }

    /// Convert to `usize`. Fails if the value has unknown bits or does not
    /// fit.
    pub fn to_usize(&self) -> Option<usize> {
        self.get_value()?.to_usize()
    }
}

impl fmt::Display for SVInt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = if self.signed { "s" } else { "" };
        if self.has_unknown() {
            write!(f, "{}'{}b", self.width, s)?;
            for i in (0..self.width).rev() {
                write!(f, "{}", self.get_bit(i))?;
            }
            Ok(())
        } else {
            write!(f, "{}'{}d{}", self.width, s, self.as_arith())
        }
    }
}

impl fmt::Debug for SVInt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SVInt({})", self)
    }
}

/// The numeric base of an integer literal.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LiteralBase {
    Binary,
    Octal,
    Decimal,
    Hex,
}

impl LiteralBase {
    /// Interpret a base character as used in based literals (`'b`, `'o`,
    /// `'d`, `'h`).
    pub fn from_char(c: char) -> Option<LiteralBase> {
        match c {
            'b' | 'B' => Some(LiteralBase::Binary),
            'o' | 'O' => Some(LiteralBase::Octal),
            'd' | 'D' => Some(LiteralBase::Decimal),
            'h' | 'H' => Some(LiteralBase::Hex),
            _ => None,
        }
    }

    fn bits_per_digit(self) -> u32 {
        match self {
            LiteralBase::Binary => 1,
            LiteralBase::Octal => 3,
            LiteralBase::Hex => 4,
            LiteralBase::Decimal => 0,
        }
    }

    fn digit_value(self, c: char) -> Option<u32> {
        let radix = match self {
            LiteralBase::Binary => 2,
            LiteralBase::Octal => 8,
            LiteralBase::Decimal => 10,
            LiteralBase::Hex => 16,
        };
        c.to_digit(radix)
    }
}

/// Assembles an [`SVInt`] from a stream of literal digits. The parser feeds
/// the digit tokens following an `IntegerBase` token into this builder one
/// character at a time and finishes with the optional size prefix.
pub struct SVIntBuilder {
    base: LiteralBase,
    signed: bool,
    value: BigInt,
    unknown: BigInt,
    bits: u32,
    digits: u32,
    first_digit: Option<Logic>,
    decimal_xz: Option<Logic>,
}

impl SVIntBuilder {
    pub fn new(base: LiteralBase, signed: bool) -> SVIntBuilder {
        SVIntBuilder {
            base,
            signed,
            value: BigInt::zero(),
            unknown: BigInt::zero(),
            bits: 0,
            digits: 0,
            first_digit: None,
            decimal_xz: None,
        }
    }

    /// Feed one digit character. Underscores must be filtered out by the
    /// caller. Returns `Err` for characters that are not valid digits in the
    /// builder's base, and for X/Z digits in decimal literals that are not
    /// the sole digit.
    pub fn push_digit(&mut self, c: char) -> Result<(), ()> {
        if self.base == LiteralBase::Decimal {
            if let Some(logic) = Logic::from_char(c) {
                if logic.is_unknown() {
                    // A decimal X or Z covers all bits and must stand alone.
                    if self.digits != 0 {
                        return Err(());
                    }
                    self.decimal_xz = Some(logic);
                    self.digits = 1;
                    return Ok(());
                }
            }
            if self.decimal_xz.is_some() {
                return Err(());
            }
            let d = self.base.digit_value(c).ok_or(())?;
            self.value = &self.value * 10 + d;
            self.digits += 1;
            return Ok(());
        }

        let bits = self.base.bits_per_digit();
        if let Some(logic) = Logic::from_char(c) {
            if logic.is_unknown() {
                let digit_mask = mask(bits);
                self.value = (&self.value << bits as usize)
                    | if logic == Logic::Z {
                        digit_mask.clone()
                    } else {
                        BigInt::zero()
                    };
                self.unknown = (&self.unknown << bits as usize) | digit_mask;
                self.note_digit(logic);
                return Ok(());
            }
        }
        let d = self.base.digit_value(c).ok_or(())?;
        self.value = (&self.value << bits as usize) | BigInt::from(d);
        self.unknown = &self.unknown << bits as usize;
        self.note_digit(Logic::Zero);
        Ok(())
    }

    fn note_digit(&mut self, kind: Logic) {
        if self.first_digit.is_none() {
            self.first_digit = Some(kind);
        }
        self.bits += self.base.bits_per_digit();
        self.digits += 1;
    }

    /// Whether any digits have been fed yet.
    pub fn is_empty(&self) -> bool {
        self.digits == 0
    }

    /// The number of bits needed to represent the accumulated digits.
    pub fn significant_bits(&self) -> u32 {
        match self.base {
            LiteralBase::Decimal => (self.value.bits() as u32).max(1),
            _ => self.bits.max(1),
        }
    }

    /// Assemble the final value. Without an explicit size the literal is at
    /// least 32 bits wide; with one it is truncated or extended to the given
    /// size. Leading X/Z digits extend as X/Z.
    pub fn finish(&self, size: Option<u32>) -> SVInt {
        if let Some(logic) = self.decimal_xz {
            let width = size.unwrap_or(32).max(1);
            return SVInt::filled(width, logic).as_signedness(self.signed);
        }
        let natural = self.significant_bits();
        let width = size.unwrap_or_else(|| natural.max(32)).max(1);
        let raw = SVInt::with_planes(
            natural,
            self.signed,
            self.value.clone(),
            self.unknown.clone(),
        );
        let extended = match self.first_digit {
            Some(digit) if digit.is_unknown() => raw.extend_with(width, digit),
            _ => raw.extend_with(width, Logic::Zero),
        };
        extended.resize(width).as_signedness(self.signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sv(width: u32, signed: bool, value: i64) -> SVInt {
        SVInt::new(width, signed, value.into())
    }

    #[test]
    fn arithmetic_wraps_at_width() {
        let a = sv(8, false, 200);
        let b = sv(8, false, 100);
        assert_eq!(a.add(&b), sv(8, false, 44));
        assert_eq!(a.mul(&b), sv(8, false, 32));
    }

    #[test]
    fn signed_division_truncates_toward_zero() {
        let a = sv(32, true, -7);
        let b = sv(32, true, 2);
        assert_eq!(a.div(&b).to_i32(), Some(-3));
        assert_eq!(a.rem(&b).to_i32(), Some(-1));
    }

    #[test]
    fn mixed_signedness_is_unsigned() {
        let a = sv(8, true, -1);
        let b = sv(8, false, 1);
        // -1 becomes 255 in the unsigned interpretation.
        assert_eq!(a.add(&b), sv(8, false, 0));
        assert_eq!(a.gt(&b), Logic::One);
    }

    #[test]
    fn width_promotion() {
        let a = sv(4, false, 15);
        let b = sv(8, false, 1);
        let r = a.add(&b);
        assert_eq!(r.width(), 8);
        assert_eq!(r.to_u32(), Some(16));
    }

    #[test]
    fn unknown_poisons_arithmetic() {
        let a = SVInt::all_x(8, false);
        let b = sv(8, false, 1);
        let r = a.add(&b);
        assert!(r.has_unknown());
        assert_eq!(r, SVInt::all_x(8, false));
    }

    #[test]
    fn division_by_zero_is_all_x() {
        let a = sv(8, false, 42);
        let b = sv(8, false, 0);
        assert_eq!(a.div(&b), SVInt::all_x(8, false));
        assert_eq!(a.rem(&b), SVInt::all_x(8, false));
    }

    #[test]
    fn power_operator() {
        assert_eq!(sv(32, true, 2).pow(&sv(32, true, 10)).to_i32(), Some(1024));
        assert_eq!(sv(32, true, 2).pow(&sv(32, true, -1)).to_i32(), Some(0));
        assert_eq!(sv(32, true, -1).pow(&sv(32, true, -3)).to_i32(), Some(-1));
        assert!(sv(32, true, 0).pow(&sv(32, true, -1)).has_unknown());
    }

    #[test]
    fn bitwise_known_bits_dominate() {
        let x = SVInt::all_x(4, false);
        let zeros = sv(4, false, 0);
        let ones = sv(4, false, 15);
        assert_eq!(x.bit_and(&zeros), zeros);
        assert_eq!(x.bit_or(&ones), ones);
        assert!(x.bit_xor(&ones).has_unknown());
    }

    #[test]
    fn equality_with_unknown_is_x() {
        let a = sv(4, false, 5);
        let b = SVInt::with_planes(4, false, 5.into(), 1.into());
        assert_eq!(a.logic_eq(&a), Logic::One);
        assert_eq!(a.logic_eq(&b), Logic::X);
        assert_eq!(a.logic_neq(&b), Logic::X);
    }

    #[test]
    fn case_equality_is_bit_exact() {
        let a = SVInt::with_planes(4, false, 0b0101.into(), 0b0100.into());
        let b = SVInt::with_planes(4, false, 0b0101.into(), 0b0100.into());
        let c = SVInt::with_planes(4, false, 0b0001.into(), 0b0100.into());
        assert!(a.case_eq(&b));
        // Same value plane reading, but X in place of Z.
        assert!(!a.case_eq(&c));
        assert_eq!(a.logic_eq(&b), Logic::X);
    }

    #[test]
    fn wildcard_equality() {
        // 4'b10?? matches anything in the low two bits.
        let pattern = SVInt::with_planes(4, false, 0b1011.into(), 0b0011.into());
        assert_eq!(sv(4, false, 0b1000).wildcard_eq(&pattern), Logic::One);
        assert_eq!(sv(4, false, 0b1011).wildcard_eq(&pattern), Logic::One);
        assert_eq!(sv(4, false, 0b0011).wildcard_eq(&pattern), Logic::Zero);
        let lhs_unknown = SVInt::with_planes(4, false, 0b1000.into(), 0b1000.into());
        assert_eq!(lhs_unknown.wildcard_eq(&pattern), Logic::X);
    }

    #[test]
    fn shifts() {
        let a = sv(8, false, 0b0110);
        assert_eq!(a.shl(&sv(8, false, 2)).to_u32(), Some(0b011000));
        assert_eq!(a.lshr(&sv(8, false, 1)).to_u32(), Some(0b0011));
        assert_eq!(a.shl(&sv(8, false, 200)).to_u32(), Some(0));
        let neg = sv(8, true, -4);
        assert_eq!(neg.ashr(&sv(8, false, 1)).to_i32(), Some(-2));
        assert!(a.shl(&SVInt::all_x(8, false)).has_unknown());
    }

    #[test]
    fn slicing_and_concatenation() {
        let a = sv(8, false, 0b1011_0110);
        assert_eq!(a.extract(4, 4).to_u32(), Some(0b1011));
        assert_eq!(a.extract(6, 4).get_bit(3), Logic::X);
        let c = SVInt::concat(&[sv(4, false, 0xA), sv(4, false, 0x5)]);
        assert_eq!(c.width(), 8);
        assert_eq!(c.to_u32(), Some(0xA5));
        let r = sv(2, false, 0b10).replicate(3);
        assert_eq!(r.width(), 6);
        assert_eq!(r.to_u32(), Some(0b101010));
    }

    #[test]
    fn reductions() {
        assert_eq!(sv(4, false, 0b1111).reduce_and(), Logic::One);
        assert_eq!(sv(4, false, 0b1101).reduce_and(), Logic::Zero);
        assert_eq!(sv(4, false, 0).reduce_or(), Logic::Zero);
        assert_eq!(sv(4, false, 0b0110).reduce_xor(), Logic::Zero);
        assert_eq!(sv(4, false, 0b0111).reduce_xor(), Logic::One);
        assert_eq!(SVInt::all_x(4, false).reduce_or(), Logic::X);
        // A known one wins over the unknown bits.
        let partial = SVInt::with_planes(4, false, 0b1001.into(), 0b1000.into());
        assert_eq!(partial.reduce_or(), Logic::One);
    }

    #[test]
    fn casts() {
        assert_eq!(sv(32, true, -5).to_i32(), Some(-5));
        assert_eq!(sv(32, true, -5).to_u32(), None);
        assert_eq!(sv(64, false, 1 << 40).to_u32(), None);
        assert_eq!(SVInt::all_x(32, false).to_u32(), None);
    }

    #[test]
    fn resize_extension() {
        assert_eq!(sv(4, true, -2).resize(8).to_i32(), Some(-2));
        assert_eq!(sv(4, false, 0b1110).resize(8).to_u32(), Some(0b1110));
        let x_msb = SVInt::with_planes(4, true, 0.into(), 0b1000.into());
        assert_eq!(x_msb.resize(8).get_bit(7), Logic::X);
    }

    #[test]
    fn builder_based_literals() {
        // 'h837FF
        let mut b = SVIntBuilder::new(LiteralBase::Hex, false);
        for c in "837FF".chars() {
            b.push_digit(c).unwrap();
        }
        let v = b.finish(None);
        assert_eq!(v.width(), 32);
        assert_eq!(v.to_u32(), Some(0x837FF));

        // 3'b01x
        let mut b = SVIntBuilder::new(LiteralBase::Binary, false);
        for c in "01x".chars() {
            b.push_digit(c).unwrap();
        }
        let v = b.finish(Some(3));
        assert_eq!(v.get_bit(0), Logic::X);
        assert_eq!(v.get_bit(1), Logic::One);
        assert_eq!(v.get_bit(2), Logic::Zero);

        // 16'hz extends the leading Z through all 16 bits.
        let mut b = SVIntBuilder::new(LiteralBase::Hex, false);
        b.push_digit('z').unwrap();
        let v = b.finish(Some(16));
        assert_eq!(v, SVInt::all_z(16, false));

        // 4'shf is signed -1.
        let mut b = SVIntBuilder::new(LiteralBase::Hex, true);
        b.push_digit('f').unwrap();
        let v = b.finish(Some(4));
        assert_eq!(v.to_i32(), Some(-1));
    }

    #[test]
    fn builder_decimal() {
        let mut b = SVIntBuilder::new(LiteralBase::Decimal, false);
        for c in "659".chars() {
            b.push_digit(c).unwrap();
        }
        let v = b.finish(None);
        assert_eq!(v.width(), 32);
        assert_eq!(v.to_u32(), Some(659));

        // 16'sd? is all-Z.
        let mut b = SVIntBuilder::new(LiteralBase::Decimal, true);
        b.push_digit('?').unwrap();
        assert_eq!(b.finish(Some(16)), SVInt::all_z(16, true));

        // X must be the only decimal digit.
        let mut b = SVIntBuilder::new(LiteralBase::Decimal, false);
        b.push_digit('1').unwrap();
        assert!(b.push_digit('x').is_err());
    }

    #[test]
    fn conditional_merge() {
        let a = sv(4, false, 0b1010);
        let b = sv(4, false, 0b1001);
        let m = a.merge_conditional(&b);
        assert_eq!(m.get_bit(3), Logic::One);
        assert_eq!(m.get_bit(2), Logic::Zero);
        assert_eq!(m.get_bit(1), Logic::X);
        assert_eq!(m.get_bit(0), Logic::X);
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", sv(32, true, 3)), "32'sd3");
        assert_eq!(format!("{}", SVInt::all_x(2, false)), "2'bxx");
    }
}
