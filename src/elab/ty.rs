// Copyright (c) 2024-2026 The shannon developers

//! The elaborated SystemVerilog type system.
//!
//! Types are interned: a [`Type`] is a reference into the compilation's
//! arena, and two structurally equal types are the same reference. This
//! makes the identity comparison the canonical-type comparison, with the
//! relation predicates below layered on top for the looser notions the
//! language defines.

use shannon_common::name::Name;
use shannon_common::svint::SVInt;

/// A type, interned in the compilation's arena. Compare with `matching` and
/// friends, or by identity for canonical types.
pub type Type<'t> = &'t TypeKind<'t>;

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeKind<'t> {
    /// The error type, produced by failed bindings. Swallows all further
    /// complaints.
    Error,
    Void,
    Null,
    CHandle,
    Event,
    String,
    /// A single-bit integer vector type: `bit`, `logic`, or `reg`.
    Scalar { kind: ScalarKind, signed: bool },
    /// A packed array of a scalar or packed element, `elem [msb:lsb]`.
    PackedArray { elem: Type<'t>, range: Range },
    /// One of the predefined multi-bit integer types.
    PredefInt { kind: PredefInt, signed: bool },
    /// A floating point type.
    Floating(FloatingKind),
    /// A struct or union with ordered fields.
    Struct(StructType<'t>),
    /// An enumeration.
    Enum(EnumType<'t>),
    /// A typedef name wrapping its target type.
    Alias { name: Name, target: Type<'t> },
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ScalarKind {
    Bit,
    Logic,
    Reg,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PredefInt {
    Byte,
    ShortInt,
    Int,
    LongInt,
    Integer,
    Time,
}

impl PredefInt {
    pub fn width(self) -> u32 {
        match self {
            PredefInt::Byte => 8,
            PredefInt::ShortInt => 16,
            PredefInt::Int => 32,
            PredefInt::LongInt => 64,
            PredefInt::Integer => 32,
            PredefInt::Time => 64,
        }
    }

    /// Whether the type carries X/Z bits.
    pub fn four_state(self) -> bool {
        matches!(self, PredefInt::Integer | PredefInt::Time)
    }

    /// The signedness when no explicit signing is given.
    pub fn default_signed(self) -> bool {
        !matches!(self, PredefInt::Time)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FloatingKind {
    ShortReal,
    Real,
    RealTime,
}

impl FloatingKind {
    pub fn bits(self) -> u32 {
        match self {
            FloatingKind::ShortReal => 32,
            FloatingKind::Real | FloatingKind::RealTime => 64,
        }
    }
}

/// A packed dimension, kept as the user wrote it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Range {
    pub msb: i32,
    pub lsb: i32,
}

impl Range {
    pub fn width(&self) -> u32 {
        (self.msb - self.lsb).abs() as u32 + 1
    }

    /// Whether the range counts down toward the LSB, e.g. `[7:0]`.
    pub fn is_descending(&self) -> bool {
        self.msb >= self.lsb
    }

    pub fn left(&self) -> i32 {
        self.msb
    }

    pub fn right(&self) -> i32 {
        self.lsb
    }

    pub fn low(&self) -> i32 {
        self.msb.min(self.lsb)
    }

    pub fn high(&self) -> i32 {
        self.msb.max(self.lsb)
    }

    /// The value `$increment` reports: 1 for descending ranges, -1
    /// otherwise.
    pub fn increment(&self) -> i32 {
        if self.is_descending() {
            1
        } else {
            -1
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum StructKind {
    Struct,
    Union,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct StructType<'t> {
    pub kind: StructKind,
    pub packed: bool,
    pub fields: Vec<StructField<'t>>,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct StructField<'t> {
    pub name: Name,
    pub ty: Type<'t>,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct EnumType<'t> {
    pub base: Type<'t>,
    pub variants: Vec<(Name, SVInt)>,
}

impl<'t> TypeKind<'t> {
    /// Strip typedef aliases down to the canonical type.
    pub fn resolve(&self) -> &TypeKind<'t> {
        match self {
            TypeKind::Alias { target, .. } => target.resolve(),
            other => other,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.resolve(), TypeKind::Error)
    }

    /// Whether this is a packed integral type: scalars, packed arrays,
    /// predefined integers, packed structs, and enums.
    pub fn is_integral(&self) -> bool {
        match self.resolve() {
            TypeKind::Scalar { .. }
            | TypeKind::PackedArray { .. }
            | TypeKind::PredefInt { .. }
            | TypeKind::Enum(_) => true,
            TypeKind::Struct(s) => s.packed,
            _ => false,
        }
    }

    pub fn is_floating(&self) -> bool {
        matches!(self.resolve(), TypeKind::Floating(_))
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_floating()
    }

    pub fn is_string(&self) -> bool {
        matches!(self.resolve(), TypeKind::String)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.resolve(), TypeKind::Scalar { .. })
    }

    /// The bit width of a packed type. Zero for everything else.
    pub fn width(&self) -> u32 {
        match self.resolve() {
            TypeKind::Scalar { .. } => 1,
            TypeKind::PackedArray { elem, range } => elem.width() * range.width(),
            TypeKind::PredefInt { kind, .. } => kind.width(),
            TypeKind::Floating(kind) => kind.bits(),
            TypeKind::Enum(e) => e.base.width(),
            TypeKind::Struct(s) if s.packed => s.fields.iter().map(|f| f.ty.width()).sum(),
            _ => 0,
        }
    }

    pub fn is_signed(&self) -> bool {
        match self.resolve() {
            TypeKind::Scalar { signed, .. } => *signed,
            TypeKind::PackedArray { elem, .. } => elem.is_signed(),
            TypeKind::PredefInt { signed, .. } => *signed,
            TypeKind::Floating(_) => true,
            TypeKind::Enum(e) => e.base.is_signed(),
            _ => false,
        }
    }

    /// Whether the type's bits can carry X and Z.
    pub fn is_four_state(&self) -> bool {
        match self.resolve() {
            TypeKind::Scalar { kind, .. } => !matches!(kind, ScalarKind::Bit),
            TypeKind::PackedArray { elem, .. } => elem.is_four_state(),
            TypeKind::PredefInt { kind, .. } => kind.four_state(),
            TypeKind::Enum(e) => e.base.is_four_state(),
            TypeKind::Struct(s) if s.packed => s.fields.iter().any(|f| f.ty.is_four_state()),
            _ => false,
        }
    }

    /// The packed dimension of this type, if it has one. Predefined integer
    /// types report their implicit `[w-1:0]` range.
    pub fn get_range(&self) -> Option<Range> {
        match self.resolve() {
            TypeKind::Scalar { .. } => Some(Range { msb: 0, lsb: 0 }),
            TypeKind::PackedArray { range, .. } => Some(*range),
            TypeKind::PredefInt { kind, .. } => Some(Range {
                msb: kind.width() as i32 - 1,
                lsb: 0,
            }),
            TypeKind::Enum(e) => e.base.get_range(),
            _ => None,
        }
    }

    /// The element type of a packed array select; scalars cannot be
    /// indexed further.
    pub fn element_type(&self) -> Option<Type<'t>> {
        match self.resolve() {
            TypeKind::PackedArray { elem, .. } => Some(*elem),
            _ => None,
        }
    }

    /// The fields of a struct or union, if this is one.
    pub fn struct_fields(&self) -> Option<&[StructField<'t>]> {
        match self.resolve() {
            TypeKind::Struct(s) => Some(&s.fields),
            _ => None,
        }
    }
}

impl<'t> std::fmt::Display for TypeKind<'t> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TypeKind::Error => write!(f, "<error>"),
            TypeKind::Void => write!(f, "void"),
            TypeKind::Null => write!(f, "null"),
            TypeKind::CHandle => write!(f, "chandle"),
            TypeKind::Event => write!(f, "event"),
            TypeKind::String => write!(f, "string"),
            TypeKind::Scalar { kind, signed } => {
                let name = match kind {
                    ScalarKind::Bit => "bit",
                    ScalarKind::Logic => "logic",
                    ScalarKind::Reg => "reg",
                };
                if *signed {
                    write!(f, "{} signed", name)
                } else {
                    write!(f, "{}", name)
                }
            }
            TypeKind::PackedArray { elem, range } => {
                write!(f, "{} [{}:{}]", elem, range.msb, range.lsb)
            }
            TypeKind::PredefInt { kind, signed } => {
                let name = match kind {
                    PredefInt::Byte => "byte",
                    PredefInt::ShortInt => "shortint",
                    PredefInt::Int => "int",
                    PredefInt::LongInt => "longint",
                    PredefInt::Integer => "integer",
                    PredefInt::Time => "time",
                };
                if *signed != kind.default_signed() {
                    write!(
                        f,
                        "{} {}",
                        name,
                        if *signed { "signed" } else { "unsigned" }
                    )
                } else {
                    write!(f, "{}", name)
                }
            }
            TypeKind::Floating(kind) => match kind {
                FloatingKind::ShortReal => write!(f, "shortreal"),
                FloatingKind::Real => write!(f, "real"),
                FloatingKind::RealTime => write!(f, "realtime"),
            },
            TypeKind::Struct(s) => match s.kind {
                StructKind::Struct => write!(f, "struct"),
                StructKind::Union => write!(f, "union"),
            },
            TypeKind::Enum(_) => write!(f, "enum"),
            TypeKind::Alias { name, .. } => write!(f, "{}", name),
        }
    }
}

/// Structural identity, including signedness, 4-statedness, and dimensions.
/// Because types are interned, this is reference identity after alias
/// stripping.
pub fn matching<'t>(a: Type<'t>, b: Type<'t>) -> bool {
    std::ptr::eq(a.resolve(), b.resolve())
}

/// Matching modulo aliases and packed-array dimension shape: the bit
/// pattern, value domain, and signedness are the same even if the
/// dimensions are sliced differently.
pub fn equivalent<'t>(a: Type<'t>, b: Type<'t>) -> bool {
    if a.is_error() || b.is_error() {
        return true;
    }
    if matching(a, b) {
        return true;
    }
    if a.is_integral() && b.is_integral() {
        return a.width() == b.width()
            && a.is_signed() == b.is_signed()
            && a.is_four_state() == b.is_four_state();
    }
    false
}

/// Whether a value of type `from` may be assigned to a target of type `to`
/// without an explicit cast.
pub fn assignment_compatible<'t>(to: Type<'t>, from: Type<'t>) -> bool {
    if to.is_error() || from.is_error() {
        return true;
    }
    if equivalent(to, from) {
        return true;
    }
    if to.is_numeric() && from.is_numeric() {
        return true;
    }
    // null assigns to handle types.
    if matches!(from.resolve(), TypeKind::Null) && matches!(to.resolve(), TypeKind::CHandle) {
        return true;
    }
    // A string assigns to a packed array of bytes (and vice versa for the
    // unpacking direction).
    if from.is_string() && to.is_integral() {
        return true;
    }
    false
}

/// The weakest relation: whether an explicit cast between the two types is
/// allowed at all.
pub fn cast_compatible<'t>(to: Type<'t>, from: Type<'t>) -> bool {
    if assignment_compatible(to, from) {
        return true;
    }
    if to.is_numeric() && from.is_string() {
        return true;
    }
    if to.is_string() && from.is_numeric() {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    static BIT: TypeKind = TypeKind::Scalar {
        kind: ScalarKind::Bit,
        signed: false,
    };
    static LOGIC: TypeKind = TypeKind::Scalar {
        kind: ScalarKind::Logic,
        signed: false,
    };
    static INT: TypeKind = TypeKind::PredefInt {
        kind: PredefInt::Int,
        signed: true,
    };
    static REAL: TypeKind = TypeKind::Floating(FloatingKind::Real);

    #[test]
    fn widths_and_domains() {
        assert_eq!(BIT.width(), 1);
        assert_eq!(INT.width(), 32);
        assert!(!BIT.is_four_state());
        assert!(LOGIC.is_four_state());
        assert!(INT.is_signed());
        assert!(INT.is_integral());
        assert!(REAL.is_floating());
        assert!(!REAL.is_integral());
    }

    #[test]
    fn packed_array_width() {
        let arr = TypeKind::PackedArray {
            elem: &LOGIC,
            range: Range { msb: 7, lsb: 0 },
        };
        assert_eq!(arr.width(), 8);
        assert!(arr.is_four_state());
        assert_eq!(arr.get_range(), Some(Range { msb: 7, lsb: 0 }));
        assert_eq!(arr.element_type().map(|t| t.width()), Some(1));
    }

    #[test]
    fn alias_resolution() {
        let alias = TypeKind::Alias {
            name: shannon_common::name::get_name_table().intern("word_t"),
            target: &INT,
        };
        assert!(matching(&alias, &INT));
        assert_eq!(alias.width(), 32);
        assert!(alias.is_signed());
    }

    #[test]
    fn equivalence_ignores_dimension_shape() {
        let a = TypeKind::PackedArray {
            elem: &LOGIC,
            range: Range { msb: 31, lsb: 0 },
        };
        let b = TypeKind::PackedArray {
            elem: &LOGIC,
            range: Range { msb: 32, lsb: 1 },
        };
        assert!(!matching(&a, &b));
        assert!(equivalent(&a, &b));
        // Different widths are not equivalent.
        let c = TypeKind::PackedArray {
            elem: &LOGIC,
            range: Range { msb: 15, lsb: 0 },
        };
        assert!(!equivalent(&a, &c));
    }

    #[test]
    fn assignment_compatibility() {
        assert!(assignment_compatible(&INT, &REAL));
        assert!(assignment_compatible(&REAL, &INT));
        assert!(assignment_compatible(&INT, &TypeKind::String));
        assert!(!assignment_compatible(&TypeKind::Event, &INT));
        assert!(assignment_compatible(&TypeKind::CHandle, &TypeKind::Null));
        // Errors poison silently.
        assert!(assignment_compatible(&TypeKind::Error, &TypeKind::Event));
    }

    #[test]
    fn range_queries() {
        let r = Range { msb: 7, lsb: 0 };
        assert_eq!(r.left(), 7);
        assert_eq!(r.right(), 0);
        assert_eq!(r.low(), 0);
        assert_eq!(r.high(), 7);
        assert_eq!(r.increment(), 1);
        let up = Range { msb: 0, lsb: 7 };
        assert_eq!(up.increment(), -1);
        assert_eq!(up.width(), 8);
    }
}
