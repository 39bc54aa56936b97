//! Type construction, comparison, size/alignment, and castability (§4.3).
//!
//! `TypeRef` is shared, not arena-borrowed: the cyclic
//! `TypeRef -> TypeDefinition -> StructuralMember -> TypeRef` graph is
//! represented here as `Rc<RefCell<TypeDefinition>>` handles rather than
//! arena references, the same technique a lowering pass uses for its own
//! `Ty`/`Expr` types when it reaches for `Rc::new(TyKind::...)` over an
//! arena - a forward declaration's `TypeDefinition` is shared by every
//! `TypeDesc` that names it and is completed in place when the definition
//! is parsed.

mod layout;

pub use layout::{adjust_bitfield_storage, layout_struct_members, BitfieldChain, RawMember};

use bitflags::bitflags;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub const POINTER_SIZE: i64 = 8;
pub const UNKNOWN_SIZE: i64 = -1;
const BYTE_BIT_SIZE: u32 = 8;

bitflags! {
    /// Qualifier and storage-class flags carried on every `TypeRef` (§4.3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Qualifiers: u32 {
        const CONST    = 1 << 0;
        const VOLATILE = 1 << 1;
        const RESTRICT = 1 << 2;
        const STATIC   = 1 << 3;
        const EXTERN   = 1 << 4;
        const REGISTER = 1 << 5;
        const TYPEDEF  = 1 << 6;
        const INLINE   = 1 << 7;
        const AUTO     = 1 << 8;
    }
}

impl Qualifiers {
    #[must_use]
    pub fn without_storage_class(self) -> Self {
        self - (Qualifiers::STATIC
            | Qualifiers::EXTERN
            | Qualifiers::REGISTER
            | Qualifiers::TYPEDEF
            | Qualifiers::INLINE
            | Qualifiers::AUTO)
    }

    #[must_use]
    pub fn cv(self) -> Self {
        self & (Qualifiers::CONST | Qualifiers::VOLATILE | Qualifiers::RESTRICT)
    }
}

/// Primitive/aggregate type identity (§3 "TypeDesc").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeId {
    Void,
    Bool,
    S1,
    S2,
    S4,
    S8,
    U1,
    U2,
    U4,
    U8,
    F4,
    F8,
    F10,
    Struct,
    Union,
    Enum,
    Error,
}

impl TypeId {
    #[must_use]
    pub fn is_signed_integer(self) -> bool {
        matches!(self, TypeId::S1 | TypeId::S2 | TypeId::S4 | TypeId::S8)
    }
    #[must_use]
    pub fn is_unsigned_integer(self) -> bool {
        matches!(self, TypeId::U1 | TypeId::U2 | TypeId::U4 | TypeId::U8 | TypeId::Bool)
    }
    #[must_use]
    pub fn is_integer(self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }
    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, TypeId::F4 | TypeId::F8 | TypeId::F10)
    }
    #[must_use]
    pub fn is_arithmetic(self) -> bool {
        self.is_integer() || self.is_float()
    }
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            TypeId::Bool => 0,
            TypeId::S1 | TypeId::U1 => 1,
            TypeId::S2 | TypeId::U2 => 2,
            TypeId::S4 | TypeId::U4 => 3,
            TypeId::S8 | TypeId::U8 => 4,
            TypeId::F4 => 5,
            TypeId::F8 => 6,
            TypeId::F10 => 7,
            _ => 0xff,
        }
    }
    #[must_use]
    pub fn primitive_size(self) -> i64 {
        match self {
            TypeId::Void => 0,
            TypeId::Bool | TypeId::S1 | TypeId::U1 => 1,
            TypeId::S2 | TypeId::U2 => 2,
            TypeId::S4 | TypeId::U4 | TypeId::F4 => 4,
            TypeId::S8 | TypeId::U8 | TypeId::F8 => 8,
            TypeId::F10 => 10,
            TypeId::Struct | TypeId::Union | TypeId::Enum => UNKNOWN_SIZE,
            TypeId::Error => 0,
        }
    }
    #[must_use]
    pub fn to_unsigned(self) -> TypeId {
        match self {
            TypeId::S1 => TypeId::U1,
            TypeId::S2 => TypeId::U2,
            TypeId::S4 => TypeId::U4,
            TypeId::S8 => TypeId::U8,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Struct,
    Union,
    Enum,
}

#[derive(Debug, Clone)]
pub struct Enumerator {
    pub name: String,
    pub value: i64,
}

/// One member of a struct or union body (§3 "StructualMember").
///
/// `parent` is `Some(index)` into the owning [`TypeDefinition::members`]
/// when this member was promoted out of a directly-nested anonymous
/// struct/union member at that index, supporting the transparency rule in
/// §4.6 ("member lookup ... transitively into anonymous aggregate members").
#[derive(Debug, Clone)]
pub struct StructuralMember {
    pub name: String,
    pub ty: TypeRef,
    pub offset: i64,
    pub parent: Option<usize>,
    pub is_flexible: bool,
}

impl StructuralMember {
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }
}

/// A named struct/union/enum definition, shared via `Rc<RefCell<_>>` so a
/// forward declaration and its later definition are the same object.
#[derive(Debug, Clone)]
pub struct TypeDefinition {
    pub kind: AggregateKind,
    pub name: String,
    pub members: Vec<StructuralMember>,
    pub enumerators: Vec<Enumerator>,
    pub align: u32,
    pub size: i64,
    pub is_defined: bool,
    pub is_flexible: bool,
}

impl TypeDefinition {
    #[must_use]
    pub fn new_forward(kind: AggregateKind, name: String) -> Self {
        TypeDefinition {
            kind,
            name,
            members: Vec::new(),
            enumerators: Vec::new(),
            align: 1,
            size: UNKNOWN_SIZE,
            is_defined: false,
            is_flexible: false,
        }
    }

    #[must_use]
    pub fn find_member(&self, name: &str) -> Option<&StructuralMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

pub type TypeDefRef = Rc<RefCell<TypeDefinition>>;

/// `(type_id, name, size, definition?)` (§3 "TypeDesc").
#[derive(Debug, Clone)]
pub struct TypeDesc {
    pub type_id: TypeId,
    pub name: String,
    pub size: i64,
    pub definition: Option<TypeDefRef>,
}

impl PartialEq for TypeDesc {
    fn eq(&self, other: &Self) -> bool {
        match (&self.definition, &other.definition) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => self.type_id == other.type_id,
            _ => false,
        }
    }
}
impl Eq for TypeDesc {}

/// The tagged `TypeRef` variant (§3). Recursive occurrences are `Rc`-shared
/// rather than arena-borrowed (see module docs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Value(TypeDesc),
    Pointed(TypeRef),
    Array(TypeRef, i64),
    /// Runtime-sized array; the size is materialized to a hidden local
    /// (§4.6 "VLA size materialization") identified by this `VarId`.
    Vla(TypeRef, crate::symtab::VarId),
    Function(TypeRef, Vec<TypeRef>, bool),
    /// `(storage_type, bit_offset, width)`.
    Bitfield(TypeRef, u32, u32),
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TypeRefData {
    quals: Qualifiers,
    kind: TypeKind,
}

/// A fully-qualified type reference. Cheap to clone (`Rc` handle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef(Rc<TypeRefData>);

impl TypeRef {
    #[must_use]
    pub fn new(quals: Qualifiers, kind: TypeKind) -> Self {
        TypeRef(Rc::new(TypeRefData { quals, kind }))
    }
    #[must_use]
    pub fn quals(&self) -> Qualifiers {
        self.0.quals
    }
    #[must_use]
    pub fn kind(&self) -> &TypeKind {
        &self.0.kind
    }
    #[must_use]
    pub fn with_quals(&self, quals: Qualifiers) -> Self {
        TypeRef::new(quals, self.0.kind.clone())
    }
    #[must_use]
    pub fn is_const(&self) -> bool {
        self.quals().contains(Qualifiers::CONST)
    }
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.kind(), TypeKind::Error)
    }
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self.kind(), TypeKind::Value(d) if d.type_id == TypeId::Void)
    }
    #[must_use]
    pub fn is_integer(&self) -> bool {
        match self.kind() {
            TypeKind::Value(d) => d.type_id.is_integer() || d.type_id == TypeId::Enum,
            TypeKind::Bitfield(..) => true,
            _ => false,
        }
    }
    #[must_use]
    pub fn is_float(&self) -> bool {
        matches!(self.kind(), TypeKind::Value(d) if d.type_id.is_float())
    }
    #[must_use]
    pub fn is_arithmetic(&self) -> bool {
        self.is_integer() || self.is_float()
    }
    #[must_use]
    pub fn is_pointer(&self) -> bool {
        matches!(self.kind(), TypeKind::Pointed(_))
    }
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self.kind(), TypeKind::Array(..) | TypeKind::Vla(..))
    }
    #[must_use]
    pub fn is_function(&self) -> bool {
        matches!(self.kind(), TypeKind::Function(..))
    }
    #[must_use]
    pub fn is_vla(&self) -> bool {
        matches!(self.kind(), TypeKind::Vla(..))
    }
    #[must_use]
    pub fn is_struct_or_union(&self) -> bool {
        matches!(self.kind(), TypeKind::Value(d) if matches!(d.type_id, TypeId::Struct | TypeId::Union))
    }
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.is_arithmetic() || self.is_pointer()
    }
    #[must_use]
    pub fn definition(&self) -> Option<TypeDefRef> {
        match self.kind() {
            TypeKind::Value(d) => d.definition.clone(),
            _ => None,
        }
    }
    /// Pointee, array element, or function return type, for the variants
    /// that have one; `None` for scalars and `Error`.
    #[must_use]
    pub fn inner(&self) -> Option<&TypeRef> {
        match self.kind() {
            TypeKind::Pointed(t) | TypeKind::Array(t, _) | TypeKind::Vla(t, _) | TypeKind::Function(t, ..) => Some(t),
            TypeKind::Bitfield(t, ..) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        match self.kind() {
            TypeKind::Value(d) => match &d.definition {
                Some(def) => def.borrow().is_defined,
                None => d.type_id != TypeId::Void,
            },
            TypeKind::Array(_, size) => *size != UNKNOWN_SIZE,
            TypeKind::Vla(..) => true,
            TypeKind::Error => true,
            _ => true,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const() {
            write!(f, "const ")?;
        }
        match self.kind() {
            TypeKind::Value(d) => write!(f, "{}", d.name),
            TypeKind::Pointed(t) => write!(f, "*{t}"),
            TypeKind::Array(t, UNKNOWN_SIZE) => write!(f, "{t}[]"),
            TypeKind::Array(t, n) => write!(f, "{t}[{n}]"),
            TypeKind::Vla(t, _) => write!(f, "{t}[*]"),
            TypeKind::Function(ret, params, variadic) => {
                write!(f, "{{{ret} (")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                if *variadic {
                    if !params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ")}}")
            }
            TypeKind::Bitfield(t, offset, width) => write!(f, "{t}:{offset}:{width}"),
            TypeKind::Error => write!(f, "<error>"),
        }
    }
}

/// Type construction helpers (§4.3 constructors, §4.5 "makeTypeRef" family).
pub struct TypeFactory;

impl TypeFactory {
    #[must_use]
    pub fn primitive(id: TypeId, quals: Qualifiers) -> TypeRef {
        let name = match id {
            TypeId::Void => "void",
            TypeId::Bool => "bool",
            TypeId::S1 => "s1",
            TypeId::S2 => "s2",
            TypeId::S4 => "s4",
            TypeId::S8 => "s8",
            TypeId::U1 => "u1",
            TypeId::U2 => "u2",
            TypeId::U4 => "u4",
            TypeId::U8 => "u8",
            TypeId::F4 => "f4",
            TypeId::F8 => "f8",
            TypeId::F10 => "f10",
            TypeId::Error => "<error>",
            TypeId::Struct | TypeId::Union | TypeId::Enum => unreachable!("use `aggregate`"),
        };
        TypeRef::new(
            quals,
            TypeKind::Value(TypeDesc {
                type_id: id,
                name: name.to_string(),
                size: id.primitive_size(),
                definition: None,
            }),
        )
    }

    #[must_use]
    pub fn aggregate(def: TypeDefRef, quals: Qualifiers) -> TypeRef {
        let (type_id, name, size) = {
            let d = def.borrow();
            let type_id = match d.kind {
                AggregateKind::Struct => TypeId::Struct,
                AggregateKind::Union => TypeId::Union,
                AggregateKind::Enum => TypeId::Enum,
            };
            (type_id, d.name.clone(), d.size)
        };
        TypeRef::new(
            quals,
            TypeKind::Value(TypeDesc { type_id, name, size, definition: Some(def) }),
        )
    }

    #[must_use]
    pub fn pointed(pointee: TypeRef, quals: Qualifiers) -> TypeRef {
        TypeRef::new(quals, TypeKind::Pointed(pointee))
    }

    #[must_use]
    pub fn array(element: TypeRef, size: i64) -> TypeRef {
        TypeRef::new(Qualifiers::empty(), TypeKind::Array(element, size))
    }

    #[must_use]
    pub fn vla(element: TypeRef, size_symbol: crate::symtab::VarId) -> TypeRef {
        TypeRef::new(Qualifiers::empty(), TypeKind::Vla(element, size_symbol))
    }

    #[must_use]
    pub fn function(ret: TypeRef, params: Vec<TypeRef>, is_variadic: bool) -> TypeRef {
        TypeRef::new(Qualifiers::empty(), TypeKind::Function(ret, params, is_variadic))
    }

    #[must_use]
    pub fn bitfield(storage: TypeRef, bit_offset: u32, width: u32) -> TypeRef {
        TypeRef::new(Qualifiers::empty(), TypeKind::Bitfield(storage, bit_offset, width))
    }

    #[must_use]
    pub fn error() -> TypeRef {
        TypeRef::new(Qualifiers::empty(), TypeKind::Error)
    }
}

/// `computeTypeSize` (§4.3).
#[must_use]
pub fn compute_type_size(ty: &TypeRef) -> i64 {
    match ty.kind() {
        TypeKind::Value(d) => d.size,
        TypeKind::Pointed(_) | TypeKind::Function(..) => POINTER_SIZE,
        TypeKind::Array(elem, size) => {
            if *size == UNKNOWN_SIZE {
                UNKNOWN_SIZE
            } else {
                let elem_size = compute_type_size(elem);
                if elem_size == UNKNOWN_SIZE {
                    UNKNOWN_SIZE
                } else {
                    size * elem_size
                }
            }
        }
        TypeKind::Vla(..) => UNKNOWN_SIZE,
        TypeKind::Bitfield(storage, ..) => compute_type_size(storage),
        TypeKind::Error => 0,
    }
}

/// Natural alignment; aggregates take the max of member alignments
/// (minimum 1) (§4.3 "type_alignment").
#[must_use]
pub fn type_alignment(ty: &TypeRef) -> u32 {
    match ty.kind() {
        TypeKind::Value(d) => match &d.definition {
            Some(def) => def.borrow().align.max(1),
            None => (d.size.max(1) as u32).min(8),
        },
        TypeKind::Pointed(_) | TypeKind::Function(..) => POINTER_SIZE as u32,
        TypeKind::Array(elem, _) | TypeKind::Vla(elem, _) => type_alignment(elem),
        TypeKind::Bitfield(storage, ..) => type_alignment(storage),
        TypeKind::Error => 1,
    }
}

/// `align_member_offset(type, offset) = round_up(offset, align(type))`.
#[must_use]
pub fn align_member_offset(ty: &TypeRef, offset: i64) -> i64 {
    round_up(offset, i64::from(type_alignment(ty)))
}

#[must_use]
pub fn round_up(value: i64, align: i64) -> i64 {
    if align <= 1 {
        return value;
    }
    (value + align - 1) / align * align
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeEquality {
    Equal,
    AlmostEqual,
    NotExactlyEqual,
    NotEqual,
}

/// The four-level equality ladder (§4.3 "Equality").
#[must_use]
pub fn type_equality(a: &TypeRef, b: &TypeRef) -> TypeEquality {
    if a.is_error() || b.is_error() {
        return TypeEquality::Equal;
    }
    match (a.kind(), b.kind()) {
        (TypeKind::Value(da), TypeKind::Value(db)) => {
            if da.type_id == db.type_id && da == db {
                TypeEquality::Equal
            } else if da.type_id == TypeId::Enum && db.type_id.is_integer()
                || db.type_id == TypeId::Enum && da.type_id.is_integer()
            {
                TypeEquality::AlmostEqual
            } else if da.type_id == TypeId::Enum && db.type_id == TypeId::Enum {
                TypeEquality::NotExactlyEqual
            } else if da.type_id.is_arithmetic() && db.type_id.is_arithmetic() {
                TypeEquality::AlmostEqual
            } else {
                TypeEquality::NotEqual
            }
        }
        (TypeKind::Pointed(pa), TypeKind::Pointed(pb)) => {
            if pa.is_void() || pb.is_void() {
                TypeEquality::AlmostEqual
            } else {
                match type_equality(pa, pb) {
                    TypeEquality::Equal => TypeEquality::Equal,
                    _ => TypeEquality::NotExactlyEqual,
                }
            }
        }
        (TypeKind::Array(ea, sa), TypeKind::Array(eb, sb)) => {
            let elems = type_equality(ea, eb);
            if elems == TypeEquality::Equal && (sa == sb || *sa == UNKNOWN_SIZE || *sb == UNKNOWN_SIZE) {
                TypeEquality::Equal
            } else {
                TypeEquality::NotExactlyEqual
            }
        }
        (TypeKind::Function(ra, pa, va), TypeKind::Function(rb, pb, vb)) => {
            if va != vb || pa.len() != pb.len() {
                return TypeEquality::NotEqual;
            }
            let mut worst = type_equality(ra, rb);
            for (x, y) in pa.iter().zip(pb.iter()) {
                worst = worst.max(type_equality(x, y));
            }
            worst
        }
        (TypeKind::Bitfield(sa, oa, wa), TypeKind::Bitfield(sb, ob, wb)) => {
            if oa == ob && wa == wb {
                type_equality(sa, sb)
            } else {
                TypeEquality::NotEqual
            }
        }
        _ => TypeEquality::NotEqual,
    }
}

#[must_use]
pub fn types_equal(a: &TypeRef, b: &TypeRef) -> bool {
    type_equality(a, b) == TypeEquality::Equal
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Castability {
    NoCast,
    Implicit,
    Explicit,
}

/// `typeCastability` (§4.3).
#[must_use]
pub fn type_castability(to: &TypeRef, from: &TypeRef) -> Castability {
    if to.is_error() || from.is_error() {
        return Castability::NoCast;
    }
    if types_equal(to, from) {
        return Castability::NoCast;
    }
    match (to.kind(), from.kind()) {
        (TypeKind::Value(dt), _) if dt.type_id.is_arithmetic() && from.is_arithmetic() => {
            Castability::Implicit
        }
        (TypeKind::Pointed(_), TypeKind::Array(..)) => Castability::Implicit,
        (TypeKind::Pointed(pt), TypeKind::Pointed(pf)) => {
            if pt.is_void() || pf.is_void() {
                Castability::Implicit
            } else {
                Castability::Explicit
            }
        }
        (TypeKind::Pointed(_), TypeKind::Value(df)) if df.type_id.is_integer() => {
            Castability::Implicit
        }
        (TypeKind::Value(dt), TypeKind::Pointed(_)) if dt.type_id.is_integer() => {
            Castability::Implicit
        }
        (TypeKind::Value(dt), TypeKind::Value(df))
            if dt.type_id == TypeId::Struct || dt.type_id == TypeId::Union || df.type_id == TypeId::Struct || df.type_id == TypeId::Union =>
        {
            Castability::Explicit
        }
        _ => Castability::Explicit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_sizes() {
        let s4 = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        assert_eq!(compute_type_size(&s4), 4);
        assert_eq!(type_alignment(&s4), 4);
    }

    #[test]
    fn pointer_is_8_bytes() {
        let s4 = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        let ptr = TypeFactory::pointed(s4, Qualifiers::empty());
        assert_eq!(compute_type_size(&ptr), POINTER_SIZE);
    }

    #[test]
    fn array_propagates_unknown_size() {
        let s4 = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        let arr = TypeFactory::array(s4, UNKNOWN_SIZE);
        assert_eq!(compute_type_size(&arr), UNKNOWN_SIZE);
    }

    #[test]
    fn enum_almost_equal_to_integer() {
        let def = Rc::new(RefCell::new(TypeDefinition::new_forward(AggregateKind::Enum, "E".into())));
        def.borrow_mut().is_defined = true;
        let e = TypeFactory::aggregate(def, Qualifiers::empty());
        let s4 = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        assert_eq!(type_equality(&e, &s4), TypeEquality::AlmostEqual);
    }

    #[test]
    fn void_pointer_almost_equal_to_any_pointer() {
        let void = TypeFactory::primitive(TypeId::Void, Qualifiers::empty());
        let vp = TypeFactory::pointed(void, Qualifiers::empty());
        let s4 = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        let ip = TypeFactory::pointed(s4, Qualifiers::empty());
        assert_eq!(type_equality(&vp, &ip), TypeEquality::AlmostEqual);
    }

    #[test]
    fn castability_struct_to_struct_is_explicit() {
        let def_s = Rc::new(RefCell::new(TypeDefinition::new_forward(AggregateKind::Struct, "S".into())));
        let def_t = Rc::new(RefCell::new(TypeDefinition::new_forward(AggregateKind::Struct, "T".into())));
        let s = TypeFactory::aggregate(def_s, Qualifiers::empty());
        let t = TypeFactory::aggregate(def_t, Qualifiers::empty());
        assert_eq!(type_castability(&t, &s), Castability::Explicit);
    }
}
