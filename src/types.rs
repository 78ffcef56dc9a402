//! The type model (§3, §4.1): a closed, tagged-union representation of
//! every DWARF type kind this crate understands, plus the
//! language-composite variants carried by the reflect-kind hint.
//!
//! Types are shared, possibly-cyclic nodes. Rather than an owning tree
//! (which cannot express a struct containing a pointer to itself), each
//! type lives behind an `Rc<RefCell<Type>>` — the decoder inserts a
//! half-built node into its offset cache *before* recursing into
//! referenced offsets, and every reference to that offset after that
//! point clones the same `Rc`, so a cyclic type graph is exactly one
//! shared instance per offset, not a runaway recursive structure.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::die::Offset;

/// A shared handle to a type node. Equality/identity for cycle
/// detection and caching is the DWARF offset carried in `Common`, not
/// pointer identity, since language-composite variants alias the same
/// offset as the structure they extend.
pub type TypeRef = Rc<RefCell<Type>>;

/// Attributes present on every type.
#[derive(Debug, Clone)]
pub struct Common {
    /// Byte size, or -1 if unknown.
    pub byte_size: i64,
    pub name: String,
    pub reflect_kind: Option<ReflectKind>,
    pub offset: Offset,
}

impl Common {
    pub fn new(offset: Offset) -> Self {
        Common { byte_size: -1, name: String::new(), reflect_kind: None, offset }
    }
}

/// The source-language reflect-kind hint (`DW_AT_go_kind`), carried so
/// the decoder can disambiguate a language-specific composite from its
/// plain structural representation. Values follow Go's `reflect.Kind`
/// ordering; every other value is "no composite hint".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectKind {
    Slice,
    Str,
    Map,
    Chan,
    Interface,
}

impl ReflectKind {
    pub fn from_raw(kind: i64) -> Option<ReflectKind> {
        match kind {
            18 => Some(ReflectKind::Chan),
            20 => Some(ReflectKind::Interface),
            21 => Some(ReflectKind::Map),
            23 => Some(ReflectKind::Slice),
            24 => Some(ReflectKind::Str),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basic {
    SignedChar,
    UnsignedChar,
    SignedInt,
    UnsignedInt,
    Float,
    ComplexFloat,
    Boolean,
    Address,
    Unspecified,
}

#[derive(Debug, Clone)]
pub struct BasicType {
    pub common: Common,
    pub basic: Basic,
    pub bit_size: u32,
    pub bit_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    Const,
    Restrict,
    Volatile,
}

impl Qualifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Qualifier::Const => "const",
            Qualifier::Restrict => "restrict",
            Qualifier::Volatile => "volatile",
        }
    }
}

#[derive(Debug, Clone)]
pub struct QualifiedType {
    pub common: Common,
    pub qualifier: Qualifier,
    pub inner: TypeRef,
}

#[derive(Debug, Clone)]
pub struct ArrayType {
    pub common: Common,
    pub element: TypeRef,
    /// Element stride in bits; 0 means "derive from the element's size".
    pub stride_bits: u64,
    /// -1 means incomplete/flexible.
    pub count: i64,
}

#[derive(Debug, Clone)]
pub struct PointerType {
    pub common: Common,
    pub pointee: TypeRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructKind {
    Struct,
    Union,
    Class,
}

impl StructKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructKind::Struct => "struct",
            StructKind::Union => "union",
            StructKind::Class => "class",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
    pub byte_offset: i64,
    pub byte_size: i64,
    pub bit_offset: u32,
    /// 0 if this field is not a bitfield.
    pub bit_size: u32,
}

#[derive(Debug, Clone)]
pub struct StructureType {
    pub common: Common,
    pub kind: StructKind,
    pub tag_name: Option<String>,
    pub fields: Vec<Field>,
    pub incomplete: bool,
}

#[derive(Debug, Clone)]
pub struct EnumerationType {
    pub common: Common,
    pub name: Option<String>,
    pub enumerators: Vec<(String, i64)>,
}

#[derive(Debug, Clone)]
pub struct SubroutineType {
    pub common: Common,
    pub return_type: TypeRef,
    pub parameters: Vec<TypeRef>,
    pub variadic: bool,
}

#[derive(Debug, Clone)]
pub struct TypedefType {
    pub common: Common,
    pub inner: TypeRef,
}

/// `[]T` — structurally a `Structure` with an `array`/`len`/`cap`
/// runtime header, plus the element type the header doesn't carry.
#[derive(Debug, Clone)]
pub struct SliceType {
    pub structure: StructureType,
    pub element: TypeRef,
}

/// `string` — structurally a two-word `Structure` runtime header.
#[derive(Debug, Clone)]
pub struct StringType {
    pub structure: StructureType,
}

/// `map[K]V` — a `Typedef` of the runtime map header, plus the key and
/// element types the header doesn't carry.
#[derive(Debug, Clone)]
pub struct MapType {
    pub typedef: TypedefType,
    pub key: TypeRef,
    pub element: TypeRef,
}

/// `chan T` — a `Typedef` of a pointer to the runtime channel header,
/// plus the element type.
#[derive(Debug, Clone)]
pub struct ChannelType {
    pub typedef: TypedefType,
    pub element: TypeRef,
}

/// An interface value — a `Typedef` of a `Typedef` of the two-word
/// `(tab, data)` runtime header.
#[derive(Debug, Clone)]
pub struct InterfaceType {
    pub typedef: TypedefType,
}

/// The closed set of type kinds this crate can decode and print.
#[derive(Debug, Clone)]
pub enum Type {
    Basic(BasicType),
    Qualified(QualifiedType),
    Array(ArrayType),
    Void(Common),
    Pointer(PointerType),
    Structure(StructureType),
    Enumeration(EnumerationType),
    Subroutine(SubroutineType),
    Typedef(TypedefType),
    Unspecified(Common),
    /// The pseudo-type standing in for a subroutine's trailing `...`.
    Dotdotdot,
    Slice(SliceType),
    Str(StringType),
    Map(MapType),
    Channel(ChannelType),
    Interface(InterfaceType),
}

impl Type {
    pub fn new_ref(ty: Type) -> TypeRef {
        Rc::new(RefCell::new(ty))
    }

    /// The common attribute bundle every type carries. `Dotdotdot` has
    /// none — it is a marker, not a type with an offset of its own.
    pub fn common(&self) -> Option<&Common> {
        match self {
            Type::Basic(t) => Some(&t.common),
            Type::Qualified(t) => Some(&t.common),
            Type::Array(t) => Some(&t.common),
            Type::Void(c) => Some(c),
            Type::Pointer(t) => Some(&t.common),
            Type::Structure(t) => Some(&t.common),
            Type::Enumeration(t) => Some(&t.common),
            Type::Subroutine(t) => Some(&t.common),
            Type::Typedef(t) => Some(&t.common),
            Type::Unspecified(c) => Some(c),
            Type::Dotdotdot => None,
            Type::Slice(t) => Some(&t.structure.common),
            Type::Str(t) => Some(&t.structure.common),
            Type::Map(t) => Some(&t.typedef.common),
            Type::Channel(t) => Some(&t.typedef.common),
            Type::Interface(t) => Some(&t.typedef.common),
        }
    }

    pub fn common_mut(&mut self) -> Option<&mut Common> {
        match self {
            Type::Basic(t) => Some(&mut t.common),
            Type::Qualified(t) => Some(&mut t.common),
            Type::Array(t) => Some(&mut t.common),
            Type::Void(c) => Some(c),
            Type::Pointer(t) => Some(&mut t.common),
            Type::Structure(t) => Some(&mut t.common),
            Type::Enumeration(t) => Some(&mut t.common),
            Type::Subroutine(t) => Some(&mut t.common),
            Type::Typedef(t) => Some(&mut t.common),
            Type::Unspecified(c) => Some(c),
            Type::Dotdotdot => None,
            Type::Slice(t) => Some(&mut t.structure.common),
            Type::Str(t) => Some(&mut t.structure.common),
            Type::Map(t) => Some(&mut t.typedef.common),
            Type::Channel(t) => Some(&mut t.typedef.common),
            Type::Interface(t) => Some(&mut t.typedef.common),
        }
    }

    pub fn offset(&self) -> Option<Offset> {
        self.common().map(|c| c.offset)
    }

    /// Byte size per the §3 invariant: the DIE's explicit size if
    /// present; otherwise delegated for typedef-like wrappers and
    /// pointers; otherwise unknown.
    pub fn size(&self) -> i64 {
        let explicit = self.common().map(|c| c.byte_size).unwrap_or(-1);
        if explicit >= 0 {
            return explicit;
        }
        match self {
            Type::Qualified(t) => t.inner.borrow().size(),
            Type::Typedef(t) => t.inner.borrow().size(),
            Type::Map(t) => t.typedef.inner.borrow().size(),
            Type::Channel(t) => t.typedef.inner.borrow().size(),
            Type::Interface(t) => t.typedef.inner.borrow().size(),
            _ => -1,
        }
    }

    /// Exposes the structural header for the two variants that extend
    /// `Structure` by composition, so code that only wants the runtime
    /// header layout can operate uniformly on slice/string/struct.
    pub fn as_structure(&self) -> Option<&StructureType> {
        match self {
            Type::Structure(s) => Some(s),
            Type::Slice(s) => Some(&s.structure),
            Type::Str(s) => Some(&s.structure),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Type::Basic(_) => "basic",
            Type::Qualified(_) => "qualified",
            Type::Array(_) => "array",
            Type::Void(_) => "void",
            Type::Pointer(_) => "pointer",
            Type::Structure(_) => "struct",
            Type::Enumeration(_) => "enum",
            Type::Subroutine(_) => "func",
            Type::Typedef(_) => "typedef",
            Type::Unspecified(_) => "unspecified",
            Type::Dotdotdot => "...",
            Type::Slice(_) => "slice",
            Type::Str(_) => "string",
            Type::Map(_) => "map",
            Type::Channel(_) => "chan",
            Type::Interface(_) => "interface",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Basic(t) => {
                if t.common.name.is_empty() {
                    write!(f, "?")
                } else {
                    write!(f, "{}", t.common.name)
                }
            }
            Type::Qualified(t) => write!(f, "{} {}", t.qualifier.as_str(), t.inner.borrow()),
            Type::Array(t) => write!(f, "[{}]{}", t.count, t.element.borrow()),
            Type::Void(_) => write!(f, "void"),
            Type::Pointer(t) => write!(f, "*{}", t.pointee.borrow()),
            Type::Structure(t) => fmt_structure(f, t),
            Type::Enumeration(t) => {
                write!(f, "enum [{}] {{", t.name.as_deref().unwrap_or(""))?;
                for (i, (name, value)) in t.enumerators.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{name}={value}")?;
                }
                write!(f, "}}")
            }
            Type::Subroutine(t) => {
                write!(f, "func(")?;
                for (i, p) in t.parameters.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.borrow())?;
                }
                write!(f, ")")?;
                if !matches!(&*t.return_type.borrow(), Type::Void(_)) {
                    write!(f, " {}", t.return_type.borrow())?;
                }
                Ok(())
            }
            Type::Typedef(t) => write!(f, "{}", t.common.name),
            Type::Unspecified(c) => write!(f, "{}", c.name),
            Type::Dotdotdot => write!(f, "..."),
            Type::Slice(t) => {
                if !t.structure.common.name.is_empty() {
                    write!(f, "{}", t.structure.common.name)
                } else {
                    write!(f, "[]{}", t.element.borrow())
                }
            }
            Type::Str(t) => {
                if !t.structure.common.name.is_empty() {
                    write!(f, "{}", t.structure.common.name)
                } else {
                    write!(f, "string")
                }
            }
            Type::Map(t) => {
                if !t.typedef.common.name.is_empty() {
                    write!(f, "{}", t.typedef.common.name)
                } else {
                    write!(f, "map[{}]{}", t.key.borrow(), t.element.borrow())
                }
            }
            Type::Channel(t) => {
                if !t.typedef.common.name.is_empty() {
                    write!(f, "{}", t.typedef.common.name)
                } else {
                    write!(f, "chan {}", t.element.borrow())
                }
            }
            Type::Interface(t) => {
                if !t.typedef.common.name.is_empty() {
                    write!(f, "{}", t.typedef.common.name)
                } else {
                    write!(f, "Interface")
                }
            }
        }
    }
}

fn fmt_structure(f: &mut fmt::Formatter<'_>, t: &StructureType) -> fmt::Result {
    if let Some(tag) = &t.tag_name {
        return write!(f, "{} {}", t.kind.as_str(), tag);
    }
    write!(f, "{} [] {{", t.kind.as_str())?;
    if t.incomplete {
        write!(f, "... /*incomplete*/")?;
    } else {
        for (i, field) in t.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}@{}", field.name, field.ty.borrow(), field.byte_offset)?;
            if field.bit_size != 0 {
                write!(f, " : {}@{}", field.bit_size, field.bit_offset)?;
            }
        }
    }
    write!(f, "}}")
}
