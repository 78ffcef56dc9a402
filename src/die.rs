//! The DWARF DIE model this crate is handed by its caller.
//!
//! The real entry reader (one that parses `.debug_info`/`.debug_abbrev`
//! bytes into DIEs) is an external collaborator; this module gives that
//! assumption a concrete shape so the decoder and its tests have
//! something to compile against. `DwTag` and `AttrName` carry the usual
//! DWARF constant vocabulary (`DW_TAG_*` / `DW_AT_*`); `AttrValue` is
//! simplified to already-decoded values (addresses, integers, strings,
//! expression bytes, offset references) since byte-level form parsing
//! is the part of the job this crate assumes its caller already did.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Result, TypeGraphError};

pub type Offset = u64;

/// DWARF tag encodings, `DW_TAG_*`. Only a subset is dispatched on by
/// the decoder; the rest round out the vocabulary so a caller's raw
/// entry stream never has to special-case missing tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DwTag {
    ArrayType,
    ClassType,
    EnumerationType,
    FormalParameter,
    LexicalBlock,
    Member,
    PointerType,
    CompileUnit,
    StringType,
    StructureType,
    SubroutineType,
    Typedef,
    UnionType,
    UnspecifiedParameters,
    Inheritance,
    SubrangeType,
    BaseType,
    ConstType,
    Enumerator,
    Subprogram,
    Variable,
    VolatileType,
    RestrictType,
    InterfaceType,
    Namespace,
    UnspecifiedType,
    Unrecognized(u64),
}

/// DWARF attribute encodings, `DW_AT_*`, plus one vendor extension
/// (`go_kind`) used to carry the source language's reflect-kind hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrName {
    Sibling,
    Location,
    Name,
    ByteSize,
    BitOffset,
    BitSize,
    LowPc,
    HighPc,
    Encoding,
    Count,
    DataMemberLocation,
    UpperBound,
    LowerBound,
    Type,
    ByteStride,
    BitStride,
    ConstValue,
    DataBitOffset,
    Declaration,
    Prototyped,
    Specification,
    /// `DW_AT_go_kind` (0x2900), the vendor attribute the Go toolchain
    /// stamps on types with `reflect.Kind` (slice/string/map/chan/
    /// interface) so a consumer can recover the language-composite
    /// shape without re-deriving it from field names alone.
    GoKind,
    /// `DW_AT_go_key` (0x2902): a map typedef's key type, which the
    /// runtime header struct itself doesn't carry.
    GoKey,
    /// `DW_AT_go_elem` (0x2903): a map or channel typedef's element
    /// type.
    GoElem,
    Unrecognized(u64),
}

/// The already-interpreted value of one DIE attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Address(u64),
    UConstant(u64),
    SConstant(i64),
    /// Raw bytes of a `DW_FORM_exprloc`/`DW_FORM_block*` value, e.g. a
    /// field's `DW_AT_data_member_location` location expression.
    ExprLoc(Vec<u8>),
    Flag(bool),
    Str(String),
    /// A reference to another DIE, by section offset.
    Ref(Offset),
    /// A type-unit signature (8 bytes); resolved by `sig_to_type`,
    /// which is out of scope for this crate.
    RefSig8(u64),
}

impl AttrValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            AttrValue::UConstant(v) => Some(*v),
            AttrValue::SConstant(v) => Some(*v as u64),
            AttrValue::Address(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::SConstant(v) => Some(*v),
            AttrValue::UConstant(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_ref_offset(&self) -> Option<Offset> {
        match self {
            AttrValue::Ref(off) => Some(*off),
            _ => None,
        }
    }

    pub fn as_expr(&self) -> Option<&[u8]> {
        match self {
            AttrValue::ExprLoc(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            AttrValue::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

/// One debugging information entry: a tag, whether it owns a run of
/// children in the stream, and its attribute map.
#[derive(Debug, Clone)]
pub struct RawDie {
    pub offset: Offset,
    pub tag: DwTag,
    pub has_children: bool,
    attrs: Vec<(AttrName, AttrValue)>,
}

impl RawDie {
    pub fn new(offset: Offset, tag: DwTag, has_children: bool, attrs: Vec<(AttrName, AttrValue)>) -> Self {
        RawDie { offset, tag, has_children, attrs }
    }

    pub fn attr(&self, name: AttrName) -> Option<&AttrValue> {
        self.attrs.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn name(&self) -> Option<&str> {
        self.attr(AttrName::Name).and_then(AttrValue::as_str)
    }

    pub fn type_ref(&self) -> Option<Offset> {
        self.attr(AttrName::Type).and_then(AttrValue::as_ref_offset)
    }

    pub fn byte_size(&self) -> Option<u64> {
        self.attr(AttrName::ByteSize).and_then(AttrValue::as_u64)
    }

    pub fn go_kind(&self) -> Option<i64> {
        self.attr(AttrName::GoKind).and_then(AttrValue::as_i64)
    }
}

/// One entry in the flattened, `DW_TAG`-stream-with-null-terminators
/// representation `EntryReader` walks. This is exactly how DWARF itself
/// serializes sibling lists: a `Null` entry ends the children of the
/// nearest still-open `Die` with `has_children`.
#[derive(Debug, Clone)]
pub enum StreamEntry {
    Die(RawDie),
    Null,
}

#[derive(Debug)]
struct EntryStream {
    entries: Vec<StreamEntry>,
    offset_index: HashMap<Offset, usize>,
}

/// Builds a flat entry stream the way a real `.debug_info` parser
/// would hand it to us: depth-first, with one `Null` terminating each
/// run of children. Used by tests and by the demo binary to construct
/// fixtures without a real object-file reader.
#[derive(Default)]
pub struct StreamBuilder {
    entries: Vec<StreamEntry>,
}

impl StreamBuilder {
    pub fn new() -> Self {
        StreamBuilder::default()
    }

    pub fn die(mut self, die: RawDie) -> Self {
        self.entries.push(StreamEntry::Die(die));
        self
    }

    pub fn end_children(mut self) -> Self {
        self.entries.push(StreamEntry::Null);
        self
    }

    pub fn build(self) -> EntryReader {
        let mut offset_index = HashMap::new();
        for (i, e) in self.entries.iter().enumerate() {
            if let StreamEntry::Die(d) = e {
                offset_index.insert(d.offset, i);
            }
        }
        EntryReader {
            stream: Rc::new(EntryStream { entries: self.entries, offset_index }),
            pos: 0,
            section: Rc::from("debug_info"),
        }
    }
}

/// A cursor over a (shared, read-only) entry stream. Cloning is cheap —
/// it shares the underlying stream and copies only the cursor position —
/// which is what lets the decoder recurse with an independent reader
/// while leaving a parent's own iteration undisturbed.
#[derive(Clone)]
pub struct EntryReader {
    stream: Rc<EntryStream>,
    pos: usize,
    section: Rc<str>,
}

impl EntryReader {
    pub fn section_name(&self) -> &str {
        &self.section
    }

    /// Positions the cursor at the DIE with the given offset.
    pub fn seek(&mut self, offset: Offset) -> Result<()> {
        match self.stream.offset_index.get(&offset) {
            Some(&pos) => {
                self.pos = pos;
                Ok(())
            }
            None => Err(TypeGraphError::NoTypeAtOffset {
                section: self.section.to_string(),
                offset,
            }),
        }
    }

    /// Reads the DIE at the current cursor position and advances past
    /// it. Fails if the cursor is positioned on a `Null` or past the
    /// end of the stream (misaligned or missing entry).
    pub fn read_die(&mut self) -> Result<RawDie> {
        let offset_for_error = self.current_offset();
        match self.stream.entries.get(self.pos) {
            Some(StreamEntry::Die(d)) => {
                let d = d.clone();
                self.pos += 1;
                Ok(d)
            }
            _ => Err(TypeGraphError::NoTypeAtOffset {
                section: self.section.to_string(),
                offset: offset_for_error,
            }),
        }
    }

    fn current_offset(&self) -> Offset {
        match self.stream.entries.get(self.pos) {
            Some(StreamEntry::Die(d)) => d.offset,
            _ => self.pos as Offset,
        }
    }

    fn next_raw(&mut self) -> Option<StreamEntry> {
        let e = self.stream.entries.get(self.pos).cloned();
        if e.is_some() {
            self.pos += 1;
        }
        e
    }
}

pub(crate) enum Advance {
    Die(RawDie),
    Null,
}

impl EntryReader {
    pub(crate) fn advance(&mut self) -> Option<Advance> {
        match self.next_raw()? {
            StreamEntry::Die(d) => Some(Advance::Die(d)),
            StreamEntry::Null => Some(Advance::Null),
        }
    }
}
