//! The type decoder (§4.4): the core recursive constructor that
//! materializes a [`Type`] graph from a DWARF offset, memoizing on a
//! per-data-object [`Cache`] so cyclic references terminate.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::cursor::Cursor;
use crate::die::{AttrName, AttrValue, DwTag, EntryReader, Offset, RawDie};
use crate::error::{Result, TypeGraphError};
use crate::loc;
use crate::types::*;

/// Offset-keyed memo of already-decoded types. Owned by the caller (the
/// DWARF data handle, in the full system); not safe to mutate from more
/// than one thread at a time — see §5.
pub type Cache = HashMap<Offset, TypeRef>;

/// Sentinel offset used for freshly allocated `void` nodes, which carry
/// no DIE of their own and are never cached (they're cheap, stateless,
/// and every occurrence gets its own instance).
const VOID_OFFSET: Offset = Offset::MAX;

fn void_type() -> TypeRef {
    Type::new_ref(Type::Void(Common::new(VOID_OFFSET)))
}

/// Decodes the type at `offset`, consulting and populating `cache`.
/// `address_size` is the enclosing compilation unit's address size in
/// bytes, used for pointers with no explicit `DW_AT_byte_size`.
pub fn decode_type(
    reader: &mut EntryReader,
    offset: Offset,
    address_size: u8,
    cache: &mut Cache,
) -> Result<TypeRef> {
    if let Some(existing) = cache.get(&offset) {
        trace!(offset, "type cache hit");
        return Ok(existing.clone());
    }
    reader.seek(offset)?;
    let die = reader.read_die()?;
    debug!(offset, tag = ?die.tag, "decoding type");
    match build_type(reader, &die, address_size, cache) {
        Ok(type_ref) => Ok(type_ref),
        Err(err) => {
            warn!(offset, error = %err, "decode failed, evicting skeleton");
            cache.remove(&offset);
            Err(err)
        }
    }
}

fn build_type(
    reader: &mut EntryReader,
    die: &RawDie,
    address_size: u8,
    cache: &mut Cache,
) -> Result<TypeRef> {
    let section = reader.section_name().to_string();
    match die.tag {
        DwTag::BaseType => decode_base_type(die, &section, cache),
        DwTag::ConstType => decode_qualified(reader, die, Qualifier::Const, address_size, cache),
        DwTag::VolatileType => decode_qualified(reader, die, Qualifier::Volatile, address_size, cache),
        DwTag::RestrictType => decode_qualified(reader, die, Qualifier::Restrict, address_size, cache),
        DwTag::PointerType => decode_pointer(reader, die, address_size, cache),
        DwTag::ArrayType => decode_array(reader, die, &section, address_size, cache),
        DwTag::StructureType => decode_structure(reader, die, StructKind::Struct, &section, address_size, cache),
        DwTag::ClassType => decode_structure(reader, die, StructKind::Class, &section, address_size, cache),
        DwTag::UnionType => decode_structure(reader, die, StructKind::Union, &section, address_size, cache),
        DwTag::EnumerationType => decode_enum(reader, die, cache),
        DwTag::SubroutineType => decode_subroutine(reader, die, address_size, cache),
        DwTag::Typedef => decode_typedef(reader, die, address_size, cache),
        DwTag::UnspecifiedType => decode_unspecified(die, cache),
        _ => Err(TypeGraphError::NoTypeAtOffset { section, offset: die.offset }),
    }
}

/// Resolves a type-valued attribute: an offset reference recurses
/// (using a *cloned* reader, so the caller's own iteration position is
/// undisturbed); a type-unit signature delegates to `sig_to_type`
/// (out of scope here); a missing attribute means `void`.
fn resolve_type_attr(
    reader: &EntryReader,
    address_size: u8,
    cache: &mut Cache,
    attr: Option<&AttrValue>,
) -> Result<TypeRef> {
    match attr {
        None => Ok(void_type()),
        Some(AttrValue::Ref(off)) => {
            let mut cloned = reader.clone();
            decode_type(&mut cloned, *off, address_size, cache)
        }
        Some(AttrValue::RefSig8(sig)) => sig_to_type(*sig),
        Some(_) => Ok(void_type()),
    }
}

/// Stands in for type-unit signature resolution, which is an external
/// collaborator per §1/§4.4 step 4.
fn sig_to_type(signature: u64) -> Result<TypeRef> {
    warn!(signature, "type-unit signature resolution is out of scope; treating as void");
    Ok(void_type())
}

fn decode_base_type(die: &RawDie, section: &str, cache: &mut Cache) -> Result<TypeRef> {
    let encoding = die
        .attr(AttrName::Encoding)
        .and_then(AttrValue::as_u64)
        .ok_or_else(|| TypeGraphError::MissingEncoding { section: section.to_string(), offset: die.offset })?;
    let basic = match encoding {
        0x00 => Basic::Unspecified,
        0x01 => Basic::Address,
        0x02 => Basic::Boolean,
        0x03 => Basic::ComplexFloat,
        0x04 => Basic::Float,
        0x05 => Basic::SignedInt,
        0x06 => Basic::SignedChar,
        0x07 => Basic::UnsignedInt,
        0x08 => Basic::UnsignedChar,
        other => {
            return Err(TypeGraphError::BadEncoding { section: section.to_string(), offset: die.offset, encoding: other })
        }
    };
    let byte_size = die.byte_size().map(|b| b as i64).unwrap_or(-1);
    let mut name = die.name().unwrap_or("").to_string();
    if basic == Basic::ComplexFloat && name == "complex" {
        name = match byte_size {
            8 => "complex float".to_string(),
            16 => "complex double".to_string(),
            _ => name,
        };
    }
    let bit_size = die.attr(AttrName::BitSize).and_then(AttrValue::as_u64).unwrap_or(0) as u32;
    let bit_offset = die.attr(AttrName::BitOffset).and_then(AttrValue::as_u64).unwrap_or(0) as u32;
    let common = Common { offset: die.offset, byte_size, name, reflect_kind: None };
    let skeleton = Type::new_ref(Type::Basic(BasicType { common, basic, bit_size, bit_offset }));
    cache.insert(die.offset, skeleton.clone());
    Ok(skeleton)
}

fn decode_qualified(
    reader: &mut EntryReader,
    die: &RawDie,
    qualifier: Qualifier,
    address_size: u8,
    cache: &mut Cache,
) -> Result<TypeRef> {
    let common = Common::new(die.offset);
    let skeleton = Type::new_ref(Type::Qualified(QualifiedType { common, qualifier, inner: void_type() }));
    cache.insert(die.offset, skeleton.clone());
    let inner = resolve_type_attr(reader, address_size, cache, die.attr(AttrName::Type))?;
    if let Type::Qualified(q) = &mut *skeleton.borrow_mut() {
        q.inner = inner;
    }
    Ok(skeleton)
}

fn decode_pointer(reader: &mut EntryReader, die: &RawDie, address_size: u8, cache: &mut Cache) -> Result<TypeRef> {
    let byte_size = die.byte_size().map(|b| b as i64).unwrap_or(address_size as i64);
    let common = Common { offset: die.offset, byte_size, name: String::new(), reflect_kind: None };
    let skeleton = Type::new_ref(Type::Pointer(PointerType { common, pointee: void_type() }));
    cache.insert(die.offset, skeleton.clone());
    let pointee = resolve_type_attr(reader, address_size, cache, die.attr(AttrName::Type))?;
    if let Type::Pointer(p) = &mut *skeleton.borrow_mut() {
        p.pointee = pointee;
    }
    Ok(skeleton)
}

fn decode_array(
    reader: &mut EntryReader,
    die: &RawDie,
    section: &str,
    address_size: u8,
    cache: &mut Cache,
) -> Result<TypeRef> {
    let common = Common::new(die.offset);
    let skeleton = Type::new_ref(Type::Array(ArrayType { common, element: void_type(), stride_bits: 0, count: -1 }));
    cache.insert(die.offset, skeleton.clone());

    let element = resolve_type_attr(reader, address_size, cache, die.attr(AttrName::Type))?;

    let mut dims: Vec<i64> = Vec::new();
    if die.has_children {
        let mut cursor = Cursor::new(reader);
        loop {
            match cursor.next_child()? {
                None => break,
                Some(child) => match child.tag {
                    DwTag::SubrangeType => {
                        let count = child
                            .attr(AttrName::Count)
                            .and_then(AttrValue::as_i64)
                            .or_else(|| child.attr(AttrName::UpperBound).and_then(AttrValue::as_i64).map(|u| u + 1))
                            .unwrap_or(-1);
                        dims.push(count);
                    }
                    DwTag::EnumerationType => {
                        return Err(TypeGraphError::BadArrayBound { section: section.to_string(), offset: die.offset });
                    }
                    _ => {}
                },
            }
        }
    }

    let stride_bits = die
        .attr(AttrName::ByteStride)
        .and_then(AttrValue::as_u64)
        .map(|b| b * 8)
        .or_else(|| die.attr(AttrName::BitStride).and_then(AttrValue::as_u64))
        .unwrap_or(0);

    let (count, elem_for_outer) = if dims.is_empty() {
        (-1, element)
    } else {
        let mut inner = element;
        for &d in &dims[1..] {
            inner = Type::new_ref(Type::Array(ArrayType {
                common: Common::new(die.offset),
                element: inner,
                stride_bits: 0,
                count: d,
            }));
        }
        (dims[0], inner)
    };

    if let Type::Array(a) = &mut *skeleton.borrow_mut() {
        a.element = elem_for_outer;
        a.stride_bits = stride_bits;
        a.count = count;
    }
    Ok(skeleton)
}

/// Zeroes the count of `ty` and, if its element is itself an array, every
/// array further down the chain — the zero-width-bitfield fixup (§3)
/// applies to "a chain of nested arrays", not just the outermost one.
fn zero_array_chain(ty: &TypeRef) {
    let mut current = ty.clone();
    loop {
        let next = match &mut *current.borrow_mut() {
            Type::Array(a) => {
                a.count = 0;
                a.element.clone()
            }
            _ => return,
        };
        current = next;
    }
}

fn decode_structure(
    reader: &mut EntryReader,
    die: &RawDie,
    kind: StructKind,
    section: &str,
    address_size: u8,
    cache: &mut Cache,
) -> Result<TypeRef> {
    let tag_name = die.name().map(|s| s.to_string());
    let reflect_kind = die.go_kind().and_then(ReflectKind::from_raw);
    let byte_size = die.byte_size().map(|b| b as i64).unwrap_or(-1);
    let incomplete = die.attr(AttrName::Declaration).and_then(AttrValue::as_flag).unwrap_or(false);
    let common = Common {
        offset: die.offset,
        byte_size,
        name: tag_name.clone().unwrap_or_default(),
        reflect_kind,
    };
    let base_struct = StructureType { common, kind, tag_name, fields: vec![], incomplete };

    let initial = match (kind, reflect_kind) {
        (StructKind::Struct, Some(ReflectKind::Slice)) => Type::Slice(SliceType { structure: base_struct, element: void_type() }),
        (StructKind::Struct, Some(ReflectKind::Str)) => Type::Str(StringType { structure: base_struct }),
        _ => Type::Structure(base_struct),
    };
    let skeleton = Type::new_ref(initial);
    cache.insert(die.offset, skeleton.clone());

    if matches!((kind, reflect_kind), (StructKind::Struct, Some(ReflectKind::Slice))) {
        let element = resolve_type_attr(reader, address_size, cache, die.attr(AttrName::Type))?;
        if let Type::Slice(s) = &mut *skeleton.borrow_mut() {
            s.element = element;
        }
    }

    let mut fields = Vec::new();
    let mut zero_width_bitfield = Vec::new();
    if die.has_children {
        let mut cursor = Cursor::new(reader);
        loop {
            match cursor.next_child()? {
                None => break,
                Some(child) => {
                    if child.tag != DwTag::Member {
                        continue;
                    }
                    let name = child.name().unwrap_or("").to_string();
                    let byte_offset =
                        loc::eval_member_location(section, child.offset, child.attr(AttrName::DataMemberLocation))?;
                    let bit_size_attr = child.attr(AttrName::BitSize).and_then(AttrValue::as_u64);
                    let bit_size = bit_size_attr.unwrap_or(0) as u32;
                    let bit_offset = child.attr(AttrName::BitOffset).and_then(AttrValue::as_u64).unwrap_or(0) as u32;
                    let field_reader = cursor.reader().clone();
                    let ty = resolve_type_attr(&field_reader, address_size, cache, child.attr(AttrName::Type))?;
                    let byte_size = child.byte_size().map(|b| b as i64).unwrap_or_else(|| ty.borrow().size());
                    fields.push(Field { name, ty, byte_offset, byte_size, bit_offset, bit_size });
                    zero_width_bitfield.push(bit_size_attr == Some(0));
                }
            }
        }
    }

    if kind != StructKind::Union {
        for i in 1..fields.len() {
            if zero_width_bitfield[i] {
                zero_array_chain(&fields[i - 1].ty);
            }
        }
        // A trailing zero-width field has no following field to trigger the
        // fixup above; §3 applies the same fixup to it directly when its
        // bit-offset lands exactly at the enclosing struct's total bit size.
        if let Some(last) = fields.len().checked_sub(1) {
            if zero_width_bitfield[last] && fields[last].bit_offset as i64 == byte_size * 8 {
                zero_array_chain(&fields[last].ty);
            }
        }
    }

    {
        let mut node = skeleton.borrow_mut();
        match &mut *node {
            Type::Structure(s) => s.fields = fields,
            Type::Slice(s) => s.structure.fields = fields,
            Type::Str(s) => s.structure.fields = fields,
            _ => unreachable!("skeleton kind fixed above"),
        }
    }
    Ok(skeleton)
}

fn decode_enum(reader: &mut EntryReader, die: &RawDie, cache: &mut Cache) -> Result<TypeRef> {
    let name = die.name().map(|s| s.to_string());
    let common = Common {
        offset: die.offset,
        byte_size: die.byte_size().map(|b| b as i64).unwrap_or(-1),
        name: name.clone().unwrap_or_default(),
        reflect_kind: None,
    };
    let skeleton = Type::new_ref(Type::Enumeration(EnumerationType { common, name, enumerators: vec![] }));
    cache.insert(die.offset, skeleton.clone());

    let mut enumerators = Vec::new();
    if die.has_children {
        let mut cursor = Cursor::new(reader);
        loop {
            match cursor.next_child()? {
                None => break,
                Some(child) => {
                    if child.tag == DwTag::Enumerator {
                        let name = child.name().unwrap_or("").to_string();
                        let value = child.attr(AttrName::ConstValue).and_then(AttrValue::as_i64).unwrap_or(0);
                        enumerators.push((name, value));
                    }
                }
            }
        }
    }
    if let Type::Enumeration(e) = &mut *skeleton.borrow_mut() {
        e.enumerators = enumerators;
    }
    Ok(skeleton)
}

fn decode_subroutine(reader: &mut EntryReader, die: &RawDie, address_size: u8, cache: &mut Cache) -> Result<TypeRef> {
    let common = Common::new(die.offset);
    let skeleton = Type::new_ref(Type::Subroutine(SubroutineType {
        common,
        return_type: void_type(),
        parameters: vec![],
        variadic: false,
    }));
    cache.insert(die.offset, skeleton.clone());

    let return_type = resolve_type_attr(reader, address_size, cache, die.attr(AttrName::Type))?;

    let mut parameters = Vec::new();
    let mut variadic = false;
    if die.has_children {
        let mut cursor = Cursor::new(reader);
        loop {
            match cursor.next_child()? {
                None => break,
                Some(child) => match child.tag {
                    DwTag::FormalParameter => {
                        let param_reader = cursor.reader().clone();
                        let pt = resolve_type_attr(&param_reader, address_size, cache, child.attr(AttrName::Type))?;
                        parameters.push(pt);
                    }
                    DwTag::UnspecifiedParameters => {
                        parameters.push(Type::new_ref(Type::Dotdotdot));
                        variadic = true;
                    }
                    _ => {}
                },
            }
        }
    }

    if let Type::Subroutine(s) = &mut *skeleton.borrow_mut() {
        s.return_type = return_type;
        s.parameters = parameters;
        s.variadic = variadic;
    }
    Ok(skeleton)
}

fn decode_typedef(reader: &mut EntryReader, die: &RawDie, address_size: u8, cache: &mut Cache) -> Result<TypeRef> {
    let reflect_kind = die.go_kind().and_then(ReflectKind::from_raw);
    let name = die.name().unwrap_or("").to_string();
    let common = Common { offset: die.offset, byte_size: -1, name, reflect_kind };
    let base_typedef = TypedefType { common, inner: void_type() };

    let initial = match reflect_kind {
        Some(ReflectKind::Map) => Type::Map(MapType { typedef: base_typedef, key: void_type(), element: void_type() }),
        Some(ReflectKind::Chan) => Type::Channel(ChannelType { typedef: base_typedef, element: void_type() }),
        Some(ReflectKind::Interface) => Type::Interface(InterfaceType { typedef: base_typedef }),
        _ => Type::Typedef(base_typedef),
    };
    let skeleton = Type::new_ref(initial);
    cache.insert(die.offset, skeleton.clone());

    let inner = resolve_type_attr(reader, address_size, cache, die.attr(AttrName::Type))?;
    let key = if reflect_kind == Some(ReflectKind::Map) {
        Some(resolve_type_attr(reader, address_size, cache, die.attr(AttrName::GoKey))?)
    } else {
        None
    };
    let elem = if matches!(reflect_kind, Some(ReflectKind::Map) | Some(ReflectKind::Chan)) {
        Some(resolve_type_attr(reader, address_size, cache, die.attr(AttrName::GoElem))?)
    } else {
        None
    };

    let mut node = skeleton.borrow_mut();
    match &mut *node {
        Type::Typedef(t) => t.inner = inner,
        Type::Map(m) => {
            m.typedef.inner = inner;
            m.key = key.expect("map always resolves a key attr");
            m.element = elem.expect("map always resolves an element attr");
        }
        Type::Channel(c) => {
            c.typedef.inner = inner;
            c.element = elem.expect("chan always resolves an element attr");
        }
        Type::Interface(i) => i.typedef.inner = inner,
        _ => unreachable!("skeleton kind fixed above"),
    }
    drop(node);
    Ok(skeleton)
}

fn decode_unspecified(die: &RawDie, cache: &mut Cache) -> Result<TypeRef> {
    let name = die.name().unwrap_or("").to_string();
    let common = Common { offset: die.offset, byte_size: -1, name, reflect_kind: None };
    let skeleton = Type::new_ref(Type::Unspecified(common));
    cache.insert(die.offset, skeleton.clone());
    Ok(skeleton)
}
