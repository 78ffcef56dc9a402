//! The value printer (§4.5): walks a type graph against target
//! addresses, peeking bytes through a [`TargetMemoryOracle`] and
//! formatting the result. Cycle-safe; never panics on cyclic heap data.
//!
//! Output and the first-encountered error live on one [`Printer`]
//! instance (the "output context" from the design notes) so every
//! recursive call can append to the same accumulator and report a
//! failure without unwinding the whole print.

use std::collections::HashSet;

use crate::die::Offset;
use crate::error::{Result, TypeGraphError};
use crate::oracle::TargetMemoryOracle;
use crate::types::{Basic, StructKind, Type, TypeRef};

const MAX_ARRAY_ELEMENTS: i64 = 100;
const MAX_MAP_PAIRS: usize = 8;
const MAX_STRING_BYTES: usize = 100;

/// Fixed Go runtime ABI offsets used only by the interface type-name
/// walk (§4.5): these describe `itab`/`_type`/string-header layout,
/// not anything carried by the decoded type graph.
const ITAB_TYPE_OFFSET: u64 = 8;
const RTYPE_STRING_OFFSET: u64 = 16;
const MAX_TYPE_NAME_LEN: u64 = 4096;

fn is_composite(t: &Type) -> bool {
    matches!(
        t,
        Type::Structure(_) | Type::Array(_) | Type::Slice(_) | Type::Str(_) | Type::Map(_) | Type::Channel(_) | Type::Interface(_)
    )
}

/// Follows Typedef/Qualified/Interface wrappers down to the first type
/// with a structural header, so field-name lookups (`tab`, `data`,
/// `array`, `len`, …) work regardless of how many typedef layers sit
/// on top of the runtime header.
fn resolve_struct(ty: &TypeRef) -> Option<TypeRef> {
    let mut current = ty.clone();
    loop {
        let next = {
            let t = current.borrow();
            if t.as_structure().is_some() {
                return Some(current.clone());
            }
            match &*t {
                Type::Typedef(td) => Some(td.inner.clone()),
                Type::Interface(i) => Some(i.typedef.inner.clone()),
                Type::Qualified(q) => Some(q.inner.clone()),
                _ => None,
            }
        };
        current = next?;
    }
}

enum Plan {
    Bool(i64),
    Ptr,
    SInt(i64),
    UInt(i64),
    Flt(i64),
    Cplx(i64),
    Struct(Vec<(TypeRef, i64)>),
    StructBad(&'static str),
    Array(TypeRef, i64, u64),
    Typedef(TypeRef),
    Func,
    Void,
    Slice(TypeRef, TypeRef),
    Str(TypeRef),
    Map(TypeRef),
    Channel(TypeRef, TypeRef),
    ChannelBad(Offset),
    Interface(TypeRef),
    Unhandled(&'static str),
}

/// Accumulated output plus the sticky first error from one print call.
pub struct Printer {
    output: String,
    sticky_error: Option<TypeGraphError>,
    visited: HashSet<(Offset, u64)>,
}

impl Default for Printer {
    fn default() -> Self {
        Printer::new()
    }
}

impl Printer {
    pub fn new() -> Self {
        Printer { output: String::new(), sticky_error: None, visited: HashSet::new() }
    }

    /// Prints `ty` at `addr`, clearing all prior state first. Returns
    /// the accumulated text and, if any sub-print failed, the first
    /// error encountered.
    pub fn print(&mut self, ty: &TypeRef, addr: u64, oracle: &dyn TargetMemoryOracle) -> (String, Option<TypeGraphError>) {
        self.output.clear();
        self.sticky_error = None;
        self.visited.clear();
        self.print_value(ty, addr, oracle);
        (std::mem::take(&mut self.output), self.sticky_error.take())
    }

    fn fail(&mut self, err: TypeGraphError) {
        self.output.push_str(&format!("<error: {err}>"));
        if self.sticky_error.is_none() {
            self.sticky_error = Some(err);
        }
    }

    fn print_value(&mut self, ty: &TypeRef, addr: u64, oracle: &dyn TargetMemoryOracle) {
        let (offset, composite, display) = {
            let t = ty.borrow();
            (t.offset(), is_composite(&t), t.to_string())
        };

        if addr == 0 && composite {
            self.output.push_str("<nil>");
            return;
        }

        if let Some(off) = offset {
            let key = (off, addr);
            if addr != 0 {
                if self.visited.contains(&key) {
                    self.output.push_str(&format!("({display} {addr:#x})"));
                    return;
                }
                self.visited.insert(key);
            }
        }

        self.dispatch(ty, addr, &display, oracle);
    }

    fn dispatch(&mut self, ty: &TypeRef, addr: u64, display: &str, oracle: &dyn TargetMemoryOracle) {
        let plan = {
            let t = ty.borrow();
            let offset = t.offset().unwrap_or(0);
            match &*t {
                Type::Basic(b) => match b.basic {
                    Basic::Boolean => Plan::Bool(b.common.byte_size),
                    Basic::SignedInt | Basic::SignedChar => Plan::SInt(b.common.byte_size),
                    Basic::UnsignedInt | Basic::UnsignedChar => Plan::UInt(b.common.byte_size),
                    Basic::Float => Plan::Flt(b.common.byte_size),
                    Basic::ComplexFloat => Plan::Cplx(b.common.byte_size),
                    Basic::Address | Basic::Unspecified => Plan::Unhandled("basic type with no print rule"),
                },
                Type::Pointer(_) => Plan::Ptr,
                Type::Structure(s) if s.kind == StructKind::Struct => {
                    Plan::Struct(s.fields.iter().map(|f| (f.ty.clone(), f.byte_offset)).collect())
                }
                Type::Structure(_) => Plan::StructBad("union/class value printing"),
                Type::Array(a) => Plan::Array(a.element.clone(), a.count, a.stride_bits),
                Type::Typedef(td) => Plan::Typedef(td.inner.clone()),
                Type::Subroutine(_) => Plan::Func,
                Type::Void(_) => Plan::Void,
                Type::Slice(s) => Plan::Slice(ty.clone(), s.element.clone()),
                Type::Str(_) => Plan::Str(ty.clone()),
                Type::Map(_) => Plan::Map(ty.clone()),
                Type::Channel(c) => {
                    let pointee = match &*c.typedef.inner.borrow() {
                        Type::Pointer(p) => Some(p.pointee.clone()),
                        _ => None,
                    };
                    match pointee {
                        Some(pointee) => Plan::Channel(pointee, c.element.clone()),
                        None => Plan::ChannelBad(offset),
                    }
                }
                Type::Interface(_) => Plan::Interface(ty.clone()),
                other => Plan::Unhandled(other.kind_name()),
            }
        };

        match plan {
            Plan::Bool(size) => {
                if size != 1 {
                    self.fail(TypeGraphError::UnhandledType { kind: "bool with byte size other than 1" });
                    return;
                }
                match oracle.peek_uint8(addr) {
                    Ok(b) => self.output.push_str(if b != 0 { "true" } else { "false" }),
                    Err(e) => self.fail(e),
                }
            }
            Plan::Ptr => match oracle.peek_ptr(addr) {
                Ok(v) => self.output.push_str(&format!("{v:#x}")),
                Err(e) => self.fail(e),
            },
            Plan::SInt(size) => {
                if size <= 0 {
                    self.fail(TypeGraphError::UnhandledType { kind: "signed integer with unknown byte size" });
                    return;
                }
                match oracle.peek_int(addr, size as usize) {
                    Ok(v) => self.output.push_str(&v.to_string()),
                    Err(e) => self.fail(e),
                }
            }
            Plan::UInt(size) => {
                if size <= 0 {
                    self.fail(TypeGraphError::UnhandledType { kind: "unsigned integer with unknown byte size" });
                    return;
                }
                match oracle.peek_uint(addr, size as usize) {
                    Ok(v) => self.output.push_str(&v.to_string()),
                    Err(e) => self.fail(e),
                }
            }
            Plan::Flt(size) => {
                let n = match size {
                    4 => 4,
                    8 => 8,
                    _ => {
                        self.fail(TypeGraphError::UnhandledType { kind: "float with unsupported byte size" });
                        return;
                    }
                };
                let mut buf = [0u8; 8];
                match oracle.peek_bytes(addr, &mut buf[..n]) {
                    Ok(()) => {
                        let text = if n == 4 {
                            f32::from_le_bytes(buf[..4].try_into().unwrap()).to_string()
                        } else {
                            f64::from_le_bytes(buf[..8].try_into().unwrap()).to_string()
                        };
                        self.output.push_str(&text);
                    }
                    Err(e) => self.fail(e),
                }
            }
            Plan::Cplx(size) => {
                let n = match size {
                    8 => 4,
                    16 => 8,
                    _ => {
                        self.fail(TypeGraphError::UnhandledType { kind: "complex with unsupported byte size" });
                        return;
                    }
                };
                let mut re_buf = vec![0u8; n];
                let mut im_buf = vec![0u8; n];
                let read = oracle.peek_bytes(addr, &mut re_buf).and_then(|_| oracle.peek_bytes(addr + n as u64, &mut im_buf));
                match read {
                    Ok(()) => {
                        let (re, im) = if n == 4 {
                            (f32::from_le_bytes(re_buf.try_into().unwrap()) as f64, f32::from_le_bytes(im_buf.try_into().unwrap()) as f64)
                        } else {
                            (f64::from_le_bytes(re_buf.try_into().unwrap()), f64::from_le_bytes(im_buf.try_into().unwrap()))
                        };
                        let sign = if im.is_sign_negative() { "" } else { "+" };
                        self.output.push_str(&format!("({re}{sign}{im}i)"));
                    }
                    Err(e) => self.fail(e),
                }
            }
            Plan::Struct(fields) => {
                self.output.push_str(display);
                self.output.push_str(" {");
                for (i, (field_ty, byte_offset)) in fields.iter().enumerate() {
                    if i > 0 {
                        self.output.push_str(", ");
                    }
                    let child_addr = (addr as i64 + byte_offset) as u64;
                    self.print_value(field_ty, child_addr, oracle);
                }
                self.output.push('}');
            }
            Plan::StructBad(reason) => self.fail(TypeGraphError::UnhandledType { kind: reason }),
            Plan::Array(element, count, stride_bits) => {
                self.output.push_str(display);
                self.output.push('{');
                let stride = if stride_bits != 0 {
                    stride_bits / 8
                } else {
                    let elem_size = element.borrow().size();
                    if elem_size >= 0 { elem_size as u64 } else { 0 }
                };
                let n = count.max(0);
                let shown = n.min(MAX_ARRAY_ELEMENTS);
                for i in 0..shown {
                    if i > 0 {
                        self.output.push_str(", ");
                    }
                    let child_addr = addr + (i as u64) * stride;
                    self.print_value(&element, child_addr, oracle);
                }
                if n > MAX_ARRAY_ELEMENTS {
                    self.output.push_str(", ...");
                }
                self.output.push('}');
            }
            Plan::Typedef(inner) => self.print_value(&inner, addr, oracle),
            Plan::Func => self.output.push_str(&format!("{display} @{addr:#x} ")),
            Plan::Void => self.output.push_str("void"),
            Plan::Slice(struct_ty, element) => self.print_slice(&struct_ty, &element, addr, display, oracle),
            Plan::Str(string_ty) => self.print_string(&string_ty, addr, oracle),
            Plan::Map(map_ty) => self.print_map(&map_ty, addr, oracle),
            Plan::Channel(pointee, element) => self.print_channel(&pointee, &element, addr, oracle),
            Plan::ChannelBad(offset) => self.fail(TypeGraphError::BadChannelLayout { section: "chan".to_string(), offset }),
            Plan::Interface(iface_ty) => self.print_interface(&iface_ty, addr, oracle),
            Plan::Unhandled(kind) => self.fail(TypeGraphError::UnhandledType { kind }),
        }
    }

    fn print_slice(&mut self, struct_ty: &TypeRef, element: &TypeRef, addr: u64, display: &str, oracle: &dyn TargetMemoryOracle) {
        let array_ptr = match oracle.peek_ptr_struct_field(struct_ty, addr, "array") {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };
        let len = match oracle.peek_uint_or_int_struct_field(struct_ty, addr, "len") {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };
        if let Err(e) = oracle.peek_uint_or_int_struct_field(struct_ty, addr, "cap") {
            return self.fail(e);
        }
        let elem_size = {
            let sz = element.borrow().size();
            if sz >= 0 {
                sz as u64
            } else if matches!(&*element.borrow(), Type::Pointer(_)) {
                8
            } else {
                return self.fail(TypeGraphError::UnhandledType { kind: "slice element with unknown size" });
            }
        };
        self.output.push_str(display);
        self.output.push('{');
        for i in 0..len {
            if i > 0 {
                self.output.push_str(", ");
            }
            let child_addr = array_ptr + i * elem_size;
            self.print_value(element, child_addr, oracle);
        }
        self.output.push('}');
    }

    fn print_string(&mut self, string_ty: &TypeRef, addr: u64, oracle: &dyn TargetMemoryOracle) {
        match oracle.peek_string(string_ty, addr, MAX_STRING_BYTES) {
            Ok(s) => self.output.push_str(&format!("{s:?}")),
            Err(e) => self.fail(e),
        }
    }

    fn print_map(&mut self, map_ty: &TypeRef, addr: u64, oracle: &dyn TargetMemoryOracle) {
        self.output.push_str("map[");
        let mut count = 0usize;
        let mut truncated = false;
        let mut first = true;
        let result = oracle.peek_map_values(map_ty, addr, &mut |key_addr, val_addr, key_ty, val_ty| {
            count += 1;
            if count > MAX_MAP_PAIRS {
                truncated = true;
                return true;
            }
            if !first {
                self.output.push(' ');
            }
            first = false;
            self.print_value(&key_ty, key_addr, oracle);
            self.output.push(':');
            self.print_value(&val_ty, val_addr, oracle);
            false
        });
        if let Err(e) = result {
            self.fail(e);
        }
        if truncated {
            self.output.push_str(" ...");
        }
        self.output.push(']');
    }

    fn print_channel(&mut self, pointee_struct: &TypeRef, element: &TypeRef, addr: u64, oracle: &dyn TargetMemoryOracle) {
        let ptr = match oracle.peek_ptr(addr) {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };
        let elem_display = element.borrow().to_string();
        self.output.push_str(&format!("(chan {elem_display} {ptr:#x}"));
        if ptr != 0 {
            let qcount = oracle.peek_uint_or_int_struct_field(pointee_struct, ptr, "qcount");
            let dataqsiz = oracle.peek_uint_or_int_struct_field(pointee_struct, ptr, "dataqsiz");
            match (qcount, dataqsiz) {
                (Ok(q), Ok(d)) => {
                    if q != 0 || d != 0 {
                        self.output.push_str(&format!(" [{q}/{d}]"));
                    }
                }
                (Err(e), _) | (_, Err(e)) => self.fail(e),
            }
        }
        self.output.push(')');
    }

    fn print_interface(&mut self, iface_ty: &TypeRef, addr: u64, oracle: &dyn TargetMemoryOracle) {
        let section = "interface".to_string();
        let offset = iface_ty.borrow().offset().unwrap_or(0);
        let iface_struct = match resolve_struct(iface_ty) {
            Some(s) => s,
            None => return self.fail(TypeGraphError::BadInterfaceLayout { section, offset }),
        };
        let tab_ptr = match oracle.peek_ptr_struct_field(&iface_struct, addr, "tab") {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };
        let data_ptr = match oracle.peek_ptr_struct_field(&iface_struct, addr, "data") {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };

        let type_name = if tab_ptr == 0 {
            None
        } else {
            match resolve_interface_type_name(tab_ptr, &section, offset, oracle) {
                Ok(name) => Some(name),
                Err(e) => return self.fail(e),
            }
        };

        let data_str = if data_ptr == 0 { "<nil>".to_string() } else { format!("{data_ptr:#x}") };
        self.output.push_str(&format!("({}, {})", type_name.as_deref().unwrap_or("<nil>"), data_str));
    }
}

fn resolve_interface_type_name(tab_ptr: u64, section: &str, offset: Offset, oracle: &dyn TargetMemoryOracle) -> Result<String> {
    let bad = || TypeGraphError::BadInterfaceLayout { section: section.to_string(), offset };

    let type_ptr = oracle.peek_ptr(tab_ptr + ITAB_TYPE_OFFSET)?;
    if type_ptr == 0 {
        return Err(bad());
    }
    let string_header_ptr = oracle.peek_ptr(type_ptr + RTYPE_STRING_OFFSET)?;
    if string_header_ptr == 0 {
        return Err(bad());
    }
    let data_ptr = oracle.peek_ptr(string_header_ptr)?;
    let len = oracle.peek_uint(string_header_ptr + 8, 8)?;
    if len > MAX_TYPE_NAME_LEN {
        return Err(bad());
    }
    let mut buf = vec![0u8; len as usize];
    oracle.peek_bytes(data_ptr, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;
    use crate::types::{ArrayType, BasicType, Common, Field, MapType, PointerType, SliceType, StringType, StructureType};

    fn int_type(offset: Offset, byte_size: i64) -> TypeRef {
        Type::new_ref(Type::Basic(BasicType {
            common: Common { name: "int32".to_string(), byte_size, ..Common::new(offset) },
            basic: Basic::SignedInt,
            bit_size: 0,
            bit_offset: 0,
        }))
    }

    fn bool_type(offset: Offset) -> TypeRef {
        Type::new_ref(Type::Basic(BasicType {
            common: Common { name: "bool".to_string(), byte_size: 1, ..Common::new(offset) },
            basic: Basic::Boolean,
            bit_size: 0,
            bit_offset: 0,
        }))
    }

    #[test]
    fn prints_struct_with_bool_and_int_fields() {
        let struct_ty = Type::new_ref(Type::Structure(StructureType {
            common: Common { name: "Point".to_string(), byte_size: 8, ..Common::new(1) },
            kind: StructKind::Struct,
            tag_name: Some("Point".to_string()),
            fields: vec![
                Field { name: "ok".to_string(), ty: bool_type(2), byte_offset: 0, byte_size: 1, bit_offset: 0, bit_size: 0 },
                Field { name: "n".to_string(), ty: int_type(3, 4), byte_offset: 4, byte_size: 4, bit_offset: 0, bit_size: 0 },
            ],
            incomplete: false,
        }));
        let mut oracle = MockOracle::new();
        oracle.write_bytes(0x100, &[1]);
        oracle.write_i64(0x104, 42);
        let mut printer = Printer::new();
        let (text, err) = printer.print(&struct_ty, 0x100, &oracle);
        assert!(err.is_none());
        assert_eq!(text, "struct Point {true, 42}");
    }

    #[test]
    fn array_of_250_elements_truncates_at_100() {
        let elem = int_type(1, 4);
        let arr = Type::new_ref(Type::Array(ArrayType { common: Common::new(2), element: elem, stride_bits: 0, count: 250 }));
        let mut oracle = MockOracle::new();
        for i in 0..250u64 {
            oracle.write_i64(i * 4, i as i64);
        }
        let mut printer = Printer::new();
        let (text, err) = printer.print(&arr, 0, &oracle);
        assert!(err.is_none());
        assert!(text.ends_with(", ...}"));
        assert_eq!(text.matches(", ").count(), 100); // 99 inter-element separators + the truncation marker's own
    }

    #[test]
    fn array_with_explicit_byte_stride_uses_it_over_element_size() {
        // int32 elements padded to 8 bytes apart instead of 4.
        let elem = int_type(1, 4);
        let arr = Type::new_ref(Type::Array(ArrayType { common: Common::new(2), element: elem, stride_bits: 64, count: 3 }));
        let mut oracle = MockOracle::new();
        oracle.write_i64(0, 10);
        oracle.write_i64(8, 20);
        oracle.write_i64(16, 30);
        let mut printer = Printer::new();
        let (text, err) = printer.print(&arr, 0, &oracle);
        assert!(err.is_none());
        assert_eq!(text, "[3]int32{10, 20, 30}");
    }

    #[test]
    fn slice_of_strings_prints_all_elements() {
        let string_ty = Type::new_ref(Type::Str(StringType {
            structure: StructureType { common: Common::new(1), kind: StructKind::Struct, tag_name: None, fields: vec![], incomplete: false },
        }));
        let slice_ty = Type::new_ref(Type::Slice(SliceType {
            structure: StructureType {
                common: Common::new(2),
                kind: StructKind::Struct,
                tag_name: None,
                fields: vec![
                    Field { name: "array".to_string(), ty: int_type(3, 8), byte_offset: 0, byte_size: 8, bit_offset: 0, bit_size: 0 },
                    Field { name: "len".to_string(), ty: int_type(4, 8), byte_offset: 8, byte_size: 8, bit_offset: 0, bit_size: 0 },
                    Field { name: "cap".to_string(), ty: int_type(5, 8), byte_offset: 16, byte_size: 8, bit_offset: 0, bit_size: 0 },
                ],
                incomplete: false,
            },
            element: string_ty,
        }));

        let mut oracle = MockOracle::new();
        // runtime slice header at 0x200: array=0x300, len=3, cap=3
        oracle.write_u64(0x200, 0x300);
        oracle.write_u64(0x208, 3);
        oracle.write_u64(0x210, 3);
        // three 16-byte string headers starting at 0x300
        oracle.write_string_header(0x300, 0x1000, "a");
        oracle.write_string_header(0x310, 0x1010, "bb");
        oracle.write_string_header(0x320, 0x1020, "ccc");

        let mut printer = Printer::new();
        let (text, err) = printer.print(&slice_ty, 0x200, &oracle);
        assert!(err.is_none());
        assert_eq!(text, "[]string{\"a\", \"bb\", \"ccc\"}");
    }

    #[test]
    fn map_with_20_entries_prints_8_then_ellipsis() {
        let key_ty = int_type(10, 4);
        let val_ty = int_type(11, 4);
        let map_ty = Type::new_ref(Type::Map(MapType {
            typedef: crate::types::TypedefType { common: Common::new(1), inner: int_type(2, 8) },
            key: key_ty,
            element: val_ty,
        }));
        let mut oracle = MockOracle::new();
        let mut entries = Vec::new();
        for i in 0..20u64 {
            let key_addr = 0x1000 + i * 16;
            let val_addr = key_addr + 8;
            oracle.write_i64(key_addr as i64 as u64, i as i64);
            oracle.write_i64(val_addr, (i * 10) as i64);
            entries.push((key_addr, val_addr));
        }
        oracle.register_map(0x500, entries);

        let mut printer = Printer::new();
        let (text, err) = printer.print(&map_ty, 0x500, &oracle);
        assert!(err.is_none());
        assert!(text.starts_with("map["));
        assert!(text.ends_with(" ...]"));
        assert_eq!(text.matches(':').count(), 8);
    }

    #[test]
    fn pointer_prints_hex_value() {
        let pointee = int_type(1, 4);
        let ptr_ty = Type::new_ref(Type::Pointer(PointerType { common: Common::new(2), pointee }));
        let mut oracle = MockOracle::new();
        oracle.write_u64(0x50, 0xdeadbeef);
        let mut printer = Printer::new();
        let (text, err) = printer.print(&ptr_ty, 0x50, &oracle);
        assert!(err.is_none());
        assert_eq!(text, "0xdeadbeef");
    }

    #[test]
    fn composite_at_address_zero_is_nil() {
        let struct_ty = Type::new_ref(Type::Structure(StructureType {
            common: Common::new(1),
            kind: StructKind::Struct,
            tag_name: Some("S".to_string()),
            fields: vec![],
            incomplete: false,
        }));
        let mut printer = Printer::new();
        let oracle = MockOracle::new();
        let (text, err) = printer.print(&struct_ty, 0, &oracle);
        assert!(err.is_none());
        assert_eq!(text, "<nil>");
    }

    #[test]
    fn union_value_printing_is_an_error() {
        let union_ty = Type::new_ref(Type::Structure(StructureType {
            common: Common::new(1),
            kind: StructKind::Union,
            tag_name: Some("U".to_string()),
            fields: vec![],
            incomplete: false,
        }));
        let mut printer = Printer::new();
        let oracle = MockOracle::new();
        let (text, err) = printer.print(&union_ty, 0x10, &oracle);
        assert!(err.is_some());
        assert!(text.contains("<error:"));
    }
}
