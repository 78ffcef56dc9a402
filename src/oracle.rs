//! The target-memory oracle (§4.6): the surface the value printer
//! requires from the debugger side. This crate only declares the trait
//! and, for tests and the demo binary, a small in-memory
//! [`MockOracle`] standing in for a real ptrace/process-read backend.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, TypeGraphError};
use crate::types::{Type, TypeRef};

/// Per-entry callback invoked while enumerating a map's buckets.
/// Returns `true` to stop enumeration early.
pub type MapEntryCallback<'a> = dyn FnMut(u64, u64, TypeRef, TypeRef) -> bool + 'a;

/// Declared surface the printer needs from the debugger side (§4.6).
/// Every method may fail; the printer inlines the failure and keeps
/// going where it can (§7).
pub trait TargetMemoryOracle {
    fn peek_uint8(&self, addr: u64) -> Result<u8>;
    fn peek_ptr(&self, addr: u64) -> Result<u64>;
    fn peek_int(&self, addr: u64, size: usize) -> Result<i64>;
    fn peek_uint(&self, addr: u64, size: usize) -> Result<u64>;
    fn peek_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<()>;
    fn peek_string(&self, string_type: &TypeRef, addr: u64, max_len: usize) -> Result<String>;
    fn peek_ptr_struct_field(&self, struct_type: &TypeRef, addr: u64, field_name: &str) -> Result<u64>;
    fn peek_uint_or_int_struct_field(&self, struct_type: &TypeRef, addr: u64, field_name: &str) -> Result<u64>;
    fn peek_map_values(&self, map_type: &TypeRef, addr: u64, callback: &mut MapEntryCallback<'_>) -> Result<()>;
}

#[derive(Debug)]
struct MockOracleError(String);

impl fmt::Display for MockOracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MockOracleError {}

fn mock_err(msg: impl Into<String>) -> TypeGraphError {
    TypeGraphError::oracle(MockOracleError(msg.into()))
}

/// A tiny byte-addressable in-memory target, for tests and the demo
/// binary. Strings are modeled as the Go two-word header: 8 bytes of
/// pointer followed by 8 bytes of length, little-endian.
#[derive(Default)]
pub struct MockOracle {
    memory: HashMap<u64, u8>,
    maps: HashMap<u64, Vec<(u64, u64)>>,
}

impl MockOracle {
    pub fn new() -> Self {
        MockOracle::default()
    }

    pub fn write_bytes(&mut self, addr: u64, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.memory.insert(addr + i as u64, *b);
        }
    }

    pub fn write_u64(&mut self, addr: u64, value: u64) {
        self.write_bytes(addr, &value.to_le_bytes());
    }

    pub fn write_i64(&mut self, addr: u64, value: i64) {
        self.write_bytes(addr, &value.to_le_bytes());
    }

    pub fn write_string_header(&mut self, header_addr: u64, data_addr: u64, s: &str) {
        self.write_bytes(data_addr, s.as_bytes());
        self.write_u64(header_addr, data_addr);
        self.write_u64(header_addr + 8, s.len() as u64);
    }

    pub fn register_map(&mut self, map_addr: u64, entries: Vec<(u64, u64)>) {
        self.maps.insert(map_addr, entries);
    }

    fn read_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        for i in 0..len as u64 {
            out.push(*self.memory.get(&(addr + i)).ok_or_else(|| mock_err(format!("unmapped address {:#x}", addr + i)))?);
        }
        Ok(out)
    }

    fn field(&self, struct_type: &TypeRef, field_name: &str) -> Result<(i64, i64)> {
        let ty = struct_type.borrow();
        let structure = ty
            .as_structure()
            .ok_or_else(|| mock_err(format!("{} is not a struct-shaped type", ty.kind_name())))?;
        let field = structure
            .fields
            .iter()
            .find(|f| f.name == field_name)
            .ok_or_else(|| mock_err(format!("no field named {field_name:?}")))?;
        let size = if field.byte_size >= 0 { field.byte_size } else { field.ty.borrow().size() };
        Ok((field.byte_offset, size))
    }
}

impl TargetMemoryOracle for MockOracle {
    fn peek_uint8(&self, addr: u64) -> Result<u8> {
        Ok(self.read_bytes(addr, 1)?[0])
    }

    fn peek_ptr(&self, addr: u64) -> Result<u64> {
        self.peek_uint(addr, 8)
    }

    fn peek_int(&self, addr: u64, size: usize) -> Result<i64> {
        let bytes = self.read_bytes(addr, size)?;
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(&bytes);
        let mut v = i64::from_le_bytes(buf);
        // Sign-extend if the stored width is narrower than 8 bytes.
        if size < 8 {
            let shift = (8 - size) * 8;
            v = (v << shift) >> shift;
        }
        Ok(v)
    }

    fn peek_uint(&self, addr: u64, size: usize) -> Result<u64> {
        let bytes = self.read_bytes(addr, size)?;
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn peek_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let bytes = self.read_bytes(addr, buf.len())?;
        buf.copy_from_slice(&bytes);
        Ok(())
    }

    fn peek_string(&self, _string_type: &TypeRef, addr: u64, max_len: usize) -> Result<String> {
        let data_addr = self.peek_uint(addr, 8)?;
        let len = self.peek_uint(addr + 8, 8)? as usize;
        let len = len.min(max_len);
        let bytes = self.read_bytes(data_addr, len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn peek_ptr_struct_field(&self, struct_type: &TypeRef, addr: u64, field_name: &str) -> Result<u64> {
        let (offset, _) = self.field(struct_type, field_name)?;
        self.peek_ptr((addr as i64 + offset) as u64)
    }

    fn peek_uint_or_int_struct_field(&self, struct_type: &TypeRef, addr: u64, field_name: &str) -> Result<u64> {
        let (offset, size) = self.field(struct_type, field_name)?;
        let size = if size > 0 { size as usize } else { 8 };
        self.peek_uint((addr as i64 + offset) as u64, size)
    }

    fn peek_map_values(&self, map_type: &TypeRef, addr: u64, callback: &mut MapEntryCallback<'_>) -> Result<()> {
        let (key_ty, elem_ty) = {
            let ty = map_type.borrow();
            match &*ty {
                Type::Map(m) => (m.key.clone(), m.element.clone()),
                other => return Err(mock_err(format!("{} is not a map type", other.kind_name()))),
            }
        };
        if let Some(entries) = self.maps.get(&addr) {
            for &(key_addr, val_addr) in entries {
                if callback(key_addr, val_addr, key_ty.clone(), elem_ty.clone()) {
                    break;
                }
            }
        }
        Ok(())
    }
}
