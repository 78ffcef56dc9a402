//! Location-expression mini-evaluator (§4.3). Decodes a field's
//! `DW_AT_data_member_location` into a signed byte offset, recognizing
//! exactly two expression shapes and nothing else — a full DWARF
//! expression evaluator is out of scope for this crate.

use crate::die::AttrValue;
use crate::error::{Result, TypeGraphError};
use crate::leb::{ileb128_decode, uleb128_decode};

const OP_PLUS_UCONST: u8 = 0x23;
const OP_CONSTS: u8 = 0x11;
const OP_PLUS: u8 = 0x22;

/// Evaluates a `DW_AT_data_member_location` attribute value into a
/// signed byte offset. A missing attribute is offset 0. A plain integer
/// value (rather than an expression byte string) is used verbatim.
pub fn eval_member_location(section: &str, offset: u64, attr: Option<&AttrValue>) -> Result<i64> {
    match attr {
        None => Ok(0),
        Some(AttrValue::ExprLoc(bytes)) => eval_expr(section, offset, bytes),
        Some(other) => other.as_i64().ok_or_else(|| TypeGraphError::UnexpectedOpcode {
            section: section.to_string(),
            offset,
            opcode: 0,
        }),
    }
}

fn eval_expr(section: &str, offset: u64, bytes: &[u8]) -> Result<i64> {
    if bytes.is_empty() {
        return Ok(0);
    }
    let opcode = bytes[0];
    let unexpected = |opcode: u8| TypeGraphError::UnexpectedOpcode {
        section: section.to_string(),
        offset,
        opcode,
    };
    match opcode {
        OP_PLUS_UCONST => {
            let (value, consumed) = uleb128_decode(&bytes[1..]).map_err(|_| unexpected(opcode))?;
            if 1 + consumed != bytes.len() {
                return Err(unexpected(opcode));
            }
            Ok(value as i64)
        }
        OP_CONSTS => {
            let (value, consumed) = ileb128_decode(&bytes[1..]).map_err(|_| unexpected(opcode))?;
            let mut pos = 1 + consumed;
            if bytes.get(pos) != Some(&OP_PLUS) {
                return Err(unexpected(opcode));
            }
            pos += 1;
            if pos != bytes.len() {
                return Err(unexpected(opcode));
            }
            Ok(value)
        }
        _ => Err(unexpected(opcode)),
    }
}
