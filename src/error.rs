//! The closed error-kind set shared by the decoder and the printer.

use thiserror::Error;

/// Errors raised while materializing a type graph from DWARF DIEs, or
/// while walking that graph to print a value.
///
/// Every variant carries enough context (`section`, `offset`) to satisfy
/// the "section name, DIE offset, short kind description" error-string
/// contract without each call site having to hand-build the message.
#[derive(Error, Debug)]
pub enum TypeGraphError {
    #[error("{section}: no type at offset {offset:#x}")]
    NoTypeAtOffset { section: String, offset: u64 },

    #[error("{section}: offset {offset:#x}: missing DW_AT_encoding")]
    MissingEncoding { section: String, offset: u64 },

    #[error("{section}: offset {offset:#x}: unrecognized DW_AT_encoding {encoding:#x}")]
    BadEncoding { section: String, offset: u64, encoding: u64 },

    #[error("{section}: offset {offset:#x}: enumeration type used as array subrange bound")]
    BadArrayBound { section: String, offset: u64 },

    #[error("{section}: offset {offset:#x}: unexpected opcode {opcode:#x} in location expression")]
    UnexpectedOpcode { section: String, offset: u64, opcode: u8 },

    #[error("{section}: entry stream ended before a composite's children were fully read")]
    TruncatedEntries { section: String },

    #[error("{section}: offset {offset:#x}: interface value does not match the expected runtime layout")]
    BadInterfaceLayout { section: String, offset: u64 },

    #[error("{section}: offset {offset:#x}: channel value does not match the expected runtime layout")]
    BadChannelLayout { section: String, offset: u64 },

    #[error("target-memory oracle error: {0}")]
    OracleError(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("printer: {kind} has no defined value-printing format")]
    UnhandledType { kind: &'static str },
}

impl TypeGraphError {
    pub fn oracle(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        TypeGraphError::OracleError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, TypeGraphError>;
