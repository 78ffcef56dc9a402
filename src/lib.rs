//! Reconstructs a program's source-level type graph from DWARF debugging
//! information and uses it to pretty-print values read out of a target
//! process's address space.
//!
//! The crate is split into the two coupled subsystems the design is built
//! around: [`decoder`] materializes a [`types::Type`] graph from DWARF
//! offsets, and [`printer`] walks that graph against addresses through a
//! [`oracle::TargetMemoryOracle`]. Everything else ([`die`], [`leb`],
//! [`cursor`], [`loc`]) is plumbing those two subsystems share.

pub mod cursor;
pub mod decoder;
pub mod die;
pub mod error;
pub mod leb;
pub mod loc;
pub mod oracle;
pub mod printer;
pub mod types;

pub use decoder::{decode_type, Cache};
pub use error::{Result, TypeGraphError};
pub use oracle::TargetMemoryOracle;
pub use printer::Printer;
pub use types::{Type, TypeRef};
