//! The DIE cursor adapter (§4.2): reads the direct children of a parent
//! entry that declares `DW_CHILDREN_yes`, silently skipping over any
//! DIE sub-trees nested inside them — a workaround some producers need
//! because they occasionally emit a composite type's definition inline
//! inside another composite instead of referencing it by offset.

use crate::die::{Advance, EntryReader, RawDie};
use crate::error::{Result, TypeGraphError};

/// Borrows a reader positioned right after a parent DIE with children,
/// and yields that parent's direct children only.
pub struct Cursor<'r> {
    reader: &'r mut EntryReader,
    depth: u32,
}

impl<'r> Cursor<'r> {
    pub fn new(reader: &'r mut EntryReader) -> Self {
        Cursor { reader, depth: 0 }
    }

    /// Borrows the underlying reader so a caller can clone it to
    /// recurse into an attribute-referenced offset without disturbing
    /// this cursor's own position.
    pub fn reader(&self) -> &EntryReader {
        self.reader
    }

    /// Returns the next direct child, or `None` once the parent's own
    /// terminating `Null` is reached.
    pub fn next_child(&mut self) -> Result<Option<RawDie>> {
        loop {
            let section = self.reader.section_name().to_string();
            match self.reader.advance() {
                None => return Err(TypeGraphError::TruncatedEntries { section }),
                Some(Advance::Null) => {
                    if self.depth == 0 {
                        return Ok(None);
                    }
                    self.depth -= 1;
                }
                Some(Advance::Die(die)) => {
                    let yield_this = self.depth == 0;
                    if die.has_children {
                        self.depth += 1;
                    }
                    if yield_this {
                        return Ok(Some(die));
                    }
                    // Nested sub-tree of a non-direct child: consumed silently.
                }
            }
        }
    }
}
