//! Metadata attachments and debug locations.

use std::fmt;

/// Source location attached to an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DebugLoc {
    pub line: u32,
    pub column: u32,
}

impl DebugLoc {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for DebugLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A metadata node attached to an instruction under a kind ID
/// (see [`Context::md_kind_id`](crate::Context::md_kind_id)).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Metadata {
    String(String),
    Integer(i128),
    Location(DebugLoc),
    Tuple(Vec<Metadata>),
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metadata::String(s) => write!(f, "!\"{}\"", s.escape_default()),
            Metadata::Integer(i) => write!(f, "{i}"),
            Metadata::Location(loc) => write!(f, "!{{line: {}, column: {}}}", loc.line, loc.column),
            Metadata::Tuple(items) => {
                f.write_str("!{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
        }
    }
}
