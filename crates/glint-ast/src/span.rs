//! Source location tracking

use serde::{Deserialize, Serialize};

/// A range of source lines, as reported by the shader front-end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// First line of the construct (1-based)
    pub first_line: u32,
    /// Last line of the construct
    pub last_line: u32,
}

impl Span {
    pub fn new(first_line: u32, last_line: u32) -> Self {
        Self {
            first_line,
            last_line,
        }
    }

    /// Span for synthesized nodes that have no source position
    pub fn dummy() -> Self {
        Self {
            first_line: 0,
            last_line: 0,
        }
    }

    /// Merge two spans into one that covers both
    pub fn merge(self, other: Span) -> Span {
        Span {
            first_line: self.first_line.min(other.first_line),
            last_line: self.last_line.max(other.last_line),
        }
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::dummy()
    }
}
