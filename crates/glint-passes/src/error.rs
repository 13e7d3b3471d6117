//! Errors from applying staged tree edits
//!
//! These are compiler bugs surfacing, not input errors: every locus in a
//! staged edit was captured from the live tree during the same pass, so a
//! mismatch means a pass violated the read/stage/apply contract.

use glint_ast::NodeId;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PassError {
    #[error("staged replacement does not match the tree: {original:?} is not a child of {parent:?}")]
    ReplacementMismatch { parent: NodeId, original: NodeId },

    #[error("staged insertion at {position} does not fit block {block:?}")]
    InsertionMismatch { block: NodeId, position: usize },
}

impl PassError {
    /// Error code for machine-readable output
    pub fn code(&self) -> &'static str {
        match self {
            PassError::ReplacementMismatch { .. } => "E-PASS-001",
            PassError::InsertionMismatch { .. } => "E-PASS-002",
        }
    }
}
