//! Errors from call graph construction

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GraphError {
    /// Recursion in the shader's call graph. The chain lists mangled
    /// function names in call order, ending with the repeated function.
    #[error("recursive function call in the chain: {}", .chain.join(" -> "))]
    RecursiveCallChain { chain: Vec<String> },
}

impl GraphError {
    /// Error code for machine-readable output
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::RecursiveCallChain { .. } => "E-GRAPH-001",
        }
    }
}
