//! Glint call graph - whole-program function call structure
//!
//! This crate turns a parsed shader into a [`CallDag`]: every user-defined
//! function gets a record and a topological index such that every callee's
//! index is smaller than its callers'. Analyses and rewrite passes consume
//! the DAG in ascending index order so per-function results are always ready
//! before the functions that depend on them.
//!
//! Shader source cannot legally recurse; a call cycle is the one hard
//! failure of construction and is reported with the full chain of function
//! names so the author can find it.

mod builder;
mod dag;
mod error;
mod indexer;

pub use dag::{CallDag, FunctionRecord};
pub use error::GraphError;
