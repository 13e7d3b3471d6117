//! Whole-program analyses over the call DAG
//!
//! Every analysis here has the same shape: one fact per function, computed
//! in call-DAG index order so a function's callees are always done first.

mod metadata;

pub use metadata::{compute_metadata, FunctionMetadata};
