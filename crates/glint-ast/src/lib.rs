//! Glint AST - arena-allocated syntax tree for the shader translator
//!
//! This crate defines the tree that the middle-end operates on: node kinds,
//! GLSL ES types, the arena that owns every node, and the builder helpers
//! used by rewrite passes to synthesize new subtrees. The parser that
//! produces the tree and the backends that consume it live elsewhere; this
//! crate is only the data model and its construction utilities.
//!
//! Nodes are identified by [`NodeId`] handles into a per-compile [`Ast`]
//! arena. Appending new nodes never invalidates existing handles, which is
//! what lets rewrite passes build replacement subtrees while a traversal of
//! the old tree is still in flight.

mod arena;
mod builder;
mod context;
mod node;
mod op;
mod printer;
mod query;
mod span;
mod types;

pub use arena::*;
pub use builder::*;
pub use context::*;
pub use node::*;
pub use op::*;
pub use printer::*;
pub use query::*;
pub use span::*;
pub use types::*;
