//! Concrete rewrite passes
//!
//! Each pass is one instance of the traverse/stage/apply protocol from
//! [`crate::traverse`]: a match predicate, a replacement construction, and
//! the shared fixed-point loop. Passes expose both a free entry-point
//! function and a [`RewritePass`] implementation so the pipeline can hold
//! them behind one trait.

pub mod emulate_precision;
pub mod emulate_yuv_builtins;
pub mod remove_dynamic_indexing;
pub mod rewrite_pixel_local_storage;
pub mod rewrite_texture_cube_grad;
pub mod simplify_loop_conditions;
pub mod vectorize_vector_scalar;

pub use emulate_precision::{emulate_precision, EmulatePrecision, PrecisionEmulation};
pub use emulate_yuv_builtins::{emulate_yuv_builtins, EmulateYuvBuiltins};
pub use remove_dynamic_indexing::{remove_dynamic_indexing, RemoveDynamicIndexing};
pub use rewrite_pixel_local_storage::{rewrite_pixel_local_storage, RewritePixelLocalStorage};
pub use rewrite_texture_cube_grad::{rewrite_texture_cube_grad, RewriteTextureCubeGrad};
pub use simplify_loop_conditions::{simplify_loop_conditions, SimplifyLoopConditions};
pub use vectorize_vector_scalar::{vectorize_vector_scalar, VectorizeVectorScalar};

use crate::error::PassError;
use glint_ast::{Ast, CompileContext, NodeId};

/// What a pass did to the tree
#[derive(Debug, Clone, Copy, Default)]
pub struct PassResult {
    pub modified: bool,
    /// The pass added or removed functions; the call DAG is stale and must
    /// be rebuilt before the next analysis
    pub functions_changed: bool,
}

impl PassResult {
    pub fn merge(&mut self, other: PassResult) {
        self.modified |= other.modified;
        self.functions_changed |= other.functions_changed;
    }
}

/// A tree-to-tree rewrite with a single entry point
pub trait RewritePass {
    fn name(&self) -> &'static str;

    fn run(
        &mut self,
        ast: &mut Ast,
        root: NodeId,
        ctx: &mut CompileContext,
    ) -> Result<PassResult, PassError>;
}
