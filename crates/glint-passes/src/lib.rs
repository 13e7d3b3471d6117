//! Glint passes - analyses and rewrite passes over the shader AST
//!
//! This crate holds the middle of the translator: the traversal framework
//! every rewrite pass is built on ([`traverse`]), the whole-program
//! analyses driven by the call DAG ([`analysis`]), and the concrete passes
//! ([`passes`]). [`run_pipeline`] wires them together for one compile:
//! build the DAG, run the configured passes in order, rebuild the DAG if a
//! pass changed the function set, and finish with the analyses whose
//! results the code generators consume.

pub mod analysis;
mod error;
pub mod passes;
pub mod pattern;
pub mod traverse;

pub use analysis::{compute_metadata, FunctionMetadata};
pub use error::PassError;
pub use passes::{PassResult, RewritePass};
pub use traverse::{AstVisitor, Insertion, Replacement, Traversal, Visit};

use glint_ast::{Ast, CompileContext, NodeId};
use glint_graph::{CallDag, GraphError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Pass(#[from] PassError),
}

/// Which passes one compile runs. Backends differ: a settings value is
/// built per target and handed to [`run_pipeline`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineSettings {
    /// Hoisting mask for loop headers (see [`pattern`]); `None` skips the
    /// pass entirely
    pub simplify_loop_conditions: Option<u32>,
    pub vectorize_vector_scalar: bool,
    pub emulate_yuv_builtins: bool,
    pub rewrite_texture_cube_grad: bool,
    pub rewrite_pixel_local_storage: bool,
    pub remove_dynamic_indexing: bool,
    pub emulate_precision: bool,
}

impl PipelineSettings {
    /// Every pass enabled; used by tests and the most constrained backends
    pub fn all() -> Self {
        Self {
            simplify_loop_conditions: Some(pattern::HOIST_ALL),
            vectorize_vector_scalar: true,
            emulate_yuv_builtins: true,
            rewrite_texture_cube_grad: true,
            rewrite_pixel_local_storage: true,
            remove_dynamic_indexing: true,
            emulate_precision: true,
        }
    }
}

/// Everything a backend needs after the middle-end is done
#[derive(Debug)]
pub struct PipelineResult {
    /// Valid for the tree as the passes left it
    pub dag: CallDag,
    /// Indexed like `dag`
    pub metadata: Vec<FunctionMetadata>,
    pub modified: bool,
    /// Textual helper definitions for compound-assignment rounding, to be
    /// prepended to the generated source
    pub precision_helpers: String,
}

/// Run the configured passes over the program rooted at `root`.
///
/// The call DAG is built first so recursion fails the compile before any
/// rewriting happens, rebuilt when a pass changes the function set, and
/// returned alongside the analyses computed from the final tree.
pub fn run_pipeline(
    ast: &mut Ast,
    root: NodeId,
    ctx: &mut CompileContext,
    settings: PipelineSettings,
) -> Result<PipelineResult, PipelineError> {
    let mut dag = CallDag::build(ast, root)?;
    let mut total = PassResult::default();

    if let Some(mask) = settings.simplify_loop_conditions {
        total.merge(passes::simplify_loop_conditions(ast, root, ctx, mask)?);
    }
    if settings.vectorize_vector_scalar {
        total.merge(passes::vectorize_vector_scalar(ast, root, ctx)?);
    }
    if settings.emulate_yuv_builtins {
        total.merge(passes::emulate_yuv_builtins(ast, root, ctx)?);
    }
    if settings.rewrite_texture_cube_grad {
        total.merge(passes::rewrite_texture_cube_grad(ast, root, ctx)?);
    }
    if settings.rewrite_pixel_local_storage {
        total.merge(passes::rewrite_pixel_local_storage(ast, root, ctx)?);
    }
    if settings.remove_dynamic_indexing {
        total.merge(passes::remove_dynamic_indexing(ast, root, ctx)?);
    }

    let mut precision_helpers = String::new();
    if settings.emulate_precision {
        let emulation = passes::emulate_precision(ast, root)?;
        emulation.write_helpers(&mut precision_helpers);
    }

    // Synthesized helpers invalidated the indices and the name table
    if total.functions_changed {
        dag.clear();
        dag = CallDag::build(ast, root)?;
    }

    let metadata = compute_metadata(ast, &dag);

    Ok(PipelineResult {
        dag,
        metadata,
        modified: total.modified,
        precision_helpers,
    })
}
