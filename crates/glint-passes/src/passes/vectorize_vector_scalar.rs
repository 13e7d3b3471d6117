//! Turns float vector-scalar arithmetic into vector-vector arithmetic
//!
//! Works around a driver miscompilation of mixed vector/scalar addition:
//! the scalar operand is wrapped in a vector constructor so the backend
//! only ever sees vector-vector operations. Scalar multiplications and
//! divisions that appear as the single argument of a vector constructor
//! are vectorized the same way. One replacement per subtree per iteration;
//! the pass iterates to its fixed point.

use crate::error::PassError;
use crate::passes::{PassResult, RewritePass};
use crate::traverse::{AstVisitor, Traversal, Visit};
use glint_ast::{
    binary, constructor, Ast, BasicType, BinaryOp, CompileContext, NodeId, NodeKind, Qualifier,
    Type,
};

struct VectorizeVisitor {
    replaced: bool,
}

/// Wrap a scalar expression in a constructor of `vector_ty`
fn vectorize(ast: &mut Ast, node: NodeId, vector_ty: Type) -> NodeId {
    debug_assert!(ast.node(node).ty.is_scalar());
    let ty = vector_ty.with_qualifier(Qualifier::Temporary);
    constructor(ast, ty, vec![node])
}

impl AstVisitor for VectorizeVisitor {
    fn visit_binary(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        if visit != Visit::Pre {
            return true;
        }
        let NodeKind::Binary { op, left, right } = ast.node(node).kind else {
            unreachable!("binary hook on non-binary node");
        };
        // Only these specific ops have reproduced the driver bug
        if !matches!(op, BinaryOp::Add | BinaryOp::AddAssign) {
            return true;
        }
        if ast.node(node).ty.basic != BasicType::Float {
            return true;
        }

        let left_ty = ast.node(left).ty;
        let right_ty = ast.node(right).ty;
        if left_ty.is_scalar() && right_ty.is_vector() && !right_ty.is_array() {
            debug_assert!(!op.is_assignment());
            let left_vectorized = vectorize(ast, left, right_ty);
            t.queue_replacement_with_parent(node, left, left_vectorized);
            self.replaced = true;
            // Leave the rest of this subtree for the next iteration
            return false;
        }
        if left_ty.is_vector() && right_ty.is_scalar() {
            let right_vectorized = vectorize(ast, right, left_ty);
            t.queue_replacement_with_parent(node, right, right_vectorized);
            self.replaced = true;
            return false;
        }
        true
    }

    fn visit_constructor(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        if visit != Visit::Pre {
            return true;
        }
        let constructor_ty = ast.node(node).ty;
        let NodeKind::Constructor { args } = &ast.node(node).kind else {
            unreachable!("constructor hook on non-constructor node");
        };
        if !constructor_ty.is_vector() || args.len() != 1 {
            return true;
        }
        let argument = args[0];
        let argument_ty = ast.node(argument).ty;
        if !argument_ty.is_scalar() || argument_ty.basic != BasicType::Float {
            return true;
        }
        let NodeKind::Binary { op, left, right } = ast.node(argument).kind else {
            return true;
        };
        match op {
            BinaryOp::Mul | BinaryOp::Div => {
                debug_assert!(ast.node(left).ty.is_scalar() && ast.node(right).ty.is_scalar());
                // Turn vecN(a op b) into vecN(vecN(a) op vecN(b))
                let element_vector = Type::vector(
                    BasicType::Float,
                    argument_ty.precision,
                    constructor_ty.nominal_size(),
                );
                let left_vectorized = vectorize(ast, left, element_vector);
                let right_vectorized = vectorize(ast, right, element_vector);
                let vectorized = binary(
                    ast,
                    op,
                    left_vectorized,
                    right_vectorized,
                    element_vector.with_qualifier(Qualifier::Temporary),
                );
                t.queue_replacement_with_parent(node, argument, vectorized);
                self.replaced = true;
                false
            }
            _ => true,
        }
    }
}

/// Iterate the vectorization to its fixed point
pub fn vectorize_vector_scalar(
    ast: &mut Ast,
    root: NodeId,
    _ctx: &mut CompileContext,
) -> Result<PassResult, PassError> {
    let mut modified = false;
    loop {
        let mut visitor = VectorizeVisitor { replaced: false };
        let mut traversal = Traversal::new();
        traversal.traverse(&mut visitor, ast, root);
        traversal.update_tree(ast)?;
        if !visitor.replaced {
            break;
        }
        modified = true;
    }
    Ok(PassResult {
        modified,
        functions_changed: false,
    })
}

#[derive(Debug, Default)]
pub struct VectorizeVectorScalar;

impl RewritePass for VectorizeVectorScalar {
    fn name(&self) -> &'static str {
        "vectorize-vector-scalar"
    }

    fn run(
        &mut self,
        ast: &mut Ast,
        root: NodeId,
        ctx: &mut CompileContext,
    ) -> Result<PassResult, PassError> {
        vectorize_vector_scalar(ast, root, ctx)
    }
}
