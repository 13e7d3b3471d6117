//! Read-only queries over subtrees

use crate::{Ast, CallTarget, Node, NodeId, NodeKind};

/// True if any node of the subtree satisfies `predicate`
pub fn any_node(ast: &Ast, root: NodeId, predicate: &mut impl FnMut(&Node) -> bool) -> bool {
    if predicate(ast.node(root)) {
        return true;
    }
    ast.children(root)
        .into_iter()
        .any(|child| any_node(ast, child, predicate))
}

/// Conservative side-effect check: assignments, user-defined calls (which
/// may write through out parameters or globals) and writing builtins.
pub fn has_side_effects(ast: &Ast, root: NodeId) -> bool {
    any_node(ast, root, &mut |node| match &node.kind {
        NodeKind::Binary { op, .. } => op.is_assignment(),
        NodeKind::Call { target, .. } => match target {
            CallTarget::Function(_) => true,
            CallTarget::Builtin(op) => op.has_side_effects(),
        },
        NodeKind::Declaration { .. } => true,
        _ => false,
    })
}

/// Position of the first function definition in the root block, or the
/// statement count if there is none. Synthesized global helpers are
/// injected at this position so they precede every function that might
/// call them.
pub fn first_function_definition_index(ast: &Ast, root: NodeId) -> usize {
    match &ast.node(root).kind {
        NodeKind::Block { statements } => statements
            .iter()
            .position(|id| matches!(ast.node(*id).kind, NodeKind::FunctionDefinition { .. }))
            .unwrap_or(statements.len()),
        _ => 0,
    }
}
