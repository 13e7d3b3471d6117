//! Expression pattern matching shared by passes
//!
//! Loop-condition simplification is configurable: backends differ in which
//! header expressions they can handle, so the pass takes a mask of the
//! patterns that must be hoisted out of loop headers.

use glint_ast::{Ast, CallTarget, NodeId, NodeKind};

/// Assignments, compound assignments and writing builtins inside the header
pub const HOIST_SIDE_EFFECTS: u32 = 1 << 0;
/// Calls to user-defined functions (which downstream passes may need to
/// turn into statements)
pub const HOIST_USER_CALLS: u32 = 1 << 1;
/// Ternary selection inside the header
pub const HOIST_TERNARY: u32 = 1 << 2;

pub const HOIST_ALL: u32 = HOIST_SIDE_EFFECTS | HOIST_USER_CALLS | HOIST_TERNARY;

/// True if the subtree contains a construct selected by `mask`
pub fn matches(ast: &Ast, root: NodeId, mask: u32) -> bool {
    glint_ast::any_node(ast, root, &mut |node| match &node.kind {
        NodeKind::Binary { op, .. } => mask & HOIST_SIDE_EFFECTS != 0 && op.is_assignment(),
        NodeKind::Call { target, .. } => match target {
            CallTarget::Function(_) => mask & HOIST_USER_CALLS != 0,
            CallTarget::Builtin(op) => mask & HOIST_SIDE_EFFECTS != 0 && op.has_side_effects(),
        },
        NodeKind::Ternary { .. } => mask & HOIST_TERNARY != 0,
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_ast::{
        assign, binary, constant_int, function_call, symbol, BasicType, BinaryOp, Precision, Type,
    };

    #[test]
    fn test_mask_selects_patterns() {
        let mut ast = Ast::new();
        let int_ty = Type::scalar(BasicType::Int, Precision::High);

        let i = symbol(&mut ast, "i", int_ty);
        let ten = constant_int(&mut ast, 10);
        let plain = binary(&mut ast, BinaryOp::Less, i, ten, Type::scalar(BasicType::Bool, Precision::Undefined));
        assert!(!matches(&ast, plain, HOIST_ALL));

        let i2 = symbol(&mut ast, "i", int_ty);
        let one = constant_int(&mut ast, 1);
        let bump = binary(&mut ast, BinaryOp::AddAssign, i2, one, int_ty);
        assert!(matches(&ast, bump, HOIST_SIDE_EFFECTS));
        assert!(!matches(&ast, bump, HOIST_TERNARY));

        let call = function_call(&mut ast, "f(", vec![], int_ty);
        let j = symbol(&mut ast, "j", int_ty);
        let cmp = binary(
            &mut ast,
            BinaryOp::Less,
            j,
            call,
            Type::scalar(BasicType::Bool, Precision::Undefined),
        );
        assert!(matches(&ast, cmp, HOIST_USER_CALLS));
        assert!(!matches(&ast, cmp, HOIST_TERNARY));
    }

    #[test]
    fn test_assignment_in_condition() {
        let mut ast = Ast::new();
        let int_ty = Type::scalar(BasicType::Int, Precision::High);
        let i = symbol(&mut ast, "i", int_ty);
        let v = constant_int(&mut ast, 3);
        let set = assign(&mut ast, i, v);
        assert!(matches(&ast, set, HOIST_SIDE_EFFECTS));
    }
}
