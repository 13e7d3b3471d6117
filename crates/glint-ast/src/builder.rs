//! Construction helpers for synthesized subtrees
//!
//! Rewrite passes build their replacement fragments through these functions
//! instead of spelling out `Node` literals. Temporaries are always created
//! through [`create_temp_variable`] so the shared counter on the
//! [`CompileContext`] keeps names unique across every pass of one compile.

use crate::{
    Ast, BasicType, BinaryOp, BranchKind, BuiltinOp, CallTarget, CompileContext, ConstantValue,
    Node, NodeId, NodeKind, Param, Precision, Type, YuvCscStandard,
};

pub fn constant_float(ast: &mut Ast, value: f32, precision: Precision) -> NodeId {
    ast.alloc(Node::new(
        NodeKind::Constant(ConstantValue::Float(value)),
        Type::scalar(BasicType::Float, precision),
    ))
}

pub fn constant_int(ast: &mut Ast, value: i32) -> NodeId {
    ast.alloc(Node::new(
        NodeKind::Constant(ConstantValue::Int(value)),
        Type::scalar(BasicType::Int, Precision::High),
    ))
}

pub fn constant_uint(ast: &mut Ast, value: u32) -> NodeId {
    ast.alloc(Node::new(
        NodeKind::Constant(ConstantValue::UInt(value)),
        Type::scalar(BasicType::UInt, Precision::High),
    ))
}

pub fn constant_bool(ast: &mut Ast, value: bool) -> NodeId {
    ast.alloc(Node::new(
        NodeKind::Constant(ConstantValue::Bool(value)),
        Type::scalar(BasicType::Bool, Precision::Undefined),
    ))
}

pub fn constant_yuv(ast: &mut Ast, standard: YuvCscStandard) -> NodeId {
    ast.alloc(Node::new(
        NodeKind::Constant(ConstantValue::Yuv(standard)),
        Type::scalar(BasicType::YuvCscStandard, Precision::Undefined),
    ))
}

pub fn symbol(ast: &mut Ast, name: impl Into<String>, ty: Type) -> NodeId {
    ast.alloc(Node::new(NodeKind::Symbol { name: name.into() }, ty))
}

pub fn unary(ast: &mut Ast, op: crate::UnaryOp, operand: NodeId, ty: Type) -> NodeId {
    ast.alloc(Node::new(NodeKind::Unary { op, operand }, ty))
}

pub fn binary(ast: &mut Ast, op: BinaryOp, left: NodeId, right: NodeId, ty: Type) -> NodeId {
    ast.alloc(Node::new(NodeKind::Binary { op, left, right }, ty))
}

/// `left = right`, typed as the assigned-to expression
pub fn assign(ast: &mut Ast, left: NodeId, right: NodeId) -> NodeId {
    let ty = ast.node(left).ty;
    binary(ast, BinaryOp::Assign, left, right, ty)
}

/// Index with a compile-time constant: `base[index]`
pub fn index_direct(ast: &mut Ast, base: NodeId, index: u32) -> NodeId {
    let field_ty = ast.node(base).ty.field_type();
    let index_node = constant_uint(ast, index);
    binary(ast, BinaryOp::IndexDirect, base, index_node, field_ty)
}

pub fn ternary(ast: &mut Ast, condition: NodeId, then_expr: NodeId, else_expr: NodeId) -> NodeId {
    let ty = ast.node(then_expr).ty;
    ast.alloc(Node::new(
        NodeKind::Ternary {
            condition,
            then_expr,
            else_expr,
        },
        ty,
    ))
}

/// Component selection. The result type follows the operand's basic type and
/// precision with the selected component count.
pub fn swizzle(ast: &mut Ast, operand: NodeId, fields: Vec<u8>) -> NodeId {
    let operand_ty = ast.node(operand).ty;
    let ty = if fields.len() == 1 {
        Type::scalar(operand_ty.basic, operand_ty.precision)
    } else {
        Type::vector(operand_ty.basic, operand_ty.precision, fields.len() as u8)
    };
    ast.alloc(Node::new(NodeKind::Swizzle { operand, fields }, ty))
}

pub fn function_call(
    ast: &mut Ast,
    mangled: impl Into<String>,
    args: Vec<NodeId>,
    return_ty: Type,
) -> NodeId {
    ast.alloc(Node::new(
        NodeKind::Call {
            target: CallTarget::Function(mangled.into()),
            args,
        },
        return_ty,
    ))
}

pub fn builtin_call(ast: &mut Ast, op: BuiltinOp, args: Vec<NodeId>, ty: Type) -> NodeId {
    ast.alloc(Node::new(
        NodeKind::Call {
            target: CallTarget::Builtin(op),
            args,
        },
        ty,
    ))
}

pub fn constructor(ast: &mut Ast, ty: Type, args: Vec<NodeId>) -> NodeId {
    ast.alloc(Node::new(NodeKind::Constructor { args }, ty))
}

pub fn block(ast: &mut Ast, statements: Vec<NodeId>) -> NodeId {
    ast.alloc(Node::new(NodeKind::Block { statements }, Type::void()))
}

pub fn declaration(ast: &mut Ast, name: impl Into<String>, ty: Type, init: Option<NodeId>) -> NodeId {
    ast.alloc(Node::new(
        NodeKind::Declaration {
            name: name.into(),
            initializer: init,
        },
        ty,
    ))
}

pub fn branch(ast: &mut Ast, kind: BranchKind, value: Option<NodeId>) -> NodeId {
    ast.alloc(Node::new(NodeKind::Branch { kind, value }, Type::void()))
}

pub fn return_statement(ast: &mut Ast, value: Option<NodeId>) -> NodeId {
    branch(ast, BranchKind::Return, value)
}

pub fn break_statement(ast: &mut Ast) -> NodeId {
    branch(ast, BranchKind::Break, None)
}

pub fn case_label(ast: &mut Ast, label: Option<NodeId>) -> NodeId {
    ast.alloc(Node::new(NodeKind::Case { label }, Type::void()))
}

pub fn switch_statement(ast: &mut Ast, selector: NodeId, body: NodeId) -> NodeId {
    ast.alloc(Node::new(NodeKind::Switch { selector, body }, Type::void()))
}

pub fn if_statement(
    ast: &mut Ast,
    condition: NodeId,
    then_block: NodeId,
    else_block: Option<NodeId>,
) -> NodeId {
    ast.alloc(Node::new(
        NodeKind::If {
            condition,
            then_block,
            else_block,
        },
        Type::void(),
    ))
}

/// A prototype plus definition pair; returns the definition id
pub fn function_definition(
    ast: &mut Ast,
    mangled: impl Into<String>,
    params: Vec<Param>,
    return_ty: Type,
    body: NodeId,
) -> NodeId {
    let prototype = ast.alloc(Node::new(
        NodeKind::FunctionPrototype {
            name: mangled.into(),
            params,
        },
        return_ty,
    ));
    ast.alloc(Node::new(
        NodeKind::FunctionDefinition { prototype, body },
        return_ty,
    ))
}

/// A synthesized local variable with a compile-unique name
#[derive(Debug, Clone)]
pub struct TempVariable {
    pub name: String,
    pub ty: Type,
}

pub fn create_temp_variable(ctx: &mut CompileContext, ty: Type) -> TempVariable {
    TempVariable {
        name: ctx.temp_name(),
        ty,
    }
}

pub fn temp_symbol(ast: &mut Ast, temp: &TempVariable) -> NodeId {
    symbol(ast, temp.name.clone(), temp.ty)
}

/// `<type> sN = init;`
pub fn temp_init_declaration(ast: &mut Ast, temp: &TempVariable, init: NodeId) -> NodeId {
    declaration(ast, temp.name.clone(), temp.ty, Some(init))
}

/// `sN = value;`
pub fn temp_assignment(ast: &mut Ast, temp: &TempVariable, value: NodeId) -> NodeId {
    let target = temp_symbol(ast, temp);
    assign(ast, target, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_direct_field_type() {
        let mut ast = Ast::new();
        let mat = symbol(&mut ast, "m", Type::matrix(Precision::Medium, 4, 2));
        let column = index_direct(&mut ast, mat, 3);
        let ty = ast.node(column).ty;
        assert!(ty.is_vector());
        assert_eq!(ty.primary_size, 2);
    }

    #[test]
    fn test_temp_variables_share_the_counter() {
        let mut ast = Ast::new();
        let mut ctx = CompileContext::new();
        let a = create_temp_variable(
            &mut ctx,
            Type::scalar(BasicType::Bool, Precision::Undefined),
        );
        let b = create_temp_variable(&mut ctx, Type::scalar(BasicType::Float, Precision::High));
        assert_ne!(a.name, b.name);

        let decl = {
            let init = constant_bool(&mut ast, true);
            temp_init_declaration(&mut ast, &a, init)
        };
        match &ast.node(decl).kind {
            NodeKind::Declaration { name, initializer } => {
                assert_eq!(name, &a.name);
                assert!(initializer.is_some());
            }
            other => panic!("expected declaration, got {:?}", other),
        }
    }
}
