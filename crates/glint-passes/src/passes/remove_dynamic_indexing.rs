//! Removes dynamic indexing of vectors and matrices
//!
//! Some backends cannot translate `v[i]` when `v` is a short fixed-size
//! vector or matrix and `i` is only known at runtime. Every such indexing
//! is replaced with a call to a synthesized helper containing a `switch`
//! over all valid constant indices. Reads become a plain helper call;
//! writes are split into "snapshot through the read helper, update the
//! snapshot, write back through the write helper". One helper pair is
//! synthesized per distinct indexed type actually seen, injected at the top
//! of the program once the rewrite reaches its fixed point.
//!
//! Dynamic indexing of arrays is left alone; backends handle that natively.

use crate::error::PassError;
use crate::passes::{PassResult, RewritePass};
use crate::traverse::{AstVisitor, Traversal, Visit};
use glint_ast::{
    assign, block, break_statement, case_label, constant_uint, create_temp_variable,
    function_call, function_definition, has_side_effects, index_direct, mangle_name,
    return_statement, switch_statement, symbol, temp_init_declaration, temp_symbol, Ast,
    BasicType, BinaryOp, CompileContext, NodeId, NodeKind, Param, Precision, Qualifier, Type,
};
use std::collections::{BTreeSet, HashSet};

fn index_function_base_name(ty: Type, write: bool) -> String {
    let mut name = String::from("dyn_index_");
    if write {
        name.push_str("write_");
    }
    name.push_str(&ty.short_name());
    name
}

fn index_function_params(ty: Type, write: bool) -> Vec<Type> {
    let base_qualifier = if write {
        Qualifier::ParamInOut
    } else {
        Qualifier::ParamIn
    };
    let mut params = vec![
        ty.with_qualifier(base_qualifier),
        Type::scalar(BasicType::UInt, Precision::High).with_qualifier(Qualifier::ParamIn),
    ];
    if write {
        params.push(ty.field_type().with_qualifier(Qualifier::ParamIn));
    }
    params
}

fn index_function_name(ty: Type, write: bool) -> String {
    mangle_name(
        &index_function_base_name(ty, write),
        &index_function_params(ty, write),
    )
}

/// Types are collected without position-dependent attributes so one helper
/// serves every occurrence of e.g. `vec4` regardless of precision
fn key_type(ty: Type) -> Type {
    Type {
        precision: Precision::High,
        qualifier: Qualifier::Temporary,
        array_size: None,
        ..ty
    }
}

/// Synthesize the switch-based helper for one (type, read-or-write) pair:
///
/// ```glsl
/// float dyn_index_vec4(in vec4 base, in uint index)
/// {
///     switch (index)
///     {
///         case 0u: return base[0];
///         ...
///         default: return base[0];
///     }
/// }
/// ```
fn index_function_definition(ast: &mut Ast, ty: Type, write: bool) -> NodeId {
    debug_assert!(!ty.is_array());
    let field_ty = ty.field_type();
    let cases = if ty.is_matrix() {
        ty.cols()
    } else {
        ty.nominal_size()
    };

    let params = index_function_params(ty, write);
    let mut param_list = vec![
        Param {
            name: "base".into(),
            ty: params[0],
        },
        Param {
            name: "index".into(),
            ty: params[1],
        },
    ];
    if write {
        param_list.push(Param {
            name: "value".into(),
            ty: params[2],
        });
    }

    let mut statements = Vec::new();
    for i in 0..cases {
        let label = constant_uint(ast, u32::from(i));
        statements.push(case_label(ast, Some(label)));
        let base = symbol(ast, "base", params[0]);
        let element = index_direct(ast, base, u32::from(i));
        if write {
            let value = symbol(ast, "value", field_ty);
            let store = assign(ast, element, value);
            statements.push(store);
            statements.push(break_statement(ast));
        } else {
            statements.push(return_statement(ast, Some(element)));
        }
    }
    statements.push(case_label(ast, None));
    if write {
        statements.push(break_statement(ast));
    } else {
        let base = symbol(ast, "base", params[0]);
        let element = index_direct(ast, base, 0);
        statements.push(return_statement(ast, Some(element)));
    }

    let switch_body = block(ast, statements);
    let selector = symbol(ast, "index", params[1]);
    let switch_node = switch_statement(ast, selector, switch_body);
    let body = block(ast, vec![switch_node]);

    let return_ty = if write { Type::void() } else { field_ty };
    function_definition(ast, index_function_name(ty, write), param_list, return_ty, body)
}

#[derive(Default)]
struct DynamicIndexingTraverser {
    indexed_types: BTreeSet<Type>,
    written_types: BTreeSet<Type>,
    used_insertion: bool,
    diagnosed: HashSet<NodeId>,
}

struct DynamicIndexingVisitor<'a> {
    state: &'a mut DynamicIndexingTraverser,
    ctx: &'a mut CompileContext,
}

impl AstVisitor for DynamicIndexingVisitor<'_> {
    fn visit_binary(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        if visit != Visit::Pre {
            return true;
        }
        // At most one write rewrite per iteration: the surrounding
        // statements move, so replacement reasoning must stay local.
        if self.state.used_insertion {
            return false;
        }

        let (op, left, right) = match ast.node(node).kind {
            NodeKind::Binary { op, left, right } => (op, left, right),
            _ => unreachable!("binary hook on non-binary node"),
        };
        if op != BinaryOp::IndexIndirect {
            return true;
        }
        let base_ty = ast.node(left).ty;
        if base_ty.is_array() || !(base_ty.is_vector() || base_ty.is_matrix()) {
            return true;
        }

        let ty = key_type(base_ty);
        let field_ty = base_ty.field_type();
        let span = ast.node(node).span;

        if t.is_in_assignment_target() {
            if has_side_effects(ast, left) || has_side_effects(ast, right) {
                // Known-incomplete case: rewriting would duplicate the
                // side effect. Refuse loudly instead of miscompiling.
                if self.state.diagnosed.insert(node) {
                    self.ctx.unsupported(
                        "dynamic index assignment with side effects in the indexed expression",
                        span,
                    );
                }
                return true;
            }

            self.state.indexed_types.insert(ty);
            self.state.written_types.insert(ty);

            // Convert  v[i] op= x;  into
            //   float s0 = dyn_index(v, i);
            //   s0 op= x;
            //   dyn_index_write(v, i, s0);
            let read_call = function_call(
                ast,
                index_function_name(ty, false),
                vec![left, right],
                field_ty,
            );
            let temp = create_temp_variable(self.ctx, field_ty);
            let snapshot = temp_init_declaration(ast, &temp, read_call);

            let base_copy = ast.deep_copy(left);
            let index_copy = ast.deep_copy(right);
            let temp_value = temp_symbol(ast, &temp);
            let write_call = function_call(
                ast,
                index_function_name(ty, true),
                vec![base_copy, index_copy, temp_value],
                Type::void(),
            );

            t.insert_statements_in_parent_block(ast, vec![snapshot], vec![write_call]);
            let temp_target = temp_symbol(ast, &temp);
            t.queue_replacement(node, temp_target);
            self.state.used_insertion = true;
        } else {
            self.state.indexed_types.insert(ty);
            let read_call = function_call(
                ast,
                index_function_name(ty, false),
                vec![left, right],
                field_ty,
            );
            t.queue_replacement(node, read_call);
        }
        true
    }
}

/// Run the rewrite to its fixed point, then inject the helper definitions
pub fn remove_dynamic_indexing(
    ast: &mut Ast,
    root: NodeId,
    ctx: &mut CompileContext,
) -> Result<PassResult, PassError> {
    let mut state = DynamicIndexingTraverser::default();
    let mut modified = false;

    loop {
        state.used_insertion = false;
        let mut traversal = Traversal::new();
        let mut visitor = DynamicIndexingVisitor {
            state: &mut state,
            ctx: &mut *ctx,
        };
        traversal.traverse(&mut visitor, ast, root);
        let changed = traversal.pending_edits() > 0;
        traversal.update_tree(ast)?;
        if !changed {
            break;
        }
        modified = true;
    }

    let mut helpers = Vec::new();
    for &ty in &state.indexed_types {
        helpers.push(index_function_definition(ast, ty, false));
    }
    for &ty in &state.written_types {
        helpers.push(index_function_definition(ast, ty, true));
    }
    let functions_changed = !helpers.is_empty();
    if functions_changed {
        ast.insert_into_block(root, 0, &helpers);
    }

    Ok(PassResult {
        modified: modified || functions_changed,
        functions_changed,
    })
}

#[derive(Debug, Default)]
pub struct RemoveDynamicIndexing;

impl RewritePass for RemoveDynamicIndexing {
    fn name(&self) -> &'static str {
        "remove-dynamic-indexing"
    }

    fn run(
        &mut self,
        ast: &mut Ast,
        root: NodeId,
        ctx: &mut CompileContext,
    ) -> Result<PassResult, PassError> {
        remove_dynamic_indexing(ast, root, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_ast::{any_node, binary, constant_float, declaration, CallTarget};

    fn vec4_ty() -> Type {
        Type::vector(BasicType::Float, Precision::High, 4)
    }

    fn int_ty() -> Type {
        Type::scalar(BasicType::Int, Precision::High)
    }

    fn has_dynamic_vector_indexing(ast: &Ast, root: NodeId) -> bool {
        any_node(ast, root, &mut |node| match &node.kind {
            NodeKind::Binary {
                op: BinaryOp::IndexIndirect,
                ..
            } => !node.ty.is_array(),
            _ => false,
        })
    }

    fn count_helper_definitions(ast: &Ast, root: NodeId) -> usize {
        let NodeKind::Block { statements } = &ast.node(root).kind else {
            panic!("root is not a block");
        };
        statements
            .iter()
            .filter(|&&statement| {
                ast.definition_name(statement)
                    .map(|name| name.starts_with("dyn_index_"))
                    .unwrap_or(false)
            })
            .count()
    }

    #[test]
    fn test_read_becomes_helper_call() {
        let mut ast = Ast::new();
        let mut ctx = CompileContext::new();

        // float x = v[i];
        let v = symbol(&mut ast, "v", vec4_ty());
        let i = symbol(&mut ast, "i", int_ty());
        let indexing = binary(
            &mut ast,
            BinaryOp::IndexIndirect,
            v,
            i,
            Type::scalar(BasicType::Float, Precision::High),
        );
        let x = declaration(
            &mut ast,
            "x",
            Type::scalar(BasicType::Float, Precision::High),
            Some(indexing),
        );
        let root = block(&mut ast, vec![x]);

        let result = remove_dynamic_indexing(&mut ast, root, &mut ctx).unwrap();
        assert!(result.modified);
        assert!(result.functions_changed);

        assert!(!has_dynamic_vector_indexing(&ast, root));
        assert_eq!(count_helper_definitions(&ast, root), 1);

        // The initializer is now a call to the read helper
        let NodeKind::Declaration {
            initializer: Some(init),
            ..
        } = &ast.node(x).kind
        else {
            panic!("declaration lost its initializer");
        };
        match &ast.node(*init).kind {
            NodeKind::Call {
                target: CallTarget::Function(name),
                args,
            } => {
                assert!(name.starts_with("dyn_index_vec4("));
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected helper call, got {:?}", other),
        }

        // Idempotent at the fixed point
        let again = remove_dynamic_indexing(&mut ast, root, &mut ctx).unwrap();
        assert!(!again.modified);
        assert_eq!(count_helper_definitions(&ast, root), 1);
    }

    #[test]
    fn test_write_goes_through_write_helper() {
        let mut ast = Ast::new();
        let mut ctx = CompileContext::new();

        // v[i] = 5.0;
        let v = symbol(&mut ast, "v", vec4_ty());
        let i = symbol(&mut ast, "i", int_ty());
        let indexing = binary(
            &mut ast,
            BinaryOp::IndexIndirect,
            v,
            i,
            Type::scalar(BasicType::Float, Precision::High),
        );
        let five = constant_float(&mut ast, 5.0, Precision::High);
        let store = assign(&mut ast, indexing, five);
        let root = block(&mut ast, vec![store]);

        let result = remove_dynamic_indexing(&mut ast, root, &mut ctx).unwrap();
        assert!(result.modified);
        assert!(!has_dynamic_vector_indexing(&ast, root));
        // One read helper and one write helper
        assert_eq!(count_helper_definitions(&ast, root), 2);

        // The statement sequence is now: helpers..., snapshot declaration,
        // the rewritten assignment, the write-back call.
        let NodeKind::Block { statements } = &ast.node(root).kind else {
            panic!("root is not a block");
        };
        let tail: Vec<NodeId> = statements[statements.len() - 3..].to_vec();
        assert!(matches!(
            ast.node(tail[0]).kind,
            NodeKind::Declaration { .. }
        ));
        assert_eq!(tail[1], store);
        match &ast.node(tail[2]).kind {
            NodeKind::Call {
                target: CallTarget::Function(name),
                args,
            } => {
                assert!(name.starts_with("dyn_index_write_vec4("));
                assert_eq!(args.len(), 3);
            }
            other => panic!("expected write-back call, got {:?}", other),
        }
    }

    #[test]
    fn test_side_effecting_write_is_diagnosed_not_rewritten() {
        let mut ast = Ast::new();
        let mut ctx = CompileContext::new();

        // v[j = 1] = 5.0;   (side effect inside the index)
        let v = symbol(&mut ast, "v", vec4_ty());
        let j = symbol(&mut ast, "j", int_ty());
        let one = glint_ast::constant_int(&mut ast, 1);
        let j_assign = assign(&mut ast, j, one);
        let indexing = binary(
            &mut ast,
            BinaryOp::IndexIndirect,
            v,
            j_assign,
            Type::scalar(BasicType::Float, Precision::High),
        );
        let five = constant_float(&mut ast, 5.0, Precision::High);
        let store = assign(&mut ast, indexing, five);
        let root = block(&mut ast, vec![store]);

        let result = remove_dynamic_indexing(&mut ast, root, &mut ctx).unwrap();
        assert!(!result.modified);
        assert!(ctx.has_unsupported());
        assert_eq!(ctx.diagnostics().len(), 1);
        // The construct is left in place rather than miscompiled
        assert!(has_dynamic_vector_indexing(&ast, root));
    }

    #[test]
    fn test_array_indexing_is_untouched() {
        let mut ast = Ast::new();
        let mut ctx = CompileContext::new();

        let mut array_ty = vec4_ty();
        array_ty.array_size = Some(8);
        let a = symbol(&mut ast, "a", array_ty);
        let i = symbol(&mut ast, "i", int_ty());
        let indexing = binary(&mut ast, BinaryOp::IndexIndirect, a, i, vec4_ty());
        let x = declaration(&mut ast, "x", vec4_ty(), Some(indexing));
        let root = block(&mut ast, vec![x]);

        let result = remove_dynamic_indexing(&mut ast, root, &mut ctx).unwrap();
        assert!(!result.modified);
        assert_eq!(count_helper_definitions(&ast, root), 0);
    }
}
