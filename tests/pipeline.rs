//! End-to-end tests of the translator middle-end: build a program the way
//! the parser would, run the full pipeline, and check what the backends
//! would see.

use glint::ast::{
    assign, binary, block, builtin_call, constant_bool, constant_float, constant_int,
    declaration, function_call, function_definition, if_statement, mangle_name,
    return_statement, symbol, unary, Ast, BasicType, BinaryOp, BranchKind, BuiltinOp,
    CompileContext, LoopKind, Node, NodeId, NodeKind, Precision, Type, UnaryOp,
};
use glint::graph::{CallDag, GraphError};
use glint::passes::{run_pipeline, PipelineSettings};
use std::collections::HashSet;

fn float_ty() -> Type {
    Type::scalar(BasicType::Float, Precision::High)
}

fn int_ty() -> Type {
    Type::scalar(BasicType::Int, Precision::High)
}

fn vec4_ty() -> Type {
    Type::vector(BasicType::Float, Precision::High, 4)
}

fn define(ast: &mut Ast, name: &str, statements: Vec<NodeId>) -> NodeId {
    let body = block(ast, statements);
    function_definition(ast, mangle_name(name, &[]), vec![], float_ty(), body)
}

fn call(ast: &mut Ast, name: &str) -> NodeId {
    function_call(ast, mangle_name(name, &[]), vec![], float_ty())
}

/// A fragment shader exercising most of the pipeline:
///
/// ```glsl
/// float g() { return dFdx(1.0); }
/// void main() {
///     vec4 v;
///     int i;
///     while ((i += 1) < 8) {
///         v[i] = g();
///         if (true) { break; }
///     }
///     vec3 rgb = yuv_2_rgb(c, s);
/// }
/// ```
fn build_program(ast: &mut Ast) -> NodeId {
    let one = constant_float(ast, 1.0, Precision::High);
    let dfdx = unary(ast, UnaryOp::Dfdx, one, float_ty());
    let ret = return_statement(ast, Some(dfdx));
    let g = define(ast, "g", vec![ret]);

    let v_decl = declaration(ast, "v", vec4_ty(), None);
    let i_decl = declaration(ast, "i", int_ty(), None);

    // v[i] = g();
    let v = symbol(ast, "v", vec4_ty());
    let i = symbol(ast, "i", int_ty());
    let indexing = binary(ast, BinaryOp::IndexIndirect, v, i, float_ty());
    let g_call = call(ast, "g");
    let store = assign(ast, indexing, g_call);

    // if (true) { break; }
    let brk = glint::ast::branch(ast, BranchKind::Break, None);
    let then_block = block(ast, vec![brk]);
    let cond_true = constant_bool(ast, true);
    let guard = if_statement(ast, cond_true, then_block, None);

    // while ((i += 1) < 8) { ... }
    let i = symbol(ast, "i", int_ty());
    let one = constant_int(ast, 1);
    let bump = binary(ast, BinaryOp::AddAssign, i, one, int_ty());
    let eight = constant_int(ast, 8);
    let cond = binary(
        ast,
        BinaryOp::Less,
        bump,
        eight,
        Type::scalar(BasicType::Bool, Precision::Undefined),
    );
    let loop_body = block(ast, vec![store, guard]);
    let loop_node = ast.alloc(Node::new(
        NodeKind::Loop {
            kind: LoopKind::While,
            init: None,
            condition: Some(cond),
            expression: None,
            body: loop_body,
        },
        Type::void(),
    ));

    // vec3 rgb = yuv_2_rgb(c, s);
    let vec3_ty = Type::vector(BasicType::Float, Precision::Medium, 3);
    let c = symbol(ast, "c", vec3_ty);
    let s = symbol(
        ast,
        "s",
        Type::scalar(BasicType::YuvCscStandard, Precision::Undefined),
    );
    let conversion = builtin_call(ast, BuiltinOp::Yuv2Rgb, vec![c, s], vec3_ty);
    let rgb_decl = declaration(ast, "rgb", vec3_ty, Some(conversion));

    let main = define(ast, "main", vec![v_decl, i_decl, loop_node, rgb_decl]);
    block(ast, vec![g, main])
}

fn has_dynamic_vector_indexing(ast: &Ast, root: NodeId) -> bool {
    glint::ast::any_node(ast, root, &mut |node| match &node.kind {
        NodeKind::Binary {
            op: BinaryOp::IndexIndirect,
            ..
        } => true,
        _ => false,
    })
}

fn collect_synthesized_names(ast: &Ast, root: NodeId, into: &mut Vec<String>) {
    let node = ast.node(root);
    if let NodeKind::Declaration { name, .. } = &node.kind {
        if name.starts_with('s') && name[1..].chars().all(|c| c.is_ascii_digit()) && name.len() > 1
        {
            into.push(name.clone());
        }
    }
    for child in ast.children(root) {
        collect_synthesized_names(ast, child, into);
    }
}

#[test]
fn test_full_pipeline() {
    let mut ast = Ast::new();
    let mut ctx = CompileContext::new();
    let root = build_program(&mut ast);

    let result = run_pipeline(&mut ast, root, &mut ctx, PipelineSettings::all()).unwrap();
    assert!(result.modified);
    assert!(!ctx.has_unsupported());

    // Every construct the passes target is gone
    assert!(!has_dynamic_vector_indexing(&ast, root));

    // The DAG was rebuilt and now contains the synthesized helpers
    assert!(result
        .dag
        .iter()
        .any(|record| record.name.starts_with("dyn_index_vec4(")));
    assert!(result
        .dag
        .iter()
        .any(|record| record.name.starts_with("dyn_index_write_vec4(")));
    assert!(result
        .dag
        .iter()
        .any(|record| record.name.starts_with("glint_yuv_2_rgb_")));

    // Gradient facts propagated from g into main, and g runs inside a loop
    // that breaks, so it needs the explicit-LOD variant
    let g = result.dag.index_of(&mangle_name("g", &[])).unwrap();
    let main = result.dag.index_of(&mangle_name("main", &[])).unwrap();
    assert!(result.metadata[g].uses_gradient);
    assert!(result.metadata[main].uses_gradient);
    assert!(result.metadata[g].called_in_discontinuous_loop);
    assert!(result.metadata[g].needs_lod0);

    // Indices still satisfy the topological invariant
    for (index, record) in result.dag.iter().enumerate() {
        for &callee in &record.callees {
            assert!(callee < index);
        }
    }
}

#[test]
fn test_temporaries_stay_unique_across_passes() {
    let mut ast = Ast::new();
    let mut ctx = CompileContext::new();
    let root = build_program(&mut ast);

    run_pipeline(&mut ast, root, &mut ctx, PipelineSettings::all()).unwrap();

    // Both loop simplification and dynamic-indexing removal synthesized
    // temporaries; all of them share one counter and never collide
    let mut names = Vec::new();
    collect_synthesized_names(&ast, root, &mut names);
    assert!(names.len() >= 2);
    let unique: HashSet<&String> = names.iter().collect();
    assert_eq!(unique.len(), names.len());
}

#[test]
fn test_recursion_fails_the_whole_compile() {
    let mut ast = Ast::new();
    let mut ctx = CompileContext::new();

    let call_b = call(&mut ast, "b");
    let a = define(&mut ast, "a", vec![call_b]);
    let call_a = call(&mut ast, "a");
    let b = define(&mut ast, "b", vec![call_a]);
    let root = block(&mut ast, vec![a, b]);

    let err = run_pipeline(&mut ast, root, &mut ctx, PipelineSettings::all()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("a("));
    assert!(message.contains("b("));
}

#[test]
fn test_pipeline_is_idempotent_at_the_fixed_point() {
    let mut ast = Ast::new();
    let mut ctx = CompileContext::new();
    let root = build_program(&mut ast);

    let first = run_pipeline(&mut ast, root, &mut ctx, PipelineSettings::all()).unwrap();
    assert!(first.modified);
    let second = run_pipeline(&mut ast, root, &mut ctx, PipelineSettings::all()).unwrap();
    assert!(!second.modified);
    assert_eq!(first.dag.len(), second.dag.len());
}

#[test]
fn test_dag_survives_serialization() {
    let mut ast = Ast::new();
    let root = build_program(&mut ast);
    let dag = CallDag::build(&ast, root).unwrap();

    let json = serde_json::to_string(&dag).unwrap();
    let restored: CallDag = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.len(), dag.len());
    for record in dag.iter() {
        assert_eq!(restored.index_of(&record.name), dag.index_of(&record.name));
    }
}

#[test]
fn test_lookup_miss_is_a_normal_result() {
    let mut ast = Ast::new();
    let root = build_program(&mut ast);
    let dag = CallDag::build(&ast, root).unwrap();
    assert_eq!(dag.index_of("texture2D("), None);
}

#[test]
fn test_self_recursion_chain_names_the_function() {
    let mut ast = Ast::new();
    let call_a = call(&mut ast, "a");
    let a = define(&mut ast, "a", vec![call_a]);
    let root = block(&mut ast, vec![a]);

    let GraphError::RecursiveCallChain { chain } = CallDag::build(&ast, root).unwrap_err();
    assert_eq!(chain.len(), 2);
    assert!(chain[0].starts_with("a("));
}
