//! Rewrites cube-map `textureGrad` for GPUs with per-face derivatives
//!
//! Some GPUs expect the explicit derivatives of a cube-map gradient sample
//! to already be projected onto the selected face. Every such call is
//! routed through a cached helper that selects the major axis the way the
//! hardware does (x wins over y and z, y wins over z), projects both
//! derivative vectors accordingly, and only then calls the native builtin.
//! One helper per cube sampler type is synthesized and inserted before the
//! first function definition.

use crate::error::PassError;
use crate::passes::{PassResult, RewritePass};
use crate::traverse::{AstVisitor, Traversal, Visit};
use glint_ast::{
    binary, block, builtin_call, constructor, create_temp_variable,
    first_function_definition_index, function_call, function_definition, mangle_name,
    return_statement, swizzle, symbol, temp_init_declaration, temp_symbol, ternary, unmangle_name,
    Ast, BasicType, BinaryOp, BuiltinOp, CompileContext, NodeId, NodeKind, Param, Precision,
    Qualifier, TempVariable, Type,
};
use std::collections::HashMap;

const HELPER_BASE_NAME: &str = "glint_texture_grad_cube";

struct Helper {
    mangled: String,
    definition: NodeId,
}

struct CubeGradVisitor<'a> {
    ctx: &'a mut CompileContext,
    helpers: HashMap<BasicType, Helper>,
    new_definition: Option<NodeId>,
    found: bool,
}

impl AstVisitor for CubeGradVisitor<'_> {
    fn visit_function_definition(
        &mut self,
        _t: &mut Traversal,
        ast: &mut Ast,
        node: NodeId,
        visit: Visit,
    ) -> bool {
        // Do not traverse the helpers themselves: their bodies contain the
        // native builtin this pass matches on
        visit != Visit::Pre
            || ast
                .definition_name(node)
                .map(|name| unmangle_name(name) != HELPER_BASE_NAME)
                .unwrap_or(true)
    }

    fn visit_call(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        if visit != Visit::Pre {
            return true;
        }
        if self.found {
            return false;
        }
        let NodeKind::Call { target, args } = ast.node(node).kind.clone() else {
            unreachable!("call hook on non-call node");
        };
        if !matches!(
            target.as_builtin(),
            Some(BuiltinOp::TextureGrad | BuiltinOp::TextureCubeGradExt)
        ) {
            return true;
        }
        let sampler_ty = ast.node(args[0]).ty;
        if !sampler_ty.basic.is_sampler_cube() {
            return true;
        }

        let return_ty = ast.node(node).ty;
        let helper = self.helper_name(ast, sampler_ty, return_ty);
        let replacement = function_call(ast, helper, args, return_ty);
        t.queue_replacement(node, replacement);
        self.found = true;
        false
    }
}

impl CubeGradVisitor<'_> {
    fn helper_name(&mut self, ast: &mut Ast, sampler_ty: Type, return_ty: Type) -> String {
        if let Some(helper) = self.helpers.get(&sampler_ty.basic) {
            return helper.mangled.clone();
        }
        let definition = self.build_helper(ast, sampler_ty, return_ty);
        let mangled = ast
            .definition_name(definition)
            .expect("helper has a name")
            .to_string();
        self.helpers.insert(
            sampler_ty.basic,
            Helper {
                mangled: mangled.clone(),
                definition,
            },
        );
        self.new_definition = Some(definition);
        mangled
    }

    /// `x_major ? source.yzx : (y_major ? source.xzy : source.xyz)`
    fn project_onto_face(
        &mut self,
        ast: &mut Ast,
        statements: &mut Vec<NodeId>,
        x_major: &TempVariable,
        y_major: &TempVariable,
        source: &str,
        source_ty: Type,
    ) -> TempVariable {
        let vec3_ty = Type::vector(BasicType::Float, Precision::Medium, 3);

        let src = symbol(ast, source, source_ty);
        let yzx = swizzle(ast, src, vec![1, 2, 0]);
        let src = symbol(ast, source, source_ty);
        let xzy = swizzle(ast, src, vec![0, 2, 1]);
        let src = symbol(ast, source, source_ty);
        let xyz = swizzle(ast, src, vec![0, 1, 2]);

        let y_major_sym = temp_symbol(ast, y_major);
        let y_select = ternary(ast, y_major_sym, xzy, xyz);
        let x_major_sym = temp_symbol(ast, x_major);
        let projected = ternary(ast, x_major_sym, yzx, y_select);

        let target = create_temp_variable(self.ctx, vec3_ty);
        statements.push(temp_init_declaration(ast, &target, projected));
        target
    }

    fn build_helper(&mut self, ast: &mut Ast, sampler_ty: Type, return_ty: Type) -> NodeId {
        let vec3_ty = Type::vector(BasicType::Float, Precision::Medium, 3);
        let vec4_ty = Type::vector(BasicType::Float, Precision::Medium, 4);
        let bool_ty = Type::scalar(BasicType::Bool, Precision::Undefined);

        let tex_ty = sampler_ty.with_qualifier(Qualifier::ParamIn);
        // Shadow samplers carry the reference value in a fourth component
        let direction_size = if sampler_ty.basic == BasicType::SamplerCubeShadow {
            4
        } else {
            3
        };
        let direction_ty = Type::vector(BasicType::Float, Precision::Medium, direction_size)
            .with_qualifier(Qualifier::ParamIn);
        let derivative_ty = vec3_ty.with_qualifier(Qualifier::ParamIn);

        let params = vec![
            Param {
                name: "tex".into(),
                ty: tex_ty,
            },
            Param {
                name: "direction".into(),
                ty: direction_ty,
            },
            Param {
                name: "dpdx".into(),
                ty: derivative_ty,
            },
            Param {
                name: "dpdy".into(),
                ty: derivative_ty,
            },
        ];

        let mut statements = Vec::new();

        // vec3 absDirection = abs(direction.xyz);
        let direction = symbol(ast, "direction", direction_ty);
        let direction_xyz = swizzle(ast, direction, vec![0, 1, 2]);
        let abs_call = builtin_call(ast, BuiltinOp::Abs, vec![direction_xyz], vec3_ty);
        let abs_direction = create_temp_variable(self.ctx, vec3_ty);
        statements.push(temp_init_declaration(ast, &abs_direction, abs_call));

        // bool xMajor = absDirection.x >= max(absDirection.y, absDirection.z);
        let abs_sym = temp_symbol(ast, &abs_direction);
        let abs_x = swizzle(ast, abs_sym, vec![0]);
        let abs_sym = temp_symbol(ast, &abs_direction);
        let abs_y = swizzle(ast, abs_sym, vec![1]);
        let abs_sym = temp_symbol(ast, &abs_direction);
        let abs_z = swizzle(ast, abs_sym, vec![2]);
        let float_ty = Type::scalar(BasicType::Float, Precision::Medium);
        let max_yz = builtin_call(ast, BuiltinOp::Max, vec![abs_y, abs_z], float_ty);
        let x_major_value = binary(ast, BinaryOp::GreaterEqual, abs_x, max_yz, bool_ty);
        let x_major = create_temp_variable(self.ctx, bool_ty);
        statements.push(temp_init_declaration(ast, &x_major, x_major_value));

        // bool yMajor = absDirection.y >= absDirection.z;
        let abs_sym = temp_symbol(ast, &abs_direction);
        let abs_y = swizzle(ast, abs_sym, vec![1]);
        let abs_sym = temp_symbol(ast, &abs_direction);
        let abs_z = swizzle(ast, abs_sym, vec![2]);
        let y_major_value = binary(ast, BinaryOp::GreaterEqual, abs_y, abs_z, bool_ty);
        let y_major = create_temp_variable(self.ctx, bool_ty);
        statements.push(temp_init_declaration(ast, &y_major, y_major_value));

        // Project the direction and both derivatives onto the face
        let face_direction = self.project_onto_face(
            ast,
            &mut statements,
            &x_major,
            &y_major,
            "direction",
            direction_ty,
        );
        let dqdx =
            self.project_onto_face(ast, &mut statements, &x_major, &y_major, "dpdx", derivative_ty);
        let dqdy =
            self.project_onto_face(ast, &mut statements, &x_major, &y_major, "dpdy", derivative_ty);

        // vec4 d = vec4(dQdx.xy, dQdy.xy)
        //        - (Q.xy / Q.z).xyxy * vec4(dQdx.zz, dQdy.zz);
        let dqdx_sym = temp_symbol(ast, &dqdx);
        let dqdx_xy = swizzle(ast, dqdx_sym, vec![0, 1]);
        let dqdy_sym = temp_symbol(ast, &dqdy);
        let dqdy_xy = swizzle(ast, dqdy_sym, vec![0, 1]);
        let pack_xy = constructor(ast, vec4_ty, vec![dqdx_xy, dqdy_xy]);

        let dqdx_sym = temp_symbol(ast, &dqdx);
        let dqdx_zz = swizzle(ast, dqdx_sym, vec![2, 2]);
        let dqdy_sym = temp_symbol(ast, &dqdy);
        let dqdy_zz = swizzle(ast, dqdy_sym, vec![2, 2]);
        let pack_zz = constructor(ast, vec4_ty, vec![dqdx_zz, dqdy_zz]);

        let face_sym = temp_symbol(ast, &face_direction);
        let face_xy = swizzle(ast, face_sym, vec![0, 1]);
        let face_sym = temp_symbol(ast, &face_direction);
        let face_z = swizzle(ast, face_sym, vec![2]);
        let vec2_ty = Type::vector(BasicType::Float, Precision::Medium, 2);
        let ratio = binary(ast, BinaryOp::Div, face_xy, face_z, vec2_ty);
        let ratio_xyxy = swizzle(ast, ratio, vec![0, 1, 0, 1]);

        let scaled = binary(ast, BinaryOp::Mul, ratio_xyxy, pack_zz, vec4_ty);
        let d_value = binary(ast, BinaryOp::Sub, pack_xy, scaled, vec4_ty);
        let d = create_temp_variable(self.ctx, vec4_ty);
        statements.push(temp_init_declaration(ast, &d, d_value));

        // The transformed derivative components per major axis:
        // x major: x and z; y major: x and y; z major: y and z
        let d_sym = temp_symbol(ast, &d);
        let d_xxy = swizzle(ast, d_sym, vec![0, 0, 1]);
        let d_sym = temp_symbol(ast, &d);
        let d_xyx = swizzle(ast, d_sym, vec![0, 1, 0]);
        let x_major_sym = temp_symbol(ast, &x_major);
        let transformed_x = ternary(ast, x_major_sym, d_xxy, d_xyx);

        let d_sym = temp_symbol(ast, &d);
        let d_zzw = swizzle(ast, d_sym, vec![2, 2, 3]);
        let d_sym = temp_symbol(ast, &d);
        let d_zwz = swizzle(ast, d_sym, vec![2, 3, 2]);
        let x_major_sym = temp_symbol(ast, &x_major);
        let transformed_y = ternary(ast, x_major_sym, d_zzw, d_zwz);

        // return textureGrad(tex, direction, transformedX, transformedY);
        let tex = symbol(ast, "tex", tex_ty);
        let direction = symbol(ast, "direction", direction_ty);
        let native = builtin_call(
            ast,
            BuiltinOp::TextureGrad,
            vec![tex, direction, transformed_x, transformed_y],
            return_ty,
        );
        statements.push(return_statement(ast, Some(native)));

        let body = block(ast, statements);
        let param_types: Vec<Type> = params.iter().map(|param| param.ty).collect();
        let mangled = mangle_name(HELPER_BASE_NAME, &param_types);
        function_definition(ast, mangled, params, return_ty, body)
    }
}

/// Rewrite cube-map gradient sampling through the projection helper
pub fn rewrite_texture_cube_grad(
    ast: &mut Ast,
    root: NodeId,
    ctx: &mut CompileContext,
) -> Result<PassResult, PassError> {
    let mut visitor = CubeGradVisitor {
        ctx,
        helpers: HashMap::new(),
        new_definition: None,
        found: false,
    };
    let mut modified = false;

    loop {
        visitor.found = false;
        visitor.new_definition = None;
        let mut traversal = Traversal::new();
        traversal.traverse(&mut visitor, ast, root);
        if !visitor.found {
            break;
        }
        if let Some(definition) = visitor.new_definition.take() {
            let at = first_function_definition_index(ast, root);
            ast.insert_into_block(root, at, &[definition]);
        }
        traversal.update_tree(ast)?;
        modified = true;
    }

    let functions_changed = !visitor.helpers.is_empty();
    Ok(PassResult {
        modified,
        functions_changed,
    })
}

#[derive(Debug, Default)]
pub struct RewriteTextureCubeGrad;

impl RewritePass for RewriteTextureCubeGrad {
    fn name(&self) -> &'static str {
        "rewrite-texture-cube-grad"
    }

    fn run(
        &mut self,
        ast: &mut Ast,
        root: NodeId,
        ctx: &mut CompileContext,
    ) -> Result<PassResult, PassError> {
        rewrite_texture_cube_grad(ast, root, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_ast::CallTarget;

    fn vec3_ty() -> Type {
        Type::vector(BasicType::Float, Precision::Medium, 3)
    }

    fn sample_call(ast: &mut Ast, sampler_basic: BasicType) -> NodeId {
        let tex = symbol(ast, "t", Type::scalar(sampler_basic, Precision::Low));
        let direction = symbol(ast, "dir", vec3_ty());
        let dx = symbol(ast, "dx", vec3_ty());
        let dy = symbol(ast, "dy", vec3_ty());
        builtin_call(
            ast,
            BuiltinOp::TextureGrad,
            vec![tex, direction, dx, dy],
            Type::vector(BasicType::Float, Precision::Medium, 4),
        )
    }

    fn program(ast: &mut Ast, statements: Vec<NodeId>) -> (NodeId, NodeId) {
        let body = block(ast, statements);
        let main = function_definition(ast, mangle_name("main", &[]), vec![], Type::void(), body);
        (block(ast, vec![main]), body)
    }

    #[test]
    fn test_cube_grad_goes_through_helper() {
        let mut ast = Ast::new();
        let mut ctx = CompileContext::new();

        let call = sample_call(&mut ast, BasicType::SamplerCube);
        let (root, body) = program(&mut ast, vec![call]);

        let result = rewrite_texture_cube_grad(&mut ast, root, &mut ctx).unwrap();
        assert!(result.modified);
        assert!(result.functions_changed);

        // Helper precedes main
        let NodeKind::Block { statements } = &ast.node(root).kind else {
            panic!("root is not a block");
        };
        assert_eq!(statements.len(), 2);
        let helper_name = ast.definition_name(statements[0]).unwrap();
        assert_eq!(unmangle_name(helper_name), HELPER_BASE_NAME);

        // The sampling statement now calls the helper
        let NodeKind::Block { statements } = &ast.node(body).kind else {
            panic!("main body lost");
        };
        match &ast.node(statements[0]).kind {
            NodeKind::Call {
                target: CallTarget::Function(name),
                args,
            } => {
                assert_eq!(unmangle_name(name), HELPER_BASE_NAME);
                assert_eq!(args.len(), 4);
            }
            other => panic!("expected helper call, got {:?}", other),
        }

        // The native call inside the helper is not rewritten again
        let again = rewrite_texture_cube_grad(&mut ast, root, &mut ctx).unwrap();
        assert!(!again.modified);
    }

    #[test]
    fn test_helper_is_shared_between_calls() {
        let mut ast = Ast::new();
        let mut ctx = CompileContext::new();

        let first = sample_call(&mut ast, BasicType::SamplerCube);
        let second = sample_call(&mut ast, BasicType::SamplerCube);
        let (root, _) = program(&mut ast, vec![first, second]);

        rewrite_texture_cube_grad(&mut ast, root, &mut ctx).unwrap();

        let NodeKind::Block { statements } = &ast.node(root).kind else {
            panic!("root is not a block");
        };
        // One helper and main, not two helpers
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_non_cube_sampling_is_untouched() {
        let mut ast = Ast::new();
        let mut ctx = CompileContext::new();

        let call = sample_call(&mut ast, BasicType::Sampler2D);
        let (root, _) = program(&mut ast, vec![call]);

        let result = rewrite_texture_cube_grad(&mut ast, root, &mut ctx).unwrap();
        assert!(!result.modified);
        assert!(!result.functions_changed);
    }
}
