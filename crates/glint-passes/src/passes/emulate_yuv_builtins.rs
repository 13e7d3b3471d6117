//! Emulates the `yuv_2_rgb` and `rgb_2_yuv` builtins
//!
//! Backends without native colour-space conversion get synthesized helper
//! functions implementing the matrix math, one per precision actually used
//! (lazily created and cached). The colour argument of one conversion can
//! itself be the other conversion; since a replaced node's children are not
//! re-visited by the traversal, nested conversions are resolved recursively
//! while the replacement is constructed.

use crate::error::PassError;
use crate::passes::{PassResult, RewritePass};
use crate::traverse::{AstVisitor, Traversal, Visit};
use glint_ast::{
    binary, case_label, constant_float, constant_yuv, constructor, create_temp_variable,
    first_function_definition_index, function_call, function_definition, index_direct,
    return_statement, switch_statement, symbol, temp_init_declaration, temp_symbol, ternary,
    Ast, BasicType, BinaryOp, BuiltinOp, CompileContext, NodeId, NodeKind, Param, Precision,
    Qualifier, Type, YuvCscStandard,
};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Direction {
    Yuv2Rgb,
    Rgb2Yuv,
}

impl Direction {
    fn base_name(self) -> &'static str {
        match self {
            Direction::Yuv2Rgb => "glint_yuv_2_rgb",
            Direction::Rgb2Yuv => "glint_rgb_2_yuv",
        }
    }
}

struct Helper {
    mangled: String,
    definition: NodeId,
}

struct YuvVisitor<'a> {
    ctx: &'a mut CompileContext,
    helpers: HashMap<(Direction, Precision), Helper>,
    order: Vec<(Direction, Precision)>,
    modified: bool,
}

fn make_vec3(ast: &mut Ast, x: f32, y: f32, z: f32) -> NodeId {
    let cx = constant_float(ast, x, Precision::High);
    let cy = constant_float(ast, y, Precision::High);
    let cz = constant_float(ast, z, Precision::High);
    let ty = Type::vector(BasicType::Float, Precision::High, 3);
    constructor(ast, ty, vec![cx, cy, cz])
}

fn make_mat3(ast: &mut Ast, elements: [f32; 9]) -> NodeId {
    let args = elements
        .iter()
        .map(|&element| constant_float(ast, element, Precision::Medium))
        .collect();
    constructor(ast, Type::matrix(Precision::Medium, 3, 3), args)
}

impl AstVisitor for YuvVisitor<'_> {
    fn visit_call(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        if visit != Visit::Pre {
            return true;
        }
        if let Some(replacement) = self.replace_conversion(t, ast, node) {
            t.queue_replacement(node, replacement);
            self.modified = true;
            return false;
        }
        true
    }
}

impl YuvVisitor<'_> {
    fn direction_of(ast: &Ast, node: NodeId) -> Option<Direction> {
        match &ast.node(node).kind {
            NodeKind::Call { target, .. } => match target.as_builtin()? {
                BuiltinOp::Yuv2Rgb => Some(Direction::Yuv2Rgb),
                BuiltinOp::Rgb2Yuv => Some(Direction::Rgb2Yuv),
                _ => None,
            },
            _ => None,
        }
    }

    /// Build a helper call replacing the conversion at `node`, or `None` if
    /// `node` is not a conversion
    fn replace_conversion(
        &mut self,
        t: &mut Traversal,
        ast: &mut Ast,
        node: NodeId,
    ) -> Option<NodeId> {
        let direction = Self::direction_of(ast, node)?;
        let NodeKind::Call { args, .. } = ast.node(node).kind.clone() else {
            unreachable!("conversion is not a call");
        };
        debug_assert_eq!(args.len(), 2);
        let color = args[0];
        let standard = args[1];

        let mut precision = ast.node(color).ty.precision;
        if precision == Precision::Undefined {
            precision = Precision::Medium;
        }
        let helper = self.helper_name(ast, direction, precision);

        // The colour argument may itself be a conversion (or contain one).
        // The outer node is dropped by the replacement, so its subtree must
        // be resolved now rather than by the ongoing traversal.
        let color = match self.replace_conversion(t, ast, color) {
            Some(replaced) => replaced,
            None => {
                self.replace_nested(t, ast, color);
                color
            }
        };

        let return_ty = ast.node(node).ty;
        Some(function_call(ast, helper, vec![color, standard], return_ty))
    }

    /// Queue replacements for conversions anywhere below `node`. The
    /// parents of these matches survive inside the replacement subtree, so
    /// normal staged replacement applies to them.
    fn replace_nested(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId) {
        for child in ast.children(node) {
            if let Some(replacement) = self.replace_conversion(t, ast, child) {
                t.queue_replacement_with_parent(node, child, replacement);
                self.modified = true;
            } else {
                self.replace_nested(t, ast, child);
            }
        }
    }

    fn helper_name(&mut self, ast: &mut Ast, direction: Direction, precision: Precision) -> String {
        if let Some(helper) = self.helpers.get(&(direction, precision)) {
            return helper.mangled.clone();
        }
        let definition = match direction {
            Direction::Yuv2Rgb => self.build_yuv_2_rgb(ast, precision),
            Direction::Rgb2Yuv => self.build_rgb_2_yuv(ast, precision),
        };
        let mangled = ast
            .definition_name(definition)
            .expect("helper has a name")
            .to_string();
        self.helpers.insert(
            (direction, precision),
            Helper {
                mangled: mangled.clone(),
                definition,
            },
        );
        self.order.push((direction, precision));
        mangled
    }

    fn conversion_params(precision: Precision) -> (Type, Type, Vec<Param>) {
        let color_ty =
            Type::vector(BasicType::Float, precision, 3).with_qualifier(Qualifier::ParamIn);
        let standard_ty = Type::scalar(BasicType::YuvCscStandard, Precision::Undefined)
            .with_qualifier(Qualifier::ParamIn);
        let params = vec![
            Param {
                name: "color".into(),
                ty: color_ty,
            },
            Param {
                name: "conv_standard".into(),
                ty: standard_ty,
            },
        ];
        (color_ty, standard_ty, params)
    }

    fn mangled_helper_name(direction: Direction, precision: Precision, params: &[Param]) -> String {
        let name = format!("{}_{}", direction.base_name(), precision.suffix());
        let param_types: Vec<Type> = params.iter().map(|param| param.ty).collect();
        glint_ast::mangle_name(&name, &param_types)
    }

    /// `vec3 glint_yuv_2_rgb_*(vec3 color, yuvCscStandardEXT conv_standard)`
    /// computing the expansion and per-channel reconstruction
    fn build_yuv_2_rgb(&mut self, ast: &mut Ast, precision: Precision) -> NodeId {
        let (color_ty, standard_ty, params) = Self::conversion_params(precision);
        let return_ty = Type::vector(BasicType::Float, precision, 3);
        let float_ty = Type::scalar(BasicType::Float, Precision::High);
        let bool_ty = Type::scalar(BasicType::Bool, Precision::Undefined);

        let mut statements = Vec::new();

        // float kr = conv_standard == itu_709 ? 0.2126 : 0.229;
        let conv = symbol(ast, "conv_standard", standard_ty);
        let itu709 = constant_yuv(ast, YuvCscStandard::Itu709);
        let is_709 = binary(ast, BinaryOp::Equal, conv, itu709, bool_ty);
        let kr_high = constant_float(ast, 0.2126, Precision::High);
        let kr_low = constant_float(ast, 0.229, Precision::High);
        let kr_value = ternary(ast, is_709, kr_high, kr_low);
        let kr = create_temp_variable(self.ctx, float_ty);
        statements.push(temp_init_declaration(ast, &kr, kr_value));

        // float kb = conv_standard == itu_709 ? 0.0722 : 0.114;
        let conv = symbol(ast, "conv_standard", standard_ty);
        let itu709 = constant_yuv(ast, YuvCscStandard::Itu709);
        let is_709 = binary(ast, BinaryOp::Equal, conv, itu709, bool_ty);
        let kb_high = constant_float(ast, 0.0722, Precision::High);
        let kb_low = constant_float(ast, 0.114, Precision::High);
        let kb_value = ternary(ast, is_709, kb_high, kb_low);
        let kb = create_temp_variable(self.ctx, float_ty);
        statements.push(temp_init_declaration(ast, &kb, kb_value));

        // vec3 expanded = conv_standard == itu_601_full_range
        //     ? color + vec3(0.0, -128.0/255.0, -128.0/255.0)
        //     : vec3(255.0/219.0, 255.0/224.0, 255.0/224.0)
        //           * (color + vec3(-16.0/255.0, -128.0/255.0, -128.0/255.0));
        let conv = symbol(ast, "conv_standard", standard_ty);
        let itu601_full = constant_yuv(ast, YuvCscStandard::Itu601FullRange);
        let is_full_range = binary(ast, BinaryOp::Equal, conv, itu601_full, bool_ty);
        let color = symbol(ast, "color", color_ty);
        let full_bias = make_vec3(ast, 0.0, -128.0 / 255.0, -128.0 / 255.0);
        let full_range = binary(ast, BinaryOp::Add, color, full_bias, return_ty);
        let color = symbol(ast, "color", color_ty);
        let narrow_bias = make_vec3(ast, -16.0 / 255.0, -128.0 / 255.0, -128.0 / 255.0);
        let biased = binary(ast, BinaryOp::Add, color, narrow_bias, return_ty);
        let scale = make_vec3(ast, 255.0 / 219.0, 255.0 / 224.0, 255.0 / 224.0);
        let narrow_range = binary(ast, BinaryOp::Mul, scale, biased, return_ty);
        let expanded_value = ternary(ast, is_full_range, full_range, narrow_range);
        let expanded = create_temp_variable(self.ctx, return_ty);
        statements.push(temp_init_declaration(ast, &expanded, expanded_value));

        // float r = y + 2.0 * (cr * (1.0 - kr));
        let y = {
            let expanded = temp_symbol(ast, &expanded);
            index_direct(ast, expanded, 0)
        };
        let cr = {
            let expanded = temp_symbol(ast, &expanded);
            index_direct(ast, expanded, 2)
        };
        let one = constant_float(ast, 1.0, Precision::High);
        let kr_sym = temp_symbol(ast, &kr);
        let one_minus_kr = binary(ast, BinaryOp::Sub, one, kr_sym, float_ty);
        let cr_scaled = binary(ast, BinaryOp::Mul, cr, one_minus_kr, float_ty);
        let two = constant_float(ast, 2.0, Precision::High);
        let doubled = binary(ast, BinaryOp::Mul, two, cr_scaled, float_ty);
        let r_value = binary(ast, BinaryOp::Add, y, doubled, float_ty);
        let r = create_temp_variable(self.ctx, float_ty);
        statements.push(temp_init_declaration(ast, &r, r_value));

        // float b = y + 2.0 * (cb * (1.0 - kb));
        let y = {
            let expanded = temp_symbol(ast, &expanded);
            index_direct(ast, expanded, 0)
        };
        let cb = {
            let expanded = temp_symbol(ast, &expanded);
            index_direct(ast, expanded, 1)
        };
        let one = constant_float(ast, 1.0, Precision::High);
        let kb_sym = temp_symbol(ast, &kb);
        let one_minus_kb = binary(ast, BinaryOp::Sub, one, kb_sym, float_ty);
        let cb_scaled = binary(ast, BinaryOp::Mul, cb, one_minus_kb, float_ty);
        let two = constant_float(ast, 2.0, Precision::High);
        let doubled = binary(ast, BinaryOp::Mul, two, cb_scaled, float_ty);
        let b_value = binary(ast, BinaryOp::Add, y, doubled, float_ty);
        let b = create_temp_variable(self.ctx, float_ty);
        statements.push(temp_init_declaration(ast, &b, b_value));

        // float g = (y - kr * r - kb * b) / (1.0 - kr - kb);
        let y = {
            let expanded = temp_symbol(ast, &expanded);
            index_direct(ast, expanded, 0)
        };
        let kr_sym = temp_symbol(ast, &kr);
        let r_sym = temp_symbol(ast, &r);
        let kr_r = binary(ast, BinaryOp::Mul, kr_sym, r_sym, float_ty);
        let kb_sym = temp_symbol(ast, &kb);
        let b_sym = temp_symbol(ast, &b);
        let kb_b = binary(ast, BinaryOp::Mul, kb_sym, b_sym, float_ty);
        let partial = binary(ast, BinaryOp::Sub, y, kr_r, float_ty);
        let numerator = binary(ast, BinaryOp::Sub, partial, kb_b, float_ty);
        let one = constant_float(ast, 1.0, Precision::High);
        let kr_sym = temp_symbol(ast, &kr);
        let one_minus = binary(ast, BinaryOp::Sub, one, kr_sym, float_ty);
        let kb_sym = temp_symbol(ast, &kb);
        let denominator = binary(ast, BinaryOp::Sub, one_minus, kb_sym, float_ty);
        let g_value = binary(ast, BinaryOp::Div, numerator, denominator, float_ty);
        let g = create_temp_variable(self.ctx, float_ty);
        statements.push(temp_init_declaration(ast, &g, g_value));

        // return vec3(r, g, b);
        let r_sym = temp_symbol(ast, &r);
        let g_sym = temp_symbol(ast, &g);
        let b_sym = temp_symbol(ast, &b);
        let result = constructor(ast, return_ty, vec![r_sym, g_sym, b_sym]);
        statements.push(return_statement(ast, Some(result)));

        let body = glint_ast::block(ast, statements);
        let mangled = Self::mangled_helper_name(Direction::Yuv2Rgb, precision, &params);
        function_definition(ast, mangled, params, return_ty, body)
    }

    /// `vec3 glint_rgb_2_yuv_*(vec3 color, yuvCscStandardEXT conv_standard)`
    /// selecting a conversion matrix per standard
    fn build_rgb_2_yuv(&mut self, ast: &mut Ast, precision: Precision) -> NodeId {
        const ITU_601: [f32; 9] = [
            0.299, -0.1687, 0.5, 0.587, -0.3313, -0.4187, 0.114, 0.5, -0.0813,
        ];
        const ITU_709: [f32; 9] = [
            0.2126, -0.1146, 0.5, 0.7152, -0.3854, -0.4542, 0.0722, 0.5, -0.0458,
        ];

        let (color_ty, standard_ty, params) = Self::conversion_params(precision);
        let return_ty = Type::vector(BasicType::Float, precision, 3);

        // vec3 scaled =
        //     (color + vec3(-16.0/255.0, -0.5, -0.5))
        //         * vec3(255.0/219.0, 255.0/224.0, 255.0/224.0);
        let color = symbol(ast, "color", color_ty);
        let bias = make_vec3(ast, -16.0 / 255.0, -0.5, -0.5);
        let biased = binary(ast, BinaryOp::Add, color, bias, return_ty);
        let scale = make_vec3(ast, 255.0 / 219.0, 255.0 / 224.0, 255.0 / 224.0);
        let scaled = binary(ast, BinaryOp::Mul, biased, scale, return_ty);

        // switch (conv_standard) { case ...: return matrix * scaled; }
        let mut switch_statements = Vec::new();
        let standards = [
            (YuvCscStandard::Itu601, ITU_601),
            (YuvCscStandard::Itu601FullRange, ITU_601),
            (YuvCscStandard::Itu709, ITU_709),
        ];
        for (index, (standard, matrix)) in standards.into_iter().enumerate() {
            let label = constant_yuv(ast, standard);
            switch_statements.push(case_label(ast, Some(label)));
            let matrix = make_mat3(ast, matrix);
            let operand = if index == 0 {
                scaled
            } else {
                ast.deep_copy(scaled)
            };
            let converted = binary(ast, BinaryOp::MatrixTimesVector, matrix, operand, return_ty);
            switch_statements.push(return_statement(ast, Some(converted)));
        }
        let switch_body = glint_ast::block(ast, switch_statements);
        let selector = symbol(ast, "conv_standard", standard_ty);
        let switch_node = switch_statement(ast, selector, switch_body);

        // Unreachable unless the standard is invalid
        let zero = make_vec3(ast, 0.0, 0.0, 0.0);
        let fallback = return_statement(ast, Some(zero));

        let body = glint_ast::block(ast, vec![switch_node, fallback]);
        let mangled = Self::mangled_helper_name(Direction::Rgb2Yuv, precision, &params);
        function_definition(ast, mangled, params, return_ty, body)
    }
}

/// Replace every YUV conversion builtin with a synthesized helper call
pub fn emulate_yuv_builtins(
    ast: &mut Ast,
    root: NodeId,
    ctx: &mut CompileContext,
) -> Result<PassResult, PassError> {
    let mut visitor = YuvVisitor {
        ctx,
        helpers: HashMap::new(),
        order: Vec::new(),
        modified: false,
    };
    let mut traversal = Traversal::new();
    traversal.traverse(&mut visitor, ast, root);
    let modified = visitor.modified;
    let definitions: Vec<NodeId> = visitor
        .order
        .iter()
        .map(|key| visitor.helpers[key].definition)
        .collect();
    traversal.update_tree(ast)?;

    let functions_changed = !definitions.is_empty();
    if functions_changed {
        let at = first_function_definition_index(ast, root);
        ast.insert_into_block(root, at, &definitions);
    }

    Ok(PassResult {
        modified,
        functions_changed,
    })
}

#[derive(Debug, Default)]
pub struct EmulateYuvBuiltins;

impl RewritePass for EmulateYuvBuiltins {
    fn name(&self) -> &'static str {
        "emulate-yuv-builtins"
    }

    fn run(
        &mut self,
        ast: &mut Ast,
        root: NodeId,
        ctx: &mut CompileContext,
    ) -> Result<PassResult, PassError> {
        emulate_yuv_builtins(ast, root, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_ast::{any_node, block, builtin_call, mangle_name, CallTarget};

    fn vec3_ty(precision: Precision) -> Type {
        Type::vector(BasicType::Float, precision, 3)
    }

    fn standard_ty() -> Type {
        Type::scalar(BasicType::YuvCscStandard, Precision::Undefined)
    }

    fn conversion(ast: &mut Ast, op: BuiltinOp, color: NodeId) -> NodeId {
        let precision = ast.node(color).ty.precision;
        let standard = symbol(ast, "s", standard_ty());
        builtin_call(ast, op, vec![color, standard], vec3_ty(precision))
    }

    /// Wrap statements in `void main()` and return (root, main body)
    fn program(ast: &mut Ast, statements: Vec<NodeId>) -> (NodeId, NodeId) {
        let body = block(ast, statements);
        let main = function_definition(ast, mangle_name("main", &[]), vec![], Type::void(), body);
        (block(ast, vec![main]), body)
    }

    fn any_yuv_builtin(ast: &Ast, root: NodeId) -> bool {
        any_node(ast, root, &mut |node| match &node.kind {
            NodeKind::Call { target, .. } => matches!(
                target.as_builtin(),
                Some(BuiltinOp::Yuv2Rgb | BuiltinOp::Rgb2Yuv)
            ),
            _ => false,
        })
    }

    fn helper_definitions<'a>(ast: &'a Ast, root: NodeId, prefix: &str) -> Vec<&'a str> {
        let NodeKind::Block { statements } = &ast.node(root).kind else {
            panic!("root is not a block");
        };
        statements
            .iter()
            .filter_map(|&statement| ast.definition_name(statement))
            .filter(|name| name.starts_with(prefix))
            .collect()
    }

    #[test]
    fn test_conversion_becomes_helper_call() {
        let mut ast = Ast::new();
        let mut ctx = CompileContext::new();

        let color = symbol(&mut ast, "c", vec3_ty(Precision::Medium));
        let call = conversion(&mut ast, BuiltinOp::Yuv2Rgb, color);
        let (root, body) = program(&mut ast, vec![call]);

        let result = emulate_yuv_builtins(&mut ast, root, &mut ctx).unwrap();
        assert!(result.modified);
        assert!(result.functions_changed);
        assert!(!any_yuv_builtin(&ast, root));

        // The helper definition precedes main
        let helpers = helper_definitions(&ast, root, "glint_yuv_2_rgb_mediump(");
        assert_eq!(helpers.len(), 1);
        let NodeKind::Block { statements } = &ast.node(root).kind else {
            panic!("root is not a block");
        };
        assert!(ast
            .definition_name(statements[0])
            .unwrap()
            .starts_with("glint_yuv_2_rgb_mediump("));

        let NodeKind::Block { statements } = &ast.node(body).kind else {
            panic!("main body lost");
        };
        match &ast.node(statements[0]).kind {
            NodeKind::Call {
                target: CallTarget::Function(name),
                args,
            } => {
                assert!(name.starts_with("glint_yuv_2_rgb_mediump("));
                assert_eq!(args[0], color);
            }
            other => panic!("expected helper call, got {:?}", other),
        }

        // Idempotent: nothing left to match
        let again = emulate_yuv_builtins(&mut ast, root, &mut ctx).unwrap();
        assert!(!again.modified);
    }

    #[test]
    fn test_nested_conversion_is_resolved_during_construction() {
        let mut ast = Ast::new();
        let mut ctx = CompileContext::new();

        // rgb_2_yuv(yuv_2_rgb(c, s), s)
        let color = symbol(&mut ast, "c", vec3_ty(Precision::Medium));
        let inner = conversion(&mut ast, BuiltinOp::Yuv2Rgb, color);
        let outer = conversion(&mut ast, BuiltinOp::Rgb2Yuv, inner);
        let (root, body) = program(&mut ast, vec![outer]);

        let result = emulate_yuv_builtins(&mut ast, root, &mut ctx).unwrap();
        assert!(result.modified);
        assert!(!any_yuv_builtin(&ast, root));

        // One helper per direction
        assert_eq!(helper_definitions(&ast, root, "glint_yuv_2_rgb_").len(), 1);
        assert_eq!(helper_definitions(&ast, root, "glint_rgb_2_yuv_").len(), 1);

        let NodeKind::Block { statements } = &ast.node(body).kind else {
            panic!("main body lost");
        };
        let NodeKind::Call {
            target: CallTarget::Function(outer_name),
            args,
        } = &ast.node(statements[0]).kind
        else {
            panic!("outer call not rewritten");
        };
        assert!(outer_name.starts_with("glint_rgb_2_yuv_"));
        let NodeKind::Call {
            target: CallTarget::Function(inner_name),
            ..
        } = &ast.node(args[0]).kind
        else {
            panic!("inner call not rewritten");
        };
        assert!(inner_name.starts_with("glint_yuv_2_rgb_"));
    }

    #[test]
    fn test_helpers_are_cached_per_precision() {
        let mut ast = Ast::new();
        let mut ctx = CompileContext::new();

        let c1 = symbol(&mut ast, "c1", vec3_ty(Precision::Medium));
        let call1 = conversion(&mut ast, BuiltinOp::Yuv2Rgb, c1);
        let c2 = symbol(&mut ast, "c2", vec3_ty(Precision::Medium));
        let call2 = conversion(&mut ast, BuiltinOp::Yuv2Rgb, c2);
        let c3 = symbol(&mut ast, "c3", vec3_ty(Precision::Low));
        let call3 = conversion(&mut ast, BuiltinOp::Yuv2Rgb, c3);
        let (root, _) = program(&mut ast, vec![call1, call2, call3]);

        emulate_yuv_builtins(&mut ast, root, &mut ctx).unwrap();

        // mediump is shared, lowp is separate
        assert_eq!(helper_definitions(&ast, root, "glint_yuv_2_rgb_").len(), 2);
    }

    #[test]
    fn test_undefined_precision_falls_back_to_mediump() {
        let mut ast = Ast::new();
        let mut ctx = CompileContext::new();

        let color = symbol(&mut ast, "c", vec3_ty(Precision::Undefined));
        let call = conversion(&mut ast, BuiltinOp::Yuv2Rgb, color);
        let (root, _) = program(&mut ast, vec![call]);

        emulate_yuv_builtins(&mut ast, root, &mut ctx).unwrap();

        assert_eq!(
            helper_definitions(&ast, root, "glint_yuv_2_rgb_mediump(").len(),
            1
        );
    }
}
