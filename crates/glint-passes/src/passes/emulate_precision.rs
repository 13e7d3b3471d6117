//! Emulates reduced-precision rounding for compound assignments
//!
//! Hardware that computes everything at full precision makes `mediump` and
//! `lowp` compound assignments (`+=`, `-=`, `*=`, `/=`) too accurate, which
//! changes observable results. This pass is the "collect, don't replace"
//! variant of the traversal contract: it records the distinct
//! (operator, result type, operand type) triples actually used and emits
//! textual helper definitions for them into the output stream; the tree
//! itself is never edited.

use crate::error::PassError;
use crate::passes::{PassResult, RewritePass};
use crate::traverse::{AstVisitor, Traversal, Visit};
use glint_ast::{
    Ast, BasicType, BinaryOp, CompileContext, NodeId, NodeKind, Precision, Qualifier, Type,
};
use std::collections::BTreeSet;

/// The helpers a shader needs, keyed for deterministic emission order
#[derive(Debug, Default, Clone)]
pub struct PrecisionEmulation {
    triples: BTreeSet<(BinaryOp, Type, Type)>,
}

fn key_type(ty: Type) -> Type {
    Type {
        qualifier: Qualifier::Temporary,
        ..ty
    }
}

fn round_function(precision: Precision) -> &'static str {
    match precision {
        Precision::Medium => "glint_frm",
        Precision::Low => "glint_frl",
        _ => unreachable!("no rounding helper for {:?}", precision),
    }
}

fn op_word(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        other => unreachable!("not a compound base operator: {:?}", other),
    }
}

fn op_symbol(op: BinaryOp) -> char {
    match op {
        BinaryOp::Add => '+',
        BinaryOp::Sub => '-',
        BinaryOp::Mul => '*',
        BinaryOp::Div => '/',
        other => unreachable!("not a compound base operator: {:?}", other),
    }
}

impl PrecisionEmulation {
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn triples(&self) -> impl Iterator<Item = &(BinaryOp, Type, Type)> {
        self.triples.iter()
    }

    /// Append the rounding helpers and one compound-assignment helper per
    /// collected triple to `out`, as target-language source text
    pub fn write_helpers(&self, out: &mut String) {
        // Every type that flows through a rounding call, vector column
        // types of matrices included
        let mut rounded: BTreeSet<(Precision, Type)> = BTreeSet::new();
        for &(_, result, operand) in &self.triples {
            let precision = result.precision;
            rounded.insert((precision, result));
            rounded.insert((precision, operand));
            if result.is_matrix() {
                rounded.insert((precision, result.field_type().with_precision(precision)));
            }
        }

        for &(precision, ty) in &rounded {
            if ty.is_matrix() {
                Self::write_matrix_round_helper(out, precision, ty);
            } else {
                Self::write_round_helper(out, precision, ty);
            }
        }

        for &(op, result, operand) in &self.triples {
            let round = round_function(result.precision);
            let name = format!("glint_compound_{}_{}", op_word(op), &round["glint_".len()..]);
            out.push_str(&format!(
                "{result} {name}(inout {result} x, in {operand} y)\n{{\n    x = {round}({round}(x) {op} y);\n    return x;\n}}\n",
                result = result.short_name(),
                name = name,
                round = round,
                op = op_symbol(op),
                operand = operand.short_name(),
            ));
        }
    }

    fn write_round_helper(out: &mut String, precision: Precision, ty: Type) {
        let name = round_function(precision);
        let type_name = ty.short_name();
        match precision {
            Precision::Medium => out.push_str(&format!(
                "{ty} {name}(in {ty} v)\n{{\n    v = clamp(v, -65504.0, 65504.0);\n    {ty} exponent = floor(log2(abs(v) + 1e-30)) - 10.0;\n    {ty} bound = exp2(exponent);\n    return floor(v / bound + 0.5) * bound;\n}}\n",
                ty = type_name,
                name = name,
            )),
            Precision::Low => out.push_str(&format!(
                "{ty} {name}(in {ty} v)\n{{\n    v = clamp(v, -2.0, 2.0);\n    return floor(v / 0.00390625 + 0.5) * 0.00390625;\n}}\n",
                ty = type_name,
                name = name,
            )),
            _ => unreachable!("no rounding helper for {:?}", precision),
        }
    }

    fn write_matrix_round_helper(out: &mut String, precision: Precision, ty: Type) {
        let name = round_function(precision);
        let type_name = ty.short_name();
        out.push_str(&format!(
            "{ty} {name}(in {ty} m)\n{{\n    {ty} rounded;\n",
            ty = type_name,
            name = name,
        ));
        for column in 0..ty.cols() {
            out.push_str(&format!(
                "    rounded[{column}] = {name}(m[{column}]);\n",
                column = column,
                name = name,
            ));
        }
        out.push_str("    return rounded;\n}\n");
    }
}

struct PrecisionVisitor {
    emulation: PrecisionEmulation,
}

impl AstVisitor for PrecisionVisitor {
    fn visit_binary(&mut self, _t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        if visit != Visit::Pre {
            return true;
        }
        let NodeKind::Binary { op, right, .. } = ast.node(node).kind else {
            unreachable!("binary hook on non-binary node");
        };
        if !op.is_compound_assignment() {
            return true;
        }
        let result_ty = ast.node(node).ty;
        if result_ty.basic != BasicType::Float
            || !matches!(result_ty.precision, Precision::Low | Precision::Medium)
        {
            return true;
        }
        let base = op.compound_base().expect("compound assignment has a base op");
        let operand_ty = ast.node(right).ty;
        self.emulation
            .triples
            .insert((base, key_type(result_ty), key_type(operand_ty)));
        true
    }
}

/// Collect the compound-assignment helpers the program needs
pub fn emulate_precision(ast: &mut Ast, root: NodeId) -> Result<PrecisionEmulation, PassError> {
    let mut visitor = PrecisionVisitor {
        emulation: PrecisionEmulation::default(),
    };
    let mut traversal = Traversal::new();
    traversal.traverse(&mut visitor, ast, root);
    debug_assert_eq!(traversal.pending_edits(), 0);
    traversal.update_tree(ast)?;
    Ok(visitor.emulation)
}

#[derive(Debug, Default)]
pub struct EmulatePrecision {
    pub emulation: PrecisionEmulation,
}

impl RewritePass for EmulatePrecision {
    fn name(&self) -> &'static str {
        "emulate-precision"
    }

    fn run(
        &mut self,
        ast: &mut Ast,
        root: NodeId,
        _ctx: &mut CompileContext,
    ) -> Result<PassResult, PassError> {
        self.emulation = emulate_precision(ast, root)?;
        // Collect-only: the tree is never modified
        Ok(PassResult::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_ast::{binary, block, symbol};

    fn mediump_float() -> Type {
        Type::scalar(BasicType::Float, Precision::Medium)
    }

    #[test]
    fn test_collects_distinct_triples() {
        let mut ast = Ast::new();
        let x = symbol(&mut ast, "x", mediump_float());
        let y = symbol(&mut ast, "y", mediump_float());
        let add = binary(&mut ast, BinaryOp::AddAssign, x, y, mediump_float());

        let x2 = symbol(&mut ast, "x", mediump_float());
        let y2 = symbol(&mut ast, "y", mediump_float());
        let add2 = binary(&mut ast, BinaryOp::AddAssign, x2, y2, mediump_float());

        let x3 = symbol(&mut ast, "x", mediump_float());
        let y3 = symbol(&mut ast, "y", mediump_float());
        let mul = binary(&mut ast, BinaryOp::MulAssign, x3, y3, mediump_float());

        let root = block(&mut ast, vec![add, add2, mul]);
        let emulation = emulate_precision(&mut ast, root).unwrap();

        // The duplicate += collapses; the *= stays distinct
        assert_eq!(emulation.triples().count(), 2);
    }

    #[test]
    fn test_helper_text() {
        let mut ast = Ast::new();
        let x = symbol(&mut ast, "x", mediump_float());
        let y = symbol(&mut ast, "y", mediump_float());
        let add = binary(&mut ast, BinaryOp::AddAssign, x, y, mediump_float());
        let root = block(&mut ast, vec![add]);

        let emulation = emulate_precision(&mut ast, root).unwrap();
        let mut text = String::new();
        emulation.write_helpers(&mut text);

        assert!(text.contains("float glint_frm(in float v)"));
        assert!(text.contains("float glint_compound_add_frm(inout float x, in float y)"));
        assert!(text.contains("glint_frm(glint_frm(x) + y)"));
    }

    #[test]
    fn test_high_precision_is_ignored() {
        let mut ast = Ast::new();
        let high = Type::scalar(BasicType::Float, Precision::High);
        let x = symbol(&mut ast, "x", high);
        let y = symbol(&mut ast, "y", high);
        let add = binary(&mut ast, BinaryOp::AddAssign, x, y, high);
        let root = block(&mut ast, vec![add]);

        let emulation = emulate_precision(&mut ast, root).unwrap();
        assert!(emulation.is_empty());
        let mut text = String::new();
        emulation.write_helpers(&mut text);
        assert!(text.is_empty());
    }

    #[test]
    fn test_plain_assignment_is_ignored() {
        let mut ast = Ast::new();
        let x = symbol(&mut ast, "x", mediump_float());
        let y = symbol(&mut ast, "y", mediump_float());
        let set = binary(&mut ast, BinaryOp::Assign, x, y, mediump_float());
        let root = block(&mut ast, vec![set]);

        let emulation = emulate_precision(&mut ast, root).unwrap();
        assert!(emulation.is_empty());
    }
}
