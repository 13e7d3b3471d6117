//! Compact tree dump for tests and debugging

use crate::{Ast, CallTarget, ConstantValue, NodeId, NodeKind};
use std::fmt::Write;

/// Render a subtree as a single-line s-expression, e.g.
/// `(binary Add (symbol x) (constant 1))`
pub fn dump(ast: &Ast, id: NodeId) -> String {
    let mut out = String::new();
    write_node(ast, id, &mut out);
    out
}

fn write_node(ast: &Ast, id: NodeId, out: &mut String) {
    let node = ast.node(id);
    match &node.kind {
        NodeKind::Symbol { name } => {
            let _ = write!(out, "(symbol {})", name);
        }
        NodeKind::Constant(value) => {
            let _ = match value {
                ConstantValue::Float(v) => write!(out, "(const {})", v),
                ConstantValue::Int(v) => write!(out, "(const {})", v),
                ConstantValue::UInt(v) => write!(out, "(const {}u)", v),
                ConstantValue::Bool(v) => write!(out, "(const {})", v),
                ConstantValue::Yuv(standard) => write!(out, "(const {:?})", standard),
            };
        }
        NodeKind::Unary { op, .. } => write_composite(ast, id, &format!("unary {:?}", op), out),
        NodeKind::Binary { op, .. } => write_composite(ast, id, &format!("binary {:?}", op), out),
        NodeKind::Ternary { .. } => write_composite(ast, id, "ternary", out),
        NodeKind::Swizzle { fields, .. } => {
            write_composite(ast, id, &format!("swizzle {:?}", fields), out)
        }
        NodeKind::Call { target, .. } => {
            let label = match target {
                CallTarget::Function(name) => format!("call {}", name),
                CallTarget::Builtin(op) => format!("builtin {}", op.name()),
            };
            write_composite(ast, id, &label, out);
        }
        NodeKind::Constructor { .. } => {
            write_composite(ast, id, &format!("construct {}", node.ty), out)
        }
        NodeKind::Block { .. } => write_composite(ast, id, "block", out),
        NodeKind::Declaration { name, .. } => {
            write_composite(ast, id, &format!("decl {}", name), out)
        }
        NodeKind::If { .. } => write_composite(ast, id, "if", out),
        NodeKind::Loop { kind, .. } => write_composite(ast, id, &format!("loop {:?}", kind), out),
        NodeKind::Branch { kind, .. } => {
            write_composite(ast, id, &format!("branch {:?}", kind), out)
        }
        NodeKind::Switch { .. } => write_composite(ast, id, "switch", out),
        NodeKind::Case { .. } => write_composite(ast, id, "case", out),
        NodeKind::FunctionPrototype { name, .. } => {
            let _ = write!(out, "(prototype {})", name);
        }
        NodeKind::FunctionDefinition { .. } => write_composite(ast, id, "function", out),
    }
}

fn write_composite(ast: &Ast, id: NodeId, label: &str, out: &mut String) {
    let _ = write!(out, "({}", label);
    for child in ast.children(id) {
        out.push(' ');
        write_node(ast, child, out);
    }
    out.push(')');
}
