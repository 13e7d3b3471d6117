//! AST node definitions

use crate::{BinaryOp, BranchKind, BuiltinOp, ConstantValue, LoopKind, Span, Type, UnaryOp};
use serde::{Deserialize, Serialize};

/// Handle to a node in the [`crate::Ast`] arena
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A function parameter; the qualifier on `ty` distinguishes in / out / inout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// The target of a call expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallTarget {
    /// A user-defined (or synthesized) function, identified by mangled name
    Function(String),
    /// A language builtin; never an edge in the call graph
    Builtin(BuiltinOp),
}

impl CallTarget {
    pub fn is_user_defined(&self) -> bool {
        matches!(self, CallTarget::Function(_))
    }

    pub fn as_builtin(&self) -> Option<BuiltinOp> {
        match self {
            CallTarget::Builtin(op) => Some(*op),
            CallTarget::Function(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Reference to a named variable
    Symbol { name: String },
    Constant(ConstantValue),
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Ternary {
        condition: NodeId,
        then_expr: NodeId,
        else_expr: NodeId,
    },
    /// Component selection; `fields` are component offsets (0..=3)
    Swizzle {
        operand: NodeId,
        fields: Vec<u8>,
    },
    Call {
        target: CallTarget,
        args: Vec<NodeId>,
    },
    /// Construction of the node's own type from the arguments
    Constructor { args: Vec<NodeId> },
    Block { statements: Vec<NodeId> },
    Declaration {
        name: String,
        initializer: Option<NodeId>,
    },
    If {
        condition: NodeId,
        then_block: NodeId,
        else_block: Option<NodeId>,
    },
    Loop {
        kind: LoopKind,
        init: Option<NodeId>,
        condition: Option<NodeId>,
        expression: Option<NodeId>,
        body: NodeId,
    },
    Branch {
        kind: BranchKind,
        value: Option<NodeId>,
    },
    Switch {
        selector: NodeId,
        body: NodeId,
    },
    /// A case label inside a switch body; `None` is `default:`
    Case { label: Option<NodeId> },
    FunctionPrototype {
        name: String,
        params: Vec<Param>,
    },
    FunctionDefinition {
        prototype: NodeId,
        body: NodeId,
    },
}

/// One node of the tree. `ty` is the node's result type; statements and
/// declarations carry void or the declared variable's type respectively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub ty: Type,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, ty: Type) -> Self {
        Self {
            kind,
            ty,
            span: Span::dummy(),
        }
    }

    /// Child ids in source order. Loop children come header-first
    /// (init, condition, expression) then body.
    pub fn children(&self) -> Vec<NodeId> {
        match &self.kind {
            NodeKind::Symbol { .. }
            | NodeKind::Constant(_)
            | NodeKind::FunctionPrototype { .. } => Vec::new(),
            NodeKind::Unary { operand, .. } | NodeKind::Swizzle { operand, .. } => {
                vec![*operand]
            }
            NodeKind::Binary { left, right, .. } => vec![*left, *right],
            NodeKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => vec![*condition, *then_expr, *else_expr],
            NodeKind::Call { args, .. } | NodeKind::Constructor { args } => args.clone(),
            NodeKind::Block { statements } => statements.clone(),
            NodeKind::Declaration { initializer, .. } => initializer.iter().copied().collect(),
            NodeKind::If {
                condition,
                then_block,
                else_block,
            } => {
                let mut children = vec![*condition, *then_block];
                children.extend(else_block.iter().copied());
                children
            }
            NodeKind::Loop {
                init,
                condition,
                expression,
                body,
                ..
            } => {
                let mut children = Vec::new();
                children.extend(init.iter().copied());
                children.extend(condition.iter().copied());
                children.extend(expression.iter().copied());
                children.push(*body);
                children
            }
            NodeKind::Branch { value, .. } => value.iter().copied().collect(),
            NodeKind::Switch { selector, body } => vec![*selector, *body],
            NodeKind::Case { label } => label.iter().copied().collect(),
            NodeKind::FunctionDefinition { prototype, body } => vec![*prototype, *body],
        }
    }

    /// Replace the first child slot holding `old` with `new`.
    /// Returns false if `old` is not a direct child.
    pub fn replace_child(&mut self, old: NodeId, new: NodeId) -> bool {
        let replace_slot = |slot: &mut NodeId| {
            if *slot == old {
                *slot = new;
                true
            } else {
                false
            }
        };
        let replace_opt = |slot: &mut Option<NodeId>| {
            if *slot == Some(old) {
                *slot = Some(new);
                true
            } else {
                false
            }
        };
        let replace_seq = |seq: &mut Vec<NodeId>| {
            if let Some(found) = seq.iter_mut().find(|id| **id == old) {
                *found = new;
                true
            } else {
                false
            }
        };
        match &mut self.kind {
            NodeKind::Symbol { .. }
            | NodeKind::Constant(_)
            | NodeKind::FunctionPrototype { .. } => false,
            NodeKind::Unary { operand, .. } | NodeKind::Swizzle { operand, .. } => {
                replace_slot(operand)
            }
            NodeKind::Binary { left, right, .. } => replace_slot(left) || replace_slot(right),
            NodeKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => replace_slot(condition) || replace_slot(then_expr) || replace_slot(else_expr),
            NodeKind::Call { args, .. } | NodeKind::Constructor { args } => replace_seq(args),
            NodeKind::Block { statements } => replace_seq(statements),
            NodeKind::Declaration { initializer, .. } => replace_opt(initializer),
            NodeKind::If {
                condition,
                then_block,
                else_block,
            } => replace_slot(condition) || replace_slot(then_block) || replace_opt(else_block),
            NodeKind::Loop {
                init,
                condition,
                expression,
                body,
                ..
            } => {
                replace_opt(init)
                    || replace_opt(condition)
                    || replace_opt(expression)
                    || replace_slot(body)
            }
            NodeKind::Branch { value, .. } => replace_opt(value),
            NodeKind::Switch { selector, body } => replace_slot(selector) || replace_slot(body),
            NodeKind::Case { label } => replace_opt(label),
            NodeKind::FunctionDefinition { prototype, body } => {
                replace_slot(prototype) || replace_slot(body)
            }
        }
    }

    /// Control flow for the purposes of taint tracking: loops and ifs
    pub fn is_control_flow(&self) -> bool {
        matches!(self.kind, NodeKind::If { .. } | NodeKind::Loop { .. })
    }
}
