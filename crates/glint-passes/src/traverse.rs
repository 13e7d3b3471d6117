//! The rewrite traversal framework
//!
//! Every rewrite pass follows the same protocol: walk the tree read-only,
//! stage replacements and statement insertions on the [`Traversal`], then
//! apply them all at once with [`Traversal::update_tree`] after the walk.
//! The tree is never mutated while it is being read; new nodes may be
//! allocated freely during the walk because arena handles are stable.
//!
//! A pass that can produce new matches from its own replacements re-runs
//! the whole cycle until one full traversal stages nothing.
//!
//! Hooks follow the node kinds. Composite hooks are called twice, with
//! [`Visit::Pre`] before the children and [`Visit::Post`] after; returning
//! `false` from the `Pre` call skips both the children and the `Post` call.

use crate::error::PassError;
use glint_ast::{Ast, NodeId, NodeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Pre,
    Post,
}

/// Per-pass hooks. A pass implements only the hooks for the node kinds it
/// matches on; everything else defaults to plain recursion.
#[allow(unused_variables)]
pub trait AstVisitor {
    fn visit_symbol(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId) {}
    fn visit_constant(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId) {}
    fn visit_function_prototype(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId) {}

    fn visit_unary(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        true
    }
    fn visit_binary(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        true
    }
    fn visit_ternary(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        true
    }
    fn visit_swizzle(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        true
    }
    fn visit_call(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        true
    }
    fn visit_constructor(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        true
    }
    fn visit_declaration(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        true
    }
    fn visit_block(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        true
    }
    fn visit_if(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        true
    }
    fn visit_loop(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        true
    }
    fn visit_branch(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        true
    }
    fn visit_switch(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        true
    }
    fn visit_case(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        true
    }
    fn visit_function_definition(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        true
    }
}

/// A staged single-node replacement
#[derive(Debug, Clone)]
pub struct Replacement {
    pub parent: NodeId,
    pub original: NodeId,
    pub replacement: NodeId,
}

/// Staged statement insertions around one statement of a block
#[derive(Debug, Clone)]
pub struct Insertion {
    pub block: NodeId,
    pub position: usize,
    pub before: Vec<NodeId>,
    pub after: Vec<NodeId>,
}

/// Framework state for one pass invocation: the ancestor path, lvalue and
/// nesting bookkeeping, and the staged edit worklists.
#[derive(Debug, Default)]
pub struct Traversal {
    path: Vec<NodeId>,
    current: Option<NodeId>,
    replacements: Vec<Replacement>,
    insertions: Vec<Insertion>,
    in_lvalue: bool,
    loop_depth: u32,
    switch_depth: u32,
    header_depth: u32,
    traversing: bool,
}

impl Traversal {
    pub fn new() -> Self {
        Self::default()
    }

    /// The parent of the node currently being visited
    pub fn parent(&self) -> Option<NodeId> {
        self.path.last().copied()
    }

    /// Ancestors of the current node, outermost first
    pub fn path(&self) -> &[NodeId] {
        &self.path
    }

    /// True while the current node is (part of) an assignment target
    pub fn is_in_assignment_target(&self) -> bool {
        self.in_lvalue
    }

    /// Number of enclosing loops, including one whose hook is running
    pub fn loop_depth(&self) -> u32 {
        self.loop_depth
    }

    /// Number of enclosing switch statements
    pub fn switch_depth(&self) -> u32 {
        self.switch_depth
    }

    /// True while traversing a loop's init/condition/expression
    pub fn in_loop_header(&self) -> bool {
        self.header_depth > 0
    }

    pub fn pending_edits(&self) -> usize {
        self.replacements.len() + self.insertions.len()
    }

    /// Stage `original` (a child of the currently visited node's parent
    /// chain) to be replaced by `replacement`
    pub fn queue_replacement(&mut self, original: NodeId, replacement: NodeId) {
        let parent = self
            .parent()
            .expect("cannot queue a replacement for the root node");
        self.queue_replacement_with_parent(parent, original, replacement);
    }

    /// Stage a replacement under an explicit parent; used when replacing a
    /// child of the current node rather than the current node itself
    pub fn queue_replacement_with_parent(
        &mut self,
        parent: NodeId,
        original: NodeId,
        replacement: NodeId,
    ) {
        assert!(
            self.traversing,
            "edits may only be staged during a traversal"
        );
        self.replacements.push(Replacement {
            parent,
            original,
            replacement,
        });
    }

    /// Stage statement insertions around the statement (in the nearest
    /// enclosing block) that contains the node currently being visited
    pub fn insert_statements_in_parent_block(
        &mut self,
        ast: &Ast,
        before: Vec<NodeId>,
        after: Vec<NodeId>,
    ) {
        assert!(
            self.traversing,
            "edits may only be staged during a traversal"
        );
        let (block, position) = self
            .enclosing_statement(ast)
            .expect("no enclosing block for statement insertion");
        self.insertions.push(Insertion {
            block,
            position,
            before,
            after,
        });
    }

    /// Nearest enclosing block and the index of the statement the current
    /// node lives in
    fn enclosing_statement(&self, ast: &Ast) -> Option<(NodeId, usize)> {
        for (depth, &ancestor) in self.path.iter().enumerate().rev() {
            if let NodeKind::Block { statements } = &ast.node(ancestor).kind {
                let inside = self
                    .path
                    .get(depth + 1)
                    .copied()
                    .or(self.current)
                    .expect("path cannot be empty here");
                let position = statements
                    .iter()
                    .position(|&statement| statement == inside)
                    .expect("current statement not found in enclosing block");
                return Some((ancestor, position));
            }
        }
        None
    }

    /// Run the visitor over the subtree rooted at `root`
    pub fn traverse<V: AstVisitor>(&mut self, visitor: &mut V, ast: &mut Ast, root: NodeId) {
        assert!(!self.traversing, "traversal re-entered");
        self.traversing = true;
        self.walk(visitor, ast, root, false);
        self.traversing = false;
        debug_assert!(self.path.is_empty());
    }

    /// Apply every staged edit, in worklist order for replacements and in
    /// reverse order for insertions so earlier positions stay valid.
    /// Must not be called while a traversal is in flight.
    pub fn update_tree(&mut self, ast: &mut Ast) -> Result<(), PassError> {
        assert!(
            !self.traversing,
            "update_tree called while still traversing"
        );

        for edit in std::mem::take(&mut self.replacements) {
            if !ast.replace_child(edit.parent, edit.original, edit.replacement) {
                return Err(PassError::ReplacementMismatch {
                    parent: edit.parent,
                    original: edit.original,
                });
            }
        }

        for edit in std::mem::take(&mut self.insertions).into_iter().rev() {
            let fits = matches!(
                &ast.node(edit.block).kind,
                NodeKind::Block { statements } if edit.position < statements.len()
            );
            if !fits {
                return Err(PassError::InsertionMismatch {
                    block: edit.block,
                    position: edit.position,
                });
            }
            ast.insert_into_block(edit.block, edit.position + 1, &edit.after);
            ast.insert_into_block(edit.block, edit.position, &edit.before);
        }

        Ok(())
    }

    fn walk<V: AstVisitor>(&mut self, v: &mut V, ast: &mut Ast, node: NodeId, lvalue: bool) {
        let saved_current = self.current;
        let saved_lvalue = self.in_lvalue;
        self.current = Some(node);
        self.in_lvalue = lvalue;

        // The kind is cloned so hooks are free to allocate new nodes while
        // the walk continues over the snapshot of this node's children.
        let kind = ast.node(node).kind.clone();
        match kind {
            NodeKind::Symbol { .. } => v.visit_symbol(self, ast, node),
            NodeKind::Constant(_) => v.visit_constant(self, ast, node),
            NodeKind::FunctionPrototype { .. } => v.visit_function_prototype(self, ast, node),

            NodeKind::Unary { operand, .. } => {
                if v.visit_unary(self, ast, node, Visit::Pre) {
                    self.path.push(node);
                    self.walk(v, ast, operand, false);
                    self.path.pop();
                    v.visit_unary(self, ast, node, Visit::Post);
                }
            }
            NodeKind::Binary { op, left, right } => {
                if v.visit_binary(self, ast, node, Visit::Pre) {
                    self.path.push(node);
                    let left_lvalue = op.is_assignment()
                        || (matches!(
                            op,
                            glint_ast::BinaryOp::IndexDirect | glint_ast::BinaryOp::IndexIndirect
                        ) && lvalue);
                    self.walk(v, ast, left, left_lvalue);
                    self.walk(v, ast, right, false);
                    self.path.pop();
                    v.visit_binary(self, ast, node, Visit::Post);
                }
            }
            NodeKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                if v.visit_ternary(self, ast, node, Visit::Pre) {
                    self.path.push(node);
                    self.walk(v, ast, condition, false);
                    self.walk(v, ast, then_expr, false);
                    self.walk(v, ast, else_expr, false);
                    self.path.pop();
                    v.visit_ternary(self, ast, node, Visit::Post);
                }
            }
            NodeKind::Swizzle { operand, .. } => {
                if v.visit_swizzle(self, ast, node, Visit::Pre) {
                    self.path.push(node);
                    self.walk(v, ast, operand, lvalue);
                    self.path.pop();
                    v.visit_swizzle(self, ast, node, Visit::Post);
                }
            }
            NodeKind::Call { args, .. } => {
                if v.visit_call(self, ast, node, Visit::Pre) {
                    self.path.push(node);
                    for arg in args {
                        self.walk(v, ast, arg, false);
                    }
                    self.path.pop();
                    v.visit_call(self, ast, node, Visit::Post);
                }
            }
            NodeKind::Constructor { args } => {
                if v.visit_constructor(self, ast, node, Visit::Pre) {
                    self.path.push(node);
                    for arg in args {
                        self.walk(v, ast, arg, false);
                    }
                    self.path.pop();
                    v.visit_constructor(self, ast, node, Visit::Post);
                }
            }
            NodeKind::Declaration { initializer, .. } => {
                if v.visit_declaration(self, ast, node, Visit::Pre) {
                    self.path.push(node);
                    if let Some(init) = initializer {
                        self.walk(v, ast, init, false);
                    }
                    self.path.pop();
                    v.visit_declaration(self, ast, node, Visit::Post);
                }
            }
            NodeKind::Block { statements } => {
                if v.visit_block(self, ast, node, Visit::Pre) {
                    self.path.push(node);
                    for statement in statements {
                        self.walk(v, ast, statement, false);
                    }
                    self.path.pop();
                    v.visit_block(self, ast, node, Visit::Post);
                }
            }
            NodeKind::If {
                condition,
                then_block,
                else_block,
            } => {
                if v.visit_if(self, ast, node, Visit::Pre) {
                    self.path.push(node);
                    self.walk(v, ast, condition, false);
                    self.walk(v, ast, then_block, false);
                    if let Some(else_block) = else_block {
                        self.walk(v, ast, else_block, false);
                    }
                    self.path.pop();
                    v.visit_if(self, ast, node, Visit::Post);
                }
            }
            NodeKind::Loop {
                init,
                condition,
                expression,
                body,
                ..
            } => {
                self.loop_depth += 1;
                if v.visit_loop(self, ast, node, Visit::Pre) {
                    self.path.push(node);
                    self.header_depth += 1;
                    for header in [init, condition, expression].into_iter().flatten() {
                        self.walk(v, ast, header, false);
                    }
                    self.header_depth -= 1;
                    self.walk(v, ast, body, false);
                    self.path.pop();
                    v.visit_loop(self, ast, node, Visit::Post);
                }
                self.loop_depth -= 1;
            }
            NodeKind::Branch { value, .. } => {
                if v.visit_branch(self, ast, node, Visit::Pre) {
                    self.path.push(node);
                    if let Some(value) = value {
                        self.walk(v, ast, value, false);
                    }
                    self.path.pop();
                    v.visit_branch(self, ast, node, Visit::Post);
                }
            }
            NodeKind::Switch { selector, body } => {
                if v.visit_switch(self, ast, node, Visit::Pre) {
                    self.path.push(node);
                    self.walk(v, ast, selector, false);
                    self.switch_depth += 1;
                    self.walk(v, ast, body, false);
                    self.switch_depth -= 1;
                    self.path.pop();
                    v.visit_switch(self, ast, node, Visit::Post);
                }
            }
            NodeKind::Case { label } => {
                if v.visit_case(self, ast, node, Visit::Pre) {
                    self.path.push(node);
                    if let Some(label) = label {
                        self.walk(v, ast, label, false);
                    }
                    self.path.pop();
                    v.visit_case(self, ast, node, Visit::Post);
                }
            }
            NodeKind::FunctionDefinition { prototype, body } => {
                if v.visit_function_definition(self, ast, node, Visit::Pre) {
                    self.path.push(node);
                    self.walk(v, ast, prototype, false);
                    self.walk(v, ast, body, false);
                    self.path.pop();
                    v.visit_function_definition(self, ast, node, Visit::Post);
                }
            }
        }

        self.current = saved_current;
        self.in_lvalue = saved_lvalue;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_ast::{
        assign, binary, block, constant_float, symbol, BasicType, BinaryOp, Precision, Type,
    };

    #[derive(Default)]
    struct LvalueProbe {
        lvalue_indexings: Vec<NodeId>,
        rvalue_indexings: Vec<NodeId>,
    }

    impl AstVisitor for LvalueProbe {
        fn visit_binary(
            &mut self,
            t: &mut Traversal,
            ast: &mut Ast,
            node: NodeId,
            visit: Visit,
        ) -> bool {
            if visit == Visit::Pre {
                if let glint_ast::NodeKind::Binary {
                    op: BinaryOp::IndexIndirect,
                    ..
                } = ast.node(node).kind
                {
                    if t.is_in_assignment_target() {
                        self.lvalue_indexings.push(node);
                    } else {
                        self.rvalue_indexings.push(node);
                    }
                }
            }
            true
        }
    }

    #[test]
    fn test_lvalue_tracking() {
        let mut ast = Ast::new();
        let vec_ty = Type::vector(BasicType::Float, Precision::High, 4);
        let int_ty = Type::scalar(BasicType::Int, Precision::High);
        let float_ty = Type::scalar(BasicType::Float, Precision::High);

        // v[u[j]] = w[i];
        let u = symbol(&mut ast, "u", Type::vector(BasicType::Int, Precision::High, 4));
        let j = symbol(&mut ast, "j", int_ty);
        let u_j = binary(&mut ast, BinaryOp::IndexIndirect, u, j, int_ty);
        let v = symbol(&mut ast, "v", vec_ty);
        let v_uj = binary(&mut ast, BinaryOp::IndexIndirect, v, u_j, float_ty);
        let w = symbol(&mut ast, "w", vec_ty);
        let i = symbol(&mut ast, "i", int_ty);
        let w_i = binary(&mut ast, BinaryOp::IndexIndirect, w, i, float_ty);
        let store = assign(&mut ast, v_uj, w_i);
        let root = block(&mut ast, vec![store]);

        let mut probe = LvalueProbe::default();
        let mut traversal = Traversal::new();
        traversal.traverse(&mut probe, &mut ast, root);

        // Only the outer indexing on the left side is an assignment target;
        // the indexing inside the index expression is not.
        assert_eq!(probe.lvalue_indexings, vec![v_uj]);
        assert_eq!(probe.rvalue_indexings, vec![u_j, w_i]);
    }

    struct ReplaceConstants;

    impl AstVisitor for ReplaceConstants {
        fn visit_constant(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId) {
            let replacement = constant_float(ast, 9.0, Precision::High);
            t.queue_replacement(node, replacement);
        }
    }

    #[test]
    fn test_staged_edits_apply_after_traversal() {
        let mut ast = Ast::new();
        let float_ty = Type::scalar(BasicType::Float, Precision::High);
        let one = constant_float(&mut ast, 1.0, Precision::High);
        let two = constant_float(&mut ast, 2.0, Precision::High);
        let sum = binary(&mut ast, BinaryOp::Add, one, two, float_ty);
        let root = block(&mut ast, vec![sum]);

        let mut traversal = Traversal::new();
        traversal.traverse(&mut ReplaceConstants, &mut ast, root);
        assert_eq!(traversal.pending_edits(), 2);

        // Nothing changed yet
        assert_eq!(ast.children(sum), vec![one, two]);

        traversal.update_tree(&mut ast).unwrap();
        let children = ast.children(sum);
        assert_ne!(children[0], one);
        assert_ne!(children[1], two);
    }

    #[test]
    fn test_mismatched_replacement_is_rejected() {
        let mut ast = Ast::new();
        let float_ty = Type::scalar(BasicType::Float, Precision::High);
        let one = constant_float(&mut ast, 1.0, Precision::High);
        let two = constant_float(&mut ast, 2.0, Precision::High);
        let sum = binary(&mut ast, BinaryOp::Add, one, two, float_ty);
        let unrelated = constant_float(&mut ast, 3.0, Precision::High);

        let mut traversal = Traversal::new();
        traversal.traversing = true;
        traversal.queue_replacement_with_parent(sum, unrelated, one);
        traversal.traversing = false;
        let err = traversal.update_tree(&mut ast).unwrap_err();
        assert_eq!(err.code(), "E-PASS-001");
    }
}
