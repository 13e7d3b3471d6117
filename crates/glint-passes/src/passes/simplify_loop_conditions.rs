//! Turns loop conditions and loop expressions into regular statements
//!
//! Downstream passes that hoist side-effecting expressions can only operate
//! on plain statements, not on expressions embedded in loop syntax. This
//! pass gives every matching loop an explicit boolean flag:
//!
//! ```glsl
//! while (expr) { body; }
//! // becomes
//! bool s0 = expr;
//! while (s0) { { body; } s0 = expr; }
//! ```
//!
//! `for` loops are rebuilt as a scoped `while`; `continue` (and, when a
//! loop expression exists, `break`) statements are prefixed with the
//! pending expression and flag recomputation so the flag is correct on the
//! next iteration. The fixups track loop and switch nesting explicitly so
//! they only touch branches that bind to the loop being transformed.

use crate::error::PassError;
use crate::passes::{PassResult, RewritePass};
use crate::pattern;
use crate::traverse::{AstVisitor, Traversal, Visit};
use glint_ast::{
    block, constant_bool, create_temp_variable, temp_assignment, temp_init_declaration,
    temp_symbol, Ast, BasicType, BranchKind, CompileContext, LoopKind, Node, NodeId, NodeKind,
    Precision, TempVariable, Type,
};

/// Branch-fixup state for one transformed loop
#[derive(Clone)]
struct Fixup {
    cond_var: TempVariable,
    condition: Option<NodeId>,
    expression: Option<NodeId>,
}

struct Frame {
    loop_depth: u32,
    switch_depth: u32,
    fixup: Option<Fixup>,
}

struct LoopConditionsVisitor<'a> {
    ctx: &'a mut CompileContext,
    mask: u32,
    frames: Vec<Frame>,
    modified: bool,
}

impl LoopConditionsVisitor<'_> {
    fn push_frame(&mut self, t: &Traversal, fixup: Option<Fixup>) {
        self.frames.push(Frame {
            loop_depth: t.loop_depth(),
            switch_depth: t.switch_depth(),
            fixup,
        });
    }
}

impl AstVisitor for LoopConditionsVisitor<'_> {
    fn visit_loop(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        if visit == Visit::Post {
            self.frames.pop();
            return true;
        }

        let NodeKind::Loop {
            kind,
            init,
            condition,
            expression,
            body,
        } = ast.node(node).kind.clone()
        else {
            unreachable!("loop hook on non-loop node");
        };

        let needs_change = [init, condition, expression]
            .into_iter()
            .flatten()
            .any(|header| pattern::matches(ast, header, self.mask));
        if !needs_change {
            self.push_frame(t, None);
            return true;
        }

        let bool_ty = Type::scalar(BasicType::Bool, Precision::Undefined);
        let cond_var = create_temp_variable(self.ctx, bool_ty);

        match kind {
            LoopKind::While | LoopKind::DoWhile => {
                let cond = condition.expect("while loop without a condition");

                // while: `bool s0 = expr;` / do-while: `bool s0 = true;`
                let flag_init = if kind == LoopKind::While {
                    ast.deep_copy(cond)
                } else {
                    constant_bool(ast, true)
                };
                let flag_decl = temp_init_declaration(ast, &cond_var, flag_init);
                t.insert_statements_in_parent_block(ast, vec![flag_decl], vec![]);

                // `{ { body; } s0 = expr; }`
                let recompute_src = ast.deep_copy(cond);
                let recompute = temp_assignment(ast, &cond_var, recompute_src);
                let new_body = block(ast, vec![body, recompute]);
                t.queue_replacement_with_parent(node, body, new_body);

                let flag = temp_symbol(ast, &cond_var);
                t.queue_replacement_with_parent(node, cond, flag);

                self.push_frame(
                    t,
                    Some(Fixup {
                        cond_var,
                        condition: Some(cond),
                        expression: None,
                    }),
                );
            }
            LoopKind::For => {
                // {
                //   init;
                //   bool s0 = expr;        (or true)
                //   while (s0) { { body; } exprB; s0 = expr; }
                // }
                let mut scope_statements = Vec::new();
                if let Some(init) = init {
                    scope_statements.push(init);
                }
                let flag_init = match condition {
                    Some(cond) => ast.deep_copy(cond),
                    None => constant_bool(ast, true),
                };
                scope_statements.push(temp_init_declaration(ast, &cond_var, flag_init));

                let mut while_statements = vec![body];
                if let Some(expression) = expression {
                    while_statements.push(expression);
                }
                if let Some(cond) = condition {
                    let recompute_src = ast.deep_copy(cond);
                    while_statements.push(temp_assignment(ast, &cond_var, recompute_src));
                }
                let while_body = block(ast, while_statements);
                let flag = temp_symbol(ast, &cond_var);
                let while_loop = ast.alloc(Node::new(
                    NodeKind::Loop {
                        kind: LoopKind::While,
                        init: None,
                        condition: Some(flag),
                        expression: None,
                        body: while_body,
                    },
                    Type::void(),
                ));
                scope_statements.push(while_loop);

                let scope = block(ast, scope_statements);
                t.queue_replacement(node, scope);

                self.push_frame(
                    t,
                    Some(Fixup {
                        cond_var,
                        condition,
                        expression,
                    }),
                );
            }
        }

        self.modified = true;
        // The old body stays in the tree inside the replacement, so
        // traversing it (and transforming loops nested in it) is safe.
        true
    }

    fn visit_branch(&mut self, t: &mut Traversal, ast: &mut Ast, node: NodeId, visit: Visit) -> bool {
        if visit != Visit::Pre {
            return true;
        }
        let NodeKind::Branch { kind, .. } = ast.node(node).kind else {
            unreachable!("branch hook on non-branch node");
        };
        if kind != BranchKind::Continue && kind != BranchKind::Break {
            return true;
        }

        let Some(frame) = self.frames.iter().rev().find(|frame| frame.fixup.is_some()) else {
            return true;
        };
        // Only fix up branches binding to the loop being transformed, not
        // to loops nested inside it.
        if frame.loop_depth != t.loop_depth() {
            return true;
        }
        let fixup = frame.fixup.clone().expect("frame filtered for fixups");

        if kind == BranchKind::Break {
            // A break inside a nested switch leaves the switch instead
            if t.switch_depth() != frame.switch_depth {
                return true;
            }
            // Without a pending loop expression a break needs no fixup
            if fixup.expression.is_none() {
                return true;
            }
        }

        let mut statements = Vec::new();
        if let Some(expression) = fixup.expression {
            statements.push(ast.deep_copy(expression));
        }
        if kind == BranchKind::Continue {
            if let Some(cond) = fixup.condition {
                let recompute_src = ast.deep_copy(cond);
                statements.push(temp_assignment(ast, &fixup.cond_var, recompute_src));
            }
        }
        if statements.is_empty() {
            return true;
        }
        statements.push(node);
        let wrapper = block(ast, statements);
        t.queue_replacement(node, wrapper);
        true
    }
}

/// Rewrite every loop whose header matches `mask` (see [`crate::pattern`])
pub fn simplify_loop_conditions(
    ast: &mut Ast,
    root: NodeId,
    ctx: &mut CompileContext,
    mask: u32,
) -> Result<PassResult, PassError> {
    let mut visitor = LoopConditionsVisitor {
        ctx,
        mask,
        frames: Vec::new(),
        modified: false,
    };
    let mut traversal = Traversal::new();
    traversal.traverse(&mut visitor, ast, root);
    let modified = visitor.modified;
    debug_assert!(visitor.frames.is_empty());
    traversal.update_tree(ast)?;
    Ok(PassResult {
        modified,
        functions_changed: false,
    })
}

#[derive(Debug)]
pub struct SimplifyLoopConditions {
    pub mask: u32,
}

impl Default for SimplifyLoopConditions {
    fn default() -> Self {
        Self {
            mask: pattern::HOIST_ALL,
        }
    }
}

impl RewritePass for SimplifyLoopConditions {
    fn name(&self) -> &'static str {
        "simplify-loop-conditions"
    }

    fn run(
        &mut self,
        ast: &mut Ast,
        root: NodeId,
        ctx: &mut CompileContext,
    ) -> Result<PassResult, PassError> {
        simplify_loop_conditions(ast, root, ctx, self.mask)
    }
}
