//! Gradient and discontinuity metadata
//!
//! Computes, for every function and for the control flow inside it, whether
//! a gradient operation is in its call graph, which loops are discontinuous
//! (left by break/continue/return), and which functions end up called
//! inside such loops. Backends use the results to decide when a sampling
//! operation needs an explicit-LOD rewrite or a conditional needs
//! flattening.
//!
//! Gradient usage is a "pull" computation: a function uses a gradient if
//! its body does or if any callee does, so facts are filled in ascending
//! DAG index order (callees first) and each function's body is walked
//! exactly once. Being called in a discontinuous loop is the opposite, a
//! "push" from callers to callees, so that walk runs in descending order.

use glint_ast::{Ast, BranchKind, CallTarget, NodeId, NodeKind};
use glint_graph::CallDag;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Per-function analysis results, indexed like the call DAG
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FunctionMetadata {
    /// A gradient operation is in this function's call graph
    pub uses_gradient: bool,
    /// Control-flow nodes (ifs, loops) whose dynamic extent reaches a
    /// gradient operation, directly or through a call
    pub gradient_control_flow: HashSet<NodeId>,
    /// Loops in this body left early by break, continue or return
    pub discontinuous_loops: HashSet<NodeId>,
    /// Ifs whose extent reaches a discontinuous loop
    pub ifs_containing_discontinuous_loop: HashSet<NodeId>,
    /// A discontinuous loop is somewhere in this function's call graph
    pub has_discontinuous_loop_in_call_graph: bool,
    /// Some caller invokes this function from inside a discontinuous loop
    pub called_in_discontinuous_loop: bool,
    /// Needs a variant that samples at an explicit LOD: the function uses a
    /// gradient and runs inside a discontinuous loop
    pub needs_lod0: bool,
}

impl FunctionMetadata {
    pub fn has_gradient_in_control_flow(&self, node: NodeId) -> bool {
        self.gradient_control_flow.contains(&node)
    }

    pub fn has_discontinuous_loop(&self, node: NodeId) -> bool {
        self.ifs_containing_discontinuous_loop.contains(&node)
    }
}

/// Compute the full metadata array for a program. Pure and always
/// terminating: the DAG is acyclic and visited in index order.
pub fn compute_metadata(ast: &Ast, dag: &CallDag) -> Vec<FunctionMetadata> {
    let mut metadata = vec![FunctionMetadata::default(); dag.len()];

    // Ascending: every callee's gradient fact is ready before its callers.
    for index in 0..dag.len() {
        pull_gradient(ast, dag, &mut metadata, index);
    }

    // Ascending again for the loops left early and the ifs around them.
    for index in 0..dag.len() {
        pull_discontinuous_loops(ast, dag, &mut metadata, index);
    }

    // Descending: callers push "called in a discontinuous loop" down.
    for index in (0..dag.len()).rev() {
        push_discontinuous_loops(ast, dag, &mut metadata, index);
    }

    for facts in &mut metadata {
        facts.needs_lod0 = facts.called_in_discontinuous_loop && facts.uses_gradient;
    }

    metadata
}

fn on_gradient(current: &mut FunctionMetadata, control_flow: &[NodeId]) {
    current.uses_gradient = true;
    if let Some(&innermost) = control_flow.last() {
        current.gradient_control_flow.insert(innermost);
    }
}

fn pull_gradient(ast: &Ast, dag: &CallDag, metadata: &mut [FunctionMetadata], index: usize) {
    let Some(definition) = dag.record(index).node else {
        return;
    };
    let (ready, rest) = metadata.split_at_mut(index);
    let current = &mut rest[0];
    let mut control_flow = Vec::new();
    gradient_visit(ast, dag, ready, current, index, definition, &mut control_flow);
    debug_assert!(control_flow.is_empty());
}

fn gradient_visit(
    ast: &Ast,
    dag: &CallDag,
    ready: &[FunctionMetadata],
    current: &mut FunctionMetadata,
    index: usize,
    node: NodeId,
    control_flow: &mut Vec<NodeId>,
) {
    match &ast.node(node).kind {
        NodeKind::Unary { op, .. } if op.is_gradient() => on_gradient(current, control_flow),
        NodeKind::Call { target, .. } => match target {
            CallTarget::Builtin(op) if op.has_implicit_gradient() => {
                on_gradient(current, control_flow)
            }
            CallTarget::Function(callee) => {
                let callee = dag
                    .index_of(callee)
                    .expect("callee missing from the call DAG");
                debug_assert!(callee < index);
                if ready[callee].uses_gradient {
                    on_gradient(current, control_flow);
                }
            }
            _ => {}
        },
        _ => {}
    }

    let is_control_flow = ast.node(node).is_control_flow();
    if is_control_flow {
        control_flow.push(node);
    }
    for child in ast.children(node) {
        gradient_visit(ast, dag, ready, current, index, child, control_flow);
    }
    if is_control_flow {
        control_flow.pop();
        // A control flow using a gradient means the enclosing one does too
        if current.gradient_control_flow.contains(&node) {
            if let Some(&outer) = control_flow.last() {
                current.gradient_control_flow.insert(outer);
            }
        }
    }
}

/// What a `break` binds to
#[derive(Clone, Copy, PartialEq)]
enum Binder {
    Loop(NodeId),
    Switch,
}

fn on_discontinuous(current: &mut FunctionMetadata, ifs: &[NodeId]) {
    current.has_discontinuous_loop_in_call_graph = true;
    if let Some(&innermost) = ifs.last() {
        current.ifs_containing_discontinuous_loop.insert(innermost);
    }
}

fn pull_discontinuous_loops(
    ast: &Ast,
    dag: &CallDag,
    metadata: &mut [FunctionMetadata],
    index: usize,
) {
    let Some(definition) = dag.record(index).node else {
        return;
    };
    let (ready, rest) = metadata.split_at_mut(index);
    let current = &mut rest[0];
    let mut binders = Vec::new();
    let mut ifs = Vec::new();
    discontinuity_visit(
        ast, dag, ready, current, index, definition, &mut binders, &mut ifs,
    );
    debug_assert!(binders.is_empty() && ifs.is_empty());
}

#[allow(clippy::too_many_arguments)]
fn discontinuity_visit(
    ast: &Ast,
    dag: &CallDag,
    ready: &[FunctionMetadata],
    current: &mut FunctionMetadata,
    index: usize,
    node: NodeId,
    binders: &mut Vec<Binder>,
    ifs: &mut Vec<NodeId>,
) {
    match &ast.node(node).kind {
        NodeKind::Branch { kind, .. } => match kind {
            BranchKind::Break => match binders.last() {
                Some(Binder::Loop(target)) => {
                    current.discontinuous_loops.insert(*target);
                    on_discontinuous(current, ifs);
                }
                // A break inside a switch leaves the switch, not a loop
                Some(Binder::Switch) | None => {}
            },
            BranchKind::Continue => {
                let target = binders.iter().rev().find_map(|binder| match binder {
                    Binder::Loop(target) => Some(*target),
                    Binder::Switch => None,
                });
                if let Some(target) = target {
                    current.discontinuous_loops.insert(target);
                    on_discontinuous(current, ifs);
                }
            }
            BranchKind::Return => {
                // A return jumps out of every enclosing loop
                let loops: Vec<NodeId> = binders
                    .iter()
                    .filter_map(|binder| match binder {
                        Binder::Loop(target) => Some(*target),
                        Binder::Switch => None,
                    })
                    .collect();
                if !loops.is_empty() {
                    current.discontinuous_loops.extend(loops);
                    on_discontinuous(current, ifs);
                }
            }
            BranchKind::Discard => {}
        },
        NodeKind::Call {
            target: CallTarget::Function(callee),
            ..
        } => {
            let callee = dag
                .index_of(callee)
                .expect("callee missing from the call DAG");
            debug_assert!(callee < index);
            if ready[callee].has_discontinuous_loop_in_call_graph {
                on_discontinuous(current, ifs);
            }
        }
        _ => {}
    }

    let frame = match &ast.node(node).kind {
        NodeKind::Loop { .. } => {
            binders.push(Binder::Loop(node));
            Some(false)
        }
        NodeKind::Switch { .. } => {
            binders.push(Binder::Switch);
            Some(false)
        }
        NodeKind::If { .. } => {
            ifs.push(node);
            Some(true)
        }
        _ => None,
    };

    for child in ast.children(node) {
        discontinuity_visit(ast, dag, ready, current, index, child, binders, ifs);
    }

    match frame {
        Some(true) => {
            ifs.pop();
            // An if around a discontinuous loop taints the ifs around it
            if current.ifs_containing_discontinuous_loop.contains(&node) {
                if let Some(&outer) = ifs.last() {
                    current.ifs_containing_discontinuous_loop.insert(outer);
                }
            }
        }
        Some(false) => {
            binders.pop();
        }
        None => {}
    }
}

fn push_discontinuous_loops(
    ast: &Ast,
    dag: &CallDag,
    metadata: &mut [FunctionMetadata],
    index: usize,
) {
    let Some(definition) = dag.record(index).node else {
        return;
    };
    let (callees, rest) = metadata.split_at_mut(index);
    let current = &rest[0];
    let mut nesting = u32::from(current.called_in_discontinuous_loop);
    push_visit(ast, dag, callees, current, index, definition, &mut nesting);
    debug_assert_eq!(nesting, u32::from(current.called_in_discontinuous_loop));
}

fn push_visit(
    ast: &Ast,
    dag: &CallDag,
    callees: &mut [FunctionMetadata],
    current: &FunctionMetadata,
    index: usize,
    node: NodeId,
    nesting: &mut u32,
) {
    if let NodeKind::Call {
        target: CallTarget::Function(callee),
        ..
    } = &ast.node(node).kind
    {
        if *nesting > 0 {
            let callee = dag
                .index_of(callee)
                .expect("callee missing from the call DAG");
            debug_assert!(callee < index);
            callees[callee].called_in_discontinuous_loop = true;
        }
    }

    let discontinuous = matches!(ast.node(node).kind, NodeKind::Loop { .. })
        && current.discontinuous_loops.contains(&node);
    if discontinuous {
        *nesting += 1;
    }
    for child in ast.children(node) {
        push_visit(ast, dag, callees, current, index, child, nesting);
    }
    if discontinuous {
        *nesting -= 1;
    }
}
