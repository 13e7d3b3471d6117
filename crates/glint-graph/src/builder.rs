//! Pass 1: function and call-edge discovery
//!
//! A single walk over the program collects one record per distinct mangled
//! function name and the list of user-defined functions each body calls.
//! Prototypes and definitions merge by name; a later definition fills in the
//! node of a record a prototype created first. Builtin calls never become
//! edges: they cannot participate in recursion and have no record.

use glint_ast::{Ast, CallTarget, NodeId, NodeKind};
use std::collections::{HashMap, HashSet};

/// A function as discovered in declaration order, before indexing
#[derive(Debug)]
pub(crate) struct ProtoRecord {
    pub name: String,
    /// The definition node; `None` for functions only ever declared
    pub node: Option<NodeId>,
    /// Callee names in first-call order, deduplicated
    pub callees: Vec<String>,
    seen: HashSet<String>,
}

impl ProtoRecord {
    fn new(name: String) -> Self {
        Self {
            name,
            node: None,
            callees: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn add_callee(&mut self, name: &str) {
        if self.seen.insert(name.to_string()) {
            self.callees.push(name.to_string());
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct CallGraph {
    pub records: Vec<ProtoRecord>,
    pub by_name: HashMap<String, usize>,
}

impl CallGraph {
    /// Discover all functions and call edges reachable from the root block
    pub fn build(ast: &Ast, root: NodeId) -> Self {
        let mut graph = CallGraph::default();

        let statements = match &ast.node(root).kind {
            NodeKind::Block { statements } => statements.clone(),
            _ => Vec::new(),
        };

        for statement in statements {
            match &ast.node(statement).kind {
                NodeKind::FunctionPrototype { name, .. } => {
                    let name = name.clone();
                    graph.ensure(&name);
                }
                NodeKind::FunctionDefinition { body, .. } => {
                    let name = ast
                        .definition_name(statement)
                        .expect("definition without prototype name")
                        .to_string();
                    let body = *body;
                    let index = graph.ensure(&name);
                    // Two definitions for one mangled name is a front-end
                    // bug, not an input error.
                    debug_assert!(graph.records[index].node.is_none());
                    graph.records[index].node = Some(statement);
                    graph.collect_calls(ast, body, index);
                }
                _ => {}
            }
        }

        graph
    }

    fn ensure(&mut self, name: &str) -> usize {
        if let Some(&index) = self.by_name.get(name) {
            return index;
        }
        let index = self.records.len();
        self.by_name.insert(name.to_string(), index);
        self.records.push(ProtoRecord::new(name.to_string()));
        index
    }

    fn collect_calls(&mut self, ast: &Ast, node: NodeId, caller: usize) {
        if let NodeKind::Call {
            target: CallTarget::Function(callee),
            ..
        } = &ast.node(node).kind
        {
            let callee = callee.clone();
            // Tolerate calls to functions only declared so far; the record
            // merges with the definition when it arrives.
            self.ensure(&callee);
            self.records[caller].add_callee(&callee);
        }
        for child in ast.children(node) {
            self.collect_calls(ast, child, caller);
        }
    }
}
