//! The Call DAG artifact
//!
//! Built once per compile from the program root; effectively immutable
//! afterwards. Records are stored in topological order (`records[i]` has
//! index `i`), so iterating in order visits callees before callers.
//! Rebuild the DAG (don't patch it) whenever a rewrite pass changes the set
//! of functions: structural changes invalidate both the indices and the
//! name table.

use crate::builder::CallGraph;
use crate::error::GraphError;
use crate::indexer::assign_indices;
use glint_ast::{Ast, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One function of the program, in topological position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    /// Mangled name, unique per overload
    pub name: String,
    /// The function definition node; `None` for declared-only functions
    pub node: Option<NodeId>,
    /// Indices of the user-defined functions this body calls, deduplicated,
    /// in first-call order. Every entry is smaller than this record's index.
    pub callees: Vec<usize>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CallDag {
    records: Vec<FunctionRecord>,
    name_to_index: HashMap<String, usize>,
}

impl CallDag {
    /// Build the DAG for the program rooted at `root`.
    ///
    /// Fails if the call graph contains a cycle; no partial DAG escapes.
    pub fn build(ast: &Ast, root: NodeId) -> Result<CallDag, GraphError> {
        let graph = CallGraph::build(ast, root);
        let indices = assign_indices(&graph)?;

        let mut records = vec![
            FunctionRecord {
                name: String::new(),
                node: None,
                callees: Vec::new(),
            };
            graph.records.len()
        ];
        let mut name_to_index = HashMap::with_capacity(graph.records.len());

        for (proto, record) in graph.records.iter().enumerate() {
            let index = indices[proto];
            let callees = record
                .callees
                .iter()
                .map(|name| indices[graph.by_name[name]])
                .collect::<Vec<_>>();
            debug_assert!(callees.iter().all(|&callee| callee < index));
            records[index] = FunctionRecord {
                name: record.name.clone(),
                node: record.node,
                callees,
            };
            name_to_index.insert(record.name.clone(), index);
        }

        Ok(CallDag {
            records,
            name_to_index,
        })
    }

    /// Topological index of a mangled name. `None` is a normal result:
    /// the same lookup is used for builtin names that have no record.
    pub fn index_of(&self, mangled: &str) -> Option<usize> {
        self.name_to_index.get(mangled).copied()
    }

    /// The record at a topological index. Indices come from [`Self::index_of`]
    /// or iteration, so an out-of-range index is a compiler bug and panics.
    pub fn record(&self, index: usize) -> &FunctionRecord {
        &self.records[index]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionRecord> {
        self.records.iter()
    }

    /// Reset to empty before a rebuild
    pub fn clear(&mut self) {
        self.records.clear();
        self.name_to_index.clear();
    }
}
