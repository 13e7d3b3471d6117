//! Pass 2: topological index assignment with cycle detection
//!
//! Depth-first post-order over the discovered records: a record's callees
//! are indexed before the record itself, so every edge satisfies
//! `index(callee) < index(caller)`. Records are visited in declaration
//! order, which makes the indices of independent functions deterministic.
//!
//! Re-entering a record that is still in progress means the shader
//! recurses; the whole construction is abandoned and the offending chain
//! reported.

use crate::builder::CallGraph;
use crate::error::GraphError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    NotVisited,
    InProgress,
    Completed,
}

/// Map each builder record to its topological index
pub(crate) fn assign_indices(graph: &CallGraph) -> Result<Vec<usize>, GraphError> {
    let mut state = vec![VisitState::NotVisited; graph.records.len()];
    let mut indices = vec![usize::MAX; graph.records.len()];
    let mut path: Vec<usize> = Vec::new();
    let mut next_index = 0usize;

    for record in 0..graph.records.len() {
        if state[record] == VisitState::NotVisited {
            visit(
                graph,
                record,
                &mut state,
                &mut indices,
                &mut path,
                &mut next_index,
            )?;
        }
    }

    debug_assert_eq!(next_index, graph.records.len());
    Ok(indices)
}

fn visit(
    graph: &CallGraph,
    record: usize,
    state: &mut [VisitState],
    indices: &mut [usize],
    path: &mut Vec<usize>,
    next_index: &mut usize,
) -> Result<(), GraphError> {
    state[record] = VisitState::InProgress;
    path.push(record);

    for callee_name in &graph.records[record].callees {
        let callee = graph.by_name[callee_name];
        match state[callee] {
            VisitState::InProgress => {
                // Cycle: everything on the path from the callee's first
                // occurrence onwards is part of it.
                let start = path
                    .iter()
                    .position(|&id| id == callee)
                    .expect("in-progress record missing from path");
                let mut chain: Vec<String> = path[start..]
                    .iter()
                    .map(|&id| graph.records[id].name.clone())
                    .collect();
                chain.push(graph.records[callee].name.clone());
                return Err(GraphError::RecursiveCallChain { chain });
            }
            VisitState::NotVisited => {
                visit(graph, callee, state, indices, path, next_index)?;
            }
            VisitState::Completed => {}
        }
    }

    path.pop();
    state[record] = VisitState::Completed;
    indices[record] = *next_index;
    *next_index += 1;
    Ok(())
}
