// Copyright 2024 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use fnv::{FnvHashMap, FnvHashSet};

use crate::node::Node;
use crate::GraphError;

///
/// How many dependants were observed for each node during the sort. The runner
/// uses this to release an intermediate result once its last dependant has
/// consumed it.
///
pub type DependantCounts = FnvHashMap<Node, usize>;

///
/// Orders every node reachable from `targets` so that all transitive
/// dependencies of a node precede it. Iterative DFS with an explicit work
/// stack; O(nodes + edges) time.
///
/// A dependency cycle fails with an error naming the nodes along the cycle in
/// path order.
///
pub fn topological_sort(targets: &[Node]) -> Result<(Vec<Node>, DependantCounts), GraphError> {
    let mut visited: FnvHashSet<Node> = FnvHashSet::default();
    let mut visiting: FnvHashSet<Node> = FnvHashSet::default();
    let mut sorted: Vec<Node> = Vec::new();
    let mut path: Vec<Node> = Vec::new();
    let mut dependant_counts: DependantCounts = FnvHashMap::default();

    // Each stack entry is a node plus, after the first visit, its remaining
    // unexplored dependencies.
    let mut stack: Vec<(Node, Option<Vec<Node>>)> =
        targets.iter().map(|n| (n.clone(), None)).collect();

    while let Some((node, state)) = stack.pop() {
        match state {
            None => {
                if visited.contains(&node) {
                    // This node and its dependencies are already in the order.
                    continue;
                }

                path.push(node.clone());

                if visiting.contains(&node) {
                    let cycle = path
                        .iter()
                        .rev()
                        .map(|n| match n.full_name() {
                            Ok(Some(name)) => name,
                            _ => format!("{n}"),
                        })
                        .collect();
                    return Err(GraphError::Cycle(cycle));
                }

                // dep_nodes folds duplicate edges, so each dependant counts a
                // given dependency exactly once.
                let deps = node.dep_nodes();
                for dep in &deps {
                    *dependant_counts.entry(dep.clone()).or_insert(0) += 1;
                }

                visiting.insert(node.clone());
                stack.push((node, Some(deps)));
            }
            Some(mut deps) => {
                if let Some(dep) = deps.pop() {
                    stack.push((node, Some(deps)));
                    stack.push((dep, None));
                } else {
                    // All dependencies are in the order; the node is ready.
                    visiting.remove(&node);
                    visited.insert(node.clone());
                    sorted.push(node);
                    path.pop();
                }
            }
        }
    }

    Ok((sorted, dependant_counts))
}
