// Copyright 2025 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fs;
use std::path::PathBuf;

use graph::{
    global_graph, resolve_op, topological_sort, Graph, Node, ResolveEnv, Value,
};
use indexmap::IndexSet;

use crate::context::YapeContext;
use crate::targets::{parse_targets, RunResult, TargetShape, Targets};
use crate::{run_op, EngineError};

///
/// Whether the node has to execute: either it is marked always-run, or its
/// state is not up to date.
///
pub fn must_run(node: &Node) -> Result<bool, EngineError> {
    if node.always() {
        return Ok(true);
    }
    Ok(!state::get_state(node)?.is_up_to_date()?)
}

///
/// The per-node execution context handed to callables through the `Ctx`
/// sentinel.
///
pub struct NodeContext {
    node: Node,
}

impl NodeContext {
    pub fn new(node: Node) -> NodeContext {
        NodeContext { node }
    }

    ///
    /// The node's scratch directory, created on first request; None when the
    /// node's state has nowhere to put one.
    ///
    pub fn workdir(&self) -> Result<Option<PathBuf>, EngineError> {
        Ok(state::get_state(&self.node)?.workdir()?)
    }
}

// The resolver's view of a run: results come from the current namespace,
// resource values from the provider stack.
struct RunEnv {
    ctx: NodeContext,
}

impl ResolveEnv for RunEnv {
    fn node_result(&self, node: &Node) -> Result<Value, String> {
        state::get_state(node)
            .and_then(|s| s.get_result())
            .map_err(|e| e.to_string())
    }

    fn resource_value(&self, node: &Node) -> Result<Value, String> {
        let request = node
            .resource_request()
            .ok_or_else(|| format!("{node} is not a resource node"))?;
        let handle = state::get_state(node)
            .and_then(|s| s.get_result())
            .map_err(|e| e.to_string())?;
        let provider = resource::get_provider(&request).map_err(|e| e.to_string())?;
        provider.resolve(&handle).map_err(|e| e.to_string())
    }

    fn context_value(&self) -> Result<Value, String> {
        let workdir = self.ctx.workdir().map_err(|e| e.to_string())?;
        Ok(Value::Context(graph::ContextValue { workdir }))
    }
}

///
/// Drives topological execution of a graph against a set of targets.
///
pub struct Runner;

impl Runner {
    pub fn new() -> Runner {
        Runner
    }

    ///
    /// Runs every reachable node that needs it, in dependency order.
    ///
    /// * `targets` picks the nodes to produce and shapes the return value.
    /// * `graph` defaults to the process-wide global graph.
    /// * `context` is entered for the duration of the run unless a state
    ///   namespace is already active; when omitted, a default `YapeContext`
    ///   is used.
    /// * `force` re-runs target nodes even when they are up to date.
    /// * with `return_results` false, nothing is collected and `None` is
    ///   returned.
    ///
    pub fn run(
        &self,
        targets: &Targets,
        graph: Option<&Graph>,
        context: Option<&YapeContext>,
        force: bool,
        return_results: bool,
    ) -> Result<RunResult, EngineError> {
        let global;
        let graph = match graph {
            Some(g) => g,
            None => {
                global = global_graph();
                &global
            }
        };

        let shape = parse_targets(targets, graph)?;
        let target_nodes: IndexSet<Node> = shape.nodes();
        let target_list: Vec<Node> = target_nodes.iter().cloned().collect();
        let (order, mut dependant_counts) = topological_sort(&target_list)?;

        // Enter the supplied (or a default) context, unless the caller
        // already holds one.
        let default_context;
        let _guard = if state::current_namespace().is_some() {
            None
        } else {
            let context = match context {
                Some(context) => context,
                None => {
                    default_context = YapeContext::new();
                    &default_context
                }
            };
            Some(context.enter()?)
        };

        for node in &order {
            if !must_run(node)? && !(force && target_nodes.contains(node)) {
                continue;
            }
            log::debug!("running {node}");

            let env = RunEnv {
                ctx: NodeContext::new(node.clone()),
            };
            let resolved =
                resolve_op(&node.op(), &env, None).map_err(EngineError::Resolution)?;

            // Output paths may live in directories nothing has created yet.
            for path in node.pathouts() {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent).map_err(|e| {
                            EngineError::Execution(format!(
                                "failed to create {}: {e}",
                                parent.display()
                            ))
                        })?;
                    }
                }
            }

            let result = run_op(&resolved)?;
            state::get_state(node)?.set_result(result)?;

            // Hand back intermediate results as soon as the last dependant
            // has consumed them.
            for dep in node.dep_nodes() {
                if let Some(count) = dependant_counts.get_mut(&dep) {
                    *count -= 1;
                    if *count == 0 && !target_nodes.contains(&dep) {
                        state::get_state(&dep)?.release();
                    }
                }
            }
        }

        if !return_results {
            return Ok(RunResult::None);
        }
        let result_of = |node: &Node| -> Result<Value, EngineError> {
            Ok(state::get_state(node)?.get_result()?)
        };
        Ok(match &shape {
            TargetShape::Single(node) => RunResult::Single(result_of(node)?),
            TargetShape::Tuple(nodes) => RunResult::Tuple(
                nodes
                    .iter()
                    .map(result_of)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            TargetShape::Map(map) => RunResult::Map(
                map.iter()
                    .map(|(k, n)| Ok((k.clone(), result_of(n)?)))
                    .collect::<Result<indexmap::IndexMap<_, _>, EngineError>>()?,
            ),
        })
    }
}

impl Default for Runner {
    fn default() -> Runner {
        Runner::new()
    }
}

///
/// Runs `targets` against the global graph with a default context.
///
pub fn run(targets: &Targets) -> Result<RunResult, EngineError> {
    Runner::new().run(targets, None, None, false, true)
}
