// Copyright 2025 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use graph::{Graph, Node, Value};
use indexmap::{IndexMap, IndexSet};

use crate::EngineError;

///
/// What the user asked the runner to produce: everything, one node (by handle
/// or by slash-separated name), a sequence, a labelled map, or a predicate
/// over nodes. The shape is preserved and determines the shape of the run's
/// return value.
///
#[derive(Clone)]
pub enum Targets {
    All,
    Node(Node),
    Name(String),
    Seq(Vec<TargetRef>),
    Map(IndexMap<String, TargetRef>),
    Filter(Arc<dyn Fn(&Node) -> bool + Send + Sync>),
}

#[derive(Clone)]
pub enum TargetRef {
    Node(Node),
    Name(String),
}

impl Targets {
    pub fn filter<F>(f: F) -> Targets
    where
        F: Fn(&Node) -> bool + Send + Sync + 'static,
    {
        Targets::Filter(Arc::new(f))
    }

    pub fn names<I, S>(names: I) -> Targets
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Targets::Seq(
            names
                .into_iter()
                .map(|n| TargetRef::Name(n.into()))
                .collect(),
        )
    }
}

impl From<&Node> for Targets {
    fn from(n: &Node) -> Targets {
        Targets::Node(n.clone())
    }
}

impl From<&str> for Targets {
    fn from(name: &str) -> Targets {
        Targets::Name(name.to_owned())
    }
}

impl From<&Node> for TargetRef {
    fn from(n: &Node) -> TargetRef {
        TargetRef::Node(n.clone())
    }
}

impl From<&str> for TargetRef {
    fn from(name: &str) -> TargetRef {
        TargetRef::Name(name.to_owned())
    }
}

///
/// The run's return value, shaped like the targets that requested it.
///
#[derive(Clone, Debug, PartialEq)]
pub enum RunResult {
    None,
    Single(Value),
    Tuple(Vec<Value>),
    Map(IndexMap<String, Value>),
}

///
/// The resolved targets: the deduplicated node set driving the sort, plus the
/// shape used to assemble the return value.
///
pub(crate) enum TargetShape {
    Single(Node),
    Tuple(Vec<Node>),
    Map(IndexMap<String, Node>),
}

impl TargetShape {
    pub(crate) fn nodes(&self) -> IndexSet<Node> {
        match self {
            TargetShape::Single(node) => [node.clone()].into_iter().collect(),
            TargetShape::Tuple(nodes) => nodes.iter().cloned().collect(),
            TargetShape::Map(map) => map.values().cloned().collect(),
        }
    }
}

fn resolve_ref(r: &TargetRef, graph: &Graph) -> Result<Node, EngineError> {
    match r {
        TargetRef::Node(node) => Ok(node.clone()),
        TargetRef::Name(name) => graph.node(name).map_err(EngineError::Graph),
    }
}

pub(crate) fn parse_targets(targets: &Targets, graph: &Graph) -> Result<TargetShape, EngineError> {
    Ok(match targets {
        Targets::All => TargetShape::Tuple(graph.recurse_nodes(None)),
        Targets::Node(node) => TargetShape::Single(node.clone()),
        Targets::Name(name) => TargetShape::Single(graph.node(name)?),
        Targets::Seq(refs) => TargetShape::Tuple(
            refs.iter()
                .map(|r| resolve_ref(r, graph))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Targets::Map(refs) => TargetShape::Map(
            refs.iter()
                .map(|(k, r)| Ok((k.clone(), resolve_ref(r, graph)?)))
                .collect::<Result<IndexMap<_, _>, EngineError>>()?,
        ),
        Targets::Filter(pred) => {
            TargetShape::Tuple(graph.recurse_nodes(Some(&|n: &Node| pred(n))))
        }
    })
}
