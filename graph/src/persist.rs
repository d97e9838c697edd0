// Copyright 2024 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Saving and loading graphs. The on-disk form is a flat node/graph table with
//! sharing-preserving argument encoding: an aliased container is written once
//! and referenced afterwards, so a loaded graph walks to the same event stream
//! as the one that was saved.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use fnv::FnvHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::func::{is_registered, Func, FuncSpec};
use crate::node::{Graph, Node};
use crate::nodeop::{NodeOp, OpArg, ResourceRequest};
use crate::value::Value;
use crate::walk::{identity, IdKey};
use crate::GraphError;

#[derive(Serialize, Deserialize)]
struct SavedFile {
    // graphs[0] is the saved root; child indexes point into the same table.
    graphs: Vec<SavedGraph>,
    nodes: Vec<SavedNode>,
}

#[derive(Serialize, Deserialize)]
struct SavedGraph {
    name: Option<String>,
    nodes: Vec<usize>,
    graphs: Vec<usize>,
}

#[derive(Serialize, Deserialize)]
struct SavedNode {
    op: SavedOp,
    name: Option<String>,
    has_explicit_name: bool,
    always: bool,
    pathins: Vec<PathBuf>,
    pathouts: Vec<PathBuf>,
    producers: Vec<usize>,
}

#[derive(Serialize, Deserialize)]
enum SavedOp {
    Data {
        payload: Value,
        id: Option<String>,
    },
    Value(SavedArg),
    GetItem {
        obj: SavedArg,
        key: SavedArg,
    },
    GetAttr {
        obj: SavedArg,
        name: String,
    },
    Call {
        func: SavedArg,
        args: Vec<SavedArg>,
        kwargs: IndexMap<String, SavedArg>,
    },
    Resource {
        request: ResourceRequest,
    },
}

#[derive(Serialize, Deserialize)]
enum SavedArg {
    Value(Value),
    Node(usize),
    PathIn(PathBuf),
    PathOut(PathBuf),
    ResourceIn(usize),
    ResourceOut(usize),
    Ctx,
    Unset,
    Func(FuncSpec),
    List { id: u32, items: Vec<SavedArg> },
    Tuple { id: u32, items: Vec<SavedArg> },
    Dict {
        id: u32,
        entries: IndexMap<String, SavedArg>,
    },
    // A repeat occurrence of a container written earlier under this id.
    SharedRef(u32),
}

impl Graph {
    ///
    /// Persists this graph (and its subgraphs) to `path`. Functions travel by
    /// name: a warning is logged for every function that is not in the
    /// process registry, since the loaded graph can only run once its
    /// functions are registered.
    ///
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), GraphError> {
        let saved = Saver::default().run(self)?;
        let file = File::create(path.as_ref())
            .map_err(|e| GraphError::Io(format!("failed to create graph file: {e}")))?;
        bincode::serialize_into(BufWriter::new(file), &saved)
            .map_err(|e| GraphError::Io(format!("failed to write graph file: {e}")))?;
        Ok(())
    }

    ///
    /// Loads a graph saved by `save`. The result is a new root graph,
    /// detached from any build scope.
    ///
    pub fn load(path: impl AsRef<Path>) -> Result<Graph, GraphError> {
        let file = File::open(path.as_ref())
            .map_err(|e| GraphError::Io(format!("failed to open graph file: {e}")))?;
        let saved: SavedFile = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| GraphError::Io(format!("failed to read graph file: {e}")))?;
        Loader::run(saved)
    }
}

#[derive(Default)]
struct Saver {
    node_index: FnvHashMap<Node, usize>,
    shared: FnvHashMap<IdKey, u32>,
    next_shared: u32,
    warned: HashSet<String>,
}

impl Saver {
    fn run(mut self, root: &Graph) -> Result<SavedFile, GraphError> {
        // First pass: flatten the graph tree and index every member node.
        let mut node_handles: Vec<Node> = Vec::new();
        let mut graphs: Vec<SavedGraph> = Vec::new();
        Self::flatten(root, &mut node_handles, &mut graphs);
        for (i, node) in node_handles.iter().enumerate() {
            self.node_index.insert(node.clone(), i);
        }

        // Second pass: encode operators against the node index.
        let mut nodes = Vec::with_capacity(node_handles.len());
        for node in &node_handles {
            let producers = node
                .producers()
                .iter()
                .map(|p| self.index_of(p))
                .collect::<Result<Vec<_>, _>>()?;
            nodes.push(SavedNode {
                op: self.encode_op(&node.op())?,
                name: node.name(),
                has_explicit_name: node.has_explicit_name(),
                always: node.always(),
                pathins: node.pathins().to_vec(),
                pathouts: node.pathouts().to_vec(),
                producers,
            });
        }

        Ok(SavedFile { graphs, nodes })
    }

    fn flatten(graph: &Graph, node_handles: &mut Vec<Node>, out: &mut Vec<SavedGraph>) {
        let index = out.len();
        out.push(SavedGraph {
            name: graph.name(),
            nodes: Vec::new(),
            graphs: Vec::new(),
        });

        let mut node_indexes = Vec::new();
        for node in graph.nodes() {
            node_indexes.push(node_handles.len());
            node_handles.push(node);
        }
        out[index].nodes = node_indexes;

        let mut graph_indexes = Vec::new();
        for subgraph in graph.subgraphs() {
            graph_indexes.push(out.len());
            Self::flatten(&subgraph, node_handles, out);
        }
        out[index].graphs = graph_indexes;
    }

    fn index_of(&self, node: &Node) -> Result<usize, GraphError> {
        self.node_index.get(node).copied().ok_or_else(|| {
            GraphError::Io(format!(
                "node {node} is referenced from the saved graph but is not a member of it"
            ))
        })
    }

    fn encode_op(&mut self, op: &NodeOp) -> Result<SavedOp, GraphError> {
        Ok(match op {
            NodeOp::Data { payload, id } => SavedOp::Data {
                payload: payload.clone(),
                id: id.clone(),
            },
            NodeOp::Value(v) => SavedOp::Value(self.encode_arg(v)?),
            NodeOp::GetItem { obj, key } => SavedOp::GetItem {
                obj: self.encode_arg(obj)?,
                key: self.encode_arg(key)?,
            },
            NodeOp::GetAttr { obj, name } => SavedOp::GetAttr {
                obj: self.encode_arg(obj)?,
                name: name.clone(),
            },
            NodeOp::Call { func, args, kwargs } => SavedOp::Call {
                func: self.encode_arg(func)?,
                args: args
                    .iter()
                    .map(|a| self.encode_arg(a))
                    .collect::<Result<Vec<_>, _>>()?,
                kwargs: kwargs
                    .iter()
                    .map(|(k, a)| Ok((k.clone(), self.encode_arg(a)?)))
                    .collect::<Result<IndexMap<_, _>, GraphError>>()?,
            },
            NodeOp::Resource { request } => SavedOp::Resource {
                request: request.clone(),
            },
        })
    }

    fn encode_arg(&mut self, arg: &OpArg) -> Result<SavedArg, GraphError> {
        if let Some(key) = identity(arg) {
            if !matches!(arg, OpArg::Node(_)) {
                if let Some(&id) = self.shared.get(&key) {
                    return Ok(SavedArg::SharedRef(id));
                }
            }
        }

        Ok(match arg {
            OpArg::Value(v) => SavedArg::Value(v.clone()),
            OpArg::Node(n) => SavedArg::Node(self.index_of(n)?),
            OpArg::PathIn(p) => SavedArg::PathIn(p.clone()),
            OpArg::PathOut(p) => SavedArg::PathOut(p.clone()),
            OpArg::ResourceIn(n) => SavedArg::ResourceIn(self.index_of(n)?),
            OpArg::ResourceOut(n) => SavedArg::ResourceOut(self.index_of(n)?),
            OpArg::Ctx => SavedArg::Ctx,
            OpArg::Unset => SavedArg::Unset,
            OpArg::Func(f) => {
                self.warn_unregistered(f);
                SavedArg::Func(f.spec())
            }
            OpArg::List(items) => {
                let id = self.record_shared(arg);
                SavedArg::List {
                    id,
                    items: items
                        .iter()
                        .map(|a| self.encode_arg(a))
                        .collect::<Result<Vec<_>, _>>()?,
                }
            }
            OpArg::Tuple(items) => {
                let id = self.record_shared(arg);
                SavedArg::Tuple {
                    id,
                    items: items
                        .iter()
                        .map(|a| self.encode_arg(a))
                        .collect::<Result<Vec<_>, _>>()?,
                }
            }
            OpArg::Dict(entries) => {
                let id = self.record_shared(arg);
                SavedArg::Dict {
                    id,
                    entries: entries
                        .iter()
                        .map(|(k, a)| Ok((k.clone(), self.encode_arg(a)?)))
                        .collect::<Result<IndexMap<_, _>, GraphError>>()?,
                }
            }
        })
    }

    fn record_shared(&mut self, arg: &OpArg) -> u32 {
        let id = self.next_shared;
        self.next_shared += 1;
        if let Some(key) = identity(arg) {
            self.shared.insert(key, id);
        }
        id
    }

    fn warn_unregistered(&mut self, func: &Func) {
        if !is_registered(func.name()) && self.warned.insert(func.name().to_owned()) {
            log::warn!(
                "function {:?} is not registered; the saved graph can only run in a \
                 process that registers it under that name",
                func.name()
            );
        }
    }
}

struct Loader;

impl Loader {
    fn run(saved: SavedFile) -> Result<Graph, GraphError> {
        if saved.graphs.is_empty() {
            return Err(GraphError::Io("graph file contains no graphs".to_owned()));
        }

        // Rebuild the graph tree.
        let mut graphs: Vec<Option<Graph>> = vec![None; saved.graphs.len()];
        let root = Graph::detached();
        root.set_name_raw(saved.graphs[0].name.clone());
        graphs[0] = Some(root.clone());
        Self::build_subgraphs(&saved, 0, &root, &mut graphs)?;

        // Node shells first, so that operators can reference any node
        // regardless of declaration order.
        let mut nodes: Vec<Node> = Vec::with_capacity(saved.nodes.len());
        for (graph_index, saved_graph) in saved.graphs.iter().enumerate() {
            let graph = graphs[graph_index].as_ref().expect("built above").clone();
            for &node_index in &saved_graph.nodes {
                if node_index != nodes.len() {
                    return Err(GraphError::Io("graph file node table is out of order".to_owned()));
                }
                let sn = &saved.nodes[node_index];
                let node = Node::shell(
                    NodeOp::Value(OpArg::Unset),
                    sn.name.clone(),
                    sn.has_explicit_name,
                    sn.always,
                    sn.pathins.clone(),
                    sn.pathouts.clone(),
                    Some(&graph),
                );
                graph.adopt_node(&node);
                nodes.push(node);
            }
        }
        if nodes.len() != saved.nodes.len() {
            return Err(GraphError::Io(
                "graph file nodes are not all members of a graph".to_owned(),
            ));
        }

        // Second pass: real operators and producer links. The shared table
        // spans all nodes: a container aliased across two operators decodes
        // to one allocation, as it was when saved.
        let mut shared: FnvHashMap<u32, OpArg> = FnvHashMap::default();
        for (index, sn) in saved.nodes.iter().enumerate() {
            nodes[index].set_op_raw(Self::decode_op(&sn.op, &nodes, &mut shared)?);
            for &producer in &sn.producers {
                let producer = nodes
                    .get(producer)
                    .ok_or_else(|| GraphError::Io("producer index out of range".to_owned()))?;
                nodes[index].add_producer(producer);
            }
        }

        Ok(root)
    }

    fn build_subgraphs(
        saved: &SavedFile,
        index: usize,
        graph: &Graph,
        graphs: &mut Vec<Option<Graph>>,
    ) -> Result<(), GraphError> {
        for &child_index in &saved.graphs[index].graphs {
            let child_saved = saved
                .graphs
                .get(child_index)
                .ok_or_else(|| GraphError::Io("graph index out of range".to_owned()))?;
            let child = Graph::new_in(graph, child_saved.name.clone())?;
            graphs[child_index] = Some(child.clone());
            Self::build_subgraphs(saved, child_index, &child, graphs)?;
        }
        Ok(())
    }

    fn decode_op(
        op: &SavedOp,
        nodes: &[Node],
        shared: &mut FnvHashMap<u32, OpArg>,
    ) -> Result<NodeOp, GraphError> {
        Ok(match op {
            SavedOp::Data { payload, id } => NodeOp::Data {
                payload: payload.clone(),
                id: id.clone(),
            },
            SavedOp::Value(v) => NodeOp::Value(Self::decode_arg(v, nodes, shared)?),
            SavedOp::GetItem { obj, key } => NodeOp::GetItem {
                obj: Self::decode_arg(obj, nodes, shared)?,
                key: Self::decode_arg(key, nodes, shared)?,
            },
            SavedOp::GetAttr { obj, name } => NodeOp::GetAttr {
                obj: Self::decode_arg(obj, nodes, shared)?,
                name: name.clone(),
            },
            SavedOp::Call { func, args, kwargs } => NodeOp::Call {
                func: Self::decode_arg(func, nodes, shared)?,
                args: args
                    .iter()
                    .map(|a| Self::decode_arg(a, nodes, shared))
                    .collect::<Result<Vec<_>, _>>()?,
                kwargs: kwargs
                    .iter()
                    .map(|(k, a)| Ok((k.clone(), Self::decode_arg(a, nodes, shared)?)))
                    .collect::<Result<IndexMap<_, _>, GraphError>>()?,
            },
            SavedOp::Resource { request } => NodeOp::Resource {
                request: request.clone(),
            },
        })
    }

    fn decode_arg(
        arg: &SavedArg,
        nodes: &[Node],
        shared: &mut FnvHashMap<u32, OpArg>,
    ) -> Result<OpArg, GraphError> {
        let node_at = |i: usize| -> Result<Node, GraphError> {
            nodes
                .get(i)
                .cloned()
                .ok_or_else(|| GraphError::Io("node index out of range".to_owned()))
        };

        Ok(match arg {
            SavedArg::Value(v) => OpArg::Value(v.clone()),
            SavedArg::Node(i) => OpArg::Node(node_at(*i)?),
            SavedArg::PathIn(p) => OpArg::PathIn(p.clone()),
            SavedArg::PathOut(p) => OpArg::PathOut(p.clone()),
            SavedArg::ResourceIn(i) => OpArg::ResourceIn(node_at(*i)?),
            SavedArg::ResourceOut(i) => OpArg::ResourceOut(node_at(*i)?),
            SavedArg::Ctx => OpArg::Ctx,
            SavedArg::Unset => OpArg::Unset,
            SavedArg::Func(spec) => {
                // Rebinds through the registry at call time; the fingerprint
                // rides along so descriptors stay equal across save/load.
                let func = match &spec.fingerprint {
                    Some(fingerprint) => Func::named(&spec.name).fingerprinted(fingerprint.clone()),
                    None => Func::named(&spec.name),
                };
                OpArg::Func(func)
            }
            SavedArg::List { id, items } => {
                let decoded = OpArg::list(
                    items
                        .iter()
                        .map(|a| Self::decode_arg(a, nodes, shared))
                        .collect::<Result<Vec<_>, _>>()?,
                );
                shared.insert(*id, decoded.clone());
                decoded
            }
            SavedArg::Tuple { id, items } => {
                let decoded = OpArg::tuple(
                    items
                        .iter()
                        .map(|a| Self::decode_arg(a, nodes, shared))
                        .collect::<Result<Vec<_>, _>>()?,
                );
                shared.insert(*id, decoded.clone());
                decoded
            }
            SavedArg::Dict { id, entries } => {
                let decoded = OpArg::dict(
                    entries
                        .iter()
                        .map(|(k, a)| Ok((k.clone(), Self::decode_arg(a, nodes, shared)?)))
                        .collect::<Result<IndexMap<_, _>, GraphError>>()?,
                );
                shared.insert(*id, decoded.clone());
                decoded
            }
            SavedArg::SharedRef(id) => shared
                .get(id)
                .cloned()
                .ok_or_else(|| GraphError::Io("dangling shared container reference".to_owned()))?,
        })
    }
}
