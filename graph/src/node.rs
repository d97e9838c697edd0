// Copyright 2024 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use fnv::FnvHashMap;
use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::func::Func;
use crate::nodeop::{NodeOp, OpArg, ResourceRequest};
use crate::walk::{walk, Event};
use crate::GraphError;

///
/// A deferred computation in the DAG. Cheap to clone; equality and hashing are
/// by identity, so a Node can key state maps and dependant counters.
///
#[derive(Clone)]
pub struct Node(Arc<NodeInner>);

struct NodeInner {
    op: Mutex<NodeOp>,
    name: Mutex<Option<String>>,
    has_explicit_name: bool,
    always: bool,
    // Sorted and deduplicated at construction; immutable afterwards.
    pathins: Vec<PathBuf>,
    pathouts: Vec<PathBuf>,
    parent: Weak<GraphInner>,
    // Nodes declaring to produce this resource via a ResourceOut wrapper.
    // Weak, because producers hold this node strongly through their arguments.
    producers: Mutex<Vec<Weak<NodeInner>>>,
}

impl Node {
    ///
    /// Pointer identity, used by the walk protocol's aliasing table.
    ///
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn op(&self) -> NodeOp {
        self.0.op.lock().clone()
    }

    pub fn is_resource(&self) -> bool {
        matches!(&*self.0.op.lock(), NodeOp::Resource { .. })
    }

    pub fn resource_request(&self) -> Option<ResourceRequest> {
        match &*self.0.op.lock() {
            NodeOp::Resource { request } => Some(request.clone()),
            _ => None,
        }
    }

    pub fn always(&self) -> bool {
        self.0.always
    }

    pub fn name(&self) -> Option<String> {
        self.0.name.lock().clone()
    }

    pub fn has_explicit_name(&self) -> bool {
        self.0.has_explicit_name
    }

    pub fn pathins(&self) -> &[PathBuf] {
        &self.0.pathins
    }

    pub fn pathouts(&self) -> &[PathBuf] {
        &self.0.pathouts
    }

    pub fn parent(&self) -> Option<Graph> {
        self.0.parent.upgrade().map(Graph)
    }

    pub fn producers(&self) -> Vec<Node> {
        self.0
            .producers
            .lock()
            .iter()
            .filter_map(|w| w.upgrade().map(Node))
            .collect()
    }

    ///
    /// A bare node with its metadata supplied directly, used when loading a
    /// saved graph: validation and registration already happened when the
    /// graph was first built.
    ///
    pub(crate) fn shell(
        op: NodeOp,
        name: Option<String>,
        has_explicit_name: bool,
        always: bool,
        pathins: Vec<PathBuf>,
        pathouts: Vec<PathBuf>,
        parent: Option<&Graph>,
    ) -> Node {
        Node(Arc::new(NodeInner {
            op: Mutex::new(op),
            name: Mutex::new(name),
            has_explicit_name,
            always,
            pathins,
            pathouts,
            parent: parent.map(|g| Arc::downgrade(&g.0)).unwrap_or_default(),
            producers: Mutex::new(Vec::new()),
        }))
    }

    pub(crate) fn set_op_raw(&self, op: NodeOp) {
        *self.0.op.lock() = op;
    }

    pub(crate) fn add_producer(&self, producer: &Node) {
        let mut producers = self.0.producers.lock();
        if !producers
            .iter()
            .any(|w| w.as_ptr() as usize == producer.id())
        {
            producers.push(Arc::downgrade(&producer.0));
        }
    }

    ///
    /// Replaces the cell of a Value operator. Setting values on any other
    /// operator kind is an error.
    ///
    pub fn set_value(&self, value: impl Into<OpArg>) -> Result<(), GraphError> {
        let mut op = self.0.op.lock();
        match &*op {
            NodeOp::Value(_) => {
                *op = NodeOp::Value(value.into());
                Ok(())
            }
            _ => Err(GraphError::NotAValueOp),
        }
    }

    pub fn unset_value(&self) -> Result<(), GraphError> {
        self.set_value(OpArg::Unset)
    }

    ///
    /// A new node deferring `self[key]`.
    ///
    pub fn item(&self, key: impl Into<OpArg>) -> Result<Node, GraphError> {
        NodeBuilder::new(NodeOp::GetItem {
            obj: OpArg::Node(self.clone()),
            key: key.into(),
        })
        .build()
    }

    ///
    /// A new node deferring field access on this node's result. Names starting
    /// with an underscore are reserved.
    ///
    pub fn attr(&self, name: &str) -> Result<Node, GraphError> {
        if name.starts_with('_') {
            return Err(GraphError::ReservedAttr(name.to_owned()));
        }
        NodeBuilder::new(NodeOp::GetAttr {
            obj: OpArg::Node(self.clone()),
            name: name.to_owned(),
        })
        .build()
    }

    ///
    /// The slash-joined path from the root graph to this node, or None for
    /// unnamed (detached) nodes.
    ///
    pub fn full_name(&self) -> Result<Option<String>, GraphError> {
        let name = match self.name() {
            Some(name) => name,
            None => return Ok(None),
        };

        let mut segments = vec![name];
        if let Some(parent) = self.parent() {
            let root = parent.root();
            let mut g = parent;
            while g != root {
                match g.name() {
                    Some(name) => segments.push(name),
                    None => return Err(GraphError::UnnamedAncestor),
                }
                g = g.parent().ok_or(GraphError::UnnamedAncestor)?;
            }
        }
        segments.reverse();
        Ok(Some(segments.join("/")))
    }

    pub fn walk_op(&self) -> Vec<Event> {
        walk(&self.op())
    }

    ///
    /// The direct dependencies of this node, in deterministic (insertion)
    /// order with duplicates folded: every node referenced by the operator,
    /// the resource node behind each resource wrapper (plus the resource's
    /// producers when consuming it), and the producer of each input path.
    ///
    pub fn dep_nodes(&self) -> Vec<Node> {
        let mut out: IndexSet<Node> = IndexSet::new();
        for event in self.walk_op() {
            match event {
                Event::Node(n) => {
                    out.insert(n);
                }
                Event::ResourceIn(n) => {
                    for producer in n.producers() {
                        out.insert(producer);
                    }
                    out.insert(n);
                }
                Event::ResourceOut(n) => {
                    // Producing a resource depends on the resource existing,
                    // but not on the other producers.
                    out.insert(n);
                }
                _ => {}
            }
        }
        for path in self.pathins() {
            if let Some(parent) = self.parent() {
                if let Some(dep) = parent.path_producer(path) {
                    out.insert(dep);
                }
            }
        }
        out.shift_remove(self);
        out.into_iter().collect()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_usize(self.id());
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.full_name() {
            Ok(Some(name)) => write!(f, "<{name}>"),
            _ => write!(f, "<unnamed node>"),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({:?})", self.0.op.lock().type_name())
    }
}

enum ParentSpec {
    Auto,
    Detached,
    Explicit(Graph),
}

///
/// Builds and attaches a Node. Unless a parent is given explicitly, the node
/// attaches to the innermost open build scope, falling back to the global
/// graph; `detached()` opts out entirely, which also forbids names and path
/// declarations.
///
pub struct NodeBuilder {
    op: NodeOp,
    name: Option<String>,
    name_prefix: Option<String>,
    always: bool,
    pathins: Vec<PathBuf>,
    pathouts: Vec<PathBuf>,
    parent: ParentSpec,
}

impl NodeBuilder {
    pub fn new(op: NodeOp) -> NodeBuilder {
        NodeBuilder {
            op,
            name: None,
            name_prefix: None,
            always: false,
            pathins: Vec::new(),
            pathouts: Vec::new(),
            parent: ParentSpec::Auto,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> NodeBuilder {
        self.name = Some(name.into());
        self
    }

    pub fn name_prefix(mut self, prefix: impl Into<String>) -> NodeBuilder {
        self.name_prefix = Some(prefix.into());
        self
    }

    ///
    /// Marks the node as always re-run, regardless of cached state.
    ///
    pub fn always(mut self) -> NodeBuilder {
        self.always = true;
        self
    }

    ///
    /// Declares an input path in addition to any PathIn markers found in the
    /// operator's arguments.
    ///
    pub fn pathin(mut self, path: impl AsRef<Path>) -> NodeBuilder {
        self.pathins.push(path.as_ref().to_path_buf());
        self
    }

    pub fn pathout(mut self, path: impl AsRef<Path>) -> NodeBuilder {
        self.pathouts.push(path.as_ref().to_path_buf());
        self
    }

    pub fn parent(mut self, graph: &Graph) -> NodeBuilder {
        self.parent = ParentSpec::Explicit(graph.clone());
        self
    }

    pub fn detached(mut self) -> NodeBuilder {
        self.parent = ParentSpec::Detached;
        self
    }

    pub fn build(self) -> Result<Node, GraphError> {
        if let Some(name) = &self.name {
            if name.contains('/') {
                return Err(GraphError::NameContainsSlash(name.clone()));
            }
        }

        // One walk serves path collection and argument validation.
        let events = walk(&self.op);
        let mut pins: BTreeSet<PathBuf> = self.pathins.into_iter().collect();
        let mut pouts: BTreeSet<PathBuf> = self.pathouts.into_iter().collect();
        for event in &events {
            match event {
                Event::PathIn(p) => {
                    pins.insert(p.clone());
                }
                Event::PathOut(p) => {
                    pouts.insert(p.clone());
                }
                Event::Node(n) if n.is_resource() => {
                    return Err(GraphError::RawResourceArgument);
                }
                Event::ResourceIn(n) | Event::ResourceOut(n) if !n.is_resource() => {
                    return Err(GraphError::NotAResource);
                }
                _ => {}
            }
        }

        let parent = match self.parent {
            ParentSpec::Explicit(g) => Some(g),
            ParentSpec::Detached => None,
            ParentSpec::Auto => Some(current_scope().unwrap_or_else(global_graph)),
        };

        if parent.is_none() {
            if self.name.is_some() {
                return Err(GraphError::DetachedWithName);
            }
            if !pins.is_empty() || !pouts.is_empty() {
                return Err(GraphError::DetachedWithPaths);
            }
        }

        let node = Node(Arc::new(NodeInner {
            op: Mutex::new(self.op),
            name: Mutex::new(self.name.clone()),
            has_explicit_name: self.name.is_some(),
            always: self.always,
            pathins: pins.into_iter().collect(),
            pathouts: pouts.into_iter().collect(),
            parent: parent
                .as_ref()
                .map(|g| Arc::downgrade(&g.0))
                .unwrap_or_default(),
            producers: Mutex::new(Vec::new()),
        }));

        for event in &events {
            if let Event::ResourceOut(resource) = event {
                resource.add_producer(&node);
            }
        }

        if let Some(graph) = parent {
            graph.attach_node(&node, self.name, self.name_prefix)?;
        }
        Ok(node)
    }
}

///
/// A container of nodes and nested subgraphs. Like Node, a cheap handle with
/// identity semantics.
///
#[derive(Clone)]
pub struct Graph(Arc<GraphInner>);

pub(crate) struct GraphInner {
    name: Mutex<Option<String>>,
    parent: Weak<GraphInner>,
    root: Weak<GraphInner>,
    state: Mutex<GraphState>,
}

#[derive(Default)]
struct GraphState {
    nodes: Vec<Node>,
    graphs: Vec<Graph>,
    children: FnvHashMap<String, Child>,
    // Maintained on the root graph only.
    pathout2node: FnvHashMap<PathBuf, Node>,
    in_build_scope: bool,
}

///
/// A named child of a graph: either a node or a nested subgraph; node and
/// subgraph names share one namespace.
///
#[derive(Clone)]
pub enum Child {
    Node(Node),
    Graph(Graph),
}

impl Graph {
    ///
    /// A new graph attached to the innermost open build scope, or to the
    /// global graph when no scope is open.
    ///
    pub fn new() -> Result<Graph, GraphError> {
        Self::create(None, ParentSpec::Auto)
    }

    pub fn named(name: impl Into<String>) -> Result<Graph, GraphError> {
        Self::create(Some(name.into()), ParentSpec::Auto)
    }

    ///
    /// A new root graph, attached to nothing.
    ///
    pub fn detached() -> Graph {
        Self::create(None, ParentSpec::Detached).expect("detached graph creation cannot fail")
    }

    pub fn new_in(parent: &Graph, name: Option<String>) -> Result<Graph, GraphError> {
        Self::create(name, ParentSpec::Explicit(parent.clone()))
    }

    fn create(name: Option<String>, parent: ParentSpec) -> Result<Graph, GraphError> {
        if let Some(name) = &name {
            if name.contains('/') {
                return Err(GraphError::NameContainsSlash(name.clone()));
            }
        }

        let parent = match parent {
            ParentSpec::Explicit(g) => Some(g),
            ParentSpec::Detached => None,
            ParentSpec::Auto => Some(current_scope().unwrap_or_else(global_graph)),
        };

        let graph = Graph(Arc::new_cyclic(|weak_self| GraphInner {
            name: Mutex::new(name.clone()),
            parent: parent.as_ref().map(|g| Arc::downgrade(&g.0)).unwrap_or_default(),
            root: parent
                .as_ref()
                .map(|g| g.0.root.clone())
                .unwrap_or_else(|| weak_self.clone()),
            state: Mutex::new(GraphState::default()),
        }));

        if let Some(parent) = parent {
            parent.attach_graph(&graph, name)?;
        }
        Ok(graph)
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn name(&self) -> Option<String> {
        self.0.name.lock().clone()
    }

    pub fn parent(&self) -> Option<Graph> {
        self.0.parent.upgrade().map(Graph)
    }

    pub fn root(&self) -> Graph {
        self.0
            .root
            .upgrade()
            .map(Graph)
            .expect("the root graph was dropped while a child handle was alive")
    }

    pub fn is_root(&self) -> bool {
        self.root() == *self
    }

    ///
    /// The slash-joined path of this graph below its root; empty for the root
    /// itself.
    ///
    pub fn full_name(&self) -> Result<String, GraphError> {
        let root = self.root();
        let mut segments = Vec::new();
        let mut g = self.clone();
        while g != root {
            match g.name() {
                Some(name) => segments.push(name),
                None => return Err(GraphError::UnnamedAncestor),
            }
            g = g.parent().ok_or(GraphError::UnnamedAncestor)?;
        }
        segments.reverse();
        Ok(segments.join("/"))
    }

    ///
    /// Opens a build scope: until the returned guard drops, nodes and graphs
    /// created without an explicit parent attach to this graph.
    ///
    pub fn build(&self) -> Result<BuildScope, GraphError> {
        {
            let mut state = self.0.state.lock();
            if state.in_build_scope {
                return Err(GraphError::AlreadyInBuildScope);
            }
            state.in_build_scope = true;
        }
        BUILD_STACK.with(|stack| stack.borrow_mut().push(self.clone()));
        Ok(BuildScope {
            graph: self.clone(),
        })
    }

    ///
    /// Looks up a child by slash-separated path. Every intermediate segment
    /// must name a nested graph.
    ///
    pub fn child(&self, path: &str) -> Result<Child, GraphError> {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.is_empty() || path.is_empty() {
            return Err(GraphError::NotFound("empty path".to_owned()));
        }

        let mut current = self.clone();
        for (i, segment) in parts[..parts.len() - 1].iter().enumerate() {
            let next = {
                let state = current.0.state.lock();
                state.children.get(*segment).cloned()
            };
            match next {
                Some(Child::Graph(g)) => current = g,
                Some(Child::Node(_)) => {
                    return Err(GraphError::NotFound(format!(
                        "element at {:?} is not a graph",
                        parts[..=i].join("/")
                    )));
                }
                None => {
                    return Err(GraphError::NotFound(format!(
                        "graph at {:?} does not contain a child named {segment:?}",
                        parts[..i].join("/")
                    )));
                }
            }
        }

        let last = parts[parts.len() - 1];
        let state = current.0.state.lock();
        state
            .children
            .get(last)
            .cloned()
            .ok_or_else(|| GraphError::NotFound(format!("no child named {last:?}")))
    }

    ///
    /// Like `child`, but requires the path to name a node.
    ///
    pub fn node(&self, path: &str) -> Result<Node, GraphError> {
        match self.child(path)? {
            Child::Node(node) => Ok(node),
            Child::Graph(_) => Err(GraphError::NotFound(format!(
                "element at {path:?} is a graph, not a node"
            ))),
        }
    }

    ///
    /// All nodes of this graph and its subgraphs, depth first (own nodes
    /// before descending), optionally filtered.
    ///
    pub fn recurse_nodes(&self, predicate: Option<&dyn Fn(&Node) -> bool>) -> Vec<Node> {
        let mut out = Vec::new();
        self.recurse_nodes_into(predicate, &mut out);
        out
    }

    fn recurse_nodes_into(&self, predicate: Option<&dyn Fn(&Node) -> bool>, out: &mut Vec<Node>) {
        let (nodes, graphs) = {
            let state = self.0.state.lock();
            (state.nodes.clone(), state.graphs.clone())
        };
        for node in nodes {
            if predicate.map(|p| p(&node)).unwrap_or(true) {
                out.push(node);
            }
        }
        for graph in graphs {
            graph.recurse_nodes_into(predicate, out);
        }
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.0.state.lock().nodes.clone()
    }

    pub fn subgraphs(&self) -> Vec<Graph> {
        self.0.state.lock().graphs.clone()
    }

    ///
    /// The node declaring to produce `path`, consulting the root's registry
    /// and falling back to the global graph's.
    ///
    pub fn path_producer(&self, path: &Path) -> Option<Node> {
        let root = self.root();
        if let Some(node) = root.path_producer_local(path) {
            return Some(node);
        }
        let global = global_graph();
        if global == root {
            return None;
        }
        global.path_producer_local(path)
    }

    fn path_producer_local(&self, path: &Path) -> Option<Node> {
        self.0.state.lock().pathout2node.get(path).cloned()
    }

    fn register_pathout(&self, path: &Path, node: &Node) {
        self.0
            .state
            .lock()
            .pathout2node
            .insert(path.to_path_buf(), node.clone());
    }

    ///
    /// Re-registers a loaded node under its stored name; see `Node::shell`.
    ///
    pub(crate) fn adopt_node(&self, node: &Node) {
        let name = node.name().expect("loaded nodes always carry their name");
        let mut state = self.0.state.lock();
        state.children.insert(name, Child::Node(node.clone()));
        state.nodes.push(node.clone());
        drop(state);
        for path in node.pathouts() {
            self.root().register_pathout(path, node);
        }
    }

    pub(crate) fn set_name_raw(&self, name: Option<String>) {
        *self.0.name.lock() = name;
    }

    fn attach_graph(&self, graph: &Graph, explicit_name: Option<String>) -> Result<(), GraphError> {
        let mut state = self.0.state.lock();
        let name = match explicit_name {
            Some(name) => {
                if state.children.contains_key(&name) {
                    return Err(GraphError::DuplicateName(name));
                }
                name
            }
            None => {
                let mut idx = state.graphs.len();
                let mut candidate = format!("graph-{idx}");
                while state.children.contains_key(&candidate) {
                    idx += 1;
                    candidate = format!("graph-{idx}");
                }
                candidate
            }
        };
        *graph.0.name.lock() = Some(name.clone());
        state.children.insert(name, Child::Graph(graph.clone()));
        state.graphs.push(graph.clone());
        Ok(())
    }

    fn attach_node(
        &self,
        node: &Node,
        explicit_name: Option<String>,
        name_prefix: Option<String>,
    ) -> Result<(), GraphError> {
        let name = {
            let mut state = self.0.state.lock();
            let name = match explicit_name {
                Some(name) => {
                    if state.children.contains_key(&name) {
                        return Err(GraphError::DuplicateName(name));
                    }
                    name
                }
                None => {
                    let prefix = name_prefix
                        .or_else(|| match &*node.0.op.lock() {
                            NodeOp::Call {
                                func: OpArg::Func(f),
                                ..
                            } => Some(short_func_name(f)),
                            _ => None,
                        })
                        .unwrap_or_else(|| "unnamed".to_owned());
                    let mut candidate = prefix.clone();
                    let mut idx = 0;
                    while state.children.contains_key(&candidate) {
                        idx += 1;
                        candidate = format!("{prefix}-{idx}");
                    }
                    candidate
                }
            };
            state.children.insert(name.clone(), Child::Node(node.clone()));
            name
        };
        *node.0.name.lock() = Some(name);

        for path in node.pathouts() {
            if self.path_producer(path).is_some() {
                return Err(GraphError::DuplicatePathOut(path.clone()));
            }
            self.root().register_pathout(path, node);
        }

        self.0.state.lock().nodes.push(node.clone());
        Ok(())
    }
}

impl PartialEq for Graph {
    fn eq(&self, other: &Graph) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Graph {}

impl std::hash::Hash for Graph {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_usize(self.id());
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Graph({:?})", self.name())
    }
}

fn short_func_name(func: &Func) -> String {
    func.name()
        .rsplit("::")
        .next()
        .unwrap_or(func.name())
        .to_owned()
}

///
/// RAII guard for a graph build scope; see `Graph::build`.
///
#[derive(Debug)]
pub struct BuildScope {
    graph: Graph,
}

impl Drop for BuildScope {
    fn drop(&mut self) {
        self.graph.0.state.lock().in_build_scope = false;
        BUILD_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|g| *g == self.graph) {
                stack.remove(pos);
            }
        });
    }
}

thread_local! {
    static BUILD_STACK: RefCell<Vec<Graph>> = const { RefCell::new(Vec::new()) };
}

///
/// The innermost open build scope on this thread, if any.
///
pub fn current_scope() -> Option<Graph> {
    BUILD_STACK.with(|stack| stack.borrow().last().cloned())
}

static GLOBAL_GRAPH: Lazy<Graph> = Lazy::new(Graph::detached);

///
/// The process-wide default parent for nodes and graphs created outside any
/// build scope.
///
pub fn global_graph() -> Graph {
    GLOBAL_GRAPH.clone()
}

///
/// A Call node invoking `func` with positional arguments.
///
pub fn call(func: Func, args: Vec<OpArg>) -> NodeBuilder {
    NodeBuilder::new(NodeOp::Call {
        func: OpArg::Func(func),
        args,
        kwargs: IndexMap::new(),
    })
}

///
/// A Call node with positional and keyword arguments.
///
pub fn call_kw(func: Func, args: Vec<OpArg>, kwargs: IndexMap<String, OpArg>) -> NodeBuilder {
    NodeBuilder::new(NodeOp::Call {
        func: OpArg::Func(func),
        args,
        kwargs,
    })
}

///
/// A Call node whose callee is itself deferred (a node producing a function).
///
pub fn call_deferred(func: impl Into<OpArg>, args: Vec<OpArg>) -> NodeBuilder {
    NodeBuilder::new(NodeOp::Call {
        func: func.into(),
        args,
        kwargs: IndexMap::new(),
    })
}

///
/// A Value node holding a mutable cell.
///
pub fn value(v: impl Into<OpArg>) -> NodeBuilder {
    NodeBuilder::new(NodeOp::Value(v.into()))
}

///
/// A Value node with no value yet.
///
pub fn unset_value() -> NodeBuilder {
    NodeBuilder::new(NodeOp::Value(OpArg::Unset))
}

///
/// A Data node carrying an inline payload.
///
pub fn data(payload: impl Into<crate::value::Value>) -> NodeBuilder {
    NodeBuilder::new(NodeOp::Data {
        payload: payload.into(),
        id: None,
    })
}

///
/// A Data node whose identity is the id alone; the payload does not enter the
/// node descriptor.
///
pub fn data_with_id(
    payload: impl Into<crate::value::Value>,
    id: impl Into<String>,
) -> NodeBuilder {
    NodeBuilder::new(NodeOp::Data {
        payload: payload.into(),
        id: Some(id.into()),
    })
}

///
/// A Resource node; a matching provider creates and resolves it at run time.
///
pub fn resource(request: ResourceRequest) -> NodeBuilder {
    NodeBuilder::new(NodeOp::Resource { request })
}
