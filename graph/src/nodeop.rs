// Copyright 2024 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::func::Func;
use crate::node::Node;
use crate::value::Value;

///
/// The tagged representation of every kind of deferred computation a node can
/// hold.
///
#[derive(Clone, Debug)]
pub enum NodeOp {
    /// An inline value. When `id` is set the payload is identified by the id
    /// alone: its bytes do not enter the node descriptor.
    Data {
        payload: Value,
        id: Option<String>,
    },
    /// A mutable cell, possibly `Unset`.
    Value(OpArg),
    /// Deferred indexing of a prior result.
    GetItem { obj: OpArg, key: OpArg },
    /// Deferred field access on a prior result.
    GetAttr { obj: OpArg, name: String },
    /// Invocation of a callable with positional and keyword arguments.
    Call {
        func: OpArg,
        args: Vec<OpArg>,
        kwargs: IndexMap<String, OpArg>,
    },
    /// Declaration of an externally managed resource, created and resolved by
    /// a matching provider. The created handle is runtime state and lives in
    /// the node's State, not here.
    Resource { request: ResourceRequest },
}

impl NodeOp {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeOp::Data { .. } => "Data",
            NodeOp::Value(_) => "Value",
            NodeOp::GetItem { .. } => "GetItem",
            NodeOp::GetAttr { .. } => "GetAttr",
            NodeOp::Call { .. } => "Call",
            NodeOp::Resource { .. } => "Resource",
        }
    }
}

///
/// One argument position in an operator: a literal, a reference to another
/// node, a path or resource marker, a sentinel, a callable, or a container of
/// further arguments.
///
/// Containers are Arc-shared: aliasing a container (or referencing a node
/// twice) is observable to the walk protocol, which canonicalizes it with
/// ValueId/Ref events.
///
#[derive(Clone, Debug)]
pub enum OpArg {
    Value(Value),
    Node(Node),
    PathIn(PathBuf),
    PathOut(PathBuf),
    ResourceIn(Node),
    ResourceOut(Node),
    /// Placeholder replaced by the per-node execution context at resolve time.
    Ctx,
    /// The absence of a value; resolves to `Value::Null`.
    Unset,
    Func(Func),
    List(Arc<Vec<OpArg>>),
    Tuple(Arc<Vec<OpArg>>),
    Dict(Arc<IndexMap<String, OpArg>>),
}

impl OpArg {
    pub fn list(items: Vec<OpArg>) -> OpArg {
        OpArg::List(Arc::new(items))
    }

    pub fn tuple(items: Vec<OpArg>) -> OpArg {
        OpArg::Tuple(Arc::new(items))
    }

    pub fn dict(entries: IndexMap<String, OpArg>) -> OpArg {
        OpArg::Dict(Arc::new(entries))
    }
}

///
/// Declares that the node reads the given path; the path's producer (if any)
/// becomes a dependency and its mtime participates in the up-to-date check.
///
pub fn path_in(path: impl AsRef<Path>) -> OpArg {
    OpArg::PathIn(path.as_ref().to_path_buf())
}

///
/// Declares that the node writes the given path. At most one node in a graph
/// may declare a given output path.
///
pub fn path_out(path: impl AsRef<Path>) -> OpArg {
    OpArg::PathOut(path.as_ref().to_path_buf())
}

///
/// Wraps a resource node for consumption: resolves to the provider's view of
/// the resource at execution time.
///
pub fn resource_in(node: &Node) -> OpArg {
    OpArg::ResourceIn(node.clone())
}

///
/// Wraps a resource node for production: marks the argument's node as a
/// producer of the resource, in addition to resolving like `resource_in`.
///
pub fn resource_out(node: &Node) -> OpArg {
    OpArg::ResourceOut(node.clone())
}

impl From<Value> for OpArg {
    fn from(v: Value) -> OpArg {
        OpArg::Value(v)
    }
}

impl From<&Node> for OpArg {
    fn from(n: &Node) -> OpArg {
        OpArg::Node(n.clone())
    }
}

impl From<Node> for OpArg {
    fn from(n: Node) -> OpArg {
        OpArg::Node(n)
    }
}

impl From<Func> for OpArg {
    fn from(f: Func) -> OpArg {
        OpArg::Func(f)
    }
}

impl From<bool> for OpArg {
    fn from(v: bool) -> OpArg {
        OpArg::Value(Value::Bool(v))
    }
}

impl From<i64> for OpArg {
    fn from(v: i64) -> OpArg {
        OpArg::Value(Value::Int(v))
    }
}

impl From<i32> for OpArg {
    fn from(v: i32) -> OpArg {
        OpArg::Value(Value::Int(v as i64))
    }
}

impl From<f64> for OpArg {
    fn from(v: f64) -> OpArg {
        OpArg::Value(Value::Float(v))
    }
}

impl From<&str> for OpArg {
    fn from(v: &str) -> OpArg {
        OpArg::Value(Value::Str(v.to_owned()))
    }
}

impl From<String> for OpArg {
    fn from(v: String) -> OpArg {
        OpArg::Value(Value::Str(v))
    }
}

///
/// Identifies a kind of externally managed resource. Providers dispatch on the
/// kind (and, where useful, the params); both fields enter the node
/// descriptor, so two requests are interchangeable for caching exactly when
/// they are equal.
///
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub kind: String,
    pub params: Value,
}

impl ResourceRequest {
    pub fn new(kind: impl Into<String>) -> ResourceRequest {
        ResourceRequest {
            kind: kind.into(),
            params: Value::Null,
        }
    }

    pub fn with_params(kind: impl Into<String>, params: Value) -> ResourceRequest {
        ResourceRequest {
            kind: kind.into(),
            params,
        }
    }

    ///
    /// The request as a plain value, which is how it enters walk events.
    ///
    pub fn to_value(&self) -> Value {
        let mut m = IndexMap::new();
        m.insert("kind".to_owned(), Value::Str(self.kind.clone()));
        m.insert("params".to_owned(), self.params.clone());
        Value::Map(m)
    }
}
