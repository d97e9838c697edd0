// Copyright 2024 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

pub mod descriptor;
#[cfg(test)]
mod descriptor_tests;
pub mod func;
mod node;
pub mod nodeop;
mod persist;
pub mod resolve;
mod sort;
#[cfg(test)]
mod sort_tests;
pub mod value;
pub mod walk;

pub use crate::descriptor::{node_descriptor, DescriptorCache, DescriptorEvent, NodeDescriptor};
pub use crate::func::{
    is_registered, register, register_with_fingerprint, CallArgs, Func, FuncSpec,
};
pub use crate::node::{
    call, call_deferred, call_kw, current_scope, data, data_with_id, global_graph, resource,
    unset_value, value, BuildScope, Child, Graph, Node, NodeBuilder,
};
pub use crate::nodeop::{
    path_in, path_out, resource_in, resource_out, NodeOp, OpArg, ResourceRequest,
};
pub use crate::resolve::{resolve_op, CustomResolver, EmptyEnv, ResolveEnv, ResolvedOp};
pub use crate::sort::{topological_sort, DependantCounts};
pub use crate::value::{ContextValue, Value};

use std::fmt;
use std::path::PathBuf;

///
/// Everything that can go wrong while shaping a graph: naming, path
/// declarations, argument validation, lookups, cycles, and persistence.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GraphError {
    NameContainsSlash(String),
    DuplicateName(String),
    DuplicatePathOut(PathBuf),
    DetachedWithName,
    DetachedWithPaths,
    RawResourceArgument,
    NotAResource,
    ReservedAttr(String),
    NotAValueOp,
    UnnamedAncestor,
    AlreadyInBuildScope,
    NotFound(String),
    Cycle(Vec<String>),
    Io(String),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::NameContainsSlash(name) => write!(
                f,
                "name can not contain the slash character (\"/\"): {name}"
            ),
            GraphError::DuplicateName(name) => {
                write!(f, "there is already a node named {name:?}")
            }
            GraphError::DuplicatePathOut(path) => {
                write!(f, "found multiple nodes declaring to produce {}", path.display())
            }
            GraphError::DetachedWithName => {
                write!(f, "a named node is only allowed inside a graph")
            }
            GraphError::DetachedWithPaths => {
                write!(f, "path declarations are only allowed inside a graph")
            }
            GraphError::RawResourceArgument => write!(
                f,
                "resource nodes can not be used directly as arguments; wrap them with \
                 resource_in or resource_out"
            ),
            GraphError::NotAResource => {
                write!(f, "only resource nodes can be wrapped with resource_in or resource_out")
            }
            GraphError::ReservedAttr(name) => write!(
                f,
                "failed to get attribute {name:?}: attributes starting with \"_\" are reserved"
            ),
            GraphError::NotAValueOp => {
                write!(f, "a value can be set or unset only for Value operators")
            }
            GraphError::UnnamedAncestor => {
                write!(f, "one of the parent graphs has no name")
            }
            GraphError::AlreadyInBuildScope => write!(f, "graph already in build context"),
            GraphError::NotFound(msg) => write!(f, "{msg}"),
            GraphError::Cycle(path) => write!(
                f,
                "circular dependency found between nodes: {}",
                path.join(" <- ")
            ),
            GraphError::Io(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for GraphError {}
