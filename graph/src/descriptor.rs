// Copyright 2024 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Node descriptors: the canonical, serializable fingerprint of a node.
//! Equality of two descriptors defines "equivalent for caching purposes"; the
//! bincode serialization of a descriptor is byte-identical for equal
//! descriptors, which is what the content-addressed state db hashes.

use std::path::PathBuf;

use fnv::FnvHashMap;
use hashing::Digest;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::func::FuncSpec;
use crate::node::Node;
use crate::nodeop::NodeOp;
use crate::value::Value;
use crate::walk::{walk, Event};

///
/// One event of a node descriptor. The stream mirrors the walk protocol, with
/// node-valued events cleared (their referenced node's descriptor follows
/// inline) so that descriptors contain no live handles and serialize stably.
///
/// The derived total order is what makes the resource-producer sort
/// deterministic without a fallback comparator.
///
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum DescriptorEvent {
    Pathins(Vec<PathBuf>),
    Pathouts(Vec<PathBuf>),
    ResourceProducers(Vec<NodeDescriptor>),
    OpType(String),
    DataOp {
        payload: Value,
        id: Option<String>,
    },
    ValueId(u32),
    Ref(u32),
    PathIn(PathBuf),
    PathOut(PathBuf),
    ResourceIn,
    ResourceOut,
    Node,
    /// Stands in for the resource node a producer descriptor is being built
    /// for, breaking the recursion between the two.
    ProducedResource,
    Ctx,
    Unset,
    List(usize),
    Tuple(usize),
    Dict(Vec<String>),
    Func(FuncSpec),
    Other(Value),
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct NodeDescriptor(pub Vec<DescriptorEvent>);

impl NodeDescriptor {
    ///
    /// The canonical byte form; equal descriptors have identical bytes.
    ///
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("node descriptors always serialize")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<NodeDescriptor, String> {
        bincode::deserialize(bytes).map_err(|e| format!("failed to decode node descriptor: {e}"))
    }

    ///
    /// The content address of this descriptor.
    ///
    pub fn digest(&self) -> Digest {
        Digest::of_bytes(&self.to_bytes())
    }
}

///
/// Memoizes descriptors per node. The state namespace holds one of these for
/// its lifetime. Nodes with mutable (Value) operators are never cached.
///
#[derive(Default)]
pub struct DescriptorCache {
    entries: Mutex<FnvHashMap<Node, Arc<NodeDescriptor>>>,
}

impl DescriptorCache {
    pub fn new() -> DescriptorCache {
        DescriptorCache::default()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

///
/// Computes the descriptor of a node, optionally memoizing through `cache`.
///
pub fn node_descriptor(node: &Node, cache: Option<&DescriptorCache>) -> Arc<NodeDescriptor> {
    let cacheable = !matches!(node.op(), NodeOp::Value(_));
    if cacheable {
        if let Some(cache) = cache {
            if let Some(found) = cache.entries.lock().get(node) {
                return found.clone();
            }
        }
    }

    let mut events = Vec::new();
    descriptor_events(node, cache, None, &mut events);
    let descriptor = Arc::new(NodeDescriptor(events));

    if cacheable {
        if let Some(cache) = cache {
            cache
                .entries
                .lock()
                .insert(node.clone(), descriptor.clone());
        }
    }
    descriptor
}

///
/// Emits the descriptor events of `node` into `out`. While building the
/// descriptor of a resource's producer, `for_resource` names that resource so
/// references back to it terminate in a ProducedResource marker instead of
/// recursing forever.
///
fn descriptor_events(
    node: &Node,
    cache: Option<&DescriptorCache>,
    for_resource: Option<&Node>,
    out: &mut Vec<DescriptorEvent>,
) {
    out.push(DescriptorEvent::Pathins(node.pathins().to_vec()));
    out.push(DescriptorEvent::Pathouts(node.pathouts().to_vec()));

    let mut producers: Vec<NodeDescriptor> = node
        .producers()
        .iter()
        .map(|producer| {
            let mut events = Vec::new();
            descriptor_events(producer, cache, Some(node), &mut events);
            NodeDescriptor(events)
        })
        .collect();
    producers.sort();
    out.push(DescriptorEvent::ResourceProducers(producers));

    // Data identified by id contributes the id alone, not the payload bytes.
    let mut op = node.op();
    if let NodeOp::Data {
        payload,
        id: Some(id),
    } = &mut op
    {
        if !id.is_empty() {
            *payload = Value::Null;
        }
    }

    for event in walk(&op) {
        match event {
            Event::Node(child) => {
                out.push(DescriptorEvent::Node);
                child_events(&child, cache, for_resource, out);
            }
            Event::ResourceIn(resource) => {
                out.push(DescriptorEvent::ResourceIn);
                if for_resource == Some(&resource) {
                    out.push(DescriptorEvent::ProducedResource);
                } else {
                    child_events(&resource, cache, for_resource, out);
                }
            }
            Event::ResourceOut(resource) => {
                out.push(DescriptorEvent::ResourceOut);
                if for_resource == Some(&resource) {
                    out.push(DescriptorEvent::ProducedResource);
                } else {
                    child_events(&resource, cache, for_resource, out);
                }
            }
            Event::OpType(t) => out.push(DescriptorEvent::OpType(t.to_owned())),
            Event::DataOp { payload, id } => {
                out.push(DescriptorEvent::DataOp { payload, id })
            }
            Event::ValueId(n) => out.push(DescriptorEvent::ValueId(n)),
            Event::Ref(n) => out.push(DescriptorEvent::Ref(n)),
            Event::PathIn(p) => out.push(DescriptorEvent::PathIn(p)),
            Event::PathOut(p) => out.push(DescriptorEvent::PathOut(p)),
            Event::Ctx => out.push(DescriptorEvent::Ctx),
            Event::Unset => out.push(DescriptorEvent::Unset),
            Event::List(n) => out.push(DescriptorEvent::List(n)),
            Event::Tuple(n) => out.push(DescriptorEvent::Tuple(n)),
            Event::Dict(keys) => out.push(DescriptorEvent::Dict(keys)),
            Event::Func(spec) => out.push(DescriptorEvent::Func(spec)),
            Event::Other(v) => out.push(DescriptorEvent::Other(v)),
        }
    }
}

///
/// Splices the descriptor of a referenced node, going through the memoized
/// entry point when no producer context is active.
///
fn child_events(
    node: &Node,
    cache: Option<&DescriptorCache>,
    for_resource: Option<&Node>,
    out: &mut Vec<DescriptorEvent>,
) {
    if for_resource.is_none() {
        let descriptor = node_descriptor(node, cache);
        out.extend(descriptor.0.iter().cloned());
    } else {
        descriptor_events(node, cache, for_resource, out);
    }
}
