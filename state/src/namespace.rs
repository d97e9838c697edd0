// Copyright 2025 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::cell::RefCell;
use std::sync::Arc;

use fnv::FnvHashMap;
use graph::{node_descriptor, DescriptorCache, Node, NodeDescriptor};
use parking_lot::Mutex;

use crate::{MemoryState, State, StateError};

pub type StateFactory = Arc<dyn Fn(&Node) -> Result<Arc<dyn State>, StateError> + Send + Sync>;

///
/// A scoped registry mapping each node to exactly one State, created lazily by
/// a pluggable factory. At most one namespace is active per thread; on scope
/// exit every state is released and the descriptor cache cleared.
///
#[derive(Clone)]
pub struct StateNamespace(Arc<NamespaceInner>);

struct NamespaceInner {
    states: Mutex<FnvHashMap<Node, Arc<dyn State>>>,
    descriptors: DescriptorCache,
    factory: StateFactory,
}

impl StateNamespace {
    pub fn new(factory: StateFactory) -> StateNamespace {
        StateNamespace(Arc::new(NamespaceInner {
            states: Mutex::new(FnvHashMap::default()),
            descriptors: DescriptorCache::new(),
            factory,
        }))
    }

    ///
    /// A namespace whose states live purely in memory; nothing is ever up to
    /// date, nothing survives the scope.
    ///
    pub fn in_memory() -> StateNamespace {
        StateNamespace::new(Arc::new(|node: &Node| {
            Ok(Arc::new(MemoryState::new(node.clone())) as Arc<dyn State>)
        }))
    }

    ///
    /// The state for `node`, created on first access.
    ///
    pub fn state(&self, node: &Node) -> Result<Arc<dyn State>, StateError> {
        if let Some(found) = self.0.states.lock().get(node) {
            return Ok(found.clone());
        }
        // The factory runs unlocked: a cached-db factory computes descriptors,
        // which may recurse into this namespace.
        let created = (self.0.factory)(node)?;
        Ok(self
            .0
            .states
            .lock()
            .entry(node.clone())
            .or_insert(created)
            .clone())
    }

    ///
    /// The node's descriptor, memoized for the life of the namespace.
    ///
    pub fn node_descriptor(&self, node: &Node) -> Arc<NodeDescriptor> {
        node_descriptor(node, Some(&self.0.descriptors))
    }

    ///
    /// Installs this namespace as the thread's current one. Fails if another
    /// namespace is already active.
    ///
    pub fn enter(&self) -> Result<NamespaceGuard, StateError> {
        CURRENT.with(|current| {
            let mut current = current.borrow_mut();
            if current.is_some() {
                return Err(StateError::NamespaceActive);
            }
            *current = Some(self.clone());
            Ok(())
        })?;
        Ok(NamespaceGuard {
            namespace: self.clone(),
        })
    }

    fn cleanup(&self) {
        let states = std::mem::take(&mut *self.0.states.lock());
        for state in states.values() {
            state.release();
        }
        self.0.descriptors.clear();
    }
}

///
/// RAII guard for an entered namespace: drops the current-namespace slot and
/// releases every state.
///
pub struct NamespaceGuard {
    namespace: StateNamespace,
}

impl Drop for NamespaceGuard {
    fn drop(&mut self) {
        CURRENT.with(|current| {
            *current.borrow_mut() = None;
        });
        self.namespace.cleanup();
    }
}

thread_local! {
    static CURRENT: RefCell<Option<StateNamespace>> = const { RefCell::new(None) };
}

///
/// The namespace currently entered on this thread, if any.
///
pub fn current_namespace() -> Option<StateNamespace> {
    CURRENT.with(|current| current.borrow().clone())
}

///
/// The state of `node` in the current namespace; an error outside any
/// namespace scope.
///
pub fn get_state(node: &Node) -> Result<Arc<dyn State>, StateError> {
    current_namespace()
        .ok_or(StateError::NoNamespace)?
        .state(node)
}

///
/// The node's descriptor, through the current namespace's memo when one is
/// active.
///
pub fn descriptor_for(node: &Node) -> Arc<NodeDescriptor> {
    match current_namespace() {
        Some(ns) => ns.node_descriptor(node),
        None => node_descriptor(node, None),
    }
}
