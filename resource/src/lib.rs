// Copyright 2024 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

mod path_provider;

pub use crate::path_provider::{path_request, PathProvider, DEFAULT_PATH_PROVIDER_BASE, PATH_KIND};

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use graph::{ResourceRequest, Value};

///
/// A policy object managing one kind of externally produced artifact. The
/// handle returned by `create` is an opaque serializable value: it is what the
/// state layer persists for a resource node, and what the other methods
/// receive back, possibly in a later process.
///
pub trait ResourceProvider: Send + Sync {
    fn matches(&self, request: &ResourceRequest) -> bool;

    /// Allocates the external artifact and returns its handle.
    fn create(&self, request: &ResourceRequest) -> Result<Value, ResourceError>;

    /// Destroys the external artifact.
    fn delete(&self, handle: &Value) -> Result<(), ResourceError>;

    /// Liveness check; a false result invalidates the owning node's state.
    fn exists(&self, handle: &Value) -> Result<bool, ResourceError>;

    /// Turns the handle into its user-visible form.
    fn resolve(&self, handle: &Value) -> Result<Value, ResourceError>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResourceError {
    NoProvider(String),
    BadHandle(String),
    Io(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::NoProvider(kind) => {
                write!(f, "no provider found for resource request of kind {kind:?}")
            }
            ResourceError::BadHandle(msg) => write!(f, "bad resource handle: {msg}"),
            ResourceError::Io(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ResourceError {}

thread_local! {
    static PROVIDER_STACK: RefCell<Vec<Arc<dyn ResourceProvider>>> =
        const { RefCell::new(Vec::new()) };
}

///
/// Pushes a provider for the current thread; providers unwind in reverse when
/// their guards drop.
///
pub fn push_provider(provider: Arc<dyn ResourceProvider>) -> ProviderGuard {
    PROVIDER_STACK.with(|stack| stack.borrow_mut().push(provider));
    ProviderGuard { _private: () }
}

///
/// RAII guard for one pushed provider.
///
pub struct ProviderGuard {
    _private: (),
}

impl Drop for ProviderGuard {
    fn drop(&mut self) {
        PROVIDER_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

///
/// The topmost provider matching `request`. Scans the stack from the most
/// recently pushed provider down; a miss is an error.
///
pub fn get_provider(request: &ResourceRequest) -> Result<Arc<dyn ResourceProvider>, ResourceError> {
    PROVIDER_STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .rev()
            .find(|p| p.matches(request))
            .cloned()
            .ok_or_else(|| ResourceError::NoProvider(request.kind.clone()))
    })
}
