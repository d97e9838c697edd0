// Copyright 2024 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use fnv::FnvHashMap;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::value::Value;

///
/// The callable shape invoked by Call operators. Arguments arrive fully
/// resolved; errors abort the run.
///
pub type NodeFnObj = dyn Fn(CallArgs) -> Result<Value, String> + Send + Sync;

///
/// Resolved positional and keyword arguments for one invocation.
///
#[derive(Clone, Debug, Default)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: IndexMap<String, Value>,
}

impl CallArgs {
    pub fn positional(&self, index: usize) -> Result<&Value, String> {
        self.args
            .get(index)
            .ok_or_else(|| format!("missing positional argument {index}"))
    }

    pub fn keyword(&self, name: &str) -> Result<&Value, String> {
        self.kwargs
            .get(name)
            .ok_or_else(|| format!("missing keyword argument {name:?}"))
    }
}

///
/// A reference to a callable, identified by name plus an optional fingerprint.
///
/// Closures do not survive process boundaries, so a Func travels by identity:
/// the name resolves through the process-wide registry when the callable is
/// not carried inline. The (name, fingerprint) pair is what enters node
/// descriptors; bumping the fingerprint is how a changed function body
/// invalidates cached results.
///
#[derive(Clone)]
pub struct Func {
    name: String,
    fingerprint: Option<String>,
    callable: Option<Arc<NodeFnObj>>,
}

///
/// The identity of a Func as it appears in walk events and node descriptors.
///
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct FuncSpec {
    pub name: String,
    pub fingerprint: Option<String>,
}

impl Func {
    ///
    /// A callable carried inline under the given identity. The name must be
    /// stable across runs for caching to work; register the function instead
    /// if the graph is going to be saved and loaded elsewhere.
    ///
    pub fn new<F>(name: impl Into<String>, f: F) -> Func
    where
        F: Fn(CallArgs) -> Result<Value, String> + Send + Sync + 'static,
    {
        Func {
            name: name.into(),
            fingerprint: None,
            callable: Some(Arc::new(f)),
        }
    }

    pub fn with_fingerprint<F>(
        name: impl Into<String>,
        fingerprint: impl Into<String>,
        f: F,
    ) -> Func
    where
        F: Fn(CallArgs) -> Result<Value, String> + Send + Sync + 'static,
    {
        Func {
            name: name.into(),
            fingerprint: Some(fingerprint.into()),
            callable: Some(Arc::new(f)),
        }
    }

    ///
    /// A reference to a function registered (possibly later, possibly in
    /// another process) under the given name.
    ///
    pub fn named(name: impl Into<String>) -> Func {
        Func {
            name: name.into(),
            fingerprint: None,
            callable: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    ///
    /// The same reference with a fingerprint attached.
    ///
    pub fn fingerprinted(mut self, fingerprint: impl Into<String>) -> Func {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    ///
    /// The identity entering walk events and descriptors. A fingerprint set on
    /// the registry entry wins over one carried by the reference so that all
    /// references to one registered function agree.
    ///
    pub fn spec(&self) -> FuncSpec {
        let registered = REGISTRY.lock().get(&self.name).and_then(|e| e.fingerprint.clone());
        FuncSpec {
            name: self.name.clone(),
            fingerprint: registered.or_else(|| self.fingerprint.clone()),
        }
    }

    ///
    /// True if invoking this Func can succeed in this process.
    ///
    pub fn is_bound(&self) -> bool {
        self.callable.is_some() || REGISTRY.lock().contains_key(&self.name)
    }

    pub fn call(&self, args: CallArgs) -> Result<Value, String> {
        let callable = match &self.callable {
            Some(c) => c.clone(),
            None => {
                let registry = REGISTRY.lock();
                registry
                    .get(&self.name)
                    .map(|e| e.callable.clone())
                    .ok_or_else(|| {
                        format!("no function registered under the name {:?}", self.name)
                    })?
            }
        };
        callable(args)
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Func({})", self.name)
    }
}

impl PartialEq for Func {
    fn eq(&self, other: &Func) -> bool {
        self.name == other.name && self.fingerprint == other.fingerprint
    }
}

impl Eq for Func {}

impl Hash for Func {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.fingerprint.hash(state);
    }
}

impl PartialOrd for Func {
    fn partial_cmp(&self, other: &Func) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Func {
    fn cmp(&self, other: &Func) -> Ordering {
        (&self.name, &self.fingerprint).cmp(&(&other.name, &other.fingerprint))
    }
}

impl Serialize for Func {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.spec().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Func {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let spec = FuncSpec::deserialize(deserializer)?;
        Ok(Func {
            name: spec.name,
            fingerprint: spec.fingerprint,
            callable: None,
        })
    }
}

struct RegistryEntry {
    fingerprint: Option<String>,
    callable: Arc<NodeFnObj>,
}

static REGISTRY: Lazy<Mutex<FnvHashMap<String, RegistryEntry>>> =
    Lazy::new(|| Mutex::new(FnvHashMap::default()));

///
/// Registers a callable under a process-wide name and returns a reference to
/// it. Registration is what lets saved graphs rebind their functions after
/// loading. Re-registering a name replaces the previous entry.
///
pub fn register<F>(name: impl Into<String>, f: F) -> Func
where
    F: Fn(CallArgs) -> Result<Value, String> + Send + Sync + 'static,
{
    register_with_fingerprint_opt(name, None, f)
}

///
/// Like `register`, but with a fingerprint that participates in node
/// descriptors. Bump it when the function's behavior changes to invalidate
/// previously cached results.
///
pub fn register_with_fingerprint<F>(
    name: impl Into<String>,
    fingerprint: impl Into<String>,
    f: F,
) -> Func
where
    F: Fn(CallArgs) -> Result<Value, String> + Send + Sync + 'static,
{
    register_with_fingerprint_opt(name, Some(fingerprint.into()), f)
}

fn register_with_fingerprint_opt<F>(name: impl Into<String>, fingerprint: Option<String>, f: F) -> Func
where
    F: Fn(CallArgs) -> Result<Value, String> + Send + Sync + 'static,
{
    let name = name.into();
    let callable: Arc<NodeFnObj> = Arc::new(f);
    let mut registry = REGISTRY.lock();
    if registry.contains_key(&name) {
        log::debug!("replacing registered function {name:?}");
    }
    registry.insert(
        name.clone(),
        RegistryEntry {
            fingerprint: fingerprint.clone(),
            callable: callable.clone(),
        },
    );
    Func {
        name,
        fingerprint,
        callable: Some(callable),
    }
}

///
/// True if a function is registered under the given name.
///
pub fn is_registered(name: &str) -> bool {
    REGISTRY.lock().contains_key(name)
}
