// Copyright 2025 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

mod db;
mod namespace;

pub use crate::db::{CachedStateDB, DEFAULT_DB_DIR};
pub use crate::namespace::{
    current_namespace, descriptor_for, get_state, NamespaceGuard, StateFactory, StateNamespace,
};

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use graph::{Node, NodeDescriptor, Value};
use parking_lot::Mutex;
use tempfile::Builder;

pub const STATE_DIR: &str = "state";
pub const RESULT_FILE: &str = "result.bin";
pub const DESCRIPTOR_FILE: &str = "node_descriptor.bin";

///
/// The per-node record of the most recent result and its freshness.
///
pub trait State: Send + Sync {
    fn node(&self) -> &Node;

    fn has_result(&self) -> bool;

    fn get_result(&self) -> Result<Value, StateError>;

    fn set_result(&self, result: Value) -> Result<(), StateError>;

    /// Drops the in-memory result and any cached freshness; called once the
    /// last dependant has consumed the result.
    fn release(&self);

    fn is_up_to_date(&self) -> Result<bool, StateError>;

    /// When the recorded result was produced.
    fn timestamp(&self) -> Result<SystemTime, StateError>;

    /// A scratch directory for the node, created on first request; None when
    /// the state has nowhere to put one.
    fn workdir(&self) -> Result<Option<PathBuf>, StateError>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StateError {
    NoResult(String),
    NoTimestamp(String),
    NoNamespace,
    NamespaceActive,
    Resource(String),
    Io(String),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::NoResult(node) => {
                write!(f, "state for node {node} has no valid result")
            }
            StateError::NoTimestamp(node) => {
                write!(f, "state for node {node} has no timestamp")
            }
            StateError::NoNamespace => write!(f, "not in a state namespace context"),
            StateError::NamespaceActive => {
                write!(f, "there is already a state namespace in place")
            }
            StateError::Resource(msg) => write!(f, "{msg}"),
            StateError::Io(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for StateError {}

impl From<resource::ResourceError> for StateError {
    fn from(e: resource::ResourceError) -> StateError {
        StateError::Resource(e.to_string())
    }
}

fn io_err(context: &str, e: impl fmt::Display) -> StateError {
    StateError::Io(format!("{context}: {e}"))
}

///
/// Plain in-memory state: never up to date, nothing persisted.
///
pub struct MemoryState {
    node: Node,
    workdir: Option<PathBuf>,
    result: Mutex<Option<Value>>,
}

impl MemoryState {
    pub fn new(node: Node) -> MemoryState {
        MemoryState {
            node,
            workdir: None,
            result: Mutex::new(None),
        }
    }

    pub fn with_workdir(mut self, workdir: impl AsRef<Path>) -> MemoryState {
        self.workdir = Some(workdir.as_ref().to_path_buf());
        self
    }
}

impl State for MemoryState {
    fn node(&self) -> &Node {
        &self.node
    }

    fn has_result(&self) -> bool {
        self.result.lock().is_some()
    }

    fn get_result(&self) -> Result<Value, StateError> {
        self.result
            .lock()
            .clone()
            .ok_or_else(|| StateError::NoResult(self.node.to_string()))
    }

    fn set_result(&self, result: Value) -> Result<(), StateError> {
        *self.result.lock() = Some(result);
        Ok(())
    }

    fn release(&self) {
        *self.result.lock() = None;
    }

    fn is_up_to_date(&self) -> Result<bool, StateError> {
        Ok(false)
    }

    fn timestamp(&self) -> Result<SystemTime, StateError> {
        Err(StateError::NoTimestamp(self.node.to_string()))
    }

    fn workdir(&self) -> Result<Option<PathBuf>, StateError> {
        match &self.workdir {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .map_err(|e| io_err("failed to create workdir", e))?;
                Ok(Some(dir.clone()))
            }
            None => Ok(None),
        }
    }
}

#[derive(Default)]
struct CachedStateCell {
    result: Option<Value>,
    up_to_date: Option<bool>,
    timestamp: Option<SystemTime>,
}

///
/// Filesystem-backed state. Layout under `path`:
///
/// ```text
/// path/
///   workdir/          # optional scratch, created on demand
///   state/            # present iff a successful run has been recorded
///     result.bin
///     node_descriptor.bin    # unless an external descriptor path is used
///   tmp.xxxx/         # short-lived during the atomic replace
/// ```
///
/// `state/` only ever changes by atomic rename, so a crash leaves either the
/// previous state or the new one, never a half-written mix.
///
pub struct CachedState {
    node: Node,
    path: PathBuf,
    workdir: PathBuf,
    descriptor_path: Option<PathBuf>,
    check_saved_descriptor: bool,
    cell: Mutex<CachedStateCell>,
}

impl CachedState {
    pub fn new(node: Node, path: impl AsRef<Path>) -> CachedState {
        let path = path.as_ref().to_path_buf();
        CachedState {
            node,
            workdir: path.join("workdir"),
            descriptor_path: None,
            check_saved_descriptor: true,
            cell: Mutex::new(CachedStateCell::default()),
            path,
        }
    }

    ///
    /// Uses a descriptor file outside the state directory (the state db owns
    /// it) instead of writing one per run.
    ///
    pub fn with_descriptor_path(mut self, path: impl AsRef<Path>) -> CachedState {
        self.descriptor_path = Some(path.as_ref().to_path_buf());
        self
    }

    ///
    /// Skips comparing the stored descriptor in `is_up_to_date`; used when the
    /// caller already established the match (the state db's bucket lookup).
    ///
    pub fn without_descriptor_check(mut self) -> CachedState {
        self.check_saved_descriptor = false;
        self
    }

    pub fn with_workdir(mut self, workdir: impl AsRef<Path>) -> CachedState {
        self.workdir = workdir.as_ref().to_path_buf();
        self
    }

    fn state_dir(&self) -> PathBuf {
        self.path.join(STATE_DIR)
    }

    fn result_path(&self) -> PathBuf {
        self.state_dir().join(RESULT_FILE)
    }

    fn current_descriptor(&self) -> std::sync::Arc<NodeDescriptor> {
        namespace::descriptor_for(&self.node)
    }

    // Ordered from the cheapest check to the most expensive; the first
    // failing check wins.
    fn compute_up_to_date(&self) -> Result<bool, StateError> {
        let state_dir = self.state_dir();
        if !state_dir.is_dir() {
            return Ok(false);
        }

        // Input paths must predate the recorded result.
        for path in self.node.pathins() {
            match fs::metadata(path) {
                Ok(meta) => {
                    let mtime = meta
                        .modified()
                        .map_err(|e| io_err("failed to read mtime", e))?;
                    if mtime > self.timestamp()? {
                        return Ok(false);
                    }
                }
                Err(_) => return Ok(false),
            }
        }

        // Output paths must exist and not have been touched since.
        for path in self.node.pathouts() {
            match fs::metadata(path) {
                Ok(meta) => {
                    let mtime = meta
                        .modified()
                        .map_err(|e| io_err("failed to read mtime", e))?;
                    if mtime > self.timestamp()? {
                        return Ok(false);
                    }
                }
                Err(_) => return Ok(false),
            }
        }

        // A recorded resource must still exist for its provider.
        if self.has_result() {
            if let Some(request) = self.node.resource_request() {
                let provider = resource::get_provider(&request)?;
                if !provider.exists(&self.get_result()?)? {
                    return Ok(false);
                }
            }
        }

        // Dependencies must themselves be up to date and older.
        for dep in self.node.dep_nodes() {
            let dep_state = namespace::get_state(&dep)?;
            if !dep_state.is_up_to_date()? {
                return Ok(false);
            }
            if dep_state.timestamp()? > self.timestamp()? {
                return Ok(false);
            }
        }

        // Finally, the stored descriptor must match the node's.
        if self.check_saved_descriptor {
            let descriptor_path = self
                .descriptor_path
                .clone()
                .unwrap_or_else(|| self.state_dir().join(DESCRIPTOR_FILE));
            let bytes = fs::read(&descriptor_path)
                .map_err(|e| io_err("failed to read stored node descriptor", e))?;
            let saved = NodeDescriptor::from_bytes(&bytes).map_err(StateError::Io)?;
            if saved != *self.current_descriptor() {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

impl State for CachedState {
    fn node(&self) -> &Node {
        &self.node
    }

    fn has_result(&self) -> bool {
        self.cell.lock().result.is_some() || self.result_path().exists()
    }

    fn get_result(&self) -> Result<Value, StateError> {
        if let Some(result) = self.cell.lock().result.clone() {
            return Ok(result);
        }
        let bytes = fs::read(self.result_path())
            .map_err(|_| StateError::NoResult(self.node.to_string()))?;
        let result: Value = bincode::deserialize(&bytes)
            .map_err(|e| io_err("failed to decode stored result", e))?;
        self.cell.lock().result = Some(result.clone());
        Ok(result)
    }

    fn set_result(&self, result: Value) -> Result<(), StateError> {
        fs::create_dir_all(&self.path)
            .map_err(|e| io_err("failed to create state path", e))?;

        // Stage everything in a temp directory next to `state/`, then swap it
        // in with a rename; the temp directory cleans itself up on any
        // earlier exit.
        let tmpdir = Builder::new()
            .prefix("tmp.")
            .tempdir_in(&self.path)
            .map_err(|e| io_err("failed to create temp state dir", e))?;

        if self.descriptor_path.is_none() {
            let descriptor = self.current_descriptor();
            fs::write(tmpdir.path().join(DESCRIPTOR_FILE), descriptor.to_bytes())
                .map_err(|e| io_err("failed to write node descriptor", e))?;
        }

        let bytes = bincode::serialize(&result)
            .map_err(|e| io_err("failed to encode result", e))?;
        fs::write(tmpdir.path().join(RESULT_FILE), bytes)
            .map_err(|e| io_err("failed to write result", e))?;

        let state_dir = self.state_dir();
        if state_dir.exists() {
            fs::remove_dir_all(&state_dir)
                .map_err(|e| io_err("failed to remove previous state", e))?;
        }
        fs::rename(tmpdir.path(), &state_dir)
            .map_err(|e| io_err("failed to commit state", e))?;
        let _ = tmpdir.keep();
        log::debug!("recorded result for {}", self.node);

        let mut cell = self.cell.lock();
        cell.result = Some(result);
        cell.up_to_date = None;
        cell.timestamp = None;
        Ok(())
    }

    fn release(&self) {
        let mut cell = self.cell.lock();
        cell.result = None;
        cell.up_to_date = None;
    }

    fn is_up_to_date(&self) -> Result<bool, StateError> {
        if let Some(cached) = self.cell.lock().up_to_date {
            return Ok(cached);
        }
        let fresh = self.compute_up_to_date()?;
        self.cell.lock().up_to_date = Some(fresh);
        Ok(fresh)
    }

    fn timestamp(&self) -> Result<SystemTime, StateError> {
        if let Some(cached) = self.cell.lock().timestamp {
            return Ok(cached);
        }
        let mtime = fs::metadata(self.result_path())
            .and_then(|m| m.modified())
            .map_err(|_| StateError::NoTimestamp(self.node.to_string()))?;
        self.cell.lock().timestamp = Some(mtime);
        Ok(mtime)
    }

    fn workdir(&self) -> Result<Option<PathBuf>, StateError> {
        fs::create_dir_all(&self.workdir)
            .map_err(|e| io_err("failed to create workdir", e))?;
        Ok(Some(self.workdir.clone()))
    }
}
