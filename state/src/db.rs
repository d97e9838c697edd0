// Copyright 2025 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use graph::{Node, NodeDescriptor};
use hashing::Digest;
use uuid::Uuid;

use crate::namespace::{descriptor_for, StateFactory};
use crate::{CachedState, State, StateError, DESCRIPTOR_FILE};

pub const DEFAULT_DB_DIR: &str = ".yape/cache";

///
/// A content-addressed store of per-node cache entries:
///
/// ```text
/// db_root/
///   entries/
///     <sha256 of the serialized node descriptor>/
///       <entry-uuid>/
///         node_descriptor.bin
///         statedir/...            # a CachedState path
/// ```
///
/// The bucket is the descriptor hash; the uuid entry within it exists so that
/// a hash collision stays recoverable in paranoid mode instead of silently
/// mixing two nodes' results.
///
pub struct CachedStateDB {
    path: PathBuf,
    hash_paranoid: bool,
}

impl CachedStateDB {
    pub fn new(path: impl AsRef<Path>) -> CachedStateDB {
        CachedStateDB {
            path: path.as_ref().to_path_buf(),
            hash_paranoid: false,
        }
    }

    ///
    /// In paranoid mode every bucket entry's stored descriptor is loaded and
    /// compared instead of trusting the hash.
    ///
    pub fn paranoid(mut self) -> CachedStateDB {
        self.hash_paranoid = true;
        self
    }

    ///
    /// The state factory to hand a `StateNamespace`.
    ///
    pub fn factory(self) -> StateFactory {
        let db = Arc::new(self);
        Arc::new(move |node: &Node| db.state_for(node))
    }

    pub fn state_for(&self, node: &Node) -> Result<Arc<dyn State>, StateError> {
        let entry_dir = self.find_entry_dir(node)?;
        // The bucket lookup already established that the stored descriptor
        // matches, so the state itself does not re-verify it.
        let state = CachedState::new(node.clone(), entry_dir.join("statedir"))
            .with_descriptor_path(entry_dir.join(DESCRIPTOR_FILE))
            .without_descriptor_check();
        Ok(Arc::new(state))
    }

    fn find_entry_dir(&self, node: &Node) -> Result<PathBuf, StateError> {
        let descriptor = descriptor_for(node);
        let bytes = descriptor.to_bytes();
        let bucket = Digest::of_bytes(&bytes).hash.to_hex();
        let bucket_dir = self.path.join("entries").join(bucket);

        let entry_dirs = list_entry_dirs(&bucket_dir)?;
        if self.hash_paranoid {
            for entry_dir in entry_dirs {
                let stored = fs::read(entry_dir.join(DESCRIPTOR_FILE))
                    .map_err(|e| StateError::Io(format!("failed to read entry descriptor: {e}")))?;
                let stored = NodeDescriptor::from_bytes(&stored).map_err(StateError::Io)?;
                if stored == *descriptor {
                    return Ok(entry_dir);
                }
            }
        } else {
            match entry_dirs.len() {
                0 => {}
                1 => return Ok(entry_dirs.into_iter().next().expect("checked length")),
                _ => {
                    return Err(StateError::Io(format!(
                        "more than one entry dir found for {node} in {}",
                        bucket_dir.display()
                    )));
                }
            }
        }

        // No entry yet: allocate one under a fresh uuid and record the
        // descriptor it stands for.
        let mut entry_dir = bucket_dir.join(Uuid::new_v4().to_string());
        while entry_dir.exists() {
            entry_dir = bucket_dir.join(Uuid::new_v4().to_string());
        }
        fs::create_dir_all(&entry_dir)
            .map_err(|e| StateError::Io(format!("failed to create cache entry: {e}")))?;
        fs::write(entry_dir.join(DESCRIPTOR_FILE), &bytes)
            .map_err(|e| StateError::Io(format!("failed to write entry descriptor: {e}")))?;
        Ok(entry_dir)
    }
}

fn list_entry_dirs(bucket_dir: &Path) -> Result<Vec<PathBuf>, StateError> {
    let read = match fs::read_dir(bucket_dir) {
        Ok(read) => read,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(StateError::Io(format!(
                "failed to list {}: {e}",
                bucket_dir.display()
            )));
        }
    };

    let mut dirs = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| StateError::Io(format!("failed to list bucket: {e}")))?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
