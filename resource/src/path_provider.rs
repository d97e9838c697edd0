// Copyright 2024 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fs;
use std::path::{Path, PathBuf};

use graph::{ResourceRequest, Value};
use uuid::Uuid;

use crate::{ResourceError, ResourceProvider};

pub const PATH_KIND: &str = "path";

pub const DEFAULT_PATH_PROVIDER_BASE: &str = ".yape/paths";

///
/// The request answered by `PathProvider`: a managed filesystem location the
/// node may write into.
///
pub fn path_request() -> ResourceRequest {
    ResourceRequest::new(PATH_KIND)
}

///
/// Manages uuid-named directories under a base path. The layout is
/// `base/entries/<uuid>/resource`: the uuid container is allocated on create,
/// and `resolve` returns the `resource` child, which is the path the owning
/// node is expected to write.
///
pub struct PathProvider {
    base: PathBuf,
}

impl PathProvider {
    pub fn new(base: impl AsRef<Path>) -> PathProvider {
        PathProvider {
            base: base.as_ref().to_path_buf(),
        }
    }

    fn entries_dir(&self, create: bool) -> Result<PathBuf, ResourceError> {
        let dir = self.base.join("entries");
        if create {
            fs::create_dir_all(&dir)
                .map_err(|e| ResourceError::Io(format!("failed to create {}: {e}", dir.display())))?;
        }
        Ok(dir)
    }

    fn entry_dir(&self, handle: &Value) -> Result<PathBuf, ResourceError> {
        let id = handle
            .as_str()
            .ok_or_else(|| ResourceError::BadHandle(format!("expected a string, got {handle:?}")))?;
        Ok(self.entries_dir(false)?.join(id))
    }
}

impl Default for PathProvider {
    fn default() -> PathProvider {
        PathProvider::new(DEFAULT_PATH_PROVIDER_BASE)
    }
}

impl ResourceProvider for PathProvider {
    fn matches(&self, request: &ResourceRequest) -> bool {
        request.kind == PATH_KIND
    }

    fn create(&self, _request: &ResourceRequest) -> Result<Value, ResourceError> {
        let entries = self.entries_dir(true)?;
        // Retry on the (unlikely) uuid collision rather than reusing a
        // directory some other entry owns.
        loop {
            let handle = Uuid::new_v4().to_string();
            let dir = entries.join(&handle);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    log::debug!("allocated path resource {handle}");
                    return Ok(Value::Str(handle));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(ResourceError::Io(format!(
                        "failed to create {}: {e}",
                        dir.display()
                    )));
                }
            }
        }
    }

    fn delete(&self, handle: &Value) -> Result<(), ResourceError> {
        let dir = self.entry_dir(handle)?;
        fs::remove_dir_all(&dir)
            .map_err(|e| ResourceError::Io(format!("failed to remove {}: {e}", dir.display())))
    }

    fn exists(&self, handle: &Value) -> Result<bool, ResourceError> {
        Ok(self.entry_dir(handle)?.exists())
    }

    fn resolve(&self, handle: &Value) -> Result<Value, ResourceError> {
        Ok(Value::Path(self.entry_dir(handle)?.join("resource")))
    }
}
