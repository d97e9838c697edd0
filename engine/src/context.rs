// Copyright 2025 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::cell::Cell;
use std::path::PathBuf;
use std::sync::Arc;

use resource::{push_provider, PathProvider, ProviderGuard, ResourceProvider};
use state::{CachedStateDB, NamespaceGuard, StateNamespace};

use crate::EngineError;

///
/// The scoped bundle the runner needs: a state namespace (cached on disk by
/// default) and a stack of resource providers (a path provider by default).
/// Entering installs both for the current thread; everything unwinds in
/// reverse on every exit path. At most one context is active at a time.
///
pub struct YapeContext {
    pub state_namespace: Option<StateNamespace>,
    pub use_cached_state: bool,
    pub state_cache_path: Option<PathBuf>,
    pub providers: Vec<Arc<dyn ResourceProvider>>,
}

impl YapeContext {
    pub fn new() -> YapeContext {
        YapeContext {
            state_namespace: None,
            use_cached_state: true,
            state_cache_path: None,
            providers: vec![Arc::new(PathProvider::default())],
        }
    }

    ///
    /// A context whose states live in memory only; nothing is cached.
    ///
    pub fn in_memory() -> YapeContext {
        YapeContext {
            use_cached_state: false,
            ..YapeContext::new()
        }
    }

    pub fn with_namespace(mut self, namespace: StateNamespace) -> YapeContext {
        self.state_namespace = Some(namespace);
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> YapeContext {
        self.state_cache_path = Some(path.into());
        self
    }

    ///
    /// Replaces the provider list (the default path provider included).
    ///
    pub fn with_providers(mut self, providers: Vec<Arc<dyn ResourceProvider>>) -> YapeContext {
        self.providers = providers;
        self
    }

    pub fn push_provider(mut self, provider: Arc<dyn ResourceProvider>) -> YapeContext {
        self.providers.push(provider);
        self
    }

    fn namespace(&self) -> StateNamespace {
        if let Some(ns) = &self.state_namespace {
            return ns.clone();
        }
        if self.use_cached_state {
            let path = self
                .state_cache_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(state::DEFAULT_DB_DIR));
            StateNamespace::new(CachedStateDB::new(path).factory())
        } else {
            StateNamespace::in_memory()
        }
    }

    ///
    /// Installs the namespace and every provider for the current thread.
    ///
    pub fn enter(&self) -> Result<ContextGuard, EngineError> {
        if context_active() {
            return Err(EngineError::ContextActive);
        }

        let namespace_guard = self.namespace().enter()?;
        let provider_guards = self
            .providers
            .iter()
            .map(|p| push_provider(p.clone()))
            .collect();
        ACTIVE.with(|active| active.set(true));

        Ok(ContextGuard {
            _provider_guards: provider_guards,
            _namespace_guard: namespace_guard,
        })
    }
}

impl Default for YapeContext {
    fn default() -> YapeContext {
        YapeContext::new()
    }
}

///
/// RAII guard for an entered context. Field order is the unwind order:
/// providers pop before the namespace releases its states.
///
pub struct ContextGuard {
    _provider_guards: Vec<ProviderGuard>,
    _namespace_guard: NamespaceGuard,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.set(false));
    }
}

thread_local! {
    static ACTIVE: Cell<bool> = const { Cell::new(false) };
}

///
/// True while a YapeContext is entered on this thread.
///
pub fn context_active() -> bool {
    ACTIVE.with(|active| active.get())
}
