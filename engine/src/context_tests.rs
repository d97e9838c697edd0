// Copyright 2025 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use std::sync::Arc;

use resource::{path_request, PathProvider};
use state::StateNamespace;

use crate::{context_active, EngineError, YapeContext};

fn test_context(dir: &std::path::Path) -> YapeContext {
    YapeContext::new()
        .with_cache_path(dir.join("cache"))
        .with_providers(vec![Arc::new(PathProvider::new(dir.join("paths")))])
}

#[test]
fn enter_installs_namespace_and_providers() {
    let dir = tempfile::tempdir().unwrap();
    assert!(!context_active());
    {
        let _guard = test_context(dir.path()).enter().unwrap();
        assert!(context_active());
        assert!(state::current_namespace().is_some());
        assert!(resource::get_provider(&path_request()).is_ok());
    }
    assert!(!context_active());
    assert!(state::current_namespace().is_none());
    assert!(resource::get_provider(&path_request()).is_err());
}

#[test]
fn contexts_do_not_nest() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let other = test_context(dir.path());

    let _guard = ctx.enter().unwrap();
    assert_eq!(other.enter().err(), Some(EngineError::ContextActive));
    // The failed attempt must leave the first context installed.
    assert!(context_active());
    assert!(state::current_namespace().is_some());
}

#[test]
fn an_explicit_namespace_wins_over_the_cache_settings() {
    let ns = StateNamespace::in_memory();
    let ctx = YapeContext::new()
        .with_namespace(ns.clone())
        .with_providers(Vec::new());

    let _guard = ctx.enter().unwrap();
    let node = graph::data(1).detached().build().unwrap();
    // The installed namespace is the supplied one: its states are the pure
    // in-memory kind, which is never up to date.
    let state = state::get_state(&node).unwrap();
    assert_eq!(state.is_up_to_date(), Ok(false));
}

#[test]
fn a_context_can_be_reentered_after_exit() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    {
        let _guard = ctx.enter().unwrap();
    }
    let _guard = ctx.enter().unwrap();
    assert!(context_active());
}
