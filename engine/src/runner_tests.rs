// Copyright 2025 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fs_set_times::{set_mtime, SystemTimeSpec};
use graph::{
    call, path_in, resource, unset_value, value, CallArgs, Func, Graph, GraphError, Node, OpArg,
    Value,
};
use indexmap::IndexMap;
use resource::{path_request, PathProvider};
use state::StateNamespace;

use crate::{EngineError, RunResult, Runner, Targets, YapeContext};

fn test_context(dir: &Path) -> YapeContext {
    YapeContext::new()
        .with_cache_path(dir.join("cache"))
        .with_providers(vec![Arc::new(PathProvider::new(dir.join("paths")))])
}

fn counted<F>(name: &str, counter: &Arc<AtomicUsize>, f: F) -> Func
where
    F: Fn(CallArgs) -> Result<Value, String> + Send + Sync + 'static,
{
    let counter = counter.clone();
    Func::new(name, move |args| {
        counter.fetch_add(1, Ordering::SeqCst);
        f(args)
    })
}

fn sum_func(counter: &Arc<AtomicUsize>) -> Func {
    counted("sum", counter, |args: CallArgs| {
        let items = args.positional(0)?.as_list().unwrap_or(&[]).to_vec();
        Ok(Value::Int(items.iter().filter_map(|v| v.as_int()).sum()))
    })
}

fn mul_func(counter: &Arc<AtomicUsize>) -> Func {
    counted("mul", counter, |args: CallArgs| {
        let a = args.positional(0)?.as_int().ok_or("not an int")?;
        let b = args.positional(1)?.as_int().ok_or("not an int")?;
        Ok(Value::Int(a * b))
    })
}

fn run_target(target: &Node, graph: &Graph, context: &YapeContext) -> Result<Value, EngineError> {
    match Runner::new().run(&Targets::Node(target.clone()), Some(graph), Some(context), false, true)?
    {
        RunResult::Single(v) => Ok(v),
        other => panic!("expected a single result, got {other:?}"),
    }
}

fn pipeline(factor: i64, sums: &Arc<AtomicUsize>, muls: &Arc<AtomicUsize>) -> (Graph, Node) {
    let g = Graph::detached();
    let a = call(sum_func(sums), vec![OpArg::list(vec![1.into(), 2.into()])])
        .parent(&g)
        .name("a")
        .build()
        .unwrap();
    let b = call(mul_func(muls), vec![OpArg::Node(a), factor.into()])
        .parent(&g)
        .name("b")
        .build()
        .unwrap();
    (g, b)
}

#[test]
fn fresh_runs_cache_and_reruns_reuse() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let sums = Arc::new(AtomicUsize::new(0));
    let muls = Arc::new(AtomicUsize::new(0));

    let (g, b) = pipeline(3, &sums, &muls);
    assert_eq!(run_target(&b, &g, &ctx).unwrap(), Value::Int(9));
    assert_eq!(sums.load(Ordering::SeqCst), 1);
    assert_eq!(muls.load(Ordering::SeqCst), 1);

    // Unchanged graph, fresh context: everything is served from the cache.
    assert_eq!(run_target(&b, &g, &ctx).unwrap(), Value::Int(9));
    assert_eq!(sums.load(Ordering::SeqCst), 1);
    assert_eq!(muls.load(Ordering::SeqCst), 1);
}

#[test]
fn changed_constants_invalidate_only_the_subtree() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let sums = Arc::new(AtomicUsize::new(0));
    let muls = Arc::new(AtomicUsize::new(0));

    let (g, b) = pipeline(3, &sums, &muls);
    assert_eq!(run_target(&b, &g, &ctx).unwrap(), Value::Int(9));

    // Same pipeline with the factor changed: only the multiply re-runs.
    let (g2, b2) = pipeline(4, &sums, &muls);
    assert_eq!(run_target(&b2, &g2, &ctx).unwrap(), Value::Int(12));
    assert_eq!(sums.load(Ordering::SeqCst), 1);
    assert_eq!(muls.load(Ordering::SeqCst), 2);
}

#[test]
fn touched_inputs_invalidate_path_consumers() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let input = dir.path().join("input.txt");
    fs::write(&input, b"v1").unwrap();

    let reads = Arc::new(AtomicUsize::new(0));
    let read_func = counted("read_input", &reads, |args: CallArgs| {
        let path = args.positional(0)?.as_path().ok_or("not a path")?;
        let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
        Ok(Value::Str(content))
    });

    let g = Graph::detached();
    let c = call(read_func, vec![path_in(&input)])
        .parent(&g)
        .name("c")
        .build()
        .unwrap();

    assert_eq!(run_target(&c, &g, &ctx).unwrap(), Value::Str("v1".to_owned()));
    assert_eq!(run_target(&c, &g, &ctx).unwrap(), Value::Str("v1".to_owned()));
    assert_eq!(reads.load(Ordering::SeqCst), 1);

    // Touching the input forward re-executes the consumer.
    set_mtime(
        &input,
        SystemTimeSpec::Absolute(SystemTime::now() + Duration::from_secs(60)),
    )
    .unwrap();
    assert_eq!(run_target(&c, &g, &ctx).unwrap(), Value::Str("v1".to_owned()));
    assert_eq!(reads.load(Ordering::SeqCst), 2);
}

#[test]
fn cycles_surface_from_run() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());

    let g = Graph::detached();
    let a = unset_value().parent(&g).name("a").build().unwrap();
    let b = call(Func::new("id", |args: CallArgs| Ok(args.positional(0)?.clone())), vec![
        OpArg::Node(a.clone()),
    ])
    .parent(&g)
    .name("b")
    .build()
    .unwrap();
    a.set_value(OpArg::Node(b)).unwrap();

    let err = Runner::new()
        .run(&Targets::Node(a), Some(&g), Some(&ctx), false, true)
        .unwrap_err();
    match err {
        EngineError::Graph(GraphError::Cycle(path)) => {
            assert!(path.iter().any(|n| n.contains('a')), "path was {path:?}");
            assert!(path.iter().any(|n| n.contains('b')), "path was {path:?}");
        }
        other => panic!("expected a cycle error, got {other}"),
    }
}

#[test]
fn resources_recreate_when_deleted_externally() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let writes = Arc::new(AtomicUsize::new(0));

    let write_func = counted("write_marker", &writes, |args: CallArgs| {
        let target = args.positional(0)?.as_path().ok_or("not a path")?.clone();
        fs::create_dir_all(&target).map_err(|e| e.to_string())?;
        fs::write(target.join("marker"), b"made").map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let g = Graph::detached();
    let res = resource(path_request()).parent(&g).name("scratch").build().unwrap();
    let writer = call(write_func, vec![graph::resource_out(&res)])
        .parent(&g)
        .name("writer")
        .build()
        .unwrap();

    let entries = dir.path().join("paths").join("entries");
    let list_entries = || -> Vec<std::path::PathBuf> {
        match fs::read_dir(&entries) {
            Ok(read) => read.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    };

    Runner::new()
        .run(&Targets::Node(writer.clone()), Some(&g), Some(&ctx), false, false)
        .unwrap();
    assert_eq!(writes.load(Ordering::SeqCst), 1);
    let first_entries = list_entries();
    assert_eq!(first_entries.len(), 1);
    assert!(first_entries[0].join("resource").join("marker").is_file());

    // Cached: nothing re-runs, nothing new is allocated.
    Runner::new()
        .run(&Targets::Node(writer.clone()), Some(&g), Some(&ctx), false, false)
        .unwrap();
    assert_eq!(writes.load(Ordering::SeqCst), 1);
    assert_eq!(list_entries().len(), 1);

    // Deleting the allocation on disk makes the provider report the handle
    // gone, so the resource and its writer both re-run under a fresh uuid.
    fs::remove_dir_all(&first_entries[0]).unwrap();
    Runner::new()
        .run(&Targets::Node(writer), Some(&g), Some(&ctx), false, false)
        .unwrap();
    assert_eq!(writes.load(Ordering::SeqCst), 2);
    let second_entries = list_entries();
    assert_eq!(second_entries.len(), 1);
    assert_ne!(second_entries[0], first_entries[0]);
}

#[test]
fn released_intermediates_drop_their_results() {
    let ns = StateNamespace::in_memory();
    let _guard = ns.enter().unwrap();

    let g = Graph::detached();
    let a = value(1).parent(&g).name("a").build().unwrap();
    let b = call(
        Func::new("id", |args: CallArgs| Ok(args.positional(0)?.clone())),
        vec![OpArg::Node(a.clone())],
    )
    .parent(&g)
    .name("b")
    .build()
    .unwrap();

    let result = Runner::new()
        .run(&Targets::Node(b.clone()), Some(&g), None, false, true)
        .unwrap();
    assert_eq!(result, RunResult::Single(Value::Int(1)));

    // The last dependant of `a` consumed it; its purely in-memory result is
    // gone, while the target keeps its own.
    assert!(!ns.state(&a).unwrap().has_result());
    assert!(ns.state(&b).unwrap().has_result());
}

#[test]
fn force_reruns_up_to_date_targets() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let sums = Arc::new(AtomicUsize::new(0));
    let muls = Arc::new(AtomicUsize::new(0));

    let (g, b) = pipeline(3, &sums, &muls);
    run_target(&b, &g, &ctx).unwrap();
    assert_eq!(muls.load(Ordering::SeqCst), 1);

    // Forced: the target re-runs, its cached dependency does not.
    Runner::new()
        .run(&Targets::Node(b), Some(&g), Some(&ctx), true, false)
        .unwrap();
    assert_eq!(muls.load(Ordering::SeqCst), 2);
    assert_eq!(sums.load(Ordering::SeqCst), 1);
}

#[test]
fn result_shapes_follow_the_targets() {
    let ns = StateNamespace::in_memory();
    let _guard = ns.enter().unwrap();

    let g = Graph::detached();
    let a = value(1).parent(&g).name("a").build().unwrap();
    let b = value(2).parent(&g).name("b").build().unwrap();

    let tuple = Runner::new()
        .run(&Targets::Seq(vec![(&a).into(), (&b).into()]), Some(&g), None, false, true)
        .unwrap();
    assert_eq!(
        tuple,
        RunResult::Tuple(vec![Value::Int(1), Value::Int(2)])
    );

    let mut labelled = IndexMap::new();
    labelled.insert("left".to_owned(), (&a).into());
    labelled.insert("right".to_owned(), (&b).into());
    let map = Runner::new()
        .run(&Targets::Map(labelled), Some(&g), None, false, true)
        .unwrap();
    let expected: IndexMap<String, Value> = [
        ("left".to_owned(), Value::Int(1)),
        ("right".to_owned(), Value::Int(2)),
    ]
    .into_iter()
    .collect();
    assert_eq!(map, RunResult::Map(expected));

    let by_name = Runner::new()
        .run(&Targets::Name("a".to_owned()), Some(&g), None, false, true)
        .unwrap();
    assert_eq!(by_name, RunResult::Single(Value::Int(1)));

    let silent = Runner::new()
        .run(&Targets::Node(a), Some(&g), None, false, false)
        .unwrap();
    assert_eq!(silent, RunResult::None);
}

#[test]
fn all_targets_run_every_node() {
    let ns = StateNamespace::in_memory();
    let _guard = ns.enter().unwrap();

    let g = Graph::detached();
    let a = value(1).parent(&g).name("a").build().unwrap();
    let b = value(2).parent(&g).name("b").build().unwrap();

    let result = Runner::new()
        .run(&Targets::All, Some(&g), None, false, true)
        .unwrap();
    assert_eq!(
        result,
        RunResult::Tuple(vec![Value::Int(1), Value::Int(2)])
    );
    assert!(ns.state(&a).unwrap().has_result());
    assert!(ns.state(&b).unwrap().has_result());
}

#[test]
fn empty_target_sequences_run_nothing() {
    let ns = StateNamespace::in_memory();
    let _guard = ns.enter().unwrap();

    let g = Graph::detached();
    value(1).parent(&g).name("a").build().unwrap();

    let result = Runner::new()
        .run(&Targets::Seq(Vec::new()), Some(&g), None, false, true)
        .unwrap();
    assert_eq!(result, RunResult::Tuple(Vec::new()));
}

#[test]
fn unset_values_resolve_to_null() {
    let ns = StateNamespace::in_memory();
    let _guard = ns.enter().unwrap();

    let g = Graph::detached();
    let cell = unset_value().parent(&g).name("cell").build().unwrap();
    let result = Runner::new()
        .run(&Targets::Node(cell), Some(&g), None, false, true)
        .unwrap();
    assert_eq!(result, RunResult::Single(Value::Null));
}

#[test]
fn ctx_provides_a_workdir() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());

    let probe = Func::new("probe_ctx", |args: CallArgs| {
        let ctx = args.positional(0)?.as_context().ok_or("not a context")?;
        let workdir = ctx.workdir.clone().ok_or("no workdir")?;
        if !workdir.is_dir() {
            return Err("workdir was not created".to_owned());
        }
        Ok(Value::Path(workdir))
    });

    let g = Graph::detached();
    let node = call(probe, vec![OpArg::Ctx]).parent(&g).name("probe").build().unwrap();
    match run_target(&node, &g, &ctx).unwrap() {
        Value::Path(p) => assert!(p.starts_with(dir.path().join("cache"))),
        other => panic!("expected a path, got {other:?}"),
    }
}

#[test]
fn saved_graphs_reuse_the_same_cache() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let graph_file = dir.path().join("yp.graph");

    let adds = Arc::new(AtomicUsize::new(0));
    {
        let adds = adds.clone();
        graph::register("runner_tests::add", move |args: CallArgs| {
            adds.fetch_add(1, Ordering::SeqCst);
            let a = args.positional(0)?.as_int().ok_or("not an int")?;
            let b = args.positional(1)?.as_int().ok_or("not an int")?;
            Ok(Value::Int(a + b))
        });
    }

    let g = Graph::detached();
    let a = call(Func::named("runner_tests::add"), vec![2.into(), 3.into()])
        .parent(&g)
        .name("a")
        .build()
        .unwrap();
    g.save(&graph_file).unwrap();

    assert_eq!(run_target(&a, &g, &ctx).unwrap(), Value::Int(5));
    assert_eq!(adds.load(Ordering::SeqCst), 1);

    // The loaded copy has an equal descriptor, so it hits the same cache
    // entry and nothing re-executes.
    let loaded = Graph::load(&graph_file).unwrap();
    let loaded_a = loaded.node("a").unwrap();
    assert_eq!(run_target(&loaded_a, &loaded, &ctx).unwrap(), Value::Int(5));
    assert_eq!(adds.load(Ordering::SeqCst), 1);
}

#[test]
fn execution_errors_propagate_and_abort() {
    let ns = StateNamespace::in_memory();
    let _guard = ns.enter().unwrap();

    let g = Graph::detached();
    let boom = call(
        Func::new("boom", |_| Err("deliberate failure".to_owned())),
        vec![],
    )
    .parent(&g)
    .name("boom")
    .build()
    .unwrap();

    let err = Runner::new()
        .run(&Targets::Node(boom.clone()), Some(&g), None, false, true)
        .unwrap_err();
    assert_eq!(err, EngineError::Execution("deliberate failure".to_owned()));
    assert!(!ns.state(&boom).unwrap().has_result());
}
