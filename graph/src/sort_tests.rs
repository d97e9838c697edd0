// Copyright 2024 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use crate::func::Func;
use crate::node::{call, unset_value, value, Graph, Node};
use crate::nodeop::OpArg;
use crate::sort::topological_sort;
use crate::value::Value;
use crate::GraphError;

fn noop() -> Func {
    Func::new("noop", |_| Ok(Value::Null))
}

fn position(order: &[Node], node: &Node) -> usize {
    order
        .iter()
        .position(|n| n == node)
        .unwrap_or_else(|| panic!("{node} missing from the order"))
}

#[test]
fn dependencies_precede_dependants() {
    let g = Graph::detached();
    let a = value(1).parent(&g).build().unwrap();
    let b = call(noop(), vec![OpArg::Node(a.clone())])
        .parent(&g)
        .build()
        .unwrap();
    let c = call(noop(), vec![OpArg::Node(b.clone())])
        .parent(&g)
        .build()
        .unwrap();

    let (order, _) = topological_sort(&[c.clone()]).unwrap();
    assert_eq!(order.len(), 3);
    assert!(position(&order, &a) < position(&order, &b));
    assert!(position(&order, &b) < position(&order, &c));
}

#[test]
fn diamonds_execute_each_node_once() {
    let g = Graph::detached();
    let base = value(1).parent(&g).build().unwrap();
    let left = call(noop(), vec![OpArg::Node(base.clone())])
        .parent(&g)
        .build()
        .unwrap();
    let right = call(noop(), vec![OpArg::Node(base.clone())])
        .parent(&g)
        .build()
        .unwrap();
    let top = call(
        noop(),
        vec![OpArg::Node(left.clone()), OpArg::Node(right.clone())],
    )
    .parent(&g)
    .build()
    .unwrap();

    let (order, counts) = topological_sort(&[top.clone()]).unwrap();
    assert_eq!(order.len(), 4);
    assert!(position(&order, &base) < position(&order, &left));
    assert!(position(&order, &base) < position(&order, &right));
    // Two dependants saw `base`; one each saw `left` and `right`.
    assert_eq!(counts.get(&base), Some(&2));
    assert_eq!(counts.get(&left), Some(&1));
    assert_eq!(counts.get(&right), Some(&1));
    assert_eq!(counts.get(&top), None);
}

#[test]
fn duplicate_edges_are_folded() {
    let g = Graph::detached();
    let a = value(1).parent(&g).build().unwrap();
    let b = call(noop(), vec![OpArg::Node(a.clone()), OpArg::Node(a.clone())])
        .parent(&g)
        .build()
        .unwrap();

    let (_, counts) = topological_sort(&[b]).unwrap();
    assert_eq!(counts.get(&a), Some(&1));
}

#[test]
fn repeated_sorts_are_deterministic() {
    let g = Graph::detached();
    let mut tips = Vec::new();
    for _ in 0..3 {
        let base = value(1).parent(&g).build().unwrap();
        let mid = call(noop(), vec![OpArg::Node(base)]).parent(&g).build().unwrap();
        tips.push(mid);
    }
    let targets: Vec<Node> = tips;
    let (first, _) = topological_sort(&targets).unwrap();
    let (second, _) = topological_sort(&targets).unwrap();
    assert_eq!(first, second);
}

#[test]
fn cycles_fail_with_the_offending_path() {
    let g = Graph::detached();
    let a = unset_value().parent(&g).name("a").build().unwrap();
    let b = call(noop(), vec![OpArg::Node(a.clone())])
        .parent(&g)
        .name("b")
        .build()
        .unwrap();
    a.set_value(OpArg::Node(b.clone())).unwrap();

    let err = topological_sort(&[a]).unwrap_err();
    match err {
        GraphError::Cycle(path) => {
            assert!(path.contains(&"a".to_owned()), "path was {path:?}");
            assert!(path.contains(&"b".to_owned()), "path was {path:?}");
        }
        other => panic!("expected a cycle error, got {other}"),
    }
}

#[test]
fn targets_already_sorted_stay_sorted() {
    let g = Graph::detached();
    let a = value(1).parent(&g).build().unwrap();
    let b = call(noop(), vec![OpArg::Node(a.clone())])
        .parent(&g)
        .build()
        .unwrap();

    // Passing both endpoints as targets must not duplicate nodes.
    let (order, _) = topological_sort(&[a.clone(), b.clone()]).unwrap();
    assert_eq!(order.len(), 2);
    let (order, _) = topological_sort(&[b, a]).unwrap();
    assert_eq!(order.len(), 2);
}
