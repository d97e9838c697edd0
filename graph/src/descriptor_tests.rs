// Copyright 2024 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use crate::descriptor::{node_descriptor, DescriptorCache, DescriptorEvent};
use crate::func::Func;
use crate::node::{call, data, data_with_id, resource, value, Graph};
use crate::nodeop::{resource_out, OpArg, ResourceRequest};
use crate::value::Value;

fn noop() -> Func {
    Func::new("noop", |_| Ok(Value::Null))
}

#[test]
fn data_with_id_ignores_the_payload() {
    let a = data_with_id(1, "dataset").detached().build().unwrap();
    let b = data_with_id(2, "dataset").detached().build().unwrap();
    assert_eq!(node_descriptor(&a, None), node_descriptor(&b, None));
}

#[test]
fn data_with_distinct_ids_differ() {
    let a = data_with_id(1, "x").detached().build().unwrap();
    let b = data_with_id(1, "y").detached().build().unwrap();
    assert_ne!(node_descriptor(&a, None), node_descriptor(&b, None));
}

#[test]
fn data_without_id_participates_by_value() {
    let a = data(1).detached().build().unwrap();
    let b = data(2).detached().build().unwrap();
    assert_ne!(node_descriptor(&a, None), node_descriptor(&b, None));
}

#[test]
fn structurally_equal_nodes_have_equal_descriptors() {
    let mk = || {
        let dep = data(7).detached().build().unwrap();
        call(noop(), vec![OpArg::Node(dep), OpArg::from(3)])
            .detached()
            .build()
            .unwrap()
    };
    assert_eq!(node_descriptor(&mk(), None), node_descriptor(&mk(), None));
}

#[test]
fn dependency_descriptors_are_inlined() {
    let mk = |payload: i64| {
        let dep = data(payload).detached().build().unwrap();
        call(noop(), vec![OpArg::Node(dep)])
            .detached()
            .build()
            .unwrap()
    };
    // A change in a dependency's payload must show up in the dependant's
    // descriptor.
    assert_ne!(node_descriptor(&mk(1), None), node_descriptor(&mk(2), None));
}

#[test]
fn path_declarations_enter_the_descriptor() {
    let g1 = Graph::detached();
    let g2 = Graph::detached();
    let a = value(1).parent(&g1).pathout("a.bin").build().unwrap();
    let b = value(1).parent(&g2).pathout("b.bin").build().unwrap();
    assert_ne!(node_descriptor(&a, None), node_descriptor(&b, None));
}

#[test]
fn producer_descriptors_terminate() {
    let g = Graph::detached();
    let res = resource(ResourceRequest::new("path"))
        .parent(&g)
        .build()
        .unwrap();
    let _producer = call(noop(), vec![resource_out(&res)])
        .parent(&g)
        .build()
        .unwrap();

    let descriptor = node_descriptor(&res, None);
    // The producer's reference back to the resource is cut with a marker
    // rather than recursing.
    assert!(descriptor.0.iter().any(|e| matches!(
        e,
        DescriptorEvent::ResourceProducers(producers)
            if producers.iter().any(|p| p.0.contains(&DescriptorEvent::ProducedResource))
    )));
}

#[test]
fn producers_change_the_resource_descriptor() {
    let mk = |with_producer: bool| {
        let g = Graph::detached();
        let res = resource(ResourceRequest::new("path"))
            .parent(&g)
            .build()
            .unwrap();
        if with_producer {
            call(noop(), vec![resource_out(&res)])
                .parent(&g)
                .build()
                .unwrap();
        }
        node_descriptor(&res, None).clone()
    };
    assert_ne!(mk(false), mk(true));
}

#[test]
fn byte_form_is_stable_for_equal_descriptors() {
    let mk = || data(99).detached().build().unwrap();
    let d1 = node_descriptor(&mk(), None);
    let d2 = node_descriptor(&mk(), None);
    assert_eq!(d1.to_bytes(), d2.to_bytes());
    assert_eq!(d1.digest(), d2.digest());
}

#[test]
fn cache_returns_the_same_descriptor_instance() {
    let cache = DescriptorCache::new();
    let node = data(1).detached().build().unwrap();
    let d1 = node_descriptor(&node, Some(&cache));
    let d2 = node_descriptor(&node, Some(&cache));
    assert!(std::sync::Arc::ptr_eq(&d1, &d2));
}

#[test]
fn value_ops_are_never_cached() {
    let cache = DescriptorCache::new();
    let node = value(1).detached().build().unwrap();
    let before = node_descriptor(&node, Some(&cache));
    node.set_value(2).unwrap();
    let after = node_descriptor(&node, Some(&cache));
    assert_ne!(before, after);
}
