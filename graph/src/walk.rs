// Copyright 2024 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The walk protocol: a deterministic, finite stream of typed events
//! describing an operator and every argument reachable through its containers.
//! Aliased substructure is canonicalized with ValueId/Ref events so that
//! equality of two streams implies equivalent argument graphs.

use std::path::PathBuf;
use std::sync::Arc;

use fnv::FnvHashMap;

use crate::func::FuncSpec;
use crate::node::Node;
use crate::nodeop::{NodeOp, OpArg};
use crate::value::Value;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// The head of every stream: the operator's type name.
    OpType(&'static str),
    /// The single event following OpType for Data operators, which bypass the
    /// generic value walk.
    DataOp {
        payload: Value,
        id: Option<String>,
    },
    /// First visit of a value; all following events up to the matching point
    /// in the stream describe it.
    ValueId(u32),
    /// Repeat visit of an already-walked value.
    Ref(u32),
    PathIn(PathBuf),
    PathOut(PathBuf),
    ResourceIn(Node),
    ResourceOut(Node),
    Node(Node),
    Ctx,
    Unset,
    List(usize),
    Tuple(usize),
    /// Keys in insertion order; followed by one value stream per key.
    Dict(Vec<String>),
    Func(FuncSpec),
    /// Any remaining leaf value.
    Other(Value),
}

///
/// Produces the event stream for an operator.
///
pub fn walk(op: &NodeOp) -> Vec<Event> {
    let mut out = Vec::new();
    let mut table = IdTable::default();
    out.push(Event::OpType(op.type_name()));
    match op {
        NodeOp::Data { payload, id } => {
            out.push(Event::DataOp {
                payload: payload.clone(),
                id: id.clone(),
            });
        }
        NodeOp::Value(v) => walk_value(v, &mut table, &mut out),
        NodeOp::GetItem { obj, key } => {
            walk_value(obj, &mut table, &mut out);
            walk_value(key, &mut table, &mut out);
        }
        NodeOp::GetAttr { obj, name } => {
            walk_value(obj, &mut table, &mut out);
            let name_arg = OpArg::Value(Value::Str(name.clone()));
            walk_value(&name_arg, &mut table, &mut out);
        }
        NodeOp::Call { func, args, kwargs } => {
            walk_value(func, &mut table, &mut out);
            out.push(Event::ValueId(table.fresh()));
            out.push(Event::Tuple(args.len()));
            for arg in args {
                walk_value(arg, &mut table, &mut out);
            }
            out.push(Event::ValueId(table.fresh()));
            out.push(Event::Dict(kwargs.keys().cloned().collect()));
            for arg in kwargs.values() {
                walk_value(arg, &mut table, &mut out);
            }
        }
        NodeOp::Resource { request } => {
            let request_arg = OpArg::Value(request.to_value());
            walk_value(&request_arg, &mut table, &mut out);
        }
    }
    out
}

///
/// Identity of an argument for the purposes of aliasing detection. Only
/// Arc-shared containers and node handles have object identity; plain leaves
/// are distinct objects at every occurrence.
///
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub(crate) enum IdKey {
    Container(usize),
    Node(usize),
}

pub(crate) fn identity(arg: &OpArg) -> Option<IdKey> {
    match arg {
        OpArg::Node(n) => Some(IdKey::Node(n.id())),
        OpArg::List(items) | OpArg::Tuple(items) => {
            Some(IdKey::Container(Arc::as_ptr(items) as usize))
        }
        OpArg::Dict(entries) => Some(IdKey::Container(Arc::as_ptr(entries) as *const () as usize)),
        _ => None,
    }
}

#[derive(Default)]
struct IdTable {
    next: u32,
    seen: FnvHashMap<IdKey, u32>,
}

impl IdTable {
    fn fresh(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Ok(fresh id) on a first visit, Err(previous id) on a repeat visit of
    /// an identity that was already walked.
    fn visit(&mut self, key: Option<IdKey>) -> Result<u32, u32> {
        match key {
            Some(key) => {
                if let Some(&id) = self.seen.get(&key) {
                    return Err(id);
                }
                let id = self.fresh();
                self.seen.insert(key, id);
                Ok(id)
            }
            None => Ok(self.fresh()),
        }
    }
}

fn walk_value(arg: &OpArg, table: &mut IdTable, out: &mut Vec<Event>) {
    let id = match table.visit(identity(arg)) {
        Ok(id) => id,
        Err(id) => {
            out.push(Event::Ref(id));
            return;
        }
    };
    out.push(Event::ValueId(id));

    match arg {
        OpArg::Value(v) => out.push(Event::Other(v.clone())),
        OpArg::Node(n) => out.push(Event::Node(n.clone())),
        OpArg::PathIn(p) => out.push(Event::PathIn(p.clone())),
        OpArg::PathOut(p) => out.push(Event::PathOut(p.clone())),
        OpArg::ResourceIn(n) => out.push(Event::ResourceIn(n.clone())),
        OpArg::ResourceOut(n) => out.push(Event::ResourceOut(n.clone())),
        OpArg::Ctx => out.push(Event::Ctx),
        OpArg::Unset => out.push(Event::Unset),
        OpArg::Func(f) => out.push(Event::Func(f.spec())),
        OpArg::List(items) => {
            out.push(Event::List(items.len()));
            for item in items.iter() {
                walk_value(item, table, out);
            }
        }
        OpArg::Tuple(items) => {
            out.push(Event::Tuple(items.len()));
            for item in items.iter() {
                walk_value(item, table, out);
            }
        }
        OpArg::Dict(entries) => {
            out.push(Event::Dict(entries.keys().cloned().collect()));
            for value in entries.values() {
                walk_value(value, table, out);
            }
        }
    }
}
