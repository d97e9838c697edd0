// Copyright 2024 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The operator resolver: the second walk over an operator, substituting
//! computed dependency results, materialized paths and the execution context
//! into the arguments, producing an operator that is ready to run.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::node::Node;
use crate::nodeop::{NodeOp, OpArg, ResourceRequest};
use crate::value::Value;
use crate::walk::{identity, IdKey};

///
/// What the resolver needs from its surroundings: results of already-executed
/// nodes, resolved resource values, and the per-node execution context.
/// The runner implements this over the active state namespace and provider
/// stack.
///
pub trait ResolveEnv {
    fn node_result(&self, node: &Node) -> Result<Value, String>;
    fn resource_value(&self, node: &Node) -> Result<Value, String>;
    fn context_value(&self) -> Result<Value, String>;
}

///
/// A hook that may short-circuit the resolution of any single argument.
/// Graph rewriters use this to remap node references onto replacement nodes.
///
pub type CustomResolver<'a> = dyn Fn(&OpArg) -> Option<Value> + 'a;

///
/// An operator whose arguments are concrete values, ready for `run_op`.
///
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedOp {
    Data(Value),
    Value(Value),
    GetItem { obj: Value, key: Value },
    GetAttr { obj: Value, name: String },
    Call {
        func: Value,
        args: Vec<Value>,
        kwargs: IndexMap<String, Value>,
    },
    Resource { request: ResourceRequest },
}

///
/// Resolves every argument of `op`. Aliased containers resolve once and reuse
/// the first resolution, mirroring the walk protocol's ValueId/Ref table.
///
pub fn resolve_op(
    op: &NodeOp,
    env: &dyn ResolveEnv,
    custom: Option<&CustomResolver>,
) -> Result<ResolvedOp, String> {
    let mut memo: HashMap<IdKey, Value> = HashMap::new();
    let resolved = match op {
        NodeOp::Data { payload, .. } => ResolvedOp::Data(payload.clone()),
        NodeOp::Value(v) => ResolvedOp::Value(resolve_value(v, env, custom, &mut memo)?),
        NodeOp::GetItem { obj, key } => ResolvedOp::GetItem {
            obj: resolve_value(obj, env, custom, &mut memo)?,
            key: resolve_value(key, env, custom, &mut memo)?,
        },
        NodeOp::GetAttr { obj, name } => ResolvedOp::GetAttr {
            obj: resolve_value(obj, env, custom, &mut memo)?,
            name: name.clone(),
        },
        NodeOp::Call { func, args, kwargs } => {
            let func = resolve_value(func, env, custom, &mut memo)?;
            let args = args
                .iter()
                .map(|a| resolve_value(a, env, custom, &mut memo))
                .collect::<Result<Vec<_>, _>>()?;
            let kwargs = kwargs
                .iter()
                .map(|(k, a)| Ok((k.clone(), resolve_value(a, env, custom, &mut memo)?)))
                .collect::<Result<IndexMap<_, _>, String>>()?;
            ResolvedOp::Call { func, args, kwargs }
        }
        NodeOp::Resource { request } => ResolvedOp::Resource {
            request: request.clone(),
        },
    };
    Ok(resolved)
}

fn resolve_value(
    arg: &OpArg,
    env: &dyn ResolveEnv,
    custom: Option<&CustomResolver>,
    memo: &mut HashMap<IdKey, Value>,
) -> Result<Value, String> {
    if let Some(custom) = custom {
        if let Some(value) = custom(arg) {
            return Ok(value);
        }
    }

    let key = identity(arg);
    if let Some(key) = key {
        if let Some(found) = memo.get(&key) {
            return Ok(found.clone());
        }
    }

    let value = match arg {
        OpArg::Value(v) => v.clone(),
        OpArg::Node(n) => env.node_result(n)?,
        OpArg::PathIn(p) | OpArg::PathOut(p) => Value::Path(p.clone()),
        OpArg::ResourceIn(n) | OpArg::ResourceOut(n) => env.resource_value(n)?,
        OpArg::Ctx => env.context_value()?,
        OpArg::Unset => Value::Null,
        OpArg::Func(f) => Value::Func(f.clone()),
        OpArg::List(items) | OpArg::Tuple(items) => Value::List(
            items
                .iter()
                .map(|item| resolve_value(item, env, custom, memo))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        OpArg::Dict(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), resolve_value(v, env, custom, memo)?)))
                .collect::<Result<IndexMap<_, _>, String>>()?,
        ),
    };

    if let Some(key) = key {
        memo.insert(key, value.clone());
    }
    Ok(value)
}

///
/// A resolve environment for operators that reference no nodes, resources or
/// context; useful for rewriters and tests.
///
pub struct EmptyEnv;

impl ResolveEnv for EmptyEnv {
    fn node_result(&self, node: &Node) -> Result<Value, String> {
        Err(format!("no result available for node {node}"))
    }

    fn resource_value(&self, node: &Node) -> Result<Value, String> {
        Err(format!("no resource value available for node {node}"))
    }

    fn context_value(&self) -> Result<Value, String> {
        Err("no execution context available".to_owned())
    }
}

impl ResolvedOp {
    pub fn type_name(&self) -> &'static str {
        match self {
            ResolvedOp::Data(_) => "Data",
            ResolvedOp::Value(_) => "Value",
            ResolvedOp::GetItem { .. } => "GetItem",
            ResolvedOp::GetAttr { .. } => "GetAttr",
            ResolvedOp::Call { .. } => "Call",
            ResolvedOp::Resource { .. } => "Resource",
        }
    }
}
