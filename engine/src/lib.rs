// Copyright 2025 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

mod context;
#[cfg(test)]
mod context_tests;
mod runner;
#[cfg(test)]
mod runner_tests;
mod targets;

pub use crate::context::{context_active, ContextGuard, YapeContext};
pub use crate::runner::{must_run, run, NodeContext, Runner};
pub use crate::targets::{RunResult, TargetRef, Targets};

use std::fmt;

use graph::{CallArgs, GraphError, ResolvedOp, Value};
use resource::ResourceError;
use state::StateError;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EngineError {
    Graph(GraphError),
    State(StateError),
    Resource(ResourceError),
    Resolution(String),
    Execution(String),
    ContextActive,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Graph(e) => write!(f, "{e}"),
            EngineError::State(e) => write!(f, "{e}"),
            EngineError::Resource(e) => write!(f, "{e}"),
            EngineError::Resolution(msg) => write!(f, "failed to resolve operator: {msg}"),
            EngineError::Execution(msg) => write!(f, "{msg}"),
            EngineError::ContextActive => write!(f, "there is a yape context already in use"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> EngineError {
        EngineError::Graph(e)
    }
}

impl From<StateError> for EngineError {
    fn from(e: StateError) -> EngineError {
        EngineError::State(e)
    }
}

impl From<ResourceError> for EngineError {
    fn from(e: ResourceError) -> EngineError {
        EngineError::Resource(e)
    }
}

///
/// Executes a fully resolved operator. This is the single dispatching
/// primitive at the bottom of the runner: everything above it only shapes
/// arguments.
///
pub fn run_op(op: &ResolvedOp) -> Result<Value, EngineError> {
    match op {
        ResolvedOp::Data(v) | ResolvedOp::Value(v) => Ok(v.clone()),
        ResolvedOp::GetItem { obj, key } => get_item(obj, key),
        ResolvedOp::GetAttr { obj, name } => get_attr(obj, name),
        ResolvedOp::Call { func, args, kwargs } => {
            let func = func
                .as_func()
                .ok_or_else(|| EngineError::Execution(format!("{func:?} is not callable")))?;
            func.call(CallArgs {
                args: args.clone(),
                kwargs: kwargs.clone(),
            })
            .map_err(EngineError::Execution)
        }
        ResolvedOp::Resource { request } => {
            let provider = resource::get_provider(request)?;
            Ok(provider.create(request)?)
        }
    }
}

fn get_item(obj: &Value, key: &Value) -> Result<Value, EngineError> {
    match (obj, key) {
        (Value::List(items), Value::Int(i)) => {
            let index = usize::try_from(*i)
                .map_err(|_| EngineError::Execution(format!("negative index {i}")))?;
            items.get(index).cloned().ok_or_else(|| {
                EngineError::Execution(format!(
                    "index {index} out of range for a list of {} items",
                    items.len()
                ))
            })
        }
        (Value::Map(entries), Value::Str(k)) => entries
            .get(k)
            .cloned()
            .ok_or_else(|| EngineError::Execution(format!("no entry for key {k:?}"))),
        (obj, key) => Err(EngineError::Execution(format!(
            "can not index {obj:?} with {key:?}"
        ))),
    }
}

fn get_attr(obj: &Value, name: &str) -> Result<Value, EngineError> {
    match obj {
        Value::Map(entries) => entries
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::Execution(format!("no field named {name:?}"))),
        Value::Context(ctx) if name == "workdir" => Ok(match &ctx.workdir {
            Some(dir) => Value::Path(dir.clone()),
            None => Value::Null,
        }),
        obj => Err(EngineError::Execution(format!(
            "{obj:?} has no field named {name:?}"
        ))),
    }
}
