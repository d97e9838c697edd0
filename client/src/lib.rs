// Copyright 2025 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).


use std::path::PathBuf;

use clap::{Parser, Subcommand};
use engine::{Runner, Targets};
use graph::{Graph, Node};

///
/// Run yape execution graphs.
///
/// Operates on a graph file produced by `Graph::save`. Binaries embedding
/// their own graph construction can skip the file and hand a `Graph` to
/// `Cli::new` directly, after registering the functions it calls.
///
#[derive(Debug, Parser)]
#[command(name = "yape")]
pub struct Opts {
    /// Path to the saved graph file to operate on.
    #[arg(long = "graph", value_name = "FILE", default_value = "yp.graph")]
    pub graph: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the execution graph. All nodes are used as targets by default;
    /// pass specific targets as positional arguments.
    Run {
        /// Run nodes even if cached results are up to date.
        #[arg(short, long)]
        force: bool,

        #[arg(value_name = "TARGET")]
        targets: Vec<String>,
    },

    /// List available targets. Only explicitly named targets are listed by
    /// default.
    List {
        /// List both named and unnamed targets.
        #[arg(short, long)]
        all: bool,
    },

    /// List dependencies for each node passed as target. All nodes are used
    /// as targets by default.
    Deps {
        #[arg(value_name = "TARGET")]
        targets: Vec<String>,
    },
}

///
/// The subcommand dispatcher, usable over a loaded graph file or an embedded
/// graph.
///
pub struct Cli {
    graph: Graph,
    runner: Runner,
}

impl Cli {
    pub fn new(graph: Graph) -> Cli {
        Cli {
            graph,
            runner: Runner::new(),
        }
    }

    ///
    /// Executes a parsed command; `run` with default arguments when no
    /// subcommand was given.
    ///
    pub fn execute(&self, command: Option<Command>) -> Result<(), String> {
        match command.unwrap_or(Command::Run {
            force: false,
            targets: Vec::new(),
        }) {
            Command::Run { force, targets } => self.cmd_run(force, &targets),
            Command::List { all } => self.cmd_list(all),
            Command::Deps { targets } => self.cmd_deps(&targets),
        }
    }

    fn targets_from(names: &[String]) -> Targets {
        if names.is_empty() {
            Targets::All
        } else {
            Targets::names(names.iter().cloned())
        }
    }

    fn cmd_run(&self, force: bool, targets: &[String]) -> Result<(), String> {
        self.runner
            .run(
                &Self::targets_from(targets),
                Some(&self.graph),
                None,
                force,
                false,
            )
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn cmd_list(&self, all: bool) -> Result<(), String> {
        let named_only: &dyn Fn(&Node) -> bool = &|n| n.has_explicit_name();
        let nodes = self
            .graph
            .recurse_nodes(if all { None } else { Some(named_only) });
        for node in nodes {
            println!("{}", display_name(&node)?);
        }
        Ok(())
    }

    fn cmd_deps(&self, targets: &[String]) -> Result<(), String> {
        let nodes = if targets.is_empty() {
            self.graph.recurse_nodes(None)
        } else {
            let mut nodes = Vec::with_capacity(targets.len());
            for name in targets {
                nodes.push(self.graph.node(name).map_err(|e| e.to_string())?);
            }
            nodes
        };

        for node in nodes {
            println!("{}", display_name(&node)?);
            for dep in node.dep_nodes() {
                println!("    {}", display_name(&dep)?);
            }
        }
        Ok(())
    }
}

fn display_name(node: &Node) -> Result<String, String> {
    match node.full_name() {
        Ok(Some(name)) => Ok(name),
        Ok(None) => Ok(format!("{node}")),
        Err(e) => Err(e.to_string()),
    }
}
