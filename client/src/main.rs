// Copyright 2025 Yape project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::process::exit;

use clap::Parser;
use client::{Cli, Opts};
use graph::Graph;

fn main() {
    env_logger::init();

    let opts = Opts::parse();
    if let Err(e) = run(opts) {
        eprintln!("yape: {e}");
        exit(1);
    }
}

fn run(opts: Opts) -> Result<(), String> {
    let graph = Graph::load(&opts.graph)
        .map_err(|e| format!("failed to load graph {}: {e}", opts.graph.display()))?;
    log::debug!("loaded graph from {}", opts.graph.display());
    Cli::new(graph).execute(opts.command)
}
