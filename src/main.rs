// src/main.rs
use clap::Parser;
use rayon::ThreadPoolBuilder;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use unravel::cli_main::Cli;
use unravel::io::{fasta, gfa, paths};
use unravel::resolve::driver::resolve_short;

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("Setting tracing default failed");

    ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .expect("Failed to build thread pool");

    let contigs = match &cli.contigs {
        Some(path) => match fasta::read_contigs(path) {
            Ok(contigs) => Some(contigs),
            Err(e) => {
                eprintln!("unravel: {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    let mut graph = match gfa::load_graph(&cli.graph, contigs.as_ref()) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("unravel: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        contigs = graph.num_pairs(),
        "loaded draft assembly graph"
    );

    let opts = cli.resolver_options();
    let outcome = match resolve_short(&mut graph, &cli.reads, &opts) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("unravel: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        supported = outcome.supported_paths.len(),
        unsupported = outcome.unsupported_paths.len(),
        "resolution finished"
    );

    if let Some(path) = &cli.output_graph {
        if let Err(e) = gfa::write_graph(path, &graph) {
            eprintln!("unravel: {}: {}", path, e);
            std::process::exit(1);
        }
    }
    if let Some(path) = &cli.output_contigs {
        if let Err(e) = fasta::write_contigs(path, &graph) {
            eprintln!("unravel: {}: {}", path, e);
            std::process::exit(1);
        }
    }
    if let Some(path) = &cli.supported_paths {
        if let Err(e) = paths::write_paths(path, &outcome.supported_paths, &graph) {
            eprintln!("unravel: {}: {}", path, e);
            std::process::exit(1);
        }
    }
    if let Some(path) = &cli.unsupported_paths {
        if let Err(e) = paths::write_paths(path, &outcome.unsupported_paths, &graph) {
            eprintln!("unravel: {}: {}", path, e);
            std::process::exit(1);
        }
    }
    if let Some(path) = &cli.json_summary {
        let json = serde_json::to_string_pretty(&outcome.summaries)
            .expect("serializing run summary failed");
        if let Err(e) = std::fs::write(path, json) {
            eprintln!("unravel: {}: {}", path, e);
            std::process::exit(1);
        }
    }
}
