// src/graph/assemble.rs
//! Contig reassembly after a rewrite.
//!
//! Splitting a repeat often leaves its copies with exactly one way in and
//! one way out; such unambiguous chains are merged into single contigs so
//! the next resolution pass sees them as ordinary flanks.

use std::collections::BTreeSet;

use tracing::info;

use crate::graph::contig_graph::{ContigGraph, ContigNode};

/// An edge u -> v that can be collapsed: no alternative path enters v or
/// leaves u, and the ends are not reverse-complement mates.
fn mergeable(graph: &ContigGraph, u: ContigNode, v: ContigNode) -> bool {
    graph.out_degree(u) == 1
        && graph.in_degree(v) == 1
        && u != v
        && u.twin() != v
}

fn chain_from(graph: &ContigGraph, start: ContigNode) -> Vec<ContigNode> {
    let mut chain = vec![start];
    let mut current = start;
    loop {
        let next = match graph.out_edges(current).first() {
            Some(&(next, _)) if mergeable(graph, current, next) => next,
            _ => break,
        };
        // A cycle back into the chain cannot be linearised.
        if chain.contains(&next) || chain.contains(&next.twin()) {
            break;
        }
        chain.push(next);
        current = next;
    }
    chain
}

/// Merge every maximal unambiguous chain. Returns the number of chains
/// merged.
pub fn assemble_contigs(graph: &mut ContigGraph) -> usize {
    // Chain heads: a mergeable out-edge but no mergeable in-edge.
    let mut chains: Vec<Vec<ContigNode>> = Vec::new();
    for node in graph.nodes() {
        if graph.is_removed(node) {
            continue;
        }
        let starts_chain = matches!(
            graph.out_edges(node).first(),
            Some(&(next, _)) if mergeable(graph, node, next)
        );
        if !starts_chain {
            continue;
        }
        let continues_chain = matches!(
            graph.in_edges(node).first(),
            Some(&(prev, _)) if mergeable(graph, prev, node)
        );
        if continues_chain {
            continue;
        }
        let chain = chain_from(graph, node);
        if chain.len() < 2 {
            continue;
        }
        // A chain and its twin mirror describe the same merge; keep one.
        if chain[0].index() <= chain.last().unwrap().twin().index() {
            chains.push(chain);
        }
    }

    // Chains are vertex-disjoint, but a chain and the twin of another can
    // overlap; drop latecomers touching consumed pairs.
    let mut consumed: BTreeSet<u32> = BTreeSet::new();
    chains.retain(|chain| {
        if chain.iter().any(|n| consumed.contains(&n.id())) {
            return false;
        }
        consumed.extend(chain.iter().map(|n| n.id()));
        true
    });

    if chains.is_empty() {
        return 0;
    }
    info!(chains = chains.len(), "assembling unambiguous paths");

    graph.unlock_names();
    let merged = chains.len();
    for chain in chains {
        let mut seq = graph.seq(chain[0]).to_string();
        let mut kmer_count = graph.kmer_count(chain[0]);
        for pair in chain.windows(2) {
            let distance = graph.distance(pair[0], pair[1]).expect("chain edge vanished");
            let next_seq = graph.seq(pair[1]);
            if distance >= 0 {
                seq.extend(std::iter::repeat('N').take(distance as usize));
                seq.push_str(next_seq);
            } else {
                let trim = (-distance) as usize;
                assert!(trim < next_seq.len());
                seq.push_str(&next_seq[trim..]);
            }
            kmer_count += graph.kmer_count(pair[1]);
        }

        let head = chain[0];
        let tail = *chain.last().unwrap();
        let chain_ids: BTreeSet<u32> = chain.iter().map(|n| n.id()).collect();
        let preds: Vec<(ContigNode, i32)> = graph
            .in_edges(head)
            .iter()
            .copied()
            .filter(|(p, _)| !chain_ids.contains(&p.id()))
            .collect();
        let succs: Vec<(ContigNode, i32)> = graph
            .out_edges(tail)
            .iter()
            .copied()
            .filter(|(s, _)| !chain_ids.contains(&s.id()))
            .collect();

        let name = graph.create_name();
        let merged_node = graph.add_vertex_pair(&name, &seq, kmer_count);
        for (pred, distance) in preds {
            graph.add_edge(pred, merged_node, distance);
        }
        for (succ, distance) in succs {
            graph.add_edge(merged_node, succ, distance);
        }
        for node in chain {
            graph.remove_vertex(node);
        }
    }
    graph.lock_names();

    merged
}
